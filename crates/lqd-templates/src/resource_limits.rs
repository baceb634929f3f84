use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

/// Quotas for a single render. `None` disables a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimitsConfig {
    /// Maximum bytes written to the output.
    pub render_length_limit: Option<usize>,
    /// Maximum number of nodes rendered.
    pub render_score_limit: Option<usize>,
    /// Maximum size of assigned and captured values.
    pub assign_score_limit: Option<usize>,
}

/// Usage counters checked against a [`ResourceLimitsConfig`].
///
/// Once any limit is exceeded the tracker stays exhausted and every further
/// increment fails, until [`ResourceLimits::reset`].
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    config: ResourceLimitsConfig,
    render_score: usize,
    assign_score: usize,
    last_capture_length: Option<usize>,
    reached: bool,
}

impl ResourceLimits {
    #[must_use]
    pub fn new(config: ResourceLimitsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> ResourceLimitsConfig {
        self.config
    }

    #[must_use]
    pub fn render_score(&self) -> usize {
        self.render_score
    }

    #[must_use]
    pub fn assign_score(&self) -> usize {
        self.assign_score
    }

    #[must_use]
    pub fn reached(&self) -> bool {
        self.reached
    }

    pub fn increment_render_score(&mut self, amount: usize) -> Result<()> {
        self.render_score = self.render_score.saturating_add(amount);
        self.check(self.config.render_score_limit, self.render_score)
    }

    pub fn increment_assign_score(&mut self, amount: usize) -> Result<()> {
        self.assign_score = self.assign_score.saturating_add(amount);
        self.check(self.config.assign_score_limit, self.assign_score)
    }

    /// Account for output written so far. While capturing, growth of the
    /// capture buffer counts towards the assign score instead.
    pub fn increment_write_score(&mut self, output: &str) -> Result<()> {
        if let Some(last) = self.last_capture_length {
            let captured = output.len();
            let increment = captured.saturating_sub(last);
            self.last_capture_length = Some(captured);
            self.increment_assign_score(increment)
        } else {
            self.check(self.config.render_length_limit, output.len())
        }
    }

    /// Start a capture and return the previous capture state, to be handed
    /// back to [`ResourceLimits::end_capture`].
    pub fn begin_capture(&mut self) -> Option<usize> {
        self.last_capture_length.replace(0)
    }

    pub fn end_capture(&mut self, previous: Option<usize>) {
        self.last_capture_length = previous;
    }

    pub fn reset(&mut self) {
        self.reached = false;
        self.render_score = 0;
        self.assign_score = 0;
        self.last_capture_length = None;
    }

    fn check(&mut self, limit: Option<usize>, score: usize) -> Result<()> {
        if self.reached || limit.is_some_and(|limit| score > limit) {
            self.reached = true;
            return Err(Error::memory());
        }
        Ok(())
    }
}

/// Size of a value for the assign score: bytes for strings, one plus the
/// children for collections, one for everything else.
#[must_use]
pub fn assign_score_of(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(assign_score_of).fold(1, usize::saturating_add),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.len().saturating_add(assign_score_of(v)))
            .fold(1, usize::saturating_add),
        _ => 1,
    }
}
