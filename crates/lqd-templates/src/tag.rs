use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::Result;
use crate::parse_context::ParseContext;
use crate::tokenizer::Tokenizer;

/// Loop control raised by `break` and `continue`. It travels up through
/// enclosing bodies until a loop consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Break,
    Continue,
}

pub type RenderResult = Result<Option<ControlSignal>>;

/// A parsed node that can be rendered. Parsed trees are immutable, so one
/// template can be rendered concurrently with separate contexts.
pub trait Renderable: fmt::Debug + Send + Sync {
    fn render_to_output_buffer(&self, context: &mut Context, output: &mut String) -> RenderResult;

    /// Whether the node renders nothing visible. Blank control-flow bodies
    /// drop their whitespace-only text.
    fn is_blank(&self) -> bool {
        false
    }

    fn line_number(&self) -> Option<usize> {
        None
    }

    /// Tag name, used to check for tags disabled in the current context.
    fn tag_name(&self) -> Option<&str> {
        None
    }
}

/// Builds a node from a tag's markup. Block tags consume their body from
/// the tokenizer.
pub trait TagParser: Send + Sync {
    fn parse(
        &self,
        tag_name: &str,
        markup: &str,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Box<dyn Renderable>>;
}

impl<F> TagParser for F
where
    F: Fn(&str, &str, &mut Tokenizer, &mut ParseContext) -> Result<Box<dyn Renderable>>
        + Send
        + Sync,
{
    fn parse(
        &self,
        tag_name: &str,
        markup: &str,
        tokenizer: &mut Tokenizer,
        parse_context: &mut ParseContext,
    ) -> Result<Box<dyn Renderable>> {
        self(tag_name, markup, tokenizer, parse_context)
    }
}

/// Tag name to parser table.
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: FxHashMap<String, Arc<dyn TagParser>>,
}

impl TagRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `parser` for `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, parser: impl TagParser + 'static) {
        self.tags.insert(name.into(), Arc::new(parser));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn TagParser>> {
        self.tags.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.tags.remove(name);
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
