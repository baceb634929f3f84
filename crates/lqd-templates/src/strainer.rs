use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::value::Object;
use crate::value::Value;

/// Arguments passed to a filter function alongside its input.
pub struct FilterArgs<'a> {
    pub positional: &'a [Value],
    pub keyword: &'a Object,
    pub context: &'a Context,
}

impl FilterArgs<'_> {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Positional argument `index`, or nil when absent.
    #[must_use]
    pub fn value(&self, index: usize) -> Value {
        self.get(index).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }
}

pub type FilterFn = dyn Fn(Value, &FilterArgs<'_>) -> Result<Value> + Send + Sync;

/// A named filter together with the number of arguments it accepts,
/// not counting the input. Keyword arguments count as one extra argument.
#[derive(Clone)]
pub struct Filter {
    name: String,
    arity: RangeInclusive<usize>,
    func: Arc<FilterFn>,
}

impl Filter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, input: Value, args: &FilterArgs<'_>) -> Result<Value> {
        let given = args.positional.len() + usize::from(!args.keyword.is_empty());
        if !self.arity.contains(&given) {
            let expected = if self.arity.start() == self.arity.end() {
                (self.arity.start() + 1).to_string()
            } else {
                format!("{}..{}", self.arity.start() + 1, self.arity.end() + 1)
            };
            return Err(Error::argument(format!(
                "wrong number of arguments (given {}, expected {expected})",
                given + 1
            )));
        }
        (self.func)(input, args)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A named group of filters registered together.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    name: String,
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter<F>(mut self, name: &str, arity: RangeInclusive<usize>, func: F) -> Self
    where
        F: Fn(Value, &FilterArgs<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.push(Filter {
            name: name.to_owned(),
            arity,
            func: Arc::new(func),
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

/// The combined filter table of an ordered list of filter sets. Later sets
/// override earlier ones.
#[derive(Debug, Default)]
pub struct StrainerTemplate {
    filters: FxHashMap<String, Filter>,
}

impl StrainerTemplate {
    fn from_sets<'a>(sets: impl IntoIterator<Item = &'a Arc<FilterSet>>) -> Self {
        let mut filters = FxHashMap::default();
        for set in sets {
            for filter in &set.filters {
                filters.insert(filter.name.clone(), filter.clone());
            }
        }
        Self { filters }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}

/// A cached combination. Holding the sets keeps their addresses from being
/// reused by other sets while the entry lives.
#[derive(Debug)]
struct CachedTemplate {
    _sets: Vec<Arc<FilterSet>>,
    template: Arc<StrainerTemplate>,
}

/// Builds strainers for contexts, caching one template per combination of
/// extra filter sets.
#[derive(Debug)]
pub struct StrainerFactory {
    global_sets: Vec<Arc<FilterSet>>,
    global: Arc<StrainerTemplate>,
    cache: Mutex<FxHashMap<Vec<usize>, CachedTemplate>>,
}

impl StrainerFactory {
    #[must_use]
    pub fn new(global_sets: Vec<Arc<FilterSet>>) -> Self {
        let global = Arc::new(StrainerTemplate::from_sets(&global_sets));
        Self {
            global_sets,
            global,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn global_sets(&self) -> &[Arc<FilterSet>] {
        &self.global_sets
    }

    /// Strainer with the global filters plus `extra`. A combination is
    /// identified by the sets themselves, so distinct sets sharing a name
    /// get distinct templates.
    #[must_use]
    pub fn create(&self, extra: &[Arc<FilterSet>], strict_filters: bool) -> Strainer {
        if extra.is_empty() {
            return Strainer {
                template: self.global.clone(),
                strict_filters,
            };
        }

        let key: Vec<usize> = extra
            .iter()
            .map(|set| Arc::as_ptr(set) as usize)
            .collect();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let template = cache
            .entry(key)
            .or_insert_with(|| {
                tracing::trace!(sets = extra.len(), "building strainer template");
                CachedTemplate {
                    _sets: extra.to_vec(),
                    template: Arc::new(StrainerTemplate::from_sets(
                        self.global_sets.iter().chain(extra),
                    )),
                }
            })
            .template
            .clone();

        Strainer {
            template,
            strict_filters,
        }
    }
}

impl Default for StrainerFactory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Per-context filter dispatcher.
#[derive(Debug, Clone)]
pub struct Strainer {
    template: Arc<StrainerTemplate>,
    strict_filters: bool,
}

impl Strainer {
    #[must_use]
    pub fn is_invokable(&self, name: &str) -> bool {
        self.template.contains(name)
    }

    /// Apply filter `name`. Unknown filters return the input unchanged
    /// unless strict filters are enabled.
    pub fn invoke(
        &self,
        name: &str,
        input: Value,
        positional: &[Value],
        keyword: &Object,
        context: &Context,
    ) -> Result<Value> {
        match self.template.filters.get(name) {
            Some(filter) => filter.call(
                input,
                &FilterArgs {
                    positional,
                    keyword,
                    context,
                },
            ),
            None if self.strict_filters => Err(Error::undefined_filter(name)),
            None => {
                tracing::trace!(filter = name, "unknown filter passes input through");
                Ok(input)
            }
        }
    }
}
