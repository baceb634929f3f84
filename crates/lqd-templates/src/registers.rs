use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::drop::ForloopDrop;
use crate::file_system::FileSystem;
use crate::partial_cache::TemplateFactory;
use crate::template::Template;
use crate::value::Object;
use crate::value::Value;

/// Per-render state that tags share and that templates cannot see.
#[derive(Debug)]
pub struct Registers {
    file_system: Arc<dyn FileSystem>,
    template_factory: Arc<dyn TemplateFactory>,
    pub(crate) cached_partials: FxHashMap<String, Arc<Template>>,
    /// Position of each `cycle` group.
    pub(crate) cycle: FxHashMap<String, usize>,
    /// Where each named `for` loop stopped, for `offset: continue`.
    pub(crate) for_offsets: FxHashMap<String, usize>,
    /// Loops being rendered, innermost last.
    pub(crate) for_stack: Vec<Arc<ForloopDrop>>,
    /// Last `ifchanged` output.
    pub(crate) ifchanged: Option<String>,
    custom: Object,
}

impl Registers {
    #[must_use]
    pub fn new(
        file_system: Arc<dyn FileSystem>,
        template_factory: Arc<dyn TemplateFactory>,
        custom: Object,
    ) -> Self {
        Self {
            file_system,
            template_factory,
            cached_partials: FxHashMap::default(),
            cycle: FxHashMap::default(),
            for_offsets: FxHashMap::default(),
            for_stack: Vec::new(),
            ifchanged: None,
            custom,
        }
    }

    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    pub fn set_file_system(&mut self, file_system: Arc<dyn FileSystem>) {
        self.file_system = file_system;
        self.cached_partials.clear();
    }

    #[must_use]
    pub fn template_factory(&self) -> &Arc<dyn TemplateFactory> {
        &self.template_factory
    }

    /// Host-defined register.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.custom.insert(key.into(), value);
    }
}
