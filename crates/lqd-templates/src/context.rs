use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::block::MAX_DEPTH;
use crate::environment::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::expression::Expression;
use crate::file_system::FileSystem;
use crate::partial_cache::DefaultTemplateFactory;
use crate::partial_cache::TemplateFactory;
use crate::registers::Registers;
use crate::resource_limits::ResourceLimits;
use crate::resource_limits::ResourceLimitsConfig;
use crate::strainer::FilterSet;
use crate::strainer::Strainer;
use crate::utils::to_number;
use crate::utils::Number;
use crate::value::Object;
use crate::value::Value;

/// Deferred value computed on first lookup.
pub type LazyValue = Arc<dyn Fn(&Context) -> Value + Send + Sync>;

/// Transformation applied to every `{{ }}` output after its filters.
pub type GlobalFilter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Turns a recorded error into the text written in its place. Returning an
/// error aborts the render.
pub type ExceptionRenderer = Arc<dyn Fn(&Error) -> Result<String> + Send + Sync>;

/// A variable slot. Lazy slots are replaced by their value on first use.
#[derive(Clone)]
pub enum Bound {
    Value(Value),
    Lazy(LazyValue),
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Value> for Bound {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

pub type Scope = FxHashMap<String, Bound>;

#[must_use]
pub fn scope_from(object: Object) -> Scope {
    object
        .into_iter()
        .map(|(key, value)| (key, Bound::Value(value)))
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Layer {
    Scope(usize),
    Environment(usize),
    Static(usize),
}

/// Render-time state: variable scopes, registers, limits and the errors
/// collected so far.
///
/// Scopes are searched innermost first, then environments, then static
/// environments. `assign` and `capture` write to the outermost scope;
/// [`Context::set`] writes to the innermost.
pub struct Context {
    environment: Arc<Environment>,
    scopes: Vec<Scope>,
    environments: Vec<Scope>,
    static_environments: Vec<Scope>,
    registers: Registers,
    resource_limits: ResourceLimits,
    filters: Vec<Arc<FilterSet>>,
    strainer: Strainer,
    errors: Vec<Error>,
    strict_variables: bool,
    strict_filters: bool,
    rethrow_errors: bool,
    global_filter: Option<GlobalFilter>,
    exception_renderer: ExceptionRenderer,
    template_name: Option<String>,
    partial: bool,
    base_scope_depth: usize,
    disabled_tags: Vec<String>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes)
            .field("environments", &self.environments)
            .field("registers", &self.registers)
            .field("resource_limits", &self.resource_limits)
            .field("errors", &self.errors)
            .field("template_name", &self.template_name)
            .finish_non_exhaustive()
    }
}

impl Context {
    #[must_use]
    pub fn new(environment: Arc<Environment>) -> Self {
        Self::builder(environment).build()
    }

    #[must_use]
    pub fn builder(environment: Arc<Environment>) -> ContextBuilder {
        ContextBuilder::new(environment)
    }

    #[must_use]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Push a new innermost scope.
    pub fn push(&mut self, scope: Scope) -> Result<()> {
        self.check_overflow(1)?;
        self.scopes.push(scope);
        Ok(())
    }

    /// Pop the innermost scope. The outermost scope cannot be popped.
    pub fn pop(&mut self) -> Result<Scope> {
        if self.scopes.len() <= 1 {
            return Err(Error::context("Cannot pop the outermost scope"));
        }
        self.scopes
            .pop()
            .ok_or_else(|| Error::context("Cannot pop the outermost scope"))
    }

    /// Run `f` with `scope` pushed. The scope is popped again even when `f`
    /// fails.
    pub fn stack<R>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.push(scope)?;
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn check_overflow(&self, extra: usize) -> Result<()> {
        if self.base_scope_depth + self.scopes.len() + extra > MAX_DEPTH {
            return Err(Error::stack_level());
        }
        Ok(())
    }

    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `key` in the innermost scope.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key.into(), Bound::Value(value));
        }
    }

    /// Bind a lazily computed value in the innermost scope.
    pub fn set_lazy(&mut self, key: impl Into<String>, value: LazyValue) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key.into(), Bound::Lazy(value));
        }
    }

    /// Bind `key` in the outermost scope, where `assign` writes.
    pub fn assign(&mut self, key: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.insert(key.into(), Bound::Value(value));
        }
    }

    /// Evaluate a markup expression such as `product.title`.
    pub fn get(&mut self, markup: &str) -> Result<Value> {
        Expression::parse(markup).evaluate(self)
    }

    /// Whether a markup expression resolves to something other than nil.
    pub fn has_key(&mut self, markup: &str) -> Result<bool> {
        Ok(!self.get(markup)?.is_nil())
    }

    pub fn evaluate(&mut self, expression: &Expression) -> Result<Value> {
        expression.evaluate(self)
    }

    /// Resolve a top-level variable. Unknown names are nil unless strict
    /// variables are enabled.
    pub fn find_variable(&mut self, key: &str) -> Result<Value> {
        self.find_variable_with(key, true)
    }

    pub(crate) fn find_variable_with(&mut self, key: &str, raise_on_not_found: bool) -> Result<Value> {
        let Some(layer) = self.locate(key) else {
            if raise_on_not_found && self.strict_variables {
                return Err(Error::undefined_variable(key));
            }
            return Ok(Value::Nil);
        };

        let lazy = match self.layer(layer).get(key) {
            Some(Bound::Value(value)) => return Ok(value.clone()),
            Some(Bound::Lazy(lazy)) => lazy.clone(),
            None => return Ok(Value::Nil),
        };
        let value = lazy(self);
        self.layer_mut(layer)
            .insert(key.to_owned(), Bound::Value(value.clone()));
        Ok(value)
    }

    /// Look up a variable without evaluating or caching lazy slots.
    #[must_use]
    pub fn peek_variable(&self, key: &str) -> Option<Value> {
        let layer = self.locate(key)?;
        match self.layer(layer).get(key)? {
            Bound::Value(value) => Some(value.clone()),
            Bound::Lazy(lazy) => Some(lazy(self)),
        }
    }

    fn locate(&self, key: &str) -> Option<Layer> {
        if let Some(idx) = self.scopes.iter().rposition(|scope| scope.contains_key(key)) {
            return Some(Layer::Scope(idx));
        }
        if let Some(idx) = self.environments.iter().position(|env| env.contains_key(key)) {
            return Some(Layer::Environment(idx));
        }
        self.static_environments
            .iter()
            .position(|env| env.contains_key(key))
            .map(Layer::Static)
    }

    fn layer(&self, layer: Layer) -> &Scope {
        match layer {
            Layer::Scope(idx) => &self.scopes[idx],
            Layer::Environment(idx) => &self.environments[idx],
            Layer::Static(idx) => &self.static_environments[idx],
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut Scope {
        match layer {
            Layer::Scope(idx) => &mut self.scopes[idx],
            Layer::Environment(idx) => &mut self.environments[idx],
            Layer::Static(idx) => &mut self.static_environments[idx],
        }
    }

    /// Add `delta` to the counter `name` in the first environment. Returns
    /// the values before and after the change.
    pub(crate) fn bump_counter(&mut self, name: &str, delta: i64) -> (Value, Value) {
        let env = &mut self.environments[0];
        let current = match env.get(name) {
            Some(Bound::Value(value)) if !value.is_nil() => to_number(value),
            _ => Number::Integer(0),
        };
        let next = current.add(Number::Integer(delta)).into_value();
        env.insert(name.to_owned(), Bound::Value(next.clone()));
        (current.into_value(), next)
    }

    pub fn invoke_filter(
        &self,
        name: &str,
        input: Value,
        positional: &[Value],
        keyword: &Object,
    ) -> Result<Value> {
        self.strainer.invoke(name, input, positional, keyword, self)
    }

    pub fn add_filters(&mut self, set: Arc<FilterSet>) {
        self.filters.push(set);
        self.strainer = self
            .environment
            .strainer_factory()
            .create(&self.filters, self.strict_filters);
    }

    #[must_use]
    pub fn apply_global_filter(&self, value: Value) -> Value {
        match &self.global_filter {
            Some(filter) => filter(value),
            None => value,
        }
    }

    /// Record an error and return the text to write in its place.
    pub fn handle_error(&mut self, error: Error, line_number: Option<usize>) -> Result<String> {
        let error = error
            .with_template_name(self.template_name.as_deref())
            .with_line_number(line_number);
        tracing::debug!(%error, "render error");
        self.errors.push(error.clone());
        if self.rethrow_errors {
            return Err(error);
        }
        (self.exception_renderer)(&error)
    }

    /// Error handling for a failed node. Fatal errors propagate, lookup
    /// misses are only recorded, anything else is recorded and its message
    /// written unless the node is a blank tag.
    pub(crate) fn rescue_render_node(
        &mut self,
        error: Error,
        line_number: Option<usize>,
        blank_tag: bool,
        output: &mut String,
    ) -> Result<()> {
        if error.kind().is_fatal() {
            return Err(error
                .with_template_name(self.template_name.as_deref())
                .with_line_number(line_number));
        }
        if error.kind().is_undefined() {
            self.handle_error(error, line_number)?;
            return Ok(());
        }
        let message = self.handle_error(error, line_number)?;
        if !blank_tag {
            output.push_str(&message);
        }
        Ok(())
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    #[must_use]
    pub fn strict_variables(&self) -> bool {
        self.strict_variables
    }

    #[must_use]
    pub fn strict_filters(&self) -> bool {
        self.strict_filters
    }

    #[must_use]
    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    pub fn resource_limits_mut(&mut self) -> &mut ResourceLimits {
        &mut self.resource_limits
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn set_template_name(&mut self, name: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.template_name, name)
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn set_partial(&mut self, partial: bool) -> bool {
        std::mem::replace(&mut self.partial, partial)
    }

    /// Run `f` with fresh scopes and environments, as used for `render`.
    /// Registers, limits, filters and recorded errors stay shared.
    pub fn with_isolated_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.check_overflow(1)?;
        let scopes = std::mem::replace(&mut self.scopes, vec![Scope::default()]);
        let environments = std::mem::replace(&mut self.environments, vec![Scope::default()]);
        let template_name = self.template_name.clone();
        let partial = self.partial;
        self.base_scope_depth += 1;

        let result = f(self);

        self.base_scope_depth -= 1;
        self.scopes = scopes;
        self.environments = environments;
        self.template_name = template_name;
        self.partial = partial;
        result
    }

    /// Run `f` with `tags` disabled.
    pub fn with_disabled_tags<R>(&mut self, tags: &[&str], f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let depth = self.disabled_tags.len();
        self.disabled_tags.extend(tags.iter().map(|tag| (*tag).to_owned()));
        let result = f(self);
        self.disabled_tags.truncate(depth);
        result
    }

    #[must_use]
    pub fn is_tag_disabled(&self, name: &str) -> bool {
        self.disabled_tags.iter().any(|tag| tag == name)
    }

    /// Run `f` while counting output growth towards the assign score.
    pub fn with_capture<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let previous = self.resource_limits.begin_capture();
        let result = f(self);
        self.resource_limits.end_capture(previous);
        result
    }
}

/// Configures a [`Context`].
pub struct ContextBuilder {
    environment: Arc<Environment>,
    environments: Vec<Object>,
    static_environments: Vec<Object>,
    outer_scope: Object,
    registers: Object,
    file_system: Option<Arc<dyn FileSystem>>,
    template_factory: Option<Arc<dyn TemplateFactory>>,
    resource_limits: Option<ResourceLimitsConfig>,
    filters: Vec<Arc<FilterSet>>,
    strict_variables: bool,
    strict_filters: bool,
    rethrow_errors: bool,
    global_filter: Option<GlobalFilter>,
    exception_renderer: Option<ExceptionRenderer>,
}

impl ContextBuilder {
    fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            environments: Vec::new(),
            static_environments: Vec::new(),
            outer_scope: Object::new(),
            registers: Object::new(),
            file_system: None,
            template_factory: None,
            resource_limits: None,
            filters: Vec::new(),
            strict_variables: false,
            strict_filters: false,
            rethrow_errors: false,
            global_filter: None,
            exception_renderer: None,
        }
    }

    /// Add a variable environment. The first one also holds
    /// `increment` and `decrement` counters.
    #[must_use]
    pub fn environment(mut self, bindings: Object) -> Self {
        self.environments.push(bindings);
        self
    }

    /// Add a read-only environment searched after all others.
    #[must_use]
    pub fn static_environment(mut self, bindings: Object) -> Self {
        self.static_environments.push(bindings);
        self
    }

    #[must_use]
    pub fn outer_scope(mut self, scope: Object) -> Self {
        self.outer_scope = scope;
        self
    }

    #[must_use]
    pub fn registers(mut self, registers: Object) -> Self {
        self.registers = registers;
        self
    }

    #[must_use]
    pub fn file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    #[must_use]
    pub fn template_factory(mut self, factory: Arc<dyn TemplateFactory>) -> Self {
        self.template_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn resource_limits(mut self, limits: ResourceLimitsConfig) -> Self {
        self.resource_limits = Some(limits);
        self
    }

    #[must_use]
    pub fn filters(mut self, set: Arc<FilterSet>) -> Self {
        self.filters.push(set);
        self
    }

    #[must_use]
    pub fn strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    #[must_use]
    pub fn strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }

    #[must_use]
    pub fn rethrow_errors(mut self, rethrow: bool) -> Self {
        self.rethrow_errors = rethrow;
        self
    }

    #[must_use]
    pub fn global_filter(mut self, filter: GlobalFilter) -> Self {
        self.global_filter = Some(filter);
        self
    }

    #[must_use]
    pub fn exception_renderer(mut self, renderer: ExceptionRenderer) -> Self {
        self.exception_renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn build(self) -> Context {
        let mut environments: Vec<Scope> = self.environments.into_iter().map(scope_from).collect();
        if environments.is_empty() {
            environments.push(Scope::default());
        }
        let strainer = self
            .environment
            .strainer_factory()
            .create(&self.filters, self.strict_filters);
        let file_system = self
            .file_system
            .unwrap_or_else(|| self.environment.file_system().clone());
        let template_factory = self
            .template_factory
            .unwrap_or_else(|| Arc::new(DefaultTemplateFactory));
        let resource_limits = self
            .resource_limits
            .unwrap_or_else(|| self.environment.resource_limits());

        Context {
            scopes: vec![scope_from(self.outer_scope)],
            environments,
            static_environments: self.static_environments.into_iter().map(scope_from).collect(),
            registers: Registers::new(file_system, template_factory, self.registers),
            resource_limits: ResourceLimits::new(resource_limits),
            filters: self.filters,
            strainer,
            errors: Vec::new(),
            strict_variables: self.strict_variables,
            strict_filters: self.strict_filters,
            rethrow_errors: self.rethrow_errors,
            global_filter: self.global_filter,
            exception_renderer: self
                .exception_renderer
                .unwrap_or_else(|| Arc::new(|error: &Error| Ok(error.to_string()))),
            template_name: None,
            partial: false,
            base_scope_depth: 0,
            disabled_tags: Vec::new(),
            environment: self.environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;

    fn object(data: serde_json::Value) -> Object {
        Value::from(data).into_object().unwrap_or_default()
    }

    fn context() -> Context {
        Context::new(Environment::global())
    }

    #[test]
    fn inner_scope_shadows_environment() {
        let mut ctx = Context::builder(Environment::global())
            .environment(object(json!({"x": 0})))
            .build();
        let mut scope = Scope::default();
        scope.insert("x".into(), Bound::Value(Value::Integer(1)));
        let inner = ctx.stack(scope, |ctx| ctx.get("x")).unwrap();
        assert_eq!(inner, Value::Integer(1));
        assert_eq!(ctx.get("x").unwrap(), Value::Integer(0));
    }

    #[test]
    fn stack_pops_on_error() {
        let mut ctx = context();
        let result: Result<()> = ctx.stack(Scope::default(), |_| Err(Error::argument("boom")));
        assert!(result.is_err());
        assert_eq!(ctx.scope_depth(), 1);
    }

    #[test]
    fn outermost_scope_cannot_be_popped() {
        let mut ctx = context();
        assert_eq!(ctx.pop().unwrap_err().kind(), crate::error::ErrorKind::Context);
    }

    #[test]
    fn nesting_limit() {
        let mut ctx = context();
        for _ in 1..MAX_DEPTH {
            ctx.push(Scope::default()).unwrap();
        }
        let err = ctx.push(Scope::default()).unwrap_err();
        assert_eq!(err.message(), "Nesting too deep");
    }

    #[test]
    fn assign_targets_outermost_scope() {
        let mut ctx = context();
        ctx.stack(Scope::default(), |ctx| {
            ctx.assign("a", Value::Integer(1));
            ctx.set("b", Value::Integer(2));
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.get("a").unwrap(), Value::Integer(1));
        assert_eq!(ctx.get("b").unwrap(), Value::Nil);
    }

    #[test]
    fn lazy_values_are_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut ctx = context();
        ctx.set_lazy(
            "expensive",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::from("computed")
            }),
        );
        assert_eq!(ctx.get("expensive").unwrap(), Value::from("computed"));
        assert_eq!(ctx.get("expensive").unwrap(), Value::from("computed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_values_see_the_context() {
        let mut ctx = context();
        ctx.set("base", Value::Integer(20));
        ctx.set_lazy(
            "derived",
            Arc::new(|ctx| ctx.peek_variable("base").unwrap_or_default()),
        );
        assert_eq!(ctx.get("derived").unwrap(), Value::Integer(20));
    }

    #[test]
    fn strict_variables_raise() {
        let mut ctx = Context::builder(Environment::global())
            .strict_variables(true)
            .build();
        let err = ctx.get("missing").unwrap_err();
        assert_eq!(err.message(), "undefined variable missing");
        assert_eq!(ctx.find_variable_with("missing", false).unwrap(), Value::Nil);
    }

    #[test]
    fn static_environments_are_searched_last() {
        let mut ctx = Context::builder(Environment::global())
            .environment(object(json!({"a": "env"})))
            .static_environment(object(json!({"a": "static", "b": "static"})))
            .build();
        assert_eq!(ctx.get("a").unwrap(), Value::from("env"));
        assert_eq!(ctx.get("b").unwrap(), Value::from("static"));
    }

    #[test]
    fn counters_live_in_first_environment() {
        let mut ctx = context();
        assert_eq!(ctx.bump_counter("n", 1).0, Value::Integer(0));
        assert_eq!(ctx.bump_counter("n", 1).0, Value::Integer(1));
        assert_eq!(ctx.bump_counter("n", -1).1, Value::Integer(1));
        assert_eq!(ctx.get("n").unwrap(), Value::Integer(1));
    }

    #[test]
    fn isolated_scope_hides_variables() {
        let mut ctx = Context::builder(Environment::global())
            .environment(object(json!({"secret": 1})))
            .build();
        let inner = ctx.with_isolated_scope(|ctx| ctx.get("secret")).unwrap();
        assert_eq!(inner, Value::Nil);
        assert_eq!(ctx.get("secret").unwrap(), Value::Integer(1));
    }

    #[test]
    fn handle_error_records_and_renders() {
        let mut ctx = context();
        ctx.set_template_name(Some("page".into()));
        let message = ctx.handle_error(Error::zero_division(), Some(2)).unwrap();
        assert_eq!(message, "Liquid error (page line 2): divided by 0");
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn rethrow_errors() {
        let mut ctx = Context::builder(Environment::global())
            .rethrow_errors(true)
            .build();
        assert!(ctx.handle_error(Error::argument("bad"), None).is_err());
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn custom_exception_renderer() {
        let mut ctx = Context::builder(Environment::global())
            .exception_renderer(Arc::new(|_| Ok(String::from("[error]"))))
            .build();
        let mut out = String::new();
        ctx.rescue_render_node(Error::argument("bad"), None, false, &mut out)
            .unwrap();
        assert_eq!(out, "[error]");
    }

    #[test]
    fn undefined_errors_are_silent() {
        let mut ctx = context();
        let mut out = String::new();
        ctx.rescue_render_node(Error::undefined_variable("x"), Some(1), false, &mut out)
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn fatal_errors_propagate() {
        let mut ctx = context();
        let mut out = String::new();
        let err = ctx
            .rescue_render_node(Error::memory(), Some(1), false, &mut out)
            .unwrap_err();
        assert_eq!(err.line_number(), Some(1));
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn disabled_tags_are_scoped() {
        let mut ctx = context();
        ctx.with_disabled_tags(&["include"], |ctx| {
            assert!(ctx.is_tag_disabled("include"));
            Ok(())
        })
        .unwrap();
        assert!(!ctx.is_tag_disabled("include"));
    }
}
