//! Liquid template parsing and rendering.
//!
//! Templates are parsed once into an immutable tree and rendered any number
//! of times, each render with its own [`Context`].
//!
//! ## Architecture
//!
//! 1. **Tokenizing**: source is split into text, `{{ }}` and `{% %}` tokens
//! 2. **Parsing**: tokens become a tree of [`BlockBody`] nodes. Tags are
//!    looked up in the [`Environment`]'s [`TagRegistry`] and parse their own
//!    markup, in lax, warn or strict mode
//! 3. **Rendering**: nodes write into an output buffer. Variables resolve
//!    through the context's scopes and filters through its strainer
//!
//! Errors raised while rendering are written inline and recorded on the
//! context, unless they are fatal (nesting depth, resource limits) or the
//! context rethrows.
//!
//! ## Example
//!
//! ```
//! use lqd_templates::Template;
//! use lqd_templates::Value;
//!
//! let template = Template::parse("Hello {{ name | upcase }}!").unwrap();
//! let mut bindings = lqd_templates::Object::new();
//! bindings.insert("name".to_owned(), Value::from("world"));
//! assert_eq!(template.render(bindings).unwrap(), "Hello WORLD!");
//! ```

pub mod block;
mod block_body;
mod condition;
mod context;
mod document;
mod drop;
mod environment;
mod error;
mod expression;
mod file_system;
mod i18n;
mod lexer;
mod parse_context;
mod parser;
mod partial_cache;
mod quotes;
mod registers;
mod resource_limits;
pub mod standard_filters;
mod strainer;
mod tag;
pub mod tags;
mod template;
mod tokenizer;
mod utils;
mod value;
mod variable;

pub use block_body::BlockBody;
pub use block_body::UnknownTag;
pub use condition::Condition;
pub use condition::Operator;
pub use context::Context;
pub use context::ContextBuilder;
pub use context::ExceptionRenderer;
pub use context::GlobalFilter;
pub use context::LazyValue;
pub use document::Document;
pub use drop::DropObject;
pub use drop::ForloopDrop;
pub use drop::TablerowloopDrop;
pub use environment::Environment;
pub use environment::EnvironmentBuilder;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use expression::Expression;
pub use file_system::BlankFileSystem;
pub use file_system::FileSystem;
pub use file_system::LocalFileSystem;
pub use file_system::MemoryFileSystem;
pub use i18n::I18n;
pub use parse_context::ErrorMode;
pub use parse_context::ParseContext;
pub use parse_context::ParseOptions;
pub use partial_cache::DefaultTemplateFactory;
pub use partial_cache::TemplateFactory;
pub use registers::Registers;
pub use resource_limits::ResourceLimits;
pub use resource_limits::ResourceLimitsConfig;
pub use strainer::FilterArgs;
pub use strainer::FilterSet;
pub use tag::ControlSignal;
pub use tag::RenderResult;
pub use tag::Renderable;
pub use tag::TagParser;
pub use tag::TagRegistry;
pub use template::RenderOptions;
pub use template::Template;
pub use tokenizer::Token;
pub use tokenizer::Tokenizer;
pub use value::Object;
pub use value::Value;
pub use variable::Variable;
