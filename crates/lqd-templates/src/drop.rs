use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

/// A host object exposed to templates through a fixed set of methods.
///
/// Lookups on a drop go through [`invoke_drop`]: names listed by
/// [`DropObject::invokable_methods`] are dispatched to
/// [`DropObject::call_method`], anything else reaches
/// [`DropObject::liquid_method_missing`].
pub trait DropObject: fmt::Debug + Send + Sync {
    /// Method names templates may call.
    fn invokable_methods(&self) -> &[&str];

    /// Run an invokable method. Only called with names from
    /// [`DropObject::invokable_methods`].
    fn call_method(&self, method: &str, context: &Context) -> Result<Value>;

    /// Fallback for names that are not invokable. Returns nil, or fails
    /// when the context has strict variables enabled.
    fn liquid_method_missing(&self, method: &str, context: &Context) -> Result<Value> {
        if context.strict_variables() {
            Err(Error::undefined_drop_method(method))
        } else {
            Ok(Value::Nil)
        }
    }

    /// Text written when the drop itself is output.
    fn to_liquid_string(&self) -> String {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name).to_owned()
    }

    /// Items for loops and array filters. `None` means not iterable.
    fn items(&self) -> Option<Vec<Value>> {
        None
    }
}

/// Dispatch `method` on a drop.
pub fn invoke_drop(drop: &dyn DropObject, method: &str, context: &Context) -> Result<Value> {
    if drop.invokable_methods().contains(&method) {
        drop.call_method(method, context)
    } else {
        drop.liquid_method_missing(method, context)
    }
}

/// The `forloop` object of a `for` loop or a `render ... for`.
#[derive(Debug)]
pub struct ForloopDrop {
    name: String,
    length: usize,
    index: AtomicUsize,
    parentloop: Option<Arc<ForloopDrop>>,
}

impl ForloopDrop {
    #[must_use]
    pub fn new(name: impl Into<String>, length: usize, parentloop: Option<Arc<ForloopDrop>>) -> Self {
        Self {
            name: name.into(),
            length,
            index: AtomicUsize::new(0),
            parentloop,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn index0(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.index.fetch_add(1, Ordering::Relaxed);
    }
}

impl DropObject for ForloopDrop {
    fn invokable_methods(&self) -> &[&str] {
        &[
            "name",
            "length",
            "index",
            "index0",
            "rindex",
            "rindex0",
            "first",
            "last",
            "parentloop",
        ]
    }

    fn call_method(&self, method: &str, _context: &Context) -> Result<Value> {
        let index0 = self.index0();
        Ok(match method {
            "name" => Value::from(self.name.as_str()),
            "length" => Value::from(self.length),
            "index" => Value::from(index0 + 1),
            "index0" => Value::from(index0),
            "rindex" => Value::from(self.length.saturating_sub(index0)),
            "rindex0" => Value::from(self.length.saturating_sub(index0 + 1)),
            "first" => Value::Bool(index0 == 0),
            "last" => Value::Bool(index0 + 1 == self.length),
            "parentloop" => self
                .parentloop
                .as_ref()
                .map_or(Value::Nil, |parent| Value::Drop(parent.clone())),
            _ => Value::Nil,
        })
    }
}

/// The `tablerowloop` object of a `tablerow` tag. Row and column are
/// derived from the item index.
#[derive(Debug)]
pub struct TablerowloopDrop {
    length: usize,
    cols: i64,
    index: AtomicUsize,
}

impl TablerowloopDrop {
    #[must_use]
    pub fn new(length: usize, cols: i64) -> Self {
        Self {
            length,
            cols,
            index: AtomicUsize::new(0),
        }
    }

    fn index0(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// One-based column. Without a positive column count rows never wrap.
    #[must_use]
    pub fn col(&self) -> usize {
        match usize::try_from(self.cols) {
            Ok(cols) if cols > 0 => self.index0() % cols + 1,
            _ => self.index0() + 1,
        }
    }

    /// One-based row.
    #[must_use]
    pub fn row(&self) -> usize {
        match usize::try_from(self.cols) {
            Ok(cols) if cols > 0 => self.index0() / cols + 1,
            _ => 1,
        }
    }

    #[must_use]
    pub fn col_last(&self) -> bool {
        i64::try_from(self.col()).is_ok_and(|col| col == self.cols)
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.index0() + 1 == self.length
    }

    pub fn increment(&self) {
        self.index.fetch_add(1, Ordering::Relaxed);
    }
}

impl DropObject for TablerowloopDrop {
    fn invokable_methods(&self) -> &[&str] {
        &[
            "length",
            "col",
            "col0",
            "col_first",
            "col_last",
            "index",
            "index0",
            "rindex",
            "rindex0",
            "first",
            "last",
            "row",
        ]
    }

    fn call_method(&self, method: &str, _context: &Context) -> Result<Value> {
        let index0 = self.index0();
        Ok(match method {
            "length" => Value::from(self.length),
            "col" => Value::from(self.col()),
            "col0" => Value::from(self.col() - 1),
            "col_first" => Value::Bool(self.col() == 1),
            "col_last" => Value::Bool(self.col_last()),
            "index" => Value::from(index0 + 1),
            "index0" => Value::from(index0),
            "rindex" => Value::from(self.length.saturating_sub(index0)),
            "rindex0" => Value::from(self.length.saturating_sub(index0 + 1)),
            "first" => Value::Bool(index0 == 0),
            "last" => Value::Bool(self.is_last()),
            "row" => Value::from(self.row()),
            _ => Value::Nil,
        })
    }
}
