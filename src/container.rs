//! Fields that hold other fields: arrays, nested structs and unions.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use log::trace;

use crate::error::{Error, Result};
use crate::field::Field;
use crate::hooks::{Context, DumpDecider, HaltCheck, LoadDecider};
use crate::schema::Schema;
use crate::stream::{at_eof, position, ReadSeek};
use crate::structure::Struct;
use crate::value::{Value, Values};

/// Number of elements in an array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Count {
    /// Read until the halt check says stop; by default, until end of stream.
    #[default]
    Unbounded,
    Fixed(usize),
    /// The value of an earlier sibling field.
    Field(String),
}

impl From<usize> for Count {
    fn from(n: usize) -> Self {
        Count::Fixed(n)
    }
}

impl From<&str> for Count {
    fn from(name: &str) -> Self {
        Count::Field(name.to_string())
    }
}

impl From<String> for Count {
    fn from(name: String) -> Self {
        Count::Field(name)
    }
}

/// A sequence of values of one component field.
#[derive(Clone)]
pub struct ArrayField {
    component: Box<Field>,
    count: Count,
    halt_check: Option<Arc<dyn HaltCheck>>,
}

impl fmt::Debug for ArrayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayField")
            .field("component", &self.component)
            .field("count", &self.count)
            .field("custom_halt", &self.halt_check.is_some())
            .finish()
    }
}

impl ArrayField {
    pub fn new(component: Field, count: impl Into<Count>) -> Self {
        ArrayField {
            component: Box::new(component),
            count: count.into(),
            halt_check: None,
        }
    }

    /// Replace the default halting rule.
    pub fn halt_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ArrayField, &mut dyn ReadSeek, &mut Vec<Value>, Context<'_>, &Values) -> Result<bool>
            + Send
            + Sync
            + 'static,
    {
        self.halt_check = Some(Arc::new(check));
        self
    }

    pub fn halt_check_with(mut self, check: impl HaltCheck + 'static) -> Self {
        self.halt_check = Some(Arc::new(check));
        self
    }

    pub fn component(&self) -> &Field {
        &self.component
    }

    pub(crate) fn component_mut(&mut self) -> &mut Field {
        &mut self.component
    }

    pub fn count(&self) -> &Count {
        &self.count
    }

    pub(crate) fn has_halt_check(&self) -> bool {
        self.halt_check.is_some()
    }

    pub(crate) fn static_size(&self) -> Option<usize> {
        match self.count {
            Count::Fixed(n) => self.component.static_size().map(|size| size * n),
            _ => None,
        }
    }

    pub(crate) fn size_for_value(&self, value: &Value) -> Option<usize> {
        value
            .as_list()?
            .iter()
            .map(|item| self.component.size_for_value(item))
            .sum()
    }

    /// Size implied by a count field and a fixed-size component.
    pub(crate) fn size_from_count(&self, values: &Values) -> Option<usize> {
        let Count::Field(name) = &self.count else { return None };
        let n = values.get(name)?.as_usize()?;
        self.component.static_size().map(|size| size * n)
    }

    fn count_from(&self, reference: &str, value: &Value) -> Result<usize> {
        value.as_usize().ok_or_else(|| Error::Validation {
            field: None,
            value: Some(value.clone()),
            reason: format!("count reference {reference:?} doesn't hold an element count"),
        })
    }

    /// Default halting rule: stop at the literal count, at the count held by the
    /// referenced field, or at end of stream when there is no count.
    pub fn default_should_halt(&self, stream: &mut dyn ReadSeek, items: &[Value], loaded: &Values) -> Result<bool> {
        match &self.count {
            Count::Fixed(n) => Ok(items.len() >= *n),
            Count::Field(name) => {
                let value = loaded.get(name).ok_or_else(|| Error::FieldReference {
                    field: None,
                    reference: name.clone(),
                })?;
                Ok(items.len() >= self.count_from(name, value)?)
            }
            Count::Unbounded => at_eof(stream),
        }
    }

    pub(crate) fn load(&self, stream: &mut dyn ReadSeek, ctx: Context<'_>, loaded: &Values) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            let halt = match &self.halt_check {
                Some(check) => check.should_halt(self, stream, &mut items, ctx, loaded)?,
                None => self.default_should_halt(stream, &items, loaded)?,
            };
            if halt {
                break;
            }
            let start = position(stream)?;
            let item = self.component.from_stream(stream, ctx, loaded)?;
            let consumed = position(stream)? > start;
            let appended = item.is_some();
            if let Some(v) = item {
                items.push(v);
            }
            // Nothing consumed means the next round would see the same input.
            if !consumed && (!appended || self.count == Count::Unbounded) {
                trace!("array stopped after {} element(s) without progress", items.len());
                break;
            }
        }
        Ok(items)
    }

    /// Expected element count for a dump, if the array has one.
    pub fn expected_count(&self, all: &Values) -> Result<Option<usize>> {
        match &self.count {
            Count::Fixed(n) => Ok(Some(*n)),
            Count::Field(name) => {
                let value = all
                    .get(name)
                    .ok_or_else(|| Error::MissingRequiredValue { field: name.clone() })?;
                self.count_from(name, value).map(Some)
            }
            Count::Unbounded => Ok(None),
        }
    }

    pub(crate) fn dump(&self, stream: &mut dyn Write, value: &Value, ctx: Context<'_>, all: &Values) -> Result<()> {
        let items = value
            .as_list()
            .ok_or_else(|| Error::unserializable(None, format!("expected a list, got {}", value.describe())))?;
        if let Some(expected) = self.expected_count(all)? {
            if expected != items.len() {
                return Err(Error::ArraySize {
                    field: None,
                    expected,
                    given: items.len(),
                });
            }
        }
        for item in items {
            self.component.to_stream(stream, Some(item), ctx, all)?;
        }
        Ok(())
    }

    /// Dump elements from an iterator of unknown length, checking the count as they come.
    pub fn dump_iter<I>(&self, stream: &mut dyn Write, items: I, ctx: Context<'_>, all: &Values) -> Result<()>
    where
        I: IntoIterator<Item = Value>,
    {
        let expected = self.expected_count(all)?;
        let mut written = 0usize;
        for item in items {
            if let Some(expected) = expected {
                if written == expected {
                    return Err(Error::ArraySize {
                        field: None,
                        expected,
                        given: written + 1,
                    });
                }
            }
            self.component.to_stream(stream, Some(&item), ctx, all)?;
            written += 1;
        }
        match expected {
            Some(expected) if written < expected => Err(Error::ArraySize {
                field: None,
                expected,
                given: written,
            }),
            _ => Ok(()),
        }
    }
}

/// An entire struct embedded as one field.
#[derive(Debug, Clone)]
pub struct NestedField {
    schema: Arc<Schema>,
}

impl NestedField {
    pub fn new(schema: &Arc<Schema>) -> Self {
        NestedField {
            schema: Arc::clone(schema),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn load(&self, stream: &mut dyn ReadSeek, ctx: Context<'_>) -> Result<Value> {
        Struct::from_stream(&self.schema, stream, ctx).map(Value::from)
    }

    pub(crate) fn dump(&self, stream: &mut dyn Write, value: &Value, ctx: Context<'_>) -> Result<()> {
        coerce_struct(&self.schema, value)?.to_stream(stream, ctx)
    }

    pub(crate) fn size_for_value(&self, value: &Value) -> Option<usize> {
        self.schema
            .size()
            .or_else(|| coerce_struct(&self.schema, value).ok()?.byte_len().ok())
    }
}

/// Accept a struct of `schema`, a struct of another schema, or a plain map.
fn coerce_struct<'a>(schema: &Arc<Schema>, value: &'a Value) -> Result<Cow<'a, Struct>> {
    match value {
        Value::Struct(s) if Arc::ptr_eq(s.schema(), schema) => Ok(Cow::Borrowed(s.as_ref())),
        Value::Struct(s) => Struct::new(schema, s.defined().clone()).map(Cow::Owned),
        Value::Map(m) => Struct::new(schema, m.clone()).map(Cow::Owned),
        other => Err(Error::unserializable(
            None,
            format!("can't dump {} as struct {}", other.describe(), schema.name()),
        )),
    }
}

/// One union alternative.
#[derive(Debug, Clone)]
pub enum Choice {
    Field(Field),
    Struct(Arc<Schema>),
}

/// One of several fields or structs, picked per call by the deciders.
#[derive(Clone)]
pub struct UnionField {
    choices: Vec<Choice>,
    load_decider: Arc<dyn LoadDecider>,
    dump_decider: Arc<dyn DumpDecider>,
}

impl fmt::Debug for UnionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionField")
            .field("choices", &self.choices)
            .finish_non_exhaustive()
    }
}

impl UnionField {
    pub fn new(choices: Vec<Choice>, load_decider: Arc<dyn LoadDecider>, dump_decider: Arc<dyn DumpDecider>) -> Result<Self> {
        if choices.is_empty() {
            return Err(Error::config("a union needs at least one choice"));
        }
        Ok(UnionField {
            choices,
            load_decider,
            dump_decider,
        })
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub(crate) fn choices_mut(&mut self) -> &mut [Choice] {
        &mut self.choices
    }

    fn choice(&self, index: usize) -> Result<&Choice> {
        self.choices.get(index).ok_or_else(|| {
            Error::config(format!(
                "union decider picked choice {index}, but there are only {}",
                self.choices.len()
            ))
        })
    }

    pub(crate) fn load(&self, stream: &mut dyn ReadSeek, ctx: Context<'_>, loaded: &Values) -> Result<Value> {
        let index = self.load_decider.decide(stream, &self.choices, ctx, loaded)?;
        match self.choice(index)? {
            Choice::Field(field) => Ok(field.from_stream(stream, ctx, loaded)?.unwrap_or(Value::Null)),
            Choice::Struct(schema) => Struct::from_stream(schema, stream, ctx).map(Value::from),
        }
    }

    pub(crate) fn dump(&self, stream: &mut dyn Write, value: &Value, ctx: Context<'_>, all: &Values) -> Result<()> {
        let index = self.dump_decider.decide(value, &self.choices, ctx, all)?;
        match self.choice(index)? {
            Choice::Field(field) => field.to_stream(stream, Some(value), ctx, all),
            Choice::Struct(schema) => coerce_struct(schema, value)?.to_stream(stream, ctx),
        }
    }
}
