//! User-supplied callables, one trait per call site.
//!
//! Each trait has a blanket impl for closures of the matching signature, so builder
//! methods accept either a plain closure or a stateful object implementing the trait.

use std::any::Any;

use crate::container::{ArrayField, Choice};
use crate::error::Result;
use crate::field::Field;
use crate::stream::ReadSeek;
use crate::structure::Struct;
use crate::value::{Value, Values};

/// Opaque caller data threaded through every load/dump call.
pub type Context<'a> = Option<&'a dyn Any>;

/// Decides whether a field takes part in a load or dump.
///
/// `stream` is positioned where the field would start on load, and is `None` on dump.
pub trait Presence: Send + Sync {
    fn is_present(&self, values: &Values, ctx: Context<'_>, stream: Option<&mut dyn ReadSeek>) -> Result<bool>;
}

impl<F> Presence for F
where
    F: Fn(&Values, Context<'_>) -> bool + Send + Sync,
{
    fn is_present(&self, values: &Values, ctx: Context<'_>, _stream: Option<&mut dyn ReadSeek>) -> Result<bool> {
        Ok(self(values, ctx))
    }
}

/// Derives a field's dump value from its siblings.
pub trait Compute: Send + Sync {
    fn compute(&self, values: &Values) -> Result<Value>;
}

impl<F> Compute for F
where
    F: Fn(&Values) -> Result<Value> + Send + Sync,
{
    fn compute(&self, values: &Values) -> Result<Value> {
        self(values)
    }
}

/// Produces a fresh default each time one is needed.
pub trait DefaultFactory: Send + Sync {
    fn produce(&self) -> Value;
}

impl<F> DefaultFactory for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn produce(&self) -> Value {
        self()
    }
}

/// Checks one field value. `Err` carries the reason.
pub trait FieldValidator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), String>;
}

impl<F> FieldValidator for F
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), String> {
        self(value)
    }
}

/// Validator registered on a schema for named fields; sees the whole struct.
pub trait MethodValidator: Send + Sync {
    fn validate(&self, record: &Struct, field: &Field, value: &Value) -> Result<(), String>;
}

impl<F> MethodValidator for F
where
    F: Fn(&Struct, &Field, &Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, record: &Struct, field: &Field, value: &Value) -> Result<(), String> {
        self(record, field, value)
    }
}

pub trait StructValidator: Send + Sync {
    fn validate(&self, record: &Struct) -> Result<(), String>;
}

impl<F> StructValidator for F
where
    F: Fn(&Struct) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, record: &Struct) -> Result<(), String> {
        self(record)
    }
}

/// Called before each array element is read; `true` stops the array.
///
/// `items` may be modified, e.g. to drop a sentinel element before halting.
pub trait HaltCheck: Send + Sync {
    fn should_halt(
        &self,
        array: &ArrayField,
        stream: &mut dyn ReadSeek,
        items: &mut Vec<Value>,
        ctx: Context<'_>,
        loaded: &Values,
    ) -> Result<bool>;
}

impl<F> HaltCheck for F
where
    F: Fn(&ArrayField, &mut dyn ReadSeek, &mut Vec<Value>, Context<'_>, &Values) -> Result<bool> + Send + Sync,
{
    fn should_halt(
        &self,
        array: &ArrayField,
        stream: &mut dyn ReadSeek,
        items: &mut Vec<Value>,
        ctx: Context<'_>,
        loaded: &Values,
    ) -> Result<bool> {
        self(array, stream, items, ctx, loaded)
    }
}

/// Picks the union alternative to load; returns an index into `choices`.
pub trait LoadDecider: Send + Sync {
    fn decide(&self, stream: &mut dyn ReadSeek, choices: &[Choice], ctx: Context<'_>, loaded: &Values) -> Result<usize>;
}

impl<F> LoadDecider for F
where
    F: Fn(&mut dyn ReadSeek, &[Choice], Context<'_>, &Values) -> Result<usize> + Send + Sync,
{
    fn decide(&self, stream: &mut dyn ReadSeek, choices: &[Choice], ctx: Context<'_>, loaded: &Values) -> Result<usize> {
        self(stream, choices, ctx, loaded)
    }
}

/// Picks the union alternative to dump `value` with; returns an index into `choices`.
pub trait DumpDecider: Send + Sync {
    fn decide(&self, value: &Value, choices: &[Choice], ctx: Context<'_>, all: &Values) -> Result<usize>;
}

impl<F> DumpDecider for F
where
    F: Fn(&Value, &[Choice], Context<'_>, &Values) -> Result<usize> + Send + Sync,
{
    fn decide(&self, value: &Value, choices: &[Choice], ctx: Context<'_>, all: &Values) -> Result<usize> {
        self(value, choices, ctx, all)
    }
}
