//! Struct instances: load, dump, partial access, random field access and conversion.

use std::fmt;
use std::io::{Cursor, SeekFrom, Write};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::field::Field;
use crate::hooks::Context;
use crate::schema::Schema;
use crate::stream::{position, with_restored_position, ReadSeek};
use crate::value::{Value, Values};

/// One record of a [`Schema`]: the values that were set or loaded, nothing else.
/// Defaults, consts and computed values are resolved when asked for.
#[derive(Clone)]
pub struct Struct {
    schema: Arc<Schema>,
    values: Values,
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.schema.name());
        for (name, value) in &self.values {
            out.field(name, value);
        }
        out.finish()
    }
}

impl Struct {
    /// Fails with [`Error::UnexpectedValue`] listing every name the schema doesn't have.
    pub fn new(schema: &Arc<Schema>, values: Values) -> Result<Self> {
        let unknown = schema.unknown_names(values.keys());
        if !unknown.is_empty() {
            return Err(Error::UnexpectedValue {
                schema: schema.name().to_string(),
                names: unknown,
            });
        }
        let mut values = values;
        let ordered = schema
            .field_names()
            .filter_map(|name| values.shift_remove_entry(name))
            .collect();
        Ok(Struct {
            schema: Arc::clone(schema),
            values: ordered,
        })
    }

    pub fn empty(schema: &Arc<Schema>) -> Self {
        Struct {
            schema: Arc::clone(schema),
            values: Values::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Values that were explicitly set or loaded, in declaration order.
    pub fn defined(&self) -> &Values {
        &self.values
    }

    fn field(&self, name: &str) -> Result<&Field> {
        no_such_field(&self.schema, name)
    }

    /// The field's value: set or loaded, else its default, const or computed value.
    /// `Ok(None)` if the field isn't present.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let field = self.field(name)?;
        if let Some(v) = self.values.get(name) {
            return Ok(Some(v.clone()));
        }
        let resolved = self.resolve_whatever_possible(None)?;
        if let Some(v) = resolved.get(name) {
            return Ok(Some(v.clone()));
        }
        field.compute_value_for_dump(&resolved, None)
    }

    /// Assign a value. Const and computed fields refuse; field validators run first.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = no_such_field(&self.schema, name)?;
        if field.is_immutable() {
            return Err(Error::ImmutableField {
                field: name.to_string(),
            });
        }
        let value = value.into();
        field.run_validators(&value)?;
        self.values.insert(name.to_string(), value);
        self.sort_values();
        Ok(())
    }

    /// Forget an assigned value so the default or compute function applies again.
    pub fn unset(&mut self, name: &str) -> Result<Option<Value>> {
        self.field(name)?;
        Ok(self.values.shift_remove(name))
    }

    fn sort_values(&mut self) {
        let schema = Arc::clone(&self.schema);
        self.values
            .sort_by_cached_key(|name, _| schema.field(name).and_then(Field::index).unwrap_or(usize::MAX));
    }

    /// Every field that can be resolved right now, repeating until nothing more
    /// resolves so computed fields may depend on later computed fields. Fields whose
    /// value is still missing are left out instead of failing.
    fn resolve_whatever_possible(&self, ctx: Context<'_>) -> Result<Values> {
        let mut resolved = self.values.clone();
        loop {
            let mut progressed = false;
            for field in self.schema.fields() {
                let name = field.display_name();
                if resolved.contains_key(name) {
                    continue;
                }
                match field.compute_value_for_dump(&resolved, ctx) {
                    Ok(Some(value)) => {
                        resolved.insert(name.to_string(), value);
                        progressed = true;
                    }
                    Ok(None) => {}
                    Err(e) if e.is_unresolved() => {}
                    Err(e) => return Err(e),
                }
            }
            if !progressed {
                break;
            }
        }
        let schema = &self.schema;
        resolved.sort_by_cached_key(|name, _| schema.field(name).and_then(Field::index).unwrap_or(usize::MAX));
        Ok(resolved)
    }

    fn value_for(&self, field: &Field, resolved: &Values, ctx: Context<'_>) -> Result<Option<Value>> {
        match resolved.get(field.display_name()) {
            Some(v) => Ok(Some(v.clone())),
            None => field.compute_value_for_dump(resolved, ctx),
        }
    }

    /// Run field validators, validators registered on the schema, then struct validators.
    pub fn validate_contents(&self, ctx: Context<'_>) -> Result<()> {
        let resolved = self.resolve_whatever_possible(ctx)?;
        self.validate_resolved(&resolved, ctx)
    }

    fn validate_resolved(&self, resolved: &Values, ctx: Context<'_>) -> Result<()> {
        for field in self.schema.fields() {
            let Some(value) = self.value_for(field, resolved, ctx)? else { continue };
            field.run_validators(&value)?;
            for check in self.schema.validators_for(field.display_name()) {
                check
                    .validate(self, field, &value)
                    .map_err(|reason| Error::validation(field.name(), &value, reason))?;
            }
        }
        for check in self.schema.struct_validators() {
            check.validate(self).map_err(|reason| Error::Validation {
                field: None,
                value: None,
                reason,
            })?;
        }
        Ok(())
    }

    pub fn from_stream(schema: &Arc<Schema>, stream: &mut dyn ReadSeek, ctx: Context<'_>) -> Result<Self> {
        Struct::from_stream_with(schema, stream, ctx, Values::new())
    }

    /// Load a whole struct. Values in `init` win over what is read for the same field,
    /// though the bytes are still consumed.
    pub fn from_stream_with(schema: &Arc<Schema>, stream: &mut dyn ReadSeek, ctx: Context<'_>, init: Values) -> Result<Self> {
        let unknown = schema.unknown_names(init.keys());
        if !unknown.is_empty() {
            return Err(Error::UnexpectedValue {
                schema: schema.name().to_string(),
                names: unknown,
            });
        }
        let mut loaded = init;
        for field in schema.fields() {
            if let Some(value) = field.from_stream(stream, ctx, &loaded)? {
                loaded.entry(field.display_name().to_string()).or_insert(value);
            }
        }
        let mut instance = Struct::new(schema, loaded)?;
        instance.validate_contents(ctx)?;
        instance.strip_discarded();
        Ok(instance)
    }

    fn strip_discarded(&mut self) {
        let schema = Arc::clone(&self.schema);
        self.values
            .retain(|name, _| !schema.field(name).is_some_and(Field::is_discard));
    }

    /// Load from a buffer. With `exact`, unread trailing bytes are an error.
    pub fn from_bytes(schema: &Arc<Schema>, data: &[u8], exact: bool) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let loaded = Struct::from_stream(schema, &mut cursor, None)?;
        let consumed = cursor.position();
        if exact && consumed < data.len() as u64 {
            debug!(
                "{}: {} trailing byte(s) after {consumed}",
                schema.name(),
                data.len() as u64 - consumed
            );
            return Err(Error::ExtraneousData {
                consumed,
                available: data.len() as u64,
            });
        }
        Ok(loaded)
    }

    pub fn to_stream(&self, stream: &mut dyn Write, ctx: Context<'_>) -> Result<()> {
        let all = self.resolve_whatever_possible(ctx)?;
        self.validate_resolved(&all, ctx)?;
        for field in self.schema.fields() {
            let Some(value) = field.compute_value_for_dump(&all, ctx)? else { continue };
            field.to_stream(stream, Some(&value), ctx, &all)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        self.to_stream(&mut buf, None)?;
        Ok(buf)
    }

    /// Every field's value as a plain map, nested structs expanded. Discarded fields
    /// are left out unless `keep_discardable`.
    pub fn to_dict(&self, keep_discardable: bool) -> Result<Values> {
        let resolved = self.resolve_whatever_possible(None)?;
        let mut out = Values::new();
        for field in self.schema.fields() {
            if field.is_discard() && !keep_discardable {
                continue;
            }
            let Some(value) = self.value_for(field, &resolved, None)? else { continue };
            out.insert(field.display_name().to_string(), expand(value)?);
        }
        Ok(out)
    }

    /// Load fields up to and including `last_field`, or as many as the stream holds.
    ///
    /// Without `last_field`, the first field that runs out of input ends the load: the
    /// stream is put back where that field started and what was read so far is returned.
    /// Struct validators don't run.
    pub fn partial_load(schema: &Arc<Schema>, stream: &mut dyn ReadSeek, last_field: Option<&str>, ctx: Context<'_>) -> Result<Self> {
        if let Some(last) = last_field {
            no_such_field(schema, last)?;
        }
        let mut loaded = Values::new();
        for field in schema.fields() {
            let name = field.display_name();
            let start = position(stream)?;
            match field.from_stream(stream, ctx, &loaded) {
                Ok(Some(value)) => {
                    loaded.insert(name.to_string(), value);
                }
                Ok(None) => {}
                Err(e) if e.is_eof() && last_field.is_none() => {
                    debug!("{}: partial load stopped at {name} (offset {start})", schema.name());
                    stream.seek(SeekFrom::Start(start))?;
                    break;
                }
                Err(e) => return Err(e),
            }
            if last_field == Some(name) {
                break;
            }
        }
        let mut instance = Struct {
            schema: Arc::clone(schema),
            values: loaded,
        };
        instance.strip_discarded();
        Ok(instance)
    }

    /// Dump fields up to and including `last_field`. Without `last_field`, stop quietly
    /// at the first field that has no value.
    pub fn partial_dump(&self, stream: &mut dyn Write, last_field: Option<&str>, ctx: Context<'_>) -> Result<()> {
        if let Some(last) = last_field {
            self.field(last)?;
        }
        let all = self.resolve_whatever_possible(ctx)?;
        for field in self.schema.fields() {
            let name = field.display_name();
            match field.compute_value_for_dump(&all, ctx) {
                Ok(Some(value)) => field.to_stream(stream, Some(&value), ctx, &all)?,
                Ok(None) => {}
                Err(Error::MissingRequiredValue { .. }) if last_field.is_none() => return Ok(()),
                Err(e) => return Err(e),
            }
            if last_field == Some(name) {
                break;
            }
        }
        Ok(())
    }

    /// Read one field without loading the struct. The stream is left where it was.
    ///
    /// Fields at a fixed offset that don't depend on siblings are read directly;
    /// otherwise the struct is partially loaded up to the field, so errors from earlier
    /// fields can surface.
    pub fn get_field(schema: &Arc<Schema>, stream: &mut dyn ReadSeek, name: &str, ctx: Context<'_>) -> Result<Option<Value>> {
        let field = no_such_field(schema, name)?;
        if let Some(offset) = field.offset().filter(|_| !field.reads_siblings()) {
            return with_restored_position(stream, |s| {
                let base = position(s)?;
                s.seek(SeekFrom::Start(base + offset as u64))?;
                field.from_stream(s, ctx, &Values::new())
            });
        }
        debug!("{}: {name} can't be read on its own, loading up to it", schema.name());
        let partial = with_restored_position(stream, |s| Struct::partial_load(schema, s, Some(name), ctx))?;
        partial.get(name)
    }

    /// Size of the schema, if it doesn't depend on values.
    pub fn get_size(schema: &Arc<Schema>) -> Option<usize> {
        schema.size()
    }

    /// Size of this instance once dumped. Fields whose size can't be resolved from
    /// values are measured by dumping them.
    pub fn byte_len(&self) -> Result<usize> {
        let resolved = self.resolve_whatever_possible(None)?;
        let mut total = 0;
        for field in self.schema.fields() {
            if !field.is_present(&resolved, None)? {
                continue;
            }
            match field.expected_size(&resolved) {
                Ok(n) => total += n,
                Err(e) if e.is_unresolved() => {
                    let Some(value) = self.value_for(field, &resolved, None)? else { continue };
                    let mut buf: Vec<u8> = Vec::new();
                    field.to_stream(&mut buf, Some(&value), None, &resolved)?;
                    total += buf.len();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn plain(&self) -> Values {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_plain()))
            .collect()
    }
}

fn no_such_field<'a>(schema: &'a Schema, name: &str) -> Result<&'a Field> {
    schema.field(name).ok_or_else(|| Error::NoSuchField {
        schema: schema.name().to_string(),
        field: name.to_string(),
    })
}

fn expand(value: Value) -> Result<Value> {
    Ok(match value {
        Value::Struct(s) => Value::Map(s.to_dict(false)?),
        Value::List(items) => Value::List(items.into_iter().map(expand).collect::<Result<_>>()?),
        Value::Map(m) => Value::Map(
            m.into_iter()
                .map(|(k, v)| expand(v).map(|v| (k, v)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

/// Compares defined values only, nested structs expanded.
impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.plain() == other.plain()
    }
}

impl PartialEq<Values> for Struct {
    fn eq(&self, other: &Values) -> bool {
        let other: Values = other.iter().map(|(k, v)| (k.clone(), v.to_plain())).collect();
        self.plain() == other
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Struct {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}
