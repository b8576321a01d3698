//! `Field`: one named, typed slot in a struct.
//!
//! A field is built with a constructor for its type (`Field::uint16()`, `Field::bytes(4)`,
//! `Field::array(..)`...) plus chained modifiers, then handed to a
//! [`SchemaBuilder`](crate::schema::SchemaBuilder), which binds it to a name, an index and,
//! when every earlier field is fixed-size, a byte offset. Bound fields are shared by all
//! instances of the struct and never change afterwards.
//!
//! Fields can also be used on their own through [`Field::from_bytes`] / [`Field::to_bytes`].

use std::fmt;
use std::io::{Cursor, SeekFrom, Write};
use std::sync::Arc;

use log::trace;

use crate::codec::{Endian, Scalar, ScalarCodec, TextEncoding};
use crate::container::{ArrayField, Choice, Count, NestedField, UnionField};
use crate::error::{Error, Result};
use crate::hooks::{Compute, Context, DefaultFactory, FieldValidator, Presence};
use crate::schema::Schema;
use crate::stream::{position, read_exact, ReadSeek};
use crate::value::{Value, Values};
use crate::varint::VarIntEncoding;

/// How a field's byte size is determined.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Size {
    /// From the field type, its const value, or the value being dumped.
    #[default]
    Undefined,
    Fixed(usize),
    /// The value of an earlier sibling field.
    Field(String),
}

impl From<usize> for Size {
    fn from(n: usize) -> Self {
        Size::Fixed(n)
    }
}

impl From<&str> for Size {
    fn from(name: &str) -> Self {
        Size::Field(name.to_string())
    }
}

impl From<String> for Size {
    fn from(name: String) -> Self {
        Size::Field(name)
    }
}

#[derive(Clone)]
enum DefaultValue {
    Literal(Value),
    Factory(Arc<dyn DefaultFactory>),
}

/// How null is spelled on the wire.
#[derive(Debug, Clone)]
enum NullValue {
    Bytes(Vec<u8>),
    /// Encoded through the field itself, e.g. the string `"NULL"`.
    Value(Value),
    /// All zeros for the field's static size.
    Zeros,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(Scalar),
    Array(ArrayField),
    Nested(NestedField),
    Union(UnionField),
}

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    index: usize,
    offset: Option<usize>,
}

#[derive(Clone)]
pub struct Field {
    binding: Option<Binding>,
    kind: FieldKind,
    size: Size,
    const_value: Option<Value>,
    default: Option<DefaultValue>,
    null_value: Option<NullValue>,
    discard: bool,
    present: Option<Arc<dyn Presence>>,
    validators: Vec<Arc<dyn FieldValidator>>,
    compute: Option<Arc<dyn Compute>>,
    /// Declaration mistake found while chaining modifiers, reported on bind or first use.
    invalid: Option<String>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name())
            .field("index", &self.index())
            .field("offset", &self.offset())
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("const_value", &self.const_value)
            .field("discard", &self.discard)
            .field("computed", &self.compute.is_some())
            .finish_non_exhaustive()
    }
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Field {
            binding: None,
            kind,
            size: Size::Undefined,
            const_value: None,
            default: None,
            null_value: None,
            discard: false,
            present: None,
            validators: Vec::new(),
            compute: None,
            invalid: None,
        }
    }

    pub fn scalar(scalar: Scalar) -> Self {
        Field::new(FieldKind::Scalar(scalar))
    }

    /// Two's complement or unsigned integer `size` bytes wide (1..=8).
    pub fn integer(size: usize, signed: bool) -> Self {
        Field::scalar(Scalar::Integer {
            size,
            signed,
            endian: None,
        })
    }

    pub fn int8() -> Self {
        Field::integer(1, true)
    }

    pub fn int16() -> Self {
        Field::integer(2, true)
    }

    pub fn int32() -> Self {
        Field::integer(4, true)
    }

    pub fn int64() -> Self {
        Field::integer(8, true)
    }

    pub fn uint8() -> Self {
        Field::integer(1, false)
    }

    pub fn uint16() -> Self {
        Field::integer(2, false)
    }

    pub fn uint32() -> Self {
        Field::integer(4, false)
    }

    pub fn uint64() -> Self {
        Field::integer(8, false)
    }

    pub fn float32() -> Self {
        Field::scalar(Scalar::Float32 { endian: None })
    }

    pub fn float64() -> Self {
        Field::scalar(Scalar::Float64 { endian: None })
    }

    pub fn varint(encoding: VarIntEncoding) -> Self {
        Field::scalar(Scalar::VarInt {
            encoding,
            max_bytes: None,
        })
    }

    /// Variable-length integer that may not take more than `max_bytes` when dumped.
    pub fn varint_limited(encoding: VarIntEncoding, max_bytes: usize) -> Self {
        Field::scalar(Scalar::VarInt {
            encoding,
            max_bytes: Some(max_bytes),
        })
    }

    pub fn bytes(size: impl Into<Size>) -> Self {
        Field::scalar(Scalar::Bytes).size(size)
    }

    pub fn string(size: impl Into<Size>) -> Self {
        Field::scalar(Scalar::String {
            encoding: None,
            pad_byte: None,
        })
        .size(size)
    }

    pub fn stringz() -> Self {
        Field::scalar(Scalar::StringZ { encoding: None })
    }

    pub fn custom(codec: impl ScalarCodec + 'static) -> Self {
        Field::scalar(Scalar::Custom(Arc::new(codec)))
    }

    pub fn array(component: Field, count: impl Into<Count>) -> Self {
        Field::from(ArrayField::new(component, count))
    }

    pub fn nested(schema: &Arc<Schema>) -> Self {
        Field::new(FieldKind::Nested(NestedField::new(schema)))
    }

    /// Union over `choices`; fails if there are none.
    pub fn union<L, D>(choices: Vec<Choice>, load_decider: L, dump_decider: D) -> Result<Self>
    where
        L: Fn(&mut dyn ReadSeek, &[Choice], Context<'_>, &Values) -> Result<usize> + Send + Sync + 'static,
        D: Fn(&Value, &[Choice], Context<'_>, &Values) -> Result<usize> + Send + Sync + 'static,
    {
        UnionField::new(choices, Arc::new(load_decider), Arc::new(dump_decider)).map(Field::from)
    }

    pub fn size(mut self, size: impl Into<Size>) -> Self {
        self.size = size.into();
        if let (Size::Fixed(n), Some(width)) = (&self.size, self.as_scalar().and_then(|s| s.static_size())) {
            if *n != width {
                self.invalid = Some(format!("size {n} conflicts with the type's width of {width}"));
            }
        }
        self
    }

    /// Byte order for this field, overriding the struct's. Applies to array elements too.
    pub fn endian(mut self, endian: Endian) -> Self {
        self.kind.for_each_scalar(&mut |s: &mut Scalar| s.set_endian(endian));
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.kind.for_each_scalar(&mut |s: &mut Scalar| s.set_encoding(encoding));
        self
    }

    /// Pad short strings with `byte` instead of rejecting them.
    pub fn pad_byte(mut self, byte: u8) -> Self {
        let accepted = match &mut self.kind {
            FieldKind::Scalar(s) => s.set_pad_byte(byte),
            _ => false,
        };
        if !accepted {
            self.invalid = Some("`pad_byte` only applies to fixed-size strings".to_string());
        }
        self
    }

    /// Fixed value, checked on load and dump; also the default.
    pub fn const_value(mut self, value: impl Into<Value>) -> Self {
        self.const_value = Some(value.into());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Factory(Arc::new(factory)));
        self
    }

    /// Drop this field's value from load results. It stays visible to later fields while loading.
    pub fn discard(mut self) -> Self {
        self.discard = true;
        self
    }

    /// Bytes (or a value encoded by this field) that stand for null.
    pub fn null_value(mut self, value: impl Into<Value>) -> Self {
        self.null_value = Some(match value.into() {
            Value::Bytes(b) => NullValue::Bytes(b),
            other => NullValue::Value(other),
        });
        self
    }

    /// Null is a run of zero bytes as long as the field.
    pub fn null_zeros(mut self) -> Self {
        self.null_value = Some(NullValue::Zeros);
        self
    }

    pub fn present(mut self, predicate: impl Fn(&Values, Context<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.present = Some(Arc::new(predicate));
        self
    }

    /// Presence decided by an object, which may also peek at the stream while loading.
    pub fn present_with(mut self, predicate: impl Presence + 'static) -> Self {
        self.present = Some(Arc::new(predicate));
        self
    }

    pub fn validate(mut self, check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.validators.push(Arc::new(check));
        self
    }

    pub fn validate_with(mut self, check: impl FieldValidator + 'static) -> Self {
        self.validators.push(Arc::new(check));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.name.as_str())
    }

    pub fn index(&self) -> Option<usize> {
        self.binding.as_ref().map(|b| b.index)
    }

    /// Byte offset from the start of the struct, if every earlier field is fixed-size.
    pub fn offset(&self) -> Option<usize> {
        self.binding.as_ref().and_then(|b| b.offset)
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn size_spec(&self) -> &Size {
        &self.size
    }

    pub fn const_val(&self) -> Option<&Value> {
        self.const_value.as_ref()
    }

    pub fn is_discard(&self) -> bool {
        self.discard
    }

    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    /// Const and computed fields can't be assigned on a struct.
    pub fn is_immutable(&self) -> bool {
        self.const_value.is_some() || self.compute.is_some()
    }

    /// No const, default or compute function to fall back on.
    pub fn required(&self) -> bool {
        self.const_value.is_none() && self.default.is_none() && self.compute.is_none()
    }

    pub fn allow_null(&self) -> bool {
        self.null_value.is_some()
    }

    pub fn has_fixed_size(&self) -> bool {
        self.static_size().is_some()
    }

    pub fn as_array(&self) -> Option<&ArrayField> {
        match &self.kind {
            FieldKind::Array(a) => Some(a),
            _ => None,
        }
    }

    fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            FieldKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name().unwrap_or("<unbound field>")
    }

    pub(crate) fn bind(&mut self, name: &str, index: usize, offset: Option<usize>) -> Result<()> {
        if let Some(existing) = &self.binding {
            return Err(Error::config(format!(
                "field {:?} is already bound and can't be rebound as {name:?}",
                existing.name
            )));
        }
        self.binding = Some(Binding {
            name: name.to_string(),
            index,
            offset,
        });
        Ok(())
    }

    pub(crate) fn set_compute(&mut self, compute: Arc<dyn Compute>) -> Result<()> {
        if self.const_value.is_some() {
            return Err(Error::config(format!(
                "can't set a compute function for const field {:?}",
                self.display_name()
            )));
        }
        if self.compute.is_some() {
            return Err(Error::config(format!(
                "field {:?} already has a compute function",
                self.display_name()
            )));
        }
        self.compute = Some(compute);
        Ok(())
    }

    /// Fill in byte order and text encoding wherever the field left them open.
    pub(crate) fn apply_options(&mut self, endian: Endian, encoding: TextEncoding) {
        self.kind
            .for_each_scalar(&mut |s: &mut Scalar| s.apply_defaults(endian, encoding));
    }

    /// Report declaration mistakes, including those of array elements and union choices.
    pub(crate) fn check_config(&self) -> Result<()> {
        if let Some(message) = &self.invalid {
            return Err(Error::config(format!("{}: {message}", self.display_name())));
        }
        match &self.kind {
            FieldKind::Scalar(Scalar::Integer { size, .. }) if !(1..=8).contains(size) => Err(Error::config(format!(
                "{}: integer width must be 1 to 8 bytes, got {size}",
                self.display_name()
            ))),
            FieldKind::Array(a) => a.component().check_config(),
            FieldKind::Union(u) => u.choices().iter().try_for_each(|c| match c {
                Choice::Field(f) => f.check_config(),
                Choice::Struct(_) => Ok(()),
            }),
            _ => Ok(()),
        }
    }

    /// Names of sibling fields this field's size or count depends on.
    pub(crate) fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        if let Size::Field(name) = &self.size {
            refs.push(name.as_str());
        }
        if let FieldKind::Array(a) = &self.kind {
            if let Count::Field(name) = a.count() {
                refs.push(name.as_str());
            }
            refs.extend(a.component().references());
        }
        refs
    }

    pub fn has_presence(&self) -> bool {
        self.present.is_some()
    }

    /// Whether loading consults sibling values: a size or count reference, a presence
    /// predicate, a custom halt check or a union decider.
    pub(crate) fn reads_siblings(&self) -> bool {
        if self.present.is_some() || matches!(self.size, Size::Field(_)) {
            return true;
        }
        match &self.kind {
            FieldKind::Scalar(_) | FieldKind::Nested(_) => false,
            FieldKind::Array(a) => {
                matches!(a.count(), Count::Field(_)) || a.has_halt_check() || a.component().reads_siblings()
            }
            FieldKind::Union(_) => true,
        }
    }

    /// Byte size known without any values, if there is one.
    pub fn static_size(&self) -> Option<usize> {
        match &self.size {
            Size::Fixed(_) if self.size_is_limit() => return None,
            Size::Fixed(n) => return Some(*n),
            Size::Field(_) => return None,
            Size::Undefined => {}
        }
        match &self.kind {
            FieldKind::Scalar(s) => s
                .static_size()
                .or_else(|| self.const_value.as_ref().and_then(|c| s.encoded_size(c))),
            FieldKind::Array(a) => a.static_size(),
            FieldKind::Nested(n) => n.schema().size(),
            FieldKind::Union(_) => None,
        }
    }

    /// A null-terminated string's size is an upper bound, not its width.
    fn size_is_limit(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar(Scalar::StringZ { .. }))
    }

    /// Byte size this field would take when dumping `value`, if derivable without writing.
    pub fn size_for_value(&self, value: &Value) -> Option<usize> {
        if let Some(n) = self.static_size() {
            return Some(n);
        }
        if value.is_null() {
            return self.null_bytes().ok().map(|b| b.len());
        }
        match &self.kind {
            FieldKind::Scalar(s) => s.encoded_size(value),
            FieldKind::Array(a) => a.size_for_value(value),
            FieldKind::Nested(n) => n.size_for_value(value),
            FieldKind::Union(_) => None,
        }
    }

    /// Resolve the byte size against sibling values: a literal size, then the size of a
    /// referenced field, then the size of this field's own value or default.
    pub fn expected_size(&self, values: &Values) -> Result<usize> {
        if let Some(n) = self.static_size() {
            return Ok(n);
        }
        if let Size::Field(reference) = &self.size {
            let value = values.get(reference).ok_or_else(|| Error::MissingRequiredValue {
                field: reference.clone(),
            })?;
            return self.size_from_reference(reference, value);
        }
        let own = self
            .name()
            .and_then(|name| values.get(name).cloned())
            .or_else(|| self.default_value());
        if let Some(n) = own.as_ref().and_then(|v| self.size_for_value(v)) {
            return Ok(n);
        }
        if let FieldKind::Array(a) = &self.kind {
            if let Some(n) = a.size_from_count(values) {
                return Ok(n);
            }
        }
        Err(Error::UndefinedSize {
            field: self.display_name().to_string(),
        })
    }

    fn size_from_reference(&self, reference: &str, value: &Value) -> Result<usize> {
        value.as_usize().ok_or_else(|| Error::Validation {
            field: self.name().map(str::to_string),
            value: Some(value.clone()),
            reason: format!("size reference {reference:?} doesn't hold a byte count"),
        })
    }

    fn load_size(&self, loaded: &Values) -> Result<Option<usize>> {
        match &self.size {
            Size::Fixed(n) => Ok(Some(*n)),
            Size::Field(reference) => {
                let value = loaded.get(reference).ok_or_else(|| Error::FieldReference {
                    field: self.name().map(str::to_string),
                    reference: reference.clone(),
                })?;
                self.size_from_reference(reference, value).map(Some)
            }
            Size::Undefined => Ok(self.static_size()),
        }
    }

    fn dump_size(&self, all: &Values) -> Result<Option<usize>> {
        match &self.size {
            Size::Fixed(n) => Ok(Some(*n)),
            Size::Field(reference) => {
                let value = all.get(reference).ok_or_else(|| Error::MissingRequiredValue {
                    field: reference.clone(),
                })?;
                self.size_from_reference(reference, value).map(Some)
            }
            Size::Undefined => Ok(self.static_size()),
        }
    }

    /// The const, the literal default, or a fresh value from the default factory.
    pub fn default_value(&self) -> Option<Value> {
        if let Some(c) = &self.const_value {
            return Some(c.clone());
        }
        match &self.default {
            Some(DefaultValue::Literal(v)) => Some(v.clone()),
            Some(DefaultValue::Factory(f)) => Some(f.produce()),
            None => None,
        }
    }

    fn null_bytes(&self) -> Result<Vec<u8>> {
        match &self.null_value {
            Some(NullValue::Bytes(b)) => Ok(b.clone()),
            Some(NullValue::Value(v)) => match &self.kind {
                FieldKind::Scalar(s) => s.encode(v, self.static_size()),
                _ => Err(Error::unserializable(
                    self.name(),
                    "only scalar fields can spell null as a value",
                )),
            },
            Some(NullValue::Zeros) => self.static_size().map(|n| vec![0u8; n]).ok_or_else(|| {
                Error::unserializable(self.name(), "zero-filled null needs a fixed-size field")
            }),
            None => Err(Error::unserializable(self.name(), "null isn't allowed for this field")),
        }
    }

    pub(crate) fn is_present(&self, values: &Values, ctx: Context<'_>) -> Result<bool> {
        match &self.present {
            Some(p) => p.is_present(values, ctx, None),
            None => Ok(true),
        }
    }

    fn check_const(&self, value: &Value) -> Result<()> {
        match &self.const_value {
            Some(c) if c != value => Err(Error::validation(
                self.name(),
                value,
                format!("expected const {}, got {}", c.describe(), value.describe()),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn run_validators(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        for check in &self.validators {
            check
                .validate(value)
                .map_err(|reason| Error::validation(self.name(), value, reason))?;
        }
        Ok(())
    }

    /// Load this field. `Ok(None)` means the field's presence predicate said no and
    /// nothing was consumed.
    pub fn from_stream(&self, stream: &mut dyn ReadSeek, ctx: Context<'_>, loaded: &Values) -> Result<Option<Value>> {
        self.check_config()?;
        if let Some(p) = &self.present {
            if !p.is_present(loaded, ctx, Some(&mut *stream))? {
                trace!("{} not present", self.display_name());
                return Ok(None);
            }
        }
        let start = position(stream)?;

        if self.null_value.is_some() {
            if let Some(null) = self.null_bytes().ok().filter(|null| self.null_fits(null, loaded)) {
                let matched = match read_exact(stream, null.len()) {
                    Ok(bytes) => bytes == null,
                    Err(e) if e.is_eof() => false,
                    Err(e) => return Err(e),
                };
                if matched {
                    trace!("{} is null at offset {start}", self.display_name());
                    return Ok(Some(Value::Null));
                }
                stream.seek(SeekFrom::Start(start))?;
            }
        }

        let value = self
            .load_value(stream, ctx, loaded)
            .map_err(|e| e.with_field(self.name()))?;
        trace!(
            "loaded {} at offset {start} ({} bytes)",
            self.display_name(),
            position(stream)?.saturating_sub(start)
        );
        self.check_const(&value)?;
        self.run_validators(&value)?;
        Ok(Some(value))
    }

    /// A null spelling can only match when it is exactly as wide as the field. Fields
    /// without a known width (null-terminated strings, varints) compare a prefix.
    fn null_fits(&self, null: &[u8], loaded: &Values) -> bool {
        let width = match &self.kind {
            _ if self.size_is_limit() => None,
            FieldKind::Scalar(_) => self.load_size(loaded).ok().flatten(),
            _ => self.static_size(),
        };
        width.map_or(true, |n| n == null.len())
    }

    fn load_value(&self, stream: &mut dyn ReadSeek, ctx: Context<'_>, loaded: &Values) -> Result<Value> {
        match &self.kind {
            FieldKind::Scalar(s) => {
                let size = self.load_size(loaded)?;
                if size.is_none() && s.needs_size() {
                    return Err(Error::UndefinedSize {
                        field: self.display_name().to_string(),
                    });
                }
                s.decode(stream, size)
            }
            FieldKind::Array(a) => a.load(stream, ctx, loaded).map(Value::List),
            FieldKind::Nested(n) => n.load(stream, ctx),
            FieldKind::Union(u) => u.load(stream, ctx, loaded),
        }
    }

    /// Dump `value`, or this field's default when `value` is `None`.
    pub fn to_stream(&self, stream: &mut dyn Write, value: Option<&Value>, ctx: Context<'_>, all: &Values) -> Result<()> {
        self.check_config()?;
        let fallback;
        let value = match value {
            Some(v) => v,
            None => {
                fallback = self.default_value().ok_or_else(|| Error::MissingRequiredValue {
                    field: self.display_name().to_string(),
                })?;
                &fallback
            }
        };

        if value.is_null() {
            let bytes = self.null_bytes()?;
            trace!("dump {} as null ({} bytes)", self.display_name(), bytes.len());
            stream.write_all(&bytes)?;
            return Ok(());
        }

        self.check_const(value)?;
        self.run_validators(value)?;
        self.dump_value(stream, value, ctx, all)
            .map_err(|e| e.with_field(self.name()))
    }

    fn dump_value(&self, stream: &mut dyn Write, value: &Value, ctx: Context<'_>, all: &Values) -> Result<()> {
        match &self.kind {
            FieldKind::Scalar(s) => {
                let size = self.dump_size(all)?;
                if size.is_none() && matches!(s, Scalar::String { .. }) {
                    return Err(Error::UndefinedSize {
                        field: self.display_name().to_string(),
                    });
                }
                let bytes = s.encode(value, size)?;
                trace!("dump {} ({} bytes)", self.display_name(), bytes.len());
                stream.write_all(&bytes)?;
                Ok(())
            }
            FieldKind::Array(a) => a.dump(stream, value, ctx, all),
            FieldKind::Nested(n) => n.dump(stream, value, ctx),
            FieldKind::Union(u) => u.dump(stream, value, ctx, all),
        }
    }

    /// The value this field would be dumped with: `Ok(None)` if not present, else the
    /// assigned value, the default, or the compute function's result.
    pub fn compute_value_for_dump(&self, all: &Values, ctx: Context<'_>) -> Result<Option<Value>> {
        if !self.is_present(all, ctx)? {
            return Ok(None);
        }
        if let Some(v) = self.name().and_then(|name| all.get(name)) {
            return Ok(Some(v.clone()));
        }
        if let Some(v) = self.default_value() {
            return Ok(Some(v));
        }
        if let Some(compute) = &self.compute {
            return compute.compute(all).map(Some);
        }
        Err(Error::MissingRequiredValue {
            field: self.display_name().to_string(),
        })
    }

    /// Load a single value from `data`. A field whose presence predicate says no loads as
    /// `Value::Null`. With `exact`, bytes left over are an error.
    pub fn from_bytes(&self, data: &[u8], exact: bool) -> Result<Value> {
        let mut cursor = Cursor::new(data);
        let value = self.from_stream(&mut cursor, None, &Values::new())?;
        let consumed = cursor.position();
        if exact && consumed < data.len() as u64 {
            return Err(Error::ExtraneousData {
                consumed,
                available: data.len() as u64,
            });
        }
        Ok(value.unwrap_or(Value::Null))
    }

    pub fn to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        self.to_stream(&mut buf, Some(value), None, &Values::new())?;
        Ok(buf)
    }

    pub fn load(&self, stream: &mut dyn ReadSeek) -> Result<Value> {
        Ok(self.from_stream(stream, None, &Values::new())?.unwrap_or(Value::Null))
    }

    pub fn loads(&self, data: &[u8], exact: bool) -> Result<Value> {
        self.from_bytes(data, exact)
    }

    pub fn dump(&self, stream: &mut dyn Write, value: &Value) -> Result<()> {
        self.to_stream(stream, Some(value), None, &Values::new())
    }

    pub fn dumps(&self, value: &Value) -> Result<Vec<u8>> {
        self.to_bytes(value)
    }
}

impl FieldKind {
    /// Visit the scalar codecs that option resolution should reach: this field's own,
    /// array elements', and union field choices'. Nested structs keep their own options.
    fn for_each_scalar(&mut self, f: &mut dyn FnMut(&mut Scalar)) {
        match self {
            FieldKind::Scalar(s) => f(s),
            FieldKind::Array(a) => a.component_mut().kind.for_each_scalar(f),
            FieldKind::Union(u) => {
                for choice in u.choices_mut() {
                    if let Choice::Field(field) = choice {
                        field.kind.for_each_scalar(f);
                    }
                }
            }
            FieldKind::Nested(_) => {}
        }
    }
}

impl From<ArrayField> for Field {
    fn from(array: ArrayField) -> Self {
        Field::new(FieldKind::Array(array))
    }
}

impl From<UnionField> for Field {
    fn from(union: UnionField) -> Self {
        Field::new(FieldKind::Union(union))
    }
}

impl From<Scalar> for Field {
    fn from(scalar: Scalar) -> Self {
        Field::scalar(scalar)
    }
}
