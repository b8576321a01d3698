//! # binform: declarative binary record layouts
//!
//! Describe a binary record as an ordered list of typed fields and get loading and
//! dumping in both directions, including fields whose size, count or presence depends
//! on other fields, computed fields, nested structs and unions.
//!
//! ## Building blocks
//!
//! - **Field**: one value's wire format plus its rules: const, default, null spelling,
//!   presence predicate, validators, discard flag.
//! - **Containers**: `Field::array` (fixed count, count taken from another field, or
//!   until a halt check / end of stream), `Field::nested` (an embedded struct) and
//!   `Field::union` (one of several fields or structs, picked per call).
//! - **Schema**: the bound field table of a struct type, built once with
//!   [`SchemaBuilder`]; supports single inheritance, compute functions and validators.
//! - **Struct**: one record; `from_bytes`/`to_bytes`, `partial_load`/`partial_dump`,
//!   `get_field`, `to_dict`.
//!
//! ## Field types
//!
//! - Integers: `int8`..`int64`, `uint8`..`uint64`, any width 1..=8 bytes via `Field::integer`
//! - `float32`, `float64`
//! - Variable-length integers: VLQ, ULEB128, signed LEB128, compact indices, zigzag
//! - `bytes(size)`, `string(size)` (optional pad byte), `stringz()` (null-terminated)
//! - Anything implementing [`ScalarCodec`]
//!
//! Sizes and counts may be literal (`Field::bytes(4)`) or name an earlier field
//! (`Field::bytes("length")`).
//!
//! ## Example
//!
//! ```
//! use binform::{values, Endian, Field, Schema, Struct, Value, ValuesExt};
//!
//! let schema = Schema::builder("Message")
//!     .endian(Endian::Big)
//!     .field("count", Field::uint16())
//!     .field("items", Field::array(Field::stringz(), "count"))
//!     .computes("count", |v| Ok(Value::from(v.require("items")?.len().unwrap_or(0))))
//!     .build()
//!     .expect("schema");
//!
//! let msg = Struct::new(
//!     &schema,
//!     values! { "items" => vec![Value::from("abc"), Value::from(""), Value::from("defg")] },
//! )
//! .expect("struct");
//! let bytes = msg.to_bytes().expect("dump");
//! assert_eq!(bytes, b"\x00\x03abc\x00\x00defg\x00");
//!
//! let back = Struct::from_bytes(&schema, &bytes, true).expect("load");
//! assert_eq!(back.get("count").expect("get"), Some(Value::UInt(3)));
//! ```

pub mod codec;
pub mod container;
pub mod error;
pub mod field;
pub mod hooks;
pub mod schema;
pub mod stream;
pub mod structure;
pub mod value;
pub mod varint;

pub use codec::{Endian, Scalar, ScalarCodec, TextEncoding};
pub use container::{ArrayField, Choice, Count, NestedField, UnionField};
pub use error::{Error, Result};
pub use field::{Field, FieldKind, Size};
pub use hooks::Context;
pub use schema::{Options, Schema, SchemaBuilder};
pub use stream::ReadSeek;
pub use structure::Struct;
pub use value::{Value, Values, ValuesExt};
pub use varint::VarIntEncoding;
