//! Struct behaviour: binding and inheritance, assignment, computed fields, validators,
//! partial load/dump, random field access and conversions.

use std::io::{Cursor, Seek, SeekFrom};
use std::sync::Arc;

use binform::{values, Endian, Error, Field, Options, Schema, Struct, TextEncoding, Value, Values, ValuesExt};

fn base() -> Arc<Schema> {
    Schema::builder("Base")
        .endian(Endian::Big)
        .field("a", Field::uint8())
        .field("b", Field::uint16())
        .build()
        .expect("base")
}

#[test]
fn test_binding() {
    let schema = base();
    let b = schema.field("b").expect("b");
    assert_eq!(b.name(), Some("b"));
    assert_eq!(b.index(), Some(1));
    assert_eq!(b.offset(), Some(1));
    assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(Struct::get_size(&schema), Some(3));
}

#[test]
fn test_offsets_unknown_after_variable_field() {
    let schema = Schema::builder("Mixed")
        .field("name", Field::stringz())
        .field("flag", Field::uint8())
        .build()
        .expect("schema");
    assert_eq!(schema.field("name").and_then(Field::offset), Some(0));
    assert_eq!(schema.field("flag").and_then(Field::offset), None);
    assert_eq!(schema.size(), None);
}

#[test]
fn test_inheritance_extends_fields() {
    let parent = base();
    let child = Schema::builder("Child")
        .extends(&parent)
        .field("c", Field::uint16())
        .build()
        .expect("child");

    assert_eq!(child.len(), 3);
    assert_eq!(child.num_own_fields(), 1);
    assert!(child.parent().is_some_and(|p| Arc::ptr_eq(p, &parent)));
    let c = child.field("c").expect("c");
    assert_eq!(c.index(), Some(2));
    assert_eq!(c.offset(), Some(3));

    // Byte order is inherited from the parent.
    let record = Struct::new(&child, values! { "a" => 1, "b" => 2, "c" => 3 }).expect("struct");
    assert_eq!(record.to_bytes().expect("dump"), vec![1, 0, 2, 0, 3]);
}

#[test]
fn test_child_options_override_parent() {
    let child = Schema::builder("LittleChild")
        .extends(&base())
        .options(Options::endian(Endian::Little))
        .encoding(TextEncoding::Utf8)
        .field("c", Field::uint16())
        .build()
        .expect("child");
    assert_eq!(child.options().endian, Some(Endian::Little));
    assert_eq!(child.options().encoding, Some(TextEncoding::Utf8));
    // Inherited fields keep the byte order they were bound with.
    let record = Struct::new(&child, values! { "a" => 1, "b" => 2, "c" => 3 }).expect("struct");
    assert_eq!(record.to_bytes().expect("dump"), vec![1, 0, 2, 3, 0]);
}

#[test]
fn test_redefining_parent_field() {
    let err = Schema::builder("Bad")
        .extends(&base())
        .field("a", Field::uint32())
        .build()
        .expect_err("redefined");
    assert!(
        matches!(err, Error::FieldRedefined { ref schema, ref field } if schema == "Bad" && field == "a"),
        "{err:?}"
    );
}

#[test]
fn test_multiple_inheritance() {
    let other = Schema::builder("Other").field("z", Field::uint8()).build().expect("other");
    let err = Schema::builder("Both")
        .extends(&base())
        .extends(&other)
        .build()
        .expect_err("two parents");
    assert!(matches!(err, Error::MultipleInheritance { .. }), "{err:?}");
}

#[test]
fn test_field_declared_twice() {
    let err = Schema::builder("Twice")
        .field("x", Field::uint8())
        .field("x", Field::uint8())
        .build()
        .expect_err("duplicate");
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
}

#[test]
fn test_unexpected_values_sorted() {
    let err = Struct::new(&base(), values! { "zeta" => 1, "a" => 1, "alpha" => 2 }).expect_err("unknown");
    match err {
        Error::UnexpectedValue { schema, names } => {
            assert_eq!(schema, "Base");
            assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_values_kept_in_declaration_order() {
    let record = Struct::new(&base(), values! { "b" => 2, "a" => 1 }).expect("struct");
    assert_eq!(record.defined().keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn test_get_set_unset() {
    let schema = Schema::builder("Settings")
        .field("level", Field::uint8().default(3u8).validate(|v| match v.as_u64() {
            Some(n) if n <= 9 => Ok(()),
            _ => Err("level goes from 0 to 9".to_string()),
        }))
        .field("version", Field::uint8().const_value(1u8))
        .build()
        .expect("schema");

    let mut record = Struct::empty(&schema);
    assert_eq!(record.get("level").expect("get"), Some(Value::UInt(3)));
    record.set("level", 7u8).expect("set");
    assert_eq!(record.get("level").expect("get"), Some(Value::UInt(7)));

    let err = record.set("level", 12u8).expect_err("invalid");
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
    assert_eq!(record.get("level").expect("get"), Some(Value::UInt(7)));

    let err = record.set("version", 2u8).expect_err("const");
    assert!(matches!(err, Error::ImmutableField { ref field } if field == "version"), "{err:?}");

    assert_eq!(record.unset("level").expect("unset"), Some(Value::UInt(7)));
    assert_eq!(record.get("level").expect("get"), Some(Value::UInt(3)));

    let err = record.get("nope").expect_err("no such field");
    assert!(matches!(err, Error::NoSuchField { .. }), "{err:?}");
}

fn chunk() -> Arc<Schema> {
    Schema::builder("Chunk")
        .endian(Endian::Little)
        .field("total", Field::uint8())
        .field("length", Field::uint8())
        .field("data", Field::bytes("length"))
        .computes("total", |v| Ok(Value::from(v.require("length")?.as_u64().unwrap_or(0) + 2)))
        .computes("length", |v| Ok(Value::from(v.require("data")?.len().unwrap_or(0))))
        .build()
        .expect("chunk")
}

#[test]
fn test_computed_fields_resolve_in_any_order() {
    let record = Struct::new(&chunk(), values! { "data" => b"abc" }).expect("struct");
    assert_eq!(record.get("total").expect("get"), Some(Value::UInt(5)));
    assert_eq!(record.get("length").expect("get"), Some(Value::UInt(3)));
    assert_eq!(record.to_bytes().expect("dump"), b"\x05\x03abc".to_vec());
    assert_eq!(record.byte_len().expect("len"), 5);

    let mut record = record;
    let err = record.set("length", 1u8).expect_err("computed");
    assert!(matches!(err, Error::ImmutableField { .. }), "{err:?}");
}

#[test]
fn test_loaded_value_wins_over_compute() {
    let loaded = Struct::from_bytes(&chunk(), b"\x09\x02xy", true).expect("load");
    assert_eq!(loaded.get("total").expect("get"), Some(Value::UInt(9)));
    assert_eq!(loaded.to_bytes().expect("dump"), b"\x09\x02xy".to_vec());
}

#[test]
fn test_compute_declaration_errors() {
    let err = Schema::builder("ConstCompute")
        .field("magic", Field::uint8().const_value(1u8))
        .computes("magic", |_| Ok(Value::from(1u8)))
        .build()
        .expect_err("const");
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");

    let err = Schema::builder("TwoComputes")
        .field("n", Field::uint8())
        .computes("n", |_| Ok(Value::from(1u8)))
        .computes("n", |_| Ok(Value::from(2u8)))
        .build()
        .expect_err("duplicate");
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");

    let err = Schema::builder("Unknown")
        .field("n", Field::uint8())
        .computes("m", |_| Ok(Value::from(1u8)))
        .build()
        .expect_err("unknown");
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
}

#[test]
fn test_missing_required_value() {
    let record = Struct::new(&base(), values! { "a" => 1 }).expect("struct");
    let err = record.to_bytes().expect_err("b missing");
    assert!(matches!(err, Error::MissingRequiredValue { ref field } if field == "b"), "{err:?}");
}

fn rectangle() -> Arc<Schema> {
    Schema::builder("Rectangle")
        .field("width", Field::uint8())
        .field("height", Field::uint8())
        .validates(&["width", "height"], |_, field, value| {
            if value.as_u64() == Some(0) {
                return Err(format!("{} can't be zero", field.name().unwrap_or("?")));
            }
            Ok(())
        })
        .validates_struct(|record| {
            let area = ["width", "height"]
                .iter()
                .map(|name| record.get(name).ok().flatten().and_then(|v| v.as_u64()).unwrap_or(0))
                .product::<u64>();
            if area > 100 {
                return Err(format!("area {area} is too large"));
            }
            Ok(())
        })
        .build()
        .expect("rectangle")
}

#[test]
fn test_method_validators() {
    let schema = rectangle();
    assert!(Struct::from_bytes(&schema, &[4, 5], true).is_ok());

    let err = Struct::from_bytes(&schema, &[4, 0], true).expect_err("zero height");
    match err {
        Error::Validation { field, reason, .. } => {
            assert_eq!(field.as_deref(), Some("height"));
            assert_eq!(reason, "height can't be zero");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let record = Struct::new(&schema, values! { "width" => 0, "height" => 1 }).expect("struct");
    let err = record.to_bytes().expect_err("zero width");
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
}

#[test]
fn test_struct_validators() {
    let schema = rectangle();
    let err = Struct::from_bytes(&schema, &[20, 20], true).expect_err("too large");
    assert!(matches!(err, Error::Validation { field: None, .. }), "{err:?}");

    let record = Struct::new(&schema, values! { "width" => 10, "height" => 10 }).expect("struct");
    assert!(record.validate_contents(None).is_ok());
}

#[test]
fn test_validators_are_inherited() {
    let child = Schema::builder("Box")
        .extends(&rectangle())
        .field("depth", Field::uint8())
        .build()
        .expect("child");
    let err = Struct::from_bytes(&child, &[0, 1, 1], true).expect_err("zero width");
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
}

#[test]
fn test_validates_needs_names() {
    let err = Schema::builder("NoNames")
        .field("x", Field::uint8())
        .validates(&[], |_, _, _| Ok(()))
        .build()
        .expect_err("no names");
    assert!(matches!(err, Error::Configuration { .. }), "{err:?}");
}

fn triple() -> Arc<Schema> {
    Schema::builder("Triple")
        .endian(Endian::Big)
        .field("a", Field::uint8())
        .field("b", Field::uint16())
        .field("c", Field::uint32())
        .build()
        .expect("triple")
}

#[test]
fn test_partial_load_stops_at_eof() {
    let mut cursor = Cursor::new(vec![1, 0, 2, 0, 0]);
    let partial = Struct::partial_load(&triple(), &mut cursor, None, None).expect("partial");
    assert_eq!(partial, values! { "a" => 1, "b" => 2 });
    assert_eq!(cursor.position(), 3);
}

#[test]
fn test_partial_load_up_to_field() {
    let mut cursor = Cursor::new(vec![1, 0, 2, 9, 9, 9, 9]);
    let partial = Struct::partial_load(&triple(), &mut cursor, Some("b"), None).expect("partial");
    assert_eq!(partial, values! { "a" => 1, "b" => 2 });
    assert_eq!(cursor.position(), 3);

    let mut cursor = Cursor::new(vec![1, 0, 2, 0]);
    let err = Struct::partial_load(&triple(), &mut cursor, Some("c"), None).expect_err("short");
    assert!(err.is_eof(), "{err:?}");

    let mut cursor = Cursor::new(vec![1]);
    let err = Struct::partial_load(&triple(), &mut cursor, Some("d"), None).expect_err("unknown");
    assert!(matches!(err, Error::NoSuchField { .. }), "{err:?}");
}

#[test]
fn test_partial_load_drops_discarded() {
    let schema = Schema::builder("Skips")
        .field("pad", Field::bytes(2).discard())
        .field("x", Field::uint8())
        .build()
        .expect("schema");
    let mut cursor = Cursor::new(vec![0, 0, 7]);
    let partial = Struct::partial_load(&schema, &mut cursor, None, None).expect("partial");
    assert_eq!(partial, values! { "x" => 7 });
}

#[test]
fn test_partial_dump() {
    let record = Struct::new(&triple(), values! { "a" => 1, "b" => 2 }).expect("struct");

    let mut out: Vec<u8> = Vec::new();
    record.partial_dump(&mut out, None, None).expect("partial");
    assert_eq!(out, vec![1, 0, 2]);

    let mut out: Vec<u8> = Vec::new();
    record.partial_dump(&mut out, Some("a"), None).expect("partial");
    assert_eq!(out, vec![1]);

    let mut out: Vec<u8> = Vec::new();
    let err = record.partial_dump(&mut out, Some("c"), None).expect_err("c missing");
    assert!(matches!(err, Error::MissingRequiredValue { .. }), "{err:?}");
}

#[test]
fn test_get_field_variable_offset() {
    let schema = Schema::builder("Named")
        .field("name", Field::stringz())
        .field("value", Field::uint8())
        .build()
        .expect("schema");

    let mut cursor = Cursor::new(b"ab\0\x07".to_vec());
    let value = Struct::get_field(&schema, &mut cursor, "value", None).expect("get_field");
    assert_eq!(value, Some(Value::UInt(7)));
    assert_eq!(cursor.position(), 0);

    let mut cursor = Cursor::new(b"xxab".to_vec());
    cursor.seek(SeekFrom::Start(2)).expect("seek");
    let err = Struct::get_field(&schema, &mut cursor, "value", None).expect_err("truncated");
    assert!(err.is_eof(), "{err:?}");
    assert_eq!(cursor.position(), 2);
}

#[test]
fn test_get_field_fixed_offset() {
    let mut cursor = Cursor::new(vec![1, 0, 2, 0, 0, 0, 3]);
    let c = Struct::get_field(&triple(), &mut cursor, "c", None).expect("get_field");
    assert_eq!(c, Some(Value::UInt(3)));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_get_field_fixed_offset_restores_position_on_error() {
    let mut cursor = Cursor::new(vec![9, 9, 1, 0, 2]);
    cursor.seek(SeekFrom::Start(2)).expect("seek");
    let err = Struct::get_field(&triple(), &mut cursor, "c", None).expect_err("truncated");
    assert!(err.is_eof(), "{err:?}");
    assert_eq!(cursor.position(), 2);
}

#[test]
fn test_get_field_sized_by_sibling() {
    let schema = Schema::builder("Sized")
        .field("len", Field::uint8())
        .field("data", Field::bytes("len"))
        .build()
        .expect("schema");
    assert_eq!(schema.field("data").and_then(Field::offset), Some(1));

    let bytes = vec![2, 0xAA, 0xBB];
    let full = Struct::from_bytes(&schema, &bytes, true).expect("load");
    let mut cursor = Cursor::new(bytes);
    let data = Struct::get_field(&schema, &mut cursor, "data", None).expect("get_field");
    assert_eq!(data, Some(Value::from(b"\xAA\xBB")));
    assert_eq!(data, full.get("data").expect("get"));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_get_field_after_optional_field() {
    let schema = Schema::builder("Optional")
        .field("flag", Field::uint8())
        .field(
            "extra",
            Field::uint8().present(|v, _| v.get("flag").and_then(Value::as_u64) == Some(1)),
        )
        .field("x", Field::uint8())
        .build()
        .expect("schema");
    assert_eq!(schema.field("extra").and_then(Field::offset), Some(1));
    assert_eq!(schema.field("x").and_then(Field::offset), None);
    assert_eq!(schema.size(), None);

    let mut cursor = Cursor::new(vec![0, 9]);
    let x = Struct::get_field(&schema, &mut cursor, "x", None).expect("without extra");
    assert_eq!(x, Some(Value::UInt(9)));
    let mut cursor = Cursor::new(vec![1, 5, 9]);
    let x = Struct::get_field(&schema, &mut cursor, "x", None).expect("with extra");
    assert_eq!(x, Some(Value::UInt(9)));
    let extra = Struct::get_field(&schema, &mut cursor, "extra", None).expect("extra");
    assert_eq!(extra, Some(Value::UInt(5)));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_get_field_after_variable_parent() {
    let parent = Schema::builder("Named")
        .field("name", Field::stringz().default("ab"))
        .build()
        .expect("parent");
    let child = Schema::builder("NamedValue")
        .extends(&parent)
        .field("x", Field::uint8())
        .build()
        .expect("child");
    assert_eq!(parent.size(), None);
    assert_eq!(child.field("x").and_then(Field::offset), None);

    let mut cursor = Cursor::new(b"hello\0\x07".to_vec());
    let x = Struct::get_field(&child, &mut cursor, "x", None).expect("get_field");
    assert_eq!(x, Some(Value::UInt(7)));
    assert_eq!(cursor.position(), 0);
}

#[test]
fn test_from_stream_with_init() {
    let mut cursor = Cursor::new(vec![1, 0, 2, 0, 0, 0, 3]);
    let record = Struct::from_stream_with(&triple(), &mut cursor, None, values! { "b" => 99 }).expect("load");
    assert_eq!(record, values! { "a" => 1, "b" => 99, "c" => 3 });
    assert_eq!(cursor.position(), 7);
}

#[test]
fn test_from_bytes_exact() {
    let err = Struct::from_bytes(&triple(), &[1, 0, 2, 0, 0, 0, 3, 4], true).expect_err("trailing");
    assert!(matches!(err, Error::ExtraneousData { consumed: 7, available: 8 }), "{err:?}");
    assert!(Struct::from_bytes(&triple(), &[1, 0, 2, 0, 0, 0, 3, 4], false).is_ok());
}

#[test]
fn test_to_dict_and_discard() {
    let schema = Schema::builder("Header")
        .field("magic", Field::bytes(2).const_value(b"HI").discard())
        .field("count", Field::uint8().default(0u8))
        .build()
        .expect("schema");
    let record = Struct::empty(&schema);
    assert_eq!(record.to_dict(false).expect("to_dict"), values! { "count" => 0u8 });
    assert_eq!(
        record.to_dict(true).expect("to_dict"),
        values! { "magic" => b"HI", "count" => 0u8 }
    );
}

#[test]
fn test_presence_predicate() {
    let schema = Schema::builder("Optional")
        .field("has_extra", Field::uint8())
        .field(
            "extra",
            Field::uint8().present(|v, _| v.get("has_extra").and_then(Value::as_u64) == Some(1)),
        )
        .field("last", Field::uint8())
        .build()
        .expect("schema");

    let loaded = Struct::from_bytes(&schema, &[0, 5], true).expect("load");
    assert_eq!(loaded, values! { "has_extra" => 0, "last" => 5 });
    assert_eq!(loaded.get("extra").expect("get"), None);

    let loaded = Struct::from_bytes(&schema, &[1, 4, 5], true).expect("load");
    assert_eq!(loaded, values! { "has_extra" => 1, "extra" => 4, "last" => 5 });

    let record = Struct::new(&schema, values! { "has_extra" => 0, "extra" => 4, "last" => 5 }).expect("struct");
    assert_eq!(record.to_bytes().expect("dump"), vec![0, 5]);
}

#[test]
fn test_counted_strings_round_trip() {
    let schema = Schema::builder("Message")
        .endian(Endian::Big)
        .field("count", Field::uint16())
        .field("items", Field::array(Field::stringz(), "count"))
        .computes("count", |v| Ok(Value::from(v.require("items")?.len().unwrap_or(0))))
        .build()
        .expect("schema");
    let record = Struct::new(
        &schema,
        values! { "items" => vec![Value::from("abc"), Value::from(""), Value::from("defg")] },
    )
    .expect("struct");
    let bytes = record.to_bytes().expect("dump");
    assert_eq!(bytes, b"\x00\x03abc\x00\x00defg\x00".to_vec());

    let loaded = Struct::from_bytes(&schema, &bytes, true).expect("load");
    assert_eq!(loaded.get("count").expect("get"), Some(Value::UInt(3)));
    assert_eq!(loaded, record.to_dict(false).expect("to_dict"));
}

#[test]
fn test_equality_ignores_schema_identity() {
    let one = Struct::new(&base(), values! { "a" => 1, "b" => 2 }).expect("one");
    let other = Struct::new(&triple(), values! { "a" => 1u8, "b" => 2u16 }).expect("other");
    assert_eq!(one, other);
    let third = Struct::new(&base(), values! { "a" => 1 }).expect("third");
    assert_ne!(one, third);
    assert_ne!(one, Values::new());
}

#[test]
fn test_context_reaches_presence() {
    let schema = Schema::builder("Versioned")
        .field("base", Field::uint8())
        .field(
            "v2_only",
            Field::uint8().present(|_, ctx| ctx.and_then(|c| c.downcast_ref::<u32>()).is_some_and(|v| *v >= 2)),
        )
        .build()
        .expect("schema");

    let version = 2u32;
    let mut cursor = Cursor::new(vec![1, 2]);
    let loaded = Struct::from_stream(&schema, &mut cursor, Some(&version)).expect("load");
    assert_eq!(loaded, values! { "base" => 1, "v2_only" => 2 });

    let mut cursor = Cursor::new(vec![1, 2]);
    let loaded = Struct::from_stream(&schema, &mut cursor, None).expect("load");
    assert_eq!(loaded, values! { "base" => 1 });
    assert_eq!(cursor.position(), 1);
}
