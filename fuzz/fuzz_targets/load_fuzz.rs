//! Load fuzz target: feed arbitrary bytes to a schema with every kind of
//! data-dependent field (size references, counted arrays, presence, unions, varints).
//! Loading must not panic; it should return Ok(Struct) or Err(Error). Whatever loads
//! must dump again.
//! Build with: cargo fuzz run load_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
use binform::{Choice, Endian, Field, Schema, Struct, Value, VarIntEncoding};

#[cfg(fuzzing)]
fn schema() -> std::sync::Arc<Schema> {
    let point = Schema::builder("Point")
        .field("x", Field::int16())
        .field("y", Field::int16())
        .build()
        .expect("point");
    let body = Field::union(
        vec![Choice::Field(Field::stringz().size(32)), Choice::Struct(point)],
        |_, _, _, loaded| Ok(loaded.get("kind").and_then(Value::as_usize).unwrap_or(0) % 2),
        |value, _, _, _| Ok(if value.as_str().is_some() { 0 } else { 1 }),
    )
    .expect("union");
    Schema::builder("Fuzzed")
        .endian(Endian::Big)
        .field("kind", Field::uint8())
        .field("length", Field::varint(VarIntEncoding::Uleb128))
        .field("blob", Field::bytes("length"))
        .field("count", Field::uint8())
        .field("items", Field::array(Field::varint(VarIntEncoding::ZigZag), "count"))
        .field(
            "extra",
            Field::uint32()
                .null_zeros()
                .present(|v, _| v.get("kind").and_then(Value::as_u64).is_some_and(|k| k & 0x80 != 0)),
        )
        .field("body", body)
        .build()
        .expect("schema")
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let schema = schema();
    if let Ok(record) = Struct::from_bytes(&schema, data, false) {
        let _ = record.to_bytes();
    }
    let mut cursor = std::io::Cursor::new(data);
    let _ = Struct::partial_load(&schema, &mut cursor, None, None);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run load_fuzz");
}
