//! End-to-end tests on real file formats: BMP header, CPIO archive entry, WAV file.

use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use binform::stream::read_exact;
use binform::{
    values, Endian, Error, Field, ReadSeek, Schema, ScalarCodec, Struct, TextEncoding, Value, Values,
    ValuesExt,
};

fn bmp_header() -> Arc<Schema> {
    Schema::builder("BmpHeader")
        .endian(Endian::Little)
        .field("magic", Field::bytes(2).const_value(b"BM").discard())
        .field("file_size", Field::uint32())
        .field("_reserved", Field::bytes(4).const_value(vec![0u8; 4]).discard())
        .field("pixels_offset", Field::uint32())
        .field("header_size", Field::uint32().const_value(40u32).discard())
        .field("image_width", Field::int32())
        .field("image_height", Field::int32())
        .field("n_color_planes", Field::uint16().const_value(1u16))
        .field("n_bits_per_pixel", Field::uint16())
        .field("compression_method", Field::uint32())
        .field("bitmap_size", Field::uint32())
        .field("v_resolution", Field::int32())
        .field("h_resolution", Field::int32())
        .field("n_palette_colors", Field::uint32())
        .field("n_important_colors", Field::uint32())
        .build()
        .expect("bmp schema")
}

fn bmp_bytes() -> Vec<u8> {
    let mut out = b"BM".to_vec();
    out.extend_from_slice(&14454u32.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&54u32.to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&80i32.to_le_bytes());
    out.extend_from_slice(&60i32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&14400u32.to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

#[test]
fn test_bmp_header_layout() {
    let schema = bmp_header();
    assert_eq!(schema.size(), Some(54));
    assert_eq!(schema.field("pixels_offset").and_then(Field::offset), Some(10));
    assert_eq!(schema.field("n_important_colors").and_then(Field::offset), Some(50));
}

#[test]
fn test_bmp_header_load() {
    let schema = bmp_header();
    let header = Struct::from_bytes(&schema, &bmp_bytes(), true).expect("load");

    assert_eq!(header.get("file_size").expect("get"), Some(Value::from(14454u32)));
    assert_eq!(header.get("image_width").expect("get"), Some(Value::from(80)));
    assert_eq!(header.get("image_height").expect("get"), Some(Value::from(60)));
    assert_eq!(header.get("n_bits_per_pixel").expect("get"), Some(Value::from(24)));
    assert_eq!(header.get("bitmap_size").expect("get"), Some(Value::from(14400)));
    assert_eq!(header.get("v_resolution").expect("get"), Some(Value::from(2835)));
    // Discarded fields aren't kept but still resolve to their const.
    assert!(!header.defined().contains_key("magic"));
    assert_eq!(header.get("magic").expect("get"), Some(Value::from(b"BM")));
}

#[test]
fn test_bmp_header_dump() {
    let schema = bmp_header();
    let header = Struct::new(
        &schema,
        values! {
            "file_size" => 14454u32,
            "pixels_offset" => 54u32,
            "image_width" => 80,
            "image_height" => 60,
            "n_bits_per_pixel" => 24u16,
            "compression_method" => 0u32,
            "bitmap_size" => 14400u32,
            "v_resolution" => 2835,
            "h_resolution" => 2835,
            "n_palette_colors" => 0u32,
            "n_important_colors" => 0u32,
        },
    )
    .expect("struct");
    assert_eq!(header.to_bytes().expect("dump"), bmp_bytes());
    assert_eq!(header.byte_len().expect("len"), 54);
}

#[test]
fn test_bmp_bad_magic() {
    let mut data = bmp_bytes();
    data[0] = b'X';
    let err = Struct::from_bytes(&bmp_header(), &data, true).expect_err("bad magic");
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
    assert_eq!(err.field(), Some("magic"));
}

#[test]
fn test_bmp_prefix_only() {
    let schema = Schema::builder("BmpPrefix")
        .endian(Endian::Little)
        .field("magic", Field::bytes(2).const_value(b"BM").discard())
        .field("file_size", Field::uint32())
        .field("_reserved", Field::bytes(4).discard())
        .field("pixels_offset", Field::uint32())
        .build()
        .expect("schema");

    let mut data = b"BM".to_vec();
    data.extend_from_slice(&100u32.to_le_bytes());
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(&54u32.to_le_bytes());

    let loaded = Struct::from_bytes(&schema, &data, true).expect("load");
    assert_eq!(loaded, values! { "file_size" => 100u32, "pixels_offset" => 54u32 });
}

#[test]
fn test_bmp_get_field_from_offset() {
    let schema = bmp_header();
    let mut padded = vec![0xAA; 3];
    padded.extend(bmp_bytes());
    let mut cursor = std::io::Cursor::new(padded);
    cursor.seek(SeekFrom::Start(3)).expect("seek");

    let width = Struct::get_field(&schema, &mut cursor, "image_width", None).expect("get_field");
    assert_eq!(width, Some(Value::from(80)));
    assert_eq!(cursor.position(), 3);
}

/// Seconds since the epoch as a little-endian u32, surfaced as a float.
#[derive(Debug)]
struct Timestamp32;

impl ScalarCodec for Timestamp32 {
    fn static_size(&self) -> Option<usize> {
        Some(4)
    }

    fn decode(&self, stream: &mut dyn ReadSeek, _size: Option<usize>) -> binform::Result<Value> {
        let buf = read_exact(stream, 4)?;
        let raw = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Ok(Value::Float(f64::from(raw)))
    }

    fn encode(&self, value: &Value, _size: Option<usize>) -> binform::Result<Vec<u8>> {
        let seconds = value.as_f64().filter(|s| (0.0..=f64::from(u32::MAX)).contains(s));
        match seconds {
            Some(s) => Ok((s as u32).to_le_bytes().to_vec()),
            None => Err(Error::ValueSize {
                field: None,
                size: Some(4),
                value: value.clone(),
            }),
        }
    }
}

fn cpio_header() -> Arc<Schema> {
    Schema::builder("CpioHeader")
        .endian(Endian::Little)
        .encoding(TextEncoding::Utf8)
        .field("magic", Field::uint16().const_value(0o070707u16).discard())
        .field("device_id", Field::uint16().default(0u16))
        .field("inumber", Field::uint16().default(0u16))
        .field("mode", Field::uint16().default(0o644u16))
        .field("owner_uid", Field::uint16().default(0u16))
        .field("owner_gid", Field::uint16().default(0u16))
        .field("n_links", Field::uint16().default(0u16))
        .field("device_version", Field::uint16().default(0u16))
        .field("modified_time", Field::custom(Timestamp32))
        .field("name_size", Field::uint16())
        .field("file_size", Field::uint32())
        .field("filename", Field::stringz())
        .field(
            "_filename_padding",
            Field::bytes(1)
                .const_value(b"\0")
                .discard()
                .present(|v, _| v.get("name_size").and_then(Value::as_u64).is_some_and(|n| n % 2 == 1)),
        )
        .field("data", Field::bytes("file_size"))
        .computes("name_size", |v| {
            let name = v.require("filename")?.as_str().unwrap_or_default();
            Ok(Value::from(name.len() + 1))
        })
        .computes("file_size", |v| Ok(Value::from(v.require("data")?.len().unwrap_or(0))))
        .build()
        .expect("cpio schema")
}

fn cpio_bytes(filename: &str) -> Vec<u8> {
    let name_size = filename.len() as u16 + 1;
    let mut out = vec![0xC7, 0x71, 0, 0, 0, 0, 0xA4, 0x01, 0, 0, 0, 0, 0, 0, 0, 0];
    out.extend_from_slice(&[0xEE, 0xFF, 0xC0, 0x00]);
    out.extend_from_slice(&name_size.to_le_bytes());
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(filename.as_bytes());
    out.push(0);
    if name_size % 2 == 1 {
        out.push(0);
    }
    out.extend_from_slice(b"0123");
    out
}

fn check_cpio_round_trip(filename: &str) {
    let schema = cpio_header();
    let entry = Struct::new(
        &schema,
        values! {
            "modified_time" => 12648430.0,
            "filename" => filename,
            "data" => b"0123",
        },
    )
    .expect("struct");
    let expected = cpio_bytes(filename);
    assert_eq!(entry.to_bytes().expect("dump"), expected);
    assert_eq!(entry.byte_len().expect("len"), expected.len());

    let loaded = Struct::from_bytes(&schema, &expected, true).expect("load");
    assert_eq!(
        loaded,
        values! {
            "device_id" => 0u16,
            "inumber" => 0u16,
            "mode" => 0o644u16,
            "owner_uid" => 0u16,
            "owner_gid" => 0u16,
            "n_links" => 0u16,
            "device_version" => 0u16,
            "modified_time" => 12648430.0,
            "name_size" => filename.len() + 1,
            "file_size" => 4u32,
            "filename" => filename,
            "data" => b"0123",
        }
    );
}

#[test]
fn test_cpio_even_length_filename() {
    check_cpio_round_trip("evenlength.txt");
}

#[test]
fn test_cpio_odd_length_filename() {
    check_cpio_round_trip("oddlength.txt");
}

#[test]
fn test_cpio_timestamp_out_of_range() {
    let entry = Struct::new(
        &cpio_header(),
        values! { "modified_time" => -1.0, "filename" => "a", "data" => b"" },
    )
    .expect("struct");
    let err = entry.to_bytes().expect_err("negative timestamp");
    assert!(matches!(err, Error::ValueSize { .. }), "{err:?}");
    assert_eq!(err.field(), Some("modified_time"));
}

fn wav_file_header() -> Arc<Schema> {
    Schema::builder("WavFileHeader")
        .endian(Endian::Little)
        .field("riff_header", Field::bytes(4).const_value(b"RIFF"))
        .field("size", Field::uint32())
        .field("file_format", Field::bytes(4).const_value(b"WAVE"))
        .build()
        .expect("wav header schema")
}

fn wav_format_chunk() -> Arc<Schema> {
    Schema::builder("WavFormatChunk")
        .endian(Endian::Little)
        .field("chunk_id", Field::bytes(4).const_value(b"fmt "))
        .field("size", Field::uint32().const_value(16u32))
        .field("audio_format", Field::uint16())
        .field("n_channels", Field::uint16())
        .field("sample_rate", Field::uint32())
        .field("byte_rate", Field::uint32())
        .field("block_alignment", Field::uint16())
        .field("bits_per_sample", Field::uint16())
        .computes("byte_rate", |v| {
            let rate = v.require("sample_rate")?.as_u64().unwrap_or(0);
            let channels = v.require("n_channels")?.as_u64().unwrap_or(0);
            let bits = v.require("bits_per_sample")?.as_u64().unwrap_or(0);
            Ok(Value::from(rate * channels * bits / 8))
        })
        .computes("block_alignment", |v| {
            let channels = v.require("n_channels")?.as_u64().unwrap_or(0);
            let bits = v.require("bits_per_sample")?.as_u64().unwrap_or(0);
            Ok(Value::from(channels * bits / 8))
        })
        .build()
        .expect("wav format schema")
}

fn wav_data_chunk() -> Arc<Schema> {
    Schema::builder("WavDataChunk")
        .endian(Endian::Little)
        .field("chunk_id", Field::bytes(4).const_value(b"data"))
        .field("size", Field::uint32())
        .field("audio_data", Field::bytes("size"))
        .computes("size", |v| Ok(Value::from(v.require("audio_data")?.len().unwrap_or(0))))
        .build()
        .expect("wav data schema")
}

#[test]
fn test_wav_write_and_read_back() {
    let audio: Vec<u8> = (0..64u8).collect();
    let format = Struct::new(
        &wav_format_chunk(),
        values! {
            "audio_format" => 1u16,
            "n_channels" => 1u16,
            "sample_rate" => 8000u32,
            "bits_per_sample" => 8u16,
        },
    )
    .expect("format");
    let data = Struct::new(&wav_data_chunk(), values! { "audio_data" => audio.clone() }).expect("data");

    assert_eq!(format.byte_len().expect("len"), 24);
    assert_eq!(data.byte_len().expect("len"), 8 + audio.len());
    let total = 4 + format.byte_len().expect("len") + data.byte_len().expect("len");
    let header = Struct::new(&wav_file_header(), values! { "size" => total }).expect("header");

    let mut file = tempfile::tempfile().expect("tempfile");
    header.to_stream(&mut file, None).expect("dump header");
    format.to_stream(&mut file, None).expect("dump format");
    data.to_stream(&mut file, None).expect("dump data");
    file.seek(SeekFrom::Start(0)).expect("rewind");

    let header_back = Struct::from_stream(&wav_file_header(), &mut file, None).expect("load header");
    let format_back = Struct::from_stream(&wav_format_chunk(), &mut file, None).expect("load format");
    let data_back = Struct::from_stream(&wav_data_chunk(), &mut file, None).expect("load data");

    assert_eq!(header_back.get("size").expect("get"), Some(Value::from(total)));
    assert_eq!(format_back.get("byte_rate").expect("get"), Some(Value::from(8000u32)));
    assert_eq!(format_back.get("block_alignment").expect("get"), Some(Value::from(1u16)));
    assert_eq!(data_back.get("size").expect("get"), Some(Value::from(64u32)));
    assert_eq!(data_back.get("audio_data").expect("get"), Some(Value::from(audio)));
    assert_eq!(file.stream_position().expect("pos"), 8 + total as u64);
}

#[test]
fn test_wav_get_field_from_file() {
    let format = Struct::new(
        &wav_format_chunk(),
        values! {
            "audio_format" => 1u16,
            "n_channels" => 2u16,
            "sample_rate" => 44100u32,
            "bits_per_sample" => 16u16,
        },
    )
    .expect("format");
    let mut file = tempfile::tempfile().expect("tempfile");
    format.to_stream(&mut file, None).expect("dump");
    file.seek(SeekFrom::Start(0)).expect("rewind");

    let rate = Struct::get_field(&wav_format_chunk(), &mut file, "byte_rate", None).expect("get_field");
    assert_eq!(rate, Some(Value::from(176400u32)));
    assert_eq!(file.stream_position().expect("pos"), 0);
}

#[test]
fn test_wav_data_chunk_to_dict() {
    let data = Struct::new(&wav_data_chunk(), values! { "audio_data" => b"\x01\x02" }).expect("data");
    let dict: Values = data.to_dict(true).expect("to_dict");
    assert_eq!(
        dict,
        values! { "chunk_id" => b"data", "size" => 2usize, "audio_data" => b"\x01\x02" }
    );
}
