use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::driver::DecodeOptions;
use crate::error::{Error, ErrorKind, Result};
use crate::lzf;
use crate::warning::{WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

/// Decoded form of a length-prefix byte per the format's two-top-bit
/// dispatch: a plain length, one of the three special integer widths, or
/// an LZF-compressed string header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LengthPrefix {
    Len(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Lzf {
        compressed_len: u64,
        uncompressed_len: u64,
    },
}

pub(crate) fn read_length_prefix<R: Read>(rd: &mut ByteReader<R>) -> Result<LengthPrefix> {
    let b0 = rd.read_u8()?;
    match b0 >> 6 {
        0b00 => Ok(LengthPrefix::Len((b0 & 0x3f) as u64)),
        0b01 => {
            let b1 = rd.read_u8()?;
            Ok(LengthPrefix::Len((((b0 & 0x3f) as u64) << 8) | b1 as u64))
        }
        0b10 => match b0 {
            0x80 => Ok(LengthPrefix::Len(rd.read_be_u32()? as u64)),
            0x81 => Ok(LengthPrefix::Len(rd.read_be_u64()?)),
            _ => Err(Error::new(
                ErrorKind::BadLengthPrefix,
                format!("unused 10xxxxxx length-prefix byte {b0:#04x}"),
            )),
        },
        0b11 => match b0 & 0x3f {
            0 => Ok(LengthPrefix::Int8(rd.read_u8()? as i8)),
            1 => Ok(LengthPrefix::Int16(rd.read_le_u16()? as i16)),
            2 => Ok(LengthPrefix::Int32(rd.read_le_u32()? as i32)),
            3 => {
                let compressed_len = read_plain_length(rd)?;
                let uncompressed_len = read_plain_length(rd)?;
                Ok(LengthPrefix::Lzf {
                    compressed_len,
                    uncompressed_len,
                })
            }
            other => Err(Error::new(
                ErrorKind::BadLengthPrefix,
                format!("unknown special length-prefix encoding {other}"),
            )),
        },
        _ => unreachable!("two-bit shift can't produce more than 4 cases"),
    }
}

/// Reads a length prefix that must denote a plain length: used for the
/// compressed/uncompressed length pair inside an LZF header (never
/// themselves special-encoded), and reused anywhere else a plain count is
/// expected (sequence lengths, db index, quicklist node counts, ...).
pub(crate) fn read_plain_length<R: Read>(rd: &mut ByteReader<R>) -> Result<u64> {
    match read_length_prefix(rd)? {
        LengthPrefix::Len(n) => Ok(n),
        _ => Err(Error::new(
            ErrorKind::BadLengthPrefix,
            "expected a plain length, found a special-encoded int or nested lzf header",
        )),
    }
}

/// Outcome of decoding a byte string: either the bytes themselves, or a
/// placeholder when the declared length exceeded the configured ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StringValue {
    Bytes(Vec<u8>),
    Truncated { original_len: u64 },
}

impl StringValue {
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            StringValue::Bytes(b) => b,
            StringValue::Truncated { original_len } => {
                format!("<string skipped, {original_len} bytes over ceiling>").into_bytes()
            }
        }
    }
}

/// Decodes one string per §4.2: dispatches the length-prefix byte to a
/// literal byte run, one of the three special-encoded integers rendered
/// as decimal ASCII, or an LZF-compressed payload.
pub(crate) fn read_string<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
) -> Result<StringValue> {
    match read_length_prefix(rd)? {
        LengthPrefix::Int8(v) => Ok(StringValue::Bytes(v.to_string().into_bytes())),
        LengthPrefix::Int16(v) => Ok(StringValue::Bytes(v.to_string().into_bytes())),
        LengthPrefix::Int32(v) => Ok(StringValue::Bytes(v.to_string().into_bytes())),
        LengthPrefix::Lzf {
            compressed_len,
            uncompressed_len,
        } => {
            if uncompressed_len > opts.max_string_len {
                rd.skip(compressed_len as usize)?;
                warnings.warn(
                    WarningKind::SizeCeilingExceeded,
                    format!("lzf string of {uncompressed_len} bytes exceeds ceiling of {}", opts.max_string_len),
                );
                return Ok(StringValue::Truncated {
                    original_len: uncompressed_len,
                });
            }
            let compressed = rd.read_exact(compressed_len as usize)?;
            let decompressed = lzf::decompress(&compressed, uncompressed_len as usize)?;
            Ok(StringValue::Bytes(decompressed))
        }
        LengthPrefix::Len(len) => {
            if len > opts.max_string_len {
                rd.skip(len as usize)?;
                warnings.warn(
                    WarningKind::SizeCeilingExceeded,
                    format!("string of {len} bytes exceeds ceiling of {}", opts.max_string_len),
                );
                return Ok(StringValue::Truncated { original_len: len });
            }
            Ok(StringValue::Bytes(rd.read_exact(len as usize)?))
        }
    }
}

#[test]
fn test_six_bit_length() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x05]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Len(5));
}

#[test]
fn test_fourteen_bit_length() {
    // 0x42 0x01 -> top two bits 01, low 6 bits 0x02, then 0x01 -> (0x02 << 8) | 0x01 = 513
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0b01_000010, 0x01]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Len(513));
}

#[test]
fn test_32_and_64_bit_length() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x80, 0x00, 0x00, 0x01, 0x00]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Len(256));

    let mut rd = ByteReader::new(std::io::Cursor::new(vec![
        0x81, 0, 0, 0, 0, 0, 0, 1, 0,
    ]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Len(256));
}

#[test]
fn test_special_int_encodings() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0xC0, 0x2A]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Int8(42));

    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0xC1, 0x2A, 0x00]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Int16(42));

    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0xC2, 0x2A, 0x00, 0x00, 0x00]));
    assert_eq!(read_length_prefix(&mut rd).unwrap(), LengthPrefix::Int32(42));
}

#[test]
fn test_integer_encoded_string_renders_as_decimal() {
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0xC0, 0x2A]));
    let s = read_string(&mut rd, &opts, &mut warnings).unwrap();
    assert_eq!(s.into_bytes(), b"42");
}

#[test]
fn test_unused_length_prefix_byte_is_bad_length_prefix() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x82]));
    let err = read_length_prefix(&mut rd).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadLengthPrefix);
}

#[test]
fn test_oversize_string_is_truncated_with_warning() {
    let mut opts = DecodeOptions::default();
    opts.max_string_len = 4;
    let mut warnings = Warnings::default();
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x05, b'h', b'e', b'l', b'l', b'o']));
    let s = read_string(&mut rd, &opts, &mut warnings).unwrap();
    assert!(matches!(s, StringValue::Truncated { original_len: 5 }));
    assert_eq!(warnings.into_vec().len(), 1);
}

/// Test-only encoder for a plain length, mirroring §4.2's four length
/// widths. Only used to build inputs for the round-trip property below;
/// the real decoder never needs to emit this format.
#[cfg(test)]
fn encode_plain_length(n: u64) -> Vec<u8> {
    if n <= 0x3f {
        vec![n as u8]
    } else if n <= 0x3fff {
        vec![0b01_000000 | ((n >> 8) as u8), (n & 0xff) as u8]
    } else if n <= u32::MAX as u64 {
        let mut v = vec![0x80];
        v.extend_from_slice(&(n as u32).to_be_bytes());
        v
    } else {
        let mut v = vec![0x81];
        v.extend_from_slice(&n.to_be_bytes());
        v
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn length_prefix_round_trips(n in 0u64..=u32::MAX as u64 * 2) {
            let bytes = encode_plain_length(n);
            let mut rd = ByteReader::new(std::io::Cursor::new(bytes));
            let decoded = read_plain_length(&mut rd).unwrap();
            prop_assert_eq!(decoded, n);
        }
    }
}
