//! Per-type-tag value decoders (§4.4): the leaf of the component stack,
//! producing the [`LogicalValue`] tree the driver attaches to a key.

use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::containers::{decode_intset, decode_listpack, decode_quicklist, decode_ziplist, Entry, NodeKind};
use crate::driver::DecodeOptions;
use crate::error::{Error, ErrorKind, Result};
use crate::primitives::{read_plain_length as plain_length, read_string};
use crate::stream::{decode_stream, StreamVersion};
use crate::warning::{WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

/// The reconstructed logical value of one key, per §3's data model.
/// Module-typed values have no variant here: they are non-goal (§1) and
/// never reach this type — the driver treats encountering one as a
/// structural error before `decode_value` would need to produce anything.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalValue {
    StringV(Vec<u8>),
    ListV(Vec<Vec<u8>>),
    SetV(Vec<Vec<u8>>),
    SortedSetV(Vec<(Vec<u8>, f64)>),
    HashV(Vec<(Vec<u8>, Vec<u8>)>),
    StreamV { summary: String, count: Option<u64> },
}

/// Type tags that are opcodes rather than value records, module
/// encodings this crate refuses to reconstruct, or simply undefined for
/// this format version. The driver treats all three as a reason not to
/// call into `decode_value`.
pub(crate) fn is_module_tag(tag: u8) -> bool {
    matches!(tag, 6 | 7)
}

pub(crate) fn is_known_type_tag(tag: u8) -> bool {
    matches!(tag, 0..=5 | 9..=21)
}

pub(crate) fn decode_value<R: Read>(
    rd: &mut ByteReader<R>,
    tag: u8,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
) -> Result<LogicalValue> {
    warnings.push_context(format!("value type {tag}"));
    let result = decode_value_inner(rd, tag, opts, warnings);
    warnings.pop_context();
    result
}

fn decode_value_inner<R: Read>(
    rd: &mut ByteReader<R>,
    tag: u8,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
) -> Result<LogicalValue> {
    match tag {
        0 => Ok(LogicalValue::StringV(read_string(rd, opts, warnings)?.into_bytes())),
        1 => Ok(LogicalValue::ListV(read_string_seq(rd, opts, warnings)?)),
        2 => Ok(LogicalValue::SetV(read_string_seq(rd, opts, warnings)?)),
        3 => Ok(LogicalValue::SortedSetV(read_zset_v1(rd, opts, warnings)?)),
        4 => Ok(LogicalValue::HashV(read_pair_seq(rd, opts, warnings)?)),
        5 => Ok(LogicalValue::SortedSetV(read_zset_v2(rd, opts, warnings)?)),
        9 | 13 => {
            let entries = ziplist_blob(rd, opts, warnings)?;
            Ok(LogicalValue::HashV(pairs_from_entries(entries, warnings)))
        }
        10 => Ok(LogicalValue::ListV(ziplist_blob(rd, opts, warnings)?.into_iter().map(Entry::into_bytes).collect())),
        11 => Ok(LogicalValue::SetV(
            decode_intset(&read_string(rd, opts, warnings)?.into_bytes())?
                .into_iter()
                .map(|i| i.to_string().into_bytes())
                .collect(),
        )),
        12 => {
            let entries = ziplist_blob(rd, opts, warnings)?;
            Ok(LogicalValue::SortedSetV(score_pairs_from_entries(entries, warnings)?))
        }
        14 => Ok(LogicalValue::ListV(
            decode_quicklist(rd, opts, warnings, NodeKind::Ziplist)?.into_iter().map(Entry::into_bytes).collect(),
        )),
        15 => Ok(decode_stream(rd, opts, warnings, StreamVersion::V1)?),
        16 => {
            let entries = listpack_blob(rd, opts, warnings)?;
            Ok(LogicalValue::HashV(pairs_from_entries(entries, warnings)))
        }
        17 => {
            let entries = listpack_blob(rd, opts, warnings)?;
            Ok(LogicalValue::SortedSetV(score_pairs_from_entries(entries, warnings)?))
        }
        18 => Ok(LogicalValue::ListV(
            decode_quicklist(rd, opts, warnings, NodeKind::Listpack)?.into_iter().map(Entry::into_bytes).collect(),
        )),
        19 => Ok(decode_stream(rd, opts, warnings, StreamVersion::V2)?),
        20 => Ok(LogicalValue::SetV(listpack_blob(rd, opts, warnings)?.into_iter().map(Entry::into_bytes).collect())),
        21 => Ok(decode_stream(rd, opts, warnings, StreamVersion::V3)?),
        other => Err(Error::new(ErrorKind::BadEncoding, format!("unknown value type tag {other}"))),
    }
}

fn read_string_seq<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<Vec<u8>>> {
    let len = plain_length(rd)?;
    let mut out = Vec::with_capacity(len.min(1 << 16) as usize);
    for _ in 0..len {
        out.push(read_string(rd, opts, warnings)?.into_bytes());
    }
    Ok(out)
}

fn read_pair_seq<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let len = plain_length(rd)?;
    let mut out = Vec::with_capacity(len.min(1 << 16) as usize);
    for _ in 0..len {
        let a = read_string(rd, opts, warnings)?.into_bytes();
        let b = read_string(rd, opts, warnings)?.into_bytes();
        out.push((a, b));
    }
    Ok(out)
}

/// ZSet v1's score encoding (§4.4): one length byte, then that many ASCII
/// digits, with three reserved lengths standing in for NaN/+inf/-inf
/// rather than a byte count.
fn read_zset_v1<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<(Vec<u8>, f64)>> {
    let len = plain_length(rd)?;
    let mut out = Vec::with_capacity(len.min(1 << 16) as usize);
    for _ in 0..len {
        let member = read_string(rd, opts, warnings)?.into_bytes();
        let score = read_binary_double(rd)?;
        out.push((member, score));
    }
    Ok(out)
}

fn read_binary_double<R: Read>(rd: &mut ByteReader<R>) -> Result<f64> {
    let marker = rd.read_u8()?;
    match marker {
        253 => Ok(f64::NAN),
        254 => Ok(f64::INFINITY),
        255 => Ok(f64::NEG_INFINITY),
        len => {
            let bytes = rd.read_exact(len as usize)?;
            let text = String::from_utf8(bytes).map_err(|_| Error::new(ErrorKind::BadEncoding, "zset v1 score is not valid UTF-8"))?;
            text.parse::<f64>().map_err(|_| Error::new(ErrorKind::BadEncoding, format!("zset v1 score {text:?} is not a number")))
        }
    }
}

fn read_zset_v2<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<(Vec<u8>, f64)>> {
    let len = plain_length(rd)?;
    let mut out = Vec::with_capacity(len.min(1 << 16) as usize);
    for _ in 0..len {
        let member = read_string(rd, opts, warnings)?.into_bytes();
        let score = f64::from_le_bytes(rd.read_exact(8)?.try_into().unwrap());
        out.push((member, score));
    }
    Ok(out)
}

fn ziplist_blob<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<Entry>> {
    let blob = read_string(rd, opts, warnings)?.into_bytes();
    decode_ziplist(&blob, warnings)
}

fn listpack_blob<R: Read>(rd: &mut ByteReader<R>, opts: &DecodeOptions, warnings: &mut Warnings) -> Result<Vec<Entry>> {
    let blob = read_string(rd, opts, warnings)?.into_bytes();
    decode_listpack(&blob, warnings)
}

fn pairs_from_entries(entries: Vec<Entry>, warnings: &mut Warnings) -> Vec<(Vec<u8>, Vec<u8>)> {
    if entries.len() % 2 != 0 {
        warnings.warn(
            WarningKind::ContainerDecodeError(ErrorKind::BadEncoding),
            format!("packed field/value container has an odd entry count ({}); dangling entry dropped", entries.len()),
        );
    }
    entries
        .chunks(2)
        .filter_map(|chunk| match chunk {
            [a, b] => Some((a.clone().into_bytes(), b.clone().into_bytes())),
            _ => None,
        })
        .collect()
}

fn score_pairs_from_entries(entries: Vec<Entry>, warnings: &mut Warnings) -> Result<Vec<(Vec<u8>, f64)>> {
    if entries.len() % 2 != 0 {
        warnings.warn(
            WarningKind::ContainerDecodeError(ErrorKind::BadEncoding),
            format!("packed member/score container has an odd entry count ({}); dangling entry dropped", entries.len()),
        );
    }
    let mut out = Vec::with_capacity(entries.len() / 2);
    for chunk in entries.chunks(2) {
        match chunk {
            [member, score] => {
                let member = member.clone().into_bytes();
                let score_text = String::from_utf8(score.clone().into_bytes())
                    .map_err(|_| Error::new(ErrorKind::BadEncoding, "packed zset score is not valid UTF-8"))?;
                let score = score_text
                    .parse::<f64>()
                    .map_err(|_| Error::new(ErrorKind::BadEncoding, format!("packed zset score {score_text:?} is not a number")))?;
                out.push((member, score));
            }
            _ => {}
        }
    }
    Ok(out)
}

#[test]
fn test_decode_string_value() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x05, b'h', b'e', b'l', b'l', b'o']));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let v = decode_value(&mut rd, 0, &opts, &mut warnings).unwrap();
    assert_eq!(v, LogicalValue::StringV(b"hello".to_vec()));
}

#[test]
fn test_decode_zset_v2() {
    let mut buf = vec![0x02]; // length 2
    buf.push(1);
    buf.push(b'a');
    buf.extend_from_slice(&1.5f64.to_le_bytes());
    buf.push(1);
    buf.push(b'b');
    buf.extend_from_slice(&2.5f64.to_le_bytes());
    let mut rd = ByteReader::new(std::io::Cursor::new(buf));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let v = decode_value(&mut rd, 5, &opts, &mut warnings).unwrap();
    assert_eq!(
        v,
        LogicalValue::SortedSetV(vec![(b"a".to_vec(), 1.5), (b"b".to_vec(), 2.5)])
    );
}

#[test]
fn test_decode_hash_as_listpack() {
    let mut lp = vec![0u8; 6];
    for field in [b"f1".as_slice(), b"v1", b"f2", b"v2"] {
        lp.push(0x80 | field.len() as u8);
        lp.extend_from_slice(field);
        lp.push((1 + field.len()) as u8);
    }
    lp.push(0xFF);

    let mut buf = vec![lp.len() as u8];
    buf.extend_from_slice(&lp);
    let mut rd = ByteReader::new(std::io::Cursor::new(buf));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let v = decode_value(&mut rd, 16, &opts, &mut warnings).unwrap();
    assert_eq!(
        v,
        LogicalValue::HashV(vec![(b"f1".to_vec(), b"v1".to_vec()), (b"f2".to_vec(), b"v2".to_vec())])
    );
}

#[test]
fn test_hash_as_listpack_odd_entry_count_warns() {
    let mut lp = vec![0u8; 6];
    for field in [b"f1".as_slice(), b"v1", b"f2"] {
        lp.push(0x80 | field.len() as u8);
        lp.extend_from_slice(field);
        lp.push((1 + field.len()) as u8);
    }
    lp.push(0xFF);

    let mut buf = vec![lp.len() as u8];
    buf.extend_from_slice(&lp);
    let mut rd = ByteReader::new(std::io::Cursor::new(buf));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let v = decode_value(&mut rd, 16, &opts, &mut warnings).unwrap();
    assert_eq!(v, LogicalValue::HashV(vec![(b"f1".to_vec(), b"v1".to_vec())]));
    assert!(warnings
        .into_vec()
        .iter()
        .any(|w| w.kind == WarningKind::ContainerDecodeError(ErrorKind::BadEncoding)));
}

#[test]
fn test_unknown_type_tag_is_bad_encoding() {
    let mut rd = ByteReader::new(std::io::Cursor::new(Vec::<u8>::new()));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let err = decode_value(&mut rd, 8, &opts, &mut warnings).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadEncoding);
}
