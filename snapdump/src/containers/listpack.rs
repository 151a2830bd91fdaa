use crate::containers::Entry;
use crate::error::{Error, ErrorKind, Result};
use crate::warning::{WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

/// Decodes a listpack blob (§4.3), already extracted as a bounded byte
/// slice. The back-length trailer of each entry is skipped rather than
/// interpreted: we already know the entry's byte length from parsing its
/// encoding and payload, so we can compute how many back-length bytes it
/// must occupy without reading them, matching the spec's "reads it to
/// advance but does not validate it strictly".
pub(crate) fn decode_listpack(buf: &[u8], warnings: &mut Warnings) -> Result<Vec<Entry>> {
    if buf.len() < 6 {
        return Err(Error::new(ErrorKind::BadEncoding, "listpack blob shorter than its 6-byte header"));
    }
    let mut pos = 6; // total-len(4) + count(2)
    let mut entries = Vec::new();
    loop {
        if pos >= buf.len() {
            warnings.warn(WarningKind::ContainerDecodeError(ErrorKind::BadEncoding), "listpack missing terminator byte");
            break;
        }
        if buf[pos] == 0xFF {
            pos += 1;
            break;
        }
        let entry_start = pos;
        match parse_entry(buf, &mut pos) {
            Ok(entry) => {
                let entry_len = pos - entry_start;
                let skip = backlen_size(entry_len);
                if pos + skip > buf.len() {
                    warnings.warn(WarningKind::ContainerDecodeError(ErrorKind::BadEncoding), "listpack back-length runs past end of blob");
                    break;
                }
                pos += skip;
                entries.push(entry);
            }
            Err(e) => {
                warnings.warn(WarningKind::ContainerDecodeError(e.kind()), format!("listpack entry {}: {e}", entries.len()));
                break;
            }
        }
    }
    if pos != buf.len() {
        warnings.warn(
            WarningKind::ContainerDecodeError(ErrorKind::BadEncoding),
            format!("listpack left {} trailing bytes unconsumed", buf.len() - pos),
        );
    }
    Ok(entries)
}

fn backlen_size(entry_len: usize) -> usize {
    if entry_len <= 127 {
        1
    } else if entry_len < 16383 {
        2
    } else if entry_len < 2097151 {
        3
    } else if entry_len < 268435455 {
        4
    } else {
        5
    }
}

fn parse_entry(buf: &[u8], pos: &mut usize) -> Result<Entry> {
    let b0 = byte_at(buf, *pos)?;
    if b0 & 0x80 == 0 {
        *pos += 1;
        return Ok(Entry::Int((b0 & 0x7f) as i64));
    }
    if b0 & 0xC0 == 0x80 {
        let len = (b0 & 0x3f) as usize;
        *pos += 1;
        return Ok(Entry::Bytes(take(buf, pos, len)?));
    }
    if b0 & 0xE0 == 0xC0 {
        let b1 = byte_at(buf, *pos + 1)?;
        let raw = (((b0 & 0x1f) as u32) << 8) | b1 as u32;
        let mut v = raw as i64;
        if v & 0x1000 != 0 {
            v -= 1 << 13;
        }
        *pos += 2;
        return Ok(Entry::Int(v));
    }
    if b0 & 0xF0 == 0xE0 {
        let b1 = byte_at(buf, *pos + 1)?;
        let len = (((b0 & 0x0f) as usize) << 8) | b1 as usize;
        *pos += 2;
        return Ok(Entry::Bytes(take(buf, pos, len)?));
    }
    match b0 {
        0xF1 => {
            let v = le_i16(buf, *pos + 1)?;
            *pos += 3;
            Ok(Entry::Int(v as i64))
        }
        0xF2 => {
            let b1 = byte_at(buf, *pos + 1)? as i64;
            let b2 = byte_at(buf, *pos + 2)? as i64;
            let b3 = byte_at(buf, *pos + 3)? as i64;
            let mut v = b1 | (b2 << 8) | (b3 << 16);
            if v & 0x80_0000 != 0 {
                v -= 1 << 24;
            }
            *pos += 4;
            Ok(Entry::Int(v))
        }
        0xF3 => {
            let v = le_i32(buf, *pos + 1)?;
            *pos += 5;
            Ok(Entry::Int(v as i64))
        }
        0xF4 => {
            let v = le_i64(buf, *pos + 1)?;
            *pos += 9;
            Ok(Entry::Int(v))
        }
        0xF0 => {
            let len = be_u32(buf, *pos + 1)? as usize;
            *pos += 5;
            Ok(Entry::Bytes(take(buf, pos, len)?))
        }
        _ => Err(Error::new(ErrorKind::BadEncoding, format!("unknown listpack encoding byte {b0:#04x}"))),
    }
}

fn byte_at(buf: &[u8], pos: usize) -> Result<u8> {
    buf.get(pos)
        .copied()
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack entry runs past end of blob"))
}

fn take(buf: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>> {
    let end = *pos + len;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack string entry runs past end of blob"))?;
    *pos = end;
    Ok(slice.to_vec())
}

fn be_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let b = buf
        .get(pos..pos + 4)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack 32-bit length runs past end of blob"))?;
    Ok(u32::from_be_bytes(b.try_into().unwrap()))
}

fn le_i16(buf: &[u8], pos: usize) -> Result<i16> {
    let b = buf
        .get(pos..pos + 2)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack int16 runs past end of blob"))?;
    Ok(i16::from_le_bytes(b.try_into().unwrap()))
}

fn le_i32(buf: &[u8], pos: usize) -> Result<i32> {
    let b = buf
        .get(pos..pos + 4)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack int32 runs past end of blob"))?;
    Ok(i32::from_le_bytes(b.try_into().unwrap()))
}

fn le_i64(buf: &[u8], pos: usize) -> Result<i64> {
    let b = buf
        .get(pos..pos + 8)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "listpack int64 runs past end of blob"))?;
    Ok(i64::from_le_bytes(b.try_into().unwrap()))
}

/// Test-only listpack encoder, ASCII-only entries short enough (<= 20
/// bytes) to always take the 6-bit string encoding, so every encoded
/// entry's backlen is a single byte. Only used by the property test below.
#[cfg(test)]
fn encode_ascii_listpack(entries: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    for s in entries {
        let bytes = s.as_bytes();
        assert!(bytes.len() <= 63);
        let entry_start = body.len();
        body.push(0x80 | bytes.len() as u8);
        body.extend_from_slice(bytes);
        let entry_len = body.len() - entry_start;
        body.push(entry_len as u8); // backlen_size(entry_len) == 1 while entry_len <= 127
    }
    body.push(0xFF);

    let mut buf = Vec::new();
    buf.extend_from_slice(&(6 + body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ascii_listpack_round_trips(words in proptest::collection::vec("[a-zA-Z0-9]{0,20}", 0..8)) {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            let buf = encode_ascii_listpack(&refs);
            let mut warnings = Warnings::default();
            let entries = decode_listpack(&buf, &mut warnings).unwrap();
            prop_assert!(warnings.into_vec().is_empty());
            let decoded: Vec<String> = entries
                .into_iter()
                .map(|e| String::from_utf8(e.into_bytes()).unwrap())
                .collect();
            prop_assert_eq!(decoded, words);
        }
    }
}

#[test]
fn test_decode_simple_listpack() {
    let mut buf = vec![0u8; 6];
    // entry "f1": 6-bit length string, len=2
    buf.push(0x80 | 2);
    buf.extend_from_slice(b"f1");
    buf.push(3); // backlen for a 3-byte entry (1 encoding byte + 2 payload)
    // entry 7-bit uint 42
    buf.push(42);
    buf.push(1); // backlen for a 1-byte entry
    buf.push(0xFF);
    let mut warnings = Warnings::default();
    let entries = decode_listpack(&buf, &mut warnings).unwrap();
    assert_eq!(entries, vec![Entry::Bytes(b"f1".to_vec()), Entry::Int(42)]);
    assert!(warnings.into_vec().is_empty());
}
