use crate::containers::Entry;
use crate::error::{Error, ErrorKind, Result};
use crate::warning::{WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

/// Decodes a ziplist blob (§4.3) already extracted as a bounded byte
/// slice. A length-prefix or encoding error inside the blob aborts the
/// rest of the blob (a placeholder-free partial entry list is returned)
/// rather than the whole pass, per the container-local recovery rule.
pub(crate) fn decode_ziplist(buf: &[u8], warnings: &mut Warnings) -> Result<Vec<Entry>> {
    if buf.len() < 10 {
        return Err(Error::new(ErrorKind::BadEncoding, "ziplist blob shorter than its 10-byte header"));
    }
    let mut pos = 10; // total-len(4) + tail-offset(4) + entry-count(2)
    let mut entries = Vec::new();
    loop {
        if pos >= buf.len() {
            warnings.warn(WarningKind::ContainerDecodeError(ErrorKind::BadEncoding), "ziplist missing terminator byte");
            break;
        }
        if buf[pos] == 0xFF {
            pos += 1;
            break;
        }
        match parse_entry(buf, &mut pos) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warnings.warn(WarningKind::ContainerDecodeError(e.kind()), format!("ziplist entry {}: {e}", entries.len()));
                break;
            }
        }
    }
    if pos != buf.len() {
        warnings.warn(
            WarningKind::ContainerDecodeError(ErrorKind::BadEncoding),
            format!("ziplist left {} trailing bytes unconsumed", buf.len() - pos),
        );
    }
    Ok(entries)
}

fn parse_entry(buf: &[u8], pos: &mut usize) -> Result<Entry> {
    let prevlen_byte = byte_at(buf, *pos)?;
    if prevlen_byte < 254 {
        *pos += 1;
    } else {
        *pos += 5;
    }
    let b0 = byte_at(buf, *pos)?;
    match b0 >> 6 {
        0b00 => {
            let len = (b0 & 0x3f) as usize;
            *pos += 1;
            Ok(Entry::Bytes(take(buf, pos, len)?))
        }
        0b01 => {
            let b1 = byte_at(buf, *pos + 1)?;
            let len = (((b0 & 0x3f) as usize) << 8) | b1 as usize;
            *pos += 2;
            Ok(Entry::Bytes(take(buf, pos, len)?))
        }
        0b10 => {
            let len = be_u32(buf, *pos + 1)? as usize;
            *pos += 5;
            Ok(Entry::Bytes(take(buf, pos, len)?))
        }
        0b11 => match b0 {
            0xC0 => {
                let v = le_i16(buf, *pos + 1)?;
                *pos += 3;
                Ok(Entry::Int(v as i64))
            }
            0xD0 => {
                let v = le_i32(buf, *pos + 1)?;
                *pos += 5;
                Ok(Entry::Int(v as i64))
            }
            0xE0 => {
                let v = le_i64(buf, *pos + 1)?;
                *pos += 9;
                Ok(Entry::Int(v))
            }
            0xF0 => {
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
            0xFE => {
                let v = byte_at(buf, *pos + 1)? as i8;
                *pos += 2;
                Ok(Entry::Int(v as i64))
            }
            _ if (b0 & 0x0f) >= 1 && (b0 & 0x0f) <= 13 => {
                let v = (b0 & 0x0f) as i64 - 1;
                *pos += 1;
                Ok(Entry::Int(v))
            }
            _ => Err(Error::new(ErrorKind::BadEncoding, format!("unknown ziplist encoding byte {b0:#04x}"))),
        },
        _ => unreachable!(),
    }
}

fn byte_at(buf: &[u8], pos: usize) -> Result<u8> {
    buf.get(pos)
        .copied()
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist entry runs past end of blob"))
}

fn take(buf: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>> {
    let end = *pos + len;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist string entry runs past end of blob"))?;
    *pos = end;
    Ok(slice.to_vec())
}

fn be_u32(buf: &[u8], pos: usize) -> Result<u32> {
    let b = buf
        .get(pos..pos + 4)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist 32-bit length runs past end of blob"))?;
    Ok(u32::from_be_bytes(b.try_into().unwrap()))
}

fn le_i16(buf: &[u8], pos: usize) -> Result<i16> {
    let b = buf
        .get(pos..pos + 2)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist int16 runs past end of blob"))?;
    Ok(i16::from_le_bytes(b.try_into().unwrap()))
}

fn le_i32(buf: &[u8], pos: usize) -> Result<i32> {
    let b = buf
        .get(pos..pos + 4)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist int32 runs past end of blob"))?;
    Ok(i32::from_le_bytes(b.try_into().unwrap()))
}

fn le_i64(buf: &[u8], pos: usize) -> Result<i64> {
    let b = buf
        .get(pos..pos + 8)
        .ok_or_else(|| Error::new(ErrorKind::BadEncoding, "ziplist int64 runs past end of blob"))?;
    Ok(i64::from_le_bytes(b.try_into().unwrap()))
}

/// Test-only ziplist encoder, ASCII entries short enough (<= 63 bytes) to
/// always take the 6-bit string encoding, so every entry's prevlen stays
/// under the 254-byte threshold and fits in a single byte. Only used to
/// build inputs for the round-trip property below.
#[cfg(test)]
fn encode_ascii_ziplist(entries: &[&str]) -> Vec<u8> {
    let mut buf = vec![0u8; 10];
    let mut prev_len: u8 = 0;
    for s in entries {
        let bytes = s.as_bytes();
        assert!(bytes.len() <= 0x3f);
        buf.push(prev_len);
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(bytes);
        prev_len = (1 + bytes.len()) as u8;
    }
    buf.push(0xFF);
    buf
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ascii_ziplist_round_trips(words in proptest::collection::vec("[a-zA-Z0-9]{0,20}", 0..8)) {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            let buf = encode_ascii_ziplist(&refs);
            let mut warnings = Warnings::default();
            let entries = decode_ziplist(&buf, &mut warnings).unwrap();
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
fn test_decode_simple_ziplist() {
    // header: total_len(4 LE, dummy) + tail_offset(4 LE, dummy) + count(2 LE)=2
    let mut buf = vec![0u8; 10];
    buf[8] = 2;
    buf[9] = 0;
    // entry 1: prevlen=0, encoding 0x03 "abc"
    buf.push(0);
    buf.push(0x03);
    buf.extend_from_slice(b"abc");
    // entry 2: prevlen=5 (1 + len of "abc" encoding byte), immediate int 5 -> 0xF0+1=0xF6 means xxxx=6, val=5
    buf.push(5);
    buf.push(0xF6);
    buf.push(0xFF);
    let mut warnings = Warnings::default();
    let entries = decode_ziplist(&buf, &mut warnings).unwrap();
    assert_eq!(entries, vec![Entry::Bytes(b"abc".to_vec()), Entry::Int(5)]);
    assert!(warnings.into_vec().is_empty());
}
