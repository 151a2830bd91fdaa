use crate::error::{Error, ErrorKind, Result};

#[cfg(test)]
use test_log::test;

/// Decodes an intset blob (§4.3): a header giving the per-entry encoding
/// width in bytes (2, 4, or 8) and entry count, followed by that many
/// little-endian signed integers of that width.
pub(crate) fn decode_intset(buf: &[u8]) -> Result<Vec<i64>> {
    if buf.len() < 8 {
        return Err(Error::new(ErrorKind::BadEncoding, "intset blob shorter than its 8-byte header"));
    }
    let width = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let count = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    if !matches!(width, 2 | 4 | 8) {
        return Err(Error::new(ErrorKind::BadEncoding, format!("intset width {width} not in {{2,4,8}}")));
    }
    let mut pos = 8;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let slice = buf
            .get(pos..pos + width)
            .ok_or_else(|| Error::new(ErrorKind::BadEncoding, format!("intset entry {i} runs past end of blob")))?;
        let v = match width {
            2 => i16::from_le_bytes(slice.try_into().unwrap()) as i64,
            4 => i32::from_le_bytes(slice.try_into().unwrap()) as i64,
            8 => i64::from_le_bytes(slice.try_into().unwrap()),
            _ => unreachable!(),
        };
        out.push(v);
        pos += width;
    }
    Ok(out)
}

#[test]
fn test_decode_intset_widths() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&2u32.to_le_bytes());
    buf.extend_from_slice(&1i32.to_le_bytes());
    buf.extend_from_slice(&(-5i32).to_le_bytes());
    assert_eq!(decode_intset(&buf).unwrap(), vec![1, -5]);
}

#[test]
fn test_decode_intset_bad_width() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&3u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    let err = decode_intset(&buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadEncoding);
}
