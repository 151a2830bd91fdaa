use crate::error::{Error, ErrorKind, Result};

#[cfg(test)]
use test_log::test;

/// Expands an LZF-compressed byte string per §4.2: control byte `c` below
/// 32 introduces `c+1` literal bytes; otherwise the top 3 bits of `c` give
/// a back-reference length (extended by one more byte when they're all
/// set) and the low 5 bits plus the following byte give a 13-bit
/// back-reference offset.
pub(crate) fn decompress(input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_len.min(1 << 20));
    let mut i = 0;
    while i < input.len() {
        let ctrl = input[i];
        i += 1;
        if ctrl < 32 {
            let len = ctrl as usize + 1;
            let end = i + len;
            let chunk = input.get(i..end).ok_or_else(|| {
                Error::new(ErrorKind::BadLzf, "literal run runs past end of compressed input")
            })?;
            out.extend_from_slice(chunk);
            i = end;
        } else {
            let mut len = (ctrl >> 5) as usize;
            if len == 7 {
                let extra = *input
                    .get(i)
                    .ok_or_else(|| Error::new(ErrorKind::BadLzf, "truncated extended match length"))?;
                len += extra as usize;
                i += 1;
            }
            len += 2;
            let low = *input
                .get(i)
                .ok_or_else(|| Error::new(ErrorKind::BadLzf, "truncated back-reference offset"))?;
            i += 1;
            let offset = (((ctrl & 0x1f) as usize) << 8) | low as usize;
            let start = out
                .len()
                .checked_sub(offset + 1)
                .ok_or_else(|| Error::new(ErrorKind::BadLzf, "back-reference points before output start"))?;
            if out.len() + len > uncompressed_len {
                return Err(Error::new(ErrorKind::BadLzf, "back-reference copy overruns declared uncompressed length"));
            }
            for k in 0..len {
                let byte = out[start + k];
                out.push(byte);
            }
        }
        if out.len() > uncompressed_len {
            return Err(Error::new(ErrorKind::BadLzf, "decompressed output exceeds declared length"));
        }
    }
    if out.len() != uncompressed_len {
        return Err(Error::new(
            ErrorKind::BadLzf,
            format!("decompressed {} bytes, expected {uncompressed_len}", out.len()),
        ));
    }
    Ok(out)
}

/// Trivial valid LZF encoder used only by tests: emits the input as a
/// sequence of literal runs, each as long as the format's 32-byte cap
/// allows. Never uses back-references, which is fine for round-trip
/// testing since `decompress` must accept it regardless.
#[cfg(test)]
pub(crate) fn compress_literal_only(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in input.chunks(32) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out
}

#[test]
fn test_literal_round_trip() {
    let data = b"hello, world, this is a literal run longer than thirty two bytes".to_vec();
    let compressed = compress_literal_only(&data);
    let decompressed = decompress(&compressed, data.len()).unwrap();
    assert_eq!(decompressed, data);
}

#[test]
fn test_back_reference() {
    // ctrl=0x05 -> literal run of 6 bytes "abcdef"
    // ctrl=0x20 -> (0x20>>5)=1, len=1+2=3, offset low byte 0x05 -> offset=5,
    // start = out.len() - (5+1) = 6-6 = 0, copies out[0..3] = "abc"
    let compressed = vec![0x05, b'a', b'b', b'c', b'd', b'e', b'f', 0x20, 0x05];
    let decompressed = decompress(&compressed, 9).unwrap();
    assert_eq!(decompressed, b"abcdefabc");
}

#[test]
fn test_out_of_range_offset_is_bad_lzf() {
    let compressed = vec![0x00, b'a', 0x20, 0x05];
    let err = decompress(&compressed, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadLzf);
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trip_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..65536)) {
            let compressed = compress_literal_only(&data);
            let decompressed = decompress(&compressed, data.len()).unwrap();
            prop_assert_eq!(decompressed, data);
        }
    }
}
