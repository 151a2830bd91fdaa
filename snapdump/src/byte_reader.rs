use std::collections::VecDeque;
use std::io::Read;

use crate::error::{Error, ErrorKind, Result};

#[cfg(test)]
use test_log::test;

const FILL_CHUNK: usize = 4096;

/// Buffered, positional, forward-only reader over anything `Read`. Short
/// reads are hard errors; the only legitimate end of stream is exactly at
/// the `EOF` opcode, which callers check for with [`ByteReader::at_eof`]
/// before asking for more bytes.
///
/// Carries a small context stack so error messages built from it can
/// describe where in the value tree they fired, without every decoder
/// function threading that information through its return type.
pub struct ByteReader<R> {
    inner: R,
    buf: VecDeque<u8>,
    pos: u64,
    context: Vec<String>,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        ByteReader {
            inner,
            buf: VecDeque::new(),
            pos: 0,
            context: Vec::new(),
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn push_context(&mut self, label: impl Into<String>) {
        self.context.push(label.into());
    }

    pub fn pop_context(&mut self) {
        self.context.pop();
    }

    pub fn context_trail(&self) -> Vec<String> {
        self.context.clone()
    }

    fn fill(&mut self, n: usize) -> std::io::Result<()> {
        while self.buf.len() < n {
            let mut tmp = [0_u8; FILL_CHUNK];
            let want = (n - self.buf.len()).min(tmp.len());
            let read = self.inner.read(&mut tmp[..want])?;
            if read == 0 {
                break;
            }
            self.buf.extend(tmp[..read].iter().copied());
        }
        Ok(())
    }

    fn eof_error(&self, wanted: usize, have: usize) -> Error {
        Error::new(
            ErrorKind::UnexpectedEof,
            format!(
                "wanted {wanted} bytes at position {}, only {have} available (context: {:?})",
                self.pos, self.context
            ),
        )
    }

    /// True if no more bytes are available. Does not consume anything.
    pub fn at_eof(&mut self) -> Result<bool> {
        self.fill(1)?;
        Ok(self.buf.is_empty())
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n)?;
        if self.buf.len() < n {
            return Err(self.eof_error(n, self.buf.len()));
        }
        Ok(self.buf.iter().take(n).copied().collect())
    }

    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n)?;
        if self.buf.len() < n {
            return Err(self.eof_error(n, self.buf.len()));
        }
        let out: Vec<u8> = self.buf.drain(..n).collect();
        self.pos += n as u64;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_exact(n)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_le_u16(&mut self) -> Result<u16> {
        let b = self.read_exact(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_le_u32(&mut self) -> Result<u32> {
        let b = self.read_exact(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_le_u64(&mut self) -> Result<u64> {
        let b = self.read_exact(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_be_u16(&mut self) -> Result<u16> {
        let b = self.read_exact(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_be_u32(&mut self) -> Result<u32> {
        let b = self.read_exact(4)?;
        Ok(u32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_be_u64(&mut self) -> Result<u64> {
        let b = self.read_exact(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }
}

#[test]
fn test_read_exact_and_position() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![1, 2, 3, 4, 5]));
    assert_eq!(rd.read_exact(2).unwrap(), vec![1, 2]);
    assert_eq!(rd.position(), 2);
    assert_eq!(rd.read_exact(3).unwrap(), vec![3, 4, 5]);
    assert_eq!(rd.position(), 5);
}

#[test]
fn test_peek_does_not_consume() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0xAA, 0xBB, 0xCC]));
    assert_eq!(rd.peek(2).unwrap(), vec![0xAA, 0xBB]);
    assert_eq!(rd.position(), 0);
    assert_eq!(rd.read_u8().unwrap(), 0xAA);
}

#[test]
fn test_short_read_is_eof_error() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![1, 2]));
    let err = rd.read_exact(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn test_le_be_numbers() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![0x01, 0x00, 0x00, 0x01]));
    assert_eq!(rd.read_le_u16().unwrap(), 1);
    assert_eq!(rd.read_be_u16().unwrap(), 1);
}

#[test]
fn test_at_eof() {
    let mut rd = ByteReader::new(std::io::Cursor::new(vec![1]));
    assert!(!rd.at_eof().unwrap());
    rd.read_u8().unwrap();
    assert!(rd.at_eof().unwrap());
}
