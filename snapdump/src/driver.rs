//! Top-level opcode dispatch (§4.5): walks the body of the snapshot,
//! tracking the active database and any metadata (expiry/idle/freq)
//! pending for the next key, and assembles the [`SnapshotResult`] the
//! rest of this crate exists to produce.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::byte_reader::ByteReader;
use crate::crc::Crc64;
use crate::error::{Error, ErrorKind, Result};
use crate::primitives::{read_plain_length as plain_length, read_string};
use crate::value::{decode_value, is_known_type_tag, is_module_tag, LogicalValue};
use crate::warning::{Warning, WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_IDLE: u8 = 0xF9;
const OP_FREQ: u8 = 0xF8;
const OP_EXPIRE_MS: u8 = 0xFC;
const OP_EXPIRE_SEC: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

/// The only tunable this crate exposes (§11): the byte-string size
/// ceiling a single string/container payload may declare before it is
/// replaced with a placeholder and skipped.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub max_string_len: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            max_string_len: 100 * 1024 * 1024,
        }
    }
}

/// One key in the snapshot, with whatever metadata opcodes preceded it
/// (§3). `expiry_ms`/`idle_seconds`/`freq` are `None` unless the opcode
/// immediately before this key's type tag set them.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRecord {
    pub key: Vec<u8>,
    pub value: LogicalValue,
    pub expiry_ms: Option<i64>,
    pub idle_seconds: Option<u64>,
    pub freq: Option<u8>,
    pub db_index: u64,
}

/// The decoder's entire output (§3): the parsed magic version, the AUX
/// fields in insertion order, every key in input order, and the
/// diagnostics (checksum outcome, warnings, whether the pass ran to
/// completion) a caller needs to judge how much to trust the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotResult {
    pub magic_version: u32,
    pub aux: Vec<(Vec<u8>, Vec<u8>)>,
    pub keys: Vec<KeyRecord>,
    pub checksum_ok: Option<bool>,
    pub warnings: Vec<Warning>,
    pub incomplete: bool,
}

#[derive(Debug, Default, Clone)]
struct PendingMeta {
    expiry_ms: Option<i64>,
    idle_seconds: Option<u64>,
    freq: Option<u8>,
}

impl PendingMeta {
    fn is_empty(&self) -> bool {
        self.expiry_ms.is_none() && self.idle_seconds.is_none() && self.freq.is_none()
    }
}

/// The accumulators a single pass builds up, factored out of
/// `decode_snapshot` so [`step`] can mutate them without the caller losing
/// access to whatever had already been collected when the pass ends early.
#[derive(Debug, Default)]
struct DecodeState {
    aux: Vec<(Vec<u8>, Vec<u8>)>,
    keys: Vec<KeyRecord>,
    db_index: u64,
    pending: PendingMeta,
    checksum_ok: Option<bool>,
}

/// What [`step`] did with the one opcode it consumed.
enum StepOutcome {
    /// A metadata or key record was handled; keep looping.
    Continue,
    /// Reached `0xFF` with a checksum read: a normal end of stream.
    StopClean,
    /// The stream ended, or hit something unrecognisable, before a clean
    /// `0xFF`: the pass stops here but whatever was already decoded stands.
    StopIncomplete,
}

/// A [`Read`] adapter that feeds every byte it passes through into a
/// shared CRC64 accumulator, so the driver can checksum the stream as it
/// decodes rather than buffering the whole body up front.
struct CrcRead<R> {
    inner: R,
    crc: Rc<RefCell<Crc64>>,
}

impl<R: Read> Read for CrcRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.borrow_mut().update(&buf[..n]);
        Ok(n)
    }
}

/// Decodes one snapshot from `input` start to finish (§6). A magic
/// mismatch before any key has been read is the one case with nothing to
/// preserve, so it still returns `Err` directly; every fatal error
/// encountered once the loop is under way (`Io`, `UnexpectedEof`,
/// `BadLzf`, or any other error [`step`] can't recover from locally) stops
/// the pass with `SnapshotResult.incomplete` set, returning whatever keys
/// were already collected rather than discarding them (§5).
pub fn decode_snapshot<R: Read>(input: R, opts: &DecodeOptions) -> Result<SnapshotResult> {
    let crc = Rc::new(RefCell::new(Crc64::new()));
    let mut rd = ByteReader::new(CrcRead { inner: input, crc: crc.clone() });
    let mut warnings = Warnings::default();

    let magic = rd.read_exact(5)?;
    if magic != *b"REDIS" {
        return Err(Error::new(ErrorKind::MagicMismatch, "missing REDIS magic prefix"));
    }
    let version_digits = rd.read_exact(4)?;
    let version_str = String::from_utf8(version_digits)
        .map_err(|_| Error::new(ErrorKind::MagicMismatch, "version field is not ASCII digits"))?;
    let magic_version: u32 = version_str
        .parse()
        .map_err(|_| Error::new(ErrorKind::MagicMismatch, format!("version field {version_str:?} is not numeric")))?;
    if magic_version > 12 {
        warnings.warn(WarningKind::UnsupportedVersion, format!("snapshot version {magic_version} is newer than the 12 this crate targets"));
    }

    let mut state = DecodeState::default();
    let mut incomplete = false;

    loop {
        match step(&mut rd, &crc, opts, &mut warnings, &mut state) {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::StopClean) => break,
            Ok(StepOutcome::StopIncomplete) => {
                incomplete = true;
                break;
            }
            Err(e) => {
                warnings.warn(WarningKind::ContainerDecodeError(e.kind()), format!("pass aborted, partial results returned: {e}"));
                incomplete = true;
                break;
            }
        }
    }

    Ok(SnapshotResult {
        magic_version,
        aux: state.aux,
        keys: state.keys,
        checksum_ok: state.checksum_ok,
        warnings: warnings.into_vec(),
        incomplete,
    })
}

/// Consumes one opcode (or type-tag record) from `rd` and folds its effect
/// into `state`. Recoverable per-key decode failures are handled here
/// (placeholder key pushed, pass continues); anything else bubbles up via
/// `?` for the caller to treat as ending the pass early without losing
/// `state`, which it still owns.
fn step<R: Read>(
    rd: &mut ByteReader<R>,
    crc: &Rc<RefCell<Crc64>>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    state: &mut DecodeState,
) -> Result<StepOutcome> {
    if rd.at_eof()? {
        warnings.warn(WarningKind::DroppedPendingMetadata, "input ended before an EOF opcode");
        return Ok(StepOutcome::StopIncomplete);
    }
    let opcode = rd.read_u8()?;
    match opcode {
        OP_AUX => {
            drop_pending_if_set(&mut state.pending, warnings);
            let key = read_string(rd, opts, warnings)?.into_bytes();
            let value = read_string(rd, opts, warnings)?.into_bytes();
            match state.aux.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => state.aux.push((key, value)),
            }
            Ok(StepOutcome::Continue)
        }
        OP_RESIZEDB => {
            drop_pending_if_set(&mut state.pending, warnings);
            let _hash_size = plain_length(rd)?;
            let _expires_size = plain_length(rd)?;
            Ok(StepOutcome::Continue)
        }
        OP_EXPIRE_MS => {
            if state.pending.expiry_ms.is_some() {
                warnings.warn(WarningKind::DroppedPendingMetadata, "expiry opcode stacked on an already-pending expiry");
            }
            state.pending.expiry_ms = Some(rd.read_le_u64()? as i64);
            Ok(StepOutcome::Continue)
        }
        OP_EXPIRE_SEC => {
            if state.pending.expiry_ms.is_some() {
                warnings.warn(WarningKind::DroppedPendingMetadata, "expiry opcode stacked on an already-pending expiry");
            }
            state.pending.expiry_ms = Some(rd.read_le_u32()? as i64 * 1000);
            Ok(StepOutcome::Continue)
        }
        OP_SELECTDB => {
            drop_pending_if_set(&mut state.pending, warnings);
            state.db_index = plain_length(rd)?;
            Ok(StepOutcome::Continue)
        }
        OP_FREQ => {
            if state.pending.freq.is_some() {
                warnings.warn(WarningKind::DroppedPendingMetadata, "freq opcode stacked on an already-pending freq");
            }
            state.pending.freq = Some(rd.read_u8()?);
            Ok(StepOutcome::Continue)
        }
        OP_IDLE => {
            if state.pending.idle_seconds.is_some() {
                warnings.warn(WarningKind::DroppedPendingMetadata, "idle opcode stacked on an already-pending idle");
            }
            state.pending.idle_seconds = Some(plain_length(rd)?);
            Ok(StepOutcome::Continue)
        }
        OP_EOF => {
            let computed = crc.borrow().finish();
            let stored = rd.read_le_u64()?;
            state.checksum_ok = if stored == 0 {
                None
            } else {
                let ok = stored == computed;
                if !ok {
                    warnings.warn(WarningKind::ChecksumMismatch, format!("stored crc64 {stored:#x} != computed {computed:#x}"));
                }
                Some(ok)
            };
            Ok(StepOutcome::StopClean)
        }
        tag if is_module_tag(tag) => {
            warnings.warn(WarningKind::ModuleSkipped, format!("module value type {tag} cannot be generically decoded; pass aborted"));
            Ok(StepOutcome::StopIncomplete)
        }
        tag if is_known_type_tag(tag) => {
            let key = read_string(rd, opts, warnings)?.into_bytes();
            match decode_value(rd, tag, opts, warnings) {
                Ok(value) => {
                    state.keys.push(KeyRecord {
                        key,
                        value,
                        expiry_ms: state.pending.expiry_ms.take(),
                        idle_seconds: state.pending.idle_seconds.take(),
                        freq: state.pending.freq.take(),
                        db_index: state.db_index,
                    });
                }
                Err(e) if !e.kind().is_fatal() => {
                    warnings.warn(
                        WarningKind::ContainerDecodeError(e.kind()),
                        format!("key {:?}: {e}", String::from_utf8_lossy(&key)),
                    );
                    state.keys.push(KeyRecord {
                        key,
                        value: LogicalValue::StringV(format!("<error decoding value: {e}>").into_bytes()),
                        expiry_ms: state.pending.expiry_ms.take(),
                        idle_seconds: state.pending.idle_seconds.take(),
                        freq: state.pending.freq.take(),
                        db_index: state.db_index,
                    });
                }
                Err(e) => return Err(e),
            }
            state.pending = PendingMeta::default();
            Ok(StepOutcome::Continue)
        }
        other => {
            warnings.warn(WarningKind::ContainerDecodeError(ErrorKind::BadEncoding), format!("unknown top-level opcode/type tag {other:#04x}; cannot resynchronise"));
            Ok(StepOutcome::StopIncomplete)
        }
    }
}

fn drop_pending_if_set(pending: &mut PendingMeta, warnings: &mut Warnings) {
    if !pending.is_empty() {
        warnings.warn(WarningKind::DroppedPendingMetadata, "pending expiry/idle/freq metadata dropped: not followed by a type tag");
        *pending = PendingMeta::default();
    }
}

#[test]
fn test_minimal_empty_db() {
    let bytes = vec![
        b'R', b'E', b'D', b'I', b'S', b'0', b'0', b'1', b'2', 0xFF, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert_eq!(result.magic_version, 12);
    assert!(result.aux.is_empty());
    assert!(result.keys.is_empty());
    assert_eq!(result.checksum_ok, None);
    assert!(!result.incomplete);
}

#[test]
fn test_single_string_key() {
    let mut bytes = b"REDIS0012".to_vec();
    bytes.push(0xFE);
    bytes.push(0x00); // select db 0
    bytes.push(0x00); // type tag 0 (string)
    bytes.push(0x05);
    bytes.extend_from_slice(b"hello");
    bytes.push(0x05);
    bytes.extend_from_slice(b"world");
    bytes.push(0xFF);
    bytes.extend_from_slice(&[0; 8]);

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert_eq!(result.keys.len(), 1);
    let k = &result.keys[0];
    assert_eq!(k.db_index, 0);
    assert_eq!(k.key, b"hello");
    assert_eq!(k.value, LogicalValue::StringV(b"world".to_vec()));
    assert_eq!(k.expiry_ms, None);
}

#[test]
fn test_expiring_key() {
    let mut bytes = b"REDIS0012".to_vec();
    bytes.push(0xFE);
    bytes.push(0x00);
    bytes.push(0xFC);
    bytes.extend_from_slice(&1_700_000_000_000u64.to_le_bytes());
    bytes.push(0x00);
    bytes.push(0x03);
    bytes.extend_from_slice(b"foo");
    bytes.push(0x03);
    bytes.extend_from_slice(b"bar");
    bytes.push(0xFF);
    bytes.extend_from_slice(&[0; 8]);

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert_eq!(result.keys.len(), 1);
    assert_eq!(result.keys[0].expiry_ms, Some(1_700_000_000_000));
}

#[test]
fn test_fatal_error_mid_pass_preserves_already_decoded_keys() {
    // A complete key, then an expire-ms opcode with a truncated 64-bit
    // payload: the read_le_u64 inside the OP_EXPIRE_MS arm hits UnexpectedEof,
    // which must not discard the "hello"->"world" key already collected.
    let mut bytes = b"REDIS0012".to_vec();
    bytes.push(0xFE);
    bytes.push(0x00);
    bytes.push(0x00);
    bytes.push(0x05);
    bytes.extend_from_slice(b"hello");
    bytes.push(0x05);
    bytes.extend_from_slice(b"world");
    bytes.push(0xFC);
    bytes.extend_from_slice(&[0x01, 0x02, 0x03]); // short by 5 bytes

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert!(result.incomplete);
    assert_eq!(result.keys.len(), 1);
    assert_eq!(result.keys[0].key, b"hello");
    assert_eq!(result.keys[0].value, LogicalValue::StringV(b"world".to_vec()));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::ContainerDecodeError(ErrorKind::UnexpectedEof)));
}

#[test]
fn test_magic_mismatch_reads_no_more_than_nine_bytes() {
    let bytes = b"NOTREDISxxxxxxxxxxxxxxxxx".to_vec();
    let err = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MagicMismatch);
}

#[test]
fn test_dropped_pending_metadata_without_following_key() {
    let mut bytes = b"REDIS0012".to_vec();
    bytes.push(0xFC);
    bytes.extend_from_slice(&1_700_000_000_000u64.to_le_bytes());
    bytes.push(0xFE);
    bytes.push(0x00);
    bytes.push(0xFF);
    bytes.extend_from_slice(&[0; 8]);

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert!(result.keys.is_empty());
    assert!(result.warnings.iter().any(|w| w.kind == WarningKind::DroppedPendingMetadata));
}

#[test]
fn test_aux_field_duplicate_overwrites() {
    let mut bytes = b"REDIS0012".to_vec();
    for (k, v) in [("k", "v1"), ("k", "v2")] {
        bytes.push(0xFA);
        bytes.push(k.len() as u8);
        bytes.extend_from_slice(k.as_bytes());
        bytes.push(v.len() as u8);
        bytes.extend_from_slice(v.as_bytes());
    }
    bytes.push(0xFF);
    bytes.extend_from_slice(&[0; 8]);

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert_eq!(result.aux, vec![(b"k".to_vec(), b"v2".to_vec())]);
}

#[test]
fn test_checksum_mismatch_is_a_warning_not_fatal() {
    let mut bytes = b"REDIS0012".to_vec();
    bytes.push(0xFF);
    bytes.extend_from_slice(&0xdead_beef_u64.to_le_bytes());

    let result = decode_snapshot(std::io::Cursor::new(bytes), &DecodeOptions::default()).unwrap();
    assert_eq!(result.checksum_ok, Some(false));
    assert!(result.warnings.iter().any(|w| w.kind == WarningKind::ChecksumMismatch));
}
