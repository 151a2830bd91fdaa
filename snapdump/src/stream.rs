//! Generic envelope walk for stream-typed values (type tags 15/19/21,
//! §4.4). Full stream reconstruction — entries, consumer groups, the
//! pending-entry lists — is an explicit non-goal (§1); this module only
//! walks the envelope accurately enough to consume the right number of
//! bytes and recover the logical element count for a summary, per §9's
//! "recognised enough to be safely skipped or summarised, not
//! reconstructed".

use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::driver::DecodeOptions;
use crate::error::Result;
use crate::primitives::{read_plain_length, read_string};
use crate::value::LogicalValue;
use crate::warning::{WarningKind, Warnings};

#[cfg(test)]
use test_log::test;

/// Which generation of the stream envelope is in play. Versions 2 and 3
/// add extra fixed fields after the core listpack radix tree; version 3
/// additionally adds a per-consumer `active_time` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamVersion {
    V1,
    V2,
    V3,
}

pub(crate) fn decode_stream<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    version: StreamVersion,
) -> Result<LogicalValue> {
    warnings.push_context("stream");
    let result = decode_stream_inner(rd, opts, warnings, version);
    warnings.pop_context();
    result
}

fn decode_stream_inner<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    version: StreamVersion,
) -> Result<LogicalValue> {
    let node_count = read_plain_length(rd)?;
    for _ in 0..node_count {
        let _key = read_string(rd, opts, warnings)?;
        let _listpack = read_string(rd, opts, warnings)?;
    }

    let length = read_plain_length(rd)?;
    let _last_id = read_stream_id(rd)?;

    if version != StreamVersion::V1 {
        let _first_id = read_stream_id(rd)?;
        let _max_deleted_id = read_stream_id(rd)?;
        let _entries_added = read_plain_length(rd)?;
    }

    let group_count = read_plain_length(rd)?;
    for _ in 0..group_count {
        skip_consumer_group(rd, opts, warnings, version)?;
    }

    warnings.warn(WarningKind::StreamSummarised, format!("stream with {length} elements, {group_count} consumer groups"));
    Ok(LogicalValue::StreamV {
        summary: format!("<stream with {length} elements>"),
        count: Some(length),
    })
}

fn skip_consumer_group<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    version: StreamVersion,
) -> Result<()> {
    let _name = read_string(rd, opts, warnings)?;
    let _last_id = read_stream_id(rd)?;
    if version != StreamVersion::V1 {
        let _entries_read = read_plain_length(rd)?;
    }

    let pel_count = read_plain_length(rd)?;
    for _ in 0..pel_count {
        rd.skip(16)?; // raw stream ID: ms + seq, 8 bytes each
        rd.skip(8)?; // delivery_time, raw milliseconds
        let _delivery_count = read_plain_length(rd)?;
    }

    let consumer_count = read_plain_length(rd)?;
    for _ in 0..consumer_count {
        let _consumer_name = read_string(rd, opts, warnings)?;
        rd.skip(8)?; // seen_time
        if version == StreamVersion::V3 {
            rd.skip(8)?; // active_time
        }
        let consumer_pel_count = read_plain_length(rd)?;
        for _ in 0..consumer_pel_count {
            rd.skip(16)?; // raw stream ID referencing the global PEL
        }
    }
    Ok(())
}

fn read_stream_id<R: Read>(rd: &mut ByteReader<R>) -> Result<(u64, u64)> {
    let ms = read_plain_length(rd)?;
    let seq = read_plain_length(rd)?;
    Ok((ms, seq))
}

#[test]
fn test_decode_empty_stream_v3() {
    // 0 nodes, length=0, last_id (0,0), first_id (0,0), max_deleted (0,0),
    // entries_added=0, 0 groups.
    let buf = vec![0u8; 9];
    let mut rd = ByteReader::new(std::io::Cursor::new(buf));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let v = decode_stream(&mut rd, &opts, &mut warnings, StreamVersion::V3).unwrap();
    match v {
        LogicalValue::StreamV { count, .. } => assert_eq!(count, Some(0)),
        _ => panic!("expected StreamV"),
    }
    assert_eq!(warnings.into_vec().len(), 1);
}
