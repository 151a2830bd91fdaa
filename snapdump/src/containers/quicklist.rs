use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::containers::{decode_listpack, decode_ziplist, Entry};
use crate::driver::DecodeOptions;
use crate::error::Result;
use crate::primitives::{read_plain_length, read_string};
use crate::warning::Warnings;

#[cfg(test)]
use test_log::test;

/// Which packed format each node of a quicklist carries, per type tags 14
/// (ziplist nodes) and 18 (listpack nodes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Ziplist,
    Listpack,
}

/// Decodes a quicklist envelope (§4.3): a length prefix giving the node
/// count, then that many length-prefixed byte strings, each itself a
/// ziplist or listpack blob. The logical value is every node's entries
/// concatenated in order.
pub(crate) fn decode_quicklist<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    kind: NodeKind,
) -> Result<Vec<Entry>> {
    let node_count = read_plain_length(rd)?;
    let mut entries = Vec::new();
    for i in 0..node_count {
        warnings.push_context(format!("quicklist node {i}"));
        let result = decode_one_node(rd, opts, warnings, kind);
        warnings.pop_context();
        entries.append(&mut result?);
    }
    Ok(entries)
}

fn decode_one_node<R: Read>(
    rd: &mut ByteReader<R>,
    opts: &DecodeOptions,
    warnings: &mut Warnings,
    kind: NodeKind,
) -> Result<Vec<Entry>> {
    let node = read_string(rd, opts, warnings)?.into_bytes();
    match kind {
        NodeKind::Ziplist => decode_ziplist(&node, warnings),
        NodeKind::Listpack => decode_listpack(&node, warnings),
    }
}

#[test]
fn test_decode_quicklist_single_ziplist_node() {
    let mut zl = vec![0u8; 10];
    zl[8] = 1;
    zl[9] = 0;
    zl.push(0);
    zl.push(0x03);
    zl.extend_from_slice(b"abc");
    zl.push(0xFF);

    let mut buf = vec![1]; // node count = 1 (6-bit length prefix)
    buf.push(zl.len() as u8); // node string length prefix (6-bit)
    buf.extend_from_slice(&zl);

    let mut rd = ByteReader::new(std::io::Cursor::new(buf));
    let opts = DecodeOptions::default();
    let mut warnings = Warnings::default();
    let entries = decode_quicklist(&mut rd, &opts, &mut warnings, NodeKind::Ziplist).unwrap();
    assert_eq!(entries, vec![Entry::Bytes(b"abc".to_vec())]);
}
