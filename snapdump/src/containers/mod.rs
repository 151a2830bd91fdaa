mod intset;
mod listpack;
mod quicklist;
mod ziplist;

pub(crate) use intset::decode_intset;
pub(crate) use listpack::decode_listpack;
pub(crate) use quicklist::{decode_quicklist, NodeKind};
pub(crate) use ziplist::decode_ziplist;

/// One packed-container entry: either a byte string or an integer that
/// the enclosing container chose to store in one of its compact integer
/// encodings. Rendered to bytes on demand, since whether an integer entry
/// should become decimal ASCII or a float depends on the enclosing
/// logical value (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    Bytes(Vec<u8>),
    Int(i64),
}

impl Entry {
    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            Entry::Bytes(b) => b,
            Entry::Int(i) => i.to_string().into_bytes(),
        }
    }
}
