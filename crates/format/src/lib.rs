//! C-DNS wire format
//!
//! The block-structured CBOR encoding for DNS transaction archives:
//! a streaming CBOR encoder, the field-key registry both writer and
//! reader must share, the per-file block parameters, and the per-block
//! data accumulator with its interning tables.

pub mod block;
pub mod cbor;
pub mod fields;
pub mod params;

pub use block::{
    BlockData, ClassType, HeaderList, Index, QueryResponseExtraInfo, QueryResponseItem,
    QueryResponseSignature, Question, ResourceRecord, Timestamp,
};
pub use cbor::CborEncoder;
pub use fields::{FILE_FORMAT_ID, MAJOR_FORMAT_VERSION, MINOR_FORMAT_VERSION, PRIVATE_VERSION};
pub use params::{BlockParameters, CollectionParameters, StorageHints, StorageParameters};
