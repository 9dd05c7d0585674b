//! C-DNS output side
//!
//! Everything between a matched transaction and bytes on disk: the
//! compressing stream sinks, the output path engine with its rotation
//! windows, and the block writer orchestrating file framing, block
//! accumulation and emission.

mod error;
mod rotate;
mod stream;
mod writer;

pub use error::{Result, WriterError};
pub use rotate::OutputPattern;
pub use stream::{StreamSink, STDOUT_NAME};
pub use writer::BlockCborWriter;
