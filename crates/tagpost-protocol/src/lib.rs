//! Wire formats spoken by the tagpost node.
//!
//! - [`LineFramer`]: incremental framing of the reader byte stream
//! - [`ReaderLine`]: classification and validation of one reader frame
//! - [`ReaderCodec`]: tokio encoder used by the reader process
//! - [`Announcement`]: collector discovery datagrams

pub mod announcement;
pub mod codec;
pub mod framer;
pub mod reader_line;

pub use announcement::Announcement;
pub use codec::ReaderCodec;
pub use framer::{DrainFrames, LineFramer, MAX_LINE_LEN};
pub use reader_line::{Diagnostic, ReaderLine};
