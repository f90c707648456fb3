//! Tokio codec for the reader side of the line protocol.
//!
//! The reader process writes its output through a
//! `FramedWrite<Stdout, ReaderCodec>`; every [`ReaderLine`] becomes exactly
//! one `\n`-terminated line. Decoding on the node side is done by
//! [`LineFramer`](crate::LineFramer) because the control loop reads raw chunks
//! and hands them over in batches.
//!
//! ```rust,no_run
//! use futures::SinkExt;
//! use tokio_util::codec::FramedWrite;
//! use tagpost_protocol::{ReaderCodec, ReaderLine};
//!
//! # async fn example() -> tagpost_core::Result<()> {
//! let mut out = FramedWrite::new(tokio::io::stdout(), ReaderCodec::new());
//! out.send(ReaderLine::ReaderError("collision".to_string())).await?;
//! # Ok(())
//! # }
//! ```

use bytes::{BufMut, BytesMut};
use tagpost_core::{Error, constants::LINE_TERMINATOR};
use tokio_util::codec::Encoder;

use crate::ReaderLine;

/// Encoder turning [`ReaderLine`]s into newline-terminated frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderCodec;

impl ReaderCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<ReaderLine> for ReaderCodec {
    type Error = Error;

    fn encode(&mut self, item: ReaderLine, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.encode()?;
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LineFramer;
    use tagpost_core::{CardId, ScanRecord, SignatureSuffix};

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = ReaderCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(ReaderLine::ReaderError("no tag".to_string()), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"E no tag\n");
    }

    #[test]
    fn test_encoded_stream_frames_back() {
        let mut codec = ReaderCodec::new();
        let mut dst = BytesMut::new();
        let record = ScanRecord::new(
            CardId::new(99),
            "carol",
            SignatureSuffix::new("ffffff").unwrap(),
            true,
        )
        .unwrap();

        codec
            .encode(ReaderLine::Record(record.clone()), &mut dst)
            .unwrap();
        codec
            .encode(ReaderLine::ReaderError("x".to_string()), &mut dst)
            .unwrap();

        let mut framer = LineFramer::new();
        framer.feed(&dst);
        let lines: Vec<ReaderLine> = framer
            .drain_frames()
            .map(|frame| ReaderLine::parse(&frame).unwrap())
            .collect();

        assert_eq!(
            lines,
            vec![
                ReaderLine::Record(record),
                ReaderLine::ReaderError("x".to_string())
            ]
        );
    }
}
