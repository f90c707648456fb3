//! Tag source fed by text lines.
//!
//! Each line describes one presentation as `<uid-hex> <card text>`, for
//! example `04a1b2c3d4 alice,1f2e3d`. Blank lines are skipped. This lets the
//! reader run against a pipe from any external driver, or a file for replay.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::trace;

use crate::{ReaderError, Result, TagRead, TagSource};

/// Longest accepted input line.
const MAX_INPUT_LINE: usize = 1024;

pub struct LineTagSource<R> {
    lines: FramedRead<R, LinesCodec>,
    name: String,
}

impl<R: AsyncRead + Unpin + Send> LineTagSource<R> {
    pub fn new(input: R, name: impl Into<String>) -> Self {
        Self {
            lines: FramedRead::new(input, LinesCodec::new_with_max_length(MAX_INPUT_LINE)),
            name: name.into(),
        }
    }
}

/// Parse one `<uid-hex> <card text>` line.
///
/// # Errors
/// Returns `ReaderError::InvalidData` if the UID is not hex.
pub fn parse_line(line: &str) -> Result<TagRead> {
    let line = line.trim_start();
    let (uid, text) = line.split_once(' ').unwrap_or((line, ""));
    let uid = hex::decode(uid)
        .map_err(|e| ReaderError::invalid_data(format!("bad UID {uid:?}: {e}")))?;
    Ok(TagRead::new(uid, text))
}

impl<R: AsyncRead + Unpin + Send> TagSource for LineTagSource<R> {
    async fn read_tag(&mut self) -> Result<Option<TagRead>> {
        loop {
            match self.lines.next().await {
                None => return Ok(None),
                Some(Err(LinesCodecError::Io(e))) => return Err(ReaderError::Io(e)),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    return Err(ReaderError::invalid_data(format!(
                        "input line longer than {MAX_INPUT_LINE} bytes"
                    )));
                }
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => {
                    trace!(source = %self.name, line = %line, "Input line");
                    return parse_line(&line).map(Some);
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
