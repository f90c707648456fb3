//! Reader side of the tagpost node.
//!
//! The node never talks to the card reader itself. It starts a reader
//! process and consumes its standard output, one line per presentation. This
//! crate implements that process on top of a pluggable [`TagSource`]:
//!
//! ```text
//! TagSource ──> CardText / validate_card ──> Debouncer ──> ReaderCodec ──> stdout
//! ```
//!
//! # Sources
//!
//! - [`LineTagSource`]: `<uid-hex> <card text>` lines from any async reader,
//!   used by the `tagpost-reader` binary with stdin
//! - [`MockTagSource`]: channel-driven source for tests
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tagpost_hardware::{LineTagSource, ReaderConfig, ReaderProcess};
//!
//! # async fn example() -> tagpost_hardware::Result<()> {
//! let source = LineTagSource::new(tokio::io::stdin(), "stdin");
//! let config = ReaderConfig {
//!     pre_shared_key: "secret".to_string(),
//!     linger: Duration::from_secs(1),
//!     debug: false,
//! };
//! ReaderProcess::new(source, tokio::io::stdout(), config).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod debounce;
pub mod error;
pub mod line_source;
pub mod mock;
pub mod process;
pub mod traits;
pub mod validation;

pub use debounce::Debouncer;
pub use error::{ReaderError, Result};
pub use line_source::LineTagSource;
pub use mock::{MockTagHandle, MockTagSource};
pub use process::{ReaderConfig, ReaderProcess, ReaderStats};
pub use traits::{TagRead, TagSource};
pub use validation::{CardText, expected_suffix, validate_card};
