//! tagpost-reader: emits one JSON line per card presentation on stdout.
//!
//! Tag presentations are read as `<uid-hex> <card text>` lines from stdin or
//! from `--input`, which keeps the device driver in a separate program. A
//! FIFO given as `--input` is held open for writing as well, so the reader
//! keeps running while the driver restarts. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tagpost_hardware::{LineTagSource, ReaderConfig, ReaderError, ReaderProcess};
use tokio::io::AsyncRead;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type TagInput = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Parser)]
#[command(name = "tagpost-reader", version, about = "Validate and emit card presentations")]
struct Args {
    /// Key the card suffixes were provisioned with
    #[arg(long = "presharedkey", env = "TAGPOST_PRESHARED_KEY")]
    pre_shared_key: String,

    /// Seconds to suppress repeated reads of the same card
    #[arg(long, env = "TAGPOST_LINGER", default_value_t = tagpost_core::constants::DEFAULT_LINGER_SECS)]
    linger: u64,

    /// Emit diagnostic records for every read step
    #[arg(long)]
    debug: bool,

    /// File or FIFO to read tag presentations from instead of stdin
    #[arg(long, env = "TAGPOST_READER_INPUT")]
    input: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Reader failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    if args.linger == 0 {
        return Err(ReaderError::configuration("--linger must be at least 1 second").into());
    }

    let config = ReaderConfig {
        pre_shared_key: args.pre_shared_key,
        linger: Duration::from_secs(args.linger),
        debug: args.debug,
    };
    let (input, name): (TagInput, String) = match &args.input {
        Some(path) => {
            let file = open_input(path)
                .await
                .with_context(|| format!("opening tag input {}", path.display()))?;
            info!(input = %path.display(), "Reading tags from file");
            (Box::pin(file) as TagInput, path.display().to_string())
        }
        None => (Box::pin(tokio::io::stdin()) as TagInput, "stdin".to_string()),
    };
    let source = LineTagSource::new(input, name);

    ReaderProcess::new(source, tokio::io::stdout(), config)
        .run()
        .await
        .context("reader process")?;
    Ok(())
}

async fn open_input(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        // Our own write end keeps the FIFO from reporting EOF between writers.
        if tokio::fs::metadata(path).await?.file_type().is_fifo() {
            options.write(true);
        }
    }
    options.open(path).await
}
