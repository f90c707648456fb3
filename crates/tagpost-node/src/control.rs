//! The node's single control loop.
//!
//! # Tick
//!
//! Every tick runs to completion before the loop waits again:
//!
//! 1. If the reader process has exited, drain what it left and stop.
//! 2. If the deliverer is connected, attempt exactly one delivery.
//! 3. Wait for the first of, in priority order:
//!    - reader output, handed to the [`ScanIngestor`]
//!    - a discovery datagram, handed to the [`DiscoveryListener`]
//!    - the identity refresh deadline
//!    - the status refresh deadline
//!    - nothing, if connected with events still pending, so the next
//!      delivery is not held up by an idle reader
//!
//! The wait is the only suspension point. Delivery, queue I/O and display
//! updates block the loop for their duration, which is why the deliverer
//! carries a finite timeout.
//!
//! # Shutdown
//!
//! The loop ends when the reader exits or closes its output, or on a fatal
//! error. In every case the display is switched to its aborted state; on an
//! error the reader is also killed and reaped. The reader's exit status is
//! returned so the binary can propagate it.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tagpost_core::{EventContext, NetworkIdentity, QueueState};
use tagpost_network::{Deliverer, DiscoveryListener};
use tagpost_storage::EventQueue;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::display::{LastScan, StatusDisplay, StatusSnapshot};
use crate::error::{NodeError, NodeResult};
use crate::identity::{IdentitySource, location_badge};
use crate::ingest::{IngestReport, ScanIngestor};

/// Bytes read from the reader pipe per wakeup.
const READ_CHUNK: usize = 4096;

/// How long an exiting reader gets to flush or finish exiting.
const READER_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Timing and naming for the loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub device_name: String,
    pub name_linger: Duration,
    pub status_interval: Duration,
    pub identity_refresh: Duration,
}

impl From<&NodeConfig> for LoopSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            name_linger: config.name_linger(),
            status_interval: config.status_interval(),
            identity_refresh: config.identity_refresh(),
        }
    }
}

/// The reader subprocess and the read end of its stdout.
#[derive(Debug)]
pub struct ReaderChild {
    child: Child,
    stdout: ChildStdout,
    command: String,
}

impl ReaderChild {
    /// Start `command` with `args`, reading its stdout.
    ///
    /// The reader shares the node's stdin, where it takes tag lines from
    /// unless it was given an input file.
    ///
    /// # Errors
    /// Returns `NodeError::ReaderSpawn` if the process cannot be started.
    pub fn spawn(command: &str, args: &[String], env: &[(&str, String)]) -> NodeResult<Self> {
        let spawn_error = |source: std::io::Error| NodeError::ReaderSpawn {
            command: command.to_string(),
            source,
        };

        let mut child = Command::new(command)
            .args(args)
            .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;

        info!(command = %command, pid = ?child.id(), "Reader started");
        Ok(Self {
            child,
            stdout,
            command: command.to_string(),
        })
    }

    /// # Errors
    /// Returns `NodeError::ReaderSpawn` if the configured reader cannot be
    /// started.
    pub fn from_config(config: &NodeConfig) -> NodeResult<Self> {
        Self::spawn(
            &config.reader_command,
            &config.reader_args,
            &config.reader_env(),
        )
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> NodeResult<Option<ExitStatus>> {
        self.child.try_wait().map_err(NodeError::Reader)
    }

    async fn wait(&mut self) -> NodeResult<ExitStatus> {
        self.child.wait().await.map_err(NodeError::Reader)
    }

    /// Kill the reader if still running and reap it.
    async fn kill(&mut self) -> NodeResult<ExitStatus> {
        if self.try_wait()?.is_none() {
            warn!(command = %self.command, "Killing reader");
            if let Err(e) = self.child.start_kill() {
                debug!(error = %e, "Reader already gone");
            }
        }
        self.wait().await
    }
}

/// Mutable state shown on the display.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub identity: NetworkIdentity,
    pub badge: String,
    pub last_scan: Option<LastScan>,
}

pub struct ControlLoop<Q, I, D> {
    settings: LoopSettings,
    queue: Q,
    deliverer: Deliverer,
    discovery: DiscoveryListener,
    ingestor: ScanIngestor,
    identity: I,
    display: D,
    reader: ReaderChild,
    state: NodeState,
    identity_due: Instant,
    status_due: Instant,
}

impl<Q, I, D> ControlLoop<Q, I, D>
where
    Q: EventQueue,
    I: IdentitySource,
    D: StatusDisplay,
{
    pub fn new(
        settings: LoopSettings,
        queue: Q,
        deliverer: Deliverer,
        discovery: DiscoveryListener,
        mut identity: I,
        display: D,
        reader: ReaderChild,
    ) -> Self {
        let current = identity.refresh();
        let ingestor = ScanIngestor::new(EventContext {
            device_id: settings.device_name.clone(),
            location: current.location.clone(),
        });
        let now = Instant::now();

        Self {
            identity_due: now + settings.identity_refresh,
            status_due: now,
            state: NodeState {
                badge: location_badge(&current.location),
                identity: current,
                last_scan: None,
            },
            settings,
            queue,
            deliverer,
            discovery,
            ingestor,
            identity,
            display,
            reader,
        }
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn deliverer(&self) -> &Deliverer {
        &self.deliverer
    }

    /// Process id of the reader while it is running.
    pub fn reader_id(&self) -> Option<u32> {
        self.reader.id()
    }

    pub fn discovery(&self) -> &DiscoveryListener {
        &self.discovery
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Run until the reader exits; returns its exit status.
    ///
    /// # Errors
    /// Returns the fatal error that stopped the loop, after killing the
    /// reader.
    pub async fn run(&mut self) -> NodeResult<ExitStatus> {
        info!(
            device = %self.settings.device_name,
            location = %self.state.identity.location,
            "Control loop started"
        );

        let result = match self.publish_status() {
            Ok(()) => loop {
                match self.tick().await {
                    Ok(Some(status)) => break Ok(status),
                    Ok(None) => {}
                    Err(e) => break Err(e),
                }
            },
            Err(e) => Err(e),
        };

        if let Err(e) = self.display.abort() {
            warn!(error = %e, "Cannot show aborted state");
        }

        match result {
            Ok(status) => {
                info!(status = %status, "Reader exited, control loop stopped");
                Ok(status)
            }
            Err(e) => {
                error!(error = %e, "Control loop failed");
                if let Err(kill_error) = self.reader.kill().await {
                    warn!(error = %kill_error, "Cannot reap reader");
                }
                Err(e)
            }
        }
    }

    /// One iteration; returns the reader's exit status once it has stopped.
    ///
    /// # Errors
    /// Returns queue failures, display failures and reader pipe failures.
    pub async fn tick(&mut self) -> NodeResult<Option<ExitStatus>> {
        if let Some(status) = self.reader.try_wait()? {
            self.drain_reader().await?;
            return Ok(Some(status));
        }

        if self.deliverer.is_connected()
            && let Err(e) = self.deliverer.deliver_one(&mut self.queue).await
            && e.is_fatal()
        {
            return Err(e.into());
        }

        let backlog =
            self.deliverer.is_connected() && self.queue.count(QueueState::New)? > 0;
        let mut buf = [0u8; READ_CHUNK];

        tokio::select! {
            biased;

            read = self.reader.stdout.read(&mut buf) => {
                let n = read.map_err(NodeError::Reader)?;
                if n == 0 {
                    return self.reader_closed().await.map(Some);
                }
                self.handle_reader_output(&buf[..n])?;
            }
            received = self.discovery.recv_announcement() => {
                match received {
                    Ok(Some(announcement)) => self.deliverer.connect(announcement.endpoint),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Discovery receive failed"),
                }
            }
            _ = sleep_until(self.identity_due) => self.refresh_identity(),
            _ = sleep_until(self.status_due) => self.publish_status()?,
            _ = std::future::ready(()), if backlog => {}
        }

        Ok(None)
    }

    fn handle_reader_output(&mut self, bytes: &[u8]) -> NodeResult<()> {
        let report = self.ingestor.ingest(bytes, &mut self.queue)?;
        self.apply_report(report)
    }

    fn apply_report(&mut self, report: IngestReport) -> NodeResult<()> {
        if !report.enqueued.is_empty() || report.discarded > 0 {
            debug!(
                enqueued = report.enqueued.len(),
                rejected = report.rejected,
                no_reads = report.no_reads,
                discarded = report.discarded,
                "Ingested reader output"
            );
        }
        if let Some((label, kind)) = report.last_scan {
            self.state.last_scan = Some(LastScan {
                label,
                kind,
                at: Instant::now(),
            });
            self.publish_status()?;
        }
        Ok(())
    }

    /// Reader closed stdout: process any unterminated tail, then reap it.
    async fn reader_closed(&mut self) -> NodeResult<ExitStatus> {
        let report = self.ingestor.finish(&mut self.queue)?;
        self.apply_report(report)?;

        match timeout(READER_EXIT_GRACE, self.reader.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Reader closed its output but kept running");
                self.reader.kill().await
            }
        }
    }

    /// Reader exited: pick up output still sitting in the pipe.
    async fn drain_reader(&mut self) -> NodeResult<()> {
        let mut rest = Vec::new();
        match timeout(READER_EXIT_GRACE, self.reader.stdout.read_to_end(&mut rest)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Reading remaining reader output failed"),
            Err(_) => warn!("Reader output still open after exit"),
        }
        if !rest.is_empty() {
            self.handle_reader_output(&rest)?;
        }
        let report = self.ingestor.finish(&mut self.queue)?;
        self.apply_report(report)
    }

    fn refresh_identity(&mut self) {
        let identity = self.identity.refresh();
        if identity.location != self.state.identity.location {
            info!(
                from = %self.state.identity.location,
                to = %identity.location,
                "Location changed"
            );
            self.state.badge = location_badge(&identity.location);
            self.ingestor.set_location(identity.location.clone());
        }
        self.state.identity = identity;
        self.identity_due = Instant::now() + self.settings.identity_refresh;
    }

    /// Current snapshot for the display.
    ///
    /// # Errors
    /// Returns the queue error if the pending count cannot be read.
    pub fn snapshot(&self) -> NodeResult<StatusSnapshot> {
        let last_scan = self
            .state
            .last_scan
            .as_ref()
            .filter(|scan| scan.at.elapsed() < self.settings.name_linger)
            .map(|scan| (scan.label.clone(), scan.kind));

        Ok(StatusSnapshot {
            device: self.settings.device_name.clone(),
            online: self.state.identity.has_address(),
            connected: self.deliverer.is_connected(),
            badge: self.state.badge.clone(),
            location: self.state.identity.location.clone(),
            clock: chrono::Local::now().format("%H:%M").to_string(),
            queued: self.queue.count(QueueState::New)?,
            address: self.state.identity.address_label(),
            last_scan,
        })
    }

    fn publish_status(&mut self) -> NodeResult<()> {
        let snapshot = self.snapshot()?;
        self.display.publish(&snapshot)?;
        self.status_due = Instant::now() + self.settings.status_interval;
        Ok(())
    }
}
