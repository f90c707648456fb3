//! Status display.
//!
//! The control loop publishes a [`StatusSnapshot`] every status interval and
//! right after a scan is queued. How it is shown is up to the
//! [`StatusDisplay`] implementation; [`PanelDisplay`] renders a fixed-width
//! text panel:
//!
//! ```text
//! NET+ LINK-  [LOB]                  09:41
//! 3 queued                        10.0.0.2
//! OK alice
//! ```
//!
//! When the node stops, [`StatusDisplay::abort`] replaces the panel with an
//! aborted notice so a dead node is visible at a glance.

use std::io::Write;

use tokio::time::Instant;

use crate::error::{NodeError, NodeResult};

/// How the last presentation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Valid card, event queued.
    Accepted,
    /// Card failed validation; shown only.
    Rejected,
    /// Reader reported an error.
    NoRead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastScan {
    pub label: String,
    pub kind: ScanKind,
    pub at: Instant,
}

/// Everything the display shows at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub device: String,
    /// The node has a network address.
    pub online: bool,
    /// The deliverer is connected to a collector.
    pub connected: bool,
    pub badge: String,
    pub location: String,
    /// Local wall clock, `HH:MM`.
    pub clock: String,
    pub queued: usize,
    pub address: String,
    /// Last presentation, while it is still recent enough to show.
    pub last_scan: Option<(String, ScanKind)>,
}

pub trait StatusDisplay {
    /// Show `snapshot`.
    ///
    /// # Errors
    /// Returns `NodeError::Display` if the output fails.
    fn publish(&mut self, snapshot: &StatusSnapshot) -> NodeResult<()>;

    /// Signal that the node stopped.
    ///
    /// # Errors
    /// Returns `NodeError::Display` if the output fails.
    fn abort(&mut self) -> NodeResult<()>;
}

/// Alignment of text within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Truncate to `max_chars` characters.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Pad `text` to exactly `width` characters, truncating if longer.
pub fn align_text(text: &str, width: usize, alignment: Alignment) -> String {
    let char_count = text.chars().count();
    if char_count >= width {
        return truncate_text(text, width);
    }

    let padding = width - char_count;
    match alignment {
        Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
        Alignment::Right => format!("{}{}", " ".repeat(padding), text),
        Alignment::Center => {
            let left_pad = padding / 2;
            format!(
                "{}{}{}",
                " ".repeat(left_pad),
                text,
                " ".repeat(padding - left_pad)
            )
        }
    }
}

/// `left` and `right` on one line of `width`; `right` wins when short on space.
fn two_column(left: &str, right: &str, width: usize) -> String {
    let right = truncate_text(right, width);
    let room = width - right.chars().count();
    format!("{}{}", align_text(left, room, Alignment::Left), right)
}

fn flag(on: bool) -> char {
    if on { '+' } else { '-' }
}

/// Renders snapshots as fixed-width text lines.
#[derive(Debug, Clone, Copy)]
pub struct TextPanel {
    width: usize,
}

impl TextPanel {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn render(&self, snapshot: &StatusSnapshot) -> Vec<String> {
        let status = format!(
            "NET{} LINK{}  [{}]",
            flag(snapshot.online),
            flag(snapshot.connected),
            snapshot.badge
        );
        let scan = match &snapshot.last_scan {
            Some((label, ScanKind::Accepted)) => format!("OK {label}"),
            Some((label, ScanKind::Rejected)) => format!("!! {label}"),
            Some((label, ScanKind::NoRead)) => format!("?? {label}"),
            None => String::new(),
        };

        vec![
            two_column(&status, &snapshot.clock, self.width),
            two_column(
                &format!("{} queued", snapshot.queued),
                &snapshot.address,
                self.width,
            ),
            align_text(&scan, self.width, Alignment::Left),
        ]
    }

    pub fn render_aborted(&self) -> Vec<String> {
        vec![
            align_text("*** ABORTED ***", self.width, Alignment::Center),
            align_text("reader stopped", self.width, Alignment::Center),
            " ".repeat(self.width),
        ]
    }
}

/// Writes rendered panels to a terminal or log file.
///
/// Unchanged panels are not rewritten.
pub struct PanelDisplay<W: Write> {
    panel: TextPanel,
    out: W,
    shown: Option<Vec<String>>,
}

impl<W: Write> PanelDisplay<W> {
    pub fn new(panel: TextPanel, out: W) -> Self {
        Self {
            panel,
            out,
            shown: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn show(&mut self, lines: Vec<String>) -> NodeResult<()> {
        if self.shown.as_ref() == Some(&lines) {
            return Ok(());
        }
        let border = format!("+{}+", "-".repeat(self.panel.width()));
        let mut frame = String::new();
        frame.push_str(&border);
        frame.push('\n');
        for line in &lines {
            frame.push('|');
            frame.push_str(line);
            frame.push_str("|\n");
        }
        frame.push_str(&border);
        frame.push('\n');

        self.out
            .write_all(frame.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(NodeError::Display)?;
        self.shown = Some(lines);
        Ok(())
    }
}

impl<W: Write> StatusDisplay for PanelDisplay<W> {
    fn publish(&mut self, snapshot: &StatusSnapshot) -> NodeResult<()> {
        let lines = self.panel.render(snapshot);
        self.show(lines)
    }

    fn abort(&mut self) -> NodeResult<()> {
        let lines = self.panel.render_aborted();
        self.show(lines)
    }
}

/// Keeps every published snapshot; for tests and headless runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryDisplay {
    pub snapshots: Vec<StatusSnapshot>,
    pub aborted: bool,
}

impl MemoryDisplay {
    pub fn last(&self) -> Option<&StatusSnapshot> {
        self.snapshots.last()
    }
}

impl StatusDisplay for MemoryDisplay {
    fn publish(&mut self, snapshot: &StatusSnapshot) -> NodeResult<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn abort(&mut self) -> NodeResult<()> {
        self.aborted = true;
        Ok(())
    }
}
