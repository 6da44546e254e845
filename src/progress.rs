//! Transfer progress extraction
//!
//! `git clone --progress` writes in-place progress frames separated by
//! carriage returns. [`ProgressParser`] reduces that stream, one chunk at a
//! time, into a [`TransferProgress`] snapshot. It never looks at exit codes;
//! success is decided by the caller.

use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;

/// Running snapshot of a single transfer invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferProgress {
    pub objects_counted: u64,

    pub compress_percent: u32,
    pub objects_compressed: u64,
    pub compress_total: u64,

    pub total_objects: u64,
    pub total_deltas: u64,
    pub reused_objects: u64,
    pub reused_deltas: u64,
    pub pack_reused: u64,

    pub receive_percent: u32,
    pub objects_received: u64,
    pub receive_total: u64,
    pub received_size: f64,
    pub size_unit: String,
    pub rate: f64,
    pub rate_unit: String,

    pub resolve_percent: u32,
    pub deltas_resolved: u64,
    pub resolve_total: u64,
    pub resolve_done: bool,
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "remote: Counting objects: {}", self.objects_counted)?;
        writeln!(
            f,
            "remote: Compressing objects: {}% ({}/{})",
            self.compress_percent, self.objects_compressed, self.compress_total
        )?;
        writeln!(
            f,
            "Total {} (delta {}), reused {} (delta {}), pack-reused {}",
            self.total_objects,
            self.total_deltas,
            self.reused_objects,
            self.reused_deltas,
            self.pack_reused
        )?;
        writeln!(
            f,
            "Receiving objects: {}% ({}/{}), {} {} | {} {}/s",
            self.receive_percent,
            self.objects_received,
            self.receive_total,
            self.received_size,
            self.size_unit,
            self.rate,
            self.rate_unit
        )?;
        write!(
            f,
            "Resolving deltas: {}% ({}/{}){}",
            self.resolve_percent,
            self.deltas_resolved,
            self.resolve_total,
            if self.resolve_done { ", done" } else { "" }
        )
    }
}

type Apply = fn(&mut TransferProgress, &Captures<'_>);

/// One entry of the classification table
pub struct LineMatcher {
    pub name: &'static str,
    pattern: Regex,
    apply: Apply,
}

impl LineMatcher {
    fn new(name: &'static str, pattern: &str, apply: Apply) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("progress pattern must compile"),
            apply,
        }
    }

    /// Apply this matcher to `line`, returning whether it consumed the line
    pub fn try_apply(&self, line: &str, progress: &mut TransferProgress) -> bool {
        match self.pattern.captures(line) {
            Some(caps) => {
                (self.apply)(progress, &caps);
                true
            }
            None => false,
        }
    }
}

fn int<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group).and_then(|m| m.as_str().parse().ok())
}

fn set<T: std::str::FromStr>(field: &mut T, caps: &Captures<'_>, group: usize) {
    if let Some(value) = int(caps, group) {
        *field = value;
    }
}

fn apply_counting(p: &mut TransferProgress, caps: &Captures<'_>) {
    // "Counting objects: 100% (12/12)" carries the count as the fraction total
    if caps.get(3).is_some() {
        set(&mut p.objects_counted, caps, 3);
    } else {
        set(&mut p.objects_counted, caps, 4);
    }
}

fn apply_compressing(p: &mut TransferProgress, caps: &Captures<'_>) {
    set(&mut p.compress_percent, caps, 1);
    set(&mut p.objects_compressed, caps, 2);
    set(&mut p.compress_total, caps, 3);
}

fn apply_delta_summary(p: &mut TransferProgress, caps: &Captures<'_>) {
    set(&mut p.total_objects, caps, 1);
    set(&mut p.total_deltas, caps, 2);
    set(&mut p.reused_objects, caps, 3);
    set(&mut p.reused_deltas, caps, 4);
    set(&mut p.pack_reused, caps, 5);
}

fn apply_receiving(p: &mut TransferProgress, caps: &Captures<'_>) {
    set(&mut p.receive_percent, caps, 1);
    set(&mut p.objects_received, caps, 2);
    set(&mut p.receive_total, caps, 3);
    set(&mut p.received_size, caps, 4);
    if let Some(unit) = caps.get(5) {
        p.size_unit = unit.as_str().to_string();
    }
    set(&mut p.rate, caps, 6);
    if let Some(unit) = caps.get(7) {
        p.rate_unit = unit.as_str().to_string();
    }
}

fn apply_resolving(p: &mut TransferProgress, caps: &Captures<'_>) {
    set(&mut p.resolve_percent, caps, 1);
    set(&mut p.deltas_resolved, caps, 2);
    set(&mut p.resolve_total, caps, 3);
    p.resolve_done = caps.get(4).is_some();
}

/// The classification table, in priority order
pub fn matchers() -> &'static [LineMatcher] {
    static MATCHERS: OnceLock<Vec<LineMatcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            LineMatcher::new(
                "counting-objects",
                r"Counting objects:\s*(?:(\d+)%\s*\((\d+)/(\d+)\)|(\d+))",
                apply_counting,
            ),
            LineMatcher::new(
                "compressing-objects",
                r"Compressing objects:\s*(\d+)%\s*\((\d+)/(\d+)\)",
                apply_compressing,
            ),
            LineMatcher::new(
                "delta-summary",
                r"Total\s+(\d+)\s*\(delta\s+(\d+)\),\s*reused\s+(\d+)\s*\(delta\s+(\d+)\),\s*pack-reused\s+(\d+)",
                apply_delta_summary,
            ),
            LineMatcher::new(
                "receiving-objects",
                r"Receiving objects:\s+(\d+)%\s+\((\d+)/(\d+)\)(?:,\s+([\d.]+)\s+(\w+)\s+\|\s+([\d.]+)\s+(\w+)/s)?",
                apply_receiving,
            ),
            LineMatcher::new(
                "resolving-deltas",
                r"Resolving deltas:\s+(\d+)%\s+\((\d+)/(\d+)\)(,\s+done)?",
                apply_resolving,
            ),
        ]
    })
}

/// Extract the line a chunk currently shows.
///
/// Trailing terminators are dropped first; whatever precedes the last
/// remaining carriage return is an overwritten frame.
pub fn current_line(chunk: &str) -> &str {
    let trimmed = chunk.trim_end_matches(['\r', '\n']);
    trimmed.rsplit('\r').next().unwrap_or(trimmed).trim()
}

/// Stateful reducer over the chunks of one transfer
#[derive(Debug, Default)]
pub struct ProgressParser {
    snapshot: TransferProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw chunk into the snapshot and return the snapshot to repaint
    pub fn feed(&mut self, chunk: &str) -> &TransferProgress {
        let line = current_line(chunk);
        if !line.is_empty() {
            for matcher in matchers() {
                if matcher.try_apply(line, &mut self.snapshot) {
                    break;
                }
            }
        }
        &self.snapshot
    }

    pub fn snapshot(&self) -> &TransferProgress {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> TransferProgress {
        self.snapshot
    }
}

/// Progress callback that repaints the snapshot on stdout when `enabled`
pub fn printer(enabled: bool) -> impl FnMut(&TransferProgress) + Send {
    move |snapshot: &TransferProgress| {
        if enabled {
            println!("{}", snapshot);
        }
    }
}
