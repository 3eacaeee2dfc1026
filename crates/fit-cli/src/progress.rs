use std::io::{self, Write};
use std::time::Instant;

use colored::Colorize;
use fit_sdk::{ItemOutcome, TransferProgress};

/// Prints one line per transferred item on stderr.
pub struct ConsoleProgress {
    total: u64,
    done: u64,
    items: usize,
    current: Option<(String, u64)>,
    started: Instant,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            total: 0,
            done: 0,
            items: 0,
            current: None,
            started: Instant::now(),
        }
    }
}

impl TransferProgress for ConsoleProgress {
    fn start(&mut self, total_bytes: u64) {
        self.total = total_bytes;
        self.started = Instant::now();
    }

    fn new_item(&mut self, path: &str, size: u64) {
        self.items += 1;
        self.current = Some((path.to_string(), size));
    }

    fn advance(&mut self, done: u64) {
        self.done += done;
    }

    fn item_finished(&mut self, outcome: ItemOutcome) {
        let Some((path, size)) = self.current.take() else {
            return;
        };
        let percent = if self.total == 0 {
            100
        } else {
            self.done.saturating_mul(100) / self.total
        };
        let state = match outcome {
            ItemOutcome::Transferred => "done".green(),
            ItemOutcome::AlreadyPresent => "skipped".dimmed(),
            ItemOutcome::Failed => "failed".red(),
        };
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "  {percent:>3}%  {path} ({})  {state}", human_size(size));
    }

    fn done(&mut self) {
        if self.items == 0 {
            return;
        }
        let secs = self.started.elapsed().as_secs_f64();
        let _ = writeln!(
            io::stderr(),
            "  {} item(s), {} in {secs:.1}s",
            self.items,
            human_size(self.done)
        );
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
