//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: indicatif bars (cleared on completion).
//! Non-TTY mode: hidden bars; the log is the only progress indicator.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn bytes_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {bar:30.green/dim} {binary_bytes:>9}/{binary_total_bytes:9} {eta:>4} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Pending style, shown before total bytes are known
fn pending_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {binary_bytes:>9} {wide_msg:.dim}")
        .expect("invalid template")
}

fn lines_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<10.cyan.bold} {bar:30.green/dim} {human_pos:>10}/{human_len:10} {per_sec:>12} {wide_msg:.dim}")
        .expect("invalid template")
        .progress_chars("--")
}

/// At most `max` characters of `name`, cut on a char boundary
fn prefix_label(name: &str, max: usize) -> &str {
    match name.char_indices().nth(max) {
        Some((cut, _)) => &name[..cut],
        None => name,
    }
}

/// Switch a download bar to byte-progress once the total size is known.
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_length(total);
    pb.set_style(bytes_style());
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Context that never draws (tests, piped output)
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Byte bar for one file transfer, starting at `initial` bytes.
    ///
    /// Stays in the pending style until [`upgrade_to_bar`] is called.
    pub fn download_bar(&self, name: &str, initial: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(pending_style());
        pb.set_prefix(prefix_label(name, 24).to_string());
        pb.set_position(initial);
        pb
    }

    /// Line counter bar (indexing), resumed at `initial`.
    pub fn line_bar(&self, name: &str, total: u64, initial: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(lines_style());
        pb.set_prefix(name.to_string());
        pb.set_position(initial);
        pb
    }

    /// Spinner status line for a stage; update with `set_message`.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print a line above managed progress bars.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
