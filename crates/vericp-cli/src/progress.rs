//! Progress bar driven by the engine's progress monitor

use crate::display::format_bytes;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;
use vericp_types::{CopyPhase, OperationId, ProgressUpdate};

/// Aggregates per-file samples into one byte-based bar
pub struct ProgressDisplay {
    bar: Option<ProgressBar>,
    copied: HashMap<OperationId, u64>,
    files: usize,
}

impl ProgressDisplay {
    /// Create a bar covering `total_bytes` across `files` files
    pub fn new(total_bytes: u64, files: usize, quiet: bool) -> Self {
        let bar = if quiet {
            None
        } else {
            let bar = ProgressBar::new(total_bytes);
            let style = ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ");
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(100));
            Some(bar)
        };

        Self {
            bar,
            copied: HashMap::new(),
            files,
        }
    }

    /// Handle to the underlying bar, if one is shown
    pub fn bar(&self) -> Option<ProgressBar> {
        self.bar.clone()
    }

    /// Apply one coalesced sample
    pub fn update(&mut self, update: &ProgressUpdate) {
        let Some(bar) = &self.bar else {
            return;
        };

        match update.phase {
            CopyPhase::Copying => {
                self.copied.insert(update.operation_id, update.bytes_done);
                bar.set_position(self.copied.values().sum());
                bar.set_message(format!("Copying {}/{} files", self.copied.len(), self.files));
            }
            CopyPhase::Verifying => {
                bar.set_message(format!(
                    "Verifying {:.0}% of {}",
                    update.percent(),
                    format_bytes(update.bytes_total)
                ));
            }
        }
    }
}
