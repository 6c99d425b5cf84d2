//! # Progress and Statistics Module
//!
//! Feedback visivo e statistiche aggregate per la modalità batch.
//!
//! ## Componenti:
//! - `ProgressManager`: barra `indicatif` con elapsed, posizione e messaggio
//! - `OptimizationStats`: contatori cumulativi (sostituiti, falliti, errori, byte)
//!
//! ```text
//! ⠋ [00:00:04] [========================>---------------] 12/20 (60%) [OK] photo.jpg: 12.4% saved
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Progress bar for a batch run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Hidden bar, for runs whose output goes elsewhere
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Advance by one file and show `message`
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Cumulative results of a batch run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct OptimizationStats {
    pub files_processed: usize,
    /// Files replaced by the optimizer's output
    pub files_replaced: usize,
    /// Files left untouched because the tool reported a failure
    pub files_failed: usize,
    /// Files that hit a fatal error (spawn, cleanup, I/O)
    pub errors: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_replaced(&mut self, original_size: u64, new_size: u64) {
        self.files_processed += 1;
        self.files_replaced += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn add_failed(&mut self, original_size: u64) {
        self.files_processed += 1;
        self.files_failed += 1;
        self.total_original_size += original_size;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    /// True when every file was replaced
    pub fn all_replaced(&self) -> bool {
        self.files_replaced == self.files_processed
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Replaced: {} | Failed: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_replaced,
            self.files_failed,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
