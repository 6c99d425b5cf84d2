//! # JSON Output Module
//!
//! Una riga JSON per evento su stdout, per chi usa la CLI da script
//! (`--json`). Ogni messaggio ha un campo `type`.
//!
//! ```json
//! {"type":"start","profile":"jpeg","total_files":2}
//! {"type":"file_complete","path":"a.jpg","original_size":2048,"new_size":1800,"status":"replaced","message":null}
//! {"type":"complete","files_processed":2,...}
//! ```

use crate::batch::{FileReport, FileStatus};
use crate::progress::OptimizationStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start { profile: String, total_files: usize },

    #[serde(rename = "file_complete")]
    FileComplete {
        path: PathBuf,
        original_size: u64,
        new_size: u64,
        status: FileStatus,
        message: Option<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        files_processed: usize,
        files_replaced: usize,
        files_failed: usize,
        errors: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl JsonMessage {
    /// Print the message as one line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(profile: impl Into<String>, total_files: usize) -> Self {
        Self::Start {
            profile: profile.into(),
            total_files,
        }
    }

    pub fn file_complete(report: &FileReport) -> Self {
        Self::FileComplete {
            path: report.path.clone(),
            original_size: report.original_size,
            new_size: report.new_size,
            status: report.status,
            message: report.message.clone(),
        }
    }

    pub fn complete(stats: &OptimizationStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            files_replaced: stats.files_replaced,
            files_failed: stats.files_failed,
            errors: stats.errors,
            total_bytes_saved: stats.total_bytes_saved,
            average_reduction: stats.overall_reduction_percent(),
            duration_seconds,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged() {
        let json = serde_json::to_value(JsonMessage::start("png", 3)).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["total_files"], 3);

        let report = FileReport {
            path: PathBuf::from("a.jpg"),
            original_size: 10,
            new_size: 10,
            status: FileStatus::Failed,
            message: Some("jpegtran exited with status 1".to_string()),
        };
        let json = serde_json::to_value(JsonMessage::file_complete(&report)).unwrap();
        assert_eq!(json["type"], "file_complete");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["message"], "jpegtran exited with status 1");
    }

    #[test]
    fn test_complete_parses_back() {
        let mut stats = OptimizationStats::new();
        stats.add_replaced(100, 50);
        let message = JsonMessage::complete(&stats, 1.5);
        let text = serde_json::to_string(&message).unwrap();
        assert_eq!(serde_json::from_str::<JsonMessage>(&text).unwrap(), message);
    }
}
