//! Task domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned by the remote service when a task is accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Snapshot of a remote task as reported by the status endpoint
///
/// `saved_files` and `failed_files` are only meaningful once `completed`
/// is true. Every other field is informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStatus {
    pub task_id: Option<TaskId>,
    pub completed: bool,
    pub progress: f64,
    pub total_files: u64,
    pub completed_files: u64,
    pub saved_files: Vec<String>,
    pub failed_files: Vec<String>,
}

impl TaskStatus {
    /// Whether this status belongs to the given task
    pub fn is_for(&self, id: &TaskId) -> bool {
        self.task_id.as_ref() == Some(id)
    }

    pub fn saved_count(&self) -> usize {
        self.saved_files.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_files.len()
    }

    /// Share of failed items among all processed items, 0.0 when nothing was processed
    pub fn failure_ratio(&self) -> f64 {
        let total = self.saved_count() + self.failed_count();
        if total == 0 {
            return 0.0;
        }
        self.failed_count() as f64 / total as f64
    }
}

/// Route selector for the save-files endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    Async,
    Serial,
    Zip,
}

impl SaveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveMode::Async => "async",
            SaveMode::Serial => "serial",
            SaveMode::Zip => "zip",
        }
    }

    /// Human-readable test name used in run banners
    pub fn test_name(&self) -> &'static str {
        match self {
            SaveMode::Async => "Async Download Test",
            SaveMode::Serial => "Serial Download Test",
            SaveMode::Zip => "Zip Download Test",
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SaveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "async" => Ok(SaveMode::Async),
            "serial" => Ok(SaveMode::Serial),
            "zip" => Ok(SaveMode::Zip),
            other => Err(format!(
                "Invalid test type: {}. Valid types: async, serial, zip",
                other
            )),
        }
    }
}
