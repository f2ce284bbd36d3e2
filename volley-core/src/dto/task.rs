//! Save-files task DTOs

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskId;

/// Request to start an asynchronous save-files task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFilesRequest {
    pub repository: String,
    pub file_paths: Vec<String>,
    pub branch: String,
}

/// Body of a 202 Accepted response
///
/// `task_id` is optional on the wire; a missing id is a failed submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitAccepted {
    pub task_id: Option<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let req = SaveFilesRequest {
            repository: "r".to_string(),
            file_paths: vec!["a.txt".to_string()],
            branch: "main".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"repository": "r", "filePaths": ["a.txt"], "branch": "main"})
        );
    }

    #[test]
    fn test_accepted_without_task_id() {
        let body: SubmitAccepted = serde_json::from_str("{}").unwrap();
        assert_eq!(body.task_id, None);
    }
}
