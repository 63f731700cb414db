use serde::{Deserialize, Serialize};

use super::{FileId, ObjectName, TaskMessage};

pub const ADD_DOCUMENT_TASK: &str = "add:document_to_corpus";

/// Payload of an `add:document_to_corpus` task. Absent fields decode as
/// blank so that `missing_fields` can name them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddDocumentPayload {
    pub file_id: FileId,
    pub temp_object_name: ObjectName,
    pub final_object_name: ObjectName,
    pub corpus_name: String,
    pub display_name: String,
}

impl AddDocumentPayload {
    /// Lists the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.file_id.is_empty() {
            missing.push("file_id");
        }
        if self.temp_object_name.is_empty() {
            missing.push("temp_object_name");
        }
        if self.final_object_name.is_empty() {
            missing.push("final_object_name");
        }
        if self.corpus_name.trim().is_empty() {
            missing.push("corpus_name");
        }
        missing
    }

    pub fn into_task(self) -> Result<TaskMessage, serde_json::Error> {
        let payload = serde_json::to_vec(&self)?;
        Ok(TaskMessage::new(ADD_DOCUMENT_TASK, payload))
    }
}
