use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque name of a long-running remote operation, e.g. `projects/p/.../operations/123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// Decoded `{done, error?, response?}` snapshot of an operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl OperationStatus {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn succeeded(response: serde_json::Value) -> Self {
        Self {
            done: true,
            error: None,
            response: Some(response),
        }
    }

    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(OperationError {
                code,
                message: message.into(),
            }),
            response: None,
        }
    }
}

/// Reply of an import request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResponse {
    pub operation: Option<OperationHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRagFilesResponse {
    #[serde(default)]
    rag_files: Vec<RagFile>,
}

#[derive(Debug, Deserialize)]
struct RagFile {
    #[serde(default)]
    name: String,
}

/// Extracts the corpus file id from `response.ragFiles[0].name`, keeping the last path segment.
pub fn extract_rag_file_id(response: &serde_json::Value) -> Option<String> {
    let parsed: ImportRagFilesResponse = serde_json::from_value(response.clone()).ok()?;
    let name = parsed.rag_files.first()?.name.trim();
    let id = name.rsplit('/').next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
