mod document_record;
mod document_status;
mod file_id;
mod ingestion_payload;
mod object_name;
mod operation;
mod task;

pub use document_record::{DocumentFieldsUpdate, DocumentRecord};
pub use document_status::DocumentStatus;
pub use file_id::FileId;
pub use ingestion_payload::{ADD_DOCUMENT_TASK, AddDocumentPayload};
pub use object_name::ObjectName;
pub use operation::{
    ImportResponse, OperationError, OperationHandle, OperationStatus, extract_rag_file_id,
};
pub use task::{
    DEFAULT_MAX_RETRIES, DEFAULT_QUEUE, DEFAULT_TASK_TIMEOUT, LOW_QUEUE, TaskDelivery, TaskId,
    TaskMessage,
};
