use rag_ingest::domain::{
    ADD_DOCUMENT_TASK, AddDocumentPayload, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE,
    DEFAULT_TASK_TIMEOUT, FileId, ObjectName,
};

fn payload() -> AddDocumentPayload {
    AddDocumentPayload {
        file_id: FileId::new("doc-1"),
        temp_object_name: ObjectName::new("temp/doc-1.pdf"),
        final_object_name: ObjectName::new("documents/doc-1.pdf"),
        corpus_name: "projects/p/locations/l/ragCorpora/c".to_string(),
        display_name: "doc-1.pdf".to_string(),
    }
}

#[test]
fn given_complete_payload_when_checking_fields_then_nothing_missing() {
    assert!(payload().missing_fields().is_empty());
}

#[test]
fn given_blank_fields_when_checking_then_each_is_reported() {
    let payload = AddDocumentPayload {
        file_id: FileId::new("  "),
        corpus_name: String::new(),
        ..payload()
    };

    assert_eq!(payload.missing_fields(), vec!["file_id", "corpus_name"]);
}

#[test]
fn given_json_without_display_name_when_decoding_then_defaults_to_empty() {
    let json = r#"{
        "file_id": "doc-1",
        "temp_object_name": "temp/doc-1.pdf",
        "final_object_name": "documents/doc-1.pdf",
        "corpus_name": "c"
    }"#;

    let decoded: AddDocumentPayload = serde_json::from_str(json).unwrap();

    assert_eq!(decoded.display_name, "");
    assert_eq!(decoded.file_id, FileId::new("doc-1"));
    assert!(decoded.missing_fields().is_empty());
}

#[test]
fn given_payload_when_converted_to_task_then_uses_ingestion_type_and_defaults() {
    let task = payload().into_task().unwrap();

    assert_eq!(task.task_type, ADD_DOCUMENT_TASK);
    assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(task.timeout, DEFAULT_TASK_TIMEOUT);
    assert_eq!(task.queue, DEFAULT_QUEUE);
    let decoded: AddDocumentPayload = serde_json::from_slice(&task.payload).unwrap();
    assert_eq!(decoded, payload());
}
