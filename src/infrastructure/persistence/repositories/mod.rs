mod in_memory_document_repository;
mod pg_document_repository;

pub use in_memory_document_repository::InMemoryDocumentRepository;
pub use pg_document_repository::PgDocumentRepository;
