mod pg_pool;
mod repositories;

pub use pg_pool::{MIGRATOR, create_pool, run_migrations};
pub use repositories::{InMemoryDocumentRepository, PgDocumentRepository};
