mod in_memory_broker;
mod pg_task_broker;

pub use in_memory_broker::{ArchivedTask, InMemoryTaskBroker};
pub use pg_task_broker::PgTaskBroker;
