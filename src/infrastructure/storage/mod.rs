mod object_store_storage;
mod store_factory;

pub use object_store_storage::ObjectStoreStorage;
pub use store_factory::ObjectStorageFactory;
