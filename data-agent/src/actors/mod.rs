pub mod table_store_actor;

pub use table_store_actor::{TableStoreActor, TableStoreMsg};
