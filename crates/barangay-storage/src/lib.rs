pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use traits::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest, RegistryStore, RegistryTransaction,
    StorageError,
};
