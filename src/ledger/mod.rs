pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use memory::InMemoryTransactionStore;
pub use repository::PgTransactionStore;
pub use store::TransactionStore;
