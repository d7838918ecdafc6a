pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use memory::InMemoryWalletStore;
pub use repository::PgWalletStore;
pub use store::WalletStore;
