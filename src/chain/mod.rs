pub mod gateway;
pub mod traits;

pub use gateway::HttpChainGateway;
pub use traits::{BalanceFetcher, Receipt, ReceiptResolver, ReceiptStatus};
