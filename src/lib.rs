pub mod api;
pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod server;
pub mod wallet;
