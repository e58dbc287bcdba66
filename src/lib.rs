pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod explorer;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod rpc;
pub mod scheduler;
pub mod store;
pub mod sync;
