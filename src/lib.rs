pub mod ai;
pub mod app;
pub mod config;
pub mod pipeline;
pub mod prompting;
pub mod store;
pub mod types;
