pub mod aggregate;
pub mod chain;
pub mod config;
pub mod dashboard;
pub mod documents;
pub mod loader;
pub mod render;
pub mod store;
pub mod updater;
pub mod utils;
