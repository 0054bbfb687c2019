pub mod app;
pub mod backup;
pub mod cli;
pub mod config;
pub mod migrations;
pub mod model;
pub mod storage;
pub mod timeline;

pub use app::{Action, AppState, Store, StoreOptions};
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
