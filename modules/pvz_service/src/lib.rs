pub mod module;
pub use module::PvzModule;

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

pub use config::{AuthSettings, PvzServiceConfig};
pub use infra::storage::Storage;
