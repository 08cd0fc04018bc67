pub mod backoff;
pub mod config;
pub mod http;
pub mod inventory;
pub mod publish;
pub mod signal;
pub mod updater;
