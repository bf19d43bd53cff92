pub mod config;
pub mod mail;
pub mod preferences;
pub mod store;
pub mod sync;
