//! Core library for device-authorization login with stale-token recovery.

pub mod auth;
pub mod config;
pub mod settings;

pub use settings::Settings;
