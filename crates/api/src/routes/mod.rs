//! HTTP route handlers.

pub mod consent;
pub mod exports;
pub mod health;
pub mod settings;
