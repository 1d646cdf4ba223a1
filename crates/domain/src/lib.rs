//! Domain models and pure services for the FinClass backend.
//!
//! This crate contains:
//! - Core types shared between the API and persistence layers
//! - Pure business logic (eligibility, batching) with no I/O

pub mod models;
pub mod services;
