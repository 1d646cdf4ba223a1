//! Shared utilities for the FinClass backend.
//!
//! This crate contains code used across the api, domain and persistence
//! layers: JWT handling and small cryptographic helpers.

pub mod crypto;
pub mod jwt;
