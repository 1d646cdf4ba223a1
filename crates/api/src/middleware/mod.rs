//! HTTP middleware and process-level initialization.

pub mod logging;
