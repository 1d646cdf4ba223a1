//! Pure domain services.

pub mod eligibility;
pub mod reporting;
