//! Cross-crate integration suites.

pub mod lifecycle;
pub mod services;
