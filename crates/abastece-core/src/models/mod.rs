//! Data models for fuel-receipt extraction.

pub mod config;
pub mod record;
