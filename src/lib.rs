//! Amtly - assistant for German bureaucracy. Library exports for testing

pub mod api;
pub mod config;
pub mod core;
pub mod infrastructure;
