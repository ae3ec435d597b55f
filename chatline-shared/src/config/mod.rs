//! # Configuration
//!
//! Server configuration: profiles, file formats, and environment overrides.

pub mod server;
