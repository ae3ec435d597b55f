#![cfg_attr(not(test), forbid(unsafe_code))]

//! Wire models, error taxonomy, and configuration shared by the Chatline
//! server and client crates.

pub mod config;
pub mod models;
