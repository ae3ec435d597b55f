#![cfg_attr(not(test), forbid(unsafe_code))]

//! Chatline server: presence and room hub, chat service, and the axum HTTP
//! and WebSocket surface in front of them.

pub mod app_state;
mod handlers;
pub mod http;
pub mod hub;
mod middleware;
pub mod openapi;
mod routes;
pub mod server;
pub mod services;
pub mod store;
mod tracer;
