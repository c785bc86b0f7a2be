//! HTTP API: configuration, routing, and request/response mapping over the
//! marketplace façade.

pub mod app;
pub mod config;
