//! HTTP backend: configuration, routing, auth extraction and request logging.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
