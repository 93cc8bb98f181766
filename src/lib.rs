//! retouch image staging gateway library
//!
//! Resolves image locators (remote links, inline `data:` payloads), re-hosts
//! the bytes behind stable public links, and forwards those links to an
//! external enhancement backend. Both operations are exposed as tools over a
//! small axum HTTP surface.

pub mod cli;
pub mod config;
pub mod enhance;
pub mod logging;
pub mod media;
pub mod server;
pub mod tools;
