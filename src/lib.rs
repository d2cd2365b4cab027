#![forbid(unsafe_code)]

//! Fetch a video by URL, hand it to the caller as a download, and forget it.
//!
//! The `backend` binary exposes `GET /video?url=...` through [`server`]; the
//! heavy lifting lives in [`delivery`]. [`client`] is the typed wrapper used
//! by anything that calls the service.

pub mod catalogue;
pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod media;
pub mod server;
