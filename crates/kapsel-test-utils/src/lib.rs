#![forbid(unsafe_code)]

//! Shared async test fixtures: an in-process update server.

mod update_server;

pub use crate::update_server::{TestUpdateServer, manifest_json};
