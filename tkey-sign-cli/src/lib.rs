//! tkey-sign command line tool.
//!
//! Signs files with the Ed25519 key held by a TKey and verifies detached
//! signatures offline.

pub mod commands;
pub mod reporter;
pub mod shutdown;
pub mod ui;
pub mod uss;
