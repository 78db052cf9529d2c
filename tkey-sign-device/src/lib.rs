//! TKey device client.
//!
//! Implements [`tkey_sign_lib::device::DeviceClient`] over the TKey framing
//! protocol on a USB serial port: firmware name query, app loading with an
//! optional User Supplied Secret, and the signer app's key and signature
//! commands.

pub mod client;
pub mod detect;
pub mod proto;

pub use client::{Port, SerialConnector, TkeyClient};
pub use detect::detect_ports;
