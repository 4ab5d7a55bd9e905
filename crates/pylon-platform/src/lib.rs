//! # pylon-platform
//!
//! Platform integrations for the host machine.
//!
//! - **Net**: Local network interface discovery for connect strings

#![deny(unsafe_code)]

pub mod net;

pub use net::local_address;
