//! UCS syslog enrichment filter library.
//!
//! Classifies raw UCS management controller syslog lines and resolves a
//! stable machine identity over the controller's XML API.

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod token;
pub mod transport;
pub mod xml;
