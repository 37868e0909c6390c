//! Action routing between channel members.

pub mod forwarder;

pub use forwarder::{ActionRouter, RouteOutcome};
