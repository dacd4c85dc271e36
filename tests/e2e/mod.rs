//! End-to-end tests for the uart2ip gateway.
//!
//! These tests run the full gateway (listener, sessions, reader loop,
//! forwarder) against a scripted mock device.

pub mod arbitration_tests;
pub mod lifecycle_tests;
pub mod scenario_tests;
