//! Telemetry setup shared by the populator binary and the test suites.

pub mod tracing;
