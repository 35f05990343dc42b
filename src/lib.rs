// TfScope - lib.rs
//
// Library entry point, exposing every layer for the CLI binary, integration
// tests and programmatic use.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
