// TfScope - platform/mod.rs
//
// Platform abstraction layer: config directories and config.toml.
// Dependencies: standard library, directories crate, core vocabulary types.
// Must NOT depend on: app.

pub mod config;
