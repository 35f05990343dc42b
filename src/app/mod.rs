// TfScope - app/mod.rs
//
// Application layer: reading log files and holding parsed results.
// Dependencies: core layer.
// Must NOT depend on: platform specifics.

pub mod ingest;
pub mod store;
