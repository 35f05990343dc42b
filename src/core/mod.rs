// TfScope - core/mod.rs
//
// Core business logic layer: parsing, phase tracking, correlation, search,
// export and the analyzer plugin contract.
// Must NOT depend on: app, platform, or any filesystem access.

pub mod classifier;
pub mod correlate;
pub mod export;
pub mod filter;
pub mod model;
pub mod parser;
pub mod plugin;
pub mod section;
