//! Unit tests module
//!
//! Public-API tests of individual pipeline stages

#[path = "../helpers/mod.rs"]
mod helpers;

mod test_config;
mod test_decoder;
mod test_models;
