pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod ports;
pub mod service;
pub mod tokens;
