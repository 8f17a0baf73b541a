//! Chat session service over a local Ollama runtime - Library exports for testing

pub mod api;
pub mod core;
pub mod infrastructure;
