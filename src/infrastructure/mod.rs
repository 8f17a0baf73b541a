pub mod history;
pub mod ollama;
pub mod session_store;
pub mod settings;
pub mod traits;
