pub mod conversation;
pub mod errors;
pub mod services;
pub mod traits;
