// Library exports for the server binary and tests
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod prompts;
pub mod service;
pub mod session;
pub mod validation;

pub use self::config::*;
pub use self::engine::*;
pub use self::error::*;
pub use self::models::*;
pub use self::prompts::*;
pub use self::service::*;
pub use self::session::*;
pub use self::validation::*;
