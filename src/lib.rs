pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod typing;

pub use error::*;
pub use models::*;
