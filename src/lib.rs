pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod sftp_logic;

pub use error::{EngineError, Result};
