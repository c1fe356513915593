pub mod config;
pub mod error;
pub mod types;

pub use config::DocentConfig;
pub use error::{DocentError, Result};
pub use types::*;
