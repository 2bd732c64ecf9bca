pub mod config;
pub mod error;
pub mod types;

pub use config::HotmacroConfig;
pub use error::{HotmacroError, Result};
pub use types::*;
