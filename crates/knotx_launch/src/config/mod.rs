//! Configuration: bootstrap file, placeholder substitution, retrieval and
//! per-module lookup

mod bootstrap;
mod error;
mod module_config;
mod retriever;
mod substitution;

pub use bootstrap::*;
pub use error::*;
pub use module_config::*;
pub use retriever::*;
pub use substitution::*;
