//! Runtime components: the deploy capability, module descriptors, the
//! launcher and the concrete runtimes

pub mod descriptor;
pub mod error;
pub mod executor;
pub mod process;
pub mod task;
pub mod traits;

pub use descriptor::*;
pub use error::*;
pub use executor::*;
pub use process::*;
pub use task::*;
pub use traits::*;
