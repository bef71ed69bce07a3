mod config;
mod error;
mod types;

pub use config::*;
pub use error::{ErrorKind, Result, SdbError};
pub use types::{Locator, Location, PageId};
