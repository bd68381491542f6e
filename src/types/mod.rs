#![allow(unreachable_pub)]

mod error;
mod result;
mod target;

pub use error::ErrorKind;
pub use result::{FetchError, Payload, RawResult};
pub use target::{InvalidTarget, Target};

/// The fetchpool `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
