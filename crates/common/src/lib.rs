//! Types shared by the auth bridge crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
