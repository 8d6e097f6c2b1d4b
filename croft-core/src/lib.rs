pub mod error;
pub mod payment;
pub mod repository;

pub use error::{Error, Result};
