pub mod error;
pub mod logging;
pub mod normalization;

pub use error::*;
