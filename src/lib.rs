//! Export the Gmail messages exchanged with one address to a CSV file.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod mail;

pub use error::{Error, Result};
