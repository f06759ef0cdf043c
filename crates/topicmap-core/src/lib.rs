#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod budget;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
