//! Data models for Fetchwarden

pub mod fetch;
pub mod remote;
pub mod repository;
pub mod settings;
mod timestamp;

pub use fetch::*;
pub use remote::*;
pub use repository::*;
pub use settings::*;
