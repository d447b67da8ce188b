mod client;
mod models;

pub use client::{ApiClient, Result};
pub use models::ClientConfig;
