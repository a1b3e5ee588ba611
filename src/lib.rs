pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod web_service;

pub use error::{Result, WebServiceError};
