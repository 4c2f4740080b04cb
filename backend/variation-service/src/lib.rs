//! Variation Service
//!
//! Accepts uploaded videos and produces randomized variations of them in
//! background jobs, with pollable progress and a similarity score per variation.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
