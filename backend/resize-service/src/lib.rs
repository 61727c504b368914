//! Resize Service
//!
//! On-demand image resizing over HTTP with memoized results, a synchronous
//! admission-controlled path and a deduplicating background queue.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
