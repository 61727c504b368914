//! Business logic for resize-service
//!
//! - `fetch`: retrieving source images over HTTP
//! - `resize`: decoding, scaling and JPEG re-encoding
//! - `orchestrator`: admission control, background queue, status tracking, shutdown

pub mod fetch;
pub mod orchestrator;
pub mod resize;

pub use fetch::{Fetcher, HttpFetcher};
pub use orchestrator::{Orchestrator, Retrieval};
pub use resize::{JpegResizer, Resizer};
