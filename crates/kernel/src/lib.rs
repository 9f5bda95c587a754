//! Mosaic Kernel Library
//!
//! Aggregates records from several sources into one response: merging,
//! sorting, paginating and formatting them. The main entry point for
//! running the server is the `mosaic` binary.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use state::AppState;
