//! Network boundary for the strategies.
//!
//! This module provides:
//! - The [`Fetcher`] trait the engine calls for every network access
//! - [`HttpFetcher`], a reqwest-backed implementation with optional
//!   upstream origin rewriting for proxy deployments

mod client;
mod fetcher;

pub use client::HttpFetcher;
pub use fetcher::{DynFetcher, Fetcher};
