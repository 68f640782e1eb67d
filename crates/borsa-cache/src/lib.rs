#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Caching implementations for Turkish market data providers.
//!
//! This crate provides implementations of the [`DataCache`] trait from `borsa-core`:
//!
//! - [`MemoryCache`] - Expiring in-memory cache shared by all providers
//! - [`NoopCache`] - No-op cache that doesn't store anything

/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

// Re-export the trait for convenience
pub use borsa_core::DataCache;

// Re-export implementations
pub use memory::MemoryCache;
pub use noop::NoopCache;
