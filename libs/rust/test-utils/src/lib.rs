//! Shared test utilities for the service portal Rust crates.
//!
//! This crate provides:
//! - Proptest generators for tokens, methods and statuses
//! - A manual clock and a scripted token fetcher
//! - Test fixtures with sample request and response bodies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod generators;
pub mod mocks;
pub mod fixtures;

pub use generators::*;
pub use mocks::{ManualClock, MockTokenFetcher};
