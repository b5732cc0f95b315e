//! # Quarry Core
//!
//! Shared logic for Quarry: data models, vector math, text chunking, the
//! document store abstraction with its in-memory reference backend, and the
//! hybrid multi-query retriever.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other native-only
//! dependencies. All async surfaces are `async-trait` methods, so backends
//! built on network or database runtimes plug in from application crates.

pub mod chunk;
pub mod error;
pub mod models;
pub mod retrieve;
pub mod store;
pub mod vector;
