//! Closeflow - a dependency graph engine for month-end close workflows.
//!
//! This crate models tasks and task templates as a directed acyclic graph,
//! validates dependency edits, computes analytics and a layered layout, and
//! keeps an edited graph in step with an external workflow store.

#![forbid(unsafe_code)]

pub mod analytics;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod layout;
pub mod store;
pub mod sync;
pub mod validation;

pub use error::{Error, Result, StoreError};
pub use graph::Graph;
pub use sync::Controller;
