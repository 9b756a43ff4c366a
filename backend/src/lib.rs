//! # Land Analytics Backend
//!
//! Analysis job orchestration and compute routing for land-change analytics.
//!
//! A request names an analytic and an area of interest (AOI). The crate
//! validates and normalizes it, derives a deterministic resource id from the
//! normalized request, and answers either immediately or through a stored
//! job that clients poll. Computation is routed to precalculated summary
//! tables when one covers the request and falls back to on-the-fly zonal
//! statistics otherwise.
//!
//! ## Architecture
//!
//! - [`api`]: shared domain types (`Analysis`, `AreaOfInterest`, `ResultTable`, `Outcome`)
//! - [`analyzers`]: request types, immediate and deferred analyzers, the registry
//! - [`compute`]: dataset queries, SQL building, precalc and OTF handlers, the engine
//! - [`db`]: fingerprinting and the analysis repository (local or Postgres)
//! - [`services`]: in-process job tracking
//! - [`config`]: `analytics.toml` loading with environment overrides
//! - [`http`]: Axum-based HTTP server (feature `http-server`)

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod analyzers;
pub mod api;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
