//! Compute layer: query model, SQL generation, handlers and routing.
//!
//! - [`query`]: logical [`DatasetQuery`] values produced by analyzers
//! - [`sql`]: typed SQL statements and the [`QueryBuilder`]
//! - [`handler`]: the [`ComputeHandler`] / [`PrecalcHandler`] traits
//! - [`precalc`]: precomputed tables queried through the columnar backend
//! - [`otf`]: zonal statistics against the raster service
//! - [`engine`]: the [`ComputeEngine`] router
//! - [`backends`]: remote clients and scoped credentials

pub mod backends;
pub mod engine;
pub mod handler;
pub mod otf;
pub mod precalc;
pub mod query;
pub mod sql;

pub use engine::ComputeEngine;
pub use handler::{ComputeHandler, PrecalcHandler};
pub use otf::OtfHandler;
pub use precalc::{default_precalc_tables, PrecalcTable, TablePrecalcHandler};
pub use query::{AggregateFunction, Aggregation, DatasetQuery, Filter, FilterValue, Operator};
pub use sql::{QueryBuilder, SelectStatement};
