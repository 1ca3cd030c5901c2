//! `tt-route` — route geometry and reference-data catalogs.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                        |
//! |--------------|-----------------------------------------------------------------|
//! | [`geometry`] | `RouteGeometry` (polyline + stops + R-tree), `RouteGeometryBuilder` |
//! | [`catalog`]  | `RouteCatalog` / `ScheduleCatalog` traits and in-memory impls   |
//! | [`loader`]   | CSV loaders for shapes, stops and schedules                     |
//! | [`error`]    | `RouteError`, `RouteResult<T>`                                  |
//!
//! Reference data is read-only during tracking.  The engine receives it
//! through the catalog traits, never through global state, so tests can
//! hand it synthetic geometries.

pub mod catalog;
pub mod error;
pub mod geometry;
pub mod loader;

#[cfg(test)]
mod tests;

pub use catalog::{
    InMemoryRouteCatalog, InMemoryScheduleCatalog, NoSchedule, RouteCatalog, ScheduleCatalog,
    ScheduledStop,
};
pub use error::{RouteError, RouteResult};
pub use geometry::{RouteGeometry, RouteGeometryBuilder, RouteProjection, RouteStop};
pub use loader::{load_routes_csv, load_routes_reader, load_schedule_csv, load_schedule_reader};
