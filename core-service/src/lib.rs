//! Catalog service façade and background maintenance.
//!
//! This crate wires the runtime (configuration, logging, event bus) to the
//! catalog store. Hosts build a [`CoreConfig`](core_runtime::config::CoreConfig),
//! hand it to [`CatalogService::new`] and call collection operations on the
//! returned handle. When the maintainer is enabled, an [`UncollectedWorker`]
//! refreshes uncollected-works collections whenever an authority's
//! involvements change.

pub mod error;
pub mod service;
pub mod worker;

pub use error::{CoreError, Result};
pub use service::{database_config, CatalogService};
pub use worker::{UncollectedRefresher, UncollectedWorker, WorkerHandle};
