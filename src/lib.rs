//! One-way synchroniser from the TripWatch activity tracker to the legacy
//! on-premise duty database.
//!
//! The pipeline per activation: decode the upstream JSON into the aggregate
//! ([`models`]), derive the fields the database wants but the API does not
//! carry ([`derive`]), fan the aggregate out into per-table column sets
//! ([`schema`], [`extract`]), apply each set with the two-phase upsert
//! ([`upsert`]) and reconcile the job's crew child rows ([`crew`]). The
//! [`sync`] module drives all of that from a poll loop, and direct edits
//! made in the database survive: quiescent (zero) fields are never written.

pub mod coerce;
pub mod config;
pub mod crew;
pub mod derive;
pub mod errors;
pub mod extract;
pub mod gps;
pub mod models;
pub mod schema;
pub mod store;
pub mod sync;
pub mod tripwatch;
pub mod upsert;

pub use config::AppConfig;
pub use errors::LinkError;
pub use models::Activation;
pub use store::{SqliteStore, TableStore};
pub use sync::{Projector, SyncService, SystemClock};
pub use tripwatch::{ActivationSource, TripwatchClient};
