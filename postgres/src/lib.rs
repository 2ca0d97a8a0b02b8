//! `PostgreSQL` adapters for Roaman.
//!
//! - [`PostgresBookingStore`]: the [`BookingStore`](roaman_core::store::BookingStore)
//!   used in production, with row locks for per-room serialization and an
//!   exclusion constraint as a last line against overlapping stays
//! - [`PgNotifyBus`]: an [`AvailabilityBus`](roaman_core::availability::AvailabilityBus)
//!   over `LISTEN`/`NOTIFY`, so every server instance sharing the database sees
//!   every room change
//!
//! # Example
//!
//! ```ignore
//! use roaman_postgres::{PgNotifyBus, PostgresBookingStore};
//!
//! let store = PostgresBookingStore::connect(&database_url).await?;
//! store.migrate().await?;
//! let bus = PgNotifyBus::new(store.pool().clone());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
mod rows;
pub mod store;

pub use bus::PgNotifyBus;
pub use store::{PostgresBookingStore, PostgresReservationTx};
