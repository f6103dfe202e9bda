//! Database backends for sqlprobe
//!
//! Each backend is behind a cargo feature:
//! - `postgres`: [`PostgresConnection`] over `tokio-postgres`
//! - `sqlite`: [`SqliteConnection`] over `rusqlite`
//!
//! Both are enabled by default.

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod registration;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;
pub use registration::{SqlProbeBuilderExt, register_probe, register_probes};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
