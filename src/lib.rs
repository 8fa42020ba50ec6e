//! # rig-ingest: behavioral session ingestion and reconciliation
//!
//! rig-ingest turns the raw log files of a stimulus-presentation rig (a
//! stimlog from the presentation software plus a riglog from the rig
//! controller, possibly split across multiple runs) into one internally
//! consistent, time-aligned record stream per session, assigns the session
//! a durable identity, and keeps flat-file session/animal/trial bookkeeping
//! idempotently up to date for downstream aggregation and plotting.
//!
//! ## Pipeline
//!
//! ```text
//! Session ─▶ format adapters (per run) ─▶ stitch ─▶ extrapolate ─▶ SessionData
//!    │                                                                  │
//!    └─▶ SessionMeta (identity) ──▶ save_to_db / is_saved ◀─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use rig_ingest::config::Config;
//! use rig_ingest::session::{Session, SessionData};
//!
//! # fn main() -> rig_ingest::Result<()> {
//! let config = Config::load("pipeline.json".as_ref())?;
//! let mut session = Session::new(&config, "230615_KC045_detect_AB", false, false)?;
//!
//! if !session.is_saved() {
//!     let raw = session.read_data()?;
//!     let tables = raw.runs.iter().map(|r| r.data.clone()).collect();
//!     session.save_data(&SessionData::new(tables))?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod logs;
pub mod session;
pub mod sheets;

pub use error::{Error, Result};
