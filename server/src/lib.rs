//! # Driving Stats Tracker
//!
//! This library tracks per-player driving telemetry while players are connected
//! to a racing server and keeps cumulative per-player, per-car statistics on
//! disk across reconnects and restarts.
//!
//! ## Core Responsibilities
//!
//! ### Live Telemetry
//! Every connected player gets a session that receives one speed sample per
//! tick. The session keeps a short sliding window of samples for the average
//! speed and a running top speed. Elapsed time and distance are derived from
//! the session's creation time rather than accumulated.
//!
//! ### Session Lifecycle
//! Sessions are created on connect (at most one per player), become eligible
//! for sampling and persistence once the host reports the connection as ready,
//! and are finalized exactly once on disconnect.
//!
//! ### Stat Persistence
//! A finalized session is merged into the stored totals for its
//! (car model, player) pair: distance and time are summed, the best top speed
//! is kept and the display name is refreshed. Corrupt stored data never blocks
//! a merge; it is treated as absent.
//!
//! ## Architecture Design
//!
//! ### Explicit Service Object
//! [`tracker::SpeedTracker`] is constructed once with its collaborators (clock,
//! velocity source, stat store) injected. There is no global state.
//!
//! ### Serialized Registry
//! The session registry sits behind a single async lock. Connects, disconnects
//! and tick sweeps each hold it for their whole critical section, so a player
//! leaving mid-sweep cannot disturb the sweep over everyone else.
//!
//! ### Single-Writer Persistence
//! Storage work is queued to one worker task over a bounded channel and run on
//! the blocking pool. The tick never waits on disk. The stat store also locks
//! per key, so even concurrent merges for the same player cannot lose data.
//!
//! ## Module Organization
//!
//! - `sanitize`: display-name escaping, redaction and truncation
//! - `speed_window`: sliding window of speed samples with running top speed
//! - `session`: one player's live telemetry and its derived metrics
//! - `session_manager`: registry of active sessions
//! - `stat_store`: merge-on-finalize persistence and storage backends
//! - `tracker`: the service object a host wires into its events
//! - `clock` / `velocity`: injectable time and velocity sources
//! - `network`: UDP bridge letting an external host drive the tracker
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::clock::ServerClock;
//! use server::stat_store::{JsonFileBackend, StatStore};
//! use server::tracker::SpeedTracker;
//! use server::velocity::VelocityTable;
//! use shared::Vector3;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let velocities = Arc::new(VelocityTable::new());
//!     let store = Arc::new(StatStore::new(JsonFileBackend::new("entry_car_data")));
//!     let tracker = SpeedTracker::start(
//!         Arc::new(ServerClock::new()),
//!         velocities.clone(),
//!         store,
//!         1000,
//!     );
//!
//!     tracker.on_connect(42, Some("Driver".to_string()), "ks_mazda_mx5_cup").await;
//!     tracker.on_ready(42).await;
//!
//!     // Once per second the host reports velocities and ticks the tracker
//!     velocities.update(42, Vector3::new(27.8, 0.0, 0.0));
//!     tracker.on_tick().await;
//!
//!     tracker.on_disconnect(42).await;
//!     tracker.flush().await.ok();
//! }
//! ```

pub mod clock;
pub mod error;
pub mod network;
pub mod sanitize;
pub mod session;
pub mod session_manager;
pub mod speed_window;
pub mod stat_store;
pub mod tracker;
pub mod velocity;
