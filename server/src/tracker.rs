//! Driving stats tracker service
//!
//! [`SpeedTracker`] is the object a host wires into its connection events and
//! its periodic tick. It owns the session registry behind an async lock and
//! forwards finished sessions to a single persistence worker over a bounded
//! queue, so storage I/O never runs inside the tick.
//!
//! Collaborators are injected at construction: a [`Clock`] for session
//! timing, a [`VelocitySource`] for live speed readings and a [`StatStore`]
//! for merging results into storage.

use crate::clock::Clock;
use crate::error::StatStoreError;
use crate::session::FinalizedSession;
use crate::session_manager::{Removal, SessionManager};
use crate::stat_store::{StatBackend, StatStore};
use crate::velocity::VelocitySource;
use log::{debug, error, info, warn};
use shared::{EntryCarInfo, PlayerGuid};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Settings for the tracker and the storage behind it
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Root directory of the JSON stat files
    pub data_dir: PathBuf,
    /// How often every active session is sampled
    pub tick_interval: Duration,
    /// Maximum number of queued persistence jobs
    pub persist_queue_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("entry_car_data"),
            tick_interval: Duration::from_secs(1),
            persist_queue_capacity: 1000,
        }
    }
}

/// Work handed to the persistence worker
#[derive(Debug)]
enum PersistJob {
    Session(FinalizedSession),
    Model {
        model: String,
        driver: Option<String>,
    },
    /// Resolved once every job queued before it has been processed
    Flush(oneshot::Sender<()>),
}

/// Tracks live driving telemetry and persists it when players leave
#[derive(Clone)]
pub struct SpeedTracker {
    sessions: Arc<RwLock<SessionManager>>,
    clock: Arc<dyn Clock>,
    velocities: Arc<dyn VelocitySource>,
    persist_tx: mpsc::Sender<PersistJob>,
}

impl SpeedTracker {
    /// Creates the tracker and spawns its persistence worker
    ///
    /// Must be called from within a Tokio runtime. The worker stops once the
    /// last clone of the tracker is dropped.
    pub fn start<B>(
        clock: Arc<dyn Clock>,
        velocities: Arc<dyn VelocitySource>,
        store: Arc<StatStore<B>>,
        queue_capacity: usize,
    ) -> Self
    where
        B: StatBackend + 'static,
    {
        let (persist_tx, persist_rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(run_persistence_worker(store, persist_rx));

        Self {
            sessions: Arc::new(RwLock::new(SessionManager::new())),
            clock,
            velocities,
            persist_tx,
        }
    }

    /// Opens a session for a connecting player
    ///
    /// Returns false if the player already has an active session.
    pub async fn on_connect(
        &self,
        guid: PlayerGuid,
        name: Option<String>,
        model: impl Into<String>,
    ) -> bool {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;
        sessions.add_session(guid, name, model.into(), now).is_some()
    }

    /// Marks a player's connection as fully established
    pub async fn on_ready(&self, guid: PlayerGuid) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.mark_ready(&guid)
    }

    /// Closes a player's session and queues its stats for persisting
    ///
    /// Returns true if a persistence job was queued. The session is removed in
    /// every case; a queue or storage failure only loses this session's stats.
    pub async fn on_disconnect(&self, guid: PlayerGuid) -> bool {
        let removal = {
            let mut sessions = self.sessions.write().await;
            sessions.remove_session(&guid, self.clock.now_ms())
        };

        match removal {
            Removal::Finalized(summary) => self.enqueue(PersistJob::Session(summary)).await,
            Removal::Incomplete | Removal::NotFound => false,
        }
    }

    /// Pushes one speed sample into every ready session
    ///
    /// Sessions without a velocity reading this tick are skipped. Returns the
    /// number of samples recorded.
    pub async fn on_tick(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut sampled = 0;

        sessions.for_each_session_mut(|session| {
            if !session.ready {
                return;
            }

            if let Some(velocity) = self.velocities.velocity(session.guid) {
                session.record_speed_sample(velocity.speed_kmh());
                sampled += 1;
            }
        });

        sampled
    }

    pub async fn sanitized_name(&self, guid: PlayerGuid) -> String {
        self.sessions.read().await.sanitized_name(&guid)
    }

    pub async fn top_speed(&self, guid: PlayerGuid) -> i32 {
        self.sessions.read().await.top_speed(&guid)
    }

    pub async fn average_speed(&self, guid: PlayerGuid) -> i32 {
        self.sessions.read().await.average_speed(&guid)
    }

    pub async fn has_session(&self, guid: PlayerGuid) -> bool {
        self.sessions.read().await.get_session(&guid).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ensures a summary record exists for every player-driven model
    ///
    /// AI-controlled entries are skipped. Returns the number of queued jobs.
    pub async fn register_models(&self, cars: &[EntryCarInfo]) -> usize {
        let mut queued = 0;

        for car in cars.iter().filter(|car| !car.ai_controlled) {
            let job = PersistJob::Model {
                model: car.model.clone(),
                driver: car.driver.clone(),
            };
            if self.enqueue(job).await {
                queued += 1;
            }
        }

        queued
    }

    /// Waits until every job queued so far has been processed
    pub async fn flush(&self) -> Result<(), StatStoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.persist_tx
            .send(PersistJob::Flush(done_tx))
            .await
            .map_err(|_| StatStoreError::WorkerUnavailable)?;

        done_rx.await.map_err(|_| StatStoreError::WorkerUnavailable)
    }

    /// Closes every active session as if its player disconnected, then flushes
    ///
    /// Returns the number of sessions whose stats were queued.
    pub async fn shutdown(&self) -> Result<usize, StatStoreError> {
        let finalized: Vec<FinalizedSession> = {
            let mut sessions = self.sessions.write().await;
            let now = self.clock.now_ms();
            sessions
                .guids()
                .into_iter()
                .filter_map(|guid| match sessions.remove_session(&guid, now) {
                    Removal::Finalized(summary) => Some(summary),
                    Removal::Incomplete | Removal::NotFound => None,
                })
                .collect()
        };

        let mut queued = 0;
        for summary in finalized {
            if self.enqueue(PersistJob::Session(summary)).await {
                queued += 1;
            }
        }

        self.flush().await?;
        info!("Tracker shut down, {} session(s) saved", queued);
        Ok(queued)
    }

    async fn enqueue(&self, job: PersistJob) -> bool {
        match self.persist_tx.send(job).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping {:?}: {}", e.0, StatStoreError::WorkerUnavailable);
                false
            }
        }
    }
}

/// Drains the persistence queue, running each store call on the blocking pool
async fn run_persistence_worker<B>(store: Arc<StatStore<B>>, mut jobs: mpsc::Receiver<PersistJob>)
where
    B: StatBackend + 'static,
{
    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::Session(summary) => {
                let store = Arc::clone(&store);
                let outcome = tokio::task::spawn_blocking(move || {
                    let result = store.persist_session(&summary);
                    (summary, result)
                })
                .await;

                match outcome {
                    Ok((summary, Ok(stat))) => info!(
                        "Saved stats for {} in {}: {:.2} km total, {} km/h best",
                        summary.name, summary.model, stat.km_driven, stat.top_speed
                    ),
                    Ok((summary, Err(e))) => warn!(
                        "Failed to save stats for {} in {}: {}",
                        summary.name, summary.model, e
                    ),
                    Err(e) => error!("Stat persistence task failed: {}", e),
                }
            }
            PersistJob::Model { model, driver } => {
                let store = Arc::clone(&store);
                let outcome = tokio::task::spawn_blocking(move || {
                    let result = store.ensure_model_record(&model, driver.as_deref());
                    (model, result)
                })
                .await;

                match outcome {
                    Ok((model, Ok(true))) => info!("Registered model {}", model),
                    Ok((_, Ok(false))) => {}
                    Ok((model, Err(e))) => warn!("Failed to register model {}: {}", model, e),
                    Err(e) => error!("Model registration task failed: {}", e),
                }
            }
            PersistJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Persistence worker stopped");
}
