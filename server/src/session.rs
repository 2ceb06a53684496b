//! Live telemetry for a single connected driver
//!
//! A [`Session`] lives from connect to disconnect. It records one speed sample
//! per tick and derives elapsed time and distance from its creation timestamp,
//! so nothing but the samples and the top speed is actually accumulated.

use crate::sanitize::sanitize_username;
use crate::speed_window::SpeedSampler;
use shared::{PlayerGuid, PlayerStat, MS_PER_HOUR, NO_NAME};

/// Telemetry state for one connected player
#[derive(Debug, Clone)]
pub struct Session {
    /// Stable player identifier supplied by the host
    pub guid: PlayerGuid,
    /// Display name as reported by the client, unsanitized
    pub name: String,
    /// Vehicle model the player is driving
    pub model: String,
    /// Server time (ms) at which the session was created
    pub created_at_ms: u64,
    /// True once the host reports a fully established connection
    pub ready: bool,
    sampler: SpeedSampler,
}

impl Session {
    pub fn new(guid: PlayerGuid, name: Option<String>, model: String, created_at_ms: u64) -> Self {
        Self {
            guid,
            name: name.unwrap_or_else(|| NO_NAME.to_string()),
            model,
            created_at_ms,
            ready: false,
            sampler: SpeedSampler::new(),
        }
    }

    pub fn sanitized_name(&self) -> String {
        sanitize_username(&self.name)
    }

    /// Feeds one speed reading (km/h) into the window and the top speed
    pub fn record_speed_sample(&mut self, speed: i32) {
        self.sampler.add_sample(speed);
        self.sampler.update_top_speed(speed);
    }

    pub fn average_speed(&self) -> i32 {
        self.sampler.average()
    }

    pub fn top_speed(&self) -> i32 {
        self.sampler.top_speed()
    }

    pub fn sampler(&self) -> &SpeedSampler {
        &self.sampler
    }

    /// Milliseconds since creation, clamped at zero if the clock reads earlier
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// Kilometres driven, estimated as average km/h times elapsed hours
    pub fn distance_km(&self, now_ms: u64) -> f64 {
        let hours = self.elapsed_ms(now_ms) as f64 / MS_PER_HOUR;
        f64::from(self.average_speed()) * hours
    }

    /// Produces the metrics to persist for this session
    ///
    /// Returns `None` when the connection never became ready: those sessions
    /// are dropped without touching storage.
    pub fn finalize(&self, now_ms: u64) -> Option<FinalizedSession> {
        if !self.ready {
            return None;
        }

        Some(FinalizedSession {
            guid: self.guid,
            model: self.model.clone(),
            name: self.sanitized_name(),
            distance_km: self.distance_km(now_ms),
            time_spent_ms: self.elapsed_ms(now_ms) as f64,
            top_speed: self.top_speed(),
        })
    }
}

/// Final metrics of a closed session, ready to be merged into storage
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSession {
    pub guid: PlayerGuid,
    pub model: String,
    /// Already sanitized
    pub name: String,
    pub distance_km: f64,
    pub time_spent_ms: f64,
    pub top_speed: i32,
}

impl FinalizedSession {
    pub fn to_player_stat(&self) -> PlayerStat {
        PlayerStat {
            username: self.name.clone(),
            km_driven: self.distance_km,
            time_spent: self.time_spent_ms,
            top_speed: self.top_speed,
        }
    }
}
