use serde::{Deserialize, Serialize};

pub const NO_NAME: &str = "No Name";
pub const MS_TO_KMH: f32 = 3.6;
pub const MS_PER_HOUR: f64 = 3_600_000.0;

pub type PlayerGuid = u64;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        guid: PlayerGuid,
        name: Option<String>,
        model: String,
    },
    Ready {
        guid: PlayerGuid,
    },
    Velocity {
        guid: PlayerGuid,
        velocity: Vector3,
    },
    Disconnect {
        guid: PlayerGuid,
    },
    EntryList {
        cars: Vec<EntryCarInfo>,
    },
    QueryStats {
        guid: PlayerGuid,
    },

    LiveStats {
        guid: PlayerGuid,
        name: String,
        average_speed: i32,
        top_speed: i32,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Speed in whole km/h for a velocity given in m/s, truncated toward zero.
    pub fn speed_kmh(&self) -> i32 {
        (self.length() * MS_TO_KMH) as i32
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntryCarInfo {
    pub model: String,
    pub driver: Option<String>,
    pub ai_controlled: bool,
}

/// Per-player, per-model totals as stored on disk.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerStat {
    pub username: String,
    pub km_driven: f64,
    pub time_spent: f64,
    pub top_speed: i32,
}

impl Default for PlayerStat {
    fn default() -> Self {
        Self {
            username: NO_NAME.to_string(),
            km_driven: 0.0,
            time_spent: 0.0,
            top_speed: 0,
        }
    }
}

impl PlayerStat {
    /// Folds a newer record into this one: distance and time add up, top speed
    /// keeps the maximum and the name is always taken from `newer`.
    pub fn merged_with(&self, newer: &PlayerStat) -> PlayerStat {
        PlayerStat {
            username: newer.username.clone(),
            km_driven: self.km_driven + newer.km_driven,
            time_spent: self.time_spent + newer.time_spent,
            top_speed: self.top_speed.max(newer.top_speed),
        }
    }
}

/// Per-model summary. Written once when the model is first seen.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModelStat {
    pub total_km_driven: i32,
    pub best_top_speed: i32,
    pub most_common_driver: String,
}

impl Default for ModelStat {
    fn default() -> Self {
        Self {
            total_km_driven: 0,
            best_top_speed: 0,
            most_common_driver: NO_NAME.to_string(),
        }
    }
}

impl ModelStat {
    pub fn new(driver: Option<&str>) -> Self {
        Self {
            most_common_driver: driver.unwrap_or(NO_NAME).to_string(),
            ..Default::default()
        }
    }
}
