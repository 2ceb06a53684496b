//! Live vehicle velocity lookups for the sampling tick

use shared::{PlayerGuid, Vector3};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Provides the current velocity (m/s) of a player's car
pub trait VelocitySource: Send + Sync {
    fn velocity(&self, guid: PlayerGuid) -> Option<Vector3>;
}

/// Latest reported velocity per player, fed by the host bridge
#[derive(Debug, Default)]
pub struct VelocityTable {
    latest: RwLock<HashMap<PlayerGuid, Vector3>>,
}

impl VelocityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, guid: PlayerGuid, velocity: Vector3) {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guid, velocity);
    }

    pub fn remove(&self, guid: PlayerGuid) {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guid);
    }

    pub fn clear(&self) {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VelocitySource for VelocityTable {
    fn velocity(&self, guid: PlayerGuid) -> Option<Vector3> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guid)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_table() {
        let table = VelocityTable::new();
        assert!(table.is_empty());
        assert_eq!(table.velocity(1), None);

        table.update(1, Vector3::new(10.0, 0.0, 0.0));
        table.update(1, Vector3::new(20.0, 0.0, 0.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.velocity(1), Some(Vector3::new(20.0, 0.0, 0.0)));

        table.remove(1);
        assert_eq!(table.velocity(1), None);

        table.update(2, Vector3::default());
        table.update(3, Vector3::default());
        table.clear();
        assert!(table.is_empty());
    }
}
