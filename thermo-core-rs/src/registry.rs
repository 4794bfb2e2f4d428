//! Coordinator-side registry of peripheral values

use crate::error::{Error, RegistrationError, Result};
use crate::thermal::is_settled;
use crate::types::PeerId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Latest known values of one peripheral
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeripheralRecord {
    pub id: PeerId,
    pub current_value: f64,
    /// Value from the round before; absent until one full round has passed
    pub previous_value: Option<f64>,
}

impl PeripheralRecord {
    pub fn new(id: PeerId, value: f64) -> Self {
        Self {
            id,
            current_value: value,
            previous_value: None,
        }
    }

    /// Change since the previous round, if there was one
    pub fn delta(&self) -> Option<f64> {
        self.previous_value.map(|p| (self.current_value - p).abs())
    }
}

/// Fixed-capacity map id → record, keyed 1..=capacity
#[derive(Debug, Clone)]
pub struct Registry {
    capacity: usize,
    records: BTreeMap<PeerId, PeripheralRecord>,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: BTreeMap::new(),
        }
    }

    /// Add a newly registered peripheral
    pub fn register(
        &mut self,
        id: PeerId,
        value: f64,
    ) -> std::result::Result<(), RegistrationError> {
        if id == 0 || id as usize > self.capacity {
            return Err(RegistrationError::IdOutOfRange {
                id,
                max: self.capacity,
            });
        }
        if self.records.contains_key(&id) {
            return Err(RegistrationError::DuplicateId(id));
        }
        self.records.insert(id, PeripheralRecord::new(id, value));
        Ok(())
    }

    /// Record a round's reply; snapshots the old value first when `keep_previous`
    pub fn update(&mut self, id: PeerId, value: f64, keep_previous: bool) -> Result<()> {
        let record = self.records.get_mut(&id).ok_or(Error::UnknownPeer(id))?;
        if keep_previous {
            record.previous_value = Some(record.current_value);
        }
        record.current_value = value;
        Ok(())
    }

    /// True when every record has a previous value within `epsilon` of its current one
    pub fn is_stable(&self, epsilon: f64) -> bool {
        !self.records.is_empty()
            && self.records.values().all(|r| match r.previous_value {
                Some(prev) => is_settled(prev, r.current_value, epsilon),
                None => false,
            })
    }

    pub fn get(&self, id: PeerId) -> Option<&PeripheralRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.records.contains_key(&id)
    }

    /// Current values in id order
    pub fn current_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.values().map(|r| r.current_value)
    }

    pub fn records(&self) -> impl Iterator<Item = &PeripheralRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }
}
