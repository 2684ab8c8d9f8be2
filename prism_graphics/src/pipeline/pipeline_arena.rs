/// Arena of pipeline snapshots addressed by stable keys
///
/// Uses a SlotMap for O(1) insert/remove. A key stays valid until its own
/// pipeline is removed; removing one pipeline never invalidates others.

use std::sync::Arc;
use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use super::pipeline::{Pipeline, PipelineDesc};

// ===== SLOT MAP KEY =====

new_key_type! {
    /// Stable key for a pipeline snapshot within a Context
    pub struct PipelineKey;
}

pub struct PipelineArena {
    pipelines: SlotMap<PipelineKey, Arc<Pipeline>>,
}

impl PipelineArena {
    pub fn new() -> Self {
        Self {
            pipelines: SlotMap::with_key(),
        }
    }

    /// Build a snapshot from `desc` and store it
    pub fn insert(&mut self, desc: PipelineDesc) -> Result<PipelineKey> {
        let pipeline = Pipeline::new(desc)?;
        Ok(self.pipelines.insert(Arc::new(pipeline)))
    }

    pub fn get(&self, key: PipelineKey) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(key)
    }

    /// Remove a snapshot
    ///
    /// Holders of the returned (or any cloned) `Arc` keep it alive.
    pub fn remove(&mut self, key: PipelineKey) -> Option<Arc<Pipeline>> {
        self.pipelines.remove(key)
    }

    pub fn contains(&self, key: PipelineKey) -> bool {
        self.pipelines.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Default for PipelineArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "pipeline_arena_tests.rs"]
mod tests;
