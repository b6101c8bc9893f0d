use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use crate::design::model::Design;
use crate::foundation::core::DesignId;
use crate::foundation::error::{StratumError, StratumResult};

/// Read access to persisted designs, as consumed by the export pipeline.
pub trait DesignRepository: Send + Sync {
    /// Return a consistent copy of the design's current state.
    fn snapshot(&self, id: DesignId) -> StratumResult<Design>;

    /// Return `true` when the design exists.
    fn exists(&self, id: DesignId) -> bool {
        self.snapshot(id).is_ok()
    }
}

/// In-process design repository.
///
/// Each design sits behind its own mutex, so structural edits to one design are serialized
/// while edits to different designs proceed in parallel. Edits are applied to a copy and only
/// committed when the closure succeeds and the tree invariants still hold.
#[derive(Debug, Default)]
pub struct InMemoryDesignStore {
    designs: RwLock<HashMap<DesignId, Arc<Mutex<Design>>>>,
}

impl InMemoryDesignStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a design, returning its id.
    pub fn insert(&self, design: Design) -> StratumResult<DesignId> {
        let id = design.id;
        self.designs
            .write()
            .map_err(|_| poisoned())?
            .insert(id, Arc::new(Mutex::new(design)));
        Ok(id)
    }

    /// Remove a design (and with it all of its layers).
    pub fn remove(&self, id: DesignId) -> StratumResult<Design> {
        let entry = self
            .designs
            .write()
            .map_err(|_| poisoned())?
            .remove(&id)
            .ok_or_else(|| StratumError::not_found(format!("design {id}")))?;
        let design = entry.lock().map_err(|_| poisoned())?.clone();
        Ok(design)
    }

    /// Apply a structural edit under the design's write lock.
    ///
    /// The closure runs against a copy; on error, or if the result violates the z-index or
    /// parentage invariants, the stored design is left untouched.
    pub fn edit<R>(
        &self,
        id: DesignId,
        f: impl FnOnce(&mut Design) -> StratumResult<R>,
    ) -> StratumResult<R> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().map_err(|_| poisoned())?;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        draft.check_integrity()?;
        *guard = draft;
        Ok(out)
    }

    /// Ids of all stored designs.
    pub fn ids(&self) -> StratumResult<Vec<DesignId>> {
        let mut ids: Vec<DesignId> = self
            .designs
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn entry(&self, id: DesignId) -> StratumResult<Arc<Mutex<Design>>> {
        self.designs
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or_else(|| StratumError::not_found(format!("design {id}")))
    }
}

impl DesignRepository for InMemoryDesignStore {
    fn snapshot(&self, id: DesignId) -> StratumResult<Design> {
        let entry = self.entry(id)?;
        let design = entry.lock().map_err(|_| poisoned())?.clone();
        Ok(design)
    }

    fn exists(&self, id: DesignId) -> bool {
        self.designs
            .read()
            .map(|m| m.contains_key(&id))
            .unwrap_or(false)
    }
}

fn poisoned() -> StratumError {
    StratumError::Other(anyhow::anyhow!("design store lock poisoned"))
}

#[cfg(test)]
#[path = "../../tests/unit/design/store.rs"]
mod tests;
