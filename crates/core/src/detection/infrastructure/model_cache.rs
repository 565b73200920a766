use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::detection::domain::detector::DetectorError;
use crate::shared::detector_type::DetectorType;

/// Cache identity of a loaded model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub detector_type: DetectorType,
    pub model_name: String,
}

impl ModelKey {
    pub fn new(detector_type: DetectorType, model_name: impl Into<String>) -> Self {
        Self {
            detector_type,
            model_name: model_name.into(),
        }
    }
}

/// Process-lifetime cache of loaded models.
///
/// Population is blocking: the first caller for a key runs the loader while
/// concurrent callers for the same key wait on the slot, then all of them
/// share the one resulting `Arc`. A failed load is not cached; the next
/// caller (or the next waiter) retries.
pub struct ModelCache<M> {
    slots: Mutex<HashMap<ModelKey, Arc<ModelSlot<M>>>>,
}

struct ModelSlot<M> {
    state: Mutex<SlotState<M>>,
    ready: Condvar,
}

enum SlotState<M> {
    Empty,
    Loading,
    Ready(Arc<M>),
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached model for `key`, loading it with `loader` if needed.
    pub fn get_or_load<F>(&self, key: &ModelKey, loader: F) -> Result<Arc<M>, DetectorError>
    where
        F: FnOnce() -> Result<M, DetectorError>,
    {
        let slot = self.slot(key);
        let mut state = lock(&slot.state);
        loop {
            if let SlotState::Ready(model) = &*state {
                return Ok(model.clone());
            }
            if matches!(*state, SlotState::Empty) {
                break;
            }
            state = slot
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = SlotState::Loading;
        drop(state);

        log::info!(
            "Loading model {} for {}",
            key.model_name,
            key.detector_type
        );
        let mut pending = PendingLoad {
            slot: slot.as_ref(),
            loaded: None,
        };
        let result = loader().map(Arc::new);
        match &result {
            Ok(model) => pending.loaded = Some(model.clone()),
            Err(e) => log::error!("Failed to load model {}: {e}", key.model_name),
        }
        drop(pending);
        result
    }

    /// Returns the model only if it is already loaded.
    pub fn get(&self, key: &ModelKey) -> Option<Arc<M>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let state = lock(&slot.state);
        match &*state {
            SlotState::Ready(model) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn loaded_count(&self) -> usize {
        let slots: Vec<_> = lock(&self.slots).values().cloned().collect();
        slots
            .iter()
            .filter(|slot| matches!(*lock(&slot.state), SlotState::Ready(_)))
            .count()
    }

    fn slot(&self, key: &ModelKey) -> Arc<ModelSlot<M>> {
        lock(&self.slots)
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(ModelSlot {
                    state: Mutex::new(SlotState::Empty),
                    ready: Condvar::new(),
                })
            })
            .clone()
    }
}

/// Publishes the outcome of a load when dropped. A loader that unwinds
/// leaves `loaded` unset, so the slot goes back to `Empty` and waiters retry.
struct PendingLoad<'a, M> {
    slot: &'a ModelSlot<M>,
    loaded: Option<Arc<M>>,
}

impl<M> Drop for PendingLoad<'_, M> {
    fn drop(&mut self) {
        let mut state = lock(&self.slot.state);
        *state = match self.loaded.take() {
            Some(model) => SlotState::Ready(model),
            None => SlotState::Empty,
        };
        drop(state);
        self.slot.ready.notify_all();
    }
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
