//! # Query Cache
//!
//! In-memory cache shared by every component that reads or writes one document type.
//! It holds a single-entity slot per id plus one list slot for the whole collection.
//!
//! ## Discipline
//!
//! - **Copy-on-write**: values are stored by value and replaced wholesale. A caller holding
//!   a clone (a rollback snapshot, say) is never affected by later writes.
//! - **Two views, one truth**: every write that touches an id updates both its entity slot
//!   and its list entry, so the two are value-equal after each completed mutation.
//! - **Read tickets**: a fetch calls [`QueryCache::begin_read`] before going to the
//!   backend and [`QueryCache::finish_read`] after. Optimistic writes bump the epoch for
//!   the id (and the list), so a read that started before the write is discarded instead of
//!   clobbering the newer value.
//!
//! The lock is a plain `std::sync::Mutex`: it is never held across an `.await`.

use crate::entity::SyncEntity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Change notification for live-preview consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<Id> {
    EntityChanged(Id),
    EntityRemoved(Id),
    ListChanged,
    /// `None` when the list slot was invalidated.
    Invalidated(Option<Id>),
}

/// Ticket for a single-entity fetch.
#[derive(Debug, Clone)]
pub struct ReadTicket<Id> {
    id: Id,
    epoch: u64,
}

/// Ticket for a collection fetch.
#[derive(Debug, Clone, Copy)]
pub struct ListTicket {
    epoch: u64,
}

/// Rollback point for one id: its entity slot and its list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot<T> {
    pub entity: Option<T>,
    pub list_entry: Option<T>,
}

/// Serializable image of the cache, used to persist it across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot<T> {
    pub entities: Vec<T>,
    pub list: Option<Vec<T>>,
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    stale: bool,
}

impl<V> Slot<V> {
    fn fresh(value: V) -> Self {
        Self {
            value,
            stale: false,
        }
    }
}

struct State<T: SyncEntity> {
    entities: HashMap<T::Id, Slot<T>>,
    list: Option<Slot<Vec<T>>>,
    entity_epochs: HashMap<T::Id, u64>,
    list_epoch: u64,
}

impl<T: SyncEntity> State<T> {
    fn list_position(&self, id: &T::Id) -> Option<usize> {
        self.list
            .as_ref()
            .and_then(|slot| slot.value.iter().position(|item| item.id() == id))
    }

    /// Replaces the list entry for the entity's id, if the list holds one.
    fn replace_list_entry(&mut self, entity: &T) -> bool {
        match (self.list_position(entity.id()), self.list.as_mut()) {
            (Some(index), Some(slot)) => {
                slot.value[index] = entity.clone();
                true
            }
            _ => false,
        }
    }

    fn bump(&mut self, id: &T::Id) {
        *self.entity_epochs.entry(id.clone()).or_insert(0) += 1;
        self.list_epoch += 1;
    }

    fn entity_epoch(&self, id: &T::Id) -> u64 {
        self.entity_epochs.get(id).copied().unwrap_or(0)
    }
}

pub struct QueryCache<T: SyncEntity> {
    state: Mutex<State<T>>,
    events: broadcast::Sender<CacheEvent<T::Id>>,
}

impl<T: SyncEntity> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncEntity> QueryCache<T> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State {
                entities: HashMap::new(),
                list: None,
                entity_epochs: HashMap::new(),
                list_epoch: 0,
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent<T::Id>) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent<T::Id>> {
        self.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.state().entities.get(id).map(|slot| slot.value.clone())
    }

    pub fn list(&self) -> Option<Vec<T>> {
        self.state().list.as_ref().map(|slot| slot.value.clone())
    }

    pub fn list_entry(&self, id: &T::Id) -> Option<T> {
        let state = self.state();
        state
            .list_position(id)
            .and_then(|index| state.list.as_ref().map(|slot| slot.value[index].clone()))
    }

    pub fn is_stale(&self, id: &T::Id) -> bool {
        self.state().entities.get(id).is_some_and(|slot| slot.stale)
    }

    pub fn is_list_stale(&self) -> bool {
        self.state().list.as_ref().is_some_and(|slot| slot.stale)
    }

    pub fn snapshot_entry(&self, id: &T::Id) -> EntrySnapshot<T> {
        let state = self.state();
        EntrySnapshot {
            entity: state.entities.get(id).map(|slot| slot.value.clone()),
            list_entry: state
                .list_position(id)
                .and_then(|index| state.list.as_ref().map(|slot| slot.value[index].clone())),
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Sets the single-entity slot only.
    pub fn set(&self, entity: T) {
        let id = entity.id().clone();
        self.state()
            .entities
            .insert(id.clone(), Slot::fresh(entity));
        self.emit(CacheEvent::EntityChanged(id));
    }

    /// Sets the entity slot and replaces its list entry when present.
    pub fn write_through(&self, entity: T) {
        let id = entity.id().clone();
        let list_touched = {
            let mut state = self.state();
            let touched = state.replace_list_entry(&entity);
            state.entities.insert(id.clone(), Slot::fresh(entity));
            touched
        };
        self.emit(CacheEvent::EntityChanged(id));
        if list_touched {
            self.emit(CacheEvent::ListChanged);
        }
    }

    /// Drops the single-entity slot, returning what it held.
    pub fn remove(&self, id: &T::Id) -> Option<T> {
        let removed = self.state().entities.remove(id).map(|slot| slot.value);
        if removed.is_some() {
            self.emit(CacheEvent::EntityRemoved(id.clone()));
        }
        removed
    }

    pub fn set_list(&self, items: Vec<T>) {
        self.state().list = Some(Slot::fresh(items));
        self.emit(CacheEvent::ListChanged);
    }

    /// Appends to the list slot when it has been loaded. An existing entry with the
    /// same id is replaced instead.
    pub fn append_to_list(&self, entity: T) -> bool {
        let appended = {
            let mut state = self.state();
            if state.replace_list_entry(&entity) {
                true
            } else if let Some(slot) = state.list.as_mut() {
                slot.value.push(entity);
                true
            } else {
                false
            }
        };
        if appended {
            self.emit(CacheEvent::ListChanged);
        }
        appended
    }

    /// Removes the id from the list slot, returning the list as it was before.
    /// `None` when the list has not been loaded.
    pub fn remove_from_list(&self, id: &T::Id) -> Option<Vec<T>> {
        let prior = {
            let mut state = self.state();
            let slot = state.list.as_mut()?;
            let prior = slot.value.clone();
            slot.value.retain(|item| item.id() != id);
            prior
        };
        self.emit(CacheEvent::ListChanged);
        Some(prior)
    }

    pub fn restore_list(&self, items: Vec<T>) {
        self.set_list(items);
    }

    /// Optimistically applies `patch` to the id's cached value.
    ///
    /// In-flight reads for the id and for the list are cancelled first. The base is the
    /// entity slot, falling back to the list entry. Both views receive the result.
    /// Returns `None` when nothing for the id is cached.
    pub fn apply_patch(&self, id: &T::Id, patch: &T::Patch) -> Option<T> {
        let (next, list_touched) = {
            let mut state = self.state();
            state.bump(id);
            let base = match state.entities.get(id) {
                Some(slot) => slot.value.clone(),
                None => {
                    let index = state.list_position(id)?;
                    state.list.as_ref()?.value[index].clone()
                }
            };
            let next = base.apply_patch(patch);
            let touched = state.replace_list_entry(&next);
            let stale = state.entities.get(id).is_some_and(|slot| slot.stale);
            state.entities.insert(
                id.clone(),
                Slot {
                    value: next.clone(),
                    stale,
                },
            );
            (next, touched)
        };
        debug!(entity_type = T::KIND, %id, "Optimistic write");
        self.emit(CacheEvent::EntityChanged(id.clone()));
        if list_touched {
            self.emit(CacheEvent::ListChanged);
        }
        Some(next)
    }

    /// Puts the id's entity slot and list entry back to a snapshot.
    pub fn restore(&self, id: &T::Id, snapshot: EntrySnapshot<T>) {
        let list_touched = {
            let mut state = self.state();
            state.bump(id);
            match snapshot.entity {
                Some(entity) => {
                    state.entities.insert(id.clone(), Slot::fresh(entity));
                }
                None => {
                    state.entities.remove(id);
                }
            }
            match snapshot.list_entry {
                Some(entry) => state.replace_list_entry(&entry),
                None => false,
            }
        };
        debug!(entity_type = T::KIND, %id, "Rolled back");
        self.emit(CacheEvent::EntityChanged(id.clone()));
        if list_touched {
            self.emit(CacheEvent::ListChanged);
        }
    }

    // ---------------------------------------------------------------------
    // Staleness and read tickets
    // ---------------------------------------------------------------------

    pub fn invalidate(&self, id: &T::Id) {
        if let Some(slot) = self.state().entities.get_mut(id) {
            slot.stale = true;
        }
        self.emit(CacheEvent::Invalidated(Some(id.clone())));
    }

    pub fn invalidate_list(&self) {
        if let Some(slot) = self.state().list.as_mut() {
            slot.stale = true;
        }
        self.emit(CacheEvent::Invalidated(None));
    }

    pub fn begin_read(&self, id: &T::Id) -> ReadTicket<T::Id> {
        let epoch = self.state().entity_epoch(id);
        ReadTicket {
            id: id.clone(),
            epoch,
        }
    }

    pub fn begin_list_read(&self) -> ListTicket {
        ListTicket {
            epoch: self.state().list_epoch,
        }
    }

    /// Invalidates every outstanding ticket for the id and for the list.
    pub fn cancel_reads(&self, id: &T::Id) {
        self.state().bump(id);
    }

    /// Lands a fetched entity unless its ticket was cancelled. Returns whether it landed.
    pub fn finish_read(&self, ticket: ReadTicket<T::Id>, entity: T) -> bool {
        let list_touched = {
            let mut state = self.state();
            if state.entity_epoch(&ticket.id) != ticket.epoch {
                debug!(entity_type = T::KIND, id = %ticket.id, "Discarded stale read");
                return false;
            }
            let touched = state.replace_list_entry(&entity);
            state
                .entities
                .insert(ticket.id.clone(), Slot::fresh(entity));
            touched
        };
        self.emit(CacheEvent::EntityChanged(ticket.id));
        if list_touched {
            self.emit(CacheEvent::ListChanged);
        }
        true
    }

    /// Lands a fetched collection unless its ticket was cancelled. Entity slots that are
    /// already cached are refreshed from it so both views agree.
    pub fn finish_list_read(&self, ticket: ListTicket, items: Vec<T>) -> bool {
        {
            let mut state = self.state();
            if state.list_epoch != ticket.epoch {
                debug!(entity_type = T::KIND, "Discarded stale list read");
                return false;
            }
            for item in &items {
                if let Some(slot) = state.entities.get_mut(item.id()) {
                    *slot = Slot::fresh(item.clone());
                }
            }
            state.list = Some(Slot::fresh(items));
        }
        self.emit(CacheEvent::ListChanged);
        true
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> CacheSnapshot<T> {
        let state = self.state();
        CacheSnapshot {
            entities: state
                .entities
                .values()
                .map(|slot| slot.value.clone())
                .collect(),
            list: state.list.as_ref().map(|slot| slot.value.clone()),
        }
    }

    /// Loads a persisted snapshot. Everything hydrated is marked stale so the next
    /// read goes back to the backend.
    pub fn hydrate(&self, snapshot: CacheSnapshot<T>) {
        {
            let mut state = self.state();
            for entity in snapshot.entities {
                state.entities.insert(
                    entity.id().clone(),
                    Slot {
                        value: entity,
                        stale: true,
                    },
                );
            }
            if let Some(items) = snapshot.list {
                state.list = Some(Slot {
                    value: items,
                    stale: true,
                });
            }
        }
        self.emit(CacheEvent::Invalidated(None));
    }
}
