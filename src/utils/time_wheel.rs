// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::Attributes;
use crate::{AppError, AppResult};

/// Attribute key under which an entry remembers its slot index.
pub const HEART_WHEEL_POS: &str = "HEART_WHEEL_POS";

/// Something the wheel can track.
pub trait WheelEntry: Send + Sync + 'static {
    /// unique among all live entries
    fn entry_id(&self) -> u64;

    fn attributes(&self) -> &Attributes;

    /// Inactive entries are never (re)inserted.
    fn is_active(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct WheelState<T> {
    slots: Vec<HashMap<u64, Arc<T>>>,
    cursor: usize,
}

/// Single resolution timing wheel.
///
/// `size` slots, the cursor moves one slot per tick. A refreshed entry always
/// lands in the slot under the cursor, so it is swept when the cursor comes
/// back to that slot, `size` ticks later. Refresh, unregister and the per-tick
/// sweep are O(1) regardless of how many entries are tracked.
///
/// Every entry is in at most one slot, and its `HEART_WHEEL_POS` attribute
/// names that slot. Both are only changed under the wheel's lock.
#[derive(Debug)]
pub struct TimeWheel<T> {
    state: Mutex<WheelState<T>>,
    size: usize,
}

impl<T: WheelEntry> TimeWheel<T> {
    pub fn new(size: usize) -> AppResult<Self> {
        if size == 0 {
            return Err(AppError::InvalidConfig(
                "time wheel needs at least one slot".into(),
            ));
        }
        Ok(TimeWheel {
            state: Mutex::new(WheelState {
                slots: (0..size).map(|_| HashMap::new()).collect(),
                cursor: 0,
            }),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.state.lock().slots.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entry: &T) -> bool {
        let state = self.state.lock();
        entry
            .attributes()
            .get::<usize>(HEART_WHEEL_POS)
            .and_then(|pos| state.slots.get(pos))
            .is_some_and(|slot| slot.contains_key(&entry.entry_id()))
    }

    /// Moves the entry into the slot under the cursor, registering it if it
    /// was not tracked yet. Its sweep is pushed `size` ticks ahead.
    pub fn refresh(&self, entry: &Arc<T>) {
        let mut state = self.state.lock();
        if !entry.is_active() {
            return;
        }
        let id = entry.entry_id();
        let attributes = entry.attributes();
        if let Some(old_pos) = attributes.get::<usize>(HEART_WHEEL_POS) {
            if let Some(slot) = state.slots.get_mut(old_pos) {
                slot.remove(&id);
            }
        }
        let cursor = state.cursor;
        state.slots[cursor].insert(id, entry.clone());
        attributes.set(HEART_WHEEL_POS, cursor);
    }

    /// Stops tracking the entry; a no-op for entries never registered.
    pub fn unregister(&self, entry: &T) {
        let mut state = self.state.lock();
        let attributes = entry.attributes();
        if let Some(old_pos) = attributes.get::<usize>(HEART_WHEEL_POS) {
            if let Some(slot) = state.slots.get_mut(old_pos) {
                slot.remove(&entry.entry_id());
            }
            attributes.remove(HEART_WHEEL_POS);
        }
    }

    /// Advances the cursor one slot and empties it, returning what was left
    /// there. Only the slot swap happens under the lock, handling the expired
    /// entries is up to the caller.
    pub fn tick(&self) -> Vec<Arc<T>> {
        let expired = {
            let mut state = self.state.lock();
            state.cursor = (state.cursor + 1) % self.size;
            let cursor = state.cursor;
            mem::take(&mut state.slots[cursor])
        };
        expired.into_values().collect()
    }
}
