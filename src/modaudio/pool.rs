// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Slot pool with insertion-ordered enumeration.
//!
//! Storage is a `SlotMap`, so a removed key is rejected even after its slot
//! is reused. Each entry carries links to its neighbours in allocation order.
use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable address of a pooled value.
    pub struct PoolKey;
}

struct Entry<T> {
    value: T,
    prev: Option<PoolKey>,
    next: Option<PoolKey>,
}

pub struct Pool<T> {
    slots: SlotMap<PoolKey, Entry<T>>,
    head: Option<PoolKey>,
    tail: Option<PoolKey>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Pool<T> {
        Pool {
            slots: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    /// Stores a value at the tail of the enumeration order.
    pub fn allocate(&mut self, value: T) -> PoolKey {
        let key = self.slots.insert(Entry {
            value,
            prev: self.tail,
            next: None,
        });
        match self.tail.and_then(|tail| self.slots.get_mut(tail)) {
            Some(tail) => tail.next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    pub fn get(&self, key: PoolKey) -> Option<&T> {
        self.slots.get(key).map(|entry| &entry.value)
    }

    #[cfg(test)]
    pub fn contains(&self, key: PoolKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Unlinks and returns the value. The key and every copy of it become invalid.
    pub fn remove(&mut self, key: PoolKey) -> Option<T> {
        let entry = self.slots.remove(key)?;
        match entry.prev.and_then(|prev| self.slots.get_mut(prev)) {
            Some(prev) => prev.next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next.and_then(|next| self.slots.get_mut(next)) {
            Some(next) => next.prev = entry.prev,
            None => self.tail = entry.prev,
        }
        Some(entry.value)
    }

    /// The most recently allocated live key.
    pub fn last_key(&self) -> Option<PoolKey> {
        self.tail
    }

    /// The key allocated before `key`. Capture it before removing `key`.
    pub fn prev_key(&self, key: PoolKey) -> Option<PoolKey> {
        self.slots.get(key)?.prev
    }

    /// Live values in insertion order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let key = cursor?;
            let entry = self.slots.get(key)?;
            cursor = entry.next;
            Some((key, &entry.value))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Releases every outstanding slot, returning the values tail first.
    /// Slot versions survive, so keys handed out before stay invalid.
    pub fn free_all(&mut self) -> Vec<T> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut cursor = self.tail;
        while let Some(key) = cursor {
            order.push(key);
            cursor = self.slots.get(key).and_then(|entry| entry.prev);
        }

        let mut drained: HashMap<PoolKey, Entry<T>> = self.slots.drain().collect();
        self.head = None;
        self.tail = None;
        order
            .into_iter()
            .filter_map(|key| drained.remove(&key))
            .map(|entry| entry.value)
            .collect()
    }
}
