/*
 * Created on Mon Jul 13 2020
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2020, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The core database engine
//!
//! The in-memory table, the TTL table and the blocking-pop waiter map all
//! live behind one lock in [`Coretable`]. Every command handler and the TTL
//! sweeper take that lock, mutate, and release it before doing any I/O or
//! waiting, so individual operations execute as if atomic with respect to
//! the store. The lock is never held across a blocking wait: blocking pops
//! register a [`waitmap::Waiter`] under the lock and then suspend on the
//! waiter handle with the lock released.

pub mod waitmap;

use crate::coredb::waitmap::{WaitMap, Waiter};
use libkestrel::protocol::Value;
use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The end of a list that a push or pop works on
pub enum End {
    Head,
    Tail,
}

/// This is a thread-safe database handle, which on cloning simply
/// gives another atomic reference to the `shared` object
#[derive(Debug, Clone)]
pub struct CoreDB {
    /// The shared object, which contains the table wrapped in a thread-safe
    /// RC
    pub shared: Arc<Shared>,
}

/// A shared _state_
#[derive(Debug)]
pub struct Shared {
    /// The `Coretable` wrapped in a R/W lock
    pub table: RwLock<Coretable>,
}

/// The `Coretable` holds all the key-value pairs, the TTL table and the
/// per-key queues of blocked poppers
#[derive(Debug, Default)]
pub struct Coretable {
    /// The core table contains the key-value pairs
    coremap: HashMap<String, Value>,
    /// Remaining seconds per key. Every key in here also exists in `coremap`
    ttl: HashMap<String, i64>,
    /// The per-key FIFOs of waiters suspended in blocking pops
    waiters: WaitMap,
}

impl Coretable {
    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.coremap.get(key)
    }
    /// Set `key` to `value`, replacing any prior value regardless of its
    /// variant. An existing TTL entry for the key is left alone; `EXPIRE`
    /// and `PERSIST` are the only TTL mutators
    pub fn set(&mut self, key: String, value: Value) {
        self.coremap.insert(key, value);
    }
    /// Remove a key from both the table and the TTL table. Returns true if
    /// the key existed
    pub fn del(&mut self, key: &str) -> bool {
        self.ttl.remove(key);
        self.coremap.remove(key).is_some()
    }
    /// Remove all keys and all TTL entries, returning the prior key count
    pub fn flush(&mut self) -> usize {
        let prior = self.len();
        self.coremap.clear();
        self.ttl.clear();
        prior
    }
    /// Create an empty list at `key` if the key doesn't exist
    pub fn ensure_list(&mut self, key: &str) {
        if !self.coremap.contains_key(key) {
            self.coremap.insert(key.to_owned(), Value::List(Vec::new()));
        }
    }
    /// Push the provided values onto the list at `key`, creating an empty
    /// list if the key is absent. Values are inserted one at a time in
    /// argument order, so a head push leaves the **last** argument at the
    /// head. Returns the new length, or `None` if the key holds a non-list
    pub fn push(&mut self, key: &str, end: End, values: Vec<Value>) -> Option<usize> {
        self.ensure_list(key);
        match self.coremap.get_mut(key) {
            Some(Value::List(list)) => {
                for value in values {
                    match end {
                        End::Head => list.insert(0, value),
                        End::Tail => list.push(value),
                    }
                }
                Some(list.len())
            }
            _ => {
                log::warn!("the value at '{}' is not a list", key);
                None
            }
        }
    }
    /// Remove and return one element from the given end of the list at
    /// `key`. Returns `None` if the key is absent, the list is empty or the
    /// value is not a list; callers cannot tell these cases apart
    pub fn pop(&mut self, key: &str, end: End) -> Option<Value> {
        match self.coremap.get_mut(key) {
            Some(Value::List(list)) => {
                if list.is_empty() {
                    None
                } else {
                    match end {
                        End::Head => Some(list.remove(0)),
                        End::Tail => list.pop(),
                    }
                }
            }
            Some(_) => {
                log::warn!("the value at '{}' is not a list", key);
                None
            }
            None => None,
        }
    }
    /// The length of the list at `key`, or `None` if the key is absent or
    /// holds a non-list
    pub fn list_len(&self, key: &str) -> Option<usize> {
        match self.coremap.get(key) {
            Some(Value::List(list)) => Some(list.len()),
            _ => None,
        }
    }
    /// Set the TTL for `key` to `seconds`, replacing any prior TTL. Keys
    /// that don't exist in the table get no TTL entry, keeping the TTL
    /// table a subset of the key space
    pub fn expire(&mut self, key: &str, seconds: i64) {
        if self.coremap.contains_key(key) {
            self.ttl.insert(key.to_owned(), seconds);
        }
    }
    /// The remaining seconds for `key`, or -1 if it has no TTL
    pub fn ttl_of(&self, key: &str) -> i64 {
        match self.ttl.get(key) {
            Some(seconds) => *seconds,
            None => -1,
        }
    }
    /// Remove the TTL entry for `key`, if any
    pub fn persist(&mut self, key: &str) {
        self.ttl.remove(key);
    }
    /// One pass of the expirer: decrement every TTL entry and evict the
    /// keys whose TTL fell below zero from both tables. Returns how many
    /// keys were evicted
    pub fn sweep_expired(&mut self) -> usize {
        let mut todelete = Vec::new();
        for (key, seconds) in self.ttl.iter_mut() {
            *seconds -= 1;
            if *seconds < 0 {
                todelete.push(key.clone());
            }
        }
        for key in &todelete {
            self.ttl.remove(key);
            self.coremap.remove(key);
        }
        todelete.len()
    }
    /// Register a fresh waiter at the tail of the per-key FIFO
    pub fn register_waiter(&mut self, key: &str) -> Arc<Waiter> {
        self.waiters.register(key)
    }
    /// Hand off to the first pending waiter on `key`, if any
    pub fn wake_one(&mut self, key: &str) {
        self.waiters.wake_one(key)
    }
    /// The `key, type, size` summary returned by `INFO`, one line per key,
    /// keys sorted
    pub fn info_summary(&self) -> String {
        let mut keys: Vec<&String> = self.coremap.keys().collect();
        keys.sort();
        let mut result = String::from("key, type, size\n");
        for key in keys {
            let value = &self.coremap[key];
            result.push_str(&format!(
                "{}, {}, {}\n",
                key,
                value.type_name(),
                value.size()
            ));
        }
        result
    }
    /// The number of keys in the table
    pub fn len(&self) -> usize {
        self.coremap.len()
    }
}

impl CoreDB {
    /// Create an empty in-memory table
    pub fn new_empty() -> Self {
        CoreDB {
            shared: Arc::new(Shared {
                table: RwLock::new(Coretable::default()),
            }),
        }
    }
    /// Acquire a write lock
    pub fn acquire_write(&self) -> RwLockWriteGuard<'_, Coretable> {
        self.shared.table.write()
    }
    /// Acquire a read lock
    pub fn acquire_read(&self) -> RwLockReadGuard<'_, Coretable> {
        self.shared.table.read()
    }
}
