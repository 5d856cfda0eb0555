//! # In-Memory Store
//!
//! A [`KvStore`] that lives inside the process. All state sits behind one
//! async mutex, so every primitive is trivially atomic. Keys with a TTL are
//! expired on the next access after their deadline, and a periodic sweep on
//! writes drops the ones nobody reads again.
//!
//! Sorted-set scans page through members in (score, member) order. A scan
//! cursor remembers the last member it returned, so a member present for the
//! whole scan is returned even when others are added or removed between
//! pages. The scan-and-lock walk uses the trait's client-side default, which
//! keeps that code path exercised.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ttl_millis, KvStore, StoreError, StoreResult};

const DEFAULT_SCAN_PAGE_SIZE: usize = 10;
/// Writes between two sweeps of expired keys.
const SWEEP_EVERY: usize = 128;
/// Abandoned scans past this many are forgotten, oldest first.
const MAX_OPEN_CURSORS: usize = 1024;

#[derive(Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn score(&self, member: &str) -> Option<i64> {
        self.scores.get(member).copied()
    }

    fn remove(&mut self, member: &str) -> Option<i64> {
        let score = self.scores.remove(member)?;
        self.order.remove(&(score, member.to_string()));
        Some(score)
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Up to `limit` members strictly after `after` in (score, member) order.
    fn page_after(&self, after: Option<&(i64, String)>, limit: usize) -> Vec<(i64, String)> {
        match after {
            Some(position) => self
                .order
                .range((Excluded(position.clone()), Unbounded))
                .take(limit)
                .cloned()
                .collect(),
            None => self.order.iter().take(limit).cloned().collect(),
        }
    }
}

enum Slot {
    Text(String),
    Hash(HashMap<String, String>),
    SortedSet(SortedSet),
}

struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

/// Where an open scan resumes.
struct ScanPosition {
    set_key: String,
    after: (i64, String),
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    cursors: BTreeMap<u64, ScanPosition>,
    last_cursor: u64,
    writes_since_sweep: usize,
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

fn deadline(ttl: Duration) -> Instant {
    Instant::now() + Duration::from_millis(ttl_millis(ttl))
}

impl Keyspace {
    /// Looks up `key`, dropping it first if its TTL has passed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some_and(|at| at <= now));
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Counts a write and every `SWEEP_EVERY` writes drops all expired keys.
    fn note_write(&mut self) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep < SWEEP_EVERY {
            return;
        }
        self.writes_since_sweep = 0;
        let now = Instant::now();
        self.entries
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
    }

    fn text(&mut self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Text(value) => Ok(Some(value.clone())),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn put_text(&mut self, key: &str, value: &str, expires_at: Option<Instant>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at,
            },
        );
        self.note_write();
    }

    fn hash(&mut self, key: &str) -> StoreResult<Option<&mut HashMap<String, String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.slot {
                Slot::Hash(fields) => Ok(Some(fields)),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn hash_or_insert(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        self.note_write();
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|entry| &mut entry.slot) {
            Some(Slot::Hash(fields)) => Ok(fields),
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_set(&mut self, key: &str) -> StoreResult<Option<&mut SortedSet>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => match &mut entry.slot {
                Slot::SortedSet(members) => Ok(Some(members)),
                _ => Err(wrong_type(key)),
            },
        }
    }

    fn sorted_set_or_insert(&mut self, key: &str) -> StoreResult<&mut SortedSet> {
        self.note_write();
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::SortedSet(SortedSet::default()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|entry| &mut entry.slot) {
            Some(Slot::SortedSet(members)) => Ok(members),
            _ => Err(wrong_type(key)),
        }
    }

    /// Resume point for `cursor` on `set_key`. Unknown or foreign cursors
    /// restart the scan, which may repeat members but never skips one.
    fn take_cursor(&mut self, set_key: &str, cursor: u64) -> Option<(i64, String)> {
        if cursor == 0 {
            return None;
        }
        self.cursors
            .remove(&cursor)
            .filter(|position| position.set_key == set_key)
            .map(|position| position.after)
    }

    fn open_cursor(&mut self, set_key: &str, after: (i64, String)) -> u64 {
        while self.cursors.len() >= MAX_OPEN_CURSORS {
            self.cursors.pop_first();
        }
        self.last_cursor = self.last_cursor.wrapping_add(1).max(1);
        self.cursors.insert(
            self.last_cursor,
            ScanPosition {
                set_key: set_key.to_string(),
                after,
            },
        );
        self.last_cursor
    }
}

/// A process-local store. Clones share the same keyspace.
#[derive(Clone)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    scan_page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    /// Number of sorted-set members returned per `zscan` page (at least 1).
    pub fn with_scan_page_size(mut self, page_size: usize) -> Self {
        self.scan_page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace.put_text(key, value, Some(deadline(ttl)));
        Ok(true)
    }

    async fn cas_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.text(key)?.as_deref() == Some(expected) {
            keyspace.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn expire_if_equal(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.text(key)?.as_deref() != Some(expected) {
            return Ok(false);
        }
        if let Some(entry) = keyspace.live(key) {
            entry.expires_at = Some(deadline(ttl));
        }
        Ok(true)
    }

    async fn zadd(&self, set_key: &str, member: &str, score: i64) -> StoreResult<()> {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.sorted_set_or_insert(set_key)?.insert(member, score);
        Ok(())
    }

    async fn zscore(&self, set_key: &str, member: &str) -> StoreResult<Option<i64>> {
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace
            .sorted_set(set_key)?
            .and_then(|members| members.score(member)))
    }

    async fn zscan(&self, set_key: &str, cursor: u64) -> StoreResult<(u64, Vec<(String, i64)>)> {
        let mut keyspace = self.keyspace.lock().await;
        let after = keyspace.take_cursor(set_key, cursor);
        let Some(members) = keyspace.sorted_set(set_key)? else {
            return Ok((0, Vec::new()));
        };

        // One extra member tells whether another page follows.
        let mut page = members.page_after(after.as_ref(), self.scan_page_size + 1);
        let more = page.len() > self.scan_page_size;
        page.truncate(self.scan_page_size);

        let next = match page.last() {
            Some(last) if more => keyspace.open_cursor(set_key, last.clone()),
            _ => 0,
        };
        Ok((next, page.into_iter().map(|(score, member)| (member, score)).collect()))
    }

    async fn zrem_if_score(&self, set_key: &str, member: &str, expected_score: i64) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        let Some(members) = keyspace.sorted_set(set_key)? else {
            return Ok(false);
        };
        if members.score(member) != Some(expected_score) {
            return Ok(false);
        }
        members.remove(member);
        if members.is_empty() {
            keyspace.entries.remove(set_key);
        }
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.keyspace.lock().await.text(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.put_text(key, value, ttl.map(deadline));
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace.lock().await.live(key).is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_none() {
            return Ok(false);
        }
        keyspace.entries.remove(key);
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace.hash(key)?.and_then(|fields| fields.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut keyspace = self.keyspace.lock().await;
        keyspace
            .hash_or_insert(key)?
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace
            .hash(key)?
            .is_some_and(|fields| fields.contains_key(field)))
    }
}
