//! Per-run memoization of source and target lookups.

use crate::error::Result;
use crate::model::{SourceUser, TargetUser};
use crate::source::Source;
use crate::target::Target;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use tracing::trace;

/// Memoizes fallible fetches by key.
#[derive(Debug, Clone)]
pub struct Memo<K, V> {
    entries: HashMap<K, V>,
    hits: usize,
    misses: usize,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<K: Eq + Hash, V> Memo<K, V> {
    /// Cached value for `key`, fetching it on first use.
    ///
    /// A recoverable failure stores `fallback` so the fetch is not repeated;
    /// the error is still returned once for the caller to record. Fatal
    /// failures leave the slot empty.
    pub fn get_or_insert_with_fallback<F>(&mut self, key: K, fallback: V, fetch: F) -> Result<&V>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                match fetch() {
                    Ok(value) => Ok(entry.insert(value)),
                    Err(err) => {
                        if !err.is_fatal() {
                            entry.insert(fallback);
                        }
                        Err(err)
                    }
                }
            }
        }
    }

    #[must_use]
    pub const fn hits(&self) -> usize {
        self.hits
    }

    #[must_use]
    pub const fn misses(&self) -> usize {
        self.misses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Id -> name tables fetched once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Statuses,
    Trackers,
    /// Issue categories of one Redmine project.
    Categories(u64),
}

#[derive(Debug, Default)]
pub struct ResourceCache {
    source_users: Memo<u64, Option<SourceUser>>,
    target_users: Memo<u64, Option<TargetUser>>,
    tables: Memo<Lookup, HashMap<u64, String>>,
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A failed fetch is remembered as `None`.
    pub fn source_user<S: Source>(&mut self, source: &mut S, id: u64) -> Result<Option<SourceUser>> {
        let user = self
            .source_users
            .get_or_insert_with_fallback(id, None, || source.get_user(id))?;
        Ok(user.clone())
    }

    /// A failed fetch is remembered as `None`.
    pub fn target_user<T: Target>(&mut self, target: &mut T, id: u64) -> Result<Option<TargetUser>> {
        let user = self
            .target_users
            .get_or_insert_with_fallback(id, None, || target.find_user(id))?;
        Ok(user.clone())
    }

    /// Name for `id` in one of the lookup tables. A table that failed to load
    /// stays empty for the rest of the run.
    pub fn name<S: Source>(
        &mut self,
        source: &mut S,
        lookup: Lookup,
        id: u64,
    ) -> Result<Option<String>> {
        let table = self.tables.get_or_insert_with_fallback(lookup, HashMap::new(), || {
            trace!(?lookup, "Fetching lookup table");
            let records = match lookup {
                Lookup::Statuses => source.list_statuses()?,
                Lookup::Trackers => source.list_trackers()?,
                Lookup::Categories(project_id) => source.list_categories(project_id)?,
            };
            Ok(records
                .into_iter()
                .map(|record| (record.id, record.name))
                .collect())
        })?;
        Ok(table.get(&id).cloned())
    }

    /// Lookup-table fetches avoided so far.
    #[must_use]
    pub const fn table_hits(&self) -> usize {
        self.tables.hits()
    }
}
