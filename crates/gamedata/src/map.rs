//! Keyed record tables

use super::error::{GameDataError, Result};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A record that can live in a [`GameDataMap`]
pub trait DataRecord {
    /// Short identifier (packet id, server abbreviation, ...)
    type Id: Eq + Hash + Clone + Debug + Display;

    fn id(&self) -> Self::Id;

    /// Full name of the record
    fn name(&self) -> &str;
}

/// Read-only mapping of short identifiers to records
///
/// # Lookups
/// - [`by_id`](Self::by_id): exact short identifier
/// - [`by_name`](Self::by_name): exact full name, must be unique
/// - [`find`](Self::find): predicate, must match exactly one record
#[derive(Debug, Clone)]
pub struct GameDataMap<R: DataRecord> {
    map: HashMap<R::Id, R>,
}

impl<R: DataRecord> GameDataMap<R> {
    /// Build a map from records; a later record replaces an earlier one with the same id
    pub fn new(records: impl IntoIterator<Item = R>) -> Self {
        let map = records.into_iter().map(|r| (r.id(), r)).collect();
        Self { map }
    }

    pub fn by_id(&self, id: &R::Id) -> Result<&R> {
        self.map
            .get(id)
            .ok_or_else(|| GameDataError::NotFound(format!("id {}", id)))
    }

    pub fn by_name(&self, name: &str) -> Result<&R> {
        self.find_described(&format!("name {}", name), |r| r.name() == name)
    }

    pub fn find(&self, predicate: impl Fn(&R) -> bool) -> Result<&R> {
        self.find_described("predicate", predicate)
    }

    /// Whether any record matches
    pub fn any(&self, predicate: impl Fn(&R) -> bool) -> bool {
        self.map.values().any(predicate)
    }

    /// All records matching a predicate
    pub fn filter<'a>(&'a self, predicate: impl Fn(&R) -> bool + 'a) -> impl Iterator<Item = &'a R> + 'a {
        self.map.values().filter(move |r| predicate(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn find_described(&self, what: &str, predicate: impl Fn(&R) -> bool) -> Result<&R> {
        let mut matches = self.map.values().filter(|r| predicate(r));
        let first = matches
            .next()
            .ok_or_else(|| GameDataError::NotFound(what.to_string()))?;
        if matches.next().is_some() {
            return Err(GameDataError::Ambiguous(what.to_string()));
        }
        Ok(first)
    }
}
