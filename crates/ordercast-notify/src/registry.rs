// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal registry: which connections listen for which location.
//
// A single mutex guards both the `location -> members` map and the reverse
// `connection -> location` index, so a connection is in at most one set and
// no set is ever left empty. Broadcasts copy the member list out under the
// lock and deliver after releasing it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use ordercast_core::error::Result;
use ordercast_core::types::{ConnectionId, Location, LocationSet};

use crate::connection::TerminalHandle;

#[derive(Debug, Clone)]
struct Member {
    handle: TerminalHandle,
    terminal_id: Option<String>,
    registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    by_location: HashMap<Location, HashMap<ConnectionId, Member>>,
    location_of: HashMap<ConnectionId, Location>,
}

impl Inner {
    fn remove(&mut self, id: ConnectionId) -> Option<Location> {
        let location = self.location_of.remove(&id)?;
        if let Some(members) = self.by_location.get_mut(&location) {
            members.remove(&id);
            if members.is_empty() {
                self.by_location.remove(&location);
            }
        }
        Some(location)
    }
}

/// One registered terminal, as `/stats` lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSummary {
    pub connection_id: String,
    pub terminal_id: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// In-memory map of locations to the terminals registered for them.
#[derive(Debug)]
pub struct TerminalRegistry {
    locations: LocationSet,
    inner: Mutex<Inner>,
}

impl TerminalRegistry {
    pub fn new(locations: LocationSet) -> Self {
        Self {
            locations,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn locations(&self) -> &LocationSet {
        &self.locations
    }

    /// Register `handle` under `raw_location`, moving it if it was already
    /// registered elsewhere.
    ///
    /// Returns the validated location and its new member count. An unknown
    /// location leaves any existing registration untouched.
    pub fn register(
        &self,
        handle: &TerminalHandle,
        raw_location: &str,
        terminal_id: Option<String>,
    ) -> Result<(Location, usize)> {
        let location = self.locations.parse(raw_location)?;
        let id = handle.id();

        let mut inner = self.lock();
        let previous = inner.remove(id);
        let members = inner.by_location.entry(location.clone()).or_default();
        members.insert(
            id,
            Member {
                handle: handle.clone(),
                terminal_id: terminal_id.clone(),
                registered_at: Utc::now(),
            },
        );
        let count = members.len();
        inner.location_of.insert(id, location.clone());
        drop(inner);

        if let Some(prev) = previous.filter(|p| *p != location) {
            debug!(connection = %id, from = %prev, to = %location, "terminal moved location");
        }
        info!(
            connection = %id,
            location = %location,
            terminal_id = terminal_id.as_deref().unwrap_or("-"),
            count,
            "terminal registered"
        );
        Ok((location, count))
    }

    /// Remove a connection from whichever location holds it. No-op if it
    /// never registered.
    pub fn unregister(&self, id: ConnectionId) -> Option<Location> {
        let removed = self.lock().remove(id);
        if let Some(location) = &removed {
            info!(connection = %id, location = %location, "terminal unregistered");
        }
        removed
    }

    pub fn location_of(&self, id: ConnectionId) -> Option<Location> {
        self.lock().location_of.get(&id).cloned()
    }

    pub fn count_for(&self, location: &Location) -> usize {
        self.lock().by_location.get(location).map_or(0, HashMap::len)
    }

    /// Terminal count for every configured location, zero included.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let inner = self.lock();
        self.locations
            .all()
            .into_iter()
            .map(|loc| {
                let n = inner.by_location.get(&loc).map_or(0, HashMap::len);
                (loc.to_string(), n)
            })
            .collect()
    }

    /// Snapshot of the handles registered for `location`.
    pub fn members_of(&self, location: &Location) -> Vec<TerminalHandle> {
        self.lock()
            .by_location
            .get(location)
            .map(|members| members.values().map(|m| m.handle.clone()).collect())
            .unwrap_or_default()
    }

    /// Registered terminals per location, for diagnostics.
    pub fn describe(&self) -> BTreeMap<String, Vec<TerminalSummary>> {
        let inner = self.lock();
        inner
            .by_location
            .iter()
            .map(|(loc, members)| {
                let mut list: Vec<TerminalSummary> = members
                    .iter()
                    .map(|(id, m)| TerminalSummary {
                        connection_id: id.to_string(),
                        terminal_id: m.terminal_id.clone(),
                        registered_at: m.registered_at,
                    })
                    .collect();
                list.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
                (loc.to_string(), list)
            })
            .collect()
    }

    /// Total registered connections across all locations.
    pub fn registered(&self) -> usize {
        self.lock().location_of.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use ordercast_core::error::OrdercastError;

    use super::*;

    fn registry() -> TerminalRegistry {
        TerminalRegistry::new(LocationSet::new(["siteA", "siteB", "siteC"]))
    }

    fn loc(r: &TerminalRegistry, code: &str) -> Location {
        r.locations().parse(code).unwrap()
    }

    /// Every connection in at most one set, and no empty sets.
    fn assert_consistent(r: &TerminalRegistry) {
        let inner = r.lock();
        let mut seen = 0;
        for (location, members) in &inner.by_location {
            assert!(!members.is_empty(), "empty set left for {location}");
            for id in members.keys() {
                assert_eq!(inner.location_of.get(id), Some(location));
                seen += 1;
            }
        }
        assert_eq!(seen, inner.location_of.len());
    }

    #[test]
    fn register_counts_members() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        let (b, _rb) = TerminalHandle::channel(4);

        assert_eq!(r.register(&a, "siteA", Some("T1".into())).unwrap().1, 1);
        let (location, count) = r.register(&b, " siteA ", None).unwrap();
        assert_eq!(location.as_str(), "siteA");
        assert_eq!(count, 2);
        assert_eq!(r.count_for(&loc(&r, "siteA")), 2);
        assert_consistent(&r);
    }

    #[test]
    fn reregistering_moves_the_connection() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteA", None).unwrap();
        r.register(&a, "siteB", None).unwrap();

        assert_eq!(r.count_for(&loc(&r, "siteA")), 0);
        assert_eq!(r.count_for(&loc(&r, "siteB")), 1);
        assert_eq!(r.location_of(a.id()), Some(loc(&r, "siteB")));
        assert_eq!(r.registered(), 1);
        assert_consistent(&r);
    }

    #[test]
    fn unknown_location_keeps_prior_registration() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteA", None).unwrap();

        let err = r.register(&a, "nowhere", None).unwrap_err();
        assert!(matches!(err, OrdercastError::InvalidLocation(_)));
        assert_eq!(r.location_of(a.id()), Some(loc(&r, "siteA")));
        assert_consistent(&r);
    }

    #[test]
    fn unregister_deletes_empty_sets_and_is_idempotent() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteC", None).unwrap();

        assert_eq!(r.unregister(a.id()), Some(loc(&r, "siteC")));
        assert_eq!(r.unregister(a.id()), None);
        assert!(r.describe().is_empty());
        assert_consistent(&r);
    }

    #[test]
    fn counts_include_idle_locations() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteB", None).unwrap();

        let counts = r.counts();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["siteA"], 0);
        assert_eq!(counts["siteB"], 1);
    }

    #[test]
    fn members_of_is_a_snapshot() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteA", None).unwrap();

        let snapshot = r.members_of(&loc(&r, "siteA"));
        r.unregister(a.id());
        assert_eq!(snapshot.len(), 1);
        assert!(r.members_of(&loc(&r, "siteA")).is_empty());
    }

    #[test]
    fn describe_lists_terminal_ids() {
        let r = registry();
        let (a, _ra) = TerminalHandle::channel(4);
        r.register(&a, "siteA", Some("front-till".into())).unwrap();

        let described = r.describe();
        let entry = &described["siteA"][0];
        assert_eq!(entry.connection_id, a.id().to_string());
        assert_eq!(entry.terminal_id.as_deref(), Some("front-till"));
    }

    #[test]
    fn concurrent_churn_stays_consistent() {
        let r = std::sync::Arc::new(registry());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let r = r.clone();
                std::thread::spawn(move || {
                    let (h, _rx) = TerminalHandle::channel(1);
                    let sites = ["siteA", "siteB", "siteC"];
                    for n in 0..200 {
                        r.register(&h, sites[(i + n) % 3], None).unwrap();
                        if n % 7 == 0 {
                            r.unregister(h.id());
                        }
                    }
                    r.unregister(h.id());
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(r.registered(), 0);
        assert_consistent(&r);
    }
}
