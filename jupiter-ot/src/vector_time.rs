//! Per-site logical clocks.
//!
//! A component counts operations: for a site's own id, how many requests it
//! generated; for any other id, how many of that site's requests it has
//! integrated. Components only ever grow, one step at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::SiteId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorTime {
    components: BTreeMap<SiteId, u64>,
}

impl VectorTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component for `site`; unknown sites read as zero.
    pub fn get(&self, site: &SiteId) -> u64 {
        self.components.get(site).copied().unwrap_or(0)
    }

    /// Bump `site` by one and return the new value.
    pub fn increment(&mut self, site: SiteId) -> u64 {
        let entry = self.components.entry(site).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Register `site` with a zero component if it is not known yet.
    pub fn track(&mut self, site: SiteId) {
        self.components.entry(site).or_insert(0);
    }

    pub fn contains(&self, site: &SiteId) -> bool {
        self.components.contains_key(site)
    }

    /// Whether every component of `other` is already reflected here.
    pub fn dominates(&self, other: &VectorTime) -> bool {
        other
            .components
            .iter()
            .all(|(site, count)| self.get(site) >= *count)
    }

    pub fn sites(&self) -> impl Iterator<Item = &SiteId> {
        self.components.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SiteId, &u64)> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Sum of all components.
    pub fn total(&self) -> u64 {
        self.components.values().sum()
    }
}

impl FromIterator<(SiteId, u64)> for VectorTime {
    fn from_iter<T: IntoIterator<Item = (SiteId, u64)>>(iter: T) -> Self {
        Self {
            components: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for VectorTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (site, count)) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{site}: {count}")?;
        }
        write!(f, "]")
    }
}
