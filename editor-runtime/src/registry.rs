//! In-memory registry of editor containers started by this process.
//!
//! Entries live for the lifetime of the process. Nothing is ever evicted,
//! even after the underlying container stops.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveContainer {
    pub template: String,
    pub port: u16,
    pub start_time: DateTime<Utc>,
    pub container_id: String,
    pub work_dir: String,
}

/// An `ActiveContainer` as returned by the listing endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ContainerListing {
    pub id: String,
    #[serde(flatten)]
    pub info: ActiveContainer,
}

#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: DashMap<String, ActiveContainer>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a container under its id, replacing any previous entry.
    pub fn insert(&self, info: ActiveContainer) {
        self.containers.insert(info.container_id.clone(), info);
    }

    /// Every recorded container, oldest first.
    pub fn list(&self) -> Vec<ContainerListing> {
        let mut listings: Vec<ContainerListing> = self
            .containers
            .iter()
            .map(|entry| ContainerListing {
                id: entry.key().clone(),
                info: entry.value().clone(),
            })
            .collect();
        listings.sort_by(|a, b| {
            a.info
                .start_time
                .cmp(&b.info.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, secs: i64) -> ActiveContainer {
        ActiveContainer {
            template: "node".into(),
            port: 8042,
            start_time: Utc.timestamp_opt(secs, 0).unwrap(),
            container_id: id.into(),
            work_dir: "/home/coder/project/node-app".into(),
        }
    }

    #[test]
    fn list_is_ordered_by_start_time() {
        let registry = ContainerRegistry::new();
        registry.insert(entry("c2", 200));
        registry.insert(entry("c1", 100));
        registry.insert(entry("c3", 200));

        let ids: Vec<String> = registry.list().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn insert_same_id_replaces() {
        let registry = ContainerRegistry::new();
        registry.insert(entry("c1", 100));
        let mut newer = entry("c1", 300);
        newer.port = 8999;
        registry.insert(newer);

        let listings = registry.list();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].info.port, 8999);
    }

    #[test]
    fn listing_serializes_flat_camel_case() {
        let registry = ContainerRegistry::new();
        registry.insert(entry("abc123", 1_700_000_000));

        let json = serde_json::to_value(registry.list()).unwrap();
        let item = &json[0];
        assert_eq!(item["id"], "abc123");
        assert_eq!(item["containerId"], "abc123");
        assert_eq!(item["template"], "node");
        assert_eq!(item["port"], 8042);
        assert_eq!(item["workDir"], "/home/coder/project/node-app");
        assert_eq!(item["startTime"], "2023-11-14T22:13:20Z");
    }
}
