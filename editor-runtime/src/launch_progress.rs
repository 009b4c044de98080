//! In-memory progress tracking for editor launches.
//!
//! Frontends can poll a launch while the image is verified or rebuilt rather
//! than waiting for the whole request to complete.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPhase {
    Queued,
    Connecting,
    ImageCheck,
    ImageBuild,
    ContainerCreate,
    ContainerStart,
    Warmup,
    Ready,
    Failed,
}

impl LaunchPhase {
    /// Progress percentage (0–100) for UI rendering.
    pub fn progress_pct(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Connecting => 5,
            Self::ImageCheck => 15,
            Self::ImageBuild => 30,
            Self::ContainerCreate => 60,
            Self::ContainerStart => 75,
            Self::Warmup => 90,
            Self::Ready => 100,
            Self::Failed => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchStatus {
    pub launch_id: Uuid,
    pub template: String,
    pub container_id: Option<String>,
    pub phase: LaunchPhase,
    pub message: Option<String>,
    pub started_at: u64,
    pub updated_at: u64,
    pub progress_pct: u8,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct LaunchTracker {
    launches: DashMap<Uuid, LaunchStatus>,
}

impl LaunchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a new launch of `template`.
    pub fn start(&self, template: &str) -> LaunchStatus {
        let now = crate::util::now_ts();
        let status = LaunchStatus {
            launch_id: Uuid::new_v4(),
            template: template.to_string(),
            container_id: None,
            phase: LaunchPhase::Queued,
            message: Some("Queued for launch".into()),
            started_at: now,
            updated_at: now,
            progress_pct: 0,
        };
        self.launches.insert(status.launch_id, status.clone());
        status
    }

    /// Move a launch to `phase`. Returns the updated status.
    pub fn update(
        &self,
        launch_id: Uuid,
        phase: LaunchPhase,
        message: Option<String>,
        container_id: Option<String>,
    ) -> Option<LaunchStatus> {
        let now = crate::util::now_ts();
        let mut entry = self.launches.get_mut(&launch_id)?;
        entry.phase = phase;
        entry.progress_pct = phase.progress_pct();
        entry.updated_at = now;
        if let Some(msg) = message {
            entry.message = Some(msg);
        }
        if let Some(id) = container_id {
            entry.container_id = Some(id);
        }
        Some(entry.value().clone())
    }

    pub fn get(&self, launch_id: Uuid) -> Option<LaunchStatus> {
        self.launches.get(&launch_id).map(|e| e.value().clone())
    }

    /// All launches, oldest first.
    pub fn list_all(&self) -> Vec<LaunchStatus> {
        let mut all: Vec<LaunchStatus> = self.launches.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| (s.started_at, s.launch_id));
        all
    }

    /// Remove terminal launches last updated more than `max_age_secs` ago.
    pub fn gc(&self, max_age_secs: u64) {
        let cutoff = crate::util::now_ts().saturating_sub(max_age_secs);
        self.launches
            .retain(|_, s| !s.phase.is_terminal() || s.updated_at > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_lifecycle() {
        let tracker = LaunchTracker::new();
        let status = tracker.start("vue");
        assert_eq!(status.phase, LaunchPhase::Queued);
        assert_eq!(status.progress_pct, 0);

        let updated = tracker
            .update(
                status.launch_id,
                LaunchPhase::ImageBuild,
                Some("Building code-server-vue:latest".into()),
                None,
            )
            .unwrap();
        assert_eq!(updated.phase, LaunchPhase::ImageBuild);
        assert_eq!(updated.progress_pct, 30);
        assert!(!tracker.get(status.launch_id).unwrap().phase.is_terminal());

        let updated = tracker
            .update(
                status.launch_id,
                LaunchPhase::Ready,
                None,
                Some("ctr-1".into()),
            )
            .unwrap();
        assert_eq!(updated.progress_pct, 100);
        assert_eq!(updated.container_id.as_deref(), Some("ctr-1"));
        // Message is kept when an update carries none.
        assert_eq!(updated.message.as_deref(), Some("Building code-server-vue:latest"));

        assert_eq!(tracker.get(status.launch_id).unwrap().phase, LaunchPhase::Ready);
    }

    #[test]
    fn update_unknown_launch_is_none() {
        let tracker = LaunchTracker::new();
        assert!(
            tracker
                .update(Uuid::new_v4(), LaunchPhase::Ready, None, None)
                .is_none()
        );
    }

    #[test]
    fn gc_keeps_active_launches() {
        let tracker = LaunchTracker::new();
        let done = tracker.start("node");
        let running = tracker.start("react");
        tracker.update(done.launch_id, LaunchPhase::Failed, None, None);
        tracker.update(running.launch_id, LaunchPhase::Warmup, None, None);

        // Zero retention drops every terminal launch updated before now.
        tracker.launches.alter(&done.launch_id, |_, mut s| {
            s.updated_at = s.updated_at.saturating_sub(10);
            s
        });
        tracker.gc(0);

        assert!(tracker.get(done.launch_id).is_none());
        assert!(tracker.get(running.launch_id).is_some());
    }

    #[test]
    fn phases_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(LaunchPhase::ContainerStart).unwrap(),
            "container_start"
        );
    }
}
