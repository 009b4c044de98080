//! Container engine types and backend trait.
//!
//! The launch flow only needs a handful of Docker API calls. They are grouped
//! behind the async `ContainerEngine` trait so the flow can run against the
//! real daemon (`DockerEngine`) or the in-memory `mock::MockEngine` in tests.

mod docker;

pub use docker::{DockerEngine, pack_build_context};

use std::path::PathBuf;

use crate::error::Result;

/// Daemon details reported by `ContainerEngine::info`.
#[derive(Clone, Debug, Default)]
pub struct EngineInfo {
    pub server_version: Option<String>,
}

/// An image as seen by list or inspect calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageEntry {
    /// Content-addressed id, `sha256:<hex>`.
    pub id: String,
    pub repo_tags: Vec<String>,
    /// Creation time, RFC 3339.
    pub created: Option<String>,
}

impl ImageEntry {
    pub fn has_tag(&self, name: &str) -> bool {
        self.repo_tags.iter().any(|t| t == name)
    }
}

/// Parameters for building a template image.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// Directory the build context is taken from.
    pub context_dir: PathBuf,
    /// Entries of `context_dir` included in the context. Directories are
    /// added recursively.
    pub files: Vec<String>,
    /// Tag applied to the resulting image (`repo:tag`).
    pub tag: String,
    pub dockerfile: String,
    pub nocache: bool,
    pub forcerm: bool,
}

/// Everything needed to create an editor container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Port the server listens on inside the container.
    pub container_port: u16,
    /// Host port bound to `container_port`.
    pub host_port: u16,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub tty: bool,
    pub open_stdin: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

/// Async trait over the container runtime API.
#[async_trait::async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Query daemon information. Doubles as a connectivity probe.
    async fn info(&self) -> Result<EngineInfo>;

    /// List images; `all` includes intermediate layers.
    async fn list_images(&self, all: bool) -> Result<Vec<ImageEntry>>;

    /// Inspect an image by name (`repo:tag`) or id.
    async fn inspect_image(&self, name_or_id: &str) -> Result<ImageEntry>;

    /// Add `repo:tag` to an existing image.
    async fn tag_image(&self, id: &str, repo: &str, tag: &str) -> Result<()>;

    /// Build an image and return the concatenated build output.
    ///
    /// An error reported inside the build stream fails the call.
    async fn build_image(&self, request: &BuildRequest) -> Result<String>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock engine (for tests)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::error::EditorError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// A scriptable in-memory engine.
    ///
    /// Tracks call counts via atomics. Images added with `with_image` are
    /// visible immediately; images registered with `on_build` appear once a
    /// build runs, optionally hidden for a number of `list_images` calls to
    /// mimic a daemon that is slow to index a fresh image.
    pub struct MockEngine {
        pub info_count: AtomicUsize,
        pub list_count: AtomicUsize,
        pub inspect_count: AtomicUsize,
        pub tag_count: AtomicUsize,
        pub build_count: AtomicUsize,
        pub create_count: AtomicUsize,
        pub start_count: AtomicUsize,
        pub refuse_connection: AtomicBool,
        pub fail_build: AtomicBool,
        pub fail_create: AtomicBool,
        pub fail_start: AtomicBool,
        pub fail_tag: AtomicBool,
        /// Fail `list_images` while leaving `info` healthy.
        pub fail_list: AtomicBool,
        images: Mutex<Vec<ImageEntry>>,
        built_images: Mutex<Vec<ImageEntry>>,
        build_output: Mutex<String>,
        hide_after_build: AtomicUsize,
        hidden_lists: AtomicUsize,
        pending: Mutex<Vec<ImageEntry>>,
        /// Images only reachable through `inspect_image`, keyed by the
        /// reference they resolve from.
        inspect_only: Mutex<Vec<(String, ImageEntry)>>,
        /// References whose inspection fails even if the image is listed.
        uninspectable: Mutex<Vec<String>>,
        pub builds: Mutex<Vec<BuildRequest>>,
        pub created: Mutex<Vec<ContainerSpec>>,
        pub started: Mutex<Vec<String>>,
    }

    impl Default for MockEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self {
                info_count: AtomicUsize::new(0),
                list_count: AtomicUsize::new(0),
                inspect_count: AtomicUsize::new(0),
                tag_count: AtomicUsize::new(0),
                build_count: AtomicUsize::new(0),
                create_count: AtomicUsize::new(0),
                start_count: AtomicUsize::new(0),
                refuse_connection: AtomicBool::new(false),
                fail_build: AtomicBool::new(false),
                fail_create: AtomicBool::new(false),
                fail_start: AtomicBool::new(false),
                fail_tag: AtomicBool::new(false),
                fail_list: AtomicBool::new(false),
                images: Mutex::new(Vec::new()),
                built_images: Mutex::new(Vec::new()),
                build_output: Mutex::new(String::new()),
                hide_after_build: AtomicUsize::new(0),
                hidden_lists: AtomicUsize::new(0),
                pending: Mutex::new(Vec::new()),
                inspect_only: Mutex::new(Vec::new()),
                uninspectable: Mutex::new(Vec::new()),
                builds: Mutex::new(Vec::new()),
                created: Mutex::new(Vec::new()),
                started: Mutex::new(Vec::new()),
            }
        }

        /// A mock whose daemon refuses every connection.
        pub fn refusing() -> Self {
            let mock = Self::new();
            mock.refuse_connection.store(true, Ordering::Relaxed);
            mock
        }

        pub fn with_image(self, id: &str, tags: &[&str]) -> Self {
            self.images.lock().unwrap().push(image(id, tags));
            self
        }

        /// Images that appear after a build, and the output the build reports.
        pub fn on_build(self, output: &str, produced: Vec<ImageEntry>) -> Self {
            *self.build_output.lock().unwrap() = output.to_string();
            *self.built_images.lock().unwrap() = produced;
            self
        }

        /// Keep freshly built images out of the `n` listings that follow a
        /// build, and out of inspections until they are listed.
        pub fn hide_built_images_for(self, n: usize) -> Self {
            self.hide_after_build.store(n, Ordering::Relaxed);
            self
        }

        /// An image that listings miss but inspecting `reference` resolves.
        pub fn with_inspect_only_image(self, reference: &str, entry: ImageEntry) -> Self {
            self.inspect_only
                .lock()
                .unwrap()
                .push((reference.to_string(), entry));
            self
        }

        /// Make `inspect_image(reference)` fail with a 404.
        pub fn fail_inspect_of(self, reference: &str) -> Self {
            self.uninspectable.lock().unwrap().push(reference.to_string());
            self
        }

        pub fn images(&self) -> Vec<ImageEntry> {
            self.images.lock().unwrap().clone()
        }

        fn check_connection(&self) -> Result<()> {
            if self.refuse_connection.load(Ordering::Relaxed) {
                return Err(EditorError::Connection(
                    "connect ECONNREFUSED /var/run/docker.sock".into(),
                ));
            }
            Ok(())
        }

        fn find(&self, name_or_id: &str) -> Option<ImageEntry> {
            if self.uninspectable.lock().unwrap().iter().any(|r| r == name_or_id) {
                return None;
            }
            let listed = self
                .images
                .lock()
                .unwrap()
                .iter()
                .find(|img| img.id == name_or_id || img.has_tag(name_or_id))
                .cloned();
            listed.or_else(|| {
                self.inspect_only
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|(reference, img)| reference == name_or_id || img.id == name_or_id)
                    .map(|(_, img)| img.clone())
            })
        }
    }

    pub fn image(id: &str, tags: &[&str]) -> ImageEntry {
        ImageEntry {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            created: Some("2024-01-01T00:00:00.000Z".to_string()),
        }
    }

    #[async_trait::async_trait]
    impl ContainerEngine for MockEngine {
        async fn info(&self) -> Result<EngineInfo> {
            self.info_count.fetch_add(1, Ordering::Relaxed);
            self.check_connection()?;
            Ok(EngineInfo {
                server_version: Some("mock-27.0".into()),
            })
        }

        async fn list_images(&self, _all: bool) -> Result<Vec<ImageEntry>> {
            self.list_count.fetch_add(1, Ordering::Relaxed);
            self.check_connection()?;
            if self.fail_list.load(Ordering::Relaxed) {
                return Err(EditorError::Docker("Mock list failure".into()));
            }
            let hidden = self.hidden_lists.load(Ordering::Relaxed);
            if hidden > 0 {
                self.hidden_lists.store(hidden - 1, Ordering::Relaxed);
            } else {
                let pending: Vec<ImageEntry> = self.pending.lock().unwrap().drain(..).collect();
                self.images.lock().unwrap().extend(pending);
            }
            Ok(self.images())
        }

        async fn inspect_image(&self, name_or_id: &str) -> Result<ImageEntry> {
            self.inspect_count.fetch_add(1, Ordering::Relaxed);
            self.check_connection()?;
            self.find(name_or_id).ok_or_else(|| EditorError::DockerApi {
                status: 404,
                message: format!("No such image: {name_or_id}"),
            })
        }

        async fn tag_image(&self, id: &str, repo: &str, tag: &str) -> Result<()> {
            self.tag_count.fetch_add(1, Ordering::Relaxed);
            if self.fail_tag.load(Ordering::Relaxed) {
                return Err(EditorError::Docker("Mock tag failure".into()));
            }
            let name = format!("{repo}:{tag}");
            let add_tag = |entry: &mut ImageEntry| {
                if !entry.has_tag(&name) {
                    entry.repo_tags.push(name.clone());
                }
            };
            if let Some(entry) = self
                .images
                .lock()
                .unwrap()
                .iter_mut()
                .find(|img| img.id == id || img.has_tag(id))
            {
                add_tag(entry);
                return Ok(());
            }
            if let Some((_, entry)) = self
                .inspect_only
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(_, img)| img.id == id)
            {
                add_tag(entry);
                return Ok(());
            }
            Err(EditorError::DockerApi {
                status: 404,
                message: format!("No such image: {id}"),
            })
        }

        async fn build_image(&self, request: &BuildRequest) -> Result<String> {
            self.build_count.fetch_add(1, Ordering::Relaxed);
            self.check_connection()?;
            self.builds.lock().unwrap().push(request.clone());
            if self.fail_build.load(Ordering::Relaxed) {
                return Err(EditorError::Build(
                    "The command '/bin/sh -c npm install' returned a non-zero code: 1".into(),
                ));
            }
            let produced = self.built_images.lock().unwrap().clone();
            let hide = self.hide_after_build.load(Ordering::Relaxed);
            if hide > 0 {
                self.hidden_lists.store(hide, Ordering::Relaxed);
                self.pending.lock().unwrap().extend(produced);
            } else {
                self.images.lock().unwrap().extend(produced);
            }
            Ok(self.build_output.lock().unwrap().clone())
        }

        async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
            let n = self.create_count.fetch_add(1, Ordering::Relaxed);
            self.check_connection()?;
            if self.fail_create.load(Ordering::Relaxed) {
                return Err(EditorError::DockerApi {
                    status: 500,
                    message: "Mock create failure".into(),
                });
            }
            self.created.lock().unwrap().push(spec.clone());
            Ok(format!("mock-container-{n}"))
        }

        async fn start_container(&self, id: &str) -> Result<()> {
            self.start_count.fetch_add(1, Ordering::Relaxed);
            if self.fail_start.load(Ordering::Relaxed) {
                return Err(EditorError::DockerApi {
                    status: 500,
                    message: format!(
                        "driver failed programming external connectivity on endpoint {id}: \
                         port is already allocated"
                    ),
                });
            }
            self.started.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }
}
