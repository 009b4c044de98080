//! Editor launch flow.
//!
//! `start_editor` runs: connection check → port allocation → template lookup
//! → image verification/rebuild → container create + start → warm-up delay
//! → registry insert, and hands back the editor URL.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{EditorError, Result};
use crate::image::{ImageEvent, ensure_image_exists};
use crate::launch_progress::{LaunchPhase, LaunchTracker};
use crate::registry::{ActiveContainer, ContainerListing, ContainerRegistry};
use crate::runtime::EditorRuntimeConfig;
use crate::templates::{self, TemplateConfig, image_name};

/// Environment handed to code-server: no auth, no telemetry, no update checks.
const CODE_SERVER_ENV: &[&str] = &[
    "CS_DISABLE_AUTH=true",
    "CS_AUTH=none",
    "PASSWORD=",
    "DOCKER_USER=coder",
    "CS_DISABLE_GETTING_STARTED_OVERRIDE=1",
    "CS_DISABLE_TELEMETRY=true",
    "CS_DISABLE_UPDATE_CHECK=true",
];

const CONNECTION_HINTS: &str = "Cannot connect to Docker. Please ensure Docker is running and \
you have proper permissions. Try:\n\
1. Start Docker: sudo systemctl start docker\n\
2. Add user to docker group: sudo usermod -aG docker $USER\n\
3. Set permissions: sudo chmod 666 /var/run/docker.sock";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StartEditorResponse {
    pub url: String,
}

/// Probe the daemon: fetch its info, then list images to confirm API access.
pub async fn check_docker_connection(engine: &dyn ContainerEngine) -> Result<()> {
    let probe = async {
        let info = engine.info().await?;
        info!(
            "Docker connection successful. Server version: {}",
            info.server_version.as_deref().unwrap_or("unknown")
        );
        let images = engine.list_images(false).await?;
        info!("Successfully listed images. Count: {}", images.len());
        Ok::<(), EditorError>(())
    };

    match probe.await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Docker connection error: {err}");
            if err.is_connection_refused() {
                Err(EditorError::Connection(CONNECTION_HINTS.to_string()))
            } else {
                Err(err)
            }
        }
    }
}

/// Pick a host port in `[port_base, port_base + port_span)`. Collisions are not checked.
pub fn allocate_port(config: &EditorRuntimeConfig) -> u16 {
    let span = config.port_span.max(1);
    let offset = rand::thread_rng().gen_range(0..span);
    config.port_base.saturating_add(offset)
}

/// Container definition for an editor of `template` published on `host_port`.
pub fn editor_container_spec(
    config: &EditorRuntimeConfig,
    template: &TemplateConfig,
    host_port: u16,
) -> ContainerSpec {
    ContainerSpec {
        image: image_name(template.name),
        container_port: config.container_port,
        host_port,
        env: CODE_SERVER_ENV.iter().map(|v| v.to_string()).collect(),
        cmd: vec![
            "--auth=none".to_string(),
            format!("--bind-addr=0.0.0.0:{}", config.container_port),
            ".".to_string(),
        ],
        working_dir: template.work_dir.to_string(),
        tty: true,
        open_stdin: true,
        attach_stdin: true,
        attach_stdout: true,
        attach_stderr: true,
    }
}

/// Launches editors and remembers what it launched.
pub struct EditorLauncher {
    engine: Arc<dyn ContainerEngine>,
    config: EditorRuntimeConfig,
    registry: ContainerRegistry,
    launches: LaunchTracker,
}

impl EditorLauncher {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: EditorRuntimeConfig) -> Self {
        Self {
            engine,
            config,
            registry: ContainerRegistry::new(),
            launches: LaunchTracker::new(),
        }
    }

    pub fn config(&self) -> &EditorRuntimeConfig {
        &self.config
    }

    pub fn launches(&self) -> &LaunchTracker {
        &self.launches
    }

    /// Start an editor for `template` and return its URL.
    pub async fn start_editor(&self, template: &str) -> Result<StartEditorResponse> {
        info!("Starting template: {template}");
        self.launches.gc(self.config.launch_retention.as_secs());
        let launch = self.launches.start(template);

        match self.launch(template, launch.launch_id).await {
            Ok(response) => Ok(response),
            Err(err) => {
                error!(template, launch_id = %launch.launch_id, "Error starting editor: {err}");
                self.launches.update(
                    launch.launch_id,
                    LaunchPhase::Failed,
                    Some(err.to_string()),
                    None,
                );
                Err(err.context(format!("Failed to start {template} editor")))
            }
        }
    }

    async fn launch(&self, template: &str, launch_id: Uuid) -> Result<StartEditorResponse> {
        let progress = |phase: LaunchPhase, message: String| {
            self.launches.update(launch_id, phase, Some(message), None);
        };

        progress(LaunchPhase::Connecting, "Checking Docker connection".into());
        check_docker_connection(self.engine.as_ref()).await?;

        let port = allocate_port(&self.config);
        let name = image_name(template);
        let template_config = templates::lookup(template)
            .ok_or_else(|| EditorError::Validation(format!("Invalid template: {template}")))?;

        progress(LaunchPhase::ImageCheck, format!("Verifying image {name}"));
        let on_image_event = |event: ImageEvent| match event {
            ImageEvent::Rebuilding => {
                progress(LaunchPhase::ImageBuild, format!("Building image {name}"))
            }
            ImageEvent::Verifying { attempt, of } => progress(
                LaunchPhase::ImageBuild,
                format!("Verifying image build (attempt {attempt}/{of})"),
            ),
        };
        ensure_image_exists(self.engine.as_ref(), &self.config, template, &on_image_event).await?;

        progress(LaunchPhase::ContainerCreate, format!("Creating container on port {port}"));
        let spec = editor_container_spec(&self.config, template_config, port);
        let container_id = self.engine.create_container(&spec).await?;
        info!(container = %container_id, port, "Container created");

        self.launches.update(
            launch_id,
            LaunchPhase::ContainerStart,
            Some("Starting container".into()),
            Some(container_id.clone()),
        );
        self.engine.start_container(&container_id).await?;
        info!(container = %container_id, "Container started");

        progress(LaunchPhase::Warmup, "Waiting for editor to come up".into());
        tokio::time::sleep(self.config.startup_delay).await;

        self.registry.insert(ActiveContainer {
            template: template.to_string(),
            port,
            start_time: Utc::now(),
            container_id: container_id.clone(),
            work_dir: template_config.work_dir.to_string(),
        });

        let url = self.config.editor_url(port, template_config.work_dir);
        info!(container = %container_id, "Editor URL: {url}");
        progress(LaunchPhase::Ready, url.clone());
        Ok(StartEditorResponse { url })
    }

    /// Every container this process has started.
    pub fn list_containers(&self) -> Vec<ContainerListing> {
        self.registry.list()
    }
}
