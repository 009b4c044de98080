use docktopus::DockerBuilder;
use docktopus::bollard::Docker;
use docktopus::bollard::container::{
    Config as BollardConfig, CreateContainerOptions, StartContainerOptions,
};
use docktopus::bollard::image::{BuildImageOptions, ListImagesOptions, TagImageOptions};
use docktopus::bollard::models::{HostConfig, PortBinding, PortMap};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{BuildRequest, ContainerEngine, ContainerSpec, EngineInfo, ImageEntry};
use crate::error::{EditorError, Result, looks_like_refused};
use crate::util::iso_from_unix;

/// `ContainerEngine` backed by the Docker daemon.
///
/// The daemon is contacted on first use, not at construction, so a server can
/// come up while Docker is down. A failed connect is retried on the next call.
pub struct DockerEngine {
    docker_host: Option<String>,
    builder: OnceCell<DockerBuilder>,
}

impl DockerEngine {
    /// Engine for `docker_host`, or for the local socket when `None`.
    pub fn new(docker_host: Option<String>) -> Self {
        Self {
            docker_host,
            builder: OnceCell::new(),
        }
    }

    async fn builder(&self) -> Result<&DockerBuilder> {
        self.builder
            .get_or_try_init(|| async {
                let builder = match self.docker_host.as_deref() {
                    Some(host) => DockerBuilder::with_address(host).await.map_err(|err| {
                        connect_error(format!("Failed to connect to docker at {host}: {err}"))
                    })?,
                    None => DockerBuilder::new().await.map_err(|err| {
                        connect_error(format!("Failed to connect to docker: {err}"))
                    })?,
                };
                Ok(builder)
            })
            .await
    }

    async fn client(&self) -> Result<Arc<Docker>> {
        Ok(self.builder().await?.client())
    }
}

fn connect_error(message: String) -> EditorError {
    if looks_like_refused(&message) {
        EditorError::Connection(message)
    } else {
        EditorError::Docker(message)
    }
}

/// Tar the given entries of `dir` into an in-memory build context.
pub fn pack_build_context(dir: &Path, entries: &[String]) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    for entry in entries {
        let name = entry.trim_end_matches('/');
        let path = dir.join(name);
        if path.is_dir() {
            archive.append_dir_all(name, &path)?;
        } else if path.is_file() {
            archive.append_path_with_name(&path, name)?;
        } else {
            return Err(EditorError::Build(format!(
                "Build context entry {} does not exist",
                path.display()
            )));
        }
    }
    Ok(archive.into_inner()?)
}

#[async_trait::async_trait]
impl ContainerEngine for DockerEngine {
    async fn info(&self) -> Result<EngineInfo> {
        let info = self.client().await?.info().await?;
        Ok(EngineInfo {
            server_version: info.server_version,
        })
    }

    async fn list_images(&self, all: bool) -> Result<Vec<ImageEntry>> {
        let images = self
            .client()
            .await?
            .list_images(Some(ListImagesOptions::<String> {
                all,
                ..Default::default()
            }))
            .await?;
        Ok(images
            .into_iter()
            .map(|img| ImageEntry {
                id: img.id,
                repo_tags: img.repo_tags,
                created: Some(iso_from_unix(img.created)),
            })
            .collect())
    }

    async fn inspect_image(&self, name_or_id: &str) -> Result<ImageEntry> {
        let inspect = self.client().await?.inspect_image(name_or_id).await?;
        Ok(ImageEntry {
            id: inspect.id.unwrap_or_else(|| name_or_id.to_string()),
            repo_tags: inspect.repo_tags.unwrap_or_default(),
            created: inspect.created,
        })
    }

    async fn tag_image(&self, id: &str, repo: &str, tag: &str) -> Result<()> {
        self.client()
            .await?
            .tag_image(
                id,
                Some(TagImageOptions {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<String> {
        let dir = request.context_dir.clone();
        let files = request.files.clone();
        let context = tokio::task::spawn_blocking(move || pack_build_context(&dir, &files))
            .await
            .map_err(|err| EditorError::Build(format!("Build context task failed: {err}")))??;
        debug!(bytes = context.len(), "packed build context");

        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            nocache: request.nocache,
            forcerm: request.forcerm,
            ..Default::default()
        };

        let client = self.client().await?;
        let mut stream = Box::pin(client.build_image(options, None, Some(context.into())));
        let mut logs = String::new();
        while let Some(event) = stream.next().await {
            let event = event?;
            if let Some(line) = event.stream {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    info!(image = %request.tag, "Build progress: {trimmed}");
                }
                logs.push_str(&line);
            }
            if let Some(err) = event.error {
                return Err(EditorError::Build(err));
            }
        }
        Ok(logs)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let port_key = format!("{}/tcp", spec.container_port);

        let mut port_bindings = PortMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let config = BollardConfig {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            env: Some(spec.env.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.open_stdin),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..Default::default()
        };

        let response = self
            .client()
            .await?
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        for warning in &response.warnings {
            info!(container = %response.id, "create warning: {warning}");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.client()
            .await?
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }
}
