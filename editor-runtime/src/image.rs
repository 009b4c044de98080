//! Template image verification with rebuild and retry.
//!
//! `ensure_image_exists` first looks for `code-server-{template}:latest`
//! locally. When it is missing the template is rebuilt from its build context
//! and verification is retried a bounded number of times, using the image id
//! recovered from the build log when the tag has not landed yet.

use tracing::{debug, error, info, warn};

use crate::engine::{BuildRequest, ContainerEngine, ImageEntry};
use crate::error::{EditorError, Result};
use crate::runtime::EditorRuntimeConfig;
use crate::templates::{IMAGE_TAG, image_name, image_repo};

const BUILT_IMAGE_MARKER: &str = "writing image sha256:";

/// Milestones of `ensure_image_exists` reported to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageEvent {
    /// The image is missing locally and a build is starting.
    Rebuilding,
    /// A post-build verification attempt is starting.
    Verifying { attempt: u32, of: u32 },
}

/// Recover the image id from build output.
///
/// Returns `sha256:<hex>` for the first `writing image sha256:` marker that
/// is followed by at least one lowercase hex digit.
pub fn parse_built_image_id(output: &str) -> Option<String> {
    let mut rest = output;
    while let Some(idx) = rest.find(BUILT_IMAGE_MARKER) {
        let after = &rest[idx + BUILT_IMAGE_MARKER.len()..];
        let digest: String = after
            .chars()
            .take_while(|c| c.is_ascii_digit() || ('a'..='f').contains(c))
            .collect();
        if !digest.is_empty() {
            return Some(format!("sha256:{digest}"));
        }
        rest = after;
    }
    None
}

/// Check that the image for `template` exists, tagging it if it was found by id.
///
/// Never fails: every error is logged and reported as "not verified".
pub async fn verify_image(engine: &dyn ContainerEngine, template: &str, build_output: &str) -> bool {
    match try_verify_image(engine, template, build_output).await {
        Ok(found) => found,
        Err(err) => {
            error!(template, "Image verification error: {err}");
            false
        }
    }
}

async fn try_verify_image(
    engine: &dyn ContainerEngine,
    template: &str,
    build_output: &str,
) -> Result<bool> {
    let name = image_name(template);
    debug!("Attempting to verify image: {name}");

    let all_images = engine.list_images(true).await?;
    for img in &all_images {
        debug!(
            id = %img.id,
            tags = ?img.repo_tags,
            created = img.created.as_deref().unwrap_or("unknown"),
            "local image"
        );
    }

    let mut found: Option<ImageEntry> = all_images.iter().find(|img| img.has_tag(&name)).cloned();

    if found.is_none() && !build_output.is_empty() {
        if let Some(built_id) = parse_built_image_id(build_output) {
            info!("Looking for image with ID from build output: {built_id}");
            match engine.inspect_image(&built_id).await {
                Ok(inspected) => {
                    info!(
                        id = %inspected.id,
                        tags = ?inspected.repo_tags,
                        "Found image by direct ID inspection"
                    );
                    found = Some(inspected);
                }
                Err(err) => {
                    info!("Direct inspection failed: {err}");
                    found = all_images.iter().find(|img| img.id == built_id).cloned();
                }
            }
        }
    }

    let found = match found {
        Some(img) => img,
        None => match engine.inspect_image(&name).await {
            Ok(inspected) => {
                info!(
                    id = %inspected.id,
                    tags = ?inspected.repo_tags,
                    "Found image by direct name inspection"
                );
                inspected
            }
            Err(err) => {
                info!("Direct name inspection failed: {err}");
                info!("Image {name} not found in {} images", all_images.len());
                return Ok(false);
            }
        },
    };

    if !found.has_tag(&name) {
        info!("Image found but missing tag {name}, attempting to tag it...");
        match engine
            .tag_image(&found.id, &image_repo(template), IMAGE_TAG)
            .await
        {
            Ok(()) => match engine.inspect_image(&found.id).await {
                Ok(tagged) => info!(
                    id = %tagged.id,
                    tags = ?tagged.repo_tags,
                    "Tagged image verification"
                ),
                Err(err) => warn!("Tagged image could not be re-inspected: {err}"),
            },
            Err(err) => error!("Error tagging image: {err}"),
        }
    }

    Ok(true)
}

/// Make sure `code-server-{template}:latest` is usable, rebuilding it if needed.
pub async fn ensure_image_exists(
    engine: &dyn ContainerEngine,
    config: &EditorRuntimeConfig,
    template: &str,
    on_event: &(dyn Fn(ImageEvent) + Send + Sync),
) -> Result<()> {
    let name = image_name(template);

    if verify_image(engine, template, "").await {
        info!("Image {name} found and verified locally");
        return Ok(());
    }

    info!("Image {name} not found locally, forcing rebuild...");
    on_event(ImageEvent::Rebuilding);
    let mut build_output = String::new();
    match rebuild_and_verify(engine, config, template, &mut build_output, on_event).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(
                template,
                stdout = %build_output,
                "Failed to build image: {err}"
            );
            Err(err.context(format!("Failed to build {template} template")))
        }
    }
}

async fn rebuild_and_verify(
    engine: &dyn ContainerEngine,
    config: &EditorRuntimeConfig,
    template: &str,
    build_output: &mut String,
    on_event: &(dyn Fn(ImageEvent) + Send + Sync),
) -> Result<()> {
    let name = image_name(template);
    let template_dir = config.template_dir(template);
    info!(
        templates_dir = %config.templates_dir.display(),
        template_dir = %template_dir.display(),
        "Building with paths"
    );

    let metadata = tokio::fs::metadata(&template_dir).await.map_err(|err| {
        EditorError::Build(format!(
            "Template directory {} is not accessible: {err}",
            template_dir.display()
        ))
    })?;
    if !metadata.is_dir() {
        return Err(EditorError::Build(format!(
            "Template path {} is not a directory",
            template_dir.display()
        )));
    }
    log_template_contents(&template_dir).await;

    info!("Building image {name} from {}...", template_dir.display());
    let request = BuildRequest {
        context_dir: template_dir,
        files: vec!["Dockerfile".to_string(), "template/".to_string()],
        tag: name.clone(),
        dockerfile: "Dockerfile".to_string(),
        nocache: true,
        forcerm: true,
    };
    *build_output = engine.build_image(&request).await?;
    debug!("Build completed. Full logs: {build_output}");

    let retries = config.verify_retries;
    for attempt in 1..=retries {
        info!("Verifying image build (attempt {attempt}/{retries})...");
        on_event(ImageEvent::Verifying {
            attempt,
            of: retries,
        });
        if verify_image(engine, template, build_output).await {
            info!("Image {name} successfully verified");
            return Ok(());
        }
        tokio::time::sleep(config.verify_retry_delay).await;
    }

    Err(EditorError::Build(format!(
        "Image verification failed after {retries} attempts"
    )))
}

/// Log and return the sorted entry names of `dir`. Unreadable entries end the
/// listing early with a warning.
async fn log_template_contents(dir: &std::path::Path) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Could not list template directory {}: {err}", dir.display());
            return Vec::new();
        }
    };
    let mut names = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
            Ok(None) => break,
            Err(err) => {
                warn!("Could not read entry of template directory {}: {err}", dir.display());
                break;
            }
        }
    }
    names.sort();
    info!(dir = %dir.display(), contents = ?names, "Template directory contents");
    names
}
