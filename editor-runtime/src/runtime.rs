use once_cell::sync::OnceCell;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    DEFAULT_API_PORT, DEFAULT_CONTAINER_PORT, DEFAULT_LAUNCH_RETENTION_SECS, DEFAULT_PORT_BASE,
    DEFAULT_PORT_SPAN, DEFAULT_STARTUP_DELAY_MS, DEFAULT_VERIFY_RETRIES,
    DEFAULT_VERIFY_RETRY_DELAY_MS,
};

/// Runtime configuration loaded once at startup from environment variables.
#[derive(Clone, Debug)]
pub struct EditorRuntimeConfig {
    /// Port the HTTP API listens on.
    pub api_port: u16,
    pub docker_host: Option<String>,
    /// Host name placed in editor URLs handed back to callers.
    pub public_host: String,
    /// Directory holding one build context per template.
    pub templates_dir: PathBuf,
    /// Directory of the browser client served as static files.
    pub static_dir: PathBuf,
    pub port_base: u16,
    pub port_span: u16,
    /// Port code-server listens on inside the container.
    pub container_port: u16,
    pub startup_delay: Duration,
    pub verify_retries: u32,
    pub verify_retry_delay: Duration,
    pub launch_retention: Duration,
}

static RUNTIME_CONFIG: OnceCell<EditorRuntimeConfig> = OnceCell::new();

impl Default for EditorRuntimeConfig {
    fn default() -> Self {
        Self {
            api_port: DEFAULT_API_PORT,
            docker_host: None,
            public_host: "localhost".to_string(),
            templates_dir: PathBuf::from("docker/templates"),
            static_dir: PathBuf::from("client/public"),
            port_base: DEFAULT_PORT_BASE,
            port_span: DEFAULT_PORT_SPAN,
            container_port: DEFAULT_CONTAINER_PORT,
            startup_delay: Duration::from_millis(DEFAULT_STARTUP_DELAY_MS),
            verify_retries: DEFAULT_VERIFY_RETRIES,
            verify_retry_delay: Duration::from_millis(DEFAULT_VERIFY_RETRY_DELAY_MS),
            launch_retention: Duration::from_secs(DEFAULT_LAUNCH_RETENTION_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl EditorRuntimeConfig {
    /// Load configuration from environment variables.
    /// Cached after the first call — subsequent calls return the same config.
    pub fn load() -> &'static EditorRuntimeConfig {
        RUNTIME_CONFIG.get_or_init(Self::from_env)
    }

    /// Read the environment without touching the cache.
    pub fn from_env() -> EditorRuntimeConfig {
        let defaults = EditorRuntimeConfig::default();

        let api_port = env_parse::<u16>("PORT").unwrap_or(defaults.api_port);
        let docker_host = env::var("DOCKER_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let public_host = env::var("EDITOR_PUBLIC_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.public_host);
        let templates_dir = env::var("EDITOR_TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.templates_dir);
        let static_dir = env::var("EDITOR_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);
        let port_base = env_parse::<u16>("EDITOR_PORT_BASE").unwrap_or(defaults.port_base);
        // A zero span would leave no ports to choose from.
        let port_span = env_parse::<u16>("EDITOR_PORT_SPAN")
            .filter(|span| *span > 0)
            .unwrap_or(defaults.port_span);
        let container_port =
            env_parse::<u16>("EDITOR_CONTAINER_PORT").unwrap_or(defaults.container_port);
        let startup_delay = env_parse::<u64>("EDITOR_STARTUP_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.startup_delay);
        let verify_retries = env_parse::<u32>("EDITOR_VERIFY_RETRIES")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.verify_retries);
        let verify_retry_delay = env_parse::<u64>("EDITOR_VERIFY_RETRY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.verify_retry_delay);
        let launch_retention = env_parse::<u64>("EDITOR_LAUNCH_RETENTION_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.launch_retention);

        EditorRuntimeConfig {
            api_port,
            docker_host,
            public_host,
            templates_dir,
            static_dir,
            port_base,
            port_span,
            container_port,
            startup_delay,
            verify_retries,
            verify_retry_delay,
            launch_retention,
        }
    }

    /// Build context directory for a template.
    pub fn template_dir(&self, template: &str) -> PathBuf {
        self.templates_dir.join(template)
    }

    /// Public URL of an editor listening on `port`, opened on `work_dir`.
    pub fn editor_url(&self, port: u16, work_dir: &str) -> String {
        format!(
            "http://{}:{port}/?folder={work_dir}&autostart=1",
            self.public_host
        )
    }
}
