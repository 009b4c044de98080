use std::fmt;

use serde_json::Value;

/// Errors returned by editor runtime operations.
#[derive(Debug)]
pub enum EditorError {
    /// Docker/container runtime failure.
    Docker(String),
    /// The Docker daemon answered with an error status and body.
    DockerApi { status: u16, message: String },
    /// The Docker daemon could not be reached at all.
    Connection(String),
    /// Invalid input or configuration.
    Validation(String),
    /// Image build failure.
    Build(String),
    /// Local filesystem or socket failure.
    Io(String),
    /// Wraps a failure with the operation that was running, keeping the cause
    /// reachable for error bodies.
    Context { message: String, source: Box<EditorError> },
}

impl EditorError {
    /// Prefix an error with what was being attempted.
    pub fn context(self, message: impl Into<String>) -> Self {
        EditorError::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// The JSON body the Docker daemon sent back, if this error carries one.
    pub fn docker_json(&self) -> Option<Value> {
        match self {
            EditorError::DockerApi { status, message } => Some(serde_json::json!({
                "statusCode": status,
                "message": message,
            })),
            EditorError::Context { source, .. } => source.docker_json(),
            _ => None,
        }
    }

    /// Whether the root cause is an unreachable daemon.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            EditorError::Connection(_) => true,
            EditorError::Context { source, .. } => source.is_connection_refused(),
            _ => false,
        }
    }
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorError::Docker(msg) => write!(f, "docker error: {msg}"),
            EditorError::DockerApi { status, message } => {
                write!(f, "docker responded with status code {status}: {message}")
            }
            EditorError::Connection(msg) => write!(f, "{msg}"),
            EditorError::Validation(msg) => write!(f, "{msg}"),
            EditorError::Build(msg) => write!(f, "{msg}"),
            EditorError::Io(msg) => write!(f, "io error: {msg}"),
            EditorError::Context { message, source } => write!(f, "{message}: {source}"),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditorError::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(err: std::io::Error) -> Self {
        EditorError::Io(err.to_string())
    }
}

/// Classify a bollard error: refused sockets, daemon error responses, and the rest.
impl From<docktopus::bollard::errors::Error> for EditorError {
    fn from(err: docktopus::bollard::errors::Error) -> Self {
        use docktopus::bollard::errors::Error as BollardError;
        match err {
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => EditorError::DockerApi {
                status: status_code,
                message,
            },
            other => {
                if is_refused(&other) {
                    EditorError::Connection(error_chain(&other))
                } else {
                    EditorError::Docker(error_chain(&other))
                }
            }
        }
    }
}

/// Render an error and all of its sources as one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

fn is_refused(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(cause) = current {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound
            ) {
                return true;
            }
        }
        current = cause.source();
    }
    looks_like_refused(&error_chain(err))
}

pub(crate) fn looks_like_refused(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("connection refused")
        || lower.contains("no such file or directory")
        || lower.contains("socket not found")
        || lower.contains("econnrefused")
}

pub type Result<T> = std::result::Result<T, EditorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_docker_body() {
        let err = EditorError::DockerApi {
            status: 404,
            message: "No such image: code-server-vue:latest".into(),
        }
        .context("Failed to start vue editor");

        assert_eq!(
            err.to_string(),
            "Failed to start vue editor: docker responded with status code 404: \
             No such image: code-server-vue:latest"
        );
        let json = err.docker_json().unwrap();
        assert_eq!(json["statusCode"], 404);
    }

    #[test]
    fn refused_detection_walks_context() {
        let err = EditorError::Connection("connect ECONNREFUSED".into()).context("outer");
        assert!(err.is_connection_refused());
        assert!(!EditorError::Docker("boom".into()).is_connection_refused());
    }

    #[test]
    fn missing_socket_counts_as_refused() {
        assert!(looks_like_refused(
            "Failed to connect to docker at unix:///tmp/gone.sock: Socket not found: /tmp/gone.sock"
        ));
        assert!(!looks_like_refused("pull access denied for code-server-node"));
    }
}
