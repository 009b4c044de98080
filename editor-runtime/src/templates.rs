//! Static table of editor templates.
//!
//! Each template maps to a `code-server-{name}:latest` image built from
//! `{templates_dir}/{name}` and a project folder the editor opens on start.

use serde::Serialize;

/// Tag applied to every template image.
pub const IMAGE_TAG: &str = "latest";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    pub name: &'static str,
    /// Project folder created inside the image.
    pub folder_name: &'static str,
    /// Working directory of the container and folder opened by the editor.
    pub work_dir: &'static str,
}

static TEMPLATES: &[TemplateConfig] = &[
    TemplateConfig {
        name: "react",
        folder_name: "my-react-app",
        work_dir: "/home/coder/project/my-react-app",
    },
    TemplateConfig {
        name: "node",
        folder_name: "node-app",
        work_dir: "/home/coder/project/node-app",
    },
    TemplateConfig {
        name: "python",
        folder_name: "python-app",
        work_dir: "/home/coder/project/python-app",
    },
    TemplateConfig {
        name: "vue",
        folder_name: "vue-app",
        work_dir: "/home/coder/project/vue-app",
    },
];

/// Find a template by exact name.
pub fn lookup(name: &str) -> Option<&'static TemplateConfig> {
    TEMPLATES.iter().find(|t| t.name == name)
}

pub fn all() -> impl Iterator<Item = &'static TemplateConfig> {
    TEMPLATES.iter()
}

/// Image repository for a template, without tag.
pub fn image_repo(template: &str) -> String {
    format!("code-server-{template}")
}

/// Fully tagged image reference for a template.
pub fn image_name(template: &str) -> String {
    format!("{}:{IMAGE_TAG}", image_repo(template))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_templates() {
        let react = lookup("react").unwrap();
        assert_eq!(react.folder_name, "my-react-app");
        assert_eq!(react.work_dir, "/home/coder/project/my-react-app");
        assert_eq!(lookup("vue").unwrap().work_dir, "/home/coder/project/vue-app");
        assert_eq!(all().count(), 4);
    }

    #[test]
    fn lookup_is_exact() {
        assert!(lookup("").is_none());
        assert!(lookup("React").is_none());
        assert!(lookup("rust").is_none());
        assert!(lookup(" node").is_none());
    }

    #[test]
    fn image_names() {
        assert_eq!(image_repo("python"), "code-server-python");
        assert_eq!(image_name("python"), "code-server-python:latest");
    }
}
