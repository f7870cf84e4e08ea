//! Setup and start commands inferred from snapshot files

use serde_json::Value;

use crate::db::{FileEntry, FileMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectCommands {
    pub setup: Option<String>,
    pub start: Option<String>,
}

impl ProjectCommands {
    pub fn is_empty(&self) -> bool {
        self.setup.is_none() && self.start.is_none()
    }
}

const START_SCRIPTS: &[&str] = &["dev", "start", "preview"];

/// Text content of `<workdir>/<name>`
fn text_file<'a>(files: &'a FileMap, workdir: &str, name: &str) -> Option<&'a str> {
    let path = format!("{}/{}", workdir.trim_end_matches('/'), name);
    match files.get(&path)? {
        FileEntry::File {
            content,
            is_binary: false,
        } => Some(content.as_str()),
        _ => None,
    }
}

/// Inspect the project root for something we know how to run
pub fn detect(files: &FileMap, workdir: &str) -> ProjectCommands {
    if let Some(package_json) = text_file(files, workdir, "package.json") {
        let scripts = serde_json::from_str::<Value>(package_json)
            .ok()
            .and_then(|v| v.get("scripts").cloned());

        let start = scripts.as_ref().and_then(|scripts| {
            START_SCRIPTS
                .iter()
                .find(|name| scripts.get(**name).is_some())
                .map(|name| format!("npm run {}", name))
        });

        return ProjectCommands {
            setup: Some("npm install".to_string()),
            start,
        };
    }

    if text_file(files, workdir, "index.html").is_some() {
        return ProjectCommands {
            setup: None,
            start: Some("npx --yes serve".to_string()),
        };
    }

    ProjectCommands::default()
}

/// Render commands as an artifact block the assistant runtime can replay
pub fn to_actions(commands: &ProjectCommands) -> String {
    if commands.is_empty() {
        return String::new();
    }

    let mut out = String::from("<boltArtifact id=\"project-setup\" title=\"Project Setup\">\n");
    if let Some(setup) = &commands.setup {
        out.push_str(&format!("<boltAction type=\"shell\">{}</boltAction>\n", setup));
    }
    if let Some(start) = &commands.start {
        out.push_str(&format!("<boltAction type=\"start\">{}</boltAction>\n", start));
    }
    out.push_str("</boltArtifact>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKDIR: &str = "/home/project";

    #[test]
    fn package_json_prefers_dev_script() {
        let mut files = FileMap::new();
        files.insert(
            "/home/project/package.json".to_string(),
            FileEntry::text(r#"{"scripts":{"start":"node x","dev":"vite"}}"#),
        );

        let commands = detect(&files, WORKDIR);
        assert_eq!(commands.setup.as_deref(), Some("npm install"));
        assert_eq!(commands.start.as_deref(), Some("npm run dev"));

        let actions = to_actions(&commands);
        assert!(actions.contains("<boltAction type=\"shell\">npm install</boltAction>"));
        assert!(actions.contains("<boltAction type=\"start\">npm run dev</boltAction>"));
    }

    #[test]
    fn static_site_gets_server() {
        let mut files = FileMap::new();
        files.insert("/home/project/index.html".to_string(), FileEntry::text("<html/>"));

        assert_eq!(detect(&files, WORKDIR).start.as_deref(), Some("npx --yes serve"));
    }

    #[test]
    fn nothing_detected() {
        let mut files = FileMap::new();
        files.insert("/home/project/src".to_string(), FileEntry::Folder);

        let commands = detect(&files, WORKDIR);
        assert!(commands.is_empty());
        assert_eq!(to_actions(&commands), "");
    }

    #[test]
    fn follows_the_workdir() {
        let mut files = FileMap::new();
        files.insert(
            "/srv/app/package.json".to_string(),
            FileEntry::text(r#"{"scripts":{"start":"node server.js"}}"#),
        );
        files.insert(
            "/srv/app/packages/ui/index.html".to_string(),
            FileEntry::text("<html/>"),
        );

        let commands = detect(&files, "/srv/app/");
        assert_eq!(commands.setup.as_deref(), Some("npm install"));
        assert_eq!(commands.start.as_deref(), Some("npm run start"));

        assert!(detect(&files, "/home/project").is_empty());
    }

    #[test]
    fn nested_manifest_is_not_the_root() {
        let mut files = FileMap::new();
        files.insert(
            "/home/project/web/package.json".to_string(),
            FileEntry::text(r#"{"scripts":{"dev":"vite"}}"#),
        );

        assert!(detect(&files, WORKDIR).is_empty());
    }
}
