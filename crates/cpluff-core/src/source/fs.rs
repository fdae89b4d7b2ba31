//! The default local-filesystem plug-in source: scans a registered list of
//! directories, loading a descriptor file from each immediate subdirectory.

use super::PluginSource;
use crate::descriptor::loader::load_descriptor;
use crate::descriptor::xml::QuickXmlEventSource;
use crate::descriptor::Descriptor;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

pub struct LocalFilesystemSource {
    directories: Vec<PathBuf>,
    descriptor_filename: String,
}

impl LocalFilesystemSource {
    pub fn new(descriptor_filename: impl Into<String>) -> Self {
        Self {
            directories: Vec::new(),
            descriptor_filename: descriptor_filename.into(),
        }
    }

    pub fn add_directory(&mut self, dir: impl Into<PathBuf>) {
        self.directories.push(dir.into());
    }
}

impl PluginSource for LocalFilesystemSource {
    fn scan(&mut self) -> Vec<Descriptor> {
        let mut found = Vec::new();
        let mut seen_ids = std::collections::HashSet::new();

        for dir in &self.directories {
            let entries = match std::fs::read_dir(dir) {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(target: "cpluff_core::source", directory = %dir.display(), error = %err, "failed to read plug-in directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let candidate_dir = entry.path();
                if !candidate_dir.is_dir() {
                    continue;
                }
                let descriptor_path = candidate_dir.join(&self.descriptor_filename);
                let file = match File::open(&descriptor_path) {
                    Ok(f) => f,
                    Err(_) => continue,
                };

                let mut source = QuickXmlEventSource::new(BufReader::new(file));
                match load_descriptor(&mut source, Some(candidate_dir.clone())) {
                    Ok(descriptor) => {
                        if seen_ids.insert(descriptor.id.clone()) {
                            found.push(descriptor);
                        } else {
                            tracing::warn!(target: "cpluff_core::source", id = %descriptor.id, "duplicate identifier within one scan; ignoring later candidate");
                        }
                    }
                    Err(err) => {
                        tracing::error!(target: "cpluff_core::source", directory = %candidate_dir.display(), error = %err, "skipping plug-in with unloadable descriptor");
                    }
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_plugin(dir: &std::path::Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut f = File::create(dir.join("plugin.xml")).unwrap();
        write!(f, r#"<plugin id="{id}" version="{version}"/>"#).unwrap();
    }

    #[test]
    fn scans_subdirectories_for_descriptors() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(&tmp.path().join("a"), "a", "1.0");
        write_plugin(&tmp.path().join("b"), "b", "2.0");

        let mut source = LocalFilesystemSource::new("plugin.xml");
        source.add_directory(tmp.path());
        let mut found: Vec<_> = source.scan().into_iter().map(|d| d.id).collect();
        found.sort();
        assert_eq!(found, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn skips_directories_without_a_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        write_plugin(&tmp.path().join("real"), "real", "1.0");

        let mut source = LocalFilesystemSource::new("plugin.xml");
        source.add_directory(tmp.path());
        let found = source.scan();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "real");
    }
}
