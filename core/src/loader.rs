#![deny(missing_docs)]

//! # Document Loading
//!
//! The resolver reaches other documents only through [`DocumentLoader`].
//! Two loaders ship with the crate:
//!
//! - [`FileLoader`] reads `file://` locations from disk.
//! - [`MemoryLoader`] serves documents registered up front, for tests and
//!   embedders that already hold their documents in memory.
//!
//! No network access is performed by either.

use crate::error::LoadError;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

/// Fetches raw documents by absolute location.
pub trait DocumentLoader {
    /// Returns the parsed document at `location` (fragment ignored).
    fn fetch(&self, location: &Url) -> Result<Value, LoadError>;
}

/// Parses JSON or YAML text. The location decides which parser is tried first.
pub fn parse_document(location: &str, text: &str) -> Result<Value, LoadError> {
    let yaml_first = location.ends_with(".yaml") || location.ends_with(".yml");
    if !yaml_first {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return Ok(value);
        }
    }
    serde_yaml::from_str::<Value>(text)
        .map_err(|e| LoadError::Parse(format!("Failed to parse '{}': {}", location, e)))
}

/// Converts a filesystem path into the absolute `file://` URL used as a base.
pub fn file_url(path: &Path) -> Result<Url, LoadError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| LoadError::Unsupported(absolute.display().to_string()))
}

/// Reads documents from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

impl FileLoader {
    /// Reads the root document at `path`, returning it with its base URL.
    pub fn load_root(&self, path: &Path) -> Result<(Url, Value), LoadError> {
        let url = file_url(path)?;
        let doc = self.fetch(&url)?;
        Ok((url, doc))
    }
}

impl DocumentLoader for FileLoader {
    fn fetch(&self, location: &Url) -> Result<Value, LoadError> {
        if location.scheme() != "file" {
            return Err(LoadError::Unsupported(location.to_string()));
        }
        let path = location
            .to_file_path()
            .map_err(|_| LoadError::Unsupported(location.to_string()))?;
        let text = fs::read_to_string(&path)?;
        parse_document(location.path(), &text)
    }
}

/// Serves documents registered in memory, keyed by absolute URL.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    docs: HashMap<String, Value>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parsed document.
    pub fn register_json(&mut self, location: &str, doc: Value) -> Result<(), LoadError> {
        let url = Url::parse(location).map_err(|e| LoadError::Parse(e.to_string()))?;
        self.docs.insert(strip_fragment(&url), doc);
        Ok(())
    }

    /// Registers a YAML (or JSON) document from text.
    pub fn register_yaml(&mut self, location: &str, yaml: &str) -> Result<(), LoadError> {
        let doc = parse_document(location, yaml)?;
        self.register_json(location, doc)
    }
}

impl DocumentLoader for MemoryLoader {
    fn fetch(&self, location: &Url) -> Result<Value, LoadError> {
        self.docs.get(&strip_fragment(location)).cloned().ok_or_else(|| {
            LoadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no document registered at {}", location),
            ))
        })
    }
}

fn strip_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_document_json_and_yaml() {
        let json = parse_document("a.json", r#"{"swagger": "2.0"}"#).unwrap();
        assert_eq!(json["swagger"], "2.0");
        let yaml = parse_document("a.yaml", "swagger: '2.0'\n").unwrap();
        assert_eq!(yaml["swagger"], "2.0");
    }

    #[test]
    fn test_parse_document_reports_location() {
        let err = parse_document("broken.yaml", "a: [").unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_memory_loader_ignores_fragment() {
        let mut loader = MemoryLoader::new();
        loader
            .register_yaml("file:///specs/common.yaml", "definitions: {}\n")
            .unwrap();
        let url = Url::parse("file:///specs/common.yaml#/definitions/X").unwrap();
        assert!(loader.fetch(&url).is_ok());
        let missing = Url::parse("file:///specs/other.yaml").unwrap();
        assert!(matches!(loader.fetch(&missing), Err(LoadError::Io(_))));
    }

    #[test]
    fn test_file_loader_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"info": {{"version": "2024-01-01"}}}}"#).unwrap();

        let (url, doc) = FileLoader.load_root(&path).unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(doc["info"]["version"], "2024-01-01");
    }

    #[test]
    fn test_file_loader_rejects_network_locations() {
        let url = Url::parse("https://example.com/spec.json").unwrap();
        assert!(matches!(
            FileLoader.fetch(&url),
            Err(LoadError::Unsupported(_))
        ));
    }
}
