#![deny(missing_docs)]

//! # Resolve Command
//!
//! Loads a spec from disk, runs the resolver and emits the normalized JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use specmock_core::{FileLoader, ResolveError, ResolvedDocument, Resolver};
use tracing::info;
use url::Url;

use crate::error::{CliError, CliResult};

/// Arguments for the resolve command.
#[derive(clap::Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Path to the Swagger document.
    #[clap(long)]
    pub spec: PathBuf,

    /// Write the resolved document here instead of stdout.
    #[clap(long)]
    pub output: Option<PathBuf>,
}

/// Reads the document at `path`, returning its base URL and raw JSON.
pub(crate) fn load_spec(path: &Path) -> CliResult<(Url, Value)> {
    FileLoader.load_root(path).map_err(|reason| {
        CliError::Resolve(ResolveError::Load {
            uri: path.display().to_string(),
            reason,
        })
    })
}

/// Loads and resolves the document at `path`.
fn resolve_spec(path: &Path) -> CliResult<ResolvedDocument> {
    let (base, raw) = load_spec(path)?;
    Ok(Resolver::new(&FileLoader, base).resolve(raw)?)
}

/// Executes the resolve command.
pub fn execute(args: &ResolveArgs) -> CliResult<()> {
    if !args.spec.exists() {
        return Err(CliError::General(format!(
            "Spec file not found: {:?}",
            args.spec
        )));
    }
    let doc = resolve_spec(&args.spec)?;
    let text = serde_json::to_string_pretty(doc.document())
        .map_err(|e| CliError::General(format!("Failed to serialize document: {}", e)))?;

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            info!(output = %path.display(), "resolved document written");
        }
        None => println!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_execute_writes_resolved_document() {
        let dir = tempdir().unwrap();
        let spec = dir.path().join("pets.yaml");
        fs::write(
            &spec,
            r##"
swagger: "2.0"
info: {title: pets, version: "1"}
paths: {}
definitions:
  Pet:
    type: object
    properties:
      name: {type: string}
"##,
        )
        .unwrap();
        let output = dir.path().join("out/resolved.json");
        execute(&ResolveArgs {
            spec,
            output: Some(output.clone()),
        })
        .unwrap();

        let resolved: Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(
            resolved["definitions"]["Pet"]["additionalProperties"],
            Value::Bool(false)
        );
    }

    #[test]
    fn test_execute_missing_spec() {
        let dir = tempdir().unwrap();
        let args = ResolveArgs {
            spec: dir.path().join("missing.json"),
            output: None,
        };
        assert!(matches!(execute(&args), Err(CliError::General(_))));
    }

    #[test]
    fn test_unresolved_reference_surfaces_as_resolve_error() {
        let dir = tempdir().unwrap();
        let spec = dir.path().join("broken.json");
        fs::write(
            &spec,
            r##"{"definitions": {"A": {"$ref": "#/definitions/Missing"}}}"##,
        )
        .unwrap();
        let args = ResolveArgs { spec, output: None };
        assert!(matches!(
            execute(&args),
            Err(CliError::Resolve(ResolveError::RefNotFound(_)))
        ));
    }
}
