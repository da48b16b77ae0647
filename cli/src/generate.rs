#![deny(missing_docs)]

//! # Generate Command
//!
//! Resolves each spec and writes `<output>/<spec-stem>/<operationId>.json`
//! for every operation.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use specmock_core::pointer::{parse_reference, resolve_document_url, ReferenceKind};
use specmock_core::{
    DocumentLoader, ExampleDocument, FileLoader, GeneratorOptions, OperationExampleBuilder,
    OperationRef, ResolvedDocument, Resolver,
};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::error::{CliError, CliResult};
use crate::resolve::load_spec;

const SPEC_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Arguments for the generate command.
#[derive(clap::Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Swagger document, or a directory searched recursively for documents.
    #[clap(long)]
    pub spec: PathBuf,

    /// Output directory.
    #[clap(long, default_value = "generated")]
    pub output: PathBuf,

    /// Only generate the operation with this id.
    #[clap(long)]
    pub operation: Option<String>,

    /// Seed of the value synthesizer.
    #[clap(long, env = "SPECMOCK_SEED")]
    pub seed: Option<u64>,

    /// Emit required properties only.
    #[clap(long)]
    pub minimal: bool,

    /// Start from the first `x-ms-examples` entry of each operation.
    #[clap(long)]
    pub use_examples: bool,

    /// Options file (JSON or YAML); flags override its values.
    #[clap(long, env = "SPECMOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Value for `resourceGroupName` parameters.
    #[clap(long, env = "SPECMOCK_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Base of synthesized polling URLs.
    #[clap(long, env = "SPECMOCK_POLLING_BASE_URL")]
    pub polling_base_url: Option<String>,
}

/// Executes the generate command. Returns the number of files written.
pub fn execute(args: &GenerateArgs) -> CliResult<usize> {
    let options = load_options(args)?;
    let specs = collect_specs(&args.spec)?;
    if specs.is_empty() {
        return Err(CliError::General(format!(
            "No spec documents found at {:?}",
            args.spec
        )));
    }

    let mut written = 0;
    for spec in &specs {
        written += generate_spec(spec, args, &options)?;
    }
    info!(specs = specs.len(), files = written, "examples written");
    Ok(written)
}

fn load_options(args: &GenerateArgs) -> CliResult<GeneratorOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            serde_yaml::from_str(&text).map_err(|e| {
                CliError::General(format!("Invalid options file {:?}: {}", path, e))
            })?
        }
        None => GeneratorOptions::default(),
    };
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    if args.minimal {
        options.minimal = true;
    }
    if let Some(rg) = &args.resource_group {
        options.resource_group_name = rg.clone();
    }
    if let Some(url) = &args.polling_base_url {
        options.polling_base_url = url.clone();
    }
    Ok(options)
}

fn collect_specs(root: &Path) -> CliResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(CliError::General(format!("Spec path not found: {:?}", root)));
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    // Example directories below the root hold payloads, not specs.
    let mut specs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != "examples")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SPEC_EXTENSIONS.contains(&ext))
        })
        .collect();
    specs.sort();
    Ok(specs)
}

fn generate_spec(spec: &Path, args: &GenerateArgs, options: &GeneratorOptions) -> CliResult<usize> {
    let (base, raw) = load_spec(spec)?;
    if raw.get("swagger").is_none() {
        debug!(spec = %spec.display(), "not a swagger document, skipped");
        return Ok(0);
    }
    let doc = Resolver::new(&FileLoader, base.clone()).resolve(raw)?;

    let stem = spec
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "spec".to_string());
    let out_dir = args.output.join(stem);
    fs::create_dir_all(&out_dir)?;

    let mut builder = OperationExampleBuilder::new(&doc, options.clone());
    let mut written = 0;
    for op in doc.operations() {
        if let Some(wanted) = &args.operation {
            if !op.operation_id.eq_ignore_ascii_case(wanted) {
                continue;
            }
        }
        let seed = if args.use_examples {
            first_example(&doc, &base, &op)
        } else {
            None
        };
        let example = builder.build(&op, seed.as_ref());
        let text = serde_json::to_string_pretty(&example)
            .map_err(|e| CliError::General(format!("Failed to serialize example: {}", e)))?;
        let path = out_dir.join(format!("{}.json", op.operation_id));
        fs::write(&path, text)?;
        debug!(output = %path.display(), "example written");
        written += 1;
    }
    if !builder.issues().is_empty() {
        warn!(
            spec = %spec.display(),
            issues = builder.issues().len(),
            "examples generated with issues"
        );
    }
    Ok(written)
}

/// The first `x-ms-examples` entry of `op`, inline or loaded from the file
/// it references.
fn first_example(doc: &ResolvedDocument, base: &Url, op: &OperationRef) -> Option<ExampleDocument> {
    let entry = doc
        .node(&op.site)?
        .get("x-ms-examples")?
        .as_object()?
        .values()
        .next()?;

    let raw: Value = match entry.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            let parsed = parse_reference(reference);
            if parsed.kind == ReferenceKind::Local {
                return None;
            }
            let location = resolve_document_url(base, parsed.document).ok()?;
            match FileLoader.fetch(&location) {
                Ok(value) => value,
                Err(err) => {
                    warn!(operation = %op.operation_id, %location, error = %err, "example not loaded");
                    return None;
                }
            }
        }
        None => entry.clone(),
    };

    match serde_json::from_value(raw) {
        Ok(example) => Some(example),
        Err(err) => {
            warn!(operation = %op.operation_id, error = %err, "example ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SPEC: &str = r##"
swagger: "2.0"
info: {title: pets, version: "2021-01-01"}
paths:
  /pets/{name}:
    get:
      operationId: Pets_Get
      x-ms-examples:
        Get a pet:
          $ref: "./examples/Pets_Get.json"
      parameters:
        - {name: name, in: path, required: true, type: string}
        - {name: api-version, in: query, required: true, type: string}
      responses:
        "200":
          description: ok
          schema: {$ref: "#/definitions/Pet"}
    delete:
      operationId: Pets_Delete
      parameters:
        - {name: name, in: path, required: true, type: string}
      responses:
        "204": {description: gone}
definitions:
  Pet:
    type: object
    required: [name]
    properties:
      name: {type: string}
"##;

    fn args(spec: PathBuf, output: PathBuf) -> GenerateArgs {
        GenerateArgs {
            spec,
            output,
            operation: None,
            seed: Some(1),
            minimal: false,
            use_examples: false,
            config: None,
            resource_group: None,
            polling_base_url: None,
        }
    }

    fn write_spec(dir: &Path) -> PathBuf {
        let spec = dir.join("pets.yaml");
        fs::write(&spec, SPEC).unwrap();
        fs::create_dir_all(dir.join("examples")).unwrap();
        fs::write(
            dir.join("examples/Pets_Get.json"),
            r#"{"parameters": {"name": "tom"}, "responses": {"200": {"body": {"name": "tom"}}}}"#,
        )
        .unwrap();
        spec
    }

    #[test]
    fn test_execute_writes_one_file_per_operation() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let output = dir.path().join("out");
        let written = execute(&args(spec, output.clone())).unwrap();
        assert_eq!(written, 2);

        let text = fs::read_to_string(output.join("pets/Pets_Get.json")).unwrap();
        let example: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(example["parameters"]["api-version"], "2021-01-01");
        assert!(example["responses"]["200"]["body"]["name"].is_string());
        assert!(output.join("pets/Pets_Delete.json").exists());
    }

    #[test]
    fn test_execute_uses_examples_and_filters_operation() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path());
        let output = dir.path().join("out");
        let mut args = args(dir.path().to_path_buf(), output.clone());
        args.use_examples = true;
        args.operation = Some("pets_get".to_string());
        assert_eq!(execute(&args).unwrap(), 1);
        assert!(spec.exists());

        let text = fs::read_to_string(output.join("pets/Pets_Get.json")).unwrap();
        let example: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(example["parameters"]["name"], "tom");
        assert_eq!(example["responses"]["200"]["body"]["name"], "tom");
    }

    #[test]
    fn test_options_file_and_flags() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("options.yaml");
        fs::write(&config, "seed: 3\nminimal: true\nresourceGroupName: rg-file\n").unwrap();
        let mut args = args(dir.path().to_path_buf(), dir.path().join("out"));
        args.config = Some(config);
        args.seed = Some(8);
        let options = load_options(&args).unwrap();
        assert_eq!(options.seed, 8);
        assert!(options.minimal);
        assert_eq!(options.resource_group_name, "rg-file");
    }

    #[test]
    fn test_specs_under_an_examples_ancestor_are_found() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("examples").join("svc");
        fs::create_dir_all(&root).unwrap();
        write_spec(&root);
        let specs = collect_specs(&dir.path().join("examples")).unwrap();
        assert_eq!(specs, vec![root.join("pets.yaml")]);

        let written = execute(&args(root, dir.path().join("out"))).unwrap();
        assert_eq!(written, 2);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let args = args(dir.path().to_path_buf(), dir.path().join("out"));
        assert!(matches!(execute(&args), Err(CliError::General(_))));
    }
}
