#![deny(missing_docs)]

//! # Operation Examples
//!
//! Builds a complete request/response example for one operation on top of
//! the generator and the materializer.
//!
//! - A caller-supplied (partial) example is the starting point; every value
//!   already present is kept.
//! - `resourceGroupName` and `api-version` parameters bypass generation.
//! - Missing response slots are back-filled, except `default` and, once a
//!   real status is present, the usual success codes.
//! - Long-running operations get a polling header on `201`/`202`.
//! - Minimal mode leaves optional parameters out.

use crate::cache::CachePair;
use crate::document::ResolvedDocument;
use crate::error::GenerateError;
use crate::generator::ExampleGenerator;
use crate::materializer::{AllowAll, Materializer, RuleValidator};
use crate::model::{OperationRef, ResponseRef};
use crate::pointer::DefRef;
use crate::synthesizer::{DefaultSynthesizer, ValueSynthesizer};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;

/// Success codes that are not back-filled once the caller supplied a status.
pub const PRE_HANDLED_STATUSES: [&str; 4] = ["200", "201", "202", "204"];

const RESOURCE_GROUP_PARAMETER: &str = "resourceGroupName";
const API_VERSION_PARAMETER: &str = "api-version";
const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const LOCATION_HEADER: &str = "Location";

/// One response slot of an example.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseExample {
    /// Header values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    /// Response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Parameters and responses of one operation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleDocument {
    /// Parameter values by name.
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
    /// Responses by status code.
    #[serde(default)]
    pub responses: IndexMap<String, ResponseExample>,
}

/// Settings of an example run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorOptions {
    /// Seed of the default value synthesizer.
    pub seed: u64,
    /// Value used for every `resourceGroupName` parameter.
    pub resource_group_name: String,
    /// Base of synthesized polling URLs.
    pub polling_base_url: String,
    /// Emit required parameters and properties only.
    pub minimal: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            resource_group_name: "rg-specmock".to_string(),
            polling_base_url: "https://management.example.com".to_string(),
            minimal: false,
        }
    }
}

/// Builds examples for the operations of one document, sharing one cache
/// pair across them.
pub struct OperationExampleBuilder<'a, S: ValueSynthesizer = DefaultSynthesizer> {
    document: &'a ResolvedDocument,
    options: GeneratorOptions,
    validator: &'a dyn RuleValidator,
    synthesizer: S,
    caches: CachePair,
    issues: Vec<GenerateError>,
}

impl<'a> OperationExampleBuilder<'a, DefaultSynthesizer> {
    /// Builder with the default synthesizer (seeded from `options`) and no
    /// inclusion rules.
    pub fn new(document: &'a ResolvedDocument, options: GeneratorOptions) -> Self {
        let synthesizer = DefaultSynthesizer::new(options.seed);
        Self {
            document,
            options,
            validator: &AllowAll,
            synthesizer,
            caches: CachePair::new(),
            issues: Vec::new(),
        }
    }
}

impl<'a, S: ValueSynthesizer> OperationExampleBuilder<'a, S> {
    /// Replaces the inclusion rules.
    pub fn with_validator(mut self, validator: &'a dyn RuleValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the value synthesizer.
    pub fn with_synthesizer<T: ValueSynthesizer>(self, synthesizer: T) -> OperationExampleBuilder<'a, T> {
        OperationExampleBuilder {
            document: self.document,
            options: self.options,
            validator: self.validator,
            synthesizer,
            caches: self.caches,
            issues: self.issues,
        }
    }

    /// The caches filled so far.
    pub fn caches(&self) -> &CachePair {
        &self.caches
    }

    /// Generation problems reported so far.
    pub fn issues(&self) -> &[GenerateError] {
        &self.issues
    }

    /// Completes `seed` (or an empty example) for `op`.
    pub fn build(&mut self, op: &OperationRef, seed: Option<&ExampleDocument>) -> ExampleDocument {
        let document = self.document;
        let mut out = seed.cloned().unwrap_or_default();
        let parameters = document.parameters(op);
        let responses = document.responses(op);

        for param in parameters.iter().filter(|p| p.location == "body") {
            if let Some(value) = out.parameters.get(&param.name) {
                self.caches.payload.seed(document, &param.schema, value);
            }
        }
        for response in &responses {
            let supplied = out.responses.get(&response.status).and_then(|r| r.body.as_ref());
            if let (Some(schema), Some(body)) = (&response.body, supplied) {
                self.caches.payload.seed(document, schema, body);
            }
        }

        for param in &parameters {
            if out.parameters.contains_key(&param.name) {
                continue;
            }
            if param.name.eq_ignore_ascii_case(RESOURCE_GROUP_PARAMETER) {
                out.parameters.insert(
                    param.name.clone(),
                    Value::String(self.options.resource_group_name.clone()),
                );
                continue;
            }
            if param.name == API_VERSION_PARAMETER {
                if let Some(version) = document.api_version() {
                    out.parameters
                        .insert(param.name.clone(), Value::String(version.to_string()));
                }
                continue;
            }
            if self.options.minimal && !param.required {
                continue;
            }
            let allowed = document
                .node(&param.site)
                .map_or(true, |node| self.validator.on_parameter(node));
            if !allowed {
                continue;
            }
            if let Some(value) = self.generate_value(&param.name, &param.schema, true) {
                out.parameters.insert(param.name.clone(), value);
            }
        }

        let real_statuses = !out.responses.is_empty();
        for response in &responses {
            let status = response.status.as_str();
            if status == "default" {
                continue;
            }
            let supplied = out.responses.contains_key(status);
            if real_statuses && !supplied && PRE_HANDLED_STATUSES.contains(&status) {
                continue;
            }
            let mut slot = out.responses.get(status).cloned().unwrap_or_default();

            if slot.body.is_none() {
                if let Some(schema) = &response.body {
                    let allowed = document
                        .node(&response.site.child("schema"))
                        .map_or(true, |node| self.validator.on_response_body(node));
                    if allowed {
                        slot.body = self.generate_value(status, schema, false);
                    }
                }
            }

            if op.long_running && matches!(status, "201" | "202") {
                self.add_polling_header(op, response, &mut slot);
            }
            for (header, schema) in &response.headers {
                if slot.headers.contains_key(header) {
                    continue;
                }
                let allowed = document
                    .node(&response.site.child("headers").child(header))
                    .map_or(true, |node| self.validator.on_response_header(node));
                if !allowed {
                    continue;
                }
                if let Some(value) = self.generate_value(header, schema, false) {
                    slot.headers.insert(header.clone(), header_text(value));
                }
            }
            out.responses.insert(status.to_string(), slot);
        }

        debug!(
            operation = %op.operation_id,
            parameters = out.parameters.len(),
            responses = out.responses.len(),
            "example built"
        );
        out
    }

    /// The validator sees the response's declaration of the polling header,
    /// or a synthetic `{type: string, format: uri}` when it is undeclared.
    fn add_polling_header(&self, op: &OperationRef, response: &ResponseRef, slot: &mut ResponseExample) {
        let header = match op.final_state_via.as_deref() {
            Some("location") => LOCATION_HEADER,
            _ => ASYNC_OPERATION_HEADER,
        };
        if slot.headers.contains_key(header) {
            return;
        }
        let declared = self
            .document
            .node(&response.site.child("headers").child(header))
            .cloned();
        let schema = declared.unwrap_or_else(|| json!({"type": "string", "format": "uri"}));
        if !self.validator.on_response_header(&schema) {
            return;
        }
        slot.headers.insert(
            header.to_string(),
            format!(
                "{}/operationResults/{}",
                self.options.polling_base_url.trim_end_matches('/'),
                op.operation_id
            ),
        );
    }

    fn generate_value(&mut self, name: &str, schema: &DefRef, is_request: bool) -> Option<Value> {
        let document = self.document;
        let (payload, mock) = self.caches.split();
        let mut generator = ExampleGenerator::new(document, payload, mock, &mut self.synthesizer);
        let item = generator.generate(name, schema, None, &mut HashSet::new(), is_request, None);
        self.issues.extend(generator.into_issues());
        let item = item?;
        Materializer::new(document, self.validator)
            .minimal(self.options.minimal)
            .materialize(&item, is_request, schema)
    }
}

fn header_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
