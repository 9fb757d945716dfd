//! Typed extraction of Generation Client responses
//!
//! Each step's response is parsed into a tagged, validated value at the step
//! boundary. Parse failures are returned as short messages that go back to
//! the model in a revised prompt.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

use appforge_state::{ArchitecturePlan, Component, DataFlowEdge, FileTree};
use appforge_utils::types::Platform;

/// Pull the JSON object out of a model response.
///
/// Accepts a bare object, a fenced ```` ```json ```` block, or an object
/// surrounded by prose.
pub fn extract_json(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    if let Some(block) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str(block)
    {
        return Ok(value);
    }
    let candidate = outer_object(trimmed);
    if candidate.is_empty() {
        return Err("response contained no JSON object".to_string());
    }
    serde_json::from_str(candidate).map_err(|e| format!("response is not valid JSON: {e}"))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn outer_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => "",
    }
}

fn parse<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, String> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(|e| format!("{what} has the wrong shape: {e}"))
}

/// Platform names the model may use, canonical or alias. Unknown names are
/// dropped with a warning.
fn parse_platforms(names: &[String], context: &str) -> BTreeSet<Platform> {
    names
        .iter()
        .filter_map(|name| match name.parse::<Platform>() {
            Ok(platform) => Some(platform),
            Err(e) => {
                warn!(context = context, error = %e, "Ignoring unknown platform");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RequirementsWire {
    #[serde(default = "default_true")]
    actionable: bool,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Planning output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRequirements {
    pub actionable: bool,
    pub summary: String,
    pub features: Vec<String>,
    pub platforms: BTreeSet<Platform>,
    pub constraints: Vec<String>,
    pub reason: Option<String>,
}

pub fn parse_requirements(raw: &str) -> Result<ExtractedRequirements, String> {
    let wire: RequirementsWire = parse(raw, "requirements")?;
    Ok(ExtractedRequirements {
        actionable: wire.actionable,
        summary: wire.summary.trim().to_string(),
        features: non_empty(wire.features),
        platforms: parse_platforms(&wire.platforms, "planning"),
        constraints: non_empty(wire.constraints),
        reason: wire.reason.filter(|r| !r.trim().is_empty()),
    })
}

fn non_empty(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
struct SelectionWire {
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    rationale: String,
}

/// Platform confirmation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub platforms: BTreeSet<Platform>,
    pub rationale: String,
}

pub fn parse_confirmation(raw: &str) -> Result<Confirmation, String> {
    let wire: SelectionWire = parse(raw, "platform confirmation")?;
    Ok(Confirmation {
        platforms: parse_platforms(&wire.platforms, "platform_selection"),
        rationale: wire.rationale,
    })
}

#[derive(Debug, Deserialize)]
struct ComponentWire {
    name: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    responsibility: String,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlanWire {
    components: Vec<ComponentWire>,
    #[serde(default)]
    data_flow: Vec<DataFlowEdge>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    citations: Vec<String>,
}

/// Parse an architecture plan. Structural validation is left to
/// [`ArchitecturePlan::problems`].
pub fn parse_plan(raw: &str) -> Result<ArchitecturePlan, String> {
    let wire: PlanWire = parse(raw, "architecture plan")?;
    let mut components = Vec::with_capacity(wire.components.len());
    for c in wire.components {
        let platform = match c.platform.as_deref().map(str::trim) {
            None | Some("") | Some("null") | Some("shared") => None,
            Some(name) => Some(
                name.parse::<Platform>()
                    .map_err(|e| format!("component '{}': {e}", c.name))?,
            ),
        };
        let mut files = Vec::with_capacity(c.files.len());
        for file in c.files {
            files.push(validate_path(&file)?);
        }
        components.push(Component {
            name: c.name.trim().to_string(),
            platform,
            responsibility: c.responsibility,
            files,
        });
    }
    Ok(ArchitecturePlan {
        components,
        data_flow: wire.data_flow,
        rationale: wire.rationale,
        citations: wire.citations,
    })
}

#[derive(Debug, Deserialize)]
struct GeneratedFileWire {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct FilesWire {
    files: Vec<GeneratedFileWire>,
}

/// Parse a generated file tree. Paths are validated and must be unique.
pub fn parse_files(raw: &str) -> Result<FileTree, String> {
    let wire: FilesWire = parse(raw, "generated files")?;
    if wire.files.is_empty() {
        return Err("response contained no files".to_string());
    }
    let mut tree = FileTree::new();
    let mut seen = HashSet::new();
    for file in wire.files {
        let path = validate_path(&file.path)?;
        if !seen.insert(path.clone()) {
            return Err(format!("duplicate file path '{path}'"));
        }
        tree.insert(path, file.content);
    }
    Ok(tree)
}

/// Normalize a generated relative path or explain why it is unsafe.
///
/// A leading `./` is stripped. Absolute paths, `..` segments, backslashes,
/// drive prefixes and empty segments are refused.
pub fn validate_path(path: &str) -> Result<String, String> {
    let trimmed = path.trim();
    let normalized = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let refuse = |why: &str| Err(format!("unsafe file path '{path}': {why}"));

    if normalized.is_empty() {
        return refuse("empty");
    }
    if normalized.starts_with('/') {
        return refuse("absolute");
    }
    if normalized.contains('\\') {
        return refuse("backslash");
    }
    if normalized.contains(':') {
        return refuse("drive or scheme prefix");
    }
    for segment in normalized.split('/') {
        match segment {
            "" => return refuse("empty segment"),
            "." | ".." => return refuse("relative segment"),
            _ => {}
        }
    }
    Ok(normalized.to_string())
}
