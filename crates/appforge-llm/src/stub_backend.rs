//! Offline backend for dry runs
//!
//! Produces well-formed, deterministic responses for every workflow step
//! from the structured hints in `LlmInvocation::metadata`. No network.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeSet;

use appforge_utils::error::LlmError;
use appforge_utils::types::Platform;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

pub const STUB_PROVIDER: &str = "stub";
const STUB_MODEL: &str = "stub-1";

/// Deterministic backend used by `--dry-run` and as the default reply of
/// scripted test backends.
#[derive(Debug, Clone, Default)]
pub struct StubBackend;

impl StubBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Response body the stub would return for `inv`.
    pub fn respond(inv: &LlmInvocation) -> Result<String, LlmError> {
        let body = match inv.step.as_str() {
            "planning" => planning_response(inv),
            "platform_selection" => selection_response(inv),
            "architecture" => architecture_response(inv),
            "generation" => generation_response(inv)?,
            other => {
                return Err(LlmError::Unsupported(format!(
                    "stub backend has no response for step '{other}'"
                )));
            }
        };
        Ok(body)
    }
}

#[async_trait]
impl LlmBackend for StubBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let body = Self::respond(&inv)?;
        Ok(LlmResult::new(body, STUB_PROVIDER, STUB_MODEL))
    }
}

fn metadata_str<'a>(inv: &'a LlmInvocation, key: &str) -> &'a str {
    inv.metadata.get(key).and_then(Value::as_str).unwrap_or("")
}

fn metadata_platforms(inv: &LlmInvocation, key: &str) -> BTreeSet<Platform> {
    inv.metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| s.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn planning_response(inv: &LlmInvocation) -> String {
    let request = metadata_str(inv, "request").trim();
    let actionable = request.chars().any(char::is_alphanumeric);
    let platforms: Vec<&str> = Platform::mentioned_in(request)
        .into_iter()
        .map(|p| p.as_str())
        .collect();
    let summary: String = request.chars().take(200).collect();
    let (features, reason) = if actionable {
        (vec!["core user flow", "persistent data"], Value::Null)
    } else {
        (Vec::new(), json!("request has no content"))
    };

    json!({
        "actionable": actionable,
        "summary": summary,
        "features": features,
        "platforms": platforms,
        "constraints": [],
        "reason": reason,
    })
    .to_string()
}

fn selection_response(inv: &LlmInvocation) -> String {
    let mut platforms = metadata_platforms(inv, "candidates");
    if platforms.is_empty() {
        platforms.insert(Platform::Web);
    }
    let names: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
    json!({
        "platforms": names,
        "rationale": "confirmed from the request",
    })
    .to_string()
}

/// Files the stub plans for each platform, entry point first.
fn planned_files(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Web => &["src/index.js", "src/App.js", "src/App.css"],
        Platform::Desktop => &["main.js", "preload.js", "index.html"],
        Platform::Mobile => &["app.js", "app/main-page.js", "app/main-page.xml"],
        Platform::Server => &["server.js", "routes/api.js"],
    }
}

fn architecture_response(inv: &LlmInvocation) -> String {
    let platforms = metadata_platforms(inv, "platforms");

    let components: Vec<Value> = platforms
        .iter()
        .map(|p| {
            json!({
                "name": format!("{}-app", p.as_str()),
                "platform": p.as_str(),
                "responsibility": format!("{} client", p.display_name()),
                "files": planned_files(*p),
            })
        })
        .collect();

    let data_flow: Vec<Value> = if platforms.contains(&Platform::Server) {
        platforms
            .iter()
            .filter(|p| **p != Platform::Server)
            .map(|p| {
                json!({
                    "from": format!("{}-app", p.as_str()),
                    "to": "server-app",
                    "description": "REST calls over HTTP",
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    json!({
        "components": components,
        "data_flow": data_flow,
        "rationale": "one component per selected platform",
        "citations": [],
    })
    .to_string()
}

fn generation_response(inv: &LlmInvocation) -> Result<String, LlmError> {
    let platform = inv.platform.ok_or_else(|| {
        LlmError::InvalidRequest("generation call without a platform".to_string())
    })?;

    let mut paths: Vec<String> = inv
        .metadata
        .get("expected_files")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !paths.iter().any(|p| p == platform.entry_point()) {
        paths.insert(0, platform.entry_point().to_string());
    }

    let files: Vec<Value> = paths
        .iter()
        .map(|path| json!({ "path": path, "content": placeholder(platform, path) }))
        .collect();

    Ok(format!(
        "```json\n{}\n```",
        json!({ "files": files })
    ))
}

fn placeholder(platform: Platform, path: &str) -> String {
    if path.ends_with(".css") {
        return "body {\n  font-family: sans-serif;\n}\n".to_string();
    }
    if path.ends_with(".html") || path.ends_with(".xml") {
        return format!("<!-- {} view -->\n", platform.display_name());
    }
    if path == platform.entry_point() {
        return match platform {
            Platform::Web => "import React from 'react';\nimport { createRoot } from 'react-dom/client';\nimport App from './App';\n\ncreateRoot(document.getElementById('root')).render(<App />);\n".to_string(),
            Platform::Desktop => "const { app, BrowserWindow } = require('electron');\n\napp.whenReady().then(() => {\n  const win = new BrowserWindow({ width: 800, height: 600 });\n  win.loadFile('index.html');\n});\n".to_string(),
            Platform::Mobile => "import { Application } from '@nativescript/core';\n\nApplication.run({ moduleName: 'app/main-page' });\n".to_string(),
            Platform::Server => "const express = require('express');\n\nconst app = express();\napp.use(express.json());\napp.listen(process.env.PORT || 3000);\n".to_string(),
        };
    }
    format!("// {path} for {}\nmodule.exports = {{}};\n", platform.display_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    fn invocation(step: &str) -> LlmInvocation {
        LlmInvocation::new(
            "run",
            step,
            "",
            Duration::from_secs(5),
            vec![Message::user("x")],
        )
    }

    #[tokio::test]
    async fn test_planning_detects_platforms() {
        let inv = invocation("planning")
            .with_metadata("request", json!("a simple to-do list app for web and mobile"));
        let result = StubBackend::new().invoke(inv).await.unwrap();
        let value: Value = serde_json::from_str(&result.raw_response).unwrap();
        assert_eq!(value["actionable"], json!(true));
        assert_eq!(value["platforms"], json!(["web", "mobile"]));
        assert_eq!(result.provider, "stub");
    }

    #[test]
    fn test_planning_empty_request_not_actionable() {
        let inv = invocation("planning").with_metadata("request", json!("   "));
        let value: Value = serde_json::from_str(&StubBackend::respond(&inv).unwrap()).unwrap();
        assert_eq!(value["actionable"], json!(false));
    }

    #[test]
    fn test_selection_defaults_to_web() {
        let inv = invocation("platform_selection");
        let value: Value = serde_json::from_str(&StubBackend::respond(&inv).unwrap()).unwrap();
        assert_eq!(value["platforms"], json!(["web"]));
    }

    #[test]
    fn test_architecture_links_clients_to_server() {
        let inv = invocation("architecture").with_metadata("platforms", json!(["web", "server"]));
        let value: Value = serde_json::from_str(&StubBackend::respond(&inv).unwrap()).unwrap();
        assert_eq!(value["components"].as_array().unwrap().len(), 2);
        assert_eq!(value["data_flow"][0]["to"], json!("server-app"));
    }

    #[test]
    fn test_generation_always_includes_entry_point() {
        let inv = invocation("generation")
            .with_platform(Platform::Server)
            .with_metadata("expected_files", json!(["routes/api.js"]));
        let body = StubBackend::respond(&inv).unwrap();
        assert!(body.starts_with("```json"));
        assert!(body.contains("server.js"));
        assert!(body.contains("routes/api.js"));
    }

    #[test]
    fn test_unknown_step_is_unsupported() {
        assert!(matches!(
            StubBackend::respond(&invocation("review")),
            Err(LlmError::Unsupported(_))
        ));
    }
}
