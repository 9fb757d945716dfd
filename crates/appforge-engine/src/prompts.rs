//! Prompt construction for each workflow step
//!
//! Every prompt is a system message plus one user message made of the task
//! text followed by context sections. A revision note from a previous
//! attempt is appended as its own section.

use std::collections::BTreeSet;

use appforge_llm::Message;
use appforge_retrieval::SnippetRef;
use appforge_state::{ArchitecturePlan, Requirements};
use appforge_utils::types::Platform;

const SYSTEM: &str = "You are a cross-platform application architect and developer. \
Targets are web (React), desktop (Electron), mobile (NativeScript) and server (Node.js). \
Answer with a single JSON object and nothing else.";

/// Snippet text is cut to this many characters in prompts.
const SNIPPET_CHARS: usize = 1200;

struct PromptBuilder {
    body: String,
}

impl PromptBuilder {
    fn new(task: &str) -> Self {
        Self {
            body: task.trim().to_string(),
        }
    }

    fn section(mut self, title: &str, content: &str) -> Self {
        let content = content.trim();
        if !content.is_empty() {
            self.body.push_str("\n\n# ");
            self.body.push_str(title);
            self.body.push('\n');
            self.body.push_str(content);
        }
        self
    }

    fn revision(self, note: Option<&str>) -> Self {
        match note {
            Some(note) => self.section(
                "Previous attempt",
                &format!("Your previous answer could not be used: {note}\nFix the problem and answer again."),
            ),
            None => self,
        }
    }

    fn build(self) -> Vec<Message> {
        vec![Message::system(SYSTEM), Message::user(self.body)]
    }
}

pub fn planning(request: &str, note: Option<&str>) -> Vec<Message> {
    PromptBuilder::new(
        "Extract structured requirements from the application request below. \
         Respond with {\"actionable\": bool, \"summary\": string, \"features\": [string], \
         \"platforms\": [string], \"constraints\": [string], \"reason\": string|null}. \
         Set actionable to false, with a reason, when the request does not describe \
         software that can be built.",
    )
    .section("Request", request)
    .revision(note)
    .build()
}

pub fn platform_selection(
    requirements: &Requirements,
    candidates: &BTreeSet<Platform>,
    note: Option<&str>,
) -> Vec<Message> {
    let candidates = if candidates.is_empty() {
        "none".to_string()
    } else {
        join_platforms(candidates)
    };
    PromptBuilder::new(
        "Decide which platforms the user wants code for. Options: web, desktop, mobile, server. \
         Respond with {\"platforms\": [string], \"rationale\": string}.",
    )
    .section("Requirements", &requirements_text(requirements))
    .section("Platforms detected in the request", &candidates)
    .revision(note)
    .build()
}

pub fn architecture(
    requirements: &Requirements,
    platforms: &BTreeSet<Platform>,
    docs: &[&SnippetRef],
    note: Option<&str>,
) -> Vec<Message> {
    let targets = platforms
        .iter()
        .map(|p| format!("- {p}: {}, entry point {}", p.display_name(), p.entry_point()))
        .collect::<Vec<_>>()
        .join("\n");
    PromptBuilder::new(
        "Design the application architecture. Every target platform needs at least one \
         component. Respond with {\"components\": [{\"name\": string, \"platform\": string|null, \
         \"responsibility\": string, \"files\": [relative path]}], \"data_flow\": \
         [{\"from\": component, \"to\": component, \"description\": string}], \
         \"rationale\": string, \"citations\": [documentation source]}. \
         Include each platform's entry point in its files.",
    )
    .section("Requirements", &requirements_text(requirements))
    .section("Target platforms", &targets)
    .section("Documentation", &docs_text(docs))
    .revision(note)
    .build()
}

pub fn generation(
    platform: Platform,
    requirements: &Requirements,
    plan: &ArchitecturePlan,
    expected_files: &[String],
    docs: &[SnippetRef],
    note: Option<&str>,
) -> Vec<Message> {
    let components = plan
        .components_for(platform)
        .map(|c| format!("- {}: {}", c.name, c.responsibility))
        .collect::<Vec<_>>()
        .join("\n");
    let flows = plan
        .data_flow
        .iter()
        .map(|e| format!("- {} -> {}: {}", e.from, e.to, e.description))
        .collect::<Vec<_>>()
        .join("\n");
    let refs: Vec<&SnippetRef> = docs.iter().collect();
    PromptBuilder::new(&format!(
        "Write the complete source code for the {} part of the application. \
         Respond with {{\"files\": [{{\"path\": relative path, \"content\": string}}]}}. \
         The entry point {} is required. Paths are relative to the platform directory.",
        platform.display_name(),
        platform.entry_point()
    ))
    .section("Requirements", &requirements_text(requirements))
    .section("Components", &components)
    .section("Data flow", &flows)
    .section("Files to produce", &expected_files.join("\n"))
    .section("Documentation", &docs_text(&refs))
    .revision(note)
    .build()
}

fn requirements_text(requirements: &Requirements) -> String {
    let mut text = requirements.summary.clone();
    for feature in &requirements.features {
        text.push_str("\n- ");
        text.push_str(feature);
    }
    if !requirements.constraints.is_empty() {
        text.push_str("\nConstraints: ");
        text.push_str(&requirements.constraints.join("; "));
    }
    text
}

fn docs_text(docs: &[&SnippetRef]) -> String {
    docs.iter()
        .map(|s| {
            let excerpt: String = s.text.chars().take(SNIPPET_CHARS).collect();
            format!("[{}] ({})\n{excerpt}", s.source, s.platform)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn join_platforms(platforms: &BTreeSet<Platform>) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Query used to search documentation for `platform`.
pub fn retrieval_query(requirements: &Requirements, platform: Platform, focus: &[&str]) -> String {
    let mut query = format!("{} {}", platform.framework(), requirements.summary);
    let terms = focus
        .iter()
        .copied()
        .chain(requirements.features.iter().map(String::as_str));
    for term in terms {
        query.push(' ');
        query.push_str(term);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_llm::Role;

    fn requirements() -> Requirements {
        Requirements {
            summary: "To-do list".into(),
            features: vec!["add tasks".into(), "mark done".into()],
            platform_hints: BTreeSet::new(),
            constraints: vec!["offline".into()],
        }
    }

    #[test]
    fn test_planning_prompt_sections() {
        let messages = planning("a to-do app", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("# Request\na to-do app"));
        assert!(!messages[1].content.contains("# Previous attempt"));
    }

    #[test]
    fn test_revision_note_is_appended() {
        let messages = planning("a to-do app", Some("response is not valid JSON"));
        assert!(messages[1].content.contains("# Previous attempt"));
        assert!(messages[1].content.contains("not valid JSON"));
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let messages = architecture(
            &requirements(),
            &BTreeSet::from([Platform::Web]),
            &[],
            None,
        );
        assert!(!messages[1].content.contains("# Documentation"));
        assert!(messages[1].content.contains("src/index.js"));
        assert!(messages[1].content.contains("Constraints: offline"));
    }

    #[test]
    fn test_retrieval_query_mentions_framework() {
        let query = retrieval_query(&requirements(), Platform::Mobile, &["navigation"]);
        assert!(query.starts_with("NativeScript To-do list"));
        assert!(query.contains("navigation"));
        assert!(query.contains("mark done"));
    }
}
