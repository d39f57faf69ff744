use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::config::{LimitsConfig, PromptsConfig};
use crate::error::{Result, SequentialThinkingError};
use crate::models::{PromptListing, PromptResponse, PromptScope};

pub const DEFAULT_PROMPT: &str = "sequential-thinking";

/// Static text describing how to drive the thinking tools
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub text: &'static str,
    /// Placeholder names with their default values
    pub arguments: &'static [(&'static str, &'static str)],
}

pub const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        name: DEFAULT_PROMPT,
        description: "How to reason step by step with the sequential_thinking tool",
        text: "Work through {topic} one thought at a time with the sequential_thinking tool.\n\
\n\
- Start with thought_number 1 and an honest total_thoughts estimate; adjust the estimate whenever it changes.\n\
- Keep each thought under {max_thought_length} characters. A session accepts at most {max_thoughts} thoughts.\n\
- Set next_thought_needed to false only when you have a satisfactory answer.\n\
- If you reach the end and realize more work is needed, close with needs_more_thoughts set to true and continue with a higher thought_number.\n\
- To correct an earlier step, submit a new thought with is_revision true and revises_thought set to that step's number.\n\
- To explore an alternative, set branch_from_thought and a branch_id; continue the branch by reusing the branch_id.\n\
- Rejected thoughts come back with a kind and an explanation. Fix the thought and submit it again.\n\
\n\
Answer style: {style}",
        arguments: &[("topic", "the problem"), ("style", "concise")],
    },
    PromptTemplate {
        name: "revise-and-branch",
        description: "Reference for revisions and branches",
        text: "Revisions and branches in sequential_thinking:\n\
\n\
Revision: {{\"thought\": \"...\", \"thought_number\": 4, \"total_thoughts\": 5, \"next_thought_needed\": true, \"is_revision\": true, \"revises_thought\": 2}}\n\
A revision must name an earlier thought that exists on your current line of reasoning.\n\
\n\
Branch: {{\"thought\": \"...\", \"thought_number\": 3, \"total_thoughts\": 6, \"next_thought_needed\": true, \"branch_from_thought\": 2, \"branch_id\": \"{branch_prefix}-1\"}}\n\
A branch can only start from a thought that already exists. Later thoughts on the branch only need the branch_id.\n\
\n\
Use thought_history with view = branches to list branches and view = branch to read one.",
        arguments: &[("branch_prefix", "alt")],
    },
];

pub fn find_prompt(name: &str) -> Option<&'static PromptTemplate> {
    PROMPTS.iter().find(|prompt| prompt.name == name)
}

/// Replace `{name}` placeholders; `{{` and `}}` render as literal braces
pub fn render_template(text: &str, arguments: &HashMap<String, String>) -> String {
    let mut rendered = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            rendered.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let key = &tail[1..end];
                match arguments.get(key) {
                    Some(value) => rendered.push_str(value),
                    None => rendered.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
                continue;
            }
        }

        rendered.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    rendered.push_str(rest);
    rendered
}

/// Persisted argument values: global ones and per-prompt ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPromptValues {
    #[serde(default)]
    pub global: BTreeMap<String, String>,
    #[serde(default)]
    pub prompts: BTreeMap<String, BTreeMap<String, String>>,
}

/// Key/value store behind the prompt arguments, optionally backed by a JSON file
#[derive(Debug, Clone, Default)]
pub struct PromptStore {
    path: Option<PathBuf>,
    values: StoredPromptValues,
}

impl PromptStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => StoredPromptValues::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredPromptValues::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// Store described by configuration. A store that cannot be read is
    /// replaced by an empty in-memory one.
    pub fn from_config(config: &PromptsConfig) -> Self {
        match &config.store_path {
            Some(path) => Self::open(path).unwrap_or_else(|e| {
                tracing::error!("Failed to load prompt store {}: {}", path.display(), e);
                Self::in_memory()
            }),
            None => Self::in_memory(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Global values overlaid with the prompt's own
    pub fn values_for(&self, prompt: &str) -> HashMap<String, String> {
        let mut merged: HashMap<String, String> = self
            .values
            .global
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(own) = self.values.prompts.get(prompt) {
            merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    pub fn merge(&mut self, scope: PromptScope, prompt: &str, arguments: &HashMap<String, String>) {
        let target = match scope {
            PromptScope::Global => &mut self.values.global,
            PromptScope::Prompt => self.values.prompts.entry(prompt.to_string()).or_default(),
        };
        target.extend(arguments.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Write the store to its file; a no-op for in-memory stores
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Serves the canned prompts with arguments merged from every source
#[derive(Debug, Clone)]
pub struct PromptProvider {
    store: PromptStore,
    limit_values: HashMap<String, String>,
}

impl PromptProvider {
    pub fn new(store: PromptStore, limits: &LimitsConfig) -> Self {
        let limit_values = HashMap::from([
            ("max_thoughts".to_string(), limits.max_thoughts.to_string()),
            ("max_thought_length".to_string(), limits.max_thought_length.to_string()),
        ]);
        Self { store, limit_values }
    }

    pub fn list(&self) -> Vec<PromptListing> {
        PROMPTS
            .iter()
            .map(|prompt| PromptListing {
                name: prompt.name.to_string(),
                description: prompt.description.to_string(),
                arguments: prompt.arguments.iter().map(|(name, _)| name.to_string()).collect(),
            })
            .collect()
    }

    /// Render a prompt. Later sources win: template defaults, configured
    /// limits, stored global values, stored prompt values, call arguments.
    pub fn render(&self, name: &str, call_arguments: &HashMap<String, String>) -> Result<PromptResponse> {
        let prompt = find_prompt(name).ok_or_else(|| SequentialThinkingError::UnknownPrompt(name.to_string()))?;

        let mut arguments: HashMap<String, String> = prompt
            .arguments
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        arguments.extend(self.limit_values.clone());
        arguments.extend(self.store.values_for(name));
        arguments.extend(call_arguments.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(PromptResponse {
            name: prompt.name.to_string(),
            description: prompt.description.to_string(),
            text: render_template(prompt.text, &arguments),
            arguments,
            persisted: None,
        })
    }

    /// Remember arguments for later renders. Returns whether they reached disk;
    /// a failed write is logged and the values stay in memory.
    pub fn persist(&mut self, name: &str, scope: PromptScope, arguments: &HashMap<String, String>) -> Result<bool> {
        if find_prompt(name).is_none() {
            return Err(SequentialThinkingError::UnknownPrompt(name.to_string()));
        }
        self.store.merge(scope, name, arguments);

        if self.store.path().is_none() {
            return Ok(false);
        }
        match self.store.save() {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!("Failed to persist prompt arguments for '{}': {}", name, e);
                Ok(false)
            }
        }
    }

    /// Server instructions built from the default prompt
    pub fn instructions(&self) -> String {
        self.render(DEFAULT_PROMPT, &HashMap::new())
            .map(|prompt| prompt.text)
            .unwrap_or_else(|_| "Structured sequential thinking with revisions and branches".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_render_template() {
        let rendered = render_template("Hello {name}, {{literal}} {unknown}", &args(&[("name", "CC")]));
        assert_eq!(rendered, "Hello CC, {literal} {unknown}");
    }

    #[test]
    fn test_render_template_unterminated_brace() {
        assert_eq!(render_template("open { brace", &HashMap::new()), "open { brace");
    }

    #[test]
    fn test_default_prompt_uses_limits() {
        let provider = PromptProvider::new(PromptStore::in_memory(), &LimitsConfig::default());
        let prompt = provider.render(DEFAULT_PROMPT, &HashMap::new()).unwrap();
        assert!(prompt.text.contains("at most 20 thoughts"));
        assert!(prompt.text.contains("under 20000 characters"));
        assert!(prompt.text.contains("the problem"));
        assert!(!prompt.text.contains('{'));
    }

    #[test]
    fn test_merge_order() {
        let mut store = PromptStore::in_memory();
        store.merge(PromptScope::Global, DEFAULT_PROMPT, &args(&[("style", "global"), ("topic", "global topic")]));
        store.merge(PromptScope::Prompt, DEFAULT_PROMPT, &args(&[("style", "per prompt")]));
        let provider = PromptProvider::new(store, &LimitsConfig::default());

        let prompt = provider
            .render(DEFAULT_PROMPT, &args(&[("topic", "call topic")]))
            .unwrap();
        assert_eq!(prompt.arguments["style"], "per prompt");
        assert_eq!(prompt.arguments["topic"], "call topic");
    }

    #[test]
    fn test_unknown_prompt() {
        let provider = PromptProvider::new(PromptStore::in_memory(), &LimitsConfig::default());
        assert!(matches!(
            provider.render("nope", &HashMap::new()),
            Err(SequentialThinkingError::UnknownPrompt(_))
        ));
    }

    #[test]
    fn test_store_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prompts.json");

        let mut provider = PromptProvider::new(PromptStore::open(&path).unwrap(), &LimitsConfig::default());
        assert!(provider
            .persist(DEFAULT_PROMPT, PromptScope::Prompt, &args(&[("topic", "caching")]))
            .unwrap());

        let reopened = PromptStore::open(&path).unwrap();
        assert_eq!(reopened.values_for(DEFAULT_PROMPT)["topic"], "caching");
        assert!(reopened.values_for("revise-and-branch").is_empty());
    }

    #[test]
    fn test_in_memory_persist_keeps_values() {
        let mut provider = PromptProvider::new(PromptStore::in_memory(), &LimitsConfig::default());
        let written = provider
            .persist("revise-and-branch", PromptScope::Global, &args(&[("branch_prefix", "idea")]))
            .unwrap();
        assert!(!written);
        let prompt = provider.render("revise-and-branch", &HashMap::new()).unwrap();
        assert!(prompt.text.contains("\"idea-1\""));
    }

    #[test]
    fn test_corrupt_store_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(PromptStore::open(&path).is_err());
        let store = PromptStore::from_config(&PromptsConfig {
            store_path: Some(path),
        });
        assert!(store.path().is_none());
    }
}
