use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::validation::ViolationKind;

/// One accepted (or candidate) reasoning step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtRecord {
    pub thought: String,
    pub thought_number: i32,
    pub total_thoughts: i32,
    pub next_thought_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_revision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revises_thought: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from_thought: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_more_thoughts: Option<bool>,
}

impl ThoughtRecord {
    /// Create a plain main-line thought
    pub fn new(thought: impl Into<String>, thought_number: i32, total_thoughts: i32, next_thought_needed: bool) -> Self {
        Self {
            thought: thought.into(),
            thought_number,
            total_thoughts,
            next_thought_needed,
            is_revision: None,
            revises_thought: None,
            branch_from_thought: None,
            branch_id: None,
            needs_more_thoughts: None,
        }
    }

    pub fn revising(mut self, revises_thought: i32) -> Self {
        self.is_revision = Some(true);
        self.revises_thought = Some(revises_thought);
        self
    }

    pub fn branching(mut self, branch_from_thought: i32, branch_id: impl Into<String>) -> Self {
        self.branch_from_thought = Some(branch_from_thought);
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn on_branch(mut self, branch_id: impl Into<String>) -> Self {
        self.branch_id = Some(branch_id.into());
        self
    }

    pub fn needing_more(mut self) -> Self {
        self.needs_more_thoughts = Some(true);
        self
    }

    pub fn is_revision(&self) -> bool {
        self.is_revision.unwrap_or(false)
    }

    pub fn needs_more_thoughts(&self) -> bool {
        self.needs_more_thoughts.unwrap_or(false)
    }
}

/// Parameters for the sequential_thinking tool.
///
/// Required fields are optional here so a missing one is reported as a
/// `MalformedRequest` rejection the client can read, instead of a protocol error.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SequentialThinkingParams {
    /// Your current thinking step (required)
    #[serde(default)]
    pub thought: Option<String>,
    /// Position of this thought in the sequence, starting at 1 (required)
    #[serde(default, alias = "thoughtNumber")]
    pub thought_number: Option<i32>,
    /// Current estimate of how many thoughts are needed; may go up or down (required)
    #[serde(default, alias = "totalThoughts")]
    pub total_thoughts: Option<i32>,
    /// Whether another thought step is needed after this one (required)
    #[serde(default, alias = "nextThoughtNeeded")]
    pub next_thought_needed: Option<bool>,
    /// Whether this thought revises earlier thinking
    #[serde(default, alias = "isRevision")]
    pub is_revision: Option<bool>,
    /// Which thought number is being reconsidered (required when is_revision is true)
    #[serde(default, alias = "revisesThought")]
    pub revises_thought: Option<i32>,
    /// Thought number this branch diverges from
    #[serde(default, alias = "branchFromThought")]
    pub branch_from_thought: Option<i32>,
    /// Identifier of the branch this thought belongs to
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
    /// Set when reaching the end but realizing more thoughts are needed
    #[serde(default, alias = "needsMoreThoughts")]
    pub needs_more_thoughts: Option<bool>,
}

/// Raw arguments of the sequential_thinking tool.
///
/// Decoded by the session rather than the transport, so a wrongly typed field
/// comes back as a `MalformedRequest` rejection. The advertised schema is that
/// of [`SequentialThinkingParams`].
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SequentialThinkingArguments(
    #[schemars(with = "SequentialThinkingParams")] pub serde_json::Map<String, serde_json::Value>,
);

/// Views offered by the thought_history tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HistoryView {
    /// The most recently accepted thought (default)
    #[default]
    Current,
    /// The most recent thought carrying `thought_number`
    Thought,
    /// All thoughts of the branch named by `branch_id`
    Branch,
    /// Known branch identifiers in first-seen order
    Branches,
    /// The full history in arrival order
    All,
    /// Session status and limits
    Status,
}

/// Parameters for the thought_history tool
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ThoughtHistoryParams {
    /// What to read: current, thought, branch, branches, all or status
    #[serde(default)]
    pub view: HistoryView,
    /// Thought number to look up (view = thought)
    #[serde(default, alias = "thoughtNumber")]
    pub thought_number: Option<i32>,
    /// Branch to list (view = branch)
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

/// Where persisted prompt arguments are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptScope {
    /// Applies to every prompt
    Global,
    /// Applies to the named prompt only (default)
    #[default]
    Prompt,
}

/// Parameters for the thinking_prompt tool
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ThinkingPromptParams {
    /// Prompt name; defaults to "sequential-thinking". Use "list" to see all prompts
    #[serde(default)]
    pub name: Option<String>,
    /// Values for the prompt's placeholders
    #[serde(default)]
    pub arguments: Option<HashMap<String, String>>,
    /// Save the given arguments for later calls
    #[serde(default)]
    pub persist: bool,
    /// Where persisted arguments apply: global or prompt
    #[serde(default)]
    pub scope: PromptScope,
}

/// Whether the reasoning line is still expected to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// Echo returned for an accepted thought
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThoughtResponse {
    pub thought_number: i32,
    pub total_thoughts: i32,
    pub next_thought_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub known_branches: Vec<String>,
    pub thought_history_length: usize,
    pub remaining_thoughts: i32,
    pub session_status: SessionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Payload returned for a rejected call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub error: String,
    pub kind: ViolationKind,
}

impl Rejection {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            error: reason.into(),
            kind: ViolationKind::MalformedRequest,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Snapshot of a session for the status view
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub thought_history_length: usize,
    pub session_status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_thought_number: Option<i32>,
    pub known_branches: Vec<String>,
    pub max_thoughts: usize,
    pub max_thought_length: usize,
    pub timeout_ms: u64,
}

/// Result of a thought_history call
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum HistoryResponse {
    Current {
        found: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<ThoughtRecord>,
    },
    Thought {
        thought_number: i32,
        found: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<ThoughtRecord>,
    },
    Branch {
        branch_id: String,
        found: bool,
        thoughts: Vec<ThoughtRecord>,
    },
    Branches {
        known_branches: Vec<String>,
    },
    All {
        total: usize,
        thoughts: Vec<ThoughtRecord>,
    },
    Status(SessionSummary),
}

/// Rendered prompt returned by the thinking_prompt tool
#[derive(Debug, Clone, Serialize)]
pub struct PromptResponse {
    pub name: String,
    pub description: String,
    pub text: String,
    pub arguments: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<bool>,
}

/// Listing entry for the thinking_prompt tool
#[derive(Debug, Clone, Serialize)]
pub struct PromptListing {
    pub name: String,
    pub description: String,
    pub arguments: Vec<String>,
}
