use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::engine::{Resumption, SubmitOutcome, ThoughtEngine};
use crate::models::{
    HistoryResponse, HistoryView, Rejection, SequentialThinkingParams, SessionSummary,
    ThoughtHistoryParams, ThoughtRecord, ThoughtResponse,
};
use crate::validation::{Bounds, ThoughtValidator, ValidationError};

impl From<ValidationError> for Rejection {
    fn from(err: ValidationError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl TryFrom<SequentialThinkingParams> for ThoughtRecord {
    type Error = Rejection;

    fn try_from(params: SequentialThinkingParams) -> std::result::Result<Self, Self::Error> {
        let mut missing = Vec::new();
        if params.thought.is_none() {
            missing.push("thought");
        }
        if params.thought_number.is_none() {
            missing.push("thought_number");
        }
        if params.total_thoughts.is_none() {
            missing.push("total_thoughts");
        }
        if params.next_thought_needed.is_none() {
            missing.push("next_thought_needed");
        }

        match (
            params.thought,
            params.thought_number,
            params.total_thoughts,
            params.next_thought_needed,
        ) {
            (Some(thought), Some(thought_number), Some(total_thoughts), Some(next_thought_needed)) => {
                Ok(ThoughtRecord {
                    thought,
                    thought_number,
                    total_thoughts,
                    next_thought_needed,
                    is_revision: params.is_revision,
                    revises_thought: params.revises_thought,
                    branch_from_thought: params.branch_from_thought,
                    branch_id: params.branch_id,
                    needs_more_thoughts: params.needs_more_thoughts,
                })
            }
            _ => Err(Rejection::malformed(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Boundary between the transport and one thought chain.
///
/// Applies the configured limits, converts calls into engine operations and
/// shapes their results. It never reaches into the history itself.
#[derive(Debug)]
pub struct SessionFacade {
    id: Uuid,
    started_at: DateTime<Utc>,
    limits: LimitsConfig,
    engine: ThoughtEngine,
}

impl SessionFacade {
    pub fn new(limits: LimitsConfig) -> Self {
        let validator = ThoughtValidator::new(Bounds::from(&limits));
        let id = Uuid::new_v4();
        tracing::info!(
            "Starting thinking session {} (max {} thoughts, {} chars each)",
            id,
            limits.max_thoughts,
            limits.max_thought_length
        );
        Self {
            id,
            started_at: Utc::now(),
            limits,
            engine: ThoughtEngine::new(validator),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Read-only access for callers that need more than the canned views
    pub fn engine(&self) -> &ThoughtEngine {
        &self.engine
    }

    /// Submit one thought from tool parameters
    pub fn submit(&mut self, params: SequentialThinkingParams) -> std::result::Result<ThoughtResponse, Rejection> {
        let record = ThoughtRecord::try_from(params).inspect_err(|rejection| {
            tracing::warn!("Session {}: {}", self.id, rejection);
        })?;
        self.submit_record(record)
    }

    /// Submit one thought from a raw JSON object
    pub fn submit_json(&mut self, value: serde_json::Value) -> std::result::Result<ThoughtResponse, Rejection> {
        let params: SequentialThinkingParams = serde_json::from_value(value).map_err(|e| {
            let rejection = Rejection::malformed(format!("Could not read thought: {}", e));
            tracing::warn!("Session {}: {}", self.id, rejection);
            rejection
        })?;
        self.submit(params)
    }

    pub fn submit_record(&mut self, record: ThoughtRecord) -> std::result::Result<ThoughtResponse, Rejection> {
        match self.engine.submit(record) {
            Ok(outcome) => {
                tracing::info!(
                    "Session {}: accepted thought {} of {}{}",
                    self.id,
                    outcome.thought_number,
                    outcome.total_thoughts,
                    outcome
                        .branch_id
                        .as_deref()
                        .map(|id| format!(" on branch '{}'", id))
                        .unwrap_or_default()
                );
                Ok(self.accepted(outcome))
            }
            Err(err) => {
                let rejection = Rejection::from(err);
                tracing::warn!("Session {}: rejected thought: {}", self.id, rejection);
                Err(rejection)
            }
        }
    }

    fn accepted(&self, outcome: SubmitOutcome) -> ThoughtResponse {
        let mut warnings = Vec::new();

        match outcome.resumption {
            Resumption::Continuing => {}
            Resumption::Reopened => {
                tracing::info!(
                    "Session {}: reopened at thought {} after needs_more_thoughts",
                    self.id,
                    outcome.thought_number
                );
            }
            Resumption::AfterClose { closing_thought } => {
                let warning = format!(
                    "The chain was completed at thought {} without needs_more_thoughts; thought {} was recorded anyway",
                    closing_thought, outcome.thought_number
                );
                tracing::warn!("Session {}: {}", self.id, warning);
                warnings.push(warning);
            }
        }

        if outcome.opened_branch {
            if let Some(origin) = outcome
                .branch_id
                .as_deref()
                .and_then(|id| self.engine.branch_origin(id))
            {
                tracing::debug!(
                    "Session {}: opened branch '{}' at thought {} (parent: {})",
                    self.id,
                    outcome.branch_id.as_deref().unwrap_or_default(),
                    origin.fork_point,
                    origin.parent.unwrap_or("main")
                );
            }
        }

        ThoughtResponse {
            thought_number: outcome.thought_number,
            total_thoughts: outcome.total_thoughts,
            next_thought_needed: outcome.next_thought_needed,
            branch_id: outcome.branch_id,
            known_branches: self.known_branches(),
            thought_history_length: self.engine.len(),
            remaining_thoughts: outcome.remaining_thoughts,
            session_status: outcome.status,
            warnings,
        }
    }

    fn known_branches(&self) -> Vec<String> {
        self.engine.branch_ids().map(str::to_string).collect()
    }

    /// Answer one read-only history query
    pub fn query(&self, params: &ThoughtHistoryParams) -> std::result::Result<HistoryResponse, Rejection> {
        let response = match params.view {
            HistoryView::Current => {
                let thought = self.engine.current().cloned();
                HistoryResponse::Current {
                    found: thought.is_some(),
                    thought,
                }
            }
            HistoryView::Thought => {
                let thought_number = params
                    .thought_number
                    .ok_or_else(|| Rejection::malformed("view 'thought' requires thought_number"))?;
                let thought = self.engine.by_number(thought_number).cloned();
                HistoryResponse::Thought {
                    thought_number,
                    found: thought.is_some(),
                    thought,
                }
            }
            HistoryView::Branch => {
                let branch_id = params
                    .branch_id
                    .clone()
                    .ok_or_else(|| Rejection::malformed("view 'branch' requires branch_id"))?;
                let thoughts = self.engine.branch(&branch_id);
                HistoryResponse::Branch {
                    found: thoughts.is_some(),
                    thoughts: thoughts
                        .unwrap_or_default()
                        .into_iter()
                        .cloned()
                        .collect(),
                    branch_id,
                }
            }
            HistoryView::Branches => HistoryResponse::Branches {
                known_branches: self.known_branches(),
            },
            HistoryView::All => HistoryResponse::All {
                total: self.engine.len(),
                thoughts: self.engine.all().cloned().collect(),
            },
            HistoryView::Status => HistoryResponse::Status(self.summary()),
        };
        Ok(response)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.to_string(),
            started_at: self.started_at,
            thought_history_length: self.engine.len(),
            session_status: self.engine.status(),
            current_thought_number: self.engine.current().map(|r| r.thought_number),
            known_branches: self.known_branches(),
            max_thoughts: self.limits.max_thoughts,
            max_thought_length: self.limits.max_thought_length,
            timeout_ms: self.limits.timeout_ms,
        }
    }
}
