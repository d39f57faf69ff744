use serde::Serialize;
use thiserror::Error;

use crate::config::LimitsConfig;
use crate::models::ThoughtRecord;

/// Classification reported to the client with every rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    MalformedRequest,
    InvalidNumbering,
    TextTooLong,
    DanglingRevision,
    DanglingBranch,
    SelfReferentialRevision,
    SessionBoundsExceeded,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MalformedRequest => "MalformedRequest",
            ViolationKind::InvalidNumbering => "InvalidNumbering",
            ViolationKind::TextTooLong => "TextTooLong",
            ViolationKind::DanglingRevision => "DanglingRevision",
            ViolationKind::DanglingBranch => "DanglingBranch",
            ViolationKind::SelfReferentialRevision => "SelfReferentialRevision",
            ViolationKind::SessionBoundsExceeded => "SessionBoundsExceeded",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Thought content cannot be empty")]
    EmptyThought,

    #[error("Invalid thought number: {number} (must be at least 1)")]
    InvalidThoughtNumber { number: i32 },

    #[error("Invalid total thoughts: {total} (must be at least 1)")]
    InvalidTotalThoughts { total: i32 },

    #[error("Thought content too long: {actual} chars (max: {max})")]
    ThoughtTooLong { actual: usize, max: usize },

    #[error("Revision is missing revises_thought")]
    MissingRevisionTarget,

    #[error("Thought {number} cannot revise itself")]
    RevisesItself { number: i32 },

    #[error("Thought {number} cannot revise later thought {target}; a revision must target earlier reasoning")]
    RevisionNotEarlier { number: i32, target: i32 },

    #[error("Revised thought {target} does not exist in this line of reasoning")]
    RevisionTargetNotFound { target: i32 },

    #[error("branch_from_thought {from} requires a branch_id")]
    MissingBranchId { from: i32 },

    #[error("branch_id cannot be empty")]
    EmptyBranchId,

    #[error("Cannot branch '{branch_id}' from thought {from}: no such thought in the main line or an ancestor branch")]
    BranchPointNotFound { branch_id: String, from: i32 },

    #[error("Unknown branch '{branch_id}': start it with branch_from_thought")]
    UnknownBranch { branch_id: String },

    #[error("Session already holds the maximum of {max} thoughts")]
    TooManyThoughts { max: usize },
}

impl ValidationError {
    pub fn kind(&self) -> ViolationKind {
        match self {
            ValidationError::EmptyThought => ViolationKind::MalformedRequest,
            ValidationError::InvalidThoughtNumber { .. }
            | ValidationError::InvalidTotalThoughts { .. } => ViolationKind::InvalidNumbering,
            ValidationError::ThoughtTooLong { .. } => ViolationKind::TextTooLong,
            ValidationError::MissingRevisionTarget
            | ValidationError::RevisionNotEarlier { .. }
            | ValidationError::RevisionTargetNotFound { .. } => ViolationKind::DanglingRevision,
            ValidationError::RevisesItself { .. } => ViolationKind::SelfReferentialRevision,
            ValidationError::MissingBranchId { .. }
            | ValidationError::EmptyBranchId
            | ValidationError::BranchPointNotFound { .. }
            | ValidationError::UnknownBranch { .. } => ViolationKind::DanglingBranch,
            ValidationError::TooManyThoughts { .. } => ViolationKind::SessionBoundsExceeded,
        }
    }
}

/// A line of reasoning: the implicit main line or a named branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Main,
    Branch(&'a str),
}

/// Read-only view of an accepted chain, as seen by the validator
pub trait ChainIndex {
    /// Number of accepted thoughts
    fn accepted(&self) -> usize;

    fn has_branch(&self, branch_id: &str) -> bool;

    /// Whether `thought_number` is reachable from `line`. A branch reaches its
    /// own thoughts, its ancestor branches and the main line.
    fn line_contains(&self, line: Line<'_>, thought_number: i32) -> bool;

    /// The line a new branch forking at `branch_from_thought` would descend from
    fn fork_line(&self, branch_from_thought: i32) -> Option<Line<'_>>;
}

/// Configured bounds, supplied by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_thought_length: usize,
    pub max_thoughts: usize,
}

impl From<&LimitsConfig> for Bounds {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_thought_length: limits.max_thought_length,
            max_thoughts: limits.max_thoughts,
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

/// Structural checks for a candidate thought. Holds no chain state.
#[derive(Debug, Clone)]
pub struct ThoughtValidator {
    bounds: Bounds,
}

impl ThoughtValidator {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Accept or reject `record` against the current chain. Bounds are checked
    /// first, so an over-limit attempt is always reported as such.
    pub fn validate<C: ChainIndex + ?Sized>(
        &self,
        record: &ThoughtRecord,
        chain: &C,
    ) -> std::result::Result<(), ValidationError> {
        self.validate_bounds(record, chain.accepted())?;
        Self::validate_numbering(record)?;
        let line = Self::validate_branch(record, chain)?;
        Self::validate_revision(record, line, chain)
    }

    pub fn validate_bounds(
        &self,
        record: &ThoughtRecord,
        accepted: usize,
    ) -> std::result::Result<(), ValidationError> {
        if accepted >= self.bounds.max_thoughts {
            return Err(ValidationError::TooManyThoughts {
                max: self.bounds.max_thoughts,
            });
        }

        if record.thought.trim().is_empty() {
            return Err(ValidationError::EmptyThought);
        }

        let length = record.thought.chars().count();
        if length > self.bounds.max_thought_length {
            return Err(ValidationError::ThoughtTooLong {
                actual: length,
                max: self.bounds.max_thought_length,
            });
        }

        Ok(())
    }

    fn validate_numbering(record: &ThoughtRecord) -> std::result::Result<(), ValidationError> {
        if record.thought_number < 1 {
            return Err(ValidationError::InvalidThoughtNumber {
                number: record.thought_number,
            });
        }
        if record.total_thoughts < 1 {
            return Err(ValidationError::InvalidTotalThoughts {
                total: record.total_thoughts,
            });
        }
        Ok(())
    }

    /// Returns the line a revision on this record is resolved against
    fn validate_branch<'a, C: ChainIndex + ?Sized>(
        record: &'a ThoughtRecord,
        chain: &'a C,
    ) -> std::result::Result<Line<'a>, ValidationError> {
        match (record.branch_from_thought, record.branch_id.as_deref()) {
            (None, None) => Ok(Line::Main),
            (Some(from), None) => Err(ValidationError::MissingBranchId { from }),
            (_, Some(branch_id)) if branch_id.trim().is_empty() => Err(ValidationError::EmptyBranchId),
            (Some(from), Some(branch_id)) if chain.has_branch(branch_id) => {
                if chain.line_contains(Line::Branch(branch_id), from) {
                    Ok(Line::Branch(branch_id))
                } else {
                    Err(ValidationError::BranchPointNotFound {
                        branch_id: branch_id.to_string(),
                        from,
                    })
                }
            }
            // A new branch has no thoughts of its own yet
            (Some(from), Some(branch_id)) => {
                chain
                    .fork_line(from)
                    .ok_or_else(|| ValidationError::BranchPointNotFound {
                        branch_id: branch_id.to_string(),
                        from,
                    })
            }
            (None, Some(branch_id)) if chain.has_branch(branch_id) => Ok(Line::Branch(branch_id)),
            (None, Some(branch_id)) => Err(ValidationError::UnknownBranch {
                branch_id: branch_id.to_string(),
            }),
        }
    }

    fn validate_revision<C: ChainIndex + ?Sized>(
        record: &ThoughtRecord,
        line: Line<'_>,
        chain: &C,
    ) -> std::result::Result<(), ValidationError> {
        if !record.is_revision() {
            return Ok(());
        }

        let target = record
            .revises_thought
            .ok_or(ValidationError::MissingRevisionTarget)?;
        let number = record.thought_number;

        if target == number {
            return Err(ValidationError::RevisesItself { number });
        }
        if target > number {
            return Err(ValidationError::RevisionNotEarlier { number, target });
        }
        if !chain.line_contains(line, target) {
            return Err(ValidationError::RevisionTargetNotFound { target });
        }
        Ok(())
    }
}

impl Default for ThoughtValidator {
    fn default() -> Self {
        Self::new(Bounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// Minimal chain: main-line numbers plus branches with a parent line
    #[derive(Default)]
    struct FakeChain {
        accepted: usize,
        main: HashSet<i32>,
        branches: HashMap<String, (Option<String>, HashSet<i32>)>,
    }

    impl FakeChain {
        fn with_main(numbers: &[i32]) -> Self {
            Self {
                accepted: numbers.len(),
                main: numbers.iter().copied().collect(),
                branches: HashMap::new(),
            }
        }

        fn add_branch(&mut self, id: &str, parent: Option<&str>, numbers: &[i32]) {
            self.accepted += numbers.len();
            self.branches.insert(
                id.to_string(),
                (parent.map(str::to_string), numbers.iter().copied().collect()),
            );
        }
    }

    impl ChainIndex for FakeChain {
        fn accepted(&self) -> usize {
            self.accepted
        }

        fn has_branch(&self, branch_id: &str) -> bool {
            self.branches.contains_key(branch_id)
        }

        fn line_contains(&self, line: Line<'_>, thought_number: i32) -> bool {
            let mut current = match line {
                Line::Main => None,
                Line::Branch(id) => Some(id.to_string()),
            };
            while let Some(id) = current {
                let Some((parent, numbers)) = self.branches.get(&id) else {
                    return false;
                };
                if numbers.contains(&thought_number) {
                    return true;
                }
                current = parent.clone();
            }
            self.main.contains(&thought_number)
        }

        fn fork_line(&self, branch_from_thought: i32) -> Option<Line<'_>> {
            if self.main.contains(&branch_from_thought) {
                return Some(Line::Main);
            }
            self.branches
                .iter()
                .find(|(_, (_, numbers))| numbers.contains(&branch_from_thought))
                .map(|(id, _)| Line::Branch(id.as_str()))
        }
    }

    fn kind_of(result: std::result::Result<(), ValidationError>) -> ViolationKind {
        result.expect_err("expected a rejection").kind()
    }

    #[test]
    fn test_first_thought_accepted() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::default();
        assert!(validator
            .validate(&ThoughtRecord::new("Plan", 1, 3, true), &chain)
            .is_ok());
    }

    #[test]
    fn test_invalid_numbering() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::default();
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("x", 0, 3, true), &chain)),
            ViolationKind::InvalidNumbering
        );
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("x", 1, 0, true), &chain)),
            ViolationKind::InvalidNumbering
        );
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("x", -4, 3, true), &chain)),
            ViolationKind::InvalidNumbering
        );
    }

    #[test]
    fn test_thought_number_may_exceed_estimate() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1, 2, 3]);
        assert!(validator
            .validate(&ThoughtRecord::new("one more", 4, 3, true), &chain)
            .is_ok());
    }

    #[test]
    fn test_text_length_bound() {
        let validator = ThoughtValidator::new(Bounds {
            max_thought_length: 5,
            max_thoughts: 20,
        });
        let chain = FakeChain::default();
        assert!(validator
            .validate(&ThoughtRecord::new("abcde", 1, 1, false), &chain)
            .is_ok());
        assert!(matches!(
            validator.validate(&ThoughtRecord::new("abcdef", 1, 1, false), &chain),
            Err(ValidationError::ThoughtTooLong { actual: 6, max: 5 })
        ));
        // Characters, not bytes
        assert!(validator
            .validate(&ThoughtRecord::new("ééééé", 1, 1, false), &chain)
            .is_ok());
    }

    #[test]
    fn test_empty_thought_is_malformed() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::default();
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("   ", 1, 1, true), &chain)),
            ViolationKind::MalformedRequest
        );
    }

    #[test]
    fn test_session_bound_checked_before_everything_else() {
        let validator = ThoughtValidator::new(Bounds {
            max_thought_length: 100,
            max_thoughts: 2,
        });
        let chain = FakeChain::with_main(&[1, 2]);
        // Would otherwise be InvalidNumbering
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("x", 0, 0, true), &chain)),
            ViolationKind::SessionBoundsExceeded
        );
    }

    #[test]
    fn test_revision_targets() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1, 2]);

        assert!(validator
            .validate(&ThoughtRecord::new("fix", 3, 3, true).revising(1), &chain)
            .is_ok());
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("fix", 3, 3, true).revising(3), &chain)),
            ViolationKind::SelfReferentialRevision
        );
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("fix", 3, 3, true).revising(5), &chain)),
            ViolationKind::DanglingRevision
        );
        let mut missing_target = ThoughtRecord::new("fix", 3, 3, true);
        missing_target.is_revision = Some(true);
        assert_eq!(
            kind_of(validator.validate(&missing_target, &chain)),
            ViolationKind::DanglingRevision
        );
    }

    #[test]
    fn test_revision_of_unseen_thought() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1, 2, 3]);
        assert!(matches!(
            validator.validate(&ThoughtRecord::new("oops", 9, 9, true).revising(5), &chain),
            Err(ValidationError::RevisionTargetNotFound { target: 5 })
        ));
    }

    #[test]
    fn test_revises_thought_without_flag_is_ignored() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1]);
        let mut record = ThoughtRecord::new("next", 2, 2, false);
        record.revises_thought = Some(7);
        assert!(validator.validate(&record, &chain).is_ok());
    }

    #[test]
    fn test_branch_requires_id_and_existing_point() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1]);

        let mut no_id = ThoughtRecord::new("alt", 2, 3, true);
        no_id.branch_from_thought = Some(1);
        assert_eq!(kind_of(validator.validate(&no_id, &chain)), ViolationKind::DanglingBranch);

        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("alt", 2, 3, true).branching(4, "B1"), &chain)),
            ViolationKind::DanglingBranch
        );
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("alt", 2, 3, true).branching(1, " "), &chain)),
            ViolationKind::DanglingBranch
        );
        assert!(validator
            .validate(&ThoughtRecord::new("alt", 2, 3, true).branching(1, "B1"), &chain)
            .is_ok());
    }

    #[test]
    fn test_unknown_branch_without_fork_point() {
        let validator = ThoughtValidator::default();
        let chain = FakeChain::with_main(&[1]);
        assert!(matches!(
            validator.validate(&ThoughtRecord::new("alt", 2, 3, true).on_branch("B9"), &chain),
            Err(ValidationError::UnknownBranch { .. })
        ));
    }

    #[test]
    fn test_branch_lineage_reaches_ancestors_only() {
        let validator = ThoughtValidator::default();
        let mut chain = FakeChain::with_main(&[1, 2]);
        chain.add_branch("A", None, &[3]);
        chain.add_branch("B", Some("A"), &[4]);
        chain.add_branch("C", None, &[7]);

        // B reaches its own thoughts, A and the main line
        assert!(validator
            .validate(&ThoughtRecord::new("b", 5, 6, true).on_branch("B").revising(3), &chain)
            .is_ok());
        assert!(validator
            .validate(&ThoughtRecord::new("b", 5, 6, true).on_branch("B").revising(1), &chain)
            .is_ok());
        // but not a sibling branch
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("b", 8, 8, true).on_branch("B").revising(7), &chain)),
            ViolationKind::DanglingRevision
        );
        // and the main line does not see branch thoughts
        assert_eq!(
            kind_of(validator.validate(&ThoughtRecord::new("m", 5, 6, true).revising(3), &chain)),
            ViolationKind::DanglingRevision
        );
    }

    #[test]
    fn test_new_branch_from_branch_thought() {
        let validator = ThoughtValidator::default();
        let mut chain = FakeChain::with_main(&[1]);
        chain.add_branch("A", None, &[2]);
        assert!(validator
            .validate(&ThoughtRecord::new("deeper", 3, 4, true).branching(2, "A2"), &chain)
            .is_ok());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ViolationKind::DanglingRevision.to_string(), "DanglingRevision");
        assert_eq!(
            serde_json::to_value(ViolationKind::SessionBoundsExceeded).unwrap(),
            serde_json::json!("SessionBoundsExceeded")
        );
    }
}
