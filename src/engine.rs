use std::collections::{HashMap, HashSet};

use crate::models::{SessionStatus, ThoughtRecord};
use crate::validation::{ChainIndex, Line, ThoughtValidator, ValidationError};

/// Continuation state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Nothing accepted yet, or every thought since the last close reopened
    /// the chain
    Open,
    /// A thought said no further thought is needed and nothing has reopened it
    Closed {
        closing_thought: i32,
        expects_more: bool,
    },
}

impl ChainState {
    pub fn status(&self) -> SessionStatus {
        match self {
            ChainState::Open => SessionStatus::Open,
            ChainState::Closed { .. } => SessionStatus::Closed,
        }
    }
}

/// How an accepted thought relates to a previous close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumption {
    /// The chain was open
    Continuing,
    /// The closing thought asked for more and this one moves past it
    Reopened,
    /// The chain had been closed without asking for more, or this thought does
    /// not move past the closing one. The chain stays closed.
    AfterClose { closing_thought: i32 },
}

/// State echoed for an accepted thought
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub thought_number: i32,
    /// Submitted estimate, raised to `thought_number` when it falls short
    pub total_thoughts: i32,
    pub remaining_thoughts: i32,
    pub next_thought_needed: bool,
    pub status: SessionStatus,
    pub resumption: Resumption,
    pub branch_id: Option<String>,
    pub opened_branch: bool,
}

#[derive(Debug)]
struct Branch {
    id: String,
    parent: Option<usize>,
    fork_point: i32,
    entries: Vec<usize>,
    numbers: HashSet<i32>,
}

/// Where a branch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchOrigin<'a> {
    /// Parent branch, `None` for the main line
    pub parent: Option<&'a str>,
    pub fork_point: i32,
}

/// Owns the accepted history and the branch index of one session.
///
/// The history only ever grows: an accepted thought is appended, a rejected
/// one leaves every index untouched. Cross references are resolved by thought
/// number through `latest_by_number`, never through pointers into records.
#[derive(Debug)]
pub struct ThoughtEngine {
    validator: ThoughtValidator,
    history: Vec<ThoughtRecord>,
    main_numbers: HashSet<i32>,
    latest_by_number: HashMap<i32, usize>,
    branches: Vec<Branch>,
    branch_slots: HashMap<String, usize>,
    state: ChainState,
}

impl ThoughtEngine {
    pub fn new(validator: ThoughtValidator) -> Self {
        Self {
            validator,
            history: Vec::new(),
            main_numbers: HashSet::new(),
            latest_by_number: HashMap::new(),
            branches: Vec::new(),
            branch_slots: HashMap::new(),
            state: ChainState::Open,
        }
    }

    /// Validate and append a thought
    pub fn submit(&mut self, record: ThoughtRecord) -> std::result::Result<SubmitOutcome, ValidationError> {
        self.validator.validate(&record, &*self)?;

        let resumption = self.resumption_for(&record);
        let index = self.history.len();
        let number = record.thought_number;
        let mut opened_branch = false;

        match record.branch_id.as_deref() {
            Some(branch_id) => {
                let existing = self.branch_slots.get(branch_id).copied();
                let slot = match existing {
                    Some(slot) => slot,
                    None => {
                        opened_branch = true;
                        self.open_branch(branch_id, record.branch_from_thought.unwrap_or(number))
                    }
                };
                let branch = &mut self.branches[slot];
                branch.entries.push(index);
                branch.numbers.insert(number);
            }
            None => {
                self.main_numbers.insert(number);
            }
        }

        self.latest_by_number.insert(number, index);
        self.state = match (record.next_thought_needed, resumption) {
            (false, _) => ChainState::Closed {
                closing_thought: number,
                expects_more: record.needs_more_thoughts(),
            },
            // Only a permitted reopen leaves the closed state
            (true, Resumption::AfterClose { .. }) => self.state,
            (true, _) => ChainState::Open,
        };

        let total_thoughts = record.total_thoughts.max(number);
        let outcome = SubmitOutcome {
            thought_number: number,
            total_thoughts,
            remaining_thoughts: total_thoughts - number,
            next_thought_needed: record.next_thought_needed,
            status: self.state.status(),
            resumption,
            branch_id: record.branch_id.clone(),
            opened_branch,
        };
        self.history.push(record);
        Ok(outcome)
    }

    fn resumption_for(&self, record: &ThoughtRecord) -> Resumption {
        match self.state {
            ChainState::Open => Resumption::Continuing,
            ChainState::Closed {
                closing_thought,
                expects_more: true,
            } if record.thought_number > closing_thought => Resumption::Reopened,
            ChainState::Closed { closing_thought, .. } => Resumption::AfterClose { closing_thought },
        }
    }

    fn open_branch(&mut self, branch_id: &str, fork_point: i32) -> usize {
        let parent = self.parent_slot(fork_point);
        let slot = self.branches.len();
        self.branches.push(Branch {
            id: branch_id.to_string(),
            parent,
            fork_point,
            entries: Vec::new(),
            numbers: HashSet::new(),
        });
        self.branch_slots.insert(branch_id.to_string(), slot);
        slot
    }

    /// Branch slot a new branch forking at `fork_point` descends from; `None`
    /// when it forks from the main line
    fn parent_slot(&self, fork_point: i32) -> Option<usize> {
        match self.fork_line(fork_point)? {
            Line::Main => None,
            Line::Branch(id) => self.branch_slots.get(id).copied(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Most recently accepted thought
    pub fn current(&self) -> Option<&ThoughtRecord> {
        self.history.last()
    }

    /// Most recently accepted thought carrying `thought_number`, on any line
    pub fn by_number(&self, thought_number: i32) -> Option<&ThoughtRecord> {
        self.latest_by_number
            .get(&thought_number)
            .and_then(|&index| self.history.get(index))
    }

    /// Thoughts of a branch in arrival order
    pub fn branch(&self, branch_id: &str) -> Option<Vec<&ThoughtRecord>> {
        let branch = self.branch_slots.get(branch_id).and_then(|&slot| self.branches.get(slot))?;
        Some(branch.entries.iter().filter_map(|&index| self.history.get(index)).collect())
    }

    pub fn branch_origin(&self, branch_id: &str) -> Option<BranchOrigin<'_>> {
        let branch = self.branch_slots.get(branch_id).and_then(|&slot| self.branches.get(slot))?;
        Some(BranchOrigin {
            parent: branch
                .parent
                .and_then(|slot| self.branches.get(slot))
                .map(|parent| parent.id.as_str()),
            fork_point: branch.fork_point,
        })
    }

    /// Known branch identifiers in first-seen order
    pub fn branch_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.branches.iter().map(|branch| branch.id.as_str())
    }

    /// The full history in arrival order. The iterator can be cloned to restart it.
    pub fn all(&self) -> std::slice::Iter<'_, ThoughtRecord> {
        self.history.iter()
    }
}

impl Default for ThoughtEngine {
    fn default() -> Self {
        Self::new(ThoughtValidator::default())
    }
}

impl ChainIndex for ThoughtEngine {
    fn accepted(&self) -> usize {
        self.history.len()
    }

    fn has_branch(&self, branch_id: &str) -> bool {
        self.branch_slots.contains_key(branch_id)
    }

    fn line_contains(&self, line: Line<'_>, thought_number: i32) -> bool {
        if let Line::Branch(branch_id) = line {
            // Parents always sit at a lower slot, so the walk terminates
            let mut slot = self.branch_slots.get(branch_id).copied();
            while let Some(branch) = slot.and_then(|slot| self.branches.get(slot)) {
                if branch.numbers.contains(&thought_number) {
                    return true;
                }
                slot = branch.parent;
            }
        }
        self.main_numbers.contains(&thought_number)
    }

    fn fork_line(&self, branch_from_thought: i32) -> Option<Line<'_>> {
        if self.main_numbers.contains(&branch_from_thought) {
            return Some(Line::Main);
        }
        self.by_number(branch_from_thought)
            .and_then(|record| record.branch_id.as_deref())
            .map(Line::Branch)
    }
}
