//! Multi-step control sequences.
//!
//! A [`Workflow`] is an ordered list of control commands. Each step carries a
//! failure policy that decides what happens to the cache and to the remaining
//! steps when its command is rejected. The controller runs workflows under its
//! command lock, so steps always observe the live cache.

use crate::protocol::ControlAttrs;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OnFailure {
    /// Cache is written before sending and kept if the command fails.
    Keep,
    /// Cache is written only once the command is accepted; a failure stops
    /// the workflow before any later step is sent.
    Abort,
    /// Cache is written before sending; a failure sends the given command
    /// and writes it to the cache.
    RollBack(ControlAttrs),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub action: &'static str,
    pub attrs: ControlAttrs,
    pub on_failure: OnFailure,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Workflow {
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single optimistic write.
    pub fn single(action: &'static str, attrs: ControlAttrs) -> Self {
        Self::new().then(action, attrs, OnFailure::Keep)
    }

    pub fn then(mut self, action: &'static str, attrs: ControlAttrs, on_failure: OnFailure) -> Self {
        self.steps.push(Step {
            action,
            attrs,
            on_failure,
        });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkflowOutcome {
    Completed,
    /// A step was rejected. Later steps were not sent.
    Failed {
        action: &'static str,
        /// The rollback command was sent (and whether the remote accepted it).
        rolled_back: Option<bool>,
        /// The failed step stopped the workflow before touching the cache.
        aborted: bool,
    },
}

impl WorkflowOutcome {
    /// True when the workflow must not be followed by a reconciling read.
    pub fn is_aborted(&self) -> bool {
        matches!(self, WorkflowOutcome::Failed { aborted: true, .. })
    }
}
