use crate::error::Result;
use crate::registry::CapabilityDescriptor;
use crate::session::{SessionState, WorkflowInstance, WorkflowStage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Read-only view of the loaded dataset, supplied by the hosting
/// application on every message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetContext {
    pub columns: Vec<String>,
    pub data_loaded: bool,
    pub analysis_complete: bool,
}

impl DatasetContext {
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            data_loaded: true,
            analysis_complete: false,
        }
    }
}

/// Everything a tool may read while deciding whether (and how) to handle
/// a message. Tools never mutate the session directly; state changes travel
/// back to the coordinator inside [`ToolResult`].
pub struct ToolContext<'a> {
    pub dataset: &'a DatasetContext,
    pub session: &'a SessionState,
}

/// A resolved invocation handed to a tool by the coordinator.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub message: String,
    pub arguments: HashMap<String, Value>,
}

impl ToolRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_arguments(message: impl Into<String>, arguments: HashMap<String, Value>) -> Self {
        Self {
            message: message.into(),
            arguments,
        }
    }

    pub fn argument_str(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }
}

/// Session mutation requested by a tool, applied by the coordinator only
/// after the tool call succeeds. Keeps a failed turn from leaving a
/// half-advanced workflow behind.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowUpdate {
    /// Start or advance the session's active workflow.
    Set(WorkflowInstance),
    /// The workflow reached a terminal stage.
    Clear,
}

/// What a tool produced for one turn.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The one human-readable message for this turn.
    pub message: String,
    /// Renderable payload (chart spec, map layers) for the front end.
    pub visualization: Option<Value>,
    /// Structured data accompanying the message.
    pub data: Option<Value>,
    /// The tool understood the intent but needs more input before it can run.
    pub requires_additional_arguments: bool,
    /// Workflow state change for the coordinator to apply.
    pub workflow: Option<WorkflowUpdate>,
    /// Variable the user operated on this turn, recorded for pronoun
    /// resolution ("map it again").
    pub variable_reference: Option<String>,
}

impl ToolResult {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: text.into(),
            visualization: None,
            data: None,
            requires_additional_arguments: false,
            workflow: None,
            variable_reference: None,
        }
    }

    /// An "I need more input" outcome. Not an error: the message carries a
    /// clarifying question and no state is advanced.
    pub fn clarification(text: impl Into<String>) -> Self {
        let mut result = Self::message(text);
        result.requires_additional_arguments = true;
        result
    }

    pub fn with_visualization(mut self, payload: Value) -> Self {
        self.visualization = Some(payload);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_workflow(mut self, update: WorkflowUpdate) -> Self {
        self.workflow = Some(update);
        self
    }

    pub fn with_variable_reference(mut self, variable: impl Into<String>) -> Self {
        self.variable_reference = Some(variable.into());
        self
    }
}

/// Snapshot captured when a guided workflow is paused. Enough to regenerate
/// the "where were we" prompt on resume without consulting anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub tool_name: String,
    pub stage: WorkflowStage,
    pub collected_selections: std::collections::BTreeMap<String, Value>,
}

/// Scoring refinement contributed by a tool for one resolution attempt.
/// This is where domain logic lives (column-name fuzzy matching, pronoun
/// referents, pending-slot recognition); the generic keyword scoring stays
/// in the resolver.
#[derive(Debug, Clone, Default)]
pub struct Refinement {
    pub bonus: f64,
    pub arguments: HashMap<String, Value>,
    pub matched_terms: Vec<String>,
    /// The tool would need a clarifying question before it can run.
    pub missing_arguments: bool,
}

/// A unit of capability the router can dispatch to.
///
/// `can_handle` and `refine` are pure with respect to their inputs: they are
/// called speculatively across every registered tool on every message and
/// must not observe or mutate anything beyond the supplied context.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    fn description(&self) -> &str;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn keywords(&self) -> &[String] {
        &self.descriptor().trigger_keywords
    }

    /// Whether this tool carries multi-step state that can be paused.
    fn pausable(&self) -> bool {
        false
    }

    /// Cheap, side-effect-free predicate: could this tool plausibly handle
    /// the message?
    fn can_handle(&self, message: &str, ctx: &ToolContext<'_>) -> bool;

    /// Tool-specific scoring refinement, invoked by the resolver once the
    /// generic keyword score shows any textual evidence for this tool.
    fn refine(
        &self,
        _tokens: &[String],
        _message: &str,
        _ctx: &ToolContext<'_>,
        _scoring: &crate::config::ScoringConfig,
    ) -> Refinement {
        Refinement::default()
    }

    /// Fast path for guided workflows: does this bare message answer the
    /// pending slot of the given (active, unpaused) workflow instance?
    fn match_pending_slot(
        &self,
        _message: &str,
        _workflow: &WorkflowInstance,
    ) -> Option<(String, Value)> {
        None
    }

    /// Perform the tool's work. "I don't understand" is not a failure: it
    /// comes back as a clarification result. `Err` is reserved for genuine
    /// execution failures and is never silently swallowed by the caller.
    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext<'_>) -> Result<ToolResult>;

    /// Capture resumable state. Stateless tools return `None`.
    fn pause(&self, _workflow: &WorkflowInstance) -> Option<WorkflowSnapshot> {
        None
    }

    /// Restore from a pause snapshot and produce a "continuing where we left
    /// off" prompt. Must be deterministic for an unchanged snapshot.
    /// Stateless tools keep the default, which simply says there is nothing
    /// to resume.
    async fn resume(
        &self,
        _snapshot: &WorkflowSnapshot,
        _ctx: &ToolContext<'_>,
    ) -> Result<ToolResult> {
        Ok(ToolResult::message(format!(
            "{} runs in a single step; there is nothing to resume.",
            self.name()
        )))
    }
}
