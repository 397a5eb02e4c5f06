pub mod store;

pub use store::SessionStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

/// Which required input a guided workflow is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    AwaitingFacility,
    AwaitingAgeGroup,
    Calculating,
    Complete,
}

impl WorkflowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStage::Complete)
    }
}

/// State of one guided workflow run, carried inside the session record so
/// it survives process hops. Selections only ever grow within a run; a
/// completed workflow is never resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub tool_name: String,
    pub stage: WorkflowStage,
    pub collected_selections: BTreeMap<String, Value>,
    pub is_paused: bool,
    pub pause_stage: Option<WorkflowStage>,
}

impl WorkflowInstance {
    pub fn new(tool_name: impl Into<String>, initial: WorkflowStage) -> Self {
        Self {
            tool_name: tool_name.into(),
            stage: initial,
            collected_selections: BTreeMap::new(),
            is_paused: false,
            pause_stage: None,
        }
    }

    /// Suspend, remembering the stage to regenerate the "where were we"
    /// prompt from.
    pub fn pause(&mut self) {
        self.pause_stage = Some(self.stage);
        self.is_paused = true;
    }

    /// Undo a pause; the workflow picks up at the stage it was paused in.
    pub fn unpause(&mut self) {
        if let Some(stage) = self.pause_stage.take() {
            self.stage = stage;
        }
        self.is_paused = false;
    }
}

/// One recorded tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub timestamp_ms: i64,
    pub arguments: HashMap<String, Value>,
}

/// Per-session mutable record. Exclusively owned by the coordinator handling
/// the session's current message; loaded from and saved to the
/// [`SessionStore`] around each turn rather than kept in process memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Most recent invocations, oldest first, bounded FIFO.
    pub tool_history: VecDeque<ToolInvocation>,
    pub last_tool: Option<String>,
    /// Last data column the user operated on, for pronoun resolution.
    pub last_variable_reference: Option<String>,
    pub recent_variables: VecDeque<String>,
    /// Present iff a guided workflow has started and has not completed.
    pub active_workflow: Option<WorkflowInstance>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            tool_history: VecDeque::new(),
            last_tool: None,
            last_variable_reference: None,
            recent_variables: VecDeque::new(),
            active_workflow: None,
        }
    }

    pub fn new_random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Appends to the history in arrival order, evicting the oldest entry
    /// once `limit` is reached.
    pub fn record_invocation(
        &mut self,
        tool_name: &str,
        arguments: HashMap<String, Value>,
        limit: usize,
    ) {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        self.tool_history.push_back(ToolInvocation {
            tool_name: tool_name.to_string(),
            timestamp_ms,
            arguments,
        });
        while self.tool_history.len() > limit {
            self.tool_history.pop_front();
        }
        self.last_tool = Some(tool_name.to_string());
    }

    /// Remembers a referenced variable, most recent last, deduplicated.
    pub fn note_variable(&mut self, variable: &str, limit: usize) {
        self.recent_variables.retain(|v| v != variable);
        self.recent_variables.push_back(variable.to_string());
        while self.recent_variables.len() > limit {
            self.recent_variables.pop_front();
        }
        self.last_variable_reference = Some(variable.to_string());
    }

    /// The running (not paused) workflow, if any.
    pub fn running_workflow(&self) -> Option<&WorkflowInstance> {
        self.active_workflow.as_ref().filter(|w| !w.is_paused)
    }

    /// The paused workflow, if any.
    pub fn paused_workflow(&self) -> Option<&WorkflowInstance> {
        self.active_workflow.as_ref().filter(|w| w.is_paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_fifo() {
        let mut session = SessionState::new("s1");
        for i in 0..100 {
            session.record_invocation(&format!("tool-{i}"), HashMap::new(), 40);
        }
        assert_eq!(session.tool_history.len(), 40);
        // The 40 most recent, in arrival order.
        assert_eq!(session.tool_history.front().unwrap().tool_name, "tool-60");
        assert_eq!(session.tool_history.back().unwrap().tool_name, "tool-99");
        assert_eq!(session.last_tool.as_deref(), Some("tool-99"));
    }

    #[test]
    fn recent_variables_dedupe_and_bound() {
        let mut session = SessionState::new("s1");
        for name in ["a", "b", "a", "c"] {
            session.note_variable(name, 10);
        }
        let names: Vec<&str> = session.recent_variables.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);

        for i in 0..20 {
            session.note_variable(&format!("v{i}"), 10);
        }
        assert_eq!(session.recent_variables.len(), 10);
        assert_eq!(session.last_variable_reference.as_deref(), Some("v19"));
    }

    #[test]
    fn pause_and_unpause_restore_the_stage() {
        let mut workflow = WorkflowInstance::new("rate", WorkflowStage::AwaitingFacility);
        workflow.stage = WorkflowStage::AwaitingAgeGroup;
        workflow.pause();
        assert!(workflow.is_paused);
        assert_eq!(workflow.pause_stage, Some(WorkflowStage::AwaitingAgeGroup));

        workflow.unpause();
        assert!(!workflow.is_paused);
        assert_eq!(workflow.stage, WorkflowStage::AwaitingAgeGroup);
        assert_eq!(workflow.pause_stage, None);
    }

    #[test]
    fn workflow_accessors_respect_pause_flag() {
        let mut session = SessionState::new("s1");
        assert!(session.running_workflow().is_none());

        let mut workflow = WorkflowInstance::new("rate", WorkflowStage::AwaitingFacility);
        session.active_workflow = Some(workflow.clone());
        assert!(session.running_workflow().is_some());
        assert!(session.paused_workflow().is_none());

        workflow.pause();
        session.active_workflow = Some(workflow);
        assert!(session.running_workflow().is_none());
        assert!(session.paused_workflow().is_some());
    }
}
