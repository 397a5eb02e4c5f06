use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::log_route;
use crate::observability::RouterMetrics;
use crate::registry::ToolRegistry;
use crate::resolver::{IntentResolver, ToolResolution};
use crate::session::{SessionState, SessionStore, WorkflowStage};
use crate::tool::{
    DatasetContext, Tool, ToolContext, ToolRequest, ToolResult, WorkflowUpdate,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Reminder appended to a response when a deviating message paused the
/// active workflow.
const RESUME_REMINDER: &str =
    "Your workflow progress is saved. Say 'continue' when you're ready to pick it back up.";

/// What `route_message` produced for one turn.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A tool handled the message; this is the response.
    Handled(ToolResult),
    /// No deterministic match: the caller should hand the message to its
    /// reasoning collaborator. Not an error.
    Fallback,
}

/// Derived view of a session's workflow situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    NoActiveWorkflow,
    WorkflowActive(WorkflowStage),
    WorkflowPaused(WorkflowStage),
}

impl RouterState {
    pub fn of(session: &SessionState) -> Self {
        match &session.active_workflow {
            None => RouterState::NoActiveWorkflow,
            Some(w) if w.is_paused => {
                RouterState::WorkflowPaused(w.pause_stage.unwrap_or(w.stage))
            }
            Some(w) => RouterState::WorkflowActive(w.stage),
        }
    }
}

/// Top-level orchestration: one instance per process, handling one session's
/// message at a time. Loads the session record, asks the resolver for a
/// proposal, runs the workflow pause/resume state machine, executes the
/// chosen tool and persists the session again.
pub struct Coordinator {
    registry: Arc<ToolRegistry>,
    resolver: IntentResolver,
    store: SessionStore,
    metrics: Arc<RouterMetrics>,
    config: RouterConfig,
}

impl Coordinator {
    pub fn new(registry: Arc<ToolRegistry>, store: SessionStore, config: RouterConfig) -> Self {
        let resolver = IntentResolver::new(config.scoring.clone());
        Self {
            registry,
            resolver,
            store,
            metrics: Arc::new(RouterMetrics::new()),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The single entry point: routes one user message for one session.
    ///
    /// Either the whole turn's session mutation is applied and saved, or
    /// none of it is; a failing tool still gets its attempt recorded in the
    /// history, but never advances the workflow.
    pub async fn route_message(
        &self,
        session_id: &str,
        text: &str,
        dataset: &DatasetContext,
    ) -> Result<RouteOutcome> {
        let mut session = self.store.load_or_create(session_id).await?;

        if let Some(outcome) = self
            .try_resume(&mut session, text, dataset)
            .await?
        {
            return Ok(outcome);
        }

        let ctx = ToolContext {
            dataset,
            session: &session,
        };
        let Some(resolution) = self.resolver.resolve(text, &self.registry, &ctx) else {
            self.metrics.record_fallback();
            tracing::info!(
                target: "router",
                session = session_id,
                "no deterministic match; deferring to reasoning fallback"
            );
            return Ok(RouteOutcome::Fallback);
        };
        self.metrics.record_resolution(resolution.confidence);

        let tool = self
            .registry
            .get(&resolution.tool_name)
            .cloned()
            .ok_or_else(|| {
                RouterError::Unknown(format!(
                    "resolved tool '{}' is not registered",
                    resolution.tool_name
                ))
            })?;

        // Hard precondition gate: the resolver only penalizes, the
        // coordinator refuses outright.
        if !tool.descriptor().preconditions_met(dataset) {
            log_route!(info, tool.name(), session = session_id, "precondition unmet");
            return Ok(RouteOutcome::Handled(ToolResult::clarification(
                precondition_guidance(tool.as_ref(), dataset),
            )));
        }

        let deviated = session
            .running_workflow()
            .map(|w| w.tool_name != resolution.tool_name)
            .unwrap_or(false);

        let request = ToolRequest::with_arguments(text, resolution.inferred_arguments.clone());
        let execution = {
            let ctx = ToolContext {
                dataset,
                session: &session,
            };
            tool.execute(&request, &ctx).await
        };

        match execution {
            Err(err) => {
                self.metrics.record_execution(false);
                // Record the attempt for diagnosability; nothing else moves.
                session.record_invocation(
                    &resolution.tool_name,
                    resolution.inferred_arguments.clone(),
                    self.config.history_limit,
                );
                self.store.save(&session).await?;
                log_route!(
                    error,
                    tool.name(),
                    session = session_id,
                    error = %err,
                    "tool execution failed"
                );
                Err(wrap_execution_error(tool.name(), err))
            }
            Ok(mut result) => {
                self.metrics.record_execution(true);
                if deviated {
                    if let Some(workflow) = session.active_workflow.as_mut() {
                        workflow.pause();
                        log_route!(
                            info,
                            tool.name(),
                            session = session_id,
                            paused = %workflow.tool_name,
                            "deviation paused the active workflow"
                        );
                    }
                    result.message.push_str(" ");
                    result.message.push_str(RESUME_REMINDER);
                }
                self.apply_result(&mut session, &resolution, &result);
                self.store.save(&session).await?;
                log_route!(
                    info,
                    tool.name(),
                    session = session_id,
                    confidence = resolution.confidence,
                    "tool handled message"
                );
                Ok(RouteOutcome::Handled(result))
            }
        }
    }

    /// Resumes a paused workflow when the message asks for it, either with
    /// an explicit resume keyword or by invoking the workflow tool again.
    async fn try_resume(
        &self,
        session: &mut SessionState,
        text: &str,
        dataset: &DatasetContext,
    ) -> Result<Option<RouteOutcome>> {
        let Some(paused) = session.paused_workflow().cloned() else {
            return Ok(None);
        };
        let tool = self.registry.get(&paused.tool_name).cloned().ok_or_else(|| {
            RouterError::Unknown(format!(
                "paused workflow tool '{}' is not registered",
                paused.tool_name
            ))
        })?;

        // Whole-token matching: "discontinued" must not count as "continue".
        let tokens = crate::resolver::tokenize(text);
        let keyword_resume = self.config.resume_keywords.iter().any(|keyword| {
            let phrase = crate::resolver::tokenize(keyword);
            !phrase.is_empty()
                && tokens
                    .windows(phrase.len())
                    .any(|window| window == phrase.as_slice())
        });
        let re_match = {
            let ctx = ToolContext {
                dataset,
                session: &*session,
            };
            tool.can_handle(text, &ctx)
        };
        if !keyword_resume && !re_match {
            return Ok(None);
        }

        let snapshot = tool.pause(&paused).ok_or_else(|| {
            RouterError::Unknown(format!(
                "workflow tool '{}' produced no pause snapshot",
                paused.tool_name
            ))
        })?;
        let resumption = {
            let ctx = ToolContext {
                dataset,
                session: &*session,
            };
            tool.resume(&snapshot, &ctx).await
        };
        match resumption {
            Err(err) => {
                self.metrics.record_execution(false);
                session.record_invocation(
                    tool.name(),
                    HashMap::new(),
                    self.config.history_limit,
                );
                self.store.save(session).await?;
                Err(wrap_execution_error(tool.name(), err))
            }
            Ok(result) => {
                self.metrics.record_execution(true);
                let mut arguments = HashMap::new();
                arguments.insert("resumed".to_string(), json!(true));
                let resolution = ToolResolution {
                    tool_name: tool.name().to_string(),
                    confidence: 1.0,
                    score: 1.0,
                    inferred_arguments: arguments,
                    requires_additional_arguments: false,
                    matched_terms: vec!["resume".to_string()],
                };
                self.apply_result(session, &resolution, &result);
                self.store.save(session).await?;
                log_route!(
                    info,
                    tool.name(),
                    session = %session.session_id,
                    stage = ?snapshot.stage,
                    "workflow resumed"
                );
                Ok(Some(RouteOutcome::Handled(result)))
            }
        }
    }

    fn apply_result(
        &self,
        session: &mut SessionState,
        resolution: &ToolResolution,
        result: &ToolResult,
    ) {
        match &result.workflow {
            Some(WorkflowUpdate::Set(instance)) => {
                if instance.stage.is_terminal() {
                    // Terminal stage: the workflow is done and gone.
                    session.active_workflow = None;
                } else {
                    session.active_workflow = Some(instance.clone());
                }
            }
            Some(WorkflowUpdate::Clear) => {
                session.active_workflow = None;
            }
            None => {}
        }
        if let Some(variable) = &result.variable_reference {
            session.note_variable(variable, self.config.recent_variables_limit);
        }
        session.record_invocation(
            &resolution.tool_name,
            resolution.inferred_arguments.clone(),
            self.config.history_limit,
        );
    }
}

fn precondition_guidance(tool: &dyn Tool, dataset: &DatasetContext) -> String {
    let descriptor = tool.descriptor();
    if descriptor.requires_data_loaded && !dataset.data_loaded {
        format!(
            "The {} tool needs a dataset to work with. Upload one first and try again.",
            tool.name()
        )
    } else {
        format!(
            "The {} tool builds on prior analysis results. Run an analysis first.",
            tool.name()
        )
    }
}

fn wrap_execution_error(tool: &str, err: RouterError) -> RouterError {
    match err {
        already @ RouterError::ToolExecution { .. } => already,
        other => RouterError::ToolExecution {
            tool: tool.to_string(),
            message: other.to_string(),
        },
    }
}
