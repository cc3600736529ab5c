//! Orchestrator - owns one task's lifecycle.
//!
//! Acquires the task's sandbox, drives planning, runs the step loop with
//! executor and critic, records every transition as an event, and
//! releases the sandbox on every terminating path. Within one task
//! execution is strictly sequential; the critic's splice semantics and
//! single-sandbox ownership depend on it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use overseer_core::critic::{Critic, CriticReview};
use overseer_core::executor::Executor;
use overseer_core::planner::{PlanError, Planner};
use overseer_core::store::{EventStore, StoreError, TaskStore};
use overseer_core::tool::{ExecutionContext, ToolDescriptor, ToolRegistry};
use overseer_core::types::{
    Plan, StepStatus, Task, TaskEvent, TaskEventKind, TaskStatus,
};
use overseer_sandbox::{SandboxError, SandboxLifecycle};
use overseer_stores::{EventBus, TaskEventMessage};

/// Ceiling on step output embedded in step_completed event payloads.
const EVENT_OUTPUT_PREVIEW_CHARS: usize = 500;

/// Orchestrator errors - only planning, sandbox, and infrastructure
/// failures propagate to the worker; tool failures are step results.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("planning failed: {0}")]
    Planning(#[from] PlanError),

    #[error("sandbox failed: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

impl OrchestrateError {
    /// Whether the worker's job-level retry applies. Planning and
    /// sandbox failures are fatal to the task; only infrastructure
    /// failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestrateError::Store(_))
    }
}

/// How a task run ended when no error propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunOutcome {
    /// Every step completed
    Succeeded,
    /// At least one step failed; `task_failed` is true when a required
    /// step failed and aborted the loop.
    CompletedWithFailures { task_failed: bool },
    /// Cancellation observed mid-run
    Cancelled,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Default per-step timeout handed to tools
    pub step_timeout: Duration,
    /// Cap on correction rounds per task; corrections past it are dropped
    pub max_correction_rounds: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_correction_rounds: 3,
        }
    }
}

/// Orchestrator - wires sandbox + planner + executor + critic for one
/// task at a time. One instance is shared across worker jobs; all
/// per-task state lives in the task record.
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    sandboxes: Arc<dyn SandboxLifecycle>,
    planner: Arc<dyn Planner>,
    critic: Option<Arc<dyn Critic>>,
    executor: Executor,
    task_store: Arc<dyn TaskStore>,
    event_store: Arc<dyn EventStore>,
    event_bus: Arc<dyn EventBus>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create a new orchestrator. Pass `critic: None` to disable the
    /// critique loop entirely.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ToolRegistry>,
        sandboxes: Arc<dyn SandboxLifecycle>,
        planner: Arc<dyn Planner>,
        critic: Option<Arc<dyn Critic>>,
        task_store: Arc<dyn TaskStore>,
        event_store: Arc<dyn EventStore>,
        event_bus: Arc<dyn EventBus>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = Executor::new(registry.clone());
        Self {
            registry,
            sandboxes,
            planner,
            critic,
            executor,
            task_store,
            event_store,
            event_bus,
            config,
        }
    }

    /// Drive one task from running to a terminal status.
    pub async fn run(
        &self,
        task_id: &str,
        cancel: CancellationToken,
    ) -> Result<TaskRunOutcome, OrchestrateError> {
        let mut task = self
            .task_store
            .load(task_id)
            .await?
            .ok_or_else(|| OrchestrateError::TaskNotFound(task_id.to_string()))?;

        task.start();
        self.task_store.save(&task).await?;
        self.emit(task_id, TaskEventKind::TaskStarted, json!({"goal": task.goal}))
            .await?;
        tracing::info!(task_id = %task_id, "task started");

        // One sandbox per task, named after the task ID.
        let sandbox = match self.sandboxes.create(task_id, &cancel).await {
            Ok(sandbox) => sandbox,
            Err(SandboxError::Cancelled) => {
                task.finish(TaskStatus::Cancelled, None);
                self.task_store.save(&task).await?;
                return Ok(TaskRunOutcome::Cancelled);
            }
            Err(err) => {
                self.emit(
                    task_id,
                    TaskEventKind::OrchestrationFailed,
                    json!({"stage": "sandbox", "error": err.to_string()}),
                )
                .await?;
                task.finish(TaskStatus::Failed, Some(format!("sandbox creation failed: {}", err)));
                self.task_store.save(&task).await?;
                return Err(err.into());
            }
        };
        self.emit(
            task_id,
            TaskEventKind::SandboxCreated,
            json!({"sandbox_id": sandbox.id, "ports": sandbox.ports}),
        )
        .await?;

        // Every path past this point releases the sandbox.
        let result = self.plan_and_execute(&mut task, &sandbox.id, &cancel).await;
        self.release_sandbox(task_id).await;
        result
    }

    async fn plan_and_execute(
        &self,
        task: &mut Task,
        sandbox_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TaskRunOutcome, OrchestrateError> {
        let task_id = task.id.clone();
        let tools = self.registry.describe();

        self.emit(&task_id, TaskEventKind::PlanningStarted, Value::Null)
            .await?;
        let planned = tokio::select! {
            planned = self.planner.plan(&task.goal, &task.context, &tools) => planned,
            _ = cancel.cancelled() => {
                task.finish(TaskStatus::Cancelled, None);
                self.task_store.save(task).await?;
                return Ok(TaskRunOutcome::Cancelled);
            }
        };
        let steps = match planned {
            Ok(steps) => steps,
            Err(err) => {
                self.emit(
                    &task_id,
                    TaskEventKind::OrchestrationFailed,
                    json!({"stage": "planning", "error": err.to_string()}),
                )
                .await?;
                task.finish(TaskStatus::Failed, Some(format!("planning failed: {}", err)));
                self.task_store.save(task).await?;
                return Err(err.into());
            }
        };

        let mut plan = Plan::new(task.goal.clone(), steps);
        task.set_plan(plan.clone());
        self.task_store.save(task).await?;
        self.emit(&task_id, TaskEventKind::PlanGenerated, plan_summary(&plan))
            .await?;

        self.emit(&task_id, TaskEventKind::ExecutionStarted, Value::Null)
            .await?;

        let mut index = 0;
        let mut correction_rounds = 0u32;
        let mut required_failure = false;
        let mut cancelled = false;

        while index < plan.steps.len() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let step = plan.steps[index].clone();
            self.emit(
                &task_id,
                TaskEventKind::StepStarted,
                json!({"step_id": step.id, "tool": step.tool, "description": step.description}),
            )
            .await?;

            let ctx = ExecutionContext::new(sandbox_id, task_id.clone())
                .with_default_timeout(self.config.step_timeout)
                .with_cancellation(cancel.clone());

            // In-flight tool calls are abandoned on cancellation, not
            // aborted inside the sandbox.
            let settled = tokio::select! {
                settled = self.executor.execute_step(step, &ctx) => settled,
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            };

            let succeeded = settled.status == StepStatus::Completed;
            let step_required = settled.required;
            let preview = settled
                .result
                .as_ref()
                .map(|r| truncate_chars(&r.output, EVENT_OUTPUT_PREVIEW_CHARS))
                .unwrap_or_default();
            let step_error = settled
                .result
                .as_ref()
                .and_then(|r| r.error.clone());

            if let Some(result) = &settled.result {
                task.artifacts.extend(result.artifacts.iter().cloned());
            }
            let settled_id = settled.id.clone();
            plan.steps[index] = settled;
            task.set_plan(plan.clone());
            self.task_store.save(task).await?;
            self.emit(
                &task_id,
                TaskEventKind::StepCompleted,
                json!({
                    "step_id": settled_id,
                    "success": succeeded,
                    "output": preview,
                    "error": step_error,
                }),
            )
            .await?;

            if let Some(critic) = &self.critic {
                correction_rounds += self
                    .consult_critic(task, &mut plan, critic.as_ref(), &tools, index, correction_rounds)
                    .await?;
            }

            if !succeeded && step_required {
                self.emit(
                    &task_id,
                    TaskEventKind::ExecutionStopped,
                    json!({"step_id": settled_id, "reason": "required step failed"}),
                )
                .await?;
                required_failure = true;
                break;
            }

            index += 1;
        }

        if cancelled {
            tracing::info!(task_id = %task_id, "task cancelled mid-run");
            task.finish(TaskStatus::Cancelled, None);
            self.task_store.save(task).await?;
            return Ok(TaskRunOutcome::Cancelled);
        }

        if plan.all_completed() {
            self.emit(&task_id, TaskEventKind::TaskSucceeded, Value::Null)
                .await?;
            task.finish(TaskStatus::Succeeded, None);
            self.task_store.save(task).await?;
            return Ok(TaskRunOutcome::Succeeded);
        }

        let failed_steps: Vec<&str> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.id.as_str())
            .collect();
        self.emit(
            &task_id,
            TaskEventKind::TaskCompletedWithFailures,
            json!({"failed_steps": failed_steps}),
        )
        .await?;

        if required_failure {
            let detail = failed_steps.join(", ");
            task.finish(
                TaskStatus::Failed,
                Some(format!("required step failed: {}", detail)),
            );
        } else {
            // Non-required failures do not fail the task.
            task.finish(TaskStatus::Succeeded, None);
        }
        self.task_store.save(task).await?;
        Ok(TaskRunOutcome::CompletedWithFailures {
            task_failed: required_failure,
        })
    }

    /// Run the critic for the step at `index`; splice any corrections in
    /// directly after it. Returns 1 when a correction round was applied.
    /// Critic failures are logged and ignored.
    async fn consult_critic(
        &self,
        task: &mut Task,
        plan: &mut Plan,
        critic: &dyn Critic,
        tools: &[ToolDescriptor],
        index: usize,
        rounds_so_far: u32,
    ) -> Result<u32, OrchestrateError> {
        let task_id = task.id.clone();
        let verdict = {
            let review = CriticReview {
                goal: &task.goal,
                plan,
                executed: plan.steps.iter().filter(|s| s.is_settled()).collect(),
                tools,
            };
            match critic.evaluate(review).await {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::warn!(task_id = %task_id, error = %err, "critic failed, continuing without correction");
                    return Ok(0);
                }
            }
        };

        self.emit(
            &task_id,
            TaskEventKind::CriticEvaluation,
            json!({
                "on_track": verdict.evaluation.on_track,
                "confidence": verdict.evaluation.confidence,
                "issues": verdict.evaluation.issues,
                "suggestions": verdict.evaluation.suggestions,
            }),
        )
        .await?;

        if verdict.corrections.is_empty() {
            return Ok(0);
        }
        if rounds_so_far >= self.config.max_correction_rounds {
            tracing::warn!(
                task_id = %task_id,
                cap = self.config.max_correction_rounds,
                "correction cap reached, dropping corrective steps"
            );
            return Ok(0);
        }

        let inserted = plan.splice_after(index, verdict.corrections);
        task.set_plan(plan.clone());
        self.task_store.save(task).await?;
        self.emit(
            &task_id,
            TaskEventKind::CorrectionApplied,
            json!({"step_ids": inserted}),
        )
        .await?;
        tracing::info!(task_id = %task_id, inserted = inserted.len(), "correction spliced into plan");
        Ok(1)
    }

    /// Destroy the task's sandbox and append sandbox_destroyed. Destroy
    /// failures are logged, never surfaced; the event is appended
    /// regardless so create/destroy pair up in the log.
    async fn release_sandbox(&self, task_id: &str) {
        match self.sandboxes.destroy(task_id).await {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(task_id = %task_id, error = %err, "sandbox destroy failed");
            }
        }
        if let Err(err) = self
            .emit(task_id, TaskEventKind::SandboxDestroyed, Value::Null)
            .await
        {
            tracing::warn!(task_id = %task_id, error = %err, "failed to record sandbox_destroyed");
        }
    }

    /// Append an event to the store and push it to live subscribers.
    /// Store append failures propagate (infrastructure); bus delivery is
    /// best-effort.
    async fn emit(
        &self,
        task_id: &str,
        kind: TaskEventKind,
        data: Value,
    ) -> Result<(), StoreError> {
        let event = TaskEvent::new(kind, data);
        self.event_store.append(task_id, event.clone()).await?;
        if let Err(err) = self
            .event_bus
            .publish(TaskEventMessage {
                task_id: task_id.to_string(),
                event,
            })
            .await
        {
            tracing::warn!(task_id = %task_id, error = %err, "event bus publish failed");
        }
        Ok(())
    }
}

fn plan_summary(plan: &Plan) -> Value {
    let steps: Vec<Value> = plan
        .steps
        .iter()
        .map(|s| json!({"id": s.id, "description": s.description}))
        .collect();
    json!({"step_count": plan.steps.len(), "steps": steps})
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use overseer_core::critic::{CriticError, CriticVerdict, Evaluation};
    use overseer_core::tool::{Tool, ToolOutcome};
    use overseer_core::types::Step;
    use overseer_sandbox::{Sandbox, SandboxStatus};
    use overseer_stores::{BroadcastEventBus, InMemoryEventStore, InMemoryTaskStore};

    struct OkTool;

    #[async_trait]
    impl Tool for OkTool {
        fn name(&self) -> &str {
            "ok"
        }
        fn description(&self) -> &str {
            "always succeeds"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, _arguments: &Value, _ctx: &ExecutionContext) -> ToolOutcome {
            ToolOutcome::ok("fine")
        }
    }

    struct BoomTool;

    #[async_trait]
    impl Tool for BoomTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, _arguments: &Value, _ctx: &ExecutionContext) -> ToolOutcome {
            ToolOutcome::fail("it broke")
        }
    }

    /// Cancels the task's token from inside the invocation, then stalls;
    /// the orchestrator must abandon the in-flight call.
    struct CancellingTool;

    #[async_trait]
    impl Tool for CancellingTool {
        fn name(&self) -> &str {
            "cancel_me"
        }
        fn description(&self) -> &str {
            "cancels its own task"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn invoke(&self, _arguments: &Value, ctx: &ExecutionContext) -> ToolOutcome {
            ctx.cancellation.cancel();
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolOutcome::ok("never reached in the run")
        }
    }

    struct StaticPlanner {
        steps: Vec<Step>,
    }

    #[async_trait]
    impl Planner for StaticPlanner {
        async fn plan(
            &self,
            _goal: &str,
            _context: &HashMap<String, Value>,
            _tools: &[ToolDescriptor],
        ) -> Result<Vec<Step>, PlanError> {
            Ok(self.steps.clone())
        }
    }

    struct FailingPlanner;

    #[async_trait]
    impl Planner for FailingPlanner {
        async fn plan(
            &self,
            _goal: &str,
            _context: &HashMap<String, Value>,
            _tools: &[ToolDescriptor],
        ) -> Result<Vec<Step>, PlanError> {
            Err(PlanError::Llm("connection refused".to_string()))
        }
    }

    /// Emits one corrective verdict after the given step, on-track
    /// otherwise.
    struct CorrectingCritic {
        after_step: String,
        correction: Step,
        fired: AtomicUsize,
    }

    #[async_trait]
    impl Critic for CorrectingCritic {
        async fn evaluate(&self, review: CriticReview<'_>) -> Result<CriticVerdict, CriticError> {
            let last = review.executed.last().map(|s| s.id.clone()).unwrap_or_default();
            if last == self.after_step && self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(CriticVerdict {
                    evaluation: Evaluation {
                        on_track: false,
                        issues: vec!["step drifted".to_string()],
                        suggestions: Vec::new(),
                        confidence: 0.9,
                    },
                    corrections: vec![self.correction.clone()],
                });
            }
            Ok(CriticVerdict {
                evaluation: Evaluation {
                    on_track: true,
                    issues: Vec::new(),
                    suggestions: Vec::new(),
                    confidence: 0.8,
                },
                corrections: Vec::new(),
            })
        }
    }

    struct NullSandbox {
        creates: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl NullSandbox {
        fn new() -> Self {
            Self {
                creates: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SandboxLifecycle for NullSandbox {
        async fn create(
            &self,
            sandbox_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<Sandbox, SandboxError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now();
            let mut ports = HashMap::new();
            ports.insert("shell".to_string(), 40001u16);
            ports.insert("file".to_string(), 40003u16);
            Ok(Sandbox {
                id: sandbox_id.to_string(),
                container_id: format!("overseer-sandbox-{}", sandbox_id),
                status: SandboxStatus::Running,
                created_at: now,
                ports,
                destroy_deadline: now + chrono::Duration::hours(1),
            })
        }

        async fn destroy(&self, _sandbox_id: &str) -> Result<bool, SandboxError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        task_store: Arc<InMemoryTaskStore>,
        event_store: Arc<InMemoryEventStore>,
        sandboxes: Arc<NullSandbox>,
    }

    fn harness(planner: Arc<dyn Planner>, critic: Option<Arc<dyn Critic>>) -> Harness {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(OkTool));
        registry.register(Arc::new(BoomTool));
        registry.register(Arc::new(CancellingTool));
        let registry = Arc::new(registry);

        let task_store = Arc::new(InMemoryTaskStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let sandboxes = Arc::new(NullSandbox::new());

        let orchestrator = Orchestrator::new(
            registry,
            sandboxes.clone(),
            planner,
            critic,
            task_store.clone(),
            event_store.clone(),
            Arc::new(BroadcastEventBus::default()),
            OrchestratorConfig::default(),
        );
        Harness {
            orchestrator,
            task_store,
            event_store,
            sandboxes,
        }
    }

    async fn seeded_task(harness: &Harness, goal: &str) -> String {
        let task = Task::new(goal);
        harness.task_store.save(&task).await.unwrap();
        task.id
    }

    async fn event_kinds(harness: &Harness, task_id: &str) -> Vec<TaskEventKind> {
        harness
            .event_store
            .list(task_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_happy_path_emits_the_full_event_sequence() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![Step::new("s1", "ok", "first"), Step::new("s2", "ok", "second")],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "do two things").await;

            let outcome = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome, TaskRunOutcome::Succeeded);

            let kinds = event_kinds(&h, &task_id).await;
            assert_eq!(
                kinds,
                vec![
                    TaskEventKind::TaskStarted,
                    TaskEventKind::SandboxCreated,
                    TaskEventKind::PlanningStarted,
                    TaskEventKind::PlanGenerated,
                    TaskEventKind::ExecutionStarted,
                    TaskEventKind::StepStarted,
                    TaskEventKind::StepCompleted,
                    TaskEventKind::StepStarted,
                    TaskEventKind::StepCompleted,
                    TaskEventKind::TaskSucceeded,
                    TaskEventKind::SandboxDestroyed,
                ]
            );

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Succeeded);
            assert!(task.plan.unwrap().all_completed());
            assert_eq!(h.sandboxes.creates.load(Ordering::SeqCst), 1);
            assert_eq!(h.sandboxes.destroys.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_event_log_is_monotonic_in_time() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![Step::new("s1", "ok", "only")],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "one step").await;
            h.orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();

            let events = h.event_store.list(&task_id).await.unwrap();
            for pair in events.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        });
    }

    #[test]
    fn test_required_failure_stops_the_loop_and_fails_the_task() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![
                    Step::new("s1", "ok", "first"),
                    Step::new("s2", "boom", "second"),
                    Step::new("s3", "ok", "never runs"),
                ],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "fail in the middle").await;

            let outcome = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(
                outcome,
                TaskRunOutcome::CompletedWithFailures { task_failed: true }
            );

            let kinds = event_kinds(&h, &task_id).await;
            assert!(kinds.contains(&TaskEventKind::ExecutionStopped));
            assert!(kinds.contains(&TaskEventKind::TaskCompletedWithFailures));
            assert!(!kinds.contains(&TaskEventKind::TaskSucceeded));
            assert_eq!(*kinds.last().unwrap(), TaskEventKind::SandboxDestroyed);

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert!(task.error.unwrap().contains("required step failed"));
            let plan = task.plan.unwrap();
            assert_eq!(plan.get_step("s2").unwrap().status, StepStatus::Failed);
            // A pending step only survives when a required failure aborted the loop.
            assert_eq!(plan.get_step("s3").unwrap().status, StepStatus::Pending);
        });
    }

    #[test]
    fn test_non_required_failure_still_succeeds_the_task() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![Step::new("s1", "boom", "optional probe").optional()],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "optional failure").await;

            let outcome = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(
                outcome,
                TaskRunOutcome::CompletedWithFailures { task_failed: false }
            );

            let kinds = event_kinds(&h, &task_id).await;
            assert!(kinds.contains(&TaskEventKind::TaskCompletedWithFailures));
            assert!(!kinds.contains(&TaskEventKind::ExecutionStopped));

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Succeeded);
        });
    }

    #[test]
    fn test_critic_correction_is_spliced_and_executes_next() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![Step::new("s1", "ok", "first"), Step::new("s2", "ok", "second")],
            });
            let critic = Arc::new(CorrectingCritic {
                after_step: "s1".to_string(),
                correction: Step::new("fix-1", "ok", "repair the drift"),
                fired: AtomicUsize::new(0),
            });
            let h = harness(planner, Some(critic));
            let task_id = seeded_task(&h, "correct me").await;

            let outcome = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome, TaskRunOutcome::Succeeded);

            let kinds = event_kinds(&h, &task_id).await;
            assert!(kinds.contains(&TaskEventKind::CriticEvaluation));
            assert!(kinds.contains(&TaskEventKind::CorrectionApplied));

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            let plan = task.plan.unwrap();
            let ids: Vec<_> = plan.steps.iter().map(|s| s.id.as_str()).collect();
            // The corrective step lands between s1 and the remaining originals.
            assert_eq!(ids, vec!["s1", "fix-1", "s2"]);
            assert!(plan.all_completed());

            // Step IDs stay unique after splicing.
            let mut seen = std::collections::HashSet::new();
            assert!(plan.steps.iter().all(|s| seen.insert(s.id.clone())));
        });
    }

    #[test]
    fn test_disabled_critic_emits_no_critic_events() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![Step::new("s1", "ok", "only")],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "no critic").await;
            h.orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();

            let kinds = event_kinds(&h, &task_id).await;
            assert!(!kinds.contains(&TaskEventKind::CriticEvaluation));
            assert!(!kinds.contains(&TaskEventKind::CorrectionApplied));
        });
    }

    #[test]
    fn test_cancellation_mid_step_abandons_and_destroys() {
        tokio_test::block_on(async {
            let planner = Arc::new(StaticPlanner {
                steps: vec![
                    Step::new("s1", "ok", "first"),
                    Step::new("s2", "cancel_me", "second"),
                    Step::new("s3", "ok", "never runs"),
                ],
            });
            let h = harness(planner, None);
            let task_id = seeded_task(&h, "cancel me").await;

            let outcome = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome, TaskRunOutcome::Cancelled);

            let kinds = event_kinds(&h, &task_id).await;
            // step_started for s2 was recorded, step_completed was not.
            let started = kinds
                .iter()
                .filter(|k| **k == TaskEventKind::StepStarted)
                .count();
            let completed = kinds
                .iter()
                .filter(|k| **k == TaskEventKind::StepCompleted)
                .count();
            assert_eq!(started, 2);
            assert_eq!(completed, 1);
            assert!(!kinds.contains(&TaskEventKind::TaskSucceeded));
            assert_eq!(*kinds.last().unwrap(), TaskEventKind::SandboxDestroyed);

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Cancelled);
            assert_eq!(h.sandboxes.destroys.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_planner_failure_fails_the_task_with_planning_error() {
        tokio_test::block_on(async {
            let h = harness(Arc::new(FailingPlanner), None);
            let task_id = seeded_task(&h, "unplannable").await;

            let err = h
                .orchestrator
                .run(&task_id, CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, OrchestrateError::Planning(_)));
            assert!(!err.is_retryable());

            let kinds = event_kinds(&h, &task_id).await;
            let planning_at = kinds
                .iter()
                .position(|k| *k == TaskEventKind::PlanningStarted)
                .unwrap();
            let failed_at = kinds
                .iter()
                .position(|k| *k == TaskEventKind::OrchestrationFailed)
                .unwrap();
            assert!(planning_at < failed_at);
            assert_eq!(*kinds.last().unwrap(), TaskEventKind::SandboxDestroyed);

            let task = h.task_store.load(&task_id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert!(task.error.unwrap().contains("planning"));
        });
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        tokio_test::block_on(async {
            let h = harness(
                Arc::new(StaticPlanner { steps: Vec::new() }),
                None,
            );
            let err = h
                .orchestrator
                .run("ghost", CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, OrchestrateError::TaskNotFound(_)));
        });
    }
}
