use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    Result, ScrapeError,
    common::Vars,
    executor::{ExecutorResult, TemplateExecutor},
    model::{StepModel, TemplateModel, WorkflowModel},
    resolver,
    runtime::{ExecutionContext, StepScope},
    workflow::retry,
};

/// Progress of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running(usize),
    Succeeded,
    Failed(usize),
}

/// Audit entry for one step of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub template: String,
    pub attempts: u32,
    pub success: bool,
    pub error: Option<ScrapeError>,
    /// inputs after resolution, empty when resolution failed
    pub input: Vars,
}

/// A finished run: its final state, its context and the final step's result.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub state: RunState,
    pub context: ExecutionContext,
    pub result: ExecutorResult,
}

/// Runs workflow steps in order, feeding extracted values to later steps.
#[derive(Clone)]
pub struct WorkflowEngine {
    executor: TemplateExecutor,
}

enum Attempt {
    Done(ExecutorResult, Vars, u32),
    Exhausted(ExecutorResult, ScrapeError, u32),
}

impl WorkflowEngine {
    pub fn new(executor: TemplateExecutor) -> Self {
        Self {
            executor,
        }
    }

    pub fn executor(&self) -> &TemplateExecutor {
        &self.executor
    }

    pub async fn run(
        &self,
        workflow: &WorkflowModel,
        params: Vars,
    ) -> WorkflowRun {
        let mut context = ExecutionContext::new(params);
        let mut outcomes: Vec<StepOutcome> = Vec::new();
        info!("workflow::run({}, {})", workflow.name, context.run_id());

        if workflow.steps.is_empty() {
            return WorkflowRun {
                state: RunState::Failed(0),
                context,
                result: ExecutorResult::failure(ScrapeError::ConfigurationError(format!("workflow '{}' has no steps", workflow.name))),
            };
        }

        let mut last = ExecutorResult::default();
        for (i, step) in workflow.steps.iter().enumerate() {
            let state = RunState::Running(i);
            debug!("workflow::run({}) {:?} step '{}'", workflow.name, state, step.name);

            let template = match self.executor.store().get_template(&step.template_ref) {
                Ok(template) => template,
                Err(err) => return Self::abort(i, step, 0, Vars::new(), err, context, outcomes),
            };
            let input = match context.resolve_vars(&step.input) {
                Ok(input) => input,
                Err(err) => return Self::abort(i, step, 0, Vars::new(), err, context, outcomes),
            };

            match self.attempt(step, &template, &input).await {
                Attempt::Done(result, extracted, attempts) => {
                    outcomes.push(StepOutcome {
                        name: step.name.clone(),
                        template: template.name.clone(),
                        attempts,
                        success: true,
                        error: None,
                        input: input.clone(),
                    });
                    let scope = StepScope {
                        params: input,
                        extracted,
                        data: result.data.clone(),
                    };
                    if let Err(err) = context.add_step(&step.name, scope) {
                        outcomes.pop();
                        return Self::abort(i, step, attempts, Vars::new(), err, context, outcomes);
                    }
                    last = result;

                    if i + 1 < workflow.steps.len() {
                        let pause = retry::jitter(&step.sleep);
                        if !pause.is_zero() {
                            debug!("workflow::run({}) pausing {:?} after step '{}'", workflow.name, pause, step.name);
                            tokio::time::sleep(pause).await;
                        }
                    }
                }
                Attempt::Exhausted(mut result, last_error, attempts) => {
                    warn!("workflow::run({}) step '{}' failed after {} attempt(s): {}", workflow.name, step.name, attempts, last_error);
                    let err = ScrapeError::RetryExhausted {
                        step: step.name.clone(),
                        attempts,
                        last_error: last_error.to_string(),
                    };
                    outcomes.push(StepOutcome {
                        name: step.name.clone(),
                        template: template.name.clone(),
                        attempts,
                        success: false,
                        error: Some(last_error),
                        input,
                    });
                    result.success = false;
                    result.error = Some(err);
                    result.steps = outcomes;
                    return WorkflowRun {
                        state: RunState::Failed(i),
                        context,
                        result,
                    };
                }
            }
        }

        info!("workflow::run({}) succeeded", workflow.name);
        last.steps = outcomes;
        WorkflowRun {
            state: RunState::Succeeded,
            context,
            result: last,
        }
    }

    /// Try the step up to `retry` times, sleeping between attempts.
    async fn attempt(
        &self,
        step: &StepModel,
        template: &TemplateModel,
        input: &Vars,
    ) -> Attempt {
        let mut attempt = 1;
        loop {
            debug!("workflow::attempt({}) {}/{}", step.name, attempt, step.retry);
            let mut result = self.executor.execute(template, input).await;

            let failure = match result.error.clone() {
                Some(err) => err,
                None => match Self::extract(step, &result) {
                    Ok(extracted) => return Attempt::Done(result, extracted, attempt),
                    Err(err) => {
                        result.success = false;
                        result.error = Some(err.clone());
                        err
                    }
                },
            };

            if attempt >= step.retry {
                return Attempt::Exhausted(result, failure, attempt);
            }
            debug!("workflow::attempt({}) failed: {}", step.name, failure);
            let pause = retry::jitter(&step.sleep);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            attempt += 1;
        }
    }

    /// Resolve the step's `extract` map against the response data, then the raw response.
    fn extract(
        step: &StepModel,
        result: &ExecutorResult,
    ) -> Result<Vars> {
        step.extract
            .iter()
            .map(|(key, expr)| {
                let value = resolver::resolve_value(&result.data, expr).or_else(|err| match &result.raw_response {
                    Value::Null => Err(err),
                    raw => resolver::resolve_value(raw, expr).map_err(|_| err),
                })?;
                Ok((key.clone(), value))
            })
            .collect()
    }

    fn abort(
        i: usize,
        step: &StepModel,
        attempts: u32,
        input: Vars,
        err: ScrapeError,
        context: ExecutionContext,
        mut outcomes: Vec<StepOutcome>,
    ) -> WorkflowRun {
        warn!("workflow::run step '{}' aborted: {}", step.name, err);
        outcomes.push(StepOutcome {
            name: step.name.clone(),
            template: step.template_ref.clone(),
            attempts,
            success: false,
            error: Some(err.clone()),
            input,
        });
        let mut result = ExecutorResult::failure(err);
        result.steps = outcomes;
        WorkflowRun {
            state: RunState::Failed(i),
            context,
            result,
        }
    }
}
