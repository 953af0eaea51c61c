//! The step-bounded generate / execute-tools loop.

use polaris_core::{Message, Result};
use polaris_llm::{ModelHandle, Usage};
use polaris_mcp::ToolCatalog;
use tracing::{debug, info, trace, warn};

use crate::transcript::{StepObserver, StepRecord};

/// Where the loop is. Only used for tracing and the final summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Start,
    Generating,
    ExecutingTools,
    Stepping,
    Done,
    Failed,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered without requesting tools.
    Completed,
    /// `max_steps` generations were used up.
    StepLimit,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: Vec<StepRecord>,
    /// Full transcript including the initial messages.
    pub transcript: Vec<Message>,
    pub usage: Usage,
    pub finish: FinishReason,
    pub state: LoopState,
}

impl RunSummary {
    /// Text of the last step, the model's final word.
    pub fn final_text(&self) -> &str {
        self.steps.last().map(|s| s.text.as_str()).unwrap_or_default()
    }
}

/// Generation parameters for one run.
#[derive(Debug, Clone)]
pub struct StepLoop {
    model: ModelHandle,
    max_steps: u32,
    max_tokens: u32,
    temperature: f32,
}

impl StepLoop {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            max_steps: 1,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    /// Upper bound on generation calls. Zero is treated as one.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    fn transition(&self, state: &mut LoopState, next: LoopState, step: usize) {
        trace!(from = ?state, to = ?next, step, "loop state");
        *state = next;
    }

    /// Run until the model stops asking for tools or the step budget is spent.
    ///
    /// Tools requested by the last permitted generation are still executed
    /// and reported. Observer failures are logged and do not stop the run;
    /// generation failures do.
    pub async fn run(
        &self,
        mut transcript: Vec<Message>,
        catalog: &ToolCatalog,
        observer: &dyn StepObserver,
    ) -> Result<RunSummary> {
        let tools = catalog.specs();
        let mut state = LoopState::Start;
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut usage = Usage::default();
        let mut finish = FinishReason::StepLimit;

        info!(
            model = self.model.model_id(),
            max_steps = self.max_steps,
            tools = tools.len(),
            "starting agent loop"
        );

        for index in 0..self.max_steps as usize {
            self.transition(&mut state, LoopState::Generating, index);
            let mut request =
                self.model
                    .request(transcript.clone(), self.max_tokens, self.temperature);
            request.tools = tools.clone();

            let response = match self.model.generate(&request).await {
                Ok(r) => r,
                Err(e) => {
                    self.transition(&mut state, LoopState::Failed, index);
                    warn!(step = index, error = %e, "generation failed");
                    return Err(e);
                }
            };
            usage.merge(&response.usage);

            let text = response.message.text_content();
            let tool_calls = response.message.tool_calls.clone();
            transcript.push(response.message);

            let mut outcomes = Vec::with_capacity(tool_calls.len());
            if !tool_calls.is_empty() {
                self.transition(&mut state, LoopState::ExecutingTools, index);
                for call in &tool_calls {
                    debug!(step = index, tool = %call.tool_name, id = %call.id, "executing tool call");
                    outcomes.push(catalog.invoke(call).await);
                }
                transcript.push(Message::tool_results(&outcomes));
            }

            self.transition(&mut state, LoopState::Stepping, index);
            let record = StepRecord {
                index,
                text,
                tool_calls,
                outcomes,
            };
            if let Err(e) = observer.on_step(&record).await {
                warn!(step = index, error = %e, "step observer failed, continuing");
            }
            let requested_tools = !record.tool_calls.is_empty();
            steps.push(record);

            if !requested_tools {
                finish = FinishReason::Completed;
                break;
            }
        }

        self.transition(&mut state, LoopState::Done, steps.len());
        info!(
            steps = steps.len(),
            finish = ?finish,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "agent loop finished"
        );

        Ok(RunSummary {
            steps,
            transcript,
            usage,
            finish,
            state,
        })
    }
}
