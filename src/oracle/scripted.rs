//! Deterministic oracle driven by closures.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Classification, CompletionRequest, Oracle, OracleError};

type CompleteFn = dyn Fn(&CompletionRequest) -> Result<String, OracleError> + Send + Sync;
type ClassifyFn = dyn Fn(&str, &[String]) -> Result<Classification, OracleError> + Send + Sync;
type AnswerFn = dyn Fn(&str) -> Result<String, OracleError> + Send + Sync;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleCall {
    Complete(CompletionRequest),
    Classify { prompt: String, choices: Vec<String> },
    Answer(String),
}

/// Oracle whose responses come from caller-supplied closures.
///
/// Capabilities without a script fail with [`OracleError::Unscripted`].
/// Every call is recorded in arrival order.
#[derive(Default)]
pub struct ScriptedOracle {
    complete: Option<Box<CompleteFn>>,
    classify: Option<Box<ClassifyFn>>,
    answer: Option<Box<AnswerFn>>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn on_classify<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<Classification, OracleError> + Send + Sync + 'static,
    {
        self.classify = Some(Box::new(f));
        self
    }

    pub fn on_answer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        self.answer = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: OracleCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, req: CompletionRequest) -> Result<String, OracleError> {
        self.record(OracleCall::Complete(req.clone()));
        // Suspend like a real call would, so fan-outs interleave.
        tokio::task::yield_now().await;
        let script = self.complete.as_ref().ok_or(OracleError::Unscripted("complete"))?;
        script(&req)
    }

    async fn classify(
        &self,
        prompt: &str,
        choices: &[String],
    ) -> Result<Classification, OracleError> {
        self.record(OracleCall::Classify {
            prompt: prompt.to_string(),
            choices: choices.to_vec(),
        });
        tokio::task::yield_now().await;
        let script = self.classify.as_ref().ok_or(OracleError::Unscripted("classify"))?;
        script(prompt, choices)
    }

    async fn answer(&self, prompt: &str) -> Result<String, OracleError> {
        self.record(OracleCall::Answer(prompt.to_string()));
        tokio::task::yield_now().await;
        let script = self.answer.as_ref().ok_or(OracleError::Unscripted("answer"))?;
        script(prompt)
    }
}
