use std::time::Duration;

use bon::Builder;

use crate::errors::LmError;

/// Tunable inference parameters applied to each completion request.
#[derive(Clone, Debug, Builder)]
pub struct LmOptions {
    /// Sampling temperature in `[0, 1]`. Higher values increase randomness.
    #[builder(default = 0.7)]
    pub temperature: f32,
    #[builder(default = 1024)]
    pub max_tokens: u32,
    /// Nucleus sampling mass in `(0, 1]`.
    pub top_p: Option<f32>,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for LmOptions {
    fn default() -> Self {
        LmOptions::builder().build()
    }
}

/// Minimal completion interface the default instruction proposer talks to.
///
/// The optimizer reads back only the text; transport concerns (retries, rate
/// limits, streaming) live behind the implementation.
#[allow(async_fn_in_trait)]
pub trait LanguageModel {
    async fn complete(&self, prompt: &str, options: &LmOptions) -> Result<String, LmError>;
}

/// Canned-response model for tests and offline runs.
#[derive(Clone, Debug)]
pub struct StaticLm {
    response: String,
}

impl StaticLm {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl LanguageModel for StaticLm {
    async fn complete(&self, _prompt: &str, _options: &LmOptions) -> Result<String, LmError> {
        Ok(self.response.clone())
    }
}
