use serde::Deserialize;

const DEFAULT_MAX_ERROR_MESSAGE_LEN: usize = 2000;
const DEFAULT_CANCELLATION_MESSAGE: &str = "Saga execution cancelled";

/// Tunables for a [`SagaOrchestrator`](crate::SagaOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    max_error_message_len: usize,
    cancellation_message: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_error_message_len: DEFAULT_MAX_ERROR_MESSAGE_LEN,
            cancellation_message: DEFAULT_CANCELLATION_MESSAGE.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Longest error message stored on a saga, in characters.
    #[must_use]
    pub fn max_error_message_len(&self) -> usize {
        self.max_error_message_len
    }

    /// Error message recorded when a run is cancelled between steps.
    #[must_use]
    pub fn cancellation_message(&self) -> &str {
        &self.cancellation_message
    }

    #[must_use]
    pub fn with_max_error_message_len(mut self, len: usize) -> Self {
        self.max_error_message_len = len;
        self
    }

    #[must_use]
    pub fn with_cancellation_message(mut self, message: impl Into<String>) -> Self {
        self.cancellation_message = message.into();
        self
    }

    pub(crate) fn clamp_message(&self, message: &str) -> String {
        message.chars().take(self.max_error_message_len).collect()
    }
}
