//! Page-level state for one visualizer session.

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::client::StreamOutcome;
use crate::decoder::StreamDecoder;
use crate::model::StreamRequest;
use crate::network::layer_specs;
use crate::options::SecretString;
use crate::probability::{ProbabilitySynthesizer, TokenProbability};
use crate::tokenizer::tokenize;

/// Receiver of presentation updates.
pub trait VisualizationSink {
    fn update(&mut self, output: &str, probabilities: &[TokenProbability], is_processing: bool);
}

/// Owns everything the page displays and runs one decode per submission.
#[derive(Debug)]
pub struct VisualizerController<S> {
    sink: S,
    prompt: String,
    tokens: Vec<String>,
    output: String,
    probabilities: Vec<TokenProbability>,
    active_layer: Option<usize>,
    layer_count: usize,
    is_processing: bool,
    last_error: Option<String>,
    synthesizer: ProbabilitySynthesizer,
}

impl<S: VisualizationSink> VisualizerController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            prompt: String::new(),
            tokens: Vec::new(),
            output: String::new(),
            probabilities: Vec::new(),
            active_layer: None,
            layer_count: layer_specs(0).len(),
            is_processing: false,
            last_error: None,
            synthesizer: ProbabilitySynthesizer::new(0),
        }
    }

    /// Reseed the distribution shown when a stream completes without text.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.synthesizer = ProbabilitySynthesizer::new(seed);
        self
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn probabilities(&self) -> &[TokenProbability] {
        &self.probabilities
    }

    pub fn active_layer(&self) -> Option<usize> {
        self.active_layer
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Reason of the last failed submission. Cancellations are not recorded.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Reset for a new submission. Returns `false` for a blank prompt or while busy.
    pub fn begin(&mut self) -> bool {
        if self.prompt.trim().is_empty() || self.is_processing {
            return false;
        }

        self.tokens = tokenize(&self.prompt);
        self.layer_count = layer_specs(self.tokens.len()).len();
        self.output.clear();
        self.probabilities.clear();
        self.last_error = None;
        self.active_layer = Some(0);
        self.is_processing = true;
        debug!(tokens = self.tokens.len(), "submission started");
        true
    }

    /// Move the highlight to the next layer. Returns whether it moved.
    pub fn advance_layer(&mut self) -> bool {
        match self.active_layer {
            Some(layer) if self.is_processing && layer + 1 < self.layer_count => {
                self.active_layer = Some(layer + 1);
                true
            }
            _ => false,
        }
    }

    /// Append a streamed delta and notify the sink.
    pub fn push_delta(&mut self, delta: &str) {
        self.output.push_str(delta);
        self.probabilities = ProbabilitySynthesizer::from_text(&self.output);
        self.sink
            .update(&self.output, &self.probabilities, self.is_processing);
    }

    /// Record the outcome and clear the processing state. Partial output is kept.
    ///
    /// A completed stream that produced no text still gets a simulated
    /// distribution so the panel is never left blank.
    pub fn finish(&mut self, outcome: &StreamOutcome) {
        self.is_processing = false;
        if outcome.is_completed() && self.probabilities.is_empty() {
            self.probabilities = self.synthesizer.simulate();
        }
        self.last_error = match outcome.error() {
            Some(e) if !e.is_cancelled() => Some(e.to_string()),
            _ => None,
        };
        self.sink.update(&self.output, &self.probabilities, false);
    }

    /// Stream a completion for the current prompt.
    ///
    /// Returns `None` when the submission was ignored (blank prompt or busy).
    pub async fn submit(
        &mut self,
        decoder: &StreamDecoder,
        endpoint: Url,
        auth_token: SecretString,
        cancel: &CancellationToken,
    ) -> Option<StreamOutcome> {
        if !self.begin() {
            return None;
        }

        let outcome = match StreamRequest::new(endpoint, auth_token, self.prompt.clone()) {
            Ok(request) => {
                decoder
                    .decode_with_cancel(
                        &request,
                        |delta: &str| {
                            self.push_delta(delta);
                            Ok(())
                        },
                        cancel,
                    )
                    .await
            }
            Err(e) => StreamOutcome::Failed(e),
        };

        self.finish(&outcome);
        Some(outcome)
    }
}
