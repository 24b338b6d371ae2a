//! The streaming completion client.
//!
//! `StreamDecoder` posts a prompt, checks the response, and pumps the body
//! through a [`FrameDecoder`], handing each delta to a caller-supplied sink.
//!
//! ```text
//! Requesting -> Streaming -> Completed
//!     |             |
//!     +--> Failed <-+
//! ```

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{SinkError, StreamError, StreamOutcome, GENERIC_REQUEST_FAILURE};
use crate::http::{add_extra_headers, build_http_client};
use crate::model::{ErrorBody, StreamRequest};
use crate::options::{Config, DecoderOptions, TransportOptions};
use crate::sse::FrameDecoder;

/// Lifecycle phase of one decode, used in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    Requesting,
    Streaming,
    Completed,
    Failed,
}

impl DecodePhase {
    /// Terminal phase reached by a finished decode.
    pub fn terminal(result: &Result<(), StreamError>) -> Self {
        match result {
            Ok(()) => DecodePhase::Completed,
            Err(_) => DecodePhase::Failed,
        }
    }
}

/// Client for a `data:`-framed completion stream.
///
/// Holds no per-request state. Clones share the underlying connection pool and
/// may run concurrent decodes.
///
/// # Example
/// ```no_run
/// use neuroviz::decoder::StreamDecoder;
/// use neuroviz::model::StreamRequest;
/// use neuroviz::options::TransportOptions;
///
/// # async fn run() -> Result<(), neuroviz::StreamError> {
/// let decoder = StreamDecoder::new(TransportOptions::default())?;
/// let endpoint = url::Url::parse("https://example.com/functions/v1/process-prompt").unwrap();
/// let request = StreamRequest::new(endpoint, "anon-key", "The quick brown fox")?;
///
/// let mut output = String::new();
/// decoder
///     .decode(&request, |delta: &str| {
///         output.push_str(delta);
///         Ok(())
///     })
///     .await
///     .into_result()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    http: reqwest::Client,
    transport: TransportOptions,
    options: DecoderOptions,
}

impl StreamDecoder {
    pub fn new(transport: TransportOptions) -> Result<Self, StreamError> {
        let http = build_http_client(&transport)?;
        Ok(Self {
            http,
            transport,
            options: DecoderOptions::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StreamError> {
        Self::new(config.transport.clone())
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Stream a completion, calling `on_delta` for each text fragment in order.
    pub async fn decode<F>(&self, request: &StreamRequest, on_delta: F) -> StreamOutcome
    where
        F: FnMut(&str) -> Result<(), SinkError>,
    {
        self.decode_with_cancel(request, on_delta, &CancellationToken::new())
            .await
    }

    /// Like [`decode`](Self::decode), aborting with `Cancelled` once `cancel` fires.
    ///
    /// No delta is delivered after cancellation is observed, and the response
    /// body is released on every exit path.
    pub async fn decode_with_cancel<F>(
        &self,
        request: &StreamRequest,
        mut on_delta: F,
        cancel: &CancellationToken,
    ) -> StreamOutcome
    where
        F: FnMut(&str) -> Result<(), SinkError>,
    {
        let result = self.run(request, &mut on_delta, cancel).await;

        let phase = DecodePhase::terminal(&result);
        match &result {
            Ok(()) => info!(?phase, "stream completed"),
            Err(e) if e.is_cancelled() => info!(?phase, "stream cancelled"),
            Err(e) => warn!(?phase, error = %e, "stream failed"),
        }

        result.into()
    }

    /// Run a decode on a tokio task, delivering deltas through a channel.
    ///
    /// Dropping the receiver fails the decode with a sink error.
    pub fn spawn(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<String>, JoinHandle<StreamOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let decoder = self.clone();

        let handle = tokio::spawn(async move {
            decoder
                .decode_with_cancel(
                    &request,
                    |delta: &str| {
                        tx.send(delta.to_string())
                            .map_err(|_| SinkError::new("delta receiver dropped"))
                    },
                    &cancel,
                )
                .await
        });

        (rx, handle)
    }

    async fn run<F>(
        &self,
        request: &StreamRequest,
        on_delta: &mut F,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError>
    where
        F: FnMut(&str) -> Result<(), SinkError>,
    {
        debug!(phase = ?DecodePhase::Requesting, endpoint = %request.endpoint(), "sending prompt");

        let req = self
            .http
            .post(request.endpoint().clone())
            .header(
                AUTHORIZATION,
                format!("Bearer {}", request.auth_token().expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json");
        let req = add_extra_headers(req, &self.transport.extra_headers);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            response = req.json(request.payload()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                body = response.text() => body.unwrap_or_default(),
            };
            debug!(%status, "completion request rejected");
            return Err(StreamError::Request(error_message(&body)));
        }

        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(StreamError::NoBody);
        }

        debug!(phase = ?DecodePhase::Streaming, %status, "reading stream");
        let frames = FrameDecoder::new(self.options.max_frame_retries);
        pump(response.bytes_stream(), frames, on_delta, cancel).await
    }
}

/// Message for a rejected request: the body's `error` field, or the generic fallback.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| GENERIC_REQUEST_FAILURE.to_string())
}

/// Drive `byte_stream` through `frames` until the sentinel, end of data, an
/// error or cancellation.
///
/// Chunks are read one at a time. The stream is dropped when this returns.
pub async fn pump<S, E, F>(
    byte_stream: S,
    mut frames: FrameDecoder,
    on_delta: &mut F,
    cancel: &CancellationToken,
) -> Result<(), StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    StreamError: From<E>,
    F: FnMut(&str) -> Result<(), SinkError>,
{
    futures::pin_mut!(byte_stream);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            next = byte_stream.next() => next,
        };

        let (deltas, ended) = match next {
            Some(chunk) => (frames.feed(&chunk?), false),
            None => {
                debug!("byte stream ended");
                (frames.finish(), true)
            }
        };

        for delta in deltas {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }
            on_delta(delta.as_str())?;
        }

        if ended || frames.is_finished() {
            if frames.dropped_frames() > 0 {
                warn!(dropped = frames.dropped_frames(), "malformed frames were dropped");
            }
            return Ok(());
        }
    }
}
