//! Request and wire models for the completion stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::StreamError;
use crate::options::SecretString;

/// JSON body sent to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptPayload {
    pub prompt: String,
}

/// One streamed completion request. Built once per submission.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    endpoint: Url,
    auth_token: SecretString,
    payload: PromptPayload,
}

impl StreamRequest {
    /// Create a request, rejecting a blank prompt.
    pub fn new(
        endpoint: Url,
        auth_token: impl Into<SecretString>,
        prompt: impl Into<String>,
    ) -> Result<Self, StreamError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(StreamError::InvalidRequest("prompt must not be empty".to_string()));
        }
        Ok(Self {
            endpoint,
            auth_token: auth_token.into(),
            payload: PromptPayload { prompt },
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn auth_token(&self) -> &SecretString {
        &self.auth_token
    }

    pub fn payload(&self) -> &PromptPayload {
        &self.payload
    }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Chat-completion style chunk. Only the fields the decoder reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// Content of the first choice's delta, if present and non-empty.
    pub fn into_delta(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
    }
}

/// Extract the text delta from a `data:` payload.
///
/// Only JSON syntax errors are reported. Well-formed JSON of an unexpected
/// shape (a bare number, `"content": 7`, no `choices`) yields `Ok(None)`.
pub fn extract_delta(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let value: Value = serde_json::from_str(payload)?;
    Ok(CompletionChunk::deserialize(value)
        .ok()
        .and_then(CompletionChunk::into_delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_blank_prompt() {
        let url = Url::parse("http://localhost/stream").unwrap();
        let err = StreamRequest::new(url, "key", "   \n").unwrap_err();
        assert!(matches!(err, StreamError::InvalidRequest(_)));
    }

    #[test]
    fn test_payload_serializes_prompt() {
        let url = Url::parse("http://localhost/stream").unwrap();
        let request = StreamRequest::new(url, "key", "hello").unwrap();
        assert_eq!(
            serde_json::to_string(request.payload()).unwrap(),
            r#"{"prompt":"hello"}"#
        );
    }

    #[test]
    fn test_extract_delta() {
        assert_eq!(
            extract_delta(r#"{"choices":[{"delta":{"content":" world"}}]}"#).unwrap(),
            Some(" world".to_string())
        );
        assert_eq!(
            extract_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(
            extract_delta(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap(),
            None
        );
        assert_eq!(extract_delta(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_extract_delta_ignores_unexpected_shapes() {
        assert_eq!(extract_delta("42").unwrap(), None);
        assert_eq!(
            extract_delta(r#"{"choices":[{"delta":{"content":7}}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_extract_delta_reports_syntax_errors() {
        assert!(extract_delta(r#"{"choices":[{"delta":"#).is_err());
    }

    #[test]
    fn test_error_body_field_is_optional() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert!(body.error.is_none());
    }
}
