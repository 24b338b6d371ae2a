//! # neuroviz - streamed completions for a neural network visualizer
//!
//! Sends a prompt to a completion endpoint and decodes the `data:`-framed
//! response incrementally, handing ordered text deltas to a callback. Around
//! that client sit the pieces a visualizer page needs: a whitespace tokenizer,
//! cosmetic probability lists, the geometry of an illustrative network and a
//! controller that owns the page state.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Chunk-boundary independent decoding (lines, UTF-8 and split JSON)
//! - Explicit cancellation through `CancellationToken`
//! - Callback and channel delivery of deltas
//! - Seedable randomness for everything cosmetic
//!
//! ## Example
//! ```no_run
//! use neuroviz::{Config, StreamDecoder, StreamRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let decoder = StreamDecoder::from_config(&config)?;
//!     let request = StreamRequest::new(
//!         config.endpoint.clone(),
//!         config.api_key.clone(),
//!         "The quick brown fox",
//!     )?;
//!
//!     let outcome = decoder
//!         .decode(&request, |delta: &str| {
//!             print!("{delta}");
//!             Ok(())
//!         })
//!         .await;
//!
//!     outcome.into_result()?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod controller;
pub mod decoder;
pub mod http;
pub mod model;
pub mod network;
pub mod options;
pub mod probability;
pub mod sse;
pub mod tokenizer;

// Re-exports for convenience
pub use client::{SinkError, StreamError, StreamOutcome};
pub use controller::{VisualizationSink, VisualizerController};
pub use decoder::StreamDecoder;
pub use model::StreamRequest;
pub use options::{Config, SecretString, TransportOptions};
pub use tokio_util::sync::CancellationToken;
