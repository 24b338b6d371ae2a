//! Stream a completion for a prompt and print a text rendering of the visualizer.
//!
//! Run with:
//! ```bash
//! export NEUROVIZ_ENDPOINT="https://<project>.supabase.co/functions/v1/process-prompt"
//! export NEUROVIZ_API_KEY="your-anon-key"
//! cargo run --example stream_prompt -- "The quick brown fox"
//! ```

use std::io::Write;

use neuroviz::network::NetworkLayout;
use neuroviz::probability::{top, TokenProbability, DISPLAY_COUNT};
use neuroviz::{CancellationToken, Config, StreamDecoder, VisualizationSink, VisualizerController};
use tracing_subscriber::EnvFilter;

struct TerminalSink {
    printed: usize,
}

impl VisualizationSink for TerminalSink {
    fn update(&mut self, output: &str, probabilities: &[TokenProbability], is_processing: bool) {
        print!("{}", &output[self.printed..]);
        self.printed = output.len();
        let _ = std::io::stdout().flush();

        if !is_processing {
            println!("\n\nNext token probabilities:");
            for p in top(probabilities, DISPLAY_COUNT) {
                println!("  {:<12} {:>5.1}%", format!("\"{}\"", p.token), p.probability * 100.0);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let config = Config::from_env()?;
    let decoder = StreamDecoder::from_config(&config)?;

    let mut controller = VisualizerController::new(TerminalSink { printed: 0 });
    controller.set_prompt(prompt);

    // Ctrl-C aborts the stream instead of killing the process mid-write.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let layout = NetworkLayout::new(&neuroviz::tokenizer::tokenize(controller.prompt()), 0);
    for (spec, nodes) in layout.layers().iter().zip(layout.nodes()) {
        let labels: Vec<&str> = nodes.iter().filter_map(|n| n.label.as_deref()).collect();
        println!("{:<15} {} nodes {}", spec.label, spec.count, labels.join(" "));
    }
    println!();

    match controller
        .submit(&decoder, config.endpoint.clone(), config.api_key.clone(), &cancel)
        .await
    {
        None => eprintln!("usage: stream_prompt <prompt>"),
        Some(outcome) if outcome.is_cancelled() => eprintln!("\ncancelled"),
        Some(outcome) => outcome.into_result()?,
    }

    Ok(())
}
