//! Geometry of the illustrative feed-forward network.
//!
//! Produces node positions, connections and per-node activations for a fixed
//! five-layer diagram. Weights and activations are random and carry no meaning.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const CANVAS_WIDTH: f64 = 900.0;
pub const CANVAS_HEIGHT: f64 = 500.0;
pub const CANVAS_PADDING: f64 = 80.0;

const MIN_INPUT_NODES: usize = 4;
const MAX_INPUT_NODES: usize = 8;
const LABEL_CHARS: usize = 6;

/// Layers after the input layer: (label, node count).
const HIDDEN_LAYERS: [(&str, usize); 4] = [
    ("Embedding", 6),
    ("Hidden 1", 8),
    ("Hidden 2", 6),
    ("Output", 4),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSize {
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub layer: usize,
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub size: NodeSize,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Index of the source layer.
    pub layer: usize,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// In `[0.25, 0.75)`.
    pub weight: f64,
}

/// Laid-out network for one set of input tokens.
#[derive(Debug, Clone)]
pub struct NetworkLayout {
    layers: Vec<LayerSpec>,
    nodes: Vec<Vec<Node>>,
    connections: Vec<Connection>,
}

impl NetworkLayout {
    /// Lay out the network for `tokens`, drawing connection weights from `seed`.
    pub fn new(tokens: &[String], seed: u64) -> Self {
        let layers = layer_specs(tokens.len());
        let nodes = position_nodes(&layers, tokens);
        let connections = connect(&nodes, &mut StdRng::seed_from_u64(seed));
        Self {
            layers,
            nodes,
            connections,
        }
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn nodes(&self) -> &[Vec<Node>] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Per-node activation values for the current animation step.
    ///
    /// Layers up to and including `active_layer` get a random value while
    /// processing; everything else is `None`.
    pub fn activations<R: Rng>(
        &self,
        active_layer: Option<usize>,
        is_processing: bool,
        rng: &mut R,
    ) -> Vec<Vec<Option<f64>>> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(layer, nodes)| {
                let lit = is_processing && active_layer.is_some_and(|active| active >= layer);
                nodes
                    .iter()
                    .map(|_| lit.then(|| rng.gen::<f64>()))
                    .collect()
            })
            .collect()
    }
}

impl Connection {
    /// A connection animates once the signal has passed its source layer.
    pub fn is_active(&self, active_layer: Option<usize>, is_processing: bool) -> bool {
        is_processing && active_layer.is_some_and(|active| active > self.layer)
    }
}

/// Layer table; the input layer shows between 4 and 8 token nodes.
pub fn layer_specs(token_count: usize) -> Vec<LayerSpec> {
    let input = if token_count == 0 {
        MIN_INPUT_NODES
    } else {
        token_count.clamp(MIN_INPUT_NODES, MAX_INPUT_NODES)
    };

    std::iter::once(LayerSpec {
        label: "Input (Tokens)",
        count: input,
    })
    .chain(
        HIDDEN_LAYERS
            .iter()
            .map(|&(label, count)| LayerSpec { label, count }),
    )
    .collect()
}

fn position_nodes(layers: &[LayerSpec], tokens: &[String]) -> Vec<Vec<Node>> {
    let last = layers.len().saturating_sub(1);
    let layer_width = (CANVAS_WIDTH - CANVAS_PADDING * 2.0) / last.max(1) as f64;

    layers
        .iter()
        .enumerate()
        .map(|(layer, spec)| {
            let x = CANVAS_PADDING + layer as f64 * layer_width;
            let spacing = (CANVAS_HEIGHT - CANVAS_PADDING * 2.0) / (spec.count + 1) as f64;
            let size = if layer == 0 || layer == last {
                NodeSize::Large
            } else {
                NodeSize::Medium
            };

            (0..spec.count)
                .map(|index| Node {
                    layer,
                    index,
                    x,
                    y: CANVAS_PADDING + (index + 1) as f64 * spacing,
                    size,
                    label: (layer == 0)
                        .then(|| tokens.get(index))
                        .flatten()
                        .map(|token| token.chars().take(LABEL_CHARS).collect()),
                })
                .collect()
        })
        .collect()
}

fn connect(nodes: &[Vec<Node>], rng: &mut StdRng) -> Vec<Connection> {
    nodes
        .windows(2)
        .enumerate()
        .flat_map(|(layer, pair)| {
            let (from_layer, to_layer) = (&pair[0], &pair[1]);
            from_layer
                .iter()
                .flat_map(move |from| to_layer.iter().map(move |to| (layer, from, to)))
        })
        .map(|(layer, from, to)| Connection {
            layer,
            x1: from.x,
            y1: from.y,
            x2: to.x,
            y2: to.y,
            weight: rng.gen_range(0.25..0.75),
        })
        .collect()
}
