// Isolation forest outlier scorer
//
// Fitted fresh for every call: the model only lives for the window it scores.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use crate::entities::{FeatureVector, FEATURE_COUNT};
use crate::errors::DetectionError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorerConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected share of outliers. Sets the model's own outlier threshold only.
    pub contamination: f64,
    pub min_population: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            min_population: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredWindow {
    /// `2^(-E[h(x)] / c(n))` per point; larger is more anomalous.
    pub raw_scores: Vec<f64>,
    /// Raw scores min-max normalized over the window into `[0, 1]`.
    pub scores: Vec<f64>,
    /// Points above the contamination quantile of the raw scores.
    pub model_outliers: Vec<bool>,
    pub outlier_threshold: f64,
}

impl ScoredWindow {
    pub fn outlier_count(&self) -> usize {
        self.model_outliers.iter().filter(|flag| **flag).count()
    }
}

/// Fits an isolation forest on `features` and scores every point of it.
pub fn fit_and_score(
    features: &[FeatureVector],
    config: &ScorerConfig,
    seed: u64,
) -> Result<ScoredWindow, DetectionError> {
    let need = config.min_population.max(2);
    if features.len() < need {
        return Err(DetectionError::InsufficientData {
            have: features.len(),
            need,
        });
    }
    if config.n_estimators == 0 {
        return Err(DetectionError::Validation(
            "n_estimators must be greater than 0".to_string(),
        ));
    }

    let points: Vec<[f64; FEATURE_COUNT]> = features.iter().map(FeatureVector::to_array).collect();
    if points.iter().flatten().any(|value| !value.is_finite()) {
        return Err(DetectionError::Validation(
            "feature matrix contains non-finite values".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let forest = IsolationForest::fit(&points, config, &mut rng);
    let raw_scores: Vec<f64> = points.iter().map(|point| forest.score(point)).collect();
    let scores = normalize_scores(&raw_scores);
    let outlier_threshold = upper_quantile(&raw_scores, config.contamination);
    let model_outliers = raw_scores
        .iter()
        .map(|score| *score > outlier_threshold)
        .collect();

    Ok(ScoredWindow {
        raw_scores,
        scores,
        model_outliers,
        outlier_threshold,
    })
}

/// Min-max normalization; a flat batch maps to 0.5 everywhere.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span <= f64::EPSILON {
        return vec![0.5; raw.len()];
    }
    raw.iter()
        .map(|score| ((score - min) / span).clamp(0.0, 1.0))
        .collect()
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn upper_quantile(values: &[f64], contamination: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q = (1.0 - contamination).clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

struct IsolationForest {
    trees: Vec<Node>,
    subsample_size: usize,
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    fn fit(points: &[[f64; FEATURE_COUNT]], config: &ScorerConfig, rng: &mut StdRng) -> Self {
        let subsample_size = config.max_samples.clamp(2, points.len());
        let height_limit = (subsample_size as f64).log2().ceil().max(1.0) as usize;
        let trees = (0..config.n_estimators)
            .map(|_| {
                let indices = sample(rng, points.len(), subsample_size).into_vec();
                build_node(points, indices, 0, height_limit, rng)
            })
            .collect();
        Self {
            trees,
            subsample_size,
        }
    }

    fn score(&self, point: &[f64; FEATURE_COUNT]) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0))
            .sum();
        let mean = total / self.trees.len() as f64;
        2f64.powf(-mean / average_path_length(self.subsample_size))
    }
}

fn build_node(
    points: &[[f64; FEATURE_COUNT]],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
        .filter_map(|feature| {
            let (min, max) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), &index| {
                    let value = points[index][feature];
                    (min.min(value), max.max(value))
                },
            );
            (min < max).then_some((feature, min, max))
        })
        .collect();
    if splittable.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&index| points[index][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(points, left, depth + 1, height_limit, rng)),
        right: Box::new(build_node(points, right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64; FEATURE_COUNT], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] <= *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}
