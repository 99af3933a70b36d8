use crate::numeric;

/// Concentration summary of a belief snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefMetrics {
    /// Shannon entropy in nats.
    pub entropy: f64,
    /// Entropy divided by `ln N`; zero for a single hypothesis.
    pub normalized_entropy: f64,
    pub map_index: usize,
    pub map_probability: f64,
    /// Total-variation distance from the uniform distribution.
    pub distance_from_uniform: f64,
}

impl BeliefMetrics {
    pub fn from_probabilities(probs: &[f64]) -> Self {
        let mut entropy = 0.0;
        for p in probs {
            if *p > 0.0 {
                entropy -= p * p.ln();
            }
        }

        let normalized_entropy = if probs.len() > 1 {
            entropy / (probs.len() as f64).ln()
        } else {
            0.0
        };

        let (map_index, map_probability) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, p)| {
                if p > best.1 { (idx, p) } else { best }
            });

        let uniform = numeric::uniform(probs.len());
        let distance_from_uniform = 0.5
            * probs
                .iter()
                .zip(&uniform)
                .map(|(p, u)| (p - u).abs())
                .sum::<f64>();

        Self {
            entropy,
            normalized_entropy,
            map_index,
            map_probability: map_probability.max(0.0),
            distance_from_uniform,
        }
    }
}
