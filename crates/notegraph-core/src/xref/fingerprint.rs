use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Number of consecutive terms per shingle.
const SHINGLE_SIZE: usize = 3;

/// Deterministic compact representation of document content.
///
/// A term-frequency vector over lowercased word shingles. Chosen over an
/// embedding model deliberately: scores must be reproducible and
/// inspectable, independent of insertion order or any external service.
/// `BTreeMap` keeps serialization stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    counts: BTreeMap<String, u32>,
    norm: f64,
}

impl Fingerprint {
    #[must_use]
    pub fn of(content: &str) -> Self {
        let terms: Vec<String> = content
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();

        if terms.len() < SHINGLE_SIZE {
            // Short documents fall back to single-term counts.
            for term in &terms {
                *counts.entry(term.clone()).or_insert(0) += 1;
            }
        } else {
            for window in terms.windows(SHINGLE_SIZE) {
                *counts.entry(window.join(" ")).or_insert(0) += 1;
            }
        }

        let norm = counts
            .values()
            .map(|&c| f64::from(c) * f64::from(c))
            .sum::<f64>()
            .sqrt();

        Self { counts, norm }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.counts.len()
    }

    /// Cosine similarity in `[0, 1]`. Symmetric and pure.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }

        // Iterate the smaller vector against the larger map.
        let (small, large) = if self.counts.len() <= other.counts.len() {
            (self, other)
        } else {
            (other, self)
        };

        let dot: f64 = small
            .counts
            .iter()
            .filter_map(|(term, &a)| {
                large
                    .counts
                    .get(term)
                    .map(|&b| f64::from(a) * f64::from(b))
            })
            .sum();

        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}
