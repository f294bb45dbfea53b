//! # Text vectorization
//!
//! Whitespace tokenization, an explicit immutable vocabulary, and a TF-IDF
//! transform producing sparse term-weight matrices. The vocabulary is a value
//! passed into transforms rather than state hidden inside a vectorizer, so
//! train and test collections can share one vocabulary without shared mutable
//! state.

mod labels;

pub use labels::{read_labels, write_labels};

use std::collections::HashMap;

use anyhow::{bail, Result};
use log::debug;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

/// Whitespace tokenizer with optional lowercasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokenizer {
    lowercase: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer { lowercase: true }
    }

    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|t| {
                if self.lowercase {
                    t.to_lowercase()
                } else {
                    t.to_string()
                }
            })
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable term-to-index mapping.
///
/// Indices are assigned in lexicographic term order so the same document
/// collection always produces the same layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    index: HashMap<String, usize>,
    terms: Vec<String>,
}

impl Vocabulary {
    /// Builds a vocabulary from a document collection.
    ///
    /// Terms appearing in fewer than `min_df` documents are dropped.
    pub fn build(documents: &[String], tokenizer: &Tokenizer, min_df: usize) -> Result<Self> {
        if documents.is_empty() {
            bail!("cannot build a vocabulary from zero documents");
        }

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut tokens = tokenizer.tokenize(doc);
            tokens.sort();
            tokens.dedup();
            for token in tokens {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        let mut terms: Vec<String> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= min_df.max(1))
            .map(|(term, _)| term)
            .collect();
        terms.sort();

        if terms.is_empty() {
            bail!("vocabulary is empty after applying min_df={min_df}");
        }

        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        debug!("built vocabulary with {} terms", terms.len());
        Ok(Vocabulary { index, terms })
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// TF-IDF weighting against a fixed vocabulary.
///
/// Uses smooth inverse document frequency, `ln((1 + n) / (1 + df)) + 1`, and
/// L2 row normalization by default. Terms outside the vocabulary are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfTransform {
    vocabulary: Vocabulary,
    tokenizer: Tokenizer,
    normalize: bool,
    idf: Option<Vec<f64>>,
}

impl TfidfTransform {
    pub fn new(vocabulary: Vocabulary) -> Self {
        TfidfTransform {
            vocabulary,
            tokenizer: Tokenizer::new(),
            normalize: true,
            idf: None,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Learns per-term document frequencies from `documents`.
    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        if documents.is_empty() {
            bail!("cannot fit TF-IDF on zero documents");
        }

        let mut doc_freq = vec![0usize; self.vocabulary.len()];
        for doc in documents {
            let mut seen = vec![false; self.vocabulary.len()];
            for token in self.tokenizer.tokenize(doc) {
                if let Some(idx) = self.vocabulary.index_of(&token) {
                    seen[idx] = true;
                }
            }
            for (idx, hit) in seen.into_iter().enumerate() {
                if hit {
                    doc_freq[idx] += 1;
                }
            }
        }

        let n_docs = documents.len() as f64;
        let idf = doc_freq
            .into_iter()
            .map(|df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        self.idf = Some(idf);
        Ok(())
    }

    /// Produces the sparse term-weight matrix for `documents`.
    pub fn transform(&self, documents: &[String]) -> Result<CsrMatrix<f64>> {
        let idf = match &self.idf {
            Some(idf) => idf,
            None => bail!("TF-IDF transform has not been fitted"),
        };

        let mut coo = CooMatrix::new(documents.len(), self.vocabulary.len());
        for (doc_idx, doc) in documents.iter().enumerate() {
            let mut counts: HashMap<usize, f64> = HashMap::new();
            for token in self.tokenizer.tokenize(doc) {
                if let Some(idx) = self.vocabulary.index_of(&token) {
                    *counts.entry(idx).or_insert(0.0) += 1.0;
                }
            }

            let mut weights: Vec<(usize, f64)> = counts
                .into_iter()
                .map(|(idx, tf)| (idx, tf * idf[idx]))
                .collect();

            if self.normalize {
                let norm: f64 = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, w) in &mut weights {
                        *w /= norm;
                    }
                }
            }

            weights.sort_by_key(|(idx, _)| *idx);
            for (idx, w) in weights {
                coo.push(doc_idx, idx, w);
            }
        }

        Ok(CsrMatrix::from(&coo))
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<CsrMatrix<f64>> {
        self.fit(documents)?;
        self.transform(documents)
    }
}
