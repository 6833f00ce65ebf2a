// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::utils::errors::OracleError;

/// 情感极性预言机
#[async_trait]
pub trait SentimentOracle: Send + Sync {
    /// 返回 [-1, 1] 之间的极性
    async fn polarity(&self, text: &str) -> Result<f64, OracleError>;
}

static WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z']+").unwrap());

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        ("good", 0.7),
        ("great", 0.8),
        ("excellent", 1.0),
        ("positive", 0.5),
        ("improve", 0.5),
        ("improved", 0.5),
        ("improving", 0.5),
        ("reduce", 0.3),
        ("reduced", 0.3),
        ("success", 0.6),
        ("successful", 0.6),
        ("strong", 0.4),
        ("committed", 0.4),
        ("proud", 0.6),
        ("safe", 0.5),
        ("fair", 0.7),
        ("clean", 0.4),
        ("sustainable", 0.3),
        ("transparent", 0.4),
        ("best", 1.0),
        ("bad", -0.7),
        ("poor", -0.4),
        ("negative", -0.3),
        ("worse", -0.4),
        ("worst", -1.0),
        ("fail", -0.5),
        ("failed", -0.5),
        ("failure", -0.5),
        ("risk", -0.2),
        ("violation", -0.6),
        ("violations", -0.6),
        ("fraud", -0.8),
        ("corruption", -0.8),
        ("pollution", -0.5),
        ("unsafe", -0.5),
        ("unfair", -0.5),
        ("scandal", -0.7),
        ("fine", 0.2),
        ("fined", -0.5),
        ("lawsuit", -0.4),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: &[&str] = &["not", "no", "never", "without", "don't", "doesn't", "isn't"];

/// 基于词典的情感分析
///
/// 对命中词典的词取平均；紧跟在否定词后的词极性取反并减半
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn score(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let mut total = 0.0;
        let mut hits = 0usize;
        let mut negated = false;

        for word in WORDS.find_iter(&lower).map(|m| m.as_str()) {
            if NEGATIONS.contains(&word) {
                negated = true;
                continue;
            }
            if let Some(value) = LEXICON.get(word) {
                total += if negated { -0.5 * value } else { *value };
                hits += 1;
            }
            negated = false;
        }

        if hits == 0 {
            return 0.0;
        }
        (total / hits as f64).clamp(-1.0, 1.0)
    }
}

#[async_trait]
impl SentimentOracle for LexiconSentiment {
    async fn polarity(&self, text: &str) -> Result<f64, OracleError> {
        Ok(Self::score(text))
    }
}
