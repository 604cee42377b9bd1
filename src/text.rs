//! Keyword extraction and lexicon sentiment.
//!
//! Both are pluggable collaborators of the summary assembler; [`LexiconAnalyzer`] is the
//! built-in implementation. Tokenization is deliberately simple: whitespace-separated
//! Latin words plus overlapping bigrams over runs of CJK ideographs.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisSettings, LexiconSettings};

/// Fractions of texts classified positive/negative/neutral. Sums to 1.0 unless empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentRatio {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

pub trait KeywordExtractor: Send + Sync {
    /// Top `top_n` `(word, count)` pairs, count descending.
    fn extract(&self, texts: &[&str], top_n: usize) -> Vec<(String, usize)>;
}

pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, texts: &[&str]) -> SentimentRatio;
}

/// Keep CJK ideographs, ASCII letters and whitespace; collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    static RE_DROP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\p{Han}A-Za-z\s]").expect("static regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
    let decoded = html_escape::decode_html_entities(text);
    let kept = RE_DROP.replace_all(&decoded, "");
    RE_WS.replace_all(&kept, " ").trim().to_string()
}

fn is_han(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x20000..=0x2A6DF | 0xF900..=0xFAFF)
}

/// Split cleaned text into candidate words.
pub fn tokenize(cleaned: &str) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in cleaned.split_whitespace() {
        let mut latin = String::new();
        let mut han: Vec<char> = Vec::new();
        for c in chunk.chars() {
            if is_han(c) {
                if !latin.is_empty() {
                    out.push(std::mem::take(&mut latin).to_lowercase());
                }
                han.push(c);
            } else {
                flush_han(&mut han, &mut out);
                latin.push(c);
            }
        }
        flush_han(&mut han, &mut out);
        if !latin.is_empty() {
            out.push(latin.to_lowercase());
        }
    }
    out
}

fn flush_han(run: &mut Vec<char>, out: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => out.push(run[0].to_string()),
        _ => {
            for pair in run.windows(2) {
                out.push(pair.iter().collect());
            }
        }
    }
    run.clear();
}

/// Lexicon-driven keyword counter and sentiment classifier.
#[derive(Debug, Clone)]
pub struct LexiconAnalyzer {
    stop_words: HashSet<String>,
    positive: Vec<String>,
    negative: Vec<String>,
    min_keyword_length: usize,
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self::new(&LexiconSettings::default(), &AnalysisSettings::default())
    }
}

impl LexiconAnalyzer {
    pub fn new(lexicon: &LexiconSettings, analysis: &AnalysisSettings) -> Self {
        let norm = |ws: &[String]| -> Vec<String> {
            ws.iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            stop_words: norm(&lexicon.stop_words).into_iter().collect(),
            positive: norm(&lexicon.positive),
            negative: norm(&lexicon.negative),
            min_keyword_length: analysis.min_keyword_length.max(1),
        }
    }

    fn hits(words: &[String], haystack: &str) -> usize {
        words.iter().map(|w| haystack.matches(w.as_str()).count()).sum()
    }
}

impl KeywordExtractor for LexiconAnalyzer {
    fn extract(&self, texts: &[&str], top_n: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        // first-seen order breaks ties deterministically
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let cleaned = clean_text(text);
            if cleaned.is_empty() {
                continue;
            }
            for tok in tokenize(&cleaned) {
                if tok.chars().count() < self.min_keyword_length || self.stop_words.contains(&tok)
                {
                    continue;
                }
                let next = first_seen.len();
                first_seen.entry(tok.clone()).or_insert(next);
                *counts.entry(tok).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| first_seen[&a.0].cmp(&first_seen[&b.0])));
        ranked.truncate(top_n);
        ranked
    }
}

impl SentimentClassifier for LexiconAnalyzer {
    fn classify(&self, texts: &[&str]) -> SentimentRatio {
        if texts.is_empty() {
            return SentimentRatio::default();
        }
        let (mut pos, mut neg, mut neu) = (0usize, 0usize, 0usize);
        for text in texts {
            let cleaned = clean_text(text).to_lowercase();
            let p = Self::hits(&self.positive, &cleaned);
            let n = Self::hits(&self.negative, &cleaned);
            match p.cmp(&n) {
                std::cmp::Ordering::Greater => pos += 1,
                std::cmp::Ordering::Less => neg += 1,
                std::cmp::Ordering::Equal => neu += 1,
            }
        }
        let total = texts.len() as f64;
        SentimentRatio {
            positive: pos as f64 / total,
            negative: neg as f64 / total,
            neutral: neu as f64 / total,
        }
    }
}
