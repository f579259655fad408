//! SARI - 문장 단순화 평가 지표
//!
//! source: Xu et al., "Optimizing Statistical Machine Translation for Text Simplification" (TACL 2016)
//! source: https://huggingface.co/spaces/evaluate-metric/sari
//!
//! 원문(source), 예측(prediction), 정답(references)의 n-gram(1~4)을 비교해
//! 유지(keep F1), 삭제(deletion precision), 추가(addition F1) 점수를 평균합니다.
//! 입력은 소문자화 + 13a 토큰화 후 비교합니다. 분모가 0이면 점수는 1로 둡니다.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use super::tokenize::Tokenizer13a;

const MAX_NGRAM: usize = 4;

type Counts<'a> = HashMap<&'a str, usize>;

fn ngrams(tokens: &[&str], n: usize) -> Vec<String> {
    if tokens.len() < n {
        return Vec::new();
    }
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

fn count<'a>(grams: impl IntoIterator<Item = &'a String>, weight: usize) -> Counts<'a> {
    let mut counts = HashMap::new();
    for gram in grams {
        *counts.entry(gram.as_str()).or_insert(0) += weight;
    }
    counts
}

/// 교집합 (최솟값, 양수만)
fn intersect<'a>(a: &Counts<'a>, b: &Counts<'a>) -> Counts<'a> {
    a.iter()
        .filter_map(|(k, &v)| {
            let m = v.min(b.get(k).copied().unwrap_or(0));
            (m > 0).then_some((*k, m))
        })
        .collect()
}

/// 차집합 (양수만)
fn subtract<'a>(a: &Counts<'a>, b: &Counts<'a>) -> Counts<'a> {
    a.iter()
        .filter_map(|(k, &v)| {
            let d = v.saturating_sub(b.get(k).copied().unwrap_or(0));
            (d > 0).then_some((*k, d))
        })
        .collect()
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision > 0.0 || recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// n-gram 차수 하나의 (keep, delete, add) 점수
fn sari_ngram(source: &[String], prediction: &[String], references: &[Vec<String>]) -> (f64, f64, f64) {
    let num_refs = references.len();

    let reference_counts = count(references.iter().flatten(), 1);
    let source_counts = count(source, 1);
    let prediction_counts = count(prediction, 1);
    let source_rep = count(source, num_refs);
    let prediction_rep = count(prediction, num_refs);

    // KEEP
    let keep = intersect(&source_rep, &prediction_rep);
    let keep_good = intersect(&keep, &reference_counts);
    let keep_all = intersect(&source_rep, &reference_counts);

    let mut keep_precision = 1.0;
    let mut keep_recall = 1.0;
    if !keep.is_empty() {
        let sum: f64 = keep
            .iter()
            .map(|(g, &c)| keep_good.get(g).copied().unwrap_or(0) as f64 / c as f64)
            .sum();
        keep_precision = sum / keep.len() as f64;
    }
    if !keep_all.is_empty() {
        let good: usize = keep.keys().map(|g| keep_good.get(g).copied().unwrap_or(0)).sum();
        let all: usize = keep_all.values().sum();
        keep_recall = good as f64 / all as f64;
    }
    let keep_score = f1(keep_precision, keep_recall);

    // DELETION (precision만 사용)
    let delete = subtract(&source_rep, &prediction_rep);
    let delete_good = subtract(&delete, &reference_counts);

    let mut delete_precision = 1.0;
    if !delete.is_empty() {
        let sum: f64 = delete
            .iter()
            .map(|(g, &c)| delete_good.get(g).copied().unwrap_or(0) as f64 / c as f64)
            .sum();
        delete_precision = sum / delete.len() as f64;
    }

    // ADDITION (집합 기준)
    let source_set: HashSet<&str> = source_counts.keys().copied().collect();
    let reference_set: HashSet<&str> = reference_counts.keys().copied().collect();
    let added: HashSet<&str> = prediction_counts
        .keys()
        .copied()
        .filter(|g| !source_set.contains(g))
        .collect();
    let added_good = added.iter().filter(|g| reference_set.contains(*g)).count();
    let added_all = reference_set.iter().filter(|g| !source_set.contains(*g)).count();

    let add_precision = if added.is_empty() {
        1.0
    } else {
        added_good as f64 / added.len() as f64
    };
    let add_recall = if added_all == 0 {
        1.0
    } else {
        added_good as f64 / added_all as f64
    };
    let add_score = f1(add_precision, add_recall);

    (keep_score, delete_precision, add_score)
}

/// SARI 점수 계산기
#[derive(Debug, Clone)]
pub struct Sari {
    tokenizer: Tokenizer13a,
}

impl Sari {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer13a::new()?,
        })
    }

    fn normalize(&self, sentence: &str) -> String {
        self.tokenizer.tokenize(&sentence.to_lowercase())
    }

    /// 한 문장의 SARI (0.0 ~ 1.0)
    pub fn sentence_score(&self, source: &str, prediction: &str, references: &[&str]) -> f64 {
        let source = self.normalize(source);
        let prediction = self.normalize(prediction);
        let references: Vec<String> = references.iter().map(|r| self.normalize(r)).collect();

        let source_tokens: Vec<&str> = source.split(' ').collect();
        let prediction_tokens: Vec<&str> = prediction.split(' ').collect();
        let reference_tokens: Vec<Vec<&str>> = references.iter().map(|r| r.split(' ').collect()).collect();

        let mut keep = 0.0;
        let mut delete = 0.0;
        let mut add = 0.0;

        for n in 1..=MAX_NGRAM {
            let s = ngrams(&source_tokens, n);
            let c = ngrams(&prediction_tokens, n);
            let r: Vec<Vec<String>> = reference_tokens.iter().map(|t| ngrams(t, n)).collect();
            let (k, d, a) = sari_ngram(&s, &c, &r);
            keep += k;
            delete += d;
            add += a;
        }

        let n = MAX_NGRAM as f64;
        (keep / n + delete / n + add / n) / 3.0
    }

    /// 문장별 SARI 평균 (0 ~ 100)
    pub fn corpus_score(&self, sources: &[String], predictions: &[String], references: &[Vec<String>]) -> f64 {
        if predictions.is_empty() {
            return 0.0;
        }

        let total: f64 = sources
            .iter()
            .zip(predictions)
            .zip(references)
            .map(|((s, p), refs)| {
                let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
                self.sentence_score(s, p, &refs)
            })
            .sum();

        100.0 * total / predictions.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reference_example() {
        // evaluate-metric/sari 문서 예제
        let sari = Sari::new().expect("sari");
        let score = sari.corpus_score(
            &strings(&["About 95 species are currently accepted."]),
            &strings(&["About 95 you now get in."]),
            &[strings(&[
                "About 95 species are currently known.",
                "About 95 species are now accepted.",
                "95 species are now accepted.",
            ])],
        );
        assert!((score - 26.953601953601954).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_perfect_rewrite() {
        let sari = Sari::new().expect("sari");
        let score = sari.sentence_score(
            "수술 부위를 청결히 유지하십시오.",
            "수술한 곳을 깨끗하게 하세요.",
            &["수술한 곳을 깨끗하게 하세요."],
        );
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_copying_source_is_penalized() {
        let sari = Sari::new().expect("sari");
        let score = sari.sentence_score(
            "수술 부위를 청결히 유지하십시오.",
            "수술 부위를 청결히 유지하십시오.",
            &["수술한 곳을 깨끗하게 하세요."],
        );
        assert!((score - 0.3611111111111111).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_corpus_average() {
        let sari = Sari::new().expect("sari");
        let score = sari.corpus_score(
            &strings(&["수술 후 1주일 동안 샤워를 하지 마십시오.", "무거운 물건을 들지 마십시오."]),
            &strings(&["수술 후 7일 동안 씻지 마세요.", "무거운 것을 들지 마세요."]),
            &[
                strings(&["수술하고 7일 동안은 씻지 마세요."]),
                strings(&["무거운 것을 들지 마세요."]),
            ],
        );
        assert!((score - 82.38425925925925).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_empty_sentences() {
        let sari = Sari::new().expect("sari");
        assert!((sari.sentence_score("", "", &[""]) - 1.0).abs() < 1e-9);
        assert_eq!(sari.corpus_score(&[], &[], &[]), 0.0);
    }

    #[test]
    fn test_ngrams() {
        let tokens = ["a", "b", "c"];
        assert_eq!(ngrams(&tokens, 2), vec!["a b", "b c"]);
        assert!(ngrams(&tokens, 4).is_empty());
    }
}
