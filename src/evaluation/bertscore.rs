//! BERTScore - 토큰 임베딩 기반 의미 유사도
//!
//! source: Zhang et al., "BERTScore: Evaluating Text Generation with BERT" (ICLR 2020)
//!
//! 후보 문장과 참조 문장의 토큰 벡터를 코사인 유사도로 greedy 매칭합니다.
//! - recall: 참조 토큰마다 가장 비슷한 후보 토큰 점수의 평균
//! - precision: 후보 토큰마다 가장 비슷한 참조 토큰 점수의 평균
//! - F1: 둘의 조화 평균
//!
//! IDF 가중치는 사용하지 않습니다.
//!
//! 원점수는 관련 없는 문장끼리도 높게 나오므로, 기본으로 베이스라인
//! `b`(무작위 문장 쌍의 평균 점수)를 빼서 `(x - b) / (1 - b)`로 다시 매깁니다.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::embedding::BertEncoder;
use crate::retrieval::{inner_product, normalize_l2};

/// 문장별 토큰 임베딩을 만드는 인코더
pub trait TokenEmbedder {
    /// 문장마다 토큰 벡터 목록 (특수 토큰 제외)
    fn token_embeddings(&self, sentences: &[&str]) -> Result<Vec<Vec<Vec<f32>>>>;
}

impl TokenEmbedder for BertEncoder {
    fn token_embeddings(&self, sentences: &[&str]) -> Result<Vec<Vec<Vec<f32>>>> {
        BertEncoder::token_embeddings(self, sentences)
    }
}

/// 한 문장 쌍의 BERTScore
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// 베이스라인 리스케일링 값
///
/// `(x - b) / (1 - b)`로 점수를 다시 매깁니다. 언어/모델/레이어마다 다릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// 베이스라인 추정에 쓰는 최대 문장 수
const BASELINE_SAMPLE_LIMIT: usize = 1000;

impl Baseline {
    /// 각 값은 1보다 작은 유한수여야 합니다.
    pub fn new(precision: f32, recall: f32, f1: f32) -> Result<Self> {
        for (name, value) in [("precision", precision), ("recall", recall), ("f1", f1)] {
            if !value.is_finite() || value >= 1.0 {
                anyhow::bail!("Baseline {} must be a finite value below 1.0, got {}", name, value);
            }
        }
        Ok(Self {
            precision,
            recall,
            f1,
        })
    }

    /// bert_score `rescale_baseline/<lang>/<model>.tsv` 형식에서 레이어 행 읽기
    ///
    /// 헤더 `LAYER,P,R,F` 다음 레이어별 한 행 (쉼표 또는 탭 구분).
    pub fn from_table(table: &str, layer: usize) -> Result<Self> {
        let header = table.lines().next().unwrap_or("");
        let delimiter = if header.contains('\t') { b'\t' } else { b',' };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(table.as_bytes());

        for record in reader.records() {
            let record = record.context("Failed to read baseline table row")?;
            let field = |i: usize| -> Result<f32> {
                record
                    .get(i)
                    .context("Baseline table row has fewer than 4 columns")?
                    .parse::<f32>()
                    .context("Baseline table value is not a number")
            };
            if field(0)? as usize == layer {
                return Self::new(field(1)?, field(2)?, field(3)?);
            }
        }
        anyhow::bail!("Baseline table has no row for layer {}", layer)
    }

    /// 서로 관련 없는 문장 쌍의 평균 점수로 베이스라인 추정
    ///
    /// 중복을 뺀 문장 `n`개를 `i`번째와 `(i + n/2) % n`번째끼리 짝지어 점수를 매깁니다.
    /// 서로 다른 문장이 2개 미만이면 에러입니다.
    pub fn estimate(sentences: &[String], embedder: &dyn TokenEmbedder) -> Result<Self> {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = sentences
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && seen.insert(*s))
            .take(BASELINE_SAMPLE_LIMIT)
            .collect();
        if distinct.len() < 2 {
            anyhow::bail!(
                "Need at least 2 distinct sentences to estimate a BERTScore baseline, got {}",
                distinct.len()
            );
        }

        let tokens = embedder.token_embeddings(&distinct)?;
        let n = tokens.len();
        let offset = n / 2;
        let scores: Vec<PairScore> = (0..n)
            .map(|i| score_pair(&tokens[i], &tokens[(i + offset) % n]))
            .collect();

        let mean = |f: fn(&PairScore) -> f32| scores.iter().map(f).sum::<f32>() / n as f32;
        let baseline = Self::new(
            mean(|s: &PairScore| s.precision),
            mean(|s: &PairScore| s.recall),
            mean(|s: &PairScore| s.f1),
        )
            .context("Estimated baseline is degenerate")?;
        tracing::info!(
            "Estimated BERTScore baseline from {} sentences: P {:.4} R {:.4} F {:.4}",
            n,
            baseline.precision,
            baseline.recall,
            baseline.f1
        );
        Ok(baseline)
    }

    pub fn rescale(&self, score: PairScore) -> PairScore {
        PairScore {
            precision: rescale(score.precision, self.precision),
            recall: rescale(score.recall, self.recall),
            f1: rescale(score.f1, self.f1),
        }
    }
}

/// 리스케일링 방식
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Rescale {
    /// 원점수 그대로
    Off,
    /// 주어진 베이스라인
    Fixed(Baseline),
    /// 평가 문장으로 베이스라인 추정
    #[default]
    Estimate,
}

fn rescale(value: f32, baseline: f32) -> f32 {
    (value - baseline) / (1.0 - baseline)
}

fn normalized(tokens: &[Vec<f32>]) -> Vec<Vec<f32>> {
    tokens
        .iter()
        .map(|t| {
            let mut t = t.clone();
            normalize_l2(&mut t);
            t
        })
        .collect()
}

fn mean_best_match(from: &[Vec<f32>], to: &[Vec<f32>]) -> f32 {
    let total: f32 = from
        .iter()
        .map(|a| {
            to.iter()
                .map(|b| inner_product(a, b))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .sum();
    total / from.len() as f32
}

/// 토큰 벡터 greedy 매칭
///
/// 어느 한쪽이라도 토큰이 없으면 모든 점수가 0입니다.
pub fn score_pair(candidate: &[Vec<f32>], reference: &[Vec<f32>]) -> PairScore {
    if candidate.is_empty() || reference.is_empty() {
        return PairScore {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        };
    }

    let candidate = normalized(candidate);
    let reference = normalized(reference);

    let precision = mean_best_match(&candidate, &reference);
    let recall = mean_best_match(&reference, &candidate);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    PairScore {
        precision,
        recall,
        f1,
    }
}

/// 문장 쌍별 BERTScore
pub fn bertscore(
    candidates: &[String],
    references: &[String],
    embedder: &dyn TokenEmbedder,
    baseline: Option<Baseline>,
) -> Result<Vec<PairScore>> {
    if candidates.len() != references.len() {
        anyhow::bail!(
            "candidate/reference count mismatch: {} vs {}",
            candidates.len(),
            references.len()
        );
    }

    let candidate_refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
    let reference_refs: Vec<&str> = references.iter().map(String::as_str).collect();
    let candidate_tokens = embedder.token_embeddings(&candidate_refs)?;
    let reference_tokens = embedder.token_embeddings(&reference_refs)?;

    Ok(candidate_tokens
        .iter()
        .zip(&reference_tokens)
        .map(|(c, r)| {
            let score = score_pair(c, r);
            match baseline {
                Some(b) => b.rescale(score),
                None => score,
            }
        })
        .collect())
}

/// F1 평균
pub fn mean_f1(scores: &[PairScore]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.f1).sum::<f32>() / scores.len() as f32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 글자마다 one-hot 벡터를 주는 테스트 인코더
    pub(crate) struct CharTokens;

    impl TokenEmbedder for CharTokens {
        fn token_embeddings(&self, sentences: &[&str]) -> Result<Vec<Vec<Vec<f32>>>> {
            Ok(sentences
                .iter()
                .map(|s| {
                    s.chars()
                        .filter(|c| !c.is_whitespace())
                        .map(|c| {
                            let mut v = vec![0.0; 32];
                            v[(c as usize) % 32] = 1.0;
                            v
                        })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_identical_tokens_score_one() {
        let tokens = vec![vec![1.0, 0.0], vec![0.0, 2.0]];
        let score = score_pair(&tokens, &tokens);
        assert!((score.precision - 1.0).abs() < 1e-6);
        assert!((score.recall - 1.0).abs() < 1e-6);
        assert!((score.f1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_overlap() {
        // 후보: [x], 참조: [x, y] → precision 1, recall 0.5
        let candidate = vec![vec![1.0, 0.0]];
        let reference = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let score = score_pair(&candidate, &reference);
        assert!((score.precision - 1.0).abs() < 1e-6);
        assert!((score.recall - 0.5).abs() < 1e-6);
        assert!((score.f1 - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_side_scores_zero() {
        let score = score_pair(&[], &[vec![1.0]]);
        assert_eq!(score.f1, 0.0);
    }

    #[test]
    fn test_baseline_rescale() {
        let baseline = Baseline::new(0.5, 0.5, 0.6).expect("valid baseline");
        let scaled = baseline.rescale(PairScore {
            precision: 0.75,
            recall: 1.0,
            f1: 0.8,
        });
        assert!((scaled.precision - 0.5).abs() < 1e-6);
        assert!((scaled.recall - 1.0).abs() < 1e-6);
        assert!((scaled.f1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_bertscore_with_char_tokens() {
        let candidates = vec!["가나".to_string(), "다라".to_string()];
        let references = vec!["가나".to_string(), "가나".to_string()];
        let scores = bertscore(&candidates, &references, &CharTokens, None).expect("bertscore");

        assert_eq!(scores.len(), 2);
        assert!((scores[0].f1 - 1.0).abs() < 1e-6);
        assert!(scores[1].f1 < 1.0);
        assert!(mean_f1(&scores) < 1.0);
    }

    #[test]
    fn test_bertscore_length_mismatch() {
        let result = bertscore(&["a".to_string()], &[], &CharTokens, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_baseline_rejects_one_and_nan() {
        assert!(Baseline::new(0.5, 0.5, 1.0).is_err());
        assert!(Baseline::new(1.5, 0.5, 0.5).is_err());
        assert!(Baseline::new(f32::NAN, 0.5, 0.5).is_err());
        assert!(Baseline::new(-0.2, 0.0, 0.99).is_ok());
    }

    #[test]
    fn test_baseline_from_table() {
        let table = "LAYER,P,R,F\n8,0.60,0.61,0.62\n9,0.70,0.71,0.72\n";
        let baseline = Baseline::from_table(table, 9).expect("layer 9 row");
        assert_eq!(baseline, Baseline::new(0.70, 0.71, 0.72).expect("valid"));

        let tabbed = "LAYER\tP\tR\tF\n9\t0.7\t0.7\t0.7\n";
        assert!(Baseline::from_table(tabbed, 9).is_ok());

        assert!(Baseline::from_table(table, 12).is_err());
        assert!(Baseline::from_table("LAYER,P,R,F\n9,0.7,0.7,1.0\n", 9).is_err());
    }

    #[test]
    fn test_estimate_baseline_from_unrelated_pairs() {
        // 가, 나, 다는 서로 다른 one-hot: "가나" 대 "가다"는 토큰 절반만 일치
        let sentences = vec!["가나".to_string(), "가다".to_string(), "가나".to_string()];
        let baseline = Baseline::estimate(&sentences, &CharTokens).expect("estimate failed");
        assert!((baseline.precision - 0.5).abs() < 1e-6);
        assert!((baseline.recall - 0.5).abs() < 1e-6);
        assert!((baseline.f1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_baseline_needs_two_sentences() {
        let same = vec!["가나".to_string(), " 가나 ".to_string()];
        assert!(Baseline::estimate(&same, &CharTokens).is_err());
        assert!(Baseline::estimate(&[], &CharTokens).is_err());
    }
}
