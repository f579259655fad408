//! 평가 모듈 - 리라이팅 결과 점수화
//!
//! - BERTScore (원문 대비 의미 보존)
//! - SARI (정답 리라이팅 대비 단순화 품질)
//! - 평균 문장 길이 (공백 기준 단어 수)

mod bertscore;
mod sari;
mod tokenize;

use std::fmt;

use anyhow::Result;
use serde::Serialize;

pub use bertscore::{bertscore, mean_f1, score_pair, Baseline, PairScore, Rescale, TokenEmbedder};
pub use sari::Sari;
pub use tokenize::Tokenizer13a;

const REPORT_RULE: &str = "──────────────────────────────";

/// 평균 문장 길이 (공백 기준 단어 수, 문장이 없으면 0)
pub fn avg_sentence_length(sentences: &[String]) -> f64 {
    if sentences.is_empty() {
        return 0.0;
    }
    let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    words as f64 / sentences.len() as f64
}

/// 평가 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub model_name: String,
    pub bertscore_f1: f32,
    pub sari: f64,
    pub avg_length: f64,
    pub sentences: usize,
    /// BERTScore 리스케일링에 쓴 베이스라인 (없으면 원점수)
    pub baseline: Option<Baseline>,
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "평가 결과 - {}", self.model_name)?;
        writeln!(f, "{}", REPORT_RULE)?;
        writeln!(f, "KoBERTScore:     {:.4}", self.bertscore_f1)?;
        writeln!(f, "SARI Score:      {:.2}", self.sari)?;
        writeln!(f, "평균 문장 길이:   {:.2} 단어", self.avg_length)?;
        if let Some(b) = &self.baseline {
            writeln!(f, "(BERTScore 기준선 P {:.4} / R {:.4} / F {:.4})", b.precision, b.recall, b.f1)?;
        }
        write!(f, "{}", REPORT_RULE)
    }
}

/// 원문과 리라이팅 나란히 출력용 문자열
pub fn format_pairs(originals: &[String], rewrites: &[String]) -> String {
    let mut out = String::new();
    for (i, (original, rewrite)) in originals.iter().zip(rewrites).enumerate() {
        out.push_str(&format!("[{}] Original : {}\n", i + 1, original));
        out.push_str(&format!("[{}] Rewrite  : {}\n", i + 1, rewrite));
        out.push_str(&"-".repeat(40));
        out.push('\n');
    }
    out
}

/// 전체 평가 실행
///
/// # Arguments
/// * `originals` - 원문 문장
/// * `rewrites` - 모델이 만든 문장
/// * `references` - 정답 문장 (원문에 대응하는 `simple_text`)
/// * `embedder` - BERTScore용 토큰 인코더
/// * `rescale` - BERTScore 리스케일링 (기본: 원문과 정답 문장으로 베이스라인 추정)
pub fn evaluate_model(
    model_name: &str,
    originals: &[String],
    rewrites: &[String],
    references: &[String],
    embedder: &dyn TokenEmbedder,
    rescale: Rescale,
) -> Result<EvaluationReport> {
    if originals.is_empty() {
        anyhow::bail!("No sentences to evaluate");
    }
    if originals.len() != rewrites.len() || originals.len() != references.len() {
        anyhow::bail!(
            "Length mismatch: {} originals, {} rewrites, {} references",
            originals.len(),
            rewrites.len(),
            references.len()
        );
    }

    tracing::info!("Evaluating {} sentences ({})", originals.len(), model_name);

    let baseline = match rescale {
        Rescale::Off => None,
        Rescale::Fixed(baseline) => Some(baseline),
        Rescale::Estimate => {
            let corpus: Vec<String> = originals.iter().chain(references).cloned().collect();
            Some(Baseline::estimate(&corpus, embedder)?)
        }
    };

    // 후보 = 리라이팅, 참조 = 원문
    let scores = bertscore(rewrites, originals, embedder, baseline)?;
    let bertscore_f1 = mean_f1(&scores);

    let sari_references: Vec<Vec<String>> = references.iter().map(|r| vec![r.clone()]).collect();
    let sari = Sari::new()?.corpus_score(originals, rewrites, &sari_references);

    Ok(EvaluationReport {
        model_name: model_name.to_string(),
        bertscore_f1,
        sari,
        avg_length: avg_sentence_length(rewrites),
        sentences: originals.len(),
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::bertscore::tests::CharTokens;
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_avg_sentence_length() {
        assert_eq!(avg_sentence_length(&[]), 0.0);
        let sentences = strings(&["무거운 것을 들지 마세요.", "열이 나면  병원에 와요."]);
        assert!((avg_sentence_length(&sentences) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_format() {
        let report = EvaluationReport {
            model_name: "retrieval".to_string(),
            bertscore_f1: 0.81234,
            sari: 42.456,
            avg_length: 5.0,
            sentences: 2,
            baseline: None,
        };
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "평가 결과 - retrieval");
        assert_eq!(lines[2], "KoBERTScore:     0.8123");
        assert_eq!(lines[3], "SARI Score:      42.46");
        assert_eq!(lines[4], "평균 문장 길이:   5.00 단어");
        assert_eq!(lines.len(), 6);

        let rescaled = EvaluationReport {
            baseline: Some(Baseline::new(0.25, 0.5, 0.75).expect("valid")),
            ..report
        };
        let text = rescaled.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[5], "(BERTScore 기준선 P 0.2500 / R 0.5000 / F 0.7500)");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_format_pairs() {
        let text = format_pairs(&strings(&["원문"]), &strings(&["쉬운 문장"]));
        assert_eq!(
            text,
            format!("[1] Original : 원문\n[1] Rewrite  : 쉬운 문장\n{}\n", "-".repeat(40))
        );
    }

    #[test]
    fn test_evaluate_model() {
        let originals = strings(&["수술 부위를 청결히 유지하십시오."]);
        let rewrites = strings(&["수술한 곳을 깨끗하게 하세요."]);
        let references = strings(&["수술한 곳을 깨끗하게 하세요."]);

        let report = evaluate_model("test", &originals, &rewrites, &references, &CharTokens, Rescale::Off)
            .expect("evaluate failed");
        assert_eq!(report.sentences, 1);
        assert!((report.sari - 100.0).abs() < 1e-9);
        assert!((report.avg_length - 4.0).abs() < 1e-9);
        assert!(report.bertscore_f1 > 0.0 && report.bertscore_f1 <= 1.0 + 1e-6);
    }

    #[test]
    fn test_evaluate_model_rejects_mismatch() {
        let result = evaluate_model(
            "test",
            &strings(&["a", "b"]),
            &strings(&["a"]),
            &strings(&["a", "b"]),
            &CharTokens,
            Rescale::Off,
        );
        assert!(result.is_err());
        assert!(evaluate_model("test", &[], &[], &[], &CharTokens, Rescale::default()).is_err());
    }

    #[test]
    fn test_evaluate_model_rescales_by_default() {
        let originals = strings(&["가나"]);
        let rewrites = strings(&["가다"]);
        let references = strings(&["가다"]);

        let raw = evaluate_model("raw", &originals, &rewrites, &references, &CharTokens, Rescale::Off)
            .expect("evaluate failed");
        assert!((raw.bertscore_f1 - 0.5).abs() < 1e-6);
        assert_eq!(raw.baseline, None);

        // 원문 "가나"와 정답 "가다"의 짝 점수 0.5가 기준선이 되어 0으로 다시 매겨짐
        let rescaled = evaluate_model(
            "rescaled",
            &originals,
            &rewrites,
            &references,
            &CharTokens,
            Rescale::default(),
        )
        .expect("evaluate failed");
        let baseline = rescaled.baseline.expect("baseline applied");
        assert!((baseline.f1 - 0.5).abs() < 1e-6);
        assert!(rescaled.bertscore_f1.abs() < 1e-6);

        let fixed = Baseline::new(0.0, 0.0, 0.25).expect("valid");
        let report = evaluate_model(
            "fixed",
            &originals,
            &rewrites,
            &references,
            &CharTokens,
            Rescale::Fixed(fixed),
        )
        .expect("evaluate failed");
        assert!((report.bertscore_f1 - 1.0 / 3.0).abs() < 1e-6);
    }
}
