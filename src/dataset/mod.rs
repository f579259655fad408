//! 데이터셋 모듈 - 문장 쌍 CSV 입출력
//!
//! - 리라이팅 데이터셋: `original_text` → `simple_text` 문장 쌍
//! - 수집 결과: 크롤러가 저장하는 원문 문장 목록
//! - 병합: 수집 결과와 직접 리라이팅한 파일을 하나의 데이터셋으로 합침

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 아직 리라이팅되지 않은 문장의 `simple_text` 값
pub const PENDING_PLACEHOLDER: &str = "추가 예정";

/// 데이터셋 에러
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("{path}: 필수 컬럼 '{column}'이(가) 없습니다")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}: 사용할 수 있는 문장 쌍이 없습니다")]
    Empty { path: PathBuf },
}

// ============================================================================
// Types
// ============================================================================

/// 원문 / 쉬운 문장 쌍
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentencePair {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub original_text: String,
    pub simple_text: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl SentencePair {
    pub fn new(original_text: impl Into<String>, simple_text: impl Into<String>) -> Self {
        Self {
            id: None,
            category: None,
            original_text: original_text.into(),
            simple_text: simple_text.into(),
            source: None,
        }
    }

    /// 원문과 리라이팅이 모두 채워져 있는지
    pub fn is_complete(&self) -> bool {
        let simple = self.simple_text.trim();
        !self.original_text.trim().is_empty() && !simple.is_empty() && simple != PENDING_PLACEHOLDER
    }
}

/// 크롤러가 수집한 문장
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedSentence {
    pub id: String,
    pub category: Option<String>,
    pub original_text: String,
    pub simple_text: String,
    pub source: String,
    pub collector: String,
}

// ============================================================================
// Reading
// ============================================================================

fn require_columns(path: &Path, headers: &csv::StringRecord, columns: &[&'static str]) -> Result<()> {
    for column in columns {
        if !headers.iter().any(|h| h.trim_start_matches('\u{feff}') == *column) {
            return Err(DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column: *column,
            }
            .into());
        }
    }
    Ok(())
}

/// CSV의 모든 행을 읽기 (필터링 없음)
pub fn read_pairs(path: &Path) -> Result<Vec<SentencePair>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    require_columns(path, &headers, &["original_text", "simple_text"])?;

    let mut pairs = Vec::new();
    for (line, record) in reader.deserialize::<SentencePair>().enumerate() {
        let pair = record.with_context(|| format!("{}: invalid row {}", path.display(), line + 2))?;
        pairs.push(pair);
    }
    Ok(pairs)
}

/// 리라이팅 데이터셋 로드
///
/// 원문이나 리라이팅이 비어 있는 행, 아직 리라이팅되지 않은 행은 건너뜁니다.
pub fn load_pairs(path: &Path) -> Result<Vec<SentencePair>> {
    let rows = read_pairs(path)?;
    let total = rows.len();

    let pairs: Vec<SentencePair> = rows
        .into_iter()
        .filter(SentencePair::is_complete)
        .map(|mut p| {
            p.original_text = p.original_text.trim().to_string();
            p.simple_text = p.simple_text.trim().to_string();
            p
        })
        .collect();

    if pairs.len() < total {
        tracing::warn!(
            "{}: skipped {} incomplete rows",
            path.display(),
            total - pairs.len()
        );
    }

    if pairs.is_empty() {
        return Err(DatasetError::Empty {
            path: path.to_path_buf(),
        }
        .into());
    }

    tracing::info!("Loaded {} sentence pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}

/// 평가용 문장 목록
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationSet {
    pub originals: Vec<String>,
    pub references: Vec<String>,
    /// 리라이팅 컬럼이 지정된 경우에만 채워짐
    pub rewrites: Option<Vec<String>>,
}

/// 평가용 CSV 로드
///
/// `original_text`, `simple_text`(정답)는 필수이고, `rewrite_column`을 주면 그
/// 컬럼을 모델 출력으로 읽습니다. 원문이나 정답이 비어 있는 행은 건너뜁니다.
pub fn load_evaluation_set(path: &Path, rewrite_column: Option<&str>) -> Result<EvaluationSet> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    require_columns(path, &headers, &["original_text", "simple_text"])?;

    let position = |name: &str| headers.iter().position(|h| h == name);
    let original_idx = position("original_text");
    let reference_idx = position("simple_text");
    let rewrite_idx = match rewrite_column {
        Some(column) => Some(position(column).ok_or_else(|| {
            anyhow::anyhow!("{}: 리라이팅 컬럼 '{}'이(가) 없습니다", path.display(), column)
        })?),
        None => None,
    };

    let mut set = EvaluationSet {
        rewrites: rewrite_idx.map(|_| Vec::new()),
        ..Default::default()
    };

    for record in reader.records() {
        let record = record.context("Failed to read CSV row")?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let pair = SentencePair::new(field(original_idx), field(reference_idx));
        if !pair.is_complete() {
            continue;
        }
        set.originals.push(pair.original_text);
        set.references.push(pair.simple_text);
        if let Some(rewrites) = set.rewrites.as_mut() {
            rewrites.push(field(rewrite_idx));
        }
    }

    if set.originals.is_empty() {
        return Err(DatasetError::Empty {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(set)
}

// ============================================================================
// Writing
// ============================================================================

/// 기존 파일 삭제 (열려 있어 지울 수 없으면 에러)
fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).with_context(|| {
            format!(
                "{} 파일을 삭제할 수 없습니다. 다른 프로그램에서 열려 있다면 먼저 닫아 주세요.",
                path.display()
            )
        })?;
    }
    Ok(())
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("{}에 쓸 수 없습니다. 디스크 권한을 확인해 주세요.", path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

/// 수집 결과 저장
///
/// `with_category`가 false이면 category 컬럼 없이
/// `id, original_text, simple_text, source, collector` 순서로 씁니다.
pub fn write_collected(path: &Path, rows: &[CollectedSentence], with_category: bool) -> Result<()> {
    remove_existing(path)?;
    let mut writer = create_writer(path)?;

    if with_category {
        writer.write_record(["id", "category", "original_text", "simple_text", "source", "collector"])?;
    } else {
        writer.write_record(["id", "original_text", "simple_text", "source", "collector"])?;
    }

    for row in rows {
        let category = row.category.as_deref().unwrap_or("");
        if with_category {
            writer.write_record([
                row.id.as_str(),
                category,
                row.original_text.as_str(),
                row.simple_text.as_str(),
                row.source.as_str(),
                row.collector.as_str(),
            ])?;
        } else {
            writer.write_record([
                row.id.as_str(),
                row.original_text.as_str(),
                row.simple_text.as_str(),
                row.source.as_str(),
                row.collector.as_str(),
            ])?;
        }
    }

    writer.flush().context("Failed to flush CSV")?;
    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// 문장 쌍 저장
pub fn write_pairs(path: &Path, pairs: &[SentencePair]) -> Result<()> {
    remove_existing(path)?;
    let mut writer = create_writer(path)?;
    writer.write_record(["id", "category", "original_text", "simple_text", "source"])?;

    for pair in pairs {
        writer.write_record([
            pair.id.as_deref().unwrap_or(""),
            pair.category.as_deref().unwrap_or(""),
            pair.original_text.as_str(),
            pair.simple_text.as_str(),
            pair.source.as_deref().unwrap_or(""),
        ])?;
    }

    writer.flush().context("Failed to flush CSV")?;
    Ok(())
}

// ============================================================================
// Combine
// ============================================================================

/// 병합 통계
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineStats {
    pub read: usize,
    pub incomplete: usize,
    pub duplicates: usize,
    pub written: usize,
}

/// 수집/리라이팅 파일들을 하나의 리라이팅 데이터셋으로 병합
///
/// 리라이팅이 있는 행만 남기고, 원문이 같은 행은 처음 것만 유지하며,
/// id를 1부터 다시 매깁니다.
pub fn combine(inputs: &[PathBuf], output: &Path) -> Result<CombineStats> {
    let mut stats = CombineStats::default();
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for input in inputs {
        let rows = read_pairs(input)?;
        stats.read += rows.len();

        for mut row in rows {
            if !row.is_complete() {
                stats.incomplete += 1;
                continue;
            }
            row.original_text = row.original_text.trim().to_string();
            row.simple_text = row.simple_text.trim().to_string();
            if !seen.insert(row.original_text.clone()) {
                stats.duplicates += 1;
                continue;
            }
            merged.push(row);
        }
    }

    for (i, row) in merged.iter_mut().enumerate() {
        row.id = Some((i + 1).to_string());
        if row.category.as_deref().map(str::is_empty).unwrap_or(false) {
            row.category = None;
        }
    }

    write_pairs(output, &merged)?;
    stats.written = merged.len();
    Ok(stats)
}

// ============================================================================
// Tests
// ============================================================================
