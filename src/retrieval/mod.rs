//! Retrieval 모듈 - 최근접 이웃 리라이팅
//!
//! 1. 데이터셋의 원문 문장을 모두 임베딩
//! 2. 정규화 후 [`FlatIpIndex`]에 추가
//! 3. 쿼리를 같은 방식으로 임베딩해 가장 가까운 원문 1개를 찾고,
//!    그 원문의 쉬운 문장을 반환

mod index;

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::dataset::SentencePair;
use crate::embedding::EmbeddingProvider;

pub use index::{inner_product, normalize_l2, FlatIpIndex, IndexError};

/// 대화형 세션 종료 명령
pub const EXIT_COMMAND: &str = "exit";

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// 데이터셋 내 위치 (0-based)
    pub position: usize,
    /// 가장 가까운 원문
    pub original_text: String,
    /// 해당 원문의 쉬운 문장
    pub simple_text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// SimpleRewriter
// ============================================================================

/// 최근접 이웃 리라이터
///
/// 읽기 전용 조회 테이블입니다. 생성 후에는 데이터셋이 바뀌지 않습니다.
pub struct SimpleRewriter {
    pairs: Vec<SentencePair>,
    index: FlatIpIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SimpleRewriter {
    /// 문장 쌍으로 인덱스 구축
    pub async fn build(pairs: Vec<SentencePair>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if pairs.is_empty() {
            anyhow::bail!("Cannot build a rewriter from an empty dataset");
        }

        let originals: Vec<String> = pairs.iter().map(|p| p.original_text.clone()).collect();
        tracing::info!(
            "Encoding {} sentences with {}",
            originals.len(),
            embedder.name()
        );

        let embeddings = embedder
            .embed_batch(&originals)
            .await
            .context("Failed to embed dataset sentences")?;
        if embeddings.len() != pairs.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} sentences",
                embeddings.len(),
                pairs.len()
            );
        }

        let dimension = embeddings
            .first()
            .map(Vec::len)
            .unwrap_or_else(|| embedder.dimension());
        let mut index = FlatIpIndex::new(dimension);
        for embedding in embeddings {
            index.add(embedding)?;
        }

        tracing::info!("Index ready: {} vectors (dimension {})", index.len(), dimension);

        Ok(Self {
            pairs,
            index,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// 상위 k개 검색
    pub async fn retrieve_top(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let hits = self.index.search(&embedding, k)?;
        Ok(hits
            .into_iter()
            .map(|(position, score)| {
                let pair = &self.pairs[position];
                RetrievalHit {
                    position,
                    original_text: pair.original_text.clone(),
                    simple_text: pair.simple_text.clone(),
                    score,
                }
            })
            .collect())
    }

    /// 가장 가까운 문장 1개 검색
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalHit> {
        let hit = self
            .retrieve_top(query, 1)
            .await?
            .into_iter()
            .next()
            .context("Index returned no neighbor")?;

        tracing::debug!(
            "\"{}\" -> #{} (score {:.4})",
            query,
            hit.position,
            hit.score
        );
        Ok(hit)
    }

    /// 쿼리 문장에 대응하는 쉬운 문장
    pub async fn retrieve_simple_text(&self, query: &str) -> Result<String> {
        Ok(self.retrieve(query).await?.simple_text)
    }

    /// 여러 문장을 순서대로 리라이팅
    pub async fn rewrite_all(&self, queries: &[String]) -> Result<Vec<String>> {
        let mut rewrites = Vec::with_capacity(queries.len());
        for query in queries {
            rewrites.push(self.retrieve_simple_text(query).await?);
        }
        Ok(rewrites)
    }
}

// ============================================================================
// Interactive Session
// ============================================================================

/// 대화형 리라이팅 루프
///
/// `exit`(대소문자 무시) 또는 입력 끝에서 종료합니다. 빈 줄은 다시 묻습니다.
/// 변환한 문장 수를 반환합니다.
pub async fn run_session<R: BufRead, W: Write>(
    rewriter: &SimpleRewriter,
    mut input: R,
    output: &mut W,
) -> Result<usize> {
    writeln!(output, "\n=== 의료 안내문 쉬운 말 리라이팅 시스템 ===\n")?;
    let mut converted = 0;

    loop {
        write!(output, "변환할 문장을 입력하세요 (종료: {}): ", EXIT_COMMAND)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("Failed to read input")? == 0 {
            writeln!(output)?;
            break;
        }

        let query = line.trim();
        if query.eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }
        if query.is_empty() {
            continue;
        }

        let result = rewriter.retrieve_simple_text(query).await?;
        writeln!(output, "변경된 문장: {}\n", result)?;
        converted += 1;
    }

    writeln!(output, "종료합니다.")?;
    Ok(converted)
}

// ============================================================================
// Tests
// ============================================================================
