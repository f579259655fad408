//! 임베딩 모듈 - 문장을 고정 크기 벡터로 변환
//!
//! 두 가지 프로바이더를 제공합니다.
//! - [`LocalBertEmbedding`]: Hugging Face BERT 모델을 candle로 직접 실행 (기본값)
//! - [`GeminiEmbedding`]: Gemini 임베딩 API 호출
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&EmbeddingConfig::default())?;
//! let embedding = embedder.embed("수술 부위를 깨끗하게 유지하세요.").await?;
//! ```

mod bert;
mod gemini;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbeddingConfig, ProviderKind};

pub use bert::{BertEncoder, BertSource, LocalBertEmbedding};
pub use gemini::GeminiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 문장 임베딩 프로바이더
///
/// 데이터셋 문장과 쿼리는 같은 프로바이더로 인코딩해야 비교할 수 있습니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 입력 순서대로 임베딩 (기본: 한 문장씩)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize;

    /// 로그에 표시할 이름
    fn name(&self) -> &str;
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::Gemini => {
            if !has_api_key() {
                anyhow::bail!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key\n\
                     Or use the local provider: --provider local"
                );
            }
            let embedder = GeminiEmbedding::from_env_with_dimension(config.dimension)?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        ProviderKind::Local => {
            let source = BertSource::new(config.model_id.clone())
                .with_revision(config.revision.clone());
            let embedder = LocalBertEmbedding::load(&source, config.cpu)?;
            tracing::info!(
                "Using local embedding {} (dimension: {})",
                embedder.name(),
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
    }
}

// ============================================================================
// Test Support
// ============================================================================

/// 결정적 테스트용 임베딩 (문자 빈도 벡터)
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) const DIMENSION: usize = 64;

    pub(crate) struct CharEmbedding;

    #[async_trait]
    impl EmbeddingProvider for CharEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0; DIMENSION];
            for c in text.chars().filter(|c| !c.is_whitespace()) {
                vector[(c as usize) % DIMENSION] += 1.0;
            }
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            DIMENSION
        }

        fn name(&self) -> &str {
            "char-frequency"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use super::testing::{CharEmbedding, DIMENSION};

    #[tokio::test]
    async fn test_default_batch_keeps_order() {
        let texts = vec!["가".to_string(), "나나".to_string()];
        let batch = CharEmbedding.embed_batch(&texts).await.expect("batch failed");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], CharEmbedding.embed("가").await.expect("embed failed"));
        assert_eq!(batch[1].iter().sum::<f32>(), 2.0);
        assert_eq!(batch[1].len(), DIMENSION);
    }

    #[test]
    fn test_gemini_requires_api_key() {
        std::env::remove_var("GEMINI_API_KEY");
        std::env::remove_var("GOOGLE_AI_API_KEY");
        assert!(!has_api_key());

        let config = EmbeddingConfig {
            provider: ProviderKind::Gemini,
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
        assert!(get_api_key().is_err());
    }
}
