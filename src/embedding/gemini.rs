//! Gemini 임베딩 - gemini-embedding-001 API
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 문장 간 유사도 비교가 목적이므로 task type은 `SEMANTIC_SIMILARITY`를
//! 사용합니다. 데이터셋 문장과 쿼리 문장 모두 같은 방식으로 임베딩됩니다.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{get_api_key, EmbeddingProvider};
use crate::config::DEFAULT_DIMENSION;

/// Gemini 임베딩 API 엔드포인트
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

const GEMINI_MODEL: &str = "models/gemini-embedding-001";
const TASK_TYPE: &str = "SEMANTIC_SIMILARITY";

/// 지원 차원 (MRL)
const VALID_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 무료 티어 한도: 분당 60회, 호출 간 최소 1초
const REQUESTS_PER_WINDOW: usize = 60;
const WINDOW: Duration = Duration::from_secs(60);
const MIN_SPACING: Duration = Duration::from_secs(1);

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

// ============================================================================
// Request pacing
// ============================================================================

/// 슬라이딩 윈도우 + 최소 간격 요청 페이서
#[derive(Debug)]
struct Pacer {
    sent: VecDeque<Instant>,
    limit: usize,
    window: Duration,
    spacing: Duration,
}

impl Pacer {
    fn new(limit: usize, window: Duration, spacing: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(limit),
            limit,
            window,
            spacing,
        }
    }

    /// `now` 시점에 보내려면 얼마나 기다려야 하는지
    fn wait_time(&mut self, now: Instant) -> Duration {
        while let Some(&first) = self.sent.front() {
            if now.duration_since(first) < self.window {
                break;
            }
            self.sent.pop_front();
        }

        let spacing_wait = self
            .sent
            .back()
            .map(|&last| self.spacing.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();

        let window_wait = if self.sent.len() >= self.limit {
            self.sent
                .front()
                .map(|&first| self.window.saturating_sub(now.duration_since(first)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        spacing_wait.max(window_wait)
    }

    async fn pace(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Pacing Gemini request: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.sent.push_back(Instant::now());
    }
}

fn backoff_for(attempt: u32) -> Duration {
    INITIAL_BACKOFF * 2u32.pow(attempt)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'static str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Values,
}

#[derive(Debug, Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// API 에러 본문이 JSON이면 status/message를, 아니면 원문을 담은 에러
fn api_error(status: StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => anyhow!("Gemini API error ({}): {}", error.status, error.message),
        Err(_) => anyhow!("Gemini API error ({}): {}", status, body),
    }
}

/// 요청 1회 결과
enum Attempt {
    Done(Vec<f32>),
    /// 429 또는 전송 실패
    Retryable(anyhow::Error),
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 프로바이더
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    pacer: Arc<Mutex<Pacer>>,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원 지정 (768, 1536, 3072)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !VALID_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be one of {:?}",
                dimension,
                VALID_DIMENSIONS
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            pacer: Arc::new(Mutex::new(Pacer::new(
                REQUESTS_PER_WINDOW,
                WINDOW,
                MIN_SPACING,
            ))),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    fn request_body<'a>(&self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: GEMINI_MODEL,
            content: Content {
                parts: [Part { text }],
            },
            task_type: TASK_TYPE,
            output_dimensionality: self.dimension,
        }
    }

    async fn send_once(&self, request: &EmbedRequest<'_>) -> Result<Attempt> {
        self.pacer.lock().await.pace().await;

        // API 키는 URL이 아닌 헤더로 전송
        let response = match self
            .client
            .post(GEMINI_EMBED_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Retryable(anyhow!("Failed to send embedding request: {}", e))),
        };

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;

        if status.is_success() {
            let parsed: EmbedResponse =
                serde_json::from_str(&body).context("Failed to parse embedding response")?;
            return Ok(Attempt::Done(parsed.embedding.values));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Retryable(anyhow!("Rate limit exceeded (429)")));
        }
        Err(api_error(status, &body))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        tracing::debug!("Embedding {} chars with Gemini", text.chars().count());
        let request = self.request_body(text);
        let mut attempt = 0;
        loop {
            let error = match self.send_once(&request).await? {
                Attempt::Done(values) => return Ok(values),
                Attempt::Retryable(error) => error,
            };
            if attempt == MAX_RETRIES {
                return Err(error.context(format!("Embedding failed after {} retries", MAX_RETRIES)));
            }

            let backoff = backoff_for(attempt);
            attempt += 1;
            tracing::warn!("{}; retrying in {:?} ({}/{})", error, backoff, attempt, MAX_RETRIES);
            tokio::time::sleep(backoff).await;
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}
