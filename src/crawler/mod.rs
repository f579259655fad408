//! 크롤러 모듈 - 병원 홈페이지 퇴원 안내문 문장 수집
//!
//! - [`asan`]: 서울아산병원 건강정보 > 수술/치료 후 관리 (부위별 목록 → 상세 페이지)
//! - [`snuh`]: 서울대병원 수술치료 게시판 (게시글 번호 범위)
//!
//! 두 크롤러 모두 순차적으로 한 페이지씩 요청하며, 실패한 페이지는 로그만 남기고
//! 건너뜁니다. HTML 파싱은 네트워크와 분리된 순수 함수이고, 페이지 요청은
//! [`PageSource`] 뒤에 있어 수집 루프도 오프라인으로 테스트할 수 있습니다.

pub mod asan;
pub mod snuh;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use url::Url;

/// 크롤러 User-Agent
const USER_AGENT: &str = "Mozilla/5.0 (compatible; medi-rewrite/0.1)";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PageSource
// ============================================================================

/// URL로 HTML 본문을 주는 페이지 공급자
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl PageSource for HtmlFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        HtmlFetcher::fetch(self, url).await
    }
}

// ============================================================================
// HtmlFetcher
// ============================================================================

/// HTML 페이지 요청기
pub struct HtmlFetcher {
    client: reqwest::Client,
}

impl HtmlFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self { client })
    }

    /// URL의 HTML 본문 가져오기 (2xx가 아니면 에러)
    pub async fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("HTTP 요청 실패: {}", url))?
            .error_for_status()
            .with_context(|| format!("HTTP 오류 응답: {}", url))?;

        response.text().await.context("응답 본문 읽기 실패")
    }
}

// ============================================================================
// HTML Helpers
// ============================================================================

/// CSS 셀렉터 파싱
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

/// 요소의 텍스트 노드를 각각 trim 한 뒤, 빈 노드는 버리고 `separator`로 연결
pub(crate) fn joined_text(element: &ElementRef, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// 링크를 페이지 URL 기준 절대 URL로 변환
pub(crate) fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// 한글 음절(가-힣) 포함 여부
pub fn contains_hangul(text: &str) -> bool {
    text.chars().any(|c| ('가'..='힣').contains(&c))
}

// ============================================================================
// Test Support
// ============================================================================
