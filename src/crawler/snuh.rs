//! 서울대병원 크롤러
//!
//! source: https://www.snuh.org/board/B016/view.do?bbs_no=3580
//!
//! 게시글 번호 범위를 순회하며 제목에 `퇴원`과 `주의`가 모두 들어간 글만
//! 처리합니다. 본문 `p` 중 마침표 없는 짧은 문단은 중간 제목(카테고리)으로,
//! 나머지는 그 카테고리 아래 문장으로 수집합니다.

use std::collections::HashSet;
use std::ops::Range;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use scraper::Html;

use super::{joined_text, selector, HtmlFetcher, PageSource};
use crate::dataset::{CollectedSentence, PENDING_PLACEHOLDER};

pub const BOARD_URL: &str = "https://www.snuh.org/board/B016/view.do?bbs_no=";

/// 기본 게시글 번호 범위
pub const DEFAULT_POSTS: Range<u32> = 3580..3612;

/// 카테고리로 간주할 최대 글자 수
const MAX_HEADING_CHARS: usize = 20;

/// 카테고리 이름 정규화 테이블 (게시글마다 다른 중간 제목 → 공통 이름)
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("식사", "식사"),
    ("식이", "식사"),
    ("식사와 영양", "식사"),
    ("운동", "운동"),
    ("운동 및 활동", "운동"),
    ("골반근육 강화운동", "운동"),
    ("골반근육강화운동", "운동"),
    ("목욕 및 샤워", "목욕 및 샤워"),
    ("상처관리 및 샤워", "목욕 및 샤워"),
    ("상처 관리", "상처 관리"),
    ("통증 관리", "통증 관리"),
    ("통증관리", "통증 관리"),
    ("일상생활", "일상생활"),
    ("흡연과 음주", "일상생활"),
    ("병원방문", "병원 방문"),
    ("병원을 방문해야 할 상황", "병원 방문"),
    ("배변과 좌욕", "배변 및 배뇨"),
    ("배뇨", "배변 및 배뇨"),
    ("요실금", "배변 및 배뇨"),
    ("복압성 요실금", "배변 및 배뇨"),
    ("소변줄을 가지고 퇴원하는 경우", "배변 및 배뇨"),
    ("장유착", "주의사항"),
    ("림프부종 예방", "주의사항"),
    ("복대", "주의사항"),
    ("안전관리", "주의사항"),
    ("발기부전", "주의사항"),
    ("기타", "주의사항"),
    ("장애인 등록", "장애인 등록"),
];

/// 중간 제목을 공통 카테고리로 변환 (테이블에 없으면 None)
pub fn normalize_category(raw: &str) -> Option<&'static str> {
    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, category)| *category)
}

/// 크롤러 설정
#[derive(Debug, Clone)]
pub struct SnuhConfig {
    pub board_url: String,
    pub posts: Range<u32>,
    pub collector: String,
    /// 게시글 요청 간 대기 시간
    pub delay: Duration,
}

impl Default for SnuhConfig {
    fn default() -> Self {
        Self {
            board_url: BOARD_URL.to_string(),
            posts: DEFAULT_POSTS,
            collector: "snuh-crawler".to_string(),
            delay: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// 카테고리 아래에서 수집된 문장
#[derive(Debug, Clone, PartialEq)]
pub struct RawSentence {
    pub category: String,
    pub text: String,
}

/// 게시글 파싱 결과
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// 제목 요소 없음
    NoTitle,
    /// 퇴원 주의사항 글이 아님
    NotDischarge { title: String },
    /// 본문 요소 없음
    NoContent { title: String },
    /// 수집 대상 글
    Collected {
        title: String,
        sentences: Vec<RawSentence>,
    },
}

/// 게시글 HTML 파싱
pub fn parse_post(html: &str) -> Result<PostOutcome> {
    let document = Html::parse_document(html);

    let Some(title) = document
        .select(&selector("div.viewTitle > h3")?)
        .next()
        .map(|h3| joined_text(&h3, ""))
    else {
        return Ok(PostOutcome::NoTitle);
    };

    if !(title.contains("퇴원") && title.contains("주의")) {
        return Ok(PostOutcome::NotDischarge { title });
    }

    let Some(content) = document.select(&selector("div.viewContent")?).next() else {
        return Ok(PostOutcome::NoContent { title });
    };

    let splitter = Regex::new(r"\.\s*")?;
    let paragraph = selector("p")?;
    let mut current_category: Option<String> = None;
    let mut sentences = Vec::new();

    for p in content.select(&paragraph) {
        let text = joined_text(&p, "").replace('\u{a0}', " ");
        let text = text.trim();

        // 빈 문단, 그림 설명 제외
        if text.is_empty() || text.contains("그림") {
            continue;
        }

        if text.chars().count() <= MAX_HEADING_CHARS && !text.contains('.') {
            current_category = Some(text.to_string());
            continue;
        }

        let Some(category) = current_category.as_ref() else {
            continue;
        };

        let clean = text.trim_start_matches(|c: char| c == '•' || c == ' ').trim();
        for piece in splitter.split(clean) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            sentences.push(RawSentence {
                category: category.clone(),
                text: format!("{}.", piece),
            });
        }
    }

    Ok(PostOutcome::Collected { title, sentences })
}

/// 수집 결과 후처리
///
/// 카테고리 정규화, 빈 문장 제거, 원문 기준 중복 제거(처음 것 유지), id 재부여(1부터).
pub fn finalize(raw: Vec<(String, RawSentence)>, collector: &str) -> Vec<CollectedSentence> {
    let mut seen = HashSet::new();

    raw.into_iter()
        .filter(|(_, s)| !s.text.trim().is_empty())
        .filter(|(_, s)| seen.insert(s.text.clone()))
        .enumerate()
        .map(|(i, (source, s))| CollectedSentence {
            id: (i + 1).to_string(),
            category: normalize_category(&s.category).map(str::to_string),
            original_text: s.text,
            simple_text: PENDING_PLACEHOLDER.to_string(),
            source,
            collector: collector.to_string(),
        })
        .collect()
}

// ============================================================================
// Crawler
// ============================================================================

/// 서울대병원 크롤러
pub struct SnuhCrawler<S = HtmlFetcher> {
    source: S,
    config: SnuhConfig,
}

impl SnuhCrawler {
    pub fn new(config: SnuhConfig) -> Result<Self> {
        Ok(Self::with_source(HtmlFetcher::new()?, config))
    }
}

impl<S: PageSource> SnuhCrawler<S> {
    pub fn with_source(source: S, config: SnuhConfig) -> Self {
        Self { source, config }
    }

    /// 범위 내 게시글 전체 수집
    pub async fn crawl(&self) -> Result<Vec<CollectedSentence>> {
        let mut raw = Vec::new();

        for bbs_no in self.config.posts.clone() {
            let url = format!("{}{}", self.config.board_url, bbs_no);

            let outcome = match self.source.fetch(&url).await {
                Ok(html) => parse_post(&html),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(PostOutcome::NoTitle) => tracing::info!("[{}] 제목 없음, 건너뜀", bbs_no),
                Ok(PostOutcome::NotDischarge { title }) => {
                    tracing::info!("[{}] 제목 조건 불충족, 건너뜀: {}", bbs_no, title)
                }
                Ok(PostOutcome::NoContent { title }) => {
                    tracing::info!("[{}] 본문 없음, 건너뜀: {}", bbs_no, title)
                }
                Ok(PostOutcome::Collected { title, sentences }) => {
                    tracing::info!("[{}] 처리 완료: {} ({} 문장)", bbs_no, title, sentences.len());
                    raw.extend(sentences.into_iter().map(|s| (url.clone(), s)));
                }
                Err(e) => tracing::warn!("[{}] 오류 발생: {:#}", bbs_no, e),
            }

            tokio::time::sleep(self.config.delay).await;
        }

        let rows = finalize(raw, &self.config.collector);
        tracing::info!("Collected {} sentences", rows.len());
        Ok(rows)
    }
}
