//! 서울아산병원 크롤러
//!
//! source: https://www.amc.seoul.kr/asan/healthinfo/management/managementSubmain.do
//!
//! 부위별 관리 목록 → 페이지별 상세 링크 → 상세 페이지 `dl.descDl`에서
//! `주의`가 들어간 `dt` 다음 `dd` 텍스트만 문장 단위로 수집합니다.
//! `simple_text`는 비워 두고 이후 사람이 직접 채웁니다.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use super::{contains_hangul, joined_text, resolve_url, selector, HtmlFetcher, PageSource};
use crate::dataset::CollectedSentence;

pub const MAIN_URL: &str = "https://www.amc.seoul.kr/asan/healthinfo/management/managementSubmain.do";

const CATEGORY_SELECTOR: &str = "a[href*='managementList.do?partId=']";
const DETAIL_LIST_SELECTOR: &str = "strong.contTitle a";
const DETAIL_DL_SELECTOR: &str = "dl.descDl";

/// 주의사항 섹션을 찾는 `dt` 키워드
const CAUTION_KEYWORD: &str = "주의";

/// 크롤러 설정
#[derive(Debug, Clone)]
pub struct AsanConfig {
    pub main_url: String,
    pub collector: String,
    /// 상세 페이지 요청 간 대기 시간
    pub detail_delay: Duration,
    /// 카테고리당 최대 목록 페이지 수
    pub max_pages: usize,
}

impl Default for AsanConfig {
    fn default() -> Self {
        Self {
            main_url: MAIN_URL.to_string(),
            collector: "asan-crawler".to_string(),
            detail_delay: Duration::from_millis(100),
            max_pages: 50,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn links(html: &str, base: &Url, css: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = selector(css)?;

    Ok(document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_url(base, href))
        .collect())
}

/// 메인 페이지에서 부위별 카테고리 링크 (중복 제거, 순서 유지)
pub fn parse_category_links(html: &str, base: &Url) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    Ok(links(html, base, CATEGORY_SELECTOR)?
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

/// 목록 페이지에서 상세 페이지 링크
pub fn parse_detail_links(html: &str, base: &Url) -> Result<Vec<String>> {
    links(html, base, DETAIL_LIST_SELECTOR)
}

/// 상세 페이지의 주의사항 텍스트 (없으면 빈 문자열)
pub fn extract_caution(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let dl_selector = selector(DETAIL_DL_SELECTOR)?;
    let dt_selector = selector("dt")?;

    let Some(dl) = document.select(&dl_selector).next() else {
        return Ok(String::new());
    };

    for dt in dl.select(&dt_selector) {
        if !dt.text().collect::<String>().contains(CAUTION_KEYWORD) {
            continue;
        }
        let dd = dt
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "dd");
        if let Some(dd) = dd {
            return Ok(joined_text(&dd, " "));
        }
    }

    Ok(String::new())
}

/// `.`, `!`, `?` 뒤 공백에서만 문장을 나누고, 한글이 들어간 문장만 남김
pub fn split_sentences(text: &str) -> Result<Vec<String>> {
    let boundary = Regex::new(r"[.!?]\s+")?;

    let mut sentences = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    sentences.push(&text[start..]);

    Ok(sentences
        .into_iter()
        .filter(|s| contains_hangul(s))
        .map(|s| s.trim().to_string())
        .collect())
}

// ============================================================================
// Crawler
// ============================================================================

/// 서울아산병원 크롤러
pub struct AsanCrawler<S = HtmlFetcher> {
    source: S,
    config: AsanConfig,
}

impl AsanCrawler {
    pub fn new(config: AsanConfig) -> Result<Self> {
        Ok(Self::with_source(HtmlFetcher::new()?, config))
    }
}

impl<S: PageSource> AsanCrawler<S> {
    pub fn with_source(source: S, config: AsanConfig) -> Self {
        Self { source, config }
    }

    /// 전체 수집
    ///
    /// 여러 카테고리에 걸린 상세 페이지는 처음 한 번만 수집합니다.
    pub async fn crawl(&self) -> Result<Vec<CollectedSentence>> {
        let main_url = Url::parse(&self.config.main_url).context("잘못된 메인 URL")?;
        let main_html = self
            .source
            .fetch(main_url.as_str())
            .await
            .context("메인 페이지 요청 실패")?;

        let categories = parse_category_links(&main_html, &main_url)?;
        tracing::info!("Found {} categories", categories.len());

        let mut results = Vec::new();
        let mut visited_details = HashSet::new();

        for category_url in &categories {
            let detail_urls = self.collect_detail_urls(category_url).await;
            tracing::info!("{}: {} detail pages", category_url, detail_urls.len());

            for detail_url in detail_urls {
                if !visited_details.insert(detail_url.clone()) {
                    continue;
                }
                match self.crawl_detail(&detail_url).await {
                    Ok(sentences) => {
                        for sentence in sentences {
                            let id = format!("{:03}", results.len() + 1);
                            results.push(CollectedSentence {
                                id,
                                category: None,
                                original_text: sentence,
                                simple_text: String::new(),
                                source: detail_url.clone(),
                                collector: self.config.collector.clone(),
                            });
                        }
                    }
                    Err(e) => tracing::warn!("Skipping {}: {:#}", detail_url, e),
                }
                tokio::time::sleep(self.config.detail_delay).await;
            }
        }

        tracing::info!("Collected {} sentences", results.len());
        Ok(results)
    }

    /// 카테고리의 모든 목록 페이지에서 상세 링크 수집
    ///
    /// 빈 페이지, 이미 본 링크만 있는 페이지, 요청 실패, `max_pages` 중 먼저
    /// 나오는 곳에서 멈춥니다.
    async fn collect_detail_urls(&self, category_url: &str) -> Vec<String> {
        let mut detail_urls: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=self.config.max_pages {
            let page_url = format!("{}&pageIndex={}", category_url, page);
            let links = match self.fetch_detail_links(&page_url).await {
                Ok(links) => links,
                Err(e) => {
                    tracing::warn!("Stopping at {}: {:#}", page_url, e);
                    break;
                }
            };

            let new_links: Vec<String> = links
                .into_iter()
                .filter(|url| seen.insert(url.clone()))
                .collect();
            if new_links.is_empty() {
                break;
            }
            detail_urls.extend(new_links);
        }

        detail_urls
    }

    async fn fetch_detail_links(&self, page_url: &str) -> Result<Vec<String>> {
        let base = Url::parse(page_url)?;
        let html = self.source.fetch(page_url).await?;
        parse_detail_links(&html, &base)
    }

    async fn crawl_detail(&self, detail_url: &str) -> Result<Vec<String>> {
        let html = self.source.fetch(detail_url).await?;
        let caution = extract_caution(&html)?;
        split_sentences(&caution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::StaticPages;

    const MAIN_HTML: &str = r#"
        <html><body>
            <ul>
                <li><a href="/asan/healthinfo/management/managementList.do?partId=B000001">머리</a></li>
                <li><a href="/asan/healthinfo/management/managementList.do?partId=B000002">가슴</a></li>
                <li><a href="/asan/healthinfo/management/managementList.do?partId=B000001">머리</a></li>
                <li><a href="/asan/healthinfo/disease/diseaseList.do">질환</a></li>
            </ul>
        </body></html>
    "#;

    const LIST_HTML: &str = r#"
        <html><body>
            <ul class="descBox">
                <li><strong class="contTitle"><a href="managementDetail.do?managementId=10">갑상선 수술</a></strong></li>
                <li><strong class="contTitle"><a href="/asan/healthinfo/management/managementDetail.do?managementId=11">유방 수술</a></strong></li>
                <li><strong class="other"><a href="managementDetail.do?managementId=99">광고</a></strong></li>
            </ul>
        </body></html>
    "#;

    const DETAIL_HTML: &str = r#"
        <html><body>
            <dl class="descDl">
                <dt>개요</dt>
                <dd>수술에 대한 설명입니다.</dd>
                <dt>퇴원 후 주의사항</dt>
                <dd>
                    <p>수술 부위는 청결하게 유지하십시오.</p>
                    <p>샤워는 1주일 후부터 가능합니다! 열이 나나요? 병원에 오십시오.</p>
                    <p>1) 2) 3)</p>
                </dd>
            </dl>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse(MAIN_URL).expect("url")
    }

    #[test]
    fn test_parse_category_links_dedupes() {
        let links = parse_category_links(MAIN_HTML, &base()).expect("parse failed");
        assert_eq!(
            links,
            vec![
                "https://www.amc.seoul.kr/asan/healthinfo/management/managementList.do?partId=B000001",
                "https://www.amc.seoul.kr/asan/healthinfo/management/managementList.do?partId=B000002",
            ]
        );
    }

    #[test]
    fn test_parse_detail_links() {
        let page = Url::parse(
            "https://www.amc.seoul.kr/asan/healthinfo/management/managementList.do?partId=B000001&pageIndex=1",
        )
        .expect("url");
        let links = parse_detail_links(LIST_HTML, &page).expect("parse failed");
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0],
            "https://www.amc.seoul.kr/asan/healthinfo/management/managementDetail.do?managementId=10"
        );
    }

    #[test]
    fn test_extract_caution() {
        let caution = extract_caution(DETAIL_HTML).expect("extract failed");
        assert_eq!(
            caution,
            "수술 부위는 청결하게 유지하십시오. 샤워는 1주일 후부터 가능합니다! 열이 나나요? 병원에 오십시오. 1) 2) 3)"
        );
    }

    #[test]
    fn test_extract_caution_missing() {
        assert_eq!(extract_caution("<html><body><p>없음</p></body></html>").expect("extract"), "");

        let no_caution = r#"<dl class="descDl"><dt>개요</dt><dd>설명</dd></dl>"#;
        assert_eq!(extract_caution(no_caution).expect("extract"), "");
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences(
            "수술 부위는 청결하게 유지하십시오. 샤워는 1주일 후부터 가능합니다! 열이 나나요? 병원에 오십시오. 1) 2) 3)",
        )
        .expect("split failed");
        assert_eq!(
            sentences,
            vec![
                "수술 부위는 청결하게 유지하십시오.",
                "샤워는 1주일 후부터 가능합니다!",
                "열이 나나요?",
                "병원에 오십시오.",
            ]
        );
    }

    #[test]
    fn test_split_keeps_decimal_points() {
        let sentences = split_sentences("체온이 37.5도 이상이면 연락하십시오.").expect("split failed");
        assert_eq!(sentences, vec!["체온이 37.5도 이상이면 연락하십시오."]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_sentences("").expect("split").is_empty());
        assert!(split_sentences("   ").expect("split").is_empty());
    }

    // ------------------------------------------------------------------------
    // Crawl loop
    // ------------------------------------------------------------------------

    const SITE: &str = "https://asan.test/management/";

    fn site(path: &str) -> String {
        format!("{}{}", SITE, path)
    }

    fn list_page(ids: &[u32]) -> String {
        let items: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<li><strong class="contTitle"><a href="detail.do?id={}">항목</a></strong></li>"#,
                    id
                )
            })
            .collect();
        format!("<html><body><ul>{}</ul></body></html>", items)
    }

    fn detail_page(caution: &str) -> String {
        format!(
            r#"<html><body><dl class="descDl"><dt>주의사항</dt><dd>{}</dd></dl></body></html>"#,
            caution
        )
    }

    fn test_config(max_pages: usize) -> AsanConfig {
        AsanConfig {
            main_url: site("main.do"),
            collector: "tester".to_string(),
            detail_delay: Duration::ZERO,
            max_pages,
        }
    }

    fn crawl_site() -> StaticPages {
        let main = r#"<a href="managementList.do?partId=A">A</a><a href="managementList.do?partId=B">B</a>"#;
        StaticPages::default()
            .with(&site("main.do"), main)
            // A: 2쪽에 새 링크 하나, 3쪽은 이미 본 링크뿐
            .with(&site("managementList.do?partId=A&pageIndex=1"), &list_page(&[1, 2]))
            .with(&site("managementList.do?partId=A&pageIndex=2"), &list_page(&[2, 3]))
            .with(&site("managementList.do?partId=A&pageIndex=3"), &list_page(&[3]))
            // B: 3은 A에서 이미 수집, 2쪽은 요청 실패
            .with(&site("managementList.do?partId=B&pageIndex=1"), &list_page(&[3, 4]))
            .with(&site("detail.do?id=1"), &detail_page("무리한 운동은 피하세요. 상처를 깨끗이 하세요."))
            // id=2 상세 페이지는 없음 (요청 실패)
            .with(&site("detail.do?id=3"), &detail_page("열이 나면 병원에 오세요."))
            .with(&site("detail.do?id=4"), &detail_page("Note only. 약은 제때 드세요!"))
    }

    #[tokio::test]
    async fn test_crawl_collects_across_pages_and_categories() {
        let crawler = AsanCrawler::with_source(crawl_site(), test_config(50));
        let rows = crawler.crawl().await.expect("crawl failed");

        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["001", "002", "003", "004"]);

        let texts: Vec<&str> = rows.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["무리한 운동은 피하세요.", "상처를 깨끗이 하세요.", "열이 나면 병원에 오세요.", "약은 제때 드세요!"]
        );

        assert_eq!(rows[0].source, site("detail.do?id=1"));
        assert_eq!(rows[2].source, site("detail.do?id=3"));
        assert_eq!(rows[3].source, site("detail.do?id=4"));
        assert!(rows.iter().all(|r| r.simple_text.is_empty() && r.collector == "tester"));
        assert!(rows.iter().all(|r| r.category.is_none()));
    }

    #[tokio::test]
    async fn test_crawl_paging_stops() {
        let crawler = AsanCrawler::with_source(crawl_site(), test_config(50));
        crawler.crawl().await.expect("crawl failed");
        let requested = crawler.source.requested();

        // 이미 본 링크뿐인 A 3쪽, 실패한 B 2쪽에서 멈춤
        assert!(requested.contains(&site("managementList.do?partId=A&pageIndex=3")));
        assert!(!requested.contains(&site("managementList.do?partId=A&pageIndex=4")));
        assert!(requested.contains(&site("managementList.do?partId=B&pageIndex=2")));
        assert!(!requested.contains(&site("managementList.do?partId=B&pageIndex=3")));

        // 두 카테고리에 걸린 상세 페이지는 한 번만 요청
        let detail_3 = requested.iter().filter(|u| **u == site("detail.do?id=3")).count();
        assert_eq!(detail_3, 1);
        // 실패한 상세 페이지도 한 번 시도
        assert!(requested.contains(&site("detail.do?id=2")));
    }

    #[tokio::test]
    async fn test_crawl_empty_page_and_max_pages() {
        let main = r#"<a href="managementList.do?partId=C">C</a><a href="managementList.do?partId=D">D</a>"#;
        let pages = StaticPages::default()
            .with(&site("main.do"), main)
            .with(&site("managementList.do?partId=C&pageIndex=1"), &list_page(&[10]))
            .with(&site("managementList.do?partId=C&pageIndex=2"), &list_page(&[11]))
            .with(&site("managementList.do?partId=C&pageIndex=3"), &list_page(&[12]))
            .with(&site("managementList.do?partId=D&pageIndex=1"), &list_page(&[]))
            .with(&site("detail.do?id=10"), &detail_page("첫째 안내입니다."))
            .with(&site("detail.do?id=11"), &detail_page("둘째 안내입니다."))
            .with(&site("detail.do?id=12"), &detail_page("셋째 안내입니다."));

        let crawler = AsanCrawler::with_source(pages, test_config(2));
        let rows = crawler.crawl().await.expect("crawl failed");

        let texts: Vec<&str> = rows.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(texts, vec!["첫째 안내입니다.", "둘째 안내입니다."]);

        let requested = crawler.source.requested();
        assert!(!requested.contains(&site("managementList.do?partId=C&pageIndex=3")));
        assert!(!requested.contains(&site("managementList.do?partId=D&pageIndex=2")));
    }

    #[tokio::test]
    async fn test_crawl_fails_without_main_page() {
        let crawler = AsanCrawler::with_source(StaticPages::default(), test_config(50));
        assert!(crawler.crawl().await.is_err());
    }
}
