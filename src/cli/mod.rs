//! CLI 모듈
//!
//! medi-rewrite 명령어 정의 및 구현

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, ProviderKind, DEFAULT_BERTSCORE_LAYERS, DEFAULT_BERTSCORE_MODEL};
use crate::crawler::asan::{AsanConfig, AsanCrawler};
use crate::crawler::snuh::{SnuhConfig, SnuhCrawler, DEFAULT_POSTS};
use crate::dataset::{self, load_evaluation_set, load_pairs, write_collected};
use crate::embedding::{create_embedder, has_api_key, BertEncoder, BertSource};
use crate::evaluation::{evaluate_model, format_pairs, Baseline, Rescale};
use crate::retrieval::{run_session, SimpleRewriter};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "medi-rewrite")]
#[command(version, about = "퇴원 안내문 쉬운 말 리라이팅", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문장을 쉬운 말로 변환 (텍스트가 없으면 대화형)
    Rewrite {
        /// 변환할 문장
        #[arg(short, long)]
        text: Option<String>,

        /// 가까운 후보 개수 (1이면 결과 문장만 출력)
        #[arg(short = 'k', long, default_value = "1")]
        top: usize,
    },

    /// 병원 홈페이지에서 원문 문장 수집
    Crawl {
        #[command(subcommand)]
        site: CrawlSite,
    },

    /// 수집/리라이팅 CSV들을 검색용 데이터셋으로 병합
    Combine {
        /// 입력 CSV 파일들
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// 출력 CSV
        #[arg(short, long, default_value = crate::config::DEFAULT_DATASET_PATH)]
        output: PathBuf,
    },

    /// 리라이팅 결과 평가 (BERTScore, SARI, 평균 문장 길이)
    Evaluate {
        /// 평가 CSV (original_text, simple_text 컬럼)
        #[arg(short, long)]
        input: PathBuf,

        /// 모델 출력 컬럼 (없으면 검색 시스템으로 생성)
        #[arg(short, long)]
        rewrite_column: Option<String>,

        /// 보고서에 표시할 모델 이름
        #[arg(long, default_value = "retrieval")]
        model_name: String,

        /// BERTScore 인코더 모델
        #[arg(long, default_value = DEFAULT_BERTSCORE_MODEL)]
        bert_model: String,

        /// BERTScore에 쓰는 인코더 레이어 수
        #[arg(long, default_value_t = DEFAULT_BERTSCORE_LAYERS)]
        bert_layers: usize,

        /// BERTScore 베이스라인 직접 지정 (P R F, 각각 1 미만)
        #[arg(long, num_args = 3, value_names = ["P", "R", "F"], conflicts_with_all = ["baseline_file", "no_rescale"])]
        baseline: Option<Vec<f32>>,

        /// bert_score 형식 베이스라인 파일 (LAYER,P,R,F)
        #[arg(long, conflicts_with = "no_rescale")]
        baseline_file: Option<PathBuf>,

        /// 베이스라인 리스케일링 없이 원점수 출력
        #[arg(long)]
        no_rescale: bool,

        /// 원문/리라이팅 목록 출력 생략
        #[arg(long)]
        no_pairs: bool,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum CrawlSite {
    /// 서울아산병원 수술/치료 후 관리
    Asan {
        #[arg(short, long, default_value = "asan_management_sentences.csv")]
        output: PathBuf,

        /// 수집자 이름
        #[arg(long, default_value = "asan-crawler")]
        collector: String,

        /// 카테고리당 최대 목록 페이지
        #[arg(long, default_value = "50")]
        max_pages: usize,

        /// 상세 페이지 요청 간격 (ms)
        #[arg(long, default_value = "100")]
        delay_ms: u64,
    },

    /// 서울대병원 퇴원 후 주의사항 게시글
    Snuh {
        #[arg(short, long, default_value = "snuh_discharge_sentences.csv")]
        output: PathBuf,

        /// 수집자 이름
        #[arg(long, default_value = "snuh-crawler")]
        collector: String,

        /// 시작 게시글 번호 (포함)
        #[arg(long, default_value_t = DEFAULT_POSTS.start)]
        from: u32,

        /// 끝 게시글 번호 (제외)
        #[arg(long, default_value_t = DEFAULT_POSTS.end)]
        to: u32,

        /// 게시글 요청 간격 (ms)
        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    match cli.command {
        Commands::Rewrite { text, top } => cmd_rewrite(&config, text, top).await,
        Commands::Crawl { site } => cmd_crawl(site).await,
        Commands::Combine { inputs, output } => cmd_combine(&inputs, &output),
        Commands::Evaluate {
            input,
            rewrite_column,
            model_name,
            bert_model,
            bert_layers,
            baseline,
            baseline_file,
            no_rescale,
            no_pairs,
            json,
        } => {
            let rescale = rescale_mode(baseline, baseline_file.as_deref(), no_rescale, bert_layers)?;
            cmd_evaluate(
                &config,
                &input,
                rewrite_column.as_deref(),
                &model_name,
                &bert_model,
                bert_layers,
                rescale,
                !no_pairs,
                json,
            )
            .await
        }
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 데이터셋 로드 + 인덱스 구축
async fn build_rewriter(config: &AppConfig) -> Result<SimpleRewriter> {
    println!("모델과 데이터셋을 로딩 중입니다...");

    let pairs = load_pairs(&config.dataset).context("데이터셋 로드 실패")?;
    let embedder = create_embedder(&config.embedding).context("임베딩 모델 초기화 실패")?;
    SimpleRewriter::build(pairs, embedder)
        .await
        .context("인덱스 구축 실패")
}

/// 리라이팅 명령어 (rewrite)
async fn cmd_rewrite(config: &AppConfig, text: Option<String>, top: usize) -> Result<()> {
    let rewriter = build_rewriter(config).await?;

    let Some(text) = text else {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        run_session(&rewriter, stdin.lock(), &mut stdout).await?;
        return Ok(());
    };

    let query = text.trim();
    if query.is_empty() {
        bail!("변환할 문장이 비어 있습니다");
    }

    if top <= 1 {
        let result = rewriter.retrieve_simple_text(query).await?;
        println!("변경된 문장: {}", result);
        return Ok(());
    }

    let hits = rewriter.retrieve_top(query, top).await?;
    println!("[OK] 가까운 문장 ({} 건):\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [유사도: {:.4}] #{}", i + 1, hit.score, hit.position + 1);
        println!("   원문: {}", hit.original_text);
        println!("   변경: {}", hit.simple_text);
        println!();
    }

    Ok(())
}

/// 수집 명령어 (crawl)
async fn cmd_crawl(site: CrawlSite) -> Result<()> {
    match site {
        CrawlSite::Asan {
            output,
            collector,
            max_pages,
            delay_ms,
        } => {
            let config = AsanConfig {
                collector,
                max_pages,
                detail_delay: Duration::from_millis(delay_ms),
                ..Default::default()
            };
            println!("[*] 서울아산병원 수집 중: {}", config.main_url);

            let crawler = AsanCrawler::new(config).context("크롤러 생성 실패")?;
            let rows = crawler.crawl().await.context("수집 실패")?;
            write_collected(&output, &rows, false)?;

            println!("[OK] 완료: 총 {}건 → {}", rows.len(), output.display());
            print_location(&output);
        }
        CrawlSite::Snuh {
            output,
            collector,
            from,
            to,
            delay_ms,
        } => {
            if from >= to {
                bail!("--from({})은 --to({})보다 작아야 합니다", from, to);
            }
            let config = SnuhConfig {
                posts: from..to,
                collector,
                delay: Duration::from_millis(delay_ms),
                ..Default::default()
            };
            println!("[*] 서울대병원 게시글 {}..{} 수집 중", from, to);

            let crawler = SnuhCrawler::new(config).context("크롤러 생성 실패")?;
            let rows = crawler.crawl().await.context("수집 실패")?;
            write_collected(&output, &rows, true)?;

            println!("[OK] 최종 저장 완료: 총 {}개 문장 → {}", rows.len(), output.display());
            print_location(&output);
        }
    }
    Ok(())
}

fn print_location(path: &Path) {
    if let Ok(absolute) = std::fs::canonicalize(path) {
        println!("     저장 위치: {}", absolute.display());
    }
}

/// 병합 명령어 (combine)
fn cmd_combine(inputs: &[PathBuf], output: &Path) -> Result<()> {
    println!("[*] {} 개 파일 병합 중...", inputs.len());

    let stats = dataset::combine(inputs, output).context("병합 실패")?;

    println!(
        "[OK] {} 행 중 {} 문장 쌍 저장 → {}",
        stats.read,
        stats.written,
        output.display()
    );
    println!(
        "     리라이팅 없음: {}, 중복: {}",
        stats.incomplete, stats.duplicates
    );
    Ok(())
}

/// 평가 플래그로 리스케일링 방식 결정 (기본: 베이스라인 추정)
fn rescale_mode(
    baseline: Option<Vec<f32>>,
    baseline_file: Option<&Path>,
    no_rescale: bool,
    layers: usize,
) -> Result<Rescale> {
    if no_rescale {
        return Ok(Rescale::Off);
    }
    if let Some(values) = baseline {
        let [precision, recall, f1] = values.as_slice() else {
            bail!("--baseline에는 P R F 세 값이 필요합니다");
        };
        let baseline = Baseline::new(*precision, *recall, *f1).context("잘못된 --baseline 값")?;
        return Ok(Rescale::Fixed(baseline));
    }
    if let Some(path) = baseline_file {
        let table = std::fs::read_to_string(path)
            .with_context(|| format!("베이스라인 파일을 읽을 수 없습니다: {}", path.display()))?;
        let baseline = Baseline::from_table(&table, layers)
            .with_context(|| format!("잘못된 베이스라인 파일: {}", path.display()))?;
        return Ok(Rescale::Fixed(baseline));
    }
    Ok(Rescale::Estimate)
}

/// 평가 명령어 (evaluate)
#[allow(clippy::too_many_arguments)]
async fn cmd_evaluate(
    config: &AppConfig,
    input: &Path,
    rewrite_column: Option<&str>,
    model_name: &str,
    bert_model: &str,
    bert_layers: usize,
    rescale: Rescale,
    show_pairs: bool,
    json: bool,
) -> Result<()> {
    let set = load_evaluation_set(input, rewrite_column).context("평가 데이터 로드 실패")?;
    println!("[*] 평가 문장: {} 건", set.originals.len());

    let rewrites = match set.rewrites {
        Some(rewrites) => rewrites,
        None => {
            let rewriter = build_rewriter(config).await?;
            println!("[*] 검색 시스템으로 리라이팅 생성 중...");
            rewriter.rewrite_all(&set.originals).await?
        }
    };

    println!("[*] BERTScore 모델 로딩: {} (레이어 {})", bert_model, bert_layers);
    let encoder = BertEncoder::load_layers(
        &BertSource::new(bert_model),
        config.embedding.cpu,
        Some(bert_layers),
    )
    .context("BERTScore 모델 로드 실패")?;

    let report = evaluate_model(
        model_name,
        &set.originals,
        &rewrites,
        &set.references,
        &encoder,
        rescale,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", report);
    if show_pairs {
        print!("{}", format_pairs(&set.originals, &rewrites));
        io::stdout().flush()?;
    }
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("medi-rewrite v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터셋: {}", config.dataset.display());
    if config.dataset.exists() {
        match load_pairs(&config.dataset) {
            Ok(pairs) => println!("[OK] 문장 쌍: {} 건", pairs.len()),
            Err(e) => println!("[!] 데이터셋 읽기 실패: {:#}", e),
        }
    } else {
        println!("[!] 데이터셋 파일이 없습니다");
        println!("    생성: medi-rewrite combine <수집 CSV...> --output {}", config.dataset.display());
    }

    println!("[*] 임베딩 프로바이더: {}", config.embedding.provider);
    match config.embedding.provider {
        ProviderKind::Local => {
            println!("    모델: {} ({})", config.embedding.model_id, config.embedding.revision);
        }
        ProviderKind::Gemini => {
            println!("    차원: {}", config.embedding.dimension);
            if has_api_key() {
                println!("[OK] API 키: 설정됨");
            } else {
                println!("[!] API 키: 미설정");
                println!("    설정: export GEMINI_API_KEY=your-key");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rewrite_with_global_flags() {
        let cli = Cli::parse_from([
            "medi-rewrite",
            "rewrite",
            "--text",
            "금연하십시오.",
            "--dataset",
            "pairs.csv",
            "--provider",
            "gemini",
        ]);
        assert_eq!(cli.config.dataset, PathBuf::from("pairs.csv"));
        assert_eq!(cli.config.embedding.provider, ProviderKind::Gemini);
        match cli.command {
            Commands::Rewrite { text, top } => {
                assert_eq!(text.as_deref(), Some("금연하십시오."));
                assert_eq!(top, 1);
            }
            _ => panic!("expected rewrite"),
        }
    }

    #[test]
    fn test_parse_crawl_snuh_range() {
        let cli = Cli::parse_from(["medi-rewrite", "crawl", "snuh", "--from", "3600", "--to", "3605"]);
        match cli.command {
            Commands::Crawl {
                site: CrawlSite::Snuh { from, to, output, .. },
            } => {
                assert_eq!((from, to), (3600, 3605));
                assert_eq!(output, PathBuf::from("snuh_discharge_sentences.csv"));
            }
            _ => panic!("expected crawl snuh"),
        }
    }

    #[test]
    fn test_parse_evaluate_baseline() {
        let cli = Cli::parse_from([
            "medi-rewrite",
            "evaluate",
            "--input",
            "eval.csv",
            "--baseline",
            "0.1",
            "0.2",
            "0.3",
        ]);
        match cli.command {
            Commands::Evaluate {
                baseline,
                bert_model,
                rewrite_column,
                ..
            } => {
                assert_eq!(baseline, Some(vec![0.1, 0.2, 0.3]));
                assert_eq!(bert_model, DEFAULT_BERTSCORE_MODEL);
                assert_eq!(rewrite_column, None);
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_rescale_mode_defaults_to_estimate() {
        let cli = Cli::parse_from(["medi-rewrite", "evaluate", "--input", "eval.csv"]);
        let Commands::Evaluate {
            baseline,
            baseline_file,
            no_rescale,
            bert_layers,
            ..
        } = cli.command
        else {
            panic!("expected evaluate");
        };
        assert_eq!(bert_layers, 9);
        assert_eq!(
            rescale_mode(baseline, baseline_file.as_deref(), no_rescale, bert_layers).expect("mode"),
            Rescale::Estimate
        );

        assert_eq!(rescale_mode(None, None, true, 9).expect("mode"), Rescale::Off);
    }

    #[test]
    fn test_rescale_mode_rejects_baseline_of_one() {
        assert!(rescale_mode(Some(vec![0.5, 0.5, 1.0]), None, false, 9).is_err());
        assert!(rescale_mode(Some(vec![0.5, 0.5]), None, false, 9).is_err());

        let fixed = rescale_mode(Some(vec![0.1, 0.2, 0.3]), None, false, 9).expect("mode");
        assert_eq!(fixed, Rescale::Fixed(Baseline::new(0.1, 0.2, 0.3).expect("valid")));
    }

    #[test]
    fn test_rescale_mode_reads_baseline_file() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("ko.tsv");
        std::fs::write(&path, "LAYER,P,R,F\n9,0.70,0.71,0.72\n12,0.80,0.81,0.82\n").expect("write failed");

        let mode = rescale_mode(None, Some(&path), false, 9).expect("mode");
        assert_eq!(mode, Rescale::Fixed(Baseline::new(0.70, 0.71, 0.72).expect("valid")));
        assert!(rescale_mode(None, Some(&path), false, 5).is_err());
        assert!(rescale_mode(None, Some(&dir.path().join("missing.tsv")), false, 9).is_err());
    }

    #[test]
    fn test_no_rescale_conflicts_with_baseline() {
        let result = Cli::try_parse_from([
            "medi-rewrite",
            "evaluate",
            "--input",
            "eval.csv",
            "--no-rescale",
            "--baseline",
            "0.1",
            "0.2",
            "0.3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_combine_requires_inputs() {
        assert!(Cli::try_parse_from(["medi-rewrite", "combine"]).is_err());
    }

    #[test]
    fn test_combine_command_writes_dataset() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let input = dir.path().join("in.csv");
        std::fs::write(
            &input,
            "original_text,simple_text\n금연하십시오.,담배를 끊으세요.\n",
        )
        .expect("write failed");
        let output = dir.path().join("out/combined.csv");

        cmd_combine(&[input], &output).expect("combine failed");
        let pairs = load_pairs(&output).expect("load failed");
        assert_eq!(pairs.len(), 1);
    }
}
