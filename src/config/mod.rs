//! 설정 모듈 - CLI 플래그 + 환경변수
//!
//! 모든 설정은 CLI 플래그로 지정할 수 있고, 플래그가 없으면 환경변수,
//! 둘 다 없으면 기본값을 사용합니다.
//!
//! | 플래그 | 환경변수 | 기본값 |
//! |---|---|---|
//! | `--dataset` | `MEDI_REWRITE_DATASET` | `./data/combined_dataset.csv` |
//! | `--provider` | `MEDI_REWRITE_PROVIDER` | `local` |
//! | `--model` | `MEDI_REWRITE_MODEL` | [`DEFAULT_SENTENCE_MODEL`] |
//! | `--model-revision` | `MEDI_REWRITE_MODEL_REVISION` | `main` |
//! | `--dimension` | `MEDI_REWRITE_DIMENSION` | `768` (Gemini 전용) |
//! | `--cpu` | `MEDI_REWRITE_CPU` | `false` |

use std::fmt;
use std::path::PathBuf;

use clap::{Args, ValueEnum};

/// 기본 리라이팅 데이터셋 경로
pub const DEFAULT_DATASET_PATH: &str = "./data/combined_dataset.csv";

/// 기본 로컬 문장 임베딩 모델 (BERT 구조, 한국어 포함 다국어)
/// source: https://huggingface.co/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2
pub const DEFAULT_SENTENCE_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// BERTScore 기본 모델
/// source: https://huggingface.co/google-bert/bert-base-multilingual-cased
pub const DEFAULT_BERTSCORE_MODEL: &str = "google-bert/bert-base-multilingual-cased";

/// BERTScore에 쓰는 mBERT 레이어 수 (bert_score의 bert-base-multilingual-cased 기본값)
/// source: https://github.com/Tiiiger/bert_score/blob/master/bert_score/utils.py
pub const DEFAULT_BERTSCORE_LAYERS: usize = 9;

/// Gemini 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Hugging Face BERT 모델 (candle, 오프라인 가능)
    Local,
    /// Gemini 임베딩 API (API 키 필요)
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Gemini => write!(f, "gemini"),
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Args)]
pub struct EmbeddingConfig {
    /// 임베딩 프로바이더
    #[arg(long, env = "MEDI_REWRITE_PROVIDER", value_enum, default_value_t = ProviderKind::Local, global = true)]
    pub provider: ProviderKind,

    /// 로컬 문장 임베딩 모델 ID (Hugging Face)
    #[arg(long = "model", env = "MEDI_REWRITE_MODEL", default_value = DEFAULT_SENTENCE_MODEL, global = true)]
    pub model_id: String,

    /// 로컬 모델 리비전
    #[arg(long = "model-revision", env = "MEDI_REWRITE_MODEL_REVISION", default_value = "main", global = true)]
    pub revision: String,

    /// Gemini 임베딩 차원 (768, 1536, 3072)
    #[arg(long, env = "MEDI_REWRITE_DIMENSION", default_value_t = DEFAULT_DIMENSION, global = true)]
    pub dimension: usize,

    /// GPU가 있어도 CPU에서 실행
    #[arg(long, env = "MEDI_REWRITE_CPU", global = true)]
    pub cpu: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model_id: DEFAULT_SENTENCE_MODEL.to_string(),
            revision: "main".to_string(),
            dimension: DEFAULT_DIMENSION,
            cpu: false,
        }
    }
}

/// 애플리케이션 설정
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// 리라이팅 데이터셋 CSV (original_text, simple_text 컬럼)
    #[arg(long, env = "MEDI_REWRITE_DATASET", default_value = DEFAULT_DATASET_PATH, global = true)]
    pub dataset: PathBuf,

    #[command(flatten)]
    pub embedding: EmbeddingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from(DEFAULT_DATASET_PATH),
            embedding: EmbeddingConfig::default(),
        }
    }
}
