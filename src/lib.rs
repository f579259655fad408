//! medi-rewrite - 퇴원 안내문 쉬운 말 리라이팅
//!
//! 병원 홈페이지에서 퇴원 후 주의사항 문장을 수집하고, 미리 만든
//! (원문, 쉬운 문장) 쌍에서 입력 문장과 가장 가까운 원문을 임베딩 검색으로 찾아
//! 그 쉬운 문장을 돌려줍니다. 결과는 BERTScore, SARI, 평균 문장 길이로 평가합니다.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod dataset;
pub mod embedding;
pub mod evaluation;
pub mod retrieval;

// Re-exports
pub use config::{AppConfig, EmbeddingConfig, ProviderKind};
pub use dataset::{
    combine, load_evaluation_set, load_pairs, write_collected, CollectedSentence, DatasetError,
    EvaluationSet, SentencePair,
};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, BertEncoder, BertSource, EmbeddingProvider,
    GeminiEmbedding, LocalBertEmbedding,
};
pub use evaluation::{
    avg_sentence_length, evaluate_model, Baseline, EvaluationReport, Rescale, Sari, TokenEmbedder,
};
pub use retrieval::{run_session, FlatIpIndex, RetrievalHit, SimpleRewriter};
