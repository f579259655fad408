//! 로컬 BERT 인코더 - candle + tokenizers + hf-hub
//!
//! Hugging Face 허브에서 `config.json`, `tokenizer.json`, `model.safetensors`를
//! 받아 BERT 인코더를 실행합니다. 네트워크가 없으면 로컬 허브 캐시를 사용합니다.
//!
//! - 문장 임베딩: attention mask 기준 mean pooling
//! - 토큰 임베딩: 특수 토큰([CLS], [SEP], 패딩)을 제외한 마지막 레이어 벡터 (BERTScore용)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Cache, Repo, RepoType};
use serde::Deserialize;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::EmbeddingProvider;

/// 한 번에 인코딩할 최대 문장 수
const BATCH_SIZE: usize = 32;

/// BERT 최대 입력 길이
const MAX_SEQUENCE_LENGTH: usize = 512;

/// 허브 모델 위치
#[derive(Debug, Clone)]
pub struct BertSource {
    model_id: String,
    revision: String,
}

impl BertSource {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: "main".to_string(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn repo(&self) -> Repo {
        Repo::with_revision(self.model_id.clone(), RepoType::Model, self.revision.clone())
    }
}

/// BERT 모델 파일 경로
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

fn fetch_files(repo: Repo) -> Result<ModelFiles> {
    let api = Api::new()?.repo(repo);
    Ok(ModelFiles {
        config: api.get("config.json")?,
        tokenizer: api.get("tokenizer.json")?,
        weights: api.get("model.safetensors")?,
    })
}

fn cached_files(repo: Repo) -> Result<ModelFiles> {
    let cache = Cache::default().repo(repo);
    Ok(ModelFiles {
        config: cache
            .get("config.json")
            .ok_or_else(|| anyhow!("Missing config file in cache"))?,
        tokenizer: cache
            .get("tokenizer.json")
            .ok_or_else(|| anyhow!("Missing tokenizer file in cache"))?,
        weights: cache
            .get("model.safetensors")
            .ok_or_else(|| anyhow!("Missing weights file in cache"))?,
    })
}

/// config.json 중 인코더 밖에서 필요한 값
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    num_hidden_layers: usize,
    #[serde(default)]
    max_position_embeddings: Option<usize>,
}

/// `num_hidden_layers`를 `max_layers` 이하로 줄인 config
fn cap_layers(config_json: &str, max_layers: Option<usize>) -> Result<serde_json::Value> {
    let mut value: serde_json::Value =
        serde_json::from_str(config_json).context("Failed to parse BERT config")?;

    if let Some(max_layers) = max_layers {
        let layers = value
            .get("num_hidden_layers")
            .and_then(serde_json::Value::as_u64)
            .context("BERT config has no num_hidden_layers")?;
        if max_layers == 0 {
            anyhow::bail!("Layer count must be at least 1");
        }
        if (max_layers as u64) < layers {
            value["num_hidden_layers"] = serde_json::Value::from(max_layers);
        }
    }
    Ok(value)
}

fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        let device = Device::cuda_if_available(0)?;
        if !device.is_cuda() {
            tracing::debug!("Running BERT on CPU");
        }
        Ok(device)
    }
}

// ============================================================================
// BertEncoder
// ============================================================================

/// BERT 인코더 인스턴스
pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    hidden_size: usize,
}

/// 배치 인코딩 결과 (문장별)
struct EncodedBatch {
    /// [문장][토큰][hidden]
    hidden: Vec<Vec<Vec<f32>>>,
    encodings: Vec<Encoding>,
}

impl BertEncoder {
    /// 허브에서 모델을 받아 로드
    pub fn load(source: &BertSource, cpu: bool) -> Result<Self> {
        Self::load_layers(source, cpu, None)
    }

    /// 앞쪽 `max_layers`개 레이어까지만 쌓아 로드
    ///
    /// 마지막 출력이 해당 레이어의 hidden state가 됩니다 (BERTScore 레이어 선택).
    pub fn load_layers(source: &BertSource, cpu: bool, max_layers: Option<usize>) -> Result<Self> {
        let repo = source.repo();
        let files = match fetch_files(repo.clone()) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(
                    "Failed to fetch {} from hub, falling back to local cache: {}",
                    source.model_id,
                    err
                );
                cached_files(repo)?
            }
        };

        let config_json =
            std::fs::read_to_string(&files.config).context("Failed to read config.json")?;
        let config_value = cap_layers(&config_json, max_layers)?;
        let shape: ModelShape = serde_json::from_value(config_value.clone())
            .context("Failed to parse BERT config")?;
        let config: Config =
            serde_json::from_value(config_value).context("Failed to parse BERT config")?;

        let device = device(cpu)?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DTYPE, &device)? };
        let model = BertModel::load(vb, &config).context("Failed to load BERT weights")?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(anyhow::Error::msg)?;
        if let Some(pp) = tokenizer.get_padding_mut() {
            pp.strategy = PaddingStrategy::BatchLongest;
        } else {
            tokenizer.with_padding(Some(PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..Default::default()
            }));
        }
        let max_length = shape
            .max_position_embeddings
            .unwrap_or(MAX_SEQUENCE_LENGTH)
            .min(MAX_SEQUENCE_LENGTH);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(anyhow::Error::msg)?;

        tracing::info!(
            "Loaded BERT model {} ({} layers)",
            source.model_id,
            shape.num_hidden_layers
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: source.model_id.clone(),
            hidden_size: shape.hidden_size,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn encode_batch(&self, sentences: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(sentences.to_vec(), true)
            .map_err(anyhow::Error::msg)?;

        let token_ids = encodings
            .iter()
            .map(|e| Ok(Tensor::new(e.get_ids(), &self.device)?))
            .collect::<Result<Vec<_>>>()?;
        let attention_mask = encodings
            .iter()
            .map(|e| Ok(Tensor::new(e.get_attention_mask(), &self.device)?))
            .collect::<Result<Vec<_>>>()?;

        let token_ids = Tensor::stack(&token_ids, 0)?;
        let attention_mask = Tensor::stack(&attention_mask, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;
        tracing::debug!("BERT hidden states {:?}", hidden.shape());

        Ok(EncodedBatch {
            hidden: hidden.to_vec3::<f32>()?,
            encodings,
        })
    }

    /// 문장별 토큰 임베딩 (특수 토큰, 패딩 제외)
    pub fn token_embeddings(&self, sentences: &[&str]) -> Result<Vec<Vec<Vec<f32>>>> {
        let mut results = Vec::with_capacity(sentences.len());

        for batch in sentences.chunks(BATCH_SIZE) {
            let encoded = self.encode_batch(batch)?;
            for (tokens, encoding) in encoded.hidden.into_iter().zip(&encoded.encodings) {
                let kept = tokens
                    .into_iter()
                    .zip(encoding.get_special_tokens_mask())
                    .zip(encoding.get_attention_mask())
                    .filter(|((_, special), attention)| **special == 0 && **attention == 1)
                    .map(|((vector, _), _)| vector)
                    .collect();
                results.push(kept);
            }
        }

        Ok(results)
    }

    /// 문장 임베딩 (attention mask 기준 mean pooling)
    pub fn sentence_embeddings(&self, sentences: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(sentences.len());

        for batch in sentences.chunks(BATCH_SIZE) {
            let encoded = self.encode_batch(batch)?;
            for (tokens, encoding) in encoded.hidden.iter().zip(&encoded.encodings) {
                results.push(mean_pool(tokens, encoding.get_attention_mask(), self.hidden_size));
            }
        }

        Ok(results)
    }
}

/// mask가 1인 토큰 벡터의 평균
fn mean_pool(tokens: &[Vec<f32>], mask: &[u32], hidden_size: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_size];
    let mut count = 0usize;

    for (vector, m) in tokens.iter().zip(mask) {
        if *m == 0 {
            continue;
        }
        for (acc, v) in pooled.iter_mut().zip(vector) {
            *acc += v;
        }
        count += 1;
    }

    if count > 0 {
        for acc in pooled.iter_mut() {
            *acc /= count as f32;
        }
    }
    pooled
}

// ============================================================================
// LocalBertEmbedding
// ============================================================================

/// 로컬 BERT 문장 임베딩 프로바이더
///
/// 추론은 CPU를 오래 점유하므로 blocking 스레드에서 실행합니다.
pub struct LocalBertEmbedding {
    encoder: Arc<BertEncoder>,
}

impl LocalBertEmbedding {
    pub fn load(source: &BertSource, cpu: bool) -> Result<Self> {
        Ok(Self::from_encoder(Arc::new(BertEncoder::load(source, cpu)?)))
    }

    pub fn from_encoder(encoder: Arc<BertEncoder>) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalBertEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("Encoder returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = Arc::clone(&self.encoder);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            encoder.sentence_embeddings(&refs)
        })
        .await
        .context("Embedding task panicked")?
    }

    fn dimension(&self) -> usize {
        self.encoder.hidden_size()
    }

    fn name(&self) -> &str {
        self.encoder.model_id()
    }
}
