//! 임베딩 모듈 - Hugging Face Inference API를 통한 텍스트 벡터화
//!
//! 인제스트와 질의 시점에 반드시 같은 모델을 써야 벡터 공간이 호환됩니다.
//! 모델 식별자와 차원은 상수로 고정되어 있습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HuggingFaceEmbedding::new(std::env::var("HF_TOKEN").ok())?;
//! let embedding = embedder.embed("What is fever?").await?;
//! assert_eq!(embedding.len(), EMBEDDING_DIMENSION);
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Hugging Face Embedding
// ============================================================================

/// 문장 임베딩 모델 식별자
pub const EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// all-MiniLM-L6-v2 출력 차원
pub const EMBEDDING_DIMENSION: usize = 384;

/// Inference API 기본 주소 (feature-extraction 파이프라인)
const HF_INFERENCE_BASE: &str = "https://router.huggingface.co/hf-inference/models";

/// 429/503 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Hugging Face 임베딩 구현체
#[derive(Debug)]
pub struct HuggingFaceEmbedding {
    token: Option<String>,
    client: reqwest::Client,
    endpoint: String,
}

impl HuggingFaceEmbedding {
    /// 기본 엔드포인트로 생성
    ///
    /// # Arguments
    /// * `token` - Hugging Face 액세스 토큰 (없으면 익명 호출)
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_url(token, HF_INFERENCE_BASE)
    }

    /// 엔드포인트 주소를 지정하여 생성 (자체 호스팅 TEI 등)
    pub fn with_base_url(token: Option<String>, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = format!(
            "{}/{}/pipeline/feature-extraction",
            base_url.trim_end_matches('/'),
            EMBEDDING_MODEL
        );

        Ok(Self {
            token: token.filter(|t| !t.trim().is_empty()),
            client,
            endpoint,
        })
    }

    /// 요청 엔드포인트
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 배치 한 번을 API로 전송 (재시도 포함)
    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = FeatureRequest {
            inputs,
            options: FeatureOptions {
                wait_for_model: true,
            },
        };

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            let mut builder = self.client.post(&self.endpoint).json(&request);
            if let Some(ref token) = self.token {
                builder = builder.bearer_auth(token);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let backoff = backoff_for(attempt);
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let vectors: Vec<Vec<f32>> =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return validate_vectors(vectors, inputs.len());
            }

            // 429 (rate limit) 또는 503 (모델 로딩 중)은 재시도
            if status.as_u16() == 429 || status.as_u16() == 503 {
                let backoff = backoff_for(attempt);
                tracing::warn!(
                    "Embedding API busy ({}), backing off {:?} (attempt {}/{})",
                    status,
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Embedding API busy ({})", status));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<HfError>(&body) {
                    anyhow::bail!("Hugging Face API error ({}): {}", status, error.error);
                }
                anyhow::bail!("Hugging Face API error ({}): {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

/// 응답 벡터 개수와 차원 검증
fn validate_vectors(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    anyhow::ensure!(
        vectors.len() == expected,
        "Embedding API returned {} vectors for {} inputs",
        vectors.len(),
        expected
    );
    for vector in &vectors {
        anyhow::ensure!(
            vector.len() == EMBEDDING_DIMENSION,
            "Embedding dimension mismatch: expected {}, got {}",
            EMBEDDING_DIMENSION,
            vector.len()
        );
    }
    Ok(vectors)
}

/// feature-extraction 요청 본문
#[derive(Debug, Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a [&'a str],
    options: FeatureOptions,
}

#[derive(Debug, Serialize)]
struct FeatureOptions {
    wait_for_model: bool,
}

/// Hugging Face 에러 응답
#[derive(Debug, Deserialize)]
struct HfError {
    error: String,
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; EMBEDDING_DIMENSION]);
        }

        let mut vectors = self.request(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding API returned no vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![Vec::new(); texts.len()];

        // 빈 텍스트는 API에 보내지 않음
        let (blank, filled): (Vec<usize>, Vec<usize>) =
            (0..texts.len()).partition(|&i| texts[i].trim().is_empty());

        for i in blank {
            results[i] = vec![0.0; EMBEDDING_DIMENSION];
        }

        if !filled.is_empty() {
            let inputs: Vec<&str> = filled.iter().map(|&i| texts[i].as_str()).collect();
            tracing::debug!("Embedding batch of {} texts", inputs.len());
            let vectors = self.request(&inputs).await?;
            for (i, vector) in filled.into_iter().zip(vectors) {
                results[i] = vector;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn name(&self) -> &str {
        EMBEDDING_MODEL
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_model() {
        let embedder = HuggingFaceEmbedding::new(None).unwrap();
        assert!(embedder
            .endpoint()
            .ends_with("sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"));
    }

    #[test]
    fn test_custom_base_url_trims_slash() {
        let embedder =
            HuggingFaceEmbedding::with_base_url(Some("tok".into()), "http://localhost:8080/")
                .unwrap();
        assert_eq!(
            embedder.endpoint(),
            "http://localhost:8080/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
    }

    #[test]
    fn test_blank_token_ignored() {
        let embedder = HuggingFaceEmbedding::new(Some("  ".into())).unwrap();
        assert!(embedder.token.is_none());
    }

    #[test]
    fn test_validate_vectors_dimension() {
        let ok = validate_vectors(vec![vec![0.0; EMBEDDING_DIMENSION]], 1);
        assert!(ok.is_ok());

        let wrong_dim = validate_vectors(vec![vec![0.0; 768]], 1);
        assert!(wrong_dim
            .unwrap_err()
            .to_string()
            .contains("dimension mismatch"));

        let wrong_count = validate_vectors(vec![vec![0.0; EMBEDDING_DIMENSION]], 2);
        assert!(wrong_count.is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let inputs = ["hello", "world"];
        let request = FeatureRequest {
            inputs: &inputs,
            options: FeatureOptions {
                wait_for_model: true,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["inputs"][1], "world");
        assert_eq!(json["options"]["wait_for_model"], true);
    }

    #[tokio::test]
    async fn test_blank_text_skips_network() {
        // 존재하지 않는 주소여도 빈 텍스트는 호출하지 않음
        let embedder = HuggingFaceEmbedding::with_base_url(None, "http://127.0.0.1:1").unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIMENSION);
        assert!(vector.iter().all(|v| *v == 0.0));

        let batch = embedder
            .embed_batch(&["".to_string(), "\n".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
    }
}
