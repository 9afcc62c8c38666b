//! Pinecone Vector Store - 호스팅 벡터 DB 클라이언트
//!
//! 컨트롤 플레인(`api.pinecone.io`)에서 인덱스를 조회/생성하고,
//! 데이터 플레인(인덱스 호스트)에서 업서트와 유사도 검색을 수행합니다.
//! ref: https://docs.pinecone.io/reference/api/introduction

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::vector::{ChunkMetadata, SearchResult, VectorRecord, VectorStore};

/// 컨트롤 플레인 주소
const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";

/// API 버전 헤더 값
const API_VERSION: &str = "2024-07";

/// 인덱스 준비 대기 폴링 간격
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// 인덱스 준비 대기 최대 횟수
const READY_MAX_POLLS: u32 = 60;

// ============================================================================
// Control Plane Types
// ============================================================================

/// 인덱스 설명
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

/// 인덱스 상태
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

/// 인덱스 생성 요청
#[derive(Debug, Clone, Serialize)]
pub struct CreateIndexRequest {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub spec: IndexSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSpec {
    pub serverless: ServerlessSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerlessSpec {
    pub cloud: String,
    pub region: String,
}

impl CreateIndexRequest {
    /// 코사인 메트릭 서버리스 인덱스
    pub fn serverless(name: &str, dimension: usize, cloud: &str, region: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            metric: "cosine".to_string(),
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: cloud.to_string(),
                    region: region.to_string(),
                },
            },
        }
    }
}

// ============================================================================
// Data Plane Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    #[serde(rename = "includeValues")]
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// 인덱스 통계
#[derive(Debug, Clone, Deserialize)]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: usize,
    #[serde(rename = "totalVectorCount", default)]
    pub total_vector_count: usize,
}

impl IndexStats {
    /// 임베딩 차원과 일치하는지 확인
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        anyhow::ensure!(
            self.dimension == expected,
            "Index has dimension {}, but the embedding model produces {}",
            self.dimension,
            expected
        );
        Ok(())
    }
}

// ============================================================================
// PineconeClient (Control Plane)
// ============================================================================

/// Pinecone 컨트롤 플레인 클라이언트
#[derive(Debug, Clone)]
pub struct PineconeClient {
    client: reqwest::Client,
    base_url: String,
}

impl PineconeClient {
    /// API 키로 생성
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, CONTROL_PLANE_URL)
    }

    /// 컨트롤 플레인 주소를 지정하여 생성
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        Ok(Self {
            client: build_client(api_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 인덱스 목록
    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let response = self
            .client
            .get(format!("{}/indexes", self.base_url))
            .send()
            .await
            .context("Failed to call Pinecone list_indexes")?;

        let list: IndexList = parse_response(response, "list_indexes").await?;
        Ok(list.indexes)
    }

    /// 인덱스 상세 조회 (없으면 None)
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", self.base_url, name))
            .send()
            .await
            .context("Failed to call Pinecone describe_index")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        parse_response(response, "describe_index").await.map(Some)
    }

    /// 인덱스 생성
    pub async fn create_index(&self, request: &CreateIndexRequest) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/indexes", self.base_url))
            .json(request)
            .send()
            .await
            .context("Failed to call Pinecone create_index")?;

        let status = response.status();
        // 동시에 다른 프로세스가 만들었으면 성공으로 간주
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        anyhow::bail!("Pinecone create_index failed ({}): {}", status, body)
    }

    /// 인덱스가 없으면 생성하고 준비될 때까지 대기
    ///
    /// 이미 있는 인덱스의 차원이 다르면 에러입니다.
    pub async fn ensure_index(&self, request: &CreateIndexRequest) -> Result<IndexDescription> {
        let existing: Vec<String> = self
            .list_indexes()
            .await?
            .into_iter()
            .map(|index| index.name)
            .collect();

        if !existing.contains(&request.name) {
            tracing::info!("Creating Pinecone index: {}", request.name);
            self.create_index(request).await?;
        }

        for attempt in 0..READY_MAX_POLLS {
            if let Some(index) = self.describe_index(&request.name).await? {
                check_dimension(&index, request.dimension)?;
                if index.status.ready && !index.host.is_empty() {
                    return Ok(index);
                }
                tracing::debug!(
                    "Index {} not ready ({}), poll {}/{}",
                    request.name,
                    index.status.state,
                    attempt + 1,
                    READY_MAX_POLLS
                );
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        anyhow::bail!(
            "Pinecone index {} did not become ready after {:?}",
            request.name,
            READY_POLL_INTERVAL * READY_MAX_POLLS
        )
    }

    /// 기존 인덱스에 연결 (없으면 에러)
    pub async fn connect(&self, api_key: &str, name: &str, dimension: usize) -> Result<PineconeIndex> {
        let index = self
            .describe_index(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Index '{}' not found.", name))?;

        check_dimension(&index, dimension)?;
        PineconeIndex::new(api_key, &index.host)
    }
}

// ============================================================================
// PineconeIndex (Data Plane)
// ============================================================================

/// Pinecone 인덱스 (데이터 플레인)
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    client: reqwest::Client,
    host_url: String,
}

impl PineconeIndex {
    /// 인덱스 호스트로 생성 (`https://` 생략 가능)
    pub fn new(api_key: &str, host: &str) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");
        anyhow::ensure!(!host.trim().is_empty(), "missing Pinecone index host");

        let host = host.trim().trim_end_matches('/');
        let host_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client: build_client(api_key)?,
            host_url,
        })
    }

    /// 데이터 플레인 주소
    pub fn host_url(&self) -> &str {
        &self.host_url
    }

    /// 인덱스 통계
    pub async fn stats(&self) -> Result<IndexStats> {
        let response = self
            .client
            .post(format!("{}/describe_index_stats", self.host_url))
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to call Pinecone describe_index_stats")?;

        parse_response(response, "describe_index_stats").await
    }
}

#[async_trait]
impl VectorStore for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let request = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| UpsertVector {
                    id: &r.id,
                    values: &r.values,
                    metadata: &r.metadata,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.host_url))
            .json(&request)
            .send()
            .await
            .context("Failed to call Pinecone upsert")?;

        let parsed: UpsertResponse = parse_response(response, "upsert").await?;
        Ok(parsed.upserted_count)
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let request = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .client
            .post(format!("{}/query", self.host_url))
            .json(&request)
            .send()
            .await
            .context("Failed to call Pinecone query")?;

        let parsed: QueryResponse = parse_response(response, "query").await?;
        Ok(matches_to_results(parsed.matches))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.stats().await?.total_vector_count)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_client(api_key: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "api-key",
        HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
    );
    headers.insert("x-pinecone-api-version", HeaderValue::from_static(API_VERSION));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .default_headers(headers)
        .build()
        .context("Failed to build Pinecone HTTP client")
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read Pinecone {} response", operation))?;

    if !status.is_success() {
        anyhow::bail!("Pinecone {} failed ({}): {}", operation, status, body);
    }

    serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse Pinecone {} response", operation))
}

fn check_dimension(index: &IndexDescription, expected: usize) -> Result<()> {
    anyhow::ensure!(
        index.dimension == expected,
        "Index '{}' has dimension {}, but the embedding model produces {}",
        index.name,
        index.dimension,
        expected
    );
    Ok(())
}

/// 매치 메타데이터를 검색 결과로 변환
///
/// 숫자는 float로 돌아올 수 있으므로 직접 꺼냅니다. `text`가 없는 매치는 건너뜀.
fn matches_to_results(matches: Vec<QueryMatch>) -> Vec<SearchResult> {
    matches
        .into_iter()
        .filter_map(|m| {
            let metadata = m.metadata.unwrap_or_default();
            let text = match metadata.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => {
                    tracing::warn!("Match {} has no text metadata, skipping", m.id);
                    return None;
                }
            };
            let source = metadata
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let page = metadata
                .get("page")
                .and_then(Value::as_f64)
                .map(|p| p as usize);

            Some(SearchResult {
                id: m.id,
                score: m.score,
                metadata: ChunkMetadata { text, source, page },
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
