//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 호스팅 벡터 DB(Pinecone)와 테스트용 인메모리 저장소가 같은 트레이트를 구현합니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 레코드 메타데이터
///
/// 청크 원문은 `text` 키로 저장됩니다 (LangChain 호환 레이아웃).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 청크 텍스트
    pub text: String,
    /// 원본 파일 경로
    pub source: String,
    /// PDF 페이지 번호 (1부터 시작)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 레코드 ID (UUID)
    pub id: String,
    /// 임베딩 벡터
    pub values: Vec<f32>,
    /// 메타데이터
    pub metadata: ChunkMetadata,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 레코드 ID
    pub id: String,
    /// 코사인 유사도 스코어
    pub score: f32,
    /// 메타데이터
    pub metadata: ChunkMetadata,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 업서트, 저장된 개수 반환
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 유사도 상위 `top_k` 검색 (스코어 내림차순)
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// 저장된 레코드 수
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// InMemoryVectorStore
// ============================================================================

/// 인메모리 코사인 유사도 저장소 (전수 탐색)
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut guard = self
            .records
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        for record in records {
            // 같은 ID는 덮어쓰기
            match guard.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => guard.push(record.clone()),
            }
        }

        Ok(records.len())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let guard = self
            .records
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut results: Vec<SearchResult> = guard
            .iter()
            .map(|r| SearchResult {
                id: r.id.clone(),
                score: cosine_similarity(embedding, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let guard = self
            .records
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.len())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
