//! 인제스트 모듈 - PDF 폴더를 벡터 인덱스로 적재
//!
//! PDF 수집 → 페이지 추출 → 청킹 → 배치 임베딩 → 배치 업서트.
//!
//! 업서트는 배치 단위로 커밋되며, 중간에 실패하면 이미 올라간 배치는
//! 되돌리지 않습니다. 재실행 시 새 ID로 다시 올라갑니다.

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileCollector;
use crate::embedding::EmbeddingProvider;
use crate::extractor::{extract_pdf, ExtractedPage};
use crate::knowledge::{ChunkMetadata, Chunker, DocumentChunk, VectorRecord, VectorStore};

/// 임베딩 호출당 텍스트 수
pub const EMBED_BATCH_SIZE: usize = 32;

/// 업서트 호출당 레코드 수
pub const UPSERT_BATCH_SIZE: usize = 100;

// ============================================================================
// Report
// ============================================================================

/// 인제스트 결과 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// 발견한 PDF 수
    pub files_found: usize,
    /// 텍스트를 추출한 PDF 수
    pub files_loaded: usize,
    /// 읽기/파싱 실패로 건너뛴 PDF 수
    pub files_skipped: usize,
    /// 추출된 페이지 수
    pub pages: usize,
    /// 생성된 청크 수
    pub chunks: usize,
    /// 인덱스에 업서트된 레코드 수
    pub upserted: usize,
}

// ============================================================================
// Loading & Splitting
// ============================================================================

/// 폴더의 PDF를 페이지 단위로 로드
///
/// 실패한 파일은 경고 후 건너뛰며 전체 인제스트는 계속됩니다.
pub async fn load_pdf_directory(
    collector: &FileCollector,
    dir: &Path,
    report: &mut IngestReport,
) -> Result<Vec<ExtractedPage>> {
    let files = collector.collect_directory(dir)?;
    report.files_found = files.len();

    let mut pages = Vec::new();
    for file in &files {
        match extract_pdf(&file.path).await {
            Ok(extracted) => {
                tracing::debug!("Loaded {} pages from {:?}", extracted.len(), file.path);
                report.files_loaded += 1;
                pages.extend(extracted);
            }
            Err(e) => {
                tracing::warn!("Skipping {:?}: {:#}", file.path, e);
                report.files_skipped += 1;
            }
        }
    }

    report.pages = pages.len();
    Ok(pages)
}

/// 페이지들을 청크로 분할 (입력 순서 유지)
pub fn split_pages(chunker: &dyn Chunker, pages: &[ExtractedPage]) -> Vec<DocumentChunk> {
    pages
        .iter()
        .flat_map(|page| {
            chunker
                .chunk(&page.text)
                .into_iter()
                .map(move |text| DocumentChunk {
                    text,
                    source: page.source.clone(),
                    page: Some(page.page_number),
                })
        })
        .collect()
}

// ============================================================================
// Ingestor
// ============================================================================

/// 인제스트 파이프라인
pub struct Ingestor<'a> {
    collector: FileCollector,
    chunker: Box<dyn Chunker>,
    embedder: &'a dyn EmbeddingProvider,
    store: &'a dyn VectorStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        collector: FileCollector,
        chunker: Box<dyn Chunker>,
        embedder: &'a dyn EmbeddingProvider,
        store: &'a dyn VectorStore,
    ) -> Self {
        Self {
            collector,
            chunker,
            embedder,
            store,
        }
    }

    /// 폴더 전체를 인덱스에 적재
    pub async fn run(&self, dir: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        tracing::info!("Loading PDF files from {:?}", dir);
        let pages = load_pdf_directory(&self.collector, dir, &mut report).await?;

        tracing::info!("Splitting text into chunks with {}", self.chunker.name());
        let chunks = split_pages(self.chunker.as_ref(), &pages);
        report.chunks = chunks.len();

        if chunks.is_empty() {
            tracing::warn!("No chunks produced from {:?}", dir);
            return Ok(report);
        }

        tracing::info!(
            "Embedding {} chunks with {} and upserting",
            chunks.len(),
            self.embedder.name()
        );

        for (batch_no, batch) in chunks.chunks(UPSERT_BATCH_SIZE).enumerate() {
            let records = self.embed_chunks(batch).await.with_context(|| {
                format!(
                    "Embedding failed at batch {} ({} records already upserted, not rolled back)",
                    batch_no + 1,
                    report.upserted
                )
            })?;

            let upserted = self.store.upsert(&records).await.with_context(|| {
                format!(
                    "Upsert failed at batch {} ({} records already upserted, not rolled back)",
                    batch_no + 1,
                    report.upserted
                )
            })?;

            report.upserted += upserted;
            tracing::debug!("Upserted batch {} ({} total)", batch_no + 1, report.upserted);
        }

        Ok(report)
    }

    /// 청크를 임베딩하여 레코드로 변환
    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<VectorRecord>> {
        let mut records = Vec::with_capacity(chunks.len());

        for group in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = group.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            anyhow::ensure!(
                vectors.len() == group.len(),
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                group.len()
            );

            for (chunk, values) in group.iter().zip(vectors) {
                anyhow::ensure!(
                    values.len() == self.embedder.dimension(),
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.embedder.dimension(),
                    values.len()
                );
                records.push(VectorRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    values,
                    metadata: ChunkMetadata {
                        text: chunk.text.clone(),
                        source: chunk.source.clone(),
                        page: chunk.page,
                    },
                });
            }
        }

        Ok(records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{default_chunker, InMemoryVectorStore, RecursiveChunker};
    use async_trait::async_trait;

    struct ConstEmbedding {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; self.dimension])
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "const"
        }
    }

    struct FailingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("inference endpoint down")
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn page(text: &str, page_number: usize) -> ExtractedPage {
        ExtractedPage {
            text: text.to_string(),
            source: "Data/book.pdf".to_string(),
            page_number,
            total_pages: 2,
        }
    }

    #[test]
    fn test_split_pages_keeps_metadata() {
        let chunker = RecursiveChunker::with_defaults();
        let long = "Hypertension is persistently elevated blood pressure. ".repeat(30);
        let pages = vec![page("Short first page.", 1), page(&long, 2)];

        let chunks = split_pages(&chunker, &pages);
        assert!(chunks.len() > 2);
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[0].text, "Short first page.");
        assert!(chunks[1..].iter().all(|c| c.page == Some(2)));
        assert!(chunks.iter().all(|c| c.source == "Data/book.pdf"));
    }

    #[test]
    fn test_split_pages_deterministic_count() {
        let chunker = default_chunker();
        let pages = vec![page(&"Diabetes mellitus affects glucose. ".repeat(50), 1)];
        let first = split_pages(chunker.as_ref(), &pages);
        let second = split_pages(chunker.as_ref(), &pages);
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn test_embed_chunks_builds_records() {
        let embedder = ConstEmbedding { dimension: 4 };
        let store = InMemoryVectorStore::new();
        let ingestor = Ingestor::new(
            FileCollector::with_defaults(),
            default_chunker(),
            &embedder,
            &store,
        );

        let chunks: Vec<DocumentChunk> = (0..40)
            .map(|i| DocumentChunk {
                text: format!("chunk {}", i),
                source: "Data/a.pdf".into(),
                page: Some(1),
            })
            .collect();

        let records = ingestor.embed_chunks(&chunks).await.unwrap();
        assert_eq!(records.len(), 40);
        assert_eq!(records[39].metadata.text, "chunk 39");
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[0].values.len(), 4);
    }

    #[tokio::test]
    async fn test_run_skips_unreadable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not really a pdf").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let embedder = ConstEmbedding { dimension: 4 };
        let store = InMemoryVectorStore::new();
        let ingestor = Ingestor::new(
            FileCollector::with_defaults(),
            default_chunker(),
            &embedder,
            &store,
        );

        let report = ingestor.run(dir.path()).await.unwrap();
        assert_eq!(report.files_found, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.chunks, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_ingests_pdf_pages() {
        let dir = tempfile::tempdir().unwrap();
        let long = "Hypertension is persistently elevated blood pressure. ".repeat(12);
        crate::extractor::pdf::write_test_pdf(
            &dir.path().join("book.pdf"),
            &["Anemia page one", &long],
        );
        crate::extractor::pdf::write_test_pdf(&dir.path().join("leaflet.pdf"), &["Fever page"]);

        let embedder = ConstEmbedding { dimension: 4 };
        let store = InMemoryVectorStore::new();
        let ingestor = Ingestor::new(
            FileCollector::with_defaults(),
            default_chunker(),
            &embedder,
            &store,
        );

        let first = ingestor.run(dir.path()).await.unwrap();
        assert_eq!(first.files_found, 2);
        assert_eq!(first.files_loaded, 2);
        assert_eq!(first.files_skipped, 0);
        assert_eq!(first.pages, 3);
        assert!(first.chunks > 3);
        assert_eq!(first.upserted, first.chunks);
        assert_eq!(store.count().await.unwrap(), first.chunks);

        let second = ingestor.run(dir.path()).await.unwrap();
        assert_eq!(second.chunks, first.chunks);
        assert_eq!(second.upserted, second.chunks);
        assert_eq!(store.count().await.unwrap(), first.chunks * 2);

        let query = vec!["Anemia page one".len() as f32; 4];
        let hits = store.query(&query, store.count().await.unwrap()).await.unwrap();
        let anemia = hits
            .iter()
            .find(|r| r.metadata.text == "Anemia page one")
            .unwrap();
        assert_eq!(anemia.metadata.page, Some(1));
        assert!(anemia.metadata.source.ends_with("book.pdf"));
        assert!(hits
            .iter()
            .filter(|r| r.metadata.text.contains("Hypertension"))
            .all(|r| r.metadata.page == Some(2)));
    }

    #[tokio::test]
    async fn test_run_missing_directory_is_error() {
        let embedder = ConstEmbedding { dimension: 4 };
        let store = InMemoryVectorStore::new();
        let ingestor = Ingestor::new(
            FileCollector::with_defaults(),
            default_chunker(),
            &embedder,
            &store,
        );
        assert!(ingestor.run(Path::new("/nonexistent/Data")).await.is_err());
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts() {
        let embedder = FailingEmbedding;
        let store = InMemoryVectorStore::new();
        let ingestor = Ingestor::new(
            FileCollector::with_defaults(),
            default_chunker(),
            &embedder,
            &store,
        );

        let chunks = vec![DocumentChunk {
            text: "text".into(),
            source: "a.pdf".into(),
            page: None,
        }];
        let err = ingestor.embed_chunks(&chunks).await.unwrap_err();
        assert!(err.to_string().contains("inference endpoint down"));
    }
}
