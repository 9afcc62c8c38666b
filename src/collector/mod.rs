//! 파일 수집 모듈
//!
//! 데이터 디렉토리에서 인제스트할 PDF 파일을 수집합니다.
//! 결과는 경로 순으로 정렬되어 실행마다 같은 순서를 보장합니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 PDF 파일 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
}

/// PDF 확장자 여부 (대소문자 무시)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 하위 폴더까지 탐색 여부
    pub recursive: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            include_hidden: false,
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더에서 PDF 수집
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.exists() {
            anyhow::bail!("Directory not found: {:?}", path);
        }

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut files = Vec::new();

        let max_depth = if self.config.recursive { None } else { Some(1) };
        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .max_depth(max_depth)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if !is_pdf(entry.path()) {
                tracing::debug!("Skipping non-PDF file: {:?}", entry.path());
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::warn!("Failed to read metadata for {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            if self.config.max_file_size > 0 && size > self.config.max_file_size {
                tracing::warn!("Skipping large file: {:?} ({} bytes)", entry.path(), size);
                continue;
            }

            files.push(CollectedFile {
                path: entry.path().to_path_buf(),
                size,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} PDF files from {:?}", files.len(), path);
        Ok(files)
    }
}

// ============================================================================
// Tests
// ============================================================================
