//! Text Chunking Module
//!
//! 재귀 문자 분할기: 문단 → 줄 → 단어 → 문자 순으로 구분자를 낮춰 가며
//! 고정 크기 청크로 나누고, 인접 청크 사이에 고정 길이 오버랩을 둡니다.
//! 길이는 모두 문자(char) 단위입니다.

// ============================================================================
// Constants
// ============================================================================

/// 최대 청크 크기 (문자 수)
pub const CHUNK_SIZE: usize = 500;

/// 인접 청크 오버랩 (문자 수)
pub const CHUNK_OVERLAP: usize = 20;

/// 구분자 우선순위
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_overlap: CHUNK_OVERLAP,
        }
    }
}

// ============================================================================
// Document Chunk
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// 청크 텍스트
    pub text: String,
    /// 원본 파일 경로
    pub source: String,
    /// PDF 페이지 번호 (1부터 시작)
    pub page: Option<usize>,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 문자 분할 청커
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<&'static str>,
}

impl RecursiveChunker {
    /// 설정으로 생성
    ///
    /// 오버랩이 청크 크기 이상이면 청크 크기보다 하나 작게 줄입니다.
    pub fn new(mut config: ChunkConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        if config.chunk_overlap >= config.chunk_size {
            tracing::warn!(
                "Chunk overlap {} >= chunk size {}, clamping",
                config.chunk_overlap,
                config.chunk_size
            );
            config.chunk_overlap = config.chunk_size - 1;
        }

        Self {
            config,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    /// 기본 설정으로 생성 (500 / 20)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 현재 설정
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // 텍스트에 존재하는 첫 구분자 선택
        let mut separator = "";
        let mut remaining: &[&'static str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits = split_keep_separator(text, separator);
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(split);
            } else {
                final_chunks.extend(self.split_recursive(&split, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// 작은 조각들을 최대 크기까지 합치고, 다음 청크는 오버랩 만큼의 꼬리 조각으로 시작
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > self.config.chunk_size && !current.is_empty() {
                push_trimmed(&mut docs, &current.concat());

                // 오버랩 이하가 될 때까지 앞쪽 조각 제거
                while total > self.config.chunk_overlap
                    || (total + len > self.config.chunk_size && total > 0)
                {
                    let removed = current.remove(0);
                    total -= char_len(removed);
                    if current.is_empty() {
                        break;
                    }
                }
            }

            current.push(split);
            total += len;
        }

        if !current.is_empty() {
            push_trimmed(&mut docs, &current.concat());
        }

        docs
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(docs: &mut Vec<String>, doc: &str) {
    let trimmed = doc.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// 구분자로 분할하되 구분자는 다음 조각의 앞에 유지
///
/// 빈 구분자는 문자 단위 분할입니다.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
