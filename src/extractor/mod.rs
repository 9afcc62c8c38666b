//! 콘텐츠 추출 모듈
//!
//! PDF 파일에서 페이지 단위 텍스트를 추출합니다.

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

// ============================================================================
// Extracted Page
// ============================================================================

/// 추출된 페이지
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// 추출된 텍스트
    pub text: String,
    /// 원본 파일 경로
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page_number: usize,
    /// 텍스트가 추출된 페이지 수
    pub total_pages: usize,
}

// ============================================================================
// Content Extractor
// ============================================================================

/// PDF 파일에서 추출
///
/// PDF 파싱은 CPU 바운드이므로 블로킹 스레드에서 실행합니다.
/// 파서 패닉도 에러로 돌려받습니다.
pub async fn extract_pdf(path: &Path) -> Result<Vec<ExtractedPage>> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
        .await
        .context("PDF extraction task failed")??;

    let total_pages = pages.len();
    let source = path.display().to_string();

    Ok(pages
        .into_iter()
        .map(|(page_number, text)| ExtractedPage {
            text,
            source: source.clone(),
            page_number,
            total_pages,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_pdf_missing_file() {
        let result = extract_pdf(Path::new("/nonexistent/file.pdf")).await;
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to read PDF"));
    }

    #[tokio::test]
    async fn test_extract_pdf_page_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.pdf");
        pdf::write_test_pdf(&path, &["Anemia page one", "Fever page two"]);

        let pages = extract_pdf(&path).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(pages[1].total_pages, 2);
        assert!(pages.iter().all(|p| p.source.ends_with("book.pdf")));
    }
}
