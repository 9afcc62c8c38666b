//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF에서 텍스트 추출
///
/// 페이지별로 텍스트를 추출하여 (페이지 번호, 텍스트) 튜플 벡터로 반환합니다.
/// 페이지 번호는 문서의 실제 페이지 번호(1부터)이며, 텍스트가 없는 페이지는
/// 건너뛰지만 번호는 유지됩니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let raw_pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    let pages: Vec<(usize, String)> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, text)| (i + 1, normalize_page_text(text)))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    // 텍스트가 비어있으면 경고 (스캔 문서일 가능성)
    if pages.is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?} ({} pages). It might be a scanned document.",
            path,
            raw_pages.len()
        );
    }

    Ok(pages)
}

/// 페이지 텍스트 정리
///
/// 앞뒤 공백을 제거하고 3줄 이상 연속된 빈 줄은 문단 구분 하나로 줄입니다.
fn normalize_page_text(text: &str) -> String {
    let blank_runs = Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").expect("Invalid regex");
    blank_runs
        .replace_all(&text.replace("\r\n", "\n"), "\n\n")
        .trim()
        .to_string()
}

/// 페이지별 텍스트로 최소 PDF 생성 (테스트 픽스처)
#[cfg(test)]
pub(crate) fn write_test_pdf(path: &Path, pages: &[&str]) {
    fn escape(text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)")
    }

    // 1: Catalog, 2: Pages, 3: Font, 이후 페이지마다 (Page, Contents)
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        String::new(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    let mut kids = Vec::new();
    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + i * 2;
        kids.push(format!("{} 0 R", page_id));
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_id + 1
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escape(text));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }
    objects[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    );

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    std::fs::write(path, out).unwrap();
}

// ============================================================================
// Tests
// ============================================================================
