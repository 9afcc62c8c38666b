//! 답변 표시용 변환
//!
//! 답변 속 마크업은 이스케이프한 뒤, 줄바꿈을 `<br>`로, 글머리표 앞에 `<br>`를 넣어
//! HTML 조각으로 바로 쓸 수 있게 합니다.

/// 답변 텍스트를 HTML 조각으로 변환
///
/// `&`, `<`, `>` 이스케이프 후 `\n` → `<br>`, 그 다음 `•` → `<br>•` 순서로 치환합니다.
pub fn format_answer_html(answer: &str) -> String {
    html_escape::encode_text(answer)
        .replace('\n', "<br>")
        .replace('•', "<br>•")
}
