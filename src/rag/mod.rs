//! RAG 모듈 - 검색 증강 답변 파이프라인
//!
//! 질문 임베딩 → 벡터 인덱스 top-k 검색 → 프롬프트 조립 → 채팅 완성.
//! 답변은 원문 그대로 돌려주며 HTML 변환은 [`crate::format`]에서 합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{PromptConfig, DEFAULT_TOP_K};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{SearchResult, VectorStore};
use crate::llm::{ChatMessage, ChatModel};

// ============================================================================
// Types
// ============================================================================

/// 파이프라인 결과
#[derive(Debug, Clone)]
pub struct Answer {
    /// 모델이 생성한 답변 원문
    pub answer: String,
    /// 근거로 사용된 청크 (유사도 순)
    pub context: Vec<SearchResult>,
}

// ============================================================================
// RagChain
// ============================================================================

/// 검색 증강 답변 체인
///
/// 프로세스 시작 시 한 번 만들어 요청 핸들러들이 공유합니다 (읽기 전용).
pub struct RagChain {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn ChatModel>,
    prompts: PromptConfig,
    top_k: usize,
}

impl RagChain {
    /// 구성 요소로 생성 (top_k 기본값 8)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn ChatModel>,
        prompts: PromptConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            prompts,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// 검색 개수 지정
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 질문과 관련된 청크 검색
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let embedding = self
            .embedder
            .embed(question)
            .await
            .context("Failed to embed question")?;

        self.store
            .query(&embedding, self.top_k)
            .await
            .context("Failed to query vector index")
    }

    /// 검색 결과와 질문으로 메시지 조립
    pub fn build_messages(&self, question: &str, context: &[SearchResult]) -> Vec<ChatMessage> {
        let context_text = context
            .iter()
            .map(|r| r.metadata.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        vec![
            ChatMessage::system(self.prompts.render_system(&context_text)),
            ChatMessage::user(self.prompts.expand_query(question)),
        ]
    }

    /// 질문에 대한 답변 생성
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let context = self.retrieve(question).await?;
        tracing::info!(
            "Retrieved {} chunks for question ({} chars)",
            context.len(),
            question.chars().count()
        );

        let messages = self.build_messages(question, &context);
        let answer = self
            .llm
            .complete(&messages)
            .await
            .with_context(|| format!("Failed to get answer from {}", self.llm.name()))?;

        Ok(Answer { answer, context })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ChunkMetadata, InMemoryVectorStore, VectorRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 단어 해시 기반 결정적 임베딩 (테스트용)
    struct WordHashEmbedding;

    #[async_trait]
    impl EmbeddingProvider for WordHashEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0f32; 64];
            for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                if word.is_empty() {
                    continue;
                }
                let hash = word
                    .bytes()
                    .fold(5381usize, |h, b| h.wrapping_mul(33).wrapping_add(b as usize));
                vector[hash % 64] += 1.0;
            }
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            64
        }

        fn name(&self) -> &str {
            "word-hash"
        }
    }

    /// 받은 메시지를 기록하는 모델
    #[derive(Default)]
    struct RecordingChat {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok("Answer line 1\nAnswer line 2".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            anyhow::bail!("gateway unavailable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    async fn seeded_store(texts: &[&str]) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = WordHashEmbedding;
        let mut records = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            records.push(VectorRecord {
                id: format!("chunk-{}", i),
                values: embedder.embed(text).await.unwrap(),
                metadata: ChunkMetadata {
                    text: text.to_string(),
                    source: "Data/medical.pdf".into(),
                    page: Some(i + 1),
                },
            });
        }
        store.upsert(&records).await.unwrap();
        store
    }

    fn corpus() -> Vec<String> {
        let mut texts: Vec<String> = (0..20)
            .map(|i| format!("Filler paragraph number {} about hospital administration topic{}", i, i))
            .collect();
        texts.push("What are the common symptoms of acne vulgaris in teenagers".to_string());
        texts
    }

    #[tokio::test]
    async fn test_verbatim_question_is_retrieved() {
        let texts = corpus();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let store = seeded_store(&refs).await;
        let chain = RagChain::new(
            Arc::new(WordHashEmbedding),
            store,
            Arc::new(RecordingChat::default()),
            PromptConfig::default(),
        );

        let results = chain
            .retrieve("What are the common symptoms of acne vulgaris in teenagers")
            .await
            .unwrap();

        assert_eq!(results.len(), 8);
        assert!(results
            .iter()
            .any(|r| r.metadata.text.contains("acne vulgaris")));
        assert!(results[0].metadata.text.contains("acne vulgaris"));
    }

    #[tokio::test]
    async fn test_answer_builds_prompt_from_context() {
        let store = seeded_store(&["Fever is a rise in body temperature.", "Unrelated text."]).await;
        let chat = Arc::new(RecordingChat::default());
        let chain = RagChain::new(
            Arc::new(WordHashEmbedding),
            store,
            chat.clone(),
            PromptConfig {
                system_prompt: "SYSTEM\n{context}".into(),
                query_template: "Explain {msg}".into(),
            },
        )
        .with_top_k(1);

        let answer = chain.answer("fever").await.unwrap();
        assert_eq!(answer.answer, "Answer line 1\nAnswer line 2");
        assert_eq!(answer.context.len(), 1);

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].content, "SYSTEM\nFever is a rise in body temperature.");
        assert_eq!(seen[1].content, "Explain fever");
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let store = seeded_store(&["Some chunk."]).await;
        let chain = RagChain::new(
            Arc::new(WordHashEmbedding),
            store,
            Arc::new(FailingChat),
            PromptConfig::default(),
        );

        let err = chain.answer("fever").await.unwrap_err();
        assert!(format!("{:#}", err).contains("gateway unavailable"));
    }

    #[test]
    fn test_build_messages_joins_context() {
        let chain = RagChain::new(
            Arc::new(WordHashEmbedding),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(RecordingChat::default()),
            PromptConfig {
                system_prompt: "{context}".into(),
                query_template: "{msg}".into(),
            },
        );
        let context: Vec<SearchResult> = ["one", "two"]
            .iter()
            .map(|t| SearchResult {
                id: t.to_string(),
                score: 1.0,
                metadata: ChunkMetadata {
                    text: t.to_string(),
                    source: String::new(),
                    page: None,
                },
            })
            .collect();

        let messages = chain.build_messages("q", &context);
        assert_eq!(messages[0].content, "one\n\ntwo");
        assert_eq!(messages[1].content, "q");
    }
}
