//! medibot - 의료 문서 기반 RAG 챗봇
//!
//! PDF를 청킹/임베딩하여 Pinecone에 적재하고,
//! 질문이 들어오면 top-k 청크를 검색해 OpenRouter 채팅 모델로 답변합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod format;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod web;

// Re-exports
pub use config::{ConfigError, IngestSettings, PromptConfig, ServeSettings};
pub use embedding::{EmbeddingProvider, HuggingFaceEmbedding, EMBEDDING_DIMENSION, EMBEDDING_MODEL};
pub use format::format_answer_html;
pub use ingest::{IngestReport, Ingestor};
pub use knowledge::{
    ChunkConfig, ChunkMetadata, Chunker, DocumentChunk, InMemoryVectorStore, PineconeClient,
    PineconeIndex, RecursiveChunker, SearchResult, VectorRecord, VectorStore,
};
pub use llm::{ChatMessage, ChatModel, OpenRouterChat, Role};
pub use rag::{Answer, RagChain};
pub use web::{router, AppContext, AppError};
