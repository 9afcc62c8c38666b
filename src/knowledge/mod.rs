//! Knowledge 모듈 - 벡터 인덱스와 청킹
//!
//! - Chunker: 재귀 문자 분할 (500자 / 오버랩 20자)
//! - VectorStore: 업서트 + k-최근접 검색 트레이트
//! - Pinecone: 호스팅 벡터 DB 클라이언트 (코사인, 384차원)

mod chunker;
mod pinecone;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, ChunkConfig, Chunker, DocumentChunk, RecursiveChunker, CHUNK_OVERLAP,
    CHUNK_SIZE,
};
pub use pinecone::{
    CreateIndexRequest, IndexDescription, IndexSpec, IndexStats, IndexStatus, PineconeClient,
    PineconeIndex, ServerlessSpec,
};
pub use vector::{
    cosine_similarity, ChunkMetadata, InMemoryVectorStore, SearchResult, VectorRecord,
    VectorStore,
};
