//! CLI 모듈
//!
//! medibot CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::{IngestSettings, PineconeSettings, ServeSettings};
use crate::embedding::{EmbeddingProvider, HuggingFaceEmbedding, EMBEDDING_DIMENSION};
use crate::ingest::{load_pdf_directory, split_pages, IngestReport, Ingestor};
use crate::knowledge::{default_chunker, CreateIndexRequest, PineconeClient, PineconeIndex};
use crate::llm::OpenRouterChat;
use crate::rag::RagChain;
use crate::web::{self, AppContext};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "medibot")]
#[command(version, about = "의료 문서 기반 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 웹 채팅 서버 실행
    Serve {
        /// 바인드 포트 (기본: $PORT 또는 10000)
        #[arg(short, long)]
        port: Option<u16>,

        /// 인덱스 이름 (기본: $PINECONE_INDEX_NAME 또는 medicalbot)
        #[arg(long)]
        index: Option<String>,
    },

    /// PDF 폴더를 벡터 인덱스에 적재
    Ingest {
        /// PDF 폴더 경로
        #[arg(short, long, default_value = "Data/")]
        dir: PathBuf,

        /// 하위 폴더까지 탐색
        #[arg(short, long)]
        recursive: bool,

        /// 로드와 청킹만 수행 (네트워크 호출 없음)
        #[arg(long)]
        dry_run: bool,

        /// 인덱스 이름 (기본: $PINECONE_INDEX_NAME 또는 medicalbot)
        #[arg(long)]
        index: Option<String>,
    },

    /// 터미널에서 한 번 질문
    Ask {
        /// 질문
        question: String,

        /// 근거 청크 출력
        #[arg(long)]
        show_sources: bool,

        /// 인덱스 이름 (기본: $PINECONE_INDEX_NAME 또는 medicalbot)
        #[arg(long)]
        index: Option<String>,
    },

    /// 인덱스 연결 및 상태 확인
    Status {
        /// 인덱스 이름 (기본: $PINECONE_INDEX_NAME 또는 medicalbot)
        #[arg(long)]
        index: Option<String>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { port, index } => cmd_serve(port, index).await,
        Commands::Ingest {
            dir,
            recursive,
            dry_run,
            index,
        } => cmd_ingest(dir, recursive, dry_run, index).await,
        Commands::Ask {
            question,
            show_sources,
            index,
        } => cmd_ask(&question, show_sources, index).await,
        Commands::Status { index } => cmd_status(index).await,
    }
}

// ============================================================================
// Shared Setup
// ============================================================================

/// 명령줄에서 지정한 인덱스 이름 적용
fn apply_index_override(settings: &mut PineconeSettings, index: Option<String>) {
    if let Some(name) = index.filter(|n| !n.trim().is_empty()) {
        settings.index_name = name.trim().to_string();
    }
}

/// 기존 인덱스에 연결
///
/// 호스트가 지정되어 있으면 컨트롤 플레인 조회 대신 통계로 차원을 확인합니다.
async fn connect_index(settings: &PineconeSettings) -> Result<PineconeIndex> {
    if let Some(ref host) = settings.index_host {
        let index = PineconeIndex::new(&settings.api_key, host)?;
        let stats = index
            .stats()
            .await
            .with_context(|| format!("Failed to reach index host {}", index.host_url()))?;
        stats.check_dimension(EMBEDDING_DIMENSION)?;
        return Ok(index);
    }

    PineconeClient::new(&settings.api_key)?
        .connect(&settings.api_key, &settings.index_name, EMBEDDING_DIMENSION)
        .await
}

/// 설정으로 답변 체인 구성
pub async fn build_chain(settings: &ServeSettings) -> Result<RagChain> {
    let embedder = HuggingFaceEmbedding::new(settings.hf_token.clone())?;
    let index = connect_index(&settings.pinecone)
        .await
        .context("Pinecone 인덱스 연결 실패")?;
    let llm = OpenRouterChat::new(&settings.llm)?;

    tracing::info!(
        "Answer chain ready (index: {}, model: {}, top_k: {})",
        settings.pinecone.index_name,
        settings.llm.model,
        settings.top_k
    );

    Ok(RagChain::new(
        Arc::new(embedder),
        Arc::new(index),
        Arc::new(llm),
        settings.prompts.clone(),
    )
    .with_top_k(settings.top_k))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
///
/// 설정 로드와 인덱스 연결이 끝난 뒤에만 포트를 엽니다.
async fn cmd_serve(port: Option<u16>, index: Option<String>) -> Result<()> {
    let mut settings = ServeSettings::from_env().context("설정 로드 실패")?;
    apply_index_override(&mut settings.pinecone, index);
    let chain = build_chain(&settings).await?;
    let port = port.unwrap_or(settings.port);

    web::serve(AppContext::new(chain), port).await
}

/// 인제스트 명령어 (ingest)
async fn cmd_ingest(
    dir: PathBuf,
    recursive: bool,
    dry_run: bool,
    index: Option<String>,
) -> Result<()> {
    let collector = FileCollector::new(CollectorConfig {
        recursive,
        ..Default::default()
    });

    if dry_run {
        println!("[*] PDF 로드 중 (dry run): {}", dir.display());
        let mut report = IngestReport::default();
        let pages = load_pdf_directory(&collector, &dir, &mut report).await?;
        let chunker = default_chunker();
        report.chunks = split_pages(chunker.as_ref(), &pages).len();
        print_report(&report);
        return Ok(());
    }

    let mut settings = IngestSettings::from_env(true).context("설정 로드 실패")?;
    apply_index_override(&mut settings.pinecone, index);
    let pinecone = &settings.pinecone;
    let region = pinecone.environment.as_deref().unwrap_or_default();

    println!("[*] Pinecone 인덱스 확인 중: {}", pinecone.index_name);
    let client = PineconeClient::new(&pinecone.api_key)?;
    let description = client
        .ensure_index(&CreateIndexRequest::serverless(
            &pinecone.index_name,
            EMBEDDING_DIMENSION,
            &pinecone.cloud,
            region,
        ))
        .await
        .context("인덱스 생성/조회 실패")?;
    let index = PineconeIndex::new(&pinecone.api_key, &description.host)?;

    let embedder = HuggingFaceEmbedding::new(settings.hf_token.clone())?;
    println!("[*] 임베딩 모델: {}", embedder.name());

    println!("[*] PDF 적재 중: {}", dir.display());
    let ingestor = Ingestor::new(collector, default_chunker(), &embedder, &index);
    let report = ingestor.run(&dir).await.context("인제스트 실패")?;

    print_report(&report);
    println!("[OK] 인덱스 적재 완료: {}", pinecone.index_name);

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(question: &str, show_sources: bool, index: Option<String>) -> Result<()> {
    anyhow::ensure!(!question.trim().is_empty(), "질문이 비어 있습니다");

    let mut settings = ServeSettings::from_env().context("설정 로드 실패")?;
    apply_index_override(&mut settings.pinecone, index);
    let chain = build_chain(&settings).await?;

    println!("[*] 질문: \"{}\"", question);
    let answer = chain.answer(question).await.context("답변 생성 실패")?;

    println!();
    println!("{}", answer.answer.trim());

    if show_sources {
        println!();
        println!("[OK] 근거 청크 ({} 건):", answer.context.len());
        for (i, result) in answer.context.iter().enumerate() {
            let page = result
                .metadata
                .page
                .map(|p| format!(" p.{}", p))
                .unwrap_or_default();
            println!(
                "{}. [점수: {:.4}] {}{}",
                i + 1,
                result.score,
                result.metadata.source,
                page
            );
            println!("   {}", truncate_text(&result.metadata.text, 200));
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(index: Option<String>) -> Result<()> {
    println!("medibot v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut settings = IngestSettings::from_env(false).context("설정 로드 실패")?;
    apply_index_override(&mut settings.pinecone, index);
    let pinecone = &settings.pinecone;
    let client = PineconeClient::new(&pinecone.api_key)?;

    let indexes = client.list_indexes().await.context("인덱스 목록 조회 실패")?;
    let Some(index) = indexes.into_iter().find(|i| i.name == pinecone.index_name) else {
        anyhow::bail!("Index '{}' not found.", pinecone.index_name);
    };

    println!("[OK] Connected to index: {}", index.name);
    println!(
        "     차원: {}, 메트릭: {}, 상태: {}",
        index.dimension, index.metric, index.status.state
    );

    if index.dimension != EMBEDDING_DIMENSION {
        println!(
            "[!] 임베딩 차원 불일치: 인덱스 {} / 모델 {}",
            index.dimension, EMBEDDING_DIMENSION
        );
    }

    if index.host.is_empty() {
        println!("[!] 인덱스 호스트가 아직 할당되지 않았습니다");
        return Ok(());
    }

    match PineconeIndex::new(&pinecone.api_key, &index.host)?.stats().await {
        Ok(stats) => println!("[OK] 저장된 벡터: {} 건", stats.total_vector_count),
        Err(e) => println!("[!] 통계 조회 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_report(report: &IngestReport) {
    println!();
    println!(
        "[OK] PDF: 발견 {}, 로드 {}, 실패 {}",
        report.files_found, report.files_loaded, report.files_skipped
    );
    println!(
        "     페이지 {}, 청크 {}, 업서트 {}",
        report.pages, report.chunks, report.upserted
    );
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_parse_ingest_defaults() {
        let cli = Cli::try_parse_from(["medibot", "ingest"]).unwrap();
        match cli.command {
            Commands::Ingest {
                dir,
                recursive,
                dry_run,
                index,
            } => {
                assert_eq!(dir, PathBuf::from("Data/"));
                assert!(!recursive);
                assert!(!dry_run);
                assert_eq!(index, None);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_parse_serve_port() {
        let cli = Cli::try_parse_from(["medibot", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                port: Some(8080),
                index: None
            }
        ));
    }

    #[test]
    fn test_parse_index_flag() {
        for args in [
            vec!["medibot", "serve", "--index", "cardio"],
            vec!["medibot", "ingest", "--index", "cardio"],
            vec!["medibot", "ask", "what is fever?", "--index", "cardio"],
            vec!["medibot", "status", "--index", "cardio"],
        ] {
            let cli = Cli::try_parse_from(args.iter().copied()).unwrap();
            let index = match cli.command {
                Commands::Serve { index, .. }
                | Commands::Ingest { index, .. }
                | Commands::Ask { index, .. }
                | Commands::Status { index } => index,
            };
            assert_eq!(index.as_deref(), Some("cardio"), "{:?}", args);
        }
    }

    #[test]
    fn test_apply_index_override() {
        let mut settings = PineconeSettings {
            api_key: "key".into(),
            index_name: "medicalbot".into(),
            environment: None,
            cloud: "aws".into(),
            index_host: None,
        };

        apply_index_override(&mut settings, None);
        assert_eq!(settings.index_name, "medicalbot");

        apply_index_override(&mut settings, Some("  ".into()));
        assert_eq!(settings.index_name, "medicalbot");

        apply_index_override(&mut settings, Some("cardio".into()));
        assert_eq!(settings.index_name, "cardio");
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question() {
        let err = cmd_ask("   ", false, None).await.unwrap_err();
        assert!(err.to_string().contains("질문이 비어 있습니다"));
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let result = cmd_ingest(dir.path().to_path_buf(), false, true, None).await;
        assert!(result.is_ok());
    }
}
