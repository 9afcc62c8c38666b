//! 설정 모듈
//!
//! 환경변수(.env 포함)에서 API 키와 실행 설정을 읽어옵니다.
//! 필수 키가 없으면 서버가 뜨기 전에 즉시 실패합니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// 기본 Pinecone 인덱스 이름 (인제스트와 서버가 공유)
pub const DEFAULT_INDEX_NAME: &str = "medicalbot";

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 10000;

/// 기본 서버리스 클라우드
pub const DEFAULT_CLOUD: &str = "aws";

/// OpenRouter (OpenAI 호환) 엔드포인트
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// 기본 채팅 모델
pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-3.5-turbo";

/// 샘플링 온도 (낮을수록 근거 기반 답변)
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// 응답 최대 토큰
pub const DEFAULT_MAX_TOKENS: usize = 1024;

/// 검색할 청크 수
pub const DEFAULT_TOP_K: usize = 8;

/// 기본 시스템 프롬프트 (`{context}`에 검색된 청크가 들어감)
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a medical assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, say that you don't know. \
Do not make up information that is not supported by the context.\n\n{context}";

/// 기본 질문 템플릿 (`{msg}`에 사용자 질문이 들어감)
pub const DEFAULT_QUERY_TEMPLATE: &str = "
    Please provide a comprehensive medical explanation about {msg}, including:
    1. Definition and key characteristics
    2. Main causes (if applicable)
    3. Common symptoms (if applicable)
    4. Basic treatment approaches (if relevant)
    5. Important medical considerations

    Please structure the response clearly and explain any medical terms used.
    Base your answer strictly on the provided medical documents.
    ";

// ============================================================================
// Errors
// ============================================================================

/// 설정 로드 에러
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found in environment variables")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read prompt file {path:?}: {source}")]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse prompt file {path:?}: {source}")]
    PromptParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Prompt Config
// ============================================================================

/// 프롬프트 설정
///
/// 시스템 프롬프트와 질문 템플릿을 코드 밖에서 바꿀 수 있도록 데이터로 분리합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// 시스템 메시지 (`{context}` 자리표시자 포함)
    pub system_prompt: String,
    /// 사용자 질문 확장 템플릿 (`{msg}` 자리표시자 포함)
    pub query_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }
}

impl PromptConfig {
    /// JSON 파일에서 로드 (없는 필드는 기본값)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::PromptFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::PromptParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 사용자 질문을 템플릿에 넣어 확장
    pub fn expand_query(&self, msg: &str) -> String {
        self.query_template.replace("{msg}", msg)
    }

    /// 검색된 컨텍스트로 시스템 메시지 생성
    pub fn render_system(&self, context: &str) -> String {
        self.system_prompt.replace("{context}", context)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Pinecone 접속 설정
#[derive(Debug, Clone)]
pub struct PineconeSettings {
    pub api_key: String,
    pub index_name: String,
    /// 서버리스 리전 (`PINECONE_ENVIRONMENT`), 인덱스 생성 시에만 필요
    pub environment: Option<String>,
    pub cloud: String,
    /// 호스트를 직접 지정하면 describe 호출을 건너뜀
    pub index_host: Option<String>,
}

/// LLM 게이트웨이 설정
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// 서버 실행 설정 (`serve`, `ask`)
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub port: u16,
    pub top_k: usize,
    pub pinecone: PineconeSettings,
    pub llm: LlmSettings,
    pub hf_token: Option<String>,
    pub prompts: PromptConfig,
}

/// 인제스트 설정 (`ingest`, `status`)
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub pinecone: PineconeSettings,
    pub hf_token: Option<String>,
}

impl ServeSettings {
    /// 프로세스 환경변수에서 로드 (.env 파일 먼저 적용)
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(env_lookup)
    }

    /// 임의의 조회 함수에서 로드
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_key = required(&lookup, "OPENROUTER_API_KEY")?;
        let pinecone = pinecone_settings(&lookup, false)?;

        let port = match optional(&lookup, "PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let prompts = match optional(&lookup, "MEDIBOT_PROMPTS") {
            Some(path) => PromptConfig::from_file(Path::new(&path))?,
            None => PromptConfig::default(),
        };

        Ok(Self {
            port,
            top_k: DEFAULT_TOP_K,
            pinecone,
            llm: LlmSettings {
                api_key: llm_key,
                base_url: optional(&lookup, "MEDIBOT_LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: optional(&lookup, "MEDIBOT_LLM_MODEL")
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                temperature: DEFAULT_TEMPERATURE,
                max_tokens: DEFAULT_MAX_TOKENS,
            },
            hf_token: hf_token(&lookup),
            prompts,
        })
    }
}

impl IngestSettings {
    /// 프로세스 환경변수에서 로드
    ///
    /// `require_environment`가 참이면 `PINECONE_ENVIRONMENT`도 필수입니다.
    pub fn from_env(require_environment: bool) -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(env_lookup, require_environment)
    }

    /// 임의의 조회 함수에서 로드
    pub fn from_lookup<F>(lookup: F, require_environment: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            pinecone: pinecone_settings(&lookup, require_environment)?,
            hf_token: hf_token(&lookup),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load .env file: {}", e),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// 빈 문자열은 없는 값으로 취급
fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

fn pinecone_settings<F>(lookup: &F, require_environment: bool) -> Result<PineconeSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = required(lookup, "PINECONE_API_KEY")?;
    let environment = if require_environment {
        Some(required(lookup, "PINECONE_ENVIRONMENT")?)
    } else {
        optional(lookup, "PINECONE_ENVIRONMENT")
    };

    Ok(PineconeSettings {
        api_key,
        index_name: optional(lookup, "PINECONE_INDEX_NAME")
            .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
        environment,
        cloud: optional(lookup, "PINECONE_CLOUD").unwrap_or_else(|| DEFAULT_CLOUD.to_string()),
        index_host: optional(lookup, "PINECONE_INDEX_HOST"),
    })
}

/// Hugging Face 토큰 (우선순위: HF_TOKEN > HUGGINGFACEHUB_API_TOKEN)
fn hf_token<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, "HF_TOKEN").or_else(|| optional(lookup, "HUGGINGFACEHUB_API_TOKEN"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_serve_settings_defaults() {
        let settings = ServeSettings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "or-key"),
            ("PINECONE_API_KEY", "pc-key"),
        ]))
        .unwrap();

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.top_k, 8);
        assert_eq!(settings.pinecone.index_name, "medicalbot");
        assert_eq!(settings.llm.model, "openai/gpt-3.5-turbo");
        assert!((settings.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.llm.max_tokens, 1024);
        assert!(settings.hf_token.is_none());
    }

    #[test]
    fn test_missing_llm_key_fails() {
        let err = ServeSettings::from_lookup(lookup_from(&[("PINECONE_API_KEY", "pc-key")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENROUTER_API_KEY")));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let err = ServeSettings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "or-key"),
            ("PINECONE_API_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PINECONE_API_KEY")));
    }

    #[test]
    fn test_invalid_port() {
        let err = ServeSettings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "or-key"),
            ("PINECONE_API_KEY", "pc-key"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_ingest_requires_environment() {
        let lookup = lookup_from(&[("PINECONE_API_KEY", "pc-key")]);
        let err = IngestSettings::from_lookup(&lookup, true).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PINECONE_ENVIRONMENT")));

        let settings = IngestSettings::from_lookup(&lookup, false).unwrap();
        assert!(settings.pinecone.environment.is_none());
    }

    #[test]
    fn test_hf_token_priority() {
        let lookup = lookup_from(&[
            ("PINECONE_API_KEY", "pc-key"),
            ("HF_TOKEN", "first"),
            ("HUGGINGFACEHUB_API_TOKEN", "second"),
        ]);
        let settings = IngestSettings::from_lookup(lookup, false).unwrap();
        assert_eq!(settings.hf_token.as_deref(), Some("first"));
    }

    #[test]
    fn test_prompt_expansion() {
        let prompts = PromptConfig::default();
        let expanded = prompts.expand_query("fever");
        assert!(expanded.contains("comprehensive medical explanation about fever"));
        assert!(expanded.contains("5. Important medical considerations"));

        let system = prompts.render_system("CONTEXT-BLOCK");
        assert!(system.ends_with("CONTEXT-BLOCK"));
    }

    #[test]
    fn test_prompt_file_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"query_template": "Q: {msg}"}"#).unwrap();

        let prompts = PromptConfig::from_file(&path).unwrap();
        assert_eq!(prompts.expand_query("cough"), "Q: cough");
        assert_eq!(prompts.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_prompt_file_missing() {
        let err = PromptConfig::from_file(Path::new("/nonexistent/prompts.json")).unwrap_err();
        assert!(matches!(err, ConfigError::PromptFile { .. }));
    }
}
