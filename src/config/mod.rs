use serde::{Deserialize, Serialize};
use std::path::Path;
use anyhow::Result;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";

const SEARCH_KEY_PLACEHOLDER: &str = "your-serpapi-api-key";
const LLM_KEY_PLACEHOLDER: &str = "your-groq-api-key";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub extractor: ExtractorConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub api_key: String,
    pub api_url: String,
    pub engine: String,
    /// 每次检索最多处理的结果数
    pub max_results: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    /// 单次抓取超时
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// 单个来源保留的最大字符数
    pub max_chars: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    /// 提示词中来源正文的总字符预算
    pub max_prompt_chars: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_path: String,
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && self.api_key != SEARCH_KEY_PLACEHOLDER
    }
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && self.api_key != LLM_KEY_PLACEHOLDER
    }
}

impl StorageConfig {
    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // .env 不存在时忽略
        let _ = dotenvy::dotenv();
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// 按优先级合并：内置默认值 < 配置文件 < SEARCHBOT__* 环境变量 < 服务商密钥变量
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Self::default())?;

        let settings = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("SEARCHBOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("search.api_key", std::env::var("SERPAPI_API_KEY").ok())?
            .set_override_option("llm.api_key", std::env::var("GROQ_API_KEY").ok())?
            .set_override_option("storage.database_path", std::env::var("DATABASE_PATH").ok())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            search: SearchConfig {
                api_key: SEARCH_KEY_PLACEHOLDER.to_string(),
                api_url: "https://serpapi.com/search.json".to_string(),
                engine: "google".to_string(),
                max_results: 5,
                timeout_secs: 30,
            },
            extractor: ExtractorConfig {
                timeout_secs: 15,
                max_attempts: 2,
                retry_delay_ms: 1000,
                max_chars: 20_000,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
            },
            llm: LlmConfig {
                api_key: LLM_KEY_PLACEHOLDER.to_string(),
                api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.2,
                max_prompt_chars: 60_000,
                max_attempts: 2,
                retry_delay_ms: 500,
                timeout_secs: 120,
                proxy: String::new(),
            },
            storage: StorageConfig {
                database_path: "./data/reports.db".to_string(),
            },
        }
    }
}
