use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::parser::{ExtractStatus, ExtractedContent};
use crate::storage::{LinkStatus, Links};
use crate::utils::{truncate_chars, AppError, AppResult};

/// 预算剩余不足该字符数时，不再截断放入新来源
const MIN_SOURCE_CHARS: usize = 1000;

const SYSTEM_PROMPT: &str = "你是一位专业的研究报告撰写专家。请仅依据用户提供的资料来源，针对用户的问题撰写一份简明而信息充分的报告。\n\
     写作要求：\n\
     1. 使用与用户问题相同的语言撰写\n\
     2. 详细摘要不少于500词，可以使用要点列表，保持条理清晰、前后连贯\n\
     3. 引用资料时使用 [来源 N] 标注，不要编造资料中没有的内容\n\
     4. 请严格输出一个 JSON 对象，不要添加其他内容，格式如下：\n\
     {\"title\": \"报告标题\", \"detailed_summary\": \"详细摘要\"}";

/// OpenAI 兼容的对话请求体
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ReportPayload {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "summary", alias = "detailedSummary")]
    detailed_summary: String,
}

/// 摘要结果，尚未分配 id 与时间
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDraft {
    pub title: String,
    pub detailed_summary: String,
    pub links: Links,
}

#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, query: &str, contents: &[ExtractedContent]) -> AppResult<ReportDraft>;
}

/// 组装好的提示词以及各来源的使用情况
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub user_prompt: String,
    pub links: Links,
    pub included: usize,
}

/// 按字符预算挑选来源并生成用户提示词
pub fn build_prompt(query: &str, contents: &[ExtractedContent], max_prompt_chars: usize) -> PromptPlan {
    let mut links = Links::new();
    let mut sources = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for content in contents {
        let status = match content.status {
            ExtractStatus::Failure => LinkStatus::ExtractionFailed,
            ExtractStatus::Empty => LinkStatus::Excluded,
            ExtractStatus::Success => {
                let remaining = max_prompt_chars.saturating_sub(used);
                let text_chars = content.text.chars().count();
                if text_chars <= remaining || remaining >= MIN_SOURCE_CHARS {
                    let text = truncate_chars(&content.text, remaining);
                    included += 1;
                    used += text.chars().count();
                    sources.push_str(&format!("[来源 {}] {}\n", included, content.link));
                    if !content.title.is_empty() {
                        sources.push_str(&format!("标题: {}\n", content.title));
                    }
                    if !content.snippet.is_empty() {
                        sources.push_str(&format!("检索摘要: {}\n", content.snippet));
                    }
                    sources.push_str(text);
                    sources.push_str("\n\n");
                    LinkStatus::Included
                } else {
                    LinkStatus::Excluded
                }
            }
        };
        links.entry(content.link.clone()).or_insert(status);
    }

    let user_prompt = if included == 0 {
        format!(
            "问题：{query}\n\n没有任何资料来源能够成功读取。请在 detailed_summary 中说明未找到可用的资料来源，\
             并建议用户调整问题后重试，不要凭空作答。",
            query = query,
        )
    } else {
        format!(
            "问题：{query}\n\n以下是检索到的资料来源：\n\n{sources}请根据以上资料撰写报告。",
            query = query,
            sources = sources,
        )
    };

    PromptPlan {
        user_prompt,
        links,
        included,
    }
}

/// 从模型输出中解析标题和详细摘要
pub struct ReportParser {
    title_re: Regex,
    summary_re: Regex,
}

impl ReportParser {
    pub fn new() -> Self {
        // 标签必须位于行首且带冒号；引号用于兼容换行未转义、无法直接解析的 JSON
        let title_re =
            Regex::new(r#"(?im)^[#*\s"]*(?:title|标题)[*\s"]*[:：][*\s"]*(.+?)[*\s",]*$"#).unwrap();
        let summary_re = Regex::new(
            r#"(?ims)^[#*\s"]*(?:detailed[ _]summary|详细摘要)[*\s"]*[:：][*\s"]*(.+)$"#,
        )
        .unwrap();
        Self {
            title_re,
            summary_re,
        }
    }

    pub fn parse(&self, response: &str) -> (String, String) {
        let response = response.trim();

        // 优先按 JSON 解析，容忍代码块包裹和前后多余文字
        if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
            if start < end {
                if let Ok(payload) = serde_json::from_str::<ReportPayload>(&response[start..=end]) {
                    if !payload.detailed_summary.trim().is_empty() {
                        return (
                            payload.title.trim().to_string(),
                            payload.detailed_summary.trim().to_string(),
                        );
                    }
                }
            }
        }

        // 备选方案：Title: / Detailed Summary: 文本格式
        let title = self
            .title_re
            .captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        if let Some(summary) = self.summary_re.captures(response).and_then(|c| c.get(1)) {
            let summary = summary
                .as_str()
                .trim_end_matches(|c: char| c == '}' || c == '"' || c.is_whitespace())
                .trim();
            if !summary.is_empty() {
                return (title, summary.to_string());
            }
        }

        warn!("摘要响应格式不符预期，使用整体响应");
        (title, response.to_string())
    }
}

/// 模型未给出标题时，用问题本身作为标题
pub fn fallback_title(query: &str) -> String {
    truncate_chars(query.trim(), 120).to_string()
}

/// 第 attempt 次重试前的等待时间，指数增长，溢出时饱和
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

enum CallError {
    Retryable(String),
    Fatal(String),
}

pub struct LlmSummarizer {
    client: reqwest::Client,
    config: LlmConfig,
    parser: ReportParser,
}

impl LlmSummarizer {
    pub fn new(config: LlmConfig) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs));

        if !config.proxy.is_empty() {
            match reqwest::Proxy::all(&config.proxy) {
                Ok(proxy) => {
                    info!("使用代理: {}", config.proxy);
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!("代理配置无效 '{}': {}", config.proxy, e);
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| AppError::Config(format!("HTTP 客户端创建失败: {}", e)))?;
        Ok(Self {
            client,
            config,
            parser: ReportParser::new(),
        })
    }

    /// 调用对话接口，传输错误与 5xx/429 会重试
    async fn call_api(&self, request: &ChatRequest) -> AppResult<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.config.retry_delay_ms, attempt);
                info!("API 重试 ({}/{})，等待 {}ms...", attempt + 1, max_attempts, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match self.do_request(request).await {
                Ok(content) => return Ok(content),
                Err(CallError::Fatal(message)) => return Err(AppError::Upstream(message)),
                Err(CallError::Retryable(message)) => {
                    warn!("API 调用失败 (尝试 {}/{}): {}", attempt + 1, max_attempts, message);
                    last_error = message;
                }
            }
        }

        Err(AppError::Upstream(last_error))
    }

    async fn do_request(&self, request: &ChatRequest) -> Result<String, CallError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| CallError::Retryable(format!("语言模型服务请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "语言模型服务返回错误 {}: {}",
                status,
                truncate_chars(&body, 300)
            );
            return if status.is_server_error() || status.as_u16() == 429 {
                Err(CallError::Retryable(message))
            } else {
                Err(CallError::Fatal(message))
            };
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(format!("解析语言模型响应失败: {}", e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content)
    }
}

#[async_trait]
impl Summarize for LlmSummarizer {
    async fn summarize(&self, query: &str, contents: &[ExtractedContent]) -> AppResult<ReportDraft> {
        if !self.config.is_configured() {
            return Err(AppError::Config(
                "未配置语言模型密钥，请设置 GROQ_API_KEY 或 [llm] api_key".to_string(),
            ));
        }

        let plan = build_prompt(query, contents, self.config.max_prompt_chars);
        info!("生成报告: {} 个来源纳入提示词，共 {} 个来源", plan.included, plan.links.len());

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: plan.user_prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self.call_api(&request).await?;
        if response.trim().is_empty() {
            return Err(AppError::Upstream("语言模型返回内容为空".to_string()));
        }

        let (title, detailed_summary) = self.parser.parse(&response);
        if detailed_summary.is_empty() {
            return Err(AppError::Upstream("语言模型未生成摘要".to_string()));
        }

        let title = if title.is_empty() { fallback_title(query) } else { title };

        Ok(ReportDraft {
            title,
            detailed_summary,
            links: plan.links,
        })
    }
}
