pub mod html_parser;
pub mod pdf_parser;
pub mod text_cleaner;

pub use html_parser::HtmlParser;
pub use pdf_parser::PdfParser;
pub use text_cleaner::TextCleaner;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::search::SearchResult;
use crate::utils::{AppError, AppResult};

/// 单个来源的抽取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStatus {
    Success,
    Failure,
    Empty,
}

/// 一个链接的抽取内容，仅在单次流水线内使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub link: String,
    pub title: String,
    pub text: String,
    pub status: ExtractStatus,
    pub error: Option<String>,
    /// 检索结果中的摘要片段
    #[serde(default)]
    pub snippet: String,
}

impl ExtractedContent {
    pub fn success(link: &str, title: String, text: String) -> Self {
        Self {
            link: link.to_string(),
            title,
            text,
            status: ExtractStatus::Success,
            error: None,
            snippet: String::new(),
        }
    }

    pub fn empty(link: &str, title: String, reason: &str) -> Self {
        Self {
            link: link.to_string(),
            title,
            text: String::new(),
            status: ExtractStatus::Empty,
            error: Some(reason.to_string()),
            snippet: String::new(),
        }
    }

    pub fn failure(link: &str, reason: impl Into<String>) -> Self {
        Self {
            link: link.to_string(),
            title: String::new(),
            text: String::new(),
            status: ExtractStatus::Failure,
            error: Some(reason.into()),
            snippet: String::new(),
        }
    }

    /// 页面没有标题时沿用检索结果的标题，并附上检索摘要
    pub fn with_search_result(mut self, result: &SearchResult) -> Self {
        if self.title.trim().is_empty() {
            self.title = result.title.clone();
        }
        self.snippet = result.snippet.clone();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractStatus::Success
    }
}

/// 抽取失败只记录在结果中，不向上抛出
#[async_trait]
pub trait ContentExtract: Send + Sync {
    async fn extract(&self, url: &str) -> ExtractedContent;
}

/// 抓取网页或PDF并提取正文
pub struct WebExtractor {
    client: Client,
    config: ExtractorConfig,
    html_parser: HtmlParser,
    cleaner: TextCleaner,
}

impl WebExtractor {
    pub fn new(config: ExtractorConfig) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(Self {
            client,
            config,
            html_parser: HtmlParser::new(),
            cleaner: TextCleaner::new(),
        })
    }

    /// 单个链接的总耗时上限，覆盖全部重试
    fn overall_timeout(&self) -> Duration {
        let attempts = u64::from(self.config.max_attempts.max(1));
        Duration::from_secs(self.config.timeout_secs * attempts + 5)
            + Duration::from_millis(self.config.retry_delay_ms * (attempts - 1))
    }

    async fn extract_with_retry(&self, url: &Url) -> ExtractedContent {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let content = self.fetch_once(url).await;
            if content.status != ExtractStatus::Failure || attempt >= max_attempts {
                return content;
            }

            debug!(
                "抓取失败 (第 {}/{} 次): {} - {}",
                attempt,
                max_attempts,
                url,
                content.error.as_deref().unwrap_or_default()
            );
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
        }
    }

    async fn fetch_once(&self, url: &Url) -> ExtractedContent {
        let link = url.as_str();

        let response = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => return ExtractedContent::failure(link, describe_request_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ExtractedContent::failure(link, describe_status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        if content_type.contains("pdf") || url.path().to_lowercase().ends_with(".pdf") {
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => return ExtractedContent::failure(link, format!("读取响应失败: {}", e)),
            };
            self.parse_pdf(link, bytes).await
        } else {
            let html = match response.text().await {
                Ok(html) => html,
                Err(e) => return ExtractedContent::failure(link, format!("读取响应失败: {}", e)),
            };
            self.parse_html(link, &html)
        }
    }

    fn parse_html(&self, link: &str, html: &str) -> ExtractedContent {
        let page = self.html_parser.extract(html);
        let text = self.cleaner.clean(&page.text, self.config.max_chars);
        if text.is_empty() {
            return ExtractedContent::empty(
                link,
                page.title,
                "未能提取到正文，可能是网站禁止抓取或依赖 JavaScript 渲染",
            );
        }
        ExtractedContent::success(link, page.title, text)
    }

    async fn parse_pdf(&self, link: &str, bytes: Vec<u8>) -> ExtractedContent {
        // pdf-extract 为同步解析，且遇到畸形文件可能 panic
        let parsed = tokio::task::spawn_blocking(move || PdfParser::new().extract_text(&bytes)).await;

        match parsed {
            Ok(Ok(text)) => {
                let text = self.cleaner.clean(&text, self.config.max_chars);
                if text.is_empty() {
                    ExtractedContent::empty(link, String::new(), "PDF 中没有可提取的文本，可能是扫描件或受保护文档")
                } else {
                    ExtractedContent::success(link, String::new(), text)
                }
            }
            Ok(Err(e)) => ExtractedContent::failure(link, format!("PDF 解析失败: {}", e)),
            Err(e) => ExtractedContent::failure(link, format!("PDF 解析异常: {}", e)),
        }
    }
}

#[async_trait]
impl ContentExtract for WebExtractor {
    async fn extract(&self, url: &str) -> ExtractedContent {
        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => parsed,
            _ => {
                warn!("无效的链接: {}", url);
                return ExtractedContent::failure(url, "链接格式无效");
            }
        };

        let content = match tokio::time::timeout(self.overall_timeout(), self.extract_with_retry(&parsed)).await {
            Ok(content) => content,
            Err(_) => ExtractedContent::failure(url, "抓取超时"),
        };

        // 保持调用方传入的链接作为键
        let content = ExtractedContent {
            link: url.to_string(),
            ..content
        };

        match content.status {
            ExtractStatus::Success => info!("抽取成功: {} ({} 字符)", url, content.text.chars().count()),
            ExtractStatus::Empty => warn!("未抽取到正文: {}", url),
            ExtractStatus::Failure => warn!(
                "抽取失败: {} - {}",
                url,
                content.error.as_deref().unwrap_or_default()
            ),
        }

        content
    }
}

fn describe_status(status: StatusCode) -> String {
    match status.as_u16() {
        403 => "访问被拒绝 (403)，网站阻止了请求".to_string(),
        404 => "页面不存在 (404)，链接可能已失效".to_string(),
        429 => "请求过多 (429)，网站限制了访问频率".to_string(),
        503 => "服务不可用 (503)，网站可能暂时关闭或拦截了自动访问".to_string(),
        _ => format!("HTTP 错误 {}", status),
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "请求超时，网站响应过慢".to_string()
    } else if e.is_redirect() {
        "重定向次数过多".to_string()
    } else {
        format!("连接错误: {}", e)
    }
}
