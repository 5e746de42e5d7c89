use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::search::{SearchResult, WebSearch};
use crate::utils::{AppError, AppResult};

/// SerpAPI 在查询没有结果时也会以 error 字段返回
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

#[derive(Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    source: Option<String>,
}

pub struct SerpApiSearch {
    client: Client,
    config: SearchConfig,
}

impl SerpApiSearch {
    pub fn new(config: SearchConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP 客户端创建失败: {}", e)))?;

        Ok(Self { client, config })
    }

    fn parse_response(&self, body: &str) -> AppResult<Vec<SearchResult>> {
        let response: SerpApiResponse = serde_json::from_str(body)
            .map_err(|e| AppError::Upstream(format!("搜索结果解析失败: {}", e)))?;

        if let Some(error) = response.error {
            if error.contains(NO_RESULTS_MARKER) {
                warn!("SerpAPI 未返回结果: {}", error);
                return Ok(vec![]);
            }
            return Err(AppError::Upstream(format!("SerpAPI 错误: {}", error)));
        }

        let results = response
            .organic_results
            .into_iter()
            .filter(|r| !r.link.trim().is_empty())
            .take(self.config.max_results)
            .enumerate()
            .map(|(position, r)| SearchResult {
                position,
                title: r.title.trim().to_string(),
                link: r.link.trim().to_string(),
                snippet: r.snippet.trim().to_string(),
                source: r.source.unwrap_or_else(|| self.config.engine.clone()),
            })
            .collect();

        Ok(results)
    }
}

#[async_trait]
impl WebSearch for SerpApiSearch {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query 不能为空".to_string()));
        }
        if !self.config.is_configured() {
            return Err(AppError::Config(
                "未配置 SerpAPI 密钥，请设置 SERPAPI_API_KEY 或 [search] api_key".to_string(),
            ));
        }

        info!("正在检索: {}", query);

        let num = self.config.max_results.to_string();
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("engine", self.config.engine.as_str()),
                ("q", query),
                ("api_key", self.config.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("搜索服务请求失败: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("读取搜索响应失败: {}", e)))?;

        if !status.is_success() {
            warn!("SerpAPI 返回 {}", status);
            return Err(AppError::Upstream(format!(
                "搜索服务返回错误 {}: {}",
                status,
                crate::utils::truncate_chars(&body, 300)
            )));
        }

        let results = self.parse_response(&body)?;
        info!("检索到 {} 条结果", results.len());
        Ok(results)
    }
}
