pub mod serpapi;

pub use serpapi::SerpApiSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::AppResult;

/// 一条检索结果，仅在单次流水线内使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 结果在列表中的名次，从 0 开始
    pub position: usize,
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>>;
}
