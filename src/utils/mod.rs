pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("请求参数错误: {0}")]
    Validation(String),

    #[error("上游服务错误: {0}")]
    Upstream(String),

    #[error("报告不存在: {0}")]
    NotFound(i64),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

/// 按字符边界截断，返回不超过 `max_chars` 个字符的前缀
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_user_facing() {
        assert_eq!(
            AppError::Validation("query 不能为空".into()).to_string(),
            "请求参数错误: query 不能为空"
        );
        assert_eq!(AppError::NotFound(7).to_string(), "报告不存在: 7");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("巴黎是法国首都", 2), "巴黎");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}
