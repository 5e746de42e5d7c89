use regex::Regex;

use crate::utils::truncate_chars;

/// 提取文本的空白规整与截断
pub struct TextCleaner {
    // (模式, 替换内容)，按顺序应用
    patterns: Vec<(Regex, &'static str)>,
}

impl TextCleaner {
    pub fn new() -> Self {
        let patterns = vec![
            // 统一换行符
            (Regex::new(r"\r\n?").unwrap(), "\n"),
            // 连续空格、制表符、不换行空格
            (Regex::new(r"[ \t\x{00A0}\x{200B}]+").unwrap(), " "),
            // 行首行尾空格
            (Regex::new(r"(?m)^ +| +$").unwrap(), ""),
            // 3个及以上换行合并为2个
            (Regex::new(r"\n{3,}").unwrap(), "\n\n"),
        ];
        Self { patterns }
    }

    pub fn clean(&self, text: &str, max_chars: usize) -> String {
        let mut result = text.to_string();
        for (pattern, replacement) in &self.patterns {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
        truncate_chars(result.trim(), max_chars).to_string()
    }
}
