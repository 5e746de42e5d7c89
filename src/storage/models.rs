use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::{AppError, AppResult};

/// 来源在报告中的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Included,
    ExtractionFailed,
    Excluded,
}

pub type Links = BTreeMap<String, LinkStatus>;

/// 已持久化的报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub query: String,
    pub title: String,
    pub detailed_summary: String,
    pub links: Links,
    pub created_datetime: DateTime<Utc>,
}

/// 待写入的报告，id 与创建时间由存储层分配
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub query: String,
    pub title: String,
    pub detailed_summary: String,
    pub links: Links,
}

#[derive(Debug, FromRow)]
pub(crate) struct ReportRow {
    pub id: i64,
    pub query: String,
    pub title: String,
    pub detailed_summary: String,
    pub links: String,
    pub created_datetime: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = AppError;

    fn try_from(row: ReportRow) -> AppResult<Self> {
        let links: Links = if row.links.trim().is_empty() {
            Links::new()
        } else {
            serde_json::from_str(&row.links)?
        };

        let created_datetime = DateTime::parse_from_rfc3339(&row.created_datetime)
            .map_err(|e| AppError::Database(sqlx::Error::Decode(Box::new(e))))?
            .with_timezone(&Utc);

        Ok(Report {
            id: row.id,
            query: row.query,
            title: row.title,
            detailed_summary: row.detailed_summary,
            links,
            created_datetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_status_serializes_snake_case() {
        let mut links = Links::new();
        links.insert("https://a.example".into(), LinkStatus::Included);
        links.insert("https://b.example".into(), LinkStatus::ExtractionFailed);
        links.insert("https://c.example".into(), LinkStatus::Excluded);

        let json = serde_json::to_value(&links).unwrap();
        assert_eq!(json["https://a.example"], "included");
        assert_eq!(json["https://b.example"], "extraction_failed");
        assert_eq!(json["https://c.example"], "excluded");
    }

    #[test]
    fn row_with_empty_links_becomes_empty_map() {
        let row = ReportRow {
            id: 1,
            query: "q".into(),
            title: "t".into(),
            detailed_summary: "s".into(),
            links: String::new(),
            created_datetime: "2026-01-02T03:04:05.000006Z".into(),
        };
        let report = Report::try_from(row).unwrap();
        assert!(report.links.is_empty());
        assert_eq!(report.created_datetime.timestamp_subsec_micros(), 6);
    }

    #[test]
    fn row_with_bad_timestamp_is_rejected() {
        let row = ReportRow {
            id: 2,
            query: "q".into(),
            title: "t".into(),
            detailed_summary: "s".into(),
            links: "{}".into(),
            created_datetime: "yesterday".into(),
        };
        assert!(Report::try_from(row).is_err());
    }
}
