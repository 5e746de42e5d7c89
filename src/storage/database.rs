use chrono::{SecondsFormat, SubsecRound, Utc};
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqlitePoolOptions}};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::storage::models::{NewReport, Report, ReportRow};
use crate::utils::{AppError, AppResult};

pub struct Database {
    pool: SqlitePool,
    // 串行化写操作
    write_lock: Mutex<()>,
}

impl Database {
    pub async fn new(database_url: &str) -> AppResult<Self> {
        // 确保使用create_if_missing选项
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url
                    .parse::<SqliteConnectOptions>()?
                    .create_if_missing(true),
            )
            .await?;

        info!("数据库连接成功: {}", database_url);
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// 按配置打开数据库：创建所在目录并初始化表结构
    pub async fn open(config: &StorageConfig) -> AppResult<Self> {
        if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let db = Self::new(&config.database_url()).await?;
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                title TEXT NOT NULL,
                detailed_summary TEXT NOT NULL,
                links TEXT NOT NULL DEFAULT '{}',
                created_datetime TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reports_created ON reports (created_datetime DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 写入新报告，分配 id 与创建时间
    pub async fn create(&self, report: &NewReport) -> AppResult<Report> {
        let links = serde_json::to_string(&report.links)?;
        // 定长微秒格式，保证按字符串排序即按时间排序
        let created_datetime = Utc::now().trunc_subsecs(6);
        let created_text = created_datetime.to_rfc3339_opts(SecondsFormat::Micros, true);

        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO reports (query, title, detailed_summary, links, created_datetime)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.query)
        .bind(&report.title)
        .bind(&report.detailed_summary)
        .bind(&links)
        .bind(&created_text)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("报告已写入，ID: {}", id);

        Ok(Report {
            id,
            query: report.query.clone(),
            title: report.title.clone(),
            detailed_summary: report.detailed_summary.clone(),
            links: report.links.clone(),
            created_datetime,
        })
    }

    /// 全部报告，最新的在前
    pub async fn list_all(&self) -> AppResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT id, query, title, detailed_summary, links, created_datetime
            FROM reports
            ORDER BY created_datetime DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Report::try_from).collect()
    }

    pub async fn get(&self, id: i64) -> AppResult<Report> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT id, query, title, detailed_summary, links, created_datetime
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Report::try_from(row),
            None => Err(AppError::NotFound(id)),
        }
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(id));
        }

        info!("报告已删除，ID: {}", id);
        Ok(())
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 健康检查用
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
