mod api;
mod config;
mod parser;
mod pipeline;
mod search;
mod storage;
mod summarizer;
mod utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use parser::WebExtractor;
use pipeline::Pipeline;
use search::SerpApiSearch;
use storage::{Database, Report};
use summarizer::LlmSummarizer;
use utils::logger;

#[derive(Parser)]
#[command(name = "searchbot")]
#[command(about = "网页检索与报告生成服务", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化配置和数据库
    Init,
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址
        #[arg(long)]
        host: Option<String>,
        /// 监听端口
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// 检索并生成一份报告
    Search {
        /// 查询内容
        query: String,
    },
    /// 列出历史报告
    History,
    /// 查看指定报告
    Show {
        /// 报告ID
        id: i64,
    },
    /// 删除指定报告
    Delete {
        /// 报告ID
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init_logger();
    info!("searchbot 启动");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Serve { host, port } => {
            serve_command(host, port).await?;
        }
        Commands::Search { query } => {
            search_command(&query).await?;
        }
        Commands::History => {
            history_command().await?;
        }
        Commands::Show { id } => {
            show_command(id).await?;
        }
        Commands::Delete { id } => {
            delete_command(id).await?;
        }
    }

    Ok(())
}

async fn open_database(app_config: &AppConfig) -> Result<Arc<Database>> {
    let db = Database::open(&app_config.storage).await?;
    Ok(Arc::new(db))
}

fn build_pipeline(app_config: &AppConfig, db: Arc<Database>) -> Result<Pipeline> {
    if !app_config.search.is_configured() {
        info!("⚠️ SerpAPI 密钥未配置，检索请求将会失败。请设置 SERPAPI_API_KEY");
    }
    if !app_config.llm.is_configured() {
        info!("⚠️ 语言模型密钥未配置，报告生成将会失败。请设置 GROQ_API_KEY");
    }

    let searcher = SerpApiSearch::new(app_config.search.clone())?;
    let extractor = WebExtractor::new(app_config.extractor.clone())?;
    let summarizer = LlmSummarizer::new(app_config.llm.clone())?;

    Ok(Pipeline::new(
        Arc::new(searcher),
        Arc::new(extractor),
        Arc::new(summarizer),
        db,
        app_config.search.max_results,
    ))
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    tokio::fs::create_dir_all("config").await?;

    // 生成默认配置文件，已存在时保留
    if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() {
        info!("配置文件已存在，跳过: {}", DEFAULT_CONFIG_PATH);
    } else {
        AppConfig::default().save(DEFAULT_CONFIG_PATH)?;
        info!("已生成配置文件: {}", DEFAULT_CONFIG_PATH);
    }

    let app_config = AppConfig::load()?;
    info!("正在初始化数据库: {}", app_config.storage.database_path);
    open_database(&app_config).await?;
    info!("数据库初始化完成");

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 在 .env 或环境变量中设置 SERPAPI_API_KEY 与 GROQ_API_KEY");
    info!("  2. 运行 'searchbot serve' 启动服务");

    Ok(())
}

async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;
    let pipeline = build_pipeline(&app_config, db.clone())?;

    let state = api::AppState {
        pipeline: Arc::new(pipeline),
        db,
    };

    let host = host.unwrap_or_else(|| app_config.server.host.clone());
    let port = port.unwrap_or(app_config.server.port);
    api::serve(state, &host, port).await
}

async fn search_command(query: &str) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;
    let pipeline = build_pipeline(&app_config, db)?;

    let report = pipeline.run_search(query).await?;
    println!("{}", render_report(&report));
    Ok(())
}

async fn history_command() -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;

    let reports = db.list_all().await?;
    if reports.is_empty() {
        info!("暂无历史报告");
        return Ok(());
    }

    info!("共 {} 份历史报告", db.count().await?);
    for report in &reports {
        println!(
            "[{}] {}  {}  (查询: {})",
            report.id,
            report.created_datetime.format("%Y-%m-%d %H:%M:%S"),
            report.title,
            report.query
        );
    }
    Ok(())
}

async fn show_command(id: i64) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;

    let report = db.get(id).await?;
    println!("{}", render_report(&report));
    Ok(())
}

async fn delete_command(id: i64) -> Result<()> {
    let app_config = AppConfig::load()?;
    let db = open_database(&app_config).await?;

    db.delete(id).await?;
    info!("✅ 报告 {} 已删除", id);
    Ok(())
}

fn render_report(report: &Report) -> String {
    let mut out = format!(
        "# {title}\n\n报告ID: {id}\n查询: {query}\n时间: {time}\n\n{summary}\n\n来源:\n",
        title = report.title,
        id = report.id,
        query = report.query,
        time = report.created_datetime.format("%Y-%m-%d %H:%M:%S UTC"),
        summary = report.detailed_summary,
    );
    for (link, status) in &report.links {
        let label = match status {
            storage::LinkStatus::Included => "已采用",
            storage::LinkStatus::ExtractionFailed => "抽取失败",
            storage::LinkStatus::Excluded => "未采用",
        };
        out.push_str(&format!("  - [{}] {}\n", label, link));
    }
    out
}
