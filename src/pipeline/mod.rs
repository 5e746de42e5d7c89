use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::parser::{ContentExtract, ExtractStatus, ExtractedContent};
use crate::search::{SearchResult, WebSearch};
use crate::storage::{Database, LinkStatus, NewReport, Report};
use crate::summarizer::Summarize;
use crate::utils::{AppError, AppResult};

/// 检索 → 抽取 → 摘要 → 入库
pub struct Pipeline {
    searcher: Arc<dyn WebSearch>,
    extractor: Arc<dyn ContentExtract>,
    summarizer: Arc<dyn Summarize>,
    db: Arc<Database>,
    max_sources: usize,
}

impl Pipeline {
    pub fn new(
        searcher: Arc<dyn WebSearch>,
        extractor: Arc<dyn ContentExtract>,
        summarizer: Arc<dyn Summarize>,
        db: Arc<Database>,
        max_sources: usize,
    ) -> Self {
        Self {
            searcher,
            extractor,
            summarizer,
            db,
            max_sources,
        }
    }

    /// 执行一次完整的检索与报告生成，只有最后一步写库
    pub async fn run_search(&self, query: &str) -> AppResult<Report> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("query 不能为空".to_string()));
        }

        info!("开始处理查询: {}", query);

        // 1. 检索
        let results = self.searcher.search(query).await?;
        if results.is_empty() {
            return Err(AppError::Upstream(format!("未找到与「{}」相关的检索结果", query)));
        }

        // 2. 去重后并发抽取，全部完成后再进入摘要
        let mut seen = HashSet::new();
        let sources: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| seen.insert(r.link.clone()))
            .take(self.max_sources.max(1))
            .collect();
        for source in &sources {
            debug!("来源 #{} [{}] {}", source.position, source.source, source.link);
        }
        info!("共 {} 个来源待抽取", sources.len());

        let extracted = join_all(sources.iter().map(|s| self.extractor.extract(&s.link))).await;
        let contents: Vec<ExtractedContent> = extracted
            .into_iter()
            .zip(&sources)
            .map(|(content, source)| content.with_search_result(source))
            .collect();
        let links: Vec<&str> = sources.iter().map(|s| s.link.as_str()).collect();

        let succeeded = contents.iter().filter(|c| c.is_success()).count();
        info!("抽取完成: {} 成功, {} 失败或为空", succeeded, contents.len() - succeeded);
        if succeeded == 0 {
            warn!("所有来源均抽取失败，仍继续生成报告");
        }

        // 3. 摘要
        let draft = self.summarizer.summarize(query, &contents).await?;

        // 4. 组装：每个尝试过的链接都要出现在 links 中，且不引入额外链接
        let mut report_links = draft.links;
        report_links.retain(|link, _| links.contains(&link.as_str()));
        for content in &contents {
            report_links.entry(content.link.clone()).or_insert(match content.status {
                ExtractStatus::Success => LinkStatus::Included,
                ExtractStatus::Failure => LinkStatus::ExtractionFailed,
                ExtractStatus::Empty => LinkStatus::Excluded,
            });
        }

        let new_report = NewReport {
            query: query.to_string(),
            title: draft.title,
            detailed_summary: draft.detailed_summary,
            links: report_links,
        };

        // 5. 入库
        let report = self.db.create(&new_report).await?;
        info!("报告已生成，ID: {}，标题: {}", report.id, report.title);
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::database::tests::temp_database;
    use crate::summarizer::{build_prompt, ReportDraft};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct FakeSearch {
        pub links: Vec<String>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeSearch {
        pub(crate) fn with_links(links: &[&str]) -> Self {
            Self {
                links: links.iter().map(|l| l.to_string()).collect(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                links: vec![],
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, _query: &str) -> AppResult<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Upstream("search provider unreachable".to_string()));
            }
            Ok(self
                .links
                .iter()
                .enumerate()
                .map(|(position, link)| SearchResult {
                    position,
                    title: format!("Result {}", position),
                    link: link.clone(),
                    snippet: format!("Snippet for {}", link),
                    source: "google".to_string(),
                })
                .collect())
        }
    }

    /// 链接中含 "broken" 的视为抽取失败
    pub(crate) struct FakeExtractor {
        pub calls: AtomicUsize,
    }

    impl FakeExtractor {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentExtract for FakeExtractor {
        async fn extract(&self, url: &str) -> ExtractedContent {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                ExtractedContent::failure(url, "连接错误")
            } else if url.contains("blank") {
                ExtractedContent::empty(url, String::new(), "no text")
            } else {
                let title = if url.ends_with(".pdf") { String::new() } else { "Page".to_string() };
                ExtractedContent::success(url, title, format!("Text from {}", url))
            }
        }
    }

    /// 记录收到的提示词，用真实的 build_prompt 计算 links
    pub(crate) struct FakeSummarizer {
        pub prompts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl FakeSummarizer {
        pub(crate) fn new() -> Self {
            Self {
                prompts: Mutex::new(vec![]),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Summarize for FakeSummarizer {
        async fn summarize(&self, query: &str, contents: &[ExtractedContent]) -> AppResult<ReportDraft> {
            if self.fail {
                return Err(AppError::Upstream("model unavailable".to_string()));
            }
            let plan = build_prompt(query, contents, 10_000);
            self.prompts.lock().unwrap().push(plan.user_prompt.clone());
            let summary = if plan.included == 0 {
                "No sources were available.".to_string()
            } else {
                format!("Summary built from {} sources.", plan.included)
            };
            Ok(ReportDraft {
                title: format!("Report on {}", query),
                detailed_summary: summary,
                links: plan.links,
            })
        }
    }

    struct Harness {
        pipeline: Pipeline,
        search: Arc<FakeSearch>,
        extractor: Arc<FakeExtractor>,
        summarizer: Arc<FakeSummarizer>,
        db: Arc<Database>,
        _dir: tempfile::TempDir,
    }

    async fn harness(search: FakeSearch, summarizer: FakeSummarizer) -> Harness {
        let (db, dir) = temp_database().await;
        let db = Arc::new(db);
        let search = Arc::new(search);
        let extractor = Arc::new(FakeExtractor::new());
        let summarizer = Arc::new(summarizer);
        let pipeline = Pipeline::new(
            search.clone(),
            extractor.clone(),
            summarizer.clone(),
            db.clone(),
            5,
        );
        Harness {
            pipeline,
            search,
            extractor,
            summarizer,
            db,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn capital_of_france_with_one_failed_source() {
        let h = harness(
            FakeSearch::with_links(&[
                "https://en.wikipedia.org/wiki/Paris",
                "https://broken.example.com/paris",
                "https://www.britannica.com/place/Paris",
            ]),
            FakeSummarizer::new(),
        )
        .await;

        let report = h.pipeline.run_search("capital of France").await.unwrap();

        assert_eq!(report.links.len(), 3);
        let included = report.links.values().filter(|s| **s == LinkStatus::Included).count();
        assert_eq!(included, 2);
        assert_eq!(
            report.links["https://broken.example.com/paris"],
            LinkStatus::ExtractionFailed
        );
        assert!(!report.detailed_summary.is_empty());

        let prompts = h.summarizer.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Text from https://en.wikipedia.org/wiki/Paris"));
        assert!(prompts[0].contains("Text from https://www.britannica.com/place/Paris"));
        assert!(!prompts[0].contains("broken.example.com"));

        assert_eq!(h.db.get(report.id).await.unwrap(), report);
    }

    #[tokio::test]
    async fn search_result_title_and_snippet_reach_prompt() {
        let h = harness(
            FakeSearch::with_links(&["https://example.org/paris.pdf"]),
            FakeSummarizer::new(),
        )
        .await;

        h.pipeline.run_search("capital of France").await.unwrap();

        let prompts = h.summarizer.prompts.lock().unwrap();
        assert!(prompts[0].contains("标题: Result 0"));
        assert!(prompts[0].contains("检索摘要: Snippet for https://example.org/paris.pdf"));
    }

    #[tokio::test]
    async fn empty_query_makes_no_calls() {
        let h = harness(FakeSearch::with_links(&["https://a.example"]), FakeSummarizer::new()).await;

        let err = h.pipeline.run_search("   ").await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.search.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
        assert!(h.summarizer.prompts.lock().unwrap().is_empty());
        assert_eq!(h.db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_failure_persists_nothing() {
        let h = harness(FakeSearch::failing(), FakeSummarizer::new()).await;

        let err = h.pipeline.run_search("rust").await.unwrap_err();

        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn summarizer_failure_persists_nothing() {
        let summarizer = FakeSummarizer {
            prompts: Mutex::new(vec![]),
            fail: true,
        };
        let h = harness(FakeSearch::with_links(&["https://a.example"]), summarizer).await;

        let err = h.pipeline.run_search("rust").await.unwrap_err();

        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(h.db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn no_search_results_is_upstream_error() {
        let h = harness(FakeSearch::with_links(&[]), FakeSummarizer::new()).await;

        let err = h.pipeline.run_search("zxqv").await.unwrap_err();

        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(h.db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn all_failed_extractions_still_produce_report() {
        let h = harness(
            FakeSearch::with_links(&["https://broken.example/1", "https://blank.example/2"]),
            FakeSummarizer::new(),
        )
        .await;

        let report = h.pipeline.run_search("rust").await.unwrap();

        assert_eq!(report.detailed_summary, "No sources were available.");
        assert_eq!(report.links["https://broken.example/1"], LinkStatus::ExtractionFailed);
        assert_eq!(report.links["https://blank.example/2"], LinkStatus::Excluded);
        assert_eq!(h.db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_links_are_extracted_once_and_capped() {
        let links: Vec<String> = (0..8).map(|i| format!("https://example.com/{}", i)).collect();
        let mut with_dupes: Vec<&str> = vec!["https://example.com/0"];
        with_dupes.extend(links.iter().map(String::as_str));
        let h = harness(FakeSearch::with_links(&with_dupes), FakeSummarizer::new()).await;

        let report = h.pipeline.run_search("rust").await.unwrap();

        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.links.len(), 5);
        assert!(report.links.contains_key("https://example.com/0"));
        assert!(!report.links.contains_key("https://example.com/5"));
    }

    #[tokio::test]
    async fn query_is_stored_trimmed() {
        let h = harness(FakeSearch::with_links(&["https://a.example"]), FakeSummarizer::new()).await;

        let report = h.pipeline.run_search("  capital of France  ").await.unwrap();
        assert_eq!(report.query, "capital of France");
        assert_eq!(report.title, "Report on capital of France");
    }
}
