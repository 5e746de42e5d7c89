use scraper::{Html, Selector};
use tracing::debug;

/// 网页正文抽取结果
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlText {
    pub title: String,
    pub text: String,
}

pub struct HtmlParser {
    boilerplate: Selector,
    title: Selector,
    // 按优先级排列的正文容器
    content_areas: Vec<Selector>,
}

impl HtmlParser {
    pub fn new() -> Self {
        let boilerplate = Selector::parse(
            "script, style, nav, footer, header, aside, noscript, svg, iframe, form, template",
        )
        .unwrap();
        let title = Selector::parse("title").unwrap();
        let content_areas = ["article", "main", "[role=\"main\"]", "body"]
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect();

        Self {
            boilerplate,
            title,
            content_areas,
        }
    }

    /// 去除导航、脚本等非正文元素后提取可读文本，未做空白规整
    pub fn extract(&self, html: &str) -> HtmlText {
        let mut document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();

        let noise: Vec<_> = document.select(&self.boilerplate).map(|el| el.id()).collect();
        debug!("移除 {} 个非正文元素", noise.len());
        for id in noise {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        let mut text = String::new();
        for selector in &self.content_areas {
            if let Some(element) = document.select(selector).next() {
                let candidate = element.text().collect::<Vec<_>>().join(" ");
                if !candidate.trim().is_empty() {
                    text = candidate;
                    break;
                }
            }
        }

        HtmlText { title, text }
    }
}
