//! Problem-statement retrieval and extraction.
//!
//! Pages are fetched through CORS relays (tried in order) and parsed into a
//! document tree. Extraction degrades in a fixed order:
//!
//! 1. `#task-statement` must exist, otherwise extraction fails.
//! 2. Language: `.lang-ja`, then `.lang-en`, then the whole container.
//! 3. Limits: scanned over the whole page, `"不明"` when absent.
//! 4. Constraints: the siblings after a `制約` / `Constraints` heading up to
//!    the next heading; empty when absent.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LiveError, Result};
use crate::http::get_text;

/// Shown for a limit the page does not state.
pub const UNKNOWN_LIMIT: &str = "不明";

/// Language sub-sections, most preferred first.
const LANGUAGE_PRIORITY: [&str; 2] = [".lang-ja", ".lang-en"];

/// Constraint heading texts, most preferred first.
const CONSTRAINT_HEADINGS: [&str; 2] = ["制約", "Constraints"];

static TIME_LIMIT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)時間制限.*?(\d+(?:\.\d+)?\s*(?:秒|sec))",
        r"(?i)Time Limit.*?(\d+(?:\.\d+)?\s*sec)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static time limit pattern"))
    .collect()
});

static MEMORY_LIMIT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)メモリ制限.*?(\d+\s*(?:MiB|MB|KiB|KB))",
        r"(?i)Memory Limit.*?(\d+\s*(?:MiB|MB|KiB|KB))",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static memory limit pattern"))
    .collect()
});

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Extracted statement of one problem. HTML fragments are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemContent {
    pub statement: String,
    pub constraints: String,
    pub time_limit: String,
    pub memory_limit: String,
}

/// What the problem panel shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContentState {
    /// No problem selected.
    #[default]
    Empty,
    Loading,
    Loaded(ProblemContent),
    /// Displayable error plus the official page to open instead.
    Failed { message: String, official_url: String },
}

impl ContentState {
    pub fn from_result(result: Result<ProblemContent>, official_url: &str) -> Self {
        match result {
            Ok(content) => ContentState::Loaded(content),
            Err(e) => ContentState::Failed {
                message: e.user_message(),
                official_url: official_url.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract the statement record from a full problem page.
///
/// # Errors
/// [`LiveError::ExtractionFailed`] when the page has no `#task-statement`.
/// Missing limits or constraints never fail.
pub fn extract_content(html: &str, url: &str) -> Result<ProblemContent> {
    let document = Html::parse_document(html);
    let container = document
        .select(&selector("#task-statement"))
        .next()
        .ok_or_else(|| LiveError::ExtractionFailed {
            url: url.to_string(),
        })?;

    let (content_root, statement) = language_section(container);
    let constraints = constraints_html(content_root);

    Ok(ProblemContent {
        statement,
        constraints,
        time_limit: scan_limit(html, &TIME_LIMIT_PATTERNS),
        memory_limit: scan_limit(html, &MEMORY_LIMIT_PATTERNS),
    })
}

/// Pick the preferred language section. Returns the element it came from
/// (the container itself for the raw fallback) and its inner HTML.
fn language_section(container: ElementRef<'_>) -> (ElementRef<'_>, String) {
    for css in LANGUAGE_PRIORITY {
        if let Some(section) = container.select(&selector(css)).next() {
            return (section, section.inner_html());
        }
    }
    (container, container.inner_html())
}

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn heading_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// HTML following the first constraints heading under `root`, up to the
/// next heading among its siblings. Empty when there is no such heading.
pub fn constraints_html(root: ElementRef<'_>) -> String {
    let headings = selector("h1, h2, h3, h4, h5, h6");
    for wanted in CONSTRAINT_HEADINGS {
        let found = root
            .select(&headings)
            .find(|h| heading_text(h) == wanted);
        if let Some(heading) = found {
            return collect_until_heading(heading);
        }
    }
    String::new()
}

fn collect_until_heading(heading: ElementRef<'_>) -> String {
    let mut out = String::new();
    for sibling in heading.next_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            if is_heading(&el) {
                break;
            }
            out.push_str(&el.html());
        } else if let Node::Text(text) = sibling.value() {
            out.push_str(&escape_text(text));
        }
    }
    out.trim().to_string()
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// First capture of the first matching pattern, else [`UNKNOWN_LIMIT`].
fn scan_limit(page: &str, patterns: &[Regex]) -> String {
    patterns
        .iter()
        .find_map(|re| re.captures(page))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| UNKNOWN_LIMIT.to_string())
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Fetch `url` through the first proxy that answers with a 2xx body.
///
/// # Errors
/// [`LiveError::RetrievalFailed`] once every proxy has failed.
pub async fn fetch_page(client: &reqwest::Client, proxies: &[String], url: &str) -> Result<String> {
    for proxy in proxies {
        match get_text(client, proxy, &[("quest", url)]).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                debug!(%proxy, %url, error = %e, "proxy failed, trying next");
            }
        }
    }
    Err(LiveError::RetrievalFailed {
        url: url.to_string(),
    })
}

pub struct StatementClient {
    client: reqwest::Client,
    proxies: Vec<String>,
}

impl StatementClient {
    pub fn new(client: reqwest::Client, proxies: Vec<String>) -> Self {
        Self { client, proxies }
    }

    /// Retrieve and extract one problem. Terminal on failure: no retry.
    pub async fn fetch(&self, url: &str) -> Result<ProblemContent> {
        let html = fetch_page(&self.client, &self.proxies, url).await?;
        let content = extract_content(&html, url);
        if let Err(e) = &content {
            warn!(%url, error = %e, "statement extraction failed");
        }
        content
    }

    /// Same as [`fetch`](Self::fetch), folded into the panel state.
    pub async fn load(&self, url: &str) -> ContentState {
        ContentState::from_result(self.fetch(url).await, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(statement: &str, head: &str) -> String {
        format!(
            "<html><head><title>t</title></head><body>{head}\
             <div id=\"task-statement\">{statement}</div></body></html>"
        )
    }

    #[test]
    fn japanese_preferred_over_english() {
        let html = page(
            "<span class=\"lang\"><span class=\"lang-ja\"><p>日本語</p></span>\
             <span class=\"lang-en\"><p>English</p></span></span>",
            "",
        );
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.statement, "<p>日本語</p>");
    }

    #[test]
    fn english_used_when_japanese_missing() {
        let html = page("<span class=\"lang-en\"><p>English</p></span>", "");
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.statement, "<p>English</p>");
    }

    #[test]
    fn raw_block_used_without_language_markers() {
        let html = page("<p>Plain statement</p>", "");
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.statement, "<p>Plain statement</p>");
    }

    #[test]
    fn missing_container_is_extraction_failure() {
        let html = "<html><body><div id=\"main\">nothing</div></body></html>";
        let err = extract_content(html, "https://atcoder.jp/x").unwrap_err();
        assert!(matches!(err, LiveError::ExtractionFailed { .. }));
    }

    #[test]
    fn constraints_stop_at_next_heading() {
        let html = page(
            "<span class=\"lang-ja\"><h3>問題文</h3><p>p</p>\
             <h3>制約</h3><ul><li>1 ≤ N ≤ 100</li></ul><h3>入力</h3><pre>N</pre></span>",
            "",
        );
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.constraints, "<ul><li>1 ≤ N ≤ 100</li></ul>");
    }

    #[test]
    fn constraints_inside_sections() {
        let html = page(
            "<span class=\"lang-en\"><div class=\"part\"><section><h3>Constraints</h3>\
             <ul><li>N is even</li></ul></section></div>\
             <div class=\"part\"><section><h3>Input</h3></section></div></span>",
            "",
        );
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.constraints, "<ul><li>N is even</li></ul>");
    }

    #[test]
    fn missing_constraints_is_empty_not_error() {
        let html = page("<span class=\"lang-ja\"><p>no headings</p></span>", "");
        let content = extract_content(&html, "u").unwrap();
        assert!(content.constraints.is_empty());
    }

    #[test]
    fn limits_scanned_over_whole_page() {
        let html = page(
            "<p>x</p>",
            "<p>実行時間制限: 2 秒 / メモリ制限: 1024 MB</p>",
        );
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.time_limit, "2 秒");
        assert_eq!(content.memory_limit, "1024 MB");
    }

    #[test]
    fn english_limits_recognised() {
        let html = page("<p>x</p>", "<p>Time Limit: 2 sec / Memory Limit: 1024 MiB</p>");
        let content = extract_content(&html, "u").unwrap();
        assert_eq!(content.time_limit, "2 sec");
        assert_eq!(content.memory_limit, "1024 MiB");
    }

    #[test]
    fn absent_limits_are_unknown() {
        let content = extract_content(&page("<p>x</p>", ""), "u").unwrap();
        assert_eq!(content.time_limit, UNKNOWN_LIMIT);
        assert_eq!(content.memory_limit, UNKNOWN_LIMIT);
    }

    #[test]
    fn failed_state_keeps_official_url() {
        let state = ContentState::from_result(
            Err(LiveError::RetrievalFailed { url: "u".into() }),
            "https://atcoder.jp/contests/abc300/tasks/abc300_a",
        );
        match state {
            ContentState::Failed { message, official_url } => {
                assert_eq!(message, "問題ページの取得に失敗しました");
                assert!(official_url.ends_with("abc300_a"));
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_reachable_proxy_is_retrieval_failure() {
        let client = reqwest::Client::new();
        let proxies = vec![
            "http://127.0.0.1:1/proxy".to_string(),
            "http://127.0.0.1:2/proxy".to_string(),
        ];
        let err = fetch_page(&client, &proxies, "https://atcoder.jp/x")
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::RetrievalFailed { .. }));
    }

    #[tokio::test]
    async fn empty_proxy_list_is_retrieval_failure() {
        let client = reqwest::Client::new();
        let err = fetch_page(&client, &[], "https://atcoder.jp/x").await.unwrap_err();
        assert!(matches!(err, LiveError::RetrievalFailed { .. }));
    }
}
