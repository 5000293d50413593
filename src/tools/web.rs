//! Network-bound tools: web search and page fetch
//!
//! Both own a bounded retry policy for transient failures (transport
//! errors, 5xx, 429) and report it through `attempt_count` and
//! `retries_exhausted` on the result. Retry lives here, not in the
//! dispatcher.

use super::{Tool, ToolCategory, ToolResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use url::form_urlencoded;

const USER_AGENT: &str = concat!("baton/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_PAGE_CHARS: usize = 20_000;

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// GET with bounded retry. Returns the response and the attempt that
/// succeeded, or the last error text and the attempts spent.
async fn get_with_retry(
    client: &reqwest::Client,
    url: &str,
    max_attempts: u32,
) -> std::result::Result<(reqwest::Response, u32), (String, u32)> {
    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tokio::time::sleep(RETRY_DELAY * (attempt - 1)).await;
        }
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok((response, attempt));
                }
                let retryable = status.is_server_error() || status.as_u16() == 429;
                if !retryable {
                    return Err((format!("HTTP error: {}", status), attempt));
                }
                last_error = format!("HTTP error: {}", status);
                tracing::debug!(url, attempt, %status, "retrying after server error");
            }
            Err(e) => {
                last_error = e.to_string();
                tracing::debug!(url, attempt, error = %e, "retrying after transport error");
            }
        }
    }
    Err((last_error, max_attempts))
}

/// Search the web via the DuckDuckGo HTML endpoint (no API key).
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns result titles, snippets, and URLs. \
         Use for current events or facts outside the conversation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("missing required parameter: query"))?;
        let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("https://html.duckduckgo.com/html/?q={}", encoded);

        match get_with_retry(&self.client, &url, MAX_ATTEMPTS).await {
            Ok((response, attempts)) => {
                let html = match response.text().await {
                    Ok(html) => html,
                    Err(e) => {
                        return Ok(ToolResult::error(format!("Search failed: {}", e))
                            .with_attempts(attempts, false))
                    }
                };
                let results = extract_search_results(&html, limit);
                let output = if results.is_empty() {
                    format!("No results found for: {}", query)
                } else {
                    results.join("\n\n")
                };
                Ok(ToolResult::success(output).with_attempts(attempts, false))
            }
            Err((message, attempts)) => Ok(ToolResult::error(format!(
                "Search failed: {}",
                message
            ))
            .with_attempts(attempts, attempts >= MAX_ATTEMPTS)),
        }
    }
}

/// Fetch a page and reduce it to readable text.
pub struct FetchPageTool {
    client: reqwest::Client,
}

impl FetchPageTool {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for FetchPageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch the content of a URL and return its text. Useful for reading \
         documentation or articles found via web_search."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Network
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let raw_url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("missing required parameter: url"))?;

        let parsed = url::Url::parse(raw_url).map_err(|e| anyhow!("invalid url: {}", e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Ok(ToolResult::error(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        match get_with_retry(&self.client, parsed.as_str(), MAX_ATTEMPTS).await {
            Ok((response, attempts)) => {
                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        return Ok(ToolResult::error(format!("Fetch failed: {}", e))
                            .with_attempts(attempts, false))
                    }
                };

                let text = if content_type.contains("text/html") {
                    extract_text(&body)
                } else {
                    body
                };

                let output = if text.len() > MAX_PAGE_CHARS {
                    format!(
                        "{}... [truncated, first {} characters shown]",
                        truncate_at_boundary(&text, MAX_PAGE_CHARS),
                        MAX_PAGE_CHARS
                    )
                } else {
                    text
                };
                Ok(ToolResult::success(output).with_attempts(attempts, false))
            }
            Err((message, attempts)) => Ok(ToolResult::error(format!(
                "Fetch failed: {}",
                message
            ))
            .with_attempts(attempts, attempts >= MAX_ATTEMPTS)),
        }
    }
}

/// Pull title/snippet/url triples out of DuckDuckGo's HTML results page.
fn extract_search_results(html: &str, limit: usize) -> Vec<String> {
    let mut results = Vec::new();

    for chunk in html.split("class=\"result__body\"").skip(1) {
        if results.len() >= limit {
            break;
        }

        let title = chunk
            .split("class=\"result__a\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .unwrap_or("");

        let snippet = chunk
            .split("class=\"result__snippet\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .unwrap_or("");

        let url = chunk
            .split("class=\"result__url\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .map(str::trim)
            .unwrap_or("");

        if !title.is_empty() {
            results.push(format!(
                "{}\n{}\nURL: {}",
                html_decode(title),
                html_decode(snippet),
                url
            ));
        }
    }

    results
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Strip scripts, styles, and tags; collapse whitespace.
fn extract_text(html: &str) -> String {
    let mut text = html.to_string();

    for (open, close) in [("<script", "</script>"), ("<style", "</style>")] {
        while let Some(start) = text.find(open) {
            match text[start..].find(close) {
                Some(end) => {
                    text = format!("{}{}", &text[..start], &text[start + end + close.len()..])
                }
                None => break,
            }
        }
    }

    let mut stripped = String::new();
    let mut in_tag = false;
    for c in text.chars() {
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
            stripped.push(' ');
        } else if !in_tag {
            stripped.push(c);
        }
    }

    let collapsed: String = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    html_decode(&collapsed)
}

/// Largest prefix of at most `max_bytes` that ends on a char boundary.
fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESULTS: &str = r##"
        <div class="result__body">
            <a class="result__a" href="#">Rust Programming Language</a>
            <a class="result__snippet" href="#">A language empowering everyone &amp; anyone.</a>
            <a class="result__url" href="#"> rust-lang.org </a>
        </div>
        <div class="result__body">
            <a class="result__a" href="#">The Book</a>
            <a class="result__snippet" href="#">Learn Rust here.</a>
            <a class="result__url" href="#"> doc.rust-lang.org/book </a>
        </div>
    "##;

    #[test]
    fn test_extract_search_results_parses_fields() {
        let results = extract_search_results(SAMPLE_RESULTS, 5);
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("Rust Programming Language"));
        assert!(results[0].contains("everyone & anyone"));
        assert!(results[0].contains("URL: rust-lang.org"));
    }

    #[test]
    fn test_extract_search_results_honors_limit() {
        let results = extract_search_results(SAMPLE_RESULTS, 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_extract_search_results_empty_page() {
        assert!(extract_search_results("<html><body>nothing</body></html>", 5).is_empty());
    }

    #[test]
    fn test_html_decode_entities() {
        assert_eq!(html_decode("a &amp; b &lt;c&gt;"), "a & b <c>");
    }

    #[test]
    fn test_extract_text_strips_scripts_and_tags() {
        let html = "<html><script>var x = 1;</script><style>p{}</style>\
                    <body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(extract_text(html), "Hello world");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // Multibyte char straddling the cut point must not split.
        let s = "ab\u{00e9}cd";
        let cut = truncate_at_boundary(s, 3);
        assert_eq!(cut, "ab");
        assert_eq!(truncate_at_boundary("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_search_missing_query_is_argument_error() {
        let tool = WebSearchTool::new();
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_scheme() {
        let tool = FetchPageTool::new();
        let result = tool
            .execute(json!({"url": "ftp://example.com/file"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Unsupported URL scheme"));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_is_argument_error() {
        let tool = FetchPageTool::new();
        let err = tool.execute(json!({"url": "not a url"})).await.unwrap_err();
        assert!(err.to_string().contains("invalid url"));
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        assert_eq!(WebSearchTool::new().parameters()["required"][0], "query");
        assert_eq!(FetchPageTool::new().parameters()["required"][0], "url");
    }
}
