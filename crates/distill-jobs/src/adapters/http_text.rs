//! Web page extractor: fetches a page and reduces its HTML to text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use distill_core::{defaults, Error, Extractor, Result, SourceKind};

/// Elements whose content never reaches the reader.
const SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Elements that start a new paragraph.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "nav", "aside",
    "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "table", "tr", "blockquote",
    "pre", "figure", "figcaption", "hr",
];

/// Reduce an HTML document to readable text.
///
/// Paragraph-level elements are separated by a blank line, `<br>` by a
/// newline, and runs of whitespace collapse to one space.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);
    tidy(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED.contains(&name) {
                continue;
            }
            if name == "br" {
                out.push('\n');
                continue;
            }
            let block = BLOCKS.contains(&name);
            if block {
                out.push_str("\n\n");
            }
            collect_text(child_element, out);
            if block {
                out.push_str("\n\n");
            }
        } else if let Node::Text(text) = child.value() {
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
}

/// Trim lines and keep at most one blank line between paragraphs.
fn tidy(raw: &str) -> String {
    let mut out = String::new();
    let mut blank = false;
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank = false;
    }
    out
}

/// Fetches `url` sources over HTTP.
pub struct HttpTextExtractor {
    client: Client,
}

impl HttpTextExtractor {
    /// Create an extractor with the default fetch timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(defaults::HTTP_FETCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("distill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for HttpTextExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Url
    }

    async fn extract(&self, source_ref: &str) -> Result<String> {
        let response = self
            .client
            .get(source_ref)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to fetch {}: {}", source_ref, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Extraction(format!(
                "{} returned {}",
                source_ref, status
            )));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);

        let body = response
            .text()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to read {}: {}", source_ref, e)))?;

        let text = if is_html { html_to_text(&body) } else { body };
        debug!(url = source_ref, char_count = text.chars().count(), html = is_html, "Fetched page");
        Ok(text)
    }

    fn name(&self) -> &str {
        "http_text"
    }
}
