use crate::error::ExtractionError;
use async_trait::async_trait;
use lopdf::Document;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    type Source: ?Sized + Sync;

    async fn extract(&self, source: &Self::Source) -> Result<String, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    /// Pages whose text cannot be decoded come back empty instead of failing the document.
    pub fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|page_no| {
                let text = document.extract_text(&[page_no]).unwrap_or_else(|error| {
                    debug!(page = page_no, %error, "page has no extractable text");
                    String::new()
                });
                PageText {
                    number: page_no,
                    text,
                }
            })
            .collect();

        Ok(pages)
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    type Source = [u8];

    async fn extract(&self, source: &[u8]) -> Result<String, ExtractionError> {
        let bytes = source.to_vec();
        let extractor = *self;
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
            .await
            .map_err(|error| ExtractionError::Task(error.to_string()))??;

        Ok(pages
            .into_iter()
            .map(|page| page.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[derive(Debug, Clone)]
pub struct WebExtractor {
    client: Client,
    stripper: HtmlStripper,
}

impl WebExtractor {
    pub fn new(timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docchat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Result<Self, ExtractionError> {
        Ok(Self {
            client,
            stripper: HtmlStripper::new()?,
        })
    }
}

#[async_trait]
impl TextExtractor for WebExtractor {
    type Source = str;

    async fn extract(&self, source: &str) -> Result<String, ExtractionError> {
        let url = parse_http_url(source)?;

        let response = self.client.get(url.clone()).send().await.map_err(|error| {
            warn!(url = %url, %error, "url fetch failed");
            ExtractionError::Http(error)
        })?;

        if !response.status().is_success() {
            return Err(ExtractionError::FetchStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(self.stripper.to_text(&body))
    }
}

pub fn parse_http_url(raw: &str) -> Result<Url, ExtractionError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ExtractionError::UnsupportedUrl(format!(
            "scheme {other} is not fetchable: {raw}"
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct HtmlStripper {
    hidden: Regex,
    comment: Regex,
    block: Regex,
    tag: Regex,
}

impl HtmlStripper {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hidden: Regex::new(
                r"(?is)<(script|style|noscript|template)\b.*?</(script|style|noscript|template)\s*>",
            )?,
            comment: Regex::new(r"(?s)<!--.*?-->")?,
            block: Regex::new(
                r"(?i)</?(p|div|br|h[1-6]|li|ul|ol|tr|table|section|article|header|footer|blockquote|pre|title)\b[^>]*>",
            )?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    /// Reduces an HTML page to its visible text, one segment per block
    /// element, segments separated by a blank line.
    pub fn to_text(&self, html: &str) -> String {
        let text = self.hidden.replace_all(html, " ");
        let text = self.comment.replace_all(&text, " ");
        let text = self.block.replace_all(&text, "\n");
        let text = self.tag.replace_all(&text, " ");
        let text = decode_entities(&text);

        text.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 8] = [
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&mdash;", "\u{2014}"),
        ("&amp;", "&"),
    ];
    ENTITIES
        .iter()
        .fold(text.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}
