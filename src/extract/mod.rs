//! Content extraction
//!
//! Turns one fetched page into a normalized `ParsedContent`. Everything here is
//! a pure function of the page markup: no network, no shared state.

mod sanitize;

pub use sanitize::{collapse_whitespace, sanitize_fragment, SanitizedFragment};

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Meta tag holding comma-separated product feature tags
const FEATURE_TAGS_META: &str = "ProductFeatureTags";

/// Errors raised while extracting a page
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Normalized content of one documentation page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedContent {
    pub title: String,
    /// Sanitized inner HTML of the page's article (or body)
    pub body: String,
    /// Lower-cased keywords followed by feature tags; may contain duplicates
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub category_hint: Option<String>,
    /// Whether the sanitized body carries any visible text
    pub body_has_text: bool,
}

impl ParsedContent {
    /// True when the page has both a title and a usable body
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && self.body_has_text
    }
}

/// Extracts the normalized content of a raw page
///
/// # Arguments
///
/// * `raw` - The page body exactly as fetched
///
/// # Returns
///
/// The page's content, or `ExtractError::Encoding` if the bytes are not UTF-8
pub fn extract(raw: &[u8]) -> Result<ParsedContent, ExtractError> {
    let document = parse_page(raw)?;
    Ok(extract_document(&document))
}

/// Decodes and parses a raw page
///
/// Markup is never rejected; html5ever recovers from any malformed input, so
/// undecodable bytes are the only failure.
pub fn parse_page(raw: &[u8]) -> Result<Html, ExtractError> {
    let markup = std::str::from_utf8(raw)?;
    Ok(Html::parse_document(markup))
}

/// Extracts the normalized content of an already parsed page
pub fn extract_document(document: &Html) -> ParsedContent {
    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|text| !text.is_empty())
        })
        .unwrap_or_default();

    let mut tags = meta_list(document, "keywords");
    tags.extend(meta_list(document, FEATURE_TAGS_META));

    let fragment = first_element(document, "article")
        .or_else(|| first_element(document, "body"))
        .map(sanitize_fragment)
        .unwrap_or_default();

    ParsedContent {
        title,
        body: fragment.html,
        tags,
        author: meta_value(document, "author"),
        category_hint: meta_value(document, "category-id"),
        body_has_text: fragment.has_text,
    }
}

fn first_element<'a>(document: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(tag).ok()?;
    let element = document.select(&selector).next();
    element
}

fn meta_contents<'a>(document: &'a Html, name: &str) -> Vec<&'a str> {
    match Selector::parse(&format!(r#"meta[name="{}"]"#, name)) {
        Ok(selector) => document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn meta_value(document: &Html, name: &str) -> Option<String> {
    meta_contents(document, name)
        .into_iter()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn meta_list(document: &Html, name: &str) -> Vec<String> {
    meta_contents(document, name)
        .into_iter()
        .flat_map(|content| content.split(','))
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}
