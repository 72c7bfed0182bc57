//! Text extraction for Project Euler problem pages.
//!
//! The statement lives in the `problem_content` element; data files are
//! linked from anchors inside it.

use euler_ledger_core::EulerError;
use scraper::{ElementRef, Html, Selector};

const CONTENT_SELECTOR: &str = ".problem_content";
const LINK_SELECTOR: &str = "a[href]";

/// Statement text and linked files of one problem page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemPage {
    pub description: String,
    pub links: Vec<String>,
}

/// Parses a problem page into its plain-text statement and the `href` of
/// every link in the statement, in document order.
///
/// # Errors
/// Returns [`EulerError::Scrape`] when the page has no `problem_content`
/// element.
pub fn parse_problem_page(html: &str) -> Result<ProblemPage, EulerError> {
    let document = Html::parse_document(html);
    let content_selector = selector(CONTENT_SELECTOR)?;
    let content = document
        .select(&content_selector)
        .next()
        .ok_or_else(|| EulerError::Scrape("no problem_content element found".to_string()))?;

    let link_selector = selector(LINK_SELECTOR)?;
    let links = content
        .select(&link_selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ProblemPage {
        description: describe(content),
        links,
    })
}

fn selector(css: &str) -> Result<Selector, EulerError> {
    Selector::parse(css).map_err(|err| EulerError::Scrape(format!("invalid selector {css}: {err}")))
}

/// Text nodes joined in document order. Block elements start a new line and
/// table cells are separated by a space; lines are trimmed and blank lines
/// dropped.
fn describe(content: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in content.descendants() {
        let value = node.value();
        if let Some(fragment) = value.as_text() {
            text.push_str(fragment);
        } else if let Some(element) = value.as_element() {
            match element.name() {
                "td" | "th" => text.push(' '),
                "p" | "div" | "br" | "tr" | "li" => text.push('\n'),
                _ => {}
            }
        }
    }

    text.replace('\u{a0}', " ")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Absolute URL for a link found on a problem page.
#[must_use]
pub fn resolve_link(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}

/// Local file name for a linked data file: the last path segment without
/// query or fragment.
#[must_use]
pub fn data_file_name(link: &str) -> Option<String> {
    let segment = link.rsplit('/').next().unwrap_or(link);
    let name = segment
        .split('#')
        .next()
        .unwrap_or(segment)
        .split('?')
        .next()
        .unwrap_or(segment);
    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name.to_string())
}

/// Whether a downloaded body is a whole HTML document rather than data.
///
/// Checked on the raw bytes: a parsed document always has `html`, `head`
/// and `body` elements, even for plain text.
#[must_use]
pub fn looks_like_html_page(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_ascii_lowercase();
    text.contains("<html") && text.contains("<head") && text.contains("<body")
}
