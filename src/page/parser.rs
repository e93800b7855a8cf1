//! Incremental page extraction from an HTML token stream
//!
//! The parser tracks the stack of open elements and attributes each text run
//! to the innermost open element:
//! - `title` text becomes the page title
//! - `h1`..`h6` text becomes a heading
//! - inline `script` text becomes script content
//! - text in content-bearing elements (`p`, `li`, `td`, ...) becomes content
//!
//! Links come from `a[href]` and `script[src]`, resolved against the page
//! location. Metadata comes from `meta[name][content]`.

use crate::page::tokens::{is_raw_text, HtmlToken, HtmlTokens};
use crate::page::Page;
use crate::url::normalize_link;
use std::collections::HashSet;
use tokio::sync::mpsc;
use url::Url;

/// Deeper nesting than this is not tracked
const MAX_OPEN_ELEMENTS: usize = 512;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const CONTENT_ELEMENTS: &[&str] = &[
    "p", "span", "pre", "code", "em", "strong", "b", "i", "mark", "small", "abbr", "cite", "q",
    "blockquote", "kbd", "samp", "var", "li", "dt", "dd", "th", "td", "caption",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextContext {
    Title,
    Heading,
    Script,
    Content,
    Ignored,
}

fn text_context(element: &str) -> TextContext {
    match element {
        "title" => TextContext::Title,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => TextContext::Heading,
        "script" => TextContext::Script,
        e if CONTENT_ELEMENTS.contains(&e) => TextContext::Content,
        _ => TextContext::Ignored,
    }
}

fn is_void(element: &str) -> bool {
    VOID_ELEMENTS.contains(&element)
}

/// Builds a [`Page`] from HTML tokens as they arrive
///
/// # Example
///
/// ```
/// use mycelium::page::{HtmlTokens, PageParser};
/// use url::Url;
///
/// let mut parser = PageParser::new(Url::parse("https://a.com/").unwrap());
/// parser.consume_all(HtmlTokens::from_str("<title>T</title><a href=\"/x\">x</a>"));
/// let page = parser.finish();
///
/// assert_eq!(page.title.as_deref(), Some("T"));
/// assert_eq!(page.links[0].as_str(), "https://a.com/x");
/// ```
pub struct PageParser {
    page: Page,
    base: Url,
    open: Vec<String>,
    text: String,
    seen_links: HashSet<Url>,
    seen_script_links: HashSet<Url>,
}

impl PageParser {
    /// Creates a parser resolving links against the page's own location
    pub fn new(location: Url) -> Self {
        let base = location.clone();
        Self::with_base(location, base)
    }

    /// Creates a parser resolving links against `base`, e.g. the post-redirect URL
    pub fn with_base(location: Url, base: Url) -> Self {
        Self {
            page: Page::new(location),
            base,
            open: Vec::new(),
            text: String::new(),
            seen_links: HashSet::new(),
            seen_script_links: HashSet::new(),
        }
    }

    pub fn consume(&mut self, token: HtmlToken) {
        match token {
            HtmlToken::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                self.flush_text();
                match name.as_str() {
                    "a" => self.on_anchor(&attrs),
                    "script" => self.on_script(&attrs),
                    "meta" => self.on_meta(&attrs),
                    _ => {}
                }

                // The tokenizer switches to raw text for these regardless of a trailing slash
                let opens = !is_void(&name) && (!self_closing || is_raw_text(&name));
                if opens && self.open.len() < MAX_OPEN_ELEMENTS {
                    self.open.push(name);
                }
            }
            HtmlToken::EndTag { name } => {
                self.flush_text();
                if let Some(i) = self.open.iter().rposition(|open| *open == name) {
                    self.open.truncate(i);
                }
            }
            HtmlToken::Text(text) => self.text.push_str(&text),
            HtmlToken::Error(message) => {
                tracing::trace!(location = %self.page.location, error = %message, "HTML tokenizer error");
            }
        }
    }

    pub fn consume_all<I>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = HtmlToken>,
    {
        for token in tokens {
            self.consume(token);
        }
    }

    /// Completes the page, stamping its creation time
    pub fn finish(mut self) -> Page {
        self.flush_text();
        self.page.created_at = chrono::Utc::now();
        self.page
    }

    fn context(&self) -> TextContext {
        self.open
            .last()
            .map_or(TextContext::Ignored, |element| text_context(element))
    }

    /// Dispatches the buffered text run to the current context
    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        match self.context() {
            TextContext::Title => {
                if self.page.title.is_none() {
                    self.page.title = Some(trimmed.to_string());
                }
            }
            TextContext::Heading => self.page.headings.push(trimmed.to_string()),
            TextContext::Script => self.page.script_content.push(trimmed.to_string()),
            TextContext::Content => self.page.content.push(trimmed.to_string()),
            TextContext::Ignored => {}
        }
    }

    fn on_anchor(&mut self, attrs: &[(String, String)]) {
        if let Some(url) = self.resolve(attrs, "href") {
            if self.seen_links.insert(url.clone()) {
                self.page.links.push(url);
            }
        }
    }

    fn on_script(&mut self, attrs: &[(String, String)]) {
        if let Some(url) = self.resolve(attrs, "src") {
            if self.seen_script_links.insert(url.clone()) {
                self.page.script_links.push(url);
            }
        }
    }

    fn on_meta(&mut self, attrs: &[(String, String)]) {
        let name = find_attr(attrs, "name").map(|n| n.trim().to_ascii_lowercase());
        let content = find_attr(attrs, "content").map(str::trim).unwrap_or("");
        let Some(name) = name else {
            return;
        };
        if content.is_empty() {
            return;
        }

        match name.as_str() {
            "description" => self.page.description = Some(content.to_string()),
            "author" => self.page.author = Some(content.to_string()),
            "keywords" => self.page.keywords.extend(
                content
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from),
            ),
            _ => {}
        }
    }

    fn resolve(&self, attrs: &[(String, String)], key: &str) -> Option<Url> {
        let reference = find_attr(attrs, key)?;
        match normalize_link(&self.base, reference) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!(
                    location = %self.page.location,
                    reference = %reference,
                    error = %e,
                    "Skipping unresolvable link"
                );
                None
            }
        }
    }
}

fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// Parses a complete HTML document located at `location`
pub fn parse_html(html: &str, location: &Url) -> Page {
    let mut parser = PageParser::new(location.clone());
    parser.consume_all(HtmlTokens::from_str(html));
    parser.finish()
}

/// Parses body chunks as they arrive on `chunks` until the sender closes
///
/// Blocks the calling thread; run it on a blocking-capable thread such as
/// [`tokio::task::spawn_blocking`].
pub fn parse_stream<B>(mut chunks: mpsc::Receiver<B>, location: Url, base: Url) -> Page
where
    B: AsRef<[u8]>,
{
    let mut tokens = HtmlTokens::new();
    let mut parser = PageParser::with_base(location, base);

    while let Some(chunk) = chunks.blocking_recv() {
        tokens.feed(chunk.as_ref());
        parser.consume_all(&mut tokens);
    }
    tokens.finish();
    parser.consume_all(&mut tokens);

    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Url {
        Url::parse("https://a.com/").unwrap()
    }

    #[test]
    fn test_reference_document() {
        let html = r#"<html><head><title>T</title><meta name="description" content="D"></head><body><h1>H</h1><a href="/x">link</a></body></html>"#;
        let page = parse_html(html, &root());

        assert_eq!(page.title.as_deref(), Some("T"));
        assert_eq!(page.description.as_deref(), Some("D"));
        assert_eq!(page.headings, vec!["H"]);
        assert_eq!(
            page.links.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.com/x"]
        );
        assert!(page.content.is_empty());
    }

    #[test]
    fn test_meta_fields() {
        let html = r#"<meta NAME="Keywords" content=" rust, crawler ,, web "><meta name="author" content="  Ada "><meta name="author"><meta content="orphan">"#;
        let page = parse_html(html, &root());

        assert_eq!(page.keywords, vec!["rust", "crawler", "web"]);
        assert_eq!(page.author.as_deref(), Some("Ada"));
        assert!(page.description.is_none());
    }

    #[test]
    fn test_content_elements() {
        let html = "<div>skipped<p>First <em>emphasis</em> tail</p><ul><li>item</li></ul><table><tr><td>cell</td></tr></table></div>";
        let page = parse_html(html, &root());
        assert_eq!(page.content, vec!["First", "emphasis", "tail", "item", "cell"]);
    }

    #[test]
    fn test_first_non_empty_title_wins() {
        let page = parse_html("<title>  </title><title>Real</title><title>Later</title>", &root());
        assert_eq!(page.title.as_deref(), Some("Real"));
    }

    #[test]
    fn test_headings_all_levels() {
        let page = parse_html("<h1>one</h1><h3> three </h3><h6>six</h6><h2></h2>", &root());
        assert_eq!(page.headings, vec!["one", "three", "six"]);
    }

    #[test]
    fn test_scripts() {
        let html = r#"<script src="/app.js"></script><script src="https://cdn.com/lib.js"></script><script>var x = "<p>no</p>";</script><script src="/app.js"></script>"#;
        let page = parse_html(html, &root());

        assert_eq!(
            page.script_links.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.com/app.js", "https://cdn.com/lib.js"]
        );
        assert_eq!(page.script_content, vec![r#"var x = "<p>no</p>";"#]);
        assert!(page.content.is_empty());
    }

    #[test]
    fn test_links_deduplicated_in_first_seen_order() {
        let html = r#"<a href="/b">b</a><a href="/a">a</a><a href="https://a.com/b">again</a>"#;
        let page = parse_html(html, &root());
        assert_eq!(
            page.links.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.com/b", "https://a.com/a"]
        );
    }

    #[test]
    fn test_unresolvable_links_skipped() {
        let html = r#"<a href="mailto:x@a.com">mail</a><a href="javascript:void(0)">js</a><a href="http://">bad</a><a href="ok">ok</a>"#;
        let page = parse_html(html, &Url::parse("https://a.com/dir/").unwrap());
        assert_eq!(
            page.links.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://a.com/dir/ok"]
        );
    }

    #[test]
    fn test_style_and_unknown_tags_ignored() {
        let html = "<style>p { color: red }</style><section>loose</section><custom-tag>x</custom-tag>";
        let page = parse_html(html, &root());
        assert!(page.content.is_empty());
        assert!(page.script_content.is_empty());
    }

    #[test]
    fn test_void_elements_do_not_capture_context() {
        let page = parse_html("<p>before<br>after<img src=x.png></p>", &root());
        assert_eq!(page.content, vec!["before", "after"]);
    }

    #[test]
    fn test_unclosed_elements_tolerated() {
        let page = parse_html("<p>one<p>two</div></span>", &root());
        assert_eq!(page.content, vec!["one", "two"]);
    }

    #[test]
    fn test_links_resolve_against_base() {
        let location = Url::parse("https://a.com/old").unwrap();
        let base = Url::parse("https://b.com/new/").unwrap();
        let mut parser = PageParser::with_base(location.clone(), base);
        parser.consume_all(HtmlTokens::from_str(r#"<a href="page">p</a>"#));
        let page = parser.finish();

        assert_eq!(page.location, location);
        assert_eq!(page.links[0].as_str(), "https://b.com/new/page");
    }

    #[tokio::test]
    async fn test_parse_stream_from_chunks() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(4);
        let location = root();
        let parse = tokio::task::spawn_blocking(move || parse_stream(rx, location.clone(), location));

        let html = "<title>Streamed</title><p>body text</p><a href=\"/next\">n</a>";
        for chunk in html.as_bytes().chunks(5) {
            tx.send(chunk.to_vec()).await.unwrap();
        }
        drop(tx);

        let page = parse.await.unwrap();
        assert_eq!(page.title.as_deref(), Some("Streamed"));
        assert_eq!(page.content, vec!["body text"]);
        assert_eq!(page.links[0].as_str(), "https://a.com/next");
    }
}
