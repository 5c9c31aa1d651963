//! Review extraction from the review site.
//!
//! Searches the site for a title, follows the first book result and pulls
//! reader review text out of the detail page. The site's markup is not under
//! our control, so extraction runs through tiers of decreasing specificity and
//! stops at the first tier that yields anything. Every failure degrades to an
//! empty [`ReviewSet`].

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::fetcher::{FetchError, PageFetcher};
use crate::models::ReviewSet;
use crate::utils::clean_text;

const BOOK_TITLE_SELECTOR: &str = "a.bookTitle[href]";
static BOOK_HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+)?/book/show/\d+").expect("book href pattern is valid")
});

/// Known review-body containers, legacy markup first.
const STRUCTURAL_SELECTORS: [&str; 3] = [
    "div.reviewText span.readable span",
    "span.Formatted",
    "div.ReviewText__content",
];

const STRUCTURAL_MIN_CHARS: usize = 40;
const TEST_ID_MIN_CHARS: usize = 40;
const HEURISTIC_MIN_CHARS: usize = 80;
const PARAGRAPH_MIN_CHARS: usize = 60;

/// Site chrome mentioning the site's own name is only dropped below this length.
const SITE_CHROME_MAX_CHARS: usize = 150;

const BOILERPLATE_PREFIXES: [&str; 3] = ["about the author", "also by", "read more"];

const HEURISTIC_SELECTOR: &str = "p, div, span, blockquote, section, article, li, td";
const BLOCK_TAGS: [&str; 12] = [
    "p", "div", "section", "article", "blockquote", "li", "ul", "ol", "table", "td", "tr", "main",
];
const INVISIBLE_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Site-specific facts the tiers need besides the document itself.
#[derive(Debug, Clone)]
pub struct TierContext {
    /// Lowercase short name of the site, e.g. `goodreads`.
    pub site_name: String,
}

/// One extraction strategy: candidate snippets in document order.
pub type Tier = fn(&Html, &TierContext) -> Result<Vec<String>, ExtractError>;

/// Extraction tiers in the order they are tried.
pub const TIERS: [(&str, Tier); 4] = [
    ("structural", structural_tier),
    ("test-id", test_id_tier),
    ("heuristic", heuristic_tier),
    ("paragraph", paragraph_tier),
];

pub struct ReviewExtractor {
    fetcher: Arc<dyn PageFetcher>,
    site: Url,
    context: TierContext,
}

impl ReviewExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, site: Url) -> Self {
        let context = TierContext {
            site_name: site_name(&site),
        };
        Self {
            fetcher,
            site,
            context,
        }
    }

    /// Fetch up to `max_reviews` review snippets for `book_title`.
    ///
    /// Never fails: network errors, a missing search result and pages without
    /// recognisable reviews all produce an empty set.
    pub async fn extract(&self, book_title: &str, max_reviews: usize) -> ReviewSet {
        match self.try_extract(book_title, max_reviews).await {
            Ok(reviews) => reviews,
            Err(e) => {
                warn!(book_title = %book_title, error = %e, "Review extraction failed");
                ReviewSet::new(max_reviews)
            }
        }
    }

    async fn try_extract(
        &self,
        book_title: &str,
        max_reviews: usize,
    ) -> Result<ReviewSet, ExtractError> {
        let search_url = self.search_url(book_title)?;
        debug!(url = %search_url, "Searching review site");

        let search_html = self.fetcher.fetch(&search_url).await?;
        let book_url = {
            let document = Html::parse_document(&search_html);
            find_book_link(&document, &self.site)?
        };

        let Some(book_url) = book_url else {
            info!(book_title = %book_title, "No book link found in search results");
            return Ok(ReviewSet::new(max_reviews));
        };
        info!(book_title = %book_title, url = %book_url, "Resolved book page");

        let page_html = self.fetcher.fetch(&book_url).await?;
        let document = Html::parse_document(&page_html);
        let (tier, reviews) = extract_from_document(&document, &self.context, max_reviews)?;

        match tier {
            Some(tier) => info!(tier, count = reviews.len(), "Extracted reviews"),
            None => info!(url = %book_url, "No extraction tier produced reviews"),
        }

        Ok(reviews)
    }

    fn search_url(&self, book_title: &str) -> Result<Url, ExtractError> {
        let mut url = self.site.join("search")?;
        url.query_pairs_mut().append_pair("q", book_title);
        Ok(url)
    }
}

/// Derive the short site name used to spot self-referential chrome.
fn site_name(site: &Url) -> String {
    let host = site.host_str().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.split('.').next().unwrap_or_default().to_lowercase()
}

/// Locate the first book detail link on a search results page.
///
/// The dedicated title anchor class wins; otherwise the first anchor whose
/// href looks like a book detail page is used.
pub fn find_book_link(document: &Html, site: &Url) -> Result<Option<Url>, ExtractError> {
    let title_selector = selector(BOOK_TITLE_SELECTOR)?;
    let href = document
        .select(&title_selector)
        .find_map(|anchor| anchor.value().attr("href"));

    let href = match href {
        Some(href) => Some(href),
        None => {
            let anchors = selector("a[href]")?;
            document
                .select(&anchors)
                .filter_map(|anchor| anchor.value().attr("href"))
                .find(|href| BOOK_HREF_PATTERN.is_match(href))
        }
    };

    match href {
        Some(href) => Ok(Some(site.join(href.trim())?)),
        None => Ok(None),
    }
}

/// Run the tiers in order and keep the first non-empty result.
pub fn extract_from_document(
    document: &Html,
    context: &TierContext,
    max_reviews: usize,
) -> Result<(Option<&'static str>, ReviewSet), ExtractError> {
    for (name, tier) in TIERS {
        let mut reviews = ReviewSet::new(max_reviews);
        for snippet in tier(document, context)? {
            reviews.push(snippet);
            if reviews.is_full() {
                break;
            }
        }

        if !reviews.is_empty() {
            return Ok((Some(name), reviews));
        }
        debug!(tier = name, "Extraction tier produced nothing");
    }

    Ok((None, ReviewSet::new(max_reviews)))
}

/// Tier A: known review containers. The first selector with any match wins.
pub fn structural_tier(document: &Html, _: &TierContext) -> Result<Vec<String>, ExtractError> {
    for css in STRUCTURAL_SELECTORS {
        let sel = selector(css)?;
        let found = collect_long(document.select(&sel), STRUCTURAL_MIN_CHARS);
        if !found.is_empty() {
            debug!(selector = css, count = found.len(), "Structural selector matched");
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// Tier B: elements tagged with a test id that mentions reviews or content.
///
/// A tagged card wrapping a tagged body only contributes the body, so reviewer
/// names and like counts around it stay out.
pub fn test_id_tier(document: &Html, _: &TierContext) -> Result<Vec<String>, ExtractError> {
    let sel = selector("[data-testid]")?;
    let tagged: Vec<ElementRef> = document
        .select(&sel)
        .filter(|element| {
            element
                .value()
                .attr("data-testid")
                .map(|id| {
                    let id = id.to_lowercase();
                    id.contains("review") || id.contains("content")
                })
                .unwrap_or(false)
        })
        .collect();

    let innermost = tagged.iter().copied().filter(|element| {
        !tagged.iter().any(|other| {
            other.id() != element.id() && other.ancestors().any(|a| a.id() == element.id())
        })
    });
    Ok(collect_long(innermost, TEST_ID_MIN_CHARS))
}

/// Tier C: text blocks without nested blocks, long enough to be prose, minus
/// boilerplate. Inline elements inside such a block are part of its text, not
/// snippets of their own.
pub fn heuristic_tier(document: &Html, context: &TierContext) -> Result<Vec<String>, ExtractError> {
    let sel = selector(HEURISTIC_SELECTOR)?;
    let blocks: Vec<ElementRef> = document
        .select(&sel)
        .filter(|element| !has_block_descendant(element))
        .collect();
    let ids: HashSet<_> = blocks.iter().map(|element| element.id()).collect();
    let outermost = blocks
        .iter()
        .copied()
        .filter(|element| !element.ancestors().any(|a| ids.contains(&a.id())));

    Ok(collect_long(outermost, HEURISTIC_MIN_CHARS)
        .into_iter()
        .filter(|text| !is_boilerplate(text, &context.site_name))
        .collect())
}

/// Tier D: plain paragraphs.
pub fn paragraph_tier(document: &Html, _: &TierContext) -> Result<Vec<String>, ExtractError> {
    let sel = selector("p")?;
    Ok(collect_long(document.select(&sel), PARAGRAPH_MIN_CHARS))
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        message: format!("{e:?}"),
    })
}

fn collect_long<'a>(elements: impl Iterator<Item = ElementRef<'a>>, min_chars: usize) -> Vec<String> {
    elements
        .map(|element| visible_text(&element))
        .filter(|text| text.chars().count() > min_chars)
        .collect()
}

/// Text of an element with script and style content left out, cleaned.
///
/// Inline markup is joined as-is; only block and `<br>` boundaries become spaces.
fn visible_text(element: &ElementRef) -> String {
    let mut raw = String::new();
    push_visible_text(*element, &mut raw);
    clean_text(&raw)
}

fn push_visible_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        if INVISIBLE_TAGS.contains(&name) {
            continue;
        }
        let boundary = name == "br" || BLOCK_TAGS.contains(&name);
        if boundary {
            out.push(' ');
        }
        push_visible_text(child, out);
        if boundary {
            out.push(' ');
        }
    }
}

fn has_block_descendant(element: &ElementRef) -> bool {
    element.descendants().skip(1).any(|node| {
        node.value()
            .as_element()
            .is_some_and(|el| BLOCK_TAGS.contains(&el.name()))
    })
}

fn is_boilerplate(text: &str, site_name: &str) -> bool {
    let lower = text.to_lowercase();
    if BOILERPLATE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return true;
    }
    !site_name.is_empty()
        && lower.contains(site_name)
        && text.chars().count() < SITE_CHROME_MAX_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const LONG_A: &str = "A sweeping epic about politics, ecology and religion on a desert planet that still feels modern.";
    const LONG_B: &str = "The world building is dense at first but rewards patience with one of the richest settings in fiction.";

    fn context() -> TierContext {
        TierContext {
            site_name: "goodreads".to_string(),
        }
    }

    fn site() -> Url {
        Url::parse("https://www.goodreads.com").unwrap()
    }

    /// Serves fixture pages keyed by path, failing for anything else.
    struct FixtureFetcher {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl FixtureFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(path, html)| (path.to_string(), html.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages.get(url.path()).cloned().ok_or(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn search_page(link: &str) -> String {
        format!(r#"<html><body><table><tr><td><a class="bookTitle" href="{link}"><span>Dune</span></a></td></tr></table></body></html>"#)
    }

    fn review_page() -> String {
        format!(
            r#"<html><body>
                <div class="ReviewText__content"><span class="Formatted">{LONG_A}</span></div>
                <div class="ReviewText__content"><span class="Formatted">{LONG_B}</span></div>
            </body></html>"#
        )
    }

    #[test]
    fn test_site_name() {
        assert_eq!(site_name(&site()), "goodreads");
        assert_eq!(site_name(&Url::parse("https://goodreads.com/").unwrap()), "goodreads");
    }

    #[test]
    fn test_find_book_link_prefers_title_class() {
        let html = r#"<a href="/book/show/1-other">Other</a><a class="bookTitle" href="/book/show/234225.Dune">Dune</a>"#;
        let document = Html::parse_document(html);
        let link = find_book_link(&document, &site()).unwrap().unwrap();
        assert_eq!(link.as_str(), "https://www.goodreads.com/book/show/234225.Dune");
    }

    #[test]
    fn test_find_book_link_falls_back_to_href_pattern() {
        let html = r#"<a href="/author/show/1">Author</a><a href="/book/show/44767458-dune?from_search=true">Dune</a>"#;
        let document = Html::parse_document(html);
        let link = find_book_link(&document, &site()).unwrap().unwrap();
        assert_eq!(link.path(), "/book/show/44767458-dune");
        assert_eq!(link.query(), Some("from_search=true"));
    }

    #[test]
    fn test_find_book_link_none() {
        let html = r#"<a href="/author/show/1">Author</a><a href="/search?q=x">Again</a>"#;
        let document = Html::parse_document(html);
        assert!(find_book_link(&document, &site()).unwrap().is_none());
    }

    #[test]
    fn test_structural_tier_uses_first_matching_selector() {
        let document = Html::parse_document(&review_page());
        let found = structural_tier(&document, &context()).unwrap();
        assert_eq!(found, vec![LONG_A, LONG_B]);
    }

    #[test]
    fn test_structural_tier_legacy_markup() {
        let html = format!(
            r#"<div class="reviewText"><span class="readable"><span>{LONG_A}</span></span></div>
               <div class="reviewText"><span class="readable"><span>too short</span></span></div>"#
        );
        let document = Html::parse_document(&html);
        assert_eq!(structural_tier(&document, &context()).unwrap(), vec![LONG_A]);
    }

    #[test]
    fn test_test_id_tier() {
        let html = format!(
            r#"<section data-testid="reviewCard"><p>{LONG_A}</p></section>
               <div data-testid="navbar">{LONG_B}</div>"#
        );
        let document = Html::parse_document(&html);
        assert_eq!(test_id_tier(&document, &context()).unwrap(), vec![LONG_A]);
    }

    #[test]
    fn test_heuristic_tier_skips_boilerplate_and_scripts() {
        let html = format!(
            r#"<html><head><script>var x = "{LONG_B}";</script></head><body>
                <div><p>About the author: Frank Herbert was an American science fiction author best known for this novel.</p></div>
                <div><span>Join Goodreads and discover what your friends are reading, rating and reviewing this week.</span></div>
                <div><p>{LONG_A}<script>console.log("ignored inline script body");</script></p></div>
            </body></html>"#
        );
        let document = Html::parse_document(&html);
        assert_eq!(heuristic_tier(&document, &context()).unwrap(), vec![LONG_A]);
    }

    #[test]
    fn test_paragraph_tier_floor() {
        let html = "<p>Short paragraph that is under sixty characters.</p><p>This paragraph is comfortably longer than sixty characters in total.</p>";
        let document = Html::parse_document(html);
        let found = paragraph_tier(&document, &context()).unwrap();
        assert_eq!(
            found,
            vec!["This paragraph is comfortably longer than sixty characters in total."]
        );
    }

    #[test]
    fn test_inline_markup_keeps_words_whole() {
        let html = r#"<span class="Formatted">I reread <i>Dune</i>'s appendices twice; Herbert's world<b>building</b> is unmatched in the genre.</span>
            <span class="Formatted">The opening chapters drag on for far too long<br>but the ending is worth it.</span>"#;
        let document = Html::parse_document(html);
        assert_eq!(
            structural_tier(&document, &context()).unwrap(),
            vec![
                "I reread Dune's appendices twice; Herbert's worldbuilding is unmatched in the genre.",
                "The opening chapters drag on for far too long but the ending is worth it.",
            ]
        );
    }

    #[test]
    fn test_test_id_tier_keeps_innermost_match() {
        let html = format!(
            r#"<article data-testid="reviewCard">
                <span>Jane Doe</span><span>5 likes</span>
                <div data-testid="contentContainer">{LONG_A}</div>
            </article>"#
        );
        let document = Html::parse_document(&html);
        assert_eq!(test_id_tier(&document, &context()).unwrap(), vec![LONG_A]);
    }

    #[test]
    fn test_heuristic_tier_does_not_split_inline_children() {
        let html = format!("<div>{LONG_A} <span>{LONG_B}</span></div>");
        let document = Html::parse_document(&html);
        assert_eq!(
            heuristic_tier(&document, &context()).unwrap(),
            vec![format!("{LONG_A} {LONG_B}")]
        );
    }

    #[test]
    fn test_tier_length_floors_are_exclusive() {
        let cases: [(Tier, fn(&str) -> String, usize); 4] = [
            (
                structural_tier,
                |t: &str| format!(r#"<span class="Formatted">{t}</span>"#),
                STRUCTURAL_MIN_CHARS,
            ),
            (
                test_id_tier,
                |t: &str| format!(r#"<div data-testid="review">{t}</div>"#),
                TEST_ID_MIN_CHARS,
            ),
            (heuristic_tier, |t: &str| format!("<div>{t}</div>"), HEURISTIC_MIN_CHARS),
            (paragraph_tier, |t: &str| format!("<p>{t}</p>"), PARAGRAPH_MIN_CHARS),
        ];

        for (tier, wrap, floor) in cases {
            let at_floor = "r".repeat(floor);
            let above_floor = "k".repeat(floor + 1);
            let html = format!("{}{}", wrap(&at_floor), wrap(&above_floor));
            let document = Html::parse_document(&html);
            assert_eq!(
                tier(&document, &context()).unwrap(),
                vec![above_floor.clone()],
                "floor {floor}"
            );
        }
    }

    #[test]
    fn test_extract_from_document_falls_through_tiers() {
        let short_paragraph = "This paragraph is comfortably longer than sixty characters in total.";
        let cases = [
            (format!(r#"<div data-testid="reviewText">{LONG_A}</div>"#), "test-id", LONG_A),
            (format!("<div><p>{LONG_A}</p></div>"), "heuristic", LONG_A),
            (format!("<div><p>{short_paragraph}</p></div>"), "paragraph", short_paragraph),
        ];

        for (html, expected_tier, expected) in cases {
            let document = Html::parse_document(&html);
            let (tier, reviews) = extract_from_document(&document, &context(), 5).unwrap();
            assert_eq!(tier, Some(expected_tier));
            assert_eq!(reviews.into_vec(), vec![expected.to_string()]);
        }
    }

    #[test]
    fn test_extract_from_document_prefers_structural_tier() {
        let html = format!(
            r#"<span class="Formatted">{LONG_A}</span>
               <div><p>{LONG_B}</p></div>"#
        );
        let document = Html::parse_document(&html);
        let (tier, reviews) = extract_from_document(&document, &context(), 5).unwrap();
        assert_eq!(tier, Some("structural"));
        assert_eq!(reviews.into_vec(), vec![LONG_A.to_string()]);
    }

    #[test]
    fn test_extract_from_document_dedups_decodes_and_caps() {
        let html = format!(
            r#"<span class="Formatted">{LONG_A} &amp;quot;classic&amp;quot;</span>
               <span class="Formatted">{LONG_A} &amp;quot;classic&amp;quot;</span>
               <span class="Formatted">{LONG_B}</span>
               <span class="Formatted">{LONG_B} Again.</span>"#
        );
        let document = Html::parse_document(&html);
        let (tier, reviews) = extract_from_document(&document, &context(), 2).unwrap();
        assert_eq!(tier, Some("structural"));
        assert_eq!(
            reviews.into_vec(),
            vec![format!("{LONG_A} \"classic\""), LONG_B.to_string()]
        );
    }

    #[test]
    fn test_extract_from_document_nothing_found() {
        let document = Html::parse_document("<html><body><p>tiny</p></body></html>");
        let (tier, reviews) = extract_from_document(&document, &context(), 5).unwrap();
        assert_eq!(tier, None);
        assert!(reviews.is_empty());
    }

    #[tokio::test]
    async fn test_extract_end_to_end() {
        let search = search_page("/book/show/234225.Dune");
        let page = review_page();
        let fetcher = Arc::new(FixtureFetcher::new(&[
            ("/search", search.as_str()),
            ("/book/show/234225.Dune", page.as_str()),
        ]));
        let extractor = ReviewExtractor::new(fetcher.clone(), site());

        let reviews = extractor.extract("Dune Messiah", 5).await;
        assert_eq!(reviews.as_slice(), &[LONG_A.to_string(), LONG_B.to_string()]);

        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(calls[0], "https://www.goodreads.com/search?q=Dune+Messiah");
        assert_eq!(calls[1], "https://www.goodreads.com/book/show/234225.Dune");
    }

    #[tokio::test]
    async fn test_extract_without_book_link_is_empty() {
        let fetcher = Arc::new(FixtureFetcher::new(&[(
            "/search",
            "<html><body><p>No results.</p></body></html>",
        )]));
        let extractor = ReviewExtractor::new(fetcher.clone(), site());

        assert!(extractor.extract("zzzz", 5).await.is_empty());
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_network_failure_is_empty() {
        let search = search_page("/book/show/1-missing");
        let fetcher = Arc::new(FixtureFetcher::new(&[("/search", search.as_str())]));
        let extractor = ReviewExtractor::new(fetcher, site());

        assert!(extractor.extract("Dune", 5).await.is_empty());
    }
}
