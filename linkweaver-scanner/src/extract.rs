// Visible-text extraction for fetched pages

use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

/// Elements whose whole subtree is boilerplate rather than page content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "nav", "header", "footer", "script", "style", "aside", "noscript", "template",
];

static PRIMARY_REGION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article, main").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Convert a raw HTML document into normalized visible text.
///
/// Boilerplate regions are dropped, the first `article`/`main` element is
/// preferred when present, and the surviving text nodes are joined with single
/// spaces. Malformed markup never fails; the worst case is an empty string.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let region = primary_region(&document).unwrap_or_else(|| document.root_element());

    let mut parts: Vec<&str> = Vec::new();
    let mut stack = vec![region.children()];
    loop {
        let next = match stack.last_mut() {
            Some(children) => children.next(),
            None => break,
        };
        let Some(child) = next else {
            stack.pop();
            continue;
        };
        match child.value() {
            Node::Text(text) => {
                parts.extend(text.split_whitespace());
            }
            Node::Element(element) => {
                if !is_skipped(element.name()) {
                    stack.push(child.children());
                }
            }
            _ => {}
        }
    }

    parts.join(" ")
}

/// Text of the document's `<title>` element, if any.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE)
        .next()
        .map(|title| title.text().collect::<Vec<_>>().join(" "))
        .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|title| !title.is_empty())
}

fn primary_region(document: &Html) -> Option<ElementRef<'_>> {
    document.select(&PRIMARY_REGION).find(|element| {
        !element.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| is_skipped(el.name()))
        })
    })
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_ELEMENTS
        .iter()
        .any(|skipped| skipped.eq_ignore_ascii_case(name))
}
