
use scraper::{Html, Node};

/// Elements that separate words even when the source has no whitespace
const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "ol",
    "p",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template"];

/// Reduce an HTML fragment to plain text
///
/// Tags are dropped, entities decoded and runs of whitespace collapsed to a
/// single space. Block-level elements act as word breaks so that
/// `<p>a</p><p>b</p>` reads `a b` rather than `ab`.
#[inline]
pub fn clean_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(content) => {
                let hidden = node
                    .parent()
                    .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                    .is_some_and(|name| HIDDEN_ELEMENTS.contains(&name));
                if !hidden {
                    text.push_str(content);
                }
            }
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => {
                text.push(' ');
            }
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
