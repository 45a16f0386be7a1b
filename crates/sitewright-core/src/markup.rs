//! Page documents held as data and serialised only at write time.
//!
//! A [`PageDocument`] keeps the shared head, the per-page navigation, the
//! body fragment, and the footer as separate strings. Generation and
//! assembly operate on these parts directly; [`PageDocument::parse`] exists
//! for reading back a directory that was built earlier.

use serde::{Deserialize, Serialize};

/// Structured page: everything needed to render one HTML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    /// Inner markup of `<head>`.
    pub head: String,
    pub body_class: String,
    /// Navigation element; may contain unresolved active-state placeholders
    /// until the assembler runs.
    pub nav: String,
    /// The `<main>` element.
    pub body: String,
    pub footer: String,
}

impl PageDocument {
    pub fn new(
        head: impl Into<String>,
        body_class: impl Into<String>,
        nav: impl Into<String>,
        body: impl Into<String>,
        footer: impl Into<String>,
    ) -> Self {
        Self {
            head: head.into().trim().to_string(),
            body_class: body_class.into().trim().to_string(),
            nav: nav.into().trim().to_string(),
            body: body.into().trim().to_string(),
            footer: footer.into().trim().to_string(),
        }
    }

    /// Serialise to a complete HTML document.
    pub fn render(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n{head}\n</head>\n<body class=\"{class}\">\n{nav}\n{body}\n{footer}\n</body>\n</html>\n",
            head = self.head,
            class = escape_attr(&self.body_class),
            nav = self.nav,
            body = self.body,
            footer = self.footer,
        )
    }

    /// Reconstruct a document from rendered HTML.
    ///
    /// Returns `None` when the markup has no `<head>` or no `<main>` element.
    /// Missing `<nav>` or `<footer>` elements yield empty parts.
    pub fn parse(html: &str) -> Option<Self> {
        let head = inner_of(html, "head")?;
        let body = extract_main(html)?;
        let nav = find_element(html, "nav", Occurrence::First)
            .map(|(s, e)| html[s..e].to_string())
            .unwrap_or_default();
        let footer = find_element(html, "footer", Occurrence::Last)
            .map(|(s, e)| html[s..e].to_string())
            .unwrap_or_default();
        let body_class = body_class_of(html).unwrap_or_default();

        Some(Self::new(head, body_class, nav, body, footer))
    }

    /// Replace the body fragment, keeping head, nav, and footer untouched.
    pub fn with_body(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into().trim().to_string(),
            ..self.clone()
        }
    }
}

/// Which match of an element to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    First,
    Last,
}

/// Byte range `[start, end)` of a whole `<tag ...>...</tag>` element.
///
/// Matching is ASCII case-insensitive. For `First` the element runs from the
/// first opening tag to the first closing tag after it; for `Last` from the
/// last opening tag to the last closing tag.
pub fn find_element(html: &str, tag: &str, which: Occurrence) -> Option<(usize, usize)> {
    let lower = html.to_ascii_lowercase();
    let close = format!("</{tag}>");

    let start = match which {
        Occurrence::First => find_open_tag(&lower, tag, 0),
        Occurrence::Last => {
            let mut last = None;
            let mut from = 0;
            while let Some(pos) = find_open_tag(&lower, tag, from) {
                last = Some(pos);
                from = pos + 1;
            }
            last
        }
    }?;

    let close_pos = match which {
        Occurrence::First => lower[start..].find(&close).map(|p| p + start),
        Occurrence::Last => lower.rfind(&close).filter(|p| *p > start),
    }?;

    Some((start, close_pos + close.len()))
}

fn find_open_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut offset = from;
    while let Some(rel) = lower.get(offset..)?.find(&needle) {
        let pos = offset + rel;
        let next = lower[pos + needle.len()..].chars().next();
        if matches!(next, Some(c) if c == '>' || c.is_ascii_whitespace()) {
            return Some(pos);
        }
        offset = pos + needle.len();
    }
    None
}

fn inner_of(html: &str, tag: &str) -> Option<String> {
    let (start, end) = find_element(html, tag, Occurrence::First)?;
    let element = &html[start..end];
    let open_end = element.find('>')? + 1;
    let close_start = element.len() - format!("</{tag}>").len();
    Some(element[open_end..close_start].to_string())
}

fn body_class_of(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = find_open_tag(&lower, "body", 0)?;
    let tag_end = lower[start..].find('>')? + start;
    let tag = &html[start..tag_end];
    let attr = tag.to_ascii_lowercase().find("class=\"")? + "class=\"".len();
    let rest = &tag[attr..];
    let close = rest.find('"')?;
    Some(unescape_attr(&rest[..close]))
}

/// The outermost `<main>` element, if present.
pub fn extract_main(html: &str) -> Option<String> {
    let (start, _) = find_element(html, "main", Occurrence::First)?;
    let (_, end) = find_element(html, "main", Occurrence::Last)?;
    Some(html[start..end].to_string())
}

/// Turn free-form model output into a `<main>` fragment.
///
/// Prefers an existing `<main>` element; otherwise wraps the span of
/// `<section>` elements; otherwise wraps the raw text.
pub fn wrap_fragment(text: &str) -> String {
    if let Some(main) = extract_main(text) {
        return main;
    }

    let lower = text.to_ascii_lowercase();
    if let (Some(start), Some(end)) = (find_open_tag(&lower, "section", 0), lower.rfind("</section>"))
    {
        if end > start {
            let sections = &text[start..end + "</section>".len()];
            return format!("<main>\n{sections}\n</main>");
        }
    }

    format!("<main>\n<section>\n{}\n</section>\n</main>", text.trim())
}

/// Whether `text` contains recognisable content markup.
pub fn contains_content_markup(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["main", "section", "div", "article", "h1", "h2"]
        .iter()
        .any(|tag| find_open_tag(&lower, tag, 0).is_some())
}

/// Escape text for element content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text for a double-quoted attribute value.
pub fn escape_attr(text: &str) -> String {
    escape_html(text)
}

fn unescape_attr(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PageDocument {
        PageDocument::new(
            "<meta charset=\"utf-8\">\n<title>About</title>",
            "bg-slate-900 text-slate-100",
            "<nav class=\"top\"><a href=\"index.html\" class=\"{{active:index}}\">Home</a></nav>",
            "<main id=\"content\">\n<section><h1>About</h1><p>Hello</p></section>\n</main>",
            "<footer><p>&copy; Test</p></footer>",
        )
    }

    #[test]
    fn test_render_then_parse_roundtrips_every_part() {
        let doc = sample();
        let parsed = PageDocument::parse(&doc.render()).expect("parse");
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_parse_requires_main() {
        assert!(PageDocument::parse("<html><head></head><body></body></html>").is_none());
    }

    #[test]
    fn test_find_element_is_case_insensitive_and_skips_prefix_tags() {
        let html = "<Navbar></Navbar><NAV id=\"x\">a</NAV>";
        let (s, e) = find_element(html, "nav", Occurrence::First).unwrap();
        assert_eq!(&html[s..e], "<NAV id=\"x\">a</NAV>");
    }

    #[test]
    fn test_extract_main_takes_outermost() {
        let html = "x<main><main>inner</main></main>y";
        assert_eq!(
            extract_main(html).unwrap(),
            "<main><main>inner</main></main>"
        );
    }

    #[test]
    fn test_wrap_fragment_variants() {
        assert_eq!(wrap_fragment("pre <main>a</main> post"), "<main>a</main>");

        let wrapped = wrap_fragment("Sure! <section>one</section><section>two</section> done");
        assert_eq!(
            wrapped,
            "<main>\n<section>one</section><section>two</section>\n</main>"
        );

        let wrapped = wrap_fragment("just words");
        assert!(wrapped.starts_with("<main>"));
        assert!(wrapped.contains("just words"));
    }

    #[test]
    fn test_with_body_preserves_other_parts() {
        let doc = sample();
        let fixed = doc.with_body("<main>fixed</main>");
        assert_eq!(fixed.nav, doc.nav);
        assert_eq!(fixed.footer, doc.footer);
        assert_eq!(fixed.head, doc.head);
        assert_eq!(fixed.body, "<main>fixed</main>");
    }

    #[test]
    fn test_contains_content_markup() {
        assert!(contains_content_markup("<div>x</div>"));
        assert!(!contains_content_markup("I cannot help with that."));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
