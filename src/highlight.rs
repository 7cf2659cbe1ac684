//! Keyword highlighting over extracted text.

use pulldown_cmark::{html, Event, Parser, Tag};

/// Markdown emphasis wrapped around every match.
pub const EMPHASIS: &str = "**";

/// Wrap every occurrence of `keyword` in bold markers.
///
/// Matching is literal and case-sensitive; occurrences are taken left to right
/// without overlap. An empty keyword leaves the text unchanged. Markers
/// already present in the text are not escaped.
pub fn highlight(text: &str, keyword: &str) -> String {
    if keyword.is_empty() {
        return text.to_string();
    }
    text.replace(keyword, &format!("{EMPHASIS}{keyword}{EMPHASIS}"))
}

/// Number of non-overlapping occurrences of `keyword` (0 when empty).
pub fn count_matches(text: &str, keyword: &str) -> usize {
    if keyword.is_empty() {
        return 0;
    }
    text.matches(keyword).count()
}

/// Render highlighted markdown to HTML.
///
/// Raw HTML in the source is emitted as escaped text, and links and images
/// are reduced to their text, so OCR output can never inject markup or make
/// the page fetch anything.
pub fn render_markdown(markdown: &str) -> String {
    let parser = Parser::new(markdown)
        .filter(|event| {
            !matches!(
                event,
                Event::Start(Tag::Link(..) | Tag::Image(..)) | Event::End(Tag::Link(..) | Tag::Image(..))
            )
        })
        .map(|event| match event {
            Event::Html(raw) => Event::Text(raw),
            other => other,
        });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
