//! Server-rendered HTML page.

use crate::extractor::Extraction;
use crate::highlight::{count_matches, highlight, render_markdown};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt::Write as _;

const TITLE: &str = "OCR Web App (Supports Hindi and English Text)";

const FOOTER: &str = "<hr>\n<footer class=\"credit\">© Made by Pratham Bajpai</footer>\n";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; color: #222; }
h1 { font-size: 1.8rem; }
form { display: grid; gap: 0.75rem; margin: 1.5rem 0; padding: 1rem; border: 1px solid #ddd; border-radius: 6px; }
.preview img { max-width: 100%; border: 1px solid #eee; }
.preview figcaption { color: #666; font-size: 0.9rem; }
textarea { width: 100%; height: 200px; font-family: inherit; }
.error { background: #fde8e8; border: 1px solid #f5b5b5; padding: 0.75rem; border-radius: 6px; }
.results strong { background: #fff3a3; }
.credit { text-align: center; color: #666; font-size: 0.9rem; margin: 1rem 0; }
"#;

/// A processed upload to show below the form.
pub struct ResultView<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub image: &'a [u8],
    pub extraction: &'a Extraction,
    pub keyword: Option<&'a str>,
}

/// Everything the page can show.
#[derive(Default)]
pub struct PageView<'a> {
    /// Initial state of the "enhance image" checkbox.
    pub preprocess_default: bool,
    pub result: Option<ResultView<'a>>,
    pub error: Option<&'a str>,
}

pub fn render(view: &PageView<'_>) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<h1>{title}</h1>\n<p>Upload an image containing Hindi and/or English text, and see the extracted text.</p>\n",
        title = TITLE
    );

    if let Some(error) = view.error {
        let _ = writeln!(body, "<div class=\"error\">{}</div>", escape_html(error));
    }

    let keyword = view.result.as_ref().and_then(|r| r.keyword).unwrap_or("");
    let checked = if view.preprocess_default { " checked" } else { "" };
    let _ = write!(
        body,
        r#"<form method="post" action="/" enctype="multipart/form-data">
<label>Upload an Image <input type="file" name="file" accept=".jpg,.jpeg,.png" required></label>
<label>Enter a keyword to search <input type="text" name="keyword" value="{keyword}"></label>
<input type="hidden" name="preprocess" value="false">
<label><input type="checkbox" name="preprocess" value="true"{checked}> Enhance image before OCR</label>
<button type="submit">Extract text</button>
</form>
"#,
        keyword = escape_html(keyword),
        checked = checked,
    );

    if let Some(result) = &view.result {
        render_result(&mut body, result);
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}{}</body>\n</html>\n",
        TITLE, STYLE, body, FOOTER
    )
}

fn render_result(body: &mut String, result: &ResultView<'_>) {
    let _ = write!(
        body,
        "<figure class=\"preview\"><img src=\"data:{mime};base64,{data}\" alt=\"Uploaded Image\"><figcaption>Uploaded Image: {name}</figcaption></figure>\n",
        mime = result.mime_type,
        data = BASE64.encode(result.image),
        name = escape_html(result.filename),
    );

    let _ = write!(
        body,
        // The parser drops the first newline after <textarea>, so text with a
        // leading newline needs one extra.
        "<h2>Extracted Text:</h2>\n<textarea readonly aria-label=\"Extracted Text\">\n{}</textarea>\n",
        escape_html(&result.extraction.text)
    );

    if let Some(keyword) = result.keyword.filter(|k| !k.is_empty()) {
        let text = &result.extraction.text;
        let matches = count_matches(text, keyword);
        let _ = write!(
            body,
            "<h2>Search Results:</h2>\n<p>{} match{} for \"{}\"</p>\n<div class=\"results\">{}</div>\n",
            matches,
            if matches == 1 { "" } else { "es" },
            escape_html(keyword),
            render_markdown(&highlight(text, keyword))
        );
    }
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
