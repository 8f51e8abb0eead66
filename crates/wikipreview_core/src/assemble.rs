use crate::decode::ParseOutcome;
use crate::error::PreviewError;

pub const PREVIEW_LABEL: &str = "Wikitext Preview";
pub const VIEWER_LABEL: &str = "Wiki Page Viewer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub title: String,
}

/// Build a standalone HTML document from a decoded parse response.
///
/// Anything other than a rendered outcome is handed back as the matching
/// [`PreviewError`] so the caller can report it instead of showing HTML.
pub fn assemble(
    outcome: &ParseOutcome,
    base_url: &str,
    style_css: &str,
    label: &str,
) -> Result<RenderedDocument, PreviewError> {
    let result = outcome.clone().into_result()?;

    let head_extras = format!(
        "<base href=\"{}\" /><style>{style_css}</style>",
        escape_attribute(base_url)
    );
    let mut html = match result
        .head_html
        .as_deref()
        .and_then(|head| inject_after_head_open(head, &head_extras))
    {
        Some(head) => head,
        None => format!("<!DOCTYPE html><html><head>{head_extras}</head><body>"),
    };

    html.push_str(result.body_html.as_deref().unwrap_or_default());
    if let Some(categories) = &result.categories_html {
        html.push_str("<hr>");
        html.push_str(categories);
    }
    html.push_str("</body></html>");

    let title = match &result.display_title {
        Some(display_title) => format!("{label}: {display_title}"),
        None => label.to_string(),
    };

    Ok(RenderedDocument { html, title })
}

/// Insert `extras` right after the first opening `<head>` tag. Returns None
/// when the fragment has no such tag.
pub fn inject_after_head_open(fragment: &str, extras: &str) -> Option<String> {
    let lower = fragment.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(offset) = lower[search_from..].find("<head") {
        let start = search_from + offset;
        let after_name = start + "<head".len();
        // skip <header> and friends
        match lower.as_bytes().get(after_name) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {
                let close = lower[after_name..].find('>')? + after_name + 1;
                let mut output = String::with_capacity(fragment.len() + extras.len());
                output.push_str(&fragment[..close]);
                output.push_str(extras);
                output.push_str(&fragment[close..]);
                return Some(output);
            }
            _ => search_from = after_name,
        }
    }
    None
}

pub fn loading_document() -> String {
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><p>Loading…</p></body></html>"
        .to_string()
}

pub fn error_document(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><h1>Error</h1><p>{}</p></body></html>",
        escape_text(message)
    )
}

pub fn escape_text(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(ch),
        }
    }
    output
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
