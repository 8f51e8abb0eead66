//! Decoding of MediaWiki API responses.
//!
//! The API answers in two JSON dialects: formatversion 1 wraps HTML and
//! content in `{"*": ...}` objects, keys pages by id and marks flags with an
//! empty string, while formatversion 2 uses plain strings, arrays and
//! booleans. Every function here accepts both and never fails on shape: an
//! absent or mistyped node reads as `None`.

use serde_json::Value;

use crate::error::PreviewError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub display_title: Option<String>,
    pub body_html: Option<String>,
    pub head_html: Option<String>,
    pub categories_html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Rendered(ParseResult),
    ApiError { code: String, info: String },
    Missing { title: String, reason: Option<String> },
    Interwiki { title: String, interwiki: String },
}

impl ParseOutcome {
    pub fn into_result(self) -> Result<ParseResult, PreviewError> {
        match self {
            Self::Rendered(result) => Ok(result),
            Self::ApiError { code, info } => Err(PreviewError::Api { code, info }),
            Self::Missing { title, reason } => Err(PreviewError::MissingPage { title, reason }),
            Self::Interwiki { title, interwiki } => {
                Err(PreviewError::Interwiki { title, interwiki })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    pub title: String,
    pub content: String,
    pub revision_id: Option<i64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Found(PageSource),
    ApiError { code: String, info: String },
    Missing { title: String, reason: Option<String> },
    Interwiki { title: String, interwiki: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReceipt {
    pub title: String,
    pub new_revision_id: Option<i64>,
    pub no_change: bool,
}

enum Failure {
    Api { code: String, info: String },
    Interwiki { title: String, interwiki: String },
    Missing { title: String, reason: Option<String> },
}

/// Decode an `action=parse` response.
pub fn decode_parse(raw: &Value) -> ParseOutcome {
    if let Some(failure) = detect_failure(raw) {
        return match failure {
            Failure::Api { code, info } => ParseOutcome::ApiError { code, info },
            Failure::Interwiki { title, interwiki } => ParseOutcome::Interwiki { title, interwiki },
            Failure::Missing { title, reason } => ParseOutcome::Missing { title, reason },
        };
    }

    let parse = raw.get("parse");
    let field = |name: &str| parse.and_then(|node| node.get(name)).and_then(payload);
    ParseOutcome::Rendered(ParseResult {
        display_title: field("displaytitle"),
        body_html: field("text"),
        head_html: field("headhtml"),
        categories_html: field("categorieshtml"),
    })
}

/// Decode an `action=query&prop=revisions` response for a single title.
pub fn decode_source(raw: &Value) -> SourceOutcome {
    if let Some(failure) = detect_failure(raw) {
        return match failure {
            Failure::Api { code, info } => SourceOutcome::ApiError { code, info },
            Failure::Interwiki { title, interwiki } => SourceOutcome::Interwiki { title, interwiki },
            Failure::Missing { title, reason } => SourceOutcome::Missing { title, reason },
        };
    }

    let Some(page) = query_pages(raw).into_iter().next() else {
        return SourceOutcome::Missing {
            title: String::new(),
            reason: Some("no page in response".to_string()),
        };
    };
    let title = string_at(page, "title").unwrap_or_default();
    let revision = page
        .get("revisions")
        .and_then(Value::as_array)
        .and_then(|revisions| revisions.first());
    let content = revision.and_then(revision_content);

    match (revision, content) {
        (Some(revision), Some(content)) => SourceOutcome::Found(PageSource {
            title,
            content,
            revision_id: revision.get("revid").and_then(Value::as_i64),
            timestamp: string_at(revision, "timestamp"),
        }),
        _ => SourceOutcome::Missing {
            title,
            reason: None,
        },
    }
}

/// Decode an `action=edit` response.
pub fn decode_edit(title: &str, raw: &Value) -> Result<EditReceipt, PreviewError> {
    if let Some((code, info)) = api_error(raw) {
        return Err(PreviewError::Api { code, info });
    }
    let edit = raw.get("edit");
    let result = edit.and_then(|edit| string_at(edit, "result"));
    if result.as_deref() != Some("Success") {
        return Err(PreviewError::EditFailed {
            title: title.to_string(),
            result: result.unwrap_or_else(|| "unknown".to_string()),
        });
    }
    Ok(EditReceipt {
        title: edit
            .and_then(|edit| string_at(edit, "title"))
            .unwrap_or_else(|| title.to_string()),
        new_revision_id: edit
            .and_then(|edit| edit.get("newrevid"))
            .and_then(Value::as_i64),
        no_change: edit.is_some_and(|edit| flag(edit, "nochange")),
    })
}

fn detect_failure(raw: &Value) -> Option<Failure> {
    if let Some((code, info)) = api_error(raw) {
        return Some(Failure::Api { code, info });
    }

    let interwiki = raw
        .get("query")
        .and_then(|query| query.get("interwiki"))
        .or_else(|| raw.get("parse").and_then(|parse| parse.get("interwiki")))
        .and_then(first_entry);
    if let Some(entry) = interwiki {
        return Some(Failure::Interwiki {
            title: string_at(entry, "title").unwrap_or_default(),
            interwiki: string_at(entry, "iw").unwrap_or_default(),
        });
    }

    let candidates = query_pages(raw)
        .into_iter()
        .chain(raw.get("parse").filter(|node| node.is_object()));
    for page in candidates {
        if flag(page, "missing") || flag(page, "invalid") {
            return Some(Failure::Missing {
                title: string_at(page, "title").unwrap_or_default(),
                reason: string_at(page, "invalidreason"),
            });
        }
    }
    None
}

fn api_error(raw: &Value) -> Option<(String, String)> {
    let error = raw.get("error")?;
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .or_else(|| error.get("*").and_then(Value::as_str))
        .unwrap_or("unknown info")
        .to_string();
    Some((code, info))
}

fn query_pages(raw: &Value) -> Vec<&Value> {
    match raw.get("query").and_then(|query| query.get("pages")) {
        Some(Value::Array(pages)) => pages.iter().collect(),
        Some(Value::Object(pages)) => pages.values().collect(),
        _ => Vec::new(),
    }
}

fn first_entry(node: &Value) -> Option<&Value> {
    match node {
        Value::Array(items) => items.first(),
        Value::Object(map) if map.contains_key("title") => Some(node),
        Value::Object(map) => map.values().next(),
        _ => None,
    }
}

fn revision_content(revision: &Value) -> Option<String> {
    revision
        .get("slots")
        .and_then(|slots| slots.get("main"))
        .and_then(|main| main.get("content").or_else(|| main.get("*")))
        .or_else(|| revision.get("*"))
        .or_else(|| revision.get("content"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// A string payload in either dialect: `"..."` or `{"*": "..."}`.
fn payload(node: &Value) -> Option<String> {
    match node {
        Value::String(value) => Some(value.clone()),
        Value::Object(map) => map.get("*").and_then(Value::as_str).map(ToString::to_string),
        _ => None,
    }
}

fn string_at(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(ToString::to_string)
}

/// Formatversion 2 flags are booleans; formatversion 1 marks them with a
/// present (usually empty) string.
fn flag(node: &Value, key: &str) -> bool {
    match node.get(key) {
        Some(Value::Bool(value)) => *value,
        Some(Value::String(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn api_error_takes_precedence_over_payload() {
        let raw = json!({
            "error": {"code": "missingtitle", "info": "The page you specified doesn't exist."},
            "parse": {"text": "<p>stale</p>", "displaytitle": "Stale"}
        });
        assert_eq!(
            decode_parse(&raw),
            ParseOutcome::ApiError {
                code: "missingtitle".to_string(),
                info: "The page you specified doesn't exist.".to_string(),
            }
        );
    }

    #[test]
    fn api_error_defaults_code_and_info() {
        let raw = json!({"error": {}});
        assert_eq!(
            decode_parse(&raw),
            ParseOutcome::ApiError {
                code: "unknown_error".to_string(),
                info: "unknown info".to_string(),
            }
        );
        let legacy = json!({"error": {"code": "x", "*": "legacy info"}});
        assert!(matches!(
            decode_parse(&legacy),
            ParseOutcome::ApiError { info, .. } if info == "legacy info"
        ));
    }

    #[test]
    fn decodes_formatversion_one_payloads() {
        let raw = json!({
            "parse": {
                "title": "Hi",
                "displaytitle": "Hi",
                "text": {"*": "<p>Hi</p>"},
                "categorieshtml": {"*": "<div id=\"catlinks\"></div>"},
                "headhtml": {"*": "<!DOCTYPE html><html><head></head><body>"}
            }
        });
        let ParseOutcome::Rendered(result) = decode_parse(&raw) else {
            panic!("expected rendered outcome");
        };
        assert_eq!(result.body_html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(result.display_title.as_deref(), Some("Hi"));
        assert_eq!(
            result.categories_html.as_deref(),
            Some("<div id=\"catlinks\"></div>")
        );
        assert!(result.head_html.is_some());
    }

    #[test]
    fn decodes_formatversion_two_payloads() {
        let raw = json!({
            "parse": {"title": "A", "displaytitle": "<i>A</i>", "text": "<p>a</p>"}
        });
        assert_eq!(
            decode_parse(&raw),
            ParseOutcome::Rendered(ParseResult {
                display_title: Some("<i>A</i>".to_string()),
                body_html: Some("<p>a</p>".to_string()),
                head_html: None,
                categories_html: None,
            })
        );
    }

    #[test]
    fn missing_fields_degrade_to_none() {
        for raw in [
            json!({}),
            json!(null),
            json!([1, 2, 3]),
            json!({"parse": null}),
            json!({"parse": "text"}),
            json!({"parse": {"text": 42, "displaytitle": ["x"], "headhtml": {"html": "?"}}}),
            json!({"query": {"pages": "nope", "interwiki": 7}}),
        ] {
            assert_eq!(
                decode_parse(&raw),
                ParseOutcome::Rendered(ParseResult::default()),
                "shape: {raw}"
            );
        }
    }

    #[test]
    fn missing_page_reports_title() {
        let raw = json!({"query": {"pages": [{"ns": 0, "title": "Foo", "missing": true}]}});
        assert_eq!(
            decode_parse(&raw),
            ParseOutcome::Missing {
                title: "Foo".to_string(),
                reason: None,
            }
        );

        let fv1 = json!({"query": {"pages": {"-1": {"ns": 0, "title": "Foo", "missing": ""}}}});
        assert!(matches!(
            decode_parse(&fv1),
            ParseOutcome::Missing { title, .. } if title == "Foo"
        ));
    }

    #[test]
    fn missing_flag_on_parse_node() {
        let raw = json!({"parse": {"title": "Foo", "missing": true, "text": "<p>x</p>"}});
        assert!(matches!(
            decode_parse(&raw),
            ParseOutcome::Missing { title, reason: None } if title == "Foo"
        ));
    }

    #[test]
    fn invalid_page_carries_reason() {
        let raw = json!({"query": {"pages": [{
            "title": "A|B",
            "invalid": true,
            "invalidreason": "The requested page title contains invalid characters: \"|\"."
        }]}});
        let ParseOutcome::Missing { title, reason } = decode_parse(&raw) else {
            panic!("expected missing outcome");
        };
        assert_eq!(title, "A|B");
        assert!(reason.expect("reason").contains("invalid characters"));
    }

    #[test]
    fn interwiki_target_is_soft_failure() {
        let raw = json!({"query": {"interwiki": [{"title": "wikt:hello", "iw": "wikt"}]}});
        assert_eq!(
            decode_parse(&raw),
            ParseOutcome::Interwiki {
                title: "wikt:hello".to_string(),
                interwiki: "wikt".to_string(),
            }
        );

        let fv1 = json!({"query": {"interwiki": {"0": {"title": "m:Foo", "iw": "m"}}}});
        assert!(matches!(
            decode_parse(&fv1),
            ParseOutcome::Interwiki { interwiki, .. } if interwiki == "m"
        ));
    }

    #[test]
    fn into_result_maps_variants() {
        let missing = ParseOutcome::Missing {
            title: "Foo".to_string(),
            reason: None,
        };
        assert!(missing.into_result().expect_err("missing").is_warning());
        let rendered = ParseOutcome::Rendered(ParseResult::default());
        assert_eq!(rendered.into_result(), Ok(ParseResult::default()));
    }

    #[test]
    fn source_reads_main_slot() {
        let raw = json!({"query": {"pages": [{
            "pageid": 12,
            "ns": 0,
            "title": "Alpha",
            "revisions": [{
                "revid": 345,
                "timestamp": "2026-01-02T03:04:05Z",
                "slots": {"main": {"contentmodel": "wikitext", "content": "== Alpha =="}}
            }]
        }]}});
        assert_eq!(
            decode_source(&raw),
            SourceOutcome::Found(PageSource {
                title: "Alpha".to_string(),
                content: "== Alpha ==".to_string(),
                revision_id: Some(345),
                timestamp: Some("2026-01-02T03:04:05Z".to_string()),
            })
        );
    }

    #[test]
    fn source_reads_legacy_star_content() {
        let raw = json!({"query": {"pages": {"7": {
            "title": "Beta",
            "revisions": [{"revid": 9, "*": "beta body"}]
        }}}});
        let SourceOutcome::Found(page) = decode_source(&raw) else {
            panic!("expected found outcome");
        };
        assert_eq!(page.content, "beta body");
        assert_eq!(page.revision_id, Some(9));
    }

    #[test]
    fn source_without_revisions_is_missing() {
        let raw = json!({"query": {"pages": [{"title": "Gamma"}]}});
        assert!(matches!(
            decode_source(&raw),
            SourceOutcome::Missing { title, .. } if title == "Gamma"
        ));
        assert!(matches!(
            decode_source(&json!({})),
            SourceOutcome::Missing { .. }
        ));
    }

    #[test]
    fn source_detects_missing_and_interwiki() {
        let missing = json!({"query": {"pages": [{"title": "Foo", "missing": true}]}});
        assert!(matches!(
            decode_source(&missing),
            SourceOutcome::Missing { title, .. } if title == "Foo"
        ));
        let interwiki = json!({"query": {"interwiki": [{"title": "w:Foo", "iw": "w"}]}});
        assert!(matches!(
            decode_source(&interwiki),
            SourceOutcome::Interwiki { .. }
        ));
    }

    #[test]
    fn edit_success_and_failure() {
        let ok = json!({"edit": {"result": "Success", "title": "Alpha", "newrevid": 77}});
        assert_eq!(
            decode_edit("Alpha", &ok),
            Ok(EditReceipt {
                title: "Alpha".to_string(),
                new_revision_id: Some(77),
                no_change: false,
            })
        );

        let unchanged = json!({"edit": {"result": "Success", "nochange": ""}});
        assert!(decode_edit("Alpha", &unchanged).expect("edit").no_change);

        let failed = json!({"edit": {"result": "Failure"}});
        assert_eq!(
            decode_edit("Alpha", &failed),
            Err(PreviewError::EditFailed {
                title: "Alpha".to_string(),
                result: "Failure".to_string(),
            })
        );

        let error = json!({"error": {"code": "protectedpage", "info": "This page has been protected."}});
        assert!(matches!(
            decode_edit("Alpha", &error),
            Err(PreviewError::Api { code, .. }) if code == "protectedpage"
        ));
    }
}
