//! HTML document template.
//!
//! A template is an HTML file with markers the renderer fills in:
//!
//! - `<!--vellum:head-->`: title, head fragments, resource hints, styles
//! - `<!--vellum:body-->`: rendered body, hydration state, client scripts
//! - `{{ html_attrs }}` / `{{ body_attrs }}`: attributes of `<html>` and `<body>`
//! - `<!--vellum:NAME-->`: output of the directive registered as `NAME`

use std::path::Path;

use tracing::warn;

use vellum_core::error::AppError;
use vellum_core::result::AppResult;

/// Marker replaced by head content.
pub const HEAD_MARKER: &str = "<!--vellum:head-->";
/// Marker replaced by body content.
pub const BODY_MARKER: &str = "<!--vellum:body-->";
/// Placeholder for `<html>` attributes.
pub const HTML_ATTRS: &str = "{{ html_attrs }}";
/// Placeholder for `<body>` attributes.
pub const BODY_ATTRS: &str = "{{ body_attrs }}";

const DIRECTIVE_OPEN: &str = "<!--vellum:";
const DIRECTIVE_CLOSE: &str = "-->";

/// Template used when the build ships none.
pub const DEFAULT_TEMPLATE: &str = "<!DOCTYPE html>\n\
<html{{ html_attrs }}>\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n\
<!--vellum:head-->\n\
</head>\n\
<body{{ body_attrs }}><!--vellum:body--></body>\n\
</html>\n";

/// Parsed template, split around the body marker so rendered markup is
/// never scanned for markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    before_body: String,
    after_body: String,
}

impl HtmlTemplate {
    /// Parses a template. It must contain the head and body markers once.
    pub fn parse(source: &str) -> AppResult<Self> {
        for marker in [HEAD_MARKER, BODY_MARKER] {
            match source.matches(marker).count() {
                1 => {}
                0 => {
                    return Err(AppError::configuration(format!(
                        "HTML template is missing the {marker} marker"
                    )));
                }
                n => {
                    return Err(AppError::configuration(format!(
                        "HTML template contains the {marker} marker {n} times"
                    )));
                }
            }
        }

        let (before_body, after_body) = source
            .split_once(BODY_MARKER)
            .ok_or_else(|| AppError::configuration("HTML template has no body marker"))?;

        if !before_body.contains(HEAD_MARKER) {
            return Err(AppError::configuration(
                "HTML template head marker must precede the body marker",
            ));
        }

        Ok(Self {
            before_body: before_body.to_string(),
            after_body: after_body.to_string(),
        })
    }

    /// Reads a template from disk, falling back to [`DEFAULT_TEMPLATE`].
    pub async fn load_or_default(path: &Path) -> Self {
        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(source) => Self::parse(&source),
            Err(e) => Err(e.into()),
        };

        loaded.unwrap_or_else(|e| {
            warn!(
                path = %path.display(),
                error = %e,
                "HTML template unavailable, using the built-in template"
            );
            Self::default()
        })
    }

    /// Assembles a document.
    ///
    /// `directive` is asked for every `<!--vellum:NAME-->` marker other than
    /// head and body; `None` leaves the marker in place.
    pub fn render<F>(&self, parts: &DocumentParts<'_>, mut directive: F) -> String
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut lookup = |name: &str| match name {
            "head" | "body" => None,
            _ => directive(name),
        };
        let before = apply_directives(&self.before_body, &mut lookup)
            .replace(HTML_ATTRS, parts.html_attrs)
            .replace(BODY_ATTRS, parts.body_attrs)
            .replacen(HEAD_MARKER, parts.head, 1);
        let after = apply_directives(&self.after_body, &mut lookup)
            .replace(HTML_ATTRS, parts.html_attrs)
            .replace(BODY_ATTRS, parts.body_attrs);

        let mut html = String::with_capacity(before.len() + parts.body.len() + after.len());
        html.push_str(&before);
        html.push_str(parts.body);
        html.push_str(&after);
        html
    }
}

impl Default for HtmlTemplate {
    fn default() -> Self {
        let (before_body, after_body) = DEFAULT_TEMPLATE
            .split_once(BODY_MARKER)
            .unwrap_or((DEFAULT_TEMPLATE, ""));
        Self {
            before_body: before_body.to_string(),
            after_body: after_body.to_string(),
        }
    }
}

/// Pieces of markup placed into a template.
#[derive(Debug, Default)]
pub struct DocumentParts<'a> {
    /// Rendered `<html>` attributes, with leading space.
    pub html_attrs: &'a str,
    /// Rendered `<body>` attributes, with leading space.
    pub body_attrs: &'a str,
    /// Content of the head marker.
    pub head: &'a str,
    /// Content of the body marker.
    pub body: &'a str,
}

fn apply_directives<F>(source: &str, directive: &mut F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find(DIRECTIVE_OPEN) {
        let name_start = start + DIRECTIVE_OPEN.len();
        let Some(len) = rest[name_start..].find(DIRECTIVE_CLOSE) else {
            break;
        };
        let name = &rest[name_start..name_start + len];
        let end = name_start + len + DIRECTIVE_CLOSE.len();

        out.push_str(&rest[..start]);
        match directive(name.trim()) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    out.push_str(rest);
    out
}

/// Escapes text for HTML content and attribute values.
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

/// Renders `key="value"` pairs with a leading space each.
pub fn render_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", escape_html(key), escape_html(value)))
        .collect()
}

/// Makes serialized JSON safe to embed in a `<script>` element.
pub fn escape_script_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}
