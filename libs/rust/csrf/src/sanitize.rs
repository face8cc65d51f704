//! HTML sanitization for server-provided markup.
//!
//! Callers run backend HTML (report fragments, payment gateway forms)
//! through a [`ResponseSanitizer`] before rendering or exporting it. The
//! token path never uses this module.

use ammonia::Builder;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use url::Url;

/// Tags removed by every policy, whatever it allows.
const FORBIDDEN_TAGS: &[&str] = &["script", "style", "object", "embed", "iframe"];

/// Sanitization failures for structured content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    /// Form action is not an absolute URL
    #[error("Invalid form action URL: {0}")]
    InvalidAction(String),

    /// Form action is not HTTPS
    #[error("Payment form action must use HTTPS: {0}")]
    InsecureAction(String),

    /// Form method other than GET or POST
    #[error("Invalid form method: {0}")]
    InvalidMethod(String),

    /// Markup has no form left after sanitization
    #[error("No form element found in payment response")]
    MissingForm,
}

/// Removes unsafe markup from HTML.
pub trait ResponseSanitizer: Send + Sync {
    /// Sanitized copy of `html`.
    fn sanitize(&self, html: &str) -> String;
}

/// Allow-list of tags and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizePolicy {
    tags: Vec<&'static str>,
    attributes: Vec<&'static str>,
}

impl SanitizePolicy {
    /// Formatting and headings with `class`/`id`.
    #[must_use]
    pub fn general() -> Self {
        Self {
            tags: vec![
                "b", "i", "em", "strong", "p", "br", "div", "span", "h1", "h2", "h3", "h4", "h5",
                "h6",
            ],
            attributes: vec!["class", "id"],
        }
    }

    /// Stricter set for report export; inline `style` only, no links or images.
    #[must_use]
    pub fn pdf() -> Self {
        Self {
            tags: vec!["b", "i", "strong", "p", "br", "div", "span", "h1", "h2", "h3"],
            attributes: vec!["style"],
        }
    }

    /// Form markup returned by a payment gateway.
    #[must_use]
    pub fn server_response() -> Self {
        Self {
            tags: vec!["form", "input", "button", "label", "div", "p"],
            attributes: vec!["type", "name", "value", "action", "method", "class", "id", "for"],
        }
    }

    /// Allowed tags after the global deny-list is applied.
    #[must_use]
    pub fn allowed_tags(&self) -> HashSet<&'static str> {
        self.tags
            .iter()
            .copied()
            .filter(|t| !FORBIDDEN_TAGS.contains(t))
            .collect()
    }

    /// Allowed attributes; event handlers are never allowed.
    #[must_use]
    pub fn allowed_attributes(&self) -> HashSet<&'static str> {
        self.attributes
            .iter()
            .copied()
            .filter(|a| !a.to_ascii_lowercase().starts_with("on"))
            .collect()
    }
}

/// [`ResponseSanitizer`] backed by ammonia.
#[derive(Debug, Clone)]
pub struct HtmlSanitizer {
    policy: SanitizePolicy,
}

impl HtmlSanitizer {
    /// Sanitizer enforcing `policy`.
    #[must_use]
    pub const fn new(policy: SanitizePolicy) -> Self {
        Self { policy }
    }

    /// Policy in use.
    #[must_use]
    pub const fn policy(&self) -> &SanitizePolicy {
        &self.policy
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new(SanitizePolicy::general())
    }
}

impl ResponseSanitizer for HtmlSanitizer {
    fn sanitize(&self, html: &str) -> String {
        Builder::default()
            .tags(self.policy.allowed_tags())
            .generic_attributes(self.policy.allowed_attributes())
            .tag_attributes(HashMap::new())
            .link_rel(None)
            .clean(html)
            .to_string()
    }
}

/// Escape text for insertion into HTML text or a quoted attribute.
#[must_use]
pub fn escape_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// Whether `name` may be used as an inline style property in exported
/// headers and footers.
#[must_use]
pub fn is_safe_style_property(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic() || c == '-')
}

/// Whether `value` stays inside a single declaration.
fn is_safe_style_value(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    !value.is_empty()
        && !value.contains([';', '{', '}', '\\'])
        && !lower.contains("url(")
        && !lower.contains("expression(")
}

fn style_attribute(styles: &[(&str, &str)]) -> String {
    let declarations: Vec<String> = styles
        .iter()
        .filter(|(name, value)| is_safe_style_property(name) && is_safe_style_value(value))
        .map(|(name, value)| format!("{name}: {value}"))
        .collect();
    if declarations.is_empty() {
        String::new()
    } else {
        format!(r#" style="{}""#, escape_html(&declarations.join("; ")))
    }
}

/// Header block for an exported report.
///
/// Title and subtitle are inserted as text. Empty ones are left out, and
/// style entries with an unsafe name or value are dropped.
#[must_use]
pub fn pdf_header(title: &str, subtitle: &str, styles: &[(&str, &str)]) -> String {
    let mut html = format!(r#"<div class="pdf-header"{}>"#, style_attribute(styles));
    if !title.is_empty() {
        html.push_str(&format!(r#"<h1 class="pdf-title">{}</h1>"#, escape_html(title)));
    }
    if !subtitle.is_empty() {
        html.push_str(&format!(r#"<p class="pdf-subtitle">{}</p>"#, escape_html(subtitle)));
    }
    html.push_str("</div>");
    html
}

/// Footer block for an exported report, with `content` inserted as text.
#[must_use]
pub fn pdf_footer(content: &str, styles: &[(&str, &str)]) -> String {
    format!(
        r#"<div class="pdf-footer"{}>{}</div>"#,
        style_attribute(styles),
        escape_html(content)
    )
}

/// HTTP method allowed on a payment form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// Validated target of a payment gateway form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    /// Where the form submits to, if it says
    pub action: Option<Url>,
    /// How it submits, if it says
    pub method: Option<FormMethod>,
}

impl PaymentForm {
    /// Check the `action` and `method` attributes of a gateway form.
    ///
    /// # Errors
    ///
    /// Fails for a non-HTTPS or unparsable action and for methods other
    /// than GET/POST.
    pub fn validate(action: Option<&str>, method: Option<&str>) -> Result<Self, SanitizeError> {
        let action = action
            .map(|raw| {
                let url = Url::parse(raw).map_err(|_| SanitizeError::InvalidAction(raw.to_string()))?;
                if url.scheme() == "https" {
                    Ok(url)
                } else {
                    Err(SanitizeError::InsecureAction(raw.to_string()))
                }
            })
            .transpose()?;

        let method = method
            .map(|raw| match raw.to_ascii_uppercase().as_str() {
                "GET" => Ok(FormMethod::Get),
                "POST" => Ok(FormMethod::Post),
                _ => Err(SanitizeError::InvalidMethod(raw.to_string())),
            })
            .transpose()?;

        Ok(Self { action, method })
    }

    /// Sanitize a gateway response and validate the first form in it.
    ///
    /// # Errors
    ///
    /// [`SanitizeError::MissingForm`] when no form survives sanitization,
    /// otherwise the errors of [`PaymentForm::validate`].
    pub fn from_response(html: &str) -> Result<SanitizedForm, SanitizeError> {
        let markup = HtmlSanitizer::new(SanitizePolicy::server_response()).sanitize(html);
        let attributes = first_form_attributes(&markup).ok_or(SanitizeError::MissingForm)?;
        let lookup = |wanted: &str| {
            attributes
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(_, value)| value.as_str())
        };
        let form = Self::validate(lookup("action"), lookup("method"))?;
        Ok(SanitizedForm { form, markup })
    }
}

/// Gateway markup that passed sanitization along with its validated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedForm {
    /// Validated action and method of the first form
    pub form: PaymentForm,
    /// Sanitized markup, safe to render
    pub markup: String,
}

/// Attributes of the first `<form>` open tag in serializer output, where
/// every value is double quoted.
fn first_form_attributes(markup: &str) -> Option<Vec<(String, String)>> {
    let start = markup
        .match_indices("<form")
        .map(|(i, _)| i + "<form".len())
        .find(|&i| matches!(markup.as_bytes().get(i), Some(b' ' | b'>')))?;

    let mut attributes = Vec::new();
    let mut rest = &markup[start..];
    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with('>') {
            return Some(attributes);
        }
        let name_end = rest.find(['=', ' ', '>']).unwrap_or(rest.len());
        if name_end == 0 {
            return Some(attributes);
        }
        let name = rest[..name_end].to_ascii_lowercase();
        rest = &rest[name_end..];
        let value = match rest.strip_prefix("=\"") {
            Some(quoted) => {
                let end = quoted.find('"')?;
                rest = &quoted[end + 1..];
                html_escape::decode_html_entities(&quoted[..end]).into_owned()
            }
            None => String::new(),
        };
        attributes.push((name, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_strips_scripts_and_handlers() {
        let sanitizer = HtmlSanitizer::default();
        let clean = sanitizer.sanitize(r#"<p class="note" onclick="steal()">hi</p><script>alert(1)</script>"#);
        assert_eq!(clean, r#"<p class="note">hi</p>"#);
    }

    #[test]
    fn test_general_drops_forms() {
        let sanitizer = HtmlSanitizer::default();
        let clean = sanitizer.sanitize(r#"<form action="https://evil"><input name="x"></form>ok"#);
        assert!(!clean.contains("form"));
        assert!(!clean.contains("input"));
        assert!(clean.contains("ok"));
    }

    #[test]
    fn test_pdf_keeps_style_only() {
        let sanitizer = HtmlSanitizer::new(SanitizePolicy::pdf());
        let clean = sanitizer.sanitize(
            r#"<div style="color:red" class="c">t</div><a href="https://x">link</a><img src="x.png">"#,
        );
        assert_eq!(clean, r#"<div style="color:red">t</div>link"#);
    }

    #[test]
    fn test_server_response_keeps_form_controls() {
        let sanitizer = HtmlSanitizer::new(SanitizePolicy::server_response());
        let clean = sanitizer.sanitize(
            r#"<form action="https://pay.example.com/checkout" method="post" onsubmit="x()"><input type="hidden" name="order_id" value="42"></form>"#,
        );
        assert!(clean.contains(r#"method="post""#));
        assert!(clean.contains(r#"name="order_id""#));
        assert!(!clean.contains("onsubmit"));
    }

    #[test]
    fn test_policies_never_allow_forbidden_items() {
        for policy in [
            SanitizePolicy::general(),
            SanitizePolicy::pdf(),
            SanitizePolicy::server_response(),
        ] {
            let tags = policy.allowed_tags();
            assert!(FORBIDDEN_TAGS.iter().all(|t| !tags.contains(t)));
            assert!(policy.allowed_attributes().iter().all(|a| !a.starts_with("on")));
        }
    }

    #[test]
    fn test_escape_html() {
        let escaped = escape_html(r#"<b>"Tom" & 'Jerry'</b>"#);
        assert!(!escaped.contains(['<', '>', '"', '\'']));
        assert!(escaped.starts_with("&lt;b&gt;&quot;Tom&quot; &amp; "));
        assert!(escaped.ends_with("&lt;/b&gt;"));
        assert_eq!(escape_html("plain text"), "plain text");
        assert_eq!(escape_html(""), "");
    }

    #[test]
    fn test_pdf_header_escapes_text_and_filters_styles() {
        let html = pdf_header(
            "Service <Report>",
            "Q3 & Q4",
            &[
                ("color", "#333"),
                ("font-size", "12px"),
                ("background:url(x)", "red"),
                ("border", "1px; background-image: url(evil)"),
            ],
        );
        assert_eq!(
            html,
            r#"<div class="pdf-header" style="color: #333; font-size: 12px"><h1 class="pdf-title">Service &lt;Report&gt;</h1><p class="pdf-subtitle">Q3 &amp; Q4</p></div>"#
        );
    }

    #[test]
    fn test_pdf_header_omits_empty_parts() {
        assert_eq!(
            pdf_header("Invoice", "", &[]),
            r#"<div class="pdf-header"><h1 class="pdf-title">Invoice</h1></div>"#
        );
        assert_eq!(pdf_header("", "", &[]), r#"<div class="pdf-header"></div>"#);
    }

    #[test]
    fn test_pdf_footer() {
        assert_eq!(
            pdf_footer("Page 1 <script>", &[("text-align", "center")]),
            r#"<div class="pdf-footer" style="text-align: center">Page 1 &lt;script&gt;</div>"#
        );
    }

    #[test]
    fn test_first_form_attributes() {
        let attributes =
            first_form_attributes(r#"<div><form action="https://a.example/?x=1&amp;y=2" method="post"><input name="a"></form></div>"#)
                .unwrap();
        assert_eq!(
            attributes,
            vec![
                ("action".to_string(), "https://a.example/?x=1&y=2".to_string()),
                ("method".to_string(), "post".to_string()),
            ]
        );
        assert_eq!(first_form_attributes("<formula>x</formula>"), None);
        assert_eq!(first_form_attributes("<form>"), Some(vec![]));
    }

    #[test]
    fn test_style_property_names() {
        assert!(is_safe_style_property("font-size"));
        assert!(is_safe_style_property("color"));
        assert!(!is_safe_style_property(""));
        assert!(!is_safe_style_property("background:url(x)"));
        assert!(!is_safe_style_property("width;"));
    }

    #[test]
    fn test_payment_form_validation() {
        let form = PaymentForm::validate(Some("https://pay.example.com/checkout"), Some("post")).unwrap();
        assert_eq!(form.method, Some(FormMethod::Post));
        assert_eq!(form.action.unwrap().host_str(), Some("pay.example.com"));

        assert_eq!(
            PaymentForm::validate(Some("http://pay.example.com"), None),
            Err(SanitizeError::InsecureAction("http://pay.example.com".to_string()))
        );
        assert_eq!(
            PaymentForm::validate(Some("/relative"), None),
            Err(SanitizeError::InvalidAction("/relative".to_string()))
        );
        assert_eq!(
            PaymentForm::validate(None, Some("PUT")),
            Err(SanitizeError::InvalidMethod("PUT".to_string()))
        );
        assert_eq!(
            PaymentForm::validate(None, None),
            Ok(PaymentForm { action: None, method: None })
        );
    }
}
