//! Content personalization and tracking instrumentation
//!
//! Pure string operations: substitution of recipient tokens and injection
//! of the tracking pixel. Nothing here can fail; a template without a
//! closing body tag simply gets the pixel appended.

use std::sync::OnceLock;

use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Renders recipient-specific content and tracking instrumentation
#[derive(Debug, Clone)]
pub struct Personalizer {
    /// Public base URL for tracking pixel and redirect links
    base_url: String,
}

impl Personalizer {
    /// Create a new personalizer
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// Replace the `{{name}}` and `{{firstName}}` placeholders.
    ///
    /// `{{firstName}}` is the first whitespace-delimited token of the name.
    /// An absent or empty name leaves the template untouched.
    pub fn render(&self, template: &str, recipient_name: Option<&str>) -> String {
        let name = match recipient_name {
            Some(name) if !name.is_empty() => name,
            _ => return template.to_string(),
        };

        let first_name = name.split_whitespace().next().unwrap_or(name);
        template
            .replace("{{name}}", name)
            .replace("{{firstName}}", first_name)
    }

    /// Insert the invisible 1x1 tracking pixel, immediately before the
    /// closing body tag when one exists, otherwise at the end
    pub fn inject_tracking_pixel(&self, content: &str, tracking_id: &str) -> String {
        let pixel_url = format!(
            "{}/api/v1/email/track/{}/pixel.png",
            self.base_url, tracking_id
        );
        let pixel = format!(
            "<img src=\"{}\" width=\"1\" height=\"1\" style=\"display:none;border:0;\" alt=\"\" />",
            pixel_url
        );

        match content.rfind("</body>") {
            Some(idx) => {
                let mut result = String::with_capacity(content.len() + pixel.len());
                result.push_str(&content[..idx]);
                result.push_str(&pixel);
                result.push_str(&content[idx..]);
                result
            }
            None => format!("{}{}", content, pixel),
        }
    }

    /// `List-Unsubscribe` header value keyed by the tracking identifier
    pub fn list_unsubscribe(&self, tracking_id: &str) -> String {
        format!("<{}/unsubscribe/{}>", self.base_url, tracking_id)
    }

    /// Strip markup for the plain-text alternative part
    pub fn html_to_plain_text(html: &str) -> String {
        tag_pattern().replace_all(html, "").trim().to_string()
    }
}
