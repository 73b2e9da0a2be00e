// ABOUTME: Splits raw handler output into outbound message fragments
// ABOUTME: Runs of three or more newlines separate messages; formats map to text, HTML, or code

use crate::traits::MessageContent;
use regex::Regex;
use std::sync::OnceLock;

/// How a fragment is presented in the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
    Code,
}

impl OutputFormat {
    /// Parse the value of a handler's `format` config key
    pub fn from_config(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "html" => Some(Self::Html),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Session-wide format flags from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub code: bool,
    pub html: bool,
}

impl FormatFlags {
    /// Priority: code flag, handler code, html flag, handler html, text
    pub fn resolve(self, configured: OutputFormat) -> OutputFormat {
        if self.code || configured == OutputFormat::Code {
            OutputFormat::Code
        } else if self.html || configured == OutputFormat::Html {
            OutputFormat::Html
        } else {
            OutputFormat::Text
        }
    }
}

/// One unit of output destined for exactly one send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFragment {
    pub text: String,
    pub format: OutputFormat,
}

impl OutboundFragment {
    pub fn new(text: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }

    /// Render for the transport
    pub fn to_content(&self) -> MessageContent {
        match self.format {
            OutputFormat::Text => MessageContent::plain(self.text.clone()),
            OutputFormat::Html => MessageContent::html(strip_tags(&self.text), self.text.clone()),
            OutputFormat::Code => MessageContent::html(
                self.text.clone(),
                format!("<pre><code>{}</code></pre>", escape_html(&self.text)),
            ),
        }
    }
}

fn group_separator() -> &'static Regex {
    static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();
    SEPARATOR_RE.get_or_init(|| Regex::new(r"\n{3,}").expect("separator regex must compile"))
}

fn tag() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"<[^<]+?>").expect("tag regex must compile"))
}

/// Trimmed, non-empty message groups of `raw`.
/// A single blank line stays inside a group; two or more blank lines split.
pub fn split_groups(raw: &str) -> Vec<&str> {
    group_separator()
        .split(raw)
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .collect()
}

/// Split handler output into fragments, all carrying `format`
pub fn split(raw: &str, format: OutputFormat) -> Vec<OutboundFragment> {
    split_groups(raw)
        .into_iter()
        .map(|group| OutboundFragment::new(group, format))
        .collect()
}

/// Escape text for inclusion inside an HTML element
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Plain-text fallback for an HTML body
pub fn strip_tags(html: &str) -> String {
    tag().replace_all(html, "").into_owned()
}
