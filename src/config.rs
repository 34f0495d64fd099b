//! Configuration types and defaults for the highlighter

use serde::{Deserialize, Serialize};

use crate::error::Result;

// =============================================================================
// Defaults
// =============================================================================

/// Class carried by every highlight element
pub const HIGHLIGHT_CLASS: &str = "custom-dictionary-highlighted";

/// Class carried by every tooltip element
pub const TOOLTIP_CLASS: &str = "custom-dictionary-tooltip";

/// Pre-rendered code blocks (Confluence) are never rewritten
pub const SYNTAX_HIGHLIGHTER_CLASS: &str = "syntaxhighlighter-pre";

/// Subtrees that are never entered or mutated.
///
/// Inspired by findAndReplaceDOMText's ignore list.
pub const IGNORED_TAGS: &[&str] = &[
    // Source elements
    "SCRIPT", "LINK", "STYLE", "NOSCRIPT",
    // Media elements
    "IMG", "VIDEO", "AUDIO", "CANVAS", "SVG", "MAP", "OBJECT",
    // Input elements
    "INPUT", "SELECT", "OPTION", "OPTGROUP", "TEXTAREA",
    // Special elements
    "IFRAME", "#comment",
];

fn default_debounce_ms() -> u32 { 300 }
fn default_highlight_class() -> String { HIGHLIGHT_CLASS.to_string() }
fn default_tooltip_class() -> String { TOOLTIP_CLASS.to_string() }
fn default_highlight_tag() -> String { "abbr".to_string() }
fn default_ignored_tags() -> Vec<String> { IGNORED_TAGS.iter().map(|t| t.to_string()).collect() }
fn default_skip_classes() -> Vec<String> { vec![SYNTAX_HIGHLIGHTER_CLASS.to_string()] }
fn default_tooltip_lift() -> f64 { 1.25 }

// =============================================================================
// HighlighterConfig
// =============================================================================

/// Tunables for rendering and mutation handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlighterConfig {
    /// Quiet period before a burst of page mutations is rescanned. Default: 300
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    #[serde(default = "default_highlight_class")]
    pub highlight_class: String,
    #[serde(default = "default_tooltip_class")]
    pub tooltip_class: String,
    /// Element used to wrap a matched term. Default: "abbr"
    #[serde(default = "default_highlight_tag")]
    pub highlight_tag: String,
    /// Upper-case node names that are never entered
    #[serde(default = "default_ignored_tags")]
    pub ignored_tags: Vec<String>,
    /// Extra site-specific classes that are never entered
    #[serde(default = "default_skip_classes")]
    pub skip_classes: Vec<String>,
    /// Tooltip is raised by this fraction of its own height. Default: 1.25
    #[serde(default = "default_tooltip_lift")]
    pub tooltip_lift: f64,
}

impl Default for HighlighterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            highlight_class: default_highlight_class(),
            tooltip_class: default_tooltip_class(),
            highlight_tag: default_highlight_tag(),
            ignored_tags: default_ignored_tags(),
            skip_classes: default_skip_classes(),
            tooltip_lift: default_tooltip_lift(),
        }
    }
}

impl HighlighterConfig {
    /// Parse a (possibly partial) JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether a node name is on the exclusion list
    pub fn is_ignored_tag(&self, node_name: &str) -> bool {
        self.ignored_tags.iter().any(|t| t.eq_ignore_ascii_case(node_name))
    }

    /// Class attribute for a highlight in the given style
    pub fn highlight_class_name(&self, style: &str) -> String {
        if style.is_empty() {
            self.highlight_class.clone()
        } else {
            format!("{} {}", self.highlight_class, style)
        }
    }
}
