//! Selector cascade configuration.
//!
//! Target sites vary in markup convention (MediaWiki skins, Fandom-style
//! wikis, generic CMS themes), so every extracted field is backed by an
//! ordered list of selector candidates tried in priority order — the
//! first candidate with a non-empty match wins. The built-in default is
//! wiki-oriented; a per-site profile can be loaded from JSON to retarget
//! the engine without touching code.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Ordered selector lists for every extracted field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorCascade {
    /// Title candidates, most specific first.
    pub title: Vec<String>,
    /// Main content container candidates.
    pub content_containers: Vec<String>,
    /// Block-level text elements collected inside the container.
    pub content_blocks: String,
    /// Ancestor classes that disqualify a block, heading, or row
    /// (navigation chrome and infoboxes are not article text).
    pub excluded_ancestor_classes: Vec<String>,
    /// Info-box container selector group.
    pub infobox_containers: String,
    /// Key cell selector within an info-box row.
    pub infobox_keys: String,
    /// Value cell selector within an info-box row.
    pub infobox_values: String,
    /// Section titles dropped as boilerplate (case-insensitive exact).
    pub boilerplate_sections: Vec<String>,
    /// Table classes excluded from table extraction.
    pub table_excluded_classes: Vec<String>,
    /// Substrings marking an image as UI chrome rather than content.
    pub image_noise_markers: Vec<String>,
    /// Anchor selector group for internal link extraction.
    pub link_selectors: String,
    /// Href substrings excluded from link extraction (special namespaces).
    pub link_excluded_markers: Vec<String>,
}

impl Default for SelectorCascade {
    fn default() -> Self {
        Self {
            title: vec![
                "h1.page-header__title".into(),
                ".mw-page-title-main".into(),
                "h1.firstHeading".into(),
                "#firstHeading".into(),
                "h1".into(),
                ".page-title".into(),
            ],
            content_containers: vec![
                ".mw-parser-output".into(),
                ".page-content".into(),
                ".wiki-content".into(),
                ".content".into(),
                "#mw-content-text".into(),
            ],
            content_blocks: "p, ul, ol, dl".into(),
            excluded_ancestor_classes: vec!["navbox".into(), "infobox".into()],
            infobox_containers: ".infobox, .info-box, .data-box".into(),
            infobox_keys: "th, .label".into(),
            infobox_values: "td, .value".into(),
            boilerplate_sections: vec![
                "references".into(),
                "external links".into(),
                "see also".into(),
                "notes".into(),
            ],
            table_excluded_classes: vec!["navbox".into(), "metadata".into()],
            image_noise_markers: vec!["logo".into(), "icon".into(), "ui-".into()],
            link_selectors: r#"a[href*="/wiki/"], a[href^="/"], a[href*="wiki"]"#.into(),
            link_excluded_markers: vec!["Special:".into(), "File:".into()],
        }
    }
}

impl SelectorCascade {
    /// Load a per-site profile. Unspecified fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid selector cascade JSON")
    }
}
