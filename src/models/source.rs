// src/models/source.rs

//! Source profiles: URL templates and CSS selectors for one record source.

use serde::{Deserialize, Serialize};

/// Which kind of record the source publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Court rulings (`ViewRulePage.aspx?ID=`)
    #[default]
    Rulings,
    /// Laws with optional article follow-up pages (`Law.aspx?lawId=`)
    Laws,
}

impl SourceKind {
    /// Short name used for file prefixes and log lines.
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Rulings => "rulings",
            SourceKind::Laws => "laws",
        }
    }
}

/// How a field's value is taken from the matched elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extract {
    /// Text of the first match
    #[default]
    Text,
    /// Text of every match, space-joined
    AllText,
    /// Outer HTML of every match, space-joined
    Html,
}

/// Selector for one named field on a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,
    #[serde(default)]
    pub extract: Extract,
    /// A missing required field drops the item
    #[serde(default)]
    pub required: bool,
}

impl FieldSelector {
    fn new(name: &str, selector: &str, extract: Extract, required: bool) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            extract,
            required,
        }
    }
}

/// Follow-up request that collects a law's articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlesProfile {
    /// Regex over detail-page hrefs; capture 1 is the section id
    pub section_pattern: String,
    /// URL template with `{section}` and `{id}`
    pub url: String,
    /// Selector for article cells on the articles page
    pub cell_selector: String,
}

/// Fully resolved description of a record source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub kind: SourceKind,
    /// Listing URL template with `{year}` and `{page}`
    pub listing_url: String,
    /// Detail URL template with `{id}`
    pub detail_url: String,
    /// Regex over listing hrefs; capture 1 is the item id
    pub item_link_pattern: String,
    /// Selector for pagination-control links
    pub pagination_selector: String,
    /// Regex over pagination hrefs when the link text is not numeric
    pub page_number_pattern: String,
    pub fields: Vec<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articles: Option<ArticlesProfile>,
}

const DEFAULT_BASE: &str = "http://77.42.251.205/";
const PAGINATION_SELECTOR: &str = "tr.pager a, .pagination a, a[href*='Page$']";
const PAGE_NUMBER_PATTERN: &str = r"(?:Page\$|[?&]page=)(\d+)";

impl SourceProfile {
    /// Built-in profile for a source kind.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Rulings => Self::rulings(),
            SourceKind::Laws => Self::laws(),
        }
    }

    fn rulings() -> Self {
        Self {
            kind: SourceKind::Rulings,
            listing_url: format!(
                "{DEFAULT_BASE}AdvancedRulingSearch.aspx?year={{year}}&judjes=&page={{page}}"
            ),
            detail_url: format!("{DEFAULT_BASE}ViewRulePage.aspx?ID={{id}}&selection="),
            item_link_pattern: r"ViewRulePage\.aspx\?ID=(\d+)&selection=".to_string(),
            pagination_selector: PAGINATION_SELECTOR.to_string(),
            page_number_pattern: PAGE_NUMBER_PATTERN.to_string(),
            fields: vec![
                FieldSelector::new("court", "#MainContent_lblcourtName", Extract::Text, true),
                FieldSelector::new("number", "#MainContent_lblNumber", Extract::Text, true),
                FieldSelector::new("date", "#MainContent_lblDate", Extract::Text, false),
                FieldSelector::new("president", "#MainContent_lblJudge", Extract::Text, false),
                FieldSelector::new("members", "#MainContent_lblMembers", Extract::Text, false),
                FieldSelector::new("full_text", "#MainContent_RulingText", Extract::Html, false),
            ],
            articles: None,
        }
    }

    fn laws() -> Self {
        Self {
            kind: SourceKind::Laws,
            listing_url: format!(
                "{DEFAULT_BASE}AdvancedLawSearch.aspx?year={{year}}&articleNumber=&page={{page}}"
            ),
            detail_url: format!("{DEFAULT_BASE}Law.aspx?lawId={{id}}"),
            item_link_pattern: r"Law\.aspx\?lawId=(\d+)".to_string(),
            pagination_selector: PAGINATION_SELECTOR.to_string(),
            page_number_pattern: PAGE_NUMBER_PATTERN.to_string(),
            fields: vec![
                FieldSelector::new("subdetails", "#MainContent_subdetails", Extract::Text, true),
                FieldSelector::new(
                    "publish_date",
                    "#MainContent_divOJPublishDate",
                    Extract::Text,
                    false,
                ),
                FieldSelector::new("page_number", "#MainContent_divOJPage", Extract::Text, false),
                FieldSelector::new("notes", "#MainContent_divNotes span", Extract::AllText, false),
            ],
            articles: Some(ArticlesProfile {
                section_pattern: r"LawTreeSectionID=(\d+)".to_string(),
                url: format!(
                    "{DEFAULT_BASE}LawArticles.aspx?LawTreeSectionID={{section}}&LawID={{id}}&language=ar"
                ),
                cell_selector: "td.ArticleText".to_string(),
            }),
        }
    }

    /// Listing URL for one page of a partition.
    pub fn listing_url(&self, year: i32, page: u32) -> String {
        self.listing_url
            .replace("{year}", &year.to_string())
            .replace("{page}", &page.to_string())
    }

    /// Detail URL for an item id.
    pub fn detail_url(&self, id: &str) -> String {
        self.detail_url.replace("{id}", id)
    }
}

impl ArticlesProfile {
    pub fn url(&self, section: &str, id: &str) -> String {
        self.url.replace("{section}", section).replace("{id}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_url_substitution() {
        let profile = SourceProfile::for_kind(SourceKind::Rulings);
        let url = profile.listing_url(2020, 3);
        assert!(url.contains("year=2020"));
        assert!(url.contains("page=3"));
        assert!(!url.contains('{'));
    }

    #[test]
    fn test_detail_url_substitution() {
        let profile = SourceProfile::for_kind(SourceKind::Laws);
        assert!(profile.detail_url("555").ends_with("Law.aspx?lawId=555"));
    }

    #[test]
    fn test_only_laws_follow_articles() {
        assert!(SourceProfile::for_kind(SourceKind::Rulings).articles.is_none());
        let laws = SourceProfile::for_kind(SourceKind::Laws);
        let articles = laws.articles.unwrap();
        assert_eq!(
            articles.url("9", "555"),
            "http://77.42.251.205/LawArticles.aspx?LawTreeSectionID=9&LawID=555&language=ar"
        );
    }

    #[test]
    fn test_kind_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: SourceKind,
        }
        let w: Wrapper = toml::from_str("kind = \"laws\"").unwrap();
        assert_eq!(w.kind, SourceKind::Laws);
    }
}
