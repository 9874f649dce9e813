// src/services/extract.rs

//! HTML extraction for listing and detail pages.
//!
//! Every function here is synchronous: `scraper::Html` is not `Send`, so a
//! document is parsed, queried and dropped before any await point.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{
    ArticlesProfile, Extract, FieldSelector, Item, ItemId, ItemLink, ListingPage, Partition,
    SourceProfile,
};
use crate::utils::normalize_whitespace;

/// A parsed detail page plus the follow-up articles request, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub item: Item,
    pub articles_url: Option<String>,
}

struct CompiledField {
    def: FieldSelector,
    selector: Selector,
}

struct CompiledArticles {
    profile: ArticlesProfile,
    section: Regex,
    cells: Selector,
}

/// Compiled selectors and patterns for one source profile.
pub struct Extractor {
    profile: SourceProfile,
    anchors: Selector,
    pagination: Selector,
    item_link: Regex,
    page_number: Regex,
    fields: Vec<CompiledField>,
    articles: Option<CompiledArticles>,
}

impl Extractor {
    /// Compile a profile, failing on any invalid selector or pattern.
    pub fn new(profile: SourceProfile) -> Result<Self> {
        let fields = profile
            .fields
            .iter()
            .map(|def| {
                Ok(CompiledField {
                    selector: parse_selector(&def.selector)?,
                    def: def.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let articles = profile
            .articles
            .as_ref()
            .map(|a| {
                Ok::<_, AppError>(CompiledArticles {
                    section: parse_regex(&a.section_pattern)?,
                    cells: parse_selector(&a.cell_selector)?,
                    profile: a.clone(),
                })
            })
            .transpose()?;

        Ok(Self {
            anchors: parse_selector("a[href]")?,
            pagination: parse_selector(&profile.pagination_selector)?,
            item_link: parse_regex(&profile.item_link_pattern)?,
            page_number: parse_regex(&profile.page_number_pattern)?,
            fields,
            articles,
            profile,
        })
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    /// Extract item links and pagination page numbers from a listing page.
    pub fn parse_listing(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);

        let mut seen = HashSet::new();
        let mut item_links = Vec::new();
        for anchor in document.select(&self.anchors) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(id) = self.item_link.captures(href).and_then(|c| c.get(1)) else {
                continue;
            };
            let id = id.as_str();
            if seen.insert(id.to_string()) {
                item_links.push(ItemLink {
                    id: ItemId::new(id),
                    url: self.profile.detail_url(id),
                });
            }
        }

        let page_numbers = document
            .select(&self.pagination)
            .filter_map(|link| self.page_number_of(&link))
            .collect();

        ListingPage {
            item_links,
            page_numbers,
        }
    }

    /// Numeric page token of one pagination control. Tokens such as
    /// "Next" or "..." yield nothing.
    fn page_number_of(&self, link: &ElementRef<'_>) -> Option<u32> {
        let text: String = link.text().collect();
        if let Ok(n) = text.trim().parse::<u32>() {
            return Some(n);
        }
        let href = link.value().attr("href")?;
        self.page_number
            .captures(href)?
            .get(1)?
            .as_str()
            .parse()
            .ok()
    }

    /// Extract the configured fields from a detail page.
    pub fn parse_detail(
        &self,
        html: &str,
        url: &str,
        id: &ItemId,
        partition: Partition,
    ) -> Result<DetailPage> {
        let document = Html::parse_document(html);
        let mut item = Item::new(id.clone(), partition, url);

        for field in &self.fields {
            let value = extract_value(&document, &field.selector, field.def.extract);
            if value.is_empty() && field.def.required {
                return Err(AppError::parse(
                    url,
                    format!("missing required field '{}'", field.def.name),
                ));
            }
            item.push_field(field.def.name.clone(), value);
        }

        let articles_url = self.articles.as_ref().and_then(|articles| {
            document
                .select(&self.anchors)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| articles.section.captures(href)?.get(1))
                .map(|section| articles.profile.url(section.as_str(), id.as_str()))
        });

        Ok(DetailPage { item, articles_url })
    }

    /// Collect the article cells of an articles page.
    pub fn parse_articles(&self, html: &str) -> String {
        let Some(articles) = &self.articles else {
            return String::new();
        };
        let document = Html::parse_document(html);
        document
            .select(&articles.cells)
            .map(|cell| cell.html())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn extract_value(document: &Html, selector: &Selector, extract: Extract) -> String {
    match extract {
        Extract::Text => document
            .select(selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default(),
        Extract::AllText => normalize_whitespace(
            &document
                .select(selector)
                .map(|el| el.text().collect::<String>())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Extract::Html => document
            .select(selector)
            .map(|el| el.html())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string(),
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn parse_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::config(format!("invalid pattern '{pattern}': {e}")))
}
