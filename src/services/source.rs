// src/services/source.rs

//! Page sources: where listing and detail pages come from.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::models::{CrawlerConfig, Item, ItemLink, ListingPage, ListingRequest, Partition, SourceProfile};
use crate::services::extract::Extractor;
use crate::utils::http::{create_async_client, fetch_text};

/// Fetches and parses pages for the pagination walker.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one listing page and extract its item links and page numbers.
    async fn fetch_listing(&self, request: &ListingRequest) -> Result<ListingPage>;

    /// Fetch one detail page (plus any follow-up pages) into an item.
    async fn fetch_detail(&self, link: &ItemLink, partition: Partition) -> Result<Item>;
}

/// Live HTTP source backed by `reqwest`.
pub struct HttpSource {
    client: Client,
    extractor: Extractor,
}

impl HttpSource {
    pub fn new(crawler: &CrawlerConfig, profile: SourceProfile) -> Result<Self> {
        Ok(Self {
            client: create_async_client(crawler)?,
            extractor: Extractor::new(profile)?,
        })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch_listing(&self, request: &ListingRequest) -> Result<ListingPage> {
        let html = fetch_text(&self.client, &request.url).await?;
        Ok(self.extractor.parse_listing(&html))
    }

    async fn fetch_detail(&self, link: &ItemLink, partition: Partition) -> Result<Item> {
        let html = fetch_text(&self.client, &link.url).await?;
        let detail = self
            .extractor
            .parse_detail(&html, &link.url, &link.id, partition)?;
        let mut item = detail.item;

        if self.extractor.profile().articles.is_some() {
            let articles = match detail.articles_url {
                Some(url) => {
                    log::debug!("Fetching articles for {}: {}", link.id, url);
                    let html = fetch_text(&self.client, &url).await?;
                    self.extractor.parse_articles(&html)
                }
                None => String::new(),
            };
            item.push_field("articles", articles);
        }
        Ok(item)
    }
}
