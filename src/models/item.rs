//! Partition, item and listing data structures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical grouping key for output (a publication year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(pub i32);

impl Partition {
    pub fn year(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source-assigned identifier, unique across the whole corpus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named text field extracted from a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// One fully extracted record from a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Source identifier (ruling ID or law ID)
    pub id: ItemId,

    /// Year the item was listed under
    pub partition: Partition,

    /// Detail page URL
    pub url: String,

    /// Extracted fields, in extraction order
    pub fields: Vec<Field>,
}

impl Item {
    pub fn new(id: ItemId, partition: Partition, url: impl Into<String>) -> Self {
        Self {
            id,
            partition,
            url: url.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, keeping extraction order.
    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Builder-style variant of [`Item::push_field`].
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name, value);
        self
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Field value, or an empty string when absent.
    pub fn field_or_empty(&self, name: &str) -> &str {
        self.field(name).unwrap_or("")
    }
}

/// A link to a detail page found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLink {
    pub id: ItemId,
    pub url: String,
}

/// Parsed content of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Detail links, in page order
    pub item_links: Vec<ItemLink>,

    /// Every numeric page token found in the pagination controls
    pub page_numbers: Vec<u32>,
}

impl ListingPage {
    /// Largest advertised page number, defaulting to 1 when the page carries
    /// no pagination controls.
    pub fn max_page_number(&self) -> u32 {
        self.page_numbers.iter().copied().max().unwrap_or(1).max(1)
    }
}

/// A request for one listing page of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub partition: Partition,
    pub page_number: u32,
    pub url: String,
}
