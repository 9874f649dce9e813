//! Service layer for the crawler application.
//!
//! - HTML extraction for listing, detail and article pages (`Extractor`)
//! - Page fetching behind the `PageSource` trait (`HttpSource`)

mod extract;
mod source;

pub use extract::{DetailPage, Extractor};
pub use source::{HttpSource, PageSource};
