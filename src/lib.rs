// src/lib.rs

//! Year-partitioned crawler for paginated court-ruling and law listings.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod services;
pub mod storage;
pub mod utils;
