// src/config.rs

//! Configuration loading utilities.
//!
//! Partitions come from the `[partitions]` section, a JSON years file of
//! the form `{"years": [2019, 2020]}`, or a `--years` override.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Config, Partition, PartitionConfig};

#[derive(Debug, Deserialize)]
struct YearsFile {
    years: Vec<i32>,
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        log::warn!("Config file {} not found; using defaults", path.display());
        Ok(Config::default())
    }
}

/// Read a `{"years": [...]}` file.
pub fn load_years_file(path: &Path) -> Result<Vec<i32>> {
    let content = std::fs::read_to_string(path)?;
    let file: YearsFile = serde_json::from_str(&content)?;
    Ok(file.years)
}

/// Parse a comma-separated year list such as `2019,2020`.
pub fn parse_years(list: &str) -> Result<Vec<i32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|e| AppError::config(format!("invalid year '{s}': {e}")))
        })
        .collect()
}

/// Resolve the partitions to crawl: configured years first, then the
/// years file, each year once.
pub fn load_partitions(config: &PartitionConfig) -> Result<Vec<Partition>> {
    let mut years = config.years.clone();
    if let Some(path) = &config.years_file {
        years.extend(load_years_file(path)?);
    }

    let mut seen = HashSet::new();
    let partitions: Vec<Partition> = years
        .into_iter()
        .filter(|y| seen.insert(*y))
        .map(Partition)
        .collect();

    if partitions.is_empty() {
        return Err(AppError::config("no partitions to crawl"));
    }
    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_years_file_merged_after_config_years() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("years.json");
        std::fs::write(&path, r#"{"years": [2020, 2018]}"#).unwrap();

        let config = PartitionConfig {
            years: vec![2019, 2020],
            years_file: Some(path),
        };
        let partitions = load_partitions(&config).unwrap();
        assert_eq!(partitions, vec![Partition(2019), Partition(2020), Partition(2018)]);
    }

    #[test]
    fn test_missing_years_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let config = PartitionConfig {
            years: Vec::new(),
            years_file: Some(tmp.path().join("missing.json")),
        };
        assert!(load_partitions(&config).is_err());
    }

    #[test]
    fn test_no_years_is_error() {
        assert!(load_partitions(&PartitionConfig::default()).is_err());
    }

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("2019, 2020,").unwrap(), vec![2019, 2020]);
        assert!(parse_years("2019,abc").is_err());
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.output.file_prefix, Config::default().output.file_prefix);
    }
}
