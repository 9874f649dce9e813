//! Partition enumeration: one first listing request per partition.

use std::collections::HashSet;

use crate::models::{ListingRequest, Partition, SourceProfile};

/// Listing request for one page of a partition.
pub fn listing_request(profile: &SourceProfile, partition: Partition, page_number: u32) -> ListingRequest {
    ListingRequest {
        partition,
        page_number,
        url: profile.listing_url(partition.year(), page_number),
    }
}

/// First listing request per partition, in input order. Repeated
/// partitions are enumerated once.
pub fn first_requests(profile: &SourceProfile, partitions: &[Partition]) -> Vec<ListingRequest> {
    let mut seen = HashSet::new();
    partitions
        .iter()
        .filter(|p| seen.insert(**p))
        .map(|p| listing_request(profile, *p, 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn test_first_requests_start_at_page_one() {
        let profile = SourceProfile::for_kind(SourceKind::Rulings);
        let requests = first_requests(&profile, &[Partition(2021), Partition(2020), Partition(2021)]);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].partition, Partition(2021));
        assert!(requests.iter().all(|r| r.page_number == 1));
        assert!(requests[1].url.contains("year=2020"));
    }

    #[test]
    fn test_no_partitions_no_requests() {
        let profile = SourceProfile::for_kind(SourceKind::Laws);
        assert!(first_requests(&profile, &[]).is_empty());
    }
}
