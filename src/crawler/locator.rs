//! Resume locator
//!
//! Finds the remote page that currently holds the last persisted record.
//! Page arithmetic alone breaks as soon as rows are inserted or removed
//! upstream between runs; looking the identifier up does not.

use crate::extract::Extractor;
use crate::navigator::Navigator;
use crate::session::SessionSupervisor;
use async_trait::async_trait;

/// Reads the identifiers shown on a page
#[async_trait]
pub trait PageProbe: Send {
    /// Identifiers on `page`, or `None` if the page could not be read
    async fn identifiers_on(&mut self, page: u32) -> Option<Vec<String>>;
}

/// Candidate pages in probe order: `est, est+1, est-1, est+2, est-2, ...`
///
/// Pages outside `1..=end_page` are left out and do not count towards
/// `limit`.
pub fn candidate_pages(estimated: u32, end_page: u32, limit: u32) -> Vec<u32> {
    let in_range = |page: i64| page >= 1 && page <= i64::from(end_page);
    let estimated = i64::from(estimated);
    let limit = limit as usize;

    let mut pages = Vec::with_capacity(limit);
    let mut offset: i64 = 0;
    while pages.len() < limit {
        let above = estimated + offset;
        let below = estimated - offset;
        if above > i64::from(end_page) && below < 1 {
            break;
        }
        if in_range(above) {
            pages.push(above as u32);
        }
        if offset > 0 && in_range(below) && pages.len() < limit {
            pages.push(below as u32);
        }
        offset += 1;
    }
    pages
}

/// Searches pages around an estimate for a known identifier
#[derive(Debug, Clone)]
pub struct ResumeLocator {
    probe_limit: u32,
    end_page: u32,
}

impl ResumeLocator {
    pub fn new(probe_limit: u32, end_page: u32) -> Self {
        Self {
            probe_limit,
            end_page,
        }
    }

    /// Returns the first candidate page holding `last_identifier`
    ///
    /// Matching is exact on the trimmed identifier. Pages that cannot be
    /// read are skipped.
    pub async fn find(
        &self,
        probe: &mut dyn PageProbe,
        last_identifier: &str,
        estimated_page: u32,
    ) -> Option<u32> {
        let wanted = last_identifier.trim();
        let candidates = candidate_pages(estimated_page, self.end_page, self.probe_limit);
        tracing::info!(
            "Locating last record {} around page {} ({} candidates)",
            wanted,
            estimated_page,
            candidates.len()
        );

        for page in candidates {
            match probe.identifiers_on(page).await {
                Some(ids) if ids.iter().any(|id| id.trim() == wanted) => {
                    tracing::info!("Found {} on page {}", wanted, page);
                    return Some(page);
                }
                Some(_) => tracing::debug!("{} not on page {}", wanted, page),
                None => tracing::debug!("Page {} could not be probed", page),
            }
        }

        tracing::warn!(
            "Last record {} not found within {} probes",
            wanted,
            self.probe_limit
        );
        None
    }
}

/// Probes pages through the active extractor
///
/// In interactive mode the view is navigated to each candidate first.
pub struct ExtractorProbe<'a> {
    pub extractor: &'a mut dyn Extractor,
    pub sessions: &'a mut SessionSupervisor,
    pub navigator: &'a Navigator,
}

#[async_trait]
impl<'a> PageProbe for ExtractorProbe<'a> {
    async fn identifiers_on(&mut self, page: u32) -> Option<Vec<String>> {
        if self.extractor.mode().needs_navigation() {
            if let Err(e) = self.navigator.navigate(self.sessions, page).await {
                tracing::warn!("Could not navigate to page {} while locating: {}", page, e);
                return None;
            }
        }

        match self.extractor.extract_page(self.sessions, page).await {
            Ok(extracted) => Some(
                extracted
                    .records
                    .iter()
                    .filter_map(|record| record.identifier().map(str::to_string))
                    .collect(),
            ),
            Err(e) => {
                tracing::debug!("Probe of page {} failed: {}", page, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeProbe {
        pages: HashMap<u32, Vec<String>>,
        broken: Vec<u32>,
        probed: Vec<u32>,
    }

    impl FakeProbe {
        fn new(pages: &[(u32, &[&str])]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(page, ids)| (*page, ids.iter().map(|s| s.to_string()).collect()))
                    .collect(),
                broken: Vec::new(),
                probed: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PageProbe for FakeProbe {
        async fn identifiers_on(&mut self, page: u32) -> Option<Vec<String>> {
            self.probed.push(page);
            if self.broken.contains(&page) {
                return None;
            }
            Some(self.pages.get(&page).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_candidate_order() {
        assert_eq!(candidate_pages(5, 100, 5), vec![5, 6, 4, 7, 3]);
    }

    #[test]
    fn test_candidates_stay_in_range() {
        assert_eq!(candidate_pages(1, 100, 4), vec![1, 2, 3, 4]);
        assert_eq!(candidate_pages(9, 10, 5), vec![9, 10, 8, 7, 6]);
        assert_eq!(candidate_pages(2, 3, 50), vec![2, 3, 1]);
    }

    #[test]
    fn test_candidates_estimate_past_end() {
        assert_eq!(candidate_pages(12, 10, 3), vec![10, 9, 8]);
    }

    #[tokio::test]
    async fn test_find_at_estimate() {
        let mut probe = FakeProbe::new(&[(1, &["REG-001", "REG-010"])]);
        let locator = ResumeLocator::new(50, 876);
        assert_eq!(locator.find(&mut probe, "REG-010", 1).await, Some(1));
        assert_eq!(probe.probed, vec![1]);
    }

    #[tokio::test]
    async fn test_find_after_upstream_shift() {
        let mut probe = FakeProbe::new(&[(3, &["A"]), (4, &["B"]), (2, &["C", " REG-077 "])]);
        let locator = ResumeLocator::new(50, 876);
        assert_eq!(locator.find(&mut probe, "REG-077", 3).await, Some(2));
        assert_eq!(probe.probed, vec![3, 4, 2]);
    }

    #[tokio::test]
    async fn test_find_is_case_sensitive() {
        let mut probe = FakeProbe::new(&[(1, &["reg-010"])]);
        let locator = ResumeLocator::new(3, 876);
        assert_eq!(locator.find(&mut probe, "REG-010", 1).await, None);
    }

    #[tokio::test]
    async fn test_find_gives_up_after_probe_limit() {
        let mut probe = FakeProbe::new(&[]);
        let locator = ResumeLocator::new(10, 876);
        assert_eq!(locator.find(&mut probe, "REG-404", 20).await, None);
        assert_eq!(probe.probed.len(), 10);
    }

    #[tokio::test]
    async fn test_find_skips_unreadable_pages() {
        let mut probe = FakeProbe::new(&[(5, &["X"]), (6, &["X"])]);
        probe.broken.push(5);
        let locator = ResumeLocator::new(50, 876);
        assert_eq!(locator.find(&mut probe, "X", 5).await, Some(6));
    }
}
