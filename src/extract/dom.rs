//! Extraction from the rendered table

use crate::config::SiteConfig;
use crate::extract::{ExtractError, ExtractedPage, Extractor};
use crate::session::{SessionError, SessionSupervisor};
use crate::state::{normalize_text, Mode, Record};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

/// Class DataTables puts on the placeholder cell of an empty table
const EMPTY_PLACEHOLDER_CLASS: &str = "dataTables_empty";

/// Parsed selectors for the table, its rows and their cells
#[derive(Debug, Clone)]
pub struct TableSelectors {
    table: Selector,
    row: Selector,
    cell: Selector,
    table_source: String,
}

impl TableSelectors {
    /// Parses the selectors from the site configuration
    pub fn from_config(site: &SiteConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            table: parse_selector(&site.table_selector)?,
            row: parse_selector(&site.row_selector)?,
            cell: parse_selector(&site.cell_selector)?,
            table_source: site.table_selector.clone(),
        })
    }

    /// The table selector as written in the configuration
    pub fn table_selector(&self) -> &str {
        &self.table_source
    }

    /// Extracts records from a full page of HTML
    ///
    /// Returns `None` when the table itself is absent. Rows without cells
    /// and the empty-table placeholder row are dropped.
    pub fn parse_rows(&self, html: &str) -> Option<Vec<Record>> {
        let document = Html::parse_document(html);
        document.select(&self.table).next()?;

        let records = document
            .select(&self.row)
            .filter_map(|row| self.row_to_record(row))
            .collect();
        Some(records)
    }

    fn row_to_record(&self, row: ElementRef<'_>) -> Option<Record> {
        let cells: Vec<ElementRef<'_>> = row.select(&self.cell).collect();
        if cells.is_empty() {
            return None;
        }
        let placeholder = cells.iter().any(|cell| {
            cell.value()
                .classes()
                .any(|class| class == EMPTY_PLACEHOLDER_CLASS)
        });
        if placeholder {
            return None;
        }

        let texts = cells
            .iter()
            .map(|cell| normalize_text(&cell.text().collect::<String>()));
        Some(Record::from_cells(texts))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector)
        .map_err(|e| ExtractError::Malformed(format!("invalid selector '{}': {:?}", selector, e)))
}

/// Reads the rows the live view currently shows
pub struct DomExtractor {
    selectors: TableSelectors,
    wait_timeout: Duration,
}

impl DomExtractor {
    pub fn new(selectors: TableSelectors, wait_timeout: Duration) -> Self {
        Self {
            selectors,
            wait_timeout,
        }
    }
}

#[async_trait]
impl Extractor for DomExtractor {
    fn mode(&self) -> Mode {
        Mode::Interactive
    }

    async fn extract_page(
        &mut self,
        sessions: &mut SessionSupervisor,
        page: u32,
    ) -> Result<ExtractedPage, ExtractError> {
        let session = sessions
            .current()
            .ok_or_else(|| SessionError::Lost("no active session".to_string()))?;

        if !session
            .wait_for(self.selectors.table_selector(), self.wait_timeout)
            .await?
        {
            tracing::debug!(
                "Table did not appear within {:?} on page {}",
                self.wait_timeout,
                page
            );
        }

        // Read even after a timed-out wait; the content decides
        let html = session.content().await?;
        let records = self
            .selectors
            .parse_rows(&html)
            .ok_or(ExtractError::MissingTable { page })?;

        tracing::trace!("Page {}: {} rows in DOM", page, records.len());
        Ok(ExtractedPage::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::session::{MemoryFactory, MemoryTable};

    fn selectors() -> TableSelectors {
        TableSelectors::from_config(&SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_rows_normalizes_cells() {
        let html = r#"
            <table class="dataTable"><tbody>
              <tr><td>  Paracetamol
                 500mg </td><td>Paracetamol</td><td>Tablet</td><td>Drugs</td>
                  <td> A4-1234 </td><td>Emzor</td><td>Emzor Ltd</td><td>2021-03-04</td></tr>
            </tbody></table>"#;

        let records = selectors().parse_rows(html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_name(), "Paracetamol 500mg");
        assert_eq!(records[0].identifier(), Some("A4-1234"));
        assert_eq!(records[0].field(7), Some("2021-03-04"));
    }

    #[test]
    fn test_parse_rows_drops_cellless_and_placeholder_rows() {
        let html = r#"
            <table class="dataTable"><tbody>
              <tr></tr>
              <tr><td class="dataTables_empty" colspan="8">No data available in table</td></tr>
              <tr><td>Only</td><td>three</td><td>cells</td></tr>
            </tbody></table>"#;

        let records = selectors().parse_rows(html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field(2), Some("cells"));
        assert_eq!(records[0].field(3), Some(""));
        assert_eq!(records[0].identifier(), None);
    }

    #[test]
    fn test_parse_rows_missing_table() {
        assert!(selectors().parse_rows("<html><body><p>Loading</p></body></html>").is_none());
    }

    #[tokio::test]
    async fn test_extract_from_memory_view() {
        let rows = vec![
            Record::from_cells(vec!["A", "a", "d", "c", "REG-1", "ap", "m", "2020"]),
            Record::from_cells(vec!["B", "a", "d", "c", "REG-2", "ap", "m", "2020"]),
        ];
        let table = MemoryTable::new(vec![rows.clone()]);
        let mut sessions =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table)), RetryConfig::new(3, 1));
        sessions.acquire().await.unwrap();

        let mut extractor = DomExtractor::new(selectors(), Duration::from_millis(10));
        let page = extractor.extract_page(&mut sessions, 1).await.unwrap();
        assert_eq!(page.records, rows);
        assert!(!page.exhausted);
    }

    #[tokio::test]
    async fn test_extract_reports_missing_table() {
        let table = MemoryTable::new(vec![vec![Record::from_cells(vec!["A"])]]);
        table.hide_table_on(1, 1);
        let mut sessions = SessionSupervisor::new(
            Box::new(MemoryFactory::new(table.clone())),
            RetryConfig::new(3, 1),
        );
        sessions.acquire().await.unwrap();

        let mut extractor = DomExtractor::new(selectors(), Duration::from_millis(10));
        let err = extractor.extract_page(&mut sessions, 1).await.unwrap_err();
        assert!(matches!(err, ExtractError::MissingTable { page: 1 }));

        // The table is back on the next read
        assert_eq!(extractor.extract_page(&mut sessions, 1).await.unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_without_session() {
        let table = MemoryTable::new(vec![]);
        let mut sessions =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table)), RetryConfig::new(3, 1));
        let mut extractor = DomExtractor::new(selectors(), Duration::from_millis(10));
        let err = extractor.extract_page(&mut sessions, 1).await.unwrap_err();
        assert!(err.is_session_lost());
    }
}
