//! In-process table view
//!
//! `MemorySession` renders a DataTables-like page from rows held in memory,
//! with the same pagination bar the live site shows. It lets the whole
//! engine run without a browser, and it can be told to misbehave (hidden
//! table, lost session, frozen pager, dialogs) to exercise recovery paths.

use crate::session::{Session, SessionCookie, SessionError, SessionFactory, SessionResult};
use crate::state::Record;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct TableInner {
    pages: Vec<Vec<Record>>,
    jump_supported: bool,
    frozen: bool,
    ajax_endpoint: Option<String>,
    cookies: Vec<SessionCookie>,
    hidden_table: HashMap<u32, u32>,
    lose_session: HashSet<u32>,
    dialog_jumps: u32,
    failing_launches: u32,
    sessions_created: u32,
    reloads: u32,
    page_reads: HashMap<u32, u32>,
}

impl TableInner {
    fn page_count(&self) -> u32 {
        (self.pages.len() as u32).max(1)
    }
}

/// Shared dataset and behaviour switches behind every `MemorySession`
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Mutex<TableInner>>,
}

impl MemoryTable {
    /// Creates a table with one entry per page; the paging API is enabled
    pub fn new(pages: Vec<Vec<Record>>) -> Self {
        let inner = TableInner {
            pages,
            jump_supported: true,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enables or disables the scripted paging API
    pub fn with_jump_api(self, supported: bool) -> Self {
        self.lock().jump_supported = supported;
        self
    }

    /// Advertises a backend endpoint through the table configuration
    pub fn with_ajax_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.lock().ajax_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_cookies(self, cookies: Vec<SessionCookie>) -> Self {
        self.lock().cookies = cookies;
        self
    }

    /// Replaces the dataset, e.g. to simulate rows inserted upstream
    pub fn set_pages(&self, pages: Vec<Vec<Record>>) {
        self.lock().pages = pages;
    }

    /// Renders `page` without its table for the next `times` reads
    pub fn hide_table_on(&self, page: u32, times: u32) {
        self.lock().hidden_table.insert(page, times);
    }

    /// Kills the session the first time `page` is read
    pub fn lose_session_on(&self, page: u32) {
        self.lock().lose_session.insert(page);
    }

    /// Makes the next `count` paging API calls raise a native dialog
    pub fn dialog_on_jumps(&self, count: u32) {
        self.lock().dialog_jumps = count;
    }

    /// When frozen, paging calls are accepted but the view never moves
    pub fn freeze_navigation(&self, frozen: bool) {
        self.lock().frozen = frozen;
    }

    /// Makes the next `count` session launches fail
    pub fn fail_launches(&self, count: u32) {
        self.lock().failing_launches = count;
    }

    pub fn page_count(&self) -> u32 {
        self.lock().page_count()
    }

    pub fn sessions_created(&self) -> u32 {
        self.lock().sessions_created
    }

    pub fn reloads(&self) -> u32 {
        self.lock().reloads
    }

    /// How many times the content of `page` was read
    pub fn page_reads(&self, page: u32) -> u32 {
        self.lock().page_reads.get(&page).copied().unwrap_or(0)
    }

    /// Rows of a page as the backend would return them
    pub fn rows(&self, page: u32) -> Vec<Record> {
        let inner = self.lock();
        page.checked_sub(1)
            .and_then(|index| inner.pages.get(index as usize))
            .cloned()
            .unwrap_or_default()
    }
}

/// A simulated view over a [`MemoryTable`]
#[derive(Debug)]
pub struct MemorySession {
    table: MemoryTable,
    current: u32,
    alive: bool,
}

impl MemorySession {
    pub fn new(table: MemoryTable) -> Self {
        Self {
            table,
            current: 1,
            alive: true,
        }
    }

    fn ensure_alive(&self) -> SessionResult<()> {
        if self.alive {
            Ok(())
        } else {
            Err(SessionError::Lost("invalid session id".to_string()))
        }
    }

    fn controls(&self, page_count: u32) -> Vec<u32> {
        // First, last and the neighbours of the current page, like DataTables' simple_numbers
        let mut pages: Vec<u32> = [1, self.current.saturating_sub(1), self.current + 1, page_count]
            .into_iter()
            .filter(|&p| p >= 1 && p <= page_count && p != self.current)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    fn render(&self, inner: &TableInner, with_table: bool) -> String {
        let mut html = String::from("<html><head><title>Greenbook</title></head><body>");

        if with_table {
            html.push_str("<table class=\"dataTable\"><thead><tr>");
            for name in crate::state::HEADER {
                html.push_str(&format!("<th>{}</th>", escape(name)));
            }
            html.push_str("</tr></thead><tbody>");

            let rows = (self.current as usize)
                .checked_sub(1)
                .and_then(|index| inner.pages.get(index));
            match rows {
                Some(rows) if !rows.is_empty() => {
                    for record in rows {
                        html.push_str("<tr>");
                        for field in record.fields() {
                            html.push_str(&format!("<td>{}</td>", escape(field)));
                        }
                        html.push_str("</tr>");
                    }
                }
                _ => html.push_str(
                    "<tr class=\"odd\"><td valign=\"top\" colspan=\"8\" class=\"dataTables_empty\">No data available in table</td></tr>",
                ),
            }
            html.push_str("</tbody></table>");
        }

        let page_count = inner.page_count();
        html.push_str("<ul class=\"pagination\">");
        let prev_class = if self.current > 1 { "" } else { " disabled" };
        html.push_str(&format!(
            "<li class=\"page-item previous{}\"><a class=\"page-link\">Previous</a></li>",
            prev_class
        ));
        for page in 1..=page_count {
            let active = if page == self.current { " active" } else { "" };
            html.push_str(&format!(
                "<li class=\"page-item{}\"><a class=\"page-link\">{}</a></li>",
                active, page
            ));
        }
        let next_class = if self.current < page_count { "" } else { " disabled" };
        html.push_str(&format!(
            "<li class=\"page-item next{}\"><a class=\"page-link\">Next</a></li>",
            next_class
        ));
        html.push_str("</ul></body></html>");
        html
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn content(&mut self) -> SessionResult<String> {
        self.ensure_alive()?;
        let mut inner = self.table.lock();

        if inner.lose_session.remove(&self.current) {
            self.alive = false;
            return Err(SessionError::Lost(
                "invalid session id: session deleted because of page crash".to_string(),
            ));
        }

        *inner.page_reads.entry(self.current).or_insert(0) += 1;

        let hidden = match inner.hidden_table.get_mut(&self.current) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        Ok(self.render(&inner, !hidden))
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> SessionResult<bool> {
        self.ensure_alive()?;
        let selector = Selector::parse(selector)
            .map_err(|e| SessionError::Script(format!("invalid selector {}: {:?}", selector, e)))?;
        let html = {
            let inner = self.table.lock();
            let hidden = inner
                .hidden_table
                .get(&self.current)
                .is_some_and(|remaining| *remaining > 0);
            self.render(&inner, !hidden)
        };
        let document = Html::parse_document(&html);
        let found = document.select(&selector).next().is_some();
        Ok(found)
    }

    async fn active_page(&mut self) -> SessionResult<Option<u32>> {
        self.ensure_alive()?;
        Ok(Some(self.current))
    }

    async fn jump_to(&mut self, page_index: u32) -> SessionResult<bool> {
        self.ensure_alive()?;
        let mut inner = self.table.lock();
        if !inner.jump_supported {
            return Ok(false);
        }
        if inner.dialog_jumps > 0 {
            inner.dialog_jumps -= 1;
            return Err(SessionError::Dialog(
                "unexpected alert open: Session about to expire".to_string(),
            ));
        }
        let target = page_index + 1;
        if !inner.frozen && target <= inner.page_count() {
            self.current = target;
        }
        Ok(true)
    }

    async fn page_controls(&mut self) -> SessionResult<Vec<u32>> {
        self.ensure_alive()?;
        let page_count = self.table.lock().page_count();
        Ok(self.controls(page_count))
    }

    async fn click_page_control(&mut self, page: u32) -> SessionResult<()> {
        self.ensure_alive()?;
        let inner = self.table.lock();
        if !self.controls(inner.page_count()).contains(&page) {
            return Err(SessionError::Script(format!(
                "no clickable control for page {}",
                page
            )));
        }
        if !inner.frozen {
            self.current = page;
        }
        Ok(())
    }

    async fn has_next(&mut self) -> SessionResult<bool> {
        self.ensure_alive()?;
        Ok(self.current < self.table.lock().page_count())
    }

    async fn click_next(&mut self) -> SessionResult<bool> {
        self.ensure_alive()?;
        let inner = self.table.lock();
        if self.current >= inner.page_count() {
            return Ok(false);
        }
        if !inner.frozen {
            self.current += 1;
        }
        Ok(true)
    }

    async fn reload(&mut self) -> SessionResult<()> {
        self.ensure_alive()?;
        self.table.lock().reloads += 1;
        self.current = 1;
        Ok(())
    }

    async fn dismiss_dialog(&mut self) -> SessionResult<()> {
        self.ensure_alive()
    }

    async fn ajax_endpoint(&mut self) -> SessionResult<Option<String>> {
        self.ensure_alive()?;
        Ok(self.table.lock().ajax_endpoint.clone())
    }

    async fn cookies(&mut self) -> SessionResult<Vec<SessionCookie>> {
        self.ensure_alive()?;
        Ok(self.table.lock().cookies.clone())
    }

    async fn user_agent(&mut self) -> SessionResult<Option<String>> {
        self.ensure_alive()?;
        Ok(Some("greenbook-harvest memory view".to_string()))
    }

    async fn close(&mut self) {
        self.alive = false;
    }
}

/// Launches `MemorySession`s over a shared table
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    table: MemoryTable,
}

impl MemoryFactory {
    pub fn new(table: MemoryTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl SessionFactory for MemoryFactory {
    async fn create(&self) -> SessionResult<Box<dyn Session>> {
        {
            let mut inner = self.table.lock();
            if inner.failing_launches > 0 {
                inner.failing_launches -= 1;
                return Err(SessionError::Launch("simulated launch failure".to_string()));
            }
            inner.sessions_created += 1;
        }
        Ok(Box::new(MemorySession::new(self.table.clone())))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(count: u32) -> Vec<Vec<Record>> {
        (1..=count)
            .map(|p| vec![Record::from_cells(vec!["p".to_string(), format!("page {}", p)])])
            .collect()
    }

    #[tokio::test]
    async fn test_controls_follow_current_page() {
        let mut session = MemorySession::new(MemoryTable::new(pages(10)));
        assert_eq!(session.page_controls().await.unwrap(), vec![2, 10]);

        session.jump_to(4).await.unwrap();
        assert_eq!(session.active_page().await.unwrap(), Some(5));
        assert_eq!(session.page_controls().await.unwrap(), vec![1, 4, 6, 10]);
    }

    #[tokio::test]
    async fn test_next_stops_on_last_page() {
        let mut session = MemorySession::new(MemoryTable::new(pages(2)));
        assert!(session.has_next().await.unwrap());
        assert!(session.click_next().await.unwrap());
        assert!(!session.has_next().await.unwrap());
        assert!(!session.click_next().await.unwrap());
        assert_eq!(session.active_page().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_hidden_table_recovers() {
        let table = MemoryTable::new(pages(1));
        table.hide_table_on(1, 1);
        let mut session = MemorySession::new(table.clone());

        assert!(!session.content().await.unwrap().contains("dataTable"));
        assert!(session.content().await.unwrap().contains("dataTable"));
        assert_eq!(table.page_reads(1), 2);
    }

    #[tokio::test]
    async fn test_lost_session_stays_lost() {
        let table = MemoryTable::new(pages(1));
        table.lose_session_on(1);
        let mut session = MemorySession::new(table);

        assert!(session.content().await.unwrap_err().is_lost());
        assert!(!session.is_alive().await);
        assert!(session.active_page().await.unwrap_err().is_lost());
    }

    #[tokio::test]
    async fn test_escape_cells() {
        let table = MemoryTable::new(vec![vec![Record::from_cells(vec!["A <b> & C"])]]);
        let mut session = MemorySession::new(table);
        let html = session.content().await.unwrap();
        assert!(html.contains("<td>A &lt;b&gt; &amp; C</td>"));
    }
}
