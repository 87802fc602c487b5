//! Headless Chrome session over the DevTools protocol
//!
//! All table interaction happens through small scripts evaluated in the
//! page: the DataTables paging API for direct jumps, and the bootstrap
//! pagination bar (`li.page-item`) for clicks and the active indicator.

use crate::config::{SessionConfig, SiteConfig};
use crate::session::{Session, SessionCookie, SessionError, SessionFactory, SessionResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Replaces blocking native dialogs with no-ops once the page has loaded
const SUPPRESS_DIALOGS: &str =
    "window.alert = function () {}; window.confirm = function () { return true; }; true";

/// A browser tab showing the table page
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    site: SiteConfig,
    poll_interval: Duration,
}

impl ChromeSession {
    async fn eval(&self, script: &str) -> SessionResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::classify(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn eval_bool(&self, script: &str) -> SessionResult<bool> {
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    fn quoted(text: &str) -> String {
        // A JSON string literal is a valid JS string literal
        serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
    }

    fn active_page_script(&self) -> String {
        format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
             const n = parseInt(el.textContent.trim(), 10); return Number.isNaN(n) ? null : n; }})()",
            sel = Self::quoted(&self.site.active_selector)
        )
    }

    fn jump_script(&self, page_index: u32) -> String {
        format!(
            "(() => {{ if (!window.jQuery || !jQuery.fn.dataTable) return false; \
             const t = jQuery({table}).DataTable(); t.page({index}).draw('page'); return true; }})()",
            table = Self::quoted(&self.site.table_selector),
            index = page_index
        )
    }

    fn controls_script(&self) -> String {
        format!(
            "(() => Array.from(document.querySelectorAll({sel})) \
             .filter(a => {{ const li = a.closest('li'); return !li || (!li.classList.contains('disabled') && !li.classList.contains('active')); }}) \
             .map(a => parseInt(a.textContent.trim(), 10)) \
             .filter(n => !Number.isNaN(n)))()",
            sel = Self::quoted(&self.site.page_link_selector)
        )
    }

    fn click_control_script(&self, page: u32) -> String {
        format!(
            "(() => {{ const a = Array.from(document.querySelectorAll({sel})) \
             .find(a => a.textContent.trim() === {label}); if (!a) return false; \
             a.scrollIntoView({{block: 'center'}}); a.click(); return true; }})()",
            sel = Self::quoted(&self.site.page_link_selector),
            label = Self::quoted(&page.to_string())
        )
    }

    fn has_next_script(&self) -> String {
        format!(
            "document.querySelector({sel}) !== null",
            sel = Self::quoted(&self.site.next_selector)
        )
    }

    fn click_next_script(&self) -> String {
        format!(
            "(() => {{ const a = document.querySelector({sel}); if (!a) return false; \
             a.scrollIntoView({{block: 'center'}}); a.click(); return true; }})()",
            sel = Self::quoted(&self.site.next_selector)
        )
    }

    fn ajax_script(&self) -> String {
        format!(
            "(() => {{ try {{ const u = jQuery({table}).DataTable().ajax.url(); \
             if (typeof u === 'string') return u; if (u && typeof u.url === 'string') return u.url; \
             return null; }} catch (e) {{ return null; }} }})()",
            table = Self::quoted(&self.site.table_selector)
        )
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn is_alive(&mut self) -> bool {
        self.eval("1").await.is_ok()
    }

    async fn content(&mut self) -> SessionResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::classify(e.to_string()))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> SessionResult<bool> {
        let script = format!("document.querySelector({}) !== null", Self::quoted(selector));
        let deadline = Instant::now() + timeout;
        loop {
            if self.eval_bool(&script).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn active_page(&mut self) -> SessionResult<Option<u32>> {
        let value = self.eval(&self.active_page_script()).await?;
        Ok(value.as_u64().map(|n| n as u32))
    }

    async fn jump_to(&mut self, page_index: u32) -> SessionResult<bool> {
        self.eval_bool(&self.jump_script(page_index)).await
    }

    async fn page_controls(&mut self) -> SessionResult<Vec<u32>> {
        let value = self.eval(&self.controls_script()).await?;
        let pages = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|n| n as u32)
                    .collect()
            })
            .unwrap_or_default();
        Ok(pages)
    }

    async fn click_page_control(&mut self, page: u32) -> SessionResult<()> {
        if self.eval_bool(&self.click_control_script(page)).await? {
            Ok(())
        } else {
            Err(SessionError::Script(format!(
                "no clickable control for page {}",
                page
            )))
        }
    }

    async fn has_next(&mut self) -> SessionResult<bool> {
        self.eval_bool(&self.has_next_script()).await
    }

    async fn click_next(&mut self) -> SessionResult<bool> {
        self.eval_bool(&self.click_next_script()).await
    }

    async fn reload(&mut self) -> SessionResult<()> {
        self.page
            .reload()
            .await
            .map_err(|e| SessionError::classify(e.to_string()))?;
        self.eval(SUPPRESS_DIALOGS).await?;
        Ok(())
    }

    async fn dismiss_dialog(&mut self) -> SessionResult<()> {
        match self.page.execute(HandleJavaScriptDialogParams::new(true)).await {
            Ok(_) => {
                tracing::debug!("Dismissed native dialog");
                Ok(())
            }
            Err(e) => match SessionError::classify(e.to_string()) {
                lost @ SessionError::Lost(_) => Err(lost),
                // "No dialog is showing" and friends
                _ => Ok(()),
            },
        }
    }

    async fn ajax_endpoint(&mut self) -> SessionResult<Option<String>> {
        let value = self.eval(&self.ajax_script()).await?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn cookies(&mut self) -> SessionResult<Vec<SessionCookie>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| SessionError::classify(e.to_string()))?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    async fn user_agent(&mut self) -> SessionResult<Option<String>> {
        let value = self.eval("navigator.userAgent").await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser wait failed: {}", e);
        }
        self.handler.abort();
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Launches Chrome and opens the table page
pub struct ChromeFactory {
    site: SiteConfig,
    session: SessionConfig,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl ChromeFactory {
    pub fn new(
        site: SiteConfig,
        session: SessionConfig,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            site,
            session,
            wait_timeout,
            poll_interval,
        }
    }

    fn browser_config(&self) -> SessionResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.session.window_width, self.session.window_height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .request_timeout(self.wait_timeout);
        if !self.session.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(SessionError::Launch)
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn create(&self) -> SessionResult<Box<dyn Session>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!("Loading {}", self.site.url);
        let page = match browser.new_page(self.site.url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        let mut session = ChromeSession {
            browser,
            page,
            handler,
            site: self.site.clone(),
            poll_interval: self.poll_interval,
        };

        session.eval(SUPPRESS_DIALOGS).await?;

        tracing::info!("Waiting for table to appear...");
        let table_selector = self.site.table_selector.clone();
        if !session.wait_for(&table_selector, self.wait_timeout).await? {
            session.close().await;
            return Err(SessionError::Launch(format!(
                "table {} did not render within {:?}",
                table_selector, self.wait_timeout
            )));
        }

        Ok(Box::new(session))
    }
}
