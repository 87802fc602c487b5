//! Navigation driver with escalating recovery

use crate::config::CrawlerConfig;
use crate::navigator::{NavigationError, Step, Strategy};
use crate::session::{SessionError, SessionSupervisor};
use crate::HarvestError;
use std::time::Duration;

/// Lost sessions tolerated within one navigation
const MAX_SESSION_LOSSES: u32 = 2;

/// Timing and retry bounds for navigation
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Bounded wait for the active indicator to change
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after each paging action
    pub settle: Duration,
    /// Attempts per strategy before falling through
    pub strategy_attempts: u32,
    /// Consecutive stuck attempts before reloading
    pub stuck_threshold: u32,
}

impl NavigatorConfig {
    pub fn from_crawler(config: &CrawlerConfig) -> Self {
        Self {
            wait_timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
            settle: config.settle(),
            strategy_attempts: config.strategy_attempts.max(1),
            stuck_threshold: config.stuck_threshold.max(1),
        }
    }

    /// No waiting at all; for in-memory views
    pub fn immediate() -> Self {
        Self {
            wait_timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            settle: Duration::ZERO,
            strategy_attempts: 3,
            stuck_threshold: 5,
        }
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self::from_crawler(&CrawlerConfig::default())
    }
}

/// Outcome of one pass over all strategies
enum Pass {
    Reached(Strategy),
    Stuck,
    Exhausted,
}

/// Drives the live view to a target page
pub struct Navigator {
    config: NavigatorConfig,
}

impl Navigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Moves the view to `target`
    ///
    /// # Escalation
    ///
    /// 1. Strategies in [`Strategy::ORDER`], each up to `strategy_attempts` times
    /// 2. After `stuck_threshold` consecutive stuck attempts, or when every
    ///    strategy is exhausted: reload the view and try again
    /// 3. Still failing: recreate the session and try once more
    /// 4. Still failing: [`NavigationError::Unreachable`]
    ///
    /// A lost session is recreated on the spot, up to a small bound.
    ///
    /// # Returns
    ///
    /// The strategy that reached the page, or `None` if the view was
    /// already there.
    pub async fn navigate(
        &self,
        sessions: &mut SessionSupervisor,
        target: u32,
    ) -> Result<Option<Strategy>, HarvestError> {
        let mut reloaded = false;
        let mut recreated = false;
        let mut losses = 0;

        {
            let session = sessions.acquire().await?;
            match session.active_page().await {
                Ok(Some(page)) if page == target => return Ok(None),
                Ok(_) => {}
                Err(e) if e.is_lost() => {}
                Err(e) => tracing::debug!("Could not read active page: {}", e),
            }
        }

        loop {
            let failure = match self.pass(sessions, target).await {
                Ok(Pass::Reached(strategy)) => {
                    tracing::debug!("Reached page {} via {}", target, strategy);
                    return Ok(Some(strategy));
                }
                Ok(Pass::Stuck) => format!("stuck {} times", self.config.stuck_threshold),
                Ok(Pass::Exhausted) => "all strategies exhausted".to_string(),
                Err(NavigateFault::Lost(e)) => {
                    losses += 1;
                    tracing::warn!("Session lost while navigating to page {}: {}", target, e);
                    if losses > MAX_SESSION_LOSSES {
                        return Err(NavigationError::SessionUnstable { target, losses }.into());
                    }
                    sessions.recreate().await?;
                    continue;
                }
                Err(NavigateFault::Fatal(e)) => return Err(e),
            };

            if !reloaded {
                reloaded = true;
                tracing::info!("Navigation to page {} failed ({}), reloading view", target, failure);
                match sessions.acquire().await?.reload().await {
                    Ok(()) => continue,
                    Err(e) => tracing::warn!("Reload failed: {}", e),
                }
            }

            if recreated {
                tracing::error!("Page {} unreachable after session recreation", target);
                return Err(NavigationError::Unreachable { target }.into());
            }
            recreated = true;
            tracing::info!(
                "Navigation to page {} failed ({}), recreating session",
                target,
                failure
            );
            sessions.recreate().await?;
        }
    }

    /// Tries every strategy in order until one reaches `target`
    async fn pass(
        &self,
        sessions: &mut SessionSupervisor,
        target: u32,
    ) -> Result<Pass, NavigateFault> {
        let session = sessions.acquire().await.map_err(NavigateFault::Fatal)?;
        let mut stuck = 0;

        for strategy in Strategy::ORDER {
            let mut attempts = 0;
            while attempts < self.config.strategy_attempts {
                attempts += 1;
                match strategy.attempt(session, target, &self.config).await {
                    Ok(Step::Reached) => return Ok(Pass::Reached(strategy)),
                    Ok(Step::Progress) => stuck = 0,
                    Ok(Step::Stuck) => {
                        stuck += 1;
                        tracing::debug!(
                            "{} attempt {} towards page {} stuck ({} in a row)",
                            strategy,
                            attempts,
                            target,
                            stuck
                        );
                        if stuck >= self.config.stuck_threshold {
                            return Ok(Pass::Stuck);
                        }
                    }
                    Ok(Step::Unsupported) => {
                        tracing::trace!("{} not available for page {}", strategy, target);
                        break;
                    }
                    Err(e) if e.is_transient() => {
                        tracing::debug!("Dismissing UI noise during {}: {}", strategy, e);
                        match session.dismiss_dialog().await {
                            Err(lost) if lost.is_lost() => return Err(NavigateFault::Lost(lost)),
                            _ => {}
                        }
                    }
                    Err(e) if e.is_lost() => return Err(NavigateFault::Lost(e)),
                    Err(e) => {
                        tracing::debug!("{} failed: {}", strategy, e);
                        break;
                    }
                }
            }
        }

        Ok(Pass::Exhausted)
    }
}

enum NavigateFault {
    Lost(SessionError),
    Fatal(HarvestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::session::{MemoryFactory, MemoryTable};
    use crate::state::Record;

    fn table(pages: u32) -> MemoryTable {
        MemoryTable::new(
            (1..=pages)
                .map(|p| vec![Record::from_cells(vec![format!("P{}", p)])])
                .collect(),
        )
    }

    fn supervisor(table: &MemoryTable) -> SessionSupervisor {
        SessionSupervisor::new(
            Box::new(MemoryFactory::new(table.clone())),
            RetryConfig::new(3, 1),
        )
    }

    async fn active(sessions: &mut SessionSupervisor) -> Option<u32> {
        sessions.acquire().await.unwrap().active_page().await.unwrap()
    }

    #[tokio::test]
    async fn test_navigate_direct() {
        let table = table(30);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        let used = navigator.navigate(&mut sessions, 25).await.unwrap();
        assert_eq!(used, Some(Strategy::DirectJump));
        assert_eq!(active(&mut sessions).await, Some(25));
    }

    #[tokio::test]
    async fn test_navigate_already_there() {
        let table = table(3);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        assert_eq!(navigator.navigate(&mut sessions, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_navigate_dismisses_dialogs() {
        let table = table(10);
        table.dialog_on_jumps(2);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        let used = navigator.navigate(&mut sessions, 7).await.unwrap();
        assert_eq!(used, Some(Strategy::DirectJump));
        assert_eq!(table.reloads(), 0);
    }

    #[tokio::test]
    async fn test_navigate_falls_through_to_clicks() {
        let table = table(10).with_jump_api(false);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        let used = navigator.navigate(&mut sessions, 4).await.unwrap();
        assert_eq!(used, Some(Strategy::NumberedClick));
        assert_eq!(active(&mut sessions).await, Some(4));
    }

    #[tokio::test]
    async fn test_navigate_recovers_lost_session() {
        let table = table(10);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        sessions.acquire().await.unwrap().close().await;
        let used = navigator.navigate(&mut sessions, 6).await.unwrap();

        assert_eq!(used, Some(Strategy::DirectJump));
        assert_eq!(table.sessions_created(), 2);
        assert_eq!(sessions.recoveries(), 1);
    }

    #[tokio::test]
    async fn test_navigate_escalates_then_fails() {
        let table = table(10);
        table.freeze_navigation(true);
        let mut sessions = supervisor(&table);
        let navigator = Navigator::new(NavigatorConfig::immediate());

        let err = navigator.navigate(&mut sessions, 5).await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Navigation(NavigationError::Unreachable { target: 5 })
        ));
        assert_eq!(table.reloads(), 1);
        assert_eq!(table.sessions_created(), 2);
    }
}
