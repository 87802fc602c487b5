//! Individual navigation strategies
//!
//! Each strategy performs one attempt and reports a [`Step`]. Verification
//! polls the active page indicator with a bounded wait.

use crate::navigator::NavigatorConfig;
use crate::session::{Session, SessionResult};
use std::fmt;
use tokio::time::Instant;

/// A way of moving the view to another page, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The table's own paging API
    DirectJump,
    /// Numbered controls in the pagination bar
    NumberedClick,
    /// The "next" control, one page at a time
    NextClick,
}

impl Strategy {
    /// All strategies in the order they are tried
    pub const ORDER: [Strategy; 3] = [
        Strategy::DirectJump,
        Strategy::NumberedClick,
        Strategy::NextClick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectJump => "direct jump",
            Strategy::NumberedClick => "numbered click",
            Strategy::NextClick => "next click",
        }
    }

    /// Performs one attempt towards `target`
    pub async fn attempt(
        &self,
        session: &mut dyn Session,
        target: u32,
        config: &NavigatorConfig,
    ) -> SessionResult<Step> {
        match self {
            Strategy::DirectJump => direct_jump(session, target, config).await,
            Strategy::NumberedClick => numbered_click(session, target, config).await,
            Strategy::NextClick => next_click(session, target, config).await,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one strategy attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The view shows the target page
    Reached,
    /// The view moved closer but is not there yet
    Progress,
    /// The action ran but the view did not move as expected
    Stuck,
    /// The strategy cannot be applied to this view
    Unsupported,
}

/// Polls the active indicator until it shows `expected`
pub async fn wait_for_page(
    session: &mut dyn Session,
    expected: u32,
    config: &NavigatorConfig,
) -> SessionResult<bool> {
    let deadline = Instant::now() + config.wait_timeout;
    loop {
        if session.active_page().await? == Some(expected) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

async fn settle(config: &NavigatorConfig) {
    if !config.settle.is_zero() {
        tokio::time::sleep(config.settle).await;
    }
}

async fn direct_jump(
    session: &mut dyn Session,
    target: u32,
    config: &NavigatorConfig,
) -> SessionResult<Step> {
    if !session.jump_to(target.saturating_sub(1)).await? {
        return Ok(Step::Unsupported);
    }
    settle(config).await;
    if wait_for_page(session, target, config).await? {
        Ok(Step::Reached)
    } else {
        Ok(Step::Stuck)
    }
}

async fn numbered_click(
    session: &mut dyn Session,
    target: u32,
    config: &NavigatorConfig,
) -> SessionResult<Step> {
    let mut moved = false;
    loop {
        let current = session.active_page().await?;
        if current == Some(target) {
            return Ok(Step::Reached);
        }
        let current = current.unwrap_or(0);

        let closest = session
            .page_controls()
            .await?
            .into_iter()
            .filter(|&page| page <= target && page > current)
            .max();
        let Some(page) = closest else {
            return Ok(if moved { Step::Progress } else { Step::Unsupported });
        };

        tracing::trace!("Clicking page control {} (at {}, target {})", page, current, target);
        session.click_page_control(page).await?;
        settle(config).await;
        if !wait_for_page(session, page, config).await? {
            return Ok(if moved { Step::Progress } else { Step::Stuck });
        }
        moved = true;
    }
}

async fn next_click(
    session: &mut dyn Session,
    target: u32,
    config: &NavigatorConfig,
) -> SessionResult<Step> {
    let mut moved = false;
    loop {
        let Some(current) = session.active_page().await? else {
            return Ok(Step::Stuck);
        };
        if current == target {
            return Ok(Step::Reached);
        }
        if current > target || !session.click_next().await? {
            return Ok(if moved { Step::Progress } else { Step::Unsupported });
        }
        settle(config).await;
        if !wait_for_page(session, current + 1, config).await? {
            return Ok(if moved { Step::Progress } else { Step::Stuck });
        }
        moved = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySession, MemoryTable};
    use crate::state::Record;

    fn table(pages: u32) -> MemoryTable {
        MemoryTable::new(
            (1..=pages)
                .map(|p| vec![Record::from_cells(vec![format!("P{}", p)])])
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_direct_jump() {
        let mut session = MemorySession::new(table(20));
        let step = Strategy::DirectJump
            .attempt(&mut session, 17, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Reached);
        assert_eq!(session.active_page().await.unwrap(), Some(17));
    }

    #[tokio::test]
    async fn test_direct_jump_unsupported() {
        let mut session = MemorySession::new(table(20).with_jump_api(false));
        let step = Strategy::DirectJump
            .attempt(&mut session, 5, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Unsupported);
    }

    #[tokio::test]
    async fn test_numbered_click_walks_controls() {
        let mut session = MemorySession::new(table(20).with_jump_api(false));
        let step = Strategy::NumberedClick
            .attempt(&mut session, 6, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Reached);
        assert_eq!(session.active_page().await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_numbered_click_uses_last_page_control() {
        let mut session = MemorySession::new(table(20).with_jump_api(false));
        let step = Strategy::NumberedClick
            .attempt(&mut session, 20, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Reached);
    }

    #[tokio::test]
    async fn test_next_click_steps_forward() {
        let mut session = MemorySession::new(table(5));
        let step = Strategy::NextClick
            .attempt(&mut session, 3, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Reached);
    }

    #[tokio::test]
    async fn test_next_click_cannot_go_back() {
        let mut session = MemorySession::new(table(5));
        session.jump_to(3).await.unwrap();
        let step = Strategy::NextClick
            .attempt(&mut session, 2, &NavigatorConfig::immediate())
            .await
            .unwrap();
        assert_eq!(step, Step::Unsupported);
    }

    #[tokio::test]
    async fn test_frozen_view_is_stuck() {
        let table = table(5);
        table.freeze_navigation(true);
        let mut session = MemorySession::new(table);
        let config = NavigatorConfig::immediate();

        assert_eq!(
            Strategy::DirectJump.attempt(&mut session, 3, &config).await.unwrap(),
            Step::Stuck
        );
        assert_eq!(
            Strategy::NumberedClick.attempt(&mut session, 3, &config).await.unwrap(),
            Step::Stuck
        );
        assert_eq!(
            Strategy::NextClick.attempt(&mut session, 3, &config).await.unwrap(),
            Step::Stuck
        );
    }
}
