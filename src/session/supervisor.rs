//! Session supervisor
//!
//! The supervisor is the only owner of the live session. Navigator and
//! extractors borrow it for one operation at a time, and every recovery
//! from a lost session goes through [`SessionSupervisor::recreate`].

use crate::retry::{with_retry, RetryConfig};
use crate::session::{Session, SessionFactory};
use crate::HarvestError;

/// Owns the active session and replaces it on loss
pub struct SessionSupervisor {
    factory: Box<dyn SessionFactory>,
    session: Option<Box<dyn Session>>,
    retry: RetryConfig,
    generation: u64,
    recoveries: u32,
}

impl SessionSupervisor {
    /// Creates a supervisor; no session is launched until [`acquire`](Self::acquire)
    pub fn new(factory: Box<dyn SessionFactory>, retry: RetryConfig) -> Self {
        Self {
            factory,
            session: None,
            retry,
            generation: 0,
            recoveries: 0,
        }
    }

    /// Returns the live session, launching one if needed
    ///
    /// Launch is retried with backoff up to the configured attempt count;
    /// after that the failure is fatal for the run.
    pub async fn acquire(&mut self) -> Result<&mut dyn Session, HarvestError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.launch().await?,
        };
        Ok(self.session.insert(session).as_mut())
    }

    /// The live session, if one has been acquired
    pub fn current(&mut self) -> Option<&mut dyn Session> {
        match self.session.as_mut() {
            Some(session) => Some(session.as_mut()),
            None => None,
        }
    }

    /// Returns true if a session is held and still answers
    pub async fn is_valid(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) => session.is_alive().await,
            None => false,
        }
    }

    /// Tears down the current session and launches a fresh one
    pub async fn recreate(&mut self) -> Result<&mut dyn Session, HarvestError> {
        if let Some(mut old) = self.session.take() {
            old.close().await;
        }
        self.recoveries += 1;
        tracing::info!(
            "Recreating session (recovery #{}, generation {})",
            self.recoveries,
            self.generation + 1
        );
        let session = self.launch().await?;
        Ok(self.session.insert(session).as_mut())
    }

    /// Closes the session if one is open
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
            tracing::debug!("Session generation {} closed", self.generation);
        }
    }

    /// Increments every time a new session is launched
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of times the session was recreated after a failure
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    async fn launch(&mut self) -> Result<Box<dyn Session>, HarvestError> {
        let factory = &self.factory;
        let session = with_retry(&self.retry, "Session launch", || factory.create())
            .await
            .map_err(|exhausted| HarvestError::SessionUnavailable {
                attempts: exhausted.attempts,
                last: exhausted.last,
            })?;
        self.generation += 1;
        tracing::info!("Session generation {} ready", self.generation);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryFactory, MemoryTable};
    use crate::state::Record;

    fn table() -> MemoryTable {
        let page = vec![Record::from_cells(vec!["p", "a", "d", "c", "R1"])];
        MemoryTable::new(vec![page])
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3, 1)
    }

    #[tokio::test]
    async fn test_acquire_reuses_live_session() {
        let table = table();
        let mut supervisor =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table.clone())), fast_retry());

        assert!(!supervisor.is_valid().await);
        supervisor.acquire().await.unwrap();
        supervisor.acquire().await.unwrap();

        assert_eq!(table.sessions_created(), 1);
        assert_eq!(supervisor.generation(), 1);
        assert!(supervisor.is_valid().await);
    }

    #[tokio::test]
    async fn test_acquire_retries_failed_launches() {
        let table = table();
        table.fail_launches(2);
        let mut supervisor =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table.clone())), fast_retry());

        supervisor.acquire().await.unwrap();
        assert_eq!(table.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_acquire_fails_after_bounded_retries() {
        let table = table();
        table.fail_launches(5);
        let mut supervisor =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table.clone())), fast_retry());

        let err = supervisor.acquire().await.err().unwrap();
        assert!(matches!(
            err,
            HarvestError::SessionUnavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_recreate_replaces_session() {
        let table = table();
        let mut supervisor =
            SessionSupervisor::new(Box::new(MemoryFactory::new(table.clone())), fast_retry());

        supervisor.acquire().await.unwrap();
        supervisor.recreate().await.unwrap();

        assert_eq!(table.sessions_created(), 2);
        assert_eq!(supervisor.generation(), 2);
        assert_eq!(supervisor.recoveries(), 1);
        assert!(supervisor.is_valid().await);

        supervisor.close().await;
        assert!(!supervisor.is_valid().await);
    }
}
