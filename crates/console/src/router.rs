// Update router
//
// Commands are answered here; every other update is fed to the user's flow,
// but only while that flow has steps pending.

use std::sync::Arc;

use anyhow::{Context, Result};
use chatflow::prelude::*;
use dashmap::DashMap;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, instrument};

use crate::config::ConsoleConfig;
use crate::conversation::{image_flow, ImageDraft, ASK_WIDTH};
use crate::input::{Command, Incoming, Update};
use crate::transport::{Reply, Transport};

/// Registry type driven by the router
pub type ImageRegistry = FlowRegistry<String, Update, ImageDraft>;

pub const BUSY: &str =
    "Unable to execute this command. First complete the previous operation or type /clear.";
pub const NOTHING_TO_CLEAR: &str = "Nothing to clear.";
pub const CLEARED: &str = "You have successfully aborted the operation.";

/// Routes console updates to commands and flows
#[derive(Clone)]
pub struct Router {
    registry: ImageRegistry,
    transport: Arc<dyn Transport>,
    config: Arc<ConsoleConfig>,

    /// Pending flow timeouts, at most one per user
    watchdogs: Arc<DashMap<String, AbortHandle>>,
}

impl Router {
    /// Create a router with its own registry
    pub fn new(config: ConsoleConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let registry = FlowRegistry::with_config(config.registry_config())
            .context("Invalid registry configuration")?;

        Ok(Self {
            registry,
            transport,
            config: Arc::new(config),
            watchdogs: Arc::new(DashMap::new()),
        })
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Handle one incoming update
    ///
    /// Returns the drain handle when the update started a drain loop, so
    /// callers can wait for the flow to settle. Dropping it is fine.
    #[instrument(skip(self, incoming), fields(user = %incoming.user()))]
    pub async fn handle(&self, incoming: Incoming) -> Result<Option<DrainHandle>> {
        match incoming {
            Incoming::Command { user, command } => {
                self.handle_command(&user, command).await?;
                Ok(None)
            }
            Incoming::Update { user, update } => Ok(self.dispatch(user, update)),
        }
    }

    /// Periodically evict idle flows until the returned task is aborted
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = registry.evict_idle();
                debug!(evicted, remaining = registry.flow_count(), "sweep finished");
            }
        })
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    async fn handle_command(&self, user: &str, command: Command) -> Result<()> {
        match command {
            Command::Generate => self.generate(user).await,
            Command::Clear => self.clear(user).await,
            Command::Status => {
                let snapshot = self.registry.snapshot(&user.to_string());
                self.transport.send(user, Reply::Status { snapshot }).await
            }
            Command::Unknown(name) => {
                debug!(command = %name, "unknown command");
                self.transport
                    .send_text(user, &format!("Unknown command /{}", name))
                    .await
            }
        }
    }

    async fn generate(&self, user: &str) -> Result<()> {
        let id = user.to_string();
        if self.registry.has_in_queue(&id) {
            return self.transport.send_text(user, BUSY).await;
        }

        self.transport.send_text(user, ASK_WIDTH).await?;

        let steps = image_flow(user, Arc::clone(&self.transport), &self.config.image_base_url)?;
        let registration = self.registry.register(id.clone(), steps)?;
        if !registration.is_accepted() {
            // Another /generate won the race between the check and the registration
            return self.transport.send_text(user, BUSY).await;
        }

        self.arm_watchdog(id);
        info!("image conversation started");
        Ok(())
    }

    async fn clear(&self, user: &str) -> Result<()> {
        let id = user.to_string();
        if !self.registry.has_in_queue(&id) {
            return self.transport.send_text(user, NOTHING_TO_CLEAR).await;
        }

        self.registry.clear(&id);
        self.disarm_watchdog(&id);
        self.transport.send_text(user, CLEARED).await
    }

    fn dispatch(&self, user: String, update: Update) -> Option<DrainHandle> {
        if !self.registry.has_in_queue(&user) {
            debug!("no flow pending, update ignored");
            return None;
        }
        self.registry.execute(&user, update).into_handle()
    }

    /// Clear the user's flow once the flow timeout elapses
    fn arm_watchdog(&self, user: String) {
        let registry = self.registry.clone();
        let watchdogs = Arc::clone(&self.watchdogs);
        let timeout = self.config.flow_timeout;
        let id = user.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            watchdogs.remove(&id);
            if registry.has_in_queue(&id) {
                info!(user = %id, timeout_secs = timeout.as_secs(), "flow timed out, clearing");
            }
            registry.clear(&id);
        });

        if let Some(previous) = self.watchdogs.insert(user, task.abort_handle()) {
            previous.abort();
        }
    }

    fn disarm_watchdog(&self, user: &str) {
        if let Some((_, watchdog)) = self.watchdogs.remove(user) {
            watchdog.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    fn router() -> (Router, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let router = Router::new(ConsoleConfig::default(), transport.clone()).unwrap();
        (router, transport)
    }

    fn command(user: &str, command: Command) -> Incoming {
        Incoming::Command {
            user: user.to_string(),
            command,
        }
    }

    #[tokio::test]
    async fn test_generate_registers_flow() {
        let (router, transport) = router();

        router.handle(command("u1", Command::Generate)).await.unwrap();

        assert_eq!(router.registry().actions_queue_len(&"u1".to_string()), 7);
        assert_eq!(transport.texts_for("u1"), vec![ASK_WIDTH]);
    }

    #[tokio::test]
    async fn test_generate_twice_is_refused() {
        let (router, transport) = router();

        router.handle(command("u1", Command::Generate)).await.unwrap();
        router.handle(command("u1", Command::Generate)).await.unwrap();

        assert_eq!(transport.texts_for("u1"), vec![ASK_WIDTH, BUSY]);
        assert_eq!(router.registry().actions_queue_len(&"u1".to_string()), 7);
    }

    #[tokio::test]
    async fn test_clear_without_flow() {
        let (router, transport) = router();

        router.handle(command("u1", Command::Clear)).await.unwrap();

        assert_eq!(transport.texts_for("u1"), vec![NOTHING_TO_CLEAR]);
    }

    #[tokio::test]
    async fn test_updates_without_flow_are_ignored() {
        let (router, transport) = router();

        let handle = router
            .handle(Incoming::Update {
                user: "u1".into(),
                update: Update::Message("640".into()),
            })
            .await
            .unwrap();

        assert!(handle.is_none());
        assert!(transport.replies().is_empty());
        assert!(!router.registry().contains(&"u1".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (router, transport) = router();

        router
            .handle(command("u1", Command::Unknown("start".into())))
            .await
            .unwrap();

        assert_eq!(transport.texts_for("u1"), vec!["Unknown command /start"]);
    }

    #[tokio::test]
    async fn test_status_without_flow() {
        let (router, transport) = router();

        router.handle(command("u1", Command::Status)).await.unwrap();

        assert_eq!(
            transport.last_for("u1"),
            Some(Reply::Status { snapshot: None })
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let config = ConsoleConfig::default().with_idle_ttl(std::time::Duration::ZERO);

        assert!(Router::new(config, transport).is_err());
    }
}
