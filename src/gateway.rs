//! Chat event dispatcher.
//!
//! Turns one inbound chat message into gateway built-ins (`help`,
//! `whoami`, `logout`) or a game command driven through the identity's
//! session, and walks the formatted response fragments back out through
//! the platform sink with a pacing delay.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::credentials::{account_name, derive_password, sanitize_in_game_name};
use crate::error::Result;
use crate::output::{format_text, FormatOptions};
use crate::session::SessionRegistry;
use crate::store::{unix_timestamp, CredentialStore};

const HELP_TEXT: &str = "Gateway commands:\n\
`help` - show this message\n\
`whoami` - show your mapped game account\n\
`logout` - close your game session\n\
Anything else goes to the game as a command.";

const PUBLIC_PLAY_WARNING: &str =
    "Heads up: you're playing in a public channel - anyone here can read your game session.";

const LOGIN_FAILED_FALLBACK: &str = "Login failed: the game did not confirm the connection.";

/// One chat event as the platform adapter hands it over.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Stable platform identity key (user id, not display name).
    pub identity: String,
    /// Human-facing name, used for the in-game rename.
    pub display_name: String,
    /// Raw message text.
    pub text: String,
    /// Whether the message arrived outside a direct-message channel.
    pub public_channel: bool,
}

/// Outbound side of one chat event.
///
/// `reply` answers the triggering message, `send` posts follow-up
/// fragments, `ack` marks a command that produced no output.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Answer the triggering message.
    async fn reply(&self, text: &str) -> Result<()>;
    /// Post a follow-up message to the same conversation.
    async fn send(&self, text: &str) -> Result<()>;
    /// Acknowledge a command that produced no output.
    async fn ack(&self) -> Result<()>;
}

/// Dispatcher configuration, normally derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Process-wide secret for password derivation.
    pub secret: String,
    /// Prefix for provisioned game account names.
    pub account_prefix: String,
    /// Create missing game accounts on first login.
    pub auto_create: bool,
    /// Ignore messages outside direct-message channels.
    pub dm_only: bool,
    /// Warn an identity the first time it plays in a public channel.
    pub warn_public_play: bool,
    /// Rename command template with a `{name}` placeholder, run once
    /// after account creation.
    pub rename_template: Option<String>,
    /// Fragmentation limits for outbound text.
    pub format: FormatOptions,
    /// Delay between successive outbound fragments.
    pub pacing: Duration,
}

/// Event dispatcher bridging chat messages to game sessions.
pub struct Gateway {
    options: GatewayOptions,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn CredentialStore>,
    warned: Mutex<HashSet<String>>,
}

impl Gateway {
    /// Create a dispatcher over an existing registry and store.
    pub fn new(
        options: GatewayOptions,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            options,
            registry,
            store,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Handle one inbound chat event end to end.
    ///
    /// Game-side failures surface to the user as a single short error
    /// message; only sink failures propagate to the caller.
    pub async fn handle_message(&self, msg: &InboundMessage, sink: &dyn ChatSink) -> Result<()> {
        let text = msg.text.trim();
        if text.is_empty() {
            return Ok(());
        }

        if msg.public_channel {
            if self.options.dm_only {
                debug!("gateway: ignoring public message from {}", msg.identity);
                return Ok(());
            }
            if self.options.warn_public_play && self.mark_warned(&msg.identity) {
                sink.reply(PUBLIC_PLAY_WARNING).await?;
            }
        }

        let lower = text.to_lowercase();
        if matches!(lower.as_str(), "help" | "?" | "commands") {
            return self.deliver(sink, HELP_TEXT).await;
        }

        let account = account_name(&self.options.account_prefix, &msg.identity);
        let password = derive_password(&self.options.secret, &msg.identity);
        self.store
            .upsert(
                &msg.identity,
                &account,
                &password,
                unix_timestamp(),
                Some(&msg.display_name),
            )
            .await?;

        if lower == "logout" {
            self.registry.remove(&msg.identity).await;
            return self.deliver(sink, "Logged out.").await;
        }
        if lower == "whoami" {
            return self.deliver(sink, &format!("Game account: `{account}`")).await;
        }

        match self.play(msg, text, &account, &password, sink).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("gateway: command failed for {}: {}", msg.identity, e);
                self.deliver(sink, &format!("Gateway error: {e}")).await
            }
        }
    }

    /// Drive a game command through the identity's session.
    async fn play(
        &self,
        msg: &InboundMessage,
        command: &str,
        account: &str,
        password: &str,
        sink: &dyn ChatSink,
    ) -> Result<()> {
        let session = self.registry.get_or_create(&msg.identity)?;

        let outcome = session
            .ensure_logged_in(account, password, self.options.auto_create)
            .await?;

        if outcome.created_account {
            info!("gateway: created game account {} for {}", account, msg.identity);
            self.deliver(sink, &format!("Created game account **{account}** for you."))
                .await?;
            if let Some(template) = &self.options.rename_template {
                let name = sanitize_in_game_name(&msg.display_name);
                let rename = template.replace("{name}", &name);
                session.run_command(&rename).await?;
            }
        }

        if !session.is_authenticated().await {
            let diagnostics = outcome.diagnostics.trim();
            let report = if diagnostics.is_empty() {
                LOGIN_FAILED_FALLBACK
            } else {
                diagnostics
            };
            return self.deliver(sink, report).await;
        }

        let output = session.run_command(command).await?;
        if output.trim().is_empty() {
            return sink.ack().await;
        }
        self.deliver(sink, &output).await
    }

    /// Send formatted fragments: the first as a reply, the rest as
    /// paced follow-ups.
    async fn deliver(&self, sink: &dyn ChatSink, text: &str) -> Result<()> {
        let fragments = format_text(text, &self.options.format);
        let mut fragments = fragments.iter();

        if let Some(first) = fragments.next() {
            sink.reply(first).await?;
        }
        for fragment in fragments {
            tokio::time::sleep(self.options.pacing).await;
            sink.send(fragment).await?;
        }
        Ok(())
    }

    /// Record that the identity has been warned about public play.
    /// Returns true the first time only.
    fn mark_warned(&self, identity: &str) -> bool {
        match self.warned.lock() {
            Ok(mut warned) => warned.insert(identity.to_string()),
            Err(_) => false,
        }
    }
}
