//! # helpdesk-console
//!
//! Terminal client for the help-desk notification channel. Wires settings,
//! logging, the REST session client, and the real-time channel together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use helpdesk_auth::{ApiClient, SessionStore};
use helpdesk_core::logging::{LogFormat, init_subscriber};
use helpdesk_realtime::bell::{self, BellRow, PageCounts};
use helpdesk_realtime::desktop::DisabledNotifier;
use helpdesk_realtime::{
    ChannelConfig, LogNotifier, SharedStore, StoreChange, SystemNotifier, WsConnector,
    bind_session, spawn_channel,
};
use helpdesk_settings::HelpdeskSettings;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Help-desk notification client.
#[derive(Parser, Debug)]
#[command(name = "helpdesk", about = "Help-desk notification client")]
struct Cli {
    /// Settings file (defaults to `~/.helpdesk/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// REST API base URL (overrides settings).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Notification `WebSocket` endpoint (overrides settings).
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the access token.
    Login {
        /// Account name.
        #[arg(short, long)]
        username: String,
        /// Account password.
        #[arg(short, long)]
        password: String,
    },
    /// Stream notifications until interrupted.
    Watch {
        /// Reuse an existing access token instead of logging in.
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,
        /// Account name.
        #[arg(short, long, requires = "password")]
        username: Option<String>,
        /// Account password.
        #[arg(short, long, requires = "username")]
        password: Option<String>,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<HelpdeskSettings> {
        self.resolve_settings(|name| std::env::var(name).ok())
    }

    /// Settings file, then `HELPDESK_*` values from `lookup`, then flags.
    fn resolve_settings<F>(&self, lookup: F) -> Result<HelpdeskSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(helpdesk_settings::settings_path);
        let mut settings = helpdesk_settings::load_layers(&path, lookup)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(url) = &self.api_url {
            settings.api.base_url.clone_from(url);
        }
        if let Some(url) = &self.ws_url {
            settings.realtime.ws_url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        helpdesk_settings::validate(&settings).context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let api = ApiClient::new(&settings.api.base_url, settings.api.request_timeout())
        .context("Failed to build API client")?;

    match cli.command {
        Command::Login { username, password } => {
            let token = api
                .login(&username, &password)
                .await
                .context("Login failed")?;
            println!("{token}");
            Ok(())
        }
        Command::Watch {
            token,
            username,
            password,
        } => {
            let sessions = SessionStore::new();
            match (token, username, password) {
                (Some(token), _, _) => {
                    let _ = api
                        .restore(&sessions, &token)
                        .await
                        .context("Token rejected")?;
                }
                (None, Some(username), Some(password)) => {
                    let _ = api
                        .sign_in(&sessions, &username, &password)
                        .await
                        .context("Login failed")?;
                }
                _ => bail!("watch needs --token or --username and --password"),
            }
            watch(&settings, sessions).await
        }
    }
}

async fn watch(settings: &HelpdeskSettings, sessions: SessionStore) -> Result<()> {
    if let Some(user) = sessions.user() {
        info!(user = user.display_name(), role = %user.role, "signed in");
    }

    let notifier: Arc<dyn SystemNotifier> = if settings.realtime.system_notifications {
        Arc::new(LogNotifier::new())
    } else {
        Arc::new(DisabledNotifier)
    };
    let store = SharedStore::new(settings.realtime.max_notifications);
    let channel = spawn_channel(
        ChannelConfig::from(&settings.realtime),
        Arc::new(WsConnector),
        store.clone(),
        notifier,
    );

    let shutdown = CancellationToken::new();
    let binding = bind_session(&sessions, channel.clone(), shutdown.clone());

    let mut changes = store.subscribe();
    let mut status = channel.watch_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, logging out");
                break;
            }
            change = changes.recv() => match change {
                Ok(StoreChange::Added(n)) => {
                    println!("{}", render_row(&BellRow::new(&n, Utc::now())));
                    let counts = PageCounts::of(&store.list());
                    println!("{}", render_counts(counts));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "display fell behind"),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                println!("[{}]", bell::status_line(current));
            }
        }
    }

    sessions.clear();
    shutdown.cancel();
    let _ = binding.await;
    channel.shutdown().await;
    Ok(())
}

fn render_row(row: &BellRow) -> String {
    let mut line = format!("{} {}", row.icon, row.message);
    if let Some(title) = &row.title {
        line.push_str(&format!(" ({title})"));
    }
    line.push_str(&format!(" · {}", row.age));
    if let Some(route) = &row.route {
        line.push_str(&format!(" → {route}"));
    }
    line
}

fn render_counts(counts: PageCounts) -> String {
    let badge = bell::badge_text(counts.unread).unwrap_or_else(|| "0".to_owned());
    format!(
        "  unread {badge} · all {} · read {}",
        counts.all, counts.read
    )
}
