//! Widget Host - Headless Driver for One Chat Widget
//!
//! Mounts a widget and plays the embedding page over stdin/stdout, one JSON
//! value per line. Useful for protocol testing and for hosts that bridge a
//! real page to the core out of process.
//!
//! # Usage
//!
//! ```bash
//! # Echo backend, trusting one parent origin
//! widget-host --origin https://www.example.com
//!
//! # Remote dialog backend, with config file
//! widget-host --config ./widget.toml --backend-url https://bot.example.com/turn
//!
//! # Verbose logging (logs go to stderr)
//! RUST_LOG=debug widget-host
//! ```
//!
//! # Input Lines (stdin)
//!
//! - `{"origin": "...", "data": {"event": "ping"}, "expectReply": true}`:
//!   a parent-window message; with `expectReply` a reply port is attached
//! - `{"data": {...}}`: a same-page component event (no origin)
//! - `{"action": "submitText", "value": "hi"}`: a user action
//! - `{"audio": {"type": "recordingStarted"}}`: an audio subsystem event
//! - `{"liveChat": {"type": "agentMessage", "value": "..."}}`: a live-chat event
//!
//! # Output Lines (stdout)
//!
//! - `{"post": {...}}`: a message the widget posted to the parent
//! - `{"reply": {...}}`: the widget's answer on a reply port
//! - `{"state": {...}}`: session snapshot after a change (`--print-state`)
//! - `{"transcript": [...]}`: the transcript at exit (`--dump-transcript`)
//!
//! Stdin EOF or SIGINT unmounts the widget and exits.

mod backend;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use widget_core::config::{default_config_path, load_config_from_path};
use widget_core::{
    AudioEvent, ConfigOverrides, CredentialStore, FileLocaleStore, LiveChatEvent, ParentWindow,
    UserAction, Widget, WidgetHandle,
};

use backend::HostBackend;

/// Widget Host - drives one chat widget over stdin/stdout
#[derive(Parser, Debug)]
#[command(name = "widget-host")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "WIDGET_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Allowed parent origin (repeatable, `*` allows all)
    #[arg(short = 'o', long = "origin", value_name = "ORIGIN")]
    origins: Vec<String>,

    /// Dialog backend URL (echo backend when unset)
    #[arg(short = 'b', long, value_name = "URL")]
    backend_url: Option<String>,

    /// Comma-separated locale list, active first
    #[arg(long, value_delimiter = ',', value_name = "LOCALES")]
    locales: Vec<String>,

    /// Allow escalation to a live agent
    #[arg(long)]
    live_chat: bool,

    /// Put backend error text in the transcript
    #[arg(long)]
    show_errors: bool,

    /// Print a session snapshot after every change
    #[arg(long)]
    print_state: bool,

    /// Print the transcript when the widget unmounts
    #[arg(long)]
    dump_transcript: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "WIDGET_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if !self.origins.is_empty() {
            overrides = overrides.with_allowed_origins(self.origins.clone());
        }
        if let Some(ref url) = self.backend_url {
            overrides = overrides.with_backend_endpoint(url.clone());
        }
        if !self.locales.is_empty() {
            overrides = overrides.with_locales(self.locales.clone());
        }
        if self.live_chat {
            overrides = overrides.with_live_chat(true);
        }
        if self.show_errors {
            overrides = overrides.with_error_details(true);
        }
        overrides
    }
}

/// One line of stdin
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputLine {
    Action(UserAction),
    Audio {
        audio: AudioEvent,
    },
    LiveChat {
        #[serde(rename = "liveChat")]
        live_chat: LiveChatEvent,
    },
    Parent {
        origin: Option<String>,
        data: Value,
        #[serde(default, rename = "expectReply")]
        expect_reply: bool,
    },
}

/// Initialize logging on stderr; stdout carries the protocol
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("widget_host={level},widget_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn emit(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize output line"),
    }
}

async fn handle_line(
    line: &str,
    parent: &ParentWindow,
    handle: &WidgetHandle,
    replies: &mpsc::UnboundedSender<Value>,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let input: InputLine = serde_json::from_str(line).context("Unrecognized input line")?;

    match input {
        InputLine::Action(action) => handle.act(action).await?,
        InputLine::Audio { audio } => handle.audio(audio)?,
        InputLine::LiveChat { live_chat } => handle.live_chat(live_chat)?,
        InputLine::Parent {
            origin: None, data, ..
        } => parent.component_event(data).await?,
        InputLine::Parent {
            origin: Some(origin),
            data,
            expect_reply: false,
        } => parent.post(&origin, data).await?,
        InputLine::Parent {
            origin: Some(origin),
            data,
            expect_reply: true,
        } => {
            let rx = parent.post_with_port(&origin, data).await?;
            let replies = replies.clone();
            tokio::spawn(async move {
                match rx.await {
                    Ok(reply) => {
                        let _ = replies.send(reply);
                    }
                    Err(_) => debug!("Reply port closed without an answer"),
                }
            });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Widget host starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config
        .validate()
        .context("Invalid widget configuration")?;
    info!(source = %config.source(), origins = ?config.channel.allowed_origins, "Configuration loaded");

    let credentials = Arc::new(CredentialStore::default());
    let backend = HostBackend::from_config(&config, &credentials)
        .context("Failed to create dialog backend")?;

    let (widget, mut parent, handle) = Widget::with_credentials(&config, backend, credentials);
    let mut widget = match FileLocaleStore::default_path() {
        Some(path) => widget.with_locale_store(Box::new(FileLocaleStore::new(path))),
        None => widget,
    };

    let dump_transcript = args.dump_transcript;
    let widget_task = tokio::spawn(async move {
        widget.run().await;
        if dump_transcript {
            emit(&json!({ "transcript": widget.transcript().entries() }));
        }
    });

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Value>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut state = handle.state();
    let mut state_open = args.print_state;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = handle_line(&line, &parent, &handle, &reply_tx).await {
                        warn!(error = %e, "Ignoring input line");
                    }
                }
                Ok(None) | Err(_) => {
                    info!("Input closed, unmounting");
                    stdin_open = false;
                    let _ = handle.unmount().await;
                }
            },

            post = parent.recv() => match post {
                Some(post) => {
                    emit(&json!({ "post": post.message }));
                    if let Some(port) = post.port {
                        port.discard();
                    }
                }
                None => break,
            },

            Some(reply) = reply_rx.recv() => {
                emit(&json!({ "reply": reply }));
            }

            changed = state.changed(), if state_open => match changed {
                Ok(()) => {
                    let snapshot = state.borrow_and_update().clone();
                    emit(&json!({ "state": snapshot }));
                }
                Err(_) => state_open = false,
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, unmounting");
                stdin_open = false;
                let _ = handle.unmount().await;
            }
        }
    }

    widget_task.await.context("Widget task failed")?;
    while let Ok(reply) = reply_rx.try_recv() {
        emit(&json!({ "reply": reply }));
    }

    info!("Widget host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_line_shapes() {
        let parsed: InputLine = serde_json::from_value(json!({
            "origin": "https://www.example.com",
            "data": { "event": "ping" },
            "expectReply": true
        }))
        .unwrap();
        assert!(matches!(
            parsed,
            InputLine::Parent {
                origin: Some(_),
                expect_reply: true,
                ..
            }
        ));

        let parsed: InputLine =
            serde_json::from_value(json!({ "data": { "event": "ping" } })).unwrap();
        assert!(matches!(parsed, InputLine::Parent { origin: None, .. }));

        let parsed: InputLine =
            serde_json::from_value(json!({ "action": "submitText", "value": "hi" })).unwrap();
        assert!(matches!(parsed, InputLine::Action(UserAction::SubmitText(_))));

        let parsed: InputLine =
            serde_json::from_value(json!({ "audio": { "type": "recordingStarted" } })).unwrap();
        assert!(matches!(
            parsed,
            InputLine::Audio {
                audio: AudioEvent::RecordingStarted
            }
        ));

        let parsed: InputLine = serde_json::from_value(json!({
            "liveChat": { "type": "agentMessage", "value": "hello" }
        }))
        .unwrap();
        assert!(matches!(parsed, InputLine::LiveChat { .. }));
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "widget-host",
            "--origin",
            "https://a.example.com",
            "--locales",
            "fr_FR,en_US",
            "--live-chat",
        ]);
        let mut config = widget_core::WidgetConfig::default();
        args.overrides().apply(&mut config);

        assert_eq!(config.channel.allowed_origins, vec!["https://a.example.com"]);
        assert_eq!(config.locales, vec!["fr_FR", "en_US"]);
        assert!(config.enable_live_chat);
        assert_eq!(config.backend.endpoint, None);
    }
}
