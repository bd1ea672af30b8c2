//! Lantern CLI - probe a language server.
//!
//! Loads a server config, runs the `initialize` handshake, prints the
//! negotiated capabilities to stdout and shuts the server down again.
//!
//! ```text
//! lantern <config.toml>        # or LANTERN_CONFIG=<config.toml> lantern
//! ```
//!
//! Logs go to stderr; the filter comes from `RUST_LOG` (default `info`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lantern_lsp::{
    ApplyWorkspaceEditResponse, ClientEvent, LspClient, ServerCapabilities, ServerConfig,
    SessionState,
};

const CONFIG_ENV: &str = "LANTERN_CONFIG";

const INIT_TIMEOUT: Duration = Duration::from_secs(30);

const INBOX_BUDGET: usize = 64;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn config_path() -> Result<PathBuf> {
    if let Some(arg) = env::args_os().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    match env::var_os(CONFIG_ENV) {
        Some(path) => Ok(PathBuf::from(path)),
        None => bail!("usage: lantern <config.toml> (or set {CONFIG_ENV})"),
    }
}

fn yes_no(supported: bool) -> &'static str {
    if supported { "yes" } else { "no" }
}

fn chars(list: &[char]) -> String {
    list.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(" ")
}

fn print_capabilities(caps: &ServerCapabilities) {
    let rows = [
        ("hover", caps.hover_provider),
        ("completion", caps.completion_provider.provider),
        ("signature help", caps.signature_help_provider.provider),
        ("definition", caps.definition_provider),
        ("declaration", caps.declaration_provider),
        ("references", caps.references_provider),
        ("document symbols", caps.document_symbol_provider),
        ("document highlight", caps.document_highlight_provider),
        ("formatting", caps.document_formatting_provider),
        ("range formatting", caps.document_range_formatting_provider),
        (
            "on-type formatting",
            caps.document_on_type_formatting_provider.provider,
        ),
        ("rename", caps.rename_provider),
        ("code actions", caps.code_action_provider),
        ("execute command", caps.execute_command_provider.provider),
        ("workspace folders", caps.workspace_folders_supported),
        (
            "semantic highlighting",
            caps.semantic_highlighting.provider(),
        ),
    ];

    println!("text document sync: {:?}", caps.text_document_sync);
    for (name, supported) in rows {
        println!("{name}: {}", yes_no(supported));
    }
    if !caps.completion_provider.trigger_characters.is_empty() {
        println!(
            "completion triggers: {}",
            chars(&caps.completion_provider.trigger_characters)
        );
    }
    if !caps.signature_help_provider.trigger_characters.is_empty() {
        println!(
            "signature help triggers: {}",
            chars(&caps.signature_help_provider.trigger_characters)
        );
    }
    for command in &caps.execute_command_provider.commands {
        println!("command: {command}");
    }
}

fn handle_event(event: ClientEvent) {
    match event {
        ClientEvent::ShowMessage { kind, message } => {
            tracing::info!("server message ({kind:?}): {message}");
        }
        ClientEvent::Diagnostics(params) => {
            tracing::debug!(
                "{} diagnostics for {}",
                params.diagnostics.len(),
                params.uri
            );
        }
        ClientEvent::SemanticHighlighting(params) => {
            tracing::debug!(
                "semantic highlighting for {} lines of {}",
                params.lines.len(),
                params.uri
            );
        }
        ClientEvent::ApplyEdit { params, responder } => {
            tracing::info!(
                "declining workspace edit {}",
                params.label.as_deref().unwrap_or("(unlabelled)")
            );
            responder.respond(ApplyWorkspaceEditResponse {
                applied: false,
                failure_reason: Some("read-only probe".to_string()),
            });
        }
        ClientEvent::StateChanged { .. } => {}
    }
}

/// Handle queued events until the client has nothing more to process, so
/// replies queued by handlers reach the server.
fn drain(client: &mut LspClient, events: &mut mpsc::UnboundedReceiver<ClientEvent>) {
    loop {
        while let Ok(event) = events.try_recv() {
            handle_event(event);
        }
        if client.poll_events(INBOX_BUDGET) == 0 {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let path = config_path()?;
    let config = ServerConfig::load(&path)
        .with_context(|| format!("loading server config {}", path.display()))?;
    let shutdown_timeout = config.shutdown_timeout();

    let (mut client, mut events) = LspClient::new(config);
    client.start()?;

    let running = client.wait_until_running(INIT_TIMEOUT).await;

    drain(&mut client, &mut events);

    if running {
        print_capabilities(client.capabilities());
    }

    client
        .stop(Some(shutdown_timeout), Some(shutdown_timeout))
        .await;
    drain(&mut client, &mut events);

    if !running {
        bail!(
            "{} did not complete the handshake (session {})",
            client.config().command,
            client.state()
        );
    }
    if client.state() != SessionState::None {
        tracing::warn!("{} still running after stop", client.config().command);
    } else if let Some(status) = client.exit_status()
        && !status.success()
    {
        tracing::warn!("{} exited: {status}", client.config().command);
    }
    Ok(())
}
