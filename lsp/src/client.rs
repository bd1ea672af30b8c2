//! The host-facing client: one language server session at a time.
//!
//! [`LspClient`] is the single owner of session state (id counter, pending
//! replies, reverse-request ring, lifecycle state). The I/O tasks spawned by
//! the transport only post to its inbox; the host drains the inbox with
//! [`LspClient::poll_events`] or [`LspClient::process_next`], which is when
//! reply handlers run and events are emitted.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use crate::capabilities::ServerCapabilities;
use crate::codec::{self, FrameDecoder, JsonObject};
use crate::config::ServerConfig;
use crate::lenient;
use crate::protocol::{
    self, Notification, Request, RequestId, Response, ResponseError, error_codes,
};
use crate::replies;
use crate::reverse::{ApplyEditResponder, ReverseRequests};
use crate::router::{self, Inbound, PendingReply, ReplyHandler, Router};
use crate::state::{SessionState, StateMachine};
use crate::transport::{InboxMessage, Transport};
use crate::types::{
    ApplyWorkspaceEditResponse, ClientEvent, CodeAction, CompletionItem, Diagnostic,
    DocumentHighlight, DocumentSymbol, FormattingOptions, Hover, Location, MessageType, Position,
    Range, SignatureHelp, TextDocumentContentChangeEvent, TextEdit, WorkspaceEdit,
};

/// Bound on reaping a server after it was killed during [`LspClient::stop`].
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Identifies an outstanding request for [`LspClient::cancel`].
///
/// Handles from an earlier session are inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    id: u64,
    generation: u64,
}

impl RequestHandle {
    /// JSON-RPC id the request was sent with.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Client for one language server.
///
/// Requests and notifications are only sent while the session is
/// [`SessionState::Running`]; otherwise they are refused and logged. Reply
/// handlers run at most once, from within [`LspClient::poll_events`] or
/// [`LspClient::process_next`], and are dropped uncalled when the request is
/// cancelled or the session ends.
pub struct LspClient {
    config: ServerConfig,
    /// Incremented on every start; tags I/O so stale traffic can be dropped.
    generation: u64,
    state: StateMachine,
    router: Router,
    reverse: ReverseRequests,
    decoder: FrameDecoder,
    capabilities: ServerCapabilities,
    exit_status: Option<ExitStatus>,
    transport: Option<Transport>,
    inbox_tx: mpsc::UnboundedSender<InboxMessage>,
    inbox_rx: mpsc::UnboundedReceiver<InboxMessage>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl std::fmt::Debug for LspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspClient")
            .field("command", &self.config.command)
            .field("generation", &self.generation)
            .field("state", &self.state.current())
            .field("pending", &self.router.pending_count())
            .finish_non_exhaustive()
    }
}

impl LspClient {
    #[must_use]
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            reverse: ReverseRequests::new(config.reverse_request_capacity),
            config,
            generation: 0,
            state: StateMachine::default(),
            router: Router::default(),
            decoder: FrameDecoder::new(),
            capabilities: ServerCapabilities::default(),
            exit_status: None,
            transport: None,
            inbox_tx,
            inbox_rx,
            events,
        };
        (client, events_rx)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// Capabilities from the last successful handshake.
    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// How the current or last session's server exited, once that exit has
    /// been processed. `None` while it runs or if the OS did not report it.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawn the server and send `initialize`.
    ///
    /// Returns immediately; the session becomes [`SessionState::Running`] once
    /// the reply has been processed. A no-op unless the session is
    /// [`SessionState::None`]. Must be called within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state.current() != SessionState::None {
            return Ok(());
        }
        self.launch().inspect_err(|e| {
            tracing::warn!("Failed to start LSP server {}: {e:#}", self.config.command);
        })
    }

    fn launch(&mut self) -> Result<()> {
        let root = std::fs::canonicalize(&self.config.root).with_context(|| {
            format!("resolving workspace root {}", self.config.root.display())
        })?;
        let root_uri =
            protocol::path_to_file_uri(&root).context("converting workspace root to URI")?;

        self.generation += 1;
        self.router = Router::default();
        self.reverse = ReverseRequests::new(self.config.reverse_request_capacity);
        self.decoder = FrameDecoder::new();
        self.capabilities = ServerCapabilities::default();
        self.exit_status = None;

        let transport =
            Transport::spawn(&self.config, &root, self.generation, self.inbox_tx.clone())?;
        self.transport = Some(transport);
        self.transition(SessionState::Started);

        let params = protocol::initialize_params(
            &root_uri,
            &root,
            self.config.initialization_options.as_ref(),
        );
        let id = self.router.register(PendingReply::Initialize);
        self.write(&Request::new(id, "initialize", Some(params)));
        Ok(())
    }

    /// Stop the server.
    ///
    /// A running session gets `shutdown` and `exit` first; pending handlers
    /// are dropped. Stdin is then closed. If the process has not exited
    /// within `terminate_timeout` it is terminated, and if it still has not
    /// exited within `kill_timeout` it is killed. A `None` timeout skips that
    /// phase. The session is [`SessionState::None`] on return if the process
    /// is gone; otherwise it gets there when the exit is processed.
    pub async fn stop(
        &mut self,
        terminate_timeout: Option<Duration>,
        kill_timeout: Option<Duration>,
    ) {
        if self.state.current() == SessionState::Running {
            self.shutdown();
        }
        self.router.abandon_all();

        let Some(transport) = self.transport.as_mut() else {
            self.transition(SessionState::None);
            return;
        };
        transport.close_input();

        if let Some(timeout) = terminate_timeout
            && !transport.wait_exit(timeout).await
        {
            tracing::debug!("LSP server didn't exit in time, terminating");
            transport.terminate();
        }
        if let Some(timeout) = kill_timeout
            && !transport.wait_exit(timeout).await
        {
            tracing::debug!("LSP server didn't terminate in time, killing");
            transport.kill();
            transport.wait_exit(KILL_REAP_TIMEOUT).await;
        }

        if transport.has_exited() {
            self.finish_session();
        }
    }

    /// Best-effort `shutdown` + `exit`. Replies to `shutdown` are ignored.
    fn shutdown(&mut self) {
        self.router.abandon_all();
        self.reverse.clear();
        let id = self.router.allocate_id();
        self.write(&Request::new(id, "shutdown", None));
        self.write(&Notification::new("exit", None));
        self.transition(SessionState::Shutdown);
    }

    /// The process is gone: drop everything tied to this session.
    fn finish_session(&mut self) {
        self.router.abandon_all();
        self.reverse.clear();
        self.transport = None;
        self.decoder = FrameDecoder::new();
        self.transition(SessionState::None);
    }

    fn transition(&mut self, next: SessionState) {
        match self.state.advance(next) {
            Ok(Some(transition)) => self.emit(ClientEvent::StateChanged {
                previous: transition.previous,
                current: transition.current,
            }),
            Ok(None) => {}
            Err(e) => tracing::warn!("{e}"),
        }
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("LSP event receiver dropped");
        }
    }

    /// Wait until the handshake completes, the session ends, or `timeout`
    /// elapses. Processes inbox messages while waiting.
    pub async fn wait_until_running(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.state.current() {
                SessionState::Running => return true,
                SessionState::Started => {}
                SessionState::None | SessionState::Shutdown => return false,
            }
            if tokio::time::timeout_at(deadline, self.process_next())
                .await
                .is_err()
            {
                return false;
            }
        }
    }

    /// Process up to `budget` queued inbox messages without waiting.
    /// Returns how many were processed.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut processed = 0;
        while processed < budget {
            let Ok(message) = self.inbox_rx.try_recv() else {
                break;
            };
            self.handle_inbox(message);
            processed += 1;
        }
        processed
    }

    /// Wait for the next inbox message and process it. Cancel-safe.
    pub async fn process_next(&mut self) {
        // `inbox_tx` lives in `self`, so the channel never closes.
        if let Some(message) = self.inbox_rx.recv().await {
            self.handle_inbox(message);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.transport.is_some()
    }

    fn handle_inbox(&mut self, message: InboxMessage) {
        match message {
            InboxMessage::Output { generation, bytes } => {
                if !self.is_current(generation) {
                    tracing::trace!("Dropping {} bytes from a stale LSP session", bytes.len());
                    return;
                }
                for object in self.decoder.push(&bytes) {
                    self.dispatch(object);
                }
            }
            InboxMessage::Exited { generation, status } => {
                if generation != self.generation {
                    tracing::trace!("Ignoring exit of a stale LSP session");
                    return;
                }
                self.exit_status = status;
                if self.transport.is_some() {
                    self.finish_session();
                }
            }
            InboxMessage::EditApplied {
                generation,
                id,
                response,
            } => self.answer_apply_edit(generation, id, &response),
        }
    }

    fn dispatch(&mut self, object: JsonObject) {
        let Some(inbound) = router::classify(object) else {
            tracing::debug!("Ignoring malformed JSON-RPC message from LSP server");
            return;
        };
        match inbound {
            Inbound::Notification { method, params } => {
                self.handle_notification(&method, &params);
            }
            Inbound::Request { id, method, params } => {
                self.handle_server_request(id, &method, &params);
            }
            Inbound::UnanswerableRequest { method } => {
                tracing::warn!("LSP server sent {method} with an invalid id; cannot reply");
            }
            Inbound::Response { id, outcome } => self.handle_response(id, outcome),
        }
    }

    fn handle_response(&mut self, id: Option<u64>, outcome: Result<Value, ResponseError>) {
        let Some(id) = id else {
            tracing::warn!("Dropping LSP reply with an id we never issued");
            return;
        };
        match self.router.take(id) {
            Some(PendingReply::Initialize) => self.finish_handshake(outcome),
            Some(PendingReply::Callback(handler)) => handler(outcome),
            None => tracing::debug!("Dropping LSP reply for unknown request {id}"),
        }
    }

    fn finish_handshake(&mut self, outcome: Result<Value, ResponseError>) {
        match outcome {
            Ok(result) => {
                let capabilities = result.get("capabilities").unwrap_or(&Value::Null);
                self.capabilities = ServerCapabilities::from_json(capabilities);
                self.write(&Notification::new("initialized", Some(json!({}))));
                self.transition(SessionState::Running);
                tracing::info!("LSP server '{}' initialized", self.config.command);
            }
            Err(error) => {
                tracing::warn!("LSP initialize failed: {error}");
                if let Some(transport) = &self.transport {
                    transport.kill();
                }
            }
        }
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        match method {
            "textDocument/publishDiagnostics" => match replies::parse_publish_diagnostics(params) {
                Some(diagnostics) => self.emit(ClientEvent::Diagnostics(diagnostics)),
                None => tracing::debug!("Ignoring publishDiagnostics without a usable uri"),
            },
            "textDocument/semanticHighlighting" => {
                match replies::parse_semantic_highlighting(params) {
                    Some(highlighting) => {
                        self.emit(ClientEvent::SemanticHighlighting(highlighting));
                    }
                    None => tracing::debug!("Ignoring semanticHighlighting without a usable uri"),
                }
            }
            "window/showMessage" => self.emit(ClientEvent::ShowMessage {
                kind: message_type(params),
                message: lenient::str_field(params, "message").to_string(),
            }),
            "window/logMessage" => {
                let message = lenient::str_field(params, "message");
                match message_type(params) {
                    MessageType::Error => tracing::error!("[{}] {message}", self.config.command),
                    MessageType::Warning => tracing::warn!("[{}] {message}", self.config.command),
                    MessageType::Info => tracing::info!("[{}] {message}", self.config.command),
                    MessageType::Log => tracing::debug!("[{}] {message}", self.config.command),
                }
            }
            _ => tracing::trace!("Ignoring LSP notification: {method}"),
        }
    }

    fn handle_server_request(&mut self, id: RequestId, method: &str, params: &Value) {
        if method == "workspace/applyEdit" {
            self.reverse.track(id.clone());
            let responder = ApplyEditResponder::new(id, self.generation, self.inbox_tx.clone());
            self.emit(ClientEvent::ApplyEdit {
                params: replies::parse_apply_edit_params(params),
                responder,
            });
            return;
        }

        tracing::debug!("LSP server sent request: {method}; replying method not found");
        let error = ResponseError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        );
        self.write(&Response::failure(id, error));
    }

    fn answer_apply_edit(
        &mut self,
        generation: u64,
        id: RequestId,
        response: &ApplyWorkspaceEditResponse,
    ) {
        if generation != self.generation || !self.reverse.take(&id) {
            tracing::warn!("Discarding applyEdit reply for expired server request {id}");
            return;
        }
        let result = protocol::apply_workspace_edit_result(response);
        self.write(&Response::success(id, result));
    }

    /// Encode and queue a message. Returns `false` when nothing was queued.
    fn write(&self, message: &impl Serialize) -> bool {
        let Some(transport) = &self.transport else {
            return false;
        };
        let encoded =
            serde_json::to_value(message).and_then(|value| codec::encode_frame(&value));
        let frame = match encoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode LSP message: {e}");
                return false;
            }
        };
        if !transport.send(frame) {
            tracing::debug!("LSP writer closed; message dropped");
            return false;
        }
        true
    }

    fn request(
        &mut self,
        method: &'static str,
        params: Value,
        handler: ReplyHandler,
    ) -> Option<RequestHandle> {
        if !self.state.accepts_traffic() {
            tracing::warn!(
                "Refusing LSP request {method}: session is {}",
                self.state.current()
            );
            return None;
        }
        let id = self.router.register(PendingReply::Callback(handler));
        self.write(&Request::new(id, method, Some(params)));
        Some(RequestHandle {
            id,
            generation: self.generation,
        })
    }

    fn typed_request<T, F>(
        &mut self,
        method: &'static str,
        params: Value,
        parse: fn(&Value) -> T,
        handler: F,
    ) -> Option<RequestHandle>
    where
        T: 'static,
        F: FnOnce(Result<T, ResponseError>) + Send + 'static,
    {
        self.request(method, params, router::typed_handler(handler, parse))
    }

    fn notify(&mut self, method: &'static str, params: Value) -> bool {
        if !self.state.accepts_traffic() {
            tracing::warn!(
                "Refusing LSP notification {method}: session is {}",
                self.state.current()
            );
            return false;
        }
        self.write(&Notification::new(method, Some(params)))
    }

    /// Cancel an outstanding request. Its handler will not run.
    ///
    /// Returns `false` if the request already completed, was already
    /// cancelled, or belongs to an earlier session.
    pub fn cancel(&mut self, handle: RequestHandle) -> bool {
        if handle.generation != self.generation || !self.router.cancel(handle.id) {
            return false;
        }
        self.write(&Notification::new(
            "$/cancelRequest",
            Some(protocol::cancel_params(handle.id)),
        ));
        true
    }

    // Requests

    pub fn document_symbols(
        &mut self,
        uri: &Url,
        handler: impl FnOnce(Result<Vec<DocumentSymbol>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/documentSymbol",
            protocol::text_document_params(uri),
            replies::parse_document_symbols,
            handler,
        )
    }

    pub fn definition(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<Vec<Location>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/definition",
            protocol::text_document_position_params(uri, position),
            replies::parse_locations,
            handler,
        )
    }

    pub fn declaration(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<Vec<Location>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/declaration",
            protocol::text_document_position_params(uri, position),
            replies::parse_locations,
            handler,
        )
    }

    pub fn references(
        &mut self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
        handler: impl FnOnce(Result<Vec<Location>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/references",
            protocol::reference_params(uri, position, include_declaration),
            replies::parse_locations,
            handler,
        )
    }

    pub fn hover(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<Hover, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/hover",
            protocol::text_document_position_params(uri, position),
            replies::parse_hover,
            handler,
        )
    }

    pub fn document_highlight(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<Vec<DocumentHighlight>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/documentHighlight",
            protocol::text_document_position_params(uri, position),
            replies::parse_document_highlights,
            handler,
        )
    }

    pub fn completion(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<Vec<CompletionItem>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/completion",
            protocol::text_document_position_params(uri, position),
            replies::parse_completion,
            handler,
        )
    }

    pub fn signature_help(
        &mut self,
        uri: &Url,
        position: Position,
        handler: impl FnOnce(Result<SignatureHelp, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/signatureHelp",
            protocol::text_document_position_params(uri, position),
            replies::parse_signature_help,
            handler,
        )
    }

    pub fn formatting(
        &mut self,
        uri: &Url,
        options: &FormattingOptions,
        handler: impl FnOnce(Result<Vec<TextEdit>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/formatting",
            protocol::formatting_params(uri, None, options),
            replies::parse_text_edits,
            handler,
        )
    }

    pub fn range_formatting(
        &mut self,
        uri: &Url,
        range: Range,
        options: &FormattingOptions,
        handler: impl FnOnce(Result<Vec<TextEdit>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/rangeFormatting",
            protocol::formatting_params(uri, Some(range), options),
            replies::parse_text_edits,
            handler,
        )
    }

    pub fn on_type_formatting(
        &mut self,
        uri: &Url,
        position: Position,
        ch: char,
        options: &FormattingOptions,
        handler: impl FnOnce(Result<Vec<TextEdit>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/onTypeFormatting",
            protocol::on_type_formatting_params(uri, position, ch, options),
            replies::parse_text_edits,
            handler,
        )
    }

    pub fn rename(
        &mut self,
        uri: &Url,
        position: Position,
        new_name: &str,
        handler: impl FnOnce(Result<WorkspaceEdit, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/rename",
            protocol::rename_params(uri, position, new_name),
            replies::parse_workspace_edit,
            handler,
        )
    }

    /// `kinds` restricts the reply to those code action kinds when non-empty.
    pub fn code_action(
        &mut self,
        uri: &Url,
        range: Range,
        kinds: &[String],
        diagnostics: &[Diagnostic],
        handler: impl FnOnce(Result<Vec<CodeAction>, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.typed_request(
            "textDocument/codeAction",
            protocol::code_action_params(uri, range, kinds, diagnostics),
            replies::parse_code_actions,
            handler,
        )
    }

    /// The reply is passed through as raw JSON.
    pub fn execute_command(
        &mut self,
        command: &str,
        arguments: Value,
        handler: impl FnOnce(Result<Value, ResponseError>) + Send + 'static,
    ) -> Option<RequestHandle> {
        self.request(
            "workspace/executeCommand",
            protocol::execute_command_params(command, arguments),
            Box::new(handler),
        )
    }

    // Notifications. Each returns whether the message was queued.

    pub fn did_open(&mut self, uri: &Url, language_id: &str, version: i32, text: &str) -> bool {
        self.notify(
            "textDocument/didOpen",
            protocol::did_open_params(uri, language_id, version, text),
        )
    }

    pub fn did_change(
        &mut self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> bool {
        self.notify(
            "textDocument/didChange",
            protocol::did_change_params(uri, version, changes),
        )
    }

    pub fn did_save(&mut self, uri: &Url, text: Option<&str>) -> bool {
        self.notify("textDocument/didSave", protocol::did_save_params(uri, text))
    }

    pub fn did_close(&mut self, uri: &Url) -> bool {
        self.notify("textDocument/didClose", protocol::did_close_params(uri))
    }

    pub fn did_change_configuration(&mut self, settings: Value) -> bool {
        self.notify(
            "workspace/didChangeConfiguration",
            protocol::change_configuration_params(settings),
        )
    }
}

fn message_type(params: &Value) -> MessageType {
    params
        .get("type")
        .and_then(Value::as_u64)
        .map_or(MessageType::Log, MessageType::from_lsp)
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if self.state.current() == SessionState::Running {
            self.shutdown();
        }
        if let Some(transport) = &self.transport {
            transport.close_input();
        }
    }
}
