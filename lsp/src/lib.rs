//! LSP client transport and session core.
//!
//! Launches a language server, frames JSON-RPC over its stdio, correlates
//! replies with requests and tracks the session lifecycle. See [`LspClient`].

pub mod capabilities;
pub mod codec;
pub mod config;
pub mod types;

pub(crate) mod lenient;
pub(crate) mod protocol;
pub(crate) mod replies;
pub(crate) mod reverse;
pub(crate) mod router;
pub(crate) mod state;
pub(crate) mod transport;

mod client;

pub use capabilities::ServerCapabilities;
pub use client::{LspClient, RequestHandle};
pub use config::{ConfigError, ServerConfig};
pub use protocol::{PathToUriError, RequestId, ResponseError, error_codes};
pub use reverse::{ApplyEditResponder, DEFAULT_REVERSE_REQUEST_CAPACITY};
pub use state::{IllegalTransition, SessionState};
pub use types::{
    ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse, ClientEvent, CodeAction, Command,
    CompletionItem, Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity,
    DocumentHighlight, DocumentHighlightKind, DocumentSymbol, FormattingOptions, Hover, Location,
    MarkupContent, MarkupKind, MessageType, ParameterInformation, Position,
    PublishDiagnosticsParams, Range, SemanticHighlightingInformation, SemanticHighlightingParams,
    SemanticHighlightingToken, SignatureHelp, SignatureInformation, TextDocumentContentChangeEvent,
    TextEdit, WorkspaceEdit,
};
