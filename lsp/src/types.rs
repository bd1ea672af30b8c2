//! Public types exchanged with the host.
//!
//! Payloads coming from the server are converted into these types by the
//! lenient parsers in `replies`; the host only ever sees fully-resolved values
//! (missing fields already replaced by their defaults).

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::reverse::ApplyEditResponder;
use crate::state::SessionState;

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open `[start, end)` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whether `other` lies entirely within this range.
    #[must_use]
    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: Url,
    pub range: Range,
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRelatedInformation {
    pub location: Location,
    pub message: String,
}

/// A diagnostic as published by the server (or echoed back in a code action
/// request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: Range,
    /// `None` when the server omitted it or sent an unknown value.
    pub severity: Option<DiagnosticSeverity>,
    /// Numeric codes are carried in their decimal form.
    pub code: Option<String>,
    pub source: Option<String>,
    pub message: String,
    pub related_information: Vec<DiagnosticRelatedInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDiagnosticsParams {
    pub uri: Url,
    /// An empty list clears the document's diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// One highlighted span on a line, as packed by the server: 4 bytes of
/// start character, 2 bytes of length and 2 bytes of scope index, all big
/// endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticHighlightingToken {
    pub character: u32,
    pub length: u16,
    /// Index into [`crate::capabilities::SemanticHighlightingOptions::scopes`].
    pub scope: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticHighlightingInformation {
    pub line: u32,
    /// Empty when the server cleared the line.
    pub tokens: Vec<SemanticHighlightingToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticHighlightingParams {
    pub uri: Url,
    pub version: Option<i64>,
    pub lines: Vec<SemanticHighlightingInformation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkupKind {
    #[default]
    PlainText,
    Markdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupContent {
    pub kind: MarkupKind,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hover {
    pub contents: Vec<MarkupContent>,
    pub range: Option<Range>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentHighlightKind {
    #[default]
    Text = 1,
    Read = 2,
    Write = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHighlight {
    pub range: Range,
    pub kind: DocumentHighlightKind,
}

/// Document symbol tree node. Flat replies are nested by container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSymbol {
    pub name: String,
    /// LSP `SymbolKind` number; 0 when absent.
    pub kind: u32,
    pub range: Range,
    pub detail: String,
    pub children: Vec<DocumentSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    /// LSP `CompletionItemKind` number; 0 when absent.
    pub kind: u32,
    pub detail: String,
    pub documentation: Option<MarkupContent>,
    /// Defaults to the label.
    pub sort_text: String,
    /// Defaults to the label.
    pub insert_text: String,
}

/// Parameter label as a `[start, end)` character span within the signature
/// label, when it could be located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterInformation {
    pub label_span: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureInformation {
    pub label: String,
    pub documentation: Option<MarkupContent>,
    pub parameters: Vec<ParameterInformation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHelp {
    pub signatures: Vec<SignatureInformation>,
    pub active_signature: usize,
    pub active_parameter: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceEdit {
    pub changes: BTreeMap<Url, Vec<TextEdit>>,
}

impl WorkspaceEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub title: String,
    pub command: String,
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeAction {
    pub title: String,
    /// Empty for bare commands.
    pub kind: String,
    pub diagnostics: Vec<Diagnostic>,
    pub edit: WorkspaceEdit,
    pub command: Option<Command>,
}

/// Options sent with formatting requests.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattingOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
    /// Additional properties passed through verbatim.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
            extra: serde_json::Map::new(),
        }
    }
}

/// A `didChange` content change. `range: None` replaces the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocumentContentChangeEvent {
    pub range: Option<Range>,
    pub text: String,
}

impl TextDocumentContentChangeEvent {
    #[must_use]
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn ranged(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyWorkspaceEditParams {
    pub label: Option<String>,
    pub edit: WorkspaceEdit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyWorkspaceEditResponse {
    pub applied: bool,
    pub failure_reason: Option<String>,
}

/// `window/showMessage` severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Error = 1,
    Warning = 2,
    Info = 3,
    Log = 4,
}

impl MessageType {
    /// Unknown values map to [`MessageType::Log`].
    #[must_use]
    pub fn from_lsp(value: u64) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Warning,
            3 => Self::Info,
            _ => Self::Log,
        }
    }
}

/// An event emitted by a client session.
#[derive(Debug)]
pub enum ClientEvent {
    /// Session state changed.
    StateChanged {
        previous: SessionState,
        current: SessionState,
    },
    /// Diagnostics published for a document.
    Diagnostics(PublishDiagnosticsParams),
    /// The server asked for a message to be shown to the user.
    ShowMessage { kind: MessageType, message: String },
    /// Highlighting tokens pushed for a document.
    SemanticHighlighting(SemanticHighlightingParams),
    /// The server asked the client to apply an edit. The responder must be
    /// invoked for the server to receive a reply.
    ApplyEdit {
        params: ApplyWorkspaceEditParams,
        responder: ApplyEditResponder,
    },
}
