//! Server capabilities declared in the `initialize` reply.
//!
//! Parsing never fails. Anything absent, `false`, or of the wrong type leaves
//! the corresponding capability unsupported. Providers declared either as
//! `true` or as an options object count as supported.

use serde_json::Value;

use crate::lenient::{array_field, bool_field, declared, string_list, trigger_chars};

/// How the server wants document changes synchronized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextDocumentSyncKind {
    /// Documents should not be synced at all.
    #[default]
    None,
    /// Send the full text on every change.
    Full,
    /// Send ranged changes only.
    Incremental,
}

impl TextDocumentSyncKind {
    fn from_lsp(value: &Value) -> Self {
        match value.as_u64() {
            Some(1) => Self::Full,
            Some(2) => Self::Incremental,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    pub provider: bool,
    pub resolve_provider: bool,
    pub trigger_characters: Vec<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureHelpOptions {
    pub provider: bool,
    pub trigger_characters: Vec<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnTypeFormattingOptions {
    pub provider: bool,
    /// `firstTriggerCharacter` first, then `moreTriggerCharacter`.
    pub trigger_characters: Vec<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteCommandOptions {
    pub provider: bool,
    pub commands: Vec<String>,
}

/// TextMate scope lists, indexed by the `scope` of each pushed token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemanticHighlightingOptions {
    pub scopes: Vec<Vec<String>>,
}

impl SemanticHighlightingOptions {
    #[must_use]
    pub fn provider(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Scopes for a token's scope index, if the server declared it.
    #[must_use]
    pub fn scope(&self, index: u16) -> Option<&[String]> {
        self.scopes.get(usize::from(index)).map(Vec::as_slice)
    }
}

/// What the server said it supports. Advisory: the client does not refuse
/// requests for undeclared capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub text_document_sync: TextDocumentSyncKind,
    pub hover_provider: bool,
    pub completion_provider: CompletionOptions,
    pub signature_help_provider: SignatureHelpOptions,
    pub definition_provider: bool,
    pub declaration_provider: bool,
    pub references_provider: bool,
    pub document_symbol_provider: bool,
    pub document_highlight_provider: bool,
    pub document_formatting_provider: bool,
    pub document_range_formatting_provider: bool,
    pub document_on_type_formatting_provider: OnTypeFormattingOptions,
    pub rename_provider: bool,
    pub code_action_provider: bool,
    pub execute_command_provider: ExecuteCommandOptions,
    pub workspace_folders_supported: bool,
    pub semantic_highlighting: SemanticHighlightingOptions,
}

impl ServerCapabilities {
    /// Parse the `capabilities` member of an `initialize` result.
    #[must_use]
    pub fn from_json(caps: &Value) -> Self {
        Self {
            text_document_sync: parse_sync_kind(caps.get("textDocumentSync")),
            hover_provider: declared(caps, "hoverProvider"),
            completion_provider: parse_completion(caps.get("completionProvider")),
            signature_help_provider: parse_signature_help(caps.get("signatureHelpProvider")),
            definition_provider: declared(caps, "definitionProvider"),
            declaration_provider: declared(caps, "declarationProvider"),
            references_provider: declared(caps, "referencesProvider"),
            document_symbol_provider: declared(caps, "documentSymbolProvider"),
            document_highlight_provider: declared(caps, "documentHighlightProvider"),
            document_formatting_provider: declared(caps, "documentFormattingProvider"),
            document_range_formatting_provider: declared(caps, "documentRangeFormattingProvider"),
            document_on_type_formatting_provider: parse_on_type_formatting(
                caps.get("documentOnTypeFormattingProvider"),
            ),
            rename_provider: declared(caps, "renameProvider"),
            code_action_provider: declared(caps, "codeActionProvider"),
            execute_command_provider: parse_execute_command(caps.get("executeCommandProvider")),
            workspace_folders_supported: caps
                .get("workspace")
                .and_then(|w| w.get("workspaceFolders"))
                .is_some_and(|f| bool_field(f, "supported")),
            semantic_highlighting: parse_semantic_highlighting(caps.get("semanticHighlighting")),
        }
    }
}

fn parse_sync_kind(sync: Option<&Value>) -> TextDocumentSyncKind {
    match sync {
        Some(Value::Object(options)) => options
            .get("change")
            .map_or(TextDocumentSyncKind::None, TextDocumentSyncKind::from_lsp),
        Some(kind) => TextDocumentSyncKind::from_lsp(kind),
        None => TextDocumentSyncKind::None,
    }
}

fn parse_completion(value: Option<&Value>) -> CompletionOptions {
    match value {
        Some(options @ Value::Object(_)) => CompletionOptions {
            provider: true,
            resolve_provider: bool_field(options, "resolveProvider"),
            trigger_characters: trigger_chars(options, "triggerCharacters"),
        },
        _ => CompletionOptions::default(),
    }
}

fn parse_signature_help(value: Option<&Value>) -> SignatureHelpOptions {
    match value {
        Some(options @ Value::Object(_)) => SignatureHelpOptions {
            provider: true,
            trigger_characters: trigger_chars(options, "triggerCharacters"),
        },
        _ => SignatureHelpOptions::default(),
    }
}

fn parse_on_type_formatting(value: Option<&Value>) -> OnTypeFormattingOptions {
    let Some(options @ Value::Object(_)) = value else {
        return OnTypeFormattingOptions::default();
    };
    let mut trigger_characters: Vec<char> = options
        .get("firstTriggerCharacter")
        .and_then(Value::as_str)
        .and_then(|s| s.chars().next())
        .into_iter()
        .collect();
    trigger_characters.extend(trigger_chars(options, "moreTriggerCharacter"));
    OnTypeFormattingOptions {
        provider: true,
        trigger_characters,
    }
}

fn parse_execute_command(value: Option<&Value>) -> ExecuteCommandOptions {
    match value {
        Some(options @ Value::Object(_)) => ExecuteCommandOptions {
            provider: true,
            commands: string_list(options, "commands"),
        },
        _ => ExecuteCommandOptions::default(),
    }
}

fn parse_semantic_highlighting(value: Option<&Value>) -> SemanticHighlightingOptions {
    let Some(options @ Value::Object(_)) = value else {
        return SemanticHighlightingOptions::default();
    };
    // A non-array entry keeps its slot so later indices stay aligned.
    let scopes = array_field(options, "scopes")
        .iter()
        .map(|entry| {
            entry
                .as_array()
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();
    SemanticHighlightingOptions { scopes }
}
