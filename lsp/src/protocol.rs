//! JSON-RPC envelopes and LSP parameter builders.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::lenient;
use crate::types::{
    ApplyWorkspaceEditResponse, Diagnostic, FormattingOptions, Location, Position, Range,
    TextDocumentContentChangeEvent,
};

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error codes used by the client.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_CANCELLED: i64 = -32800;
}

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// Id of a request issued by the server. Echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Error object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("LSP error {code}: {message}")]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Lenient parse: a malformed error object still yields an error.
    pub(crate) fn from_value(value: &Value) -> Self {
        Self {
            code: value
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or(error_codes::INTERNAL_ERROR),
            message: lenient::str_field(value, "message").to_string(),
            data: value.get("data").cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// Reply to a server-issued request.
#[derive(Debug, Serialize)]
pub(crate) struct Response {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

pub(crate) fn initialize_params(
    root_uri: &Url,
    root_path: &Path,
    initialization_options: Option<&Value>,
) -> Value {
    json!({
        "processId": std::process::id(),
        "rootPath": root_path.to_string_lossy(),
        "rootUri": root_uri.as_str(),
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": true
                },
                "documentSymbol": {
                    "hierarchicalDocumentSymbolSupport": true
                },
                "publishDiagnostics": {
                    "relatedInformation": true
                },
                "codeAction": {
                    "codeActionLiteralSupport": {
                        "codeActionKind": { "valueSet": [] }
                    }
                },
                "semanticHighlightingCapabilities": {
                    "semanticHighlighting": true
                }
            },
            "window": {
                "showMessage": {}
            }
        },
        "initializationOptions": initialization_options.cloned().unwrap_or(Value::Null),
        "workspaceFolders": [{
            "uri": root_uri.as_str(),
            "name": "workspace"
        }]
    })
}

pub(crate) fn text_document_params(uri: &Url) -> Value {
    json!({ "textDocument": { "uri": uri.as_str() } })
}

pub(crate) fn text_document_position_params(uri: &Url, position: Position) -> Value {
    json!({
        "textDocument": { "uri": uri.as_str() },
        "position": position
    })
}

pub(crate) fn reference_params(uri: &Url, position: Position, include_declaration: bool) -> Value {
    let mut params = text_document_position_params(uri, position);
    params["context"] = json!({ "includeDeclaration": include_declaration });
    params
}

fn formatting_options(options: &FormattingOptions) -> Value {
    let mut out = options.extra.clone();
    out.insert("tabSize".into(), options.tab_size.into());
    out.insert("insertSpaces".into(), options.insert_spaces.into());
    Value::Object(out)
}

/// Whole-document formatting when `range` is `None`.
pub(crate) fn formatting_params(
    uri: &Url,
    range: Option<Range>,
    options: &FormattingOptions,
) -> Value {
    let mut params = text_document_params(uri);
    if let Some(range) = range {
        params["range"] = json!(range);
    }
    params["options"] = formatting_options(options);
    params
}

pub(crate) fn on_type_formatting_params(
    uri: &Url,
    position: Position,
    ch: char,
    options: &FormattingOptions,
) -> Value {
    let mut params = text_document_position_params(uri, position);
    params["ch"] = Value::String(ch.to_string());
    params["options"] = formatting_options(options);
    params
}

pub(crate) fn rename_params(uri: &Url, position: Position, new_name: &str) -> Value {
    let mut params = text_document_position_params(uri, position);
    params["newName"] = Value::String(new_name.to_string());
    params
}

pub(crate) fn code_action_params(
    uri: &Url,
    range: Range,
    kinds: &[String],
    diagnostics: &[Diagnostic],
) -> Value {
    let mut context = json!({
        "diagnostics": diagnostics.iter().map(diagnostic_to_json).collect::<Vec<_>>()
    });
    if !kinds.is_empty() {
        context["only"] = json!(kinds);
    }
    let mut params = text_document_params(uri);
    params["range"] = json!(range);
    params["context"] = context;
    params
}

pub(crate) fn execute_command_params(command: &str, arguments: Value) -> Value {
    json!({ "command": command, "arguments": arguments })
}

pub(crate) fn did_open_params(uri: &Url, language_id: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri.as_str(),
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(
    uri: &Url,
    version: i32,
    changes: &[TextDocumentContentChangeEvent],
) -> Value {
    let changes: Vec<Value> = changes
        .iter()
        .map(|change| match change.range {
            Some(range) => json!({ "range": range, "text": change.text }),
            None => json!({ "text": change.text }),
        })
        .collect();
    json!({
        "textDocument": {
            "uri": uri.as_str(),
            "version": version
        },
        "contentChanges": changes
    })
}

pub(crate) fn did_save_params(uri: &Url, text: Option<&str>) -> Value {
    let mut params = text_document_params(uri);
    if let Some(text) = text {
        params["text"] = Value::String(text.to_string());
    }
    params
}

pub(crate) fn did_close_params(uri: &Url) -> Value {
    text_document_params(uri)
}

pub(crate) fn change_configuration_params(settings: Value) -> Value {
    json!({ "settings": settings })
}

pub(crate) fn cancel_params(id: u64) -> Value {
    json!({ "id": id })
}

pub(crate) fn apply_workspace_edit_result(response: &ApplyWorkspaceEditResponse) -> Value {
    let mut result = json!({ "applied": response.applied });
    if let Some(reason) = &response.failure_reason {
        result["failureReason"] = Value::String(reason.clone());
    }
    result
}

fn location_to_json(location: &Location) -> Value {
    json!({ "uri": location.uri.as_str(), "range": location.range })
}

pub(crate) fn diagnostic_to_json(diagnostic: &Diagnostic) -> Value {
    let mut out = json!({
        "range": diagnostic.range,
        "message": diagnostic.message,
    });
    if let Some(code) = &diagnostic.code {
        out["code"] = Value::String(code.clone());
    }
    if let Some(severity) = diagnostic.severity {
        out["severity"] = json!(severity as u8);
    }
    if let Some(source) = &diagnostic.source {
        out["source"] = Value::String(source.clone());
    }
    if !diagnostic.related_information.is_empty() {
        out["relatedInformation"] = diagnostic
            .related_information
            .iter()
            .map(|related| {
                json!({
                    "location": location_to_json(&related.location),
                    "message": related.message
                })
            })
            .collect();
    }
    out
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<Url, PathToUriError> {
    Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}

/// Parse a document URI sent by the server.
///
/// Local files that exist are canonicalized so symlinked paths compare equal
/// to the ones the host opened.
pub(crate) fn normalize_uri(raw: &str) -> Option<Url> {
    let uri = Url::parse(raw).ok()?;
    let canonical = file_uri_to_path(&uri)
        .and_then(|path| std::fs::canonicalize(path).ok())
        .and_then(|path| path_to_file_uri(&path).ok());
    Some(canonical.unwrap_or(uri))
}
