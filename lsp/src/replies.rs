//! Lenient conversion of server payloads into [`crate::types`].
//!
//! Every parser accepts any JSON value. Shapes that are not understood yield
//! empty collections or defaults; nothing here returns an error.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use url::Url;

use crate::lenient::{array_field, opt_str_field, str_field, u32_field};
use crate::protocol::normalize_uri;
use crate::types::{
    ApplyWorkspaceEditParams, CodeAction, Command, CompletionItem, Diagnostic,
    DiagnosticRelatedInformation, DiagnosticSeverity, DocumentHighlight, DocumentHighlightKind,
    DocumentSymbol, Hover, Location, MarkupContent, MarkupKind, ParameterInformation, Position,
    PublishDiagnosticsParams, Range, SemanticHighlightingInformation, SemanticHighlightingParams,
    SemanticHighlightingToken, SignatureHelp, SignatureInformation, TextEdit, WorkspaceEdit,
};

fn parse_position(value: &Value) -> Option<Position> {
    Some(Position::new(
        u32_field(value, "line")?,
        u32_field(value, "character")?,
    ))
}

pub(crate) fn parse_range(value: &Value) -> Option<Range> {
    Some(Range::new(
        parse_position(value.get("start")?)?,
        parse_position(value.get("end")?)?,
    ))
}

fn range_field(value: &Value) -> Range {
    value.get("range").and_then(parse_range).unwrap_or_default()
}

fn parse_location(value: &Value) -> Option<Location> {
    Some(Location {
        uri: normalize_uri(value.get("uri")?.as_str()?)?,
        range: range_field(value),
    })
}

/// A single object or an array of them.
fn one_or_many(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        Value::Object(_) => std::slice::from_ref(value),
        _ => &[],
    }
}

pub(crate) fn parse_locations(value: &Value) -> Vec<Location> {
    one_or_many(value)
        .iter()
        .filter_map(parse_location)
        .collect()
}

pub(crate) fn parse_document_highlights(value: &Value) -> Vec<DocumentHighlight> {
    one_or_many(value)
        .iter()
        .map(|item| DocumentHighlight {
            range: range_field(item),
            kind: match item.get("kind").and_then(Value::as_u64) {
                Some(2) => DocumentHighlightKind::Read,
                Some(3) => DocumentHighlightKind::Write,
                _ => DocumentHighlightKind::Text,
            },
        })
        .collect()
}

fn parse_markup(value: &Value) -> Option<MarkupContent> {
    match value {
        Value::String(text) => Some(MarkupContent {
            kind: MarkupKind::PlainText,
            value: text.clone(),
        }),
        Value::Object(_) => Some(MarkupContent {
            kind: match str_field(value, "kind") {
                "markdown" => MarkupKind::Markdown,
                _ => MarkupKind::PlainText,
            },
            value: str_field(value, "value").to_string(),
        }),
        _ => None,
    }
}

pub(crate) fn parse_hover(value: &Value) -> Hover {
    let contents = match value.get("contents") {
        // deprecated MarkedString[]
        Some(Value::Array(items)) => items.iter().filter_map(parse_markup).collect(),
        Some(single) => parse_markup(single).into_iter().collect(),
        None => Vec::new(),
    };
    Hover {
        contents,
        range: value.get("range").and_then(parse_range),
    }
}

struct SymbolNode {
    symbol: DocumentSymbol,
    parent: Option<usize>,
}

/// Parse a `documentSymbol` reply into a tree.
///
/// Hierarchical `DocumentSymbol[]` replies keep their nesting. Flat
/// `SymbolInformation[]` replies are nested by `containerName`: the container
/// is the most recent symbol with that name whose range encloses the child,
/// falling back to the most recent one with that name. Containers are
/// assumed to precede their children.
pub(crate) fn parse_document_symbols(value: &Value) -> Vec<DocumentSymbol> {
    let mut arena = Vec::new();
    for item in value.as_array().map(Vec::as_slice).unwrap_or_default() {
        collect_symbol(&mut arena, item, None);
    }
    assemble_symbol_tree(arena)
}

fn collect_symbol(arena: &mut Vec<SymbolNode>, item: &Value, parent: Option<usize>) {
    let range = item
        .get("range")
        .or_else(|| item.get("location").and_then(|l| l.get("range")))
        .and_then(parse_range);
    let Some(range) = range else {
        return;
    };

    let name = str_field(item, "name").to_string();
    let parent = parent.or_else(|| {
        let container = opt_str_field(item, "containerName")?;
        find_container(arena, &container, &range)
    });

    let index = arena.len();
    arena.push(SymbolNode {
        symbol: DocumentSymbol {
            name,
            kind: u32_field(item, "kind").unwrap_or(0),
            range,
            detail: str_field(item, "detail").to_string(),
            children: Vec::new(),
        },
        parent,
    });

    for child in array_field(item, "children") {
        collect_symbol(arena, child, Some(index));
    }
}

fn find_container(arena: &[SymbolNode], name: &str, range: &Range) -> Option<usize> {
    let mut fallback = None;
    for (index, node) in arena.iter().enumerate().rev() {
        if node.symbol.name != name {
            continue;
        }
        if node.symbol.range.contains(range) {
            return Some(index);
        }
        fallback.get_or_insert(index);
    }
    fallback
}

fn assemble_symbol_tree(arena: Vec<SymbolNode>) -> Vec<DocumentSymbol> {
    let mut parents = Vec::with_capacity(arena.len());
    let mut slots = Vec::with_capacity(arena.len());
    for node in arena {
        parents.push(node.parent);
        slots.push(Some(node.symbol));
    }

    // Parents always precede children, so walking backwards finishes every
    // child before its parent is moved out.
    let mut roots = Vec::new();
    for index in (0..slots.len()).rev() {
        let Some(symbol) = slots[index].take() else {
            continue;
        };
        match parents[index].and_then(|p| slots[p].as_mut()) {
            Some(parent) => parent.children.push(symbol),
            None => roots.push(symbol),
        }
    }

    roots.reverse();
    roots.iter_mut().for_each(restore_child_order);
    roots
}

fn restore_child_order(symbol: &mut DocumentSymbol) {
    symbol.children.reverse();
    symbol.children.iter_mut().for_each(restore_child_order);
}

/// `CompletionItem[]` or `CompletionList`.
pub(crate) fn parse_completion(value: &Value) -> Vec<CompletionItem> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        _ => array_field(value, "items"),
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            let label = str_field(item, "label").to_string();
            CompletionItem {
                kind: u32_field(item, "kind").unwrap_or(0),
                detail: str_field(item, "detail").to_string(),
                documentation: item.get("documentation").and_then(parse_markup),
                sort_text: opt_str_field(item, "sortText").unwrap_or_else(|| label.clone()),
                insert_text: opt_str_field(item, "insertText").unwrap_or_else(|| label.clone()),
                label,
            }
        })
        .collect()
}

fn parse_parameter(label: &str, parameter: &Value) -> ParameterInformation {
    let label_len = label.chars().count();
    let label_span = match parameter.get("label") {
        Some(Value::Array(offsets)) if offsets.len() == 2 => {
            let start = offsets[0].as_u64().and_then(|n| usize::try_from(n).ok());
            let end = offsets[1].as_u64().and_then(|n| usize::try_from(n).ok());
            match (start, end) {
                (Some(start), Some(end)) if start <= end && end <= label_len => Some((start, end)),
                _ => None,
            }
        }
        Some(Value::String(sub)) if !sub.is_empty() => label.find(sub.as_str()).map(|byte_at| {
            let start = label[..byte_at].chars().count();
            (start, start + sub.chars().count())
        }),
        _ => None,
    };
    ParameterInformation { label_span }
}

pub(crate) fn parse_signature_help(value: &Value) -> SignatureHelp {
    let signatures: Vec<SignatureInformation> = array_field(value, "signatures")
        .iter()
        .map(|info| {
            let label = str_field(info, "label").to_string();
            SignatureInformation {
                documentation: info.get("documentation").and_then(parse_markup),
                parameters: array_field(info, "parameters")
                    .iter()
                    .map(|p| parse_parameter(&label, p))
                    .collect(),
                label,
            }
        })
        .collect();

    let index = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    };
    let active_signature = index("activeSignature").min(signatures.len().saturating_sub(1));
    let active_parameter = index("activeParameter");

    SignatureHelp {
        signatures,
        active_signature,
        active_parameter,
    }
}

pub(crate) fn parse_text_edits(value: &Value) -> Vec<TextEdit> {
    value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|edit| edit.is_object())
        .map(|edit| TextEdit {
            range: range_field(edit),
            new_text: str_field(edit, "newText").to_string(),
        })
        .collect()
}

/// Both `changes` and `documentChanges` are folded into one map.
/// Resource operations (create/rename/delete) are ignored.
pub(crate) fn parse_workspace_edit(value: &Value) -> WorkspaceEdit {
    let mut changes: BTreeMap<Url, Vec<TextEdit>> = BTreeMap::new();

    if let Some(Value::Object(map)) = value.get("changes") {
        for (uri, edits) in map {
            if let Some(uri) = normalize_uri(uri) {
                changes.entry(uri).or_default().extend(parse_text_edits(edits));
            }
        }
    }

    for document_edit in array_field(value, "documentChanges") {
        let uri = document_edit
            .get("textDocument")
            .and_then(|doc| doc.get("uri"))
            .and_then(Value::as_str)
            .and_then(normalize_uri);
        if let Some(uri) = uri {
            let edits = parse_text_edits(document_edit.get("edits").unwrap_or(&Value::Null));
            changes.entry(uri).or_default().extend(edits);
        }
    }

    WorkspaceEdit { changes }
}

fn parse_command(value: &Value) -> Command {
    Command {
        title: str_field(value, "title").to_string(),
        command: str_field(value, "command").to_string(),
        arguments: array_field(value, "arguments").to_vec(),
    }
}

fn parse_diagnostic(value: &Value) -> Diagnostic {
    let code = match value.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    Diagnostic {
        range: range_field(value),
        severity: value
            .get("severity")
            .and_then(Value::as_u64)
            .and_then(DiagnosticSeverity::from_lsp),
        code,
        source: opt_str_field(value, "source"),
        message: str_field(value, "message").to_string(),
        related_information: array_field(value, "relatedInformation")
            .iter()
            .filter_map(|related| {
                Some(DiagnosticRelatedInformation {
                    location: parse_location(related.get("location")?)?,
                    message: str_field(related, "message").to_string(),
                })
            })
            .collect(),
    }
}

pub(crate) fn parse_diagnostics(value: &Value) -> Vec<Diagnostic> {
    value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|d| d.is_object())
        .map(parse_diagnostic)
        .collect()
}

/// Entries may be `CodeAction` or bare `Command`.
pub(crate) fn parse_code_actions(value: &Value) -> Vec<CodeAction> {
    value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|action| action.is_object())
        .map(|action| {
            if action.get("command").is_some_and(Value::is_string) {
                let command = parse_command(action);
                CodeAction {
                    title: command.title.clone(),
                    command: Some(command),
                    ..CodeAction::default()
                }
            } else {
                CodeAction {
                    title: str_field(action, "title").to_string(),
                    kind: str_field(action, "kind").to_string(),
                    diagnostics: parse_diagnostics(action.get("diagnostics").unwrap_or(&Value::Null)),
                    edit: action
                        .get("edit")
                        .map(parse_workspace_edit)
                        .unwrap_or_default(),
                    command: action
                        .get("command")
                        .filter(|c| c.is_object())
                        .map(parse_command),
                }
            }
        })
        .collect()
}

/// `None` when the notification does not name a document.
pub(crate) fn parse_publish_diagnostics(params: &Value) -> Option<PublishDiagnosticsParams> {
    Some(PublishDiagnosticsParams {
        uri: normalize_uri(params.get("uri")?.as_str()?)?,
        diagnostics: parse_diagnostics(params.get("diagnostics").unwrap_or(&Value::Null)),
    })
}

pub(crate) fn parse_apply_edit_params(params: &Value) -> ApplyWorkspaceEditParams {
    ApplyWorkspaceEditParams {
        label: opt_str_field(params, "label"),
        edit: params
            .get("edit")
            .map(parse_workspace_edit)
            .unwrap_or_default(),
    }
}

const SEMANTIC_TOKEN_SIZE: usize = 8;

fn decode_semantic_tokens(encoded: &str) -> Option<Vec<SemanticHighlightingToken>> {
    let raw = STANDARD.decode(encoded).ok()?;
    if raw.len() % SEMANTIC_TOKEN_SIZE != 0 {
        return None;
    }
    let tokens = raw
        .chunks_exact(SEMANTIC_TOKEN_SIZE)
        .map(|chunk| SemanticHighlightingToken {
            character: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            length: u16::from_be_bytes([chunk[4], chunk[5]]),
            scope: u16::from_be_bytes([chunk[6], chunk[7]]),
        })
        .collect();
    Some(tokens)
}

/// Lines without a line number or with undecodable tokens are skipped.
pub(crate) fn parse_semantic_highlighting(params: &Value) -> Option<SemanticHighlightingParams> {
    let document = params.get("textDocument")?;
    let uri = normalize_uri(document.get("uri")?.as_str()?)?;
    let lines = array_field(params, "lines")
        .iter()
        .filter_map(|line| {
            let number = u32_field(line, "line")?;
            let encoded = str_field(line, "tokens");
            match decode_semantic_tokens(encoded) {
                Some(tokens) => Some(SemanticHighlightingInformation {
                    line: number,
                    tokens,
                }),
                None => {
                    tracing::warn!("Dropping malformed semantic tokens for line {number}");
                    None
                }
            }
        })
        .collect();
    Some(SemanticHighlightingParams {
        uri,
        version: document.get("version").and_then(Value::as_i64),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn range_json(sl: u32, sc: u32, el: u32, ec: u32) -> Value {
        json!({
            "start": { "line": sl, "character": sc },
            "end": { "line": el, "character": ec }
        })
    }

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range::new(Position::new(sl, sc), Position::new(el, ec))
    }

    #[test]
    fn test_locations_single_or_array() {
        let single = json!({ "uri": "file:///nowhere/a.rs", "range": range_json(1, 2, 1, 5) });
        let locations = parse_locations(&single);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri.as_str(), "file:///nowhere/a.rs");
        assert_eq!(locations[0].range, range(1, 2, 1, 5));

        let many = json!([single, { "uri": "file:///nowhere/b.rs" }, { "range": {} }, 4]);
        let locations = parse_locations(&many);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[1].range, Range::default());

        assert!(parse_locations(&Value::Null).is_empty());
    }

    #[test]
    fn test_hover_content_forms() {
        let markup = json!({ "contents": { "kind": "markdown", "value": "**fn** main" } });
        let hover = parse_hover(&markup);
        assert_eq!(hover.contents.len(), 1);
        assert_eq!(hover.contents[0].kind, MarkupKind::Markdown);
        assert!(hover.range.is_none());

        let marked = json!({
            "contents": ["plain", { "language": "rust", "value": "fn main()" }],
            "range": range_json(0, 0, 0, 4)
        });
        let hover = parse_hover(&marked);
        assert_eq!(hover.contents.len(), 2);
        assert_eq!(hover.contents[0].value, "plain");
        assert_eq!(hover.contents[1].value, "fn main()");
        assert_eq!(hover.contents[1].kind, MarkupKind::PlainText);
        assert_eq!(hover.range, Some(range(0, 0, 0, 4)));

        assert_eq!(parse_hover(&Value::Null), Hover::default());
    }

    #[test]
    fn test_document_highlights_default_kind() {
        let highlights = parse_document_highlights(&json!([
            { "range": range_json(1, 0, 1, 3) },
            { "range": range_json(2, 0, 2, 3), "kind": 3 }
        ]));
        assert_eq!(highlights[0].kind, DocumentHighlightKind::Text);
        assert_eq!(highlights[1].kind, DocumentHighlightKind::Write);
    }

    #[test]
    fn test_hierarchical_document_symbols() {
        let symbols = parse_document_symbols(&json!([{
            "name": "Server",
            "kind": 23,
            "range": range_json(0, 0, 20, 1),
            "selectionRange": range_json(0, 7, 0, 13),
            "children": [
                { "name": "start", "kind": 6, "range": range_json(2, 4, 5, 5), "detail": "fn()" },
                { "name": "stop", "kind": 6, "range": range_json(7, 4, 9, 5) }
            ]
        }, {
            "name": "main",
            "kind": 12,
            "range": range_json(22, 0, 24, 1)
        }]));

        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Server");
        let children: Vec<_> = symbols[0].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["start", "stop"]);
        assert_eq!(symbols[0].children[0].detail, "fn()");
        assert_eq!(symbols[1].name, "main");
    }

    #[test]
    fn test_flat_symbols_nested_by_container() {
        let location = |sl, el| json!({ "uri": "file:///nowhere/a.rs", "range": range_json(sl, 0, el, 1) });
        let symbols = parse_document_symbols(&json!([
            { "name": "outer", "kind": 2, "location": location(0, 10) },
            { "name": "Thing", "kind": 5, "location": location(1, 4), "containerName": "outer" },
            { "name": "outer", "kind": 2, "location": location(20, 30) },
            { "name": "Other", "kind": 5, "location": location(21, 22), "containerName": "outer" },
            { "name": "lonely", "kind": 12, "location": location(40, 41), "containerName": "missing" },
            { "name": "broken", "kind": 12 }
        ]));

        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["outer", "outer", "lonely"]);
        assert_eq!(symbols[0].children.len(), 1);
        assert_eq!(symbols[0].children[0].name, "Thing");
        assert_eq!(symbols[1].children.len(), 1);
        assert_eq!(symbols[1].children[0].name, "Other");
    }

    #[test]
    fn test_flat_symbol_falls_back_to_latest_container() {
        let location = |sl, el| json!({ "uri": "file:///nowhere/a.rs", "range": range_json(sl, 0, el, 1) });
        let symbols = parse_document_symbols(&json!([
            { "name": "m", "kind": 2, "location": location(0, 1) },
            { "name": "m", "kind": 2, "location": location(5, 6) },
            { "name": "x", "kind": 13, "location": location(50, 51), "containerName": "m" }
        ]));
        assert_eq!(symbols.len(), 2);
        assert!(symbols[0].children.is_empty());
        assert_eq!(symbols[1].children[0].name, "x");
    }

    #[test]
    fn test_completion_list_and_defaults() {
        let items = parse_completion(&json!({
            "isIncomplete": false,
            "items": [
                { "label": "push", "kind": 2, "documentation": "Appends", "insertText": "push($0)" },
                { "label": "pop", "sortText": "0001" },
                "junk"
            ]
        }));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].insert_text, "push($0)");
        assert_eq!(items[0].sort_text, "push");
        assert_eq!(items[0].documentation.as_ref().unwrap().value, "Appends");
        assert_eq!(items[1].insert_text, "pop");
        assert_eq!(items[1].sort_text, "0001");
        assert_eq!(items[1].kind, 0);

        let bare = parse_completion(&json!([{ "label": "x" }]));
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn test_signature_help_parameter_spans() {
        let help = parse_signature_help(&json!({
            "signatures": [{
                "label": "fn add(a: i32, b: i32)",
                "parameters": [
                    { "label": "a: i32" },
                    { "label": [15, 21] },
                    { "label": [15, 99] },
                    { "label": "zzz" }
                ]
            }],
            "activeSignature": 7,
            "activeParameter": 1
        }));
        let params = &help.signatures[0].parameters;
        assert_eq!(params[0].label_span, Some((7, 13)));
        assert_eq!(params[1].label_span, Some((15, 21)));
        assert_eq!(params[2].label_span, None);
        assert_eq!(params[3].label_span, None);
        assert_eq!(help.active_signature, 0);
        assert_eq!(help.active_parameter, 1);

        assert_eq!(parse_signature_help(&json!(null)), SignatureHelp::default());
    }

    #[test]
    fn test_workspace_edit_changes_and_document_changes() {
        let edit = parse_workspace_edit(&json!({
            "changes": {
                "file:///nowhere/a.rs": [{ "range": range_json(0, 0, 0, 3), "newText": "let" }]
            },
            "documentChanges": [
                {
                    "textDocument": { "uri": "file:///nowhere/b.rs", "version": 3 },
                    "edits": [{ "range": range_json(1, 0, 1, 0), "newText": "// hi\n" }]
                },
                { "kind": "create", "uri": "file:///nowhere/c.rs" }
            ]
        }));
        assert_eq!(edit.changes.len(), 2);
        let a = Url::parse("file:///nowhere/a.rs").unwrap();
        assert_eq!(edit.changes[&a][0].new_text, "let");
        let b = Url::parse("file:///nowhere/b.rs").unwrap();
        assert_eq!(edit.changes[&b][0].range, range(1, 0, 1, 0));
    }

    #[test]
    fn test_code_actions_and_commands() {
        let actions = parse_code_actions(&json!([
            { "title": "Run", "command": "run.test", "arguments": [1] },
            {
                "title": "Remove unused",
                "kind": "quickfix",
                "diagnostics": [{ "range": range_json(0, 0, 0, 1), "message": "unused", "code": 6133 }],
                "edit": { "changes": { "file:///nowhere/a.rs": [] } },
                "command": { "title": "After", "command": "after.fix" }
            }
        ]));
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].title, "Run");
        assert!(actions[0].kind.is_empty());
        assert_eq!(actions[0].command.as_ref().unwrap().arguments, vec![json!(1)]);

        assert_eq!(actions[1].kind, "quickfix");
        assert_eq!(actions[1].diagnostics[0].code.as_deref(), Some("6133"));
        assert_eq!(actions[1].edit.changes.len(), 1);
        assert_eq!(actions[1].command.as_ref().unwrap().command, "after.fix");
    }

    #[test]
    fn test_publish_diagnostics() {
        let params = parse_publish_diagnostics(&json!({
            "uri": "file:///nowhere/test.rs",
            "diagnostics": [{
                "range": range_json(5, 3, 5, 10),
                "severity": 1,
                "source": "rustc",
                "message": "cannot find value `x`",
                "relatedInformation": [{
                    "location": { "uri": "file:///nowhere/other.rs", "range": range_json(1, 0, 1, 1) },
                    "message": "defined here"
                }]
            }, {
                "range": range_json(6, 0, 6, 1),
                "severity": 9,
                "message": "odd severity"
            }]
        }))
        .unwrap();
        assert_eq!(params.uri.as_str(), "file:///nowhere/test.rs");
        assert_eq!(params.diagnostics.len(), 2);
        let first = &params.diagnostics[0];
        assert_eq!(first.severity, Some(DiagnosticSeverity::Error));
        assert_eq!(first.source.as_deref(), Some("rustc"));
        assert_eq!(first.related_information[0].message, "defined here");
        assert_eq!(params.diagnostics[1].severity, None);
    }

    #[test]
    fn test_publish_diagnostics_requires_uri() {
        assert!(parse_publish_diagnostics(&json!({ "diagnostics": [] })).is_none());
        let cleared =
            parse_publish_diagnostics(&json!({ "uri": "file:///nowhere/a.rs", "diagnostics": [] }))
                .unwrap();
        assert!(cleared.diagnostics.is_empty());
    }

    #[test]
    fn test_apply_edit_params() {
        let params = parse_apply_edit_params(&json!({
            "label": "Rename",
            "edit": { "changes": { "file:///nowhere/a.rs": [{ "range": range_json(0, 0, 0, 1), "newText": "y" }] } }
        }));
        assert_eq!(params.label.as_deref(), Some("Rename"));
        assert!(!params.edit.is_empty());

        let empty = parse_apply_edit_params(&json!({}));
        assert!(empty.label.is_none());
        assert!(empty.edit.is_empty());
    }

    fn packed_tokens(tokens: &[(u32, u16, u16)]) -> String {
        let mut raw = Vec::new();
        for (character, length, scope) in tokens {
            raw.extend_from_slice(&character.to_be_bytes());
            raw.extend_from_slice(&length.to_be_bytes());
            raw.extend_from_slice(&scope.to_be_bytes());
        }
        STANDARD.encode(raw)
    }

    #[test]
    fn test_semantic_highlighting_decodes_big_endian_tokens() {
        let params = parse_semantic_highlighting(&json!({
            "textDocument": { "uri": "file:///nowhere/a.cpp", "version": 4 },
            "lines": [
                { "line": 2, "tokens": packed_tokens(&[(4, 3, 1), (70_000, 12, 258)]) },
                { "line": 5, "tokens": "" },
                { "line": 6 }
            ]
        }))
        .unwrap();
        assert_eq!(params.uri.as_str(), "file:///nowhere/a.cpp");
        assert_eq!(params.version, Some(4));
        assert_eq!(params.lines.len(), 3);
        assert_eq!(params.lines[0].line, 2);
        assert_eq!(
            params.lines[0].tokens,
            vec![
                SemanticHighlightingToken { character: 4, length: 3, scope: 1 },
                SemanticHighlightingToken { character: 70_000, length: 12, scope: 258 },
            ]
        );
        // empty or missing tokens clear the line
        assert!(params.lines[1].tokens.is_empty());
        assert!(params.lines[2].tokens.is_empty());
    }

    #[test]
    fn test_semantic_highlighting_skips_malformed_lines() {
        let params = parse_semantic_highlighting(&json!({
            "textDocument": { "uri": "file:///nowhere/a.cpp" },
            "lines": [
                { "line": 1, "tokens": STANDARD.encode([0_u8, 1, 2]) },
                { "line": 2, "tokens": "not base64!" },
                { "tokens": packed_tokens(&[(0, 1, 0)]) },
                { "line": 3, "tokens": packed_tokens(&[(0, 1, 0)]) }
            ]
        }))
        .unwrap();
        assert_eq!(params.version, None);
        assert_eq!(params.lines.len(), 1);
        assert_eq!(params.lines[0].line, 3);
    }

    #[test]
    fn test_semantic_highlighting_requires_document_uri() {
        assert!(parse_semantic_highlighting(&json!({ "lines": [] })).is_none());
        assert!(parse_semantic_highlighting(&json!({ "textDocument": {} })).is_none());
    }
}
