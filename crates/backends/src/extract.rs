//! Tolerant tool-call extraction from free-text model output.
//!
//! Several models emit tool calls in the message content instead of the
//! structured `tool_calls` field. This module recovers them with an ordered
//! pipeline of format stages, each producing zero or more calls:
//!
//! 1. `[TOOL_CALLS]name{json}` sentinel (plus the `{"function": ...}` variant)
//! 2. Fenced ```json blocks with `{"name": ..., "arguments": ...}` objects
//! 3. A bare JSON object with `name` and nested arguments — only when the
//!    earlier stages found nothing, so a block matched twice is not
//!    extracted twice
//! 4. `<tool_call><function=NAME><parameter=K>V</parameter>...</function></tool_call>`
//!    XML blocks, all of them, in order
//!
//! Every extracted call gets a freshly generated id. Arguments arriving as a
//! JSON string are parsed into a map; maps pass through; anything else
//! becomes the empty map.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use agentichat_core::{ArgMap, ToolCall};

/// Run the full extraction pipeline over `content`.
pub fn extract_tool_calls(content: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    calls.extend(extract_sentinel(content));
    calls.extend(extract_fenced_json(content));
    if calls.is_empty() {
        calls.extend(extract_bare_json(content));
    }
    calls.extend(extract_xml(content));
    calls
}

/// Coerce a parsed `arguments` value into the internal map form.
pub fn coerce_arguments(value: serde_json::Value) -> ArgMap {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => ArgMap::new(),
        },
        _ => ArgMap::new(),
    }
}

// ── Stage 1: [TOOL_CALLS] sentinel ───────────────────────────────────────

fn extract_sentinel(content: &str) -> Vec<ToolCall> {
    static NAMED: OnceLock<Regex> = OnceLock::new();
    static ANON: OnceLock<Regex> = OnceLock::new();
    let named = NAMED.get_or_init(|| Regex::new(r"\[TOOL_CALLS\](\w+)\s*\{").unwrap());
    let anon = ANON.get_or_init(|| Regex::new(r"\[TOOL_CALLS\]\{").unwrap());

    let mut calls = Vec::new();

    for caps in named.captures_iter(content) {
        let name = caps.get(1).unwrap().as_str();
        let open = caps.get(0).unwrap().end() - 1;
        let Some(json_str) = scan_json_object(content, open) else {
            continue;
        };
        match serde_json::from_str::<serde_json::Value>(json_str) {
            Ok(value) => {
                let arguments = coerce_arguments(value);
                debug!(tool = name, "Extracted tool call from [TOOL_CALLS] sentinel");
                calls.push(ToolCall::new(name, arguments));
            }
            Err(e) => debug!(error = %e, "Unparseable [TOOL_CALLS] arguments"),
        }
    }

    for m in anon.find_iter(content) {
        let open = m.end() - 1;
        let Some(json_str) = scan_json_object(content, open) else {
            continue;
        };
        let Ok(serde_json::Value::Object(mut map)) =
            serde_json::from_str::<serde_json::Value>(json_str)
        else {
            continue;
        };
        let Some(serde_json::Value::String(name)) = map.remove("function") else {
            continue;
        };
        debug!(tool = %name, "Extracted tool call from [TOOL_CALLS] function variant");
        calls.push(ToolCall::new(name, map));
    }

    calls
}

// ── Stage 2: fenced JSON blocks ──────────────────────────────────────────

fn extract_fenced_json(content: &str) -> Vec<ToolCall> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```json\s*(.+?)\s*```").unwrap());

    let mut calls = Vec::new();
    for caps in fence.captures_iter(content) {
        let block = caps.get(1).unwrap().as_str();
        for json_str in scan_all_objects(block) {
            if let Some(call) = parse_name_arguments_object(json_str) {
                calls.push(call);
            }
        }
    }
    calls
}

// ── Stage 3: bare JSON in prose ──────────────────────────────────────────

fn extract_bare_json(content: &str) -> Vec<ToolCall> {
    static BARE: OnceLock<Regex> = OnceLock::new();
    let bare = BARE
        .get_or_init(|| Regex::new(r#"\{[^{}]*"name"[^{}]*\{[^}]*\}[^{}]*\}"#).unwrap());

    bare.find_iter(content)
        .filter_map(|m| parse_name_arguments_object(m.as_str()))
        .collect()
}

// ── Stage 4: XML tool_call blocks ────────────────────────────────────────

fn extract_xml(content: &str) -> Vec<ToolCall> {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    static PARAM: OnceLock<Regex> = OnceLock::new();
    let block = BLOCK.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>\s*<function=(\w+)>(.*?)</function>\s*</tool_call>").unwrap()
    });
    let param =
        PARAM.get_or_init(|| Regex::new(r"(?s)<parameter=(\w+)>(.*?)</parameter>").unwrap());

    let mut calls = Vec::new();
    for caps in block.captures_iter(content) {
        let name = caps.get(1).unwrap().as_str();
        let params_block = caps.get(2).unwrap().as_str();

        let mut arguments = ArgMap::new();
        for p in param.captures_iter(params_block) {
            let key = p.get(1).unwrap().as_str().to_string();
            let value = p.get(2).unwrap().as_str().trim().to_string();
            arguments.insert(key, serde_json::Value::String(value));
        }

        debug!(tool = name, "Extracted tool call from XML block");
        calls.push(ToolCall::new(name, arguments));
    }
    calls
}

// ── Shared parsing helpers ───────────────────────────────────────────────

/// Parse a candidate object of the `{"name": ..., "arguments"|"parameters":
/// ...}` shape. Falls back to repairing unescaped backslashes (regexes in
/// JSON are a common model mistake) before giving up.
fn parse_name_arguments_object(json_str: &str) -> Option<ToolCall> {
    let value = serde_json::from_str::<serde_json::Value>(json_str)
        .ok()
        .or_else(|| serde_json::from_str(&fix_backslashes(json_str)).ok())?;

    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = obj
        .get("arguments")
        .or_else(|| obj.get("parameters"))
        .cloned()
        .map(coerce_arguments)
        .unwrap_or_default();

    debug!(tool = name, "Extracted tool call from JSON object");
    Some(ToolCall::new(name, arguments))
}

/// Double any backslash that does not start a valid JSON escape, e.g.
/// `\s+` becomes `\\s+`.
fn fix_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(next) if "\"\\/bfnrtu".contains(*next) => out.push(c),
                _ => {
                    out.push('\\');
                    out.push('\\');
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Return the balanced JSON object starting at `open` (which must index a
/// `{`), respecting strings and escapes. None when unterminated.
fn scan_json_object(s: &str, open: usize) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// All top-level JSON objects in a block, in order.
fn scan_all_objects(block: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = block[cursor..].find('{') {
        let open = cursor + offset;
        match scan_json_object(block, open) {
            Some(obj) => {
                objects.push(obj);
                cursor = open + obj.len();
            }
            None => break,
        }
    }
    objects
}
