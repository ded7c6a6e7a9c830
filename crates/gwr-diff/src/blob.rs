// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-oriented JSON-patch rendering.
//!
//! Update diffs render both payloads as one merged tree: unchanged leaves
//! become context lines (prefix `' '`), removed leaves `-` lines, added
//! leaves `+` lines. Keys are sorted lexicographically and nesting indents
//! by two spaces, so output is byte-stable across runs and suitable for
//! exact-string comparison in tests.

use gwr_model::ConfigValue;
use std::collections::BTreeSet;

/// Line marker: context, removed, or added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Ctx,
    Del,
    Add,
}

impl Mark {
    fn prefix(self) -> char {
        match self {
            Self::Ctx => ' ',
            Self::Del => '-',
            Self::Add => '+',
        }
    }
}

/// Render the patch between two object payloads.
///
/// The result starts with a newline so it can be appended directly after
/// `"{op} {kind} {name}"` in the human report.
#[must_use]
pub fn render_patch(old: &ConfigValue, new: &ConfigValue) -> String {
    let mut lines = Vec::new();
    diff_value(&mut lines, 0, None, old, new, false);
    assemble(lines)
}

/// Render a full payload with every line marked as added.
#[must_use]
pub fn render_added(value: &ConfigValue) -> String {
    let mut lines = Vec::new();
    emit_value(&mut lines, Mark::Add, 0, None, value, false);
    assemble(lines)
}

/// Render a full payload with every line marked as removed.
#[must_use]
pub fn render_removed(value: &ConfigValue) -> String {
    let mut lines = Vec::new();
    emit_value(&mut lines, Mark::Del, 0, None, value, false);
    assemble(lines)
}

fn assemble(lines: Vec<String>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push('\n');
        out.push_str(&line);
    }
    out
}

fn line(mark: Mark, depth: usize, content: &str, comma: bool) -> String {
    let mut s = String::new();
    s.push(mark.prefix());
    for _ in 0..depth {
        s.push_str("  ");
    }
    s.push_str(content);
    if comma {
        s.push(',');
    }
    s
}

fn key_prefix(key: Option<&str>) -> String {
    match key {
        Some(k) => format!("{}: ", serde_json::Value::String(k.to_string())),
        None => String::new(),
    }
}

fn scalar_text(value: &ConfigValue) -> String {
    value.to_json().to_string()
}

/// Emit a whole value under a single mark.
fn emit_value(
    out: &mut Vec<String>,
    mark: Mark,
    depth: usize,
    key: Option<&str>,
    value: &ConfigValue,
    comma: bool,
) {
    let prefix = key_prefix(key);
    match value {
        ConfigValue::Object(map) => {
            out.push(line(mark, depth, &format!("{prefix}{{"), false));
            let keys: Vec<&String> = map.keys().collect();
            for (i, k) in keys.iter().enumerate() {
                let last = i + 1 == keys.len();
                emit_value(out, mark, depth + 1, Some(k), &map[*k], !last);
            }
            out.push(line(mark, depth, "}", comma));
        }
        ConfigValue::Array(items) => {
            out.push(line(mark, depth, &format!("{prefix}["), false));
            for (i, item) in items.iter().enumerate() {
                let last = i + 1 == items.len();
                emit_value(out, mark, depth + 1, None, item, !last);
            }
            out.push(line(mark, depth, "]", comma));
        }
        scalar => {
            out.push(line(
                mark,
                depth,
                &format!("{prefix}{}", scalar_text(scalar)),
                comma,
            ));
        }
    }
}

/// Emit the difference between two values at the same position.
fn diff_value(
    out: &mut Vec<String>,
    depth: usize,
    key: Option<&str>,
    old: &ConfigValue,
    new: &ConfigValue,
    comma: bool,
) {
    if old == new {
        emit_value(out, Mark::Ctx, depth, key, new, comma);
        return;
    }
    match (old, new) {
        (ConfigValue::Object(old_map), ConfigValue::Object(new_map)) => {
            let prefix = key_prefix(key);
            out.push(line(Mark::Ctx, depth, &format!("{prefix}{{"), false));
            let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
            let total = keys.len();
            for (i, k) in keys.iter().enumerate() {
                let not_last = i + 1 != total;
                match (old_map.get(*k), new_map.get(*k)) {
                    (Some(o), Some(n)) => diff_value(out, depth + 1, Some(k), o, n, not_last),
                    (Some(o), None) => emit_value(out, Mark::Del, depth + 1, Some(k), o, not_last),
                    (None, Some(n)) => emit_value(out, Mark::Add, depth + 1, Some(k), n, not_last),
                    (None, None) => {}
                }
            }
            out.push(line(Mark::Ctx, depth, "}", comma));
        }
        (ConfigValue::Array(old_items), ConfigValue::Array(new_items))
            if old_items.len() == new_items.len() =>
        {
            let prefix = key_prefix(key);
            out.push(line(Mark::Ctx, depth, &format!("{prefix}["), false));
            let total = old_items.len();
            for (i, (o, n)) in old_items.iter().zip(new_items.iter()).enumerate() {
                diff_value(out, depth + 1, None, o, n, i + 1 != total);
            }
            out.push(line(Mark::Ctx, depth, "]", comma));
        }
        // Changed leaves, and arrays whose shape changed: old block then new.
        (o, n) => {
            emit_value(out, Mark::Del, depth, key, o, comma);
            emit_value(out, Mark::Add, depth, key, n, comma);
        }
    }
}
