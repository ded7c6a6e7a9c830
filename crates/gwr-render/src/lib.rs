// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-render
//!
//! Renders a change set in two forms: a human-readable text report (per
//! change: `"{op} {kind} {name}{diff-blob}"`, then a trailing summary) and a
//! structured JSON object (tab indentation, sorted keys, trailing newline).
//! Output is byte-stable: tests compare it verbatim.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gwr_diff::{ChangeOp, ChangeRecord, DiffSummary};
use gwr_mask::MaskSet;
use gwr_model::ConfigValue;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Output form for a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Human-readable text.
    Text,
    /// Structured JSON.
    Json,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output mode: {other}")),
        }
    }
}

/// Render the human-readable text report.
///
/// Diff blobs inside the change records are emitted verbatim (masking was
/// applied when they were rendered), followed by the summary block.
#[must_use]
pub fn render_text(changes: &[ChangeRecord], summary: &DiffSummary) -> String {
    let mut out = String::new();
    for change in changes {
        out.push_str(&format!(
            "{} {} {}{}\n",
            change.op, change.kind, change.name, change.diff
        ));
    }
    out.push_str(&format!(
        "Summary:\n  Created: {}\n  Updated: {}\n  Deleted: {}\n",
        summary.creating, summary.updating, summary.deleting
    ));
    out
}

/// Render the structured JSON report.
///
/// Shape: `{changes: {creating, updating, deleting}, summary, warnings,
/// errors}`. Tab indentation, lexicographically sorted keys, trailing
/// newline. Payload bodies are masked here when masking is enabled.
#[must_use]
pub fn render_json(
    changes: &[ChangeRecord],
    summary: &DiffSummary,
    warnings: &[String],
    errors: &[String],
    mask: &MaskSet,
) -> String {
    let mut creating = Vec::new();
    let mut updating = Vec::new();
    let mut deleting = Vec::new();
    for change in changes {
        let item = change_item(change, mask);
        match change.op {
            ChangeOp::Create => creating.push(item),
            ChangeOp::Update => updating.push(item),
            ChangeOp::Delete => deleting.push(item),
        }
    }

    let mut root = ConfigValue::object();
    let mut change_block = ConfigValue::object();
    change_block.insert("creating", ConfigValue::Array(creating));
    change_block.insert("updating", ConfigValue::Array(updating));
    change_block.insert("deleting", ConfigValue::Array(deleting));
    root.insert("changes", change_block);

    let mut summary_block = ConfigValue::object();
    summary_block.insert("creating", int(summary.creating));
    summary_block.insert("updating", int(summary.updating));
    summary_block.insert("deleting", int(summary.deleting));
    summary_block.insert("total", int(summary.total()));
    root.insert("summary", summary_block);

    root.insert(
        "warnings",
        ConfigValue::Array(warnings.iter().map(|w| ConfigValue::String(w.clone())).collect()),
    );
    root.insert(
        "errors",
        ConfigValue::Array(errors.iter().map(|e| ConfigValue::String(e.clone())).collect()),
    );

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    // ConfigValue objects iterate sorted, so key order is stable.
    if root.to_json().serialize(&mut serializer).is_err() {
        return String::from("{}\n");
    }
    buf.push(b'\n');
    String::from_utf8(buf).unwrap_or_else(|_| String::from("{}\n"))
}

fn change_item(change: &ChangeRecord, mask: &MaskSet) -> ConfigValue {
    let masked = |payload: &Option<ConfigValue>| {
        payload
            .as_ref()
            .map(|value| mask.mask_value(value))
            .unwrap_or(ConfigValue::Null)
    };
    let mut body = ConfigValue::object();
    body.insert("new", masked(&change.new));
    body.insert("old", masked(&change.old));

    let mut item = ConfigValue::object();
    item.insert("name", ConfigValue::String(change.name.clone()));
    item.insert("kind", ConfigValue::String(change.kind.as_str().to_string()));
    item.insert("body", body);
    item
}

fn int(value: u64) -> ConfigValue {
    ConfigValue::Number(gwr_model::Number::Int(value as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwr_diff::{DiffOptions, diff};
    use gwr_model::{Entity, EntityKind, Plugin, Service};
    use gwr_registry::Registry;
    use gwr_state::Snapshot;
    use serde_json::json;

    fn snapshot(entities: Vec<Entity>) -> Snapshot {
        let mut builder = Snapshot::builder();
        for entity in entities {
            builder.add(entity).unwrap();
        }
        builder.build(&Registry::new()).unwrap()
    }

    fn plugin_create_changes() -> (Vec<ChangeRecord>, DiffSummary) {
        let current = snapshot(vec![]);
        let target = snapshot(vec![Entity::Plugin(Plugin {
            id: Some("p1".into()),
            name: Some("rate-limiting".into()),
            enabled: Some(true),
            ..Plugin::default()
        })]);
        let result = diff(
            &current,
            &target,
            &Registry::new(),
            &DiffOptions::default(),
            &MaskSet::empty(),
        );
        (result.changes, result.summary)
    }

    #[test]
    fn mode_parses_and_displays() {
        assert_eq!("text".parse::<RenderMode>().unwrap(), RenderMode::Text);
        assert_eq!("JSON".parse::<RenderMode>().unwrap(), RenderMode::Json);
        assert!("yaml".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::Text.to_string(), "text");
    }

    #[test]
    fn text_report_lists_changes_and_summary() {
        let (changes, summary) = plugin_create_changes();
        let report = render_text(&changes, &summary);
        assert!(report.starts_with("creating plugin rate-limiting (global)\n"));
        assert!(report.contains("+  \"enabled\": true,"));
        assert!(report.ends_with("Summary:\n  Created: 1\n  Updated: 0\n  Deleted: 0\n"));
    }

    #[test]
    fn empty_change_set_renders_summary_only() {
        let report = render_text(&[], &DiffSummary::default());
        assert_eq!(report, "Summary:\n  Created: 0\n  Updated: 0\n  Deleted: 0\n");
    }

    #[test]
    fn json_report_shape_and_formatting() {
        let (changes, summary) = plugin_create_changes();
        let report = render_json(&changes, &summary, &[], &[], &MaskSet::empty());

        assert!(report.ends_with('\n'));
        assert!(report.contains("\t\"changes\""), "tab indentation expected: {report}");

        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["summary"]["creating"], json!(1));
        assert_eq!(parsed["summary"]["total"], json!(1));
        assert_eq!(parsed["changes"]["creating"][0]["kind"], json!("plugin"));
        assert_eq!(
            parsed["changes"]["creating"][0]["name"],
            json!("rate-limiting (global)")
        );
        assert_eq!(parsed["changes"]["creating"][0]["body"]["old"], json!(null));
        assert_eq!(
            parsed["changes"]["creating"][0]["body"]["new"]["name"],
            json!("rate-limiting")
        );
        assert_eq!(parsed["changes"]["updating"], json!([]));
        assert_eq!(parsed["warnings"], json!([]));
        assert_eq!(parsed["errors"], json!([]));
    }

    #[test]
    fn json_keys_are_sorted() {
        let (changes, summary) = plugin_create_changes();
        let report = render_json(&changes, &summary, &[], &[], &MaskSet::empty());
        let changes_pos = report.find("\"changes\"").unwrap();
        let errors_pos = report.find("\"errors\"").unwrap();
        let summary_pos = report.find("\"summary\"").unwrap();
        let warnings_pos = report.find("\"warnings\"").unwrap();
        assert!(changes_pos < errors_pos);
        assert!(errors_pos < summary_pos);
        assert!(summary_pos < warnings_pos);
    }

    #[test]
    fn json_masks_payload_bodies() {
        let env = gwr_mask::StaticEnvironment::default().var("GWR_HOST", "mockbin.org");
        let mask = MaskSet::from_environment(&env);

        let current = snapshot(vec![]);
        let target = snapshot(vec![Entity::Service(Service {
            id: Some("s1".into()),
            name: Some("svc1".into()),
            host: Some("mockbin.org".into()),
            ..Service::default()
        })]);
        let result = diff(&current, &target, &Registry::new(), &DiffOptions::default(), &mask);
        let report = render_json(&result.changes, &result.summary, &[], &[], &mask);
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(
            parsed["changes"]["creating"][0]["body"]["new"]["host"],
            json!("[masked]")
        );
    }

    #[test]
    fn warnings_and_errors_pass_through() {
        let report = render_json(
            &[],
            &DiffSummary::default(),
            &["delete suppressed".to_string()],
            &["[TRANSPORT] connection refused".to_string()],
            &MaskSet::empty(),
        );
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["warnings"][0], json!("delete suppressed"));
        assert_eq!(parsed["errors"][0], json!("[TRANSPORT] connection refused"));
    }

    #[test]
    fn delete_renders_full_entity_with_marker() {
        let current = snapshot(vec![Entity::Service(Service {
            id: Some("s1".into()),
            name: Some("svc1".into()),
            ..Service::default()
        })]);
        let target = snapshot(vec![]);
        let result = diff(
            &current,
            &target,
            &Registry::new(),
            &DiffOptions::default(),
            &MaskSet::empty(),
        );
        let report = render_text(&result.changes, &result.summary);
        assert!(report.starts_with("deleting service svc1\n- {\n"), "{report}");
        assert!(report.contains("-  \"name\": \"svc1\"\n- }\n"));
    }

    #[test]
    fn kind_names_in_change_items_match_kind_as_str() {
        let (changes, _) = plugin_create_changes();
        assert_eq!(changes[0].kind, EntityKind::Plugin);
        let item = change_item(&changes[0], &MaskSet::empty());
        assert_eq!(item.get("kind").unwrap().as_str(), Some("plugin"));
    }
}
