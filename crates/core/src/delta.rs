//! Keyed snapshot diffing and changelog rendering.
//!
//! [`diff`] splits two ordered record collections into added, removed,
//! and changed sets; [`render_message`] turns the result into the
//! commit message written alongside a new snapshot. Rendering is pure:
//! identical inputs always produce the identical message.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// The result of diffing two keyed record collections.
///
/// `added` preserves new-collection order, `removed` preserves
/// old-collection order, and `changed` pairs `(old, new)` in
/// new-collection order.
#[derive(Debug)]
pub struct Delta<'a, T> {
    pub added: Vec<&'a T>,
    pub removed: Vec<&'a T>,
    pub changed: Vec<(&'a T, &'a T)>,
}

impl<T> Delta<'_, T> {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A single field-level difference between two versions of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Diff two record collections keyed by `key_of`.
///
/// A record present in both collections counts as changed when its
/// serialized JSON value differs, so any field-level edit is caught
/// without the record type having to implement equality itself.
pub fn diff<'a, T, K, F>(old: &'a [T], new: &'a [T], key_of: F) -> Delta<'a, T>
where
    T: Serialize,
    K: Ord,
    F: Fn(&T) -> K,
{
    let old_by_key: BTreeMap<K, &T> = old.iter().map(|r| (key_of(r), r)).collect();
    let new_by_key: BTreeMap<K, &T> = new.iter().map(|r| (key_of(r), r)).collect();

    let added = new
        .iter()
        .filter(|r| !old_by_key.contains_key(&key_of(r)))
        .collect();
    let removed = old
        .iter()
        .filter(|r| !new_by_key.contains_key(&key_of(r)))
        .collect();

    let mut changed = Vec::new();
    for new_record in new {
        if let Some(&old_record) = old_by_key.get(&key_of(new_record)) {
            if to_value(old_record) != to_value(new_record) {
                changed.push((old_record, new_record));
            }
        }
    }

    Delta {
        added,
        removed,
        changed,
    }
}

/// The set of fields where `old` and `new` disagree.
///
/// Fields present only in the new record are reported as changes with
/// `before == None`; fields dropped from the record likewise appear
/// with `after == None`.
pub fn field_changes<T: Serialize>(old: &T, new: &T) -> Vec<FieldChange> {
    let old_value = to_value(old);
    let new_value = to_value(new);

    let (Value::Object(old_map), Value::Object(new_map)) = (&old_value, &new_value) else {
        if old_value != new_value {
            return vec![FieldChange {
                field: "value".to_string(),
                before: Some(old_value),
                after: Some(new_value),
            }];
        }
        return Vec::new();
    };

    let mut changes = Vec::new();
    for (field, after) in new_map {
        let before = old_map.get(field);
        if before != Some(after) {
            changes.push(FieldChange {
                field: field.clone(),
                before: before.cloned(),
                after: Some(after.clone()),
            });
        }
    }
    for (field, before) in old_map {
        if !new_map.contains_key(field) {
            changes.push(FieldChange {
                field: field.clone(),
                before: Some(before.clone()),
                after: None,
            });
        }
    }
    changes
}

fn to_value<T: Serialize>(record: &T) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

// ─── Rendering ────────────────────────────────────────────────────────────────

/// Renders individual records and record changes for changelog blocks.
pub trait Renderer<T: Serialize> {
    /// One human-readable block of text for a record.
    fn display_record(&self, record: &T) -> String;

    /// One line per changed field, `field: before => after`.
    fn display_changes(&self, old: &T, new: &T) -> String {
        field_changes(old, new)
            .iter()
            .map(|c| {
                format!(
                    "{}: {} => {}",
                    c.field,
                    render_value(c.before.as_ref()),
                    render_value(c.after.as_ref()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fallback renderer listing every field as `field = value`.
pub struct KeyValueRenderer;

impl<T: Serialize> Renderer<T> for KeyValueRenderer {
    fn display_record(&self, record: &T) -> String {
        match to_value(record) {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{} = {}", k, render_value(Some(v))))
                .collect::<Vec<_>>()
                .join("\n"),
            other => render_value(Some(&other)),
        }
    }
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Presentation settings for a rendered changelog.
#[derive(Debug, Clone)]
pub struct ReportStyle {
    /// Short name for the summary line, e.g. "lgeku".
    pub display_name: String,
    /// What one record is called, e.g. "outage".
    pub noun: String,
    /// Override for the plural form; `None` appends "s".
    pub plural: Option<String>,
    /// Whether to render a field-level block for changed records.
    pub show_changes: bool,
    /// Optional provenance URL appended as a trailing line.
    pub source_url: Option<String>,
}

impl ReportStyle {
    /// "outage" or "outages" depending on count.
    fn noun_phrase(&self, count: usize) -> String {
        if count == 1 {
            self.noun.clone()
        } else {
            self.plural
                .clone()
                .unwrap_or_else(|| format!("{}s", self.noun))
        }
    }

    /// "1 outage" / "3 outages".
    fn counted(&self, count: usize) -> String {
        format!("{} {}", count, self.noun_phrase(count))
    }
}

/// Render the commit message for a delta.
///
/// Shape: a summary line (`name: N added, M removed, K changed`, or
/// `Created name`/`Updated name` when the delta is empty), one block
/// per non-empty category, and an optional `Detected on <url>`
/// provenance line. `created` selects the verb used when there is
/// nothing to summarize.
pub fn render_message<T, R>(style: &ReportStyle, renderer: &R, delta: &Delta<'_, T>, created: bool) -> String
where
    T: Serialize,
    R: Renderer<T>,
{
    let mut blocks: Vec<String> = Vec::new();

    if !delta.added.is_empty() {
        let mut lines = vec![format!(
            "{} new {}:",
            delta.added.len(),
            style.noun_phrase(delta.added.len())
        )];
        for record in &delta.added {
            lines.push(renderer.display_record(record));
        }
        blocks.push(lines.join("\n").trim().to_string());
    }

    if !delta.removed.is_empty() {
        let mut lines = vec![format!(
            "{} removed:",
            style.counted(delta.removed.len())
        )];
        for record in &delta.removed {
            lines.push(renderer.display_record(record));
        }
        blocks.push(lines.join("\n").trim().to_string());
    }

    if style.show_changes && !delta.changed.is_empty() {
        let mut lines = vec![format!(
            "{} changed:",
            style.counted(delta.changed.len())
        )];
        for (old, new) in &delta.changed {
            lines.push(renderer.display_changes(old, new));
        }
        blocks.push(lines.join("\n").trim().to_string());
    }

    if let Some(url) = &style.source_url {
        blocks.push(format!("Detected on {}", url));
    }

    let mut summary = Vec::new();
    if !delta.added.is_empty() {
        summary.push(format!("{} added", style.counted(delta.added.len())));
    }
    if !delta.removed.is_empty() {
        summary.push(format!("{} removed", style.counted(delta.removed.len())));
    }
    if !delta.changed.is_empty() {
        summary.push(format!("{} changed", style.counted(delta.changed.len())));
    }

    let summary_text = if summary.is_empty() {
        let verb = if created { "Created" } else { "Updated" };
        format!("{} {}", verb, style.display_name)
    } else {
        format!("{}: {}", style.display_name, summary.join(", "))
    };

    format!("{}\n\n{}", summary_text, blocks.join("\n\n"))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Rec {
        id: u32,
        cause: &'static str,
    }

    fn style() -> ReportStyle {
        ReportStyle {
            display_name: "outages".to_string(),
            noun: "outage".to_string(),
            plural: None,
            show_changes: true,
            source_url: None,
        }
    }

    #[test]
    fn identical_collections_diff_empty() {
        let a = vec![Rec { id: 1, cause: "wind" }, Rec { id: 2, cause: "ice" }];
        let delta = diff(&a, &a, |r| r.id);
        assert!(delta.is_empty());
    }

    #[test]
    fn added_changed_scenario() {
        let old = vec![Rec { id: 1, cause: "wind" }];
        let new = vec![Rec { id: 1, cause: "ice" }, Rec { id: 2, cause: "wind" }];

        let delta = diff(&old, &new, |r| r.id);
        assert_eq!(delta.added, vec![&new[1]]);
        assert!(delta.removed.is_empty());
        assert_eq!(delta.changed, vec![(&old[0], &new[0])]);

        let changes = field_changes(delta.changed[0].0, delta.changed[0].1);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "cause");
        assert_eq!(changes[0].before, Some(Value::from("wind")));
        assert_eq!(changes[0].after, Some(Value::from("ice")));
    }

    #[test]
    fn reverse_diff_swaps_added_and_removed() {
        let a = vec![Rec { id: 1, cause: "wind" }];
        let b = vec![Rec { id: 1, cause: "ice" }, Rec { id: 2, cause: "wind" }];

        let forward = diff(&a, &b, |r| r.id);
        let backward = diff(&b, &a, |r| r.id);

        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
        assert_eq!(forward.changed.len(), backward.changed.len());
        assert_eq!(forward.changed[0].0, backward.changed[0].1);
        assert_eq!(forward.changed[0].1, backward.changed[0].0);
    }

    #[test]
    fn added_preserves_new_collection_order() {
        let old: Vec<Rec> = vec![];
        let new = vec![
            Rec { id: 9, cause: "a" },
            Rec { id: 2, cause: "b" },
            Rec { id: 5, cause: "c" },
        ];
        let delta = diff(&old, &new, |r| r.id);
        let ids: Vec<u32> = delta.added.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![9, 2, 5]);
    }

    #[test]
    fn message_summary_counts_all_categories() {
        let old = vec![Rec { id: 1, cause: "wind" }, Rec { id: 3, cause: "tree" }];
        let new = vec![Rec { id: 1, cause: "ice" }, Rec { id: 2, cause: "wind" }];
        let delta = diff(&old, &new, |r| r.id);

        let message = render_message(&style(), &KeyValueRenderer, &delta, false);
        let summary = message.lines().next().unwrap();
        assert_eq!(summary, "outages: 1 outage added, 1 outage removed, 1 outage changed");
        assert!(message.contains("1 new outage:"));
        assert!(message.contains("1 outage removed:"));
        assert!(message.contains("cause: wind => ice"));
    }

    #[test]
    fn empty_delta_renders_verb_line() {
        let a = vec![Rec { id: 1, cause: "wind" }];
        let delta = diff(&a, &a, |r| r.id);
        let message = render_message(&style(), &KeyValueRenderer, &delta, true);
        assert!(message.starts_with("Created outages"));
        let message = render_message(&style(), &KeyValueRenderer, &delta, false);
        assert!(message.starts_with("Updated outages"));
    }

    #[test]
    fn provenance_line_is_last() {
        let mut style = style();
        style.source_url = Some("https://example.com/map".to_string());
        let old: Vec<Rec> = vec![];
        let new = vec![Rec { id: 1, cause: "wind" }];
        let delta = diff(&old, &new, |r| r.id);
        let message = render_message(&style, &KeyValueRenderer, &delta, true);
        assert!(message.ends_with("Detected on https://example.com/map"));
    }

    #[test]
    fn plural_override_is_used() {
        let style = ReportStyle {
            display_name: "advisories".to_string(),
            noun: "advisory".to_string(),
            plural: Some("advisories".to_string()),
            show_changes: false,
            source_url: None,
        };
        let old: Vec<Rec> = vec![];
        let new = vec![Rec { id: 1, cause: "a" }, Rec { id: 2, cause: "b" }];
        let delta = diff(&old, &new, |r| r.id);
        let message = render_message(&style, &KeyValueRenderer, &delta, true);
        assert!(message.starts_with("advisories: 2 advisories added"));
    }

    #[test]
    fn new_only_field_is_reported() {
        let old = serde_json::json!({"id": 1});
        let new = serde_json::json!({"id": 1, "cause": "wind"});
        let changes = field_changes(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "cause");
        assert_eq!(changes[0].before, None);
    }
}
