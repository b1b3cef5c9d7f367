//! Cascade diff and batch update.
//!
//! When a default-bearing column on an organization or provider changes, every
//! course row that inherits that field is rewritten in the same transaction as
//! the parent write. Rewrites are collapsed per row and grouped by identical
//! `SET` clause so each group is one `UPDATE ... WHERE id IN (...)`.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;

use crate::db::models::{ChatbotProvider, FieldValue, OrganizationSettings, SettingsField};
use crate::db::repos::{course_settings as course_repo, providers as provider_repo};
use crate::engine::resolve::resolve_defaults;
use crate::error::AppError;

/// One course row and the values it must take.
pub type CascadeEntry = (String, Vec<(SettingsField, FieldValue)>);

/// Rows that share one `SET` clause and one set of values.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeGroup {
    pub values: Vec<(SettingsField, FieldValue)>,
    pub ids: Vec<String>,
}

impl CascadeGroup {
    pub fn fields(&self) -> Vec<SettingsField> {
        self.values.iter().map(|(f, _)| *f).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    pub statements: usize,
    pub rows_updated: usize,
    pub course_settings_ids: BTreeSet<String>,
}

// ── Diff ────────────────────────────────────────────────────────────

/// Course fields whose organization-level default column differs between
/// `current` and `incoming`. `default_provider_id` maps to the model field.
pub fn changed_org_defaults(
    current: &OrganizationSettings,
    incoming: &OrganizationSettings,
) -> Vec<SettingsField> {
    let mut changed = Vec::new();
    if current.default_provider_id != incoming.default_provider_id {
        changed.push(SettingsField::Model);
    }
    if current.default_prompt != incoming.default_prompt {
        changed.push(SettingsField::Prompt);
    }
    if current.default_temperature != incoming.default_temperature {
        changed.push(SettingsField::Temperature);
    }
    if current.default_top_k != incoming.default_top_k {
        changed.push(SettingsField::TopK);
    }
    if current.default_similarity_threshold_documents
        != incoming.default_similarity_threshold_documents
    {
        changed.push(SettingsField::SimilarityThresholdDocuments);
    }
    if current.default_similarity_threshold_questions
        != incoming.default_similarity_threshold_questions
    {
        changed.push(SettingsField::SimilarityThresholdQuestions);
    }
    changed
}

/// Cascade entries for an organization settings update. `incoming` is the
/// row as it will be after the write.
pub fn plan_org_cascade(
    conn: &Connection,
    current: &OrganizationSettings,
    incoming: &OrganizationSettings,
) -> Result<Vec<CascadeEntry>, AppError> {
    let changed = changed_org_defaults(current, incoming);
    if changed.is_empty() {
        tracing::debug!(org_settings_id = %incoming.id, "No default-bearing columns changed");
        return Ok(Vec::new());
    }

    let default_provider = match incoming.default_provider_id {
        Some(ref id) => Some(provider_repo::find(conn, id)?),
        None => None,
    };
    let defaults = resolve_defaults(incoming, default_provider.as_ref());

    let mut entries = Vec::new();
    for field in changed {
        let Some(value) = defaults.get(field) else {
            tracing::debug!(
                org_settings_id = %incoming.id,
                field = %field,
                "Resolved default is unset, skipping cascade for field"
            );
            continue;
        };
        for id in course_repo::ids_using_default(conn, &incoming.id, field)? {
            entries.push((id, vec![(field, value.clone())]));
        }
    }
    Ok(entries)
}

/// Cascade entries for a provider update. Only the organization's default
/// provider feeds course defaults, and only through `default_model_id`.
pub fn plan_provider_cascade(
    conn: &Connection,
    org: &OrganizationSettings,
    current: &ChatbotProvider,
    incoming: &ChatbotProvider,
) -> Result<Vec<CascadeEntry>, AppError> {
    if current.default_model_id == incoming.default_model_id {
        return Ok(Vec::new());
    }
    if org.default_provider_id.as_deref() != Some(incoming.id.as_str()) {
        tracing::debug!(
            provider_id = %incoming.id,
            "Provider is not the organization default, no cascade"
        );
        return Ok(Vec::new());
    }
    let Some(ref model_id) = incoming.default_model_id else {
        tracing::debug!(provider_id = %incoming.id, "Provider default model cleared, no cascade");
        return Ok(Vec::new());
    };

    let ids = course_repo::ids_using_default(conn, &org.id, SettingsField::Model)?;
    Ok(ids
        .into_iter()
        .map(|id| (id, vec![(SettingsField::Model, FieldValue::Text(model_id.clone()))]))
        .collect())
}

// ── Collapse / group ────────────────────────────────────────────────

/// Merge entries that share a row id. Later values win on a field collision.
pub fn collapse(
    entries: Vec<CascadeEntry>,
) -> BTreeMap<String, BTreeMap<SettingsField, FieldValue>> {
    let mut collapsed: BTreeMap<String, BTreeMap<SettingsField, FieldValue>> = BTreeMap::new();
    for (id, values) in entries {
        let row = collapsed.entry(id).or_default();
        for (field, value) in values {
            row.insert(field, value);
        }
    }
    collapsed
}

/// Group collapsed rows by their set of field names, then by identical values.
/// Output order is deterministic: by field set, then first appearance.
pub fn group(
    collapsed: BTreeMap<String, BTreeMap<SettingsField, FieldValue>>,
) -> Vec<CascadeGroup> {
    let mut by_fields: BTreeMap<Vec<SettingsField>, Vec<CascadeGroup>> = BTreeMap::new();

    for (id, row) in collapsed {
        if row.is_empty() {
            continue;
        }
        let fields: Vec<SettingsField> = row.keys().copied().collect();
        let values: Vec<(SettingsField, FieldValue)> = row.into_iter().collect();
        let bucket = by_fields.entry(fields).or_default();
        match bucket.iter_mut().find(|g| g.values == values) {
            Some(existing) => existing.ids.push(id),
            None => bucket.push(CascadeGroup { values, ids: vec![id] }),
        }
    }

    by_fields.into_values().flatten().collect()
}

// ── Execute ─────────────────────────────────────────────────────────

/// Collapse, group and run the updates on `conn`.
///
/// `conn` is expected to be the transaction that carries the triggering
/// write; the caller commits or rolls back.
pub fn apply(conn: &Connection, entries: Vec<CascadeEntry>) -> Result<CascadeOutcome, AppError> {
    let groups = group(collapse(entries));
    let mut outcome = CascadeOutcome::default();

    for g in &groups {
        let rows = course_repo::bulk_update(conn, &g.ids, &g.values)?;
        tracing::debug!(
            fields = ?g.fields(),
            rows,
            "Applied grouped cascade update"
        );
        outcome.statements += 1;
        outcome.rows_updated += rows;
        outcome.course_settings_ids.extend(g.ids.iter().cloned());
    }

    if outcome.statements > 0 {
        tracing::info!(
            statements = outcome.statements,
            rows = outcome.rows_updated,
            "Cascade applied"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(id: &str, values: &[(SettingsField, FieldValue)]) -> CascadeEntry {
        (id.to_string(), values.to_vec())
    }

    #[test]
    fn test_collapse_merges_rows() {
        let collapsed = collapse(vec![
            entry("a", &[(SettingsField::Temperature, FieldValue::Real(0.5))]),
            entry("b", &[(SettingsField::Temperature, FieldValue::Real(0.5))]),
            entry("a", &[(SettingsField::TopK, FieldValue::Integer(3))]),
        ]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed["a"].len(), 2);
        assert_eq!(collapsed["b"].len(), 1);
    }

    #[test]
    fn test_collapse_later_value_wins() {
        let collapsed = collapse(vec![
            entry("a", &[(SettingsField::TopK, FieldValue::Integer(3))]),
            entry("a", &[(SettingsField::TopK, FieldValue::Integer(4))]),
        ]);
        assert_eq!(collapsed["a"][&SettingsField::TopK], FieldValue::Integer(4));
    }

    #[test]
    fn test_group_by_field_set() {
        let groups = group(collapse(vec![
            entry("a", &[(SettingsField::Temperature, FieldValue::Real(0.5))]),
            entry("b", &[(SettingsField::Temperature, FieldValue::Real(0.5))]),
            entry("a", &[(SettingsField::TopK, FieldValue::Integer(3))]),
            entry("c", &[(SettingsField::TopK, FieldValue::Integer(3))]),
        ]));
        assert_eq!(groups.len(), 3);

        let both = groups
            .iter()
            .find(|g| g.fields() == vec![SettingsField::Temperature, SettingsField::TopK])
            .unwrap();
        assert_eq!(both.ids, vec!["a".to_string()]);

        let temp_only = groups
            .iter()
            .find(|g| g.fields() == vec![SettingsField::Temperature])
            .unwrap();
        assert_eq!(temp_only.ids, vec!["b".to_string()]);
    }

    #[test]
    fn test_group_splits_differing_values() {
        let groups = group(collapse(vec![
            entry("a", &[(SettingsField::TopK, FieldValue::Integer(3))]),
            entry("b", &[(SettingsField::TopK, FieldValue::Integer(4))]),
            entry("c", &[(SettingsField::TopK, FieldValue::Integer(3))]),
        ]));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].ids, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(groups[1].ids, vec!["b".to_string()]);
    }

    fn arb_field() -> impl Strategy<Value = SettingsField> {
        prop::sample::select(SettingsField::ALL.to_vec())
    }

    fn arb_entries() -> impl Strategy<Value = Vec<CascadeEntry>> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["r1", "r2", "r3", "r4", "r5"]),
                arb_field(),
                0i64..3,
            ),
            0..40,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(id, field, v)| (id.to_string(), vec![(field, FieldValue::Integer(v))]))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_every_row_lands_in_exactly_one_group(entries in arb_entries()) {
            let collapsed = collapse(entries.clone());
            let groups = group(collapsed.clone());

            let mut seen: Vec<String> = groups.iter().flat_map(|g| g.ids.clone()).collect();
            seen.sort();
            let before = seen.len();
            seen.dedup();
            prop_assert_eq!(before, seen.len());
            prop_assert_eq!(seen, collapsed.keys().cloned().collect::<Vec<_>>());
        }

        #[test]
        fn prop_group_values_match_collapsed_rows(entries in arb_entries()) {
            let collapsed = collapse(entries);
            for g in group(collapsed.clone()) {
                for id in &g.ids {
                    let row: Vec<(SettingsField, FieldValue)> =
                        collapsed[id].iter().map(|(f, v)| (*f, v.clone())).collect();
                    prop_assert_eq!(&row, &g.values);
                }
            }
        }
    }
}
