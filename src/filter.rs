// 🧹 Post-Resolution Filter - drop orphans, dedupe alternate names

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::entities::{AlternateNames, CanonicalEntity};

/// Deduplicate in first-seen order, excluding `primary` and blanks.
pub fn remove_duplicate_strings(values: &[String], primary: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    values
        .iter()
        .filter(|value| !value.is_empty() && value.as_str() != primary)
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

/// Normalize `OtherNames` against the final `PrimaryName`.
pub fn dedupe_names<E: AlternateNames>(entity: &mut E) {
    let primary = entity.primary_name().to_string();
    let names = entity.other_names_mut();
    *names = remove_duplicate_strings(names, &primary);
}

/// Collapse items sharing a key. The last item wins and takes the slot of
/// the first. Returns the survivors and the number of items replaced.
pub(crate) fn last_wins<T, K>(items: impl IntoIterator<Item = T>, key: K) -> (Vec<T>, usize)
where
    K: Fn(&T) -> String,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<T> = Vec::new();
    let mut replaced = 0;

    for item in items {
        match positions.get(&key(&item)) {
            Some(&index) => {
                kept[index] = item;
                replaced += 1;
            }
            None => {
                positions.insert(key(&item), kept.len());
                kept.push(item);
            }
        }
    }
    (kept, replaced)
}

/// One entity per identifier, last record wins.
pub fn dedupe_by_identifier<E: CanonicalEntity>(entities: Vec<E>) -> Vec<E> {
    let (kept, duplicates) = last_wins(entities, |entity| entity.identifier().to_string());
    if duplicates > 0 {
        warn!(
            entity_type = E::ENTITY_TYPE,
            duplicates,
            "duplicate identifiers, keeping the last record"
        );
    }
    kept
}

/// Keep entities with an identifier, one per identifier, and dedupe their
/// alternate names.
pub fn finalize<E>(entities: Vec<E>) -> Vec<E>
where
    E: CanonicalEntity + AlternateNames,
{
    let total = entities.len();
    let kept: Vec<E> = drop_orphans(entities)
        .into_iter()
        .map(|mut entity| {
            dedupe_names(&mut entity);
            entity
        })
        .collect();

    if kept.len() < total {
        debug!(
            entity_type = E::ENTITY_TYPE,
            dropped = total - kept.len(),
            "dropped orphaned or duplicate entities"
        );
    }
    kept
}

/// Identifier filter for entities without alternate names.
pub fn drop_orphans<E: CanonicalEntity>(entities: Vec<E>) -> Vec<E> {
    let with_identifier = entities
        .into_iter()
        .filter(|entity| !entity.identifier().is_empty())
        .collect();
    dedupe_by_identifier(with_identifier)
}
