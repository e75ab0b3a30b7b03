//! Recursive mapping merge

use serde_yaml::{Mapping, Value};

/// Merge `update` into `dest` in place.
///
/// Mapping values recurse into the existing entry. Every other value,
/// sequences included, replaces the destination value wholesale. When the
/// update holds a mapping where `dest` holds a scalar (or nothing), the
/// destination entry is reset to an empty mapping before merging.
pub fn recursive_update(dest: &mut Mapping, update: &Mapping) {
    for (key, value) in update {
        match value {
            Value::Mapping(nested) => {
                let slot = dest.entry(key.clone()).or_insert_with(|| Value::Mapping(Mapping::new()));
                if !slot.is_mapping() {
                    *slot = Value::Mapping(Mapping::new());
                }
                if let Value::Mapping(inner) = slot {
                    recursive_update(inner, nested);
                }
            }
            other => {
                dest.insert(key.clone(), other.clone());
            }
        }
    }
}
