//! Legacy record detection and schema migration.
//!
//! Detection is purely structural (legacy records predate the version
//! field), computed once into a [`RecordShape`] discriminator; the
//! transform then runs exactly one of two typed paths. The transform is
//! deterministic and idempotent: running it on its own output is a no-op
//! beyond stamping the version.

use crate::character::{is_custom_class, Character, CUSTOM_RACE, SCHEMA_VERSION};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors from processing a persisted record.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("character record is not a JSON object")]
    NotAnObject,

    #[error("invalid character record: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Which structural shape a persisted record exhibits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    Current,
    Legacy,
}

const CURRENCY_SCALARS: [&str; 5] = ["platinum", "gold", "electrum", "silver", "copper"];

/// Probe a raw record's shape once, before any transform runs.
///
/// A record is legacy if it shows any legacy marker (split ability maps,
/// scalar currency fields, an hp block keyed by `points`) and its
/// `settings.version` is not already current.
pub fn detect_shape(raw: &Value) -> RecordShape {
    let Some(obj) = raw.as_object() else {
        return RecordShape::Current;
    };

    let version_current = obj
        .get("settings")
        .and_then(|s| s.get("version"))
        .and_then(Value::as_u64)
        == Some(SCHEMA_VERSION as u64);
    if version_current {
        return RecordShape::Current;
    }

    let split_abilities = obj.contains_key("scores") || obj.contains_key("modifiers");
    let scalar_currency = CURRENCY_SCALARS
        .iter()
        .any(|k| obj.get(*k).is_some_and(Value::is_number));
    let legacy_hp = obj
        .get("hp")
        .and_then(|hp| hp.get("points"))
        .is_some();

    if split_abilities || scalar_currency || legacy_hp {
        RecordShape::Legacy
    } else {
        RecordShape::Current
    }
}

/// Whether a raw persisted record needs migration.
pub fn is_legacy_character(raw: &Value) -> bool {
    detect_shape(raw) == RecordShape::Legacy
}

/// Transform a raw persisted record into the current schema.
///
/// Legacy records get the full transform; current records pass through
/// unchanged except that a missing version is stamped.
pub fn process_character_data(raw: Value) -> Result<Character, MigrationError> {
    let shape = detect_shape(&raw);
    let mut obj = match raw {
        Value::Object(obj) => obj,
        _ => return Err(MigrationError::NotAnObject),
    };

    if shape == RecordShape::Legacy {
        debug!("migrating legacy character record to schema version {SCHEMA_VERSION}");
        transform_legacy(&mut obj);
    }
    stamp_version(&mut obj);

    let character = serde_json::from_value(Value::Object(obj))?;
    Ok(character)
}

fn transform_legacy(obj: &mut Map<String, Value>) {
    merge_ability_maps(obj);
    collapse_currency(obj);
    normalize_hit_points(obj);
    normalize_equipment(obj);
    normalize_identifiers(obj);
    sanitize_id(obj);
}

/// Signed integer from a legacy modifier entry ("+2", "-1", or a number).
fn parse_modifier(value: &Value) -> i32 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0) as i32,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .strip_prefix('+')
                .unwrap_or(trimmed)
                .parse()
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Merge the split `scores`/`modifiers` maps into unified ability pairs.
fn merge_ability_maps(obj: &mut Map<String, Value>) {
    let scores = obj.remove("scores");
    let modifiers = obj.remove("modifiers");
    if scores.is_none() && modifiers.is_none() {
        return;
    }

    let empty = Map::new();
    let scores = scores.as_ref().and_then(Value::as_object).unwrap_or(&empty);
    let modifiers = modifiers
        .as_ref()
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut abilities = Map::new();
    for name in [
        "strength",
        "dexterity",
        "constitution",
        "intelligence",
        "wisdom",
        "charisma",
    ] {
        let value = scores.get(name).and_then(Value::as_i64).unwrap_or(10);
        let modifier = modifiers.get(name).map(parse_modifier).unwrap_or(0);
        let mut pair = Map::new();
        pair.insert("value".to_string(), Value::from(value));
        pair.insert("modifier".to_string(), Value::from(modifier));
        abilities.insert(name.to_string(), Value::Object(pair));
    }
    obj.insert("abilities".to_string(), Value::Object(abilities));
}

/// Collapse top-level currency scalars into one nested block.
fn collapse_currency(obj: &mut Map<String, Value>) {
    let existing = obj
        .get("currency")
        .and_then(Value::as_object)
        .cloned();

    let mut block = Map::new();
    for name in CURRENCY_SCALARS {
        let scalar = obj.remove(name).and_then(|v| v.as_i64());
        let nested = existing
            .as_ref()
            .and_then(|c| c.get(name))
            .and_then(Value::as_i64);
        block.insert(name.to_string(), Value::from(nested.or(scalar).unwrap_or(0)));
    }
    obj.insert("currency".to_string(), Value::Object(block));
}

/// Normalize the hp block to `{current, max, optional desc}`, preferring an
/// explicit `points` value and falling back to `max`.
fn normalize_hit_points(obj: &mut Map<String, Value>) {
    let Some(hp) = obj.get("hp").and_then(Value::as_object).cloned() else {
        return;
    };

    let points = hp.get("points").and_then(Value::as_i64);
    let max = hp.get("max").and_then(Value::as_i64);
    let current = points
        .or_else(|| hp.get("current").and_then(Value::as_i64))
        .or(max)
        .unwrap_or(0);

    let mut block = Map::new();
    block.insert("current".to_string(), Value::from(current));
    block.insert("max".to_string(), Value::from(max.or(points).unwrap_or(0)));
    if let Some(desc) = hp.get("desc").and_then(Value::as_str) {
        block.insert("desc".to_string(), Value::from(desc));
    }
    obj.insert("hp".to_string(), Value::Object(block));
}

/// Guarantee the defaulted fields on every equipment entry, preserving any
/// unrecognized extras unchanged.
fn normalize_equipment(obj: &mut Map<String, Value>) {
    let Some(Value::Array(items)) = obj.get_mut("equipment") else {
        return;
    };

    for item in items.iter_mut() {
        let Some(entry) = item.as_object_mut() else {
            continue;
        };
        entry
            .entry("name".to_string())
            .or_insert_with(|| Value::from(""));
        entry
            .entry("cost_value".to_string())
            .or_insert_with(|| Value::from(0));
        entry
            .entry("cost_currency".to_string())
            .or_insert_with(|| Value::from("gp"));
        entry
            .entry("weight".to_string())
            .or_insert_with(|| Value::from(0));
        entry
            .entry("category".to_string())
            .or_insert_with(|| Value::from("general"));
        entry
            .entry("amount".to_string())
            .or_insert_with(|| Value::from(1));
    }
}

/// Canonical lowercase-hyphenated slug: whitespace collapses to hyphens,
/// anything outside letters/digits/hyphen is stripped. Letters are Unicode
/// letters, so accented names keep their spelling.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_hyphen = true; // suppress leading hyphens
    for c in raw.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            if !prev_hyphen {
                out.push('-');
                prev_hyphen = true;
            }
        } else if c.is_alphanumeric() {
            out.push(c);
            prev_hyphen = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn normalize_class_id(id: &str) -> String {
    // Custom classes keep their freeform name verbatim
    if is_custom_class(id) {
        id.to_string()
    } else {
        slugify(id)
    }
}

/// Slug race and class identifiers, lifting a legacy single-string `class`
/// field into the `classes` array.
fn normalize_identifiers(obj: &mut Map<String, Value>) {
    if let Some(race) = obj.get("race").and_then(Value::as_str) {
        if race != CUSTOM_RACE {
            let slug = slugify(race);
            obj.insert("race".to_string(), Value::from(slug));
        }
    }

    let entries: Vec<String> = match obj.remove("class") {
        Some(Value::String(single)) => vec![single],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => obj
            .get("classes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
    };

    if !entries.is_empty() {
        obj.insert(
            "classes".to_string(),
            Value::Array(
                entries
                    .iter()
                    .map(|id| Value::from(normalize_class_id(id)))
                    .collect(),
            ),
        );
    }
}

/// Legacy ids predate UUIDs; drop anything that doesn't parse so the record
/// gets a fresh one.
fn sanitize_id(obj: &mut Map<String, Value>) {
    let parses = obj
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|s| Uuid::parse_str(s).is_ok());
    if !parses {
        obj.remove("id");
    }
}

/// Stamp `settings.version`, preserving any other settings already present.
fn stamp_version(obj: &mut Map<String, Value>) {
    let mut settings = obj
        .get("settings")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    settings.insert("version".to_string(), Value::from(SCHEMA_VERSION));
    obj.insert("settings".to_string(), Value::Object(settings));
}
