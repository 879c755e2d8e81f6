//! QA tests for the full character lifecycle.
//!
//! These walk a record through the same path the application does: load a
//! legacy document, migrate it, validate the creation steps, cascade after
//! an upstream edit, and advance a level.
//! Run with: `cargo test --test qa_character_lifecycle`

use binder_core::{
    apply_level_up, cascade, is_step_disabled, plan_level_up, validate_step, CharacterStore,
    ReferenceData, SpellEntry, Step, SCHEMA_VERSION,
};
use serde_json::json;
use tempfile::TempDir;

fn legacy_magic_user() -> serde_json::Value {
    json!({
        "name": "Mira",
        "scores": {
            "strength": 9, "dexterity": 11, "constitution": 12,
            "intelligence": 14, "wisdom": 10, "charisma": 8
        },
        "modifiers": {
            "strength": "0", "dexterity": "0", "constitution": "0",
            "intelligence": "+1", "wisdom": "0", "charisma": "-1"
        },
        "race": "Elf",
        "class": "Magic User",
        "gold": 30,
        "hp": { "points": 3, "max": 3, "desc": "1d4" },
        "equipment": [
            { "name": "Spellbook", "weight": 3 },
            { "name": "Dagger", "cost_value": 3, "category": "weapon" }
        ],
        "spells": [ { "id": "magic-missile", "level": 1 } ],
        "level": 2,
        "experience": 2500
    })
}

#[tokio::test]
async fn test_load_migrate_validate_level_up_save() {
    let dir = TempDir::new().expect("temp dir");
    let store = CharacterStore::new(dir.path());
    let refs = ReferenceData::builtin();

    std::fs::write(
        store.path_for("mira"),
        legacy_magic_user().to_string(),
    )
    .expect("seed legacy file");

    // Load runs migration before anything else
    let mira = store.load("mira").await.expect("load");
    assert_eq!(mira.settings.version, SCHEMA_VERSION);
    assert_eq!(mira.race, "elf");
    assert_eq!(mira.classes, vec!["magic-user".to_string()]);
    assert_eq!(mira.currency.gold, 30);
    assert_eq!(mira.hp.current, 3);

    // Every creation step holds for the migrated record
    for step in Step::all() {
        let result = validate_step(*step, &mira, refs);
        assert!(result.is_valid, "{step}: {:?}", result.errors);
        assert!(!is_step_disabled(*step, &mira, refs));
    }

    // Level 2 -> 3 grants one second-level spell pick
    let plan = plan_level_up(&mira, refs).expect("plan");
    assert_eq!(plan.next_level, 3);
    let gained = plan.spells.as_ref().expect("spell gain").total_gained;
    assert_eq!(gained, 1);

    let leveled = apply_level_up(&mira, &plan, &[SpellEntry::new("web", 2)]).expect("apply");
    assert_eq!(leveled.level, 3);
    assert_eq!(leveled.hp.max, 3 + plan.hp.total);
    assert_eq!(leveled.hp.current, leveled.hp.max);

    // Save and reload the advanced record; no migration path re-runs
    store.save(&leveled).await.expect("save");
    let reloaded = store
        .load(&leveled.id.to_string())
        .await
        .expect("reload");
    assert_eq!(reloaded, leveled);
}

#[tokio::test]
async fn test_class_change_cascades_into_spell_clearing() {
    let dir = TempDir::new().expect("temp dir");
    let store = CharacterStore::new(dir.path());
    let refs = ReferenceData::builtin();

    std::fs::write(store.path_for("mira"), legacy_magic_user().to_string())
        .expect("seed legacy file");
    let mut mira = store.load("mira").await.expect("load");

    // Retraining to fighter leaves a spell that no longer resolves
    mira.classes = vec!["fighter".to_string()];
    let outcome = cascade(&mira, refs);

    assert_eq!(outcome.cleared_spells, vec!["magic-missile".to_string()]);
    assert_eq!(outcome.record.spells.as_deref(), Some(&[][..]));
    assert!(outcome.result_for(Step::Class).is_valid);

    // Switching to a class the race forbids is reported, never corrected
    mira.classes = vec!["druid".to_string()];
    let outcome = cascade(&mira, refs);
    assert!(!outcome.result_for(Step::Class).is_valid);
    assert_eq!(outcome.record.classes, vec!["druid".to_string()]);
}
