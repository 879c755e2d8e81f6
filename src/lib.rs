//! Character-sheet validation, schema migration, and level progression.
//!
//! This crate is the rules core behind a character-binder application:
//! - Rule-based field validation with structured, never-thrown results
//! - A six-step creation pipeline with cascade invalidation when upstream
//!   choices (abilities, race, classes) change
//! - Detection and one-shot migration of legacy persisted records into the
//!   current schema
//! - Deterministic, bounded hit-point and spell-slot gain on level-up
//!
//! Rendering, authentication, and the document backend are external
//! collaborators; this crate only consumes read-only reference tables and
//! produces structured results.
//!
//! # Quick Start
//!
//! ```
//! use binder_core::{cascade, plan_level_up, process_character_data, ReferenceData};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A legacy record migrates on load, then enters the pipeline
//! let record = process_character_data(json!({
//!     "name": "Aldric",
//!     "race": "human",
//!     "class": "Fighter",
//!     "gold": 2,
//!     "hp": { "points": 8, "max": 8, "desc": "1d8" }
//! }))?;
//!
//! let refs = ReferenceData::builtin();
//! let outcome = cascade(&record, refs);
//! let plan = plan_level_up(&outcome.record, refs)?;
//! println!("HP gain: {}", plan.hp.breakdown);
//! # Ok(())
//! # }
//! ```

pub mod character;
pub mod migration;
pub mod persist;
pub mod progression;
pub mod reference;
pub mod steps;
pub mod validation;

// Primary public API
pub use character::{
    Ability, AbilityScore, AbilityScores, Character, Currency, EquipmentItem, HitPoints,
    Settings, SpellEntry, CUSTOM_CLASS_PREFIX, CUSTOM_RACE, SCHEMA_VERSION,
};
pub use migration::{
    detect_shape, is_legacy_character, process_character_data, slugify, MigrationError,
    RecordShape,
};
pub use persist::{CharacterStore, PersistError};
pub use progression::{
    apply_level_up, calculate_hp_gain, calculate_hp_gain_with_rng, calculate_spell_gain,
    custom_spell_gain, plan_level_up, plan_level_up_with_rng, HitDie, HpGainResult, LevelUpPlan,
    ProgressionError, SpellGainInfo, FIXED_GAIN_LEVEL,
};
pub use reference::{
    CatalogError, ClassDef, RaceDef, ReferenceData, SpellCatalog, SpellDef, SpellSource,
    StaticSpellSource,
};
pub use steps::{
    cascade, is_step_disabled, validate_step, validate_step_index, CascadeOutcome, Step,
};
pub use validation::{rules, validate, Rule, Schema, ValidationResult};
