//! The six-step creation pipeline and the cascade validator.
//!
//! Steps are strictly ordered but independently queryable: every step
//! validator re-derives the prerequisites it needs from the record instead
//! of assuming earlier steps ran first. Cascade invalidation is a pure
//! function from (record, reference tables) to (record, results) with no
//! hidden state; it auto-clears only structural impossibilities and reports
//! everything else as errors for explicit user correction.

use crate::character::{is_custom_class, Ability, Character};
use crate::progression::HitDie;
use crate::reference::{RaceDef, ReferenceData};
use crate::validation::{rules, validate, Schema, ValidationResult};
use serde_json::json;
use std::fmt;
use tracing::debug;

/// The ordered creation steps. Review valid means creation-complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Abilities,
    Race,
    Class,
    HitPoints,
    Equipment,
    Review,
}

impl Step {
    pub fn index(&self) -> usize {
        match self {
            Step::Abilities => 0,
            Step::Race => 1,
            Step::Class => 2,
            Step::HitPoints => 3,
            Step::Equipment => 4,
            Step::Review => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Abilities => "abilities",
            Step::Race => "race",
            Step::Class => "class",
            Step::HitPoints => "hit points",
            Step::Equipment => "equipment",
            Step::Review => "review",
        }
    }

    pub fn from_index(index: usize) -> Option<Step> {
        Step::all().get(index).copied()
    }

    pub fn all() -> &'static [Step] {
        &[
            Step::Abilities,
            Step::Race,
            Step::Class,
            Step::HitPoints,
            Step::Equipment,
            Step::Review,
        ]
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the record's race selection resolves against the race table.
enum ResolvedRace<'a> {
    /// No race selected yet.
    Unselected,
    /// The freeform custom race; no ability requirements, any class.
    Custom,
    /// A concrete race from the table.
    Known(&'a RaceDef),
    /// An identifier the table no longer resolves.
    Unknown,
}

fn resolve_race<'a>(record: &Character, refs: &'a ReferenceData) -> ResolvedRace<'a> {
    if record.race.is_empty() {
        ResolvedRace::Unselected
    } else if record.has_custom_race() {
        ResolvedRace::Custom
    } else {
        match refs.race(&record.race) {
            Some(race) => ResolvedRace::Known(race),
            None => ResolvedRace::Unknown,
        }
    }
}

/// Validate one step against the full record.
pub fn validate_step(step: Step, record: &Character, refs: &ReferenceData) -> ValidationResult {
    match step {
        Step::Abilities => validate_abilities(record),
        Step::Race => validate_race(record, refs),
        Step::Class => validate_class(record, refs),
        Step::HitPoints => validate_hit_points(record),
        Step::Equipment => validate_equipment(record),
        Step::Review => validate_review(record, refs),
    }
}

/// Validate a step by index; an out-of-range index is an error result,
/// never a panic.
pub fn validate_step_index(
    index: usize,
    record: &Character,
    refs: &ReferenceData,
) -> ValidationResult {
    match Step::from_index(index) {
        Some(step) => validate_step(step, record, refs),
        None => ValidationResult::error(format!("unknown step index {index}")),
    }
}

/// A step is disabled while any earlier step is invalid.
pub fn is_step_disabled(step: Step, record: &Character, refs: &ReferenceData) -> bool {
    Step::all()
        .iter()
        .take(step.index())
        .any(|earlier| !validate_step(*earlier, record, refs).is_valid)
}

fn validate_abilities(record: &Character) -> ValidationResult {
    let schema = Schema::required(vec![rules::valid_ability_score()]);
    let mut result = ValidationResult::valid();
    for ability in Ability::all() {
        let score = record.abilities.get(*ability);
        let checked = validate(Some(&json!(score.value)), &schema);
        for error in checked.errors {
            result.push_error(format!("{}: {error}", ability.name()));
        }
    }
    result
}

fn validate_race(record: &Character, refs: &ReferenceData) -> ValidationResult {
    let schema = Schema::required(vec![rules::valid_race(&refs.races)]);
    let mut result = validate(Some(&json!(record.race)), &schema);

    // A custom race has no ability requirements and is always eligible
    if let ResolvedRace::Known(race) = resolve_race(record, refs) {
        for requirement in &race.ability_requirements {
            let score = record.abilities.get(requirement.ability);
            if score.value < requirement.minimum {
                result.push_error(format!(
                    "{} requires {} {} or better",
                    race.name,
                    requirement.ability.abbreviation(),
                    requirement.minimum
                ));
            }
        }
    }
    result
}

fn validate_class(record: &Character, refs: &ReferenceData) -> ValidationResult {
    let schema = Schema::required(vec![
        rules::non_empty_array(),
        rules::valid_class_list(&refs.classes),
    ]);
    let mut result = validate(Some(&json!(record.classes)), &schema);

    let race = resolve_race(record, refs);
    match race {
        ResolvedRace::Unselected | ResolvedRace::Unknown => {
            if !record.classes.is_empty() {
                result.push_error("select a valid race before choosing classes");
            }
            return result;
        }
        ResolvedRace::Custom => {
            // Liberal path: any class, no spell gating
            return result;
        }
        ResolvedRace::Known(race) => {
            // A class the race no longer permits is reported, never dropped:
            // the player must correct it explicitly.
            for class_id in &record.classes {
                if is_custom_class(class_id) {
                    continue;
                }
                if refs.class(class_id).is_some() && !race.permits_class(class_id) {
                    result.push_error(format!(
                        "{} characters cannot take the {class_id} class",
                        race.name
                    ));
                }
            }
        }
    }

    // Required-starting-spell satisfaction, re-derived from the current
    // class list and never cached.
    for class_id in &record.classes {
        let Some(class) = refs.class(class_id) else {
            continue;
        };
        let Some(casting) = &class.spellcasting else {
            continue;
        };
        let level = record.level.max(1);
        if casting.slots_at(level).iter().all(|&slots| slots == 0) {
            continue;
        }
        let has_starting_spell = record.spells.as_deref().unwrap_or(&[]).iter().any(|entry| {
            refs.spells_for_class(class_id, None)
                .any(|spell| spell.id == entry.id)
        });
        if !has_starting_spell {
            result.push_error(format!("select a starting spell for the {} class", class.name));
        }
    }

    result
}

fn validate_hit_points(record: &Character) -> ValidationResult {
    let mut result = ValidationResult::valid();
    let hp = &record.hp;

    if hp.max < 1 {
        result.push_error("maximum hit points are at least 1");
    }
    if hp.current < 0 {
        result.push_error("current hit points are not negative");
    }
    if hp.current > hp.max {
        result.push_error("current hit points do not exceed the maximum");
    }
    if let Some(desc) = &hp.desc {
        if HitDie::parse(desc).is_err() {
            result.push_error(format!("invalid hit die expression: {desc}"));
        }
    }
    result
}

fn validate_equipment(record: &Character) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for (index, item) in record.equipment.iter().enumerate() {
        if item.name.trim().is_empty() {
            result.push_error(format!("equipment entry {} needs a name", index + 1));
        }
        if item.amount < 1 {
            result.push_error(format!("equipment entry {} needs an amount of at least 1", index + 1));
        }
    }
    result
}

fn validate_review(record: &Character, refs: &ReferenceData) -> ValidationResult {
    let name_schema = Schema::required(vec![
        rules::max_length(60),
        rules::name_characters(),
    ]);
    let mut result = ValidationResult::valid();
    let name_checked = validate(Some(&json!(record.name)), &name_schema);
    for error in name_checked.errors {
        result.push_error(format!("name: {error}"));
    }

    if !record.is_current_version() {
        result.push_error("record requires migration before completion");
    }

    for step in Step::all().iter().take(Step::Review.index()) {
        if !validate_step(*step, record, refs).is_valid {
            result.push_error(format!("{step} step is incomplete"));
        }
    }
    result
}

// ============================================================================
// Cascade invalidation
// ============================================================================

/// Result of re-running the cascade after an upstream change.
#[derive(Debug)]
pub struct CascadeOutcome {
    /// The record after structural clearing (unchanged when nothing cleared).
    pub record: Character,
    /// Every step's validation result against the cleared record, in order.
    pub step_results: Vec<(Step, ValidationResult)>,
    /// Spell ids removed because they no longer resolve for the class list.
    pub cleared_spells: Vec<String>,
    /// Cantrip ids removed for the same reason.
    pub cleared_cantrips: Vec<String>,
}

impl CascadeOutcome {
    pub fn result_for(&self, step: Step) -> &ValidationResult {
        &self.step_results[step.index()].1
    }

    /// Whether every step, review included, passed.
    pub fn is_complete(&self) -> bool {
        self.step_results.iter().all(|(_, r)| r.is_valid)
    }
}

/// Recompute everything after abilities, race, or class selection changed.
///
/// Mutation is limited to structural impossibilities: a spell or cantrip id
/// that no longer resolves for any selected class is cleared. Soft failures
/// (unmet race requirements, a class the race forbids, a missing starting
/// spell) are reported in the step results and the stored state is kept.
/// Re-running with the same inputs is idempotent.
pub fn cascade(record: &Character, refs: &ReferenceData) -> CascadeOutcome {
    let mut next = record.clone();
    let mut cleared_spells = Vec::new();
    let mut cleared_cantrips = Vec::new();

    // With a custom class in the list, nothing is structurally impossible:
    // the table cannot speak for a freeform class's spell list.
    if !next.has_custom_class() {
        let classes = next.classes.clone();
        let resolves = |id: &str, level: Option<u8>| {
            refs.spells.iter().any(|spell| {
                spell.id == id
                    && level.map_or(true, |l| spell.level == l)
                    && spell
                        .classes
                        .iter()
                        .any(|c| classes.iter().any(|selected| selected == c))
            })
        };

        if let Some(spells) = &mut next.spells {
            spells.retain(|entry| {
                let keep = resolves(&entry.id, None);
                if !keep {
                    cleared_spells.push(entry.id.clone());
                }
                keep
            });
        }
        if let Some(cantrips) = &mut next.cantrips {
            cantrips.retain(|id| {
                let keep = resolves(id, Some(0));
                if !keep {
                    cleared_cantrips.push(id.clone());
                }
                keep
            });
        }
    }

    if !cleared_spells.is_empty() || !cleared_cantrips.is_empty() {
        debug!(
            spells = ?cleared_spells,
            cantrips = ?cleared_cantrips,
            "cascade cleared unresolvable spell selections"
        );
    }

    let step_results = Step::all()
        .iter()
        .map(|step| (*step, validate_step(*step, &next, refs)))
        .collect();

    CascadeOutcome {
        record: next,
        step_results,
        cleared_spells,
        cleared_cantrips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScore, EquipmentItem, HitPoints, SpellEntry, CUSTOM_RACE};

    fn with_scores(value: i32) -> Character {
        let mut ch = Character::new("Aldric");
        for ability in Ability::all() {
            ch.abilities.set(*ability, AbilityScore::from_value(value));
        }
        ch
    }

    fn sample_fighter() -> Character {
        let mut ch = with_scores(12);
        ch.race = "human".to_string();
        ch.classes = vec!["fighter".to_string()];
        ch.hp = HitPoints {
            current: 8,
            max: 8,
            desc: Some("1d8".to_string()),
        };
        ch.equipment = vec![EquipmentItem::new("Sword")];
        ch
    }

    fn refs() -> &'static ReferenceData {
        ReferenceData::builtin()
    }

    #[test]
    fn test_complete_record_passes_review() {
        let ch = sample_fighter();
        for step in Step::all() {
            let result = validate_step(*step, &ch, refs());
            assert!(result.is_valid, "{step}: {:?}", result.errors);
        }
    }

    #[test]
    fn test_ability_out_of_range_named_in_error() {
        let mut ch = sample_fighter();
        ch.abilities.strength.value = 19;
        let result = validate_step(Step::Abilities, &ch, refs());
        assert!(!result.is_valid);
        assert!(result.errors[0].starts_with("strength:"));
    }

    #[test]
    fn test_unmet_race_requirement_then_raised_score() {
        let mut ch = sample_fighter();
        ch.race = "dwarf".to_string();
        ch.abilities.constitution = AbilityScore::from_value(8);

        let result = validate_step(Step::Race, &ch, refs());
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("CON"));

        // Raising only the ability score makes the same step valid
        ch.abilities.constitution = AbilityScore::from_value(9);
        assert!(validate_step(Step::Race, &ch, refs()).is_valid);
    }

    #[test]
    fn test_unknown_race_rejected() {
        let mut ch = sample_fighter();
        ch.race = "tabaxi".to_string();
        assert!(!validate_step(Step::Race, &ch, refs()).is_valid);
    }

    #[test]
    fn test_forbidden_class_reported_not_dropped() {
        let mut ch = sample_fighter();
        ch.race = "halfling".to_string();
        ch.classes = vec!["magic-user".to_string()];
        ch.spells = Some(vec![SpellEntry::new("magic-missile", 1)]);

        let outcome = cascade(&ch, refs());
        let class_result = outcome.result_for(Step::Class);
        assert!(!class_result.is_valid);
        assert!(class_result.errors[0].contains("cannot take"));

        // The selection is still on the record; correction is explicit
        assert_eq!(outcome.record.classes, vec!["magic-user".to_string()]);
        assert!(outcome.cleared_spells.is_empty());
    }

    #[test]
    fn test_custom_race_permits_any_class() {
        let mut ch = sample_fighter();
        ch.race = CUSTOM_RACE.to_string();
        ch.custom_race = Some("Stoneborn".to_string());
        ch.classes = vec!["magic-user".to_string()];
        ch.spells = Some(vec![SpellEntry::new("magic-missile", 1)]);

        assert!(validate_step(Step::Race, &ch, refs()).is_valid);
        assert!(validate_step(Step::Class, &ch, refs()).is_valid);
    }

    #[test]
    fn test_missing_starting_spell_is_soft_error() {
        let mut ch = sample_fighter();
        ch.race = "elf".to_string();
        ch.abilities.intelligence = AbilityScore::from_value(12);
        ch.classes = vec!["magic-user".to_string()];
        ch.spells = Some(vec![]);

        let outcome = cascade(&ch, refs());
        let class_result = outcome.result_for(Step::Class);
        assert!(!class_result.is_valid);
        assert!(class_result.errors[0].contains("starting spell"));

        // Soft failure: nothing was auto-corrected
        assert_eq!(outcome.record.spells, Some(vec![]));
    }

    #[test]
    fn test_cascade_clears_unresolvable_spell() {
        let mut ch = sample_fighter();
        // Was a magic-user, now a fighter; the old spell no longer resolves
        ch.spells = Some(vec![SpellEntry::new("magic-missile", 1)]);

        let outcome = cascade(&ch, refs());
        assert_eq!(outcome.cleared_spells, vec!["magic-missile".to_string()]);
        assert_eq!(outcome.record.spells, Some(vec![]));

        // Re-running on the cleared record is a no-op
        let again = cascade(&outcome.record, refs());
        assert!(again.cleared_spells.is_empty());
        assert_eq!(again.record, outcome.record);
    }

    #[test]
    fn test_custom_class_suppresses_clearing() {
        let mut ch = sample_fighter();
        ch.classes = vec!["custom:Spellblade".to_string()];
        ch.spells = Some(vec![SpellEntry::new("homebrew-bolt", 1)]);

        let outcome = cascade(&ch, refs());
        assert!(outcome.cleared_spells.is_empty());
        assert_eq!(outcome.record.spells.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_step_gating() {
        let ch = Character::new("");
        // Default scores are valid, so race opens first
        assert!(!is_step_disabled(Step::Abilities, &ch, refs()));
        assert!(!is_step_disabled(Step::Race, &ch, refs()));
        // No race selected yet, so class and beyond stay closed
        assert!(is_step_disabled(Step::Class, &ch, refs()));
        assert!(is_step_disabled(Step::Review, &ch, refs()));

        let complete = sample_fighter();
        assert!(!is_step_disabled(Step::Review, &complete, refs()));
    }

    #[test]
    fn test_unknown_step_index_is_an_error_result() {
        let ch = sample_fighter();
        let result = validate_step_index(9, &ch, refs());
        assert!(!result.is_valid);

        let result = validate_step_index(Step::Race.index(), &ch, refs());
        assert!(result.is_valid);
    }

    #[test]
    fn test_stale_version_blocks_review() {
        let mut ch = sample_fighter();
        ch.settings.version = 1;
        let result = validate_step(Step::Review, &ch, refs());
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("migration"));
    }
}
