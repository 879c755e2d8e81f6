//! Level progression: bounded hit-point gain and spell-slot deltas.
//!
//! Everything here is a pure calculation over the record and its class
//! definition. The calculator never mutates the character; acceptance is
//! explicit through [`apply_level_up`], which applies the whole plan as one
//! atomic update or rejects it.

use crate::character::{custom_class_name, is_custom_class, Character, SpellEntry};
use crate::reference::{ClassDef, ReferenceData, SpellcastingDef};
use rand::Rng;
use thiserror::Error;

/// From this level on, HP gain is a fixed increment instead of a roll.
pub const FIXED_GAIN_LEVEL: u8 = 9;

/// Classes that gain 2 HP per level in the fixed-gain tier; all others gain 1.
pub const TWO_HP_CLASSES: [&str; 7] = [
    "fighter",
    "thief",
    "assassin",
    "barbarian",
    "ranger",
    "paladin",
    "scout",
];

/// Errors from progression calculation.
///
/// Progression fails loudly: an incorrect silent default would corrupt
/// game math.
#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("invalid hit die expression: {0:?}")]
    InvalidHitDie(String),

    #[error("character has no class selected")]
    MissingClass,

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("wrong number of spell picks: expected {expected}, got {got}")]
    SpellPickMismatch { expected: usize, got: usize },

    #[error("spell picks do not match the plan at spell level {level}")]
    SpellPickLevel { level: u8 },
}

/// A parsed hit-die expression such as `"1d8"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitDie {
    pub count: u32,
    pub sides: u32,
}

impl HitDie {
    /// Largest accepted die count and side count. Anything beyond this is a
    /// data-entry mistake, not a hit die, and rejecting it keeps the roll
    /// arithmetic comfortably inside `i32`.
    pub const MAX_COUNT: u32 = 100;
    pub const MAX_SIDES: u32 = 1_000;

    /// Parse `<count>d<size>`; the count may be omitted (`"d8"` reads as one die).
    pub fn parse(expression: &str) -> Result<Self, ProgressionError> {
        let invalid = || ProgressionError::InvalidHitDie(expression.to_string());
        let lowered = expression.trim().to_lowercase();
        let (count, sides) = lowered.split_once('d').ok_or_else(invalid)?;

        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };
        let sides: u32 = sides.parse().map_err(|_| invalid())?;
        if !(1..=Self::MAX_COUNT).contains(&count) || !(1..=Self::MAX_SIDES).contains(&sides) {
            return Err(invalid());
        }
        Ok(Self { count, sides })
    }

    /// Highest possible roll.
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32
    }

    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i32 {
        (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides) as i32)
            .sum()
    }
}

/// Outcome of a single hit-point gain calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HpGainResult {
    /// The raw die roll, absent in the fixed-gain tier.
    pub roll: Option<i32>,
    /// Constitution modifier applied, absent in the fixed-gain tier.
    pub constitution_bonus: Option<i32>,
    /// The bounded gain; never below 1.
    pub total: i32,
    /// Theoretical maximum (die max + modifier) for display, when rolled.
    pub max: Option<i32>,
    pub breakdown: String,
    pub is_fixed: bool,
}

/// HP gain for the character's next level, rolling with the thread RNG.
pub fn calculate_hp_gain(
    record: &Character,
    class: &ClassDef,
) -> Result<HpGainResult, ProgressionError> {
    calculate_hp_gain_with_rng(record, class, &mut rand::thread_rng())
}

/// HP gain with a caller-supplied RNG (useful for testing).
///
/// At [`FIXED_GAIN_LEVEL`] and above the gain is a fixed integer with no
/// roll and no constitution bonus. Below it, the class hit die is rolled,
/// the constitution modifier added, and the total floored at 1: a roll plus
/// a penalty can never reduce HP on level-up.
pub fn calculate_hp_gain_with_rng<R: Rng>(
    record: &Character,
    class: &ClassDef,
    rng: &mut R,
) -> Result<HpGainResult, ProgressionError> {
    if record.level >= FIXED_GAIN_LEVEL {
        let total = if TWO_HP_CLASSES.contains(&class.id.as_str()) {
            2
        } else {
            1
        };
        return Ok(HpGainResult {
            roll: None,
            constitution_bonus: None,
            total,
            max: None,
            breakdown: format!("+{total} fixed (level {FIXED_GAIN_LEVEL}+)"),
            is_fixed: true,
        });
    }

    let die = HitDie::parse(&class.hit_die)?;
    let roll = die.roll_with_rng(rng);
    let bonus = record.abilities.constitution.modifier;
    let total = (roll + bonus).max(1);
    Ok(HpGainResult {
        roll: Some(roll),
        constitution_bonus: Some(bonus),
        total,
        max: Some(die.max() + bonus),
        breakdown: format!("{roll} ({}) {bonus:+} CON = {total}", class.hit_die),
        is_fixed: false,
    })
}

/// Newly gained spell picks between two levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellGainInfo {
    /// The level being advanced to.
    pub level: u8,
    /// Gained picks per slot index (index 0 = first-level spells).
    pub new_spells_per_level: Vec<u8>,
    pub total_gained: u32,
    /// Only the slot levels that actually gained, for display.
    pub grouped_by_level: Vec<SpellLevelGain>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellLevelGain {
    pub spell_level: u8,
    pub count: u8,
}

fn gain_from_tables(casting: &SpellcastingDef, current_level: u8, next_level: u8) -> SpellGainInfo {
    let current = casting.slots_at(current_level);
    let next = casting.slots_at(next_level);

    let width = current.len().max(next.len());
    let mut per_level = Vec::with_capacity(width);
    let mut grouped = Vec::new();
    for index in 0..width {
        let before = current.get(index).copied().unwrap_or(0);
        let after = next.get(index).copied().unwrap_or(0);
        let gained = after.saturating_sub(before);
        per_level.push(gained);
        if gained > 0 {
            grouped.push(SpellLevelGain {
                spell_level: index as u8 + 1,
                count: gained,
            });
        }
    }

    SpellGainInfo {
        level: next_level,
        total_gained: per_level.iter().map(|&g| g as u32).sum(),
        new_spells_per_level: per_level,
        grouped_by_level: grouped,
    }
}

/// Spell gain between two levels; `None` for a class with no spell table.
pub fn calculate_spell_gain(
    class: &ClassDef,
    current_level: u8,
    next_level: u8,
) -> Option<SpellGainInfo> {
    class
        .spellcasting
        .as_ref()
        .map(|casting| gain_from_tables(casting, current_level, next_level))
}

/// Custom spellcasting classes always gain exactly one first-level pick,
/// independent of any table.
pub fn custom_spell_gain(next_level: u8) -> SpellGainInfo {
    SpellGainInfo {
        level: next_level,
        new_spells_per_level: vec![1],
        total_gained: 1,
        grouped_by_level: vec![SpellLevelGain {
            spell_level: 1,
            count: 1,
        }],
    }
}

/// Everything a level-up will change, computed without mutating the record.
#[derive(Debug, Clone)]
pub struct LevelUpPlan {
    pub next_level: u8,
    pub hp: HpGainResult,
    pub spells: Option<SpellGainInfo>,
}

/// Plan the character's next level from its primary (first) class.
///
/// A custom class rolls the record's own hit-die expression (`hp.desc`);
/// without one there is nothing sound to roll, and that is a hard failure
/// rather than a silent default. A custom class is treated as spellcasting
/// when the record carries a spell list.
pub fn plan_level_up(
    record: &Character,
    refs: &ReferenceData,
) -> Result<LevelUpPlan, ProgressionError> {
    plan_level_up_with_rng(record, refs, &mut rand::thread_rng())
}

pub fn plan_level_up_with_rng<R: Rng>(
    record: &Character,
    refs: &ReferenceData,
    rng: &mut R,
) -> Result<LevelUpPlan, ProgressionError> {
    let class_id = record.classes.first().ok_or(ProgressionError::MissingClass)?;
    let next_level = record.level.saturating_add(1);

    if is_custom_class(class_id) {
        let die = record
            .hp
            .desc
            .clone()
            .ok_or_else(|| ProgressionError::InvalidHitDie(String::new()))?;
        let custom = ClassDef {
            id: class_id.clone(),
            name: custom_class_name(class_id).unwrap_or(class_id).to_string(),
            hit_die: die,
            spellcasting: None,
        };
        let hp = calculate_hp_gain_with_rng(record, &custom, rng)?;
        let spells = record.spells.is_some().then(|| custom_spell_gain(next_level));
        return Ok(LevelUpPlan {
            next_level,
            hp,
            spells,
        });
    }

    let class = refs
        .class(class_id)
        .ok_or_else(|| ProgressionError::UnknownClass(class_id.clone()))?;
    let hp = calculate_hp_gain_with_rng(record, class, rng)?;
    let spells = calculate_spell_gain(class, record.level, next_level);
    Ok(LevelUpPlan {
        next_level,
        hp,
        spells,
    })
}

/// Apply an accepted plan as one atomic update.
///
/// The new level is set, the maximum raised by the gain, current HP healed
/// to the new maximum, and the chosen spells appended. The picks must match
/// the plan exactly, per spell level, or the record is left untouched.
pub fn apply_level_up(
    record: &Character,
    plan: &LevelUpPlan,
    spell_picks: &[SpellEntry],
) -> Result<Character, ProgressionError> {
    let expected = plan
        .spells
        .as_ref()
        .map(|s| s.total_gained as usize)
        .unwrap_or(0);
    if spell_picks.len() != expected {
        return Err(ProgressionError::SpellPickMismatch {
            expected,
            got: spell_picks.len(),
        });
    }

    if let Some(gain) = &plan.spells {
        // Every pick must land on a granted spell level
        for pick in spell_picks {
            let granted = gain
                .grouped_by_level
                .iter()
                .any(|slot| slot.spell_level == pick.level);
            if !granted {
                return Err(ProgressionError::SpellPickLevel { level: pick.level });
            }
        }
        // and each granted level must be filled exactly
        for slot in &gain.grouped_by_level {
            let picked = spell_picks
                .iter()
                .filter(|p| p.level == slot.spell_level)
                .count();
            if picked != slot.count as usize {
                return Err(ProgressionError::SpellPickLevel {
                    level: slot.spell_level,
                });
            }
        }
    }

    let mut next = record.clone();
    next.level = plan.next_level;
    next.hp.max += plan.hp.total;
    next.hp.current = next.hp.max;
    if !spell_picks.is_empty() {
        next.spells
            .get_or_insert_with(Vec::new)
            .extend_from_slice(spell_picks);
    }
    Ok(next)
}
