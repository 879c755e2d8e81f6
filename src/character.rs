//! The current-schema character record and its substructures.
//!
//! Everything here is the *current* shape: six `{value, modifier}` ability
//! pairs, a nested currency block, and an `hp` block keyed by `current`/`max`.
//! Legacy document shapes never reach these types; the migration engine
//! normalizes them first (see [`crate::migration`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Schema version stamped into `settings.version` on every persisted record.
///
/// Cascade and progression logic only trust records carrying this version;
/// anything else goes through migration first.
pub const SCHEMA_VERSION: u32 = 2;

/// Sentinel race identifier for a freeform custom race.
pub const CUSTOM_RACE: &str = "custom";

/// Prefix marking a freeform custom class, e.g. `"custom:Witch Hunter"`.
pub const CUSTOM_CLASS_PREFIX: &str = "custom:";

/// Returns true if a class identifier is a custom-class sentinel string.
pub fn is_custom_class(id: &str) -> bool {
    id.starts_with(CUSTOM_CLASS_PREFIX)
}

/// The freeform name of a custom class, if the identifier is one.
pub fn custom_class_name(id: &str) -> Option<&str> {
    id.strip_prefix(CUSTOM_CLASS_PREFIX).map(str::trim)
}

/// The six character abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> &'static [Ability] {
        &[
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// A single ability score: the raw value (3-18 when valid) and its modifier.
///
/// The modifier is stored, not derived, because legacy records carried the
/// two halves in separate maps and house rules may override the derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScore {
    pub value: i32,
    pub modifier: i32,
}

impl AbilityScore {
    pub fn new(value: i32, modifier: i32) -> Self {
        Self { value, modifier }
    }

    /// Score with the standard modifier derivation for its value.
    pub fn from_value(value: i32) -> Self {
        Self {
            value,
            modifier: standard_modifier(value),
        }
    }
}

impl Default for AbilityScore {
    fn default() -> Self {
        Self {
            value: 10,
            modifier: 0,
        }
    }
}

/// Standard modifier for an ability value (10-11 = 0, floor division below).
pub fn standard_modifier(value: i32) -> i32 {
    (value - 10).div_euclid(2)
}

/// Ability scores container, one pair per named ability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub strength: AbilityScore,
    pub dexterity: AbilityScore,
    pub constitution: AbilityScore,
    pub intelligence: AbilityScore,
    pub wisdom: AbilityScore,
    pub charisma: AbilityScore,
}

impl AbilityScores {
    pub fn get(&self, ability: Ability) -> AbilityScore {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, score: AbilityScore) {
        match ability {
            Ability::Strength => self.strength = score,
            Ability::Dexterity => self.dexterity = score,
            Ability::Constitution => self.constitution = score,
            Ability::Intelligence => self.intelligence = score,
            Ability::Wisdom => self.wisdom = score,
            Ability::Charisma => self.charisma = score,
        }
    }
}

/// Hit point block. `desc` carries the class hit-die expression when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPoints {
    pub current: i32,
    pub max: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl HitPoints {
    pub fn new(max: i32) -> Self {
        Self {
            current: max,
            max,
            desc: None,
        }
    }
}

/// Nested currency block; every denomination present, absent ones zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Currency {
    pub platinum: i64,
    pub gold: i64,
    pub electrum: i64,
    pub silver: i64,
    pub copper: i64,
}

fn default_cost_currency() -> String {
    "gp".to_string()
}

fn default_category() -> String {
    "general".to_string()
}

fn default_amount() -> u32 {
    1
}

/// One equipment entry. Unrecognized fields survive load/save untouched
/// via the flattened `extra` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost_value: f64,
    #[serde(default = "default_cost_currency")]
    pub cost_currency: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EquipmentItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cost_value: 0.0,
            cost_currency: default_cost_currency(),
            weight: 0.0,
            category: default_category(),
            amount: default_amount(),
            extra: Map::new(),
        }
    }
}

/// A known spell with its preparation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellEntry {
    pub id: String,
    pub level: u8,
    /// Which daily slot this spell fills, if prepared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_slot: Option<u8>,
}

impl SpellEntry {
    pub fn new(id: impl Into<String>, level: u8) -> Self {
        Self {
            id: id.into(),
            level,
            prepared_slot: None,
        }
    }
}

/// Record settings, carrying the schema version plus any user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            extra: Map::new(),
        }
    }
}

/// The character record in its current persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub id: Uuid,
    pub name: String,
    pub abilities: AbilityScores,

    /// Race slug, or [`CUSTOM_RACE`] for a freeform race.
    pub race: String,
    /// Freeform race name when `race` is the custom sentinel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_race: Option<String>,
    /// Ordered class slugs; custom classes use the [`CUSTOM_CLASS_PREFIX`].
    pub classes: Vec<String>,

    pub hp: HitPoints,
    pub currency: Currency,
    pub equipment: Vec<EquipmentItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spells: Option<Vec<SpellEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cantrips: Option<Vec<String>>,

    pub experience: u32,
    pub level: u8,

    pub settings: Settings,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            abilities: AbilityScores::default(),
            race: String::new(),
            custom_race: None,
            classes: Vec::new(),
            hp: HitPoints::default(),
            currency: Currency::default(),
            equipment: Vec::new(),
            spells: None,
            cantrips: None,
            experience: 0,
            level: 1,
            settings: Settings::default(),
        }
    }
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether the record signals a freeform custom race.
    pub fn has_custom_race(&self) -> bool {
        self.race == CUSTOM_RACE
    }

    /// Whether any selected class is a freeform custom class.
    pub fn has_custom_class(&self) -> bool {
        self.classes.iter().any(|c| is_custom_class(c))
    }

    /// Whether the record's shape is trusted by cascade/progression logic.
    pub fn is_current_version(&self) -> bool {
        self.settings.version == SCHEMA_VERSION
    }
}
