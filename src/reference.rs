//! Read-only reference data: race, class, and spell tables.
//!
//! The engine never mutates these tables; it only looks things up. A
//! built-in catalog covers the stock rules content, and the async
//! [`SpellCatalog`] wraps an on-demand source with a memoizing cache so
//! repeated validation and progression calls do not re-fetch.

use crate::character::Ability;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tokio::sync::Mutex;

/// A minimum ability value a race demands of its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRequirement {
    pub ability: Ability,
    pub minimum: i32,
}

/// One race table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceDef {
    pub id: String,
    pub name: String,
    pub ability_requirements: Vec<AbilityRequirement>,
    /// Classes members of this race may take; `None` means any.
    pub allowed_classes: Option<Vec<String>>,
}

impl RaceDef {
    /// Whether this race permits the given class.
    pub fn permits_class(&self, class_id: &str) -> bool {
        match &self.allowed_classes {
            None => true,
            Some(allowed) => allowed.iter().any(|c| c == class_id),
        }
    }
}

/// Spell slots per spell level, indexed by character level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellcastingDef {
    /// `slots[level - 1][spell_level_index]`; rows may have different widths.
    pub slots: Vec<Vec<u8>>,
}

impl SpellcastingDef {
    /// Slot counts at a character level; empty past the end of the table.
    pub fn slots_at(&self, level: u8) -> &[u8] {
        if level == 0 {
            return &[];
        }
        self.slots
            .get(level as usize - 1)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One class table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: String,
    pub name: String,
    /// Hit-die expression, e.g. `"1d8"`.
    pub hit_die: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spellcasting: Option<SpellcastingDef>,
}

impl ClassDef {
    pub fn is_spellcaster(&self) -> bool {
        self.spellcasting.is_some()
    }
}

/// One spell table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellDef {
    pub id: String,
    pub name: String,
    pub level: u8,
    /// Class slugs whose lists include this spell.
    pub classes: Vec<String>,
}

/// The read-only lookup tables the engine consumes.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub races: HashMap<String, RaceDef>,
    pub classes: HashMap<String, ClassDef>,
    pub spells: Vec<SpellDef>,
}

impl ReferenceData {
    pub fn new(races: Vec<RaceDef>, classes: Vec<ClassDef>, spells: Vec<SpellDef>) -> Self {
        Self {
            races: races.into_iter().map(|r| (r.id.clone(), r)).collect(),
            classes: classes.into_iter().map(|c| (c.id.clone(), c)).collect(),
            spells,
        }
    }

    pub fn race(&self, id: &str) -> Option<&RaceDef> {
        self.races.get(id)
    }

    pub fn class(&self, id: &str) -> Option<&ClassDef> {
        self.classes.get(id)
    }

    pub fn spell(&self, id: &str) -> Option<&SpellDef> {
        self.spells.iter().find(|s| s.id == id)
    }

    /// Spells on the given class's list, optionally at one spell level.
    pub fn spells_for_class<'a>(
        &'a self,
        class_id: &'a str,
        level: Option<u8>,
    ) -> impl Iterator<Item = &'a SpellDef> {
        self.spells.iter().filter(move |s| {
            s.classes.iter().any(|c| c == class_id) && level.map_or(true, |l| s.level == l)
        })
    }

    /// The built-in catalog of stock races, classes, and spells.
    pub fn builtin() -> &'static ReferenceData {
        &BUILTIN
    }
}

static BUILTIN: LazyLock<ReferenceData> = LazyLock::new(build_builtin);

fn race(
    id: &str,
    name: &str,
    requirements: &[(Ability, i32)],
    allowed: Option<&[&str]>,
) -> RaceDef {
    RaceDef {
        id: id.to_string(),
        name: name.to_string(),
        ability_requirements: requirements
            .iter()
            .map(|&(ability, minimum)| AbilityRequirement { ability, minimum })
            .collect(),
        allowed_classes: allowed.map(|c| c.iter().map(|s| s.to_string()).collect()),
    }
}

fn class(id: &str, name: &str, hit_die: &str, slots: Option<Vec<Vec<u8>>>) -> ClassDef {
    ClassDef {
        id: id.to_string(),
        name: name.to_string(),
        hit_die: hit_die.to_string(),
        spellcasting: slots.map(|slots| SpellcastingDef { slots }),
    }
}

fn spell(id: &str, name: &str, level: u8, classes: &[&str]) -> SpellDef {
    SpellDef {
        id: id.to_string(),
        name: name.to_string(),
        level,
        classes: classes.iter().map(|s| s.to_string()).collect(),
    }
}

fn build_builtin() -> ReferenceData {
    let races = vec![
        race("human", "Human", &[], None),
        race(
            "dwarf",
            "Dwarf",
            &[(Ability::Constitution, 9)],
            Some(&["fighter", "thief", "assassin", "cleric", "barbarian"]),
        ),
        race(
            "elf",
            "Elf",
            &[(Ability::Intelligence, 9)],
            Some(&["fighter", "magic-user", "thief", "assassin", "ranger"]),
        ),
        race(
            "halfling",
            "Halfling",
            &[(Ability::Dexterity, 9)],
            Some(&["fighter", "thief", "druid", "scout"]),
        ),
        race(
            "half-orc",
            "Half-Orc",
            &[(Ability::Strength, 9)],
            Some(&["fighter", "thief", "assassin", "barbarian"]),
        ),
    ];

    let classes = vec![
        class("fighter", "Fighter", "1d8", None),
        class("barbarian", "Barbarian", "1d8", None),
        class("ranger", "Ranger", "1d8", None),
        class("paladin", "Paladin", "1d8", None),
        class("scout", "Scout", "1d6", None),
        class("thief", "Thief", "1d4", None),
        class("assassin", "Assassin", "1d4", None),
        class(
            "cleric",
            "Cleric",
            "1d6",
            Some(vec![
                vec![0],
                vec![1],
                vec![2],
                vec![2, 1],
                vec![2, 2],
                vec![2, 2, 1, 1],
                vec![2, 2, 2, 1, 1],
                vec![3, 3, 2, 2, 1],
                vec![3, 3, 3, 2, 2],
                vec![4, 4, 3, 3, 2],
            ]),
        ),
        class(
            "magic-user",
            "Magic-User",
            "1d4",
            Some(vec![
                vec![1],
                vec![2],
                vec![2, 1],
                vec![2, 2],
                vec![2, 2, 1],
                vec![2, 2, 2],
                vec![3, 2, 2, 1],
                vec![3, 3, 2, 2],
                vec![3, 3, 3, 2, 1],
                vec![3, 3, 3, 3, 2],
            ]),
        ),
        class(
            "druid",
            "Druid",
            "1d6",
            Some(vec![
                vec![1],
                vec![2],
                vec![2, 1],
                vec![2, 2],
                vec![2, 2, 1],
                vec![2, 2, 2, 1],
                vec![3, 2, 2, 1, 1],
                vec![3, 3, 2, 2, 1],
            ]),
        ),
    ];

    let spells = vec![
        spell("magic-missile", "Magic Missile", 1, &["magic-user"]),
        spell("sleep", "Sleep", 1, &["magic-user"]),
        spell("shield", "Shield", 1, &["magic-user"]),
        spell("read-magic", "Read Magic", 1, &["magic-user"]),
        spell("invisibility", "Invisibility", 2, &["magic-user"]),
        spell("web", "Web", 2, &["magic-user"]),
        spell("fireball", "Fireball", 3, &["magic-user"]),
        spell("cure-light-wounds", "Cure Light Wounds", 1, &["cleric", "druid"]),
        spell(
            "protection-from-evil",
            "Protection from Evil",
            1,
            &["cleric"],
        ),
        spell("bless", "Bless", 2, &["cleric"]),
        spell("hold-person", "Hold Person", 2, &["cleric"]),
        spell("entangle", "Entangle", 1, &["druid"]),
        spell("barkskin", "Barkskin", 2, &["druid"]),
    ];

    ReferenceData::new(races, classes, spells)
}

// ============================================================================
// Async catalog boundary
// ============================================================================

/// Errors from a spell catalog source.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog source error: {0}")]
    Source(String),
}

/// An on-demand source of spell reference data.
#[async_trait]
pub trait SpellSource: Send + Sync {
    async fn fetch_spells(
        &self,
        class: &str,
        level: Option<u8>,
    ) -> Result<Vec<SpellDef>, CatalogError>;
}

/// A [`SpellSource`] backed by in-memory reference data.
pub struct StaticSpellSource {
    data: Arc<ReferenceData>,
}

impl StaticSpellSource {
    pub fn new(data: Arc<ReferenceData>) -> Self {
        Self { data }
    }
}

#[async_trait]
impl SpellSource for StaticSpellSource {
    async fn fetch_spells(
        &self,
        class: &str,
        level: Option<u8>,
    ) -> Result<Vec<SpellDef>, CatalogError> {
        Ok(self.data.spells_for_class(class, level).cloned().collect())
    }
}

/// A spell lookup with a memoizing cache keyed by `(class, level)`.
///
/// The cache is owned by this object rather than being a module-level
/// singleton, so tests can inject a fresh, isolated cache per run. Entries
/// are never invalidated: reference data is static for the process lifetime.
pub struct SpellCatalog<S> {
    source: S,
    cache: Mutex<HashMap<(String, Option<u8>), Arc<Vec<SpellDef>>>>,
}

impl<S: SpellSource> SpellCatalog<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Spells for a class (optionally one level), fetching at most once
    /// per distinct lookup key.
    pub async fn spells(
        &self,
        class: &str,
        level: Option<u8>,
    ) -> Result<Arc<Vec<SpellDef>>, CatalogError> {
        let key = (class.to_string(), level);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let fetched = Arc::new(self.source.fetch_spells(class, level).await?);
        self.cache
            .lock()
            .await
            .insert(key, Arc::clone(&fetched));
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtin_tables_are_consistent() {
        let refs = ReferenceData::builtin();
        assert!(refs.race("dwarf").is_some());
        assert!(refs.class("magic-user").is_some());

        // Every spell's class list points at real classes
        for spell in &refs.spells {
            for class in &spell.classes {
                assert!(refs.class(class).is_some(), "{} -> {class}", spell.id);
            }
        }

        // Every race's allowed-class list points at real classes
        for race in refs.races.values() {
            if let Some(allowed) = &race.allowed_classes {
                for class in allowed {
                    assert!(refs.class(class).is_some(), "{} -> {class}", race.id);
                }
            }
        }
    }

    #[test]
    fn test_slots_at_clamps_to_table() {
        let caster = ReferenceData::builtin().class("magic-user").unwrap();
        let table = caster.spellcasting.as_ref().unwrap();
        assert_eq!(table.slots_at(1), &[1]);
        assert_eq!(table.slots_at(3), &[2, 1]);
        assert_eq!(table.slots_at(0), &[] as &[u8]);
        assert_eq!(table.slots_at(99), &[] as &[u8]);
    }

    #[test]
    fn test_spells_for_class_filters_by_level() {
        let refs = ReferenceData::builtin();
        let firsts: Vec<_> = refs.spells_for_class("cleric", Some(1)).collect();
        assert!(firsts.iter().all(|s| s.level == 1));
        assert!(firsts.iter().any(|s| s.id == "cure-light-wounds"));
        assert!(firsts.iter().all(|s| s.id != "bless"));
    }

    #[tokio::test]
    async fn test_static_source_serves_reference_data() {
        let source = StaticSpellSource::new(Arc::new(ReferenceData::builtin().clone()));
        let catalog = SpellCatalog::new(source);
        let spells = catalog.spells("cleric", Some(2)).await.unwrap();
        assert!(spells.iter().any(|s| s.id == "bless"));
        assert!(spells.iter().all(|s| s.level == 2));
    }

    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SpellSource for CountingSource {
        async fn fetch_spells(
            &self,
            class: &str,
            level: Option<u8>,
        ) -> Result<Vec<SpellDef>, CatalogError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(ReferenceData::builtin()
                .spells_for_class(class, level)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_catalog_memoizes_per_key() {
        let catalog = SpellCatalog::new(CountingSource {
            fetches: AtomicUsize::new(0),
        });

        let first = catalog.spells("magic-user", Some(1)).await.unwrap();
        let second = catalog.spells("magic-user", Some(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.source.fetches.load(Ordering::SeqCst), 1);

        // A different key fetches again
        catalog.spells("magic-user", Some(2)).await.unwrap();
        assert_eq!(catalog.source.fetches.load(Ordering::SeqCst), 2);
    }
}
