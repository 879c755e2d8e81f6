//! Field validation: rule primitives and the validation core.
//!
//! Rules are pure predicates over a JSON value paired with a fixed failure
//! message. Expected failures are *values* ([`ValidationResult`]), never
//! errors; a caller can always display every message that applies.

use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of validating one value against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another result into this one; errors and warnings accumulate.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// A named, stateless predicate with a human-readable failure message.
pub struct Rule {
    name: &'static str,
    message: String,
    check: Predicate,
}

impl Rule {
    pub fn new(
        name: &'static str,
        message: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            message: message.into(),
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// An ordered list of rules plus a required flag.
#[derive(Debug)]
pub struct Schema {
    pub rules: Vec<Rule>,
    pub required: bool,
}

impl Schema {
    pub fn required(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            required: true,
        }
    }

    pub fn optional(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            required: false,
        }
    }
}

/// Absent, null, empty string, and empty array all count as "no value".
fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

/// Validate a value against a schema.
///
/// Required-but-missing short-circuits to a single "required" error.
/// Optional-and-missing is vacuously valid. Otherwise every rule runs and
/// every failure accumulates; a panicking predicate is converted into a
/// generic error entry instead of unwinding into the caller.
pub fn validate(value: Option<&Value>, schema: &Schema) -> ValidationResult {
    if is_empty_value(value) {
        if schema.required {
            return ValidationResult::error("value is required");
        }
        return ValidationResult::valid();
    }

    let Some(value) = value else {
        return ValidationResult::valid();
    };
    let mut result = ValidationResult::valid();

    for rule in &schema.rules {
        match catch_unwind(AssertUnwindSafe(|| (rule.check)(value))) {
            Ok(true) => {}
            Ok(false) => result.push_error(rule.message()),
            Err(_) => result.push_error(format!("validation error: {}", rule.name())),
        }
    }

    result
}

/// The fixed library of rule constructors.
pub mod rules {
    use super::Rule;
    use serde_json::Value;
    use std::collections::HashSet;

    use crate::character::{custom_class_name, is_custom_class, CUSTOM_RACE};

    pub fn is_number() -> Rule {
        Rule::new("is_number", "value is a number", |v| v.is_number())
    }

    pub fn is_integer() -> Rule {
        Rule::new("is_integer", "value is an integer", |v| {
            v.as_i64().is_some()
        })
    }

    pub fn is_string() -> Rule {
        Rule::new("is_string", "value is text", |v| v.is_string())
    }

    pub fn min_value(min: f64) -> Rule {
        Rule::new(
            "min_value",
            format!("value is at least {min}"),
            move |v| v.as_f64().is_some_and(|n| n >= min),
        )
    }

    pub fn max_value(max: f64) -> Rule {
        Rule::new("max_value", format!("value is at most {max}"), move |v| {
            v.as_f64().is_some_and(|n| n <= max)
        })
    }

    pub fn in_range(min: f64, max: f64) -> Rule {
        Rule::new(
            "in_range",
            format!("value is between {min} and {max}"),
            move |v| v.as_f64().is_some_and(|n| n >= min && n <= max),
        )
    }

    /// Integer between 3 and 18 inclusive.
    pub fn valid_ability_score() -> Rule {
        Rule::new(
            "valid_ability_score",
            "value is an integer between 3 and 18",
            |v| v.as_i64().is_some_and(|n| (3..=18).contains(&n)),
        )
    }

    pub fn min_length(min: usize) -> Rule {
        Rule::new(
            "min_length",
            format!("value is at least {min} characters"),
            move |v| v.as_str().is_some_and(|s| s.chars().count() >= min),
        )
    }

    pub fn max_length(max: usize) -> Rule {
        Rule::new(
            "max_length",
            format!("value is at most {max} characters"),
            move |v| v.as_str().is_some_and(|s| s.chars().count() <= max),
        )
    }

    /// Letters, digits, spaces, hyphens, and apostrophes only.
    pub fn name_characters() -> Rule {
        Rule::new(
            "name_characters",
            "value contains only letters, digits, spaces, hyphens, and apostrophes",
            |v| {
                v.as_str().is_some_and(|s| {
                    s.chars()
                        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '\'')
                })
            },
        )
    }

    pub fn non_empty_array() -> Rule {
        Rule::new("non_empty_array", "at least one entry is selected", |v| {
            v.as_array().is_some_and(|a| !a.is_empty())
        })
    }

    /// Empty, the custom-race sentinel, or present in the supplied race table.
    ///
    /// Takes the table by reference and captures only its keys, so the rule
    /// itself stays pure and testable without global state.
    pub fn valid_race<V>(races: &std::collections::HashMap<String, V>) -> Rule {
        let known: HashSet<String> = races.keys().cloned().collect();
        Rule::new("valid_race", "value is a known race", move |v| {
            v.as_str().is_some_and(|s| {
                s.is_empty() || s == CUSTOM_RACE || known.contains(s)
            })
        })
    }

    /// Every element is a custom-class sentinel string with a non-empty name,
    /// or present in the supplied class table.
    pub fn valid_class_list<V>(classes: &std::collections::HashMap<String, V>) -> Rule {
        let known: HashSet<String> = classes.keys().cloned().collect();
        Rule::new(
            "valid_class_list",
            "every entry is a known or custom class",
            move |v| {
                v.as_array().is_some_and(|entries| {
                    entries.iter().all(|entry| {
                        entry.as_str().is_some_and(|id| {
                            if is_custom_class(id) {
                                custom_class_name(id).is_some_and(|n| !n.is_empty())
                            } else {
                                known.contains(id)
                            }
                        })
                    })
                })
            },
        )
    }
}
