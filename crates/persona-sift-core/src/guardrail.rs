//! Hard-constraint guardrail filtering.
//!
//! Detects constraint phrases in the query with a fixed vocabulary and
//! removes ranked sections that mention an excluded term. Detection is a
//! plain pattern match, so every removal can be traced back to a phrase in
//! the query and a term in a section.
//!
//! # Vocabulary
//!
//! Two sources of constraints:
//!
//! 1. **Rules** — [`BUILTIN_RULES`] plus any configured [`ConstraintRule`]s.
//!    A rule fires when one of its trigger phrases appears in the query as
//!    a whole word and contributes its exclusion terms.
//! 2. **Negation cues** — `avoid X`, `avoiding X`, `without X`, `exclude X`,
//!    `excluding X`, `free of X`, `no X`. Determiners and modifiers after
//!    the cue are skipped (`without any meat`, `no raw fish`). A category
//!    noun (`meat`, `red meat`, `fish`, `dairy`, `nuts`, ...) excludes its
//!    whole term group; any other noun (and its singular) is excluded as
//!    written.
//!
//! A trigger is ignored when it is negated itself (`non-vegetarian`) or
//! when one of the three preceding words of the same clause is an
//! inclusive cue (`including gluten-free options` asks for some gluten-free
//! dishes, it does not forbid gluten). Clauses end at `.`, `,`, `;`, `:`,
//! `!` and `?`, so `Persona: ... also bakes. Task: vegetarian` stays hard.
//!
//! # Matching
//!
//! All exclusion terms compile into one case-insensitive regex that
//! matches whole words with an optional `s`/`es` plural suffix, so
//! `sausage` catches `Sausages` but `ham` does not catch `graham`.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::{ScoredSection, Section};

/// A constraint rule with static vocabulary.
///
/// `exclude` lists term groups; the rule excludes their union.
#[derive(Debug)]
pub struct StaticRule {
    pub name: &'static str,
    pub triggers: &'static [&'static str],
    pub exclude: &'static [&'static [&'static str]],
}

const MEAT: &[&str] = &[
    "meat", "beef", "pork", "chicken", "lamb", "mutton", "turkey", "veal", "venison",
    "steak", "bacon", "ham", "hamburger", "prosciutto", "pancetta", "salami", "pepperoni",
    "chorizo", "sausage", "meatball", "meatloaf", "duck", "gelatin",
];

const SEAFOOD: &[&str] = &[
    "fish", "seafood", "shellfish", "tuna", "salmon", "cod", "sardine", "anchovy",
    "anchovies", "shrimp", "prawn", "lobster", "crab", "oyster", "clam", "mussel", "squid",
    "octopus", "scallop",
];

const ANIMAL_PRODUCTS: &[&str] = &[
    "egg", "milk", "cheese", "butter", "cream", "yogurt", "yoghurt", "ghee", "whey",
    "honey", "mayonnaise",
];

const GLUTEN: &[&str] = &[
    "gluten", "flour", "wheat", "barley", "rye", "bread", "breadcrumbs", "pasta", "pita",
    "baguette", "couscous", "tortilla", "freekeh", "roux", "semolina", "seitan", "beer",
];

const DAIRY: &[&str] = &[
    "dairy", "milk", "cheese", "butter", "cream", "yogurt", "yoghurt", "ghee", "whey",
];

const RED_MEAT: &[&str] = &[
    "beef", "pork", "lamb", "mutton", "veal", "venison", "goat", "steak", "bacon", "ham",
    "hamburger", "prosciutto", "pancetta", "salami", "pepperoni", "chorizo", "sausage",
    "meatball", "meatloaf",
];

const NUTS: &[&str] = &[
    "nut", "peanut", "almond", "cashew", "walnut", "pecan", "hazelnut", "pistachio",
    "macadamia",
];

const PORK_AND_ALCOHOL: &[&str] = &[
    "pork", "bacon", "ham", "prosciutto", "pancetta", "salami", "pepperoni", "chorizo",
    "gelatin", "alcohol", "wine", "beer", "rum", "liquor",
];

const ALCOHOL: &[&str] = &[
    "alcohol", "wine", "beer", "cocktail", "liquor", "vodka", "rum", "whiskey", "whisky",
    "gin", "tequila", "brandy", "champagne",
];

const CHILD_ORIENTED: &[&str] = &[
    "kids", "children", "child", "family-friendly", "toddler", "playground",
];

/// Built-in constraint vocabulary.
///
/// Each rule is checked on its own, so a query can trigger several.
pub const BUILTIN_RULES: &[StaticRule] = &[
    StaticRule {
        name: "vegetarian",
        triggers: &["vegetarian", "veggie", "meat-free", "meatless"],
        exclude: &[MEAT, SEAFOOD],
    },
    StaticRule {
        name: "vegan",
        triggers: &["vegan", "plant-based"],
        exclude: &[MEAT, SEAFOOD, ANIMAL_PRODUCTS],
    },
    StaticRule {
        name: "pescatarian",
        triggers: &["pescatarian", "pescetarian"],
        exclude: &[MEAT],
    },
    StaticRule {
        name: "gluten-free",
        triggers: &["gluten-free", "gluten free", "celiac", "coeliac"],
        exclude: &[GLUTEN],
    },
    StaticRule {
        name: "dairy-free",
        triggers: &["dairy-free", "dairy free", "lactose-free", "lactose intolerant"],
        exclude: &[DAIRY],
    },
    StaticRule {
        name: "nut-free",
        triggers: &["nut-free", "nut free", "nut allergy", "peanut allergy"],
        exclude: &[NUTS],
    },
    StaticRule {
        name: "halal",
        triggers: &["halal"],
        exclude: &[PORK_AND_ALCOHOL],
    },
    StaticRule {
        name: "alcohol-free",
        triggers: &["alcohol-free", "non-alcoholic", "sober", "teetotal"],
        exclude: &[ALCOHOL],
    },
    StaticRule {
        name: "adults-only",
        triggers: &["adults only", "adults-only", "adult-only", "child-free"],
        exclude: &[CHILD_ORIENTED],
    },
];

/// Words that turn a following trigger into a preference.
const INCLUSIVE_CUES: &[&str] = &[
    "including", "include", "includes", "some", "also", "optionally", "optional", "plus",
];

/// Category nouns a negation cue can name, with the groups they exclude.
/// Keys are singular.
const NEGATED_CATEGORIES: &[(&str, &[&[&str]])] = &[
    ("meat", &[MEAT]),
    ("red meat", &[RED_MEAT]),
    ("fish", &[SEAFOOD]),
    ("seafood", &[SEAFOOD]),
    ("shellfish", &[SEAFOOD]),
    ("animal product", &[MEAT, SEAFOOD, ANIMAL_PRODUCTS]),
    ("dairy", &[DAIRY]),
    ("gluten", &[GLUTEN]),
    ("nut", &[NUTS]),
    ("alcohol", &[ALCOHOL]),
];

/// Skipped between a negation cue and its noun.
const NEGATION_DETERMINERS: &[&str] = &["a", "an", "any", "the", "added", "extra"];

/// Adjectives skipped before the noun when no category phrase matches.
const NEGATION_MODIFIERS: &[&str] = &[
    "red", "white", "raw", "fresh", "processed", "fried", "deep-fried", "refined", "cured",
    "smoked", "canned", "tree",
];

/// Words never captured by a negation cue (`no more than`, `no need`).
const NEGATION_STOPWORDS: &[&str] = &[
    "the", "any", "more", "less", "than", "longer", "need", "needs", "other", "one",
    "further", "later", "matter", "problem", "worries", "way", "doubt", "limit",
    "restrictions", "fuss", "hassle", "exception", "exceptions",
];

/// A constraint rule with owned vocabulary; built-in or configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRule {
    pub name: String,
    pub triggers: Vec<String>,
    pub exclude: Vec<String>,
}

impl From<&StaticRule> for ConstraintRule {
    fn from(rule: &StaticRule) -> Self {
        Self {
            name: rule.name.to_string(),
            triggers: rule.triggers.iter().map(|t| t.to_string()).collect(),
            exclude: rule
                .exclude
                .iter()
                .flat_map(|group| group.iter().map(|t| t.to_string()))
                .collect(),
        }
    }
}

/// A constraint found in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedConstraint {
    pub name: String,
    /// The query phrase that triggered it.
    pub trigger: String,
    pub terms: Vec<String>,
}

/// Why a section was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub constraint: String,
    /// The text matched in the section, as written.
    pub matched: String,
}

/// Constraint detector configured with a vocabulary.
#[derive(Debug, Clone)]
pub struct Guardrail {
    rules: Vec<ConstraintRule>,
    negation_cues: bool,
}

impl Default for Guardrail {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Guardrail {
    /// Built-in rules plus negation cues.
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES.iter().map(ConstraintRule::from).collect(),
            negation_cues: true,
        }
    }

    /// Built-in rules extended with configured ones.
    ///
    /// Configured triggers are lowercased and whitespace-collapsed so they
    /// line up with what the trigger regex reports.
    pub fn with_rules(extra: impl IntoIterator<Item = ConstraintRule>) -> Self {
        let mut guardrail = Self::builtin();
        guardrail.rules.extend(extra.into_iter().map(|mut rule| {
            rule.triggers = rule
                .triggers
                .iter()
                .map(|t| normalize_phrase(t))
                .filter(|t| !t.is_empty())
                .collect();
            rule
        }));
        guardrail
    }

    /// A guardrail that detects nothing; filtering becomes the identity.
    pub fn disabled() -> Self {
        Self {
            rules: Vec::new(),
            negation_cues: false,
        }
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    /// Scan `query` for constraints and compile the exclusion predicate.
    pub fn detect(&self, query: &str) -> Result<ConstraintPredicate, regex::Error> {
        let lower = query.to_lowercase();
        let mut constraints: Vec<DetectedConstraint> = Vec::new();

        if let Some(trigger_re) = self.trigger_regex()? {
            for m in trigger_re.find_iter(&lower) {
                let prefix = &lower[..m.start()];
                if prefix.ends_with("non-") || prefix.ends_with("non ") {
                    continue;
                }
                if preceded_by_inclusive_cue(prefix) {
                    continue;
                }
                let trigger = m.as_str();
                let Some(rule) = self
                    .rules
                    .iter()
                    .find(|r| r.triggers.iter().any(|t| t == trigger))
                else {
                    continue;
                };
                if constraints.iter().any(|c| c.name == rule.name) {
                    continue;
                }
                constraints.push(DetectedConstraint {
                    name: rule.name.clone(),
                    trigger: trigger.to_string(),
                    terms: normalize_terms(&rule.exclude),
                });
            }
        }

        if self.negation_cues {
            let negation_re = negation_regex()?;
            for m in negation_re.find_iter(&lower) {
                let Some((phrase, terms)) = negated_phrase(&lower[m.end()..]) else {
                    continue;
                };
                let name = format!("no {}", phrase);
                if constraints.iter().any(|c| c.name == name) {
                    continue;
                }
                constraints.push(DetectedConstraint {
                    name,
                    trigger: format!("{}{}", m.as_str(), phrase),
                    terms,
                });
            }
        }

        ConstraintPredicate::compile(constraints)
    }

    fn trigger_regex(&self) -> Result<Option<Regex>, regex::Error> {
        let triggers: Vec<String> = self
            .rules
            .iter()
            .flat_map(|r| r.triggers.iter().cloned())
            .collect();
        alternation_regex(&triggers, "")
    }
}

/// Exclusion test compiled from a query's constraints.
#[derive(Debug, Clone)]
pub struct ConstraintPredicate {
    constraints: Vec<DetectedConstraint>,
    matcher: Option<Regex>,
}

impl ConstraintPredicate {
    /// A predicate that matches nothing.
    pub fn none() -> Self {
        Self {
            constraints: Vec::new(),
            matcher: None,
        }
    }

    fn compile(constraints: Vec<DetectedConstraint>) -> Result<Self, regex::Error> {
        let terms: Vec<String> = constraints
            .iter()
            .flat_map(|c| c.terms.iter().cloned())
            .collect();
        let matcher = alternation_regex(&terms, "(?:e?s)?")?;
        Ok(Self {
            constraints,
            matcher,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn constraints(&self) -> &[DetectedConstraint] {
        &self.constraints
    }

    /// First excluded term in `section`, if any.
    pub fn violation(&self, section: &Section) -> Option<Violation> {
        let matcher = self.matcher.as_ref()?;
        let text = section.combined_text();
        let m = matcher.find(&text)?;
        let matched = m.as_str().to_string();
        let lower = matched.to_lowercase();

        let constraint = self
            .constraints
            .iter()
            .find(|c| c.terms.iter().any(|t| term_matches(t, &lower)))
            .map(|c| c.name.clone())
            .unwrap_or_default();

        Some(Violation {
            constraint,
            matched,
        })
    }
}

/// A section removed by the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removal {
    pub document: String,
    pub heading: String,
    pub rank: usize,
    pub violation: Violation,
}

/// Filter output: the surviving sections and an audit trail of removals.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<ScoredSection>,
    pub removed: Vec<Removal>,
}

/// Drop every ranked section that violates `predicate`.
///
/// Survivors keep their relative order, score, and rank; ranks may have
/// gaps afterwards. An empty predicate returns the input unchanged.
pub fn filter(predicate: &ConstraintPredicate, ranked: Vec<ScoredSection>) -> FilterOutcome {
    if predicate.is_empty() {
        return FilterOutcome {
            kept: ranked,
            removed: Vec::new(),
        };
    }

    let mut outcome = FilterOutcome::default();
    for scored in ranked {
        match predicate.violation(&scored.section) {
            Some(violation) => outcome.removed.push(Removal {
                document: scored.section.document.clone(),
                heading: scored.section.heading.clone(),
                rank: scored.rank,
                violation,
            }),
            None => outcome.kept.push(scored),
        }
    }
    outcome
}

/// `\b(?:a|b|c)SUFFIX\b`, longest alternative first; `None` when empty.
fn alternation_regex(terms: &[String], suffix: &str) -> Result<Option<Regex>, regex::Error> {
    let mut unique: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if unique.is_empty() {
        return Ok(None);
    }
    unique.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let body = unique
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"\b(?:{}){}\b", body, suffix);
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
}

const CLAUSE_BREAKS: &[char] = &['.', ',', ';', ':', '!', '?'];

fn negation_regex() -> Result<Regex, regex::Error> {
    Regex::new(r"\b(?:avoid|avoiding|without|exclude|excluding|free of|no)\s+")
}

/// The noun phrase a negation cue applies to, and the terms it excludes.
///
/// `rest` is the query text after the cue; only its first clause is read.
fn negated_phrase(rest: &str) -> Option<(String, Vec<String>)> {
    let clause = rest.split(CLAUSE_BREAKS).next().unwrap_or(rest);
    let words: Vec<&str> = clause
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .skip_while(|w| NEGATION_DETERMINERS.contains(w))
        .take(3)
        .collect();

    if let [first, second, ..] = words.as_slice() {
        let pair = format!("{} {}", first, singularize(second));
        if let Some(terms) = category_terms(&pair) {
            return Some((format!("{} {}", first, second), terms));
        }
    }

    let head = *words.iter().find(|w| !NEGATION_MODIFIERS.contains(*w))?;
    if head.len() < 3 || NEGATION_STOPWORDS.contains(&head) {
        return None;
    }
    let singular = singularize(head);
    if let Some(terms) = category_terms(singular) {
        return Some((head.to_string(), terms));
    }

    let mut terms = vec![head.to_string()];
    if singular != head {
        terms.push(singular.to_string());
    }
    Some((head.to_string(), terms))
}

fn category_terms(noun: &str) -> Option<Vec<String>> {
    NEGATED_CATEGORIES
        .iter()
        .find(|(name, _)| *name == noun)
        .map(|(name, groups)| {
            let mut terms: Vec<String> = groups
                .iter()
                .flat_map(|g| g.iter().map(|t| t.to_string()))
                .collect();
            if !name.contains(' ') {
                terms.push(name.to_string());
            }
            normalize_terms(&terms)
        })
}

fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn preceded_by_inclusive_cue(prefix: &str) -> bool {
    let clause = prefix.rsplit(CLAUSE_BREAKS).next().unwrap_or(prefix);
    clause
        .split_whitespace()
        .rev()
        .take(3)
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .any(|w| INCLUSIVE_CUES.contains(&w))
}

fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn term_matches(term: &str, matched_lower: &str) -> bool {
    matched_lower == term
        || matched_lower.strip_suffix('s') == Some(term)
        || matched_lower.strip_suffix("es") == Some(term)
}

fn singularize(word: &str) -> &str {
    if word.len() > 4 && ["shes", "ches", "xes"].iter().any(|s| word.ends_with(s)) {
        return &word[..word.len() - 2];
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return &word[..word.len() - 1];
    }
    word
}
