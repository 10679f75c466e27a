//! Line-shape dispatch tables.
//!
//! A table maps line prefixes to an expected regex and a list of checks on its
//! capture groups. Validation is a fold over the captured log: each line is
//! handled by [`ShapeTable::step`], which consumes the current
//! [`ValidationState`] and returns the next one together with an outcome.
use super::Verdict;
use anyhow::{anyhow, Result};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};

/// Where a check takes its tracking key from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRef {
    Named(String),
    Group(usize),
}

impl KeyRef {
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }

    fn group_index(&self) -> Option<usize> {
        match self {
            Self::Named(_) => None,
            Self::Group(index) => Some(*index),
        }
    }

    fn resolve(&self, caps: &Captures<'_>) -> Option<String> {
        match self {
            Self::Named(name) => Some(name.clone()),
            Self::Group(index) => caps.get(*index).map(|m| m.as_str().to_string()),
        }
    }
}

/// Temporal expectation applied to one captured value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeCheck {
    /// Value never differs from its first observation.
    Stable { key: KeyRef, group: usize },
    /// First observation is the baseline; exactly one later change is allowed.
    ChangeOnce { key: KeyRef, group: usize },
    /// Value is `before` until it becomes `after`, then stays `after`.
    Transition {
        key: KeyRef,
        group: usize,
        before: String,
        after: String,
    },
    /// The key has been observed at all (a field or variable that only
    /// exists after patching).
    Appears { key: KeyRef },
}

impl ShapeCheck {
    fn key(&self) -> &KeyRef {
        match self {
            Self::Stable { key, .. }
            | Self::ChangeOnce { key, .. }
            | Self::Transition { key, .. }
            | Self::Appears { key } => key,
        }
    }

    fn value_group(&self) -> Option<usize> {
        match self {
            Self::Stable { group, .. }
            | Self::ChangeOnce { group, .. }
            | Self::Transition { group, .. } => Some(*group),
            Self::Appears { .. } => None,
        }
    }

    fn apply(&self, state: &mut ValidationState, caps: &Captures<'_>) -> Result<(), String> {
        let key = self
            .key()
            .resolve(caps)
            .ok_or_else(|| "key capture group did not participate in the match".to_string())?;
        state.seen.insert(key.clone());

        let Some(group) = self.value_group() else {
            state.appeared.insert(key);
            return Ok(());
        };
        let value = caps
            .get(group)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| format!("capture group {group} did not participate in the match"))?;

        match self {
            Self::Stable { .. } => match state.values.get(&key) {
                None => {
                    state.values.insert(key, Observed::baseline(value));
                }
                Some(observed) if observed.value != value => {
                    return Err(format!(
                        "{key} should remain {}, is {value}",
                        observed.value
                    ));
                }
                Some(_) => {}
            },
            Self::ChangeOnce { .. } => match state.values.get_mut(&key) {
                None => {
                    state.values.insert(key, Observed::baseline(value));
                }
                Some(observed) if observed.value != value => {
                    if observed.changed {
                        return Err(format!(
                            "{key} changed more than once: previous value was {}, new value is {value}",
                            observed.value
                        ));
                    }
                    observed.value = value;
                    observed.changed = true;
                }
                Some(_) => {}
            },
            Self::Transition { before, after, .. } => {
                let changed = state
                    .values
                    .get(&key)
                    .map(|observed| observed.changed)
                    .unwrap_or(false);
                if changed {
                    if &value != after {
                        return Err(format!(
                            "{key} should stay {after} after patching, is {value}"
                        ));
                    }
                } else if &value == after {
                    if !state.values.contains_key(&key) {
                        return Err(format!(
                            "{key} was {value} before a baseline of {before} was observed"
                        ));
                    }
                    state.values.insert(
                        key,
                        Observed {
                            value,
                            changed: true,
                        },
                    );
                } else if &value != before {
                    return Err(format!(
                        "{key} should be {before} before patching, is {value}"
                    ));
                } else {
                    state.values.insert(key, Observed::baseline(value));
                }
            }
            Self::Appears { .. } => {}
        }
        Ok(())
    }
}

/// One dispatchable line shape.
#[derive(Debug, Clone)]
pub struct LineShape {
    prefix: String,
    pattern: Option<Regex>,
    checks: Vec<ShapeCheck>,
}

impl LineShape {
    /// Lines with this prefix are accepted without inspection.
    pub fn skip(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            pattern: None,
            checks: Vec::new(),
        }
    }

    /// Lines with this prefix must match `pattern`; nothing is tracked.
    pub fn exact(prefix: &str, pattern: &str) -> Result<Self> {
        Self::checked(prefix, pattern, Vec::new())
    }

    pub fn checked(prefix: &str, pattern: &str, checks: Vec<ShapeCheck>) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|err| anyhow!("invalid pattern for prefix {prefix:?}: {err}"))?;
        let groups = regex.captures_len() - 1;
        for check in &checks {
            let referenced = [check.key().group_index(), check.value_group()];
            for group in referenced.into_iter().flatten() {
                if group == 0 || group > groups {
                    return Err(anyhow!(
                        "check on prefix {prefix:?} references capture group {group}, pattern {pattern:?} has {groups}"
                    ));
                }
            }
        }
        Ok(Self {
            prefix: prefix.to_string(),
            pattern: Some(regex),
            checks,
        })
    }
}

/// End-of-log obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// A tracked value must have made its one transition.
    Changed(String),
    /// A key must have been observed at least once.
    Seen(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    value: String,
    changed: bool,
}

impl Observed {
    fn baseline(value: String) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

/// Everything the fold carries from one line to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    line_no: usize,
    values: BTreeMap<String, Observed>,
    seen: BTreeSet<String>,
    appeared: BTreeSet<String>,
}

impl ValidationState {
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Whether any evidence of the patch has been observed yet.
    pub fn patched(&self) -> bool {
        !self.appeared.is_empty() || self.values.values().any(|observed| observed.changed)
    }

    pub fn changed(&self, key: &str) -> bool {
        self.values
            .get(key)
            .map(|observed| observed.changed)
            .unwrap_or(false)
    }

    pub fn seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }
}

/// Result of feeding one line through the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Accepted,
    Unrecognized,
    PatternMismatch { pattern: String },
    Violation(String),
}

#[derive(Debug, Clone)]
pub struct ShapeTable {
    shapes: Vec<LineShape>,
    requirements: Vec<Requirement>,
}

impl ShapeTable {
    pub fn new(shapes: Vec<LineShape>, requirements: Vec<Requirement>) -> Result<Self> {
        let mut prefixes = BTreeSet::new();
        for shape in &shapes {
            if !prefixes.insert(shape.prefix.as_str()) {
                return Err(anyhow!("duplicate line shape prefix {:?}", shape.prefix));
            }
        }
        Ok(Self {
            shapes,
            requirements,
        })
    }

    /// Longest matching prefix wins so `gamma.other:` never shadows
    /// `gamma.other.other:`.
    fn dispatch(&self, line: &str) -> Option<&LineShape> {
        self.shapes
            .iter()
            .filter(|shape| line.starts_with(shape.prefix.as_str()))
            .max_by_key(|shape| shape.prefix.len())
    }

    pub fn step(&self, mut state: ValidationState, line: &str) -> (ValidationState, LineOutcome) {
        state.line_no += 1;
        let Some(shape) = self.dispatch(line) else {
            return (state, LineOutcome::Unrecognized);
        };
        let Some(pattern) = shape.pattern.as_ref() else {
            return (state, LineOutcome::Accepted);
        };
        let Some(caps) = pattern.captures(line) else {
            let pattern = pattern.as_str().to_string();
            return (state, LineOutcome::PatternMismatch { pattern });
        };
        for check in &shape.checks {
            if let Err(message) = check.apply(&mut state, &caps) {
                return (state, LineOutcome::Violation(message));
            }
        }
        (state, LineOutcome::Accepted)
    }

    /// Messages for every requirement the finished log left unmet.
    pub fn unmet_requirements(&self, state: &ValidationState) -> Vec<String> {
        self.requirements
            .iter()
            .filter_map(|requirement| match requirement {
                Requirement::Changed(key) if !state.changed(key) => {
                    Some(format!("patching never happened: {key} never changed"))
                }
                Requirement::Seen(key) if !state.seen(key) => {
                    Some(format!("patching never happened: {key} never appeared"))
                }
                _ => None,
            })
            .collect()
    }

    /// Run the whole log through the table.
    pub fn evaluate<'a, I>(&self, lines: I) -> Verdict
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = ValidationState::default();
        for line in lines {
            let (next, outcome) = self.step(state, line);
            state = next;
            if outcome != LineOutcome::Accepted {
                return Verdict::fail(describe_failure(&state, line, &outcome));
            }
        }
        let unmet = self.unmet_requirements(&state);
        if unmet.is_empty() {
            Verdict::pass()
        } else {
            Verdict::fail(unmet)
        }
    }
}

fn describe_failure(state: &ValidationState, line: &str, outcome: &LineOutcome) -> Vec<String> {
    let line_no = state.line_no();
    let mut diagnostics = Vec::new();
    match outcome {
        LineOutcome::Accepted => return diagnostics,
        LineOutcome::Unrecognized => {
            diagnostics.push(format!(
                "Line {line_no} does not start like any expected line"
            ));
            diagnostics.push(format!("Offending line is: {line}"));
        }
        LineOutcome::PatternMismatch { pattern } => {
            diagnostics.push(format!("Line {line_no} did not match pattern"));
            diagnostics.push(format!("Offending line is: {line}"));
            diagnostics.push(format!("and the pattern (regex) is: {pattern}"));
        }
        LineOutcome::Violation(message) => {
            diagnostics.push(format!("Line {line_no} did not pass validation: {message}"));
            diagnostics.push(format!("Offending line is: {line}"));
        }
    }
    if state.patched() {
        diagnostics.push("Note, patching has been done".to_string());
    }
    diagnostics
}

#[cfg(test)]
#[path = "shapes_tests.rs"]
mod tests;
