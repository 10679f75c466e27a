//! `validate.json`: the on-disk form of a scenario's validator.
//!
//! A file either names a preset or spells out its own line shapes:
//!
//! ```json
//! {
//!   "shapes": [
//!     { "prefix": "has pid" },
//!     { "prefix": "alpha:", "pattern": "alpha: ([0-9]+)",
//!       "checks": [{ "kind": "transition", "key": "alpha", "group": 1,
//!                    "before": "2", "after": "3" }] }
//!   ],
//!   "require": [{ "changed": "alpha" }]
//! }
//! ```
use super::presets;
use super::shapes::{KeyRef, LineShape, Requirement, ShapeCheck, ShapeTable};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorSpec {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub shapes: Vec<ShapeSpec>,
    #[serde(default)]
    pub require: Vec<RequirementSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeSpec {
    pub prefix: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    Stable {
        key: KeySpec,
        group: usize,
    },
    ChangeOnce {
        key: KeySpec,
        group: usize,
    },
    Transition {
        key: KeySpec,
        group: usize,
        before: String,
        after: String,
    },
    Appears {
        key: KeySpec,
    },
}

/// A literal key name, or the index of the capture group holding it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Group(usize),
    Name(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum RequirementSpec {
    Changed(String),
    Seen(String),
}

impl From<KeySpec> for KeyRef {
    fn from(spec: KeySpec) -> Self {
        match spec {
            KeySpec::Group(index) => KeyRef::Group(index),
            KeySpec::Name(name) => KeyRef::Named(name),
        }
    }
}

impl From<CheckSpec> for ShapeCheck {
    fn from(spec: CheckSpec) -> Self {
        match spec {
            CheckSpec::Stable { key, group } => ShapeCheck::Stable {
                key: key.into(),
                group,
            },
            CheckSpec::ChangeOnce { key, group } => ShapeCheck::ChangeOnce {
                key: key.into(),
                group,
            },
            CheckSpec::Transition {
                key,
                group,
                before,
                after,
            } => ShapeCheck::Transition {
                key: key.into(),
                group,
                before,
                after,
            },
            CheckSpec::Appears { key } => ShapeCheck::Appears { key: key.into() },
        }
    }
}

impl ValidatorSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
    }

    /// Resolve the preset or build the table the file describes.
    pub fn compile(self) -> Result<ShapeTable> {
        if let Some(name) = self.preset.as_deref() {
            if !self.shapes.is_empty() || !self.require.is_empty() {
                return Err(anyhow!(
                    "preset {name:?} cannot be combined with shapes or require"
                ));
            }
            return presets::preset(name);
        }
        if self.shapes.is_empty() {
            return Err(anyhow!("validator declares neither a preset nor any shapes"));
        }

        let mut shapes = Vec::with_capacity(self.shapes.len());
        for shape in self.shapes {
            let checks: Vec<ShapeCheck> = shape.checks.into_iter().map(Into::into).collect();
            let compiled = match shape.pattern.as_deref() {
                Some(pattern) => LineShape::checked(&shape.prefix, pattern, checks)?,
                None if checks.is_empty() => LineShape::skip(&shape.prefix),
                None => {
                    return Err(anyhow!(
                        "shape {:?} has checks but no pattern to capture from",
                        shape.prefix
                    ))
                }
            };
            shapes.push(compiled);
        }
        let requirements = self
            .require
            .into_iter()
            .map(|requirement| match requirement {
                RequirementSpec::Changed(key) => Requirement::Changed(key),
                RequirementSpec::Seen(key) => Requirement::Seen(key),
            })
            .collect();
        ShapeTable::new(shapes, requirements)
    }
}
