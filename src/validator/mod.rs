//! Per-scenario judgment of a captured target log.
//!
//! A validator sees only the captured stdout of the patched program. It must
//! show that the program kept running correctly and that the patch actually
//! took effect, which is why every table carries end-of-log requirements.
mod presets;
mod shapes;
mod spec;

use shapes::ShapeTable;
use spec::ValidatorSpec;

use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// File in a scenario root describing its validator.
pub const VALIDATOR_FILE: &str = "validate.json";

/// Pass/fail plus the reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub pass: bool,
    pub diagnostics: Vec<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            pass: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn fail(diagnostics: Vec<String>) -> Self {
        Self {
            pass: false,
            diagnostics,
        }
    }
}

pub trait Validator {
    fn name(&self) -> &str;

    /// Judge the log at `log`, writing diagnostics to `diag` as they are found.
    fn validate(&self, log: &Path, diag: &mut dyn Write) -> Verdict;
}

/// Validator backed by a line-shape table.
#[derive(Debug)]
pub struct ShapeValidator {
    name: String,
    table: ShapeTable,
}

impl ShapeValidator {
    pub fn new(name: impl Into<String>, table: ShapeTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

impl Validator for ShapeValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, log: &Path, diag: &mut dyn Write) -> Verdict {
        let verdict = match std::fs::read(log) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                self.table.evaluate(text.lines())
            }
            Err(err) => Verdict::fail(vec![format!(
                "cannot read log file {}: {err}",
                log.display()
            )]),
        };
        for message in &verdict.diagnostics {
            if let Err(err) = writeln!(diag, "{message}") {
                tracing::warn!(validator = %self.name, error = %err, "diagnostic write failed");
                break;
            }
        }
        verdict
    }
}

/// Load the validator a scenario root declares in [`VALIDATOR_FILE`].
pub fn load_validator(root: &Path) -> Result<ShapeValidator> {
    let path = root.join(VALIDATOR_FILE);
    let spec = ValidatorSpec::load(&path)?;
    let name = spec
        .preset
        .clone()
        .unwrap_or_else(|| path.display().to_string());
    let table = spec.compile()?;
    Ok(ShapeValidator::new(name, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_preset_from_scenario_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(VALIDATOR_FILE),
            r#"{ "preset": "new_variable" }"#,
        )
        .expect("write validator");
        let validator = load_validator(dir.path()).expect("load");
        assert_eq!(validator.name(), "new_variable");
    }

    #[test]
    fn missing_validator_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_validator(dir.path()).expect_err("missing");
        assert!(format!("{err:#}").contains(VALIDATOR_FILE));
    }

    #[test]
    fn diagnostics_go_to_the_given_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("log");
        std::fs::write(&log, "has pid 1\nv0: I do nothing\n").expect("write log");
        let validator = ShapeValidator::new(
            "new_variable",
            presets::preset("new_variable").expect("preset"),
        );

        let mut sink = Vec::new();
        let verdict = validator.validate(&log, &mut sink);

        assert!(!verdict.pass);
        let written = String::from_utf8(sink).expect("utf8");
        assert_eq!(
            written,
            "patching never happened: new variables never appeared\n"
        );
    }

    #[test]
    fn unreadable_log_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let validator = ShapeValidator::new(
            "constants",
            presets::preset("constants").expect("preset"),
        );
        let mut sink = Vec::new();
        let verdict = validator.validate(&dir.path().join("missing"), &mut sink);
        assert!(!verdict.pass);
        assert!(verdict.diagnostics[0].starts_with("cannot read log file"));
    }
}
