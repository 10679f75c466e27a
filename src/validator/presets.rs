//! Built-in validators for the standard scenario families.
//!
//! Each preset encodes what the sample target prints before and after its
//! patch, and which values must move for the patch to count as applied.
use super::shapes::{KeyRef, LineShape, Requirement, ShapeCheck, ShapeTable};
use anyhow::{anyhow, Result};

pub const PRESET_NAMES: &[&str] = &[
    "field_relocation",
    "multiple_cu",
    "nested_types",
    "new_variable",
    "pointers",
    "unions_enums",
    "constants",
];

/// Every sample target announces itself before its first real line.
const PID_BANNER: &str = "has pid";

pub fn preset(name: &str) -> Result<ShapeTable> {
    match name {
        "field_relocation" => field_relocation(),
        "multiple_cu" => multiple_cu(),
        "nested_types" => nested_types(),
        "new_variable" => new_variable(),
        "pointers" => pointers(),
        "unions_enums" => unions_enums(),
        "constants" => constants(),
        _ => Err(anyhow!(
            "unknown validator preset {name:?} (expected one of {})",
            PRESET_NAMES.join(", ")
        )),
    }
}

fn change_once(key: &str, group: usize) -> ShapeCheck {
    ShapeCheck::ChangeOnce {
        key: KeyRef::named(key),
        group,
    }
}

fn appears(key: &str) -> ShapeCheck {
    ShapeCheck::Appears {
        key: KeyRef::named(key),
    }
}

fn transition(key: &str, before: &str, after: &str) -> ShapeCheck {
    ShapeCheck::Transition {
        key: KeyRef::named(key),
        group: 1,
        before: before.to_string(),
        after: after.to_string(),
    }
}

fn changed(keys: &[&str]) -> Vec<Requirement> {
    keys.iter()
        .map(|key| Requirement::Changed(key.to_string()))
        .collect()
}

/// A struct gains a field, so the whole variable moves once.
fn field_relocation() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::skip("this is print things version"),
            LineShape::exact("Foo:", r"^Foo: 42,66$")?,
            LineShape::checked(
                "field 1 at addr:",
                r"^field 1 at addr: ([0-9a-f]+), field 2 at addr: ([0-9a-f]+)$",
                vec![change_once("field1", 1), change_once("field2", 2)],
            )?,
        ],
        changed(&["field1", "field2"]),
    )
}

/// The same relocation in two compilation units; each prints its own pair.
fn multiple_cu() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::skip("this is print things version"),
            LineShape::exact("Foo:", r"^Foo: 42,66$")?,
            LineShape::checked(
                "field 1 at addr:",
                r"^field 1 at addr: ([0-9a-f]+), field 2 at addr: ([0-9a-f]+)$",
                vec![change_once("field1", 1), change_once("field2", 2)],
            )?,
            LineShape::exact("(Other) Foo:", r"^\(Other\) Foo: 31,13$")?,
            LineShape::checked(
                "(Other) field 1 at addr:",
                r"^\(Other\) field 1 at addr: ([0-9a-f]+), field 2 at addr: ([0-9a-f]+)$",
                vec![
                    change_once("other.field1", 1),
                    change_once("other.field2", 2),
                ],
            )?,
        ],
        changed(&["field1", "field2", "other.field1", "other.field2"]),
    )
}

fn nested_types() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::exact("alpha", r"^alpha: 42,\(foo: 111,128\),69$")?,
            LineShape::checked(
                "v1: foo",
                r"^v1: foo\.field2 is 0 and field3 is 0$",
                vec![appears("new fields")],
            )?,
            // Address dumps differ by layout; only their presence matters.
            LineShape::skip("v0: field"),
            LineShape::skip("v1: field"),
        ],
        vec![Requirement::Seen("new fields".to_string())],
    )
}

fn new_variable() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::exact("v0", r"^v0: I do nothing$")?,
            LineShape::checked(
                "v1: alpha",
                r"^v1: alpha is \{42,66\}$",
                vec![appears("new variables")],
            )?,
            LineShape::checked(
                "v1: beta",
                r"^v1: beta is 24$",
                vec![appears("new variables")],
            )?,
        ],
        vec![Requirement::Seen("new variables".to_string())],
    )
}

fn pointers() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::skip("name is"),
            LineShape::skip("layout is"),
            LineShape::skip("printThings new version"),
            LineShape::checked(
                "alpha lives",
                r"^alpha lives at 0x([0-9a-f]+)$",
                vec![change_once("alpha", 1)],
            )?,
            LineShape::exact("alpha:", r"^alpha: 1, 2, 3$")?,
            LineShape::exact("alpha.other lives", r"^alpha\.other lives at 0x[0-9a-f]+$")?,
            LineShape::exact("alpha.other:", r"^alpha\.other: 33, 22, 11$")?,
            LineShape::exact("alpha.other has", r"^alpha\.other has no other member$")?,
            LineShape::checked(
                "beta lives",
                r"^beta lives at 0x([0-9a-f]+)$",
                vec![change_once("beta", 1)],
            )?,
            LineShape::exact("beta:", r"^beta: 33, 22, 11$")?,
            LineShape::exact("beta has", r"^beta has no other member$")?,
            LineShape::checked(
                "gamma lives",
                r"^gamma lives at 0x([0-9a-f]+)$",
                vec![change_once("gamma", 1)],
            )?,
            LineShape::exact("gamma:", r"^gamma: 44, 55, 66$")?,
            LineShape::exact("gamma.other lives", r"^gamma\.other lives at 0x[0-9a-f]+$")?,
            LineShape::exact("gamma.other:", r"^gamma\.other: 1, 2, 3$")?,
            LineShape::exact(
                "gamma.other.other lives",
                r"^gamma\.other\.other lives at 0x[0-9a-f]+$",
            )?,
            LineShape::exact("gamma.other.other:", r"^gamma\.other\.other: 33, 22, 11$")?,
            LineShape::exact(
                "gamma.other.other has",
                r"^gamma\.other\.other has no other member$",
            )?,
        ],
        changed(&["alpha", "beta", "gamma"]),
    )
}

fn unions_enums() -> Result<ShapeTable> {
    const LIVES: &str = r"^(beta|gamma\.foo|delta\.foo1|delta\.foo2) lives at 0x([0-9a-f]+)$";
    let relocates = || {
        vec![ShapeCheck::ChangeOnce {
            key: KeyRef::Group(1),
            group: 2,
        }]
    };
    let mut requirements = changed(&["beta", "gamma.foo", "sizeof(Baz)"]);
    requirements.push(Requirement::Seen("delta.foo1".to_string()));
    requirements.push(Requirement::Seen("delta.foo2".to_string()));
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::checked("beta lives", LIVES, relocates())?,
            LineShape::checked("gamma.foo lives", LIVES, relocates())?,
            LineShape::checked("delta.foo1 lives", LIVES, relocates())?,
            LineShape::checked("delta.foo2 lives", LIVES, relocates())?,
            LineShape::exact("alpha is", r"^alpha is 42$")?,
            LineShape::exact("beta:", r"^beta: 43, 44$")?,
            LineShape::exact("gamma idx", r"^gamma idx is 45$")?,
            LineShape::exact("gamma.foo:", r"^gamma\.foo: 43, 46$")?,
            LineShape::exact("delta idx", r"^delta idx is 1$")?,
            LineShape::exact("delta.foo1:", r"^delta\.foo1: NULL, 2$")?,
            LineShape::exact("delta.foo2:", r"^delta\.foo2: NULL, 3$")?,
            LineShape::checked(
                "sizeof",
                r"^sizeof\(Baz\) is ([0-9]+)$",
                vec![transition("sizeof(Baz)", "12", "20")],
            )?,
        ],
        requirements,
    )
}

fn constants() -> Result<ShapeTable> {
    ShapeTable::new(
        vec![
            LineShape::skip(PID_BANNER),
            LineShape::checked(
                "alpha:",
                r"^alpha: ([0-9]+)$",
                vec![transition("alpha", "2", "3")],
            )?,
            LineShape::checked(
                "beta:",
                r"^beta: ([0-9]+,[0-9]+,[0-9]+)$",
                vec![transition("beta", "42,43,44", "45,43,46")],
            )?,
        ],
        changed(&["alpha", "beta"]),
    )
}
