// src/config/template.rs

//! `{name}` placeholder substitution for step fields.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Built-in variable holding the absolute working directory.
pub const WORKDIR_VAR: &str = "workdir";

/// Built-in variable holding the current fan-out item.
pub const ITEM_VAR: &str = "item";

/// Names of all placeholders used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace every `{name}` in `template` with its value from `vars`.
///
/// Returns the first unknown placeholder name as the error.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> Result<String, String> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(*name))
    {
        return Err(missing.to_string());
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| vars[&caps[1]].clone())
        .into_owned())
}
