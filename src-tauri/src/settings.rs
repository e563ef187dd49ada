//! Environment-variable settings (`MK48_<NAME>`).

use crate::constants::{SETTINGS_PREFIX, SETTING_DISABLED, SETTING_ENABLED};

/// Name of the environment variable backing `name`.
pub fn variable_name(name: &str) -> String {
    format!("{}{}", SETTINGS_PREFIX, name.to_uppercase())
}

/// Reads a setting from the process environment.
///
/// A defined variable yields its literal value, even when empty. An undefined
/// variable yields `"disabled"`.
pub fn setting(name: &str) -> String {
    setting_from(name, |key| {
        std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
    })
}

/// Same as [`setting`] with the variable lookup supplied by the caller.
pub fn setting_from<F>(name: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&variable_name(name)).unwrap_or_else(|| SETTING_DISABLED.to_string())
}

pub fn is_enabled(name: &str) -> bool {
    setting(name) == SETTING_ENABLED
}
