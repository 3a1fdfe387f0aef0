//! Input/output of configuration data.

use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Reads the RON (Rusty Object Notation) file at the given path and
/// deserializes the contents into an object of type `T`.
///
/// # Errors
/// Returns an error if the file can not be read or does not contain valid
/// RON for `T`.
pub fn parse_ron_file<T>(file_path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    let file_path = file_path.as_ref();

    let text = fs::read_to_string(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    from_ron_str(&text).with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

/// Deserializes the given RON (Rusty Object Notation) string into an object
/// of type `T`.
///
/// # Errors
/// Returns an error if the string is not valid RON for `T`.
pub fn from_ron_str<T>(text: &str) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    ron::from_str::<T>(text).map_err(anyhow::Error::from)
}

/// Serializes the given value to a pretty-printed RON string.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn to_ron_string<T>(value: &T) -> Result<String>
where
    T: serde::ser::Serialize,
{
    ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default()).map_err(Into::into)
}
