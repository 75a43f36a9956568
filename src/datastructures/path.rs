//! Field path escaping
//!
//! Map keys become top-level subdocument paths. Keys containing path
//! syntax are quoted with backticks, and literal backticks are doubled.

use crate::error::{KvError, Result};

const PATH_SYNTAX: [char; 4] = ['.', '[', ']', '`'];

/// Subdocument path addressing top-level field `key`
pub fn field_path(key: &str) -> String {
    if key.contains(PATH_SYNTAX) {
        format!("`{}`", key.replace('`', "``"))
    } else {
        key.to_string()
    }
}

/// Inverse of [`field_path`]. Nested paths are rejected.
pub fn parse_field_path(path: &str) -> Result<String> {
    if let Some(quoted) = path
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
    {
        if quoted.replace("``", "").contains('`') {
            return Err(KvError::InvalidArgument(format!(
                "Unbalanced backtick in path {:?}",
                path
            )));
        }
        return Ok(quoted.replace("``", "`"));
    }

    if path.contains(PATH_SYNTAX) {
        return Err(KvError::InvalidArgument(format!(
            "Only top-level field paths are supported, got {:?}",
            path
        )));
    }
    Ok(path.to_string())
}
