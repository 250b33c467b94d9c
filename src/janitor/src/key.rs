//! Object keys for catalog entries.

use crate::error::ReconcileError;
use object_store::path::Path as ObjectPath;
use std::fmt;

/// Pattern mapping a file id to its object key, e.g. `urn:oid:%d`.
///
/// The pattern holds exactly one `%d`; `%%` stands for a literal `%`.
/// Keys must be valid object store paths as written: no leading or trailing
/// `/`, no empty, `.` or `..` segments and no control characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeyPattern {
    pattern: String,
    prefix: String,
    suffix: String,
}

impl StorageKeyPattern {
    pub fn parse(pattern: &str) -> Result<Self, ReconcileError> {
        let invalid = |reason: &str| ReconcileError::InvalidKeyPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut seen_placeholder = false;

        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let literal = if c == '%' {
                match chars.next() {
                    Some('%') => '%',
                    Some('d') if seen_placeholder => {
                        return Err(invalid("more than one %d placeholder"));
                    }
                    Some('d') => {
                        seen_placeholder = true;
                        continue;
                    }
                    Some(other) => {
                        return Err(invalid(&format!("unsupported directive %{other}")));
                    }
                    None => return Err(invalid("dangling % at end of pattern")),
                }
            } else {
                c
            };

            if seen_placeholder {
                suffix.push(literal);
            } else {
                prefix.push(literal);
            }
        }

        if !seen_placeholder {
            return Err(invalid("missing %d placeholder"));
        }

        let parsed = Self {
            pattern: pattern.to_string(),
            prefix,
            suffix,
        };

        // The id only contributes digits and a sign, so one sample key shows
        // whether every formatted key reaches the store unchanged.
        let sample = parsed.format(0);
        match ObjectPath::parse(&sample) {
            Ok(path) if path.as_ref() == sample => Ok(parsed),
            Ok(path) => Err(invalid(&format!(
                "key '{sample}' would be stored as '{path}'"
            ))),
            Err(e) => Err(invalid(&e.to_string())),
        }
    }

    /// Object key for the given file id.
    pub fn format(&self, file_id: i64) -> String {
        format!("{}{}{}", self.prefix, file_id, self.suffix)
    }

}

impl Default for StorageKeyPattern {
    fn default() -> Self {
        Self {
            pattern: "urn:oid:%d".to_string(),
            prefix: "urn:oid:".to_string(),
            suffix: String::new(),
        }
    }
}

impl fmt::Display for StorageKeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
