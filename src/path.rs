//! Canonicalization of raw module identifiers into [`ModuleId`]s.
//!
//! Normalization converts backslashes to forward slashes, strips a leading
//! `./`, collapses internal `./` segments and resolves `..`, trims
//! whitespace, and rejects empty results. Extension handling is idempotent:
//! a default extension is appended only if the identifier has none.

use crate::error::ResolveError;
use crate::module::ModuleId;

pub const DEFAULT_EXTENSION: &str = "js";

/// Converts raw, possibly messy module requests into the canonical form
/// every other component treats as the identity of a module.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathNormalizer;

impl PathNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize `raw` into a canonical [`ModuleId`].
    ///
    /// `normalize(normalize(i)) == normalize(i)` for all `i` that normalize
    /// successfully (see `spec` property 1).
    pub fn normalize(&self, raw: &str) -> Result<ModuleId, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError {
                request: raw.to_string(),
                parent: String::new(),
                tried: vec!["normalize"],
            });
        }

        let slashed = trimmed.replace('\\', "/");
        let without_prefix = slashed.strip_prefix("./").unwrap_or(&slashed);

        let collapsed = collapse_segments(without_prefix)?;
        if collapsed.is_empty() {
            return Err(ResolveError {
                request: raw.to_string(),
                parent: String::new(),
                tried: vec!["normalize"],
            });
        }

        let with_extension = ensure_extension(&collapsed);
        Ok(ModuleId::new(with_extension))
    }

    /// Join `relative` against the directory of `base`, then normalize.
    pub fn join(&self, base: &ModuleId, relative: &str) -> Result<ModuleId, ResolveError> {
        let base_dir = match base.as_str().rfind('/') {
            Some(idx) => &base.as_str()[..idx],
            None => "",
        };
        let joined = if base_dir.is_empty() {
            relative.to_string()
        } else {
            format!("{base_dir}/{relative}")
        };
        self.normalize(&joined)
    }
}

/// Collapse `.` and `..` path segments, rejecting attempts to climb above
/// the root (an unnormalizable id, reported as a resolve error upstream).
fn collapse_segments(path: &str) -> Result<String, ResolveError> {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if out.pop().is_none() {
                    return Err(ResolveError {
                        request: path.to_string(),
                        parent: String::new(),
                        tried: vec!["collapse_segments"],
                    });
                }
            }
            other => out.push(other),
        }
    }
    Ok(out.join("/"))
}

fn ensure_extension(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name.contains('.') {
        path.to_string()
    } else {
        format!("{path}.{DEFAULT_EXTENSION}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_dot_slash() {
        let n = PathNormalizer::new();
        let id = n.normalize("./foo/bar").unwrap();
        assert_eq!(id.as_str(), "foo/bar.js");
    }

    #[test]
    fn converts_backslashes() {
        let n = PathNormalizer::new();
        let id = n.normalize("foo\\bar.js").unwrap();
        assert_eq!(id.as_str(), "foo/bar.js");
    }

    #[test]
    fn collapses_internal_dot_segments() {
        let n = PathNormalizer::new();
        let id = n.normalize("foo/./bar/../baz.js").unwrap();
        assert_eq!(id.as_str(), "foo/baz.js");
    }

    #[test]
    fn rejects_empty() {
        let n = PathNormalizer::new();
        assert!(n.normalize("   ").is_err());
        assert!(n.normalize("./").is_err());
    }

    #[test]
    fn extension_is_idempotent() {
        let n = PathNormalizer::new();
        let once = n.normalize("foo/bar").unwrap();
        let twice = n.normalize(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_is_idempotent_property() {
        let n = PathNormalizer::new();
        for raw in ["./a/b.js", "a\\b\\c", "a/./b/../c.js", "x.mjs"] {
            let once = n.normalize(raw).unwrap();
            let twice = n.normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn join_resolves_relative_to_parent_dir() {
        let n = PathNormalizer::new();
        let base = n.normalize("scenes/env/sky.js").unwrap();
        let joined = n.join(&base, "../ground.js").unwrap();
        assert_eq!(joined.as_str(), "scenes/ground.js");
    }
}
