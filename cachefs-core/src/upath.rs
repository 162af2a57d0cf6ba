use crate::error::{CacheError, Result};

/// A normalized, `/`-separated path relative to the capability root.
///
/// The root directory is the empty path. Normalization strips empty
/// segments and `.` segments and resolves `..` against what precedes it;
/// a `..` with nothing to resolve against is an error rather than being
/// silently dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UPath(String);

impl UPath {
    pub fn root() -> Self {
        UPath(String::new())
    }

    pub fn normalize(raw: &str) -> Result<Self> {
        let mut parts: Vec<&str> = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => continue,
                ".." => {
                    if parts.pop().is_none() {
                        return Err(CacheError::Encoding {
                            upath: raw.to_string(),
                        });
                    }
                }
                _ => parts.push(seg),
            }
        }
        Ok(UPath(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            UPath(name.to_string())
        } else {
            UPath(format!("{}/{}", self.0, name))
        }
    }
}

impl std::fmt::Display for UPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_slashes() {
        assert_eq!(UPath::normalize("a/./b//c").unwrap().as_str(), "a/b/c");
        assert_eq!(UPath::normalize("").unwrap().as_str(), "");
        assert_eq!(UPath::normalize("/").unwrap().as_str(), "");
    }

    #[test]
    fn resolves_dotdot_against_preceding_segment() {
        assert_eq!(UPath::normalize("a/b/../c").unwrap().as_str(), "a/c");
    }

    #[test]
    fn dotdot_past_root_is_an_error() {
        assert!(UPath::normalize("../a").is_err());
    }

    #[test]
    fn child_joins_under_root_without_leading_slash() {
        assert_eq!(UPath::root().child("foo").as_str(), "foo");
        assert_eq!(UPath::root().child("foo").child("bar").as_str(), "foo/bar");
    }
}
