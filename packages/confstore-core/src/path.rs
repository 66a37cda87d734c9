use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized absolute path into the store tree.
///
/// Parsing collapses duplicate slashes and strips leading/trailing ones, so
/// `//a///b/` and `a/b` both normalize to `/a/b`. The empty segment list is
/// the root and prints as `/`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<String>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Normalizing parse; never fails. Empty names produced by duplicate or
    /// trailing slashes are dropped.
    pub fn parse(raw: &str) -> Self {
        Path(
            raw.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The first `n` segments as a new path. `n` past the end is clamped.
    pub fn truncated(&self, n: usize) -> Path {
        Path(self.0[..n.min(self.0.len())].to_vec())
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Whether `other` lies at or below this path, segment-aware: `/a`
    /// subsumes `/a` and `/a/b` but not `/ab`.
    pub fn subsumes(&self, other: &Path) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// This path followed by each proper ancestor, stopping above the root.
    /// The root itself is never yielded; watch fan-out walks exactly this
    /// chain.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (1..=self.0.len())
            .rev()
            .map(move |n| Path(self.0[..n].to_vec()))
    }

    /// Whether the canonical form contains a `.`-prefixed segment. Reads use
    /// this as the explicit opt-in for hidden entries.
    pub fn has_hidden_segment(&self) -> bool {
        self.0.iter().any(|s| s.starts_with('.'))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.0 {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}
