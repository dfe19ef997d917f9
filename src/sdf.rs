//! Scene paths.
//!
//! A [`Path`] is an immutable hierarchical identifier made of slash-separated
//! segments. Paths order lexicographically segment by segment, which makes
//! every subtree a contiguous range in an ordered map keyed by path; the
//! flattening cache relies on that for its subtree queries.

use std::fmt;

use anyhow::{bail, Result};

/// Hierarchical identifier for a prim in the scene.
///
/// The absolute root is the empty segment list and renders as `/`. A path is
/// an ancestor of another iff its segments are a proper prefix of the other's.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The absolute root path `/`.
    pub fn abs_root() -> Self {
        Self { segments: Vec::new() }
    }

    /// True for the absolute root path.
    pub fn is_abs_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments; zero for the absolute root.
    pub fn element_count(&self) -> usize {
        self.segments.len()
    }

    /// The last segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path, or `None` for the absolute root.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// A new path with `name` appended as a child segment.
    pub fn append(&self, name: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Path { segments }
    }

    /// True if `prefix` is this path or an ancestor of it.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// The path segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Parse an absolute path like `/World/Geom/Sphere`.
///
/// `/` parses to the absolute root. Relative paths and empty segments are
/// rejected.
pub fn path(text: &str) -> Result<Path> {
    let Some(rest) = text.strip_prefix('/') else {
        bail!("Path must be absolute (start with '/'), got {text:?}");
    };
    if rest.is_empty() {
        return Ok(Path::abs_root());
    }
    let mut segments = Vec::new();
    for segment in rest.split('/') {
        if segment.is_empty() {
            bail!("Path {text:?} contains an empty segment");
        }
        segments.push(segment.to_string());
    }
    Ok(Path { segments })
}
