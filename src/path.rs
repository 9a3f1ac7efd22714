//! A canonical, type-safe representation of a path into the input data tree.
//!
//! Paths address locations in the data a form expression was evaluated
//! against: object fields by name, array elements by index. They are
//! immutable and share their spine, so extending a path never copies the
//! parent segments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a path: an object field or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Segment::Field(name.into())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{name}"),
            Segment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A structural address into the input data, rooted at an implicit root.
///
/// Compared by structural equality; `child` shares the parent's spine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path(pub im::Vector<Segment>);

impl Path {
    /// The empty path, denoting the data root.
    pub fn root() -> Self {
        Path(im::Vector::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Extends this path by one segment.
    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.0.clone();
        segments.push_back(segment);
        Path(segments)
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        self.child(Segment::Field(name.into()))
    }

    pub fn index(&self, i: usize) -> Self {
        self.child(Segment::Index(i))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut segments = self.0.clone();
        segments.pop_back();
        Some(Path(segments))
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.0.iter()
    }

    /// True if `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Parses the dotted/bracketed display form back into a path.
    /// `items[2].name` becomes `Field(items), Index(2), Field(name)`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut path = Path::root();
        if text.is_empty() {
            return Some(path);
        }
        let mut rest = text;
        let mut leading = true;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix('[') {
                let close = tail.find(']')?;
                let index: usize = tail[..close].parse().ok()?;
                path = path.index(index);
                rest = &tail[close + 1..];
            } else {
                let tail = if leading { rest } else { rest.strip_prefix('.')? };
                let end = tail.find(|c| c == '.' || c == '[').unwrap_or(tail.len());
                if end == 0 {
                    return None;
                }
                path = path.field(&tail[..end]);
                rest = &tail[end..];
            }
            leading = false;
        }
        Some(path)
    }
}

impl fmt::Display for Path {
    /// Dotted notation for fields, bracket notation for indices:
    /// `items[2].name`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in self.0.iter() {
            match segment {
                Segment::Field(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Path(iter.into_iter().map(|s| Segment::Field(s.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mixes_dots_and_brackets() {
        let path = Path::root().field("items").index(2).field("name");
        assert_eq!(path.to_string(), "items[2].name");
    }

    #[test]
    fn child_shares_parent_spine() {
        let parent = Path::root().field("a");
        let child = parent.index(0);
        assert_eq!(child.parent(), Some(parent.clone()));
        assert!(parent.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));
    }

    #[test]
    fn parse_round_trips_display() {
        for text in ["", "a", "a.b", "items[2].name", "[0][1]"] {
            let path = Path::parse(text).unwrap();
            assert_eq!(path.to_string(), text);
        }
        assert_eq!(Path::parse("a..b"), None);
    }
}
