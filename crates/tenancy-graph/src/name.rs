//! Hierarchical service names

use std::fmt;
use std::str::FromStr;

use crate::GraphError;

/// Hierarchical name of a service node, e.g. `tenancy.application.demo`.
///
/// Names are compared segment by segment, so a segment may itself contain
/// a `.` without colliding with a deeper name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName {
    segments: Vec<String>,
}

impl ServiceName {
    /// Build a name from its segments.
    pub fn of<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// A new name with one more segment.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The enclosing name, if any.
    pub fn parent(&self) -> Option<Self> {
        match self.segments.len() {
            0 | 1 => None,
            n => Some(Self {
                segments: self.segments[..n - 1].to_vec(),
            }),
        }
    }

    /// Last segment.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether `self` lives strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ServiceName) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for ServiceName {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.split('.').any(str::is_empty) {
            return Err(GraphError::InvalidName(s.to_string()));
        }
        Ok(Self::of(s.split('.')))
    }
}
