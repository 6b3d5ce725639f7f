//! # Path Queries
//!
//! Address one node of a built tree with a slash-delimited path:
//!
//! ```text
//! /methods/method[2]/bytecodes
//! ```
//!
//! Each segment is a region name, optionally followed by a 0-based
//! occurrence index in brackets; a bare name means index 0. Names are not
//! unique among siblings, so `method[2]` is the third child called `method`.
//!
//! Every query is parsed before any is resolved. One malformed path fails the
//! whole call; a path that simply matches nothing is a per-query
//! [`QueryOutcome::NotFound`].

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;
use tracing::trace;

use crate::builder::RegionTree;
use crate::error::{WalkError, WalkResult};
use crate::region::Region;

/// One `name[index]` step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment
{
    pub name: String,
    pub index: usize,
    /// The segment as written, reported back when it cannot be resolved
    pub text: String,
}

impl PathSegment
{
    fn parse(query: &str, text: &str) -> WalkResult<Self>
    {
        let malformed = |reason: String| WalkError::MalformedQuery {
            query: query.to_string(),
            reason,
        };

        let (name, index) = match text.find('[') {
            None => (text, 0),
            Some(open) => {
                let digits = text[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| malformed(format!("segment '{text}' has an unterminated index")))?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed(format!("segment '{text}' has a non-numeric index")));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| malformed(format!("segment '{text}' has an index out of range")))?;
                (&text[..open], index)
            }
        };

        if name.is_empty() {
            return Err(malformed(format!("segment '{text}' has no name")));
        }
        if name.contains(']') {
            return Err(malformed(format!("segment '{text}' has a stray ']'")));
        }

        Ok(Self {
            name: name.to_string(),
            index,
            text: text.to_string(),
        })
    }
}

impl fmt::Display for PathSegment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

/// A parsed path query
///
/// ## Example
///
/// ```rust
/// use classwalk_core::query::PathQuery;
///
/// let query = PathQuery::parse("/methods/method[2]/bytecodes")?;
/// let steps: Vec<(&str, usize)> = query.segments().iter().map(|s| (s.name.as_str(), s.index)).collect();
/// assert_eq!(steps, vec![("methods", 0), ("method", 2), ("bytecodes", 0)]);
///
/// assert!(PathQuery::parse("methods").is_err());
/// assert!(PathQuery::parse("/method[x]").is_err());
/// # Ok::<(), classwalk_core::error::WalkError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery
{
    text: String,
    segments: SmallVec<[PathSegment; 6]>,
}

impl PathQuery
{
    /// Parse a query string
    ///
    /// ## Errors
    ///
    /// `MalformedQuery` if the path does not start with `/`, a segment has
    /// no name, or an index is not a bracketed decimal number.
    pub fn parse(text: &str) -> WalkResult<Self>
    {
        let Some(path) = text.strip_prefix('/') else {
            return Err(WalkError::MalformedQuery {
                query: text.to_string(),
                reason: "path must start with '/'".to_string(),
            });
        };

        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| PathSegment::parse(text, segment))
            .collect::<WalkResult<_>>()?;

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str
    {
        &self.text
    }

    pub fn segments(&self) -> &[PathSegment]
    {
        &self.segments
    }
}

impl FromStr for PathQuery
{
    type Err = WalkError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Self::parse(s)
    }
}

impl fmt::Display for PathQuery
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.text)
    }
}

/// Result of resolving one query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<'a>
{
    /// The addressed node and its depth (top-level sections are depth 1)
    Found
    {
        region: &'a Region,
        depth: usize,
    },
    /// `segment` is the first segment, as written, that matched nothing
    NotFound
    {
        segment: String,
    },
}

impl QueryOutcome<'_>
{
    pub fn is_found(&self) -> bool
    {
        matches!(self, QueryOutcome::Found { .. })
    }

    pub fn region(&self) -> Option<&Region>
    {
        match self {
            QueryOutcome::Found { region, .. } => Some(*region),
            QueryOutcome::NotFound { .. } => None,
        }
    }
}

/// Resolve an already parsed query against `tree`
///
/// A compound cut off by the nesting threshold can be addressed, but no
/// segment below it resolves.
pub fn resolve_parsed<'a>(tree: &'a RegionTree, query: &PathQuery) -> QueryOutcome<'a>
{
    let mut current = &tree.root;
    for (step, segment) in query.segments().iter().enumerate() {
        let next = current
            .children()
            .iter()
            .filter(|child| child.name == segment.name)
            .nth(segment.index);
        match next {
            Some(child) => current = child,
            None => {
                trace!(query = %query, depth = step + 1, segment = %segment.text, "query not found");
                return QueryOutcome::NotFound {
                    segment: segment.text.clone(),
                };
            }
        }
    }
    QueryOutcome::Found {
        region: current,
        depth: query.segments().len(),
    }
}

/// Parse every query, then resolve each against the same tree
///
/// ## Errors
///
/// `MalformedQuery` for the first query that fails to parse. Nothing is
/// resolved in that case.
pub fn resolve<'a, S: AsRef<str>>(tree: &'a RegionTree, queries: &[S]) -> WalkResult<Vec<QueryOutcome<'a>>>
{
    let parsed = queries
        .iter()
        .map(|query| PathQuery::parse(query.as_ref()))
        .collect::<WalkResult<Vec<_>>>()?;
    Ok(parsed.iter().map(|query| resolve_parsed(tree, query)).collect())
}
