//! Segment trie for dynamic routes
//!
//! One trie per method. Every edge consumes exactly one path segment,
//! except the wildcard slot which consumes whatever is left. Children are
//! tried most-specific first and the walk backtracks on failure:
//!
//! 1. literal child (hash lookup)
//! 2. constrained parameter children, in registration order
//! 3. the plain parameter child
//! 4. the wildcard slot
//!
//! Leaves store indices into the owning table's route list; parameter
//! names live on the route, so `/users/:id` and `/users/:uid/posts` share
//! the same parameter node.

use crate::pattern::{fold_case, Constraint, Segment};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Index into `RouteTable::routes`.
pub(crate) type RouteId = usize;

/// Raw values captured by parameter segments, in path order.
pub(crate) type Captures<'p> = SmallVec<[&'p str; 8]>;

/// A successful walk: the route, plus where the wildcard capture starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrieHit {
    pub route: RouteId,
    pub wildcard_from: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    statics: HashMap<String, Node>,
    constrained: Vec<(Constraint, Node)>,
    param: Option<Box<Node>>,
    wildcard: Option<RouteId>,
    route: Option<RouteId>,
}

impl Node {
    /// Walk (creating nodes as needed) to the slot a pattern terminates in.
    pub fn slot_mut(&mut self, segments: &[Segment]) -> &mut Option<RouteId> {
        let mut node = self;
        for segment in segments {
            node = match segment {
                Segment::Literal(text) => node.statics.entry(text.clone()).or_default(),
                Segment::Param(_) => &mut **node.param.get_or_insert_with(Box::default),
                Segment::Constrained(_, constraint) => {
                    let index = match node.constrained.iter().position(|(c, _)| c == constraint) {
                        Some(index) => index,
                        None => {
                            node.constrained.push((constraint.clone(), Node::default()));
                            node.constrained.len() - 1
                        }
                    };
                    &mut node.constrained[index].1
                }
                Segment::Wildcard => return &mut node.wildcard,
            };
        }
        &mut node.route
    }

    /// Find the first route matching `segments[depth..]`.
    ///
    /// `captures` receives the raw parameter values of the successful path
    /// only; anything pushed on an abandoned branch is popped again.
    pub fn lookup<'p>(
        &self,
        segments: &[&'p str],
        depth: usize,
        case_sensitive: bool,
        captures: &mut Captures<'p>,
    ) -> Option<TrieHit> {
        let Some(&segment) = segments.get(depth) else {
            return self.route.map(|route| TrieHit {
                route,
                wildcard_from: None,
            });
        };

        if !self.statics.is_empty() {
            let key = fold_case(segment, case_sensitive);
            if let Some(child) = self.statics.get(key.as_ref()) {
                if let Some(hit) = child.lookup(segments, depth + 1, case_sensitive, captures) {
                    return Some(hit);
                }
            }
        }

        // Parameters never bind an empty segment
        if !segment.is_empty() {
            for (constraint, child) in &self.constrained {
                if !constraint.is_match(segment) {
                    continue;
                }
                captures.push(segment);
                if let Some(hit) = child.lookup(segments, depth + 1, case_sensitive, captures) {
                    return Some(hit);
                }
                captures.pop();
            }

            if let Some(child) = &self.param {
                captures.push(segment);
                if let Some(hit) = child.lookup(segments, depth + 1, case_sensitive, captures) {
                    return Some(hit);
                }
                captures.pop();
            }
        }

        self.wildcard.map(|route| TrieHit {
            route,
            wildcard_from: Some(depth),
        })
    }
}

/// Split a request path into segments, dropping the leading slash.
///
/// `/` yields one empty segment, `/files/` yields `["files", ""]`.
pub(crate) fn split_path(path: &str) -> SmallVec<[&str; 16]> {
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::pattern::CompiledPattern;

    fn build(patterns: &[&str]) -> Node {
        let config = RouterConfig::default();
        let mut root = Node::default();
        for (id, pattern) in patterns.iter().enumerate() {
            let compiled = CompiledPattern::compile(pattern, &config).unwrap();
            *root.slot_mut(&compiled.segments) = Some(id);
        }
        root
    }

    fn find<'p>(root: &Node, path: &'p str) -> Option<(RouteId, Vec<&'p str>, Option<usize>)> {
        let segments = split_path(path);
        let mut captures = Captures::new();
        root.lookup(&segments, 0, false, &mut captures)
            .map(|hit| (hit.route, captures.to_vec(), hit.wildcard_from))
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/").as_slice(), &[""]);
        assert_eq!(split_path("/a/b").as_slice(), &["a", "b"]);
        assert_eq!(split_path("/files/").as_slice(), &["files", ""]);
    }

    #[test]
    fn test_param_capture() {
        let root = build(&["/users/:id"]);
        assert_eq!(find(&root, "/users/42"), Some((0, vec!["42"], None)));
        assert_eq!(find(&root, "/users/42/extra"), None);
        assert_eq!(find(&root, "/users/"), None);
    }

    #[test]
    fn test_literal_beats_param() {
        let root = build(&["/users/:id/edit", "/users/me/edit"]);
        assert_eq!(find(&root, "/users/me/edit"), Some((1, vec![], None)));
        assert_eq!(find(&root, "/users/7/edit"), Some((0, vec!["7"], None)));
    }

    #[test]
    fn test_backtracks_out_of_literal_branch() {
        // "/users/me/posts" has no literal continuation, so the walk must
        // fall back to the parameter branch.
        let root = build(&["/users/me/settings", "/users/:id/posts"]);
        assert_eq!(find(&root, "/users/me/posts"), Some((1, vec!["me"], None)));
    }

    #[test]
    fn test_constraint_then_param_then_wildcard() {
        let root = build(&[r"/items/:id(\d+)", "/items/:slug", "/items/*"]);
        assert_eq!(find(&root, "/items/12"), Some((0, vec!["12"], None)));
        assert_eq!(find(&root, "/items/abc"), Some((1, vec!["abc"], None)));
        assert_eq!(find(&root, "/items/a/b"), Some((2, vec![], Some(1))));
    }

    #[test]
    fn test_failed_branch_does_not_leak_captures() {
        let root = build(&[r"/v/:id(\d+)/x", "/v/:name/y"]);
        assert_eq!(find(&root, "/v/5/y"), Some((1, vec!["5"], None)));
    }

    #[test]
    fn test_wildcard_requires_trailing_segment() {
        let root = build(&["/files/*"]);
        assert_eq!(find(&root, "/files"), None);
        assert_eq!(find(&root, "/files/"), Some((0, vec![], Some(1))));
        assert_eq!(find(&root, "/files/a/b.txt"), Some((0, vec![], Some(1))));
    }

    #[test]
    fn test_case_folding_on_literals() {
        let root = build(&["/api/:id"]);
        assert_eq!(find(&root, "/API/Ab"), Some((0, vec!["Ab"], None)));
    }

    #[test]
    fn test_slot_reuse_for_equivalent_patterns() {
        let config = RouterConfig::default();
        let mut root = Node::default();
        let a = CompiledPattern::compile("/u/:id", &config).unwrap();
        let b = CompiledPattern::compile("/u/:name", &config).unwrap();

        *root.slot_mut(&a.segments) = Some(0);
        assert_eq!(*root.slot_mut(&b.segments), Some(0));
    }
}
