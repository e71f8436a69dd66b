//! Route pattern compiler
//!
//! Turns a path template into an ordered list of [`Segment`]s:
//!
//! | Template segment   | Compiles to                      |
//! |--------------------|----------------------------------|
//! | `users`            | `Literal("users")`               |
//! | `:id`              | `Param("id")`                    |
//! | `:id(\d+)`         | `Constrained("id", ^(?:\d+)$)`   |
//! | `*`                | `Wildcard` (last segment only)   |
//!
//! Everything that can go wrong with a template is reported here, at
//! registration time, as a [`PatternError`].

use crate::config::RouterConfig;
use crate::error::PatternError;
use crate::params::WILDCARD_KEY;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::fmt;

/// A regex constraint attached to a parameter segment.
#[derive(Clone)]
pub struct Constraint {
    /// The constraint exactly as written in the template.
    source: String,
    /// `^(?:source)$`, compiled once.
    anchored: Regex,
}

impl Constraint {
    fn compile(
        pattern: &str,
        name: &str,
        source: &str,
        case_sensitive: bool,
    ) -> Result<Self, PatternError> {
        let anchored = RegexBuilder::new(&format!("^(?:{})$", source))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| PatternError::InvalidConstraint {
                pattern: pattern.to_string(),
                name: name.to_string(),
                source,
            })?;

        Ok(Self {
            source: source.to_string(),
            anchored,
        })
    }

    /// The constraint as written, without anchors.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Test a whole raw segment against the constraint.
    #[inline]
    pub fn is_match(&self, segment: &str) -> bool {
        self.anchored.is_match(segment)
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constraint").field(&self.source).finish()
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One compiled path segment.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    /// Exact text
    Literal(String),
    /// `:name`, any single non-empty segment
    Param(String),
    /// `:name(regex)`
    Constrained(String, Constraint),
    /// `*`, the rest of the path
    Wildcard,
}

impl Segment {
    #[inline]
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// A fully compiled route pattern.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    /// Pattern as registered
    pub source: String,
    /// Parsed segments
    pub segments: Vec<Segment>,
    /// Parameter names in left-to-right order (`*` for the wildcard)
    pub param_names: Vec<String>,
    /// No parameters and no wildcard
    pub is_static: bool,
    /// Normalised lookup key for static patterns
    pub static_path: String,
}

impl CompiledPattern {
    /// Compile a route pattern under the router's configuration.
    pub fn compile(pattern: &str, config: &RouterConfig) -> Result<Self, PatternError> {
        let normalized = normalize_pattern(pattern, config.strict);
        let body = normalized.strip_prefix('/').unwrap_or(&normalized);
        let raw_segments: Vec<&str> = body.split('/').collect();
        let last = raw_segments.len() - 1;

        let mut segments = Vec::with_capacity(raw_segments.len());
        let mut param_names: Vec<String> = Vec::new();
        let mut seen_wildcard = false;

        for (idx, raw) in raw_segments.iter().enumerate() {
            if seen_wildcard {
                return Err(if *raw == WILDCARD_KEY {
                    PatternError::MultipleWildcards(pattern.to_string())
                } else {
                    PatternError::WildcardNotLast(pattern.to_string())
                });
            }

            if *raw == WILDCARD_KEY {
                if idx != last && raw_segments[idx + 1..].contains(&WILDCARD_KEY) {
                    return Err(PatternError::MultipleWildcards(pattern.to_string()));
                }
                seen_wildcard = true;
                param_names.push(WILDCARD_KEY.to_string());
                segments.push(Segment::Wildcard);
                continue;
            }

            let Some(declaration) = raw.strip_prefix(':') else {
                let literal = fold_case(raw, config.case_sensitive);
                segments.push(Segment::Literal(literal.into_owned()));
                continue;
            };

            let (name, constraint) = split_constraint(pattern, declaration)?;
            validate_name(pattern, name)?;
            if param_names.iter().any(|n| n == name) {
                return Err(PatternError::DuplicateParameter {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
            param_names.push(name.to_string());

            match constraint {
                Some(source) => {
                    let constraint =
                        Constraint::compile(pattern, name, source, config.case_sensitive)?;
                    segments.push(Segment::Constrained(name.to_string(), constraint));
                }
                None => segments.push(Segment::Param(name.to_string())),
            }
        }

        let is_static = segments.iter().all(Segment::is_literal);
        let static_path = if is_static {
            let mut path = String::with_capacity(normalized.len());
            for segment in &segments {
                if let Segment::Literal(text) = segment {
                    path.push('/');
                    path.push_str(text);
                }
            }
            path
        } else {
            String::new()
        };

        Ok(Self {
            source: pattern.to_string(),
            segments,
            param_names,
            is_static,
            static_path,
        })
    }

    /// Names of the parameters that bind single segments, in order.
    pub fn segment_params(&self) -> impl Iterator<Item = &str> {
        self.param_names
            .iter()
            .map(String::as_str)
            .filter(|name| *name != WILDCARD_KEY)
    }

    #[inline]
    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }
}

/// Ensure a leading slash and, outside strict mode, drop one trailing slash.
/// Lowercase `text` unless matching is case sensitive.
///
/// Templates, request paths and mount prefixes all fold through here, so a
/// literal and the path segment it should match always agree. Borrows when
/// nothing changes.
pub(crate) fn fold_case(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        return Cow::Borrowed(text);
    }
    if text.is_ascii() {
        return if text.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(text.to_ascii_lowercase())
        } else {
            Cow::Borrowed(text)
        };
    }
    let lowered = text.to_lowercase();
    if lowered == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(lowered)
    }
}

fn normalize_pattern(pattern: &str, strict: bool) -> String {
    let mut out = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{}", pattern)
    };
    if !strict && out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Split `name(regex)` into its parts. `declaration` has the leading `:` removed.
fn split_constraint<'a>(
    pattern: &str,
    declaration: &'a str,
) -> Result<(&'a str, Option<&'a str>), PatternError> {
    match declaration.find('(') {
        None => Ok((declaration, None)),
        Some(open) => {
            let inner = declaration[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| PatternError::UnterminatedConstraint(pattern.to_string()))?;
            Ok((&declaration[..open], Some(inner)))
        }
    }
}

fn validate_name(pattern: &str, name: &str) -> Result<(), PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyParameterName(pattern.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PatternError::InvalidParameterName {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}
