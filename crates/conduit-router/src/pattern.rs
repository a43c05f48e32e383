//! Route pattern compilation.
//!
//! A pattern is a path with zero or more parameter segments:
//!
//! | Segment | Matches |
//! |---|---|
//! | `{name}` | one or more non-slash characters (`[^/]+`) |
//! | `{name}(regex)` | the supplied regex, used verbatim |
//!
//! Literal text is regex-escaped and the whole pattern is anchored at both
//! ends with an optional trailing slash. Compilation is deterministic: the
//! same pattern always yields the same regex source and parameter order.

use conduit_core::{ConduitError, ConduitResult, ParamMap};
use regex::Regex;
use smallvec::SmallVec;
use std::fmt;

/// Parameter names; most routes have very few.
type Names = SmallVec<[String; 4]>;

/// A compiled route pattern.
///
/// # Example
///
/// ```
/// use conduit_router::PathMatcher;
///
/// let matcher = PathMatcher::compile(r"/user/{id}(\d+)/posts/{slug}").unwrap();
/// assert_eq!(matcher.param_names(), ["id", "slug"]);
///
/// let params = matcher.captures("/user/42/posts/hello/").unwrap();
/// assert_eq!(params["id"].as_deref(), Some("42"));
/// assert_eq!(params["slug"].as_deref(), Some("hello"));
///
/// assert!(matcher.captures("/user/abc/posts/hello").is_none());
/// ```
#[derive(Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
    param_names: Names,
    groups: Names,
}

impl PathMatcher {
    /// Compiles a pattern.
    ///
    /// Fails with [`ConduitError::PatternSyntax`] on an unclosed `{` or `(`,
    /// an empty parameter name, or an invalid custom regex.
    pub fn compile(pattern: &str) -> ConduitResult<Self> {
        let mut source = String::with_capacity(pattern.len() + 16);
        source.push('^');
        let mut param_names = Names::new();
        let mut groups = Names::new();
        let mut literal = String::new();

        let mut rest = pattern;
        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let close = after_open
                .find('}')
                .ok_or_else(|| ConduitError::pattern_syntax(pattern, "unclosed '{'"))?;
            let name = after_open[..close].trim();
            if name.is_empty() {
                return Err(ConduitError::pattern_syntax(pattern, "empty parameter name"));
            }

            let mut tail = &after_open[close + 1..];
            let body = if tail.starts_with('(') {
                let end = closing_paren(tail)
                    .ok_or_else(|| ConduitError::pattern_syntax(pattern, "unclosed '('"))?;
                let body = &tail[1..end];
                tail = &tail[end + 1..];
                body
            } else {
                "[^/]+"
            };

            source.push_str(&regex::escape(&literal));
            literal.clear();

            let group = format!("p{}", groups.len());
            source.push_str("(?P<");
            source.push_str(&group);
            source.push('>');
            source.push_str(body);
            source.push(')');

            param_names.push(name.to_string());
            groups.push(group);
            rest = tail;
        }
        literal.push_str(rest);

        // The optional trailing slash below covers a literal one.
        if literal.ends_with('/') {
            literal.pop();
        }
        source.push_str(&regex::escape(&literal));
        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|e| ConduitError::pattern_syntax(pattern, e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            param_names,
            groups,
        })
    }

    /// Returns the pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the generated regex source.
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the parameter names in left-to-right order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Returns `true` if `path` matches.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and returns its parameters.
    ///
    /// A parameter whose group did not participate in the match is `None`.
    pub fn captures(&self, path: &str) -> Option<ParamMap> {
        let caps = self.regex.captures(path)?;
        Some(
            self.param_names
                .iter()
                .zip(&self.groups)
                .map(|(name, group)| (name.clone(), caps.name(group).map(|m| m.as_str().to_string())))
                .collect(),
        )
    }
}

/// Returns the index of the `)` closing the `(` at index 0.
fn closing_paren(src: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    let mut in_class = false;
    for (i, ch) in src.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("pattern", &self.pattern)
            .field("regex", &self.regex.as_str())
            .field("param_names", &self.param_names)
            .finish()
    }
}

/// Normalizes a route path and joins it with an optional prefix.
///
/// Ensures a single leading slash, strips a trailing slash (except for the
/// root) and joins prefix and path with exactly one slash.
///
/// ```
/// use conduit_router::normalize_path;
///
/// assert_eq!(normalize_path(None, "users/"), "/users");
/// assert_eq!(normalize_path(Some("/api/"), "/users"), "/api/users");
/// assert_eq!(normalize_path(Some("api"), "/"), "/api");
/// assert_eq!(normalize_path(None, ""), "/");
/// ```
pub fn normalize_path(prefix: Option<&str>, path: &str) -> String {
    let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty());
    let path = path.trim_matches('/');

    let mut joined = String::with_capacity(path.len() + prefix.map_or(0, str::len) + 2);
    if let Some(prefix) = prefix {
        joined.push('/');
        joined.push_str(prefix);
    }
    if !path.is_empty() {
        joined.push('/');
        joined.push_str(path);
    }
    if joined.is_empty() {
        joined.push('/');
    }
    joined
}
