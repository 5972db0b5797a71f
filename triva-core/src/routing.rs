// Route table: ordered (method, pattern) entries, first match wins

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::middleware::{Handler, Middleware};
use crate::{Error, HttpMethod, RouteMethod};

/// Parameter name under which a trailing `*` stores the rest of the path.
pub const WILDCARD_PARAM: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern such as `/users/:id` or `/static/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl RoutePattern {
    /// Compile a pattern.
    ///
    /// Fails on an empty parameter name, a repeated parameter name, or a `*`
    /// that is not the final segment.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let raw = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            format!("/{}", pattern)
        };

        let body = &raw[1..];
        let trailing_slash = !body.is_empty() && body.ends_with('/');
        let body = body.strip_suffix('/').unwrap_or(body);

        let mut segments = Vec::new();
        let parts: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/').collect()
        };

        for (i, part) in parts.iter().enumerate() {
            if *part == "*" {
                if i + 1 != parts.len() {
                    return Err(Error::Internal(format!(
                        "invalid route pattern '{}': '*' must be the last segment",
                        raw
                    )));
                }
                segments.push(Segment::Wildcard);
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(Error::Internal(format!(
                        "invalid route pattern '{}': empty parameter name",
                        raw
                    )));
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(n) if n == name))
                {
                    return Err(Error::Internal(format!(
                        "invalid route pattern '{}': duplicate parameter '{}'",
                        raw, name
                    )));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        let trailing_slash = trailing_slash && !matches!(segments.last(), Some(Segment::Wildcard));

        Ok(Self {
            raw,
            segments,
            trailing_slash,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the captured parameters, in pattern order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Match `path` (without query), returning decoded captures.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let body = path.strip_prefix('/').unwrap_or(path);
        let has_trailing = body.ends_with('/');
        if self.trailing_slash && !has_trailing {
            return None;
        }
        let body = body.strip_suffix('/').unwrap_or(body);
        let parts: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/').collect()
        };

        let mut params = HashMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    let rest = parts.get(i..).map(|r| r.join("/")).unwrap_or_default();
                    params.insert(WILDCARD_PARAM.to_string(), decode(&rest));
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => match parts.get(i) {
                    Some(value) if !value.is_empty() => {
                        params.insert(name.clone(), decode(value));
                    }
                    _ => return None,
                },
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// A registered route: method constraint, pattern, route middleware and the
/// terminal handler.
pub struct Route {
    pub id: String,
    pub method: RouteMethod,
    pub pattern: RoutePattern,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Registration order is the matching order.
    pub fn register(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), Error> {
        let method = method.into();
        let pattern = RoutePattern::parse(pattern)?;
        let route = Arc::new(Route {
            id: format!("{} {}", method, pattern),
            method,
            pattern,
            middleware,
            handler,
        });
        tracing::debug!(route = %route.id, "registered route");
        self.routes.push(route);
        Ok(())
    }

    /// First registered route accepting `method` and `path`.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            if !route.method.accepts(method) {
                return None;
            }
            route.pattern.matches(path).map(|params| RouteMatch {
                route: Arc::clone(route),
                params,
            })
        })
    }

    /// Methods registered for patterns that match `path`.
    pub fn allowed_methods(&self, path: &str) -> Vec<RouteMethod> {
        let mut methods: Vec<RouteMethod> = Vec::new();
        for route in &self.routes {
            if route.pattern.matches(path).is_some() && !methods.contains(&route.method) {
                methods.push(route.method);
            }
        }
        methods
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str) -> RoutePattern {
        RoutePattern::parse(p).unwrap()
    }

    #[test]
    fn test_match_static() {
        assert!(pattern("/users").matches("/users").unwrap().is_empty());
        assert!(pattern("/users").matches("/Users").is_none());
        assert!(pattern("/").matches("/").is_some());
        assert!(pattern("/").matches("/users").is_none());
    }

    #[test]
    fn test_match_param() {
        let params = pattern("/users/:id/posts/:post").matches("/users/42/posts/7").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post"], "7");
    }

    #[test]
    fn test_param_is_url_decoded() {
        let params = pattern("/files/:name").matches("/files/my%20file.txt").unwrap();
        assert_eq!(params["name"], "my file.txt");
    }

    #[test]
    fn test_param_requires_non_empty_segment() {
        assert!(pattern("/users/:id").matches("/users/").is_none());
        assert!(pattern("/users/:id").matches("/users").is_none());
        assert!(pattern("/a/:x/b").matches("/a//b").is_none());
    }

    #[test]
    fn test_wildcard_matches_rest() {
        let p = pattern("/static/*");
        assert_eq!(p.matches("/static/css/site.css").unwrap()[WILDCARD_PARAM], "css/site.css");
        assert_eq!(p.matches("/static").unwrap()[WILDCARD_PARAM], "");
        assert!(p.matches("/staticx").is_none());

        let all = pattern("*");
        assert!(all.matches("/anything/at/all").is_some());
        assert!(all.matches("/").is_some());
    }

    #[test]
    fn test_trailing_slash_rules() {
        assert!(pattern("/users/").matches("/users/").is_some());
        assert!(pattern("/users/").matches("/users").is_none());
        assert!(pattern("/users").matches("/users/").is_some());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(RoutePattern::parse("/a/*/b").is_err());
        assert!(RoutePattern::parse("/a/:").is_err());
        assert!(RoutePattern::parse("/a/:id/:id").is_err());
    }

    #[test]
    fn test_param_names() {
        assert_eq!(pattern("/o/:org/r/:repo").param_names(), vec!["org", "repo"]);
    }
}
