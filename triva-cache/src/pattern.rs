// Glob matching for `keys(pattern)`

/// Match `key` against `pattern`, where `*` matches any (possibly empty)
/// substring and every other character matches itself.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while ki < k.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            pi += 1;
            resume = ki;
        } else if pi < p.len() && p[pi] == k[ki] {
            pi += 1;
            ki += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ki = resume;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Translate a `*`-only glob into a Redis `MATCH` pattern, escaping the
/// characters Redis would otherwise treat as wildcards.
#[cfg(feature = "redis")]
pub fn to_redis_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(glob_match("user:1", "user:1"));
        assert!(!glob_match("user:1", "user:10"));
        assert!(!glob_match("user:1", "User:1"));
    }

    #[test]
    fn test_star_positions() {
        assert!(glob_match("user:*", "user:1"));
        assert!(glob_match("user:*", "user:"));
        assert!(glob_match("*:profile", "user:42:profile"));
        assert!(glob_match("user:*:profile", "user:42:profile"));
        assert!(!glob_match("user:*:profile", "user:42:settings"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_backtracking() {
        assert!(glob_match("*ab", "aab"));
        assert!(glob_match("a*a", "aaa"));
        assert!(!glob_match("k*", "other"));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_escaping() {
        assert_eq!(to_redis_pattern("a?[b]*"), "a\\?\\[b\\]*");
    }
}
