use crate::utils::error::{PackError, Result};
use regex::Regex;

/// Signature files that are never allowed into an assembled archive. Copying
/// a signed jar's signature into a fat jar makes the JVM reject the result.
pub const DEFAULT_EXCLUDES: [&str; 3] = [
    "META-INF/BC2048KE.RSA",
    "META-INF/BC2048KE.SF",
    "META-INF/BC2048KE.DSA",
];

/// A compiled set of Ant-style exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    compiled: Vec<Regex>,
}

impl ExcludeSet {
    /// Compiles `patterns` on top of [`DEFAULT_EXCLUDES`].
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut all: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if !pattern.is_empty() && !all.iter().any(|p| p == pattern) {
                all.push(pattern.to_string());
            }
        }
        Self::exact(all)
    }

    /// Compiles only the given patterns, without the defaults.
    pub fn exact(patterns: Vec<String>) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns, compiled })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(name))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    let pattern = pattern.trim_start_matches('/');
    let mut expr = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories
                if chars.peek() == Some(&'/') {
                    chars.next();
                    expr.push_str("(?:.*/)?");
                } else {
                    expr.push_str(".*");
                }
            }
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    // a trailing slash means "everything below"
    if pattern.ends_with('/') {
        expr.push_str(".*");
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| PackError::InvalidConfigValueError {
        field: "exclude".to_string(),
        value: pattern.to_string(),
        reason: format!("Invalid pattern: {}", e),
    })
}
