use regex::Regex;

/// One name-matching rule of a sort order.
#[derive(Debug, Clone)]
pub enum NameRule {
    /// Matches exactly this name.
    Exact(String),
    /// Matches names accepted by the regular expression.
    Pattern(Regex),
}

/// Priority list of name rules giving a deterministic listing order.
///
/// A name belongs to the group of the first rule it matches: all exact rules
/// are tried before any pattern. Names matching nothing share the last group.
#[derive(Debug, Clone, Default)]
pub struct SortRules {
    rules: Vec<NameRule>,
}

impl SortRules {
    /// No rules: everything sorts by name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rules from strings. A string wrapped in slashes (`/…/`) is a
    /// regular expression, anything else an exact name.
    ///
    /// # Errors
    ///
    /// Returns the first regular-expression compile error.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, regex::Error> {
        let mut rules = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            match spec
                .strip_prefix('/')
                .and_then(|s| s.strip_suffix('/'))
                .filter(|s| !s.is_empty())
            {
                Some(pattern) => rules = rules.with_pattern(pattern)?,
                None => rules = rules.with_exact(spec),
            }
        }
        Ok(rules)
    }

    /// Append an exact-name rule.
    #[must_use]
    pub fn with_exact(mut self, name: impl Into<String>) -> Self {
        self.rules.push(NameRule::Exact(name.into()));
        self
    }

    /// Append a regular-expression rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rules.push(NameRule::Pattern(Regex::new(pattern)?));
        Ok(self)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Sort group of a name: index of the first matching rule, or
    /// [`len`](Self::len) if none matches.
    #[must_use]
    pub fn group(&self, name: &str) -> usize {
        let exact = self
            .rules
            .iter()
            .position(|r| matches!(r, NameRule::Exact(n) if n == name));
        exact
            .or_else(|| {
                self.rules
                    .iter()
                    .position(|r| matches!(r, NameRule::Pattern(re) if re.is_match(name)))
            })
            .unwrap_or(self.rules.len())
    }
}
