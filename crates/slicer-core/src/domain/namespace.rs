use std::fmt;

/// Quota namespace - partitions counters so different operation classes
/// never share a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Image processing routes (UI-facing and API-facing share this one).
    Processing,
    /// Health/status checks.
    Health,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Processing => "processing",
            Namespace::Health => "health",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_key_segment() {
        assert_eq!(Namespace::Processing.to_string(), "processing");
        assert_eq!(Namespace::Health.to_string(), Namespace::Health.as_str());
    }
}
