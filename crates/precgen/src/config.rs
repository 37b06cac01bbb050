//! Build configuration.

/// How states with the same LR(0) core are identified.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Knuth's canonical LR(1): two states are the same only if their item
    /// sets, lookaheads included, are equal.
    #[default]
    Canonical,

    /// DeRemer's LALR(1): states with the same LR(0) cores are merged and
    /// their lookaheads are unioned.
    Lalr,
}

/// How a candidate without a static precedence compares against others.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum UndeclaredPrecedence {
    /// An undeclared precedence is below every declared level.
    #[default]
    Lowest,

    /// An undeclared precedence cannot be compared, so the conflict falls
    /// back to the earliest-declared alternative.
    Unordered,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub merge_mode: MergeMode,
    pub max_states: usize,
    pub undeclared: UndeclaredPrecedence,
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const DEFAULT_MAX_STATES: usize = 1 << 16;

    pub const fn new() -> Self {
        Self {
            merge_mode: MergeMode::Canonical,
            max_states: Self::DEFAULT_MAX_STATES,
            undeclared: UndeclaredPrecedence::Lowest,
            strict: false,
        }
    }

    pub fn use_canonical(&mut self) -> &mut Self {
        self.merge_mode = MergeMode::Canonical;
        self
    }

    pub fn use_lalr(&mut self) -> &mut Self {
        self.merge_mode = MergeMode::Lalr;
        self
    }

    /// Fail the build instead of growing past `limit` states.
    pub fn max_states(&mut self, limit: usize) -> &mut Self {
        self.max_states = limit;
        self
    }

    pub fn undeclared(&mut self, policy: UndeclaredPrecedence) -> &mut Self {
        self.undeclared = policy;
        self
    }

    /// Treat conflicts that were not settled by precedence as errors.
    pub fn strict(&mut self, enabled: bool) -> &mut Self {
        self.strict = enabled;
        self
    }
}
