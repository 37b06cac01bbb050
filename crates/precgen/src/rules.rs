//! The rule graph: named rules whose bodies are expression trees.
//!
//! Rules refer to each other by [`RuleId`], an index into the graph's rule
//! table, so recursive and mutually recursive rules need no shared
//! ownership. A graph is assembled once through the builder context passed
//! to [`RuleGraph::define`] and is immutable afterwards.

use crate::grammar::{
    Assoc, Grammar, NonterminalID, SymbolID, TerminalID, TerminalKind, MAX_IDS,
};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u16);
impl RuleId {
    fn new(index: usize) -> Self {
        Self(u16::try_from(index).expect("the number of rules is bounded by RuleGraphDef"))
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0.into()
    }
}
impl fmt::Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R#{:03}", self.0)
    }
}

/// Index of an interned terminal in the rule graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalRef(u16);
impl TerminalRef {
    fn new(index: usize) -> Self {
        Self(u16::try_from(index).expect("the number of terminals is bounded by RuleGraphDef"))
    }

    pub(crate) fn index(self) -> usize {
        self.0.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TerminalDef {
    String(String),
    Pattern(String),
}
impl TerminalDef {
    pub fn kind(&self) -> TerminalKind {
        match self {
            Self::String(..) => TerminalKind::String,
            Self::Pattern(..) => TerminalKind::Pattern,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::String(value) | Self::Pattern(value) => value,
        }
    }
}

/// A precedence annotation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Prec {
    pub level: i32,
    pub assoc: Assoc,
    /// The level is only consulted by the parser at runtime.
    pub dynamic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Matches the empty string.
    Blank,
    Terminal(TerminalRef),
    Symbol(RuleId),
    Seq(Vec<Expr>),
    /// Alternatives in declaration order.
    Choice(Vec<Expr>),
    /// Zero or more repetitions.
    Repeat(Box<Expr>),
    /// One or more repetitions.
    Repeat1(Box<Expr>),
    Prec(Prec, Box<Expr>),
}

impl From<RuleId> for Expr {
    fn from(rule: RuleId) -> Self {
        Self::Symbol(rule)
    }
}

impl From<TerminalRef> for Expr {
    fn from(t: TerminalRef) -> Self {
        Self::Terminal(t)
    }
}

/// Conversion into the member list of `seq` and `choice`.
pub trait IntoExprs {
    fn into_exprs(self) -> Vec<Expr>;
}

impl<T: Into<Expr>> IntoExprs for Vec<T> {
    fn into_exprs(self) -> Vec<Expr> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Expr>, const N: usize> IntoExprs for [T; N] {
    fn into_exprs(self) -> Vec<Expr> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! impl_into_exprs_for_tuples {
    ($( ($($T:ident),+) ),* $(,)?) => {$(
        impl<$($T: Into<Expr>),+> IntoExprs for ($($T,)+) {
            #[allow(non_snake_case)]
            fn into_exprs(self) -> Vec<Expr> {
                let ($($T,)+) = self;
                vec![$($T.into()),+]
            }
        }
    )*};
}

impl_into_exprs_for_tuples! {
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
    (A, B, C, D, E),
    (A, B, C, D, E, F),
    (A, B, C, D, E, F, G),
    (A, B, C, D, E, F, G, H),
}

pub fn blank() -> Expr {
    Expr::Blank
}

pub fn seq(members: impl IntoExprs) -> Expr {
    Expr::Seq(members.into_exprs())
}

pub fn choice(members: impl IntoExprs) -> Expr {
    Expr::Choice(members.into_exprs())
}

pub fn repeat(content: impl Into<Expr>) -> Expr {
    Expr::Repeat(Box::new(content.into()))
}

pub fn repeat1(content: impl Into<Expr>) -> Expr {
    Expr::Repeat1(Box::new(content.into()))
}

/// `prec(level, content)`: a precedence level without associativity.
pub fn prec(level: i32, content: impl Into<Expr>) -> Expr {
    prec_with(level, Assoc::Nonassoc, false, content)
}

pub fn prec_left(level: i32, content: impl Into<Expr>) -> Expr {
    prec_with(level, Assoc::Left, false, content)
}

pub fn prec_right(level: i32, content: impl Into<Expr>) -> Expr {
    prec_with(level, Assoc::Right, false, content)
}

pub fn prec_dynamic(level: i32, content: impl Into<Expr>) -> Expr {
    prec_with(level, Assoc::Nonassoc, true, content)
}

fn prec_with(level: i32, assoc: Assoc, dynamic: bool, content: impl Into<Expr>) -> Expr {
    Expr::Prec(
        Prec {
            level,
            assoc,
            dynamic,
        },
        Box::new(content.into()),
    )
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("the grammar has no rules")]
    EmptyGrammar,

    #[error("invalid rule name: `{name}'")]
    InvalidRuleName { name: String },

    #[error(
        "undefined symbol `{name}'{}",
        .referrer.as_ref().map(|r| format!(" (referenced from rule `{}')", r)).unwrap_or_default()
    )]
    UndefinedSymbol {
        name: String,
        referrer: Option<String>,
    },

    #[error("the rule `{name}' is defined more than once")]
    DuplicateRuleDefinition { name: String },

    #[error(
        "conflicting precedence annotations ({first}) and ({second}) \
         in rule `{rule}', alternative #{alternative}"
    )]
    AmbiguousPrecedence {
        rule: String,
        alternative: usize,
        first: String,
        second: String,
    },

    #[error("the start rule `{name}' must not be a lexical rule")]
    InvalidStartRule { name: String },

    #[error("empty choice in rule `{rule}'")]
    EmptyChoice { rule: String },

    #[error("the rule `{name}' has the same name as a repetition helper of rule `{rule}'")]
    HelperNameClash { name: String, rule: String },

    #[error("the grammar needs more than {limit} {what}")]
    TooLarge { what: &'static str, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleData {
    pub name: String,
    pub body: Option<Expr>,
}

/// A named grammar, as a graph of rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGraph {
    name: String,
    rules: Vec<RuleData>,
    terminals: Vec<TerminalDef>,
    start: Option<RuleId>,
}

impl RuleGraph {
    /// Define a rule graph using the specified function.
    pub fn define<F>(name: &str, f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut RuleGraphDef) -> Result<(), GrammarError>,
    {
        let mut def = RuleGraphDef {
            graph: RuleGraph {
                name: name.to_owned(),
                rules: vec![],
                terminals: vec![],
                start: None,
            },
        };
        f(&mut def)?;
        if def.graph.terminals.len() > MAX_IDS {
            return Err(GrammarError::TooLarge {
                what: "terminals",
                limit: MAX_IDS,
            });
        }
        Ok(def.graph)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &RuleData)> + '_ {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleId::new(i), rule))
    }

    pub fn rule(&self, id: RuleId) -> Option<&RuleData> {
        self.rules.get(id.index())
    }

    pub fn rule_name(&self, id: RuleId) -> String {
        match self.rule(id) {
            Some(rule) => rule.name.clone(),
            None => format!("{:?}", id),
        }
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TerminalRef, &TerminalDef)> + '_ {
        self.terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (TerminalRef::new(i), t))
    }

    pub fn terminal(&self, id: TerminalRef) -> Option<&TerminalDef> {
        self.terminals.get(id.index())
    }

    /// The start rule: the one specified explicitly, or the first declared rule.
    pub fn start_rule(&self) -> Option<RuleId> {
        self.start
            .or_else(|| (!self.rules.is_empty()).then_some(RuleId(0)))
    }

    /// A lexical rule is a rule whose whole body is a single terminal.
    /// It is treated as a named token rather than as a nonterminal.
    pub fn lexical_terminal(&self, id: RuleId) -> Option<TerminalRef> {
        match self.rule(id)?.body {
            Some(Expr::Terminal(t)) => Some(t),
            _ => None,
        }
    }

    /// Check that every rule is defined and every reference resolves.
    pub fn validate(&self) -> Result<(), GrammarError> {
        let start = self.start_rule().ok_or(GrammarError::EmptyGrammar)?;

        for (id, rule) in self.rules() {
            let Some(body) = &rule.body else {
                let referrer = self.rules().find_map(|(_, referrer)| {
                    referrer
                        .body
                        .as_ref()
                        .filter(|body| references(body, id))
                        .map(|_| referrer.name.clone())
                });
                return Err(GrammarError::UndefinedSymbol {
                    name: rule.name.clone(),
                    referrer,
                });
            };
            self.validate_expr(body, &rule.name)?;
        }

        if self.rule(start).is_none() {
            return Err(GrammarError::UndefinedSymbol {
                name: format!("{:?}", start),
                referrer: None,
            });
        }
        if self.lexical_terminal(start).is_some() {
            return Err(GrammarError::InvalidStartRule {
                name: self.rule_name(start),
            });
        }

        Ok(())
    }

    fn validate_expr(&self, expr: &Expr, referrer: &str) -> Result<(), GrammarError> {
        match expr {
            Expr::Blank => Ok(()),
            Expr::Terminal(t) if self.terminal(*t).is_none() => {
                Err(GrammarError::UndefinedSymbol {
                    name: format!("{:?}", t),
                    referrer: Some(referrer.to_owned()),
                })
            }
            Expr::Terminal(..) => Ok(()),
            Expr::Symbol(r) if self.rule(*r).is_none() => Err(GrammarError::UndefinedSymbol {
                name: format!("{:?}", r),
                referrer: Some(referrer.to_owned()),
            }),
            Expr::Symbol(..) => Ok(()),
            Expr::Choice(members) if members.is_empty() => Err(GrammarError::EmptyChoice {
                rule: referrer.to_owned(),
            }),
            Expr::Seq(members) | Expr::Choice(members) => members
                .iter()
                .try_for_each(|member| self.validate_expr(member, referrer)),
            Expr::Repeat(content) | Expr::Repeat1(content) | Expr::Prec(_, content) => {
                self.validate_expr(content, referrer)
            }
        }
    }

    /// Lift a flat production set back into a rule graph.
    ///
    /// Every nonterminal becomes a rule (in ID order) whose body is the
    /// choice of its productions, and every named token becomes a lexical
    /// rule. Expanding the result yields the same productions again.
    pub fn from_grammar(g: &Grammar) -> Self {
        let terminal_ref = |t: TerminalID| TerminalRef(t.into_raw() - 1);
        let rule_id = |n: NonterminalID| RuleId(n.into_raw() - 1);

        let terminals = g
            .terminals
            .iter()
            .filter(|(id, _)| **id != TerminalID::EOI)
            .map(|(_, t)| match t.kind {
                TerminalKind::Pattern => TerminalDef::Pattern(t.value.clone()),
                _ => TerminalDef::String(t.value.clone()),
            })
            .collect();

        let mut rules = vec![];
        for (&n, data) in &g.nonterminals {
            if n == NonterminalID::START {
                continue;
            }
            let mut alternatives = vec![];
            for p in g.productions.values().filter(|p| p.left == n) {
                let mut alternative = match &p.right[..] {
                    [] => Expr::Blank,
                    right => Expr::Seq(
                        right
                            .iter()
                            .map(|symbol| match *symbol {
                                SymbolID::T(t) => Expr::Terminal(terminal_ref(t)),
                                SymbolID::N(n) => Expr::Symbol(rule_id(n)),
                            })
                            .collect(),
                    ),
                };
                if let Some(p) = p.precedence {
                    alternative = prec_with(p.level, p.assoc, false, alternative);
                }
                if let Some(level) = p.dynamic_precedence {
                    alternative = prec_with(level, Assoc::Nonassoc, true, alternative);
                }
                alternatives.push(alternative);
            }
            let body = if alternatives.len() == 1 {
                alternatives.pop()
            } else {
                Some(Expr::Choice(alternatives))
            };
            rules.push(RuleData {
                name: data.name.clone(),
                body,
            });
        }

        for (&t, data) in &g.terminals {
            if data.rule.is_some() {
                rules.push(RuleData {
                    name: data.name.clone(),
                    body: Some(Expr::Terminal(terminal_ref(t))),
                });
            }
        }

        RuleGraph {
            name: g.name.clone(),
            rules,
            terminals,
            start: Some(rule_id(g.start_symbol)),
        }
    }
}

fn references(expr: &Expr, rule: RuleId) -> bool {
    match expr {
        Expr::Symbol(r) => *r == rule,
        Expr::Blank | Expr::Terminal(..) => false,
        Expr::Seq(members) | Expr::Choice(members) => {
            members.iter().any(|member| references(member, rule))
        }
        Expr::Repeat(content) | Expr::Repeat1(content) | Expr::Prec(_, content) => {
            references(content, rule)
        }
    }
}

/// The contextual values for building a `RuleGraph`.
#[derive(Debug)]
pub struct RuleGraphDef {
    graph: RuleGraph,
}

impl RuleGraphDef {
    /// Declare a rule, or look up a rule already declared with this name.
    ///
    /// A rule may be referenced before its body is defined.
    pub fn rule(&mut self, name: &str) -> Result<RuleId, GrammarError> {
        if let Some(i) = self.graph.rules.iter().position(|r| r.name == name) {
            return Ok(RuleId::new(i));
        }
        if !verify_ident(name) {
            return Err(GrammarError::InvalidRuleName {
                name: name.to_owned(),
            });
        }
        if self.graph.rules.len() >= MAX_IDS {
            return Err(GrammarError::TooLarge {
                what: "rules",
                limit: MAX_IDS,
            });
        }
        let id = RuleId::new(self.graph.rules.len());
        self.graph.rules.push(RuleData {
            name: name.to_owned(),
            body: None,
        });
        Ok(id)
    }

    /// Specify the body of a declared rule.
    pub fn define(&mut self, rule: RuleId, body: impl Into<Expr>) -> Result<(), GrammarError> {
        let data = self
            .graph
            .rules
            .get_mut(rule.index())
            .ok_or_else(|| GrammarError::UndefinedSymbol {
                name: format!("{:?}", rule),
                referrer: None,
            })?;
        if data.body.is_some() {
            return Err(GrammarError::DuplicateRuleDefinition {
                name: data.name.clone(),
            });
        }
        data.body = Some(body.into());
        Ok(())
    }

    /// A literal string terminal.
    pub fn string(&mut self, value: &str) -> Expr {
        Expr::Terminal(self.intern(TerminalDef::String(value.to_owned())))
    }

    /// A regular expression terminal.
    pub fn pattern(&mut self, value: &str) -> Expr {
        Expr::Terminal(self.intern(TerminalDef::Pattern(value.to_owned())))
    }

    /// Specify the start rule. Defaults to the first declared rule.
    pub fn start_symbol(&mut self, rule: RuleId) {
        self.graph.start.replace(rule);
    }

    // Going past `MAX_IDS` is reported when `RuleGraph::define` returns.
    fn intern(&mut self, def: TerminalDef) -> TerminalRef {
        let index = match self.graph.terminals.iter().position(|t| *t == def) {
            Some(i) => i,
            None => {
                self.graph.terminals.push(def);
                self.graph.terminals.len() - 1
            }
        };
        TerminalRef::new(index.min(MAX_IDS))
    }
}

fn verify_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        // The identifier must not be empty.
        return false;
    };
    if !(first == '_' || unicode_ident::is_xid_start(first)) {
        return false;
    }
    chars.all(unicode_ident::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_references_and_interning() {
        let graph = RuleGraph::define("g", |g| {
            let a = g.rule("a")?;
            let b = g.rule("b")?;
            let x = g.string("x");
            let x2 = g.string("x");
            assert_eq!(x, x2);
            g.define(a, seq((b, x)))?;
            g.define(b, choice((x2, blank())))?;
            assert_eq!(g.rule("a")?, a);
            Ok(())
        })
        .unwrap();
        assert_eq!(graph.terminals().count(), 1);
        assert_eq!(graph.start_rule(), Some(RuleId(0)));
        graph.validate().unwrap();
    }

    #[test]
    fn duplicate_definition() {
        let err = RuleGraph::define("g", |g| {
            let a = g.rule("a")?;
            let x = g.string("x");
            g.define(a, x.clone())?;
            g.define(a, x)
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRuleDefinition { name } if name == "a"));
    }

    #[test]
    fn undefined_symbol_names_referrer() {
        let graph = RuleGraph::define("g", |g| {
            let a = g.rule("a")?;
            let missing = g.rule("missing")?;
            g.define(a, repeat(missing))
        })
        .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            &err,
            GrammarError::UndefinedSymbol { name, referrer: Some(r) } if name == "missing" && r == "a"
        ));
        assert_eq!(
            err.to_string(),
            "undefined symbol `missing' (referenced from rule `a')"
        );
    }

    #[test]
    fn invalid_names_and_start() {
        let err = RuleGraph::define("g", |g| g.rule("1abc").map(drop)).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidRuleName { .. }));

        let graph = RuleGraph::define("g", |g| {
            let ident = g.rule("identifier")?;
            let body = g.pattern("[a-z]+");
            g.define(ident, body)
        })
        .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GrammarError::InvalidStartRule { .. })
        ));

        let empty = RuleGraph::define("g", |_| Ok(())).unwrap();
        assert!(matches!(empty.validate(), Err(GrammarError::EmptyGrammar)));
    }

    #[test]
    fn empty_choice_is_rejected() {
        let graph = RuleGraph::define("g", |g| {
            let a = g.rule("a")?;
            let x = g.string("x");
            let b = g.rule("b")?;
            g.define(a, seq((x, b)))?;
            g.define(b, choice(Vec::<Expr>::new()))
        })
        .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(&err, GrammarError::EmptyChoice { rule } if rule == "b"));
        assert_eq!(err.to_string(), "empty choice in rule `b'");
    }
}
