//! Context-free grammars, the flat production set produced by the expander.

use crate::{
    rules::{GrammarError, RuleId},
    types::Map,
    util::{display_fn, quote_literal},
};
use std::{fmt, hash};

// ==== Symbols ====

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalID(u16);
impl TerminalID {
    /// Reserved symbol used as a terminal symbol that means the end of input.
    pub const EOI: Self = Self(0);
    const OFFSET: u16 = 1;

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}
impl fmt::Debug for TerminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOI => write!(f, "T#End"),
            _ => write!(f, "T#{:03}", self.0),
        }
    }
}

/// A set of terminal symbols, used for lookaheads and FIRST sets.
#[derive(Debug, Default, Clone)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}
impl TerminalSet {
    pub fn contains(&self, id: TerminalID) -> bool {
        self.inner.contains(id.0.into())
    }
    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.0.into())
    }
    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }
    pub fn is_superset(&self, other: &Self) -> bool {
        self.inner.is_superset(&other.inner)
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        self.inner.iter().map(|raw| {
            TerminalID(u16::try_from(raw).expect("terminal IDs are always representable by u16"))
        })
    }
}
// Compared by elements so that the capacity of the underlying bit vector
// never affects state identity.
impl PartialEq for TerminalSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}
impl Eq for TerminalSet {}
impl hash::Hash for TerminalSet {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for t in self.iter() {
            t.hash(state);
        }
    }
}
impl FromIterator<TerminalID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TerminalID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.0.into()).collect(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    /// The end of input.
    Eoi,
    /// A literal string matched verbatim by the lexer.
    String,
    /// A regular expression matched by the lexer.
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalData {
    /// The display name: the name of the lexical rule that defines it, or
    /// the quoted literal / pattern otherwise.
    pub name: String,
    pub kind: TerminalKind,
    pub value: String,
    pub rule: Option<RuleId>,
}

impl TerminalData {
    pub(crate) fn anonymous(kind: TerminalKind, value: &str) -> Self {
        let name = match kind {
            TerminalKind::Eoi => "$eoi".to_owned(),
            TerminalKind::String => quote_literal(value),
            TerminalKind::Pattern => format!("/{}/", value),
        };
        Self {
            name,
            kind,
            value: value.to_owned(),
            rule: None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonterminalID(u16);
impl NonterminalID {
    pub const START: Self = Self(0);
    const OFFSET: u16 = 1;

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}
impl fmt::Debug for NonterminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::START => write!(f, "N#Start"),
            _ => write!(f, "N#{:03}", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NonterminalKind {
    /// The augmented start symbol.
    Start,
    /// A named rule of the rule graph.
    Rule(RuleId),
    /// The helper created for the `ordinal`-th repetition found in `rule`.
    Repeat { rule: RuleId, ordinal: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonterminalData {
    pub name: String,
    pub kind: NonterminalKind,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}
impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::T(t) => write!(f, "{:?}", t),
            Self::N(n) => write!(f, "{:?}", n),
        }
    }
}

// ==== Productions ====

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionID(u16);
impl ProductionID {
    /// The augmented production `$start -> S`.
    pub const ACCEPT: Self = Self(0);
    const OFFSET: u16 = 1;

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}
impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::ACCEPT => write!(f, "P#Accept"),
            _ => write!(f, "P#{:03}", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}
impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Nonassoc => f.write_str("nonassoc"),
        }
    }
}

/// Static precedence attached to a production.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Precedence {
    pub level: i32,
    pub assoc: Assoc,
}
impl Precedence {
    pub const fn new(level: i32, assoc: Assoc) -> Self {
        Self { level, assoc }
    }
}
impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prec {}, {}", self.level, self.assoc)
    }
}

/// Where a production came from in the rule graph.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProductionOrigin {
    Accept,
    /// The `alternative`-th expanded alternative of `rule`'s body.
    Rule { rule: RuleId, alternative: usize },
    /// The `alternative`-th production of the helper created for the
    /// `ordinal`-th repetition in `rule`.
    Repeat {
        rule: RuleId,
        ordinal: u16,
        alternative: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Production {
    pub left: NonterminalID,
    pub right: Vec<SymbolID>,
    pub precedence: Option<Precedence>,
    pub dynamic_precedence: Option<i32>,
    pub origin: ProductionOrigin,
}
impl Production {
    /// `"LHS -> R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} ->", g.nonterminals[&self.left].name)?;
            if self.right.is_empty() {
                f.write_str(" ε")?;
            }
            for r in &self.right {
                write!(f, " {}", g.symbol_name(*r))?;
            }
            Ok(())
        })
    }

    /// Whether both productions describe the same edge of the grammar,
    /// ignoring where they came from.
    pub fn same_shape(&self, other: &Production) -> bool {
        self.left == other.left
            && self.right == other.right
            && self.precedence == other.precedence
            && self.dynamic_precedence == other.dynamic_precedence
    }
}

// ==== Grammar ====

/// The grammar definition used to derive the parse tables.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Grammar {
    pub name: String,
    pub terminals: Map<TerminalID, TerminalData>,
    pub nonterminals: Map<NonterminalID, NonterminalData>,
    pub productions: Map<ProductionID, Production>,
    pub start_symbol: NonterminalID,
}

impl Grammar {
    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    pub fn symbol_name(&self, symbol: SymbolID) -> &str {
        match symbol {
            SymbolID::T(t) => &self.terminals[&t].name,
            SymbolID::N(n) => &self.nonterminals[&n].name,
        }
    }

    /// Describe where the production came from, e.g. `function_call, alternative #1`.
    pub fn origin<'g>(&'g self, id: ProductionID) -> impl fmt::Display + 'g {
        display_fn(move |f| match self.production(id).origin {
            ProductionOrigin::Accept => f.write_str("augmented start"),
            ProductionOrigin::Rule { rule, alternative } => {
                write!(f, "{}, alternative #{}", self.rule_name(rule), alternative)
            }
            ProductionOrigin::Repeat {
                rule,
                ordinal,
                alternative,
            } => write!(
                f,
                "{}, repetition #{}, alternative #{}",
                self.rule_name(rule),
                ordinal,
                alternative
            ),
        })
    }

    fn rule_name(&self, rule: RuleId) -> &str {
        self.nonterminals
            .values()
            .find(|n| n.kind == NonterminalKind::Rule(rule))
            .map(|n| n.name.as_str())
            .unwrap_or("<lexical>")
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#### grammar: {}", self.name)?;
        write!(f, "#### terminals: ")?;
        for (i, t) in self.terminals.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&t.name)?;
        }
        write!(f, "\n#### nonterminals: ")?;
        for (i, (id, n)) in self.nonterminals.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&n.name)?;
            if *id == self.start_symbol {
                f.write_str(" (start)")?;
            }
        }
        writeln!(f, "\n#### productions:")?;
        for (id, p) in &self.productions {
            write!(f, "- [{:?}] {}", id, p.display(self))?;
            if let Some(prec) = &p.precedence {
                write!(f, "  ({})", prec)?;
            }
            if let Some(level) = p.dynamic_precedence {
                write!(f, "  (dynamic {})", level)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The contextual values for building a `Grammar`.
#[derive(Debug)]
pub(crate) struct GrammarDef {
    name: String,
    terminals: Map<TerminalID, TerminalData>,
    nonterminals: Map<NonterminalID, NonterminalData>,
    productions: Map<ProductionID, Production>,
    start_symbol: Option<NonterminalID>,
    next_terminal: u16,
    next_nonterminal: u16,
    next_production: u16,
}

impl GrammarDef {
    pub(crate) fn new(name: &str) -> Self {
        let mut def = Self {
            name: name.to_owned(),
            terminals: Map::default(),
            nonterminals: Map::default(),
            productions: Map::default(),
            start_symbol: None,
            next_terminal: TerminalID::OFFSET,
            next_nonterminal: NonterminalID::OFFSET,
            next_production: ProductionID::OFFSET,
        };
        def.terminals.insert(
            TerminalID::EOI,
            TerminalData::anonymous(TerminalKind::Eoi, ""),
        );
        def.nonterminals.insert(
            NonterminalID::START,
            NonterminalData {
                name: "$start".into(),
                kind: NonterminalKind::Start,
            },
        );
        def
    }

    pub(crate) fn terminal(&mut self, data: TerminalData) -> Result<TerminalID, GrammarError> {
        let id = TerminalID(next_id(&mut self.next_terminal, "terminals")?);
        self.terminals.insert(id, data);
        Ok(id)
    }

    pub(crate) fn terminal_mut(&mut self, id: TerminalID) -> &mut TerminalData {
        &mut self.terminals[&id]
    }

    pub(crate) fn nonterminal(
        &mut self,
        name: String,
        kind: NonterminalKind,
    ) -> Result<NonterminalID, GrammarError> {
        let id = NonterminalID(next_id(&mut self.next_nonterminal, "nonterminals")?);
        self.nonterminals.insert(id, NonterminalData { name, kind });
        Ok(id)
    }

    pub(crate) fn production(
        &mut self,
        left: NonterminalID,
        right: Vec<SymbolID>,
        precedence: Option<Precedence>,
        dynamic_precedence: Option<i32>,
        origin: ProductionOrigin,
    ) -> Result<ProductionID, GrammarError> {
        let id = ProductionID(next_id(&mut self.next_production, "productions")?);
        self.productions.insert(
            id,
            Production {
                left,
                right,
                precedence,
                dynamic_precedence,
                origin,
            },
        );
        Ok(id)
    }

    pub(crate) fn start_symbol(&mut self, start: NonterminalID) {
        self.start_symbol.replace(start);
    }

    pub(crate) fn end(mut self) -> Grammar {
        let start_symbol = self
            .start_symbol
            .or_else(|| {
                self.nonterminals
                    .keys()
                    .copied()
                    .find(|n| *n != NonterminalID::START)
            })
            .unwrap_or(NonterminalID::START);

        self.productions.insert(
            ProductionID::ACCEPT,
            Production {
                left: NonterminalID::START,
                right: vec![SymbolID::N(start_symbol)],
                precedence: None,
                dynamic_precedence: None,
                origin: ProductionOrigin::Accept,
            },
        );
        self.productions.sort_keys();

        Grammar {
            name: self.name,
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            productions: self.productions,
            start_symbol,
        }
    }
}

/// The largest number of IDs of one kind, the reserved ID excluded.
pub(crate) const MAX_IDS: usize = u16::MAX as usize - 1;

/// Hand out the next ID of a kind, failing once the `u16` space runs out.
fn next_id(counter: &mut u16, what: &'static str) -> Result<u16, GrammarError> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or(GrammarError::TooLarge {
            what,
            limit: MAX_IDS,
        })?;
    Ok(id)
}
