//! Calculation of the LR(1) parse table with precedence-based conflict resolution.

use crate::{
    automaton::{Automaton, ItemCore, State, StateID},
    config::{Config, UndeclaredPrecedence},
    first_sets::FirstSets,
    grammar::{Assoc, Grammar, NonterminalID, Precedence, ProductionID, SymbolID, TerminalID},
    types::Map,
    util::display_fn,
};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("the conflict on {lookahead} in state {state} is {status}:\n{description}")]
    UnresolvedConflict {
        state: StateID,
        lookahead: String,
        status: ConflictStatus,
        description: String,
    },
}

#[derive(Debug)]
pub struct ParseTable {
    pub states: Map<StateID, ParseTableRow>,
    /// Conflicts that were not settled by static precedence, in state order.
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct ParseTableRow {
    pub actions: Map<TerminalID, Action>,
    pub gotos: Map<NonterminalID, StateID>,
}

/// The action that the LR automaton in a state performs on a particular
/// lookahead symbol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read a lookahead symbol and transition to the specified state.
    Shift(StateID),

    /// Reduce to the specified production.
    Reduce(ProductionID),

    Accept,
}

impl Action {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| match self {
            Self::Shift(target) => write!(f, "shift({})", target),
            Self::Reduce(p) => write!(f, "reduce({})", g.production(*p).display(g)),
            Self::Accept => f.write_str("accept"),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConflictStatus {
    /// Nothing discriminated the candidates, so the earliest-declared
    /// alternative was chosen.
    ResolvedByDefault,

    /// The candidates tied on a non-associative (or mixed) precedence.
    Unresolved,

    /// A candidate carries a dynamic precedence, which the parser is
    /// expected to consult at runtime. The table keeps the fallback action.
    DeferredToRuntime,
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolvedByDefault => f.write_str("resolved by default"),
            Self::Unresolved => f.write_str("unresolved"),
            Self::DeferredToRuntime => f.write_str("deferred to runtime"),
        }
    }
}

/// A conflict that static precedence could not settle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub state: StateID,
    pub lookahead: TerminalID,
    pub shift: Option<StateID>,
    /// The items responsible for the shift.
    pub shift_items: Vec<ItemCore>,
    pub reduces: Vec<ProductionID>,
    pub chosen: Action,
    pub status: ConflictStatus,
}

impl Conflict {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            writeln!(
                f,
                "conflict in state {} on {}: {}",
                self.state, g.terminals[&self.lookahead].name, self.status
            )?;
            if let Some(target) = self.shift {
                writeln!(f, "  - shift({}), driven by:", target)?;
                for item in &self.shift_items {
                    writeln!(
                        f,
                        "    - {}  ({})",
                        item.display(g),
                        g.origin(item.production)
                    )?;
                }
            }
            for &reduce in &self.reduces {
                writeln!(
                    f,
                    "  - reduce({})  ({})",
                    g.production(reduce).display(g),
                    g.origin(reduce)
                )?;
            }
            write!(f, "  => chose {}", self.chosen.display(g))
        })
    }
}

impl ParseTable {
    #[tracing::instrument(skip_all, fields(grammar = g.name.as_str()))]
    pub fn generate(g: &Grammar, automaton: &Automaton, config: &Config) -> Result<Self, TableError> {
        let first_sets = FirstSets::new(g);

        let mut states = Map::default();
        let mut conflicts = vec![];
        for (id, state) in automaton.states() {
            #[derive(Default)]
            struct PendingAction {
                shift: Option<StateID>,
                reduces: Vec<ProductionID>,
            }
            let mut pending_actions = Map::<TerminalID, PendingAction>::default();
            let mut gotos = Map::default();
            for (symbol, target) in state.edges() {
                match symbol {
                    SymbolID::T(t) => {
                        pending_actions.entry(t).or_default().shift.replace(target);
                    }
                    SymbolID::N(n) => {
                        gotos.insert(n, target);
                    }
                }
            }
            for (core, lookaheads) in state.items() {
                if !core.is_complete(g) {
                    continue;
                }
                for t in lookaheads.iter() {
                    pending_actions
                        .entry(t)
                        .or_default()
                        .reduces
                        .push(core.production);
                }
            }
            pending_actions.sort_keys();

            let mut actions = Map::default();
            for (lookahead, pending) in pending_actions {
                let mut candidates = vec![];
                let mut shift_items = vec![];
                if let Some(target) = pending.shift {
                    shift_items = driving_items(g, &first_sets, state, lookahead);
                    candidates.push(Candidate::shift(g, target, &shift_items));
                }
                for &reduce in &pending.reduces {
                    candidates.push(Candidate::reduce(g, reduce));
                }

                let (chosen, status) = resolve_conflict(&candidates, config.undeclared);
                actions.insert(lookahead, chosen);

                let Some(status) = status else {
                    if candidates.len() > 1 {
                        tracing::debug!(
                            "state {:?}, lookahead {}: precedence chose {}",
                            id,
                            g.terminals[&lookahead].name,
                            chosen.display(g)
                        );
                    }
                    continue;
                };

                let conflict = Conflict {
                    state: id,
                    lookahead,
                    shift: pending.shift,
                    shift_items,
                    reduces: pending.reduces,
                    chosen,
                    status,
                };
                tracing::warn!("{}", conflict.display(g));

                if config.strict && status != ConflictStatus::DeferredToRuntime {
                    return Err(TableError::UnresolvedConflict {
                        state: id,
                        lookahead: g.terminals[&lookahead].name.clone(),
                        status,
                        description: conflict.display(g).to_string(),
                    });
                }
                conflicts.push(conflict);
            }

            states.insert(id, ParseTableRow { actions, gotos });
        }

        Ok(ParseTable { states, conflicts })
    }

    pub fn action(&self, state: StateID, lookahead: TerminalID) -> Option<Action> {
        self.states.get(&state)?.actions.get(&lookahead).copied()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, (id, row)) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }

                writeln!(f, "#### State {}", id)?;
                writeln!(f, "## actions")?;
                for (token, action) in &row.actions {
                    writeln!(f, "- {} => {}", g.terminals[token].name, action.display(g))?;
                }
                writeln!(f, "## gotos")?;
                for (symbol, goto) in &row.gotos {
                    writeln!(f, "- {} => goto({})", g.nonterminals[symbol].name, goto)?;
                }
            }
            if !self.conflicts.is_empty() {
                writeln!(f, "\n#### conflicts")?;
                for conflict in &self.conflicts {
                    writeln!(f, "{}", conflict.display(g))?;
                }
            }
            Ok(())
        })
    }
}

/// The items that make the state shift `lookahead`.
///
/// These are the items `A -> α • β` with a non-empty `α` that can start `β`
/// with the lookahead, so that a shift deep inside `β` still carries the
/// precedence of the production that contains it. When no such item
/// exists, the items whose next symbol is the lookahead are used.
fn driving_items(
    g: &Grammar,
    first_sets: &FirstSets,
    state: &State,
    lookahead: TerminalID,
) -> Vec<ItemCore> {
    let contextual: Vec<ItemCore> = state
        .items
        .keys()
        .filter(|core| {
            let rest = &g.production(core.production).right[core.marker..];
            core.marker > 0 && first_sets.prefix(rest).0.contains(lookahead)
        })
        .copied()
        .collect();
    if !contextual.is_empty() {
        return contextual;
    }
    state
        .items
        .keys()
        .filter(|core| core.next_symbol(g) == Some(SymbolID::T(lookahead)))
        .copied()
        .collect()
}

#[derive(Debug)]
struct Candidate {
    action: Action,
    precedence: Option<Precedence>,
    dynamic: bool,
    // The earliest production involved, used when falling back.
    rank: ProductionID,
}

impl Candidate {
    fn shift(g: &Grammar, target: StateID, items: &[ItemCore]) -> Self {
        let productions = || items.iter().map(|item| g.production(item.production));
        Self {
            action: Action::Shift(target),
            precedence: productions()
                .filter_map(|p| p.precedence)
                .max_by_key(|p| p.level),
            dynamic: productions().any(|p| p.dynamic_precedence.is_some()),
            rank: items
                .iter()
                .map(|item| item.production)
                .min()
                .expect("a shift is always driven by at least one item"),
        }
    }

    fn reduce(g: &Grammar, production: ProductionID) -> Self {
        let p = g.production(production);
        Self {
            action: if production == ProductionID::ACCEPT {
                Action::Accept
            } else {
                Action::Reduce(production)
            },
            precedence: p.precedence,
            dynamic: p.dynamic_precedence.is_some(),
            rank: production,
        }
    }

    fn is_shift(&self) -> bool {
        matches!(self.action, Action::Shift(..))
    }
}

enum Decision<'c> {
    Precedence(Action),
    Fallback(Vec<&'c Candidate>, ConflictStatus),
}

/// Attempts to resolve the conflict based on precedence/associativity.
fn resolve_conflict(
    candidates: &[Candidate],
    policy: UndeclaredPrecedence,
) -> (Action, Option<ConflictStatus>) {
    if let [only] = candidates {
        return (only.action, None);
    }

    match decide(candidates, policy) {
        Decision::Precedence(action) => (action, None),
        Decision::Fallback(among, status) => {
            let chosen = among
                .iter()
                .min_by_key(|c| (c.rank, !c.is_shift()))
                .map(|c| c.action)
                .expect("a conflict has at least two candidates");
            // A non-associative tie stays unresolved whatever the dynamic levels say.
            let status = match status {
                ConflictStatus::ResolvedByDefault if among.iter().any(|c| c.dynamic) => {
                    ConflictStatus::DeferredToRuntime
                }
                status => status,
            };
            (chosen, Some(status))
        }
    }
}

fn decide(candidates: &[Candidate], policy: UndeclaredPrecedence) -> Decision<'_> {
    let all = || candidates.iter().collect::<Vec<_>>();

    let undeclared = candidates.iter().any(|c| c.precedence.is_none());
    if undeclared && policy == UndeclaredPrecedence::Unordered {
        return Decision::Fallback(all(), ConflictStatus::ResolvedByDefault);
    }

    let Some(top) = candidates
        .iter()
        .filter_map(|c| c.precedence.map(|p| p.level))
        .max()
    else {
        return Decision::Fallback(all(), ConflictStatus::ResolvedByDefault);
    };

    let tied: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.precedence.map(|p| p.level) == Some(top))
        .collect();
    if let [winner] = tied.as_slice() {
        return Decision::Precedence(winner.action);
    }

    let Some(shift) = tied.iter().copied().find(|c| c.is_shift()) else {
        return Decision::Fallback(tied, ConflictStatus::ResolvedByDefault);
    };
    let reduces: Vec<&Candidate> = tied.iter().copied().filter(|c| !c.is_shift()).collect();
    let all_assoc = |assoc: Assoc| {
        reduces
            .iter()
            .all(|c| c.precedence.map(|p| p.assoc) == Some(assoc))
    };

    if all_assoc(Assoc::Right) {
        Decision::Precedence(shift.action)
    } else if all_assoc(Assoc::Left) {
        match reduces.as_slice() {
            [reduce] => Decision::Precedence(reduce.action),
            _ => Decision::Fallback(reduces, ConflictStatus::ResolvedByDefault),
        }
    } else {
        Decision::Fallback(tied, ConflictStatus::Unresolved)
    }
}
