//! The LR(1) automaton.

use crate::{
    config::{Config, MergeMode},
    first_sets::FirstSets,
    grammar::{Grammar, NonterminalID, ProductionID, SymbolID, TerminalID, TerminalSet},
    types::{Map, Queue},
    util::display_fn,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

#[derive(Debug, thiserror::Error)]
pub enum AutomatonError {
    #[error("the automaton needs more than {limit} states")]
    SizeExceeded { limit: usize },
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u32);

impl StateID {
    pub const START: Self = Self(0);

    #[inline]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// A production with a marker position, `A -> α • β`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemCore {
    pub production: ProductionID,
    pub marker: usize,
}

impl ItemCore {
    /// The symbol right after the marker, if any.
    pub fn next_symbol(&self, g: &Grammar) -> Option<SymbolID> {
        g.production(self.production).right.get(self.marker).copied()
    }

    pub fn is_complete(&self, g: &Grammar) -> bool {
        self.marker >= g.production(self.production).right.len()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let p = g.production(self.production);
            write!(f, "{} ->", g.nonterminals[&p.left].name)?;
            for (i, symbol) in p.right.iter().enumerate() {
                if i == self.marker {
                    f.write_str(" •")?;
                }
                write!(f, " {}", g.symbol_name(*symbol))?;
            }
            if self.marker >= p.right.len() {
                f.write_str(" •")?;
            }
            Ok(())
        })
    }
}

/// LR(1) items, ordered by production then marker, with their lookaheads.
pub type ItemSet = BTreeMap<ItemCore, TerminalSet>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct State {
    pub(crate) items: ItemSet,
    pub(crate) edges: Map<SymbolID, StateID>,
}

impl State {
    pub fn items(&self) -> impl Iterator<Item = (&ItemCore, &TerminalSet)> + '_ {
        self.items.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = (SymbolID, StateID)> + '_ {
        self.edges.iter().map(|(symbol, target)| (*symbol, *target))
    }

    pub fn edge(&self, symbol: SymbolID) -> Option<StateID> {
        self.edges.get(&symbol).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Automaton {
    states: Map<StateID, State>,
}

impl Automaton {
    #[tracing::instrument(skip_all, fields(grammar = grammar.name.as_str()))]
    pub fn generate(grammar: &Grammar, config: &Config) -> Result<Self, AutomatonError> {
        let mut generator = Generator::new(grammar, config);
        generator.populate_states()?;
        let automaton = generator.finalize();
        tracing::debug!(
            "built {} states ({:?})",
            automaton.states.len(),
            config.merge_mode
        );
        Ok(automaton)
    }

    pub fn states(&self) -> impl Iterator<Item = (StateID, &State)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    pub fn state(&self, id: StateID) -> &State {
        &self.states[&id]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, (id, state)) in self.states().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### State {}", id)?;
                writeln!(f, "## items")?;
                for (core, lookaheads) in &state.items {
                    write!(f, "- {}  [", core.display(g))?;
                    for (i, lookahead) in lookaheads.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        f.write_str(&g.terminals[&lookahead].name)?;
                    }
                    f.write_str("]\n")?;
                }
                writeln!(f, "## edges")?;
                for (symbol, target) in state.edges() {
                    writeln!(f, "- {} => {}", g.symbol_name(symbol), target)?;
                }
            }
            Ok(())
        })
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum StateKey {
    Items(ItemSet),
    Cores(BTreeSet<ItemCore>),
}

#[derive(Debug)]
struct Generator<'g> {
    grammar: &'g Grammar,
    config: &'g Config,
    first_sets: FirstSets,
    productions_of: Map<NonterminalID, Vec<ProductionID>>,
    // Unclosed kernels, indexed by state ID.
    kernels: Vec<ItemSet>,
    states: Vec<State>,
    index: Map<StateKey, StateID>,
    pending: Queue<StateID>,
}

impl<'g> Generator<'g> {
    fn new(grammar: &'g Grammar, config: &'g Config) -> Self {
        let mut productions_of: Map<NonterminalID, Vec<ProductionID>> = Map::default();
        for (&id, p) in &grammar.productions {
            productions_of.entry(p.left).or_default().push(id);
        }
        Self {
            grammar,
            config,
            first_sets: FirstSets::new(grammar),
            productions_of,
            kernels: vec![],
            states: vec![],
            index: Map::default(),
            pending: Queue::default(),
        }
    }

    fn populate_states(&mut self) -> Result<(), AutomatonError> {
        let mut start = ItemSet::new();
        start.insert(
            ItemCore {
                production: ProductionID::ACCEPT,
                marker: 0,
            },
            Some(TerminalID::EOI).into_iter().collect(),
        );
        self.intern(start)?;

        while let Some(id) = self.pending.pop() {
            let mut items = self.kernels[id.index()].clone();
            self.expand_closure(&mut items);

            let mut edges = Map::default();
            for (symbol, kernel) in self.extract_transitions(&items) {
                let target = self.intern(kernel)?;
                edges.insert(symbol, target);
            }

            self.states[id.index()] = State { items, edges };
        }

        Ok(())
    }

    /// Look up the state for the kernel, registering a new one if needed.
    fn intern(&mut self, kernel: ItemSet) -> Result<StateID, AutomatonError> {
        let key = match self.config.merge_mode {
            MergeMode::Canonical => StateKey::Items(kernel.clone()),
            MergeMode::Lalr => StateKey::Cores(kernel.keys().copied().collect()),
        };

        if let Some(&id) = self.index.get(&key) {
            if self.config.merge_mode == MergeMode::Lalr {
                let merged = &mut self.kernels[id.index()];
                let mut changed = false;
                for (core, lookaheads) in kernel {
                    let current = merged.entry(core).or_default();
                    if !current.is_superset(&lookaheads) {
                        current.union_with(&lookaheads);
                        changed = true;
                    }
                }
                // The successors have to see the new lookaheads as well.
                if changed && self.pending.push(id) {
                    tracing::trace!("re-propagating lookaheads of {:?}", id);
                }
            }
            return Ok(id);
        }

        let limit = self.config.max_states;
        if self.kernels.len() >= limit {
            return Err(AutomatonError::SizeExceeded { limit });
        }
        let id = u32::try_from(self.kernels.len())
            .map(StateID)
            .map_err(|_| AutomatonError::SizeExceeded { limit })?;
        tracing::trace!("new state {:?} ({} kernel items)", id, kernel.len());

        self.kernels.push(kernel);
        self.states.push(State::default());
        self.index.insert(key, id);
        self.pending.push(id);
        Ok(id)
    }

    fn expand_closure(&self, items: &mut ItemSet) {
        let mut changed = true;
        while changed {
            changed = false;

            let mut added: Map<ItemCore, TerminalSet> = Map::default();
            for (core, lookaheads) in &*items {
                let p = self.grammar.production(core.production);

                // [A -> α • B β, L]  =>  [B -> • γ, FIRST(β L)]
                let (b, beta) = match &p.right[core.marker..] {
                    [SymbolID::N(b), beta @ ..] => (*b, beta),
                    _ => continue,
                };
                let first = self.first_sets.get(beta, lookaheads);
                for &production in self.productions_of.get(&b).into_iter().flatten() {
                    added
                        .entry(ItemCore {
                            production,
                            marker: 0,
                        })
                        .or_default()
                        .union_with(&first);
                }
            }

            for (core, lookaheads) in added {
                let current = items.entry(core).or_insert_with(|| {
                    changed = true;
                    TerminalSet::default()
                });
                if !current.is_superset(&lookaheads) {
                    current.union_with(&lookaheads);
                    changed = true;
                }
            }
        }
    }

    /// Group the items by the symbol after the marker and advance it.
    fn extract_transitions(&self, items: &ItemSet) -> Map<SymbolID, ItemSet> {
        let mut kernels: Map<SymbolID, ItemSet> = Map::default();
        for (core, lookaheads) in items {
            let Some(label) = core.next_symbol(self.grammar) else {
                continue;
            };
            kernels.entry(label).or_default().insert(
                ItemCore {
                    marker: core.marker + 1,
                    ..*core
                },
                lookaheads.clone(),
            );
        }
        kernels
    }

    fn finalize(self) -> Automaton {
        let states = self
            .states
            .into_iter()
            .enumerate()
            .map(|(i, state)| (StateID(i as u32), state))
            .collect();
        Automaton { states }
    }
}
