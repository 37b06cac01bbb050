//! Nullable symbols and FIRST sets.

use crate::{
    grammar::{Grammar, NonterminalID, SymbolID, TerminalSet},
    types::{Map, Set},
};

#[derive(Debug)]
pub(crate) struct FirstSets {
    nulls: Set<NonterminalID>,
    map: Map<SymbolID, TerminalSet>,
}

impl FirstSets {
    pub(crate) fn new(grammar: &Grammar) -> Self {
        let nulls = nulls_set(grammar);

        // FIRST(t) = {t}, FIRST(N) starts empty.
        let mut map: Map<SymbolID, TerminalSet> = Map::default();
        for &t in grammar.terminals.keys() {
            map.insert(SymbolID::T(t), Some(t).into_iter().collect());
        }
        for &n in grammar.nonterminals.keys() {
            map.insert(SymbolID::N(n), TerminalSet::default());
        }

        // For `X -> Y1 ... Yn` with Y1..Y(k-1) nullable and Yk not,
        // FIRST(X) must contain FIRST(Yi) for every i <= k.
        let mut constraints: Vec<(SymbolID, SymbolID)> = vec![];
        for p in grammar.productions.values() {
            for &symbol in &p.right {
                if symbol != SymbolID::N(p.left) {
                    constraints.push((SymbolID::N(p.left), symbol));
                }
                if !matches!(symbol, SymbolID::N(n) if nulls.contains(&n)) {
                    break;
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (sup, sub) in &constraints {
                let subset = map[sub].clone();
                let superset = &mut map[sup];
                if !superset.is_superset(&subset) {
                    superset.union_with(&subset);
                    changed = true;
                }
            }
        }

        Self { nulls, map }
    }

    pub(crate) fn is_nullable(&self, n: NonterminalID) -> bool {
        self.nulls.contains(&n)
    }

    /// `FIRST(prefix)`, together with whether the whole prefix is nullable.
    pub(crate) fn prefix(&self, prefix: &[SymbolID]) -> (TerminalSet, bool) {
        let mut res = TerminalSet::default();
        for symbol in prefix {
            res.union_with(&self.map[symbol]);
            if !matches!(symbol, SymbolID::N(n) if self.is_nullable(*n)) {
                return (res, false);
            }
        }
        (res, true)
    }

    /// `FIRST(prefix lookaheads)`
    pub(crate) fn get(&self, prefix: &[SymbolID], lookaheads: &TerminalSet) -> TerminalSet {
        let (mut res, nullable) = self.prefix(prefix);
        if nullable {
            res.union_with(lookaheads);
        }
        res
    }
}

/// Calculate the set of nullable symbols in this grammar.
fn nulls_set(grammar: &Grammar) -> Set<NonterminalID> {
    let mut nulls: Set<NonterminalID> = grammar
        .productions
        .values()
        .filter_map(|p| p.right.is_empty().then_some(p.left))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for p in grammar.productions.values() {
            if nulls.contains(&p.left) {
                continue;
            }
            let is_rhs_nullable = p
                .right
                .iter()
                .all(|symbol| matches!(symbol, SymbolID::N(n) if nulls.contains(n)));
            if is_rhs_nullable {
                changed = true;
                nulls.insert(p.left);
            }
        }
    }

    nulls
}
