//! LR(1) parse table generation for precedence-annotated rule graphs.
//!
//! A grammar is written as a graph of rules ([`rules`]), flattened into a
//! plain production set ([`expand`]), turned into an LR(1) automaton
//! ([`automaton`]) and finally into a parse table whose conflicts are
//! settled by precedence and associativity ([`table`]).

pub mod automaton;
pub mod config;
pub mod expand;
mod first_sets;
pub mod grammar;
pub mod rules;
pub mod table;
pub mod types;
pub mod util;

pub use crate::config::{Config, MergeMode, UndeclaredPrecedence};

use crate::{
    automaton::{Automaton, AutomatonError},
    grammar::Grammar,
    rules::{GrammarError, RuleGraph},
    table::{ParseTable, TableError},
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid grammar")]
    Grammar(
        #[from]
        #[source]
        GrammarError,
    ),

    #[error("error during automaton construction")]
    Automaton(
        #[from]
        #[source]
        AutomatonError,
    ),

    #[error("error during resolving conflicts")]
    Table(
        #[from]
        #[source]
        TableError,
    ),
}

/// The artifacts of a successful build.
#[derive(Debug)]
pub struct Generated {
    pub grammar: Grammar,
    pub automaton: Automaton,
    pub table: ParseTable,
}

/// Run the whole pipeline on a rule graph.
#[tracing::instrument(skip_all, fields(grammar = graph.name()))]
pub fn compute(graph: &RuleGraph, config: &Config) -> Result<Generated, BuildError> {
    let grammar = expand::expand(graph)?;
    let automaton = Automaton::generate(&grammar, config)?;
    let table = ParseTable::generate(&grammar, &automaton, config)?;
    tracing::debug!(
        "{} productions, {} states, {} conflict(s)",
        grammar.productions.len(),
        automaton.len(),
        table.conflicts.len()
    );
    Ok(Generated {
        grammar,
        automaton,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::*;
    use std::error::Error as _;

    #[test]
    fn errors_keep_their_source() {
        let graph = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let t = g.rule("t")?;
            g.define(s, t)?;
            Ok(())
        })
        .unwrap();
        let err = compute(&graph, &Config::new()).unwrap_err();
        assert!(matches!(err, BuildError::Grammar(..)));
        assert_eq!(err.to_string(), "invalid grammar");
        assert_eq!(
            err.source().unwrap().to_string(),
            "undefined symbol `t' (referenced from rule `s')"
        );
    }

    #[test]
    fn smoketest() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("precgen=trace")
            .try_init();

        let graph = RuleGraph::define("list", |g| {
            let list = g.rule("list")?;
            let item = g.rule("item")?;
            let lparen = g.string("(");
            let rparen = g.string(")");
            let comma = g.string(",");
            let word = g.pattern("[a-z]+");
            g.define(
                list,
                seq((lparen, choice((blank(), seq((item, repeat(seq((comma, item))))))), rparen)),
            )?;
            g.define(item, choice((word, list)))?;
            Ok(())
        })
        .unwrap();

        let canonical = compute(&graph, &Config::new()).unwrap();
        eprintln!("{}", canonical.grammar);
        eprintln!("{}", canonical.table.display(&canonical.grammar));
        assert!(canonical.table.conflicts.is_empty());

        let lalr = compute(&graph, Config::new().use_lalr()).unwrap();
        assert!(lalr.table.conflicts.is_empty());
        assert!(lalr.automaton.len() <= canonical.automaton.len());
    }
}
