//! Shared fixtures for the integration tests and benchmarks.

pub mod grammars;

use precgen::rules::{GrammarError, RuleGraph, RuleGraphDef};

/// A grammar fixture, as a function that fills a builder context.
pub type Fixture = fn(&mut RuleGraphDef) -> Result<(), GrammarError>;

pub fn define(name: &str, fixture: Fixture) -> RuleGraph {
    RuleGraph::define(name, fixture).expect("fixtures are well-formed")
}

/// Every fixture, by name.
pub const ALL: &[(&str, Fixture)] = &[
    (
        "precedence_on_single_child_negative",
        grammars::precedence_on_single_child_negative,
    ),
    ("arithmetic", grammars::arithmetic),
    ("comparison", grammars::comparison),
    ("statements", grammars::statements),
    ("dynamic", grammars::dynamic),
    ("min_caml", grammars::min_caml),
];
