mod grammar_json;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use precgen::{Config, UndeclaredPrecedence};
use std::{fs, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The path of the grammar description (`grammar.json`).
    input: PathBuf,

    /// How states with the same LR(0) core are identified.
    #[arg(long, value_enum, default_value_t = MergeModeArg::Canonical)]
    merge_mode: MergeModeArg,

    /// How candidates without a static precedence are compared.
    #[arg(long, value_enum, default_value_t = UndeclaredArg::Lowest)]
    undeclared: UndeclaredArg,

    /// Fail when a conflict is not settled by precedence.
    #[arg(long)]
    strict: bool,

    /// The maximum number of automaton states.
    #[arg(long, default_value_t = Config::DEFAULT_MAX_STATES)]
    max_states: usize,

    /// What to print.
    #[arg(long, value_enum, default_value_t = Emit::Conflicts)]
    emit: Emit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum MergeModeArg {
    Canonical,
    Lalr,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum UndeclaredArg {
    Lowest,
    Unordered,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Emit {
    Grammar,
    Automaton,
    Table,
    Conflicts,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::new();
        config
            .max_states(self.max_states)
            .strict(self.strict)
            .undeclared(match self.undeclared {
                UndeclaredArg::Lowest => UndeclaredPrecedence::Lowest,
                UndeclaredArg::Unordered => UndeclaredPrecedence::Unordered,
            });
        match self.merge_mode {
            MergeModeArg::Canonical => config.use_canonical(),
            MergeModeArg::Lalr => config.use_lalr(),
        };
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::trace!("CLI args = {:?}", args);

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let graph = grammar_json::parse(&text)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let config = args.config();
    let generated = precgen::compute(&graph, &config)
        .with_context(|| format!("failed to build the parse table for `{}'", graph.name()))?;
    let g = &generated.grammar;

    match args.emit {
        Emit::Grammar => print!("{}", g),
        Emit::Automaton => print!("{}", generated.automaton.display(g)),
        Emit::Table => print!("{}", generated.table.display(g)),
        Emit::Conflicts => {
            for conflict in &generated.table.conflicts {
                println!("{}", conflict.display(g));
            }
        }
    }

    let num_conflicts = generated.table.conflicts.len();
    if num_conflicts > 0 {
        let suffix = if num_conflicts == 1 { "" } else { "s" };
        eprintln!(
            "[warning] {} conflict{} not settled by precedence ({} states).",
            num_conflicts,
            suffix,
            generated.automaton.len()
        );
    } else {
        eprintln!(
            "[info] no conflicts left ({} states).",
            generated.automaton.len()
        );
    }

    Ok(())
}
