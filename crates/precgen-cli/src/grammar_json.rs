//! Loader for JSON grammar descriptions (`grammar.json`).

use anyhow::Context as _;
use indexmap::IndexMap;
use precgen::rules::{
    blank, choice, prec, prec_dynamic, prec_left, prec_right, repeat, repeat1, seq, Expr,
    GrammarError, RuleGraph, RuleGraphDef,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct GrammarJson {
    pub name: String,
    /// Rules in declaration order. The first one is the start rule.
    pub rules: IndexMap<String, RuleJson>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleJson {
    Blank,
    String { value: String },
    Pattern { value: String },
    Symbol { name: String },
    Seq { members: Vec<RuleJson> },
    Choice { members: Vec<RuleJson> },
    Repeat { content: Box<RuleJson> },
    Repeat1 { content: Box<RuleJson> },
    Prec { value: i32, content: Box<RuleJson> },
    PrecLeft { value: i32, content: Box<RuleJson> },
    PrecRight { value: i32, content: Box<RuleJson> },
    PrecDynamic { value: i32, content: Box<RuleJson> },
    // Field names do not take part in table construction.
    Field { content: Box<RuleJson> },
}

impl GrammarJson {
    pub fn into_rule_graph(self) -> Result<RuleGraph, GrammarError> {
        let graph = RuleGraph::define(&self.name, |g| {
            for name in self.rules.keys() {
                g.rule(name)?;
            }
            for (name, body) in &self.rules {
                let rule = g.rule(name)?;
                let body = lower(g, body)?;
                g.define(rule, body)?;
            }
            Ok(())
        })?;
        graph.validate()?;
        Ok(graph)
    }
}

fn lower(g: &mut RuleGraphDef, node: &RuleJson) -> Result<Expr, GrammarError> {
    let lower_all = |g: &mut RuleGraphDef, members: &[RuleJson]| {
        members
            .iter()
            .map(|member| lower(g, member))
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(match node {
        RuleJson::Blank => blank(),
        RuleJson::String { value } => g.string(value),
        RuleJson::Pattern { value } => g.pattern(value),
        RuleJson::Symbol { name } => g.rule(name)?.into(),
        RuleJson::Seq { members } => seq(lower_all(g, members)?),
        RuleJson::Choice { members } => choice(lower_all(g, members)?),
        RuleJson::Repeat { content } => repeat(lower(g, content)?),
        RuleJson::Repeat1 { content } => repeat1(lower(g, content)?),
        RuleJson::Prec { value, content } => prec(*value, lower(g, content)?),
        RuleJson::PrecLeft { value, content } => prec_left(*value, lower(g, content)?),
        RuleJson::PrecRight { value, content } => prec_right(*value, lower(g, content)?),
        RuleJson::PrecDynamic { value, content } => prec_dynamic(*value, lower(g, content)?),
        RuleJson::Field { content } => lower(g, content)?,
    })
}

/// Parse a grammar description into a rule graph.
pub fn parse(text: &str) -> anyhow::Result<RuleGraph> {
    let json: GrammarJson =
        serde_json::from_str(text).context("failed to parse the grammar description")?;
    let name = json.name.clone();
    json.into_rule_graph()
        .with_context(|| format!("invalid grammar `{}'", name))
}
