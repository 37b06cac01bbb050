//! Expansion of a rule graph into a flat set of context-free productions.
//!
//! Each rule body is rewritten into an ordered list of alternatives, i.e.
//! plain sequences of symbols. `choice` and `seq` are flattened in
//! declaration order, every repetition gets a fresh left-recursive helper
//! nonterminal, and precedence annotations are attached to the alternatives
//! they enclose.
//!
//! A precedence annotation only ever describes the production edge it
//! wraps. Wrapping a single reference `prec(p, B)` produces the alternative
//! `A -> B` carrying `p`, while the productions of `B` are expanded from
//! `B`'s own body and stay untouched. Other call sites of `B` therefore
//! never see `p`.

use crate::{
    grammar::{
        Grammar, GrammarDef, NonterminalID, NonterminalKind, Precedence, ProductionOrigin,
        SymbolID, TerminalData, TerminalID, MAX_IDS,
    },
    rules::{Expr, GrammarError, Prec, RuleGraph, RuleId},
};

/// Expand the rule graph into the production set.
#[tracing::instrument(skip_all, fields(grammar = graph.name()))]
pub fn expand(graph: &RuleGraph) -> Result<Grammar, GrammarError> {
    graph.validate()?;

    let mut def = GrammarDef::new(graph.name());

    let terminals = graph
        .terminals()
        .map(|(_, t)| def.terminal(TerminalData::anonymous(t.kind(), t.value())))
        .collect::<Result<Vec<TerminalID>, _>>()?;

    // Lexical rules name their terminal, the other rules become nonterminals.
    let mut symbols = Vec::with_capacity(graph.rules().count());
    for (id, rule) in graph.rules() {
        let symbol = match graph.lexical_terminal(id) {
            Some(t) => {
                let terminal = terminals[t.index()];
                let data = def.terminal_mut(terminal);
                if data.rule.is_none() {
                    data.name = rule.name.clone();
                    data.rule = Some(id);
                }
                SymbolID::T(terminal)
            }
            None => SymbolID::N(def.nonterminal(rule.name.clone(), NonterminalKind::Rule(id))?),
        };
        symbols.push(symbol);
    }

    if let Some(SymbolID::N(start)) = graph
        .start_rule()
        .and_then(|start| symbols.get(start.index()))
    {
        def.start_symbol(*start);
    }

    let mut expander = Expander {
        graph,
        def: &mut def,
        terminals,
        symbols,
        helpers: vec![],
    };

    let mut pending = vec![];
    for (id, rule) in graph.rules() {
        let SymbolID::N(left) = expander.symbols[id.index()] else {
            continue;
        };
        let Some(body) = &rule.body else {
            continue;
        };
        let mut cx = RuleContext {
            rule: id,
            next_repeat: 0,
        };
        let alternatives = expander.expand(body, &mut cx)?;
        tracing::trace!("rule `{}': {} alternative(s)", rule.name, alternatives.len());
        pending.push((left, id, alternatives));
    }
    let mut helpers = std::mem::take(&mut expander.helpers);

    for (left, rule, alternatives) in pending {
        for (i, alternative) in alternatives.into_iter().enumerate() {
            let (right, precedence, dynamic) = alternative.finish(&graph.rule_name(rule), i)?;
            def.production(
                left,
                right,
                precedence,
                dynamic,
                ProductionOrigin::Rule {
                    rule,
                    alternative: i,
                },
            )?;
        }
    }

    // Helpers go after every rule production, in the order they were
    // allocated, so that production IDs only depend on declaration order.
    helpers.sort_by_key(|helper| helper.left);
    for helper in helpers {
        for (i, alternative) in helper.alternatives.into_iter().enumerate() {
            let (right, precedence, dynamic) = alternative.finish(&helper.name, i)?;
            def.production(
                helper.left,
                right,
                precedence,
                dynamic,
                ProductionOrigin::Repeat {
                    rule: helper.rule,
                    ordinal: helper.ordinal,
                    alternative: i,
                },
            )?;
        }
    }

    let grammar = def.end();
    tracing::debug!(
        "expanded into {} terminals, {} nonterminals and {} productions",
        grammar.terminals.len(),
        grammar.nonterminals.len(),
        grammar.productions.len()
    );
    Ok(grammar)
}

struct Expander<'a> {
    graph: &'a RuleGraph,
    def: &'a mut GrammarDef,
    terminals: Vec<TerminalID>,
    symbols: Vec<SymbolID>,
    helpers: Vec<Helper>,
}

struct RuleContext {
    rule: RuleId,
    next_repeat: u16,
}

struct Helper {
    left: NonterminalID,
    name: String,
    rule: RuleId,
    ordinal: u16,
    alternatives: Vec<Alternative>,
}

impl Expander<'_> {
    fn expand(
        &mut self,
        expr: &Expr,
        cx: &mut RuleContext,
    ) -> Result<Vec<Alternative>, GrammarError> {
        Ok(match expr {
            Expr::Blank => vec![Alternative::default()],
            Expr::Terminal(t) => {
                let terminal = self.terminals[t.index()];
                vec![Alternative::symbol(SymbolID::T(terminal))]
            }
            Expr::Symbol(r) => {
                vec![Alternative::symbol(self.symbols[r.index()])]
            }
            Expr::Seq(members) => {
                let mut alternatives = vec![Alternative::default()];
                for member in members {
                    let suffixes = self.expand(member, cx)?;
                    check_count(alternatives.len().saturating_mul(suffixes.len()))?;
                    alternatives = alternatives
                        .iter()
                        .flat_map(|prefix| suffixes.iter().map(move |suffix| prefix.concat(suffix)))
                        .collect();
                }
                alternatives
            }
            Expr::Choice(members) => {
                let mut alternatives = vec![];
                for member in members {
                    alternatives.extend(self.expand(member, cx)?);
                    check_count(alternatives.len())?;
                }
                alternatives
            }
            Expr::Repeat(content) => self.repeat(content, false, cx)?,
            Expr::Repeat1(content) => self.repeat(content, true, cx)?,
            Expr::Prec(prec, content) => {
                let mut alternatives = self.expand(content, cx)?;
                for alternative in &mut alternatives {
                    alternative.annotate(*prec);
                }
                alternatives
            }
        })
    }

    /// `repeat(e)`  => H -> H e | ε
    /// `repeat1(e)` => H -> H e | e
    fn repeat(
        &mut self,
        content: &Expr,
        at_least_once: bool,
        cx: &mut RuleContext,
    ) -> Result<Vec<Alternative>, GrammarError> {
        let ordinal = cx.next_repeat;
        cx.next_repeat = ordinal.checked_add(1).ok_or(GrammarError::TooLarge {
            what: "nonterminals",
            limit: MAX_IDS,
        })?;

        let rule_name = self.graph.rule_name(cx.rule);
        let name = format!("{}_repeat{}", rule_name, ordinal + 1);
        if self.graph.rules().any(|(_, rule)| rule.name == name) {
            return Err(GrammarError::HelperNameClash {
                name,
                rule: rule_name,
            });
        }
        let left = self.def.nonterminal(
            name.clone(),
            NonterminalKind::Repeat {
                rule: cx.rule,
                ordinal,
            },
        )?;

        let body = self.expand(content, cx)?;
        let recursive = Alternative::symbol(SymbolID::N(left));
        let mut alternatives: Vec<_> = body.iter().map(|alt| recursive.concat(alt)).collect();
        if at_least_once {
            alternatives.extend(body);
        } else {
            alternatives.push(Alternative::default());
        }

        self.helpers.push(Helper {
            left,
            name,
            rule: cx.rule,
            ordinal,
            alternatives,
        });

        Ok(vec![Alternative::symbol(SymbolID::N(left))])
    }
}

/// Fail before materializing more alternatives than there are production IDs.
fn check_count(count: usize) -> Result<(), GrammarError> {
    if count > MAX_IDS {
        return Err(GrammarError::TooLarge {
            what: "productions",
            limit: MAX_IDS,
        });
    }
    Ok(())
}

/// A partially expanded alternative.
#[derive(Debug, Clone, Default)]
struct Alternative {
    symbols: Vec<SymbolID>,
    precedence: Option<Precedence>,
    dynamic: Option<i32>,
    conflict: Option<(String, String)>,
}

impl Alternative {
    fn symbol(symbol: SymbolID) -> Self {
        Self {
            symbols: vec![symbol],
            ..Default::default()
        }
    }

    fn annotate(&mut self, prec: Prec) {
        if prec.dynamic {
            self.merge_dynamic(prec.level);
        } else {
            self.merge_precedence(Precedence::new(prec.level, prec.assoc));
        }
    }

    fn concat(&self, other: &Alternative) -> Alternative {
        let mut merged = self.clone();
        merged.symbols.extend_from_slice(&other.symbols);
        if let Some(p) = other.precedence {
            merged.merge_precedence(p);
        }
        if let Some(level) = other.dynamic {
            merged.merge_dynamic(level);
        }
        if merged.conflict.is_none() {
            merged.conflict = other.conflict.clone();
        }
        merged
    }

    fn merge_precedence(&mut self, p: Precedence) {
        match self.precedence {
            None => self.precedence = Some(p),
            Some(q) if q == p => (),
            Some(q) => self.record_conflict(q.to_string(), p.to_string()),
        }
    }

    fn merge_dynamic(&mut self, level: i32) {
        match self.dynamic {
            None => self.dynamic = Some(level),
            Some(l) if l == level => (),
            Some(l) => self.record_conflict(format!("dynamic {}", l), format!("dynamic {}", level)),
        }
    }

    fn record_conflict(&mut self, first: String, second: String) {
        if self.conflict.is_none() {
            self.conflict = Some((first, second));
        }
    }

    #[allow(clippy::type_complexity)]
    fn finish(
        self,
        rule: &str,
        alternative: usize,
    ) -> Result<(Vec<SymbolID>, Option<Precedence>, Option<i32>), GrammarError> {
        if let Some((first, second)) = self.conflict {
            return Err(GrammarError::AmbiguousPrecedence {
                rule: rule.to_owned(),
                alternative,
                first,
                second,
            });
        }
        Ok((self.symbols, self.precedence, self.dynamic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grammar::{Assoc, Production},
        rules::*,
    };

    fn single_child_negative() -> RuleGraph {
        RuleGraph::define("precedence_on_single_child_negative", |g| {
            let expression = g.rule("expression")?;
            let function_call = g.rule("function_call")?;
            let block = g.rule("block")?;
            let identifier = g.rule("identifier")?;
            let lbrace = g.string("{");
            let rbrace = g.string("}");
            let ident = g.pattern("[a-zA-Z]+");

            g.define(expression, choice((function_call, identifier)))?;
            g.define(
                function_call,
                prec_right(
                    -1,
                    choice((
                        seq((identifier, expression)),
                        seq((identifier, block)),
                        seq((identifier, expression, block)),
                    )),
                ),
            )?;
            g.define(block, seq((lbrace, expression, rbrace)))?;
            g.define(identifier, ident)?;
            Ok(())
        })
        .unwrap()
    }

    fn rendered(g: &Grammar) -> Vec<String> {
        g.productions
            .values()
            .map(|p| match p.precedence {
                Some(prec) => format!("{} ({})", p.display(g), prec),
                None => p.display(g).to_string(),
            })
            .collect()
    }

    #[test]
    fn precedence_stays_on_wrapped_alternatives() {
        let g = expand(&single_child_negative()).unwrap();
        eprintln!("{}", g);
        assert_eq!(
            rendered(&g),
            [
                "$start -> expression",
                "expression -> function_call",
                "expression -> identifier",
                "function_call -> identifier expression (prec -1, right)",
                "function_call -> identifier block (prec -1, right)",
                "function_call -> identifier expression block (prec -1, right)",
                "block -> '{' expression '}'",
            ]
        );
    }

    #[test]
    fn single_child_pass_through_does_not_leak() {
        let graph = RuleGraph::define("g", |g| {
            let top = g.rule("top")?;
            let wrapped = g.rule("wrapped")?;
            let plain = g.rule("plain")?;
            let inner = g.rule("inner")?;
            let x = g.string("x");
            let y = g.string("y");
            g.define(top, choice((wrapped, plain)))?;
            g.define(wrapped, prec_left(5, inner))?;
            g.define(plain, seq((inner, x.clone())))?;
            g.define(inner, choice((x, seq((y.clone(), y)))))?;
            Ok(())
        })
        .unwrap();
        let g = expand(&graph).unwrap();

        let by_left = |name: &str| -> Vec<&Production> {
            g.productions
                .values()
                .filter(|p| g.nonterminals[&p.left].name == name)
                .collect()
        };
        let wrapped = by_left("wrapped");
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].precedence, Some(Precedence::new(5, Assoc::Left)));
        assert!(by_left("inner").iter().all(|p| p.precedence.is_none()));
        assert!(by_left("plain").iter().all(|p| p.precedence.is_none()));
        assert!(by_left("top").iter().all(|p| p.precedence.is_none()));
    }

    #[test]
    fn precedence_on_multi_symbol_alternative() {
        let graph = RuleGraph::define("g", |g| {
            let expr = g.rule("expr")?;
            let num = g.rule("num")?;
            let plus = g.string("+");
            let digits = g.pattern("[0-9]+");
            g.define(expr, choice((prec_left(1, seq((expr, plus, expr))), num)))?;
            g.define(num, digits)?;
            Ok(())
        })
        .unwrap();
        let g = expand(&graph).unwrap();
        assert_eq!(
            rendered(&g),
            [
                "$start -> expr",
                "expr -> expr '+' expr (prec 1, left)",
                "expr -> num",
            ]
        );
    }

    #[test]
    fn repeats_use_left_recursive_helpers() {
        let graph = RuleGraph::define("g", |g| {
            let list = g.rule("list")?;
            let lbracket = g.string("[");
            let rbracket = g.string("]");
            let comma = g.string(",");
            let item = g.string("x");
            g.define(
                list,
                seq((
                    lbracket,
                    repeat(seq((comma, item.clone()))),
                    repeat1(item),
                    rbracket,
                )),
            )?;
            Ok(())
        })
        .unwrap();
        let g = expand(&graph).unwrap();
        assert_eq!(
            rendered(&g),
            [
                "$start -> list",
                "list -> '[' list_repeat1 list_repeat2 ']'",
                "list_repeat1 -> list_repeat1 ',' 'x'",
                "list_repeat1 -> ε",
                "list_repeat2 -> list_repeat2 'x'",
                "list_repeat2 -> 'x'",
            ]
        );

        let origins: Vec<_> = g.productions.values().map(|p| p.origin).collect();
        let list = RuleId::from_raw(0);
        assert_eq!(
            origins[1..],
            [
                ProductionOrigin::Rule {
                    rule: list,
                    alternative: 0
                },
                ProductionOrigin::Repeat {
                    rule: list,
                    ordinal: 0,
                    alternative: 0
                },
                ProductionOrigin::Repeat {
                    rule: list,
                    ordinal: 0,
                    alternative: 1
                },
                ProductionOrigin::Repeat {
                    rule: list,
                    ordinal: 1,
                    alternative: 0
                },
                ProductionOrigin::Repeat {
                    rule: list,
                    ordinal: 1,
                    alternative: 1
                },
            ]
        );
    }

    #[test]
    fn choices_inside_sequences_multiply_out_in_order() {
        let graph = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let a = g.string("a");
            let b = g.string("b");
            let c = g.string("c");
            g.define(s, seq((choice((a, blank())), choice((b, c)))))?;
            Ok(())
        })
        .unwrap();
        let g = expand(&graph).unwrap();
        assert_eq!(
            rendered(&g)[1..],
            ["s -> 'a' 'b'", "s -> 'a' 'c'", "s -> 'b'", "s -> 'c'"]
        );
    }

    #[test]
    fn conflicting_annotations_are_rejected() {
        let nested = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let a = g.string("a");
            let b = g.string("b");
            g.define(s, choice((b, prec(1, prec_left(2, a)))))?;
            Ok(())
        })
        .unwrap();
        let err = expand(&nested).unwrap_err();
        assert!(matches!(
            &err,
            GrammarError::AmbiguousPrecedence { rule, alternative: 1, .. } if rule == "s"
        ));
        assert_eq!(
            err.to_string(),
            "conflicting precedence annotations (prec 2, left) and (prec 1, nonassoc) \
             in rule `s', alternative #1"
        );

        let in_seq = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let a = g.string("a");
            let b = g.string("b");
            g.define(s, seq((prec_dynamic(1, a), prec_dynamic(2, b))))?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            expand(&in_seq),
            Err(GrammarError::AmbiguousPrecedence { .. })
        ));

        let agreeing = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let a = g.string("a");
            let b = g.string("b");
            g.define(s, seq((prec_left(1, a), prec_left(1, b))))?;
            Ok(())
        })
        .unwrap();
        let g = expand(&agreeing).unwrap();
        assert_eq!(rendered(&g)[1], "s -> 'a' 'b' (prec 1, left)");
    }

    #[test]
    fn undefined_symbols_fail_expansion() {
        let graph = RuleGraph::define("g", |g| {
            let s = g.rule("s")?;
            let t = g.rule("t")?;
            g.define(s, t)?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            expand(&graph),
            Err(GrammarError::UndefinedSymbol { name, .. }) if name == "t"
        ));
    }

    #[test]
    fn reexpansion_is_a_no_op() {
        let graph = RuleGraph::define("g", |g| {
            let program = g.rule("program")?;
            let ident = g.rule("ident")?;
            let stmt = g.rule("stmt")?;
            let semi = g.string(";");
            let eq = g.string("=");
            let name = g.pattern("[a-z]+");
            g.define(program, repeat(seq((stmt, semi))))?;
            g.define(ident, name)?;
            g.define(
                stmt,
                choice((
                    prec_dynamic(2, prec_right(1, seq((ident, eq.clone(), stmt)))),
                    ident,
                    repeat1(eq),
                )),
            )?;
            Ok(())
        })
        .unwrap();

        let once = expand(&graph).unwrap();
        let lifted = RuleGraph::from_grammar(&once);
        let twice = expand(&lifted).unwrap();

        assert_eq!(once.to_string(), twice.to_string());
        let tokens = |g: &Grammar| -> Vec<(String, String)> {
            g.terminals
                .values()
                .map(|t| (t.name.clone(), t.value.clone()))
                .collect()
        };
        assert_eq!(tokens(&once), tokens(&twice));
        assert_eq!(once.productions.len(), twice.productions.len());
        for ((id1, p1), (id2, p2)) in once.productions.iter().zip(&twice.productions) {
            assert_eq!(id1, id2);
            assert!(p1.same_shape(p2), "{:?} != {:?}", p1, p2);
        }

        let names = |g: &Grammar| -> Vec<String> {
            g.nonterminals.values().map(|n| n.name.clone()).collect()
        };
        assert_eq!(names(&once), names(&twice));
    }

    #[test]
    fn every_production_is_traceable() {
        let graph = single_child_negative();
        let g = expand(&graph).unwrap();
        for (id, p) in &g.productions {
            match p.origin {
                ProductionOrigin::Accept => assert_eq!(*id, crate::grammar::ProductionID::ACCEPT),
                ProductionOrigin::Rule { rule, alternative } => {
                    let data = graph.rule(rule).unwrap();
                    assert_eq!(g.nonterminals[&p.left].name, data.name);
                    assert!(alternative < 3);
                }
                ProductionOrigin::Repeat { .. } => unreachable!(),
            }
        }
        let origins: Vec<_> = g
            .productions
            .keys()
            .filter(|id| g.production(**id).origin != ProductionOrigin::Accept)
            .map(|id| g.origin(*id).to_string())
            .collect();
        assert_eq!(
            origins,
            [
                "expression, alternative #0",
                "expression, alternative #1",
                "function_call, alternative #0",
                "function_call, alternative #1",
                "function_call, alternative #2",
                "block, alternative #0",
            ]
        );
    }

    #[test]
    fn oversized_expansion_is_rejected() {
        // 2^16 alternatives do not fit in the production ID space.
        let graph = RuleGraph::define("wide", |g| {
            let s = g.rule("s")?;
            let members: Vec<Expr> = (0..16)
                .map(|i| choice((g.string(&format!("t{}", i)), blank())))
                .collect();
            g.define(s, seq(members))
        })
        .unwrap();
        let err = expand(&graph).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::TooLarge {
                what: "productions",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "the grammar needs more than 65534 productions"
        );
    }

    #[test]
    fn helper_names_must_not_shadow_rules() {
        let graph = RuleGraph::define("g", |g| {
            let list = g.rule("list")?;
            let item = g.rule("list_repeat1")?;
            let x = g.string("x");
            g.define(list, repeat(item))?;
            g.define(item, seq((x,)))
        })
        .unwrap();
        let err = expand(&graph).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the rule `list_repeat1' has the same name as a repetition helper of rule `list'"
        );
    }
}
