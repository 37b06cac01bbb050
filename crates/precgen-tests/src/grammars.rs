//! Grammar definitions for integration tests.

use precgen::rules::{
    blank, choice, prec, prec_dynamic, prec_left, prec_right, repeat, repeat1, seq, Expr,
    GrammarError, RuleGraphDef,
};

/// Precedence on a rule whose alternatives are single references.
pub fn precedence_on_single_child_negative(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
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
}

pub fn arithmetic(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
    let expr = g.rule("expr")?;
    let number = g.rule("number")?;

    let plus = g.string("+");
    let minus = g.string("-");
    let star = g.string("*");
    let slash = g.string("/");
    let caret = g.string("^");
    let lparen = g.string("(");
    let rparen = g.string(")");
    let digits = g.pattern("[0-9]+");

    g.define(
        expr,
        choice((
            prec_left(1, seq((expr, plus, expr))),          // expr '+' expr
            prec_left(1, seq((expr, minus.clone(), expr))), // expr '-' expr
            prec_left(2, seq((expr, star, expr))),          // expr '*' expr
            prec_left(2, seq((expr, slash, expr))),         // expr '/' expr
            prec_right(3, seq((expr, caret, expr))),        // expr '^' expr
            prec(4, seq((minus, expr))),                    // '-' expr
            seq((lparen, expr, rparen)),                    // '(' expr ')'
            number,
        )),
    )?;
    g.define(number, digits)?;
    Ok(())
}

/// Non-associative comparison, `a == b == c` is a conflict.
pub fn comparison(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
    let expr = g.rule("expr")?;
    let number = g.rule("number")?;

    let eq = g.string("==");
    let plus = g.string("+");
    let digits = g.pattern("[0-9]+");

    g.define(
        expr,
        choice((
            prec(1, seq((expr, eq, expr))),
            prec_left(2, seq((expr, plus, expr))),
            number,
        )),
    )?;
    g.define(number, digits)?;
    Ok(())
}

pub fn statements(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
    let program = g.rule("program")?;
    let statement = g.rule("statement")?;
    let block = g.rule("block")?;
    let arguments = g.rule("arguments")?;
    let identifier = g.rule("identifier")?;

    let semicolon = g.string(";");
    let equal = g.string("=");
    let comma = g.string(",");
    let lparen = g.string("(");
    let rparen = g.string(")");
    let lbrace = g.string("{");
    let rbrace = g.string("}");
    let ident = g.pattern("[a-z_]+");

    g.define(program, repeat(statement))?;
    g.define(
        statement,
        choice((
            seq((identifier, equal, identifier, semicolon.clone())),
            seq((identifier, arguments, semicolon)),
            block,
        )),
    )?;
    g.define(block, seq((lbrace, repeat1(statement), rbrace)))?;
    g.define(
        arguments,
        seq((
            lparen,
            choice((blank(), seq((identifier, repeat(seq((comma, identifier))))))),
            rparen,
        )),
    )?;
    g.define(identifier, ident)?;
    Ok(())
}

/// Ambiguities that are left to the parser at runtime.
pub fn dynamic(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
    let expr = g.rule("expr")?;
    let call = g.rule("call")?;
    let cast = g.rule("cast")?;
    let identifier = g.rule("identifier")?;

    let lparen = g.string("(");
    let rparen = g.string(")");
    let ident = g.pattern("[a-z]+");

    g.define(expr, choice((call, cast, identifier)))?;
    g.define(
        call,
        prec_dynamic(1, seq((expr, lparen.clone(), expr, rparen.clone()))),
    )?;
    g.define(
        cast,
        prec_dynamic(2, seq((lparen, identifier, rparen, expr))),
    )?;
    g.define(identifier, ident)?;
    Ok(())
}

/// Expressions of MinCaml, with the operator layers written as precedences.
pub fn min_caml(g: &mut RuleGraphDef) -> Result<(), GrammarError> {
    let exp = g.rule("exp")?;
    let simple_exp = g.rule("simple_exp")?;
    let fundef = g.rule("fundef")?;
    let pat = g.rule("pat")?;
    let ident = g.rule("ident")?;

    let l_paren = g.string("(");
    let r_paren = g.string(")");
    let t_true = g.string("true");
    let t_false = g.string("false");
    let t_not = g.string("not");
    let plus = g.string("+");
    let plus_dot = g.string("+.");
    let minus = g.string("-");
    let minus_dot = g.string("-.");
    let star_dot = g.string("*.");
    let slash_dot = g.string("/.");
    let equal = g.string("=");
    let less_greater = g.string("<>");
    let less = g.string("<");
    let greater = g.string(">");
    let less_equal = g.string("<=");
    let greater_equal = g.string(">=");
    let less_minus = g.string("<-");
    let comma = g.string(",");
    let semicolon = g.string(";");
    let t_if = g.string("if");
    let t_then = g.string("then");
    let t_else = g.string("else");
    let t_let = g.string("let");
    let t_rec = g.string("rec");
    let t_in = g.string("in");
    let array_make = g.string("Array.make");
    let dot = g.string(".");
    let integer = g.pattern("[0-9]+");
    let float = g.pattern("[0-9]+\\.[0-9]*");
    let identifier = g.pattern("[a-z][a-zA-Z0-9_]*");

    g.define(
        simple_exp,
        choice((
            seq((l_paren.clone(), exp, r_paren.clone())),
            seq((l_paren.clone(), r_paren.clone())),
            t_true,
            t_false,
            integer,
            float,
            ident,
            seq((simple_exp, dot.clone(), l_paren.clone(), exp, r_paren.clone())),
        )),
    )?;

    let binary = |level: i32, op: Expr| prec_left(level, seq((exp, op, exp)));
    g.define(
        exp,
        choice(vec![
            Expr::from(simple_exp),
            prec(8, seq((t_not, exp))),
            prec(7, seq((minus.clone(), exp))),
            prec(7, seq((minus_dot.clone(), exp))),
            // function application
            prec_left(9, seq((simple_exp, repeat1(simple_exp)))),
            prec_left(9, seq((array_make, simple_exp, simple_exp))),
            binary(6, star_dot),
            binary(6, slash_dot),
            binary(5, plus),
            binary(5, minus),
            binary(5, plus_dot),
            binary(5, minus_dot),
            binary(4, equal.clone()),
            binary(4, less_greater),
            binary(4, less),
            binary(4, greater),
            binary(4, less_equal),
            binary(4, greater_equal),
            // tuples
            prec_left(3, seq((exp, repeat1(seq((comma.clone(), exp)))))),
            // array update
            prec_right(
                2,
                seq((
                    simple_exp,
                    dot,
                    l_paren.clone(),
                    exp,
                    r_paren.clone(),
                    less_minus,
                    exp,
                )),
            ),
            prec_right(1, seq((t_if, exp, t_then, exp, t_else, exp))),
            prec_right(0, seq((exp, semicolon, exp))),
            prec_right(
                -1,
                choice((
                    seq((t_let.clone(), ident, equal.clone(), exp, t_in.clone(), exp)),
                    seq((t_let.clone(), t_rec, fundef, t_in.clone(), exp)),
                    seq((t_let, l_paren, pat, r_paren, equal.clone(), exp, t_in, exp)),
                )),
            ),
        ]),
    )?;

    g.define(fundef, seq((ident, repeat1(ident), equal, exp)))?;
    g.define(pat, seq((ident, repeat1(seq((comma, ident))))))?;
    g.define(ident, identifier)?;
    Ok(())
}
