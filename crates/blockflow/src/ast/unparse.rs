//! Emit source text from the syntax tree.
//!
//! The output is a normal form: parsing it yields a tree equal to the one
//! that was unparsed. Parentheses are inserted only where precedence needs
//! them, statements are indented by four spaces per level and no line
//! carries trailing whitespace.

use std::fmt::Write as _;

use super::node::*;

const INDENT: &str = "    ";

// Binding strength, weakest first.
const PREC_TUPLE: u8 = 0;
const PREC_TEST: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_CMP: u8 = 5;
const PREC_ARITH: u8 = 6;
const PREC_TERM: u8 = 7;
const PREC_UNARY: u8 = 8;
const PREC_POWER: u8 = 9;
const PREC_POSTFIX: u8 = 10;
const PREC_ATOM: u8 = 11;

/// Unparse a whole module. Every line ends with a newline.
pub fn unparse(module: &Module) -> String {
    let mut out = String::new();
    write_block(&mut out, &module.body, 0);
    out
}

/// Unparse a single statement without a trailing newline.
pub fn unparse_stmt(stmt: &Stmt) -> String {
    let mut out = String::new();
    write_stmt(&mut out, stmt, 0);
    out.truncate(out.trim_end_matches('\n').len());
    out
}

/// Unparse a sequence of statements at the given nesting depth.
pub fn unparse_block(stmts: &[Stmt], depth: usize) -> String {
    let mut out = String::new();
    write_block(&mut out, stmts, depth);
    out
}

/// Unparse an expression as it would appear on the right of `=`.
pub fn unparse_expr(expr: &Expr) -> String {
    expr_at(expr, PREC_TUPLE)
}

// ═══════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════

fn write_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    if stmts.is_empty() {
        line(out, depth, "pass");
        return;
    }
    for stmt in stmts {
        write_stmt(out, stmt, depth);
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match &stmt.kind {
        StmtKind::Import(names) => {
            let names: Vec<String> = names.iter().map(alias).collect();
            line(out, depth, &format!("import {}", names.join(", ")));
        }
        StmtKind::ImportFrom {
            module,
            names,
            star,
        } => {
            let imported = if *star {
                "*".to_string()
            } else {
                names.iter().map(alias).collect::<Vec<_>>().join(", ")
            };
            line(out, depth, &format!("from {} import {}", module, imported));
        }
        StmtKind::FunctionDef(def) => {
            line(
                out,
                depth,
                &format!("def {}({}):", def.name, parameters(&def.args)),
            );
            write_block(out, &def.body, depth + 1);
        }
        StmtKind::Return(None) => line(out, depth, "return"),
        StmtKind::Return(Some(value)) => {
            line(out, depth, &format!("return {}", expr_at(value, PREC_TUPLE)))
        }
        StmtKind::Assign { targets, value } => {
            let mut text = String::new();
            for target in targets {
                let _ = write!(text, "{} = ", expr_at(target, PREC_TUPLE));
            }
            text.push_str(&expr_at(value, PREC_TUPLE));
            line(out, depth, &text);
        }
        StmtKind::AugAssign { target, op, value } => line(
            out,
            depth,
            &format!(
                "{} {}= {}",
                expr_at(target, PREC_TUPLE),
                op.symbol(),
                expr_at(value, PREC_TUPLE)
            ),
        ),
        StmtKind::For { target, iter, body } => {
            line(
                out,
                depth,
                &format!(
                    "for {} in {}:",
                    loop_target(target),
                    expr_at(iter, PREC_TUPLE)
                ),
            );
            write_block(out, body, depth + 1);
        }
        StmtKind::While { test, body } => {
            line(out, depth, &format!("while {}:", expr_at(test, PREC_TEST)));
            write_block(out, body, depth + 1);
        }
        StmtKind::If { test, body, orelse } => {
            line(out, depth, &format!("if {}:", expr_at(test, PREC_TEST)));
            write_block(out, body, depth + 1);
            write_orelse(out, orelse, depth);
        }
        StmtKind::Expr(expr) => line(out, depth, &expr_at(expr, PREC_TUPLE)),
        StmtKind::Pass => line(out, depth, "pass"),
        StmtKind::Break => line(out, depth, "break"),
        StmtKind::Continue => line(out, depth, "continue"),
    }
}

fn write_orelse(out: &mut String, orelse: &[Stmt], depth: usize) {
    match orelse {
        [] => {}
        [Stmt {
            kind: StmtKind::If { test, body, orelse },
            ..
        }] => {
            line(out, depth, &format!("elif {}:", expr_at(test, PREC_TEST)));
            write_block(out, body, depth + 1);
            write_orelse(out, orelse, depth);
        }
        _ => {
            line(out, depth, "else:");
            write_block(out, orelse, depth + 1);
        }
    }
}

fn alias(alias: &Alias) -> String {
    match &alias.asname {
        Some(asname) => format!("{} as {}", alias.name, asname),
        None => alias.name.clone(),
    }
}

/// Render a parameter list (without the surrounding parentheses).
pub fn parameters(args: &Arguments) -> String {
    let mut parts: Vec<String> = args
        .params
        .iter()
        .map(|param| {
            let target = param_target(&param.target);
            match &param.default {
                Some(default) => format!("{}={}", target, expr_at(default, PREC_TEST)),
                None => target,
            }
        })
        .collect();
    if let Some(vararg) = &args.vararg {
        parts.push(format!("*{}", vararg));
    }
    if let Some(kwarg) = &args.kwarg {
        parts.push(format!("**{}", kwarg));
    }
    parts.join(", ")
}

fn param_target(target: &ParamTarget) -> String {
    match target {
        ParamTarget::Name(name) => name.clone(),
        ParamTarget::Tuple(items) => {
            let items: Vec<String> = items.iter().map(param_target).collect();
            format!("({})", items.join(", "))
        }
    }
}

/// Loop targets are parsed at arithmetic level, item by item.
fn loop_target(target: &Expr) -> String {
    match target {
        Expr::Tuple(items) if !items.is_empty() => tuple_items(items, PREC_ARITH),
        other => expr_at(other, PREC_ARITH),
    }
}

fn tuple_items(items: &[Expr], prec: u8) -> String {
    let rendered: Vec<String> = items.iter().map(|i| expr_at(i, prec)).collect();
    if rendered.len() == 1 {
        format!("{},", rendered[0])
    } else {
        rendered.join(", ")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Tuple(items) if !items.is_empty() => PREC_TUPLE,
        Expr::IfExp { .. } => PREC_TEST,
        Expr::BoolOp { op: BoolOp::Or, .. } => PREC_OR,
        Expr::BoolOp {
            op: BoolOp::And, ..
        } => PREC_AND,
        Expr::UnaryOp {
            op: UnaryOp::Not, ..
        } => PREC_NOT,
        Expr::Compare { .. } => PREC_CMP,
        Expr::BinOp {
            op: BinOp::Add | BinOp::Sub,
            ..
        } => PREC_ARITH,
        Expr::BinOp { op: BinOp::Pow, .. } => PREC_POWER,
        Expr::BinOp { .. } => PREC_TERM,
        Expr::UnaryOp { .. } => PREC_UNARY,
        Expr::Constant(Constant::Int(n)) if *n < 0 => PREC_UNARY,
        Expr::Constant(Constant::Float(f)) if f.is_sign_negative() && f.is_finite() => PREC_UNARY,
        Expr::Call { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => PREC_POSTFIX,
        _ => PREC_ATOM,
    }
}

fn expr_at(expr: &Expr, min: u8) -> String {
    let text = render(expr);
    if precedence(expr) < min {
        format!("({})", text)
    } else {
        text
    }
}

fn render(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.clone(),
        Expr::Constant(constant) => render_constant(constant),
        Expr::Tuple(items) if items.is_empty() => "()".to_string(),
        Expr::Tuple(items) => tuple_items(items, PREC_TEST),
        Expr::List(items) => {
            let items: Vec<String> = items.iter().map(|i| expr_at(i, PREC_TEST)).collect();
            format!("[{}]", items.join(", "))
        }
        Expr::Dict(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", expr_at(k, PREC_TEST), expr_at(v, PREC_TEST)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Expr::BinOp { left, op, right } => {
            let (lp, rp) = match op {
                BinOp::Pow => (PREC_POSTFIX, PREC_UNARY),
                BinOp::Add | BinOp::Sub => (PREC_ARITH, PREC_ARITH + 1),
                _ => (PREC_TERM, PREC_TERM + 1),
            };
            format!(
                "{} {} {}",
                expr_at(left, lp),
                op.symbol(),
                expr_at(right, rp)
            )
        }
        Expr::UnaryOp { op, operand } => match op {
            UnaryOp::Not => format!("not {}", expr_at(operand, PREC_NOT)),
            UnaryOp::Neg => format!("-{}", expr_at(operand, PREC_UNARY)),
            UnaryOp::Pos => format!("+{}", expr_at(operand, PREC_UNARY)),
        },
        Expr::BoolOp { op, values } => {
            let (word, prec) = match op {
                BoolOp::And => (" and ", PREC_AND + 1),
                BoolOp::Or => (" or ", PREC_OR + 1),
            };
            let values: Vec<String> = values.iter().map(|v| expr_at(v, prec)).collect();
            values.join(word)
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            let mut text = expr_at(left, PREC_ARITH);
            for (op, right) in ops.iter().zip(comparators) {
                let _ = write!(text, " {} {}", op.symbol(), expr_at(right, PREC_ARITH));
            }
            text
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            let mut parts: Vec<String> = args.iter().map(|a| expr_at(a, PREC_TEST)).collect();
            parts.extend(
                keywords
                    .iter()
                    .map(|k| format!("{}={}", k.arg, expr_at(&k.value, PREC_TEST))),
            );
            format!("{}({})", receiver(func), parts.join(", "))
        }
        Expr::Attribute { value, attr } => format!("{}.{}", receiver(value), attr),
        Expr::Subscript { value, index } => {
            let index = match index.as_ref() {
                Expr::Tuple(items) if !items.is_empty() => tuple_items(items, PREC_TEST),
                other => expr_at(other, PREC_TEST),
            };
            format!("{}[{}]", receiver(value), index)
        }
        Expr::Slice { lower, upper, step } => {
            let part = |e: &Option<Box<Expr>>| {
                e.as_ref()
                    .map(|e| expr_at(e, PREC_TEST))
                    .unwrap_or_default()
            };
            match step {
                Some(_) => format!("{}:{}:{}", part(lower), part(upper), part(step)),
                None => format!("{}:{}", part(lower), part(upper)),
            }
        }
        Expr::IfExp { test, body, orelse } => format!(
            "{} if {} else {}",
            expr_at(body, PREC_OR),
            expr_at(test, PREC_OR),
            expr_at(orelse, PREC_TEST)
        ),
        Expr::ListComp {
            elt,
            target,
            iter,
            conds,
        } => {
            let mut text = format!(
                "[{} for {} in {}",
                expr_at(elt, PREC_TEST),
                loop_target(target),
                expr_at(iter, PREC_OR)
            );
            for cond in conds {
                let _ = write!(text, " if {}", expr_at(cond, PREC_OR));
            }
            text.push(']');
            text
        }
    }
}

/// Callee, attribute receiver or subscripted container.
fn receiver(expr: &Expr) -> String {
    match expr {
        // `1.real` would lex as a float
        Expr::Constant(Constant::Int(_) | Constant::Float(_)) => format!("({})", render(expr)),
        other => expr_at(other, PREC_POSTFIX),
    }
}

fn render_constant(constant: &Constant) -> String {
    match constant {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(n) => n.to_string(),
        Constant::Float(f) => float_literal(*f),
        Constant::Str(s) => string_literal(s),
    }
}

/// Render a float so that it lexes back as a float.
pub fn float_literal(f: f64) -> String {
    if f.is_nan() {
        "float('nan')".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "float('inf')".to_string()
        } else {
            "-float('inf')".to_string()
        }
    } else {
        format!("{:?}", f)
    }
}

/// Quote a string the way the host language's `repr` does.
pub fn string_literal(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
