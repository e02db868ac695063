//! Small constructors and queries over swc AST nodes shared by the transforms.

use swc_core::common::{DUMMY_SP, SyntaxContext};
use swc_core::ecma::ast::{
    AssignExpr, AssignOp, AssignTarget, BinExpr, BinaryOp, BindingIdent, BlockStmt, Bool,
    ComputedPropName, Expr, ExprStmt, Ident, Lit, MemberExpr, MemberProp, Number, ObjectPatProp,
    ParenExpr, Pat, SeqExpr, SimpleAssignTarget, Stmt, Str, UnaryExpr, UnaryOp,
};

/// Identifier with an empty syntax context and a dummy span.
pub fn ident(name: &str) -> Ident {
    Ident::new_no_ctxt(name.into(), DUMMY_SP)
}

pub fn ident_expr(name: &str) -> Expr {
    Expr::Ident(ident(name))
}

pub fn binding_ident(name: &str) -> BindingIdent {
    BindingIdent::from(ident(name))
}

/// Integer literal; negative values are printed as a unary minus.
pub fn num_expr(value: i64) -> Expr {
    let lit = Expr::Lit(Lit::Num(Number {
        span: DUMMY_SP,
        value: value.unsigned_abs() as f64,
        raw: None,
    }));
    if value < 0 {
        Expr::Unary(UnaryExpr {
            span: DUMMY_SP,
            op: UnaryOp::Minus,
            arg: Box::new(lit),
        })
    } else {
        lit
    }
}

/// `void 0`
pub fn undefined_expr() -> Expr {
    Expr::Unary(UnaryExpr {
        span: DUMMY_SP,
        op: UnaryOp::Void,
        arg: Box::new(num_expr(0)),
    })
}

pub fn bool_expr(value: bool) -> Expr {
    Expr::Lit(Lit::Bool(Bool {
        span: DUMMY_SP,
        value,
    }))
}

pub fn str_expr(value: &str) -> Expr {
    Expr::Lit(Lit::Str(Str {
        span: DUMMY_SP,
        value: value.into(),
        raw: None,
    }))
}

pub fn paren(expr: Expr) -> Expr {
    Expr::Paren(ParenExpr {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Bin(BinExpr {
        span: DUMMY_SP,
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// `(a, b, ...)`
pub fn seq(exprs: Vec<Expr>) -> Expr {
    paren(Expr::Seq(SeqExpr {
        span: DUMMY_SP,
        exprs: exprs.into_iter().map(Box::new).collect(),
    }))
}

pub fn assign(op: AssignOp, left: AssignTarget, right: Expr) -> Expr {
    Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op,
        left,
        right: Box::new(right),
    })
}

/// `name = value`, `name += value`, ... for a plain identifier target.
pub fn assign_ident(op: AssignOp, name: &str, right: Expr) -> Expr {
    assign(
        op,
        AssignTarget::Simple(SimpleAssignTarget::Ident(binding_ident(name))),
        right,
    )
}

/// `object["key"]`
pub fn computed_member(object: Expr, key: &str) -> MemberExpr {
    MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(object),
        prop: MemberProp::Computed(ComputedPropName {
            span: DUMMY_SP,
            expr: Box::new(str_expr(key)),
        }),
    }
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(BlockStmt {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        stmts,
    })
}

/// Returns true for a directive prologue entry such as `"use strict";`.
pub fn is_directive(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Expr(ExprStmt { expr, .. })
            if matches!(&**expr, Expr::Lit(Lit::Str(s)) if s.raw.is_some())
    )
}

/// Collects every identifier a binding pattern declares, in source order.
pub fn binding_idents(pat: &Pat, out: &mut Vec<Ident>) {
    match pat {
        Pat::Ident(binding) => out.push(binding.id.clone()),
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                binding_idents(elem, out);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => binding_idents(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.id.clone()),
                    ObjectPatProp::Rest(rest) => binding_idents(&rest.arg, out),
                }
            }
        }
        Pat::Rest(rest) => binding_idents(&rest.arg, out),
        Pat::Assign(assign) => binding_idents(&assign.left, out),
        Pat::Expr(_) | Pat::Invalid(_) => {}
    }
}
