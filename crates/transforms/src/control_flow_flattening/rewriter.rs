//! Second pass over finished blocks: literal mangling, identifier rewriting, return tagging, and
//! `goto` resolution, in that order.

use super::blocks::{BlockGraph, Goto};
use super::builder::FlatteningContext;
use super::scope::{ScopeArena, ScopeId};
use rand::{Rng, rngs::StdRng};
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::{
    ArrowExpr, AssignOp, AssignPat, AssignTarget, AssignTargetPat, BinaryOp, BreakStmt, Callee,
    Class, ClassDecl, ClassExpr, Constructor, Decl, EmptyStmt, Expr, FnDecl, FnExpr, ForHead,
    Function, GetterProp, Ident, IdentName, KeyValuePatProp, KeyValueProp, Lit, MemberExpr,
    ObjectPatProp, OptCall, Pat, Prop, PropName, ReturnStmt, SetterProp, SimpleAssignTarget, Stmt,
    TaggedTpl, VarDecl, VarDeclKind, VarDeclOrExpr,
};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tangle_core::ast::{
    assign, assign_ident, bin, binding_idents, bool_expr, expr_stmt, ident, ident_expr, num_expr,
    paren, seq, undefined_expr,
};
use tangle_core::names::NameGenerator;

/// Integers at or above this magnitude are left as they are.
const MANGLE_LIMIT: f64 = 1_000_000.0;

/// Runs every rewriting step over every block of the graph.
pub fn rewrite(ctx: &mut FlatteningContext<'_>) {
    let labels: Vec<String> = ctx.graph.blocks.keys().cloned().collect();
    let mut mangled = 0usize;
    for label in labels {
        let block = ctx.graph.get_mut(&label);
        let mut body = std::mem::take(&mut block.body);
        let values = block.state_values.clone();
        let scope = block.scope;

        if ctx.config.mangle_literals {
            let mut mangler = LiteralMangler {
                state_vars: &ctx.graph.state_vars,
                values: &values,
                rng: &mut *ctx.rng,
                count: &mut mangled,
            };
            body.visit_mut_with(&mut mangler);
        }

        let mut rewriter = IdentRewriter {
            scopes: &mut ctx.scopes,
            names: &mut *ctx.names,
            rng: &mut *ctx.rng,
            from: scope,
        };
        body.visit_mut_with(&mut rewriter);

        if let Some(flag) = &ctx.did_return {
            if ctx.scopes.scope(scope).frame == 0 {
                body.visit_mut_with(&mut ReturnTagger { flag });
            }
        }

        let mut resolver = GotoResolver {
            graph: &ctx.graph,
            current: &values,
            switch_label: &ctx.switch_label,
        };
        body.visit_mut_with(&mut resolver);

        ctx.graph.get_mut(&label).body = body;
    }
}

/// Replaces small integer and boolean literals with expressions over the state variables.
///
/// Literals inside nested functions, arrows, and classes are left alone: they may run while
/// the state variables hold another block's values.
struct LiteralMangler<'a> {
    state_vars: &'a [String],
    values: &'a [i64],
    rng: &'a mut StdRng,
    count: &'a mut usize,
}

impl LiteralMangler<'_> {
    fn roll(&mut self) -> bool {
        let p = 1.0 / (1.0 + *self.count as f64 * 0.15);
        let hit = self.rng.random_bool(p);
        if hit {
            *self.count += 1;
        }
        hit
    }

    fn pick(&mut self) -> (Expr, i64) {
        let i = self.rng.random_range(0..self.state_vars.len());
        (ident_expr(&self.state_vars[i]), self.values[i])
    }

    /// `(s + (n - v))`
    fn number(&mut self, n: i64) -> Expr {
        let (var, value) = self.pick();
        paren(bin(BinaryOp::Add, var, paren(num_expr(n - value))))
    }

    /// A comparison against the current value of a state variable with the same truth value.
    fn boolean(&mut self, b: bool) -> Expr {
        let (var, value) = self.pick();
        let offset = self.rng.random_range(1..=9);
        let (op, rhs) = match (b, self.rng.random_bool(0.5)) {
            (true, true) => (BinaryOp::EqEqEq, value),
            (true, false) => (BinaryOp::Lt, value + offset),
            (false, true) => (BinaryOp::NotEqEq, value),
            (false, false) => (BinaryOp::Gt, value + offset),
        };
        paren(bin(op, var, num_expr(rhs)))
    }
}

impl VisitMut for LiteralMangler<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Lit(Lit::Num(n))
                if n.value.fract() == 0.0 && n.value.abs() < MANGLE_LIMIT && self.roll() =>
            {
                *expr = self.number(n.value as i64);
            }
            Expr::Lit(Lit::Bool(b)) if self.roll() => {
                *expr = self.boolean(b.value);
            }
            _ => expr.visit_mut_children_with(self),
        }
    }

    fn visit_mut_function(&mut self, _: &mut Function) {}
    fn visit_mut_arrow_expr(&mut self, _: &mut ArrowExpr) {}
    fn visit_mut_class(&mut self, _: &mut Class) {}
    fn visit_mut_getter_prop(&mut self, _: &mut GetterProp) {}
    fn visit_mut_setter_prop(&mut self, _: &mut SetterProp) {}
}

/// Moves tracked bindings onto the scope objects.
///
/// Bindings are matched by resolved id, so shadowing declarations in nested functions are
/// never confused with the tracked ones.
struct IdentRewriter<'a> {
    scopes: &'a mut ScopeArena,
    names: &'a mut NameGenerator,
    rng: &'a mut StdRng,
    from: ScopeId,
}

impl IdentRewriter<'_> {
    fn member_for(&mut self, id: &Ident) -> Option<MemberExpr> {
        let owner = self.scopes.owner_of(&id.to_id())?;
        let property = self
            .scopes
            .scope_mut(owner)
            .get_new_name(&id.sym, self.names, self.rng);
        Some(self.scopes.get_member_expression(self.from, owner, &property))
    }

    fn is_tracked(&self, id: &Ident) -> bool {
        self.scopes.is_tracked(&id.to_id())
    }

    fn declares_tracked(&self, var: &VarDecl) -> bool {
        var.decls.iter().any(|decl| {
            let mut ids = Vec::new();
            binding_idents(&decl.name, &mut ids);
            ids.iter().any(|id| self.is_tracked(id))
        })
    }

    /// `(0, member)`, so calls through the scope object keep an undefined `this`.
    fn unbound_callee(&mut self, expr: &mut Expr) -> bool {
        let Expr::Ident(id) = &*expr else {
            return false;
        };
        match self.member_for(id) {
            Some(member) => {
                *expr = seq(vec![num_expr(0), Expr::Member(member)]);
                true
            }
            None => false,
        }
    }

    /// Assignments replacing a tracked declaration, one per declarator that stores a value.
    fn declaration_assignments(&mut self, mut var: VarDecl) -> Vec<Expr> {
        var.visit_mut_children_with(self);
        let lexical = var.kind != VarDeclKind::Var;
        var.decls
            .into_iter()
            .filter_map(|decl| {
                let value = match decl.init {
                    Some(init) => *init,
                    None if lexical => undefined_expr(),
                    None => return None,
                };
                Some(assignment_to(decl.name, value))
            })
            .collect()
    }

    fn var_decl_stmt(&mut self, var: VarDecl) -> Stmt {
        let mut exprs = self.declaration_assignments(var);
        match exprs.len() {
            0 => Stmt::Empty(EmptyStmt { span: DUMMY_SP }),
            1 => expr_stmt(exprs.remove(0)),
            _ => expr_stmt(seq(exprs)),
        }
    }

    fn fn_decl_stmt(&mut self, decl: FnDecl) -> Stmt {
        let FnDecl {
            ident, mut function, ..
        } = decl;
        function.visit_mut_with(self);
        let target = self.declared_target(&ident);
        let value = Expr::Fn(FnExpr {
            ident: Some(ident),
            function,
        });
        expr_stmt(assign(AssignOp::Assign, target, value))
    }

    fn class_decl_stmt(&mut self, decl: ClassDecl) -> Stmt {
        let ClassDecl {
            ident, mut class, ..
        } = decl;
        class.visit_mut_with(self);
        let target = self.declared_target(&ident);
        let value = Expr::Class(ClassExpr {
            ident: Some(ident),
            class,
        });
        expr_stmt(assign(AssignOp::Assign, target, value))
    }

    fn declared_target(&mut self, ident: &Ident) -> AssignTarget {
        match self.member_for(ident) {
            Some(member) => AssignTarget::Simple(SimpleAssignTarget::Member(member)),
            None => panic!("declaration of `{}` is not tracked", ident.sym),
        }
    }
}

/// `target = value`, where `target` is a declarator pattern already rewritten to members.
fn assignment_to(name: Pat, value: Expr) -> Expr {
    match name {
        Pat::Expr(expr) => match *expr {
            Expr::Member(member) => assign(
                AssignOp::Assign,
                AssignTarget::Simple(SimpleAssignTarget::Member(member)),
                value,
            ),
            other => panic!("unexpected declarator target {other:?}"),
        },
        Pat::Array(array) => paren(assign(
            AssignOp::Assign,
            AssignTarget::Pat(AssignTargetPat::Array(array)),
            value,
        )),
        Pat::Object(object) => paren(assign(
            AssignOp::Assign,
            AssignTarget::Pat(AssignTargetPat::Object(object)),
            value,
        )),
        other => panic!("unexpected declarator pattern {other:?}"),
    }
}

impl VisitMut for IdentRewriter<'_> {
    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        let taken = std::mem::replace(stmt, Stmt::Empty(EmptyStmt { span: DUMMY_SP }));
        *stmt = match taken {
            Stmt::Decl(Decl::Var(var)) if self.declares_tracked(&var) => self.var_decl_stmt(*var),
            Stmt::Decl(Decl::Fn(decl)) if self.is_tracked(&decl.ident) => self.fn_decl_stmt(decl),
            Stmt::Decl(Decl::Class(decl)) if self.is_tracked(&decl.ident) => {
                self.class_decl_stmt(decl)
            }
            mut other => {
                other.visit_mut_children_with(self);
                other
            }
        };
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        stmts.retain(|s| !matches!(s, Stmt::Empty(_)));
    }

    fn visit_mut_var_decl_or_expr(&mut self, init: &mut VarDeclOrExpr) {
        let VarDeclOrExpr::VarDecl(var) = init else {
            init.visit_mut_children_with(self);
            return;
        };
        if !self.declares_tracked(var) {
            var.visit_mut_children_with(self);
            return;
        }
        let var = std::mem::replace(
            &mut **var,
            VarDecl {
                span: DUMMY_SP,
                ctxt: Default::default(),
                kind: VarDeclKind::Var,
                declare: false,
                decls: Vec::new(),
            },
        );
        let mut exprs = self.declaration_assignments(var);
        *init = VarDeclOrExpr::Expr(Box::new(match exprs.len() {
            1 => exprs.remove(0),
            0 => undefined_expr(),
            _ => seq(exprs),
        }));
    }

    fn visit_mut_for_head(&mut self, head: &mut ForHead) {
        if let ForHead::VarDecl(var) = head {
            if self.declares_tracked(var) {
                var.visit_mut_children_with(self);
                if let Some(decl) = var.decls.pop() {
                    *head = ForHead::Pat(Box::new(decl.name));
                }
                return;
            }
        }
        head.visit_mut_children_with(self);
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Ident(id) = expr {
            if let Some(member) = self.member_for(id) {
                *expr = Expr::Member(member);
            }
            return;
        }
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_callee(&mut self, callee: &mut Callee) {
        if let Callee::Expr(expr) = callee {
            if self.unbound_callee(expr) {
                return;
            }
        }
        callee.visit_mut_children_with(self);
    }

    fn visit_mut_opt_call(&mut self, call: &mut OptCall) {
        self.unbound_callee(&mut call.callee);
        call.visit_mut_children_with(self);
    }

    fn visit_mut_tagged_tpl(&mut self, tagged: &mut TaggedTpl) {
        self.unbound_callee(&mut tagged.tag);
        tagged.visit_mut_children_with(self);
    }

    fn visit_mut_simple_assign_target(&mut self, target: &mut SimpleAssignTarget) {
        if let SimpleAssignTarget::Ident(binding) = target {
            if let Some(member) = self.member_for(&binding.id) {
                *target = SimpleAssignTarget::Member(member);
            }
            return;
        }
        target.visit_mut_children_with(self);
    }

    fn visit_mut_pat(&mut self, pat: &mut Pat) {
        if let Pat::Ident(binding) = pat {
            if let Some(member) = self.member_for(&binding.id) {
                *pat = Pat::Expr(Box::new(Expr::Member(member)));
            }
            return;
        }
        pat.visit_mut_children_with(self);
    }

    fn visit_mut_object_pat_prop(&mut self, prop: &mut ObjectPatProp) {
        if let ObjectPatProp::Assign(assign_prop) = prop {
            if let Some(member) = self.member_for(&assign_prop.key.id) {
                let key = assign_prop.key.id.sym.clone();
                let mut default = assign_prop.value.take();
                if let Some(value) = default.as_mut() {
                    value.visit_mut_with(self);
                }
                let target = Pat::Expr(Box::new(Expr::Member(member)));
                let value = match default {
                    Some(right) => Pat::Assign(AssignPat {
                        span: DUMMY_SP,
                        left: Box::new(target),
                        right,
                    }),
                    None => target,
                };
                *prop = ObjectPatProp::KeyValue(KeyValuePatProp {
                    key: PropName::Ident(IdentName::new(key, DUMMY_SP)),
                    value: Box::new(value),
                });
                return;
            }
        }
        prop.visit_mut_children_with(self);
    }

    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        if let Prop::Shorthand(id) = prop {
            if let Some(member) = self.member_for(id) {
                let key = id.sym.clone();
                *prop = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(IdentName::new(key, DUMMY_SP)),
                    value: Box::new(Expr::Member(member)),
                });
            }
            return;
        }
        prop.visit_mut_children_with(self);
    }
}

/// Wraps the argument of every `return` of the target itself as `(flag = true, arg)`.
struct ReturnTagger<'a> {
    flag: &'a str,
}

impl VisitMut for ReturnTagger<'_> {
    fn visit_mut_return_stmt(&mut self, ret: &mut ReturnStmt) {
        let arg = ret.arg.take().map_or_else(undefined_expr, |arg| *arg);
        let set = assign_ident(AssignOp::Assign, self.flag, bool_expr(true));
        ret.arg = Some(Box::new(seq(vec![set, arg])));
    }

    fn visit_mut_function(&mut self, _: &mut Function) {}
    fn visit_mut_arrow_expr(&mut self, _: &mut ArrowExpr) {}
    fn visit_mut_class(&mut self, _: &mut Class) {}
    fn visit_mut_constructor(&mut self, _: &mut Constructor) {}
    fn visit_mut_getter_prop(&mut self, _: &mut GetterProp) {}
    fn visit_mut_setter_prop(&mut self, _: &mut SetterProp) {}
}

/// Replaces each `goto` with state-variable updates and a `break` out of the dispatch switch.
struct GotoResolver<'a> {
    graph: &'a BlockGraph,
    current: &'a [i64],
    switch_label: &'a str,
}

impl GotoResolver<'_> {
    fn resolve(&self, goto: &Goto) -> Vec<Stmt> {
        let target = &self.graph.get(&goto.target).state_values;
        let mut out = Vec::new();
        for ((var, from), to) in self.graph.state_vars.iter().zip(self.current).zip(target) {
            let delta = to - from;
            let update = match delta {
                0 => continue,
                d if d > 0 => assign_ident(AssignOp::AddAssign, var, num_expr(d)),
                d => assign_ident(AssignOp::SubAssign, var, num_expr(-d)),
            };
            out.push(expr_stmt(update));
        }
        out.push(Stmt::Break(BreakStmt {
            span: DUMMY_SP,
            label: Some(ident(self.switch_label)),
        }));
        out
    }
}

impl VisitMut for GotoResolver<'_> {
    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        for mut stmt in std::mem::take(stmts) {
            match self.graph.as_goto(&stmt) {
                Some(goto) => stmts.extend(self.resolve(&goto)),
                None => {
                    stmt.visit_mut_with(self);
                    stmts.push(stmt);
                }
            }
        }
    }

    fn visit_mut_function(&mut self, _: &mut Function) {}
    fn visit_mut_arrow_expr(&mut self, _: &mut ArrowExpr) {}
}
