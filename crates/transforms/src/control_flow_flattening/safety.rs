//! Decides whether a function or program body can be flattened.
//!
//! Ineligibility is an ordinary outcome, not an error: the caller logs the reason and leaves the
//! target untouched.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use swc_core::common::{BytePos, Span};
use swc_core::ecma::ast::{
    ArrowExpr, AssignTarget, AwaitExpr, BindingIdent, BreakStmt, Class, Constructor, ContinueStmt,
    Decl, DoWhileStmt, Expr, ForHead, ForInStmt, ForOfStmt, ForStmt, Function, GetterProp, Id,
    Ident, IfStmt, LabeledStmt, MetaPropExpr, Pat, SetterProp, Stmt, Super, SwitchStmt, ThisExpr,
    UpdateExpr, VarDecl, VarDeclKind, WhileStmt, WithStmt, YieldExpr,
};
use swc_core::ecma::visit::{Visit, VisitWith};
use tangle_core::annotations::Annotations;
use tangle_core::ast::binding_idents;

/// Why a target was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Fewer top-level statements than `min_statements`.
    TooShort { statements: usize, minimum: usize },
    /// The probability map declined this target.
    NotSelected,
    /// Uses `this`, `arguments`, or sits on a direct-`eval` path.
    Unsafe,
    /// Produced by an earlier transform.
    Synthetic,
    /// Contains a construct that cannot move into a dispatch function.
    Forbidden(&'static str),
    MultipleDeclarators,
    /// Two bindings would share one scope object property.
    DuplicateBinding(String),
    /// A `break` or `continue` whose target lies outside the body.
    EscapingJump,
    Exports,
    /// A `const` binding that would move onto a scope object is written.
    ConstantViolation(String),
    /// A `let`, `const`, or `class` binding is used before its declaration ends.
    TemporalDeadZone(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort {
                statements,
                minimum,
            } => write!(f, "{statements} statement(s), need {minimum}"),
            Self::NotSelected => write!(f, "not selected by probability"),
            Self::Unsafe => write!(f, "uses this/arguments/eval"),
            Self::Synthetic => write!(f, "synthetic node"),
            Self::Forbidden(what) => write!(f, "contains {what}"),
            Self::MultipleDeclarators => write!(f, "declaration with several declarators"),
            Self::DuplicateBinding(name) => write!(f, "`{name}` is declared more than once"),
            Self::EscapingJump => write!(f, "break/continue leaves the body"),
            Self::Exports => write!(f, "module has exports"),
            Self::ConstantViolation(name) => write!(f, "constant `{name}` is reassigned"),
            Self::TemporalDeadZone(name) => write!(f, "`{name}` is used before its declaration"),
        }
    }
}

/// Result of analysing a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Carries the names bound directly in the target's own scope.
    Eligible(BTreeSet<String>),
    /// Left alone, with the reason.
    Ineligible(Reason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// What the analyzer needs to know about a candidate body.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Span of the `Function` node or the whole program.
    pub span: Span,
    /// Parameter patterns; empty for the program.
    pub params: &'a [Pat],
    /// Body statements after the directive prologue.
    pub stmts: &'a [Stmt],
    /// Module with export declarations.
    pub has_exports: bool,
}

/// Checks candidates against the annotations and the structural rules.
#[derive(Debug, Clone, Copy)]
pub struct SafetyAnalyzer<'a> {
    annotations: &'a Annotations,
    min_statements: usize,
}

impl<'a> SafetyAnalyzer<'a> {
    pub fn new(annotations: &'a Annotations, min_statements: usize) -> Self {
        Self {
            annotations,
            min_statements,
        }
    }

    /// Full check for a flattening target; `selected` is consulted only once everything else
    /// passed.
    pub fn analyze(&self, candidate: Candidate<'_>, selected: impl FnOnce() -> bool) -> Eligibility {
        if Annotations::is_synthetic(candidate.span) {
            return Eligibility::Ineligible(Reason::Synthetic);
        }
        if self.annotations.is_unsafe(candidate.span) {
            return Eligibility::Ineligible(Reason::Unsafe);
        }
        if candidate.stmts.len() < self.min_statements {
            return Eligibility::Ineligible(Reason::TooShort {
                statements: candidate.stmts.len(),
                minimum: self.min_statements,
            });
        }
        if candidate.has_exports {
            return Eligibility::Ineligible(Reason::Exports);
        }
        match check_body(candidate.params, candidate.stmts) {
            Err(reason) => Eligibility::Ineligible(reason),
            Ok(_) if !selected() => Eligibility::Ineligible(Reason::NotSelected),
            Ok(names) => Eligibility::Eligible(names),
        }
    }

    /// Check for a nested function declaration that would be relocated into the graph.
    pub fn can_relocate(&self, function: &Function) -> Result<(), Reason> {
        if Annotations::is_synthetic(function.span) {
            return Err(Reason::Synthetic);
        }
        if self.annotations.is_unsafe(function.span) {
            return Err(Reason::Unsafe);
        }
        if function.is_generator {
            return Err(Reason::Forbidden("a generator"));
        }
        if function.is_async {
            return Err(Reason::Forbidden("an async function"));
        }
        let Some(body) = &function.body else {
            return Err(Reason::Forbidden("no body"));
        };
        if body.stmts.first().is_some_and(tangle_core::ast::is_directive) {
            return Err(Reason::Forbidden("a directive prologue"));
        }
        let params: Vec<Pat> = function.params.iter().map(|p| p.pat.clone()).collect();
        check_body(&params, &body.stmts).map(|_| ())
    }
}

/// Structural checks shared by targets and relocated functions.
///
/// Returns the names bound in the body's own function scope.
pub fn check_body(params: &[Pat], stmts: &[Stmt]) -> Result<BTreeSet<String>, Reason> {
    let mut finder = ConstructFinder::default();
    for stmt in stmts {
        stmt.visit_with(&mut finder);
    }
    if let Some(reason) = finder.violation {
        return Err(reason);
    }

    let mut names = Vec::new();
    for param in params {
        let mut ids = Vec::new();
        binding_idents(param, &mut ids);
        names.extend(ids.into_iter().map(|id| id.sym.to_string()));
    }
    names.extend(var_names(stmts));
    names.extend(lexical_names(stmts));
    for_each_branch(stmts, &mut |branch| {
        names.extend(function_names(branch));
    });

    let mut unique = BTreeSet::new();
    for name in names {
        if !unique.insert(name.clone()) {
            return Err(Reason::DuplicateBinding(name));
        }
    }

    let mut branch_duplicate = None;
    for_each_branch(stmts, &mut |branch| {
        let mut seen = BTreeSet::new();
        for name in lexical_names(branch) {
            if !seen.insert(name.clone()) && branch_duplicate.is_none() {
                branch_duplicate = Some(name);
            }
        }
    });
    if let Some(name) = branch_duplicate {
        return Err(Reason::DuplicateBinding(name));
    }

    check_lexical_uses(stmts)?;
    Ok(unique)
}

/// A `let`, `const`, or `class` binding that flattening moves onto a scope object.
struct LexicalBinding {
    ident: Ident,
    /// End of the declarator or class; uses before it would hit the temporal dead zone.
    ends_at: BytePos,
    is_const: bool,
}

/// Lexical bindings of the body and of every flattened branch block.
fn tracked_lexicals(stmts: &[Stmt]) -> Vec<LexicalBinding> {
    let mut out = Vec::new();
    let mut collect = |stmts: &[Stmt]| {
        for stmt in stmts {
            match stmt {
                Stmt::Decl(Decl::Var(var)) if var.kind != VarDeclKind::Var => {
                    for decl in &var.decls {
                        let mut idents = Vec::new();
                        binding_idents(&decl.name, &mut idents);
                        out.extend(idents.into_iter().map(|ident| LexicalBinding {
                            ident,
                            ends_at: decl.span.hi,
                            is_const: var.kind == VarDeclKind::Const,
                        }));
                    }
                }
                Stmt::Decl(Decl::Class(class)) => out.push(LexicalBinding {
                    ident: class.ident.clone(),
                    ends_at: class.class.span.hi,
                    is_const: false,
                }),
                _ => {}
            }
        }
    };
    collect(stmts);
    for_each_branch(stmts, &mut collect);
    out
}

/// Scope-object members have neither write protection nor a dead zone, so bodies that rely
/// on either stay as they are.
fn check_lexical_uses(stmts: &[Stmt]) -> Result<(), Reason> {
    let bindings = tracked_lexicals(stmts);
    if bindings.is_empty() {
        return Ok(());
    }
    let mut uses = UseCollector::default();
    for stmt in stmts {
        stmt.visit_with(&mut uses);
    }

    for binding in &bindings {
        let id = binding.ident.to_id();
        let name = binding.ident.sym.to_string();
        if binding.is_const && uses.writes.contains(&id) {
            return Err(Reason::ConstantViolation(name));
        }
        if binding.ident.span.is_dummy() {
            continue;
        }
        let early = uses.reads.get(&id).into_iter().flatten().any(|span| {
            !span.is_dummy() && *span != binding.ident.span && span.lo < binding.ends_at
        });
        if early {
            return Err(Reason::TemporalDeadZone(name));
        }
    }
    Ok(())
}

/// Every identifier occurrence by resolved id, plus the ids that are assigned to. Descends into
/// nested functions, which can observe or write the same bindings.
#[derive(Default)]
struct UseCollector {
    reads: HashMap<Id, Vec<Span>>,
    writes: HashSet<Id>,
}

impl UseCollector {
    fn write_targets(&mut self, node: &impl VisitWith<BindingTargets>) {
        let mut targets = BindingTargets::default();
        node.visit_with(&mut targets);
        self.writes.extend(targets.0);
    }
}

impl Visit for UseCollector {
    fn visit_ident(&mut self, ident: &Ident) {
        self.reads.entry(ident.to_id()).or_default().push(ident.span);
    }

    fn visit_assign_target(&mut self, target: &AssignTarget) {
        self.write_targets(target);
        target.visit_children_with(self);
    }

    fn visit_update_expr(&mut self, expr: &UpdateExpr) {
        let mut arg = &*expr.arg;
        while let Expr::Paren(paren) = arg {
            arg = &paren.expr;
        }
        if let Expr::Ident(ident) = arg {
            self.writes.insert(ident.to_id());
        }
        expr.visit_children_with(self);
    }

    fn visit_for_head(&mut self, head: &ForHead) {
        if let ForHead::Pat(pat) = head {
            self.write_targets(&**pat);
        }
        head.visit_children_with(self);
    }
}

/// Binding identifiers inside an assignment target.
#[derive(Default)]
struct BindingTargets(Vec<Id>);

impl Visit for BindingTargets {
    fn visit_binding_ident(&mut self, binding: &BindingIdent) {
        self.0.push(binding.id.to_id());
    }
}

/// Whether `stmt` is an `if` the block builder splits into branch blocks.
pub fn is_flattenable_if(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::If(if_stmt) if has_block_arms(if_stmt))
}

/// Both arms (when present) are plain blocks.
pub fn has_block_arms(if_stmt: &IfStmt) -> bool {
    matches!(*if_stmt.cons, Stmt::Block(_))
        && if_stmt
            .alt
            .as_ref()
            .is_none_or(|alt| matches!(**alt, Stmt::Block(_)))
}

/// Calls `f` with the statements of every branch block the builder will flatten, recursively.
pub fn for_each_branch(stmts: &[Stmt], f: &mut impl FnMut(&[Stmt])) {
    for stmt in stmts {
        if !is_flattenable_if(stmt) {
            continue;
        }
        let Stmt::If(if_stmt) = stmt else { continue };
        let arms = std::iter::once(&*if_stmt.cons).chain(if_stmt.alt.as_deref());
        for arm in arms {
            if let Stmt::Block(block) = arm {
                f(&block.stmts);
                for_each_branch(&block.stmts, f);
            }
        }
    }
}

/// Every `var` binding in `stmts`, not descending into nested functions.
pub fn var_idents(stmts: &[Stmt]) -> Vec<Ident> {
    let mut collector = VarCollector::default();
    for stmt in stmts {
        stmt.visit_with(&mut collector);
    }
    collector.idents
}

pub fn var_names(stmts: &[Stmt]) -> Vec<String> {
    to_names(var_idents(stmts))
}

/// Bindings declared by `let`, `const`, `class`, and `function` directly in `stmts`.
pub fn lexical_idents(stmts: &[Stmt]) -> Vec<Ident> {
    let mut out = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::Decl(Decl::Var(var)) if var.kind != VarDeclKind::Var => {
                for decl in &var.decls {
                    binding_idents(&decl.name, &mut out);
                }
            }
            Stmt::Decl(Decl::Class(class)) => out.push(class.ident.clone()),
            Stmt::Decl(Decl::Fn(func)) => out.push(func.ident.clone()),
            _ => {}
        }
    }
    out
}

pub fn lexical_names(stmts: &[Stmt]) -> Vec<String> {
    to_names(lexical_idents(stmts))
}

fn to_names(idents: Vec<Ident>) -> Vec<String> {
    idents.into_iter().map(|id| id.sym.to_string()).collect()
}

fn function_names(stmts: &[Stmt]) -> Vec<String> {
    stmts
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Decl(Decl::Fn(func)) => Some(func.ident.sym.to_string()),
            _ => None,
        })
        .collect()
}

#[derive(Default)]
struct VarCollector {
    idents: Vec<Ident>,
}

impl Visit for VarCollector {
    fn visit_var_decl(&mut self, var: &VarDecl) {
        if var.kind == VarDeclKind::Var {
            for decl in &var.decls {
                binding_idents(&decl.name, &mut self.idents);
            }
        }
        var.visit_children_with(self);
    }

    fn visit_function(&mut self, _: &Function) {}
    fn visit_arrow_expr(&mut self, _: &ArrowExpr) {}
    fn visit_class(&mut self, _: &Class) {}
    fn visit_getter_prop(&mut self, _: &GetterProp) {}
    fn visit_setter_prop(&mut self, _: &SetterProp) {}
}

/// Finds constructs that cannot survive being moved into a dispatch function.
#[derive(Default)]
struct ConstructFinder {
    arrow_depth: usize,
    loop_depth: usize,
    switch_depth: usize,
    labels: Vec<String>,
    violation: Option<Reason>,
}

impl ConstructFinder {
    fn flag(&mut self, reason: Reason) {
        self.violation.get_or_insert(reason);
    }

    fn in_loop(&mut self, f: impl FnOnce(&mut Self)) {
        self.loop_depth += 1;
        f(self);
        self.loop_depth -= 1;
    }
}

impl Visit for ConstructFinder {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::Decl(Decl::Var(var)) = stmt {
            if var.decls.len() > 1 {
                self.flag(Reason::MultipleDeclarators);
            }
        }
        stmt.visit_children_with(self);
    }

    fn visit_function(&mut self, _: &Function) {}
    fn visit_getter_prop(&mut self, _: &GetterProp) {}
    fn visit_setter_prop(&mut self, _: &SetterProp) {}
    fn visit_constructor(&mut self, _: &Constructor) {}

    fn visit_class(&mut self, class: &Class) {
        if let Some(super_class) = &class.super_class {
            super_class.visit_with(self);
        }
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        let saved = (self.loop_depth, self.switch_depth, std::mem::take(&mut self.labels));
        self.arrow_depth += 1;
        self.loop_depth = 0;
        self.switch_depth = 0;
        arrow.visit_children_with(self);
        self.arrow_depth -= 1;
        (self.loop_depth, self.switch_depth, self.labels) = saved;
    }

    fn visit_this_expr(&mut self, _: &ThisExpr) {
        self.flag(Reason::Forbidden("this"));
    }

    fn visit_super(&mut self, _: &Super) {
        self.flag(Reason::Forbidden("super"));
    }

    fn visit_meta_prop_expr(&mut self, _: &MetaPropExpr) {
        self.flag(Reason::Forbidden("a meta property"));
    }

    fn visit_await_expr(&mut self, expr: &AwaitExpr) {
        if self.arrow_depth == 0 {
            self.flag(Reason::Forbidden("await"));
        }
        expr.visit_children_with(self);
    }

    fn visit_yield_expr(&mut self, expr: &YieldExpr) {
        if self.arrow_depth == 0 {
            self.flag(Reason::Forbidden("yield"));
        }
        expr.visit_children_with(self);
    }

    fn visit_with_stmt(&mut self, _: &WithStmt) {
        self.flag(Reason::Forbidden("with"));
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) {
        self.in_loop(|this| stmt.visit_children_with(this));
    }

    fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
        self.in_loop(|this| stmt.visit_children_with(this));
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        if stmt.is_await && self.arrow_depth == 0 {
            self.flag(Reason::Forbidden("for await"));
        }
        self.in_loop(|this| stmt.visit_children_with(this));
    }

    fn visit_while_stmt(&mut self, stmt: &WhileStmt) {
        self.in_loop(|this| stmt.visit_children_with(this));
    }

    fn visit_do_while_stmt(&mut self, stmt: &DoWhileStmt) {
        self.in_loop(|this| stmt.visit_children_with(this));
    }

    fn visit_switch_stmt(&mut self, stmt: &SwitchStmt) {
        self.switch_depth += 1;
        stmt.visit_children_with(self);
        self.switch_depth -= 1;
    }

    fn visit_labeled_stmt(&mut self, stmt: &LabeledStmt) {
        self.labels.push(stmt.label.sym.to_string());
        stmt.body.visit_with(self);
        self.labels.pop();
    }

    fn visit_break_stmt(&mut self, stmt: &BreakStmt) {
        let escapes = match &stmt.label {
            Some(label) => !self.labels.iter().any(|l| *l == *label.sym),
            None => self.loop_depth + self.switch_depth == 0,
        };
        if escapes {
            self.flag(Reason::EscapingJump);
        }
    }

    fn visit_continue_stmt(&mut self, stmt: &ContinueStmt) {
        let escapes = match &stmt.label {
            Some(label) => !self.labels.iter().any(|l| *l == *label.sym),
            None => self.loop_depth == 0,
        };
        if escapes {
            self.flag(Reason::EscapingJump);
        }
    }
}
