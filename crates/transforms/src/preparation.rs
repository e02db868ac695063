//! Normalizes the program so later transforms see a regular shape.
//!
//! Declarations with several declarators are split into one statement each, and every
//! non-block `if`/`else`/loop body is wrapped in a block, which turns `else if` chains into
//! nested blocks. Annotations are recomputed afterwards.

use crate::Transform;
use rand::rngs::StdRng;
use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::{
    Decl, DoWhileStmt, EmptyStmt, ForInStmt, ForOfStmt, ForStmt, IfStmt, ModuleItem, Stmt,
    VarDecl, WhileStmt,
};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tangle_core::ProgramIr;
use tangle_core::annotations::Annotations;
use tangle_core::ast::block;
use tangle_utils::errors::TransformError;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct Preparation;

impl Transform for Preparation {
    fn name(&self) -> &'static str {
        "Preparation"
    }

    fn apply(&self, ir: &mut ProgramIr, _rng: &mut StdRng) -> Result<bool, TransformError> {
        let mut normalizer = Normalizer::default();
        ir.program.visit_mut_with(&mut normalizer);
        ir.annotations = Annotations::collect(&ir.program);
        debug!(
            "Preparation: split {} declaration(s), wrapped {} body/bodies",
            normalizer.split, normalizer.wrapped
        );
        Ok(normalizer.split + normalizer.wrapped > 0)
    }
}

#[derive(Default)]
struct Normalizer {
    split: usize,
    wrapped: usize,
}

impl Normalizer {
    fn wrap(&mut self, body: &mut Box<Stmt>) {
        if matches!(**body, Stmt::Block(_)) {
            return;
        }
        let stmt = std::mem::replace(&mut **body, Stmt::Empty(EmptyStmt { span: DUMMY_SP }));
        **body = block(vec![stmt]);
        self.wrapped += 1;
    }

    /// `var a = 1, b;` becomes `var a = 1; var b;`.
    fn split_declarators(&mut self, decl: Box<VarDecl>) -> Vec<Stmt> {
        if decl.decls.len() < 2 {
            return vec![Stmt::Decl(Decl::Var(decl))];
        }
        self.split += 1;
        let VarDecl {
            span,
            ctxt,
            kind,
            declare,
            decls,
        } = *decl;
        decls
            .into_iter()
            .map(|declarator| {
                Stmt::Decl(Decl::Var(Box::new(VarDecl {
                    span,
                    ctxt,
                    kind,
                    declare,
                    decls: vec![declarator],
                })))
            })
            .collect()
    }
}

impl VisitMut for Normalizer {
    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts.drain(..) {
            match stmt {
                Stmt::Decl(Decl::Var(decl)) => out.extend(self.split_declarators(decl)),
                other => out.push(other),
            }
        }
        *stmts = out;
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        items.visit_mut_children_with(self);
        let mut out = Vec::with_capacity(items.len());
        for item in items.drain(..) {
            match item {
                ModuleItem::Stmt(Stmt::Decl(Decl::Var(decl))) => out.extend(
                    self.split_declarators(decl)
                        .into_iter()
                        .map(ModuleItem::Stmt),
                ),
                other => out.push(other),
            }
        }
        *items = out;
    }

    fn visit_mut_if_stmt(&mut self, stmt: &mut IfStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.cons);
        if let Some(alt) = &mut stmt.alt {
            self.wrap(alt);
        }
    }

    fn visit_mut_for_stmt(&mut self, stmt: &mut ForStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.body);
    }

    fn visit_mut_for_in_stmt(&mut self, stmt: &mut ForInStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.body);
    }

    fn visit_mut_for_of_stmt(&mut self, stmt: &mut ForOfStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.body);
    }

    fn visit_mut_while_stmt(&mut self, stmt: &mut WhileStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.body);
    }

    fn visit_mut_do_while_stmt(&mut self, stmt: &mut DoWhileStmt) {
        stmt.visit_mut_children_with(self);
        self.wrap(&mut stmt.body);
    }
}
