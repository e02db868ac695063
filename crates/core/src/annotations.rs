/// Per-function safety annotations.
///
/// A function is *unsafe* to restructure when its body observes its own activation: `this` or
/// `arguments` (directly or through arrow functions, which share them), or a direct `eval`, which
/// may reach any binding of every enclosing function. Annotations are keyed by the span of the
/// `Function` node or of the whole program, which stay stable while the AST is rewritten.
use std::collections::HashSet;
use swc_core::common::{Span, Spanned};
use swc_core::ecma::ast::{
    CallExpr, Callee, Class, Constructor, Expr, Function, GetterProp, Ident, Program, SetterProp,
    ThisExpr,
};
use swc_core::ecma::visit::{Visit, VisitWith};

#[derive(Debug, Clone, Default)]
pub struct Annotations {
    unsafe_spans: HashSet<Span>,
}

impl Annotations {
    /// Walks `program` and records every function (and the program itself) that is unsafe.
    pub fn collect(program: &Program) -> Self {
        let mut collector = Collector {
            stack: vec![Some(program.span())],
            unsafe_spans: HashSet::new(),
        };
        program.visit_with(&mut collector);
        tracing::debug!(
            "Annotations: {} unsafe function(s)",
            collector.unsafe_spans.len()
        );
        Self {
            unsafe_spans: collector.unsafe_spans,
        }
    }

    pub fn is_unsafe(&self, span: Span) -> bool {
        self.unsafe_spans.contains(&span)
    }

    pub fn mark_unsafe(&mut self, span: Span) {
        self.unsafe_spans.insert(span);
    }

    /// Synthetic nodes carry a dummy span and are never candidates for restructuring.
    pub fn is_synthetic(span: Span) -> bool {
        span.is_dummy()
    }
}

/// Stack of activations; `None` marks a class body or accessor whose `this` is not the
/// enclosing function's.
struct Collector {
    stack: Vec<Option<Span>>,
    unsafe_spans: HashSet<Span>,
}

impl Collector {
    fn mark_current(&mut self) {
        if let Some(Some(span)) = self.stack.last() {
            self.unsafe_spans.insert(*span);
        }
    }

    fn with_frame(&mut self, frame: Option<Span>, f: impl FnOnce(&mut Self)) {
        self.stack.push(frame);
        f(self);
        self.stack.pop();
    }
}

impl Visit for Collector {
    fn visit_function(&mut self, function: &Function) {
        self.with_frame(Some(function.span), |this| function.visit_children_with(this));
    }

    fn visit_class(&mut self, class: &Class) {
        if let Some(super_class) = &class.super_class {
            super_class.visit_with(self);
        }
        self.with_frame(None, |this| class.body.visit_with(this));
    }

    fn visit_constructor(&mut self, ctor: &Constructor) {
        self.with_frame(None, |this| ctor.visit_children_with(this));
    }

    fn visit_getter_prop(&mut self, prop: &GetterProp) {
        self.with_frame(None, |this| prop.visit_children_with(this));
    }

    fn visit_setter_prop(&mut self, prop: &SetterProp) {
        self.with_frame(None, |this| prop.visit_children_with(this));
    }

    fn visit_this_expr(&mut self, _: &ThisExpr) {
        self.mark_current();
    }

    fn visit_ident(&mut self, id: &Ident) {
        if &*id.sym == "arguments" {
            self.mark_current();
        }
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if let Callee::Expr(callee) = &call.callee {
            if matches!(&**callee, Expr::Ident(id) if &*id.sym == "eval") {
                self.unsafe_spans.extend(self.stack.iter().flatten().copied());
            }
        }
        call.visit_children_with(self);
    }
}
