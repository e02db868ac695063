//! Source-snippet templates.
//!
//! Synthetic code is written as ordinary JavaScript with `$name` placeholders, parsed once, and
//! then instantiated by substituting identifiers, expressions, or string contents. Every span in
//! the result is reset to `DUMMY_SP`, which is how later passes recognise synthetic nodes.
use crate::ast::str_expr;
use swc_core::common::{DUMMY_SP, FileName, SourceMap, Span, sync::Lrc};
use swc_core::ecma::ast::{EsVersion, Expr, Ident, IdentName, Stmt, Str};
use swc_core::ecma::parser::{EsSyntax, Syntax, parse_file_as_script};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tangle_utils::errors::TemplateError;

/// Value substituted for a `$name` placeholder.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Renames the placeholder identifier, wherever it appears (bindings, labels, property
    /// names, and string literals spelled `"$name"`).
    Ident(String),
    /// Replaces a placeholder in expression position with a whole expression.
    Expr(Expr),
    /// Replaces a placeholder in expression position, or a `"$name"` string, with a string.
    Str(String),
}

/// A parsed snippet ready to be instantiated.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
    body: Vec<Stmt>,
}

impl Template {
    /// Parses `text` as a script. `return` is accepted at the top level, since most templates
    /// are spliced into function bodies.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(
            Lrc::new(FileName::Custom("template.js".into())),
            text.to_string(),
        );
        let mut recovered = Vec::new();
        let script = parse_file_as_script(
            &fm,
            Syntax::Es(EsSyntax {
                allow_return_outside_function: true,
                ..Default::default()
            }),
            EsVersion::latest(),
            None,
            &mut recovered,
        )
        .map_err(|e| TemplateError::Parse {
            source_text: text.to_string(),
            msg: e.kind().msg().to_string(),
        })?;
        if let Some(e) = recovered.first() {
            return Err(TemplateError::Parse {
                source_text: text.to_string(),
                msg: e.kind().msg().to_string(),
            });
        }
        Ok(Self {
            text: text.to_string(),
            body: script.body,
        })
    }

    /// Instantiates the template into a statement list.
    ///
    /// Binding keys are given without the leading `$`.
    pub fn compile(&self, bindings: &[(&str, Binding)]) -> Result<Vec<Stmt>, TemplateError> {
        let mut body = self.body.clone();
        let mut subst = Substitute {
            bindings,
            missing: None,
        };
        body.visit_mut_with(&mut subst);
        match subst.missing {
            Some(name) => Err(TemplateError::MissingBinding(name)),
            None => Ok(body),
        }
    }

    /// Instantiates a template that holds exactly one statement.
    pub fn statement(&self, bindings: &[(&str, Binding)]) -> Result<Stmt, TemplateError> {
        let mut body = self.compile(bindings)?;
        if body.len() != 1 {
            return Err(TemplateError::UnexpectedShape("a single statement"));
        }
        Ok(body.remove(0))
    }

    /// Instantiates a template that holds one expression statement and returns the expression.
    pub fn expression(&self, bindings: &[(&str, Binding)]) -> Result<Expr, TemplateError> {
        match self.statement(bindings)? {
            Stmt::Expr(stmt) => Ok(*stmt.expr),
            _ => Err(TemplateError::UnexpectedShape("an expression statement")),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Parses and instantiates `text` in one step.
pub fn statements(text: &str, bindings: &[(&str, Binding)]) -> Result<Vec<Stmt>, TemplateError> {
    Template::parse(text)?.compile(bindings)
}

/// Parses and instantiates a single-statement template in one step.
pub fn statement(text: &str, bindings: &[(&str, Binding)]) -> Result<Stmt, TemplateError> {
    Template::parse(text)?.statement(bindings)
}

/// Parses and instantiates an expression template in one step.
pub fn expression(text: &str, bindings: &[(&str, Binding)]) -> Result<Expr, TemplateError> {
    Template::parse(text)?.expression(bindings)
}

struct Substitute<'a> {
    bindings: &'a [(&'a str, Binding)],
    missing: Option<String>,
}

impl Substitute<'_> {
    fn lookup(&self, sym: &str) -> Option<&Binding> {
        let key = sym.strip_prefix('$')?;
        self.bindings
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, binding)| binding)
    }

    fn rename(&mut self, sym: &str) -> Option<String> {
        if !sym.starts_with('$') {
            return None;
        }
        match self.lookup(sym) {
            Some(Binding::Ident(name)) => Some(name.clone()),
            _ => {
                self.missing.get_or_insert_with(|| sym.to_string());
                None
            }
        }
    }
}

impl VisitMut for Substitute<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Ident(id) = expr {
            match self.lookup(&id.sym) {
                Some(Binding::Expr(replacement)) => {
                    *expr = replacement.clone();
                    return;
                }
                Some(Binding::Str(value)) => {
                    *expr = str_expr(value);
                    return;
                }
                _ => {}
            }
        }
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_ident(&mut self, id: &mut Ident) {
        if let Some(name) = self.rename(&id.sym) {
            id.sym = name.into();
        }
    }

    fn visit_mut_ident_name(&mut self, id: &mut IdentName) {
        if let Some(name) = self.rename(&id.sym) {
            id.sym = name.into();
        }
    }

    fn visit_mut_str(&mut self, s: &mut Str) {
        if !s.value.starts_with('$') {
            return;
        }
        let value = match self.lookup(&s.value) {
            Some(Binding::Ident(value)) | Some(Binding::Str(value)) => value.clone(),
            _ => {
                self.missing.get_or_insert_with(|| s.value.to_string());
                return;
            }
        };
        s.value = value.into();
        s.raw = None;
    }

    fn visit_mut_span(&mut self, span: &mut Span) {
        *span = DUMMY_SP;
    }
}
