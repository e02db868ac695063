//! Basic block builder: walks a target body and splits it into blocks joined by `goto`s.

use super::FlatteningConfig;
use super::blocks::BlockGraph;
use super::safety::{SafetyAnalyzer, has_block_arms, lexical_idents, var_idents};
use super::scope::{ScopeArena, ScopeId};
use rand::{Rng, rngs::StdRng};
use swc_core::common::{DUMMY_SP, SyntaxContext};
use swc_core::ecma::ast::{
    ArrayPat, Decl, FnDecl, Ident, IfStmt, Pat, ReturnStmt, Stmt, VarDecl, VarDeclKind,
    VarDeclarator,
};
use tangle_core::ast::{binding_idents, block, ident_expr, num_expr};
use tangle_core::names::NameGenerator;
use tangle_core::report::{BlockKind, EdgeKind};
use tangle_core::template::{Binding, Template};
use tangle_utils::errors::{TemplateError, TransformError};
use tracing::debug;

/// How the last block of a statement list leaves.
#[derive(Debug, Clone)]
pub enum Exit {
    /// Continue at the given block.
    Goto(String),
    /// Return from the dispatch invocation (relocated function bodies).
    Return,
}

/// Everything one flattening target owns while it is being rebuilt.
pub struct FlatteningContext<'a> {
    pub config: &'a FlatteningConfig,
    /// Decides whether nested declarations can be relocated.
    pub analyzer: SafetyAnalyzer<'a>,
    /// Program-wide fresh-name source.
    pub names: &'a mut NameGenerator,
    pub rng: &'a mut StdRng,
    /// Block arena of this target.
    pub graph: BlockGraph,
    pub scopes: ScopeArena,
    /// Scope of the target body itself.
    pub root_scope: ScopeId,
    /// Name of the emitted dispatch function.
    pub dispatch_name: String,
    /// Dispatch parameter carrying a relocated function's `arguments`.
    pub args_name: String,
    /// Label on the dispatch switch, targeted by resolved `goto`s.
    pub switch_label: String,
    /// Flag set by tagged returns; only function targets have one.
    pub did_return: Option<String>,
    /// Relocated function name and entry label, in discovery order.
    pub relocations: Vec<(String, String)>,
}

impl<'a> FlatteningContext<'a> {
    pub fn new(
        config: &'a FlatteningConfig,
        analyzer: SafetyAnalyzer<'a>,
        names: &'a mut NameGenerator,
        rng: &'a mut StdRng,
        is_function: bool,
    ) -> Self {
        let state_count = rng.random_range(2..=5);
        let state_vars: Vec<String> = (0..state_count).map(|_| names.generate(rng)).collect();
        let goto_marker = names.generate(rng);
        let mut scopes = ScopeArena::new(names.generate(rng), names.generate(rng));
        let root_scope = scopes.add_root();
        let graph = BlockGraph::new(state_vars, goto_marker, config.state_range, root_scope, rng);
        let dispatch_name = names.generate(rng);
        let args_name = names.generate(rng);
        let switch_label = names.generate(rng);
        let did_return = is_function.then(|| names.generate(rng));
        Self {
            config,
            analyzer,
            names,
            rng,
            graph,
            scopes,
            root_scope,
            dispatch_name,
            args_name,
            switch_label,
            did_return,
            relocations: Vec::new(),
        }
    }

    /// Registers the bindings of a function (or program) body with `scope`.
    ///
    /// Covers parameters, every `var` in the body, and the lexical declarations made directly
    /// in it. Declarations inside flattened branches belong to the branch scopes.
    pub fn declare_function_scope(&mut self, scope: ScopeId, params: &[Pat], stmts: &[Stmt]) {
        let mut idents = Vec::new();
        for param in params {
            binding_idents(param, &mut idents);
        }
        idents.extend(var_idents(stmts));
        idents.extend(lexical_idents(stmts));
        for id in idents {
            self.scopes.declare(scope, id.to_id());
        }
    }

    pub fn declare_block_scope(&mut self, scope: ScopeId, stmts: &[Stmt]) {
        for id in lexical_idents(stmts) {
            self.scopes.declare(scope, id.to_id());
        }
    }

    /// Splits `stmts` into blocks starting at `entry`.
    ///
    /// With `completion` set, a trailing expression statement is returned from the dispatch
    /// function so the program keeps its completion value.
    pub fn flatten_statements(
        &mut self,
        stmts: Vec<Stmt>,
        scope: ScopeId,
        entry: String,
        exit: Exit,
        completion: bool,
    ) -> Result<(), TransformError> {
        self.graph
            .create_block(entry.clone(), scope, BlockKind::Real, self.rng);
        let mut current = entry.clone();
        let mut hoisted = Vec::new();
        let count = stmts.len();

        for (index, stmt) in stmts.into_iter().enumerate() {
            let last = index + 1 == count;
            match stmt {
                Stmt::Decl(Decl::Fn(decl)) => {
                    hoisted.push(self.relocate_function(decl, scope)?);
                    continue;
                }
                Stmt::If(if_stmt) if has_block_arms(&if_stmt) => {
                    current = self.flatten_if(if_stmt, scope, current)?;
                    continue;
                }
                Stmt::Expr(expr) if last && completion => {
                    let ret = Stmt::Return(ReturnStmt {
                        span: expr.span,
                        arg: Some(expr.expr),
                    });
                    self.graph.push(&current, ret);
                }
                stmt => self.graph.push(&current, stmt),
            }

            if !last && self.should_split(&current) {
                let next = self.graph.new_label();
                self.graph.create_block(next.clone(), scope, BlockKind::Real, self.rng);
                let jump = self.graph.goto(&next, EdgeKind::Jump);
                self.graph.push(&current, jump);
                current = next;
            }
        }

        let tail = match exit {
            Exit::Goto(label) => self.graph.goto(&label, EdgeKind::Jump),
            Exit::Return => Stmt::Return(ReturnStmt {
                span: DUMMY_SP,
                arg: None,
            }),
        };
        self.graph.push(&current, tail);

        let body = &mut self.graph.get_mut(&entry).body;
        body.splice(0..0, hoisted);
        Ok(())
    }

    /// Splits more eagerly as the current block grows.
    fn should_split(&mut self, label: &str) -> bool {
        let len = self.graph.get(label).body.len();
        let p = (len as f64 * 0.1).min(0.5);
        self.rng.random_bool(p)
    }

    /// Turns `if (t) {A} else {B}` into a branch between new blocks and returns the label of
    /// the block where both arms meet.
    fn flatten_if(
        &mut self,
        if_stmt: IfStmt,
        scope: ScopeId,
        current: String,
    ) -> Result<String, TransformError> {
        let IfStmt {
            span,
            test,
            cons,
            alt,
        } = if_stmt;
        let cons_label = self.graph.new_label();
        let alt_label = alt.as_ref().map(|_| self.graph.new_label());
        let after_label = self.graph.new_label();

        let to_cons = self.graph.goto(&cons_label, EdgeKind::Branch);
        let to_alt = self
            .graph
            .goto(alt_label.as_ref().unwrap_or(&after_label), EdgeKind::Branch);
        let branch = Stmt::If(IfStmt {
            span,
            test,
            cons: Box::new(block(vec![to_cons])),
            alt: Some(Box::new(block(vec![to_alt]))),
        });
        self.graph.push(&current, branch);

        self.flatten_branch(block_stmts(*cons), scope, cons_label, &after_label)?;
        if let (Some(alt), Some(alt_label)) = (alt, alt_label) {
            self.flatten_branch(block_stmts(*alt), scope, alt_label, &after_label)?;
        }
        self.graph
            .create_block(after_label.clone(), scope, BlockKind::Real, self.rng);
        Ok(after_label)
    }

    fn flatten_branch(
        &mut self,
        stmts: Vec<Stmt>,
        parent: ScopeId,
        label: String,
        after: &str,
    ) -> Result<(), TransformError> {
        let scope = self.scopes.add_block_scope(parent);
        self.declare_block_scope(scope, &stmts);
        self.flatten_statements(stmts, scope, label, Exit::Goto(after.to_string()), false)
    }

    /// Moves a nested function declaration's body into the graph and returns the closure that
    /// replaces it.
    ///
    /// Declarations that cannot be relocated are returned unchanged and only hoisted.
    fn relocate_function(&mut self, decl: FnDecl, scope: ScopeId) -> Result<Stmt, TransformError> {
        if let Err(reason) = self.analyzer.can_relocate(&decl.function) {
            debug!("Keeping nested function `{}` in place: {}", decl.ident.sym, reason);
            return Ok(Stmt::Decl(Decl::Fn(decl)));
        }

        let FnDecl {
            ident, function, ..
        } = decl;
        let function = *function;
        let length = function_length(&function.params);
        let params: Vec<Pat> = function.params.into_iter().map(|p| p.pat).collect();
        let body = function.body.map(|b| b.stmts).unwrap_or_default();

        let fn_scope = self.scopes.add_function_scope(scope);
        self.declare_function_scope(fn_scope, &params, &body);

        let mut stmts = Vec::with_capacity(body.len() + 1);
        if !params.is_empty() {
            stmts.push(unpack_params(params, &self.args_name));
        }
        stmts.extend(body);

        let entry = self.graph.new_label();
        self.flatten_statements(stmts, fn_scope, entry.clone(), Exit::Return, false)?;
        debug!("Relocated `{}` to {}", ident.sym, entry);
        self.relocations.push((ident.sym.to_string(), entry.clone()));
        self.relocated_closure(ident, length, &entry)
    }

    /// `function name(p0, ...) { return dispatch(<entry state>, arguments, { P: frame }); }`
    fn relocated_closure(
        &mut self,
        ident: Ident,
        length: usize,
        entry: &str,
    ) -> Result<Stmt, TransformError> {
        let state_count = self.graph.state_vars.len();
        let param_list: Vec<String> = (0..length).map(|i| format!("$p{i}")).collect();
        let state_list: Vec<String> = (0..state_count).map(|i| format!("$e{i}")).collect();
        let text = format!(
            "function $name({}) {{ return $dispatch({}, arguments, {{ \"$parent\": $frame }}); }}",
            param_list.join(", "),
            state_list.join(", "),
        );

        let param_keys: Vec<String> = (0..length).map(|i| format!("p{i}")).collect();
        let state_keys: Vec<String> = (0..state_count).map(|i| format!("e{i}")).collect();
        let mut bindings = vec![
            ("name", Binding::Ident(ident.sym.to_string())),
            ("dispatch", Binding::Ident(self.dispatch_name.clone())),
            ("parent", Binding::Str(self.scopes.parent_key.clone())),
            ("frame", Binding::Ident(self.scopes.object_name.clone())),
        ];
        for key in &param_keys {
            bindings.push((key.as_str(), Binding::Ident(self.names.generate(self.rng))));
        }
        let values = self.graph.get(entry).state_values.clone();
        for (key, value) in state_keys.iter().zip(values) {
            bindings.push((key.as_str(), Binding::Expr(num_expr(value))));
        }

        let stmt = Template::parse(&text)?.statement(&bindings)?;
        let Stmt::Decl(Decl::Fn(mut closure)) = stmt else {
            return Err(TemplateError::UnexpectedShape("a function declaration").into());
        };
        closure.ident = ident;
        Ok(Stmt::Decl(Decl::Fn(closure)))
    }
}

/// Statements of a block arm; anything else is treated as a one-statement list.
fn block_stmts(stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::Block(block) => block.stmts,
        other => vec![other],
    }
}

/// Number of parameters before the first default or rest parameter.
fn function_length(params: &[swc_core::ecma::ast::Param]) -> usize {
    params
        .iter()
        .take_while(|p| !matches!(p.pat, Pat::Assign(_) | Pat::Rest(_)))
        .count()
}

/// `var [a, b = 1, ...rest] = args;`
fn unpack_params(params: Vec<Pat>, args_name: &str) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Var,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Array(ArrayPat {
                span: DUMMY_SP,
                elems: params.into_iter().map(Some).collect(),
                optional: false,
                type_ann: None,
            }),
            init: Some(Box::new(ident_expr(args_name))),
            definite: false,
        }],
    })))
}
