//! Scope managers: where each flattened binding lives at run time.
//!
//! Bindings of a flattened target no longer live in JavaScript scopes; they become properties of
//! a *frame* object passed to the dispatch function. One frame exists per invocation of the
//! target or of a relocated nested function, and every frame links to its lexical parent under a
//! fixed property. A `ScopeManager` covers one lexical scope (function body or flattened branch
//! block) and maps the binding names declared in it to fresh property names; several scope
//! managers can share a frame.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use std::collections::HashMap;
use swc_core::ecma::ast::{Expr, Id, MemberExpr};
use tangle_core::ast::{computed_member, ident_expr};
use tangle_core::names::NameGenerator;
use tangle_core::report::ScopeSummary;

/// Index of a scope manager in its [`ScopeArena`].
pub type ScopeId = usize;
/// Index of a run-time frame in its [`ScopeArena`].
pub type FrameId = usize;

/// Property names for the bindings of one lexical scope.
#[derive(Debug, Clone)]
pub struct ScopeManager {
    /// Own index in the arena.
    pub id: ScopeId,
    /// Enclosing scope, `None` for the target root.
    pub parent: Option<ScopeId>,
    /// Run-time frame holding this scope's properties.
    pub frame: FrameId,
    /// Original binding name to property name, allocated on first use.
    name_map: IndexMap<String, String>,
}

impl ScopeManager {
    /// Returns the property for `original`, allocating a fresh one on first use.
    pub fn get_new_name(
        &mut self,
        original: &str,
        names: &mut NameGenerator,
        rng: &mut StdRng,
    ) -> String {
        if let Some(name) = self.name_map.get(original) {
            return name.clone();
        }
        let name = names.generate(rng);
        self.name_map.insert(original.to_string(), name.clone());
        name
    }

    /// Allocated properties in allocation order.
    pub fn name_map(&self) -> &IndexMap<String, String> {
        &self.name_map
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: Option<FrameId>,
}

/// All scope managers and frames of one flattening target.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<ScopeManager>,
    frames: Vec<Frame>,
    owners: HashMap<Id, ScopeId>,
    /// Dispatch parameter that holds the current frame.
    pub object_name: String,
    /// Property under which a frame stores its parent frame.
    pub parent_key: String,
}

impl ScopeArena {
    pub fn new(object_name: String, parent_key: String) -> Self {
        Self {
            scopes: Vec::new(),
            frames: Vec::new(),
            owners: HashMap::new(),
            object_name,
            parent_key,
        }
    }

    /// Scope of the flattened target itself, on the root frame.
    pub fn add_root(&mut self) -> ScopeId {
        assert!(self.scopes.is_empty(), "the root scope must be created first");
        self.frames.push(Frame { parent: None });
        self.push_scope(None, 0)
    }

    /// Scope of a relocated function body, on a new frame whose parent is `parent`'s frame.
    pub fn add_function_scope(&mut self, parent: ScopeId) -> ScopeId {
        let parent_frame = self.scope(parent).frame;
        self.frames.push(Frame {
            parent: Some(parent_frame),
        });
        let frame = self.frames.len() - 1;
        self.push_scope(Some(parent), frame)
    }

    /// Scope of a flattened branch block, sharing `parent`'s frame.
    pub fn add_block_scope(&mut self, parent: ScopeId) -> ScopeId {
        let frame = self.scope(parent).frame;
        self.push_scope(Some(parent), frame)
    }

    fn push_scope(&mut self, parent: Option<ScopeId>, frame: FrameId) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(ScopeManager {
            id,
            parent,
            frame,
            name_map: IndexMap::new(),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeManager {
        &self.scopes[id]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeManager {
        &mut self.scopes[id]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Records that the binding `id` is declared directly in `scope`.
    pub fn declare(&mut self, scope: ScopeId, id: Id) {
        self.owners.insert(id, scope);
    }

    pub fn owner_of(&self, id: &Id) -> Option<ScopeId> {
        self.owners.get(id).copied()
    }

    pub fn is_tracked(&self, id: &Id) -> bool {
        self.owners.contains_key(id)
    }

    /// Whether `original` already has a property in `scope` or one of its ancestors.
    pub fn has_name(&self, scope: ScopeId, original: &str) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            let manager = self.scope(id);
            if manager.name_map.contains_key(original) {
                return true;
            }
            current = manager.parent;
        }
        false
    }

    /// Number of parent links from `from`'s frame to `owner`'s frame.
    ///
    /// Panics if `owner` is not lexically enclosing `from`, which would mean a binding escaped
    /// the scope that declares it.
    pub fn frame_distance(&self, from: ScopeId, owner: ScopeId) -> usize {
        let target = self.scope(owner).frame;
        let mut frame = self.scope(from).frame;
        let mut distance = 0;
        while frame != target {
            frame = match self.frames[frame].parent {
                Some(parent) => parent,
                None => panic!("scope {owner} does not enclose scope {from}"),
            };
            distance += 1;
        }
        distance
    }

    /// `frame[P][P]...["property"]` for accessing a property of `owner` from code in `from`.
    pub fn get_member_expression(&self, from: ScopeId, owner: ScopeId, property: &str) -> MemberExpr {
        let mut object = ident_expr(&self.object_name);
        for _ in 0..self.frame_distance(from, owner) {
            object = Expr::Member(computed_member(object, &self.parent_key));
        }
        computed_member(object, property)
    }

    pub fn summaries(&self) -> Vec<ScopeSummary> {
        self.scopes
            .iter()
            .map(|s| ScopeSummary {
                id: s.id,
                parent: s.parent,
                frame: s.frame,
                names: s
                    .name_map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect()
    }
}
