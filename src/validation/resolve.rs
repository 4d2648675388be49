//! Field path resolution.
//!
//! Walks dotted paths through lookups, checking metadata, access and depth
//! limits along the way, and records each resolved reference in the query's
//! [`Scope`]. Identical lookup chains always map to the same [`JoinStep`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::validated::{typeof_spelling, JoinStep, ResolvedRef};
use super::Checker;
use crate::error::{SoqlError, ValidationCode, ValidationError};
use crate::metadata::{FieldMeta, LookupMeta, ObjectMeta};
use crate::syntax::ast::{FieldPath, TypeOf};
use crate::syntax::span::Position;

/// Lookups a single path may traverse, regardless of configured limits.
pub const MAX_LOOKUP_LEVELS: usize = 15;

/// Clause a field is referenced from. Decides which capability it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    GroupBy,
    Having,
    OrderBy,
}

/// Resolved references of one query level.
#[derive(Debug)]
pub(super) struct Scope {
    pub object: Arc<ObjectMeta>,
    pub alias: Option<String>,
    pub refs: BTreeMap<String, ResolvedRef>,
    pub paths: HashMap<String, String>,
    pub fallbacks: HashMap<String, Vec<String>>,
    pub joins: Vec<JoinStep>,
}

impl Scope {
    pub fn new(object: Arc<ObjectMeta>, alias: Option<String>) -> Self {
        Self {
            object,
            alias,
            refs: BTreeMap::new(),
            paths: HashMap::new(),
            fallbacks: HashMap::new(),
            joins: Vec::new(),
        }
    }

    /// Path segments with a leading FROM alias removed.
    fn strip_alias<'p>(&self, segments: &'p [String]) -> &'p [String] {
        match (&self.alias, segments) {
            (Some(alias), [first, rest @ ..]) if !rest.is_empty() && first.eq_ignore_ascii_case(alias) => {
                rest
            }
            _ => segments,
        }
    }

    fn register(&mut self, spelling: String, resolved: &ResolvedRef) {
        for step in &resolved.joins {
            if !self.joins.iter().any(|j| j.key == step.key) {
                self.joins.push(step.clone());
            }
        }
        self.refs
            .entry(resolved.path.clone())
            .or_insert_with(|| resolved.clone());
        self.paths.insert(spelling, resolved.path.clone());
    }
}

/// Position of a walk through lookups.
struct Walk {
    object: Arc<ObjectMeta>,
    key: Option<String>,
    canonical: Vec<String>,
    joins: Vec<JoinStep>,
}

impl Walk {
    fn start(object: Arc<ObjectMeta>) -> Self {
        Self {
            object,
            key: None,
            canonical: Vec::new(),
            joins: Vec::new(),
        }
    }

    fn child_key(&self, segment: &str) -> String {
        match &self.key {
            Some(key) => format!("{}.{}", key, segment),
            None => segment.to_string(),
        }
    }
}

impl Checker<'_> {
    /// Resolve a field path relative to the scope's object.
    pub(super) fn resolve_path(
        &self,
        scope: &mut Scope,
        path: &FieldPath,
        clause: Clause,
    ) -> Result<ResolvedRef, SoqlError> {
        let segments = scope.strip_alias(&path.segments);
        let (field, lookups) = match segments.split_last() {
            Some(parts) => parts,
            None => {
                return Err(ValidationError::new(ValidationCode::InvalidExpression, "empty field path")
                    .at(path.position)
                    .into())
            }
        };
        let mut walk = Walk::start(Arc::clone(&scope.object));
        for (depth, segment) in lookups.iter().enumerate() {
            walk = self.follow(walk, segment, path.position)?;
            self.check_depth(depth + 1, path.position)?;
        }
        let resolved = self.terminal(walk, field, clause, path.position)?;
        scope.register(path.dotted(), &resolved);
        Ok(resolved)
    }

    /// Resolve every branch of a TYPEOF selection.
    pub(super) fn resolve_typeof(&self, scope: &mut Scope, typeof_: &TypeOf) -> Result<(), SoqlError> {
        let position = typeof_.path.position;
        let segments = scope.strip_alias(&typeof_.path.segments);
        let (name, prefix) = match segments.split_last() {
            Some(parts) => parts,
            None => {
                return Err(ValidationError::new(ValidationCode::InvalidExpression, "empty TYPEOF path")
                    .at(position)
                    .into())
            }
        };

        let mut walk = Walk::start(Arc::clone(&scope.object));
        for (depth, segment) in prefix.iter().enumerate() {
            walk = self.follow(walk, segment, position)?;
            self.check_depth(depth + 1, position)?;
        }
        let lookup = self.lookup(&walk.object, name, position)?;
        if !lookup.is_polymorphic() {
            return Err(ValidationError::new(
                ValidationCode::InvalidExpression,
                format!("TYPEOF requires a polymorphic lookup, {} is not", lookup.name),
            )
            .with_object(walk.object.name.clone())
            .with_field(lookup.name.clone())
            .at(position)
            .into());
        }

        let mut named: Vec<&str> = Vec::new();
        for branch in &typeof_.branches {
            let target = lookup.target(&branch.object).ok_or_else(|| {
                ValidationError::new(
                    ValidationCode::UnknownObject,
                    format!("{} is not a target of lookup {}", branch.object, lookup.name),
                )
                .with_object(branch.object.clone())
                .at(branch.position)
            })?;
            if named.contains(&target) {
                return Err(ValidationError::new(
                    ValidationCode::InvalidExpression,
                    format!("duplicate TYPEOF branch for {}", target),
                )
                .at(branch.position)
                .into());
            }
            named.push(target);

            for field in &branch.fields {
                let resolved =
                    self.resolve_polymorphic(&walk, &lookup, target, prefix.len(), field)?;
                scope.register(typeof_spelling(&typeof_.path, &branch.object, field), &resolved);
            }
        }

        let remaining: Vec<&str> = lookup
            .targets
            .iter()
            .map(String::as_str)
            .filter(|t| !named.contains(t))
            .collect();
        if !typeof_.else_fields.is_empty() && remaining.is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidExpression,
                format!("every target of {} has a WHEN branch, ELSE is unreachable", lookup.name),
            )
            .at(typeof_.position)
            .into());
        }

        for field in &typeof_.else_fields {
            let mut canonical = Vec::with_capacity(remaining.len());
            for target in &remaining {
                let resolved = self.resolve_polymorphic(&walk, &lookup, target, prefix.len(), field)?;
                canonical.push(resolved.path.clone());
                scope.register(typeof_spelling(&typeof_.path, target, field), &resolved);
            }
            scope
                .fallbacks
                .insert(format!("{}.{}", typeof_.path.dotted(), field.dotted()), canonical);
        }
        Ok(())
    }

    /// Resolve `field` on one target of a polymorphic lookup.
    fn resolve_polymorphic(
        &self,
        walk: &Walk,
        lookup: &LookupMeta,
        target: &str,
        prefix_depth: usize,
        field: &FieldPath,
    ) -> Result<ResolvedRef, SoqlError> {
        let position = field.position;
        let (name, lookups) = match field.segments.split_last() {
            Some(parts) => parts,
            None => {
                return Err(ValidationError::new(ValidationCode::InvalidExpression, "empty field path")
                    .at(position)
                    .into())
            }
        };

        let type_column = lookup.type_field.clone().ok_or_else(|| {
            ValidationError::new(
                ValidationCode::InvalidExpression,
                format!("lookup {} has no type field", lookup.name),
            )
            .with_field(lookup.name.clone())
            .at(position)
        })?;
        let segment = format!("{}({})", lookup.name, target);
        let mut next = self.step(walk, lookup, target, &segment, position)?;
        if let Some(step) = next.joins.last_mut() {
            step.discriminator = Some((type_column, step.to_object.clone()));
        }
        self.check_depth(prefix_depth + 1, position)?;
        for (depth, segment) in lookups.iter().enumerate() {
            next = self.follow(next, segment, position)?;
            self.check_depth(prefix_depth + depth + 2, position)?;
        }
        self.terminal(next, name, Clause::Select, position)
    }

    // ========================================================================
    // Walk steps
    // ========================================================================

    fn check_depth(&self, depth: usize, position: Position) -> Result<(), SoqlError> {
        if depth > MAX_LOOKUP_LEVELS {
            return Err(ValidationError::new(
                ValidationCode::TooManyLookupLevels,
                format!(
                    "path traverses {} lookups, at most {} are supported",
                    depth, MAX_LOOKUP_LEVELS
                ),
            )
            .at(position)
            .into());
        }
        self.limits
            .check_lookup_depth(depth)
            .map_err(|e| e.at(position).into())
    }

    fn lookup(
        &self,
        object: &ObjectMeta,
        name: &str,
        position: Position,
    ) -> Result<LookupMeta, SoqlError> {
        let lookup = object.lookup(name).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::UnknownLookup,
                format!("no lookup {} on {}", name, object.name),
            )
            .with_object(object.name.clone())
            .with_field(name)
            .at(position)
        })?;
        self.access
            .can_access_field(self.ctx, &object.name, &lookup.field)
            .map_err(|e| e.at(position))?;
        Ok(lookup.clone())
    }

    /// Follow a non-polymorphic lookup segment.
    fn follow(&self, walk: Walk, segment: &str, position: Position) -> Result<Walk, SoqlError> {
        let lookup = self.lookup(&walk.object, segment, position)?;
        if lookup.is_polymorphic() {
            return Err(ValidationError::new(
                ValidationCode::InvalidExpression,
                format!("polymorphic lookup {} can only be traversed with TYPEOF", lookup.name),
            )
            .with_object(walk.object.name.clone())
            .with_field(lookup.name.clone())
            .at(position)
            .into());
        }
        let target = lookup.targets.first().cloned().unwrap_or_default();
        let name = lookup.name.clone();
        self.step(&walk, &lookup, &target, &name, position)
    }

    /// Join from the walk's object to `target` through `lookup`.
    fn step(
        &self,
        walk: &Walk,
        lookup: &LookupMeta,
        target: &str,
        segment: &str,
        position: Position,
    ) -> Result<Walk, SoqlError> {
        let to = self.object(target, position)?;
        let fk = walk.object.field(&lookup.field).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::UnknownField,
                format!("lookup {} refers to unknown field {}", lookup.name, lookup.field),
            )
            .with_object(walk.object.name.clone())
            .with_field(lookup.field.clone())
            .at(position)
        })?;

        let key = walk.child_key(segment);
        let step = JoinStep {
            key: key.clone(),
            lookup: lookup.name.clone(),
            from_object: walk.object.name.clone(),
            to_object: to.name.clone(),
            fk_column: fk.column.clone(),
            to_table: to.table.clone(),
            to_schema: to.schema.clone(),
            to_id_column: to.id_column.clone(),
            discriminator: None,
        };

        let mut canonical = walk.canonical.clone();
        canonical.push(segment.to_string());
        let mut joins = walk.joins.clone();
        joins.push(step);
        Ok(Walk {
            object: to,
            key: Some(key),
            canonical,
            joins,
        })
    }

    /// Look up an object and check access to it.
    pub(super) fn object(&self, name: &str, position: Position) -> Result<Arc<ObjectMeta>, SoqlError> {
        let object = self.metadata.get_object(name).ok_or_else(|| {
            ValidationError::new(ValidationCode::UnknownObject, format!("unknown object {}", name))
                .with_object(name)
                .at(position)
        })?;
        self.access
            .can_access_object(self.ctx, &object.name)
            .map_err(|e| e.at(position))?;
        Ok(object)
    }

    /// Resolve the terminal field of a walk.
    fn terminal(
        &self,
        walk: Walk,
        name: &str,
        clause: Clause,
        position: Position,
    ) -> Result<ResolvedRef, SoqlError> {
        let object = &walk.object;
        let field = object.field(name).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::UnknownField,
                format!("no field {} on {}", name, object.name),
            )
            .with_object(object.name.clone())
            .with_field(name)
            .at(position)
        })?;
        self.access
            .can_access_field(self.ctx, &object.name, &field.name)
            .map_err(|e| e.at(position))?;
        check_capability(object, field, clause, position)?;

        let mut canonical = walk.canonical;
        canonical.push(field.name.clone());
        Ok(ResolvedRef {
            path: canonical.join("."),
            object: object.name.clone(),
            field: field.clone(),
            joins: walk.joins,
        })
    }
}

fn check_capability(
    object: &ObjectMeta,
    field: &FieldMeta,
    clause: Clause,
    position: Position,
) -> Result<(), SoqlError> {
    let (allowed, code, verb) = match clause {
        Clause::Where | Clause::Having => {
            (field.filterable, ValidationCode::FieldNotFilterable, "filtered")
        }
        Clause::OrderBy => (field.sortable, ValidationCode::FieldNotSortable, "sorted"),
        Clause::GroupBy => (field.groupable, ValidationCode::FieldNotGroupable, "grouped"),
        Clause::Select => return Ok(()),
    };
    if allowed {
        Ok(())
    } else {
        Err(ValidationError::new(
            code,
            format!("field {}.{} cannot be {}", object.name, field.name, verb),
        )
        .with_object(object.name.clone())
        .with_field(field.name.clone())
        .at(position)
        .into())
    }
}
