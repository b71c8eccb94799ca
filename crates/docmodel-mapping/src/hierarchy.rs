//! Inheritance hierarchy arena.
//!
//! Type mappings live in one `Vec`, addressed by [`MappingId`]. Parent links
//! are declared by name and resolved by [`Hierarchy::link`], which also
//! computes every node's root. Indexes and the discriminator table are kept
//! on the root only.

use crate::type_mapping::{MappingId, TypeMapping};
use docmodel_core::error::{MappingErrorKind, MappingIssue};
use docmodel_core::{IndexMapping, MappingConfig};
use std::collections::{HashMap, HashSet};

/// Arena of type mappings with parent/root links.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    nodes: Vec<TypeMapping>,
    by_name: HashMap<String, MappingId>,
    linked: bool,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty mapping for `name`.
    pub fn add_type(&mut self, name: &str) -> Result<MappingId, MappingIssue> {
        if self.by_name.contains_key(name) {
            return Err(MappingIssue::new(
                name,
                MappingErrorKind::DuplicateType,
                format!("type '{}' is described more than once", name),
            ));
        }
        let id = MappingId(self.nodes.len());
        self.nodes.push(TypeMapping::new(id, name));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mapping by id. Ids are only handed out by this arena.
    pub fn get(&self, id: MappingId) -> &TypeMapping {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: MappingId) -> &mut TypeMapping {
        &mut self.nodes[id.0]
    }

    pub fn id_of(&self, name: &str) -> Option<MappingId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeMapping> {
        self.id_of(name).map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeMapping> {
        self.nodes.iter()
    }

    /// Root mapping of the hierarchy `id` belongs to.
    pub fn root_of(&self, id: MappingId) -> &TypeMapping {
        self.get(self.get(id).root)
    }

    /// Resolve parent names, reject cycles and assign every node's root.
    ///
    /// Nodes with an unknown parent, or on a cycle, are turned into roots so
    /// the rest of the build can keep collecting issues.
    pub fn link(&mut self) -> Vec<MappingIssue> {
        let mut issues = Vec::new();

        for i in 0..self.nodes.len() {
            let Some(parent_name) = self.nodes[i].parent_name.clone() else {
                continue;
            };
            match self.by_name.get(&parent_name) {
                Some(&pid) => self.nodes[i].parent = Some(pid),
                None => issues.push(MappingIssue::new(
                    &self.nodes[i].name,
                    MappingErrorKind::UnknownParent,
                    format!("parent type '{}' is not mapped", parent_name),
                )),
            }
        }

        self.break_cycles(&mut issues);

        for i in 0..self.nodes.len() {
            let mut current = MappingId(i);
            while let Some(parent) = self.nodes[current.0].parent {
                current = parent;
            }
            let node = &mut self.nodes[i];
            node.root = current;
            node.flags.root = node.parent.is_none();
        }

        self.linked = true;
        tracing::trace!(types = self.nodes.len(), "linked inheritance hierarchy");
        issues
    }

    fn break_cycles(&mut self, issues: &mut Vec<MappingIssue>) {
        let mut visited = HashSet::new();
        for i in 0..self.nodes.len() {
            let start = MappingId(i);
            if visited.contains(&start) {
                continue;
            }
            let mut rec_stack = HashSet::new();
            let mut path = Vec::new();
            if self.detect_cycle_dfs(start, &mut visited, &mut rec_stack, &mut path) {
                // path ends with the node that closed the cycle
                let Some(&closing) = path.last() else { continue };
                let begin = path.iter().position(|&id| id == closing).unwrap_or(0);
                let cycle = &path[begin..];
                let names: Vec<&str> = cycle.iter().map(|id| self.get(*id).name()).collect();
                issues.push(MappingIssue::new(
                    self.get(closing).name(),
                    MappingErrorKind::InheritanceCycle,
                    format!("inheritance cycle: {}", names.join(" -> ")),
                ));
                let members: Vec<MappingId> = cycle.to_vec();
                for id in members {
                    self.nodes[id.0].parent = None;
                }
            }
        }
    }

    fn detect_cycle_dfs(
        &self,
        id: MappingId,
        visited: &mut HashSet<MappingId>,
        rec_stack: &mut HashSet<MappingId>,
        path: &mut Vec<MappingId>,
    ) -> bool {
        visited.insert(id);
        rec_stack.insert(id);
        path.push(id);

        if let Some(parent) = self.nodes[id.0].parent {
            if !visited.contains(&parent) {
                if self.detect_cycle_dfs(parent, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&parent) {
                path.push(parent);
                return true;
            }
        }

        rec_stack.remove(&id);
        path.pop();
        false
    }

    fn depth(&self, id: MappingId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Store an index on the root of `id`'s hierarchy.
    ///
    /// Must be called after [`Hierarchy::link`].
    pub fn add_index(&mut self, id: MappingId, index: IndexMapping) {
        debug_assert!(self.linked, "add_index before link");
        let root = self.nodes[id.0].root;
        self.nodes[root.0].indexes.push(index);
    }

    /// Register `value` for `id` in its root's discriminator table.
    pub fn set_discriminator_value(
        &mut self,
        id: MappingId,
        value: impl Into<String>,
    ) -> Result<(), MappingIssue> {
        let value = value.into();
        let root = self.nodes[id.0].root;

        if let Some(&owner) = self.nodes[root.0].discriminators.get(&value) {
            if owner == id {
                return Ok(());
            }
            return Err(MappingIssue::new(
                &self.nodes[id.0].name,
                MappingErrorKind::DuplicateDiscriminator,
                format!(
                    "discriminator value '{}' is claimed by both {} and {}",
                    value, self.nodes[owner.0].name, self.nodes[id.0].name
                ),
            ));
        }

        if let Some(old) = self.nodes[id.0].discriminator_value.take() {
            let table = &mut self.nodes[root.0].discriminators;
            if table.get(&old) == Some(&id) {
                table.remove(&old);
            }
        }
        self.nodes[root.0].discriminators.insert(value.clone(), id);
        self.nodes[id.0].discriminator_value = Some(value);
        Ok(())
    }

    /// Find the type registered for `value` in `id`'s hierarchy.
    pub fn resolve_by_discriminator(&self, id: MappingId, value: &str) -> Option<MappingId> {
        let root = self.nodes[id.0].root;
        self.nodes[root.0].discriminators.get(value).copied()
    }

    /// Whether `id`'s hierarchy has more than one registered type.
    pub fn is_polymorphic(&self, id: MappingId) -> bool {
        self.root_of(id).discriminators.len() > 1
    }

    /// Apply configuration defaults to every node, roots first.
    ///
    /// Runs at most once per node; later calls are no-ops.
    pub fn apply_defaults(&mut self, config: &MappingConfig) -> Vec<MappingIssue> {
        let mut order: Vec<MappingId> = (0..self.nodes.len()).map(MappingId).collect();
        order.sort_by_key(|id| self.depth(*id));

        let mut issues = Vec::new();
        for id in order {
            if self.nodes[id.0].defaults_applied {
                continue;
            }
            if self.nodes[id.0].root == id {
                self.apply_root_defaults(id, config, &mut issues);
            } else {
                self.inherit_from_root(id, config, &mut issues);
            }

            if self.nodes[id.0].discriminator_value.is_none() {
                let name = self.nodes[id.0].name.clone();
                if let Err(issue) = self.set_discriminator_value(id, name) {
                    issues.push(issue);
                }
            }
            self.nodes[id.0].defaults_applied = true;
        }
        issues
    }

    fn apply_root_defaults(
        &mut self,
        id: MappingId,
        config: &MappingConfig,
        issues: &mut Vec<MappingIssue>,
    ) {
        let node = &mut self.nodes[id.0];
        if !node.flags.document {
            return;
        }

        node.discriminator_field
            .get_or_insert_with(|| config.discriminator_field.clone());
        node.lock_field
            .get_or_insert_with(|| config.lock_field.clone());
        node.version_field
            .get_or_insert_with(|| config.version_field.clone());
        node.change_tracking.get_or_insert(config.change_tracking);
        if node.database.is_none() {
            node.database.clone_from(&config.default_database);
        }

        match node.collection.take() {
            Some(explicit) => node.collection = Some(config.prefixed(&explicit)),
            None if config.default_collection_names => {
                let derived = config.derived_collection_name(&node.name);
                node.collection = Some(config.prefixed(&derived));
            }
            None => issues.push(MappingIssue::new(
                &node.name,
                MappingErrorKind::MissingCollectionName,
                "document type has no collection name and derived names are disabled",
            )),
        }

        tracing::trace!(
            type_name = %node.name,
            collection = ?node.collection,
            "applied root defaults"
        );
    }

    fn inherit_from_root(
        &mut self,
        id: MappingId,
        config: &MappingConfig,
        issues: &mut Vec<MappingIssue>,
    ) {
        let root = self.nodes[self.nodes[id.0].root.0].clone();
        let node = &mut self.nodes[id.0];

        if node.flags.document != root.flags.document || node.flags.embedded != root.flags.embedded
        {
            issues.push(MappingIssue::new(
                &node.name,
                MappingErrorKind::IncompatibleFlags,
                format!(
                    "document/embedded kind differs from hierarchy root {}",
                    root.name
                ),
            ));
        }

        if let Some(own) = node.collection.as_deref() {
            let own = config.prefixed(own);
            if root.collection.as_deref() != Some(own.as_str()) {
                issues.push(MappingIssue::new(
                    &node.name,
                    MappingErrorKind::IncompatibleFlags,
                    format!(
                        "collection '{}' differs from '{}' used by hierarchy root {}",
                        own,
                        root.collection.as_deref().unwrap_or("<none>"),
                        root.name
                    ),
                ));
            }
        }

        node.discriminator_field.clone_from(&root.discriminator_field);
        node.collection.clone_from(&root.collection);
        node.database.clone_from(&root.database);
        if node.change_tracking.is_none() {
            node.change_tracking = root.change_tracking;
        }
        node.flags.immutable |= root.flags.immutable;
        node.versioned |= root.versioned;
        if node.version_field.is_none() {
            node.version_field.clone_from(&root.version_field);
        }
        node.locked |= root.locked;
        if node.lock_field.is_none() {
            node.lock_field.clone_from(&root.lock_field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::{ChangeTracking, IndexOrder};

    fn animals() -> (Hierarchy, MappingId, MappingId, MappingId) {
        let mut h = Hierarchy::new();
        let animal = h.add_type("Animal").unwrap();
        let cat = h.add_type("Cat").unwrap();
        let dog = h.add_type("Dog").unwrap();
        for id in [animal, cat, dog] {
            h.get_mut(id).flags.document = true;
        }
        h.get_mut(cat).parent_name = Some("Animal".to_string());
        h.get_mut(dog).parent_name = Some("Animal".to_string());
        (h, animal, cat, dog)
    }

    #[test]
    fn test_link_assigns_roots() {
        let (mut h, animal, cat, dog) = animals();
        assert!(h.link().is_empty());
        assert!(h.get(animal).is_root());
        assert!(!h.get(cat).is_root());
        assert_eq!(h.get(cat).root(), animal);
        assert_eq!(h.get(dog).parent(), Some(animal));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut h = Hierarchy::new();
        h.add_type("A").unwrap();
        let issue = h.add_type("A").unwrap_err();
        assert_eq!(issue.kind, MappingErrorKind::DuplicateType);
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let mut h = Hierarchy::new();
        let a = h.add_type("A").unwrap();
        h.get_mut(a).parent_name = Some("Missing".to_string());
        let issues = h.link();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, MappingErrorKind::UnknownParent);
        assert!(h.get(a).is_root());
    }

    #[test]
    fn test_cycle_detected() {
        let mut h = Hierarchy::new();
        let a = h.add_type("A").unwrap();
        let b = h.add_type("B").unwrap();
        h.get_mut(a).parent_name = Some("B".to_string());
        h.get_mut(b).parent_name = Some("A".to_string());

        let issues = h.link();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, MappingErrorKind::InheritanceCycle);
        assert!(issues[0].message.contains("A -> B -> A"));
        assert!(h.get(a).is_root());
        assert!(h.get(b).is_root());
    }

    #[test]
    fn test_indexes_stored_on_root() {
        let (mut h, animal, cat, _) = animals();
        h.link();
        h.add_index(cat, IndexMapping::on("name", IndexOrder::Ascending));
        assert!(h.get(cat).indexes().is_empty());
        assert_eq!(h.get(animal).indexes().len(), 1);
    }

    #[test]
    fn test_discriminator_values_unique_per_hierarchy() {
        let (mut h, animal, cat, dog) = animals();
        h.link();
        h.set_discriminator_value(cat, "pet").unwrap();
        // same type, same value: idempotent
        h.set_discriminator_value(cat, "pet").unwrap();

        let issue = h.set_discriminator_value(dog, "pet").unwrap_err();
        assert_eq!(issue.kind, MappingErrorKind::DuplicateDiscriminator);
        assert!(issue.message.contains("Cat"));
        assert!(issue.message.contains("Dog"));

        assert_eq!(h.resolve_by_discriminator(animal, "pet"), Some(cat));
        assert_eq!(h.resolve_by_discriminator(dog, "pet"), Some(cat));
        assert_eq!(h.resolve_by_discriminator(animal, "Dog"), None);
    }

    #[test]
    fn test_apply_defaults_cascades_from_root() {
        let (mut h, animal, cat, dog) = animals();
        h.link();
        let issues = h.apply_defaults(&MappingConfig::default());
        assert!(issues.is_empty(), "{issues:?}");

        let root = h.get(animal);
        assert_eq!(root.discriminator_field(), Some("__t"));
        assert_eq!(root.lock_field(), Some("__l"));
        assert_eq!(root.version_field(), Some("__v"));
        assert_eq!(root.change_tracking(), ChangeTracking::DeferredImplicit);
        assert_eq!(root.collection(), Some("animal"));

        assert_eq!(h.get(cat).discriminator_field(), Some("__t"));
        assert_eq!(h.get(cat).discriminator_value(), Some("Cat"));
        assert_eq!(h.get(dog).collection(), Some("animal"));
        assert!(h.is_polymorphic(dog));
        assert_eq!(h.resolve_by_discriminator(animal, "Dog"), Some(dog));
    }

    #[test]
    fn test_apply_defaults_runs_once() {
        let (mut h, animal, _, _) = animals();
        h.link();
        let config = MappingConfig::new().collection_prefix("ns.");
        h.apply_defaults(&config);
        h.apply_defaults(&config);
        assert_eq!(h.get(animal).collection(), Some("ns.animal"));
    }

    #[test]
    fn test_missing_collection_name() {
        let mut h = Hierarchy::new();
        let a = h.add_type("A").unwrap();
        h.get_mut(a).flags.document = true;
        h.link();
        let issues = h.apply_defaults(&MappingConfig::new().default_collection_names(false));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, MappingErrorKind::MissingCollectionName);
    }

    #[test]
    fn test_subtype_with_foreign_collection() {
        let (mut h, _, cat, _) = animals();
        h.get_mut(cat).collection = Some("cats".to_string());
        h.link();
        let issues = h.apply_defaults(&MappingConfig::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, MappingErrorKind::IncompatibleFlags);
        assert_eq!(h.get(cat).collection(), Some("animal"));
    }
}
