//! Source queue and extends queue.
//!
//! Units are buffered per source family until the bind-mapping phase drains
//! them. A unit whose supertype is not bound yet waits in the extends queue
//! and is retried after every successful bind.

use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};

use crate::error::MappingError;
use crate::source::{qualify, EntitySource, Origin, ScopeDefaults, SourceFamily};

/// One top-level entity source ready to bind, with its document context
#[derive(Debug, Clone)]
pub struct BindingUnit {
    pub family: SourceFamily,
    pub origin: Origin,
    pub package: Option<String>,
    /// Defaults of the enclosing document
    pub defaults: ScopeDefaults,
    pub auto_import: bool,
    pub source: EntitySource,
}

impl BindingUnit {
    pub fn entity_name(&self) -> String {
        self.source.qualified_name(self.package.as_deref())
    }

    pub fn declared_names(&self) -> Vec<String> {
        self.source.declared_names(self.package.as_deref())
    }

    pub fn supertype(&self) -> Option<&str> {
        self.source.extends.as_deref()
    }
}

/// Names under which a supertype reference may be bound: as written, then
/// qualified with the package
pub fn supertype_candidates(name: &str, package: Option<&str>) -> Vec<String> {
    let mut candidates = vec![name.to_string()];
    let qualified = qualify(name, package);
    if qualified != name {
        candidates.push(qualified);
    }
    candidates
}

/// What the queue needs from an entity binder
pub trait UnitBinder {
    fn is_bound(&self, entity_name: &str) -> bool;

    fn bind(&mut self, unit: &BindingUnit) -> Result<(), MappingError>;
}

fn supertype_bound<B: UnitBinder + ?Sized>(binder: &B, name: &str, package: Option<&str>) -> bool {
    supertype_candidates(name, package)
        .iter()
        .any(|candidate| binder.is_bound(candidate))
}

/// A unit waiting for its supertype
#[derive(Debug, Clone)]
pub struct ExtendsQueueEntry {
    pub supertype: String,
    pub package: Option<String>,
    pub unit: BindingUnit,
}

impl ExtendsQueueEntry {
    /// `Name[package]`, or just the name without a package
    pub fn describe(&self) -> String {
        match &self.package {
            Some(package) => format!("{}[{}]", self.supertype, package),
            None => self.supertype.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceQueue {
    documents: Vec<BindingUnit>,
    declarations: Vec<BindingUnit>,
    /// First source declaring each entity name
    index: IndexMap<String, (SourceFamily, Origin)>,
    /// Family that claimed each entity name while draining
    claims: HashMap<String, SourceFamily>,
    extends: Vec<ExtendsQueueEntry>,
}

impl SourceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, unit: BindingUnit) {
        for name in unit.declared_names() {
            self.index
                .entry(name)
                .or_insert_with(|| (unit.family, unit.origin.clone()));
        }
        self.units_mut(unit.family).push(unit);
    }

    /// Source that first declared `entity_name`
    pub fn origin_of(&self, entity_name: &str) -> Option<&Origin> {
        self.index.get(entity_name).map(|(_, origin)| origin)
    }

    pub fn family_of(&self, entity_name: &str) -> Option<SourceFamily> {
        self.index.get(entity_name).map(|(family, _)| *family)
    }

    pub fn pending_units(&self, family: SourceFamily) -> &[BindingUnit] {
        match family {
            SourceFamily::Document => &self.documents,
            SourceFamily::Declaration => &self.declarations,
        }
    }

    pub fn extends_queue(&self) -> &[ExtendsQueueEntry] {
        &self.extends
    }

    /// Whether any unit is still waiting to be bound
    pub fn has_pending(&self) -> bool {
        !self.extends.is_empty() || !self.documents.is_empty() || !self.declarations.is_empty()
    }

    fn units_mut(&mut self, family: SourceFamily) -> &mut Vec<BindingUnit> {
        match family {
            SourceFamily::Document => &mut self.documents,
            SourceFamily::Declaration => &mut self.declarations,
        }
    }

    /// Order a family's units so every supertype in the family precedes its
    /// subtypes (Kahn's algorithm, stable for unrelated units).
    pub fn order_by_hierarchy(&mut self, family: SourceFamily) -> Result<(), MappingError> {
        let units = std::mem::take(self.units_mut(family));
        let ordered = order_units(units)?;
        *self.units_mut(family) = ordered;
        Ok(())
    }

    /// Bind every unit of `family`, deferring those whose supertype is missing.
    ///
    /// # Returns
    ///
    /// Number of units bound, including deferred units that became bindable
    pub fn drain<B: UnitBinder + ?Sized>(
        &mut self,
        family: SourceFamily,
        binder: &mut B,
    ) -> Result<usize, MappingError> {
        let units = std::mem::take(self.units_mut(family));
        let mut bound = 0;

        for mut unit in units {
            let name = unit.entity_name();
            if let Some(&claimed) = self.claims.get(&name) {
                if claimed != family {
                    tracing::info!(
                        "Skipping {} from {}: already mapped by a {} source",
                        name,
                        unit.origin,
                        claimed
                    );
                    continue;
                }
            }
            let package = unit.package.clone();
            prune_claimed(
                &mut unit.source,
                package.as_deref(),
                family,
                &self.claims,
                &unit.origin,
            );
            for name in unit.declared_names() {
                self.claims.entry(name).or_insert(family);
            }

            bound += self.bind_or_defer(unit, binder)?;
        }

        Ok(bound)
    }

    fn bind_or_defer<B: UnitBinder + ?Sized>(
        &mut self,
        unit: BindingUnit,
        binder: &mut B,
    ) -> Result<usize, MappingError> {
        if let Some(supertype) = unit.supertype() {
            if !supertype_bound(&*binder, supertype, unit.package.as_deref()) {
                tracing::debug!(
                    "Deferring {} until supertype {} is bound",
                    unit.entity_name(),
                    supertype
                );
                self.extends.push(ExtendsQueueEntry {
                    supertype: supertype.to_string(),
                    package: unit.package.clone(),
                    unit,
                });
                return Ok(0);
            }
        }

        binder.bind(&unit).map_err(|e| e.in_origin(&unit.origin))?;
        Ok(1 + self.process_extends_queue(binder)?)
    }

    /// Bind every queued entry whose supertype is available, until none progresses.
    pub fn process_extends_queue<B: UnitBinder + ?Sized>(
        &mut self,
        binder: &mut B,
    ) -> Result<usize, MappingError> {
        let mut bound = 0;
        loop {
            let ready = self
                .extends
                .iter()
                .position(|entry| supertype_bound(&*binder, &entry.supertype, entry.package.as_deref()));
            let Some(index) = ready else {
                break;
            };

            let entry = self.extends.remove(index);
            tracing::debug!(
                "Binding deferred {} now that {} is bound",
                entry.unit.entity_name(),
                entry.supertype
            );
            binder
                .bind(&entry.unit)
                .map_err(|e| e.in_origin(&entry.unit.origin))?;
            bound += 1;
        }
        Ok(bound)
    }

    /// Final flush after every family drained; leftovers are orphans.
    pub fn finish<B: UnitBinder + ?Sized>(&mut self, binder: &mut B) -> Result<(), MappingError> {
        self.process_extends_queue(binder)?;
        if self.extends.is_empty() {
            return Ok(());
        }
        Err(MappingError::UnresolvedSupertypes {
            entries: self.extends.iter().map(ExtendsQueueEntry::describe).collect(),
        })
    }
}

/// Drop nested subclasses another family already claimed, with their subtrees.
fn prune_claimed(
    source: &mut EntitySource,
    package: Option<&str>,
    family: SourceFamily,
    claims: &HashMap<String, SourceFamily>,
    origin: &Origin,
) {
    source.subclasses.retain(|sub| {
        let name = sub.qualified_name(package);
        match claims.get(&name) {
            Some(&claimed) if claimed != family => {
                tracing::info!(
                    "Skipping subclass {} from {}: already mapped by a {} source",
                    name,
                    origin,
                    claimed
                );
                false
            }
            _ => true,
        }
    });
    for sub in &mut source.subclasses {
        prune_claimed(sub, package, family, claims, origin);
    }
}

fn order_units(units: Vec<BindingUnit>) -> Result<Vec<BindingUnit>, MappingError> {
    let names: Vec<String> = units.iter().map(BindingUnit::entity_name).collect();
    let position: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let mut in_degree = vec![0usize; units.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); units.len()];

    for (index, unit) in units.iter().enumerate() {
        let Some(supertype) = unit.supertype() else {
            continue;
        };
        let parent = supertype_candidates(supertype, unit.package.as_deref())
            .iter()
            .find_map(|candidate| position.get(candidate.as_str()).copied());
        if let Some(parent) = parent {
            in_degree[index] += 1;
            children[parent].push(index);
        }
    }

    let mut queue: VecDeque<usize> = (0..units.len())
        .filter(|index| in_degree[*index] == 0)
        .collect();
    let mut sorted = Vec::with_capacity(units.len());

    while let Some(index) = queue.pop_front() {
        sorted.push(index);
        for child in &children[index] {
            in_degree[*child] -= 1;
            if in_degree[*child] == 0 {
                queue.push_back(*child);
            }
        }
    }

    if sorted.len() != units.len() {
        let entities = (0..units.len())
            .filter(|index| in_degree[*index] > 0)
            .map(|index| names[index].clone())
            .collect();
        return Err(MappingError::CircularInheritance { entities });
    }

    let mut slots: Vec<Option<BindingUnit>> = units.into_iter().map(Some).collect();
    Ok(sorted
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingBinder {
        bound: Vec<String>,
        names: HashSet<String>,
    }

    impl UnitBinder for RecordingBinder {
        fn is_bound(&self, entity_name: &str) -> bool {
            self.names.contains(entity_name)
        }

        fn bind(&mut self, unit: &BindingUnit) -> Result<(), MappingError> {
            for name in unit.declared_names() {
                if !self.names.insert(name.clone()) {
                    return Err(MappingError::DuplicateMapping {
                        kind: crate::error::DuplicateKind::Entity,
                        name,
                    });
                }
            }
            self.bound.push(unit.entity_name());
            Ok(())
        }
    }

    fn unit(family: SourceFamily, package: Option<&str>, name: &str, extends: Option<&str>) -> BindingUnit {
        let yaml = match extends {
            Some(extends) => format!("name: {}\nextends: {}\n", name, extends),
            None => format!("name: {}\n", name),
        };
        BindingUnit {
            family,
            origin: Origin::inline(name),
            package: package.map(str::to_string),
            defaults: ScopeDefaults::default(),
            auto_import: true,
            source: serde_yaml::from_str(&yaml).unwrap(),
        }
    }

    fn doc(name: &str, extends: Option<&str>) -> BindingUnit {
        unit(SourceFamily::Document, Some("com.example"), name, extends)
    }

    fn decl(name: &str, extends: Option<&str>) -> BindingUnit {
        unit(SourceFamily::Declaration, None, name, extends)
    }

    #[test]
    fn test_subtype_waits_for_supertype() {
        let mut queue = SourceQueue::new();
        queue.enqueue(doc("Child", Some("Parent")));
        queue.enqueue(doc("GrandChild", Some("Child")));
        queue.enqueue(doc("Parent", None));

        let mut binder = RecordingBinder::default();
        let bound = queue.drain(SourceFamily::Document, &mut binder).unwrap();

        assert_eq!(bound, 3);
        assert_eq!(
            binder.bound,
            vec![
                "com.example.Parent",
                "com.example.Child",
                "com.example.GrandChild"
            ]
        );
        assert!(queue.extends_queue().is_empty());
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_orphans_reported_after_all_families() {
        let mut queue = SourceQueue::new();
        queue.enqueue(doc("Child", Some("com.example.Missing")));
        queue.enqueue(decl("org.other.Leaf", Some("org.other.Absent")));

        let mut binder = RecordingBinder::default();
        queue.drain(SourceFamily::Document, &mut binder).unwrap();
        queue.drain(SourceFamily::Declaration, &mut binder).unwrap();
        let err = queue.finish(&mut binder).unwrap_err();

        match err {
            MappingError::UnresolvedSupertypes { entries } => {
                assert_eq!(
                    entries,
                    vec!["com.example.Missing[com.example]", "org.other.Absent"]
                );
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_cross_family_supertype() {
        let mut queue = SourceQueue::new();
        queue.enqueue(doc("Child", Some("com.example.Base")));
        queue.enqueue(decl("com.example.Base", None));

        let mut binder = RecordingBinder::default();
        queue.drain(SourceFamily::Document, &mut binder).unwrap();
        assert_eq!(queue.extends_queue().len(), 1);

        queue.drain(SourceFamily::Declaration, &mut binder).unwrap();
        queue.finish(&mut binder).unwrap();
        assert_eq!(binder.bound, vec!["com.example.Base", "com.example.Child"]);
    }

    #[test]
    fn test_later_family_skips_claimed_names() {
        let mut queue = SourceQueue::new();
        queue.enqueue(doc("Foo", None));
        queue.enqueue(decl("com.example.Foo", None));

        let mut binder = RecordingBinder::default();
        queue.drain(SourceFamily::Document, &mut binder).unwrap();
        let bound = queue.drain(SourceFamily::Declaration, &mut binder).unwrap();

        assert_eq!(bound, 0);
        assert_eq!(binder.bound, vec!["com.example.Foo"]);
        assert_eq!(queue.family_of("com.example.Foo"), Some(SourceFamily::Document));
    }

    fn nested_doc(yaml: &str) -> BindingUnit {
        BindingUnit {
            family: SourceFamily::Document,
            origin: Origin::inline("animals.yaml"),
            package: Some("com.example".to_string()),
            defaults: ScopeDefaults::default(),
            auto_import: true,
            source: serde_yaml::from_str(yaml).unwrap(),
        }
    }

    const ANIMALS: &str = "name: Animal\nsubclasses:\n  - name: Dog\n  - name: Cat\n";

    #[test]
    fn test_nested_subclass_claimed_by_declaration() {
        let mut queue = SourceQueue::new();
        queue.enqueue(decl("com.example.Dog", Some("com.example.Animal")));
        queue.enqueue(nested_doc(ANIMALS));

        let mut binder = RecordingBinder::default();
        queue.drain(SourceFamily::Declaration, &mut binder).unwrap();
        assert_eq!(queue.extends_queue().len(), 1);

        queue.drain(SourceFamily::Document, &mut binder).unwrap();
        queue.finish(&mut binder).unwrap();

        assert_eq!(binder.bound, vec!["com.example.Animal", "com.example.Dog"]);
        assert!(binder.names.contains("com.example.Cat"));
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_nested_subclass_claimed_by_document() {
        let mut queue = SourceQueue::new();
        queue.enqueue(nested_doc(ANIMALS));
        queue.enqueue(decl("com.example.Dog", Some("com.example.Animal")));

        let mut binder = RecordingBinder::default();
        queue.drain(SourceFamily::Document, &mut binder).unwrap();
        let bound = queue.drain(SourceFamily::Declaration, &mut binder).unwrap();
        queue.finish(&mut binder).unwrap();

        assert_eq!(bound, 0);
        assert_eq!(binder.bound, vec!["com.example.Animal"]);
        assert!(binder.names.contains("com.example.Dog"));
    }

    #[test]
    fn test_duplicate_within_family_is_fatal() {
        let mut queue = SourceQueue::new();
        queue.enqueue(decl("com.example.Foo", None));
        queue.enqueue(decl("com.example.Foo", None));

        let mut binder = RecordingBinder::default();
        let err = queue
            .drain(SourceFamily::Declaration, &mut binder)
            .unwrap_err();
        assert!(err.to_string().contains("com.example.Foo"));
        assert!(matches!(
            err.innermost(),
            MappingError::DuplicateMapping { .. }
        ));
    }

    #[test]
    fn test_declarations_ordered_superclass_first() {
        let mut queue = SourceQueue::new();
        queue.enqueue(decl("a.Leaf", Some("a.Middle")));
        queue.enqueue(decl("a.Other", None));
        queue.enqueue(decl("a.Middle", Some("a.Root")));
        queue.enqueue(decl("a.Root", None));

        queue.order_by_hierarchy(SourceFamily::Declaration).unwrap();
        let order: Vec<String> = queue
            .pending_units(SourceFamily::Declaration)
            .iter()
            .map(BindingUnit::entity_name)
            .collect();
        assert_eq!(order, vec!["a.Other", "a.Root", "a.Middle", "a.Leaf"]);
    }

    #[test]
    fn test_circular_inheritance() {
        let mut queue = SourceQueue::new();
        queue.enqueue(decl("a.A", Some("a.B")));
        queue.enqueue(decl("a.B", Some("a.A")));
        queue.enqueue(decl("a.C", None));

        let err = queue
            .order_by_hierarchy(SourceFamily::Declaration)
            .unwrap_err();
        match err {
            MappingError::CircularInheritance { entities } => {
                assert_eq!(entities, vec!["a.A", "a.B"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_index_records_nested_names() {
        let yaml = "name: Parent\nsubclasses:\n  - name: Child\n";
        let mut queue = SourceQueue::new();
        queue.enqueue(BindingUnit {
            family: SourceFamily::Document,
            origin: Origin::inline("shop.yaml"),
            package: Some("com.example".to_string()),
            defaults: ScopeDefaults::default(),
            auto_import: true,
            source: serde_yaml::from_str(yaml).unwrap(),
        });
        assert_eq!(
            queue.origin_of("com.example.Child"),
            Some(&Origin::inline("shop.yaml"))
        );
    }
}
