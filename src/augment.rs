use std::collections::{BTreeSet, HashMap};

use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::data::{Element, ElementKey, ElementKind, ElementType, OsmId};
use crate::errors::{Error, Result};

/// Where parents missing from the working set are fetched from.
///
/// Calls block until they return elements or fail; retries and timeouts are
/// the implementor's business.
pub trait ElementSource: Send + Sync {
    fn ways_containing_node(&self, node_id: OsmId) -> Result<Vec<Element>>;
    fn relations_containing(&self, key: ElementKey) -> Result<Vec<Element>>;
}

/// Lookups answered from a fixed set of elements, e.g. a local .osm extract.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    ways_by_node: HashMap<OsmId, Vec<Element>>,
    relations_by_member: HashMap<ElementKey, Vec<Element>>,
}

impl InMemorySource {
    pub fn new(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut source = InMemorySource::default();
        for element in elements {
            match &element.kind {
                ElementKind::Node => (),
                ElementKind::Way { nd } => {
                    let node_ids: BTreeSet<OsmId> = nd.iter().copied().collect();
                    for node_id in node_ids {
                        source.ways_by_node.entry(node_id).or_default().push(element.clone());
                    }
                }
                ElementKind::Relation { members } => {
                    let keys: BTreeSet<ElementKey> = members.iter().map(|m| m.key()).collect();
                    for key in keys {
                        source.relations_by_member.entry(key).or_default().push(element.clone());
                    }
                }
            }
        }
        source
    }
}

impl ElementSource for InMemorySource {
    fn ways_containing_node(&self, node_id: OsmId) -> Result<Vec<Element>> {
        Ok(self.ways_by_node.get(&node_id).cloned().unwrap_or_default())
    }

    fn relations_containing(&self, key: ElementKey) -> Result<Vec<Element>> {
        Ok(self.relations_by_member.get(&key).cloned().unwrap_or_default())
    }
}

/// Working set of one run. Elements are addressed by position; the index maps
/// each (type, id) to every position holding a version of it.
#[derive(Debug, Default, Clone)]
pub struct ElementStore {
    elements: Vec<Element>,
    index: HashMap<ElementKey, Vec<usize>>,
}

impl ElementStore {
    pub fn new(elements: Vec<Element>) -> Self {
        let mut store = ElementStore {
            elements,
            index: HashMap::new(),
        };
        store.rebuild_index();
        store
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (idx, element) in self.elements.iter().enumerate() {
            self.index.entry(element.key()).or_default().push(idx);
        }
    }

    pub fn push(&mut self, element: Element) {
        self.index.entry(element.key()).or_default().push(self.elements.len());
        self.elements.push(element);
    }

    pub fn indices_of(&self, key: ElementKey) -> &[usize] {
        self.index.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Marks every node present in the set with the ways listing it.
    pub fn add_local_way_references(&mut self) {
        let mut references: Vec<(usize, OsmId)> = Vec::new();
        for way in &self.elements {
            if let ElementKind::Way { nd } = &way.kind {
                for node_id in nd {
                    let key = ElementKey::new(ElementType::Node, *node_id);
                    references.extend(self.indices_of(key).iter().map(|&idx| (idx, way.id)));
                }
            }
        }
        for (idx, way_id) in references {
            self.elements[idx].add_parent_way(way_id);
        }
    }

    /// Marks every member present in the set with the relations listing it.
    pub fn add_local_relation_references(&mut self) {
        let mut references: Vec<(usize, OsmId)> = Vec::new();
        for relation in &self.elements {
            if let ElementKind::Relation { members } = &relation.kind {
                for member in members {
                    let indices = self.indices_of(member.key());
                    references.extend(indices.iter().map(|&idx| (idx, relation.id)));
                }
            }
        }
        for (idx, relation_id) in references {
            self.elements[idx].add_parent_relation(relation_id);
        }
    }

    /// Drops tagless elements whose meaning is carried by a parent.
    pub fn remove_unnecessary_items(&mut self) {
        self.elements
            .retain(|e| !(e.is_tagless() && (e.has_parent_ways() || e.has_parent_relations())));
        self.rebuild_index();
    }

    /// Nodes, ways, relations; each by id then version. Copies of the same
    /// (type, id, version) collapse into one, keeping the union of their
    /// parent references.
    pub fn sort_and_dedup(&mut self) {
        let mut elements = std::mem::take(&mut self.elements);
        elements.sort_by(Element::canonical_cmp);

        let mut unique: Vec<Element> = Vec::with_capacity(elements.len());
        for element in elements {
            match unique.last_mut() {
                Some(last) if last.same_version(&element) => merge_annotations(last, element),
                _ => unique.push(element),
            }
        }
        self.elements = unique;
        self.rebuild_index();
    }
}

fn merge_annotations(into: &mut Element, from: Element) {
    if let Some(ways) = from.parent_ways {
        into.parent_ways.get_or_insert_with(BTreeSet::new).extend(ways);
    }
    if let Some(relations) = from.parent_relations {
        into.parent_relations.get_or_insert_with(BTreeSet::new).extend(relations);
    }
}

fn lookup_error(lookup: String, err: Error) -> Error {
    match err {
        err @ (Error::ExternalLookupFailed { .. } | Error::MalformedElement(_)) => err,
        other => Error::lookup_failed(lookup, other),
    }
}

fn expect_type(elements: &[Element], expected: ElementType, lookup: &str) -> Result<()> {
    match elements.iter().find(|e| e.element_type() != expected) {
        Some(wrong) => Err(Error::MalformedElement(format!(
            "{} returned {}, expected a {}",
            lookup,
            wrong.key(),
            expected
        ))),
        None => Ok(()),
    }
}

/// Connects tagless elements to the tagged parents that give them meaning.
pub struct GraphAugmenter<'s, S: ElementSource + ?Sized> {
    source: &'s S,
    pool: ThreadPool,
}

impl<'s, S: ElementSource + ?Sized> GraphAugmenter<'s, S> {
    /// `max_concurrent_lookups` bounds how many lookups are in flight at once.
    pub fn new(source: &'s S, max_concurrent_lookups: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_concurrent_lookups.max(1))
            .thread_name(|idx| format!("lookup-{}", idx))
            .build()
            .map_err(|err| Error::Message(err.to_string()))?;
        Ok(GraphAugmenter { source, pool })
    }

    /// Runs every stage in order. Any failed lookup fails the whole call.
    pub fn augment(&self, elements: Vec<Element>) -> Result<Vec<Element>> {
        let mut store = ElementStore::new(elements);
        log_stage("input", &store);

        store.add_local_way_references();
        log_stage("local_way_references", &store);

        store.add_local_relation_references();
        log_stage("local_relation_references", &store);

        self.add_remote_ways(&mut store)?;
        log_stage("remote_ways", &store);

        self.add_remote_relations(&mut store)?;
        log_stage("remote_relations", &store);

        store.remove_unnecessary_items();
        log_stage("unnecessary_items_removal", &store);

        store.sort_and_dedup();
        log_stage("sort_and_dedup", &store);

        Ok(store.into_elements())
    }

    /// Fetches the ways of tagless nodes that have no way in the set.
    /// Fetched ways are appended even when already present.
    pub fn add_remote_ways(&self, store: &mut ElementStore) -> Result<()> {
        let targets: BTreeSet<OsmId> = store
            .elements()
            .iter()
            .filter(|e| {
                e.element_type() == ElementType::Node && e.is_tagless() && !e.has_parent_ways()
            })
            .map(|e| e.id)
            .collect();
        let targets: Vec<OsmId> = targets.into_iter().collect();

        let source = self.source;
        let results: Vec<(OsmId, Vec<Element>)> = self.pool.install(|| {
            targets
                .par_iter()
                .map(|&node_id| -> Result<(OsmId, Vec<Element>)> {
                    let lookup = format!("ways containing node {}", node_id);
                    debug!(node_id = node_id; "Looking up ways containing node");
                    let ways = source
                        .ways_containing_node(node_id)
                        .map_err(|err| lookup_error(lookup.clone(), err))?;
                    expect_type(&ways, ElementType::Way, &lookup)?;
                    Ok((node_id, ways))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        for (node_id, ways) in results {
            let key = ElementKey::new(ElementType::Node, node_id);
            let way_ids: Vec<OsmId> = ways.iter().map(|way| way.id).collect();
            for idx in store.indices_of(key).to_vec() {
                let node = &mut store.elements[idx];
                if node.is_tagless() && !node.has_parent_ways() {
                    node.parent_ways
                        .get_or_insert_with(BTreeSet::new)
                        .extend(way_ids.iter().copied());
                }
            }
            for way in ways {
                store.push(way);
            }
        }
        Ok(())
    }

    /// Fetches the relations of tagless elements with no relation in the set,
    /// including ways added by [`Self::add_remote_ways`].
    pub fn add_remote_relations(&self, store: &mut ElementStore) -> Result<()> {
        let targets: BTreeSet<ElementKey> = store
            .elements()
            .iter()
            .filter(|e| e.is_tagless() && !e.has_parent_relations())
            .map(Element::key)
            .collect();
        let targets: Vec<ElementKey> = targets.into_iter().collect();

        let source = self.source;
        let results: Vec<(ElementKey, Vec<Element>)> = self.pool.install(|| {
            targets
                .par_iter()
                .map(|&key| -> Result<(ElementKey, Vec<Element>)> {
                    let lookup = format!("relations containing {}", key);
                    debug!(
                        element_type = key.element_type.as_str(),
                        id = key.id;
                        "Looking up relations containing element"
                    );
                    let relations = source
                        .relations_containing(key)
                        .map_err(|err| lookup_error(lookup.clone(), err))?;
                    expect_type(&relations, ElementType::Relation, &lookup)?;
                    Ok((key, relations))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        for (key, relations) in results {
            let relation_ids: Vec<OsmId> = relations.iter().map(|rel| rel.id).collect();
            for idx in store.indices_of(key).to_vec() {
                let element = &mut store.elements[idx];
                if element.is_tagless() && !element.has_parent_relations() {
                    element
                        .parent_relations
                        .get_or_insert_with(BTreeSet::new)
                        .extend(relation_ids.iter().copied());
                }
            }
            for relation in relations {
                store.push(relation);
            }
        }
        Ok(())
    }
}

fn log_stage(stage: &str, store: &ElementStore) {
    info!(stage = stage, elements = store.len(); "Augmentation stage finished");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::data::osm::tags;
    use crate::data::{Member, Tags};
    use proptest::prelude::*;

    /// Records lookups and can be told to fail one of them.
    struct RecordingSource {
        inner: InMemorySource,
        calls: Mutex<Vec<String>>,
        fail_node: Option<OsmId>,
    }

    impl RecordingSource {
        fn new(context: Vec<Element>) -> Self {
            RecordingSource {
                inner: InMemorySource::new(context),
                calls: Mutex::new(Vec::new()),
                fail_node: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    impl ElementSource for RecordingSource {
        fn ways_containing_node(&self, node_id: OsmId) -> Result<Vec<Element>> {
            self.calls.lock().unwrap().push(format!("ways {}", node_id));
            if self.fail_node == Some(node_id) {
                let lookup = format!("ways containing node {}", node_id);
                return Err(Error::lookup_failed(lookup, "HTTP 503"));
            }
            self.inner.ways_containing_node(node_id)
        }

        fn relations_containing(&self, key: ElementKey) -> Result<Vec<Element>> {
            self.calls.lock().unwrap().push(format!("relations {}", key));
            self.inner.relations_containing(key)
        }
    }

    fn bare_node(id: OsmId) -> Element {
        Element::node(id, 1, Tags::new())
    }

    fn member(member_type: ElementType, id: OsmId) -> Member {
        Member {
            member_type,
            id,
            role: String::new(),
        }
    }

    #[test]
    fn local_references_mark_present_children() {
        let mut store = ElementStore::new(vec![
            bare_node(1),
            bare_node(2),
            Element::way(10, 1, tags([("highway", "residential")]), vec![1, 2, 3]),
            Element::relation(20, 1, tags([("type", "route")]), vec![member(ElementType::Way, 10)]),
        ]);
        store.add_local_way_references();
        store.add_local_relation_references();

        let elements = store.elements();
        assert_eq!(elements[0].parent_ways, Some(BTreeSet::from([10])));
        assert_eq!(elements[1].parent_ways, Some(BTreeSet::from([10])));
        assert_eq!(elements[2].parent_relations, Some(BTreeSet::from([20])));
        assert_eq!(elements[0].parent_relations, None);
        assert_eq!(elements[3].parent_ways, None);
    }

    #[test]
    fn tagless_node_inside_local_way_is_removed() {
        let source = RecordingSource::new(vec![]);
        let augmenter = GraphAugmenter::new(&source, 2).unwrap();
        let result = augmenter
            .augment(vec![
                bare_node(1),
                Element::way(10, 1, tags([("highway", "residential")]), vec![1]),
            ])
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key(), ElementKey::new(ElementType::Way, 10));
        // The node already had a way, so only the node's relations were asked for.
        assert_eq!(source.calls(), vec!["relations node 1"]);
    }

    #[test]
    fn remote_ways_and_relations_are_pulled_in() {
        let outer = Element::way(30, 4, Tags::new(), vec![5, 6]);
        let multipolygon = Element::relation(
            40,
            2,
            tags([("type", "multipolygon"), ("leisure", "park")]),
            vec![member(ElementType::Way, 30)],
        );
        let source = RecordingSource::new(vec![outer, multipolygon]);
        let augmenter = GraphAugmenter::new(&source, 4).unwrap();

        let result = augmenter.augment(vec![bare_node(5), bare_node(6)]).unwrap();

        // Both nodes hang off way 30, which itself only matters through relation 40.
        let keys: Vec<_> = result.iter().map(Element::key).collect();
        assert_eq!(keys, vec![ElementKey::new(ElementType::Relation, 40)]);
        assert_eq!(
            source.calls(),
            vec!["relations node 5", "relations node 6", "relations way 30", "ways 5", "ways 6"]
        );
    }

    #[test]
    fn orphan_tagless_node_is_kept_with_empty_parent_sets() {
        let source = RecordingSource::new(vec![]);
        let augmenter = GraphAugmenter::new(&source, 1).unwrap();
        let result = augmenter.augment(vec![bare_node(8)]).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].parent_ways, Some(BTreeSet::new()));
        assert_eq!(result[0].parent_relations, Some(BTreeSet::new()));
    }

    #[test]
    fn failed_lookup_aborts_augmentation() {
        let mut source = RecordingSource::new(vec![]);
        source.fail_node = Some(2);
        let augmenter = GraphAugmenter::new(&source, 3).unwrap();

        let err = augmenter
            .augment(vec![bare_node(1), bare_node(2), bare_node(3)])
            .unwrap_err();
        match err {
            Error::ExternalLookupFailed { lookup, message } => {
                assert_eq!(lookup, "ways containing node 2");
                assert_eq!(message, "HTTP 503");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_element_type_from_source_is_malformed() {
        struct NodesForWays;
        impl ElementSource for NodesForWays {
            fn ways_containing_node(&self, _node_id: OsmId) -> Result<Vec<Element>> {
                Ok(vec![bare_node(99)])
            }
            fn relations_containing(&self, _key: ElementKey) -> Result<Vec<Element>> {
                Ok(vec![])
            }
        }

        let augmenter = GraphAugmenter::new(&NodesForWays, 1).unwrap();
        let err = augmenter.augment(vec![bare_node(1)]).unwrap_err();
        assert!(matches!(err, Error::MalformedElement(_)));
    }

    #[test]
    fn one_lookup_per_element_key() {
        let source = RecordingSource::new(vec![]);
        let augmenter = GraphAugmenter::new(&source, 2).unwrap();
        augmenter
            .augment(vec![Element::node(3, 1, Tags::new()), Element::node(3, 2, Tags::new())])
            .unwrap();
        assert_eq!(source.calls(), vec!["relations node 3", "ways 3"]);
    }

    #[test]
    fn duplicate_remote_ways_collapse() {
        let way = Element::way(50, 7, tags([("highway", "service")]), vec![1, 2]);
        let source = RecordingSource::new(vec![way]);
        let augmenter = GraphAugmenter::new(&source, 2).unwrap();

        let result = augmenter.augment(vec![bare_node(1), bare_node(2)]).unwrap();
        let keys: Vec<_> = result.iter().map(|e| (e.key(), e.version)).collect();
        assert_eq!(keys, vec![(ElementKey::new(ElementType::Way, 50), 7)]);
    }

    #[test]
    fn sort_orders_by_type_id_version_and_dedups() {
        let mut first = bare_node(2);
        first.add_parent_relation(7);
        let mut second = bare_node(2);
        second.add_parent_relation(8);

        let mut store = ElementStore::new(vec![
            Element::relation(1, 1, Tags::new(), vec![]),
            Element::way(3, 2, Tags::new(), vec![]),
            Element::way(3, 1, Tags::new(), vec![]),
            first,
            Element::node(2, 3, Tags::new()),
            second,
        ]);
        store.sort_and_dedup();

        let order: Vec<_> = store
            .elements()
            .iter()
            .map(|e| (e.key().to_string(), e.version))
            .collect();
        assert_eq!(
            order,
            vec![
                ("node 2".to_string(), 1),
                ("node 2".to_string(), 3),
                ("way 3".to_string(), 1),
                ("way 3".to_string(), 2),
                ("relation 1".to_string(), 1),
            ]
        );
        assert_eq!(store.elements()[0].parent_relations, Some(BTreeSet::from([7, 8])));
        assert_eq!(store.indices_of(ElementKey::new(ElementType::Way, 3)), &[2, 3]);
    }

    /// Answers every lookup, but later node ids come back sooner.
    struct SlowLowIds;

    impl SlowLowIds {
        fn stall(id: OsmId) {
            std::thread::sleep(std::time::Duration::from_millis((12 - id.min(11)) as u64 * 3));
        }
    }

    impl ElementSource for SlowLowIds {
        fn ways_containing_node(&self, node_id: OsmId) -> Result<Vec<Element>> {
            Self::stall(node_id);
            Ok(vec![
                Element::way(100 + node_id, 1, Tags::new(), vec![node_id]),
                Element::way(200, 1, Tags::new(), vec![node_id]),
            ])
        }

        fn relations_containing(&self, key: ElementKey) -> Result<Vec<Element>> {
            Self::stall(key.id % 100);
            Ok(vec![Element::relation(
                300 + key.id % 2,
                1,
                tags([("type", "route")]),
                vec![member(key.element_type, key.id)],
            )])
        }
    }

    #[test]
    fn merge_does_not_depend_on_lookup_completion_order() {
        let nodes: Vec<Element> = (1..=10).map(bare_node).collect();

        let mut stores = Vec::new();
        for threads in [1, 8] {
            let augmenter = GraphAugmenter::new(&SlowLowIds, threads).unwrap();
            let mut store = ElementStore::new(nodes.clone());
            augmenter.add_remote_ways(&mut store).unwrap();
            augmenter.add_remote_relations(&mut store).unwrap();
            stores.push(store.into_elements());
        }
        assert_eq!(stores[0], stores[1]);
        let node = &stores[0][0];
        assert_eq!(node.parent_ways, Some(BTreeSet::from([101, 200])));
        assert_eq!(node.parent_relations, Some(BTreeSet::from([301])));
        let way = stores[0].iter().find(|e| e.id == 102).unwrap();
        assert_eq!(way.parent_relations, Some(BTreeSet::from([300])));

        let serial = GraphAugmenter::new(&SlowLowIds, 1).unwrap().augment(nodes.clone()).unwrap();
        let parallel = GraphAugmenter::new(&SlowLowIds, 8).unwrap().augment(nodes).unwrap();
        assert_eq!(serial, parallel);
        assert!(!serial.is_empty());
    }

    fn element_strategy() -> impl Strategy<Value = Element> {
        (0..3u8, 1..6i64, 1..4u64, any::<bool>(), any::<bool>()).prop_map(
            |(kind, id, version, tagged, with_parent)| {
                let element_tags = if tagged { tags([("amenity", "bench")]) } else { Tags::new() };
                let mut element = match kind {
                    0 => Element::node(id, version, element_tags),
                    1 => Element::way(id, version, element_tags, vec![]),
                    _ => Element::relation(id, version, element_tags, vec![]),
                };
                if with_parent {
                    element.add_parent_relation(100);
                }
                element
            },
        )
    }

    proptest! {
        #[test]
        fn sorting_is_idempotent(elements in prop::collection::vec(element_strategy(), 0..20)) {
            let mut store = ElementStore::new(elements);
            store.sort_and_dedup();
            let once = store.elements().to_vec();
            store.sort_and_dedup();
            prop_assert_eq!(once.clone(), store.elements().to_vec());
            prop_assert!(once.windows(2).all(|w| w[0].canonical_cmp(&w[1]).is_lt()));
        }

        #[test]
        fn removal_never_drops_tagged_elements(elements in prop::collection::vec(element_strategy(), 0..20)) {
            let tagged = elements.iter().filter(|e| !e.is_tagless()).count();
            let mut store = ElementStore::new(elements);
            store.remove_unnecessary_items();
            prop_assert_eq!(store.elements().iter().filter(|e| !e.is_tagless()).count(), tagged);
            prop_assert!(store.elements().iter().all(|e| !e.is_tagless() || !e.has_parent_relations()));
        }
    }
}
