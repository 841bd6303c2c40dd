//! Size attribution tree: library -> object -> symbol.
//!
//! Trees are built once and never change. Filtering is a projection over an
//! immutable tree: `FilteredNode` borrows the nodes it shows, and `TreeView`
//! owns the roots together with whatever filter is currently applied.

use crate::model::LinkMap;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeNode {
    name: String,
    size: u64,
    children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            children: Vec::new(),
        }
    }

    /// Makes a node whose size is the total of `children`.
    pub fn branch(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        let size = children
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.size));
        Self {
            name: name.into(),
            size,
            children,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Every child, regardless of any filter.
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Projects this node through `filter`.
    ///
    /// At every level the visible children are the ones whose own names
    /// match; the filter then applies again inside each of them. `None` shows
    /// everything.
    pub fn filtered(&self, filter: Option<&NameFilter>) -> FilteredNode<'_> {
        let children = self
            .children
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(&c.name)))
            .map(|c| c.filtered(filter))
            .collect();
        FilteredNode {
            node: self,
            children,
        }
    }
}

/// Case-insensitive substring match on node names.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NameFilter {
    needle: String,
}

impl NameFilter {
    /// Returns `None` for empty text, which means "don't filter".
    pub fn new(text: &str) -> Option<Self> {
        if text.is_empty() {
            None
        } else {
            Some(Self {
                needle: text.to_lowercase(),
            })
        }
    }

    pub fn text(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, name: &str) -> bool {
        name.to_lowercase().contains(&self.needle)
    }
}

/// A node as seen through a filter.
#[derive(Clone, Debug)]
pub struct FilteredNode<'t> {
    node: &'t TreeNode,
    children: Vec<FilteredNode<'t>>,
}

impl<'t> FilteredNode<'t> {
    pub fn node(&self) -> &'t TreeNode {
        self.node
    }

    pub fn name(&self) -> &'t str {
        &self.node.name
    }

    /// The node's full size. Hidden children still count.
    pub fn size(&self) -> u64 {
        self.node.size
    }

    /// Children that passed the filter.
    pub fn children(&self) -> &[FilteredNode<'t>] {
        &self.children
    }

    /// Children before filtering.
    pub fn all_children(&self) -> &'t [TreeNode] {
        &self.node.children
    }
}

/// Result of `build_tree`: object nodes grouped by library.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LibraryTree {
    libraries: IndexMap<String, Vec<TreeNode>>,
    orphaned_symbols: usize,
}

impl LibraryTree {
    /// Number of libraries.
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Object nodes of one library.
    pub fn get(&self, library: &str) -> Option<&[TreeNode]> {
        self.libraries.get(library).map(Vec::as_slice)
    }

    /// Libraries in the order their first object appeared.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TreeNode])> + '_ {
        self.libraries
            .iter()
            .map(|(name, objects)| (name.as_str(), objects.as_slice()))
    }

    /// Symbols dropped because no object had their index.
    pub fn orphaned_symbols(&self) -> usize {
        self.orphaned_symbols
    }

    pub fn total_size(&self) -> u64 {
        self.libraries
            .values()
            .flatten()
            .fold(0u64, |acc, o| acc.saturating_add(o.size))
    }

    /// Library-level nodes sitting on top of the object nodes.
    pub fn roots(&self) -> Vec<TreeNode> {
        self.libraries
            .iter()
            .map(|(name, objects)| TreeNode::branch(name.clone(), objects.clone()))
            .collect()
    }

    pub fn into_roots(self) -> Vec<TreeNode> {
        self.libraries
            .into_iter()
            .map(|(name, objects)| TreeNode::branch(name, objects))
            .collect()
    }
}

/// Object node under construction.
struct ObjectSlot {
    name: String,
    symbols: Vec<TreeNode>,
}

/// Groups the map's symbols under their objects, and the objects under their
/// libraries.
///
/// Objects without a library are filed under the binary's own name. Nodes
/// are keyed by object index: the first object with a given index names the
/// node, and every object record with that index files a copy of the same
/// node under its own library. Symbols pointing at an index nobody has are
/// dropped and counted in `LibraryTree::orphaned_symbols`.
pub fn build_tree(linkmap: &LinkMap) -> LibraryTree {
    let mut slots: IndexMap<u32, ObjectSlot> = IndexMap::new();
    for object in &linkmap.objects {
        if slots.contains_key(&object.index) {
            debug!(index = object.index, path = %object.path, "repeated object index");
            continue;
        }
        slots.insert(
            object.index,
            ObjectSlot {
                name: object.name.clone(),
                symbols: Vec::new(),
            },
        );
    }

    let mut orphaned_symbols = 0;
    for symbol in &linkmap.symbols {
        match slots.get_mut(&symbol.object_index) {
            Some(slot) => slot.symbols.push(TreeNode::leaf(&symbol.name, symbol.size)),
            None => {
                orphaned_symbols += 1;
                trace!(index = symbol.object_index, name = %symbol.name, "symbol has no object");
            }
        }
    }
    if orphaned_symbols > 0 {
        warn!(
            count = orphaned_symbols,
            "dropped symbols referring to unknown objects"
        );
    }

    let nodes: IndexMap<u32, TreeNode> = slots
        .into_iter()
        .map(|(index, slot)| (index, TreeNode::branch(slot.name, slot.symbols)))
        .collect();

    let mut libraries: IndexMap<String, Vec<TreeNode>> = IndexMap::new();
    for object in &linkmap.objects {
        if let Some(node) = nodes.get(&object.index) {
            libraries
                .entry(linkmap.library_of(object).to_string())
                .or_insert_with(Vec::new)
                .push(node.clone());
        }
    }

    LibraryTree {
        libraries,
        orphaned_symbols,
    }
}

/// The roots of a tree plus the filter currently applied to them.
///
/// Roots are always shown; the filter decides which of their descendants are.
#[derive(Clone, Debug, Default)]
pub struct TreeView {
    roots: Vec<TreeNode>,
    filter: Option<NameFilter>,
}

impl TreeView {
    pub fn new(roots: Vec<TreeNode>) -> Self {
        Self {
            roots,
            filter: None,
        }
    }

    /// Library -> object -> symbol view of a map.
    pub fn from_linkmap(linkmap: &LinkMap) -> Self {
        Self::new(build_tree(linkmap).into_roots())
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn filter(&self) -> Option<&NameFilter> {
        self.filter.as_ref()
    }

    /// Filters by `text`; empty text clears the filter.
    pub fn set_filter(&mut self, text: &str) {
        self.filter = NameFilter::new(text);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn visible(&self) -> Vec<FilteredNode<'_>> {
        self.roots
            .iter()
            .map(|r| r.filtered(self.filter.as_ref()))
            .collect()
    }

    /// Index paths of visible nodes whose names contain `keyword`, ignoring
    /// case. Parents come before their children.
    pub fn find(&self, keyword: &str) -> Vec<Vec<usize>> {
        let mut found = Vec::new();
        let Some(needle) = NameFilter::new(keyword) else {
            return found;
        };
        let mut prefix = Vec::new();
        find_in(&self.visible(), &needle, &mut prefix, &mut found);
        found
    }
}

fn find_in(
    nodes: &[FilteredNode<'_>],
    needle: &NameFilter,
    prefix: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    for (i, node) in nodes.iter().enumerate() {
        prefix.push(i);
        if needle.matches(node.name()) {
            found.push(prefix.clone());
        }
        find_in(node.children(), needle, prefix, found);
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectRecord, SymbolRecord};

    fn sym(index: u32, name: &str, size: u64) -> SymbolRecord {
        SymbolRecord {
            address: 0x1000,
            size,
            object_index: index,
            name: name.into(),
            dead: false,
        }
    }

    fn sample() -> LinkMap {
        let mut m = LinkMap::new("/Build/Demo");
        m.objects = vec![
            ObjectRecord::new(0, "linker synthesized"),
            ObjectRecord::new(1, "/Build/main.o"),
            ObjectRecord::new(2, "/Build/libz.a(inflate.o)"),
            ObjectRecord::new(3, "/Build/View.o"),
            ObjectRecord::new(4, "/Build/libz.a(deflate.o)"),
        ];
        m.symbols = vec![
            sym(1, "_main", 0x40),
            sym(2, "_inflate", 0x100),
            sym(3, "-[View drawRect:]", 0x30),
            sym(2, "_inflate_fast", 0x80),
            sym(4, "_deflate", 0x20),
            sym(1, "_usage", 0x10),
        ];
        m
    }

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(TreeNode::name).collect()
    }

    #[test]
    fn groups_and_order() {
        let tree = build_tree(&sample());
        let libs: Vec<_> = tree.iter().map(|(name, _)| name).collect();
        assert_eq!(libs, ["Demo", "libz.a"]);
        assert_eq!(names(tree.get("Demo").unwrap()), ["linker synthesized", "main.o", "View.o"]);
        assert_eq!(names(tree.get("libz.a").unwrap()), ["inflate.o", "deflate.o"]);

        let main = &tree.get("Demo").unwrap()[1];
        assert_eq!(names(main.children()), ["_main", "_usage"]);
        assert_eq!(main.size(), 0x50);
        let inflate = &tree.get("libz.a").unwrap()[0];
        assert_eq!(names(inflate.children()), ["_inflate", "_inflate_fast"]);
        assert_eq!(inflate.size(), 0x180);
    }

    #[test]
    fn object_without_symbols_is_empty() {
        let tree = build_tree(&sample());
        let synth = &tree.get("Demo").unwrap()[0];
        assert!(synth.is_leaf());
        assert_eq!(synth.size(), 0);
    }

    #[test]
    fn sizes_roll_up() {
        let map = sample();
        let tree = build_tree(&map);
        let total: u64 = map.symbols.iter().map(|s| s.size).sum();
        assert_eq!(tree.total_size(), total);

        for (_, objects) in tree.iter() {
            for o in objects {
                let own: u64 = o.children().iter().map(TreeNode::size).sum();
                assert_eq!(o.size(), own);
            }
        }

        let roots = tree.roots();
        assert_eq!(roots[0].size(), 0x40 + 0x30 + 0x10);
        assert_eq!(roots[1].size(), 0x100 + 0x80 + 0x20);
    }

    #[test]
    fn building_twice_is_identical() {
        let map = sample();
        assert_eq!(build_tree(&map), build_tree(&map));
        // map equality ignores order, the roots don't
        assert_eq!(build_tree(&map).roots(), build_tree(&map).roots());
    }

    #[test]
    fn orphans_are_dropped_and_counted() {
        let mut map = sample();
        map.symbols.push(sym(9, "_nobody", 0x1000));
        let tree = build_tree(&map);
        assert_eq!(tree.orphaned_symbols(), 1);
        assert_eq!(tree.total_size(), 0x40 + 0x100 + 0x30 + 0x80 + 0x20 + 0x10);
    }

    #[test]
    fn repeated_index_shares_one_node() {
        let mut map = sample();
        map.objects.push(ObjectRecord::new(1, "/Build/libdup.a(dup.o)"));
        let tree = build_tree(&map);
        let libs: Vec<_> = tree.iter().map(|(name, objects)| (name, objects.len())).collect();
        assert_eq!(libs, [("Demo", 3), ("libz.a", 2), ("libdup.a", 1)]);

        // the first object with the index names the node; symbols aren't split
        let main = &tree.get("Demo").unwrap()[1];
        let dup = &tree.get("libdup.a").unwrap()[0];
        assert_eq!(dup, main);
        assert_eq!(dup.name(), "main.o");
        assert_eq!(dup.size(), 0x50);
        assert_eq!(names(dup.children()), ["_main", "_usage"]);
    }

    #[test]
    fn repeated_index_in_the_same_library_is_listed_twice() {
        let mut map = sample();
        map.objects.push(ObjectRecord::new(3, "/Build/View2.o"));
        let tree = build_tree(&map);
        assert_eq!(names(tree.get("Demo").unwrap()), ["linker synthesized", "main.o", "View.o", "View.o"]);
    }

    #[test]
    fn filter_is_a_projection() {
        let view = TreeView::from_linkmap(&sample());
        let filter = NameFilter::new("INFLATE").unwrap();
        let projected: Vec<_> = view.roots().iter().map(|r| r.filtered(Some(&filter))).collect();

        // Roots always show; below them only matching names.
        assert_eq!(projected.len(), 2);
        assert!(projected[0].children().is_empty());
        assert_eq!(projected[0].all_children().len(), 3);
        let libz = &projected[1];
        assert_eq!(libz.children().len(), 1);
        assert_eq!(libz.children()[0].name(), "inflate.o");
        assert_eq!(libz.children()[0].children().len(), 2);
        // sizes don't move
        assert_eq!(libz.size(), 0x1a0);
        assert_eq!(libz.children()[0].size(), 0x180);
    }

    fn assert_unfiltered(node: &FilteredNode<'_>) {
        assert_eq!(node.children().len(), node.all_children().len());
        for (shown, all) in node.children().iter().zip(node.all_children()) {
            assert_eq!(shown.node(), all);
            assert_eq!(shown.size(), all.size());
            assert_unfiltered(shown);
        }
    }

    #[test]
    fn clearing_the_filter_restores_everything() {
        let mut view = TreeView::from_linkmap(&sample());
        let before: Vec<u64> = view.visible().iter().map(FilteredNode::size).collect();

        view.set_filter("main");
        assert!(view.filter().is_some());
        assert_eq!(view.visible()[0].children().len(), 1);

        view.clear_filter();
        for node in view.visible() {
            assert_unfiltered(&node);
        }
        let after: Vec<u64> = view.visible().iter().map(FilteredNode::size).collect();
        assert_eq!(before, after);

        view.set_filter("x");
        view.set_filter("");
        assert!(view.filter().is_none());
    }

    #[test]
    fn find_walks_visible_nodes() {
        let mut view = TreeView::from_linkmap(&sample());
        assert_eq!(
            view.find("Inflate"),
            vec![vec![1, 0], vec![1, 0, 0], vec![1, 0, 1]]
        );

        view.set_filter("deflate");
        assert_eq!(view.find("inflate"), Vec::<Vec<usize>>::new());
        assert_eq!(view.find("deflate"), vec![vec![1, 0], vec![1, 0, 0]]);
        assert!(view.find("").is_empty());
    }
}
