//! Tree Reconciler
//!
//! [`Morpher::morph`] patches a live subtree of a [`Document`] in place so it
//! matches a freshly rendered [`VNode`], reusing as many live nodes as it can.
//!
//! # Algorithm
//!
//! For each pair of live node and next node:
//!
//! 1. A live element carrying the keep marker is skipped together with its
//!    descendants. It belongs to code outside the renderer.
//! 2. Different kinds, tags or namespaces: the live subtree is dropped and a
//!    fresh materialization of the next node takes its position.
//! 3. Attributes: live-only attributes are removed, differing ones are set,
//!    equal ones are not touched.
//! 4. Event handlers are replaced per event name unless the next handler is
//!    the very same allocation as the live one.
//! 5. An element with raw content gets the markup verbatim; its children
//!    are not diffed.
//! 6. Children are paired by position, or by key when any next child has
//!    one. Keyed matches are moved into place, never recreated.
//!
//! Namespaces are decided when a node is materialized, from its tag and the
//! namespace its parent gives its children.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::document::Document;
use super::node::{Namespace, NodeData, NodeId};
use super::vnode::{VElement, VNode};
use crate::config::MorphConfig;
use crate::error::{Error, Result};

/// Counts of the mutations a morph performed.
///
/// `created`, `removed` and `replaced` count subtrees, not the nodes in
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MorphStats {
    pub created: usize,
    pub removed: usize,
    pub replaced: usize,
    pub moved: usize,
    pub attributes_set: usize,
    pub attributes_removed: usize,
    pub handlers_set: usize,
    pub handlers_removed: usize,
    pub texts_updated: usize,
    pub raw_replaced: usize,
    /// Live subtrees skipped because of the keep marker. Not a mutation.
    pub kept: usize,
}

impl MorphStats {
    /// Total number of mutations.
    pub fn mutations(&self) -> usize {
        self.created
            + self.removed
            + self.replaced
            + self.moved
            + self.attributes_set
            + self.attributes_removed
            + self.handlers_set
            + self.handlers_removed
            + self.texts_updated
            + self.raw_replaced
    }

    pub fn is_noop(&self) -> bool {
        self.mutations() == 0
    }
}

/// The result of a morph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphOutcome {
    /// The node now standing where `live` stood. Differs from `live` when
    /// the root had to be replaced; `None` after an unmount.
    pub root: Option<NodeId>,
    pub stats: MorphStats,
}

/// The tree reconciler.
#[derive(Debug, Clone, Default)]
pub struct Morpher {
    config: MorphConfig,
}

impl Morpher {
    pub fn new(config: MorphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MorphConfig {
        &self.config
    }

    /// Patch the subtree at `live` to match `next`.
    ///
    /// `next == None` unmounts: `live` and its descendants are removed.
    pub fn morph(
        &self,
        document: &mut Document,
        live: NodeId,
        next: Option<&VNode>,
    ) -> Result<MorphOutcome> {
        if !document.contains(live) {
            return Err(Error::UnknownNode(live));
        }
        let mut pass = Pass {
            document,
            config: &self.config,
            stats: MorphStats::default(),
        };
        let root = match next {
            Some(next) => {
                let inherited = pass.inherited_namespace(live);
                Some(pass.node(live, next, inherited)?)
            }
            None => {
                pass.remove(live)?;
                None
            }
        };
        debug!(
            live = live.raw(),
            mutations = pass.stats.mutations(),
            kept = pass.stats.kept,
            "morph finished"
        );
        Ok(MorphOutcome {
            root,
            stats: pass.stats,
        })
    }

    /// Build a detached live subtree from `node`.
    ///
    /// `inherited` is the namespace the node's future parent gives its
    /// children (`Namespace::Html` for a root).
    pub fn materialize(&self, document: &mut Document, node: &VNode, inherited: Namespace) -> NodeId {
        document.materialize_with(node, inherited, &self.config.extra_svg_tags)
    }
}

struct Pass<'a> {
    document: &'a mut Document,
    config: &'a MorphConfig,
    stats: MorphStats,
}

impl Pass<'_> {
    /// The namespace children of `live`'s parent default to.
    fn inherited_namespace(&self, live: NodeId) -> Namespace {
        if let Some(parent) = self.document.parent(live) {
            if let (Some(tag), Some(namespace)) =
                (self.document.tag(parent), self.document.namespace(parent))
            {
                return namespace.for_children(tag);
            }
        }
        // A detached root inside foreign content keeps its namespace.
        match (self.document.tag(live), self.document.namespace(live)) {
            (Some("svg" | "math"), _) | (None, _) => Namespace::Html,
            (Some(_), Some(namespace)) => namespace,
            (Some(_), None) => Namespace::Html,
        }
    }

    fn materialize(&mut self, next: &VNode, inherited: Namespace) -> NodeId {
        self.document
            .materialize_with(next, inherited, &self.config.extra_svg_tags)
    }

    fn is_kept(&self, live: NodeId) -> bool {
        self.document
            .attribute(live, &self.config.keep_attribute)
            .is_some()
    }

    fn live_key(&self, live: NodeId) -> Option<String> {
        self.document
            .attribute(live, &self.config.key_attribute)
            .map(str::to_owned)
    }

    fn matches(&self, live: NodeId, next: &VNode, inherited: Namespace) -> bool {
        let Some(node) = self.document.get(live) else {
            return false;
        };
        match (&node.data, next) {
            (NodeData::Text(_), VNode::Text { .. }) => true,
            (NodeData::Raw(_), VNode::Raw { .. }) => true,
            (NodeData::Element(element), VNode::Element(next)) => {
                element.tag == next.tag
                    && element.namespace
                        == Namespace::for_tag(&next.tag, inherited, &self.config.extra_svg_tags)
            }
            _ => false,
        }
    }

    /// Reconcile one pair. Returns the node standing at `live`'s position.
    fn node(&mut self, live: NodeId, next: &VNode, inherited: Namespace) -> Result<NodeId> {
        if self.is_kept(live) {
            trace!(node = live.raw(), "kept subtree skipped");
            self.stats.kept += 1;
            return Ok(live);
        }

        if !self.matches(live, next, inherited) {
            let fresh = self.materialize(next, inherited);
            self.document.replace(live, fresh)?;
            trace!(old = live.raw(), new = fresh.raw(), "node replaced");
            self.stats.replaced += 1;
            return Ok(fresh);
        }

        match next {
            VNode::Text { text } | VNode::Raw { markup: text } => {
                if self.document.set_text(live, text)? {
                    self.stats.texts_updated += 1;
                }
            }
            VNode::Element(next) => self.element(live, next)?,
        }
        Ok(live)
    }

    fn element(&mut self, live: NodeId, next: &VElement) -> Result<()> {
        self.attributes(live, next)?;
        self.handlers(live, next)?;

        if let Some(markup) = &next.raw_html {
            if self.document.raw_content(live) != Some(markup.as_str()) {
                self.document.set_raw_content(live, markup.as_str())?;
                trace!(node = live.raw(), "raw content replaced");
                self.stats.raw_replaced += 1;
            }
            return Ok(());
        }
        if self.document.clear_raw_content(live)? {
            self.stats.raw_replaced += 1;
        }

        let element = self.document.element(live)?;
        let inherited = element.namespace().for_children(element.tag());
        let keyed = next
            .children
            .iter()
            .any(|child| child.key(self.config).is_some());
        if keyed {
            self.keyed_children(live, &next.children, inherited)
        } else {
            self.unkeyed_children(live, &next.children, inherited)
        }
    }

    fn attributes(&mut self, live: NodeId, next: &VElement) -> Result<()> {
        let element = self.document.element_mut(live)?;

        let stale: Vec<String> = element
            .attributes
            .keys()
            .filter(|name| !next.attributes.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            element.attributes.shift_remove(&name);
            self.stats.attributes_removed += 1;
        }

        for (name, value) in &next.attributes {
            if element.attributes.get(name) != Some(value) {
                element.attributes.insert(name.clone(), value.clone());
                self.stats.attributes_set += 1;
            }
        }
        Ok(())
    }

    fn handlers(&mut self, live: NodeId, next: &VElement) -> Result<()> {
        let element = self.document.element_mut(live)?;

        let before = element.handlers.len();
        element
            .handlers
            .retain(|event, _| next.handlers.contains_key(event));
        self.stats.handlers_removed += before - element.handlers.len();

        for (event, handler) in &next.handlers {
            if element.handlers.get(event) != Some(handler) {
                element.handlers.insert(event.clone(), handler.clone());
                self.stats.handlers_set += 1;
            }
        }
        Ok(())
    }

    fn unkeyed_children(&mut self, parent: NodeId, next: &[VNode], inherited: Namespace) -> Result<()> {
        let live: Vec<NodeId> = self.document.children(parent).to_vec();

        for (index, next_child) in next.iter().enumerate() {
            match live.get(index) {
                Some(&live_child) => {
                    self.node(live_child, next_child, inherited)?;
                }
                None => {
                    let fresh = self.materialize(next_child, inherited);
                    self.document.append_child(parent, fresh)?;
                    self.stats.created += 1;
                }
            }
        }

        for &excess in live.iter().skip(next.len()) {
            self.remove(excess)?;
        }
        Ok(())
    }

    fn keyed_children(&mut self, parent: NodeId, next: &[VNode], inherited: Namespace) -> Result<()> {
        let mut by_key: IndexMap<String, NodeId> = IndexMap::new();
        let mut unkeyed: VecDeque<NodeId> = VecDeque::new();
        for &child in self.document.children(parent) {
            match self.live_key(child) {
                Some(key) => {
                    if by_key.contains_key(&key) {
                        // First occurrence wins; the duplicate stays
                        // unmatched and is removed below.
                        warn!(parent = parent.raw(), key = %key, "duplicate list key among live siblings");
                    } else {
                        by_key.insert(key, child);
                    }
                }
                None => unkeyed.push_back(child),
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (index, next_child) in next.iter().enumerate() {
            let existing = match next_child.key(self.config) {
                Some(key) => {
                    if !seen.insert(key) {
                        warn!(parent = parent.raw(), key = %key, "duplicate list key in render output");
                    }
                    by_key.shift_remove(key)
                }
                None => unkeyed.pop_front(),
            };

            match existing {
                Some(existing) => {
                    let position = self.document.index_of(parent, existing);
                    if position != Some(index) {
                        self.document.insert_child(parent, index, existing)?;
                        trace!(node = existing.raw(), to = index, "node moved");
                        self.stats.moved += 1;
                    }
                    self.node(existing, next_child, inherited)?;
                }
                None => {
                    let fresh = self.materialize(next_child, inherited);
                    self.document.insert_child(parent, index, fresh)?;
                    self.stats.created += 1;
                }
            }
        }

        // Everything matched now sits in front; the tail is unmatched.
        let leftovers: Vec<NodeId> = self
            .document
            .children(parent)
            .iter()
            .skip(next.len())
            .copied()
            .collect();
        for leftover in leftovers {
            self.remove(leftover)?;
        }
        Ok(())
    }

    fn remove(&mut self, live: NodeId) -> Result<()> {
        self.document.remove(live)?;
        trace!(node = live.raw(), "node removed");
        self.stats.removed += 1;
        Ok(())
    }
}
