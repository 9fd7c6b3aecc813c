//! Document
//!
//! The live tree, stored as an arena of nodes indexed by [`NodeId`].
//!
//! Structure lives in the nodes themselves: every element keeps the ordered
//! handles of its children and every node keeps the handle of its parent.
//! Moving a node rewrites those two links and nothing else, so the node's
//! handle, attributes and handlers survive any reordering.

use std::collections::HashMap;

use tracing::trace;

use super::node::{Content, Element, Event, EventHandler, Namespace, Node, NodeData, NodeId};
use super::vnode::VNode;
use crate::error::{Error, Result};

/// Elements serialized without a closing tag by [`Document::to_html`].
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// An arena holding a live tree (or several detached ones).
#[derive(Debug, Default)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, data: NodeData) -> NodeId {
        let node = Node::new(data);
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Create a detached element, picking its namespace from the tag alone.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let tag = tag.into();
        let namespace = Namespace::for_tag(&tag, Namespace::Html, &[]);
        self.create_element_ns(tag, namespace)
    }

    /// Create a detached element in the given namespace.
    pub fn create_element_ns(&mut self, tag: impl Into<String>, namespace: Namespace) -> NodeId {
        self.insert(NodeData::Element(Element {
            tag: tag.into(),
            namespace,
            attributes: Default::default(),
            handlers: Default::default(),
            content: Content::default(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.insert(NodeData::Text(text.into()))
    }

    /// Create a detached opaque markup node.
    pub fn create_raw(&mut self, markup: impl Into<String>) -> NodeId {
        self.insert(NodeData::Raw(markup.into()))
    }

    /// Build a detached live subtree from render output.
    ///
    /// `inherited` is the namespace the future parent gives its children;
    /// pass `Namespace::Html` for a root.
    pub fn materialize(&mut self, node: &VNode, inherited: Namespace) -> NodeId {
        self.materialize_with(node, inherited, &[])
    }

    pub(crate) fn materialize_with(
        &mut self,
        node: &VNode,
        inherited: Namespace,
        extra_svg_tags: &[String],
    ) -> NodeId {
        let element = match node {
            VNode::Text { text } => return self.create_text(text.as_str()),
            VNode::Raw { markup } => return self.create_raw(markup.as_str()),
            VNode::Element(element) => element,
        };

        let namespace = Namespace::for_tag(&element.tag, inherited, extra_svg_tags);
        let content = match &element.raw_html {
            Some(markup) => Content::Raw(markup.clone()),
            None => Content::default(),
        };
        let id = self.insert(NodeData::Element(Element {
            tag: element.tag.clone(),
            namespace,
            attributes: element.attributes.clone(),
            handlers: element.handlers.clone(),
            content,
        }));

        if element.raw_html.is_none() {
            let child_namespace = namespace.for_children(&element.tag);
            let children: Vec<NodeId> = element
                .children
                .iter()
                .map(|child| self.materialize_with(child, child_namespace, extra_svg_tags))
                .collect();
            for &child in &children {
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.parent = Some(id);
                }
            }
            if let Some(NodeData::Element(live)) = self.nodes.get_mut(&id).map(|n| &mut n.data) {
                live.content = Content::Children(children);
            }
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the total number of nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))
    }

    pub fn element(&self, id: NodeId) -> Result<&Element> {
        self.get(id)
            .ok_or(Error::UnknownNode(id))?
            .as_element()
            .ok_or(Error::NotAnElement(id))
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> Result<&mut Element> {
        self.node_mut(id)?
            .as_element_mut()
            .ok_or(Error::NotAnElement(id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Child handles of `id`, empty when it has none.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.children(parent).iter().position(|&c| c == child)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.as_element().map(Element::tag)
    }

    pub fn namespace(&self, id: NodeId) -> Option<Namespace> {
        self.get(id)?.as_element().map(Element::namespace)
    }

    /// Content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Overwrite the content of a text or raw node.
    ///
    /// Returns whether the content changed.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<bool> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(current) | NodeData::Raw(current) => {
                if current.as_str() == text {
                    return Ok(false);
                }
                text.clone_into(current);
                Ok(true)
            }
            NodeData::Element(_) => Err(Error::NotText(id)),
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?.as_element()?.attribute(name)
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.element_mut(id)?
            .attributes
            .insert(name.into(), value.into());
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.element_mut(id)?.attributes.shift_remove(name))
    }

    pub fn set_handler(
        &mut self,
        id: NodeId,
        event: impl Into<String>,
        handler: EventHandler,
    ) -> Result<()> {
        self.element_mut(id)?.handlers.insert(event.into(), handler);
        Ok(())
    }

    pub fn remove_handler(&mut self, id: NodeId, event: &str) -> Result<Option<EventHandler>> {
        Ok(self.element_mut(id)?.handlers.shift_remove(event))
    }

    /// Deliver `event` to the handler registered on its target.
    ///
    /// Returns whether a handler ran. Events do not bubble.
    pub fn dispatch(&self, event: &Event) -> Result<bool> {
        let element = self.element(event.target)?;
        match element.handler(&event.name) {
            Some(handler) => {
                handler.call(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Trusted markup held by an element, if it holds raw content.
    pub fn raw_content(&self, id: NodeId) -> Option<&str> {
        match self.get(id)?.as_element()?.content() {
            Content::Raw(markup) => Some(markup),
            Content::Children(_) => None,
        }
    }

    /// Replace everything below `id` with trusted markup.
    ///
    /// The markup is stored verbatim and never parsed or diffed. Only pass
    /// content the application controls; never end-user input.
    pub fn set_raw_content(&mut self, id: NodeId, markup: impl Into<String>) -> Result<()> {
        let previous = std::mem::replace(
            &mut self.element_mut(id)?.content,
            Content::Raw(markup.into()),
        );
        if let Content::Children(children) = previous {
            for child in children {
                self.drop_subtree(child);
            }
        }
        Ok(())
    }

    /// Switch an element holding raw content back to an empty child list.
    pub(crate) fn clear_raw_content(&mut self, id: NodeId) -> Result<bool> {
        let element = self.element_mut(id)?;
        if matches!(element.content, Content::Raw(_)) {
            element.content = Content::default();
            return Ok(true);
        }
        Ok(false)
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.insert_child(parent, usize::MAX, child)
    }

    /// Insert `child` under `parent` at `index`, detaching it first.
    ///
    /// `index` counts positions after the detach and is clamped to the end
    /// of the child list.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.element(parent)?;
        if !self.contains(child) {
            return Err(Error::UnknownNode(child));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(Error::InvalidHierarchy { parent, child });
        }

        self.detach(child)?;
        self.clear_raw_content(parent)?;
        if let Content::Children(children) = &mut self.element_mut(parent)?.content {
            let index = index.min(children.len());
            children.insert(index, child);
        }
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Take `child` out of its parent's child list. The node stays in the
    /// document; a detached node is a no-op.
    pub fn detach(&mut self, child: NodeId) -> Result<()> {
        let Some(parent) = self.node_mut(child)?.parent.take() else {
            return Ok(());
        };
        if let Ok(element) = self.element_mut(parent) {
            if let Content::Children(children) = &mut element.content {
                children.retain(|&c| c != child);
            }
        }
        Ok(())
    }

    /// Remove `child` from `parent` and drop its subtree.
    ///
    /// Returns `false`, touching nothing, when `child` is not a child of
    /// `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<bool> {
        self.element(parent)?;
        if self.parent(child) != Some(parent) {
            return Ok(false);
        }
        self.remove(child)?;
        Ok(true)
    }

    /// Detach `id` and drop it with all of its descendants.
    ///
    /// Returns the number of nodes dropped.
    pub fn remove(&mut self, id: NodeId) -> Result<usize> {
        self.detach(id)?;
        Ok(self.drop_subtree(id))
    }

    /// Put `new` at the position of `old`, then drop `old`'s subtree.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if !self.contains(old) {
            return Err(Error::UnknownNode(old));
        }
        if let Some(parent) = self.parent(old) {
            let index = self.index_of(parent, old).unwrap_or(usize::MAX);
            self.insert_child(parent, index, new)?;
        } else {
            self.detach(new)?;
        }
        self.remove(old)?;
        Ok(())
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn drop_subtree(&mut self, root: NodeId) -> usize {
        let mut stack = vec![root];
        let mut dropped = 0;
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend_from_slice(node.children());
                dropped += 1;
            }
        }
        trace!(root = root.raw(), dropped, "subtree dropped");
        dropped
    }

    /// Serialize the subtree rooted at `id` as markup.
    ///
    /// Text and attribute values are escaped; raw nodes and raw content are
    /// written verbatim.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => escape_into(text, false, out),
            NodeData::Raw(markup) => out.push_str(markup),
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if element.namespace == Namespace::Html && VOID_TAGS.contains(&element.tag.as_str())
                {
                    return;
                }
                match &element.content {
                    Content::Raw(markup) => out.push_str(markup),
                    Content::Children(children) => {
                        for &child in children {
                            self.write_html(child, out);
                        }
                    }
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn build_and_serialize() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let text = doc.create_text("a < b");
        doc.set_attribute(div, "title", "\"quoted\"").unwrap();
        doc.append_child(div, text).unwrap();

        assert_eq!(
            doc.to_html(div),
            "<div title=\"&quot;quoted&quot;\">a &lt; b</div>"
        );
        assert_eq!(doc.parent(text), Some(div));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let br = doc.create_element("br");
        doc.append_child(p, br).unwrap();
        assert_eq!(doc.to_html(p), "<p><br></p>");
    }

    #[test]
    fn insert_moves_existing_child() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        let items: Vec<_> = (0..3).map(|_| doc.create_element("li")).collect();
        for &item in &items {
            doc.append_child(list, item).unwrap();
        }

        doc.insert_child(list, 0, items[2]).unwrap();
        assert_eq!(doc.children(list), &[items[2], items[0], items[1]]);
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn remove_drops_the_subtree() {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let child = doc.create_element("span");
        let grandchild = doc.create_text("x");
        doc.append_child(root, child).unwrap();
        doc.append_child(child, grandchild).unwrap();

        assert_eq!(doc.remove(child).unwrap(), 2);
        assert!(doc.children(root).is_empty());
        assert!(!doc.contains(grandchild));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn replace_keeps_position() {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("i");
        doc.append_child(root, a).unwrap();
        doc.append_child(root, b).unwrap();

        doc.replace(a, c).unwrap();
        assert_eq!(doc.children(root), &[c, b]);
        assert!(!doc.contains(a));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();

        let err = doc.append_child(inner, outer).unwrap_err();
        assert!(matches!(err, Error::InvalidHierarchy { .. }));
        let err = doc.append_child(outer, outer).unwrap_err();
        assert!(matches!(err, Error::InvalidHierarchy { .. }));
    }

    #[test]
    fn text_nodes_cannot_have_children() {
        let mut doc = Document::new();
        let text = doc.create_text("x");
        let span = doc.create_element("span");
        assert!(matches!(doc.append_child(text, span), Err(Error::NotAnElement(_))));
    }

    #[test]
    fn raw_content_replaces_children() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let child = doc.create_text("old");
        doc.append_child(div, child).unwrap();

        doc.set_raw_content(div, "<b>trusted</b>").unwrap();
        assert!(!doc.contains(child));
        assert_eq!(doc.raw_content(div), Some("<b>trusted</b>"));
        assert_eq!(doc.to_html(div), "<div><b>trusted</b></div>");

        // Appending switches back to a child list.
        let fresh = doc.create_text("new");
        doc.append_child(div, fresh).unwrap();
        assert_eq!(doc.raw_content(div), None);
        assert_eq!(doc.to_html(div), "<div>new</div>");
    }

    #[test]
    fn dispatch_calls_the_handler() {
        let mut doc = Document::new();
        let button = doc.create_element("button");
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        doc.set_handler(
            button,
            "click",
            EventHandler::new(move |event| *seen_clone.lock() = event.value.clone()),
        )
        .unwrap();

        let ran = doc
            .dispatch(&Event::new("click", button).with_value("left"))
            .unwrap();
        assert!(ran);
        assert_eq!(seen.lock().as_deref(), Some("left"));
        assert!(!doc.dispatch(&Event::new("keydown", button)).unwrap());
    }

    #[test]
    fn materialize_builds_a_detached_subtree() {
        let mut doc = Document::new();
        let node: VNode = VNode::element("div")
            .attr("id", "root")
            .child(VNode::element("svg").child(VNode::element("a")))
            .child("text")
            .into();

        let root = doc.materialize(&node, Namespace::Html);
        assert_eq!(doc.parent(root), None);
        assert_eq!(doc.len(), 4);
        let svg = doc.children(root)[0];
        let link = doc.children(svg)[0];
        assert_eq!(doc.parent(link), Some(svg));
        assert_eq!(doc.namespace(link), Some(Namespace::Svg));
        assert_eq!(doc.to_html(root), "<div id=\"root\"><svg><a></a></svg>text</div>");
    }

    #[test]
    fn remove_child_checks_the_parent() {
        let mut doc = Document::new();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        let child = doc.create_text("x");
        doc.append_child(a, child).unwrap();

        assert!(!doc.remove_child(b, child).unwrap());
        assert!(doc.contains(child));
        assert!(doc.remove_child(a, child).unwrap());
        assert!(!doc.contains(child));
    }

    #[test]
    fn unknown_nodes_are_errors() {
        let mut doc = Document::new();
        let ghost = {
            let mut scratch = Document::new();
            scratch.create_text("ghost")
        };
        assert!(matches!(doc.set_attribute(ghost, "a", "b"), Err(Error::UnknownNode(_))));
        assert!(matches!(doc.remove(ghost), Err(Error::UnknownNode(_))));
    }
}
