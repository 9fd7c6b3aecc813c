//! Live Tree Nodes
//!
//! This module defines the node types stored in a [`Document`](super::Document).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

/// Stable handle of a node in a document.
///
/// Handles are never reused, so a handle that survives a morph refers to the
/// same node it did before: moving a node changes its parent's child list,
/// never its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Tags created in the SVG namespace even without an `<svg>` ancestor.
const SVG_TAGS: &[&str] = &[
    "svg",
    "g",
    "defs",
    "symbol",
    "use",
    "path",
    "circle",
    "ellipse",
    "line",
    "polyline",
    "polygon",
    "rect",
    "text",
    "tspan",
    "textPath",
    "marker",
    "mask",
    "pattern",
    "clipPath",
    "linearGradient",
    "radialGradient",
    "stop",
    "filter",
    "feBlend",
    "feColorMatrix",
    "feComposite",
    "feGaussianBlur",
    "feOffset",
    "foreignObject",
];

/// Element namespace, fixed when the element is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }

    /// Namespace for an element named `tag` created under a parent whose
    /// children default to `inherited`.
    pub fn for_tag(tag: &str, inherited: Namespace, extra_svg_tags: &[String]) -> Namespace {
        match tag {
            "svg" => Namespace::Svg,
            "math" => Namespace::MathMl,
            _ if inherited != Namespace::Html => inherited,
            _ if SVG_TAGS.contains(&tag) || extra_svg_tags.iter().any(|t| t == tag) => {
                Namespace::Svg
            }
            _ => Namespace::Html,
        }
    }

    /// Namespace the children of a `tag` element in `self` default to.
    pub fn for_children(self, tag: &str) -> Namespace {
        match (self, tag) {
            (Namespace::Svg, "foreignObject") => Namespace::Html,
            (namespace, _) => namespace,
        }
    }
}

/// An event delivered to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub value: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A shared event handler.
///
/// Two handlers are equal only if they are the same allocation. Closures
/// rebuilt by a render are always different handlers, even if their code is
/// the same.
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&Event) + Send + Sync>);

impl EventHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// What an element holds below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Ordered child nodes.
    Children(Vec<NodeId>),

    /// Trusted markup injected verbatim. Never diffed.
    Raw(String),
}

impl Default for Content {
    fn default() -> Self {
        Content::Children(Vec::new())
    }
}

/// An element node.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) tag: String,
    pub(crate) namespace: Namespace,
    pub(crate) attributes: IndexMap<String, String>,
    pub(crate) handlers: IndexMap<String, EventHandler>,
    pub(crate) content: Content,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn handler(&self, event: &str) -> Option<&EventHandler> {
        self.handlers.get(event)
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.content {
            Content::Children(children) => children,
            Content::Raw(_) => &[],
        }
    }
}

/// The payload of a node.
#[derive(Debug, Clone)]
pub enum NodeData {
    Element(Element),
    Text(String),
    /// Opaque markup node.
    Raw(String),
}

/// The kind of a node, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Raw,
}

/// A node of the live tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: NodeData,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Self {
            id: NodeId::new(),
            parent: None,
            data,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Raw(_) => NodeKind::Raw,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match &self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn as_element_mut(&mut self) -> Option<&mut Element> {
        match &mut self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Child handles; empty for anything but an element with children.
    pub fn children(&self) -> &[NodeId] {
        self.as_element().map(Element::children).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn namespace_from_tag() {
        assert_eq!(Namespace::for_tag("div", Namespace::Html, &[]), Namespace::Html);
        assert_eq!(Namespace::for_tag("svg", Namespace::Html, &[]), Namespace::Svg);
        assert_eq!(Namespace::for_tag("circle", Namespace::Html, &[]), Namespace::Svg);
        assert_eq!(Namespace::for_tag("math", Namespace::Html, &[]), Namespace::MathMl);
    }

    #[test]
    fn namespace_is_inherited() {
        // `a` is an HTML tag, but inside SVG it is an SVG link.
        assert_eq!(Namespace::for_tag("a", Namespace::Svg, &[]), Namespace::Svg);
        assert_eq!(Namespace::for_tag("mi", Namespace::MathMl, &[]), Namespace::MathMl);
        assert_eq!(Namespace::Svg.for_children("foreignObject"), Namespace::Html);
        assert_eq!(Namespace::Svg.for_children("g"), Namespace::Svg);
    }

    #[test]
    fn extra_svg_tags_are_honored() {
        let extra = vec!["feTurbulence".to_string()];
        assert_eq!(Namespace::for_tag("feTurbulence", Namespace::Html, &extra), Namespace::Svg);
        assert_eq!(Namespace::for_tag("feTurbulence", Namespace::Html, &[]), Namespace::Html);
    }

    #[test]
    fn handlers_compare_by_identity() {
        let handler = EventHandler::new(|_| {});
        let same = handler.clone();
        let other = EventHandler::new(|_| {});
        assert_eq!(handler, same);
        assert_ne!(handler, other);
    }
}
