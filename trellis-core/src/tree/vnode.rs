//! Render Output
//!
//! A [`VNode`] is the tree a render function returns: a plain owned
//! description that the reconciler merges into the live [`Document`].
//!
//! Render output serializes with serde. Event handlers are closures and are
//! skipped, so a deserialized tree carries structure and attributes only.
//!
//! [`Document`]: super::Document

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::node::{Event, EventHandler};
use crate::config::MorphConfig;

/// A node of a freshly rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VNode {
    Element(VElement),
    Text { text: String },
    /// Opaque markup node. Written verbatim, compared as a string.
    Raw { markup: String },
}

impl VNode {
    /// Start building an element.
    pub fn element(tag: impl Into<String>) -> VElement {
        VElement::new(tag)
    }

    pub fn text(text: impl Into<String>) -> VNode {
        VNode::Text { text: text.into() }
    }

    pub fn raw(markup: impl Into<String>) -> VNode {
        VNode::Raw {
            markup: markup.into(),
        }
    }

    pub fn as_element(&self) -> Option<&VElement> {
        match self {
            VNode::Element(element) => Some(element),
            _ => None,
        }
    }

    /// The list key of this node under `config`, if it has one.
    pub fn key<'a>(&'a self, config: &MorphConfig) -> Option<&'a str> {
        self.as_element()?.attribute(&config.key_attribute)
    }
}

impl From<VElement> for VNode {
    fn from(element: VElement) -> Self {
        VNode::Element(element)
    }
}

impl From<&str> for VNode {
    fn from(text: &str) -> Self {
        VNode::text(text)
    }
}

impl From<String> for VNode {
    fn from(text: String) -> Self {
        VNode::Text { text }
    }
}

/// An element of a freshly rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VElement {
    pub tag: String,

    #[serde(default)]
    pub attributes: IndexMap<String, String>,

    #[serde(skip)]
    pub handlers: IndexMap<String, EventHandler>,

    #[serde(default)]
    pub children: Vec<VNode>,

    /// Trusted markup that replaces the element's children verbatim.
    ///
    /// The reconciler does not diff below an element carrying this marker and
    /// does not inspect the markup. Only ever pass content the application
    /// controls, never end-user input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
}

impl VElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
            handlers: IndexMap::new(),
            children: Vec::new(),
            raw_html: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the list key under the default key attribute.
    pub fn key(self, key: impl Into<String>) -> Self {
        let name = MorphConfig::default().key_attribute;
        self.attr(name, key)
    }

    /// Mark the element as externally owned under the default keep
    /// attribute. Once materialized, later morphs leave it alone.
    pub fn keep(self) -> Self {
        let name = MorphConfig::default().keep_attribute;
        self.attr(name, "")
    }

    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.insert(event.into(), EventHandler::new(handler));
        self
    }

    /// Attach an existing handler, keeping its identity.
    pub fn handler(mut self, event: impl Into<String>, handler: EventHandler) -> Self {
        self.handlers.insert(event.into(), handler);
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// See [`VElement::raw_html`](VElement#structfield.raw_html).
    pub fn raw_html(mut self, markup: impl Into<String>) -> Self {
        self.raw_html = Some(markup.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_structure() {
        let node: VNode = VNode::element("ul")
            .attr("class", "list")
            .children((0..3).map(|i| VNode::element("li").key(i.to_string()).child(format!("item {i}"))))
            .into();

        let ul = node.as_element().unwrap();
        assert_eq!(ul.children.len(), 3);
        let config = MorphConfig::default();
        assert_eq!(ul.children[1].key(&config), Some("1"));
        assert_eq!(ul.attribute("class"), Some("list"));
    }

    #[test]
    fn json_round_trip_drops_handlers() {
        let node: VNode = VNode::element("button")
            .attr("type", "submit")
            .on("click", |_| {})
            .child("Send")
            .into();

        let json = serde_json::to_string(&node).unwrap();
        let back: VNode = serde_json::from_str(&json).unwrap();
        let element = back.as_element().unwrap();
        assert!(element.handlers.is_empty());
        assert_eq!(element.attribute("type"), Some("submit"));
        assert_eq!(element.children, vec![VNode::text("Send")]);
    }

    #[test]
    fn deserializes_minimal_json() {
        let node: VNode = serde_json::from_str(
            r#"{ "type": "element", "tag": "p", "children": [{ "type": "text", "text": "hi" }] }"#,
        )
        .unwrap();
        assert_eq!(node, VNode::from(VNode::element("p").child("hi")));
    }
}
