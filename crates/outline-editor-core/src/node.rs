//! Document node types.
//!
//! A document is a tree of `Element` nodes (typed, with properties and
//! children) whose leaves are `Text` nodes (character content plus style
//! marks). Children are held behind `Arc` so snapshots share every subtree
//! an operation does not touch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::TreeError;
use crate::text::{TextBuffer, TextContent};

/// Type-specific element properties (`url`, `width`, `checked`, `name`, ...).
pub type Properties = serde_json::Map<String, Value>;

/// Property keys that only node and text operations may change.
pub const PROTECTED_PROPERTIES: [&str; 2] = ["children", "text"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    /// Implicit document root. Never appears in serialized documents.
    Root,
    Paragraph,
    #[serde(alias = "heading-1")]
    HeadingOne,
    #[serde(alias = "heading-2")]
    HeadingTwo,
    #[serde(alias = "heading-3")]
    HeadingThree,
    BlockQuote,
    BulletedList,
    NumberedList,
    ListItem,
    CheckListItem,
    Image,
    Link,
    #[serde(alias = "concept")]
    ConceptReference,
    Table,
    TableRow,
    TableCell,
    Embed,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Root => "root",
            ElementKind::Paragraph => "paragraph",
            ElementKind::HeadingOne => "heading-one",
            ElementKind::HeadingTwo => "heading-two",
            ElementKind::HeadingThree => "heading-three",
            ElementKind::BlockQuote => "block-quote",
            ElementKind::BulletedList => "bulleted-list",
            ElementKind::NumberedList => "numbered-list",
            ElementKind::ListItem => "list-item",
            ElementKind::CheckListItem => "check-list-item",
            ElementKind::Image => "image",
            ElementKind::Link => "link",
            ElementKind::ConceptReference => "concept-reference",
            ElementKind::Table => "table",
            ElementKind::TableRow => "table-row",
            ElementKind::TableCell => "table-cell",
            ElementKind::Embed => "embed",
        }
    }

    /// Inline elements flow inside a block's text.
    pub fn is_inline(&self) -> bool {
        matches!(self, ElementKind::Link | ElementKind::ConceptReference)
    }

    /// Void elements render without editable content; their single text
    /// child is a placeholder.
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            ElementKind::Image | ElementKind::Embed | ElementKind::ConceptReference
        )
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline() && *self != ElementKind::Root
    }

    /// Parse a `type` property value.
    pub fn from_value(value: &Value) -> Result<Self, TreeError> {
        ElementKind::deserialize(value).map_err(|e| TreeError::InvalidProperty {
            key: "type".to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Character styles applied to a text leaf.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
}

impl Marks {
    pub const NAMES: [&'static str; 4] = ["bold", "italic", "underline", "code"];

    pub fn get(&self, name: &str) -> Option<bool> {
        match name {
            "bold" => Some(self.bold),
            "italic" => Some(self.italic),
            "underline" => Some(self.underline),
            "code" => Some(self.code),
            _ => None,
        }
    }

    fn slot(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "bold" => Some(&mut self.bold),
            "italic" => Some(&mut self.italic),
            "underline" => Some(&mut self.underline),
            "code" => Some(&mut self.code),
            _ => None,
        }
    }

    /// Set a mark from a property value. `null` clears the mark.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), TreeError> {
        let slot = self.slot(name).ok_or_else(|| TreeError::InvalidProperty {
            key: name.to_string(),
            message: "text leaves only carry style marks".to_string(),
        })?;
        *slot = match value {
            Value::Null => false,
            Value::Bool(on) => *on,
            other => {
                return Err(TreeError::InvalidProperty {
                    key: name.to_string(),
                    message: format!("expected a boolean, found {other}"),
                });
            }
        };
        Ok(())
    }

    /// Iterate `(name, enabled)` pairs in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> {
        let marks = *self;
        Self::NAMES
            .into_iter()
            .map(move |name| (name, marks.get(name).unwrap_or(false)))
    }

    /// Enabled marks as a property map, the shape `set_node` carries.
    pub fn to_properties(&self) -> Properties {
        self.iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| (name.to_string(), Value::Bool(true)))
            .collect()
    }
}

/// A text leaf.
#[derive(Clone, Debug)]
pub struct Text<T> {
    pub content: TextContent<T>,
    pub marks: Marks,
}

impl<T: TextBuffer> Text<T> {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            content: TextContent::Plain(text.into()),
            marks: Marks::default(),
        }
    }

    pub fn with_marks(mut self, marks: Marks) -> Self {
        self.marks = marks;
        self
    }

    pub fn text(&self) -> String {
        self.content.to_text()
    }

    pub fn len_chars(&self) -> usize {
        self.content.len_chars()
    }
}

impl<T: TextBuffer> PartialEq for Text<T> {
    fn eq(&self, other: &Self) -> bool {
        self.marks == other.marks && self.content == other.content
    }
}

/// An internal node.
#[derive(Clone, Debug)]
pub struct Element<T> {
    pub kind: ElementKind,
    pub properties: Properties,
    pub children: Vec<Arc<Node<T>>>,
}

impl<T> Element<T> {
    pub fn new(kind: ElementKind, children: Vec<Node<T>>) -> Self {
        Self {
            kind,
            properties: Properties::new(),
            children: children.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// The `name` property, used by concept references.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }

    pub fn name_smol(&self) -> Option<SmolStr> {
        self.name().map(SmolStr::new)
    }

    pub fn child(&self, index: usize) -> Option<&Node<T>> {
        self.children.get(index).map(Arc::as_ref)
    }

    /// Apply a property update: `null` deletes a key, `type` changes the
    /// kind, anything else is stored as-is.
    pub fn set_properties(&mut self, updates: &Properties) -> Result<(), TreeError> {
        for (key, value) in updates {
            if PROTECTED_PROPERTIES.contains(&key.as_str()) {
                return Err(TreeError::ProtectedProperty { key: key.clone() });
            }
            if key == "type" {
                self.kind = ElementKind::from_value(value)?;
            } else if value.is_null() {
                self.properties.remove(key);
            } else {
                self.properties.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

impl<T: TextBuffer> PartialEq for Element<T> {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.properties == other.properties
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}

#[derive(Clone, Debug)]
pub enum Node<T> {
    Element(Element<T>),
    Text(Text<T>),
}

impl<T: TextBuffer> Node<T> {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(Text::new(text))
    }

    pub fn styled(text: impl Into<String>, marks: Marks) -> Self {
        Node::Text(Text::new(text).with_marks(marks))
    }

    pub fn element(kind: ElementKind, children: Vec<Node<T>>) -> Self {
        Node::Element(Element::new(kind, children))
    }

    /// A root element holding the given top-level blocks.
    pub fn root(children: Vec<Node<T>>) -> Self {
        Node::element(ElementKind::Root, children)
    }

    /// A paragraph holding a single text leaf.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::element(ElementKind::Paragraph, vec![Node::text(text)])
    }

    /// A concept reference named `name`, with the usual empty text child.
    pub fn concept(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Node::Element(
            Element::new(ElementKind::ConceptReference, vec![Node::text("")])
                .with_property("name", name),
        )
    }

    /// The document a freshly created outline starts with.
    pub fn empty_document() -> Self {
        Node::root(vec![Node::paragraph("")])
    }
}

impl<T> Node<T> {
    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Element(_))
    }

    pub fn as_element(&self) -> Option<&Element<T>> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text<T>> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }

    pub fn kind(&self) -> Option<ElementKind> {
        self.as_element().map(|element| element.kind)
    }

    pub fn children(&self) -> &[Arc<Node<T>>] {
        match self {
            Node::Element(element) => &element.children,
            Node::Text(_) => &[],
        }
    }
}

impl<T: TextBuffer> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Element(a), Node::Element(b)) => a == b,
            (Node::Text(a), Node::Text(b)) => a == b,
            _ => false,
        }
    }
}
