//! Conversion between the node tree and its stored JSON form.
//!
//! A stored document is a JSON array of top-level nodes. Elements serialize
//! as `{"type": ..., ...properties, "children": [...]}` and text leaves as
//! `{...marks, "text": "..."}`. Sequence text is flattened to a plain string
//! on the way out and parsed back as plain text, so the stored form never
//! carries CRDT metadata.

use std::sync::Arc;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::error::SerializeError;
use crate::node::{Element, ElementKind, Marks, Node, Properties, Text};
use crate::ops::Operation;
use crate::text::{TextBuffer, TextContent};

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Children<'a, T>(&'a [Arc<Node<T>>]);

impl<T: TextBuffer> Serialize for Children<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(Arc::as_ref))
    }
}

impl<T: TextBuffer> Serialize for Node<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Node::Text(text) => {
                for (name, enabled) in text.marks.iter() {
                    if enabled {
                        map.serialize_entry(name, &true)?;
                    }
                }
                map.serialize_entry("text", &text.text())?;
            }
            Node::Element(element) => {
                map.serialize_entry("type", element.kind.as_str())?;
                for (key, value) in &element.properties {
                    if key != "type" && key != "children" {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.serialize_entry("children", &Children(&element.children))?;
            }
        }
        map.end()
    }
}

impl<'de, T: TextBuffer> Deserialize<'de> for Node<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Node::from_value(&value).map_err(D::Error::custom)
    }
}

impl<T: TextBuffer> Node<T> {
    /// Build a node from its stored JSON form.
    pub fn from_value(value: &Value) -> Result<Self, SerializeError> {
        let Value::Object(object) = value else {
            return Err(SerializeError::UnexpectedValue {
                expected: "object",
                found: value_kind(value),
            });
        };

        if let Some(text) = object.get("text") {
            let Value::String(text) = text else {
                return Err(SerializeError::UnexpectedValue {
                    expected: "string",
                    found: value_kind(text),
                });
            };
            let mut marks = Marks::default();
            for (key, value) in object.iter().filter(|(key, _)| *key != "text") {
                if Marks::NAMES.contains(&key.as_str()) {
                    marks
                        .set(key, value)
                        .map_err(|_| SerializeError::UnexpectedValue {
                            expected: "boolean",
                            found: value_kind(value),
                        })?;
                } else {
                    debug!(key = %key, "ignoring unknown text leaf property");
                }
            }
            return Ok(Node::Text(Text {
                content: TextContent::Plain(text.clone()),
                marks,
            }));
        }

        let kind = match object.get("type") {
            None => return Err(SerializeError::MissingField { field: "type" }),
            Some(value) => ElementKind::deserialize(value).map_err(|_| {
                SerializeError::UnknownElementType {
                    value: value.to_string(),
                }
            })?,
        };
        let children = match object.get("children") {
            None => return Err(SerializeError::MissingField { field: "children" }),
            Some(Value::Array(children)) => children
                .iter()
                .map(|child| Node::from_value(child).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(SerializeError::UnexpectedValue {
                    expected: "array",
                    found: value_kind(other),
                });
            }
        };
        let properties: Properties = object
            .iter()
            .filter(|(key, _)| *key != "type" && *key != "children")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Node::Element(Element {
            kind,
            properties,
            children,
        }))
    }

    /// The stored JSON form of this node.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Text(text) => {
                let mut object = text.marks.to_properties();
                object.insert("text".to_string(), Value::String(text.text()));
                Value::Object(object)
            }
            Node::Element(element) => {
                let mut object = Properties::new();
                object.insert(
                    "type".to_string(),
                    Value::String(element.kind.as_str().to_string()),
                );
                for (key, value) in &element.properties {
                    if key != "type" && key != "children" {
                        object.insert(key.clone(), value.clone());
                    }
                }
                object.insert(
                    "children".to_string(),
                    Value::Array(element.children.iter().map(|c| c.to_value()).collect()),
                );
                Value::Object(object)
            }
        }
    }
}

/// Parse a stored document into a root element.
///
/// Blank input yields the empty document (a single empty paragraph), which
/// is what a freshly created outline holds.
pub fn parse_document<T: TextBuffer>(input: &str) -> Result<Node<T>, SerializeError> {
    if input.trim().is_empty() {
        return Ok(Node::empty_document());
    }
    let value: Value = serde_json::from_str(input)?;
    let Value::Array(blocks) = &value else {
        return Err(SerializeError::UnexpectedValue {
            expected: "array",
            found: value_kind(&value),
        });
    };
    let children = blocks
        .iter()
        .map(|block| Node::from_value(block).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::Element(Element {
        kind: ElementKind::Root,
        properties: Properties::new(),
        children,
    }))
}

/// The stored form of a document: the root's children as a JSON array.
pub fn serialize_document<T: TextBuffer>(root: &Node<T>) -> Result<String, SerializeError> {
    Ok(serde_json::to_string(&Children(root.children()))?)
}

/// Pretty-printed stored form, for humans.
pub fn serialize_document_pretty<T: TextBuffer>(root: &Node<T>) -> Result<String, SerializeError> {
    Ok(serde_json::to_string_pretty(&Children(root.children()))?)
}

/// Parse an operation log (a JSON array of operations).
pub fn parse_operations<T: TextBuffer>(input: &str) -> Result<Vec<Operation<T>>, SerializeError> {
    Ok(serde_json::from_str(input)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::apply::apply_all;
    use crate::text::EditorRope;
    use crate::tree::string;

    type Doc = Node<EditorRope>;

    const STORED: &str = r#"[{"type":"heading-one","children":[{"text":"Title"}]},{"type":"paragraph","align":"center","children":[{"bold":true,"text":"see "},{"type":"concept-reference","name":"X","children":[{"text":""}]}]}]"#;

    #[test]
    fn test_round_trip() {
        let doc: Doc = parse_document(STORED).unwrap();
        assert_eq!(serialize_document(&doc).unwrap(), STORED);
        assert_eq!(parse_document::<EditorRope>(&serialize_document(&doc).unwrap()).unwrap(), doc);
    }

    #[test]
    fn test_promoted_text_is_flattened() {
        let doc: Doc = parse_document(r#"[{"type":"paragraph","children":[{"text":"ac"}]}]"#)
            .unwrap();
        let ops = parse_operations::<EditorRope>(
            r#"[{"type":"insert_text","path":[0,0],"offset":1,"text":"b"}]"#,
        )
        .unwrap();
        let edited = apply_all(&doc, &ops).unwrap();
        insta::assert_snapshot!(
            serialize_document(&edited).unwrap(),
            @r#"[{"type":"paragraph","children":[{"text":"abc"}]}]"#
        );
    }

    #[test]
    fn test_blank_input_is_empty_document() {
        let doc: Doc = parse_document("  \n").unwrap();
        assert_eq!(doc, Node::empty_document());
        assert_eq!(
            serialize_document(&doc).unwrap(),
            r#"[{"type":"paragraph","children":[{"text":""}]}]"#
        );
    }

    #[test]
    fn test_aliases_normalize() {
        let doc: Doc =
            parse_document(r#"[{"type":"heading-2","children":[{"text":"h"}]}]"#).unwrap();
        assert_eq!(doc.children()[0].kind(), Some(ElementKind::HeadingTwo));
        assert!(serialize_document(&doc).unwrap().contains(r#""type":"heading-two""#));
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(matches!(
            parse_document::<EditorRope>("{}"),
            Err(SerializeError::UnexpectedValue {
                expected: "array",
                found: "object"
            })
        ));
        assert!(matches!(
            parse_document::<EditorRope>(r#"[{"type":"marquee","children":[]}]"#),
            Err(SerializeError::UnknownElementType { .. })
        ));
        assert!(matches!(
            parse_document::<EditorRope>(r#"[{"children":[]}]"#),
            Err(SerializeError::MissingField { field: "type" })
        ));
        assert!(matches!(
            parse_document::<EditorRope>("[{"),
            Err(SerializeError::Json(_))
        ));
    }

    #[test]
    fn test_to_value_matches_serializer() {
        let doc: Doc = parse_document(STORED).unwrap();
        let block = &doc.children()[1];
        assert_eq!(block.to_value(), serde_json::to_value(block.as_ref()).unwrap());
        assert_eq!(string(&doc), "Titlesee ");
        assert_eq!(
            doc.children()[1].as_element().unwrap().property("align"),
            Some(&json!("center"))
        );
    }
}
