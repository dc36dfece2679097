//! # Validator
//!
//! Converts a compiled [`Schema`] into a JSON Schema document and checks
//! assembled request objects against it.
//!
//! The document is built bottom-up from a tree keyed by path segment: one
//! object shape per nesting level, with each level's `required` list taken
//! from the fields' optional flags. Arrays of structural types become
//! `{"type":"array","items":{...}}`.
//!
//! Validation never panics. Failures are normalised into one
//! [`FieldIssue`] per field, named by the field's leaf segment. On success
//! the object is returned pruned to the declared fields.

use crate::spec::{PrimitiveType, Schema};
use jsonschema::error::ValidationErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One validation problem, keyed by the offending field's leaf segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ShapeNode {
    Leaf {
        primitive: PrimitiveType,
        array: bool,
    },
    Object {
        children: BTreeMap<String, (ShapeNode, bool)>,
        array: bool,
    },
}

impl ShapeNode {
    fn empty_object(array: bool) -> Self {
        ShapeNode::Object {
            children: BTreeMap::new(),
            array,
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            ShapeNode::Leaf { primitive, array } => wrap_array(primitive_schema(*primitive), *array),
            ShapeNode::Object { children, array } => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (name, (child, is_required)) in children {
                    properties.insert(name.clone(), child.to_json_schema());
                    if *is_required {
                        required.push(Value::String(name.clone()));
                    }
                }
                let object = json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                });
                wrap_array(object, *array)
            }
        }
    }

    /// Drop undeclared keys from `value`.
    fn prune(&self, value: &mut Value) {
        let ShapeNode::Object { children, array } = self else {
            return;
        };
        let prune_object = |v: &mut Value| {
            if let Value::Object(map) = v {
                map.retain(|k, _| children.contains_key(k));
                for (k, child_value) in map.iter_mut() {
                    if let Some((child, _)) = children.get(k) {
                        child.prune(child_value);
                    }
                }
            }
        };
        match (array, value) {
            (true, Value::Array(items)) => items.iter_mut().for_each(prune_object),
            (false, v) => prune_object(v),
            _ => {}
        }
    }
}

fn primitive_schema(primitive: PrimitiveType) -> Value {
    match primitive {
        PrimitiveType::String | PrimitiveType::Date => json!({ "type": "string" }),
        PrimitiveType::Number => json!({ "type": "number" }),
        PrimitiveType::Integer => json!({ "type": "integer" }),
        PrimitiveType::Boolean => json!({ "type": "boolean" }),
        PrimitiveType::Null => json!({ "type": "null" }),
        PrimitiveType::Object => json!({ "type": "object" }),
        PrimitiveType::Any | PrimitiveType::Unknown => json!({}),
        PrimitiveType::Never => json!({ "not": {} }),
    }
}

fn wrap_array(items: Value, array: bool) -> Value {
    if array {
        json!({ "type": "array", "items": items })
    } else {
        items
    }
}

/// Build the segment tree of `schema`, root segment stripped.
fn shape_tree(schema: &Schema) -> ShapeNode {
    let mut root = ShapeNode::empty_object(false);
    for (path, field) in schema.iter() {
        let segments = path.strip_root();
        let segments = segments.segments();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        let mut node = &mut root;
        for seg in parents {
            let ShapeNode::Object { children, .. } = node else {
                break;
            };
            node = &mut children
                .entry(seg.name.clone())
                .or_insert_with(|| (ShapeNode::empty_object(seg.array), !seg.optional))
                .0;
        }
        if let ShapeNode::Object { children, .. } = node {
            children.insert(
                last.name.clone(),
                (
                    ShapeNode::Leaf {
                        primitive: field.primitive_type,
                        array: last.array,
                    },
                    !field.declared_optional,
                ),
            );
        }
    }
    root
}

/// JSON Schema document describing `schema`.
pub fn json_schema_for(schema: &Schema) -> Value {
    shape_tree(schema).to_json_schema()
}

/// A compiled validator for one schema root.
pub struct SchemaValidator {
    root: String,
    shape: ShapeNode,
    document: Value,
    compiled: jsonschema::Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("root", &self.root)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile `schema`. Fails only if the generated document is rejected
    /// by the JSON Schema engine.
    pub fn compile(schema: &Schema) -> Result<Self, String> {
        let shape = shape_tree(schema);
        let document = shape.to_json_schema();
        let compiled = jsonschema::validator_for(&document).map_err(|e| e.to_string())?;
        Ok(Self {
            root: schema.root.clone(),
            shape,
            document,
            compiled,
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.compiled.is_valid(value)
    }

    /// Validate `value`; on success return it pruned to declared fields.
    pub fn validate(&self, mut value: Value) -> Result<Value, Vec<FieldIssue>> {
        let mut issues: Vec<FieldIssue> = Vec::new();
        for error in self.compiled.iter_errors(&value) {
            let field = match error.kind() {
                ValidationErrorKind::Required { property } => property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string()),
                _ => leaf_of_pointer(error.instance_path().as_str())
                    .unwrap_or(self.root.as_str())
                    .to_string(),
            };
            if issues.iter().all(|i| i.field != field) {
                issues.push(FieldIssue {
                    field,
                    message: error.to_string(),
                });
            }
        }
        if !issues.is_empty() {
            return Err(issues);
        }
        self.shape.prune(&mut value);
        Ok(value)
    }
}

/// Last non-index segment of a JSON pointer.
fn leaf_of_pointer(pointer: &str) -> Option<&str> {
    pointer
        .split('/')
        .rev()
        .find(|seg| !seg.is_empty() && seg.parse::<usize>().is_err())
}
