//! # Schema Compiler
//!
//! Flattens a structural [`TypeDescription`] into a [`Schema`]: one
//! [`SchemaField`] per reachable primitive leaf, keyed by its dotted
//! [`FieldPath`] under a root prefix (`request`, `response`, ...).
//!
//! ## Rules
//!
//! - Primitive fields become leaves carrying their own array/optional flags.
//! - Structural fields recurse; the subtree is built bottom-up and then
//!   prefixed with the parent's segment.
//! - An optional structural field marks its own segment with `?` and sets
//!   `is_optional` on every descendant. Markers are flags, so re-marking
//!   never produces `??`.
//! - An array-of-structural field marks its segment `[]` and sets
//!   `is_array` on every descendant.
//! - Fields with an unresolved type (or a primitive name that is not a
//!   known native type) are dropped.
//! - A field without an identifier, a duplicate sibling, or a union or
//!   intersection type fails the whole shape with
//!   [`BuildError::SchemaExtraction`] / [`BuildError::UnsupportedType`].

use super::types::{
    FieldDescription, FieldPath, PathSegment, PrimitiveType, Schema, SchemaField, TypeDescription,
    TypeShape,
};
use crate::error::BuildError;
use std::collections::BTreeMap;
use tracing::debug;

/// Nested structural types deeper than this are rejected.
pub const MAX_DEPTH: usize = 32;

/// Compile `desc` into a flat schema rooted at `root`.
pub fn compile_schema(root: &str, desc: &TypeDescription) -> Result<Schema, BuildError> {
    let relative = extract_fields(&desc.name, &desc.fields, 0)?;
    let root_segment = PathSegment::new(root);
    let fields = relative
        .into_iter()
        .map(|(path, mut field)| {
            let path = path.prefixed(root_segment.clone());
            field.path = path.clone();
            (path, field)
        })
        .collect();
    Ok(Schema {
        root: root.to_string(),
        fields,
    })
}

type Subtree = BTreeMap<FieldPath, SchemaField>;

fn extract_fields(
    type_name: &str,
    fields: &[FieldDescription],
    depth: usize,
) -> Result<Subtree, BuildError> {
    if depth > MAX_DEPTH {
        return Err(BuildError::SchemaExtraction {
            type_name: type_name.to_string(),
            reason: format!("nesting deeper than {MAX_DEPTH} levels"),
        });
    }

    let mut out = Subtree::new();
    for field in fields {
        let identifier = match field.identifier.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(BuildError::SchemaExtraction {
                    type_name: type_name.to_string(),
                    reason: "field has no resolvable identifier".to_string(),
                })
            }
        };

        let segment = PathSegment::new(identifier);
        let subtree = match &field.ty {
            TypeShape::Primitive { name } => match PrimitiveType::from_type_name(name) {
                Some(primitive) => leaf(identifier, primitive, field),
                None => {
                    debug!(type_name, field = identifier, declared = %name, "Dropping field with unresolved type");
                    continue;
                }
            },
            TypeShape::Object { fields: nested, .. } => {
                let children = extract_fields(type_name, nested, depth + 1)?;
                nest(
                    children,
                    segment.mark_optional(field.optional).mark_array(field.array),
                    field,
                )
            }
            TypeShape::Union { .. } | TypeShape::Intersection { .. } => {
                return Err(BuildError::UnsupportedType {
                    type_name: type_name.to_string(),
                    field: identifier.to_string(),
                })
            }
            TypeShape::Unresolved => {
                debug!(type_name, field = identifier, "Dropping field with unresolved type");
                continue;
            }
        };

        for (path, schema_field) in subtree {
            if out.keys().any(|k| k.same_field(&path)) {
                return Err(BuildError::SchemaExtraction {
                    type_name: type_name.to_string(),
                    reason: format!("duplicate field '{path}'"),
                });
            }
            out.insert(path, schema_field);
        }
    }
    Ok(out)
}

fn leaf(identifier: &str, primitive: PrimitiveType, field: &FieldDescription) -> Subtree {
    let segment = PathSegment::new(identifier).mark_array(field.array);
    let path = FieldPath::leaf(segment);
    let schema_field = SchemaField {
        identifier: identifier.to_string(),
        path: path.clone(),
        primitive_type: primitive,
        is_array: field.array,
        is_optional: field.optional,
        declared_optional: field.optional,
    };
    Subtree::from([(path, schema_field)])
}

/// Hang `children` under `segment`, propagating the parent's flags.
fn nest(children: Subtree, segment: PathSegment, parent: &FieldDescription) -> Subtree {
    children
        .into_iter()
        .map(|(path, mut field)| {
            let path = path.prefixed(segment.clone());
            field.is_optional |= parent.optional;
            field.is_array |= parent.array;
            field.path = path.clone();
            (path, field)
        })
        .collect()
}
