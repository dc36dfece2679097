//! # Source-List Compiler
//!
//! Buckets every field of a [`Schema`] by the transport it is read from.
//! Lookup order for a field (root prefix stripped):
//!
//! 1. an annotation naming exactly that field;
//! 2. an annotation naming its nearest structural ancestor;
//! 3. otherwise `bestEffort`.
//!
//! Every schema key lands in exactly one bucket. Header-sourced fields carry
//! the literal header name: the annotation's first extra param, or the
//! field's leaf identifier when none was given.

use super::types::{Annotation, FieldPath, HeaderBinding, InputSource, Schema, SourceList};
use tracing::warn;

/// Compile the source list of one schema root.
pub fn compile_source_list(schema: &Schema, annotations: &[Annotation]) -> SourceList {
    let mut list = SourceList::default();

    for path in schema.fields.keys() {
        let relative = path.strip_root();
        let Some(annotation) = find_annotation(&relative, annotations) else {
            list.best_effort.push(relative);
            continue;
        };

        match annotation.source {
            InputSource::Params => list.params.push(relative),
            InputSource::Query => list.query.push(relative),
            InputSource::Body => list.body.push(relative),
            InputSource::Header => {
                let header_name = annotation
                    .extra_params
                    .first()
                    .cloned()
                    .unwrap_or_else(|| relative.leaf_name().to_string())
                    .to_ascii_lowercase();
                list.header.push(HeaderBinding {
                    path: relative,
                    header_name,
                });
            }
            InputSource::BestEffort => list.best_effort.push(relative),
        }
    }

    for annotation in annotations {
        let targets_something = schema
            .fields
            .keys()
            .any(|p| p.strip_root().starts_with(&annotation.field_path));
        if !targets_something {
            warn!(
                schema_root = %schema.root,
                field = %annotation.field_path,
                source = %annotation.source,
                "Annotation targets a field that is not in the schema"
            );
        }
    }

    list
}

/// Most specific annotation covering `path`.
fn find_annotation<'a>(path: &FieldPath, annotations: &'a [Annotation]) -> Option<&'a Annotation> {
    annotations
        .iter()
        .filter(|a| path.starts_with(&a.field_path))
        .max_by_key(|a| a.field_path.segments().len())
}

/// Pipe tags per annotated field, keyed by the annotation's target.
pub fn pipes_of(annotations: &[Annotation]) -> Vec<(FieldPath, Vec<String>)> {
    annotations
        .iter()
        .filter(|a| !a.pipe.is_empty())
        .map(|a| (a.field_path.clone(), a.pipe.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::annotation::parse_annotations;
    use crate::spec::schema::compile_schema;
    use crate::spec::types::{FieldDescription, TypeDescription};

    fn user_request() -> TypeDescription {
        TypeDescription {
            name: "UpdateUser".into(),
            fields: vec![
                FieldDescription::primitive("id", "string"),
                FieldDescription::primitive("token", "string"),
                FieldDescription::primitive("email", "string"),
                FieldDescription::object(
                    "profile",
                    vec![
                        FieldDescription::primitive("bio", "string"),
                        FieldDescription::primitive("age", "number").optional(),
                    ],
                )
                .optional(),
                FieldDescription::primitive("dryRun", "boolean").optional(),
            ],
            comment: Some(
                "/**\n * id :: @params\n * token :: @header(X-Auth-Token)\n * profile :: @body\n * dryRun :: @query {flag}\n */"
                    .into(),
            ),
        }
    }

    #[test]
    fn every_field_lands_in_exactly_one_bucket() {
        let desc = user_request();
        let schema = compile_schema("request", &desc).unwrap();
        let anns = parse_annotations(desc.comment.as_deref().unwrap());
        let list = compile_source_list(&schema, &anns);

        assert_eq!(list.len(), schema.len());
        for path in schema.fields.keys() {
            let relative = path.strip_root();
            let hits = [
                list.params.iter().filter(|p| p.same_field(&relative)).count(),
                list.query.iter().filter(|p| p.same_field(&relative)).count(),
                list.header.iter().filter(|h| h.path.same_field(&relative)).count(),
                list.body.iter().filter(|p| p.same_field(&relative)).count(),
                list.best_effort.iter().filter(|p| p.same_field(&relative)).count(),
            ];
            assert_eq!(hits.iter().sum::<usize>(), 1, "{relative} not partitioned");
        }
    }

    #[test]
    fn buckets_follow_annotations() {
        let desc = user_request();
        let schema = compile_schema("request", &desc).unwrap();
        let anns = parse_annotations(desc.comment.as_deref().unwrap());
        let list = compile_source_list(&schema, &anns);

        assert_eq!(list.source_of(&"id".parse().unwrap()), Some(InputSource::Params));
        assert_eq!(list.source_of(&"dryRun".parse().unwrap()), Some(InputSource::Query));
        assert_eq!(list.source_of(&"email".parse().unwrap()), Some(InputSource::BestEffort));
        assert_eq!(list.source_of(&"profile.bio".parse().unwrap()), Some(InputSource::Body));
        assert_eq!(list.source_of(&"profile.age".parse().unwrap()), Some(InputSource::Body));

        assert_eq!(list.header.len(), 1);
        assert_eq!(list.header[0].header_name, "x-auth-token");
        assert_eq!(list.header[0].to_string(), "token x-auth-token");
    }

    #[test]
    fn leaf_annotation_beats_ancestor_annotation() {
        let desc = user_request();
        let schema = compile_schema("request", &desc).unwrap();
        let mut anns = parse_annotations(desc.comment.as_deref().unwrap());
        anns.extend(parse_annotations("profile.age :: @query"));
        let list = compile_source_list(&schema, &anns);
        assert_eq!(list.source_of(&"profile.age".parse().unwrap()), Some(InputSource::Query));
        assert_eq!(list.source_of(&"profile.bio".parse().unwrap()), Some(InputSource::Body));
    }

    #[test]
    fn unannotated_schema_is_all_best_effort() {
        let mut desc = user_request();
        desc.comment = None;
        let schema = compile_schema("request", &desc).unwrap();
        let list = compile_source_list(&schema, &[]);
        assert_eq!(list.best_effort.len(), schema.len());
        assert!(list.best_effort.iter().all(|p| p.segments()[0].name != "request"));
    }

    #[test]
    fn pipes_are_collected() {
        let anns = parse_annotations(user_request().comment.as_deref().unwrap());
        let pipes = pipes_of(&anns);
        assert_eq!(pipes.len(), 1);
        assert_eq!(pipes[0].1, vec!["flag"]);
    }
}
