#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Assembler and validator working together on compiled routes.
//!
//! # Test Coverage
//!
//! - the `Simple` shape accepts a minimal object and rejects a missing
//!   required field with one issue keyed by the field name
//! - assembling from raw transport maps and validating yields the typed
//!   request object for GET, POST and PATCH routes
//! - the validator cache compiles request and response validators once

mod common;

use common::{route, source};
use routewitch::assembler::{assemble, RawRequest};
use routewitch::spec::{FieldDescription, ManifestVersion};
use routewitch::validator::SchemaValidator;
use routewitch::validator_cache::{ValidatorCacheBuilder, ValidatorKind};
use serde_json::json;

fn simple_fields() -> Vec<FieldDescription> {
    vec![
        FieldDescription::primitive("isValid", "boolean"),
        FieldDescription::primitive("name", "string"),
        FieldDescription::primitive("hasMouthFull", "string").optional(),
    ]
}

#[test]
fn test_simple_shape_validation() {
    let desc = route(&source("simple", "post", "/simple", simple_fields(), None));
    let validator = SchemaValidator::compile(&desc.request.schema).unwrap();

    assert!(validator.is_valid(&json!({"isValid": true, "name": "Jo"})));
    assert!(validator.is_valid(&json!({"isValid": false, "name": "Jo", "hasMouthFull": "no"})));

    let issues = validator.validate(json!({"name": "Jo"})).unwrap_err();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, "isValid");

    let issues = validator
        .validate(json!({"isValid": "yes", "name": "Jo"}))
        .unwrap_err();
    assert_eq!(issues[0].field, "isValid");
}

#[test]
fn test_get_query_strings_are_coerced_before_validation() {
    let desc = route(&source(
        "listUsers",
        "get",
        "/users",
        vec![
            FieldDescription::primitive("page", "number"),
            FieldDescription::primitive("active", "boolean"),
            FieldDescription::primitive("q", "string").optional(),
        ],
        None,
    ));
    let raw = RawRequest::new()
        .with_query("page", "2")
        .with_query("active", "true")
        .with_query("q", "ada");
    let candidate = assemble(&raw, &desc.request.source_list, desc.method);
    let validator = SchemaValidator::compile(&desc.request.schema).unwrap();

    let request = validator.validate(candidate).unwrap();
    assert_eq!(request, json!({"page": 2, "active": true, "q": "ada"}));
}

#[test]
fn test_post_body_subtree_and_header() {
    let comment = "/**\n * profile::@body\n * token::@header(x-api-token)\n */";
    let desc = route(&source(
        "updateProfile",
        "post",
        "/profile",
        vec![
            FieldDescription::object(
                "profile",
                vec![
                    FieldDescription::primitive("age", "number"),
                    FieldDescription::primitive("tags", "string").array(),
                ],
            ),
            FieldDescription::primitive("token", "string"),
        ],
        Some(comment),
    ));
    let raw = RawRequest::new()
        .with_header("X-Api-Token", "abc")
        .with_body(json!({"profile": {"age": 31, "tags": ["a", "b"]}}));
    let candidate = assemble(&raw, &desc.request.source_list, desc.method);
    let validator = SchemaValidator::compile(&desc.request.schema).unwrap();

    let request = validator.validate(candidate).unwrap();
    assert_eq!(
        request,
        json!({"profile": {"age": 31, "tags": ["a", "b"]}, "token": "abc"})
    );
}

#[test]
fn test_patch_best_effort_falls_through_to_body() {
    let desc = route(&source(
        "patchUser",
        "patch",
        "/users/{id}",
        vec![
            FieldDescription::primitive("id", "number"),
            FieldDescription::primitive("name", "string"),
        ],
        None,
    ));
    let raw = RawRequest::new()
        .with_param("id", "5")
        .with_body(json!({"id": 99, "name": "Grace"}));
    let candidate = assemble(&raw, &desc.request.source_list, desc.method);
    let validator = SchemaValidator::compile(&desc.request.schema).unwrap();

    let request = validator.validate(candidate).unwrap();
    assert_eq!(request, json!({"id": 5, "name": "Grace"}));
}

#[test]
fn test_missing_required_after_assembly_is_reported() {
    let desc = route(&source(
        "getUser",
        "get",
        "/users/{id}",
        vec![FieldDescription::primitive("id", "number")],
        None,
    ));
    let candidate = assemble(&RawRequest::new(), &desc.request.source_list, desc.method);
    let validator = SchemaValidator::compile(&desc.request.schema).unwrap();

    let issues = validator.validate(candidate).unwrap_err();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, "id");
}

#[test]
fn test_validator_cache_precompiles_both_shapes() {
    let desc = route(&source("simple", "post", "/simple", simple_fields(), None));
    let mut builder = ValidatorCacheBuilder::new(ManifestVersion::from_content(b"cache"));
    assert!(builder.precompile(&desc));
    let cache = builder.freeze();
    assert_eq!(cache.len(), 2);

    assert!(cache.get(&desc.uuid, ValidatorKind::Request).is_some());
    assert!(cache.get(&desc.uuid, ValidatorKind::Response).is_some());
    assert!(cache.get("nope", ValidatorKind::Request).is_none());
}
