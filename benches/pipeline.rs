use criterion::{criterion_group, criterion_main, Criterion};
use routewitch::assembler::{assemble, RawRequest};
use routewitch::dispatcher::{handler_fn, HandlerResponse};
use routewitch::registry::RegistryBuilder;
use routewitch::spec::{
    build_routes, parse_manifest, ManifestVersion, RouteMethod, RouteSource,
};
use routewitch::validator::SchemaValidator;
use serde_json::json;
use std::hint::black_box;

fn example_manifest() -> &'static str {
    r#"
routes:
  - sourcePath: api/orders.ts
    exportName: updateOrder
    method: patch
    path: /shops/{shopId}/orders/{orderId}
    request:
      name: UpdateOrder
      comment: |
        /**
         * shopId::@params
         * orderId::@params
         * customer::@body
         * token::@header(x-api-token)
         */
      fields:
        - identifier: shopId
          type: { kind: primitive, name: number }
        - identifier: orderId
          type: { kind: primitive, name: number }
        - identifier: token
          type: { kind: primitive, name: string }
        - identifier: note
          optional: true
          type: { kind: primitive, name: string }
        - identifier: customer
          type:
            kind: object
            fields:
              - identifier: name
                type: { kind: primitive, name: string }
              - identifier: vip
                type: { kind: primitive, name: boolean }
              - identifier: address
                optional: true
                type:
                  kind: object
                  fields:
                    - identifier: zip
                      type: { kind: primitive, name: string }
    response:
      name: Order
      fields:
        - identifier: id
          type: { kind: primitive, name: number }
  - sourcePath: api/orders.ts
    exportName: getOrder
    method: get
    path: /shops/{shopId}/orders/{orderId}
    request:
      name: GetOrder
      fields:
        - identifier: shopId
          type: { kind: primitive, name: number }
        - identifier: orderId
          type: { kind: primitive, name: number }
    response:
      name: Order
      fields: []
  - sourcePath: api/orders.ts
    exportName: listOrders
    method: get
    path: /shops/{shopId}/orders
    request:
      name: ListOrders
      fields:
        - identifier: shopId
          type: { kind: primitive, name: number }
    response:
      name: Orders
      fields: []
"#
}

fn sources() -> Vec<RouteSource> {
    parse_manifest(example_manifest(), true)
        .expect("failed to parse manifest")
        .routes
}

fn bench_build(c: &mut Criterion) {
    let sources = sources();
    c.bench_function("build_routes", |b| {
        b.iter(|| black_box(build_routes(black_box(&sources))))
    });
}

fn bench_assemble_validate(c: &mut Criterion) {
    let report = build_routes(&sources());
    let route = &report.routes[0];
    let validator = SchemaValidator::compile(&route.request.schema).expect("schema compiles");
    let raw = RawRequest::new()
        .with_param("shopId", "12")
        .with_param("orderId", "3400")
        .with_header("x-api-token", "tok")
        .with_body(json!({
            "note": "leave at door",
            "customer": { "name": "Ada", "vip": true, "address": { "zip": "90210" } }
        }));

    c.bench_function("assemble_validate", |b| {
        b.iter(|| {
            let candidate = assemble(black_box(&raw), &route.request.source_list, route.method);
            black_box(validator.validate(candidate))
        })
    });
}

fn bench_route_match(c: &mut Criterion) {
    let report = build_routes(&sources());
    let mut builder = RegistryBuilder::new(ManifestVersion::from_content(b"bench"));
    for route in &report.routes {
        builder.register_handler(
            &route.handler_ref,
            handler_fn(|_| async { HandlerResponse::Ok(json!({})) }),
        );
    }
    builder.register_routes(report.routes);
    let registry = builder.build();

    c.bench_function("http_route_match", |b| {
        let paths = [
            (RouteMethod::Get, "/shops/12/orders/3400"),
            (RouteMethod::Patch, "/shops/12/orders/3400"),
            (RouteMethod::Get, "/shops/12/orders?page=2"),
            (RouteMethod::Get, "/nowhere"),
        ];
        b.iter(|| {
            for (method, path) in paths {
                black_box(registry.http_route(method, path));
            }
        })
    });
}

criterion_group!(benches, bench_build, bench_assemble_validate, bench_route_match);
criterion_main!(benches);
