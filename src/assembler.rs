//! # Request Assembler
//!
//! Rebuilds a nested request object from raw transport maps, guided by a
//! route's [`SourceList`].
//!
//! ## Order of work
//!
//! 1. Best-effort fields are resolved first by trying transport maps in the
//!    method's fixed order (GET: params, query; POST: params, body; PATCH:
//!    params, query, body; DELETE: params, query). The first map holding the
//!    key wins.
//! 2. Annotated fields are read from their declared transport and written
//!    afterwards, so an annotated source always overrides a best-effort
//!    guess for the same field.
//!
//! Header-sourced fields are looked up by their bound header name,
//! case-insensitively. RPC calls skip both steps: the envelope's `params`
//! payload is already structured and is used as-is.
//!
//! Assembly never fails. Missing values are simply absent from the output
//! and left for the validator to report.

use crate::spec::{FieldPath, InputSource, RouteMethod, SourceList};
use serde_json::{Map, Value};
use tracing::trace;

/// Raw transport data of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    /// Header names are stored lowercase.
    pub headers: Map<String, Value>,
    pub body: Value,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Build from an `http::Request` whose body is already parsed JSON.
    /// Path parameters come from the adapter's router.
    pub fn from_http(req: &http::Request<Value>, path_params: Map<String, Value>) -> Self {
        let headers = req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_ascii_lowercase(), Value::String(value.to_string())))
            })
            .collect();
        Self {
            params: path_params,
            query: req.uri().query().map(parse_query_string).unwrap_or_default(),
            headers,
            body: req.body().clone(),
        }
    }

    /// Header value by name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    fn transport(&self, source: InputSource) -> Option<&Map<String, Value>> {
        match source {
            InputSource::Params => Some(&self.params),
            InputSource::Query => Some(&self.query),
            InputSource::Header => Some(&self.headers),
            InputSource::Body => self.body.as_object(),
            InputSource::BestEffort => None,
        }
    }
}

/// Parse a URL-encoded query string (with or without a leading path and `?`).
pub fn parse_query_string(input: &str) -> Map<String, Value> {
    let query = match input.find('?') {
        Some(pos) => &input[pos + 1..],
        None => input,
    };
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Coerce a transport string: exact `"true"`/`"false"` become booleans,
/// fully numeric text becomes an integer, anything else stays a string.
pub fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::String(raw.to_string())
}

fn coerce(value: &Value) -> Value {
    match value {
        Value::String(s) => coerce_scalar(s),
        other => other.clone(),
    }
}

/// Read `names` from `map`: a flat dotted key first, then nested objects.
pub fn lookup<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    let (first, rest) = names.split_first()?;
    if !rest.is_empty() {
        if let Some(v) = map.get(&names.join(".")) {
            return Some(v);
        }
    }
    let mut current = map.get(*first)?;
    for name in rest {
        current = current.as_object()?.get(*name)?;
    }
    Some(current)
}

/// Write `value` at `names`, creating intermediate objects.
pub fn write_path(out: &mut Map<String, Value>, names: &[&str], value: Value) {
    let Some((last, parents)) = names.split_last() else {
        return;
    };
    let mut node = out;
    for name in parents {
        let slot = node
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        node = next;
    }
    node.insert(last.to_string(), value);
}

/// Names used for transport lookup and output placement. Fields under an
/// array of structural types resolve at the array segment, whole subtree.
fn target_names(path: &FieldPath) -> Vec<&str> {
    let depth = path
        .segments()
        .iter()
        .position(|s| s.array)
        .map_or(path.segments().len(), |idx| idx + 1);
    path.segments()[..depth]
        .iter()
        .map(|s| s.name.as_str())
        .collect()
}

fn read(
    raw: &RawRequest,
    source: InputSource,
    names: &[&str],
    coerce_strings: bool,
) -> Option<Value> {
    let value = lookup(raw.transport(source)?, names)?;
    Some(if coerce_strings { coerce(value) } else { value.clone() })
}

/// Assemble the candidate request object for one call.
pub fn assemble(raw: &RawRequest, sources: &SourceList, method: RouteMethod) -> Value {
    if method == RouteMethod::Rpc {
        return match &raw.body {
            Value::Object(_) => raw.body.clone(),
            _ => Value::Object(Map::new()),
        };
    }

    let mut out = Map::new();

    for path in &sources.best_effort {
        let names = target_names(path);
        let hit = method.best_effort_order().iter().find_map(|source| {
            let coerce_strings = *source != InputSource::Body;
            read(raw, *source, &names, coerce_strings).map(|v| (*source, v))
        });
        if let Some((source, value)) = hit {
            trace!(field = %path, source = %source, "Best-effort field resolved");
            write_path(&mut out, &names, value);
        }
    }

    let annotated = [
        (InputSource::Params, &sources.params),
        (InputSource::Query, &sources.query),
        (InputSource::Body, &sources.body),
    ];
    for (source, paths) in annotated {
        for path in paths {
            let names = target_names(path);
            if let Some(value) = read(raw, source, &names, true) {
                write_path(&mut out, &names, value);
            }
        }
    }

    for binding in &sources.header {
        let header_name = binding.header_name.to_ascii_lowercase();
        if let Some(value) = raw.headers.get(&header_name) {
            let names: Vec<&str> = binding.path.names().collect();
            write_path(&mut out, &names, coerce(value));
        }
    }

    Value::Object(out)
}
