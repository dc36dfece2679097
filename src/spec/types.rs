use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Primitive (native) types that terminate schema recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Null,
    Any,
    Unknown,
    Object,
    Never,
}

impl PrimitiveType {
    /// Resolve a declared type name to a primitive, if it is one.
    ///
    /// `undefined` and `void` are treated as `null`; `symbol` has no wire form
    /// and resolves to nothing, which drops the field.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let primitive = match name {
            "string" => PrimitiveType::String,
            "number" => PrimitiveType::Number,
            "integer" | "bigint" => PrimitiveType::Integer,
            "boolean" => PrimitiveType::Boolean,
            "Date" | "date" => PrimitiveType::Date,
            "null" | "undefined" | "void" => PrimitiveType::Null,
            "any" => PrimitiveType::Any,
            "unknown" => PrimitiveType::Unknown,
            "object" => PrimitiveType::Object,
            "never" => PrimitiveType::Never,
            _ => return None,
        };
        Some(primitive)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Date => "Date",
            PrimitiveType::Null => "null",
            PrimitiveType::Any => "any",
            PrimitiveType::Unknown => "unknown",
            PrimitiveType::Object => "object",
            PrimitiveType::Never => "never",
        };
        f.write_str(s)
    }
}

/// One segment of a [`FieldPath`].
///
/// The optional and array markers are flags rather than text, so marking a
/// segment twice leaves it marked once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathSegment {
    pub name: String,
    pub optional: bool,
    pub array: bool,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            array: false,
        }
    }

    #[must_use]
    pub fn mark_optional(mut self, optional: bool) -> Self {
        self.optional |= optional;
        self
    }

    #[must_use]
    pub fn mark_array(mut self, array: bool) -> Self {
        self.array |= array;
        self
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.array {
            f.write_str("[]")?;
        }
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

impl FromStr for PathSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim();
        let mut optional = false;
        let mut array = false;
        loop {
            if let Some(r) = rest.strip_suffix('?') {
                optional = true;
                rest = r;
            } else if let Some(r) = rest.strip_suffix("[]") {
                array = true;
                rest = r;
            } else {
                break;
            }
        }
        if rest.is_empty() {
            return Err(format!("empty path segment in '{s}'"));
        }
        Ok(PathSegment {
            name: rest.to_string(),
            optional,
            array,
        })
    }
}

/// Dot-separated location of a field inside a nested structural type,
/// e.g. `request.user?.address.zip`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn leaf(segment: PathSegment) -> Self {
        Self {
            segments: vec![segment],
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Prepend `segment`, producing the path of this field seen from its parent.
    #[must_use]
    pub fn prefixed(mut self, segment: PathSegment) -> Self {
        self.segments.insert(0, segment);
        self
    }

    /// Mark the segment at `depth` optional. Idempotent.
    pub fn mark_optional_at(&mut self, depth: usize) {
        if let Some(seg) = self.segments.get_mut(depth) {
            seg.optional = true;
        }
    }

    /// The last segment's identifier.
    pub fn leaf_name(&self) -> &str {
        self.segments.last().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Drop the first segment (the schema root).
    #[must_use]
    pub fn strip_root(&self) -> FieldPath {
        FieldPath {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Identifiers only, without markers.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.name.as_str())
    }

    /// Dotted identifiers without markers, e.g. `user.address.zip`.
    pub fn plain(&self) -> String {
        self.names().collect::<Vec<_>>().join(".")
    }

    /// Whether `self` names the same field as `other`, ignoring markers.
    pub fn same_field(&self, other: &FieldPath) -> bool {
        self.segments.len() == other.segments.len() && self.names().eq(other.names())
    }

    /// Whether `prefix` is an ancestor of (or equal to) `self`, ignoring markers.
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix.names().zip(self.names()).all(|(a, b)| a == b)
    }

    /// Prefix up to and including the first array segment, if any.
    pub fn array_prefix(&self) -> Option<FieldPath> {
        let idx = self.segments.iter().position(|s| s.array)?;
        Some(FieldPath {
            segments: self.segments[..=idx].to_vec(),
        })
    }

    /// Number of optional markers carried by the path.
    pub fn optional_markers(&self) -> usize {
        self.segments.iter().filter(|s| s.optional).count()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(FieldPath::default());
        }
        let segments = s
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<PathSegment>, _>>()?;
        Ok(FieldPath { segments })
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A leaf field of a compiled schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub identifier: String,
    pub path: FieldPath,
    pub primitive_type: PrimitiveType,
    /// Set when the field or any ancestor is an array.
    pub is_array: bool,
    /// Set when the field or any ancestor is optional.
    pub is_optional: bool,
    /// Set only when the leaf itself is declared optional.
    #[serde(default)]
    pub declared_optional: bool,
}

/// Flat field schema keyed by path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub root: String,
    pub fields: BTreeMap<FieldPath, SchemaField>,
}

impl Schema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&SchemaField> {
        let path: FieldPath = path.parse().ok()?;
        self.fields.get(&path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &SchemaField)> {
        self.fields.iter()
    }
}

/// Transport location a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputSource {
    Params,
    Query,
    Header,
    Body,
    BestEffort,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InputSource::Params => "params",
            InputSource::Query => "query",
            InputSource::Header => "header",
            InputSource::Body => "body",
            InputSource::BestEffort => "bestEffort",
        };
        f.write_str(s)
    }
}

impl FromStr for InputSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "params" => Ok(InputSource::Params),
            "query" => Ok(InputSource::Query),
            "header" => Ok(InputSource::Header),
            "body" => Ok(InputSource::Body),
            other => Err(format!("unknown input source '{other}'")),
        }
    }
}

/// A parsed field directive from a declaration's block comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Target field, relative to the schema root.
    pub field_path: FieldPath,
    pub source: InputSource,
    #[serde(default)]
    pub extra_params: Vec<String>,
    /// Opaque post-processing tags.
    #[serde(default)]
    pub pipe: Vec<String>,
}

/// A header-sourced field and the literal header name it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderBinding {
    pub path: FieldPath,
    pub header_name: String,
}

impl fmt::Display for HeaderBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path.leaf_name(), self.header_name)
    }
}

/// Per-field transport assignment for one schema root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceList {
    pub params: Vec<FieldPath>,
    pub query: Vec<FieldPath>,
    pub header: Vec<HeaderBinding>,
    pub body: Vec<FieldPath>,
    pub best_effort: Vec<FieldPath>,
}

impl SourceList {
    /// Total number of entries across all buckets.
    pub fn len(&self) -> usize {
        self.params.len()
            + self.query.len()
            + self.header.len()
            + self.body.len()
            + self.best_effort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket a relative path landed in, if any.
    pub fn source_of(&self, path: &FieldPath) -> Option<InputSource> {
        let hit = |list: &[FieldPath]| list.iter().any(|p| p.same_field(path));
        if hit(&self.params) {
            Some(InputSource::Params)
        } else if hit(&self.query) {
            Some(InputSource::Query)
        } else if self.header.iter().any(|h| h.path.same_field(path)) {
            Some(InputSource::Header)
        } else if hit(&self.body) {
            Some(InputSource::Body)
        } else if hit(&self.best_effort) {
            Some(InputSource::BestEffort)
        } else {
            None
        }
    }
}

/// Everything compiled for one request or response root.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledShape {
    pub schema: Schema,
    pub annotations: Vec<Annotation>,
    pub source_list: SourceList,
}

/// Route method, including the multiplexed RPC transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    Get,
    Post,
    Patch,
    Delete,
    Rpc,
}

impl RouteMethod {
    /// Transport maps consulted for best-effort fields, in order.
    pub fn best_effort_order(&self) -> &'static [InputSource] {
        match self {
            RouteMethod::Get => &[InputSource::Params, InputSource::Query],
            RouteMethod::Post => &[InputSource::Params, InputSource::Body],
            RouteMethod::Patch => &[InputSource::Params, InputSource::Query, InputSource::Body],
            RouteMethod::Delete => &[InputSource::Params, InputSource::Query],
            RouteMethod::Rpc => &[],
        }
    }

    pub fn as_http(&self) -> Option<http::Method> {
        match self {
            RouteMethod::Get => Some(http::Method::GET),
            RouteMethod::Post => Some(http::Method::POST),
            RouteMethod::Patch => Some(http::Method::PATCH),
            RouteMethod::Delete => Some(http::Method::DELETE),
            RouteMethod::Rpc => None,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Patch => "PATCH",
            RouteMethod::Delete => "DELETE",
            RouteMethod::Rpc => "RPC",
        };
        f.write_str(s)
    }
}

impl FromStr for RouteMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(RouteMethod::Get),
            "post" => Ok(RouteMethod::Post),
            "patch" => Ok(RouteMethod::Patch),
            "delete" => Ok(RouteMethod::Delete),
            "rpc" => Ok(RouteMethod::Rpc),
            other => Err(format!("unsupported route method '{other}'")),
        }
    }
}

impl TryFrom<&http::Method> for RouteMethod {
    type Error = String;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Immutable compiled record for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub method: RouteMethod,
    /// HTTP path for path-routed methods, endpoint name for RPC.
    pub endpoint_or_path: String,
    /// `None` resolves to the configured default auth handler.
    pub auth_id: Option<String>,
    pub permission_tag: Option<String>,
    pub request: CompiledShape,
    pub response: CompiledShape,
    pub handler_ref: String,
    pub uuid: String,
}

// ---------------------------------------------------------------------------
// Structural type descriptions handed in by an external source parser.
// ---------------------------------------------------------------------------

/// A named structural type and the raw comment text preceding it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeDescription {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
    /// Raw block comment of the declaration, `/** ... */` included.
    #[serde(default)]
    pub comment: Option<String>,
}

/// One declared field. `ty` is the element type when `array` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeShape,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub array: bool,
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeShape {
    Primitive {
        name: String,
    },
    Object {
        #[serde(default)]
        name: Option<String>,
        fields: Vec<FieldDescription>,
    },
    Union {
        variants: Vec<TypeShape>,
    },
    Intersection {
        members: Vec<TypeShape>,
    },
    Unresolved,
}

impl FieldDescription {
    pub fn primitive(identifier: &str, name: &str) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            ty: TypeShape::Primitive {
                name: name.to_string(),
            },
            optional: false,
            array: false,
        }
    }

    pub fn object(identifier: &str, fields: Vec<FieldDescription>) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            ty: TypeShape::Object { name: None, fields },
            optional: false,
            array: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }
}
