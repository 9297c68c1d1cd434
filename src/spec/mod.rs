//! The Specification Model: an immutable tree of APIs, Methods, Parameters and
//! ParameterAttributes built once from a parsed OpenAPI document.

pub mod load;

use std::fmt;

use serde::{Deserialize, Serialize};

/// The HTTP verbs this fuzzer knows how to issue, ordered so CRUD-creating
/// verbs sort before verbs that merely read or mutate existing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Post,
    Put,
    Patch,
    Get,
    Delete,
    Head,
    Options,
    Trace,
}

#[derive(Debug, Clone)]
pub struct InvalidVerbError(pub String);

impl fmt::Display for InvalidVerbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a recognized HTTP verb", self.0)
    }
}
impl std::error::Error for InvalidVerbError {}

impl TryFrom<&str> for Verb {
    type Error = InvalidVerbError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "post" => Ok(Verb::Post),
            "put" => Ok(Verb::Put),
            "patch" => Ok(Verb::Patch),
            "get" => Ok(Verb::Get),
            "delete" => Ok(Verb::Delete),
            "head" => Ok(Verb::Head),
            "options" => Ok(Verb::Options),
            "trace" => Ok(Verb::Trace),
            _ => Err(InvalidVerbError(value.to_string())),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Get => "GET",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
            Verb::Trace => "TRACE",
        };
        write!(f, "{s}")
    }
}

impl From<Verb> for reqwest::Method {
    fn from(v: Verb) -> Self {
        match v {
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Patch => reqwest::Method::PATCH,
            Verb::Get => reqwest::Method::GET,
            Verb::Delete => reqwest::Method::DELETE,
            Verb::Head => reqwest::Method::HEAD,
            Verb::Options => reqwest::Method::OPTIONS,
            Verb::Trace => reqwest::Method::TRACE,
        }
    }
}

/// Where a parameter is placed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
    Files,
}

/// The scalar/structured type of a schema node, mirrored from JSON Schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    File,
}

/// The facets of a JSON Schema node relevant to value generation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaFacets {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub string_enum: Vec<String>,
    pub int_enum: Vec<i64>,
}

/// A node in a parameter's schema tree: either a leaf (string/integer/...) or
/// a composite (array/object) with children.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterAttribute {
    pub attribute_name: String,
    pub attribute_path: String,
    pub attribute_type: AttributeType,
    pub required: bool,
    pub facets: SchemaFacets,
    pub children: Vec<ParameterAttribute>,
}

impl ParameterAttribute {
    pub fn leaf(name: &str, path: &str, attribute_type: AttributeType) -> Self {
        ParameterAttribute {
            attribute_name: name.to_string(),
            attribute_path: path.to_string(),
            attribute_type,
            required: false,
            facets: SchemaFacets::default(),
            children: Vec::new(),
        }
    }

    /// All attributes in this subtree, including `self`, depth-first.
    pub fn iter_all(&self) -> Vec<&ParameterAttribute> {
        let mut out = vec![self];
        for c in &self.children {
            out.extend(c.iter_all());
        }
        out
    }
}

/// A single request parameter (path/query/header/cookie) or the request body,
/// described by its root schema attribute.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub root: ParameterAttribute,
}

/// A single API operation: one (path, verb) pair with its parameters and the
/// attributes observable in its successful response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Method {
    pub operation_id: String,
    pub verb: Verb,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub response_attributes: Vec<ParameterAttribute>,
}

impl Method {
    pub fn required_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.required)
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.operation_id == other.operation_id
    }
}
impl Eq for Method {}
impl std::hash::Hash for Method {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.operation_id.hash(state);
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.path)
    }
}

/// The full specification model: base server URL(s) plus every operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Specification {
    pub base_url: Option<String>,
    pub methods: Vec<Method>,
}

impl Specification {
    pub fn find(&self, operation_id: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.operation_id == operation_id)
    }
}
