//! Builds a [`Specification`] from a parsed OpenAPI document. The document
//! itself (`$ref` resolution, v2/v3 upgrade) is handled by `openapiv3-extended`;
//! this module only walks the resolved tree into our own model.

use std::path::Path;

use anyhow::{Context, Result};
use openapiv3::{
    AdditionalProperties, OpenAPI, Parameter as OaParameter, ParameterKind as OaParameterKind,
    Schema, SchemaKind, StatusCode, Type, VersionedOpenAPI,
};

use super::{AttributeType, Method, Parameter, ParameterAttribute, ParameterLocation, SchemaFacets, Specification, Verb};

/// Parses an OpenAPI document (v2 or v3, JSON or YAML) from disk and builds
/// the specification model used by the rest of the fuzzer.
pub fn load_specification(path: &Path) -> Result<Specification> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening OpenAPI document at {}", path.display()))?;
    let versioned: VersionedOpenAPI = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing OpenAPI document at {}", path.display()))?;
    let api = versioned.upgrade();
    build_specification(&api)
}

pub fn build_specification(api: &OpenAPI) -> Result<Specification> {
    let base_url = api.servers.first().map(|s| s.url.clone());
    let mut methods = Vec::new();

    for (path, verb_str, operation, _path_item) in api.operations() {
        let verb = match Verb::try_from(verb_str) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("skipping operation {path} {verb_str}: {e}");
                continue;
            }
        };
        let operation_id = operation
            .operation_id
            .clone()
            .unwrap_or_else(|| format!("{verb}_{path}"));

        let mut parameters = Vec::new();
        for p in &operation.parameters {
            match p.resolve(api) {
                Ok(param) => {
                    if let Some(parameter) = build_parameter(api, param) {
                        parameters.push(parameter);
                    }
                }
                Err(e) => log::warn!("{operation_id}: unresolved parameter: {e}"),
            }
        }

        if let Some(body_ref) = &operation.request_body
            && let Ok(body) = body_ref.resolve(api)
        {
            if let Some(media) = body
                .content
                .iter()
                .find_map(|(ct, media)| ct.starts_with("application/json").then_some(media))
                && let Some(schema_ref) = &media.schema
            {
                let schema = schema_ref.resolve(api);
                let mut root = schema_to_attribute(api, "body", "", schema);
                root.required = body.required;
                parameters.push(Parameter {
                    name: "body".to_string(),
                    location: ParameterLocation::Body,
                    required: body.required,
                    root,
                });
            } else if let Some(media) = body.content.iter().find_map(|(ct, media)| {
                ct.starts_with("application/x-www-form-urlencoded").then_some(media)
            }) && let Some(schema_ref) = &media.schema
            {
                let schema = schema_ref.resolve(api);
                let mut root = schema_to_attribute(api, "body", "", schema);
                root.required = body.required;
                parameters.push(Parameter {
                    name: "form".to_string(),
                    location: ParameterLocation::FormData,
                    required: body.required,
                    root,
                });
            } else if let Some(media) = body
                .content
                .iter()
                .find_map(|(ct, media)| ct.starts_with("multipart/form-data").then_some(media))
                && let Some(schema_ref) = &media.schema
            {
                let schema = schema_ref.resolve(api);
                let mut root = schema_to_attribute(api, "files", "", schema);
                root.required = body.required;
                mark_file_attributes(&mut root);
                parameters.push(Parameter {
                    name: "files".to_string(),
                    location: ParameterLocation::Files,
                    required: body.required,
                    root,
                });
            }
        }

        let response_attributes = find_success_response_attributes(api, operation);

        methods.push(Method {
            operation_id,
            verb,
            path: path.to_string(),
            summary: operation.summary.clone(),
            description: operation.description.clone(),
            parameters,
            response_attributes,
        });
    }

    Ok(Specification { base_url, methods })
}

fn build_parameter(api: &OpenAPI, param: &OaParameter) -> Option<Parameter> {
    let location = match param.kind {
        OaParameterKind::Query { .. } => ParameterLocation::Query,
        OaParameterKind::Header { .. } => ParameterLocation::Header,
        OaParameterKind::Path { .. } => ParameterLocation::Path,
        OaParameterKind::Cookie { .. } => ParameterLocation::Cookie,
    };
    let schema_ref = param.data.schema()?;
    let schema = schema_ref.resolve(api);
    let mut root = schema_to_attribute(api, &param.data.name, "", schema);
    root.required = param.data.required;
    Some(Parameter {
        name: param.data.name.clone(),
        location,
        required: param.data.required,
        root,
    })
}

/// Marks leaf attributes whose schema is a `format: binary` string as
/// file attributes, the multipart/form-data marker for an upload field.
fn mark_file_attributes(attr: &mut ParameterAttribute) {
    if attr.attribute_type == AttributeType::String && attr.facets.format.as_deref() == Some("binary") {
        attr.attribute_type = AttributeType::File;
    }
    for child in &mut attr.children {
        mark_file_attributes(child);
    }
}

fn find_success_response_attributes(
    api: &OpenAPI,
    operation: &openapiv3::Operation,
) -> Vec<ParameterAttribute> {
    let success = operation.responses.responses.iter().find(|(code, _)| {
        matches!(code, StatusCode::Code(c) if (200..300).contains(c))
            || matches!(code, StatusCode::Range(2))
    });
    let Some((_, response_ref)) = success else {
        return Vec::new();
    };
    let Ok(response) = response_ref.resolve(api) else {
        return Vec::new();
    };
    let Some(media) = response
        .content
        .iter()
        .find_map(|(ct, media)| ct.starts_with("application/json").then_some(media))
    else {
        return Vec::new();
    };
    let Some(schema_ref) = &media.schema else {
        return Vec::new();
    };
    let schema = schema_ref.resolve(api);
    // Root name/path left empty: these attributes are later looked up by the
    // exact dotted path the Runtime Dictionary records from a live response
    // body, which has no synthetic "response" path component.
    let root = schema_to_attribute(api, "", "", schema);
    root.children
}

/// Recursively converts an OpenAPI schema node into a [`ParameterAttribute`].
/// Schemas that resolve through a cyclical `$ref` chain are bounded by the
/// underlying `resolve()` helper collapsing them to a plain object; we mirror
/// that degrade-gracefully behavior by capping recursion depth.
fn schema_to_attribute(api: &OpenAPI, name: &str, parent_path: &str, schema: &Schema) -> ParameterAttribute {
    schema_to_attribute_depth(api, name, parent_path, schema, 0)
}

const MAX_SCHEMA_DEPTH: usize = 12;

fn schema_to_attribute_depth(
    api: &OpenAPI,
    name: &str,
    parent_path: &str,
    schema: &Schema,
    depth: usize,
) -> ParameterAttribute {
    let path = if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}.{name}")
    };

    if depth >= MAX_SCHEMA_DEPTH {
        return ParameterAttribute::leaf(name, &path, AttributeType::Object);
    }

    match &schema.kind {
        SchemaKind::Type(Type::String(s)) => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::String);
            attr.facets = SchemaFacets {
                min_length: s.min_length,
                max_length: s.max_length,
                pattern: s.pattern.clone(),
                format: (!s.format.as_str().is_empty()).then(|| s.format.as_str().to_string()),
                string_enum: s.enumeration.clone(),
                ..Default::default()
            };
            attr
        }
        SchemaKind::Type(Type::Integer(i)) => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::Integer);
            attr.facets = SchemaFacets {
                minimum: i.minimum,
                maximum: i.maximum,
                int_enum: i.enumeration.iter().filter_map(|v| *v).collect(),
                ..Default::default()
            };
            attr
        }
        SchemaKind::Type(Type::Number(n)) => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::Number);
            attr.facets = SchemaFacets {
                minimum: n.minimum.map(|v| v as i64),
                maximum: n.maximum.map(|v| v as i64),
                ..Default::default()
            };
            attr
        }
        SchemaKind::Type(Type::Boolean {}) => {
            ParameterAttribute::leaf(name, &path, AttributeType::Boolean)
        }
        SchemaKind::Type(Type::Array(a)) => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::Array);
            if let Some(items) = &a.items {
                let item_schema = items.resolve(api);
                attr.children
                    .push(schema_to_attribute_depth(api, "item", &path, item_schema, depth + 1));
            }
            attr
        }
        SchemaKind::Type(Type::Object(o)) => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::Object);
            for (prop_name, prop_ref) in o.properties.iter() {
                let prop_schema = prop_ref.resolve(api);
                let mut child = schema_to_attribute_depth(api, prop_name, &path, prop_schema, depth + 1);
                child.required = o.required.iter().any(|r| r == prop_name);
                attr.children.push(child);
            }
            if matches!(o.additional_properties, Some(AdditionalProperties::Any(true))) {
                // free-form object: no named children to enumerate further
            }
            attr
        }
        SchemaKind::AllOf { all_of } => {
            let mut attr = ParameterAttribute::leaf(name, &path, AttributeType::Object);
            for part in all_of {
                let part_schema = part.resolve(api);
                let merged = schema_to_attribute_depth(api, name, parent_path, part_schema, depth + 1);
                attr.children.extend(merged.children);
            }
            attr
        }
        SchemaKind::OneOf { one_of } | SchemaKind::AnyOf { any_of: one_of } => {
            if let Some(first) = one_of.first() {
                schema_to_attribute_depth(api, name, parent_path, first.resolve(api), depth + 1)
            } else {
                ParameterAttribute::leaf(name, &path, AttributeType::Object)
            }
        }
        SchemaKind::Not { .. } | SchemaKind::Any(_) => {
            ParameterAttribute::leaf(name, &path, AttributeType::Object)
        }
    }
}
