//! Materializes a Method plus generated parameter values into an HTTP
//! request, dispatches it, and parses the response into the shape the
//! Runtime Dictionary and Analysis Sink consume.

use std::time::Duration;

use serde_json::Value;

use crate::spec::{Method, ParameterLocation};

/// Sentinel status used when a request times out, so the Runtime Dictionary
/// (which rejects anything >= 300) never mistakes it for success.
pub const TIMEOUT_STATUS: u32 = 0;
/// Sentinel status used for any other transport-level failure (connection
/// refused, DNS failure, response body that could not be read).
pub const TRANSPORT_ERROR_STATUS: u32 = 1;

#[derive(Debug, Clone)]
pub struct ParamValue {
    pub name: String,
    pub location: ParameterLocation,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u32,
    pub method: String,
    pub body: Value,
    pub set_cookies: Vec<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// A small bundled binary asset attached whenever a generated value is the
/// Data Generator's file sentinel, standing in for "a file-like handle to a
/// small bundled binary asset" per the Data Generator's File handling.
const FILE_ASSET: &[u8] = include_bytes!("../assets/smallest.jpg");

/// Flattens a generated body object into multipart parts: the file
/// sentinel becomes the bundled asset's bytes, everything else becomes a
/// text part.
fn build_multipart_form(body: &Value) -> reqwest::blocking::multipart::Form {
    use reqwest::blocking::multipart::{Form, Part};

    let mut form = Form::new();
    if let Value::Object(map) = body {
        for (key, value) in map {
            form = if matches!(value, Value::String(s) if s == crate::datagen::FILE_PLACEHOLDER) {
                form.part(key.clone(), Part::bytes(FILE_ASSET).file_name("smallest.jpg"))
            } else {
                form.text(key.clone(), value_to_wire_string(value))
            };
        }
    }
    form
}

fn value_to_wire_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds and dispatches the HTTP request for one method call within a
/// sequence. `client` is expected to be fresh per-sequence so cookies never
/// leak across sequences.
pub fn execute(
    client: &reqwest::blocking::Client,
    base_url: &str,
    method: &Method,
    params: &[ParamValue],
    body_value: Option<&Value>,
    timeout: Duration,
) -> Response {
    let mut path = format!("{}{}", base_url.trim_end_matches('/'), method.path);
    let mut query = Vec::new();
    let mut headers = reqwest::header::HeaderMap::new();
    let mut cookies = Vec::new();

    for p in params {
        let wire = value_to_wire_string(&p.value);
        match p.location {
            ParameterLocation::Path => {
                let hole = format!("{{{}}}", p.name);
                path = path.replace(&hole, &urlencoding::encode(&wire));
            }
            ParameterLocation::Query => query.push((p.name.clone(), wire)),
            ParameterLocation::Header => {
                if let Ok(name) = reqwest::header::HeaderName::from_bytes(p.name.as_bytes())
                    && let Ok(value) = reqwest::header::HeaderValue::from_str(&wire)
                {
                    headers.insert(name, value);
                }
            }
            ParameterLocation::Cookie => cookies.push(format!("{}={}", p.name, wire)),
            ParameterLocation::Body | ParameterLocation::FormData | ParameterLocation::Files => {}
        }
    }
    if !cookies.is_empty()
        && let Ok(value) = reqwest::header::HeaderValue::from_str(&cookies.join("; "))
    {
        headers.insert(reqwest::header::COOKIE, value);
    }

    let url = match if query.is_empty() {
        reqwest::Url::parse(&path)
    } else {
        reqwest::Url::parse_with_params(&path, &query)
    } {
        Ok(u) => u,
        Err(e) => {
            log::warn!("{}: could not build request URL: {e}", method.operation_id);
            return Response {
                status_code: TRANSPORT_ERROR_STATUS,
                method: method.operation_id.clone(),
                body: Value::Null,
                set_cookies: Vec::new(),
            };
        }
    };

    let mut builder = client
        .request(method.verb.into(), url)
        .headers(headers)
        .timeout(timeout);

    let has_form_param = params
        .iter()
        .any(|p| matches!(p.location, ParameterLocation::FormData));
    let uses_multipart = method
        .parameters
        .iter()
        .any(|p| matches!(p.location, ParameterLocation::Files));
    if let Some(body) = body_value {
        if uses_multipart {
            builder = builder.multipart(build_multipart_form(body));
        } else if has_form_param {
            builder = builder.form(body);
        } else {
            builder = builder.json(body);
        }
    }

    match builder.send() {
        Ok(resp) => parse_response(&method.operation_id, resp),
        Err(e) if e.is_timeout() => {
            log::debug!("{}: request timed out", method.operation_id);
            Response {
                status_code: TIMEOUT_STATUS,
                method: method.operation_id.clone(),
                body: Value::Null,
                set_cookies: Vec::new(),
            }
        }
        Err(e) => {
            log::warn!("{}: transport error: {e}", method.operation_id);
            Response {
                status_code: TRANSPORT_ERROR_STATUS,
                method: method.operation_id.clone(),
                body: Value::Null,
                set_cookies: Vec::new(),
            }
        }
    }
}

fn parse_response(operation_id: &str, resp: reqwest::blocking::Response) -> Response {
    let status_code = resp.status().as_u16() as u32;
    let set_cookies = resp
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();

    let is_json = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let body = if is_json {
        match resp.text() {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::debug!("{operation_id}: response body was not valid JSON: {e}");
                Value::Null
            }),
            Err(e) => {
                log::debug!("{operation_id}: failed to read response body: {e}");
                Value::Null
            }
        }
    } else {
        Value::Null
    };

    Response {
        status_code,
        method: operation_id.to_string(),
        body,
        set_cookies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{AttributeType, Method, Parameter, ParameterAttribute, Verb};

    #[test]
    fn multipart_body_is_dispatched_when_method_has_a_files_parameter() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("POST", "/upload")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{}")
            .create();

        let method = Method {
            operation_id: "uploadPet".to_string(),
            verb: Verb::Post,
            path: "/upload".to_string(),
            summary: None,
            description: None,
            parameters: vec![Parameter {
                name: "files".to_string(),
                location: ParameterLocation::Files,
                required: true,
                root: ParameterAttribute::leaf("files", "files", AttributeType::Object),
            }],
            response_attributes: Vec::new(),
        };

        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let body = serde_json::json!({"name": "fido", "photo": crate::datagen::FILE_PLACEHOLDER});
        let response = execute(&client, &server.url(), &method, &[], Some(&body), Duration::from_secs(5));

        assert!(response.is_success());
    }
}
