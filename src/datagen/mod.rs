//! The Data Generator: synthesizes a value for a single [`ParameterAttribute`]
//! at a time, consulting the Runtime Dictionary before falling back to
//! calibrated random synthesis (including schema-violating values).

pub mod string_pattern;

use rand::RngExt;
use serde_json::{Map, Value};

use crate::configuration::ViolationProbabilities;
use crate::runtime_dict::RuntimeDictionary;
use crate::spec::{AttributeType, ParameterAttribute};

/// Sentinel value for a generated file attribute. The request layer
/// recognizes this string and substitutes the bundled binary asset's bytes
/// when building a multipart body, rather than sending the literal string.
pub const FILE_PLACEHOLDER: &str = "__FILE__";

/// A generated value, or an explicit signal to omit the attribute entirely.
/// Modeled as a tagged variant rather than a sentinel string so "the
/// attribute's value happens to be the string SKIP" can never be confused
/// with "omit this attribute".
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    Value(Value),
    Skip,
}

impl GeneratedValue {
    pub fn into_option(self) -> Option<Value> {
        match self {
            GeneratedValue::Value(v) => Some(v),
            GeneratedValue::Skip => None,
        }
    }
}

/// Consulted by the generator to satisfy a consumer attribute with a value
/// observed from an earlier producer response, before it resorts to random
/// synthesis. `producer_candidates` names the methods allowed to supply a
/// value for `consumer_attribute_path` (from the ODG edge's dependencies).
pub struct DictionaryLookup<'a> {
    pub runtime_dictionary: &'a RuntimeDictionary,
    /// (producer method, producer attribute_path, consumer attribute_path)
    pub producer_candidates: &'a [(String, String, String)],
}

pub struct DataGenerator<'a> {
    pub config: ViolationProbabilities,
    pub dictionary: Option<DictionaryLookup<'a>>,
    /// Populated with every dependency consulted successfully, so the
    /// executor can later reward it.
    pub consulted: Vec<(String, String)>,
}

impl<'a> DataGenerator<'a> {
    pub fn new(config: ViolationProbabilities, dictionary: Option<DictionaryLookup<'a>>) -> Self {
        DataGenerator {
            config,
            dictionary,
            consulted: Vec::new(),
        }
    }

    pub fn generate(&mut self, attr: &ParameterAttribute) -> GeneratedValue {
        if !attr.required && rand::rng().random_bool(0.15) {
            return GeneratedValue::Skip;
        }

        if let Some(v) = self.try_dictionary(attr) {
            return GeneratedValue::Value(v);
        }

        let value = match attr.attribute_type {
            AttributeType::String => Value::String(self.generate_string(attr)),
            AttributeType::Integer => Value::from(self.generate_integer(attr)),
            AttributeType::Number => {
                Value::from(self.generate_integer(attr) as f64 + rand::rng().random_range(0.0..1.0))
            }
            AttributeType::Boolean => Value::Bool(rand::rng().random_bool(0.5)),
            AttributeType::Array => Value::Array(self.generate_array(attr)),
            AttributeType::Object => Value::Object(self.generate_object(attr)),
            AttributeType::File => Value::String(FILE_PLACEHOLDER.to_string()),
        };
        GeneratedValue::Value(value)
    }

    fn try_dictionary(&mut self, attr: &ParameterAttribute) -> Option<Value> {
        let lookup = self.dictionary.as_ref()?;
        if rand::rng().random_bool(1.0 - self.config.dict_use) {
            return None;
        }
        for (producer, producer_path, consumer_path) in lookup.producer_candidates {
            if consumer_path != &attr.attribute_path {
                continue;
            }
            if let Some(value) = lookup.runtime_dictionary.latest_value(producer, producer_path) {
                self.consulted.push((producer.clone(), producer_path.clone()));
                return Some(value.clone());
            }
        }
        None
    }

    fn generate_string(&self, attr: &ParameterAttribute) -> String {
        let mut rng = rand::rng();
        let facets = &attr.facets;

        if !facets.string_enum.is_empty() && rng.random::<f64>() > self.config.enum_violation {
            let idx = rng.random_range(0..facets.string_enum.len());
            return facets.string_enum[idx].clone();
        }

        if let Some(format) = &facets.format {
            match format.as_str() {
                "date-time" => return chrono::Utc::now().to_rfc3339(),
                "uuid" => return uuid_v4(),
                "password" => return "testpassword".to_string(),
                _ => {}
            }
        }

        if let Some(pattern) = &facets.pattern
            && let Some(s) = string_pattern::generate_matching(pattern)
        {
            return s;
        }

        let mut min_len = facets.min_length.unwrap_or(0);
        let mut max_len = facets.max_length.unwrap_or(100);

        if facets.min_length.is_some() && rng.random::<f64>() < self.config.string_violation {
            max_len = min_len;
        } else if facets.max_length.is_some() && rng.random::<f64>() < self.config.string_violation {
            min_len = max_len;
        }

        max_len = max_len.min(100);
        if max_len <= min_len {
            min_len = max_len;
        }
        let len = if max_len == min_len {
            max_len
        } else {
            rng.random_range(min_len..=max_len)
        };
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        (0..len)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect()
    }

    fn generate_integer(&self, attr: &ParameterAttribute) -> i64 {
        let mut rng = rand::rng();
        let facets = &attr.facets;

        if !facets.int_enum.is_empty() && rng.random::<f64>() > self.config.enum_violation {
            let idx = rng.random_range(0..facets.int_enum.len());
            return facets.int_enum[idx];
        }

        if rng.random::<f64>() < self.config.enum_number {
            return rng.random_range(0..2);
        }

        match (facets.minimum, facets.maximum) {
            (Some(min), Some(max)) => {
                if rng.random::<f64>() < self.config.min_max_value {
                    if max > min {
                        rng.random_range(min..max)
                    } else {
                        min
                    }
                } else if rng.random_bool(0.5) {
                    min
                } else {
                    max
                }
            }
            (Some(min), None) => {
                if rng.random::<f64>() < self.config.min_value {
                    min
                } else {
                    rng.random_range(0..999_999)
                }
            }
            (None, Some(max)) => {
                if rng.random::<f64>() < self.config.max_value {
                    max
                } else {
                    rng.random_range(0..999_999)
                }
            }
            (None, None) => rng.random_range(0..999_999),
        }
    }

    fn generate_array(&mut self, attr: &ParameterAttribute) -> Vec<Value> {
        let mut out = Vec::new();
        for child in &attr.children {
            if let Some(v) = self.generate(child).into_option() {
                out.push(v);
            }
        }
        out
    }

    fn generate_object(&mut self, attr: &ParameterAttribute) -> Map<String, Value> {
        let mut out = Map::new();
        for child in &attr.children {
            if let Some(v) = self.generate(child).into_option() {
                out.insert(child.attribute_name.clone(), v);
            }
        }
        out
    }
}

fn uuid_v4() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SchemaFacets;

    fn string_attr(facets: SchemaFacets) -> ParameterAttribute {
        ParameterAttribute {
            attribute_name: "s".into(),
            attribute_path: "s".into(),
            attribute_type: AttributeType::String,
            required: true,
            facets,
            children: Vec::new(),
        }
    }

    #[test]
    fn enum_respected_when_violation_probability_zero() {
        let config = ViolationProbabilities {
            enum_violation: 0.0,
            ..ViolationProbabilities::default()
        };
        let mut generator_ = DataGenerator::new(config, None);
        let attr = string_attr(SchemaFacets {
            string_enum: vec!["available".into(), "pending".into(), "sold".into()],
            ..Default::default()
        });
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            if let GeneratedValue::Value(Value::String(s)) = generator_.generate(&attr) {
                seen.insert(s);
            }
        }
        assert!(seen.iter().all(|s| ["available", "pending", "sold"].contains(&s.as_str())));
    }

    #[test]
    fn string_length_respects_bounds_absent_violation() {
        let config = ViolationProbabilities {
            string_violation: 0.0,
            ..ViolationProbabilities::default()
        };
        let mut generator_ = DataGenerator::new(config, None);
        let attr = string_attr(SchemaFacets {
            min_length: Some(3),
            max_length: Some(5),
            ..Default::default()
        });
        for _ in 0..50 {
            if let GeneratedValue::Value(Value::String(s)) = generator_.generate(&attr) {
                assert!(s.len() >= 3 && s.len() <= 5);
            }
        }
    }

    #[test]
    fn pattern_is_matched_exactly() {
        let config = ViolationProbabilities {
            dict_use: 0.0,
            ..ViolationProbabilities::default()
        };
        let mut generator_ = DataGenerator::new(config, None);
        let attr = string_attr(SchemaFacets {
            pattern: Some("^[0-9]{3}$".to_string()),
            ..Default::default()
        });
        let re = regex::Regex::new("^[0-9]{3}$").unwrap();
        for _ in 0..20 {
            if let GeneratedValue::Value(Value::String(s)) = generator_.generate(&attr) {
                assert!(re.is_match(&s), "{s} did not match pattern");
            }
        }
    }
}
