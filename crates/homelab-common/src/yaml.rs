//! YAML utilities using yaml-rust2
//!
//! Parsing converts to serde_json::Value for typed deserialization (stack
//! config files). Emitting goes the other way so rendered manifests come out
//! as multi-document YAML with a stable key order.

use serde_json::{Map, Number, Value};
use yaml_rust2::yaml::Hash;
use yaml_rust2::{Yaml, YamlEmitter, YamlLoader};

use crate::{Error, Result};

/// Parse a YAML string into a serde_json::Value.
///
/// For multi-document YAML, returns only the first document.
/// Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| Error::Yaml(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

/// Parse a multi-document YAML string into a Vec of serde_json::Values.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| Error::Yaml(e.to_string()))?;
    docs.into_iter().map(yaml_to_json).collect()
}

/// Emit a single JSON value as one YAML document (with leading `---`)
pub fn emit_yaml(value: &Value) -> Result<String> {
    let mut out = String::new();
    let mut emitter = YamlEmitter::new(&mut out);
    emitter
        .dump(&json_to_yaml(value))
        .map_err(|e| Error::Yaml(format!("{:?}", e)))?;
    Ok(out)
}

/// Emit several values as a multi-document YAML stream
pub fn emit_documents<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<String> {
    let mut out = String::new();
    for value in values {
        out.push_str(&emit_yaml(value)?);
        out.push('\n');
    }
    Ok(out)
}

/// Convert a yaml_rust2::Yaml value to serde_json::Value
fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| Error::Yaml(e.to_string()))?;
            Ok(Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(Error::Yaml("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::Yaml("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(Error::Yaml("bad YAML value".to_string())),
    }
}

/// Convert a serde_json::Value to a yaml_rust2::Yaml value
fn json_to_yaml(value: &Value) -> Yaml {
    match value {
        Value::Null => Yaml::Null,
        Value::Bool(b) => Yaml::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Yaml::Integer(i),
            None => Yaml::Real(n.to_string()),
        },
        Value::String(s) => Yaml::String(s.clone()),
        Value::Array(arr) => Yaml::Array(arr.iter().map(json_to_yaml).collect()),
        Value::Object(map) => {
            let mut hash = Hash::new();
            for (k, v) in map {
                hash.insert(Yaml::String(k.clone()), json_to_yaml(v));
            }
            Yaml::Hash(hash)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_simple() {
        let yaml = "name: test\nvalue: 42";
        let result = parse_yaml(yaml).unwrap();
        assert_eq!(result["name"], "test");
        assert_eq!(result["value"], 42);
    }

    #[test]
    fn test_parse_yaml_nested() {
        let yaml = r#"
config:
  overseerr:domain: overseerr.example.com
  overseerr:port: 5055
"#;
        let result = parse_yaml(yaml).unwrap();
        assert_eq!(result["config"]["overseerr:domain"], "overseerr.example.com");
        assert_eq!(result["config"]["overseerr:port"], 5055);
    }

    #[test]
    fn test_parse_yaml_multi_doc() {
        let yaml = "name: first\n---\nname: second\n";
        let results = parse_yaml_multi(yaml).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["name"], "first");
        assert_eq!(results[1]["name"], "second");
    }

    #[test]
    fn test_parse_yaml_empty() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_yaml_invalid() {
        let result = parse_yaml("not: valid: yaml: {{");
        assert!(matches!(result, Err(Error::Yaml(_))));
    }

    #[test]
    fn test_parse_yaml_float() {
        let result = parse_yaml("value: 1.5").unwrap();
        let value = result["value"].as_f64().unwrap();
        assert!((value - 1.5).abs() < 0.0001);
    }

    #[test]
    fn test_emit_keeps_key_order() {
        let value = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "overseerr"}
        });
        let out = emit_yaml(&value).unwrap();
        assert!(out.starts_with("---"));
        let api = out.find("apiVersion").unwrap();
        let kind = out.find("kind").unwrap();
        assert!(api < kind);
    }

    #[test]
    fn test_emit_quotes_ambiguous_strings() {
        let value = serde_json::json!({"skipAwait": "true", "replicas": 3});
        let parsed = parse_yaml(&emit_yaml(&value).unwrap()).unwrap();
        assert_eq!(parsed["skipAwait"], "true");
        assert_eq!(parsed["replicas"], 3);
    }

    #[test]
    fn test_emit_documents_is_parseable_stream() {
        let docs = vec![
            serde_json::json!({"kind": "Namespace"}),
            serde_json::json!({"kind": "Certificate", "spec": {"dnsNames": ["a.example.com"]}}),
        ];
        let out = emit_documents(&docs).unwrap();
        let parsed = parse_yaml_multi(&out).unwrap();
        assert_eq!(parsed, docs);
    }

    #[test]
    fn test_deserialize_to_typed() {
        use serde::Deserialize;

        #[derive(Deserialize, Debug, PartialEq)]
        struct Settings {
            name: String,
            count: i32,
        }

        let value = parse_yaml("name: test\ncount: 42").unwrap();
        let settings: Settings = serde_json::from_value(value).unwrap();
        assert_eq!(
            settings,
            Settings {
                name: "test".to_string(),
                count: 42
            }
        );
    }
}
