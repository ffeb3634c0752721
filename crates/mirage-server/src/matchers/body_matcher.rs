//! Body matching: exact, regex, and semantic (JSON, JSON schema, XML,
//! XPath) comparison.

use super::string_matcher::CachedValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body matcher specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum BodyMatch {
    /// Exact string comparison.
    Equals(String),
    /// Regex over the raw body.
    Matches(String),
    /// Semantic JSON comparison. `strict` requires full equality; otherwise
    /// the expected document is matched as a subset of the actual one.
    Json {
        value: serde_json::Value,
        #[serde(default)]
        strict: bool,
    },
    /// Structural JSON-schema subset: `type`, `required`, `properties`,
    /// `items`, `enum`.
    JsonSchema(serde_json::Value),
    /// Semantic XML equality: element names, attributes, child order, and
    /// trimmed text — not byte-for-byte.
    Xml(String),
    /// XPath expression; matches when the evaluation is truthy (non-empty
    /// node set, true boolean, non-empty string, non-NaN number).
    Xpath(String),
}

/// Compiled body matcher.
#[derive(Debug, Clone)]
pub enum CompiledBodyMatch {
    Equals(CachedValue),
    Matches(Arc<Regex>),
    Json {
        value: serde_json::Value,
        strict: bool,
    },
    JsonSchema(serde_json::Value),
    Xml(String),
    Xpath(String),
}

impl CompiledBodyMatch {
    pub fn compile(spec: &BodyMatch) -> Result<Self, regex::Error> {
        match spec {
            BodyMatch::Equals(value) => Ok(CompiledBodyMatch::Equals(CachedValue::new(value))),
            BodyMatch::Matches(pattern) => {
                Ok(CompiledBodyMatch::Matches(Arc::new(Regex::new(pattern)?)))
            }
            BodyMatch::Json { value, strict } => Ok(CompiledBodyMatch::Json {
                value: value.clone(),
                strict: *strict,
            }),
            BodyMatch::JsonSchema(schema) => Ok(CompiledBodyMatch::JsonSchema(schema.clone())),
            BodyMatch::Xml(expected) => Ok(CompiledBodyMatch::Xml(expected.clone())),
            BodyMatch::Xpath(path) => Ok(CompiledBodyMatch::Xpath(path.clone())),
        }
    }

    pub fn matches(&self, body: &str) -> bool {
        match self {
            CompiledBodyMatch::Equals(expected) => expected.equals(body, true),
            CompiledBodyMatch::Matches(regex) => regex.is_match(body),
            CompiledBodyMatch::Json { value, strict } => {
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(actual) => {
                        if *strict {
                            actual == *value
                        } else {
                            json_subset(&actual, value)
                        }
                    }
                    Err(_) => false,
                }
            }
            CompiledBodyMatch::JsonSchema(schema) => {
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(instance) => schema_matches(schema, &instance),
                    Err(_) => false,
                }
            }
            CompiledBodyMatch::Xml(expected) => xml_equals(body, expected),
            CompiledBodyMatch::Xpath(path) => xpath_matches(body, path),
        }
    }
}

/// Subset comparison: every part of `expected` must be present in `actual`.
/// Objects match on a key subset, arrays element-wise with equal length,
/// scalars by equality.
fn json_subset(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (actual, expected) {
        (Value::Object(actual_map), Value::Object(expected_map)) => {
            expected_map.iter().all(|(key, expected_value)| {
                actual_map
                    .get(key)
                    .is_some_and(|actual_value| json_subset(actual_value, expected_value))
            })
        }
        (Value::Array(actual_items), Value::Array(expected_items)) => {
            actual_items.len() == expected_items.len()
                && actual_items
                    .iter()
                    .zip(expected_items)
                    .all(|(a, e)| json_subset(a, e))
        }
        _ => actual == expected,
    }
}

/// Minimal structural JSON-schema check.
fn schema_matches(schema: &serde_json::Value, instance: &serde_json::Value) -> bool {
    use serde_json::Value;

    let Some(schema_map) = schema.as_object() else {
        // A non-object schema constrains nothing
        return true;
    };

    if let Some(type_spec) = schema_map.get("type") {
        let allowed: Vec<&str> = match type_spec {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !allowed.iter().any(|name| type_name_matches(name, instance)) {
            return false;
        }
    }

    if let Some(allowed) = schema_map.get("enum").and_then(Value::as_array) {
        if !allowed.contains(instance) {
            return false;
        }
    }

    if let Some(required) = schema_map.get("required").and_then(Value::as_array) {
        let Some(instance_map) = instance.as_object() else {
            return false;
        };
        for name in required.iter().filter_map(Value::as_str) {
            if !instance_map.contains_key(name) {
                return false;
            }
        }
    }

    if let Some(properties) = schema_map.get("properties").and_then(Value::as_object) {
        if let Some(instance_map) = instance.as_object() {
            for (name, property_schema) in properties {
                if let Some(value) = instance_map.get(name) {
                    if !schema_matches(property_schema, value) {
                        return false;
                    }
                }
            }
        }
    }

    if let Some(item_schema) = schema_map.get("items") {
        if let Some(items) = instance.as_array() {
            if !items.iter().all(|item| schema_matches(item_schema, item)) {
                return false;
            }
        }
    }

    true
}

fn type_name_matches(name: &str, instance: &serde_json::Value) -> bool {
    match name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "number" => instance.is_number(),
        "integer" => instance.is_i64() || instance.is_u64(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        _ => false,
    }
}

/// Semantic XML equality over parsed documents.
fn xml_equals(actual: &str, expected: &str) -> bool {
    let (Ok(actual_package), Ok(expected_package)) = (
        sxd_document::parser::parse(actual),
        sxd_document::parser::parse(expected),
    ) else {
        return false;
    };

    let actual_root = root_element(&actual_package);
    let expected_root = root_element(&expected_package);
    match (actual_root, expected_root) {
        (Some(a), Some(e)) => elements_equal(a, e),
        _ => false,
    }
}

fn root_element(package: &sxd_document::Package) -> Option<sxd_document::dom::Element<'_>> {
    package
        .as_document()
        .root()
        .children()
        .into_iter()
        .find_map(|child| child.element())
}

fn elements_equal(actual: sxd_document::dom::Element, expected: sxd_document::dom::Element) -> bool {
    if actual.name() != expected.name() {
        return false;
    }

    let attributes = |element: sxd_document::dom::Element| {
        let mut pairs: Vec<(String, String)> = element
            .attributes()
            .iter()
            .map(|attribute| {
                (
                    attribute.name().local_part().to_string(),
                    attribute.value().to_string(),
                )
            })
            .collect();
        pairs.sort();
        pairs
    };
    if attributes(actual) != attributes(expected) {
        return false;
    }

    fn child_elements<'d>(
        element: sxd_document::dom::Element<'d>,
    ) -> Vec<sxd_document::dom::Element<'d>> {
        element
            .children()
            .into_iter()
            .filter_map(|child| child.element())
            .collect::<Vec<_>>()
    }
    let text_content = |element: sxd_document::dom::Element| {
        element
            .children()
            .into_iter()
            .filter_map(|child| child.text())
            .map(|text| text.text().trim().to_string())
            .collect::<Vec<_>>()
            .join("")
    };

    let actual_children = child_elements(actual);
    let expected_children = child_elements(expected);
    if actual_children.len() != expected_children.len() {
        return false;
    }
    if text_content(actual) != text_content(expected) {
        return false;
    }

    actual_children
        .into_iter()
        .zip(expected_children)
        .all(|(a, e)| elements_equal(a, e))
}

/// Evaluate an XPath expression against the body; truthy results match.
fn xpath_matches(body: &str, path: &str) -> bool {
    use sxd_xpath::{evaluate_xpath, Value};

    let Ok(package) = sxd_document::parser::parse(body) else {
        return false;
    };
    let document = package.as_document();

    match evaluate_xpath(&document, path) {
        Ok(Value::Boolean(b)) => b,
        Ok(Value::Nodeset(nodes)) => nodes.size() > 0,
        Ok(Value::String(s)) => !s.is_empty(),
        Ok(Value::Number(n)) => !n.is_nan(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(spec: BodyMatch) -> CompiledBodyMatch {
        CompiledBodyMatch::compile(&spec).unwrap()
    }

    #[test]
    fn test_equals() {
        let matcher = compiled(BodyMatch::Equals("hello".to_string()));
        assert!(matcher.matches("hello"));
        assert!(!matcher.matches("HELLO"));
    }

    #[test]
    fn test_regex() {
        let matcher = compiled(BodyMatch::Matches(r"\d{3}-\d{4}".to_string()));
        assert!(matcher.matches("call 123-4567"));
        assert!(!matcher.matches("no digits"));
    }

    #[test]
    fn test_json_subset_ignores_extra_fields() {
        let matcher = compiled(BodyMatch::Json {
            value: serde_json::json!({"name": "John"}),
            strict: false,
        });
        assert!(matcher.matches(r#"{"name": "John", "age": 30}"#));
        assert!(!matcher.matches(r#"{"name": "Jane"}"#));
    }

    #[test]
    fn test_json_strict_requires_full_equality() {
        let matcher = compiled(BodyMatch::Json {
            value: serde_json::json!({"name": "John"}),
            strict: true,
        });
        assert!(matcher.matches(r#"{"name": "John"}"#));
        assert!(!matcher.matches(r#"{"name": "John", "age": 30}"#));
    }

    #[test]
    fn test_json_key_order_is_irrelevant() {
        let matcher = compiled(BodyMatch::Json {
            value: serde_json::json!({"a": 1, "b": 2}),
            strict: true,
        });
        assert!(matcher.matches(r#"{"b": 2, "a": 1}"#));
    }

    #[test]
    fn test_json_non_json_body_never_matches() {
        let matcher = compiled(BodyMatch::Json {
            value: serde_json::json!({}),
            strict: false,
        });
        assert!(!matcher.matches("not json"));
    }

    #[test]
    fn test_json_schema_type_and_required() {
        let matcher = compiled(BodyMatch::JsonSchema(serde_json::json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}}
        })));
        assert!(matcher.matches(r#"{"id": 7}"#));
        assert!(!matcher.matches(r#"{"id": "seven"}"#));
        assert!(!matcher.matches(r#"{"name": "seven"}"#));
    }

    #[test]
    fn test_json_schema_enum_and_items() {
        let matcher = compiled(BodyMatch::JsonSchema(serde_json::json!({
            "type": "array",
            "items": {"enum": ["red", "green", "blue"]}
        })));
        assert!(matcher.matches(r#"["red", "blue"]"#));
        assert!(!matcher.matches(r#"["red", "yellow"]"#));
    }

    #[test]
    fn test_xml_semantic_equality() {
        let matcher = compiled(BodyMatch::Xml("<user id=\"1\"><name>Jo</name></user>".to_string()));
        // Whitespace between elements is not significant
        assert!(matcher.matches("<user id=\"1\">\n  <name>Jo</name>\n</user>"));
        assert!(!matcher.matches("<user id=\"2\"><name>Jo</name></user>"));
    }

    #[test]
    fn test_xml_attribute_order_is_irrelevant() {
        let matcher = compiled(BodyMatch::Xml("<a x=\"1\" y=\"2\"/>".to_string()));
        assert!(matcher.matches("<a y=\"2\" x=\"1\"/>"));
    }

    #[test]
    fn test_xpath() {
        let matcher = compiled(BodyMatch::Xpath("/order/item[@sku='X1']".to_string()));
        assert!(matcher.matches("<order><item sku=\"X1\"/></order>"));
        assert!(!matcher.matches("<order><item sku=\"X2\"/></order>"));
    }

    #[test]
    fn test_xpath_malformed_body_never_matches() {
        let matcher = compiled(BodyMatch::Xpath("/a".to_string()));
        assert!(!matcher.matches("<unclosed"));
    }

    #[test]
    fn test_wire_format() {
        let spec: BodyMatch = serde_json::from_str(r#"{"equals": "payload"}"#).unwrap();
        assert_eq!(spec, BodyMatch::Equals("payload".to_string()));

        let spec: BodyMatch =
            serde_json::from_str(r#"{"json": {"value": {"a": 1}, "strict": true}}"#).unwrap();
        assert_eq!(
            spec,
            BodyMatch::Json {
                value: serde_json::json!({"a": 1}),
                strict: true
            }
        );
    }
}
