//! Conversion of legacy YAML redirect files into rule-language lines.
//!
//! Each YAML document looks like:
//!
//! ```yaml
//! from: /old.txt
//! to: /new.txt
//! outputs:
//!   - all
//!   - after-v2.6
//!   - 'before-v3.0': 'manual'
//!   - '/saas': 'manual'
//! ```

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document {document}: missing `{field}`")]
    MissingField { document: usize, field: &'static str },

    #[error("document {document}: unsupported output {output}")]
    BadOutput { document: usize, output: String },
}

/// Turn a legacy version selector into a bracketed range.
pub fn transform_version_rule(rule: &str) -> String {
    if rule == "all" {
        return "[*]".to_string();
    }
    if let Some(version) = rule.strip_prefix("after-") {
        return format!("({version}-*]");
    }
    if let Some(version) = rule.strip_prefix("before-") {
        return format!("[*-{version}]");
    }
    format!("[{rule}]")
}

/// Convert every document in `text`, one rule line per output.
pub fn convert(text: &str) -> Result<Vec<String>, ConvertError> {
    let mut result = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let document_number = index + 1;
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let from = string_field(&value, "from", document_number)?;
        let to = string_field(&value, "to", document_number)?;
        let outputs = value
            .get("outputs")
            .and_then(Value::as_sequence)
            .ok_or(ConvertError::MissingField {
                document: document_number,
                field: "outputs",
            })?;

        for output in outputs {
            let (version, base) = parse_output(output).ok_or_else(|| ConvertError::BadOutput {
                document: document_number,
                output: format!("{output:?}"),
            })?;
            let base = base.trim_end_matches('/');
            let from = from.trim_start_matches('/');
            let to = to.trim_start_matches('/');

            let line = if version == "raw" {
                format!("raw: {base}/{from} -> {base}/{to}")
            } else {
                format!("{version}: {base}/${{version}}/{from} -> {base}/${{version}}/{to}")
            };
            result.push(line);
        }
    }

    Ok(result)
}

fn parse_output(output: &Value) -> Option<(String, String)> {
    if let Some(selector) = scalar(output) {
        return Some((transform_version_rule(&selector), String::new()));
    }

    let (key, value) = output.as_mapping()?.iter().next()?;
    let key = scalar(key)?;
    if key.starts_with('/') {
        return Some(("raw".to_string(), key));
    }

    let base = match value {
        Value::Mapping(inner) => scalar(inner.iter().next()?.0)?,
        other => scalar(other)?,
    };
    Some((transform_version_rule(&key), base))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(value: &Value, field: &'static str, document: usize) -> Result<String, ConvertError> {
    value
        .get(field)
        .and_then(scalar)
        .ok_or(ConvertError::MissingField { document, field })
}
