//! Parsing of loosely typed tool arguments into strong types.
//!
//! Orchestrators hand over numbers as strings, lists as their textual
//! representation, and paths wrapped in stray quotes. Everything is parsed
//! once here; the rest of the crate only sees `Threshold`, `PathBuf` and
//! `DigitPrediction`.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ToolError;
use crate::models::DigitPrediction;

/// Detection confidence threshold in (0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ToolError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ToolError::BadThreshold(value.to_string()))
        }
    }

    /// Threshold as handed to the window model
    pub fn value(self) -> f32 {
        self.0 as f32
    }

    /// Whole percent, truncated, as used in crop file names. 0.29 gives 28.
    pub fn percent(self) -> u32 {
        (self.0 * 100.0) as u32
    }

    /// Accept a JSON number or a numeric string
    pub fn from_json(value: &Value) -> Result<Self, ToolError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ToolError::BadThreshold(n.to_string()))
                .and_then(Self::new),
            Value::String(s) => s.parse(),
            other => Err(ToolError::BadThreshold(other.to_string())),
        }
    }
}

impl FromStr for Threshold {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = clean_arg(s);
        let value: f64 = cleaned
            .parse()
            .map_err(|_| ToolError::BadThreshold(cleaned.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

/// Strip surrounding whitespace and quotes
pub fn clean_arg(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '\'' || c == '"').trim()
}

pub fn parse_image_path(s: &str) -> Result<PathBuf, ToolError> {
    let cleaned = clean_arg(s);
    if cleaned.is_empty() {
        return Err(ToolError::FileNotFound(PathBuf::new()));
    }
    Ok(PathBuf::from(cleaned))
}

/// Parse a list of paths given as JSON or with Python-style quoting
pub fn parse_path_list(s: &str) -> Result<Vec<PathBuf>, ToolError> {
    let trimmed = s.trim();
    let items = match serde_json::from_str::<Vec<String>>(trimmed) {
        Ok(items) => items,
        Err(_) => {
            let inner = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| ToolError::UnparsableList(format!("expected a bracketed list, got {:?}", trimmed)))?;
            split_list_items(inner).map_err(ToolError::UnparsableList)?
        }
    };
    paths_from_strings(items.iter().map(String::as_str))
}

/// Accept a JSON array of strings or a string holding a list
pub fn path_list_from_json(value: &Value) -> Result<Vec<PathBuf>, ToolError> {
    match value {
        Value::String(s) => parse_path_list(s),
        Value::Array(items) => {
            let strings = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.as_str()),
                    other => Err(ToolError::UnparsableList(format!("list item {} is not a path", other))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            paths_from_strings(strings.into_iter())
        }
        other => Err(ToolError::UnparsableList(format!("expected a list, got {}", other))),
    }
}

fn paths_from_strings<'a>(items: impl Iterator<Item = &'a str>) -> Result<Vec<PathBuf>, ToolError> {
    items
        .enumerate()
        .map(|(i, item)| {
            let cleaned = clean_arg(item);
            if cleaned.is_empty() {
                Err(ToolError::UnparsableList(format!("item {} is empty", i)))
            } else {
                Ok(PathBuf::from(cleaned))
            }
        })
        .collect()
}

/// Split the inside of a bracketed list on commas outside quotes.
/// Inside quotes a backslash escapes only another backslash or the quote.
fn split_list_items(inner: &str) -> Result<Vec<String>, String> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };

        let item = if first == '\'' || first == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == first => break,
                    Some('\\') => match chars.peek() {
                        Some(&next) if next == '\\' || next == first => {
                            s.push(next);
                            chars.next();
                        }
                        _ => s.push('\\'),
                    },
                    Some(c) => s.push(c),
                    None => return Err(format!("unterminated quote in {:?}", inner)),
                }
            }
            s
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            s.trim().to_string()
        };

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => {
                items.push(item);
                break;
            }
            Some(',') => items.push(item),
            Some(c) => return Err(format!("unexpected {:?} after list item {:?}", c, item)),
        }
    }

    Ok(items)
}

/// Parse `[{digit, confidence}, ...]` from JSON or its Python-style repr
pub fn parse_predictions(s: &str) -> Result<Vec<DigitPrediction>, ToolError> {
    let trimmed = s.trim();
    serde_json::from_str(trimmed)
        .or_else(|first_err| match python_repr_to_json(trimmed) {
            Ok(json) => serde_json::from_str(&json).map_err(|_| first_err),
            Err(_) => Err(first_err),
        })
        .map_err(|e| ToolError::UnparsablePredictions(e.to_string()))
}

/// Rewrite a Python literal (single-quoted strings, None, True, False) as JSON.
/// Quotes inside strings are left alone unless they close the string.
fn python_repr_to_json(repr: &str) -> Result<String, String> {
    let mut out = String::with_capacity(repr.len());
    let mut chars = repr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(next) => {
                                out.push('\\');
                                out.push(next);
                            }
                            None => return Err(format!("dangling escape in {:?}", repr)),
                        },
                        Some('"') => out.push_str("\\\""),
                        Some(ch) => out.push(ch),
                        None => return Err(format!("unterminated quote in {:?}", repr)),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() && next != '_' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Accept a JSON array of predictions or a string holding one
pub fn predictions_from_json(value: &Value) -> Result<Vec<DigitPrediction>, ToolError> {
    match value {
        Value::String(s) => parse_predictions(s),
        other => serde_json::from_value(other.clone())
            .map_err(|e| ToolError::UnparsablePredictions(e.to_string())),
    }
}
