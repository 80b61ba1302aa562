//! The editor's sectioned key/value config format.
//!
//! Used for `export_presets.cfg`, `.import` sidecars, `.remap` stubs and
//! project settings. Keys may contain dots and slashes (`path.etc2`,
//! `config/icon`), so this is neither TOML nor INI; the codec here parses
//! and re-emits exactly the shape the editor writes.
//!
//! Section and key insertion order is preserved: remap resolution iterates
//! sidecar keys in file order.

use std::fs;
use std::path::Path;
use thiserror::Error;

/// Parse failure with the offending line number.
#[derive(Error, Debug)]
#[error("config parse error at line {line}: {message}")]
pub struct CfgError {
    pub line: usize,
    pub message: String,
}

impl CfgError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    fn emit(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", c_escape(s)),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::List(items) => {
                let quoted: Vec<String> =
                    items.iter().map(|s| format!("\"{}\"", c_escape(s))).collect();
                format!("[{}]", quoted.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

#[derive(Debug, Clone, Default)]
struct Section {
    name: String,
    entries: Vec<(String, Value)>,
}

/// An ordered, sectioned key/value document.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    sections: Vec<Section>,
}

impl ConfigFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, CfgError> {
        let mut config = Self::new();
        let mut current = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .ok_or_else(|| CfgError::new(line_no, "unterminated section header"))?;
                current = name.trim().to_owned();
                // Materialize the section even if it stays empty.
                config.section_mut(&current);
                continue;
            }

            let eq = line
                .find('=')
                .ok_or_else(|| CfgError::new(line_no, "expected 'key=value'"))?;
            let key = line[..eq].trim();
            if key.is_empty() {
                return Err(CfgError::new(line_no, "empty key"));
            }
            let value = parse_value(line[eq + 1..].trim(), line_no)?;
            config.section_mut(&current).entries.push((key.to_owned(), value));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CfgError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CfgError::new(0, format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.to_text())
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !section.name.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&format!("[{}]\n\n", section.name));
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("{}={}\n", key, value.emit()));
            }
        }
        out
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        let section = self.section_mut(section);
        match section.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => section.entries.push((key.to_owned(), value)),
        }
    }

    /// Keys of `section` in insertion order.
    pub fn section_keys(&self, section: &str) -> Vec<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .map(|s| s.entries.iter().map(|(k, _)| k.as_str()).collect())
            .unwrap_or_default()
    }

    /// Section names in insertion order.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    /// All `(key, value)` pairs of `section` in insertion order.
    pub fn section_entries(&self, section: &str) -> Vec<(&str, &Value)> {
        self.sections
            .iter()
            .find(|s| s.name == section)
            .map(|s| s.entries.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        if let Some(idx) = self.sections.iter().position(|s| s.name == name) {
            return &mut self.sections[idx];
        }
        self.sections.push(Section {
            name: name.to_owned(),
            entries: Vec::new(),
        });
        self.sections.last_mut().expect("just pushed")
    }
}

fn parse_value(text: &str, line: usize) -> Result<Value, CfgError> {
    if let Some(rest) = text.strip_prefix('"') {
        let inner = rest
            .strip_suffix('"')
            .ok_or_else(|| CfgError::new(line, "unterminated string"))?;
        return Ok(Value::String(c_unescape(inner)));
    }
    if text.starts_with('[') {
        return parse_list(text, line);
    }
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    // Bare word; the editor writes some enum-ish values unquoted.
    Ok(Value::String(text.to_owned()))
}

fn parse_list(text: &str, line: usize) -> Result<Value, CfgError> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| CfgError::new(line, "unterminated list"))?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | ',' => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut item = String::new();
                let mut escaped = false;
                loop {
                    match chars.next() {
                        None => return Err(CfgError::new(line, "unterminated string in list")),
                        Some('\\') if !escaped => escaped = true,
                        Some('"') if !escaped => break,
                        Some(ch) => {
                            if escaped {
                                item.push('\\');
                                escaped = false;
                            }
                            item.push(ch);
                        }
                    }
                }
                items.push(c_unescape(&item));
            }
            _ => return Err(CfgError::new(line, "expected quoted string in list")),
        }
    }
    Ok(Value::List(items))
}

/// Escape a string the way the editor does when writing config values.
pub fn c_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`c_escape`].
pub fn c_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_typed_values() {
        let text = r#"
[remap]

importer="texture"
type="CompressedTexture2D"
path.etc2="res://.godot/imported/a.etc2"
path.s3tc="res://.godot/imported/a.s3tc"

[params]

compress=true
lossy_quality=7
"#;
        let cfg = ConfigFile::parse(text).unwrap();
        assert_eq!(cfg.get("remap", "importer").unwrap().as_str(), Some("texture"));
        assert_eq!(
            cfg.section_keys("remap"),
            ["importer", "type", "path.etc2", "path.s3tc"]
        );
        assert_eq!(cfg.get("params", "compress").unwrap().as_bool(), Some(true));
        assert_eq!(cfg.get("params", "lossy_quality").unwrap().as_int(), Some(7));
    }

    #[test]
    fn parses_lists() {
        let cfg = ConfigFile::parse("[preset.0]\nexport_files=[\"res://a.tscn\", \"res://b.gd\"]\n")
            .unwrap();
        assert_eq!(
            cfg.get("preset.0", "export_files").unwrap().as_list(),
            Some(&["res://a.tscn".to_owned(), "res://b.gd".to_owned()][..])
        );
    }

    #[test]
    fn keys_before_any_section_live_in_the_root() {
        let cfg = ConfigFile::parse("config_version=5\n[application]\nconfig/name=\"Demo\"\n")
            .unwrap();
        assert_eq!(cfg.get("", "config_version").unwrap().as_int(), Some(5));
        assert_eq!(
            cfg.get("application", "config/name").unwrap().as_str(),
            Some("Demo")
        );
    }

    #[test]
    fn round_trips_through_text() {
        let mut cfg = ConfigFile::new();
        cfg.set("preset.0", "name", Value::from("Windows Desktop"));
        cfg.set("preset.0", "encrypt_pck", Value::from(true));
        cfg.set(
            "preset.0",
            "export_files",
            Value::List(vec!["res://a \"quoted\".txt".to_owned()]),
        );
        cfg.set("preset.0.options", "binary_format/64_bits", Value::from(true));

        let reparsed = ConfigFile::parse(&cfg.to_text()).unwrap();
        assert_eq!(
            reparsed.get("preset.0", "name").unwrap().as_str(),
            Some("Windows Desktop")
        );
        assert_eq!(
            reparsed.get("preset.0", "export_files").unwrap().as_list(),
            Some(&["res://a \"quoted\".txt".to_owned()][..])
        );
        assert_eq!(
            reparsed
                .get("preset.0.options", "binary_format/64_bits")
                .unwrap()
                .as_bool(),
            Some(true)
        );
    }

    #[test]
    fn escape_round_trip() {
        let original = "line1\nline2\t\"quoted\" back\\slash";
        assert_eq!(c_unescape(&c_escape(original)), original);
    }

    #[test]
    fn reports_line_numbers() {
        let err = ConfigFile::parse("[ok]\nkey=\"fine\"\nbroken line\n").unwrap_err();
        assert_eq!(err.line, 3);
    }
}
