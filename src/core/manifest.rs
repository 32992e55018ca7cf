//! `META-INF/MANIFEST.MF` generation and parsing.
//!
//! Only the main section is supported, which is all an executable fat archive
//! needs. Lines are limited to 72 bytes and longer values continue on lines
//! that start with a single space.

use crate::utils::error::{PackError, Result};
use crate::utils::validation::validate_class_name;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const MAIN_CLASS: &str = "Main-Class";

const MAX_LINE_BYTES: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    pub fn new(main_class: &str) -> Result<Self> {
        validate_class_name("jar.main_class", main_class)?;
        Ok(Self {
            attributes: vec![
                (MANIFEST_VERSION.to_string(), "1.0".to_string()),
                (MAIN_CLASS.to_string(), main_class.to_string()),
            ],
        })
    }

    /// Adds or replaces an attribute. Names are compared case-insensitively
    /// and `Manifest-Version` cannot be overridden.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Result<Self> {
        validate_attribute_name(name)?;
        if value.contains(['\r', '\n', '\0']) {
            return Err(PackError::ManifestError {
                message: format!("value of '{}' contains a line break or NUL", name),
            });
        }
        if name.eq_ignore_ascii_case(MANIFEST_VERSION) {
            return Ok(self);
        }
        if name.eq_ignore_ascii_case(MAIN_CLASS) {
            validate_class_name("jar.attributes.Main-Class", value)?;
        }

        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn main_class(&self) -> Option<&str> {
        self.get(MAIN_CLASS)
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.attributes {
            write_wrapped(&mut out, &format!("{}: {}", name, value));
        }
        out.push_str("\r\n");
        out
    }

    /// Parses the main section of a manifest. Unknown attributes are kept.
    pub fn parse(text: &str) -> Result<Self> {
        let mut attributes: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                // end of the main section
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                match attributes.last_mut() {
                    Some((_, value)) => value.push_str(continuation),
                    None => {
                        return Err(PackError::ManifestError {
                            message: "continuation line without an attribute".to_string(),
                        })
                    }
                }
                continue;
            }
            let (name, value) = line.split_once(": ").ok_or_else(|| PackError::ManifestError {
                message: format!("malformed line '{}'", line),
            })?;
            attributes.push((name.to_string(), value.to_string()));
        }

        Ok(Self { attributes })
    }
}

fn validate_attribute_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 70
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(PackError::ManifestError {
            message: format!("invalid attribute name '{}'", name),
        });
    }
    Ok(())
}

fn write_wrapped(out: &mut String, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE_BYTES;
    let mut first = true;

    while !rest.is_empty() {
        let mut cut = rest.len().min(limit);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n");
        rest = &rest[cut..];
        first = false;
        limit = MAX_LINE_BYTES - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_main_class() {
        let manifest = Manifest::new("main.Server").unwrap();
        assert_eq!(
            manifest.render(),
            "Manifest-Version: 1.0\r\nMain-Class: main.Server\r\n\r\n"
        );
        assert_eq!(manifest.main_class(), Some("main.Server"));
    }

    #[test]
    fn test_long_values_wrap_at_72_bytes() {
        let long_value = "x".repeat(150);
        let manifest = Manifest::new("main.Server")
            .unwrap()
            .with_attribute("Class-Path", &long_value)
            .unwrap();
        let rendered = manifest.render();

        for line in rendered.split("\r\n") {
            assert!(line.len() <= 72, "line too long: {}", line.len());
        }

        let parsed = Manifest::parse(&rendered).unwrap();
        assert_eq!(parsed.get("Class-Path"), Some(long_value.as_str()));
    }

    #[test]
    fn test_wrapping_respects_char_boundaries() {
        let value = "é".repeat(60);
        let manifest = Manifest::new("main.Server")
            .unwrap()
            .with_attribute("Implementation-Title", &value)
            .unwrap();
        let parsed = Manifest::parse(&manifest.render()).unwrap();
        assert_eq!(parsed.get("implementation-title"), Some(value.as_str()));
    }

    #[test]
    fn test_attribute_override_keeps_position_and_version() {
        let manifest = Manifest::new("main.Server")
            .unwrap()
            .with_attribute("main-class", "other.Main")
            .unwrap()
            .with_attribute("Manifest-Version", "2.0")
            .unwrap();
        assert_eq!(manifest.attributes()[0], ("Manifest-Version".to_string(), "1.0".to_string()));
        assert_eq!(manifest.main_class(), Some("other.Main"));
        assert_eq!(manifest.attributes().len(), 2);
    }

    #[test]
    fn test_main_class_override_is_validated() {
        let manifest = Manifest::new("main.Server").unwrap();
        assert!(manifest.clone().with_attribute("Main-Class", "not a class").is_err());
        assert!(manifest.clone().with_attribute("MAIN-CLASS", "main/Server").is_err());
        assert!(manifest.with_attribute("Main-Class", "main.Other").is_ok());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(Manifest::new("not a class").is_err());
        let manifest = Manifest::new("main.Server").unwrap();
        assert!(manifest.clone().with_attribute("Bad Name", "x").is_err());
        assert!(manifest.with_attribute("Good-Name", "line\nbreak").is_err());
        assert!(Manifest::parse(" orphan continuation").is_err());
        assert!(Manifest::parse("no separator").is_err());
    }
}
