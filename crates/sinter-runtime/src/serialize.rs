//! Serialization helpers backing the generated `as_json`/`as_xml`/
//! `from_json`/`from_xml` routines.
//!
//! Emission is plain string building (the generated code walks the field
//! list itself, in declared order). Parsing uses `serde_json` on the JSON
//! side and a minimal reader for the XML shape the emitter produces.
//! Unknown keys are ignored by lookup; a missing required field is a
//! runtime deserialization error.

use sinter_core::RuntimeError;

// ============================================================================
// JSON
// ============================================================================

pub fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Quote and escape a string value.
pub fn json_str(s: &str) -> String {
    format!("\"{}\"", json_escape(s))
}

/// Append one `"name": value` pair to an object under construction.
pub fn json_field(buf: &str, name: &str, value: &str, first: bool) -> String {
    let sep = if first { "" } else { ", " };
    format!("{buf}{sep}\"{}\": {value}", json_escape(name))
}

pub fn parse_json(text: &str) -> Result<serde_json::Value, RuntimeError> {
    serde_json::from_str(text).map_err(|e| RuntimeError::MalformedInput {
        detail: e.to_string(),
    })
}

/// Look up a required field of a parsed object.
pub fn json_get<'a>(doc: &'a serde_json::Value, field: &str) -> Result<&'a serde_json::Value, RuntimeError> {
    doc.as_object()
        .and_then(|map| map.get(field))
        .ok_or_else(|| RuntimeError::MissingField {
            field: field.to_string(),
        })
}

// ============================================================================
// XML
// ============================================================================

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// A parsed XML value: element children or raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum Xml {
    Text(String),
    Node(Vec<(String, Xml)>),
}

/// Parse one `<Name>...</Name>` document of the emitted shape.
pub fn parse_xml(text: &str) -> Result<Xml, RuntimeError> {
    let mut parser = XmlParser {
        text: text.trim(),
        pos: 0,
    };
    let (_, node) = parser.parse_element()?;
    Ok(node)
}

/// Look up a required child element.
pub fn xml_get<'a>(node: &'a Xml, field: &str) -> Result<&'a Xml, RuntimeError> {
    match node {
        Xml::Node(children) => children
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
            .ok_or_else(|| RuntimeError::MissingField {
                field: field.to_string(),
            }),
        Xml::Text(_) => Err(RuntimeError::MissingField {
            field: field.to_string(),
        }),
    }
}

struct XmlParser<'a> {
    text: &'a str,
    pos: usize,
}

impl XmlParser<'_> {
    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn malformed(&self, detail: &str) -> RuntimeError {
        RuntimeError::MalformedInput {
            detail: format!("{detail} at byte {}", self.pos),
        }
    }

    fn parse_element(&mut self) -> Result<(String, Xml), RuntimeError> {
        if !self.rest().starts_with('<') {
            return Err(self.malformed("expected '<'"));
        }
        self.pos += 1;
        let name_end = self
            .rest()
            .find('>')
            .ok_or_else(|| self.malformed("unterminated tag"))?;
        let name = self.rest()[..name_end].to_string();
        if name.is_empty() || name.starts_with('/') {
            return Err(self.malformed("expected an opening tag"));
        }
        self.pos += name_end + 1;

        let close = format!("</{name}>");
        let value = if self.rest().starts_with('<') && !self.rest().starts_with("</") {
            let mut children = Vec::new();
            while !self.rest().starts_with(&close) {
                if self.rest().is_empty() {
                    return Err(self.malformed("missing closing tag"));
                }
                children.push(self.parse_element()?);
            }
            Xml::Node(children)
        } else {
            let text_end = self
                .rest()
                .find('<')
                .ok_or_else(|| self.malformed("missing closing tag"))?;
            let raw = &self.rest()[..text_end];
            let text = xml_unescape(raw);
            self.pos += text_end;
            Xml::Text(text)
        };
        if !self.rest().starts_with(&close) {
            return Err(self.malformed("mismatched closing tag"));
        }
        self.pos += close.len();
        Ok((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_field_separators() {
        let buf = "{".to_string();
        let buf = json_field(&buf, "count", "5", true);
        let buf = json_field(&buf, "limit", "10", false);
        assert_eq!(format!("{buf}}}"), "{\"count\": 5, \"limit\": 10}");
    }

    #[test]
    fn json_string_escaping() {
        assert_eq!(json_str("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn json_missing_field_is_an_error() {
        let doc = parse_json("{\"a\": 1}").unwrap();
        assert!(json_get(&doc, "a").is_ok());
        assert!(matches!(
            json_get(&doc, "b"),
            Err(RuntimeError::MissingField { .. })
        ));
    }

    #[test]
    fn json_unknown_keys_are_ignored() {
        let doc = parse_json("{\"a\": 1, \"mystery\": true}").unwrap();
        assert_eq!(json_get(&doc, "a").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn xml_roundtrip_of_emitted_shape() {
        let doc = parse_xml("<Counter><count>5</count><name>hi</name></Counter>").unwrap();
        assert_eq!(xml_get(&doc, "count").unwrap(), &Xml::Text("5".into()));
        assert_eq!(xml_get(&doc, "name").unwrap(), &Xml::Text("hi".into()));
        assert!(matches!(
            xml_get(&doc, "ghost"),
            Err(RuntimeError::MissingField { .. })
        ));
    }

    #[test]
    fn xml_nested_elements() {
        let doc = parse_xml("<A><inner><x>1</x></inner></A>").unwrap();
        let inner = xml_get(&doc, "inner").unwrap();
        assert_eq!(xml_get(inner, "x").unwrap(), &Xml::Text("1".into()));
    }

    #[test]
    fn xml_escapes_survive() {
        let doc = parse_xml("<A><s>a &lt; b &amp; c</s></A>").unwrap();
        assert_eq!(xml_get(&doc, "s").unwrap(), &Xml::Text("a < b & c".into()));
    }

    #[test]
    fn empty_element_is_empty_text() {
        let doc = parse_xml("<A><s></s></A>").unwrap();
        assert_eq!(xml_get(&doc, "s").unwrap(), &Xml::Text(String::new()));
    }
}
