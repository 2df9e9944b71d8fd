use crate::core::error::Result;
use crate::xml::parser::{XmlLexer, XmlToken};

/// Reshapes raw corpus XML into the canonical form the indexer consumes:
/// the identifier is rescued from a root attribute when the child element
/// is missing, inline markup is collapsed to its text, and CDATA sections
/// are decoded into escaped character data.
pub struct RecordNormalizer {
    pub id_element: String,
    pub id_attribute: String,
}

const INLINE_TAGS: [&str; 7] = ["i", "b", "u", "em", "strong", "sub", "sup"];

impl RecordNormalizer {
    pub fn new(id_element: &str, id_attribute: &str) -> Self {
        RecordNormalizer {
            id_element: id_element.to_string(),
            id_attribute: id_attribute.to_string(),
        }
    }

    pub fn normalize(&self, record: &str) -> Result<String> {
        // First pass: does the identifier element already exist?
        let mut has_id = false;
        let mut lexer = XmlLexer::new(record);
        while let Some(token) = lexer.next_token()? {
            match token {
                XmlToken::Open { name, .. } | XmlToken::SelfClose { name, .. }
                    if name == self.id_element =>
                {
                    has_id = true;
                }
                _ => {}
            }
        }

        let mut out = String::with_capacity(record.len());
        let mut lexer = XmlLexer::new(record);
        let mut at_root = true;
        while let Some(token) = lexer.next_token()? {
            match token {
                XmlToken::Open { name, attributes } => {
                    if is_inline(name) {
                        continue;
                    }
                    emit_open(&mut out, name, attributes, false);
                    if at_root {
                        at_root = false;
                        if !has_id {
                            if let Some(id) =
                                crate::xml::node::parse_attribute(attributes, &self.id_attribute)
                            {
                                out.push_str(&format!(
                                    "<{}>{}</{}>",
                                    self.id_element, id, self.id_element
                                ));
                            }
                        }
                    }
                }
                XmlToken::SelfClose { name, attributes } => {
                    if is_inline(name) {
                        continue;
                    }
                    emit_open(&mut out, name, attributes, true);
                }
                XmlToken::Close { name } => {
                    if is_inline(name) {
                        continue;
                    }
                    out.push_str(&format!("</{}>", name));
                }
                XmlToken::Text(text) => out.push_str(text),
                XmlToken::Cdata(text) => out.push_str(&escape(text)),
                XmlToken::Skip => {}
            }
        }
        Ok(out)
    }
}

fn is_inline(name: &str) -> bool {
    INLINE_TAGS.contains(&name) || name.starts_with("mml:")
}

fn emit_open(out: &mut String, name: &str, attributes: &str, self_close: bool) {
    out.push('<');
    out.push_str(name);
    if !attributes.is_empty() {
        out.push(' ');
        out.push_str(attributes);
    }
    if self_close {
        out.push('/');
    }
    out.push('>');
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
