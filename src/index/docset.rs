use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Uid;
use crate::xml::node::XmlArena;
use crate::xml::normalize::escape;
use crate::xml::parser::parse_into;

/// Intermediate per-record XML enumerating searchable tokens by field.
/// Positional fields carry a `pos` attribute of ascending 1-based word
/// offsets within the concatenated title+abstract.
#[derive(Debug, Clone)]
pub struct IdxDocument {
    pub uid: Uid,
    pub terms: Vec<IdxTerm>,
}

#[derive(Debug, Clone)]
pub struct IdxTerm {
    pub field: String,
    pub pos: Option<String>,
    pub text: String,
}

impl IdxDocument {
    pub fn new(uid: Uid) -> Self {
        IdxDocument {
            uid,
            terms: Vec::new(),
        }
    }

    pub fn add(&mut self, field: &str, pos: Option<String>, text: &str) {
        self.terms.push(IdxTerm {
            field: field.to_string(),
            pos,
            text: text.to_string(),
        });
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<IdxDocument>\n");
        let _ = writeln!(out, "<IdxUid>{}</IdxUid>", self.uid.0);
        out.push_str("<IdxSearchFields>\n");
        for term in &self.terms {
            match &term.pos {
                Some(pos) => {
                    let _ = writeln!(
                        out,
                        "<{} pos=\"{}\">{}</{}>",
                        term.field,
                        pos,
                        escape(&term.text),
                        term.field
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "<{}>{}</{}>",
                        term.field,
                        escape(&term.text),
                        term.field
                    );
                }
            }
        }
        out.push_str("</IdxSearchFields>\n");
        out.push_str("</IdxDocument>\n");
        out
    }

    pub fn from_xml(arena: &mut XmlArena, text: &str) -> Result<Self> {
        let root = parse_into(arena, text)?;
        if arena.node(root).name != "IdxDocument" {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("expected IdxDocument, found {}", arena.node(root).name),
            ));
        }
        let uid_node = arena.find_child(root, "IdxUid").ok_or_else(|| {
            Error::new(ErrorKind::Parse, "IdxDocument is missing IdxUid")
        })?;
        let uid = Uid::parse(&arena.node(uid_node).content)?;

        let mut doc = IdxDocument::new(uid);
        if let Some(fields) = arena.find_child(root, "IdxSearchFields") {
            for child in arena.children(fields) {
                let node = arena.node(child);
                doc.terms.push(IdxTerm {
                    field: node.name.clone(),
                    pos: arena.attribute(child, "pos"),
                    text: node.content.clone(),
                });
            }
        }
        Ok(doc)
    }
}

/// Per-term XML object: the field tags a term appears under and, per tag,
/// the ascending unique identifiers with their position attributes.
#[derive(Debug, Clone)]
pub struct InvDocument {
    pub key: String,
    pub fields: BTreeMap<String, Vec<InvEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvEntry {
    pub uid: i32,
    pub pos: Option<String>,
}

impl InvDocument {
    pub fn new(key: &str) -> Self {
        InvDocument {
            key: key.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<InvDocument>\n");
        let _ = writeln!(out, "<InvKey>{}</InvKey>", escape(&self.key));
        out.push_str("<InvIDs>\n");
        for (field, entries) in &self.fields {
            for entry in entries {
                match &entry.pos {
                    Some(pos) => {
                        let _ = writeln!(
                            out,
                            "<{} pos=\"{}\">{}</{}>",
                            field, pos, entry.uid, field
                        );
                    }
                    None => {
                        let _ = writeln!(out, "<{}>{}</{}>", field, entry.uid, field);
                    }
                }
            }
        }
        out.push_str("</InvIDs>\n");
        out.push_str("</InvDocument>\n");
        out
    }

    pub fn from_xml(arena: &mut XmlArena, text: &str) -> Result<Self> {
        let root = parse_into(arena, text)?;
        if arena.node(root).name != "InvDocument" {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("expected InvDocument, found {}", arena.node(root).name),
            ));
        }
        let key_node = arena
            .find_child(root, "InvKey")
            .ok_or_else(|| Error::new(ErrorKind::Parse, "InvDocument is missing InvKey"))?;
        let mut doc = InvDocument::new(&arena.node(key_node).content);

        if let Some(ids) = arena.find_child(root, "InvIDs") {
            for child in arena.children(ids) {
                let node = arena.node(child);
                let uid: i32 = node.content.trim().parse()?;
                doc.fields
                    .entry(node.name.clone())
                    .or_default()
                    .push(InvEntry {
                        uid,
                        pos: arena.attribute(child, "pos"),
                    });
            }
        }
        Ok(doc)
    }

    /// Union another fragment for the same key into this one: identifiers
    /// deduped ascending per field, position attributes unioned.
    pub fn absorb(&mut self, other: InvDocument) {
        for (field, entries) in other.fields {
            let slot = self.fields.entry(field).or_default();
            slot.extend(entries);
            normalize_entries(slot);
        }
    }

    /// Enforce ascending unique identifiers per field.
    pub fn tidy(&mut self) {
        for entries in self.fields.values_mut() {
            normalize_entries(entries);
        }
    }
}

fn normalize_entries(entries: &mut Vec<InvEntry>) {
    entries.sort_by_key(|e| e.uid);
    let mut merged: Vec<InvEntry> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        match merged.last_mut() {
            Some(last) if last.uid == entry.uid => {
                last.pos = union_positions(last.pos.as_deref(), entry.pos.as_deref());
            }
            _ => merged.push(entry),
        }
    }
    *entries = merged;
}

fn union_positions(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (Some(a), Some(b)) => {
            let mut positions = parse_positions(a);
            positions.extend(parse_positions(b));
            positions.sort_unstable();
            positions.dedup();
            Some(format_positions(&positions))
        }
    }
}

/// Comma list of 1-based word offsets, bad entries dropped.
pub fn parse_positions(attr: &str) -> Vec<u16> {
    attr.split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .collect()
}

pub fn format_positions(positions: &[u16]) -> String {
    let mut out = String::new();
    for (i, pos) in positions.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", pos);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idx_document_round_trips_through_xml() {
        let mut doc = IdxDocument::new(Uid(2539311));
        doc.add("TIAB", Some("2".to_string()), "quick");
        doc.add("YEAR", None, "1989");

        let xml = doc.to_xml();
        let mut arena = XmlArena::new(64);
        let parsed = IdxDocument::from_xml(&mut arena, &xml).unwrap();
        assert_eq!(parsed.uid, Uid(2539311));
        assert_eq!(parsed.terms.len(), 2);
        assert_eq!(parsed.terms[0].field, "TIAB");
        assert_eq!(parsed.terms[0].pos.as_deref(), Some("2"));
        assert_eq!(parsed.terms[1].text, "1989");
    }

    #[test]
    fn inv_document_round_trips_through_xml() {
        let mut doc = InvDocument::new("quick");
        doc.fields.insert(
            "TIAB".to_string(),
            vec![InvEntry {
                uid: 42,
                pos: Some("2,7".to_string()),
            }],
        );
        let xml = doc.to_xml();
        let mut arena = XmlArena::new(64);
        let parsed = InvDocument::from_xml(&mut arena, &xml).unwrap();
        assert_eq!(parsed.key, "quick");
        assert_eq!(parsed.fields["TIAB"][0].uid, 42);
        assert_eq!(parsed.fields["TIAB"][0].pos.as_deref(), Some("2,7"));
    }

    #[test]
    fn absorb_unions_ids_and_positions() {
        let mut a = InvDocument::new("term");
        a.fields.insert(
            "TIAB".to_string(),
            vec![
                InvEntry { uid: 1, pos: Some("3".to_string()) },
                InvEntry { uid: 5, pos: Some("1".to_string()) },
            ],
        );
        let mut b = InvDocument::new("term");
        b.fields.insert(
            "TIAB".to_string(),
            vec![
                InvEntry { uid: 1, pos: Some("8".to_string()) },
                InvEntry { uid: 3, pos: Some("2".to_string()) },
            ],
        );
        b.fields.insert(
            "YEAR".to_string(),
            vec![InvEntry { uid: 9, pos: None }],
        );

        a.absorb(b);
        let tiab = &a.fields["TIAB"];
        assert_eq!(
            tiab.iter().map(|e| e.uid).collect::<Vec<i32>>(),
            vec![1, 3, 5]
        );
        assert_eq!(tiab[0].pos.as_deref(), Some("3,8"));
        assert!(a.fields.contains_key("YEAR"));
    }

    #[test]
    fn position_lists_parse_and_format() {
        assert_eq!(parse_positions("3, 7,12"), vec![3, 7, 12]);
        assert_eq!(format_positions(&[3, 7, 12]), "3,7,12");
    }
}
