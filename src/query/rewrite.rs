use std::sync::OnceLock;

use regex::Regex;

use crate::analysis::normalize::{normalize_token, unescape};
use crate::analysis::stem::porter2;
use crate::analysis::stopword::StopWords;
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::tables::TableContext;

/// Clause tokens handed to the recursive-descent parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Word {
        text: String,
        field: String,
        wildcard: bool,
    },
    Plus,
    And,
    Or,
    Not,
    Prox(u16), // tilde count
    LParen,
    RParen,
}

pub const DEFAULT_FIELD: &str = "TIAB";
const TEXT_FIELDS: [&str; 3] = ["TIAB", "TITL", "STEM"];
const RANGE_FIELDS: [&str; 6] = ["YEAR", "ANUM", "INUM", "FNUM", "TLEN", "TNUM"];
const MAX_RANGE_SPAN: i64 = 1024;

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+):(\d+)$").unwrap())
}

/// Lexical preprocessing: entity unescape, lowercasing, operator
/// unification, range and alias expansion, stop-word elision, stemming.
pub struct Rewriter {
    pub stop: StopWords,
    pub context: TableContext,
}

impl Rewriter {
    pub fn new(context: TableContext) -> Self {
        Rewriter {
            stop: StopWords::pubmed(),
            context,
        }
    }

    pub fn rewrite(&self, raw: &str) -> Result<Vec<Tok>> {
        let text = unescape(raw).to_lowercase().replace('"', " ");
        let spaced = space_operators(&text);

        let mut out = Vec::new();
        let mut clause: Vec<String> = Vec::new();
        for piece in spaced.split_whitespace() {
            match piece {
                "&" | "and" => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::And);
                }
                "|" | "or" => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::Or);
                }
                "!" | "not" => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::Not);
                }
                "(" => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::LParen);
                }
                ")" => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::RParen);
                }
                tildes if tildes.starts_with('~') && tildes.chars().all(|c| c == '~') => {
                    self.flush_clause(&mut clause, &mut out)?;
                    out.push(Tok::Prox(tildes.len() as u16));
                }
                word => clause.push(word.to_string()),
            }
        }
        self.flush_clause(&mut clause, &mut out)?;

        if out.is_empty() {
            return Err(Error::new(ErrorKind::QuerySyntax, "empty query"));
        }
        Ok(out)
    }

    fn flush_clause(&self, clause: &mut Vec<String>, out: &mut Vec<Tok>) -> Result<()> {
        if clause.is_empty() {
            return Ok(());
        }
        let pieces = std::mem::take(clause);

        // a trailing [FIELD] qualifier restricts the whole clause
        let mut field: Option<String> = None;
        let mut words: Vec<String> = Vec::new();
        for piece in pieces {
            match piece.find('[') {
                Some(open) => {
                    let base = &piece[..open];
                    let tag = piece[open + 1..].trim_end_matches(']');
                    if !base.is_empty() {
                        words.push(base.to_string());
                    }
                    if !tag.is_empty() {
                        field = Some(tag.to_uppercase());
                    }
                }
                None => words.push(piece),
            }
        }
        let field = field.unwrap_or_else(|| DEFAULT_FIELD.to_string());

        if RANGE_FIELDS.contains(&field.as_str()) && words.len() == 1 {
            if let Some(captures) = range_pattern().captures(&words[0]) {
                let lo: i64 = captures[1].parse()?;
                let hi: i64 = captures[2].parse()?;
                return expand_range(out, &field, lo, hi);
            }
        }

        if field == "MESH" {
            let name = words.join(" ");
            let tables = self.context.tables();
            if let Some(codes) = tables.mesh_codes(&name) {
                out.push(Tok::LParen);
                for (i, code) in codes.iter().enumerate() {
                    if i > 0 {
                        out.push(Tok::Or);
                    }
                    out.push(Tok::Word {
                        text: normalize_token(code),
                        field: "TREE".to_string(),
                        wildcard: true,
                    });
                }
                out.push(Tok::RParen);
                return Ok(());
            }
        }

        if field == "JOUR" {
            let name = words.join(" ");
            let tables = self.context.tables();
            if let Some(canonical) = tables.journal(&name) {
                out.push(Tok::Word {
                    text: normalize_token(canonical),
                    field,
                    wildcard: false,
                });
                return Ok(());
            }
        }

        if !TEXT_FIELDS.contains(&field.as_str()) {
            // fields without positions index each source token as one
            // normalized key, so the clause is a single literal term
            let mut joined = words.join(" ");
            let mut wildcard = false;
            if let Some(stripped) = joined.strip_suffix('$') {
                joined = porter2(stripped);
                wildcard = true;
            } else if let Some(stripped) = joined.strip_suffix('*') {
                joined = stripped.to_string();
                wildcard = true;
            }
            let normalized = normalize_token(&joined);
            if !normalized.is_empty() {
                out.push(Tok::Word {
                    text: normalized,
                    field,
                    wildcard,
                });
            }
            return Ok(());
        }

        for word in words {
            if word == "+" {
                out.push(Tok::Plus);
                continue;
            }

            let mut wildcard = false;
            let mut base = word;
            if let Some(stripped) = base.strip_suffix('$') {
                // Porter2 stem, then wildcard over its derivations
                base = porter2(stripped);
                wildcard = true;
            } else if let Some(stripped) = base.strip_suffix('*') {
                base = stripped.to_string();
                wildcard = true;
            } else if field == "STEM" {
                base = porter2(&base);
            }

            if !wildcard && self.stop.is_stop_word(&base) {
                // preserve word distance through elision
                out.push(Tok::Plus);
                continue;
            }

            let normalized = normalize_token(&base);
            if normalized.is_empty() {
                continue;
            }
            let parts: Vec<&str> = normalized.split(' ').collect();
            for (i, part) in parts.iter().enumerate() {
                out.push(Tok::Word {
                    text: part.to_string(),
                    field: field.clone(),
                    wildcard: wildcard && i + 1 == parts.len(),
                });
            }
        }
        Ok(())
    }
}

fn expand_range(out: &mut Vec<Tok>, field: &str, lo: i64, hi: i64) -> Result<()> {
    if lo > hi {
        return Err(Error::new(
            ErrorKind::QuerySyntax,
            format!("reversed range {}:{}", lo, hi),
        ));
    }
    if hi - lo + 1 > MAX_RANGE_SPAN {
        return Err(Error::new(
            ErrorKind::QuerySyntax,
            format!("range {}:{} spans more than {} values", lo, hi, MAX_RANGE_SPAN),
        ));
    }
    out.push(Tok::LParen);
    for (i, value) in (lo..=hi).enumerate() {
        if i > 0 {
            out.push(Tok::Or);
        }
        out.push(Tok::Word {
            text: value.to_string(),
            field: field.to_string(),
            wildcard: false,
        });
    }
    out.push(Tok::RParen);
    Ok(())
}

fn space_operators(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '(' | ')' | '&' | '|' | '!' => {
                out.push(' ');
                out.push(ch);
                out.push(' ');
            }
            '~' => {
                out.push(' ');
                out.push('~');
                while chars.peek() == Some(&'~') {
                    out.push('~');
                    chars.next();
                }
                out.push(' ');
            }
            '+' => {
                out.push(' ');
                out.push('+');
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tables::AliasTables;

    fn rewriter() -> Rewriter {
        Rewriter::new(TableContext::preloaded(AliasTables::empty()))
    }

    fn word(text: &str, field: &str, wildcard: bool) -> Tok {
        Tok::Word {
            text: text.to_string(),
            field: field.to_string(),
            wildcard,
        }
    }

    #[test]
    fn operators_unify_and_clauses_split() {
        let toks = rewriter().rewrite("fox AND hedgehog OR badger").unwrap();
        assert_eq!(
            toks,
            vec![
                word("fox", "TIAB", false),
                Tok::And,
                word("hedgehog", "TIAB", false),
                Tok::Or,
                word("badger", "TIAB", false),
            ]
        );
    }

    #[test]
    fn stop_words_become_skips_in_text_fields() {
        let toks = rewriter().rewrite("quick the brown").unwrap();
        assert_eq!(
            toks,
            vec![
                word("quick", "TIAB", false),
                Tok::Plus,
                word("brown", "TIAB", false),
            ]
        );
        // no elision outside text fields
        let year = rewriter().rewrite("the [YEAR]").unwrap();
        assert_eq!(year, vec![word("the", "YEAR", false)]);
    }

    #[test]
    fn field_qualifier_attaches_to_the_clause() {
        let toks = rewriter().rewrite("heat shock [TITL]").unwrap();
        assert_eq!(
            toks,
            vec![word("heat", "TITL", false), word("shock", "TITL", false)]
        );
        let attached = rewriter().rewrite("fox[titl]").unwrap();
        assert_eq!(attached, vec![word("fox", "TITL", false)]);
    }

    #[test]
    fn year_ranges_expand_to_or_groups() {
        let toks = rewriter().rewrite("1989:1991 [YEAR]").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::LParen,
                word("1989", "YEAR", false),
                Tok::Or,
                word("1990", "YEAR", false),
                Tok::Or,
                word("1991", "YEAR", false),
                Tok::RParen,
            ]
        );
        assert!(rewriter().rewrite("1991:1989 [YEAR]").is_err());
    }

    #[test]
    fn wildcard_and_stem_suffixes() {
        let toks = rewriter().rewrite("transpos* mutation$").unwrap();
        assert_eq!(toks[0], word("transpos", "TIAB", true));
        // mutation$ stems to mutat, then wildcards
        assert_eq!(toks[1], word("mutat", "TIAB", true));
    }

    #[test]
    fn tilde_runs_become_proximity_tokens() {
        let toks = rewriter().rewrite("alpha ~~ beta").unwrap();
        assert_eq!(toks[1], Tok::Prox(2));
        let one = rewriter().rewrite("alpha~beta").unwrap();
        assert_eq!(one[1], Tok::Prox(1));
    }

    #[test]
    fn mesh_names_resolve_to_tree_wildcards() {
        let mut tables = AliasTables::empty();
        tables
            .mesh_names
            .insert("neoplasms".to_string(), vec!["C04".to_string(), "C04.557".to_string()]);
        let rewriter = Rewriter::new(TableContext::preloaded(tables));
        let toks = rewriter.rewrite("neoplasms [MESH]").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::LParen,
                word("c04", "TREE", true),
                Tok::Or,
                word("c04557", "TREE", true),
                Tok::RParen,
            ]
        );
    }

    #[test]
    fn hyphenated_words_split_into_adjacent_terms() {
        let toks = rewriter().rewrite("heat-shock").unwrap();
        assert_eq!(
            toks,
            vec![word("heat", "TIAB", false), word("shock", "TIAB", false)]
        );
    }

    #[test]
    fn non_text_fields_take_one_literal_term() {
        // no alias entry: the clause falls through as a compound key
        let mesh = rewriter().rewrite("heat-shock proteins [MESH]").unwrap();
        assert_eq!(mesh, vec![word("heat shock proteins", "MESH", false)]);

        let auth = rewriter().rewrite("de-la-cruz [AUTH]").unwrap();
        assert_eq!(auth, vec![word("de la cruz", "AUTH", false)]);

        let wild = rewriter().rewrite("heat sho* [MESH]").unwrap();
        assert_eq!(wild, vec![word("heat sho", "MESH", true)]);
    }

    #[test]
    fn empty_queries_are_rejected() {
        assert!(rewriter().rewrite("").is_err());
        assert!(rewriter().rewrite("  '' ").is_err());
    }
}
