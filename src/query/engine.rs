use std::io::{BufRead, Write};

use crate::core::config::Config;
use crate::core::error::Result;
use crate::postings::reader::PostingsReader;
use crate::query::eval::Evaluator;
use crate::query::parser::parse;
use crate::query::rewrite::Rewriter;
use crate::query::tables::TableContext;

/// The query path: query string -> rewriter -> parser -> evaluator ->
/// sorted identifier list over the on-disk postings shards.
pub struct SearchEngine {
    pub reader: PostingsReader,
    pub rewriter: Rewriter,
}

impl SearchEngine {
    pub fn new(config: &Config) -> Self {
        SearchEngine {
            reader: PostingsReader::new(config.postings_dir()),
            rewriter: Rewriter::new(TableContext::new(config.data_dir())),
        }
    }

    /// Ascending, deduplicated identifiers matching the query.
    pub fn search(&self, query: &str) -> Result<Vec<i32>> {
        let tokens = self.rewriter.rewrite(query)?;
        let ast = parse(&tokens)?;
        Evaluator::new(&self.reader).evaluate(&ast)
    }

    /// Stream results as newline-terminated decimal identifiers.
    pub fn search_to(&self, query: &str, out: &mut impl Write) -> Result<usize> {
        let uids = self.search(query)?;
        for uid in &uids {
            writeln!(out, "{}", uid)?;
        }
        Ok(uids.len())
    }
}

/// Newline-terminated UID list from standard input (link and verify
/// operations); malformed lines are logged and skipped.
pub fn read_uid_list(input: impl BufRead) -> Result<Vec<i32>> {
    let mut uids = Vec::new();
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<i32>() {
            Ok(uid) if uid >= 0 => uids.push(uid),
            _ => eprintln!("skipping malformed identifier: {:.20}", line),
        }
    }
    Ok(uids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::Corpus;
    use crate::index::docset::{InvDocument, InvEntry};
    use crate::postings::writer::PostingsWriter;
    use std::path::Path;

    fn doc(key: &str, fields: &[(&str, &[(i32, Option<&str>)])]) -> InvDocument {
        let mut doc = InvDocument::new(key);
        for (field, entries) in fields {
            doc.fields.insert(
                field.to_string(),
                entries
                    .iter()
                    .map(|(uid, pos)| InvEntry {
                        uid: *uid,
                        pos: pos.map(String::from),
                    })
                    .collect(),
            );
        }
        doc
    }

    /// id 42: title "the quick brown fox" (stop word holds position 1);
    /// id 7: alpha at 3, beta at 6; boolean fixtures aaa/bbb; a
    /// transposition family for wildcard scans.
    fn build_engine(root: &Path) -> SearchEngine {
        let config = Config::new(Corpus::Pubmed, root.to_path_buf(), root.to_path_buf());
        let writer = PostingsWriter::new(config.postings_dir());
        writer
            .write(vec![
                doc("1989", &[("YEAR", &[(42, None)])]),
                doc("1990", &[("YEAR", &[(7, None)])]),
                doc("aaa", &[("TIAB", &[(1, None), (2, None), (3, None), (4, None)])]),
                doc("alpha", &[("TIAB", &[(7, Some("3"))])]),
                doc("bbb", &[("TIAB", &[(3, None), (4, None), (5, None), (6, None)])]),
                doc("beta", &[("TIAB", &[(7, Some("6"))])]),
                doc(
                    "brown",
                    &[("TIAB", &[(42, Some("3"))]), ("TITL", &[(42, Some("3"))])],
                ),
                doc(
                    "fox",
                    &[("TIAB", &[(42, Some("4"))]), ("TITL", &[(42, Some("4"))])],
                ),
                doc(
                    "quick",
                    &[("TIAB", &[(42, Some("2"))]), ("TITL", &[(42, Some("2"))])],
                ),
                doc("transporter", &[("TIAB", &[(12, Some("1")), (13, Some("5"))])]),
                doc("transpose", &[("TIAB", &[(11, Some("2")), (30, Some("4"))])]),
                doc("transposition", &[("TIAB", &[(12, Some("9"))])]),
            ])
            .unwrap();
        SearchEngine::new(&config)
    }

    #[test]
    fn boolean_queries() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("aaa & bbb").unwrap(), vec![3, 4]);
        assert_eq!(engine.search("aaa | bbb").unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(engine.search("aaa ! bbb").unwrap(), vec![1, 2]);
        assert_eq!(engine.search("aaa AND bbb").unwrap(), vec![3, 4]);
    }

    #[test]
    fn phrase_spans_an_elided_stop_word() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("quick brown").unwrap(), vec![42]);
        // "the" becomes a skip that still admits the adjacent pair
        assert_eq!(engine.search("quick the brown").unwrap(), vec![42]);
        assert_eq!(engine.search("brown quick").unwrap(), Vec::<i32>::new());
        // every phrase hit appears in each word's postings
        assert_eq!(engine.search("quick brown fox").unwrap(), vec![42]);
    }

    #[test]
    fn wildcard_unions_matching_terms() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("transpos*").unwrap(), vec![11, 12, 30]);
        assert_eq!(engine.search("transpor*").unwrap(), vec![12, 13]);
        assert_eq!(engine.search("tran*").unwrap(), vec![11, 12, 13, 30]);
    }

    #[test]
    fn proximity_distances() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("alpha ~~ beta").unwrap(), vec![7]);
        assert_eq!(engine.search("alpha ~ beta").unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn field_qualified_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("fox [TITL]").unwrap(), vec![42]);
        assert_eq!(engine.search("alpha [TITL]").unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn year_range_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("1989:1991 [YEAR]").unwrap(), vec![7, 42]);
        assert_eq!(engine.search("1989 [YEAR]").unwrap(), vec![42]);
    }

    #[test]
    fn missing_terms_and_shards_are_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        assert_eq!(engine.search("nonexistent").unwrap(), Vec::<i32>::new());
        assert_eq!(engine.search("zzz*").unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn syntax_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        let err = engine.search("( aaa & bbb").unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuerySyntax);
        assert!(engine.search("aaa &").is_err());
    }

    #[test]
    fn results_stream_as_decimal_lines() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build_engine(dir.path());
        let mut out = Vec::new();
        let count = engine.search_to("aaa & bbb", &mut out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "3\n4\n");
    }

    #[test]
    fn uid_lists_parse_from_stdin_format() {
        let input = b"42\n\n7\nbogus\n13\n" as &[u8];
        assert_eq!(read_uid_list(input).unwrap(), vec![42, 7, 13]);
    }

    /// A hyphenated source token and its queries, through the inverter's
    /// own normalization: text occurrences split into adjacent words,
    /// position-free fields keep the compound key.
    #[test]
    fn hyphenated_compounds_match_across_index_and_query() {
        use crate::core::types::Uid;
        use crate::index::docset::IdxDocument;
        use crate::index::invert::Inverter;

        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Corpus::Pubmed, dir.path().to_path_buf(), dir.path().to_path_buf());

        let mut doc = IdxDocument::new(Uid(88));
        doc.add("TIAB", Some("5".to_string()), "heat-shock");
        doc.add("MESH", None, "Heat-Shock Proteins");
        let inverted = Inverter::invert(&[doc]);
        PostingsWriter::new(config.postings_dir())
            .write(inverted)
            .unwrap();

        let engine = SearchEngine::new(&config);
        assert_eq!(engine.search("heat-shock").unwrap(), vec![88]);
        assert_eq!(engine.search("heat shock").unwrap(), vec![88]);
        assert_eq!(
            engine.search("heat-shock proteins [MESH]").unwrap(),
            vec![88]
        );
    }

    /// The whole indexing path end to end: release XML through the
    /// ingestor, incremental indexer, inverter, merger, and postings
    /// writer, then queries over the result.
    #[test]
    fn full_build_then_search() {
        use crate::archive::ingest::Ingestor;
        use crate::archive::store::Archive;
        use crate::index::incremental::{BasicExtractor, IncrementalIndexer};
        use crate::index::invert::Inverter;
        use crate::postings::writer::promote_postings;
        use crate::stream::block::{BlockEnding, BlockReader, MarkupPolicy};
        use std::sync::Arc;

        fn article(pmid: i32, title: &str) -> String {
            format!(
                "<PubmedArticle><PMID>{}</PMID><Article><ArticleTitle>{}</ArticleTitle></Article></PubmedArticle>",
                pmid, title
            )
        }

        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Corpus::Pubmed, dir.path().to_path_buf(), dir.path().to_path_buf());

        let xml = format!(
            "<PubmedArticleSet>{}{}{}</PubmedArticleSet>",
            article(12345, "the quick brown fox"),
            article(12399, "fox hunting season"),
            article(70010, "zebra stripes develop early")
        );
        let archive = Arc::new(Archive::new(config.clone()));
        let ingestor = Ingestor::new(Arc::clone(&archive), "PubmedArticle", "PMID", "pmid");
        let blocks = BlockReader::from_bytes(
            xml.into_bytes(),
            BlockEnding::Element,
            MarkupPolicy::Strict,
        );
        assert_eq!(ingestor.ingest(blocks).unwrap().stored, 3);

        let indexer = IncrementalIndexer::new(Archive::new(config.clone()), BasicExtractor::new());
        let outcome = indexer.run().unwrap();
        assert_eq!(outcome.written, 2); // two leaf shards

        let groups = Inverter::invert_working(&config).unwrap();
        assert_eq!(groups.len(), 1); // all ids fall in group 000

        let summary = promote_postings(&config).unwrap();
        assert!(summary.terms > 0);

        let engine = SearchEngine::new(&config);
        assert_eq!(engine.search("quick brown").unwrap(), vec![12345]);
        assert_eq!(engine.search("fox").unwrap(), vec![12345, 12399]);
        assert_eq!(engine.search("fox ! hunting").unwrap(), vec![12345]);
        assert_eq!(engine.search("zebra | quick").unwrap(), vec![12345, 70010]);
        assert_eq!(engine.search("fox & zebra").unwrap(), Vec::<i32>::new());
    }
}
