use std::sync::Arc;

use crate::archive::lock::RootLock;
use crate::archive::store::Archive;
use crate::core::types::Uid;
use crate::core::error::Result;
use crate::stream::block::BlockReader;
use crate::stream::partition::Partitioner;
use crate::stream::pipeline::{self, PipelineOpts};
use crate::xml::node::XmlArena;
use crate::xml::normalize::RecordNormalizer;
use crate::xml::parser::parse_into;
use crate::xml::validate::validate;

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub stored: usize,
    pub skipped: usize,
}

/// Streams release files into the archive: partition on the record
/// element, validate and normalize each record in the worker pool, then
/// store in arrival order so version indices stay monotone.
pub struct Ingestor {
    pub archive: Arc<Archive>,
    pub pattern: String,
    pub id_element: String,
    pub id_attribute: String,
}

impl Ingestor {
    pub fn new(archive: Arc<Archive>, pattern: &str, id_element: &str, id_attribute: &str) -> Self {
        Ingestor {
            archive,
            pattern: pattern.to_string(),
            id_element: id_element.to_string(),
            id_attribute: id_attribute.to_string(),
        }
    }

    pub fn ingest(&self, blocks: BlockReader) -> Result<IngestOutcome> {
        std::fs::create_dir_all(self.archive.config.archive_dir())?;
        let _owner = RootLock::acquire(&self.archive.config.master)?;

        let records = Partitioner::new(&self.pattern).stream(blocks);
        let opts = PipelineOpts::from(&self.archive.config);
        let farm_size = self.archive.config.farm_size;
        let id_element = self.id_element.clone();
        let normalizer = Arc::new(RecordNormalizer::new(&self.id_element, &self.id_attribute));

        let results = pipeline::run(records, opts, move |record: String| {
            prepare_record(&record, &normalizer, &id_element, farm_size)
        });

        let mut outcome = IngestOutcome::default();
        let mut index = 0u64;
        for prepared in results.iter() {
            index += 1;
            match prepared {
                Some((uid, text)) => match self.archive.put(uid, &text, index) {
                    Ok(()) => outcome.stored += 1,
                    Err(err) => {
                        eprintln!("failed to store record {}: {}", uid, err);
                        outcome.skipped += 1;
                    }
                },
                None => outcome.skipped += 1,
            }
        }
        if self.archive.config.verbose {
            eprintln!("ingest: {} stored, {} skipped", outcome.stored, outcome.skipped);
        }
        Ok(outcome)
    }
}

fn prepare_record(
    record: &str,
    normalizer: &RecordNormalizer,
    id_element: &str,
    farm_size: usize,
) -> Option<(Uid, String)> {
    let report = validate(record);
    if !report.is_clean() {
        eprintln!("skipping malformed record: {}", report.issues[0]);
        return None;
    }

    let text = match normalizer.normalize(record) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("skipping record: {}", err);
            return None;
        }
    };

    let mut arena = XmlArena::new(farm_size);
    let root = parse_into(&mut arena, &text).ok()?;
    let uid_node = arena.find_child(root, id_element)?;
    match Uid::parse(&arena.node(uid_node).content) {
        Ok(uid) => Some((uid, text)),
        Err(err) => {
            eprintln!("skipping record without identifier: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::types::Corpus;
    use crate::stream::block::{BlockEnding, MarkupPolicy};

    fn ingest_set(xml: &str) -> (tempfile::TempDir, Arc<Archive>, IngestOutcome) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(Corpus::Pubmed, dir.path().to_path_buf(), dir.path().to_path_buf());
        let archive = Arc::new(Archive::new(config));
        let ingestor = Ingestor::new(Arc::clone(&archive), "PubmedArticle", "PMID", "pmid");
        let blocks = BlockReader::from_bytes(
            xml.as_bytes().to_vec(),
            BlockEnding::Element,
            MarkupPolicy::Strict,
        );
        let outcome = ingestor.ingest(blocks).unwrap();
        (dir, archive, outcome)
    }

    #[test]
    fn stores_each_record_under_its_identifier() {
        let xml = "<PubmedArticleSet>\
            <PubmedArticle><PMID>12345</PMID><T>one</T></PubmedArticle>\
            <PubmedArticle><PMID>12399</PMID><T>two</T></PubmedArticle>\
            </PubmedArticleSet>";
        let (_dir, archive, outcome) = ingest_set(xml);
        assert_eq!(outcome.stored, 2);
        assert_eq!(outcome.skipped, 0);
        assert!(archive.get(Uid(12345)).unwrap().contains("<T>one</T>"));
        assert!(archive.get(Uid(12399)).unwrap().contains("<T>two</T>"));
    }

    #[test]
    fn rescues_identifier_from_the_root_attribute() {
        let xml = "<PubmedArticleSet>\
            <PubmedArticle pmid=\"777\"><T>attr only</T></PubmedArticle>\
            </PubmedArticleSet>";
        let (_dir, archive, outcome) = ingest_set(xml);
        assert_eq!(outcome.stored, 1);
        assert!(archive.get(Uid(777)).unwrap().contains("<PMID>777</PMID>"));
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let xml = "<PubmedArticleSet>\
            <PubmedArticle><PMID>1</PMID><T>good</T></PubmedArticle>\
            <PubmedArticle><PMID>2</PMID><Broken></PubmedArticle>\
            <PubmedArticle><T>no identifier</T></PubmedArticle>\
            </PubmedArticleSet>";
        let (_dir, archive, outcome) = ingest_set(xml);
        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.skipped, 2);
        assert!(archive.get(Uid(1)).is_ok());
    }
}
