use crate::core::error::{Error, ErrorKind, Result};

/// Record identifier. Non-negative, compared numerically ascending.
/// Postings and query results carry it as a 32-bit signed integer; on-disk
/// paths use the zero-padded decimal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub i32);

impl Uid {
    pub fn new(id: i32) -> Self {
        Uid(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn parse(text: &str) -> Result<Self> {
        let id: i32 = text.trim().parse()?;
        if id < 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("negative record identifier {}", id),
            ));
        }
        Ok(Uid(id))
    }
}

impl From<i32> for Uid {
    fn from(id: i32) -> Self {
        Uid(id)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Corpus families with their on-disk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    Pubmed,
    Pmc,
    Taxonomy,
}

impl Corpus {
    /// Canonical zero-padding width for identifiers of this corpus.
    pub fn pad_width(&self) -> usize {
        match self {
            Corpus::Pubmed => 8,
            Corpus::Taxonomy => 8,
            Corpus::Pmc => 10,
        }
    }

    /// File suffix for archived records.
    pub fn suffix(&self) -> &'static str {
        match self {
            Corpus::Pubmed => ".xml",
            Corpus::Pmc => ".xml",
            Corpus::Taxonomy => ".txt",
        }
    }

    /// Environment variable prefix (`PUBMED_MASTER`, `PMC_WORKING`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Corpus::Pubmed => "PUBMED",
            Corpus::Pmc => "PMC",
            Corpus::Taxonomy => "TAXONOMY",
        }
    }

    /// Identifier count covered by one inverted-file group.
    pub fn invert_group_span(&self) -> i32 {
        match self {
            Corpus::Pubmed => 250_000,
            Corpus::Pmc => 250_000,
            Corpus::Taxonomy => 50_000,
        }
    }

    /// File-name family for inverted groups (`pubmed013.inv.gz`).
    pub fn family(&self) -> &'static str {
        match self {
            Corpus::Pubmed => "pubmed",
            Corpus::Pmc => "pmc",
            Corpus::Taxonomy => "taxonomy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_parse_rejects_negative() {
        assert!(Uid::parse("-3").is_err());
        assert_eq!(Uid::parse(" 2539311\n").unwrap(), Uid(2539311));
    }

    #[test]
    fn corpus_parameters() {
        assert_eq!(Corpus::Pubmed.pad_width(), 8);
        assert_eq!(Corpus::Pmc.pad_width(), 10);
        assert_eq!(Corpus::Taxonomy.suffix(), ".txt");
    }
}
