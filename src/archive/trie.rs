use std::path::PathBuf;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Corpus, Uid};

/// Zero-pad an identifier to the corpus width.
pub fn pad_uid(uid: Uid, corpus: Corpus) -> Result<String> {
    let width = corpus.pad_width();
    let digits = uid.0.to_string();
    if digits.len() > width {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("identifier {} exceeds pad width {}", uid, width),
        ));
    }
    Ok(format!("{:0>width$}", digits, width = width))
}

/// Archive trie: consecutive two-character segments of the padded
/// identifier, all but the last two digits, so one leaf directory holds up
/// to 100 records. Padded `02539311` becomes `02/53/93`.
pub fn archive_trie(padded: &str) -> PathBuf {
    segments(&padded[..padded.len() - 2])
}

/// Index trie, one level up from the archive trie: the directory drops the
/// last segment and the file is named by the leaf prefix. Padded
/// `02539311` becomes (`02/53`, `025393`).
pub fn index_trie(padded: &str) -> (PathBuf, String) {
    let leaf_prefix = &padded[..padded.len() - 2];
    let dir = segments(&padded[..padded.len() - 4]);
    (dir, leaf_prefix.to_string())
}

/// Link trie: fixed-width prefix of the padded source identifier.
pub fn link_trie(padded: &str) -> PathBuf {
    segments(&padded[..4.min(padded.len())])
}

fn segments(digits: &str) -> PathBuf {
    let mut path = PathBuf::new();
    let bytes = digits.as_bytes();
    let mut i = 0;
    while i + 2 <= bytes.len() {
        path.push(&digits[i..i + 2]);
        i += 2;
    }
    path
}

/// Two-character term prefixes whose shards outgrow the tabulated count and
/// extend to three characters, and three-character prefixes that extend to
/// four. The authoritative thresholds are data-driven; these are the pinned
/// values for this build.
const EXTEND_TO_3: [&str; 27] = [
    "an", "ca", "ch", "co", "de", "di", "en", "ex", "he", "hy", "in", "ma", "me", "mi", "mo",
    "ne", "no", "pa", "pe", "ph", "pr", "re", "se", "st", "su", "tr", "un",
];
const EXTEND_TO_4: [&str; 12] = [
    "ant", "car", "cel", "com", "con", "dis", "int", "mic", "pro", "rec", "sub", "tra",
];

fn required_key_len(head: &str) -> usize {
    if head.len() < 2 {
        return 1;
    }
    if !EXTEND_TO_3.contains(&&head[..2]) {
        return 2;
    }
    if head.len() < 3 {
        return 3;
    }
    if EXTEND_TO_4.contains(&&head[..3]) { 4 } else { 3 }
}

/// Postings shard key for a term: the first 1-4 characters of its leading
/// word, extended per the hot-prefix tables. Terms shorter than the
/// extended width keep their own length as the key.
pub fn postings_key(term: &str) -> Result<String> {
    let head = term.split(' ').next().unwrap_or("");
    if head.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput, "empty term has no shard key"));
    }
    let want = required_key_len(head);
    Ok(head[..want.min(head.len())].to_string())
}

/// Shard key for a wildcard prefix. A prefix too short to pin down its
/// shard (a wildcard in the high-order characters of the key) is an
/// invariant violation and fatal.
pub fn postings_key_for_prefix(prefix: &str) -> Result<String> {
    let head = prefix.split(' ').next().unwrap_or("");
    if head.is_empty() {
        return Err(Error::new(
            ErrorKind::Corrupt,
            "wildcard prefix is empty",
        ));
    }
    // a lone character cannot pin a shard: longer terms key at two or more
    let want = if head.len() < 2 {
        2
    } else {
        required_key_len(head)
    };
    if head.len() < want {
        return Err(Error::new(
            ErrorKind::Corrupt,
            format!(
                "wildcard erodes the shard key: '{}' needs {} leading characters",
                prefix, want
            ),
        ));
    }
    Ok(head[..want].to_string())
}

/// Directory trie for one postings key: one level per cumulative prefix,
/// `tran` living under `t/tr/tra/tran/`.
pub fn postings_trie(key: &str) -> PathBuf {
    let mut path = PathBuf::new();
    for end in 1..=key.len() {
        path.push(&key[..end]);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_and_archive_trie() {
        let padded = pad_uid(Uid(2539311), Corpus::Pubmed).unwrap();
        assert_eq!(padded, "02539311");
        assert_eq!(archive_trie(&padded), PathBuf::from("02/53/93"));

        let pmc = pad_uid(Uid(2539311), Corpus::Pmc).unwrap();
        assert_eq!(pmc, "0002539311");
        assert_eq!(archive_trie(&pmc), PathBuf::from("00/02/53/93"));
    }

    #[test]
    fn index_trie_is_one_level_up() {
        let (dir, prefix) = index_trie("02539311");
        assert_eq!(dir, PathBuf::from("02/53"));
        assert_eq!(prefix, "025393");
    }

    #[test]
    fn link_trie_uses_four_digits() {
        assert_eq!(link_trie("02539311"), PathBuf::from("02/53"));
    }

    #[test]
    fn postings_keys_follow_hot_prefix_tables() {
        assert_eq!(postings_key("fox").unwrap(), "fo");
        assert_eq!(postings_key("q").unwrap(), "q");
        assert_eq!(postings_key("anemia").unwrap(), "ane");
        assert_eq!(postings_key("transposon").unwrap(), "tran");
        assert_eq!(postings_key("an").unwrap(), "an");
        assert_eq!(postings_key("heat shock").unwrap(), "hea");
    }

    #[test]
    fn wildcard_must_cover_the_key() {
        assert!(postings_key_for_prefix("f").is_err());
        assert!(postings_key_for_prefix("an").is_err());
        assert_eq!(postings_key_for_prefix("ane").unwrap(), "ane");
        assert_eq!(postings_key_for_prefix("fo").unwrap(), "fo");
        assert!(postings_key_for_prefix("tra").is_err());
        assert_eq!(postings_key_for_prefix("tran").unwrap(), "tran");
    }

    #[test]
    fn postings_trie_layout() {
        assert_eq!(postings_trie("tran"), PathBuf::from("t/tr/tra/tran"));
        assert_eq!(postings_trie("q"), PathBuf::from("q"));
    }
}
