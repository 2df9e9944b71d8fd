use rayon::prelude::*;

use crate::core::error::{Error, ErrorKind, Result};
use crate::postings::reader::{PositionedPostings, PostingsReader};
use crate::query::ast::{Phrase, Query};

/// Sorted merge-join keeping identifiers common to both vectors.
pub fn intersect(a: &[i32], b: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            i += 1;
        } else if a[i] > b[j] {
            j += 1;
        } else {
            out.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    out
}

/// Sorted merge-join keeping all identifiers once.
pub fn union(a: &[i32], b: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else if a[i] > b[j] {
            out.push(b[j]);
            j += 1;
        } else {
            out.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// `a \ b` by sorted merge.
pub fn exclude(a: &[i32], b: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(a.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else if a[i] > b[j] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out
}

/// Positional merge-join: on identifier match, keep downstream positions
/// `q` with some upstream `p` satisfying `1 <= q - p <= max_gap`.
/// Identifiers whose surviving position list is empty are dropped. A
/// `max_gap` of 1 is exact phrase adjacency; elided stop words and extra
/// tildes widen it by one each.
pub fn extend_positional(
    upstream: &PositionedPostings,
    downstream: &PositionedPostings,
    max_gap: u16,
) -> PositionedPostings {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < upstream.len() && j < downstream.len() {
        let (id_a, positions_a) = &upstream[i];
        let (id_b, positions_b) = &downstream[j];
        if id_a < id_b {
            i += 1;
        } else if id_a > id_b {
            j += 1;
        } else {
            let survivors: Vec<u16> = positions_b
                .iter()
                .copied()
                .filter(|&q| {
                    positions_a
                        .iter()
                        .any(|&p| q > p && q - p <= max_gap)
                })
                .collect();
            if !survivors.is_empty() {
                out.push((*id_a, survivors));
            }
            i += 1;
            j += 1;
        }
    }
    out
}

fn union_positions(a: PositionedPostings, b: PositionedPostings) -> PositionedPostings {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    let mut next_a = a.next();
    let mut next_b = b.next();
    loop {
        match (next_a.take(), next_b.take()) {
            (Some(pa), Some(pb)) => {
                if pa.0 < pb.0 {
                    out.push(pa);
                    next_a = a.next();
                    next_b = Some(pb);
                } else if pa.0 > pb.0 {
                    out.push(pb);
                    next_a = Some(pa);
                    next_b = b.next();
                } else {
                    let (id, mut positions) = pa;
                    positions.extend(pb.1);
                    positions.sort_unstable();
                    positions.dedup();
                    out.push((id, positions));
                    next_a = a.next();
                    next_b = b.next();
                }
            }
            (Some(pa), None) => {
                out.push(pa);
                next_a = a.next();
            }
            (None, Some(pb)) => {
                out.push(pb);
                next_b = b.next();
            }
            (None, None) => break,
        }
    }
    out
}

/// Evaluates a parsed query against the postings shards, composing sorted
/// identifier vectors with merge-join operations.
pub struct Evaluator<'a> {
    pub reader: &'a PostingsReader,
}

impl<'a> Evaluator<'a> {
    pub fn new(reader: &'a PostingsReader) -> Self {
        Evaluator { reader }
    }

    /// Final results: ascending, deduplicated.
    pub fn evaluate(&self, query: &Query) -> Result<Vec<i32>> {
        let mut ids = self.eval_ids(query)?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn eval_ids(&self, query: &Query) -> Result<Vec<i32>> {
        match query {
            Query::Phrase(phrase) => {
                if phrase.words.len() == 1 {
                    let word = &phrase.words[0];
                    if word.wildcard {
                        self.reader.wildcard(&phrase.field, &word.text)
                    } else {
                        self.reader.lookup(&phrase.field, &word.text)
                    }
                } else {
                    Ok(self
                        .eval_phrase(phrase)?
                        .into_iter()
                        .map(|(id, _)| id)
                        .collect())
                }
            }
            Query::And(left, right) => {
                Ok(intersect(&self.eval_ids(left)?, &self.eval_ids(right)?))
            }
            Query::Or(left, right) => Ok(union(&self.eval_ids(left)?, &self.eval_ids(right)?)),
            Query::Not(left, right) => Ok(exclude(&self.eval_ids(left)?, &self.eval_ids(right)?)),
            Query::Prox { .. } => Ok(self
                .eval_positions(query)?
                .into_iter()
                .map(|(id, _)| id)
                .collect()),
        }
    }

    fn eval_positions(&self, query: &Query) -> Result<PositionedPostings> {
        match query {
            Query::Phrase(phrase) => self.eval_phrase(phrase),
            Query::Or(left, right) => Ok(union_positions(
                self.eval_positions(left)?,
                self.eval_positions(right)?,
            )),
            Query::Prox {
                left,
                right,
                max_gap,
            } => Ok(extend_positional(
                &self.eval_positions(left)?,
                &self.eval_positions(right)?,
                *max_gap,
            )),
            Query::And(..) | Query::Not(..) => Err(Error::new(
                ErrorKind::QuerySyntax,
                "proximity operands must be phrases or OR groups",
            )),
        }
    }

    /// Fetch each word's postings concurrently, then fold with positional
    /// extension; a failure at any fold yields the empty result.
    fn eval_phrase(&self, phrase: &Phrase) -> Result<PositionedPostings> {
        let fetched: Vec<PositionedPostings> = phrase
            .words
            .par_iter()
            .map(|word| {
                if word.wildcard {
                    self.reader.wildcard_positions(&phrase.field, &word.text)
                } else {
                    self.reader.lookup_positions(&phrase.field, &word.text)
                }
            })
            .collect::<Result<Vec<PositionedPostings>>>()?;

        let mut parts = fetched.into_iter();
        let mut acc = match parts.next() {
            Some(first) => first,
            None => return Ok(Vec::new()),
        };
        for (word, next) in phrase.words[1..].iter().zip(parts) {
            if acc.is_empty() {
                return Ok(Vec::new());
            }
            acc = extend_positional(&acc, &next, 1 + word.skip_before);
        }
        Ok(acc)
    }
}
