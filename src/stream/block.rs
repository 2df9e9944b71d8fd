use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::core::error::Result;

/// Fresh bytes requested per block; the residue carried from the previous
/// block rides on top, bounded by the carry allowance.
pub const BLOCK_TARGET: usize = 64 * 1024;
pub const CARRY_ALLOWANCE: usize = 16 * 1024;

/// What terminates an element for trimming purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnding {
    Element, // right angle bracket (XML)
    Line,    // newline (flatfiles)
}

/// Recognized trimming options: strict skips inline HTML/MathML tags when
/// searching backward for a terminator, mixed allows mixed content,
/// cleanup additionally compresses whitespace runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupPolicy {
    Strict,
    Mixed,
    Cleanup,
}

/// Reads bytes from a source and emits ordered string blocks, each ending
/// exactly at the last element terminator. Residual bytes are prepended to
/// the next block. `None` signals end of stream; a non-terminating tail at
/// end of input is dropped as truncated.
pub struct BlockReader {
    source: Box<dyn Read + Send>,
    ending: BlockEnding,
    policy: MarkupPolicy,
    carry: Vec<u8>,
    done: bool,
}

impl BlockReader {
    pub fn new(source: Box<dyn Read + Send>, ending: BlockEnding, policy: MarkupPolicy) -> Self {
        BlockReader {
            source,
            ending,
            policy,
            carry: Vec::new(),
            done: false,
        }
    }

    /// Open a file, transparently decoding gzip (sniffed by magic bytes).
    pub fn from_file(path: &Path, ending: BlockEnding, policy: MarkupPolicy) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 2];
        let read_len = file.read(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        let source: Box<dyn Read + Send> = if read_len == 2 && magic == [0x1f, 0x8b] {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BlockReader::new(source, ending, policy))
    }

    pub fn from_bytes(data: Vec<u8>, ending: BlockEnding, policy: MarkupPolicy) -> Self {
        BlockReader::new(Box::new(std::io::Cursor::new(data)), ending, policy)
    }

    pub fn from_stdin(ending: BlockEnding, policy: MarkupPolicy) -> Self {
        BlockReader::new(Box::new(std::io::stdin()), ending, policy)
    }

    /// Next block, or `None` at end of stream. An underlying read error
    /// terminates the stream after what is buffered has been emitted.
    pub fn next_block(&mut self) -> Option<String> {
        loop {
            if self.done && self.carry.is_empty() {
                return None;
            }

            let mut buf = std::mem::take(&mut self.carry);
            let base = buf.len();
            if !self.done {
                let mut chunk = vec![0u8; BLOCK_TARGET];
                let mut fresh = 0;
                while fresh < BLOCK_TARGET {
                    match self.source.read(&mut chunk[fresh..]) {
                        Ok(0) => {
                            self.done = true;
                            break;
                        }
                        Ok(n) => fresh += n,
                        Err(err) => {
                            eprintln!("block stream read error: {}", err);
                            self.done = true;
                            break;
                        }
                    }
                }
                buf.extend_from_slice(&chunk[..fresh]);
            }
            if buf.is_empty() {
                return None;
            }

            match self.trim_index(&buf) {
                Some(cut) => {
                    self.carry = buf.split_off(cut + 1);
                    return Some(self.finish_block(buf));
                }
                None => {
                    if self.done {
                        // no terminator before EOF: truncated input, drop it
                        return None;
                    }
                    if base >= CARRY_ALLOWANCE + BLOCK_TARGET {
                        // pathological input without terminators; emit as-is
                        // rather than buffering without bound
                        return Some(self.finish_block(buf));
                    }
                    self.carry = buf;
                }
            }
        }
    }

    fn finish_block(&self, buf: Vec<u8>) -> String {
        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        };
        if self.policy == MarkupPolicy::Cleanup {
            compress_spaces(&text)
        } else {
            text
        }
    }

    /// Index of the byte to cut after, searching backward.
    fn trim_index(&self, buf: &[u8]) -> Option<usize> {
        match self.ending {
            BlockEnding::Line => buf.iter().rposition(|&b| b == b'\n'),
            BlockEnding::Element => {
                let mut limit = buf.len();
                loop {
                    let gt = buf[..limit].iter().rposition(|&b| b == b'>')?;
                    if self.policy != MarkupPolicy::Strict || !closes_inline_tag(buf, gt) {
                        return Some(gt);
                    }
                    limit = gt;
                }
            }
        }
    }
}

/// True when the `>` at `gt` ends an inline-markup tag (`<i>`, `</sub>`,
/// MathML, ...) that a strict streamer must not cut behind.
fn closes_inline_tag(buf: &[u8], gt: usize) -> bool {
    let Some(lt) = buf[..gt].iter().rposition(|&b| b == b'<') else {
        return false;
    };
    let mut name = &buf[lt + 1..gt];
    if let Some(stripped) = name.strip_prefix(b"/") {
        name = stripped;
    }
    let end = name
        .iter()
        .position(|&b| b == b' ' || b == b'/' || b == b'\t')
        .unwrap_or(name.len());
    let name = &name[..end];
    matches!(
        name,
        b"i" | b"b" | b"u" | b"em" | b"strong" | b"sub" | b"sup"
    ) || name.starts_with(b"mml:")
        || name.starts_with(b"math")
}

fn compress_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            in_run = false;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(mut reader: BlockReader) -> Vec<String> {
        let mut blocks = Vec::new();
        while let Some(block) = reader.next_block() {
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn blocks_end_at_terminator() {
        let data = b"<A>one</A>\n<B>two</B>\ntail-without-close".to_vec();
        let blocks = collect(BlockReader::from_bytes(
            data,
            BlockEnding::Element,
            MarkupPolicy::Mixed,
        ));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].ends_with("</B>"));
        // the unterminated tail is dropped
    }

    #[test]
    fn line_ending_mode() {
        let data = b"one\ntwo\nthree".to_vec();
        let blocks = collect(BlockReader::from_bytes(
            data,
            BlockEnding::Line,
            MarkupPolicy::Mixed,
        ));
        assert_eq!(blocks.concat(), "one\ntwo\n");
    }

    #[test]
    fn strict_mode_skips_inline_markup() {
        let data = b"<T>TGF-<i>beta</i".to_vec();
        let reader = BlockReader::from_bytes(data, BlockEnding::Element, MarkupPolicy::Strict);
        let blocks = collect(reader);
        // the only full terminators close <T> and <i>; strict refuses to cut
        // after <i> so the block ends at <T>
        assert_eq!(blocks, vec!["<T>".to_string()]);
    }

    #[test]
    fn carry_spans_reads() {
        let mut data = Vec::new();
        for i in 0..5000 {
            data.extend_from_slice(format!("<Rec>{}</Rec>", i).as_bytes());
        }
        let blocks = collect(BlockReader::from_bytes(
            data.clone(),
            BlockEnding::Element,
            MarkupPolicy::Mixed,
        ));
        assert!(blocks.len() > 1);
        assert_eq!(blocks.concat().as_bytes(), &data[..]);
    }

    #[test]
    fn cleanup_compresses_spaces() {
        let data = b"<T>a    b</T>".to_vec();
        let blocks = collect(BlockReader::from_bytes(
            data,
            BlockEnding::Element,
            MarkupPolicy::Cleanup,
        ));
        assert_eq!(blocks[0], "<T>a b</T>");
    }
}
