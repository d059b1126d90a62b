/*!
 * Deterministic chunking of decoded text
 *
 * Chunk sizes and offsets count Unicode scalar values, so a boundary never
 * falls inside a multi-byte character.
 */

use crate::ensure;
use crate::error::Result;
use crate::types::Chunk;

/// Iterator over the chunks of one text
pub struct Chunks<'a> {
    rest: &'a str,
    size: usize,
    index: usize,
    offset: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let split = self
            .rest
            .char_indices()
            .nth(self.size)
            .map_or(self.rest.len(), |(byte_pos, _)| byte_pos);
        let (text, rest) = self.rest.split_at(split);

        let chunk = Chunk {
            index: self.index,
            offset: self.offset,
            text,
        };

        self.rest = rest;
        self.index += 1;
        self.offset += text.chars().count();
        Some(chunk)
    }
}

/// Split `text` into consecutive chunks of `size` characters
///
/// The last chunk holds the remainder; no empty chunk is ever produced.
pub fn chunk_text(text: &str, size: usize) -> Result<Chunks<'_>> {
    ensure!(size > 0, InvalidArgument, "chunk size must be positive");

    Ok(Chunks {
        rest: text,
        size,
        index: 0,
        offset: 0,
    })
}
