//! Source-position records and the byte-indexed maps that bridge the three
//! text representations (original, normalized, mapped).
//!
//! Every byte of normalized text has a [`SourceLocation`]; every byte of
//! mapped text has a normalized offset. Composing the two maps yields
//! original coordinates for any byte a later stage references.

/// Position of one normalized byte in the original file.
///
/// `orig_length` is the byte length of the original UTF-8 character when the
/// entry describes the character's first byte, and 0 for continuation bytes.
/// Synthetic entries (characters inserted by the normalizer) carry zeroed
/// coordinates and `is_synthetic = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub orig_line: u32,
    pub orig_column: u32,
    pub orig_length: u32,
    pub is_synthetic: bool,
}

impl SourceLocation {
    pub fn synthetic() -> Self {
        SourceLocation {
            orig_line: 0,
            orig_column: 0,
            orig_length: 0,
            is_synthetic: true,
        }
    }
}

/// Provenance of one byte of rewritten text: either a byte offset into the
/// previous representation or a marker for inserted characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prov {
    Orig(u32),
    Synthetic,
}

/// Map from normalized byte offset to original coordinates. The original
/// text and per-byte offsets are kept so rewritten-identifier spans can be
/// recovered by scanning the original range.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub locs: Vec<SourceLocation>,
    offsets: Vec<Option<u32>>,
    original: String,
}

/// Map from mapped byte offset to normalized byte offset. All bytes of a
/// rewritten identifier map to the first byte of the original identifier.
pub type OffsetMap = Vec<usize>;

/// Precomputed line starts of the original source, for byte -> (line, column)
/// conversion. Lines and columns are 1-based; columns count characters, not
/// bytes, matching the coordinates shown in diagnostics.
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            source,
            line_starts,
        }
    }

    /// Line (1-based) containing the byte at `offset`.
    pub fn line_of(&self, offset: usize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line as u32 + 1,
            Err(line) => line as u32,
        }
    }

    /// (line, column, char_len) of the byte at `offset`. For a UTF-8
    /// continuation byte the column is that of the containing character and
    /// the length is 0.
    pub fn locate(&self, offset: usize) -> (u32, u32, u32) {
        let line = self.line_of(offset);
        let line_start = self.line_starts[line as usize - 1];

        let mut column = 1u32;
        let mut char_len = 0u32;
        let mut found_continuation = false;
        let bytes = self.source.as_bytes();

        let mut i = line_start;
        while i < offset.min(bytes.len()) {
            let len = utf8_len(bytes[i]);
            if i + len > offset {
                // `offset` lands inside this character.
                found_continuation = true;
                break;
            }
            i += len;
            column += 1;
        }
        if !found_continuation && offset < bytes.len() {
            char_len = utf8_len(bytes[offset]) as u32;
        }
        (line, column, char_len)
    }

    /// The full text of the (1-based) line, without the trailing newline.
    pub fn line_text(&self, line: u32) -> Option<&'a str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|s| s - 1)
            .unwrap_or(self.source.len());
        self.source.get(start..end)
    }
}

/// Byte length of the UTF-8 character starting with `first`. Continuation
/// bytes report 1 so scanning always advances.
pub fn utf8_len(first: u8) -> usize {
    if first >= 0xF0 {
        4
    } else if first >= 0xE0 {
        3
    } else if first >= 0xC0 {
        2
    } else {
        1
    }
}

fn ident_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric() || b >= 0x80
}

impl SourceMap {
    /// Build the normalized-byte -> original-coordinate map from the
    /// provenance vector the normalizer threads through its rewrites.
    pub fn from_provenance(original: &str, prov: &[Prov]) -> Self {
        let index = LineIndex::new(original);
        let locs = prov
            .iter()
            .map(|p| match *p {
                Prov::Synthetic => SourceLocation::synthetic(),
                Prov::Orig(off) => {
                    let (line, column, len) = index.locate(off as usize);
                    SourceLocation {
                        orig_line: line,
                        orig_column: column,
                        orig_length: len,
                        is_synthetic: false,
                    }
                }
            })
            .collect();
        let offsets = prov
            .iter()
            .map(|p| match *p {
                Prov::Synthetic => None,
                Prov::Orig(off) => Some(off),
            })
            .collect();
        SourceMap {
            locs,
            offsets,
            original: original.to_string(),
        }
    }

    /// Byte length of the identifier starting at `offset` in the original
    /// text, or 0 when no identifier starts there.
    fn ident_run_len(&self, offset: usize) -> u32 {
        let bytes = self.original.as_bytes();
        let mut end = offset;
        while end < bytes.len() && ident_byte(bytes[end]) {
            end += 1;
        }
        (end - offset) as u32
    }

    pub fn len(&self) -> usize {
        self.locs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    pub fn get(&self, norm_offset: usize) -> Option<&SourceLocation> {
        self.locs.get(norm_offset)
    }

    /// Location for `norm_offset`, scanning backwards past synthetic entries
    /// so tokens that start on an inserted character still point somewhere
    /// real. Returns a synthetic location only if nothing earlier is real.
    pub fn resolve(&self, norm_offset: usize) -> SourceLocation {
        if let Some(loc) = self.locs.get(norm_offset) {
            if !loc.is_synthetic {
                return *loc;
            }
        }
        for i in (0..norm_offset.min(self.locs.len())).rev() {
            if !self.locs[i].is_synthetic {
                return self.locs[i];
            }
        }
        SourceLocation::synthetic()
    }

    /// Original span for a token occupying `mapped_start..mapped_start + len`
    /// in the mapped text.
    ///
    /// When every byte of the token resolves to the same normalized byte (a
    /// rewritten identifier), the span length is the original identifier's
    /// length from the single map entry. When the token stays on one line the
    /// length is the column span; across lines it is the sum of per-byte
    /// lengths. This heuristic can widen the reported range slightly when the
    /// token mixes rewritten and literal bytes.
    pub fn resolve_span(
        &self,
        offset_map: &OffsetMap,
        mapped_start: usize,
        mapped_len: usize,
    ) -> SourceLocation {
        let Some(&first_norm) = offset_map.get(mapped_start) else {
            return SourceLocation::synthetic();
        };
        let first = self.resolve(first_norm);
        if first.is_synthetic {
            return SourceLocation::synthetic();
        }

        let mut all_same_pos = true;
        let mut last: Option<SourceLocation> = None;
        let mut byte_sum = 0u32;
        for k in 0..mapped_len {
            let Some(&norm) = offset_map.get(mapped_start + k) else {
                continue;
            };
            if let Some(loc) = self.locs.get(norm) {
                if !loc.is_synthetic && loc.orig_line > 0 {
                    if norm != first_norm {
                        all_same_pos = false;
                    }
                    byte_sum += loc.orig_length;
                    last = Some(*loc);
                }
            }
        }
        let last = last.unwrap_or(first);

        let length = if all_same_pos {
            // A rewritten identifier: every byte maps to the first byte of
            // the original; its full span is recovered by scanning.
            let scanned = offset_map
                .get(mapped_start)
                .and_then(|&norm| self.offsets.get(norm).copied().flatten())
                .map(|off| self.ident_run_len(off as usize))
                .unwrap_or(0);
            if scanned > 0 {
                scanned
            } else {
                first.orig_length
            }
        } else if first.orig_line == last.orig_line {
            (last.orig_column - first.orig_column) + last.orig_length
        } else if byte_sum > 0 {
            byte_sum
        } else {
            mapped_len as u32
        };

        SourceLocation {
            orig_line: first.orig_line,
            orig_column: first.orig_column,
            orig_length: if length > 0 { length } else { mapped_len as u32 },
            is_synthetic: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_ascii() {
        let idx = LineIndex::new("ab\ncd\n");
        assert_eq!(idx.locate(0), (1, 1, 1));
        assert_eq!(idx.locate(1), (1, 2, 1));
        assert_eq!(idx.locate(3), (2, 1, 1));
        assert_eq!(idx.locate(4), (2, 2, 1));
    }

    #[test]
    fn test_line_index_multibyte_columns() {
        // "变量x" - two 3-byte characters then an ASCII x
        let src = "变量x";
        let idx = LineIndex::new(src);
        assert_eq!(idx.locate(0), (1, 1, 3));
        assert_eq!(idx.locate(3), (1, 2, 3));
        assert_eq!(idx.locate(6), (1, 3, 1));
        // Continuation byte: column of containing char, zero length
        let (line, col, len) = idx.locate(1);
        assert_eq!((line, col), (1, 1));
        assert_eq!(len, 0);
    }

    #[test]
    fn test_line_text() {
        let idx = LineIndex::new("first\nsecond\nthird");
        assert_eq!(idx.line_text(1), Some("first"));
        assert_eq!(idx.line_text(2), Some("second"));
        assert_eq!(idx.line_text(3), Some("third"));
        assert_eq!(idx.line_text(4), None);
    }

    #[test]
    fn test_from_provenance_marks_synthetic() {
        let map = SourceMap::from_provenance("x:=1", &[Prov::Orig(0), Prov::Synthetic]);
        assert!(!map.locs[0].is_synthetic);
        assert_eq!(map.locs[0].orig_line, 1);
        assert!(map.locs[1].is_synthetic);
    }

    #[test]
    fn test_resolve_skips_synthetic_backwards() {
        let map = SourceMap::from_provenance("ab", &[Prov::Orig(0), Prov::Synthetic]);
        let loc = map.resolve(1);
        assert!(!loc.is_synthetic);
        assert_eq!(loc.orig_column, 1);
    }

    #[test]
    fn test_resolve_span_rewritten_identifier() {
        // All mapped bytes point at the same normalized byte, whose entry
        // describes a 3-byte original character.
        let map = SourceMap::from_provenance("变:=1", &[Prov::Orig(0)]);
        let offsets: OffsetMap = vec![0, 0, 0, 0, 0, 0];
        let span = map.resolve_span(&offsets, 0, 6);
        assert_eq!(span.orig_line, 1);
        assert_eq!(span.orig_column, 1);
        assert_eq!(span.orig_length, 3);
    }

    #[test]
    fn test_resolve_span_plain_run() {
        let map = SourceMap::from_provenance(
            "abcd",
            &[Prov::Orig(0), Prov::Orig(1), Prov::Orig(2), Prov::Orig(3)],
        );
        let offsets: OffsetMap = vec![0, 1, 2, 3];
        let span = map.resolve_span(&offsets, 1, 3);
        assert_eq!(span.orig_column, 2);
        assert_eq!(span.orig_length, 3);
    }
}
