//! Identifier remapping.
//!
//! FLYUX identifiers may contain arbitrary non-ASCII bytes (Chinese, emoji,
//! ...). LLVM IR local names cannot, so every identifier containing a
//! non-ASCII byte is rewritten to a `_NNNNN` form before lexing. Pure-ASCII
//! identifiers keep their spelling and never enter the varmap, which makes
//! remapping the identity on fully-ASCII programs.
//!
//! Context decides whether an identifier is eligible at all: reserved words
//! and built-in function names are never touched, `obj.prop` member names and
//! object-literal keys keep their original bytes (the runtime looks fields up
//! by name), and a method name after `.>` is only substituted when it is
//! already in the map.

use crate::builtins;
use crate::normalize::{is_ident_byte, is_ident_start};
use crate::source_map::OffsetMap;

/// How a mapped name is used. Allocation always starts at `Unknown`; the
/// later stages never need to refine it, but the kind is kept for varmap
/// dumps and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Unknown,
    Local,
    Param,
    Global,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Unknown => "UNKNOWN",
            VarKind::Local => "LOCAL",
            VarKind::Param => "PARAM",
            VarKind::Global => "GLOBAL",
        }
    }
}

/// One varmap entry. Uniqueness key is `original`; allocation order defines
/// the numeric suffix of `mapped`.
#[derive(Debug, Clone)]
pub struct VarMapEntry {
    pub original: String,
    pub mapped: String,
    pub kind: VarKind,
}

pub struct VarMapResult {
    pub mapped_source: String,
    pub entries: Vec<VarMapEntry>,
    /// mapped byte offset -> normalized byte offset. All bytes of a rewritten
    /// identifier map to the first byte of the original identifier.
    pub offset_map: OffsetMap,
}

impl VarMapResult {
    /// Resolve a mapped name back to its original spelling (for
    /// diagnostics).
    pub fn original_of(&self, mapped: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.mapped == mapped)
            .map(|e| e.original.as_str())
    }

    /// Render the table the way `--dump-varmap` prints it.
    pub fn table_string(&self) -> String {
        let mut out = String::new();
        for (i, e) in self.entries.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} -> {} ({})\n",
                i + 1,
                e.original,
                e.mapped,
                e.kind.as_str()
            ));
        }
        out
    }
}

/// Reserved words: keywords, the digraph prefixes, type names, literals, the
/// entry point, and the `self` pseudo-identifier. Never mapped, never in the
/// varmap.
pub fn is_reserved_identifier(name: &str) -> bool {
    matches!(
        name,
        "if" | "break"
            | "next"
            | "L"
            | "R"
            | "T"
            | "B"
            | "N"
            | "num"
            | "str"
            | "bl"
            | "obj"
            | "func"
            | "true"
            | "false"
            | "null"
            | "undef"
            | "main"
            | "self"
    )
}

fn contains_non_ascii(bytes: &[u8]) -> bool {
    bytes.iter().any(|&b| b >= 0x80)
}

/// `name:` is a typed definition (`x:(num)=...`) rather than an object key
/// when an `=` appears before the next `,`, `;`, `}`, or `)` of the
/// enclosing construct. The annotation's own brackets (`:(num)`, `:[str]`)
/// are skipped over, not treated as terminators.
fn looks_like_typed_definition(text: &[u8], colon_idx: usize) -> bool {
    debug_assert!(text.get(colon_idx) == Some(&b':'));
    let mut depth = 0i32;
    for &b in &text[colon_idx + 1..] {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' if depth > 0 => depth -= 1,
            b'=' if depth == 0 => return true,
            b',' | b';' | b'}' | b')' if depth == 0 => return false,
            _ => {}
        }
    }
    false
}

/// Identifier followed by `:` inside a `L>(arr:item)` (or `L>arr:item`)
/// header is a foreach iterable, not an object key.
fn is_foreach_context(text: &[u8], ident_start: usize) -> bool {
    if ident_start < 2 {
        return false;
    }
    let mut k = ident_start - 1;
    while k > 0 && matches!(text[k], b' ' | b'\t') {
        k -= 1;
    }
    if text[k] == b'(' {
        if k == 0 {
            return false;
        }
        k -= 1;
        while k > 0 && matches!(text[k], b' ' | b'\t') {
            k -= 1;
        }
    }
    k >= 1 && text[k] == b'>' && text[k - 1] == b'L'
}

fn generate_mapped_name(index: usize) -> String {
    format!("_{index:05}")
}

/// Rewrite non-ASCII identifiers in `normalized` and build the offset map.
pub fn process(normalized: &str) -> VarMapResult {
    let text = normalized.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(normalized.len());
    let mut offset_map: OffsetMap = Vec::with_capacity(normalized.len());
    let mut entries: Vec<VarMapEntry> = Vec::new();
    let mut next_index = 1usize;

    let mut in_str = false;
    let mut quote = 0u8;
    let mut escape = false;
    let mut i = 0usize;

    fn copy_byte(out: &mut Vec<u8>, offset_map: &mut OffsetMap, b: u8, at: usize) {
        out.push(b);
        offset_map.push(at);
    }

    while i < text.len() {
        let b = text[i];

        if escape {
            copy_byte(&mut out, &mut offset_map, b, i);
            escape = false;
            i += 1;
            continue;
        }
        if b == b'\\' && in_str {
            copy_byte(&mut out, &mut offset_map, b, i);
            escape = true;
            i += 1;
            continue;
        }
        if !in_str && (b == b'"' || b == b'\'') {
            in_str = true;
            quote = b;
            copy_byte(&mut out, &mut offset_map, b, i);
            i += 1;
            continue;
        }
        if in_str {
            if b == quote {
                in_str = false;
            }
            copy_byte(&mut out, &mut offset_map, b, i);
            i += 1;
            continue;
        }

        if is_ident_start(b) {
            let start = i;
            let mut j = i + 1;
            while j < text.len() && is_ident_byte(text[j]) {
                j += 1;
            }
            let ident = &normalized[start..j];

            let before = if start > 0 { text[start - 1] } else { 0 };
            let after = if j < text.len() { text[j] } else { 0 };

            let is_method_after_chain =
                before == b'>' && start >= 2 && text[start - 2] == b'.';
            let is_property_access = !is_method_after_chain && before == b'.';

            let mut is_object_key = false;
            if after == b':' {
                let foreach = is_foreach_context(text, start);
                if !foreach && !looks_like_typed_definition(text, j) {
                    is_object_key = true;
                }
            }

            let reserved = is_reserved_identifier(ident) || builtins::is_builtin_name(ident);

            let mut replacement: Option<String> = None;
            if !reserved && !is_object_key && !is_property_access {
                if is_method_after_chain {
                    // `.>method`: substitute only when already mapped, so
                    // built-in-style methods keep their name.
                    if let Some(e) = entries.iter().find(|e| e.original == ident) {
                        replacement = Some(e.mapped.clone());
                    }
                } else if contains_non_ascii(ident.as_bytes()) {
                    let mapped = match entries.iter().find(|e| e.original == ident) {
                        Some(e) => e.mapped.clone(),
                        None => {
                            let mapped = generate_mapped_name(next_index);
                            next_index += 1;
                            entries.push(VarMapEntry {
                                original: ident.to_string(),
                                mapped: mapped.clone(),
                                kind: VarKind::Unknown,
                            });
                            mapped
                        }
                    };
                    replacement = Some(mapped);
                }
            }

            match replacement {
                Some(mapped) => {
                    for b in mapped.bytes() {
                        out.push(b);
                        offset_map.push(start);
                    }
                }
                None => {
                    for (k, b) in ident.bytes().enumerate() {
                        copy_byte(&mut out, &mut offset_map, b, start + k);
                    }
                }
            }
            i = j;
            continue;
        }

        copy_byte(&mut out, &mut offset_map, b, i);
        i += 1;
    }

    VarMapResult {
        mapped_source: String::from_utf8_lossy(&out).into_owned(),
        entries,
        offset_map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_program_is_identity() {
        let src = "x:=41+1;println(x);";
        let result = process(src);
        assert_eq!(result.mapped_source, src);
        assert!(result.entries.is_empty());
        let identity: Vec<usize> = (0..src.len()).collect();
        assert_eq!(result.offset_map, identity);
    }

    #[test]
    fn test_non_ascii_identifier_mapped() {
        let src = "变量:=1;println(变量);";
        let result = process(src);
        assert_eq!(result.mapped_source, "_00001:=1;println(_00001);");
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].original, "变量");
        assert_eq!(result.entries[0].mapped, "_00001");
    }

    #[test]
    fn test_mapped_bytes_point_at_identifier_start() {
        let src = "变:=1;";
        let result = process(src);
        assert_eq!(result.mapped_source, "_00001:=1;");
        for k in 0..6 {
            assert_eq!(result.offset_map[k], 0);
        }
        // ':' after the identifier: original offset 3 (after 3-byte char).
        assert_eq!(result.offset_map[6], 3);
    }

    #[test]
    fn test_allocation_order_defines_suffix() {
        let src = "甲:=1;乙:=2;甲:=3;";
        let result = process(src);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].mapped, "_00001");
        assert_eq!(result.entries[1].mapped, "_00002");
        assert!(result.mapped_source.starts_with("_00001:=1;_00002:=2;_00001"));
    }

    #[test]
    fn test_reserved_words_untouched() {
        let src = "if(x){R>x;};";
        let result = process(src);
        assert_eq!(result.mapped_source, src);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_property_access_never_rewritten() {
        let src = "对象:={数:1};println(对象.数);";
        let result = process(src);
        // The object variable maps; the `.数` property and the `数:` key keep
        // their original bytes.
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].original, "对象");
        assert!(result.mapped_source.contains("_00001.数"));
        assert!(result.mapped_source.contains("{数:1}"));
    }

    #[test]
    fn test_chain_method_substituted_only_when_mapped() {
        let src = "函:=(x){R>x;};y:=a.>函(1);z:=a.>length;";
        let result = process(src);
        assert!(result.mapped_source.contains(".>_00001(1)"));
        assert!(result.mapped_source.contains(".>length"));
    }

    #[test]
    fn test_typed_definition_not_object_key() {
        let src = "数:(num)=5;";
        let result = process(src);
        assert_eq!(result.entries.len(), 1);
        assert!(result.mapped_source.starts_with("_00001:(num)=5"));
    }

    #[test]
    fn test_foreach_binding_rewritten() {
        let src = "L>(表:项){println(项);};";
        let result = process(src);
        // `表` is followed by ':' but sits in a foreach header; both the
        // iterable and the binding are rewritten.
        assert_eq!(result.entries.len(), 2);
        assert!(result.mapped_source.contains("L>(_00001:_00002)"));
    }

    #[test]
    fn test_string_contents_untouched() {
        let src = "s:=\"变量\";";
        let result = process(src);
        assert_eq!(result.mapped_source, src);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_builtin_names_untouched() {
        let src = "println(toNum(\"1\"));";
        let result = process(src);
        assert_eq!(result.mapped_source, src);
    }

    #[test]
    fn test_table_string_format() {
        let result = process("变:=1;");
        assert_eq!(result.table_string(), "[1] 变 -> _00001 (UNKNOWN)\n");
    }
}
