//! Lexer for mapped FLYUX text.
//!
//! Scans the identifier-mapped byte stream into tokens. Any byte >= 0x80 is
//! a valid identifier byte (string contents and property names keep their
//! original non-ASCII bytes). Each token carries both its position in the
//! mapped stream and, through the composed offset and source maps, the
//! `{orig_line, orig_column, orig_length}` covering the full original span.

use crate::builtins;
use crate::source_map::{OffsetMap, SourceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    BuiltinFunc,
    Num,
    Str,

    Colon,
    Semi,
    Comma,
    Dot,
    DotChain,
    Ellipsis,
    Question,
    QuestionDot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Assign,
    Define,
    FuncTypeStart,

    Plus,
    Minus,
    PlusPlus,
    MinusMinus,
    Star,
    Power,
    Slash,
    Percent,

    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Bang,
    BangEq,
    AndAnd,
    OrOr,
    BitAnd,
    BitOr,
    BitXor,

    KwIf,
    KwLoop,
    KwReturn,
    KwBreak,
    KwNext,
    KwTry,
    KwSelf,

    TypeNum,
    TypeStr,
    TypeBl,
    TypeObj,
    TypeFunc,

    True,
    False,
    Null,
    Undef,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Ident => "IDENT",
            TokenKind::BuiltinFunc => "BUILTIN_FUNC",
            TokenKind::Num => "NUM",
            TokenKind::Str => "STRING",
            TokenKind::Colon => "COLON",
            TokenKind::Semi => "SEMI",
            TokenKind::Comma => "COMMA",
            TokenKind::Dot => "DOT",
            TokenKind::DotChain => "DOT_CHAIN",
            TokenKind::Ellipsis => "ELLIPSIS",
            TokenKind::Question => "QUESTION",
            TokenKind::QuestionDot => "QUESTION_DOT",
            TokenKind::LParen => "L_PAREN",
            TokenKind::RParen => "R_PAREN",
            TokenKind::LBrace => "L_BRACE",
            TokenKind::RBrace => "R_BRACE",
            TokenKind::LBracket => "L_BRACKET",
            TokenKind::RBracket => "R_BRACKET",
            TokenKind::Assign => "ASSIGN",
            TokenKind::Define => "DEFINE",
            TokenKind::FuncTypeStart => "FUNC_TYPE_START",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::PlusPlus => "PLUS_PLUS",
            TokenKind::MinusMinus => "MINUS_MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Power => "POWER",
            TokenKind::Slash => "SLASH",
            TokenKind::Percent => "PERCENT",
            TokenKind::Lt => "LT",
            TokenKind::Gt => "GT",
            TokenKind::Le => "LE",
            TokenKind::Ge => "GE",
            TokenKind::EqEq => "EQ_EQ",
            TokenKind::Bang => "BANG",
            TokenKind::BangEq => "BANG_EQ",
            TokenKind::AndAnd => "AND_AND",
            TokenKind::OrOr => "OR_OR",
            TokenKind::BitAnd => "BIT_AND",
            TokenKind::BitOr => "BIT_OR",
            TokenKind::BitXor => "BIT_XOR",
            TokenKind::KwIf => "KW_IF",
            TokenKind::KwLoop => "KW_LOOP",
            TokenKind::KwReturn => "KW_RETURN",
            TokenKind::KwBreak => "KW_BREAK",
            TokenKind::KwNext => "KW_NEXT",
            TokenKind::KwTry => "KW_TRY",
            TokenKind::KwSelf => "KW_SELF",
            TokenKind::TypeNum => "TYPE_NUM",
            TokenKind::TypeStr => "TYPE_STR",
            TokenKind::TypeBl => "TYPE_BL",
            TokenKind::TypeObj => "TYPE_OBJ",
            TokenKind::TypeFunc => "TYPE_FUNC",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::Null => "NULL",
            TokenKind::Undef => "UNDEF",
        }
    }
}

/// One lexed token. For string literals `decoded` holds the escape-decoded
/// content (which may contain NUL or other raw bytes) and `lexeme_length` is
/// its byte count; `lexeme` is always the raw source slice.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub decoded: Option<Vec<u8>>,
    pub lexeme_length: usize,
    /// Position in the mapped stream (1-based).
    pub line: u32,
    pub column: u32,
    /// Position in the original file; 0 when the token is synthetic.
    pub orig_line: u32,
    pub orig_column: u32,
    pub orig_length: u32,
}

impl Token {
    pub fn is_synthetic(&self) -> bool {
        self.orig_line == 0
    }

    /// Decoded string content for `Str` tokens, raw lexeme bytes otherwise.
    pub fn text_bytes(&self) -> &[u8] {
        match &self.decoded {
            Some(bytes) => bytes,
            None => self.lexeme.as_bytes(),
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic() || b >= 0x80
}

fn is_ident_byte(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric() || b >= 0x80
}

fn classify_identifier(lexeme: &str) -> TokenKind {
    match lexeme {
        "if" => TokenKind::KwIf,
        "break" => TokenKind::KwBreak,
        "next" => TokenKind::KwNext,
        "self" => TokenKind::KwSelf,
        "num" => TokenKind::TypeNum,
        "str" => TokenKind::TypeStr,
        "bl" => TokenKind::TypeBl,
        "obj" => TokenKind::TypeObj,
        "func" => TokenKind::TypeFunc,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "undef" => TokenKind::Undef,
        _ if builtins::is_builtin_name(lexeme) => TokenKind::BuiltinFunc,
        _ => TokenKind::Ident,
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode the escape alphabet: simple escapes, `\xHH`, `\uHHHH` (UTF-8
/// encoded), and 1-3 digit octals. Invalid escapes keep their characters.
pub fn unescape(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut i = 0usize;
    while i < content.len() {
        let b = content[i];
        if b != b'\\' || i + 1 >= content.len() {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let esc = content[i];
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'v' => out.push(0x0B),
            b'a' => out.push(0x07),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'e' => out.push(0x1B),
            b'x' => {
                if i + 2 < content.len() {
                    if let (Some(hi), Some(lo)) =
                        (hex_value(content[i + 1]), hex_value(content[i + 2]))
                    {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                }
                out.push(b'x');
            }
            b'u' => {
                if i + 4 < content.len() {
                    let digits: Option<Vec<u8>> =
                        (1..=4).map(|k| hex_value(content[i + k])).collect();
                    if let Some(d) = digits {
                        let cp = (u32::from(d[0]) << 12)
                            | (u32::from(d[1]) << 8)
                            | (u32::from(d[2]) << 4)
                            | u32::from(d[3]);
                        if cp < 0x80 {
                            out.push(cp as u8);
                        } else if cp < 0x800 {
                            out.push(0xC0 | (cp >> 6) as u8);
                            out.push(0x80 | (cp & 0x3F) as u8);
                        } else {
                            out.push(0xE0 | (cp >> 12) as u8);
                            out.push(0x80 | ((cp >> 6) & 0x3F) as u8);
                            out.push(0x80 | (cp & 0x3F) as u8);
                        }
                        i += 5;
                        continue;
                    }
                }
                out.push(b'u');
            }
            b'0'..=b'7' => {
                let mut octal = u32::from(esc - b'0');
                let mut used = 1;
                while used < 3 && i + used < content.len() {
                    let d = content[i + used];
                    if !(b'0'..=b'7').contains(&d) {
                        break;
                    }
                    octal = octal * 8 + u32::from(d - b'0');
                    used += 1;
                }
                out.push(octal as u8);
                i += used;
                continue;
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
        i += 1;
    }
    out
}

struct Lexer<'a> {
    bytes: &'a [u8],
    source_map: &'a SourceMap,
    offset_map: &'a OffsetMap,
    tokens: Vec<Token>,
    i: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn emit(&mut self, kind: TokenKind, start: usize, len: usize, line: u32, col: u32) {
        let lexeme = String::from_utf8_lossy(&self.bytes[start..start + len]).into_owned();
        let span = self.source_map.resolve_span(self.offset_map, start, len);
        let (orig_line, orig_column, orig_length) = if span.is_synthetic {
            (0, 0, 0)
        } else {
            (span.orig_line, span.orig_column, span.orig_length)
        };
        self.tokens.push(Token {
            kind,
            lexeme_length: len,
            lexeme,
            decoded: None,
            line,
            column: col,
            orig_line,
            orig_column,
            orig_length,
        });
    }

    fn err(&self, at: usize, message: &str) -> String {
        let span = self.source_map.resolve_span(self.offset_map, at, 1);
        if span.is_synthetic {
            format!("Line {}, column {}: {}", self.line, self.col, message)
        } else {
            format!(
                "Line {}, column {}: {}",
                span.orig_line, span.orig_column, message
            )
        }
    }

    fn bump(&mut self, n: usize) {
        self.i += n;
        self.col += n as u32;
    }
}

/// Tokenize mapped text. The maps supply the original coordinates every
/// token carries for diagnostics.
pub fn tokenize(
    mapped: &str,
    source_map: &SourceMap,
    offset_map: &OffsetMap,
) -> Result<Vec<Token>, String> {
    let mut lx = Lexer {
        bytes: mapped.as_bytes(),
        source_map,
        offset_map,
        tokens: Vec::new(),
        i: 0,
        line: 1,
        col: 1,
    };
    let len = lx.bytes.len();

    while lx.i < len {
        let b = lx.bytes[lx.i];

        if matches!(b, b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c') {
            lx.bump(1);
            continue;
        }
        if b == b'\n' {
            lx.i += 1;
            lx.line += 1;
            lx.col = 1;
            continue;
        }

        let start = lx.i;
        let (line, col) = (lx.line, lx.col);
        let next = if lx.i + 1 < len {
            lx.bytes[lx.i + 1]
        } else {
            0
        };

        // Digraph keywords: L> R> T> B> N>
        if next == b'>' {
            let kw = match b {
                b'L' => Some(TokenKind::KwLoop),
                b'R' => Some(TokenKind::KwReturn),
                b'T' => Some(TokenKind::KwTry),
                b'B' => Some(TokenKind::KwBreak),
                b'N' => Some(TokenKind::KwNext),
                _ => None,
            };
            if let Some(kind) = kw {
                lx.emit(kind, start, 2, line, col);
                lx.bump(2);
                continue;
            }
        }

        if is_ident_start(b) {
            let mut j = lx.i + 1;
            while j < len && is_ident_byte(lx.bytes[j]) {
                j += 1;
            }
            let ident_len = j - start;
            let text = String::from_utf8_lossy(&lx.bytes[start..j]).into_owned();
            let kind = classify_identifier(&text);
            lx.emit(kind, start, ident_len, line, col);
            lx.bump(ident_len);
            continue;
        }

        if b.is_ascii_digit() {
            let mut j = lx.i + 1;
            while j < len && lx.bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j + 1 < len && lx.bytes[j] == b'.' && lx.bytes[j + 1].is_ascii_digit() {
                j += 1;
                while j < len && lx.bytes[j].is_ascii_digit() {
                    j += 1;
                }
            }
            if j < len && matches!(lx.bytes[j], b'e' | b'E') {
                let mut k = j + 1;
                if k < len && matches!(lx.bytes[k], b'+' | b'-') {
                    k += 1;
                }
                if k >= len || !lx.bytes[k].is_ascii_digit() {
                    return Err(lx.err(j, "Invalid number format: expected digit after exponent"));
                }
                j = k;
                while j < len && lx.bytes[j].is_ascii_digit() {
                    j += 1;
                }
            }
            let num_len = j - start;
            lx.emit(TokenKind::Num, start, num_len, line, col);
            lx.bump(num_len);
            continue;
        }

        if b == b'"' || b == b'\'' {
            let quote = b;
            let mut j = lx.i + 1;
            let mut lines_crossed = 0u32;
            let mut last_line_col = lx.col + 1;
            while j < len && lx.bytes[j] != quote {
                if lx.bytes[j] == b'\n' {
                    lines_crossed += 1;
                    last_line_col = 1;
                    j += 1;
                } else if lx.bytes[j] == b'\\' && j + 1 < len {
                    j += 2;
                    last_line_col += 2;
                } else {
                    j += 1;
                    last_line_col += 1;
                }
            }
            if j >= len {
                return Err(lx.err(start, "Unterminated string literal"));
            }
            j += 1; // closing quote
            last_line_col += 1;

            let raw_len = j - start;
            let decoded = unescape(&lx.bytes[start + 1..j - 1]);
            let span = lx.source_map.resolve_span(lx.offset_map, start, raw_len);
            let (orig_line, orig_column, orig_length) = if span.is_synthetic {
                (0, 0, 0)
            } else {
                (span.orig_line, span.orig_column, span.orig_length)
            };
            lx.tokens.push(Token {
                kind: TokenKind::Str,
                lexeme: String::from_utf8_lossy(&lx.bytes[start..j]).into_owned(),
                lexeme_length: decoded.len(),
                decoded: Some(decoded),
                line,
                column: col,
                orig_line,
                orig_column,
                orig_length,
            });
            lx.i = j;
            if lines_crossed > 0 {
                lx.line += lines_crossed;
                lx.col = last_line_col;
            } else {
                lx.col += raw_len as u32;
            }
            continue;
        }

        // Operators and punctuation.
        let (kind, tok_len) = match (b, next) {
            (b'.', b'.') if lx.i + 2 < len && lx.bytes[lx.i + 2] == b'.' => {
                (TokenKind::Ellipsis, 3)
            }
            (b'.', b'>') => (TokenKind::DotChain, 2),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'?', b'.') => (TokenKind::QuestionDot, 2),
            (b'?', _) => (TokenKind::Question, 1),
            (b':', b'=') => (TokenKind::Define, 2),
            (b':', b'<') => (TokenKind::FuncTypeStart, 2),
            (b':', _) => (TokenKind::Colon, 1),
            (b'&', b'&') => (TokenKind::AndAnd, 2),
            (b'&', _) => (TokenKind::BitAnd, 1),
            (b'|', b'|') => (TokenKind::OrOr, 2),
            (b'|', _) => (TokenKind::BitOr, 1),
            (b'!', b'=') => (TokenKind::BangEq, 2),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'=', b'=') => (TokenKind::EqEq, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'<', b'=') => (TokenKind::Le, 2),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', b'=') => (TokenKind::Ge, 2),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'+', b'+') => (TokenKind::PlusPlus, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', b'-') => (TokenKind::MinusMinus, 2),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', b'*') => (TokenKind::Power, 2),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'^', _) => (TokenKind::BitXor, 1),
            (b';', _) => (TokenKind::Semi, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            _ => {
                return Err(lx.err(start, &format!("Unexpected character: 0x{b:02X}")));
            }
        };
        lx.emit(kind, start, tok_len, line, col);
        lx.bump(tok_len);
    }

    Ok(lx.tokens)
}

/// Debug rendering used by `--dump-tokens`: `KIND "lexeme" line:col+len`,
/// `(synthetic)` for tokens with no original position.
pub fn tokens_table_string(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        if t.is_synthetic() {
            out.push_str(&format!("{}\t\"{}\"\t(synthetic)\n", t.kind.name(), t.lexeme));
        } else {
            out.push_str(&format!(
                "{}\t\"{}\"\t{}:{}+{}\n",
                t.kind.name(),
                t.lexeme,
                t.orig_line,
                t.orig_column,
                t.orig_length
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_map::{Prov, SourceMap};

    fn lex(src: &str) -> Vec<Token> {
        // Identity maps: the "mapped" text is the original.
        let prov: Vec<Prov> = (0..src.len()).map(|i| Prov::Orig(i as u32)).collect();
        let source_map = SourceMap::from_provenance(src, &prov);
        let offset_map: Vec<usize> = (0..src.len()).collect();
        tokenize(src, &source_map, &offset_map).expect("lex failed")
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_digraph_keywords() {
        assert_eq!(
            kinds("L>R>T>B>N>"),
            vec![
                TokenKind::KwLoop,
                TokenKind::KwReturn,
                TokenKind::KwTry,
                TokenKind::KwBreak,
                TokenKind::KwNext
            ]
        );
    }

    #[test]
    fn test_define_and_func_type() {
        assert_eq!(
            kinds("x:=1;f:<num>="),
            vec![
                TokenKind::Ident,
                TokenKind::Define,
                TokenKind::Num,
                TokenKind::Semi,
                TokenKind::Ident,
                TokenKind::FuncTypeStart,
                TokenKind::TypeNum,
                TokenKind::Gt,
                TokenKind::Assign
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a==b!=c<=d>=e&&f||g**h++i--"),
            vec![
                TokenKind::Ident,
                TokenKind::EqEq,
                TokenKind::Ident,
                TokenKind::BangEq,
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::Ge,
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Ident,
                TokenKind::OrOr,
                TokenKind::Ident,
                TokenKind::Power,
                TokenKind::Ident,
                TokenKind::PlusPlus,
                TokenKind::Ident,
                TokenKind::MinusMinus,
            ]
        );
    }

    #[test]
    fn test_chain_and_optional() {
        assert_eq!(
            kinds("a.>b?.c...d"),
            vec![
                TokenKind::Ident,
                TokenKind::DotChain,
                TokenKind::Ident,
                TokenKind::QuestionDot,
                TokenKind::Ident,
                TokenKind::Ellipsis,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        let toks = lex("1 3.14 2e10 1.5e-3");
        assert!(toks.iter().all(|t| t.kind == TokenKind::Num));
        assert_eq!(toks[3].lexeme, "1.5e-3");
    }

    #[test]
    fn test_bad_exponent() {
        let prov: Vec<Prov> = (0..4).map(|i| Prov::Orig(i as u32)).collect();
        let map = SourceMap::from_provenance("2e+x", &prov);
        let offsets: Vec<usize> = (0..4).collect();
        let err = tokenize("2e+x", &map, &offsets).unwrap_err();
        assert!(err.contains("expected digit after exponent"));
    }

    #[test]
    fn test_unterminated_string() {
        let src = "\"abc";
        let prov: Vec<Prov> = (0..src.len()).map(|i| Prov::Orig(i as u32)).collect();
        let map = SourceMap::from_provenance(src, &prov);
        let offsets: Vec<usize> = (0..src.len()).collect();
        let err = tokenize(src, &map, &offsets).unwrap_err();
        assert!(err.contains("Unterminated string literal"));
    }

    #[test]
    fn test_string_escapes() {
        let toks = lex(r#""a\n\t\x41B\101""#);
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].decoded.as_deref(), Some(b"a\n\tABA".as_ref()));
        assert_eq!(toks[0].lexeme_length, 6);
    }

    #[test]
    fn test_string_with_embedded_nul() {
        let toks = lex(r#""a\0b""#);
        assert_eq!(toks[0].decoded.as_deref(), Some(b"a\0b".as_ref()));
        assert_eq!(toks[0].lexeme_length, 3);
    }

    #[test]
    fn test_unicode_escape_utf8() {
        let toks = lex(r#""中""#);
        assert_eq!(toks[0].decoded.as_deref(), Some("中".as_bytes()));
    }

    #[test]
    fn test_builtin_classification() {
        assert_eq!(kinds("println")[0], TokenKind::BuiltinFunc);
        assert_eq!(kinds("myFunc")[0], TokenKind::Ident);
        assert_eq!(kinds("if")[0], TokenKind::KwIf);
        assert_eq!(kinds("self")[0], TokenKind::KwSelf);
    }

    #[test]
    fn test_positions() {
        let toks = lex("x:=1;\ny:=2;");
        let y = toks.iter().find(|t| t.lexeme == "y").unwrap();
        assert_eq!((y.line, y.column), (2, 1));
        assert_eq!((y.orig_line, y.orig_column), (2, 1));
    }

    #[test]
    fn test_relex_round_trip() {
        let src = "x:=1+2*f(a,b);if(x==3){R>x;}";
        let toks = lex(src);
        let joined: Vec<String> = toks.iter().map(|t| t.lexeme.clone()).collect();
        let rejoined = joined.join(" ");
        let again = lex(&rejoined);
        let kinds_a: Vec<TokenKind> = toks.iter().map(|t| t.kind).collect();
        let kinds_b: Vec<TokenKind> = again.iter().map(|t| t.kind).collect();
        assert_eq!(kinds_a, kinds_b);
        let lex_a: Vec<&str> = toks.iter().map(|t| t.lexeme.as_str()).collect();
        let lex_b: Vec<&str> = again.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lex_a, lex_b);
    }

    #[test]
    fn test_rewritten_identifier_span() {
        // Simulate "变量:=1" -> "_00001:=1": all six mapped bytes of the
        // identifier resolve to normalized byte 0, whose source-map entry
        // says the original char is 3 bytes long.
        let original = "变量:=1";
        let norm_prov: Vec<Prov> = vec![
            Prov::Orig(0),
            Prov::Orig(1),
            Prov::Orig(2),
            Prov::Orig(3),
            Prov::Orig(4),
            Prov::Orig(5),
            Prov::Orig(6),
            Prov::Orig(7),
            Prov::Orig(8),
        ];
        let source_map = SourceMap::from_provenance(original, &norm_prov);
        let mapped = "_00001:=1";
        let mut offsets: Vec<usize> = vec![0; 6];
        offsets.extend([6, 7, 8]);
        let toks = tokenize(mapped, &source_map, &offsets).unwrap();
        let ident = &toks[0];
        assert_eq!(ident.lexeme, "_00001");
        assert_eq!(ident.orig_line, 1);
        assert_eq!(ident.orig_column, 1);
        // The full original identifier span is recovered by scanning.
        assert_eq!(ident.orig_length, 6);
    }
}
