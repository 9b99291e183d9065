//! Decodes character and string constants into their runtime values.
//!
//! Decoding is pure: the same token bytes always produce the same value.
//! Malformed escapes never panic; they are reported through the sink and a
//! best-effort value keeps the downstream token stream intact.

use cfe_foundation::{
    errors::{Diagnostic, DiagnosticSink, Label},
    source::SourceFileSet,
};

use crate::token::Token;

/// The decoded value of one source character or escape sequence.
///
/// `RawByte` marks numeric escapes (`\x`, octal): a byte that was never
/// validated as a code point and must not be re-encoded as UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharValue {
    CodePoint(u32),
    RawByte(u8),
}

struct Decoder<'a> {
    fset: &'a SourceFileSet,
    sink: &'a mut dyn DiagnosticSink,
    token: &'a Token,
}

impl<'a> Decoder<'a> {
    fn report(&mut self, offset_in_token: usize, message: impl Into<String>) {
        let file = self.fset.file_at(self.token.pos());
        let at = self.token.local_range().start + offset_in_token;
        // The producer never halts on a decoding error; the sink's decision
        // only matters to token producers.
        let _ = self.sink.emit(
            Diagnostic::error(file, message)
                .with_label(Label::primary(at..at + 1, "within this constant")),
        );
    }

    /// Decodes the escape sequence at the start of `bytes` (which begins with
    /// the backslash). Returns the value and the number of bytes consumed.
    fn escape(&mut self, bytes: &[u8], offset: usize) -> (CharValue, usize) {
        debug_assert_eq!(bytes[0], b'\\');
        let Some(&selector) = bytes.get(1) else {
            self.report(offset, "stray `\\` at the end of the constant");
            return (CharValue::CodePoint(u32::from(b'\\')), 1);
        };
        match selector {
            b'\'' | b'"' | b'?' | b'\\' => (CharValue::CodePoint(u32::from(selector)), 2),
            b'a' => (CharValue::CodePoint(7), 2),
            b'b' => (CharValue::CodePoint(8), 2),
            b'e' => (CharValue::CodePoint(0x1b), 2),
            b'f' => (CharValue::CodePoint(12), 2),
            b'n' => (CharValue::CodePoint(10), 2),
            b'r' => (CharValue::CodePoint(13), 2),
            b't' => (CharValue::CodePoint(9), 2),
            b'v' => (CharValue::CodePoint(11), 2),
            b'x' => {
                let mut value: u32 = 0;
                let mut consumed = 2;
                while let Some(digit) = bytes.get(consumed).and_then(|b| (*b as char).to_digit(16))
                {
                    value = (value << 4) | digit;
                    consumed += 1;
                }
                if consumed == 2 {
                    self.report(offset, "`\\x` used with no following hex digits");
                    return (CharValue::CodePoint(u32::from(b'x')), 2);
                }
                (CharValue::RawByte((value & 0xff) as u8), consumed)
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut consumed = 1;
                while consumed < 4 {
                    match bytes.get(consumed) {
                        Some(b @ b'0'..=b'7') => {
                            value = (value << 3) | u32::from(b - b'0');
                            consumed += 1;
                        }
                        _ => break,
                    }
                }
                (CharValue::RawByte((value & 0xff) as u8), consumed)
            }
            b'u' => match self.hex_quad(&bytes[2..], offset) {
                Some(quad) => (CharValue::CodePoint(quad), 6),
                None => (CharValue::CodePoint(u32::from(b'u')), 2),
            },
            b'U' => {
                let high = self.hex_quad(bytes.get(2..).unwrap_or_default(), offset);
                let low = high.and_then(|_| self.hex_quad(bytes.get(6..).unwrap_or_default(), offset));
                match (high, low) {
                    (Some(high), Some(low)) => (CharValue::CodePoint(high << 16 | low), 10),
                    _ => (CharValue::CodePoint(u32::from(b'U')), 2),
                }
            }
            other => {
                self.report(offset, format!("unknown escape sequence `\\{}`", other as char));
                (CharValue::CodePoint(u32::from(other)), 2)
            }
        }
    }

    /// Exactly four hex digits, or `None` after reporting.
    fn hex_quad(&mut self, bytes: &[u8], offset: usize) -> Option<u32> {
        let mut value = 0;
        for index in 0..4 {
            match bytes.get(index).and_then(|b| (*b as char).to_digit(16)) {
                Some(digit) => value = (value << 4) | digit,
                None => {
                    self.report(offset, "universal character name is missing hex digits");
                    return None;
                }
            }
        }
        Some(value)
    }
}

/// Strips an optional `L`/`u`/`U`/`u8` prefix and the surrounding quotes.
/// Tolerates a missing closing quote, which the scanner produces for
/// unterminated constants.
fn constant_body(source: &str, quote: u8) -> &[u8] {
    let bytes = source.as_bytes();
    let open = bytes.iter().position(|&b| b == quote);
    let Some(open) = open else { return &[] };
    let rest = &bytes[open + 1..];
    match rest.last() {
        Some(&b) if b == quote && !rest.is_empty() => &rest[..rest.len() - 1],
        _ => rest,
    }
}

fn append(value: CharValue, out: &mut Vec<u8>) {
    match value {
        CharValue::RawByte(byte) => out.push(byte),
        CharValue::CodePoint(point) => match char::from_u32(point) {
            Some(c) => {
                let mut buf = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            None => {
                let mut buf = [0; 4];
                out.extend_from_slice(char::REPLACEMENT_CHARACTER.encode_utf8(&mut buf).as_bytes());
            }
        },
    }
}

/// Decodes the escape sequence at the start of `bytes`, reporting problems
/// through `sink` against `token`'s position. Returns the decoded value and
/// the number of bytes consumed, including the backslash.
pub fn decode_escape(
    bytes: &[u8],
    token: &Token,
    fset: &SourceFileSet,
    sink: &mut dyn DiagnosticSink,
) -> (CharValue, usize) {
    let mut decoder = Decoder { fset, sink, token };
    decoder.escape(bytes, 0)
}

/// Decodes a string literal token into its runtime bytes. The outer quotes
/// and any prefix are stripped, escapes are decoded left to right, and a NUL
/// terminator is always appended.
pub fn decode_string(
    token: &Token,
    fset: &SourceFileSet,
    sink: &mut dyn DiagnosticSink,
) -> Vec<u8> {
    let mut decoder = Decoder { fset, sink, token };
    let body = constant_body(token.source(), b'"');
    let mut out = Vec::with_capacity(body.len() + 1);
    let mut index = 0;
    while index < body.len() {
        if body[index] == b'\\' {
            let (value, consumed) = decoder.escape(&body[index..], index);
            append(value, &mut out);
            index += consumed;
        } else {
            out.push(body[index]);
            index += 1;
        }
    }
    out.push(0);
    out
}

/// Decodes a character constant token. A single-byte body is returned
/// directly; otherwise exactly one escape sequence or one UTF-8 code point
/// must make up the body, and trailing bytes are reported as an error.
pub fn decode_char(
    token: &Token,
    fset: &SourceFileSet,
    sink: &mut dyn DiagnosticSink,
) -> CharValue {
    let mut decoder = Decoder { fset, sink, token };
    let body = constant_body(token.source(), b'\'');
    match body {
        [] => {
            decoder.report(0, "empty character constant");
            CharValue::CodePoint(0)
        }
        &[byte] => CharValue::CodePoint(u32::from(byte)),
        _ => {
            let (value, consumed) = if body[0] == b'\\' {
                decoder.escape(body, 0)
            } else {
                // One UTF-8-decoded code point.
                let text = std::str::from_utf8(body).unwrap_or_default();
                match text.chars().next() {
                    Some(c) => (CharValue::CodePoint(c as u32), c.len_utf8()),
                    None => {
                        decoder.report(0, "character constant is not valid UTF-8");
                        (CharValue::RawByte(body[0]), 1)
                    }
                }
            };
            if consumed < body.len() {
                decoder.report(
                    consumed,
                    "character constant is more than one character wide",
                );
            }
            value
        }
    }
}
