use std::{collections::HashSet, sync::Arc};

use cfe_foundation::{
    errors::{Diagnostic, DiagnosticSink, ErrorResponse, Label, ReplacementSuggestion},
    source::{OffsetOverflow, SourceFileId, SourceFileSet, SourceOffset},
};
use tracing::trace;

use crate::{
    token::{Token, TokenKind},
    token_stream::TokenStream,
};

/// The C11 keyword set.
pub const C11_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "_Alignas", "_Alignof", "_Atomic", "_Bool",
    "_Complex", "_Generic", "_Imaginary", "_Noreturn", "_Static_assert", "_Thread_local",
];

/// Keywords added by [`ScannerConfig::gnu`] on top of C11.
const GNU_KEYWORDS: &[&str] = &[
    "asm", "typeof", "__asm__", "__attribute__", "__builtin_va_arg", "__extension__",
    "__inline__", "__restrict__", "__typeof__", "__volatile__",
];

/// Configuration threaded through scanner construction. There is no ambient
/// process-wide state; two scanners with different configs can run side by
/// side.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Identifiers in this set lex as [`TokenKind::Keyword`].
    pub keywords: HashSet<String>,
    /// Enables shape-level diagnostics beyond what the token grammar
    /// strictly requires, such as flagging a constant glued to an
    /// identifier.
    pub extended_errors: bool,
}

impl ScannerConfig {
    pub fn c11() -> Self {
        Self {
            keywords: C11_KEYWORDS.iter().map(|kw| kw.to_string()).collect(),
            extended_errors: false,
        }
    }

    pub fn gnu() -> Self {
        let mut config = Self::c11();
        config
            .keywords
            .extend(GNU_KEYWORDS.iter().map(|kw| kw.to_string()));
        config
    }

    pub fn with_extended_errors(mut self) -> Self {
        self.extended_errors = true;
        self
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::c11()
    }
}

/// Scans one registered file into a forward-only token stream.
///
/// The scanner registers its file with the source file set at construction
/// and appends line starts as it consumes newlines, so position lookups are
/// valid mid-scan. It cannot be restarted; construct a fresh scanner to
/// rescan.
pub struct Scanner<'a> {
    fset: &'a mut SourceFileSet,
    sink: &'a mut dyn DiagnosticSink,
    config: ScannerConfig,

    file: SourceFileId,
    base: SourceOffset,
    buffer: Arc<str>,
    position: usize,
    sep_start: usize,
    halted: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(
        fset: &'a mut SourceFileSet,
        filename: impl Into<String>,
        source: impl Into<Arc<str>>,
        config: ScannerConfig,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Result<Self, OffsetOverflow> {
        let file = fset.add(filename, source)?;
        let base = fset.get(file).base();
        let buffer = Arc::clone(fset.get(file).source());
        trace!(filename = fset.get(file).filename(), base, "scanner ready");
        Ok(Self {
            fset,
            sink,
            config,
            file,
            base,
            buffer,
            position: 0,
            sep_start: 0,
            halted: false,
        })
    }

    pub fn file(&self) -> SourceFileId {
        self.file
    }

    /// The registry, for incremental position lookups while scanning.
    pub fn fset(&self) -> &SourceFileSet {
        self.fset
    }

    fn current_char(&self) -> Option<char> {
        self.buffer[self.position..].chars().next()
    }

    fn nth_char(&self, n: usize) -> Option<char> {
        self.buffer[self.position..].chars().nth(n)
    }

    fn advance_char(&mut self) {
        if let Some(char) = self.current_char() {
            self.position += char.len_utf8();
            if char == '\n' {
                self.fset
                    .get_mut(self.file)
                    .add_line(self.position as SourceOffset);
            }
        }
    }

    fn one_or_more(&mut self, mut test: impl Fn(char) -> bool) -> Result<(), ()> {
        if !self.current_char().map(&mut test).unwrap_or(false) {
            return Err(());
        }
        while self.current_char().map(&mut test).unwrap_or(false) {
            self.advance_char();
        }
        Ok(())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if self.sink.emit(diagnostic) == ErrorResponse::Halt {
            trace!("sink requested halt; winding down to end of file");
            self.halted = true;
        }
    }

    fn make_token(&mut self, kind: TokenKind, tok_start: usize) -> Token {
        let token = Token::new(
            kind,
            Arc::clone(&self.buffer),
            self.sep_start,
            tok_start,
            self.position,
            self.base + tok_start as SourceOffset,
        );
        self.sep_start = self.position;
        token
    }

    fn eof_token(&mut self) -> Token {
        let at = self.position;
        self.make_token(TokenKind::EndOfFile, at)
    }
}

/// # Separator consumption
///
/// Whitespace, line splices and both comment forms are never discarded; they
/// accumulate into the next token's separator.
impl<'a> Scanner<'a> {
    fn skip_separator(&mut self) {
        loop {
            match self.current_char() {
                Some(' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c') => self.advance_char(),
                // A backslash immediately before a newline splices the two
                // lines; both bytes stay in the separator.
                Some('\\') if self.nth_char(1) == Some('\n') => {
                    self.advance_char();
                    self.advance_char();
                }
                Some('/') if self.nth_char(1) == Some('/') => self.line_comment(),
                Some('/') if self.nth_char(1) == Some('*') => {
                    self.block_comment();
                    if self.halted {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn line_comment(&mut self) {
        // Leave the terminating newline for the whitespace arm, which also
        // registers the line start.
        while !matches!(self.current_char(), None | Some('\n')) {
            self.advance_char();
        }
    }

    fn block_comment(&mut self) {
        let start = self.position;
        self.advance_char();
        self.advance_char();
        loop {
            match self.current_char() {
                Some('*') if self.nth_char(1) == Some('/') => {
                    self.advance_char();
                    self.advance_char();
                    return;
                }
                Some(_) => self.advance_char(),
                None => {
                    self.report(
                        Diagnostic::error(
                            self.file,
                            "block comment does not have a matching `*/` terminator",
                        )
                        .with_label(Label::primary(start..start + 2, "the comment starts here")),
                    );
                    return;
                }
            }
        }
    }
}

/// # Token rules
impl<'a> Scanner<'a> {
    fn identifier_or_prefixed_literal(&mut self) -> TokenKind {
        let start = self.position;
        while let Some('a'..='z' | 'A'..='Z' | '0'..='9' | '_') = self.current_char() {
            self.advance_char();
        }
        if matches!(&self.buffer[start..self.position], "L" | "u" | "U" | "u8") {
            match self.current_char() {
                Some('"') => return self.quoted('"', TokenKind::StringLit),
                Some('\'') => return self.quoted('\'', TokenKind::CharLit),
                _ => (),
            }
        }
        if self.config.keywords.contains(&self.buffer[start..self.position]) {
            TokenKind::Keyword
        } else {
            TokenKind::Ident
        }
    }

    fn quoted(&mut self, quote: char, kind: TokenKind) -> TokenKind {
        let start = self.position;
        self.advance_char();
        loop {
            match self.current_char() {
                None | Some('\n') => {
                    self.report(
                        Diagnostic::error(
                            self.file,
                            format!("missing terminating `{quote}` character"),
                        )
                        .with_label(Label::primary(
                            start..start + 1,
                            "the constant starts here",
                        )),
                    );
                    // Best effort: the token ends at the line break.
                    return kind;
                }
                Some('\\') => {
                    self.advance_char();
                    if self.current_char().is_some() {
                        self.advance_char();
                    }
                }
                Some(c) if c == quote => {
                    self.advance_char();
                    return kind;
                }
                Some(_) => self.advance_char(),
            }
        }
    }

    fn exponent(&mut self, marker: char) {
        let exponent_start = self.position;
        self.advance_char();
        if let Some('+' | '-') = self.current_char() {
            self.advance_char();
        }
        if self.one_or_more(|c| c.is_ascii_digit()).is_err() {
            self.report(
                Diagnostic::error(
                    self.file,
                    format!("`{marker}` in floating constant must be followed by an exponent"),
                )
                .with_label(Label::primary(
                    exponent_start..self.position,
                    "exponent digits are missing here",
                )),
            );
        }
    }

    fn float_suffix(&mut self) {
        if let Some('f' | 'F' | 'l' | 'L') = self.current_char() {
            self.advance_char();
        }
    }

    fn int_suffix(&mut self) {
        while let Some('u' | 'U' | 'l' | 'L') = self.current_char() {
            self.advance_char();
        }
    }

    fn decimal_number(&mut self) -> TokenKind {
        while let Some('0'..='9') = self.current_char() {
            self.advance_char();
        }
        let mut float = false;
        if self.current_char() == Some('.') {
            float = true;
            self.advance_char();
            while let Some('0'..='9') = self.current_char() {
                self.advance_char();
            }
        }
        if let Some(marker @ ('e' | 'E')) = self.current_char() {
            float = true;
            self.exponent(marker);
        }
        if float {
            self.float_suffix();
            TokenKind::FloatLit
        } else {
            self.int_suffix();
            TokenKind::IntLit
        }
    }

    fn hexadecimal_number(&mut self) -> TokenKind {
        // Past the `0x` prefix already.
        let digits_start = self.position;
        while let Some('0'..='9' | 'a'..='f' | 'A'..='F') = self.current_char() {
            self.advance_char();
        }
        let mut has_digits = self.position != digits_start;
        let mut float = false;
        if self.current_char() == Some('.') {
            float = true;
            self.advance_char();
            let fraction_start = self.position;
            while let Some('0'..='9' | 'a'..='f' | 'A'..='F') = self.current_char() {
                self.advance_char();
            }
            has_digits |= self.position != fraction_start;
        }
        if !has_digits {
            self.report(
                Diagnostic::error(
                    self.file,
                    "hexadecimal constant must have at least one digit",
                )
                .with_label(Label::primary(
                    digits_start..digits_start,
                    "expected hex digits after `0x`",
                )),
            );
        }
        if let Some(marker @ ('p' | 'P')) = self.current_char() {
            float = true;
            self.exponent(marker);
        } else if float {
            self.report(
                Diagnostic::error(
                    self.file,
                    "hexadecimal floating constant requires a `p` exponent",
                )
                .with_label(Label::primary(
                    self.position..self.position,
                    "expected `p` followed by an exponent",
                )),
            );
        }
        if float {
            self.float_suffix();
            TokenKind::FloatLit
        } else {
            self.int_suffix();
            TokenKind::IntLit
        }
    }

    fn number(&mut self) -> TokenKind {
        let start = self.position;
        let kind = if self.current_char() == Some('0') {
            self.advance_char();
            if let Some('x' | 'X') = self.current_char() {
                self.advance_char();
                self.hexadecimal_number()
            } else {
                // Octal constants scan with the decimal rules; their value
                // is the literal decoder's business.
                self.decimal_number()
            }
        } else {
            self.decimal_number()
        };

        if self.config.extended_errors {
            if let Some('a'..='z' | 'A'..='Z' | '_') = self.current_char() {
                // Lookahead only; the identifier lexes as its own token.
                let ident_len = self.buffer[self.position..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                    .count();
                let ident_end = self.position + ident_len;
                self.report(
                    Diagnostic::warning(
                        self.file,
                        "constant is immediately followed by an identifier",
                    )
                    .with_label(Label::secondary(
                        start..self.position,
                        "the constant occurs here...",
                    ))
                    .with_label(Label::primary(
                        self.position..ident_end,
                        "...and this identifier is glued to it",
                    ))
                    .with_note((
                        "help: separate the two with a space",
                        ReplacementSuggestion {
                            range: start..ident_end,
                            replacement: format!(
                                "{} {}",
                                &self.buffer[start..self.position],
                                &self.buffer[self.position..ident_end]
                            ),
                        },
                    )),
                );
            }
        }

        kind
    }

    fn punct1(&mut self, kind: TokenKind) -> TokenKind {
        self.advance_char();
        kind
    }

    fn punct2(&mut self, kind: TokenKind, second: char, second_kind: TokenKind) -> TokenKind {
        self.advance_char();
        if self.current_char() == Some(second) {
            self.advance_char();
            second_kind
        } else {
            kind
        }
    }
}

impl<'a> TokenStream for Scanner<'a> {
    fn next(&mut self) -> Token {
        use TokenKind::*;

        if self.halted {
            return self.eof_token();
        }
        self.skip_separator();
        if self.halted {
            return self.eof_token();
        }

        let start = self.position;
        let Some(char) = self.current_char() else {
            return self.eof_token();
        };
        let kind = match char {
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_prefixed_literal(),
            '0'..='9' => self.number(),
            '"' => self.quoted('"', StringLit),
            '\'' => self.quoted('\'', CharLit),
            '.' => {
                if let Some('0'..='9') = self.nth_char(1) {
                    self.decimal_number()
                } else if self.nth_char(1) == Some('.') && self.nth_char(2) == Some('.') {
                    self.advance_char();
                    self.advance_char();
                    self.advance_char();
                    Ellipsis
                } else {
                    self.punct1(Dot)
                }
            }
            '[' => self.punct1(LeftBracket),
            ']' => self.punct1(RightBracket),
            '(' => self.punct1(LeftParen),
            ')' => self.punct1(RightParen),
            '{' => self.punct1(LeftBrace),
            '}' => self.punct1(RightBrace),
            ',' => self.punct1(Comma),
            ';' => self.punct1(Semi),
            '?' => self.punct1(Question),
            ':' => self.punct1(Colon),
            '~' => self.punct1(BitNot),
            '=' => self.punct2(Assign, '=', Equal),
            '!' => self.punct2(Not, '=', NotEqual),
            '*' => self.punct2(Mul, '=', MulAssign),
            '/' => self.punct2(Div, '=', DivAssign),
            '%' => self.punct2(Rem, '=', RemAssign),
            '^' => self.punct2(BitXor, '=', XorAssign),
            '#' => self.punct2(Hash, '#', HashHash),
            '+' => {
                self.advance_char();
                match self.current_char() {
                    Some('+') => self.punct1(Inc),
                    Some('=') => self.punct1(AddAssign),
                    _ => Add,
                }
            }
            '-' => {
                self.advance_char();
                match self.current_char() {
                    Some('-') => self.punct1(Dec),
                    Some('=') => self.punct1(SubAssign),
                    Some('>') => self.punct1(Arrow),
                    _ => Sub,
                }
            }
            '&' => {
                self.advance_char();
                match self.current_char() {
                    Some('&') => self.punct1(And),
                    Some('=') => self.punct1(AndAssign),
                    _ => BitAnd,
                }
            }
            '|' => {
                self.advance_char();
                match self.current_char() {
                    Some('|') => self.punct1(Or),
                    Some('=') => self.punct1(OrAssign),
                    _ => BitOr,
                }
            }
            '<' => {
                self.advance_char();
                match self.current_char() {
                    Some('<') => self.punct2(ShiftLeft, '=', ShiftLeftAssign),
                    Some('=') => self.punct1(LessEqual),
                    _ => Less,
                }
            }
            '>' => {
                self.advance_char();
                match self.current_char() {
                    Some('>') => self.punct2(ShiftRight, '=', ShiftRightAssign),
                    Some('=') => self.punct1(GreaterEqual),
                    _ => Greater,
                }
            }
            unknown => {
                self.advance_char();
                self.report(
                    Diagnostic::error(self.file, format!("unrecognized character: {unknown:?}"))
                        .with_label(Label::primary(
                            start..self.position,
                            "this character is not valid C syntax",
                        )),
                );
                Error
            }
        };

        self.make_token(kind, start)
    }
}

#[cfg(test)]
mod tests {
    use cfe_foundation::errors::FailFast;
    use indoc::indoc;

    use super::*;

    fn scan(source: &str) -> (SourceFileSet, Vec<Token>, Vec<Diagnostic>) {
        scan_with(source, ScannerConfig::default())
    }

    fn scan_with(
        source: &str,
        config: ScannerConfig,
    ) -> (SourceFileSet, Vec<Token>, Vec<Diagnostic>) {
        let mut fset = SourceFileSet::new();
        let mut diagnostics = vec![];
        let mut tokens = vec![];
        {
            let mut scanner =
                Scanner::new(&mut fset, "test.c", source, config, &mut diagnostics).unwrap();
            loop {
                let token = scanner.next();
                let done = token.kind() == TokenKind::EndOfFile;
                tokens.push(token);
                if done {
                    break;
                }
            }
        }
        (fset, tokens, diagnostics)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind()).collect()
    }

    #[test]
    fn empty_input_is_just_end_of_file() {
        let (fset, tokens, diagnostics) = scan("");
        assert_eq!(kinds(&tokens), [TokenKind::EndOfFile]);
        let position = fset.position(tokens[0].pos());
        assert_eq!((position.line, position.column), (1, 1));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn separators_and_positions() {
        let (fset, tokens, _) = scan("abc\ndef\n ghi\n");
        let texts: Vec<_> = tokens.iter().map(|t| (t.separator(), t.source())).collect();
        assert_eq!(
            texts,
            [("", "abc"), ("\n", "def"), ("\n ", "ghi"), ("\n", "")]
        );
        let positions: Vec<_> = tokens
            .iter()
            .map(|t| {
                let p = fset.position(t.pos());
                (p.line, p.column)
            })
            .collect();
        assert_eq!(positions, [(1, 1), (2, 1), (3, 2), (3, 6)]);
    }

    #[test]
    fn stream_reconstructs_the_input() {
        let source = indoc! {r#"
            // a leading comment
            int main(void) {
                const char *s = "hi\n"; /* inline */
                return s[0] == 'h' ? 0 : 1;
            }
        "#};
        let (_, tokens, diagnostics) = scan(source);
        let rebuilt: String = tokens
            .iter()
            .map(|t| format!("{}{}", t.separator(), t.source()))
            .collect();
        assert_eq!(rebuilt, source);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn comments_become_separators() {
        let (_, tokens, _) = scan("a /* one */ b // two\nc");
        assert_eq!(tokens[1].separator(), " /* one */ ");
        assert_eq!(tokens[2].separator(), " // two\n");
        assert_eq!(tokens[2].source(), "c");
    }

    #[test]
    fn keyword_set_is_configurable() {
        let (_, tokens, _) = scan("int typeof x");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Keyword,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::EndOfFile
            ]
        );
        let (_, tokens, _) = scan_with("int typeof x", ScannerConfig::gnu());
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Keyword,
                TokenKind::Keyword,
                TokenKind::Ident,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn punctuators_use_longest_match() {
        use TokenKind::*;
        let (_, tokens, _) = scan("<<= >>= ... -> ## != a+++++b");
        assert_eq!(
            kinds(&tokens),
            [
                ShiftLeftAssign,
                ShiftRightAssign,
                Ellipsis,
                Arrow,
                HashHash,
                NotEqual,
                Ident,
                Inc,
                Inc,
                Add,
                Ident,
                EndOfFile
            ]
        );
    }

    #[test]
    fn numeric_constants() {
        use TokenKind::*;
        let (_, tokens, diagnostics) = scan("0x1f 3.14 1e10 1e+5f 077 42ul .5 0x1.8p3");
        assert_eq!(
            kinds(&tokens),
            [
                IntLit, FloatLit, FloatLit, FloatLit, IntLit, IntLit, FloatLit, FloatLit,
                EndOfFile
            ]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn missing_exponent_is_reported() {
        let (_, tokens, diagnostics) = scan("1e+;");
        assert_eq!(
            kinds(&tokens),
            [TokenKind::FloatLit, TokenKind::Semi, TokenKind::EndOfFile]
        );
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn hex_constant_without_digits_is_reported() {
        let (_, tokens, diagnostics) = scan("0x;");
        assert_eq!(
            kinds(&tokens),
            [TokenKind::IntLit, TokenKind::Semi, TokenKind::EndOfFile]
        );
        assert_eq!(tokens[0].source(), "0x");
        assert_eq!(diagnostics.len(), 1);
        let (_, _, diagnostics) = scan("0x1f");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn glued_identifier_needs_extended_errors() {
        let (_, _, diagnostics) = scan("123abc");
        assert!(diagnostics.is_empty());
        let config = ScannerConfig::c11().with_extended_errors();
        let (_, tokens, diagnostics) = scan_with("123abc", config);
        assert_eq!(
            kinds(&tokens),
            [TokenKind::IntLit, TokenKind::Ident, TokenKind::EndOfFile]
        );
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn prefixed_literals() {
        use TokenKind::*;
        let (_, tokens, _) = scan(r#"L"wide" u8"narrow" L'c' u'x' U'y'"#);
        assert_eq!(
            kinds(&tokens),
            [StringLit, StringLit, CharLit, CharLit, CharLit, EndOfFile]
        );
        assert_eq!(tokens[0].source(), r#"L"wide""#);
    }

    #[test]
    fn unterminated_string_recovers_at_the_line_break() {
        let (fset, tokens, diagnostics) = scan("\"abc\nd");
        assert_eq!(
            kinds(&tokens),
            [TokenKind::StringLit, TokenKind::Ident, TokenKind::EndOfFile]
        );
        assert_eq!(tokens[0].source(), "\"abc");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(fset.position(tokens[1].pos()).line, 2);
    }

    #[test]
    fn unterminated_comment_is_reported() {
        let (_, tokens, diagnostics) = scan("x /* never closed");
        assert_eq!(kinds(&tokens), [TokenKind::Ident, TokenKind::EndOfFile]);
        assert_eq!(tokens[1].separator(), " /* never closed");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn halting_sink_stops_the_scan() {
        let mut fset = SourceFileSet::new();
        let mut sink = FailFast::new();
        let mut scanner = Scanner::new(
            &mut fset,
            "test.c",
            "a @ b",
            ScannerConfig::default(),
            &mut sink,
        )
        .unwrap();
        assert_eq!(scanner.next().kind(), TokenKind::Ident);
        assert_eq!(scanner.next().kind(), TokenKind::Error);
        // `b` is never scanned; the stream winds down to end of file.
        assert_eq!(scanner.next().kind(), TokenKind::EndOfFile);
        assert_eq!(scanner.next().kind(), TokenKind::EndOfFile);
        assert_eq!(sink.diagnostics.len(), 1);
    }

    #[test]
    fn newlines_inside_comments_still_register_lines() {
        let (fset, tokens, _) = scan("/* one\ntwo */ x");
        let position = fset.position(tokens[0].pos());
        assert_eq!((position.line, position.column), (2, 8));
    }

    #[test]
    fn line_splice_stays_in_the_separator() {
        let (_, tokens, _) = scan("#define A \\\n 1");
        let one = tokens.iter().find(|t| t.source() == "1").unwrap();
        assert_eq!(one.separator(), " \\\n ");
    }
}
