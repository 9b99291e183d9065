//! Groups a file's token stream into preprocessing lines.
//!
//! The grouper only recognizes line shape: which lines are text, which are
//! control lines, and where the file ends. Conditional evaluation and macro
//! substitution belong to the expander that consumes the group.

pub mod pushback;

use cfe_foundation::errors::{Diagnostic, DiagnosticSink, ErrorResponse, Label};
use cfe_foundation::source::SourceFileId;
use cfe_lexer::token::{Token, TokenKind};
use cfe_lexer::token_stream::TokenStream;
use indoc::indoc;
use tracing::trace;

use crate::pushback::TokenDeque;

/// The directive named by a control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Include,
    Define,
    Undef,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Line,
    Error,
    Pragma,
    /// A lone `#`, which the standard says to ignore.
    Null,
    /// `#` followed by something that is not a known directive name.
    NonDirective,
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "include" => Self::Include,
            "define" => Self::Define,
            "undef" => Self::Undef,
            "if" => Self::If,
            "ifdef" => Self::Ifdef,
            "ifndef" => Self::Ifndef,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "endif" => Self::Endif,
            "line" => Self::Line,
            "error" => Self::Error,
            "pragma" => Self::Pragma,
            _ => return None,
        })
    }

    pub fn opens_conditional(&self) -> bool {
        matches!(self, Self::If | Self::Ifdef | Self::Ifndef)
    }

    pub fn continues_conditional(&self) -> bool {
        matches!(self, Self::Elif | Self::Else)
    }
}

/// A preprocessing line of the form `# name arguments...`.
#[derive(Debug, Clone)]
pub struct ControlLine {
    pub hash: Token,
    /// `None` for the null directive and for `#` followed by a non-name.
    pub name: Option<Token>,
    pub kind: DirectiveKind,
    /// Everything after the name, up to the line break.
    pub arguments: Vec<Token>,
}

/// One element of a [`PreprocessingGroup`].
#[derive(Debug, Clone)]
pub enum GroupPart {
    TextLine(Vec<Token>),
    ControlLine(ControlLine),
    /// Terminal marker; its token's position is the scan's final position,
    /// which also reveals the file's total line count.
    EndOfFile(Token),
}

impl GroupPart {
    /// The part's tokens in source order.
    pub fn into_tokens(self) -> Vec<Token> {
        match self {
            GroupPart::TextLine(tokens) => tokens,
            GroupPart::ControlLine(line) => {
                let mut tokens = Vec::with_capacity(2 + line.arguments.len());
                tokens.push(line.hash);
                tokens.extend(line.name);
                tokens.extend(line.arguments);
                tokens
            }
            GroupPart::EndOfFile(token) => vec![token],
        }
    }
}

/// The grouped preprocessing constructs of one file. Non-empty; the last
/// part is always the end-of-file marker, and nothing follows it.
#[derive(Debug, Clone)]
pub struct PreprocessingGroup {
    parts: Vec<GroupPart>,
}

impl PreprocessingGroup {
    pub fn parts(&self) -> &[GroupPart] {
        &self.parts
    }

    pub fn eof(&self) -> &Token {
        match self.parts.last() {
            Some(GroupPart::EndOfFile(token)) => token,
            _ => unreachable!("a preprocessing group always ends with its end-of-file marker"),
        }
    }

    /// Flattens the group into the pushback structure the macro expander
    /// consumes, one run per line.
    pub fn into_deque(mut self) -> TokenDeque {
        let Some(GroupPart::EndOfFile(eof)) = self.parts.pop() else {
            unreachable!("a preprocessing group always ends with its end-of-file marker");
        };
        let mut deque = TokenDeque::new(eof);
        for part in self.parts {
            deque.push_back_run(part.into_tokens());
        }
        deque
    }
}

/// Consumes a token stream and produces a [`PreprocessingGroup`].
pub struct Grouper<'a, T> {
    file: SourceFileId,
    tokens: T,
    sink: &'a mut dyn DiagnosticSink,
    /// Hash tokens of the `#if`/`#ifdef`/`#ifndef` lines still open, for
    /// shape-level stray/unterminated reporting only.
    open_conditionals: Vec<Token>,
    halted: bool,
}

impl<'a, T> Grouper<'a, T>
where
    T: TokenStream,
{
    pub fn new(file: SourceFileId, tokens: T, sink: &'a mut dyn DiagnosticSink) -> Self {
        Self {
            file,
            tokens,
            sink,
            open_conditionals: vec![],
            halted: false,
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if self.sink.emit(diagnostic) == ErrorResponse::Halt {
            trace!("sink requested halt; grouping stops at the current line");
            self.halted = true;
        }
    }

    /// A separator newline splits lines unless a backslash escapes it or a
    /// block comment swallows it (a comment reads as a single space, so a
    /// newline inside one never ends a directive). The newline terminating a
    /// line comment is not part of the comment and still breaks the line,
    /// even when the comment text contains `/*`.
    fn separator_breaks_line(separator: &str) -> bool {
        let bytes = separator.as_bytes();
        let mut index = 0;
        let mut in_block_comment = false;
        while index < bytes.len() {
            match bytes[index] {
                b'*' if in_block_comment && bytes.get(index + 1) == Some(&b'/') => {
                    in_block_comment = false;
                    index += 2;
                }
                b'/' if !in_block_comment && bytes.get(index + 1) == Some(&b'/') => {
                    index += 2;
                    while index < bytes.len() && bytes[index] != b'\n' {
                        index += 1;
                    }
                }
                b'/' if !in_block_comment && bytes.get(index + 1) == Some(&b'*') => {
                    in_block_comment = true;
                    index += 2;
                }
                b'\\' if !in_block_comment && bytes.get(index + 1) == Some(&b'\n') => {
                    index += 2;
                }
                b'\n' if !in_block_comment => return true,
                _ => index += 1,
            }
        }
        false
    }

    fn classify(&mut self, tokens: Vec<Token>) -> GroupPart {
        if tokens[0].kind() != TokenKind::Hash {
            return GroupPart::TextLine(tokens);
        }
        let mut rest = tokens.into_iter();
        let hash = rest.next().expect("a line never flushes empty");
        let Some(first) = rest.next() else {
            return GroupPart::ControlLine(ControlLine {
                hash,
                name: None,
                kind: DirectiveKind::Null,
                arguments: vec![],
            });
        };
        if !first.kind().is_directive_name() {
            let mut arguments = vec![first];
            arguments.extend(rest);
            return GroupPart::ControlLine(ControlLine {
                hash,
                name: None,
                kind: DirectiveKind::NonDirective,
                arguments,
            });
        }

        let kind = match DirectiveKind::from_name(first.source()) {
            Some(kind) => kind,
            None => {
                self.report(
                    Diagnostic::error(
                        self.file,
                        format!("unknown preprocessing directive `#{}`", first.source()),
                    )
                    .with_label(Label::primary(first.local_range(), "no such directive")),
                );
                DirectiveKind::NonDirective
            }
        };
        self.track_conditionals(kind, &hash, &first);

        GroupPart::ControlLine(ControlLine {
            hash,
            name: Some(first),
            kind,
            arguments: rest.collect(),
        })
    }

    /// Shape-level bookkeeping only; nothing here evaluates a condition.
    fn track_conditionals(&mut self, kind: DirectiveKind, hash: &Token, name: &Token) {
        if kind.opens_conditional() {
            self.open_conditionals.push(hash.clone());
        } else if kind == DirectiveKind::Endif {
            if self.open_conditionals.pop().is_none() {
                self.report(
                    Diagnostic::error(self.file, "`#endif` without a matching `#if`")
                        .with_label(Label::primary(
                            name.local_range(),
                            "this closes nothing",
                        ))
                        .with_note(indoc! {"
                            help: `#endif` closes an earlier `#if`, `#ifdef` or
                            `#ifndef`; there is no conditional open at this point
                        "}),
                );
            }
        } else if kind.continues_conditional() && self.open_conditionals.is_empty() {
            self.report(
                Diagnostic::error(
                    self.file,
                    format!("`#{}` without a matching `#if`", name.source()),
                )
                .with_label(Label::primary(name.local_range(), "no conditional is open")),
            );
        }
    }

    /// Drives the stream to its end-of-file marker and groups everything on
    /// the way.
    pub fn into_group(mut self) -> PreprocessingGroup {
        let mut parts = vec![];
        let mut line: Vec<Token> = vec![];
        loop {
            let token = self.tokens.next();
            if token.kind() == TokenKind::EndOfFile || self.halted {
                let marker = if token.kind() == TokenKind::EndOfFile {
                    token
                } else {
                    // The sink stopped us mid-line; the discarded token
                    // still pins down where the group ends.
                    token.to_eof_marker()
                };
                if !line.is_empty() {
                    let part = self.classify(std::mem::take(&mut line));
                    parts.push(part);
                }
                if let Some(open) = self.open_conditionals.last().cloned() {
                    self.report(
                        Diagnostic::warning(self.file, "unterminated conditional directive")
                            .with_label(Label::primary(
                                open.local_range(),
                                "this conditional is never closed",
                            )),
                    );
                }
                parts.push(GroupPart::EndOfFile(marker));
                break;
            }
            if !line.is_empty() && Self::separator_breaks_line(token.separator()) {
                let part = self.classify(std::mem::take(&mut line));
                parts.push(part);
            }
            line.push(token);
        }
        PreprocessingGroup { parts }
    }
}

#[cfg(test)]
mod tests {
    use cfe_foundation::errors::FailFast;
    use cfe_foundation::source::SourceFileSet;
    use cfe_lexer::scanner::{Scanner, ScannerConfig};
    use indoc::indoc;

    use super::*;

    fn group(source: &str) -> (PreprocessingGroup, Vec<Diagnostic>) {
        let mut fset = SourceFileSet::new();
        let mut scan_diagnostics = vec![];
        let mut group_diagnostics = vec![];
        let group = {
            let scanner = Scanner::new(
                &mut fset,
                "group.c",
                source,
                ScannerConfig::default(),
                &mut scan_diagnostics,
            )
            .unwrap();
            let file = scanner.file();
            Grouper::new(file, scanner, &mut group_diagnostics).into_group()
        };
        assert!(scan_diagnostics.is_empty());
        (group, group_diagnostics)
    }

    fn line_sources(part: &GroupPart) -> Vec<String> {
        part.clone()
            .into_tokens()
            .iter()
            .map(|t| t.source().to_string())
            .collect()
    }

    #[test]
    fn text_and_control_lines() {
        let (group, diagnostics) = group(indoc! {r#"
            #include <stdio.h>
            int x;
            #define N 4
        "#});
        assert!(diagnostics.is_empty());
        let parts = group.parts();
        assert_eq!(parts.len(), 4);
        let GroupPart::ControlLine(include) = &parts[0] else {
            panic!("expected a control line, got {:?}", parts[0]);
        };
        assert_eq!(include.kind, DirectiveKind::Include);
        assert_eq!(include.name.as_ref().unwrap().source(), "include");
        assert_eq!(include.arguments[0].source(), "<");
        let GroupPart::TextLine(text) = &parts[1] else {
            panic!("expected a text line, got {:?}", parts[1]);
        };
        assert_eq!(text[0].source(), "int");
        let GroupPart::ControlLine(define) = &parts[2] else {
            panic!("expected a control line, got {:?}", parts[2]);
        };
        assert_eq!(define.kind, DirectiveKind::Define);
        assert_eq!(
            define
                .arguments
                .iter()
                .map(|t| t.source())
                .collect::<Vec<_>>(),
            ["N", "4"]
        );
        assert!(matches!(parts[3], GroupPart::EndOfFile(_)));
    }

    #[test]
    fn group_always_ends_with_the_marker() {
        let (empty, _) = group("");
        assert_eq!(empty.parts().len(), 1);
        assert!(matches!(empty.parts()[0], GroupPart::EndOfFile(_)));
        let (nonempty, _) = group("int x;\n");
        assert!(matches!(
            nonempty.parts().last(),
            Some(GroupPart::EndOfFile(_))
        ));
    }

    #[test]
    fn escaped_newline_continues_a_control_line() {
        let (group, diagnostics) = group("#define A \\\n 1\nx\n");
        assert!(diagnostics.is_empty());
        let parts = group.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(line_sources(&parts[0]), ["#", "define", "A", "1"]);
        assert_eq!(line_sources(&parts[1]), ["x"]);
    }

    #[test]
    fn block_comment_newline_does_not_end_a_directive() {
        let (group, diagnostics) = group("#define A /* one\ntwo */ 1\nx\n");
        assert!(diagnostics.is_empty());
        let parts = group.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(line_sources(&parts[0]), ["#", "define", "A", "1"]);
    }

    #[test]
    fn line_comment_newline_still_ends_the_line() {
        // The comment ends at the newline even though its text opens what
        // looks like a block comment.
        let (group, diagnostics) = group("#define A 1 // see /* note\nint x;\n");
        assert!(diagnostics.is_empty());
        let parts = group.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(line_sources(&parts[0]), ["#", "define", "A", "1"]);
        assert_eq!(line_sources(&parts[1]), ["int", "x", ";"]);
        assert!(matches!(parts[2], GroupPart::EndOfFile(_)));
    }

    #[test]
    fn null_directive() {
        let (group, diagnostics) = group("#\nx\n");
        assert!(diagnostics.is_empty());
        let GroupPart::ControlLine(line) = &group.parts()[0] else {
            panic!("expected a control line");
        };
        assert_eq!(line.kind, DirectiveKind::Null);
        assert!(line.name.is_none());
        assert!(line.arguments.is_empty());
    }

    #[test]
    fn unknown_directive_is_reported() {
        let (group, diagnostics) = group("#frobnicate all the things\n");
        assert_eq!(diagnostics.len(), 1);
        let GroupPart::ControlLine(line) = &group.parts()[0] else {
            panic!("expected a control line");
        };
        assert_eq!(line.kind, DirectiveKind::NonDirective);
    }

    #[test]
    fn stray_endif_is_reported() {
        let (_, diagnostics) = group("#endif\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("#endif"));
    }

    #[test]
    fn balanced_conditionals_are_quiet() {
        let (_, diagnostics) = group(indoc! {"
            #ifdef FOO
            int x;
            #else
            int y;
            #endif
        "});
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unterminated_conditional_is_reported() {
        let (_, diagnostics) = group("#if 1\nint x;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "unterminated conditional directive"
        );
    }

    #[test]
    fn eof_marker_recovers_the_line_count() {
        let mut fset = SourceFileSet::new();
        let mut scan_sink = ();
        let mut group_sink = ();
        let group = {
            let scanner = Scanner::new(
                &mut fset,
                "lines.c",
                "a\nb\nc\n",
                ScannerConfig::default(),
                &mut scan_sink,
            )
            .unwrap();
            let file = scanner.file();
            Grouper::new(file, scanner, &mut group_sink).into_group()
        };
        let position = fset.position(group.eof().pos());
        assert_eq!(position.line, 3);
    }

    #[test]
    fn halting_sink_ends_the_group_early() {
        let mut fset = SourceFileSet::new();
        let mut scan_sink = ();
        let mut group_sink = FailFast::new();
        let group = {
            let scanner = Scanner::new(
                &mut fset,
                "halt.c",
                "#endif\nint x;\n",
                ScannerConfig::default(),
                &mut scan_sink,
            )
            .unwrap();
            let file = scanner.file();
            Grouper::new(file, scanner, &mut group_sink).into_group()
        };
        assert_eq!(group_sink.diagnostics.len(), 1);
        assert!(matches!(group.parts().last(), Some(GroupPart::EndOfFile(_))));
    }

    #[test]
    fn deque_flattens_lines_in_order() {
        let (group, _) = group("#define N 4\nint x = N;\n");
        let mut deque = group.into_deque();
        let mut sources = vec![];
        while let Some(token) = deque.pop_front() {
            sources.push(token.source().to_string());
        }
        assert_eq!(
            sources,
            ["#", "define", "N", "4", "int", "x", "=", "N", ";"]
        );
        assert_eq!(deque.next().kind(), TokenKind::EndOfFile);
    }
}
