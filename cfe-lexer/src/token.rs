use std::{fmt, ops::Range, sync::Arc};

use cfe_foundation::source::SourceOffset;

use crate::token_stream::Channel;

/// Passes all the token kinds as a sequence of `Kind = "name",` into the
/// provided macro.
#[macro_export]
macro_rules! expand_token_kinds {
    ($x:path) => {
        $x! {
            Ident   = "identifier",
            Keyword = "keyword",

            IntLit    = "integer constant",
            FloatLit  = "floating constant",
            CharLit   = "character constant",
            StringLit = "string literal",

            LeftBracket  = "`[`",
            RightBracket = "`]`",
            LeftParen    = "`(`",
            RightParen   = "`)`",
            LeftBrace    = "`{`",
            RightBrace   = "`}`",
            Dot          = "`.`",
            Ellipsis     = "`...`",
            Arrow        = "`->`",
            Inc          = "`++`",
            Dec          = "`--`",
            BitAnd       = "`&`",
            BitOr        = "`|`",
            BitXor       = "`^`",
            BitNot       = "`~`",
            Add          = "`+`",
            Sub          = "`-`",
            Mul          = "`*`",
            Div          = "`/`",
            Rem          = "`%`",
            Not          = "`!`",
            ShiftLeft    = "`<<`",
            ShiftRight   = "`>>`",
            Less         = "`<`",
            Greater      = "`>`",
            LessEqual    = "`<=`",
            GreaterEqual = "`>=`",
            Equal        = "`==`",
            NotEqual     = "`!=`",
            And          = "`&&`",
            Or           = "`||`",
            Question     = "`?`",
            Colon        = "`:`",
            Semi         = "`;`",
            Comma        = "`,`",
            Assign       = "`=`",
            AddAssign    = "`+=`",
            SubAssign    = "`-=`",
            MulAssign    = "`*=`",
            DivAssign    = "`/=`",
            RemAssign    = "`%=`",
            ShiftLeftAssign  = "`<<=`",
            ShiftRightAssign = "`>>=`",
            AndAssign    = "`&=`",
            XorAssign    = "`^=`",
            OrAssign     = "`|=`",
            Hash         = "`#`",
            HashHash     = "`##`",

            // Used for errors produced by the scanner; skipped by anything
            // that only reads the CODE channel.
            Error = "error",
            EndOfFile = "end of file",
        }
    };
}

macro_rules! token_kind_enum {
    ($($name:tt = $pretty_name:tt),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        pub enum TokenKind {
            $($name),*
        }

        impl TokenKind {
            /// The name used when a kind appears in a diagnostic.
            pub fn pretty_name(&self) -> &'static str {
                match self {
                    $(Self::$name => $pretty_name),*
                }
            }
        }
    }
}

expand_token_kinds!(token_kind_enum);

impl TokenKind {
    pub fn is_punctuator(&self) -> bool {
        *self >= TokenKind::LeftBracket && *self <= TokenKind::HashHash
    }

    pub fn is_constant(&self) -> bool {
        *self >= TokenKind::IntLit && *self <= TokenKind::StringLit
    }

    /// Whether a token of this kind can name a preprocessing directive.
    /// Keywords qualify because `#if`, `#else` and friends lex their names
    /// with the configured keyword set applied.
    pub fn is_directive_name(&self) -> bool {
        matches!(self, TokenKind::Ident | TokenKind::Keyword)
    }

    pub const fn channel(&self) -> Channel {
        match self {
            TokenKind::Error => Channel::ERROR,
            _ => Channel::CODE,
        }
    }
}

/// One preprocessing token: a read-only view over a shared source buffer.
///
/// The separator - every whitespace and comment byte since the previous
/// token - is part of the view, so concatenating `separator() + source()`
/// across a whole stream reproduces the scanned input exactly. Cloning a
/// token clones the `Arc`, never the text.
#[derive(Clone)]
pub struct Token {
    kind: TokenKind,
    buffer: Arc<str>,
    sep_start: usize,
    tok_start: usize,
    tok_end: usize,
    /// Global offset of the token's first byte in the file set.
    pos: SourceOffset,
}

impl Token {
    /// Tokens are normally created only by the scanner, which upholds
    /// `sep_start <= tok_start <= tok_end` with `sep_end == tok_start`.
    pub fn new(
        kind: TokenKind,
        buffer: Arc<str>,
        sep_start: usize,
        tok_start: usize,
        tok_end: usize,
        pos: SourceOffset,
    ) -> Self {
        debug_assert!(sep_start <= tok_start && tok_start <= tok_end);
        debug_assert!(tok_end <= buffer.len());
        Self {
            kind,
            buffer,
            sep_start,
            tok_start,
            tok_end,
            pos,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Global offset of the token's first byte; resolve it through the
    /// source file set to get `file:line:col`.
    pub fn pos(&self) -> SourceOffset {
        self.pos
    }

    /// The token's own bytes. O(1); no copy.
    pub fn source(&self) -> &str {
        &self.buffer[self.tok_start..self.tok_end]
    }

    /// The whitespace and comments immediately preceding the token. O(1).
    pub fn separator(&self) -> &str {
        &self.buffer[self.sep_start..self.tok_start]
    }

    /// File-local byte range of the token's own bytes.
    pub fn local_range(&self) -> Range<usize> {
        self.tok_start..self.tok_end
    }

    /// File-local byte range including the separator.
    pub fn full_range(&self) -> Range<usize> {
        self.sep_start..self.tok_end
    }

    /// A zero-width end-of-file view at this token's position. Streams that
    /// must wind down early use this to keep their terminal-marker
    /// invariant.
    pub fn to_eof_marker(&self) -> Token {
        Token {
            kind: TokenKind::EndOfFile,
            buffer: Arc::clone(&self.buffer),
            sep_start: self.tok_start,
            tok_start: self.tok_start,
            tok_end: self.tok_start,
            pos: self.pos,
        }
    }

    /// Produces a token with the same kind, position and separator but new
    /// source bytes, backed by a fresh buffer. Tokens sharing the original
    /// buffer are unaffected.
    pub fn rebind(&self, text: &str) -> Token {
        let buffer: Arc<str> = Arc::from(format!("{}{}", self.separator(), text));
        let tok_start = self.tok_start - self.sep_start;
        Token {
            kind: self.kind,
            tok_end: buffer.len(),
            buffer,
            sep_start: 0,
            tok_start,
            pos: self.pos,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?} @ {})", self.kind, self.source(), self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(buffer: &str, sep_start: usize, tok_start: usize, tok_end: usize) -> Token {
        Token::new(
            TokenKind::Ident,
            Arc::from(buffer),
            sep_start,
            tok_start,
            tok_end,
            tok_start as SourceOffset,
        )
    }

    #[test]
    fn views_are_subslices() {
        let t = token("  abc", 0, 2, 5);
        assert_eq!(t.separator(), "  ");
        assert_eq!(t.source(), "abc");
    }

    #[test]
    fn tokens_share_a_buffer() {
        let buffer: Arc<str> = Arc::from("a b");
        let a = Token::new(TokenKind::Ident, Arc::clone(&buffer), 0, 0, 1, 0);
        let b = Token::new(TokenKind::Ident, Arc::clone(&buffer), 1, 2, 3, 2);
        assert_eq!(a.source(), "a");
        assert_eq!(b.separator(), " ");
        assert_eq!(b.source(), "b");
    }

    #[test]
    fn rebind_does_not_alias() {
        let buffer: Arc<str> = Arc::from(" x y");
        let x = Token::new(TokenKind::Ident, Arc::clone(&buffer), 0, 1, 2, 1);
        let y = Token::new(TokenKind::Ident, Arc::clone(&buffer), 2, 3, 4, 3);
        let pasted = x.rebind("xy");
        assert_eq!(pasted.source(), "xy");
        assert_eq!(pasted.separator(), " ");
        assert_eq!(pasted.pos(), x.pos());
        // The sibling over the original buffer is untouched.
        assert_eq!(x.source(), "x");
        assert_eq!(y.source(), "y");
    }
}
