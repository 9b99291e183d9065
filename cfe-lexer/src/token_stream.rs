use bitflags::bitflags;

use crate::token::{Token, TokenKind};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Channel: u8 {
        /// Main input: identifiers, constants, punctuators, end of file.
        const CODE  = 0x1;
        /// Best-effort tokens substituted for malformed input. Consumers
        /// that only care about well-formed code skip these; the diagnostics
        /// were already reported when the token was produced.
        const ERROR = 0x2;
    }
}

/// A forward-only source of preprocessing tokens, ending with an unbounded
/// run of [`TokenKind::EndOfFile`] tokens once the input is exhausted.
pub trait TokenStream {
    fn next(&mut self) -> Token;

    fn next_from(&mut self, channel: Channel) -> Token {
        loop {
            let token = self.next();
            if channel.contains(token.kind().channel()) || token.kind() == TokenKind::EndOfFile {
                return token;
            }
        }
    }
}

impl<T> TokenStream for &mut T
where
    T: TokenStream,
{
    fn next(&mut self) -> Token {
        <T as TokenStream>::next(self)
    }
}
