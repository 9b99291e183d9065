use std::collections::VecDeque;

use cfe_lexer::{token::Token, token_stream::TokenStream};

/// A contiguous run of tokens. Consumption advances a head index instead of
/// shifting the vector, so popping from the front is O(1).
#[derive(Debug, Clone)]
pub struct TokenRun {
    tokens: Vec<Token>,
    head: usize,
}

impl TokenRun {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, head: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.head >= self.tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len() - self.head
    }

    fn pop_front(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.head).cloned();
        if token.is_some() {
            self.head += 1;
        }
        token
    }

    fn peek_front(&self) -> Option<&Token> {
        self.tokens.get(self.head)
    }
}

/// The double-ended pushback structure the macro expander rescans through.
///
/// Tokens live in runs, so splicing substituted tokens back onto the front is
/// O(1) in the number of tokens already queued. The retained end-of-file
/// marker is produced forever once the queue drains, which keeps the
/// final-element invariant without storing the marker in a run.
#[derive(Debug, Clone)]
pub struct TokenDeque {
    runs: VecDeque<TokenRun>,
    eof: Token,
}

impl TokenDeque {
    pub fn new(eof: Token) -> Self {
        Self {
            runs: VecDeque::new(),
            eof,
        }
    }

    pub fn eof(&self) -> &Token {
        &self.eof
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(TokenRun::is_empty)
    }

    /// Queued tokens, not counting the end-of-file marker.
    pub fn len(&self) -> usize {
        self.runs.iter().map(TokenRun::len).sum()
    }

    pub fn push_back_run(&mut self, tokens: Vec<Token>) {
        if !tokens.is_empty() {
            self.runs.push_back(TokenRun::new(tokens));
        }
    }

    /// Splices a run in front of everything queued; the next pops come from
    /// it. This is how macro-substituted text re-enters the stream.
    pub fn push_front_run(&mut self, tokens: Vec<Token>) {
        if !tokens.is_empty() {
            self.runs.push_front(TokenRun::new(tokens));
        }
    }

    pub fn push_front(&mut self, token: Token) {
        self.push_front_run(vec![token]);
    }

    pub fn pop_front(&mut self) -> Option<Token> {
        loop {
            let front = self.runs.front_mut()?;
            if let Some(token) = front.pop_front() {
                if front.is_empty() {
                    self.runs.pop_front();
                }
                return Some(token);
            }
            self.runs.pop_front();
        }
    }

    pub fn peek_front(&self) -> Option<&Token> {
        self.runs.iter().find_map(TokenRun::peek_front)
    }
}

impl TokenStream for TokenDeque {
    fn next(&mut self) -> Token {
        self.pop_front().unwrap_or_else(|| self.eof.clone())
    }
}
