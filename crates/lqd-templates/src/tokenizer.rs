use std::collections::VecDeque;

const TAG_START: &str = "{%";
const TAG_END: &str = "%}";
const VARIABLE_START: &str = "{{";

/// A raw piece of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    /// `{% ... %}` including delimiters. Unterminated tags run to the end of
    /// the source.
    Tag(String),
    /// `{{ ... }}` including delimiters.
    Variable(String),
    /// One line of a `{% liquid %}` block.
    Line(String),
}

impl Token {
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Text(s) | Self::Tag(s) | Self::Variable(s) | Self::Line(s) => s,
        }
    }
}

/// Queue of tokens shared by the body parser and the tags that consume
/// their own content.
#[derive(Debug)]
pub struct Tokenizer {
    tokens: VecDeque<Token>,
    line_number: Option<usize>,
    for_liquid_tag: bool,
}

impl Tokenizer {
    /// Tokenize template source. With `line_numbers`, lines are counted from 1.
    #[must_use]
    pub fn new(source: &str, line_numbers: bool) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize().into(),
            line_number: line_numbers.then_some(1),
            for_liquid_tag: false,
        }
    }

    /// Tokenize the body of a `{% liquid %}` tag, one token per line.
    #[must_use]
    pub fn for_liquid_tag(markup: &str, line_number: Option<usize>) -> Self {
        let mut lines: Vec<&str> = markup.split('\n').collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        Self {
            tokens: lines
                .into_iter()
                .map(|line| Token::Line(line.to_owned()))
                .collect(),
            line_number,
            for_liquid_tag: true,
        }
    }

    /// Take the next token, advancing the line counter past it.
    pub fn shift(&mut self) -> Option<Token> {
        let token = self.tokens.pop_front()?;
        if let Some(line) = self.line_number.as_mut() {
            *line += if self.for_liquid_tag {
                1
            } else {
                token.raw().matches('\n').count()
            };
        }
        Some(token)
    }

    #[must_use]
    pub fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    #[must_use]
    pub fn is_liquid_tag(&self) -> bool {
        self.for_liquid_tag
    }
}

struct Lexer<'s> {
    source: &'s str,
    start: usize,
    current: usize,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.start = self.current;
            let rest = &self.source[self.current..];

            let token = if rest.starts_with(TAG_START) {
                self.lex_tag()
            } else if rest.starts_with(VARIABLE_START) {
                self.lex_variable()
            } else {
                self.lex_text()
            };
            tokens.push(token);
        }

        tokens
    }

    fn lex_tag(&mut self) -> Token {
        self.current += TAG_START.len();
        self.consume_until(TAG_END);
        self.current = (self.current + TAG_END.len()).min(self.source.len());
        Token::Tag(self.lexeme())
    }

    fn lex_variable(&mut self) -> Token {
        self.current += VARIABLE_START.len();
        self.consume_until("}");
        if !self.is_at_end() {
            self.current += 1;
            if self.source[self.current..].starts_with('}') {
                self.current += 1;
            }
        }
        Token::Variable(self.lexeme())
    }

    fn lex_text(&mut self) -> Token {
        while !self.is_at_end() {
            let rest = &self.source[self.current..];
            if rest.starts_with(TAG_START) || rest.starts_with(VARIABLE_START) {
                break;
            }
            self.consume();
        }
        Token::Text(self.lexeme())
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].to_owned()
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    fn consume(&mut self) {
        if let Some(ch) = self.source[self.current..].chars().next() {
            self.current += ch.len_utf8();
        }
    }

    /// Advance to the next `delimiter`, or to the end of the source.
    fn consume_until(&mut self, delimiter: &str) {
        match self.source[self.current..].find(delimiter) {
            Some(offset) => self.current += offset,
            None => self.current = self.source.len(),
        }
    }
}
