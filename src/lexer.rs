use crate::error::{ScrapError, Span};
use crate::token::{self, Position, Token, TokenKind};

/// Streaming scanner over the decoded characters of a source text.
///
/// Every call to [`Lexer::scan`] yields the next token. Once the source is
/// exhausted the lexer keeps returning `Eof`.
pub struct Lexer {
    source: Vec<char>,
    current: usize,
    line: usize,
    column: usize,
    start: usize,
    start_position: Position,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
            start: 0,
            start_position: Position::start(),
        }
    }

    /// Scans every token up to and including `Eof`.
    pub fn collect(&mut self) -> Result<Vec<Token>, ScrapError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan()?;
            let done = token.is(TokenKind::Eof);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn scan(&mut self) -> Result<Token, ScrapError> {
        self.skip_whitespace();

        self.start = self.current;
        self.start_position = self.position();

        if self.is_at_end() {
            return Ok(Token::new(TokenKind::Eof, String::new(), self.start_position));
        }

        let c = self.advance();
        match c {
            '(' => Ok(self.make(TokenKind::LeftParen)),
            ')' => Ok(self.make(TokenKind::RightParen)),
            '{' => Ok(self.make(TokenKind::LeftBrace)),
            '}' => Ok(self.make(TokenKind::RightBrace)),
            '[' => Ok(self.make(TokenKind::LeftBracket)),
            ']' => Ok(self.make(TokenKind::RightBracket)),
            ',' => Ok(self.make(TokenKind::Comma)),
            ';' => Ok(self.make(TokenKind::Semicolon)),
            '?' => Ok(self.make(TokenKind::Question)),
            '&' => Ok(self.make(TokenKind::Amper)),
            '|' => Ok(self.make(TokenKind::Pipe)),
            '+' => {
                let kind = if self.match_char('+') {
                    TokenKind::Increment
                } else if self.match_char('=') {
                    TokenKind::AddAssign
                } else {
                    TokenKind::Plus
                };
                Ok(self.make(kind))
            }
            '-' => {
                let kind = if self.match_char('-') {
                    TokenKind::Decrement
                } else if self.match_char('=') {
                    TokenKind::MinusAssign
                } else if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                };
                Ok(self.make(kind))
            }
            '*' => {
                let kind = self.either('=', TokenKind::MultAssign, TokenKind::Star);
                Ok(self.make(kind))
            }
            '%' => {
                let kind = self.either('=', TokenKind::ModAssign, TokenKind::Percent);
                Ok(self.make(kind))
            }
            '=' => {
                let kind = self.either('=', TokenKind::EqualEqual, TokenKind::Equal);
                Ok(self.make(kind))
            }
            '!' => {
                let kind = self.either('=', TokenKind::BangEqual, TokenKind::Bang);
                Ok(self.make(kind))
            }
            '<' => {
                let kind = self.either('=', TokenKind::LessEqual, TokenKind::Less);
                Ok(self.make(kind))
            }
            '>' => {
                let kind = self.either('=', TokenKind::GreaterEqual, TokenKind::Greater);
                Ok(self.make(kind))
            }
            ':' => {
                let kind = self.either(':', TokenKind::ModAccessor, TokenKind::Colon);
                Ok(self.make(kind))
            }
            '.' => {
                let kind = if self.match_char('.') {
                    self.either('.', TokenKind::Spread, TokenKind::Slice)
                } else {
                    TokenKind::Dot
                };
                Ok(self.make(kind))
            }
            '/' => {
                if self.match_char('/') {
                    Ok(self.line_comment())
                } else if self.match_char('*') {
                    self.block_comment()
                } else {
                    let kind = self.either('=', TokenKind::DivAssign, TokenKind::Slash);
                    Ok(self.make(kind))
                }
            }
            '"' | '`' | '\'' => self.text(c),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.identifier()),
            _ => Ok(self.make(TokenKind::Unknown)),
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column, self.current)
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    /// Consumes one character, keeping line and column in sync.
    ///
    /// A `\r\n` pair advances the line once: the `\r` defers to the `\n`.
    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;

        match c {
            '\n' => self.new_line(),
            '\r' if self.peek() != '\n' => self.new_line(),
            _ => self.column += 1,
        }
        c
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.match_char(next) {
            long
        } else {
            short
        }
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn span(&self) -> Span {
        Span::new(self.start, self.current.max(self.start + 1))
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.lexeme(), self.start_position)
    }

    fn error(&self, message: String) -> ScrapError {
        ScrapError::lexical(self.start_position, self.span(), message)
    }

    fn line_comment(&mut self) -> Token {
        while !self.is_at_end() && self.peek() != '\n' && self.peek() != '\r' {
            self.advance();
        }
        self.make(TokenKind::Comment)
    }

    fn block_comment(&mut self) -> Result<Token, ScrapError> {
        loop {
            if self.is_at_end() {
                return Err(self.error("Unterminated block comment".to_string()));
            }
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return Ok(self.make(TokenKind::Comment));
            }
            self.advance();
        }
    }

    fn text(&mut self, delimiter: char) -> Result<Token, ScrapError> {
        while !self.is_at_end() && self.peek() != delimiter {
            self.advance();
        }

        if self.is_at_end() {
            let what = if delimiter == '\'' { "character" } else { "string" };
            return Err(self.error(format!("Unterminated {} literal", what)));
        }

        // closing delimiter
        self.advance();

        if delimiter == '\'' {
            let length = self.current - self.start - 2;
            if length != 1 {
                return Err(self.error(format!(
                    "Character literals must contain exactly one character, found {}",
                    length
                )));
            }
            return Ok(self.make(TokenKind::Char));
        }

        Ok(self.make(TokenKind::String))
    }

    fn digits(&mut self) {
        while self.peek().is_ascii_digit() || self.peek() == '_' {
            self.advance();
        }
    }

    fn number(&mut self) -> Result<Token, ScrapError> {
        self.digits();

        let mut kind = TokenKind::Integer;
        if self.peek() == '.' {
            if self.peek_next().is_ascii_digit() {
                kind = TokenKind::Float;
                self.advance();
                self.digits();

                if self.peek() == '.' && self.peek_next().is_ascii_digit() {
                    self.advance();
                    self.digits();
                    return Err(self.error(format!("Malformed float literal '{}'", self.lexeme())));
                }
            } else if self.peek_next() != '.' {
                self.advance();
                return Err(self.error(format!(
                    "Trailing '.' in numeric literal '{}'",
                    self.lexeme()
                )));
            }
        }

        let text = self.lexeme();
        let misplaced_separator = text
            .split('.')
            .any(|part| part.starts_with('_') || part.ends_with('_'));
        if misplaced_separator {
            return Err(self.error(format!(
                "Misplaced '_' separator in numeric literal '{}'",
                text
            )));
        }

        let digits = text.replace('_', "");
        if kind == TokenKind::Integer && digits.parse::<i64>().is_err() {
            return Err(self.error(format!("Integer literal '{}' is out of range", text)));
        }

        Ok(self.make(kind))
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text = self.lexeme();
        let kind = match token::keyword(&text) {
            Some(TokenKind::And) if self.explicit_suffix() => TokenKind::ExplicitAnd,
            Some(TokenKind::Or) if self.explicit_suffix() => TokenKind::ExplicitOr,
            Some(kind) => kind,
            None if text == "_" => TokenKind::Underscore,
            None => TokenKind::Identifier,
        };

        self.make(kind)
    }

    /// Consumes the `!` of `and!` / `or!` unless it starts a `!=`.
    fn explicit_suffix(&mut self) -> bool {
        if self.peek() == '!' && self.peek_next() != '=' {
            self.advance();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .collect()
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn greedy_operators() {
        assert_eq!(
            kinds(": :: = == . .. ... + ++ - -- -> ! !="),
            vec![
                TokenKind::Colon,
                TokenKind::ModAccessor,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Dot,
                TokenKind::Slice,
                TokenKind::Spread,
                TokenKind::Plus,
                TokenKind::Increment,
                TokenKind::Minus,
                TokenKind::Decrement,
                TokenKind::Arrow,
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("fn sum var _ and! or"),
            vec![
                TokenKind::Fn,
                TokenKind::Identifier,
                TokenKind::Var,
                TokenKind::Underscore,
                TokenKind::ExplicitAnd,
                TokenKind::Or,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.scan().unwrap().kind, TokenKind::Identifier);
        assert_eq!(lexer.scan().unwrap().kind, TokenKind::Eof);
        assert_eq!(lexer.scan().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn crlf_counts_as_one_line() {
        let tokens = Lexer::new("a\r\nb\rc\nd").collect().unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.position.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 4]);
        assert_eq!(tokens[1].position.column, 1);
    }

    #[test]
    fn numbers() {
        let tokens = Lexer::new("1_000 3.14 1..5").collect().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].lexeme, "1_000");
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[2].kind, TokenKind::Integer);
        assert_eq!(tokens[3].kind, TokenKind::Slice);
        assert_eq!(tokens[4].kind, TokenKind::Integer);
    }

    #[test]
    fn malformed_numbers() {
        for source in ["42.", "1_", "1_.5", "3.14.159", "99999999999999999999"] {
            let error = Lexer::new(source).collect().unwrap_err();
            assert_eq!(error.kind, ErrorKind::Lexical, "{}", source);
        }
    }

    #[test]
    fn unterminated_literals_are_errors() {
        for source in ["\"hello", "'a", "`tpl", "/* open"] {
            let error = Lexer::new(source).collect().unwrap_err();
            assert_eq!(error.kind, ErrorKind::Lexical, "{}", source);
            assert_eq!(error.position, Some(Position::start()));
        }
    }

    #[test]
    fn comments_are_tokens() {
        let tokens = Lexer::new("a // note\n/* block */ b").collect().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Comment,
                TokenKind::Comment,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[1].lexeme, "// note");
    }

    #[test]
    fn unknown_characters_are_tokens() {
        let tokens = Lexer::new("@").collect().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Unknown);
        assert_eq!(tokens[0].lexeme, "@");
    }

    #[test]
    fn lexemes_reconstruct_source_without_whitespace() {
        let source = "fn main() {\n  const x = [1, 2.5, \"hi\"] // tail\n  return x::y\n}";
        let rebuilt: String = Lexer::new(source)
            .collect()
            .unwrap()
            .iter()
            .filter(|t| !t.is(TokenKind::Comment))
            .map(|t| t.lexeme.as_str())
            .collect();
        let expected: String = source
            .replace("// tail", "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn char_literal_must_hold_one_character() {
        assert_eq!(kinds("'x'")[0], TokenKind::Char);
        assert!(Lexer::new("'xy'").collect().is_err());
    }
}
