use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::Span;

/// Location of a token in the source. `offset` counts characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    Fn,
    Var,
    Const,
    Return,
    Import,
    From,
    Export,
    Class,
    Type,
    Interface,
    Enum,
    Module,
    For,
    While,
    Do,
    Break,
    Skip,
    If,
    Else,
    Elif,
    Match,
    Switch,
    Extends,
    Implements,
    Case,
    Default,
    Of,
    Try,
    Catch,
    Public,
    Private,
    Protected,
    Static,
    Override,
    Setter,
    Getter,
    Async,
    Await,
    Dissipate,
    Inline,
    Impl,
    Extern,

    // Binary operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    In,
    And,
    ExplicitAnd,
    Or,
    ExplicitOr,
    Instanceof,
    Less,
    Greater,
    Dot,
    Pipe,

    // Compound operators
    Increment,
    Decrement,
    AddAssign,
    MinusAssign,
    MultAssign,
    DivAssign,
    ModAssign,
    LessEqual,
    GreaterEqual,
    EqualEqual,
    BangEqual,
    ModAccessor,
    Slice,
    Spread,

    // Prefix operators
    Bang,
    Not,
    As,
    New,
    Drop,
    Amper,

    // Grouping
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    Equal,
    Comma,
    Arrow,
    Semicolon,
    Colon,
    Underscore,
    Question,

    // Literals
    String,
    Char,
    Integer,
    Float,
    Identifier,

    Comment,
    Eof,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("fn", TokenKind::Fn),
    ("var", TokenKind::Var),
    ("const", TokenKind::Const),
    ("return", TokenKind::Return),
    ("import", TokenKind::Import),
    ("from", TokenKind::From),
    ("export", TokenKind::Export),
    ("class", TokenKind::Class),
    ("type", TokenKind::Type),
    ("interface", TokenKind::Interface),
    ("enum", TokenKind::Enum),
    ("module", TokenKind::Module),
    ("for", TokenKind::For),
    ("while", TokenKind::While),
    ("do", TokenKind::Do),
    ("break", TokenKind::Break),
    ("skip", TokenKind::Skip),
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("elif", TokenKind::Elif),
    ("match", TokenKind::Match),
    ("switch", TokenKind::Switch),
    ("extends", TokenKind::Extends),
    ("implements", TokenKind::Implements),
    ("case", TokenKind::Case),
    ("default", TokenKind::Default),
    ("of", TokenKind::Of),
    ("try", TokenKind::Try),
    ("catch", TokenKind::Catch),
    ("public", TokenKind::Public),
    ("private", TokenKind::Private),
    ("protected", TokenKind::Protected),
    ("static", TokenKind::Static),
    ("override", TokenKind::Override),
    ("setter", TokenKind::Setter),
    ("getter", TokenKind::Getter),
    ("async", TokenKind::Async),
    ("await", TokenKind::Await),
    ("dissipate", TokenKind::Dissipate),
    ("inline", TokenKind::Inline),
    ("impl", TokenKind::Impl),
    ("extern", TokenKind::Extern),
    // operators spelled as words
    ("in", TokenKind::In),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
    ("instanceof", TokenKind::Instanceof),
    ("as", TokenKind::As),
    ("new", TokenKind::New),
    ("drop", TokenKind::Drop),
];

fn keyword_table() -> &'static HashMap<&'static str, TokenKind> {
    static TABLE: OnceLock<HashMap<&'static str, TokenKind>> = OnceLock::new();
    TABLE.get_or_init(|| KEYWORDS.iter().copied().collect())
}

/// Looks `text` up in the keyword table.
pub fn keyword(text: &str) -> Option<TokenKind> {
    keyword_table().get(text).copied()
}

/// A string names an identifier iff it is non-empty and not reserved.
pub fn is_identifier(text: &str) -> bool {
    !text.is_empty() && keyword(text).is_none()
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Fn | Var
                | Const
                | Return
                | Import
                | From
                | Export
                | Class
                | Type
                | Interface
                | Enum
                | Module
                | For
                | While
                | Do
                | Break
                | Skip
                | If
                | Else
                | Elif
                | Match
                | Switch
                | Extends
                | Implements
                | Case
                | Default
                | Of
                | Try
                | Catch
                | Public
                | Private
                | Protected
                | Static
                | Override
                | Setter
                | Getter
                | Async
                | Await
                | Dissipate
                | Inline
                | Impl
                | Extern
        )
    }

    pub fn is_operator(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Plus | Minus
                | Star
                | Slash
                | Percent
                | In
                | And
                | ExplicitAnd
                | Or
                | ExplicitOr
                | Instanceof
                | Less
                | Greater
                | Dot
                | Pipe
                | Bang
                | Not
                | As
                | New
                | Drop
                | Amper
                | Equal
                | Comma
                | LeftParen
                | RightParen
                | LeftBracket
                | RightBracket
        ) || self.is_compound()
    }

    pub fn is_compound(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Increment
                | Decrement
                | AddAssign
                | MinusAssign
                | MultAssign
                | DivAssign
                | ModAssign
                | LessEqual
                | GreaterEqual
                | EqualEqual
                | BangEqual
                | ModAccessor
                | Slice
                | Spread
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::String | TokenKind::Char | TokenKind::Integer | TokenKind::Float
        )
    }

    /// Binding power of infix operators. Higher values bind tighter.
    pub fn binding(&self) -> Option<(u8, Assoc)> {
        use TokenKind::*;
        let rule = match self {
            Equal | AddAssign | MinusAssign | MultAssign | DivAssign | ModAssign => {
                (1, Assoc::Right)
            }
            Slice => (2, Assoc::Left),
            Or | ExplicitOr => (3, Assoc::Left),
            And | ExplicitAnd => (4, Assoc::Left),
            EqualEqual | BangEqual => (5, Assoc::Left),
            Less | Greater | LessEqual | GreaterEqual | In => (6, Assoc::Left),
            Plus | Minus => (7, Assoc::Left),
            Star | Slash | Percent => (8, Assoc::Left),
            _ => return None,
        };
        Some(rule)
    }

    /// Operators allowed between type names in type expressions.
    pub fn type_binding(&self) -> Option<u8> {
        match self {
            TokenKind::Pipe => Some(1),
            TokenKind::Amper => Some(2),
            _ => None,
        }
    }

    /// Human readable spelling used in diagnostics.
    pub fn describe(&self) -> &'static str {
        use TokenKind::*;
        if let Some((text, _)) = KEYWORDS.iter().find(|(_, kind)| kind == self) {
            return *text;
        }
        match self {
            ExplicitAnd => "and!",
            ExplicitOr => "or!",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Less => "<",
            Greater => ">",
            Dot => ".",
            Pipe => "|",
            Increment => "++",
            Decrement => "--",
            AddAssign => "+=",
            MinusAssign => "-=",
            MultAssign => "*=",
            DivAssign => "/=",
            ModAssign => "%=",
            LessEqual => "<=",
            GreaterEqual => ">=",
            EqualEqual => "==",
            BangEqual => "!=",
            ModAccessor => "::",
            Slice => "..",
            Spread => "...",
            Bang => "!",
            Amper => "&",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftBrace => "{",
            RightBrace => "}",
            Equal => "=",
            Comma => ",",
            Arrow => "->",
            Semicolon => ";",
            Colon => ":",
            Underscore => "_",
            Question => "?",
            String => "STRING",
            Char => "CHAR",
            Integer => "NUMBER",
            Float => "FLOAT",
            Identifier => "IDENTIFIER",
            Comment => "COMMENT",
            Eof => "EOF",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Immutable token produced by the lexer. `lexeme` is the raw source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, position: Position) -> Self {
        Self {
            kind,
            lexeme,
            position,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn span(&self) -> Span {
        let len = self.lexeme.chars().count().max(1);
        Span::new(self.position.offset, self.position.offset + len)
    }

    /// Text between the delimiters of a string or char literal.
    pub fn literal_content(&self) -> &str {
        match self.kind {
            TokenKind::String | TokenKind::Char if self.lexeme.len() >= 2 => {
                &self.lexeme[1..self.lexeme.len() - 1]
            }
            _ => &self.lexeme,
        }
    }
}
