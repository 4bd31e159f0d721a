use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::token::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Runtime,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScrapError {
    pub kind: ErrorKind,
    pub span: Span,
    pub position: Option<Position>,
    pub message: String,
    pub help: Option<String>,
}

impl ScrapError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            position: None,
            message,
            help: None,
        }
    }

    pub fn lexical(position: Position, span: Span, message: String) -> Self {
        Self {
            position: Some(position),
            ..Self::new(ErrorKind::Lexical, span, message)
        }
    }

    pub fn syntax(position: Position, span: Span, message: String) -> Self {
        Self {
            position: Some(position),
            ..Self::new(ErrorKind::Syntax, span, message)
        }
    }

    pub fn syntax_with_help(position: Position, span: Span, message: String, help: String) -> Self {
        Self {
            help: Some(help),
            ..Self::syntax(position, span, message)
        }
    }

    pub fn runtime(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Runtime, span, message)
    }

    pub fn runtime_with_help(span: Span, message: String, help: String) -> Self {
        Self {
            help: Some(help),
            ..Self::runtime(span, message)
        }
    }

    pub fn is_runtime(&self) -> bool {
        self.kind == ErrorKind::Runtime
    }

    /// Plain-text rendering used when colored reports are not wanted.
    ///
    /// Lexical and syntax errors carry their source position, runtime errors
    /// are reported as the bare message.
    pub fn diagnostic(&self, filename: &str) -> String {
        match (self.kind, self.position) {
            (ErrorKind::Runtime, _) | (_, None) => self.message.clone(),
            (_, Some(position)) => format!(
                "{}\nAt {}:{}:{}",
                self.message, filename, position.line, position.column
            ),
        }
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        let color = match self.kind {
            ErrorKind::Lexical => Color::Red,
            ErrorKind::Syntax => Color::Yellow,
            ErrorKind::Runtime => Color::Magenta,
        };

        let kind_str = match self.kind {
            ErrorKind::Lexical => "Lexical Error",
            ErrorKind::Syntax => "Syntax Error",
            ErrorKind::Runtime => "Runtime Error",
        };

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!("{}: {}", kind_str.fg(color), self.diagnostic(filename)))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        if report_builder
            .finish()
            .eprint((filename, Source::from(source)))
            .is_err()
        {
            eprintln!("{}", self.diagnostic(filename));
        }
    }
}

/// Non-fatal diagnostic produced while parsing.
#[derive(Debug, Clone)]
pub struct Warning {
    pub span: Span,
    pub position: Position,
    pub message: String,
}

impl Warning {
    pub fn new(position: Position, span: Span, message: String) -> Self {
        Self {
            span,
            position,
            message,
        }
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        let result = Report::build(ReportKind::Warning, filename, self.span.start)
            .with_message(format!("{}: {}", "Warning".fg(Color::Blue), self.message))
            .with_label(
                Label::new((filename, self.span.start..self.span.end))
                    .with_message(&self.message)
                    .with_color(Color::Blue),
            )
            .finish()
            .eprint((filename, Source::from(source)));

        if result.is_err() {
            eprintln!(
                "warning: {}\nAt {}:{}:{}",
                self.message, filename, self.position.line, self.position.column
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_diagnostic_carries_position() {
        let position = Position::new(3, 7, 20);
        let error = ScrapError::syntax(position, Span::single(20), "Missing ')', found '}'".to_string());
        assert_eq!(
            error.diagnostic("main.scrap"),
            "Missing ')', found '}'\nAt main.scrap:3:7"
        );
    }

    #[test]
    fn runtime_diagnostic_is_plain_message() {
        let error = ScrapError::runtime(Span::single(0), "A constant can not change its value".to_string());
        assert_eq!(error.diagnostic("main.scrap"), "A constant can not change its value");
        assert!(error.is_runtime());
    }
}
