use log::{debug, trace};

use crate::ast::{
    BinaryOp, ClassMember, Decl, Expr, FunctionDecl, FunctionFlag, ImportSymbols, IterationKind,
    MatchArm, Param, Program, Signature, Stmt, TypeExpr, UnaryOp, Visibility,
};
use crate::error::{ScrapError, Span, Warning};
use crate::lexer::Lexer;
use crate::token::{Assoc, Token, TokenKind};

/// Streaming parser. Tokens are pulled from the lexer one at a time and
/// `current` is the only lookahead.
pub struct Parser {
    lexer: Lexer,
    current: Token,
    last_end: usize,
    function_depth: usize,
    loop_depth: usize,
    warnings: Vec<Warning>,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ScrapError> {
        let mut lexer = Lexer::new(source);
        let current = Self::next_significant(&mut lexer)?;
        Ok(Self {
            lexer,
            current,
            last_end: 0,
            function_depth: 0,
            loop_depth: 0,
            warnings: Vec::new(),
        })
    }

    pub fn is_at_end(&self) -> bool {
        self.current.is(TokenKind::Eof)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Parses the whole input as a sequence of top-level declarations.
    pub fn parse_program(&mut self, name: &str) -> Result<Program, ScrapError> {
        let mut body = Vec::new();
        while !self.is_at_end() {
            body.push(self.parse_decl()?);
        }
        Ok(Program {
            name: name.to_string(),
            body,
        })
    }

    /// Parses one top-level `[export] declaration`.
    pub fn parse_decl(&mut self) -> Result<Decl, ScrapError> {
        let exported = self.match_kind(TokenKind::Export)?.is_some();
        let mut decl = match self.current.kind {
            TokenKind::Var | TokenKind::Const => self.parse_variable()?,
            TokenKind::Fn | TokenKind::Inline | TokenKind::Async => {
                Decl::Function(self.parse_function(true)?)
            }
            TokenKind::Extern => self.parse_extern()?,
            TokenKind::Class => self.parse_class()?,
            TokenKind::Module => self.parse_module()?,
            TokenKind::Import | TokenKind::From => self.parse_import()?,
            TokenKind::Type => self.parse_type_decl()?,
            TokenKind::Interface => self.parse_interface()?,
            _ => {
                return Err(self.unexpected("Expected a declaration"));
            }
        };
        if exported {
            decl.set_exported();
        }
        self.match_kind(TokenKind::Semicolon)?;
        debug!("parsed declaration {:?}", decl.name().unwrap_or("<import>"));
        Ok(decl)
    }

    /// Parses statements until the end of input. Used by the REPL.
    pub fn parse_statements(&mut self) -> Result<Vec<Stmt>, ScrapError> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.parse_stmt()?);
        }
        Ok(statements)
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ScrapError> {
        self.parse_expr(1)
    }

    // ----- token plumbing -----

    fn next_significant(lexer: &mut Lexer) -> Result<Token, ScrapError> {
        loop {
            let token = lexer.scan()?;
            if !token.is(TokenKind::Comment) {
                return Ok(token);
            }
            trace!("skipping comment at {}:{}", token.position.line, token.position.column);
        }
    }

    fn advance(&mut self) -> Result<Token, ScrapError> {
        let next = Self::next_significant(&mut self.lexer)?;
        let token = std::mem::replace(&mut self.current, next);
        if !token.is(TokenKind::Eof) {
            self.last_end = token.span().end;
        }
        Ok(token)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.is(kind)
    }

    /// Consumes the current token if it has the given kind.
    fn match_kind(&mut self, kind: TokenKind) -> Result<Option<Token>, ScrapError> {
        if self.check(kind) {
            Ok(Some(self.advance()?))
        } else {
            Ok(None)
        }
    }

    /// Consumes a token of the given kind or fails with a syntax error.
    fn eat(&mut self, kind: TokenKind) -> Result<Token, ScrapError> {
        if self.check(kind) {
            return self.advance();
        }
        if self.check(TokenKind::Unknown) {
            return Err(self.unknown_token());
        }
        Err(self.error_at(
            &self.current,
            format!("Missing '{}', found '{}'", kind, self.found()),
        ))
    }

    fn eat_identifier(&mut self) -> Result<(String, Token), ScrapError> {
        let token = self.eat(TokenKind::Identifier)?;
        Ok((token.lexeme.clone(), token))
    }

    fn found(&self) -> String {
        match self.current.kind {
            TokenKind::Eof => "EOF".to_string(),
            _ => self.current.lexeme.clone(),
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.last_end.max(start))
    }

    fn error_at(&self, token: &Token, message: String) -> ScrapError {
        ScrapError::syntax(token.position, token.span(), message)
    }

    fn unknown_token(&self) -> ScrapError {
        self.error_at(
            &self.current,
            format!("Unexpected character '{}'", self.current.lexeme),
        )
    }

    fn unexpected(&self, context: &str) -> ScrapError {
        if self.check(TokenKind::Unknown) {
            return self.unknown_token();
        }
        self.error_at(
            &self.current,
            format!("{}, found '{}'", context, self.found()),
        )
    }

    /// Parses `item (, item)* [,] close`. The opening token must already be
    /// consumed. Returns the items and the closing token.
    fn parse_list<T>(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> Result<T, ScrapError>,
    ) -> Result<(Vec<T>, Token), ScrapError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(item(self)?);
            if self.match_kind(TokenKind::Comma)?.is_none() {
                break;
            }
        }
        let end = self.eat(close)?;
        Ok((items, end))
    }

    fn parse_delimited<T>(
        &mut self,
        open: TokenKind,
        close: TokenKind,
        item: impl FnMut(&mut Self) -> Result<T, ScrapError>,
    ) -> Result<(Vec<T>, Token), ScrapError> {
        self.eat(open)?;
        self.parse_list(close, item)
    }

    fn parse_path(&mut self) -> Result<Vec<String>, ScrapError> {
        let (first, _) = self.eat_identifier()?;
        let mut path = vec![first];
        while self.match_kind(TokenKind::ModAccessor)?.is_some() {
            path.push(self.eat_identifier()?.0);
        }
        Ok(path)
    }

    fn parse_generics(&mut self) -> Result<Vec<String>, ScrapError> {
        if !self.check(TokenKind::Less) {
            return Ok(Vec::new());
        }
        let (names, _) = self.parse_delimited(TokenKind::Less, TokenKind::Greater, |p| {
            p.eat_identifier().map(|(name, _)| name)
        })?;
        Ok(names)
    }

    // ----- declarations -----

    fn parse_variable(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.advance()?;
        let is_const = keyword.is(TokenKind::Const);
        let (name, name_token) = self.eat_identifier()?;
        self.finish_variable(keyword.span().start, name, &name_token, is_const)
    }

    fn finish_variable(
        &mut self,
        start: usize,
        name: String,
        name_token: &Token,
        is_const: bool,
    ) -> Result<Decl, ScrapError> {
        let ty = match self.match_kind(TokenKind::Colon)? {
            Some(_) => Some(self.parse_type()?),
            None => None,
        };
        let value = match self.match_kind(TokenKind::Equal)? {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };
        if is_const && value.is_none() {
            return Err(ScrapError::syntax_with_help(
                name_token.position,
                name_token.span(),
                format!("Constant '{}' must be initialized", name),
                format!("give it a value: const {} = ...", name),
            ));
        }
        Ok(Decl::Variable {
            name,
            is_const,
            ty,
            value,
            is_exported: false,
            span: self.span_from(start),
        })
    }

    fn parse_signature(&mut self) -> Result<Signature, ScrapError> {
        let start = self.current.span().start;
        let mut flag = None;
        while let TokenKind::Inline | TokenKind::Async = self.current.kind {
            let token = self.advance()?;
            if flag.is_some() {
                return Err(self.error_at(&token, "Functions can only have one flag".to_string()));
            }
            flag = Some(match token.kind {
                TokenKind::Inline => FunctionFlag::Inline,
                _ => FunctionFlag::Async,
            });
        }
        self.eat(TokenKind::Fn)?;

        let name = match self.match_kind(TokenKind::Identifier)? {
            Some(token) => Some(token.lexeme),
            None => None,
        };
        let generics = self.parse_generics()?;
        let (params, _) =
            self.parse_delimited(TokenKind::LeftParen, TokenKind::RightParen, Self::parse_param)?;
        if let Some(index) = params.iter().position(|p| p.is_rest) {
            if index + 1 != params.len() {
                let param = &params[index];
                return Err(ScrapError::syntax(
                    self.current.position,
                    param.span,
                    format!("Rest parameter '{}' must be the last parameter", param.name),
                ));
            }
        }
        let return_type = match self.match_kind(TokenKind::Colon)? {
            Some(_) => Some(self.parse_type()?),
            None => None,
        };

        Ok(Signature {
            name,
            flag,
            generics,
            params,
            return_type,
            span: self.span_from(start),
        })
    }

    fn parse_param(&mut self) -> Result<Param, ScrapError> {
        let start = self.current.span().start;
        let is_rest = self.match_kind(TokenKind::Spread)?.is_some();
        let (name, _) = self.eat_identifier()?;
        let ty = match self.match_kind(TokenKind::Colon)? {
            Some(_) => Some(self.parse_type()?),
            None => None,
        };
        Ok(Param {
            name,
            ty,
            is_rest,
            span: self.span_from(start),
        })
    }

    /// Parses a function with a block body or an `-> expr` body.
    fn parse_function(&mut self, require_name: bool) -> Result<FunctionDecl, ScrapError> {
        let start = self.current.span().start;
        let sig = self.parse_signature()?;
        if require_name && sig.name.is_none() {
            return Err(self.error_at(
                &self.current,
                "Function declarations must be named".to_string(),
            ));
        }

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_function_body();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(FunctionDecl {
            sig,
            body: body?,
            is_exported: false,
            span: self.span_from(start),
        })
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ScrapError> {
        if let Some(arrow) = self.match_kind(TokenKind::Arrow)? {
            let value = self.parse_expression()?;
            let span = arrow.span().to(value.span());
            return Ok(vec![Stmt::Return {
                value: Some(value),
                span,
            }]);
        }
        self.parse_block()
    }

    fn parse_extern(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.eat(TokenKind::Extern)?;
        if matches!(self.current.kind, TokenKind::Inline | TokenKind::Async) {
            return Err(self.error_at(
                &self.current,
                "External functions can not have flags".to_string(),
            ));
        }
        let sig = self.parse_signature()?;
        if sig.name.is_none() {
            return Err(self.error_at(
                &keyword,
                "External functions must be named".to_string(),
            ));
        }
        Ok(Decl::Extern {
            sig,
            is_exported: false,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_class(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.eat(TokenKind::Class)?;
        let (name, _) = self.eat_identifier()?;
        let generics = self.parse_generics()?;
        let inherits = match self.match_kind(TokenKind::Extends)? {
            Some(_) => Some(self.eat_identifier()?.0),
            None => None,
        };
        let mut implements = Vec::new();
        if self.match_kind(TokenKind::Implements)?.is_some() {
            loop {
                implements.push(self.eat_identifier()?.0);
                if self.match_kind(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }

        self.eat(TokenKind::LeftBrace)?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            members.push(self.parse_class_member()?);
        }
        self.eat(TokenKind::RightBrace)?;

        Ok(Decl::Class {
            name,
            generics,
            inherits,
            implements,
            members,
            is_exported: false,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, ScrapError> {
        let visibility = match self.current.kind {
            TokenKind::Public => Some(Visibility::Public),
            TokenKind::Private => Some(Visibility::Private),
            TokenKind::Protected => Some(Visibility::Protected),
            _ => None,
        };
        if visibility.is_some() {
            self.advance()?;
        }
        let visibility = visibility.unwrap_or(Visibility::Public);
        let is_static = self.match_kind(TokenKind::Static)?.is_some();

        let decl = match self.current.kind {
            TokenKind::Var | TokenKind::Const => self.parse_variable()?,
            TokenKind::Fn | TokenKind::Inline | TokenKind::Async => {
                Decl::Function(self.parse_function(true)?)
            }
            _ => return Err(self.unexpected("Invalid class member")),
        };
        self.match_kind(TokenKind::Semicolon)?;
        Ok(ClassMember {
            visibility,
            is_static,
            decl,
        })
    }

    fn parse_module(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.eat(TokenKind::Module)?;
        let (name, _) = self.eat_identifier()?;
        self.eat(TokenKind::LeftBrace)?;

        let mut body = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let exported = self.match_kind(TokenKind::Export)?.is_some();
            let mut decl = match self.current.kind {
                TokenKind::Fn | TokenKind::Inline | TokenKind::Async => {
                    Decl::Function(self.parse_function(true)?)
                }
                TokenKind::Const => self.parse_variable()?,
                TokenKind::Extern => self.parse_extern()?,
                TokenKind::Module => self.parse_module()?,
                TokenKind::Interface => self.parse_interface()?,
                TokenKind::Import | TokenKind::From => self.parse_import()?,
                TokenKind::Class => self.parse_class()?,
                TokenKind::Type => self.parse_type_decl()?,
                _ => return Err(self.unexpected("Invalid module declaration")),
            };
            if exported {
                decl.set_exported();
            }
            self.match_kind(TokenKind::Semicolon)?;
            body.push(decl);
        }
        self.eat(TokenKind::RightBrace)?;

        Ok(Decl::Module {
            name,
            body,
            is_exported: false,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_import(&mut self) -> Result<Decl, ScrapError> {
        let start = self.current.span().start;
        if self.match_kind(TokenKind::Import)?.is_some() {
            let path = self.parse_path()?;
            return Ok(Decl::Import {
                path,
                symbols: ImportSymbols::Module,
                span: self.span_from(start),
            });
        }

        self.eat(TokenKind::From)?;
        let path = self.parse_path()?;
        self.eat(TokenKind::Import)?;
        let symbols = if self.match_kind(TokenKind::Star)?.is_some() {
            ImportSymbols::All
        } else {
            let mut list = vec![self.parse_path()?];
            while self.match_kind(TokenKind::Comma)?.is_some() {
                list.push(self.parse_path()?);
            }
            ImportSymbols::List(list)
        };
        Ok(Decl::Import {
            path,
            symbols,
            span: self.span_from(start),
        })
    }

    fn parse_type_decl(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.eat(TokenKind::Type)?;
        let (name, _) = self.eat_identifier()?;
        let generics = self.parse_generics()?;
        self.eat(TokenKind::Equal)?;
        let value = self.parse_type()?;
        Ok(Decl::Type {
            name,
            generics,
            value,
            is_exported: false,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_interface(&mut self) -> Result<Decl, ScrapError> {
        let keyword = self.eat(TokenKind::Interface)?;
        let (name, _) = self.eat_identifier()?;
        let generics = self.parse_generics()?;
        self.eat(TokenKind::LeftBrace)?;
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let sig = self.parse_signature()?;
            if sig.name.is_none() {
                return Err(self.error_at(
                    &self.current,
                    "Interface methods must be named".to_string(),
                ));
            }
            methods.push(sig);
            self.match_kind(TokenKind::Semicolon)?;
            self.match_kind(TokenKind::Comma)?;
        }
        self.eat(TokenKind::RightBrace)?;
        Ok(Decl::Interface {
            name,
            generics,
            methods,
            is_exported: false,
            span: self.span_from(keyword.span().start),
        })
    }

    // ----- types -----

    fn parse_type(&mut self) -> Result<TypeExpr, ScrapError> {
        self.parse_type_with(1)
    }

    fn parse_type_with(&mut self, min_binding: u8) -> Result<TypeExpr, ScrapError> {
        let mut lhs = self.parse_type_primary()?;
        while let Some(binding) = self.current.kind.type_binding() {
            if binding < min_binding {
                break;
            }
            let operator = self.advance()?;
            let rhs = self.parse_type_with(binding + 1)?;
            let span = self.span_from(type_span(&lhs).start);
            lhs = match operator.kind {
                TokenKind::Pipe => TypeExpr::Union {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
                _ => TypeExpr::Intersection {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
            };
        }
        Ok(lhs)
    }

    fn parse_type_primary(&mut self) -> Result<TypeExpr, ScrapError> {
        let start = self.current.span().start;
        let mut ty = if self.match_kind(TokenKind::LeftParen)?.is_some() {
            let inner = self.parse_type()?;
            self.eat(TokenKind::RightParen)?;
            inner
        } else {
            let path = self.parse_path()?;
            let generics = if self.check(TokenKind::Less) {
                self.parse_delimited(TokenKind::Less, TokenKind::Greater, Self::parse_type)?
                    .0
            } else {
                Vec::new()
            };
            TypeExpr::Named {
                path,
                generics,
                span: self.span_from(start),
            }
        };
        while self.match_kind(TokenKind::LeftBracket)?.is_some() {
            self.eat(TokenKind::RightBracket)?;
            ty = TypeExpr::Array {
                element: Box::new(ty),
                span: self.span_from(start),
            };
        }
        Ok(ty)
    }

    // ----- statements -----

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScrapError> {
        self.eat(TokenKind::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_stmt()?);
        }
        self.eat(TokenKind::RightBrace)?;
        Ok(statements)
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, ScrapError> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    pub fn parse_stmt(&mut self) -> Result<Stmt, ScrapError> {
        let stmt = match self.current.kind {
            TokenKind::Export => {
                let token = self.advance()?;
                self.warnings.push(Warning::new(
                    token.position,
                    token.span(),
                    "unreachable export, only top-level and module members can be exported"
                        .to_string(),
                ));
                return self.parse_stmt();
            }
            TokenKind::Var | TokenKind::Const => Stmt::Declaration(self.parse_variable()?),
            TokenKind::Fn | TokenKind::Inline | TokenKind::Async => {
                Stmt::Declaration(Decl::Function(self.parse_function(true)?))
            }
            TokenKind::Extern => Stmt::Declaration(self.parse_extern()?),
            TokenKind::Class => Stmt::Declaration(self.parse_class()?),
            TokenKind::Module => Stmt::Declaration(self.parse_module()?),
            TokenKind::Import | TokenKind::From => Stmt::Declaration(self.parse_import()?),
            TokenKind::Type => Stmt::Declaration(self.parse_type_decl()?),
            TokenKind::Interface => Stmt::Declaration(self.parse_interface()?),
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Match => self.parse_match()?,
            TokenKind::Return => self.parse_return()?,
            TokenKind::Break | TokenKind::Skip => self.parse_loop_jump()?,
            _ => {
                let expr = self.parse_expression()?;
                let span = *expr.span();
                Stmt::Expression { expr, span }
            }
        };
        self.match_kind(TokenKind::Semicolon)?;
        Ok(stmt)
    }

    fn parse_if(&mut self) -> Result<Stmt, ScrapError> {
        // `if` and `elif` share this path
        let keyword = self.advance()?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        let else_body = match self.current.kind {
            TokenKind::Elif => Some(vec![self.parse_if()?]),
            TokenKind::Else => {
                self.advance()?;
                Some(self.parse_block()?)
            }
            _ => None,
        };
        Ok(Stmt::If {
            condition,
            body,
            else_body,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ScrapError> {
        let keyword = self.eat(TokenKind::While)?;
        let condition = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::While {
            condition,
            body,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ScrapError> {
        let keyword = self.eat(TokenKind::For)?;
        let start = keyword.span().start;
        let binding = match self.current.kind {
            TokenKind::Var | TokenKind::Const => self.advance()?,
            _ => return Err(self.unexpected("Missing 'var' or 'const' in for loop")),
        };
        let is_const = binding.is(TokenKind::Const);
        let (name, name_token) = self.eat_identifier()?;

        let kind = match self.current.kind {
            TokenKind::Of => Some(IterationKind::Of),
            TokenKind::In => Some(IterationKind::In),
            _ => None,
        };
        if let Some(kind) = kind {
            self.advance()?;
            let subject = self.parse_expression()?;
            let body = self.parse_loop_body()?;
            return Ok(Stmt::ForEach {
                binding: name,
                is_const,
                kind,
                subject,
                body,
                span: self.span_from(start),
            });
        }

        let init = self.finish_variable(binding.span().start, name, &name_token, is_const)?;
        self.eat(TokenKind::Semicolon)?;
        let condition = self.parse_expression()?;
        self.eat(TokenKind::Semicolon)?;
        let step = self.parse_expression()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::For {
            init: Box::new(init),
            condition,
            step,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_match(&mut self) -> Result<Stmt, ScrapError> {
        let keyword = self.eat(TokenKind::Match)?;
        let subject = self.parse_expression()?;
        self.eat(TokenKind::LeftBrace)?;

        let mut arms = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(token) = self.match_kind(TokenKind::Default)? {
                if default.is_some() {
                    return Err(self.error_at(
                        &token,
                        "A default statement has been already declared".to_string(),
                    ));
                }
                self.eat(TokenKind::Arrow)?;
                default = Some(self.parse_arm_body()?);
            } else {
                let case = self.eat(TokenKind::Case)?;
                let mut subjects = vec![self.parse_expression()?];
                while self.match_kind(TokenKind::Comma)?.is_some() {
                    subjects.push(self.parse_expression()?);
                }
                self.eat(TokenKind::Arrow)?;
                let body = self.parse_arm_body()?;
                arms.push(MatchArm {
                    subjects,
                    body,
                    span: self.span_from(case.span().start),
                });
            }
            self.match_kind(TokenKind::Comma)?;
        }
        self.eat(TokenKind::RightBrace)?;

        Ok(Stmt::Match {
            subject,
            arms,
            default,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_arm_body(&mut self) -> Result<Vec<Stmt>, ScrapError> {
        if self.check(TokenKind::LeftBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_return(&mut self) -> Result<Stmt, ScrapError> {
        let keyword = self.eat(TokenKind::Return)?;
        if self.function_depth == 0 {
            return Err(self.error_at(
                &keyword,
                "'return' outside of a function".to_string(),
            ));
        }
        let value = match self.current.kind {
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof => None,
            _ => Some(self.parse_expression()?),
        };
        Ok(Stmt::Return {
            value,
            span: self.span_from(keyword.span().start),
        })
    }

    fn parse_loop_jump(&mut self) -> Result<Stmt, ScrapError> {
        let keyword = self.advance()?;
        if self.loop_depth == 0 {
            return Err(self.error_at(
                &keyword,
                format!("'{}' outside of a loop", keyword.lexeme),
            ));
        }
        let span = keyword.span();
        Ok(match keyword.kind {
            TokenKind::Break => Stmt::Break { span },
            _ => Stmt::Skip { span },
        })
    }

    // ----- expressions -----

    /// Precedence climbing over the binding table of `TokenKind`.
    fn parse_expr(&mut self, min_binding: u8) -> Result<Expr, ScrapError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if matches!(self.current.kind, TokenKind::Instanceof | TokenKind::As) {
                return Err(self.error_at(
                    &self.current,
                    format!("Operator '{}' is not supported", self.current.lexeme),
                ));
            }
            let Some((binding, assoc)) = self.current.kind.binding() else {
                break;
            };
            if binding < min_binding {
                break;
            }
            let operator = self.advance()?;
            let next = match assoc {
                Assoc::Left => binding + 1,
                Assoc::Right => binding,
            };
            let rhs = self.parse_expr(next)?;
            lhs = self.combine(&operator, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn combine(&self, operator: &Token, lhs: Expr, rhs: Expr) -> Result<Expr, ScrapError> {
        let span = lhs.span().to(rhs.span());
        let compound = match operator.kind {
            TokenKind::Equal => None,
            TokenKind::AddAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Subtract),
            TokenKind::MultAssign => Some(BinaryOp::Multiply),
            TokenKind::DivAssign => Some(BinaryOp::Divide),
            TokenKind::ModAssign => Some(BinaryOp::Modulo),
            _ => {
                return Ok(Expr::Binary {
                    operator: binary_op(operator.kind),
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                })
            }
        };

        let target = match lhs {
            Expr::Identifier { name, .. } => name,
            other => {
                return Err(ScrapError::syntax_with_help(
                    operator.position,
                    *other.span(),
                    "Invalid assignment target".to_string(),
                    "only variables can be reassigned".to_string(),
                ))
            }
        };
        let value = match compound {
            Some(op) => Expr::Binary {
                operator: op,
                lhs: Box::new(Expr::Identifier {
                    name: target.clone(),
                    span,
                }),
                rhs: Box::new(rhs),
                span,
            },
            None => rhs,
        };
        Ok(Expr::Reassignment {
            target,
            value: Box::new(value),
            span,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ScrapError> {
        let operator = match self.current.kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang | TokenKind::Not => UnaryOp::Not,
            TokenKind::Await => UnaryOp::Await,
            TokenKind::Increment => UnaryOp::Increment,
            TokenKind::Decrement => UnaryOp::Decrement,
            TokenKind::Amper => {
                let amper = self.advance()?;
                let (target, token) = self.eat_identifier()?;
                return Ok(Expr::Reference {
                    target,
                    span: amper.span().to(&token.span()),
                });
            }
            _ => return self.parse_postfix(),
        };
        let token = self.advance()?;
        let operand = self.parse_unary()?;
        if matches!(operator, UnaryOp::Increment | UnaryOp::Decrement)
            && !matches!(operand, Expr::Identifier { .. })
        {
            return Err(self.error_at(
                &token,
                format!("'{}' can only be applied to a variable", token.lexeme),
            ));
        }
        let span = token.span().to(operand.span());
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScrapError> {
        let mut expr = self.parse_primary()?;
        loop {
            let start = expr.span().start;
            match self.current.kind {
                TokenKind::LeftParen => {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: self.span_from(start),
                    };
                }
                TokenKind::Dot => {
                    self.advance()?;
                    let member = self.eat(TokenKind::Identifier)?.lexeme;
                    expr = Expr::ObjectAccess {
                        object: Box::new(expr),
                        member,
                        span: self.span_from(start),
                    };
                }
                TokenKind::LeftBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.eat(TokenKind::RightBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        span: self.span_from(start),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ScrapError> {
        let (args, _) =
            self.parse_delimited(TokenKind::LeftParen, TokenKind::RightParen, Self::parse_expression)?;
        Ok(args)
    }

    /// Parses the right hand side of `module::`. The member is an identifier,
    /// a call on an identifier or a nested access.
    fn parse_module_access(&mut self, module: String, start: usize) -> Result<Expr, ScrapError> {
        let (name, token) = self.eat_identifier()?;
        let member = if self.match_kind(TokenKind::ModAccessor)?.is_some() {
            self.parse_module_access(name, token.span().start)?
        } else if self.check(TokenKind::LeftParen) {
            let args = self.parse_args()?;
            Expr::Call {
                callee: Box::new(Expr::Identifier {
                    name,
                    span: token.span(),
                }),
                args,
                span: self.span_from(token.span().start),
            }
        } else {
            Expr::Identifier {
                name,
                span: token.span(),
            }
        };
        Ok(Expr::ModuleAccess {
            module,
            member: Box::new(member),
            span: self.span_from(start),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ScrapError> {
        let start = self.current.span().start;
        match self.current.kind {
            TokenKind::Integer => {
                let token = self.advance()?;
                let value = token.lexeme.replace('_', "").parse::<i64>().map_err(|_| {
                    self.error_at(&token, format!("Invalid integer literal '{}'", token.lexeme))
                })?;
                Ok(Expr::Number {
                    value,
                    span: token.span(),
                })
            }
            TokenKind::Float => {
                let token = self.advance()?;
                let value = token.lexeme.replace('_', "").parse::<f64>().map_err(|_| {
                    self.error_at(&token, format!("Invalid float literal '{}'", token.lexeme))
                })?;
                Ok(Expr::Float {
                    value,
                    span: token.span(),
                })
            }
            TokenKind::String => {
                let token = self.advance()?;
                Ok(Expr::String {
                    value: token.literal_content().to_string(),
                    span: token.span(),
                })
            }
            TokenKind::Char => {
                let token = self.advance()?;
                let value = token.literal_content().chars().next().unwrap_or('\0');
                Ok(Expr::Char {
                    value,
                    span: token.span(),
                })
            }
            TokenKind::Identifier => {
                let (name, token) = self.eat_identifier()?;
                if self.match_kind(TokenKind::ModAccessor)?.is_some() {
                    return self.parse_module_access(name, start);
                }
                Ok(Expr::Identifier {
                    name,
                    span: token.span(),
                })
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.eat(TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                let (elements, _) = self.parse_delimited(
                    TokenKind::LeftBracket,
                    TokenKind::RightBracket,
                    Self::parse_expression,
                )?;
                Ok(Expr::Array {
                    elements,
                    span: self.span_from(start),
                })
            }
            TokenKind::LeftBrace => self.parse_object(),
            TokenKind::Fn | TokenKind::Inline | TokenKind::Async => {
                let function = self.parse_function(false)?;
                Ok(Expr::Function(Box::new(function)))
            }
            TokenKind::Unknown => Err(self.unknown_token()),
            _ => Err(self.unexpected("Expected an expression")),
        }
    }

    fn parse_object(&mut self) -> Result<Expr, ScrapError> {
        let open = self.eat(TokenKind::LeftBrace)?;
        let mut entries: Vec<(String, Expr)> = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            let key_token = match self.current.kind {
                TokenKind::Identifier | TokenKind::String => self.advance()?,
                _ => return Err(self.unexpected("Expected an object key")),
            };
            let key = key_token.literal_content().to_string();
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(self.error_at(
                    &key_token,
                    format!("Duplicate key '{}' in object literal", key),
                ));
            }
            self.eat(TokenKind::Colon)?;
            entries.push((key, self.parse_expression()?));
            if self.match_kind(TokenKind::Comma)?.is_none() {
                break;
            }
        }
        self.eat(TokenKind::RightBrace)?;
        Ok(Expr::Object {
            entries,
            span: self.span_from(open.span().start),
        })
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Modulo,
        TokenKind::EqualEqual => BinaryOp::Equal,
        TokenKind::BangEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        TokenKind::In => BinaryOp::In,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        TokenKind::ExplicitAnd => BinaryOp::EagerAnd,
        TokenKind::ExplicitOr => BinaryOp::EagerOr,
        _ => BinaryOp::Range,
    }
}

fn type_span(ty: &TypeExpr) -> Span {
    match ty {
        TypeExpr::Named { span, .. }
        | TypeExpr::Array { span, .. }
        | TypeExpr::Union { span, .. }
        | TypeExpr::Intersection { span, .. } => *span,
    }
}
