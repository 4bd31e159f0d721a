// Scrap language interpreter library
//
// Lexer, parser and tree-walking interpreter for the Scrap scripting
// language, plus the REPL and file runner used by the binary.

pub mod ast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod scope;
pub mod stdlib;
pub mod token;
pub mod value;

pub use ast::{Decl, Expr, Program, Stmt};
pub use config::Config;
pub use error::{ErrorKind, ScrapError, Span, Warning};
pub use evaluator::{ExecutionState, Interpreter};
pub use lexer::Lexer;
pub use parser::Parser;
pub use stdlib::SharedBuffer;
pub use token::{Position, Token, TokenKind};
pub use value::{Arity, Entity, Value};

pub use repl::start as start_repl;
pub use runner::run;
