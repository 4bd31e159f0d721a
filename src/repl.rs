use std::io::{self, Write};

use crate::ast::{Expr, Stmt};
use crate::config::Config;
use crate::error::ScrapError;
use crate::evaluator::Interpreter;
use crate::parser::Parser;
use crate::value::Value;

/// Interactive loop. Every line runs against the same root module.
pub fn start(config: Config) {
    println!("Scrap {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let mut interpreter = Interpreter::new(config);

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }

                match eval_line(&mut interpreter, line) {
                    Ok(Some(value)) => println!("{}", value),
                    Ok(None) => {}
                    Err(error) => error.report(line, None),
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

/// Parses and executes one input. Yields the value to echo, which is the
/// value of a lone expression that is not an assignment.
pub fn eval_line(interpreter: &mut Interpreter, source: &str) -> Result<Option<Value>, ScrapError> {
    let mut parser = Parser::new(source)?;
    let statements = parser.parse_statements();
    for warning in parser.take_warnings() {
        warning.report(source, None);
    }
    let statements = statements?;

    let value = interpreter.eval_statements(&statements)?;
    let echo = matches!(
        statements.as_slice(),
        [Stmt::Expression { expr, .. }] if !matches!(expr, Expr::Reassignment { .. })
    );
    Ok(if echo { value } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::SharedBuffer;

    #[test]
    fn state_persists_between_lines() {
        let buffer = SharedBuffer::new();
        let mut interpreter = Interpreter::with_output(Config::default(), Box::new(buffer.clone()));
        assert_eq!(eval_line(&mut interpreter, "var x = 2").unwrap(), None);
        assert_eq!(eval_line(&mut interpreter, "x = x * 21").unwrap(), None);
        assert_eq!(
            eval_line(&mut interpreter, "x").unwrap(),
            Some(Value::Integer(42))
        );
        eval_line(&mut interpreter, "std::print(x)").unwrap();
        assert_eq!(buffer.contents(), "42\n");
    }

    #[test]
    fn errors_do_not_poison_the_session() {
        let mut interpreter = Interpreter::with_output(Config::default(), Box::new(io::sink()));
        assert!(eval_line(&mut interpreter, "missing + 1").is_err());
        assert!(eval_line(&mut interpreter, "const y = ").is_err());
        assert_eq!(
            eval_line(&mut interpreter, "1 + 1").unwrap(),
            Some(Value::Integer(2))
        );
    }
}
