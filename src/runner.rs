use log::debug;

use crate::config::Config;
use crate::error::ScrapError;
use crate::evaluator::Interpreter;
use crate::parser::Parser;
use crate::value::Value;

/// Runs a whole program with a fresh interpreter, reporting any error.
pub fn run(source: &str, filename: Option<&str>, config: Config) -> Result<Value, ScrapError> {
    let mut interpreter = Interpreter::new(config);
    run_with(&mut interpreter, source, filename)
}

/// Loads `source` into `interpreter` and calls its entry point. Warnings
/// and the error, if any, are printed as reports.
pub fn run_with(
    interpreter: &mut Interpreter,
    source: &str,
    filename: Option<&str>,
) -> Result<Value, ScrapError> {
    debug!("parsing {}", filename.unwrap_or("<input>"));
    let result = Parser::new(source).and_then(|mut parser| {
        let loaded = interpreter.load(&mut parser);
        for warning in parser.take_warnings() {
            warning.report(source, filename);
        }
        loaded?;
        debug!("declarations loaded, running main");
        interpreter.run_main()
    });

    if let Err(error) = &result {
        debug!("run failed with {:?} error", error.kind);
        error.report(source, filename);
    }
    result
}
