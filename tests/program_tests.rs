// End-to-end tests: whole programs run through the interpreter with their
// output captured.

use scrap::config::Config;
use scrap::evaluator::{ExecutionState, Interpreter};
use scrap::parser::Parser;
use scrap::stdlib::SharedBuffer;
use scrap::value::{Arity, Value};

struct Outcome {
    result: Result<Value, String>,
    output: String,
}

fn run_with(config: Config, source: &str) -> Outcome {
    let buffer = SharedBuffer::new();
    let mut interpreter = Interpreter::with_output(config, Box::new(buffer.clone()));
    let result = Parser::new(source)
        .and_then(|mut parser| interpreter.run(&mut parser))
        .map_err(|error| error.message);
    Outcome {
        result,
        output: buffer.contents(),
    }
}

fn run(source: &str) -> Outcome {
    run_with(Config::default(), source)
}

fn value_of(source: &str) -> Value {
    match run(source).result {
        Ok(value) => value,
        Err(message) => panic!("program failed: {}", message),
    }
}

fn error_of(source: &str) -> String {
    match run(source).result {
        Ok(value) => panic!("program succeeded with {}", value),
        Err(message) => message,
    }
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

#[test]
fn print_joins_arguments() {
    let outcome = run(r#"fn main() { std::print("hello", 1, 2.5, [1, "a"]) }"#);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.output, "hello 1 2.5 [1, \"a\"]\n");
}

#[test]
fn main_result_is_returned() {
    assert_eq!(value_of("fn main() { return 1 + 2 * 3 }"), Value::Integer(7));
}

#[test]
fn declarations_are_visible_before_main_runs() {
    assert_eq!(
        value_of("fn main() { return helper() }\nfn helper() -> 5"),
        Value::Integer(5)
    );
}

#[test]
fn missing_entry_point() {
    assert_eq!(
        error_of("const x = 1"),
        "Missing program entry point (main function)"
    );
    assert_eq!(
        error_of("fn main(a) {}"),
        "The program entry point 'main' must not take parameters"
    );
}

#[test]
fn missing_entry_point_after_side_effects() {
    let buffer = SharedBuffer::new();
    let mut interpreter = Interpreter::with_output(Config::default(), Box::new(buffer.clone()));
    let mut parser = Parser::new(r#"const x = std::print("decl")"#).unwrap();
    let error = interpreter.run(&mut parser).unwrap_err();
    assert_eq!(error.message, "Missing program entry point (main function)");
    assert_eq!(buffer.contents(), "decl\n");
    assert_eq!(interpreter.state(), ExecutionState::Faulted);
}

#[test]
fn constants_can_not_change() {
    assert_eq!(
        error_of("const x = 1\nfn main() { x = 2 }"),
        "A constant can not change its value"
    );
    assert_eq!(
        error_of("fn main() { const y = 1 ++y }"),
        "A constant can not change its value"
    );
}

#[test]
fn variables_are_shared_through_closures() {
    let source = "
        var x = 1
        fn bump() { x = x + 1 }
        fn main() { bump() bump() return x }
    ";
    assert_eq!(value_of(source), Value::Integer(3));
}

#[test]
fn closures_see_later_writes() {
    let source = "
        fn main() {
            var n = 1
            const add = fn(x) -> x + n
            n = 10
            return add(5)
        }
    ";
    assert_eq!(value_of(source), Value::Integer(15));
}

#[test]
fn activations_are_isolated() {
    assert_eq!(
        value_of("fn f(n) { var local = n return local }\nfn main() { f(1) return f(2) }"),
        Value::Integer(2)
    );
    assert_eq!(
        error_of("fn f() { var secret = 1 }\nfn main() { f() return secret }"),
        "'secret' is not defined"
    );
}

#[test]
fn recursion() {
    let source = "
        fn fib(n) {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        fn main() { return fib(10) }
    ";
    assert_eq!(value_of(source), Value::Integer(55));
}

#[test]
fn module_members_need_export() {
    let module = "module M { const a = 1 export const b = 2 }\n";
    assert_eq!(
        value_of(&format!("{}fn main() {{ return M::b }}", module)),
        Value::Integer(2)
    );
    assert_eq!(
        error_of(&format!("{}fn main() {{ return M::a }}", module)),
        "The module 'M' defines 'a' but doesn't export it"
    );
    assert_eq!(
        error_of(&format!("{}fn main() {{ return M::c }}", module)),
        "'M' has no member 'c'"
    );
}

#[test]
fn module_functions_reach_private_helpers() {
    let source = "
        module M {
            fn helper() -> 40
            export fn answer() -> helper() + 2
        }
        fn main() { return M::answer() }
    ";
    assert_eq!(value_of(source), Value::Integer(42));
}

#[test]
fn module_call_arguments_use_the_caller_scope() {
    let source = "
        module M {
            const x = 100
            export fn id(v) -> v
        }
        fn main() { const x = 1 return M::id(x) }
    ";
    assert_eq!(value_of(source), Value::Integer(1));
}

#[test]
fn nested_modules() {
    let source = "
        module Outer { export module Inner { export fn f() -> 7 } }
        fn main() { return Outer::Inner::f() }
    ";
    assert_eq!(value_of(source), Value::Integer(7));
}

#[test]
fn modules_inside_functions() {
    assert_eq!(
        value_of("fn main() { module Local { export const v = 3 } return Local::v }"),
        Value::Integer(3)
    );
}

#[test]
fn rest_parameters_collect_the_tail() {
    let source = "fn count(first, ...rest) -> std::len(rest)\n";
    assert_eq!(
        value_of(&format!("{}fn main() {{ return count(1, 2, 3) }}", source)),
        Value::Integer(2)
    );
    assert_eq!(
        error_of(&format!("{}fn main() {{ return count() }}", source)),
        "Function 'count' expects at least 1 arguments but got 0"
    );
}

#[test]
fn arity_is_checked() {
    assert_eq!(
        error_of("fn add(a, b) -> a + b\nfn main() { add(1) }"),
        "Function 'add' expects 2 arguments but got 1"
    );
}

#[test]
fn references_write_through() {
    let source = "
        fn inc(r) { r = r + 1 }
        fn main() { var x = 1 inc(&x) inc(&x) return x }
    ";
    assert_eq!(value_of(source), Value::Integer(3));
    assert_eq!(
        error_of("fn inc(r) { r = r + 1 }\nfn main() { const c = 1 inc(&c) }"),
        "A constant can not change its value"
    );
}

#[test]
fn self_references_are_rejected() {
    assert_eq!(
        error_of("fn main() { var x = 1 x = &x return x }"),
        "A variable can not reference itself"
    );
    let cycle = "
        fn main() {
            var a = 1
            var b = &a
            var c = 3
            a = &c
            c = &b
            return c
        }
    ";
    assert_eq!(error_of(cycle), "A variable can not reference itself");
    assert_eq!(
        value_of("fn main() { var x = 1 var y = &x y = 5 return x }"),
        Value::Integer(5)
    );
}

#[test]
fn logical_operators() {
    let source = "
        var calls = 0
        fn touch() { calls += 1 return true }
        fn main() {
            false and touch()
            true or touch()
            false and! touch()
            true or! touch()
            return calls
        }
    ";
    assert_eq!(value_of(source), Value::Integer(2));
    assert_eq!(value_of(r#"fn main() { return 0 or "x" }"#), string("x"));
    assert_eq!(value_of("fn main() { return not 0 }"), Value::Boolean(true));
}

#[test]
fn imports_bind_the_last_segment() {
    assert_eq!(
        run(r#"import std fn main() { std::print("a") }"#).output,
        "a\n"
    );
    assert_eq!(
        run("from std import print, len\nfn main() { print(len([1, 2, 3])) }").output,
        "3\n"
    );
    assert_eq!(
        run("from std import *\nfn main() { print(typeof(1.5)) }").output,
        "float\n"
    );
    assert_eq!(
        error_of("module M { fn hidden() {} }\nfrom M import hidden\nfn main() {}"),
        "The module 'M' defines 'hidden' but doesn't export it"
    );
}

#[test]
fn class_members_respect_visibility() {
    let source = "
        class Counter {
            public static fn start() -> 10
            private fn secret() -> 1
        }
    ";
    assert_eq!(
        value_of(&format!("{}fn main() {{ return Counter::start() }}", source)),
        Value::Integer(10)
    );
    assert_eq!(
        error_of(&format!("{}fn main() {{ return Counter::secret() }}", source)),
        "'secret' is private to class 'Counter'"
    );
}

#[test]
fn classes_inherit_members() {
    let source = r#"
        class Base { fn greet() -> "hi" }
        class Child extends Base {}
        fn main() { return Child::greet() }
    "#;
    assert_eq!(value_of(source), string("hi"));
}

#[test]
fn classes_implement_interfaces() {
    let interface = "interface Named { fn name(): string }\n";
    assert_eq!(
        value_of(&format!(
            "{}class Dog implements Named {{ fn name() -> \"dog\" }}\nfn main() {{ return Dog::name() }}",
            interface
        )),
        string("dog")
    );
    assert_eq!(
        error_of(&format!("{}class Cat implements Named {{}}\nfn main() {{}}", interface)),
        "Class 'Cat' does not implement 'name' from interface 'Named'"
    );
}

#[test]
fn extern_functions_bind_to_natives() {
    let buffer = SharedBuffer::new();
    let mut interpreter = Interpreter::with_output(Config::default(), Box::new(buffer));
    interpreter.register_native("twice", Arity::Exact(1), |_, args| match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(n * 2)),
        other => Err(format!("twice() expects an int, got '{}'", other.type_name())),
    });
    let mut parser = Parser::new("extern fn twice(n)\nfn main() { return twice(21) }").unwrap();
    assert_eq!(interpreter.run(&mut parser).unwrap(), Value::Integer(42));

    assert_eq!(
        error_of("extern fn nope()\nfn main() {}"),
        "No native binding for extern function 'nope'"
    );
}

#[test]
fn call_depth_is_bounded() {
    let buffer = SharedBuffer::new();
    let config = Config::default().with_max_call_depth(16);
    let mut interpreter = Interpreter::with_output(config, Box::new(buffer));
    assert_eq!(interpreter.state(), ExecutionState::Created);

    let mut parser = Parser::new("fn down(n) -> down(n + 1)\nfn main() { down(0) }").unwrap();
    let error = interpreter.run(&mut parser).unwrap_err();
    assert_eq!(error.message, "Maximum call depth of 16 exceeded");
    assert!(error.is_runtime());
    assert!(interpreter.frames().is_empty());
    assert_eq!(interpreter.state(), ExecutionState::Faulted);
}

#[test]
fn default_call_depth_fails_cleanly() {
    assert_eq!(
        error_of("fn down(n) -> down(n + 1)\nfn main() { down(0) }"),
        "Maximum call depth of 256 exceeded"
    );
}

#[test]
fn finished_activations_are_released() {
    let source = "
        fn make(n) {
            fn inner() -> n
            const f = fn(x) -> x + inner()
            for const i of 0..2 {
                const g = fn() -> i
                g()
            }
            return f(1)
        }
        fn adder() -> fn(x) -> x + 1
        fn main() {
            var total = 0
            for const i of 0..50 {
                total += make(i)
                total += adder()(i)
            }
            return total
        }
    ";
    let mut interpreter = Interpreter::with_output(Config::default(), Box::new(SharedBuffer::new()));
    let before = interpreter.scopes().len();
    let mut parser = Parser::new(source).unwrap();
    assert_eq!(interpreter.run(&mut parser).unwrap(), Value::Integer(2550));
    assert_eq!(interpreter.scopes().len(), before);
}

#[test]
fn execution_completes() {
    let mut interpreter = Interpreter::with_output(Config::default(), Box::new(SharedBuffer::new()));
    let mut parser = Parser::new("fn main() {}").unwrap();
    assert_eq!(interpreter.run(&mut parser).unwrap(), Value::Undefined);
    assert_eq!(interpreter.state(), ExecutionState::Completed);
    assert!(interpreter.lookup("main").is_some());
}

#[test]
fn duplicate_definitions() {
    assert_eq!(
        error_of("fn f() {}\nfn f() {}\nfn main() {}"),
        "'f' is already defined at 'main'"
    );
    assert!(error_of("fn main() { var a = 1 var a = 2 }").contains("already defined"));
}

#[test]
fn match_picks_the_first_equal_arm() {
    let source = r#"
        fn pick(n) {
            match n {
                case 1, 2 -> return "small"
                case 3 -> { return "three" }
                default -> return "big"
            }
        }
        fn main() { std::print(pick(2), pick(3), pick(9)) }
    "#;
    assert_eq!(run(source).output, "small three big\n");
}

#[test]
fn loops_break_and_skip() {
    let source = "
        fn main() {
            var total = 0
            for var i = 0; i < 10; i += 1 {
                if i % 2 == 0 { skip }
                if i > 7 { break }
                total += i
            }
            return total
        }
    ";
    assert_eq!(value_of(source), Value::Integer(16));

    let source = "
        fn main() {
            var n = 0
            while true {
                n += 1
                if n == 5 { break }
            }
            return n
        }
    ";
    assert_eq!(value_of(source), Value::Integer(5));
}

#[test]
fn for_each_over_collections() {
    let source = r#"
        fn main() {
            var sum = 0
            for const x of [1, 2, 3] { sum += x }
            var keys = ""
            for const k in { a: 1, b: 2 } { keys = keys + k }
            var chars = 0
            for const c of "abc" { chars += 1 }
            std::print(sum, keys, chars)
        }
    "#;
    assert_eq!(run(source).output, "6 ab 3\n");
    assert_eq!(
        error_of("fn main() { for const x of 3 {} }"),
        "'int' is not iterable"
    );
}

#[test]
fn arithmetic_rules() {
    assert_eq!(value_of("fn main() { return 7 / 2 }"), Value::Float(3.5));
    assert_eq!(value_of("fn main() { return 7 % 4 }"), Value::Integer(3));
    assert_eq!(value_of("fn main() { return 1 + 0.5 }"), Value::Float(1.5));
    assert_eq!(value_of(r#"fn main() { return "a" + 'b' }"#), string("ab"));
    assert_eq!(error_of("fn main() { return 1 / 0 }"), "Division by zero");
    assert_eq!(
        error_of("fn main() { return 9223372036854775807 + 1 }"),
        "Integer overflow"
    );
    assert_eq!(
        error_of(r#"fn main() { return "a" - 1 }"#),
        "Operator '-' is not defined for 'string' and 'int'"
    );
}

#[test]
fn ranges_and_membership() {
    assert_eq!(
        value_of("fn main() { return 0..3 }"),
        Value::Array(vec![Value::Integer(0), Value::Integer(1), Value::Integer(2)])
    );
    assert_eq!(value_of("fn main() { return 2 in (0..5) }"), Value::Boolean(true));
    assert_eq!(value_of(r#"fn main() { return "ell" in "hello" }"#), Value::Boolean(true));
    assert_eq!(value_of(r#"fn main() { return "z" in { a: 1 } }"#), Value::Boolean(false));
    assert_eq!(value_of("fn main() { return 3..1 }"), Value::Array(Vec::new()));
    assert_eq!(
        error_of("fn main() { for const i of 0..9223372036854775807 {} }"),
        "Range too large"
    );
}

#[test]
fn objects_and_indexing() {
    assert_eq!(
        value_of("fn main() { const o = { a: 1, nested: { b: 2 } } return o.nested.b }"),
        Value::Integer(2)
    );
    assert_eq!(
        value_of("fn main() { const o = { a: 1 } return o.missing }"),
        Value::Undefined
    );
    assert_eq!(
        value_of(r#"fn main() { const o = { a: 1 } return o["a"] }"#),
        Value::Integer(1)
    );
    assert_eq!(value_of("fn main() { return [4, 5, 6].length }"), Value::Integer(3));
    assert_eq!(
        error_of("fn main() { return [1, 2][5] }"),
        "Index 5 out of bounds for length 2"
    );
    assert_eq!(
        value_of(r#"fn main() { const base = { greet: "hi" } const child = std::inherit(base, { x: 1 }) return child.greet }"#),
        string("hi")
    );
}

#[test]
fn increments_update_variables() {
    assert_eq!(
        value_of("fn main() { var i = 0 ++i ++i --i return i }"),
        Value::Integer(1)
    );
}

#[test]
fn script_arguments_are_exposed() {
    let config = Config::default().with_script_args(vec!["a".to_string(), "b".to_string()]);
    let outcome = run_with(config, "fn main() { std::print(std::args) return std::len(std::args) }");
    assert_eq!(outcome.result.unwrap(), Value::Integer(2));
    assert_eq!(outcome.output, "[\"a\", \"b\"]\n");
}

#[test]
fn syntax_errors_carry_positions() {
    let error = Parser::new("fn main() {\n  const x\n}")
        .and_then(|mut parser| parser.parse_program("t"))
        .unwrap_err();
    assert_eq!(
        error.diagnostic("t.scrap"),
        "Constant 'x' must be initialized\nAt t.scrap:2:9"
    );
}
