use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use log::debug;

use crate::scope::{ScopeArena, ScopeId};
use crate::value::{Arity, Entity, Function, Module, NativeAction, NativeFn, Object, Value, Variable};

/// State natives can touch.
pub struct Host {
    pub out: Box<dyn Write>,
    pub args: Vec<String>,
}

impl Host {
    pub fn new(out: Box<dyn Write>, args: Vec<String>) -> Self {
        Self { out, args }
    }
}

/// `Write` sink that can be read back, handy for capturing script output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn native(
    name: &str,
    arity: Arity,
    action: impl Fn(&mut Host, Vec<Value>) -> Result<Value, String> + 'static,
) -> Rc<NativeFn> {
    let action: NativeAction = Rc::new(action);
    Rc::new(NativeFn {
        name: name.to_string(),
        arity,
        action,
    })
}

/// Builds the `std` module as a child of `global`.
pub fn install(scopes: &mut ScopeArena<Entity>, global: ScopeId, args: &[String]) -> Rc<Module> {
    let module = Module::new("std", scopes.alloc("std", Some(global)));

    for function in natives() {
        let name = function.name.clone();
        module.insert(scopes, &name, Entity::Function(Function::Native(function)), true);
    }

    let args = Value::Array(args.iter().cloned().map(Value::String).collect());
    module.insert(scopes, "args", Entity::Variable(Variable::new("args", true, args)), true);

    debug!("std module exports {:?}", module.exports());
    module
}

fn natives() -> Vec<Rc<NativeFn>> {
    vec![
        native("print", Arity::Variadic, print),
        native("len", Arity::Exact(1), len),
        native("typeof", Arity::Exact(1), |_, args| {
            Ok(Value::String(args[0].type_name().to_string()))
        }),
        native("str", Arity::Exact(1), |_, args| {
            Ok(Value::String(args[0].to_string()))
        }),
        native("parseInt", Arity::Exact(1), parse_int),
        native("parseFloat", Arity::Exact(1), parse_float),
        native("push", Arity::Exact(2), push),
        native("keys", Arity::Exact(1), keys),
        native("inherit", Arity::Exact(2), inherit),
    ]
}

fn print(host: &mut Host, args: Vec<Value>) -> Result<Value, String> {
    let line = args
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(host.out, "{}", line).map_err(|e| format!("print failed: {}", e))?;
    Ok(Value::Undefined)
}

fn len(_: &mut Host, args: Vec<Value>) -> Result<Value, String> {
    let count = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(object) => object.properties.len(),
        other => return Err(format!("len() is not defined for '{}'", other.type_name())),
    };
    Ok(Value::Integer(count as i64))
}

fn parse_int(_: &mut Host, args: Vec<Value>) -> Result<Value, String> {
    Ok(match &args[0] {
        Value::Integer(n) => Value::Integer(*n),
        Value::Float(n) => Value::Integer(n.trunc() as i64),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or(Value::Undefined),
        Value::Char(c) => c
            .to_digit(10)
            .map(|d| Value::Integer(d as i64))
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

fn parse_float(_: &mut Host, args: Vec<Value>) -> Result<Value, String> {
    Ok(match &args[0] {
        Value::Integer(n) => Value::Float(*n as f64),
        Value::Float(n) => Value::Float(*n),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

fn push(_: &mut Host, mut args: Vec<Value>) -> Result<Value, String> {
    let item = args.pop().unwrap_or(Value::Undefined);
    match args.pop() {
        Some(Value::Array(mut items)) => {
            items.push(item);
            Ok(Value::Array(items))
        }
        Some(other) => Err(format!("push() expects an array, got '{}'", other.type_name())),
        None => Err("push() expects an array".to_string()),
    }
}

fn keys(_: &mut Host, args: Vec<Value>) -> Result<Value, String> {
    match &args[0] {
        Value::Object(object) => Ok(Value::Array(
            object.keys().into_iter().map(Value::String).collect(),
        )),
        Value::Array(items) => Ok(Value::Array(
            (0..items.len() as i64).map(Value::Integer).collect(),
        )),
        other => Err(format!("keys() is not defined for '{}'", other.type_name())),
    }
}

fn inherit(_: &mut Host, mut args: Vec<Value>) -> Result<Value, String> {
    let object = args.pop();
    let prototype = args.pop();
    match (prototype, object) {
        (Some(Value::Object(prototype)), Some(Value::Object(object))) => Ok(Value::Object(Object {
            prototype: Some(Rc::new(prototype)),
            properties: object.properties,
        })),
        _ => Err("inherit() expects two objects".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> (Host, SharedBuffer) {
        let buffer = SharedBuffer::new();
        (Host::new(Box::new(buffer.clone()), Vec::new()), buffer)
    }

    #[test]
    fn print_joins_with_spaces() {
        let (mut host, buffer) = host();
        print(
            &mut host,
            vec![Value::String("a".to_string()), Value::Integer(1), Value::Float(2.0)],
        )
        .unwrap();
        assert_eq!(buffer.contents(), "a 1 2.0\n");
    }

    #[test]
    fn push_returns_a_new_array() {
        let (mut host, _) = host();
        let result = push(
            &mut host,
            vec![Value::Array(vec![Value::Integer(1)]), Value::Integer(2)],
        )
        .unwrap();
        assert_eq!(result, Value::Array(vec![Value::Integer(1), Value::Integer(2)]));
        assert!(push(&mut host, vec![Value::Integer(1), Value::Integer(2)]).is_err());
    }

    #[test]
    fn parse_int_falls_back_to_undefined() {
        let (mut host, _) = host();
        assert_eq!(
            parse_int(&mut host, vec![Value::String(" 42 ".to_string())]).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            parse_int(&mut host, vec![Value::String("x".to_string())]).unwrap(),
            Value::Undefined
        );
    }

    #[test]
    fn install_exports_natives_and_args() {
        let mut scopes = ScopeArena::new();
        let global = scopes.alloc("global", None);
        let module = install(&mut scopes, global, &["one".to_string()]);
        assert!(module.is_exported("print"));
        assert!(module.is_exported("args"));
        match scopes.get_local(module.scope, "args") {
            Some(Entity::Variable(variable)) => assert_eq!(
                variable.borrow().value,
                Value::Array(vec![Value::String("one".to_string())])
            ),
            other => panic!("unexpected entity {:?}", other),
        }
    }
}
