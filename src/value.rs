use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::ast::{FunctionFlag, Param, Stmt, TypeExpr, Visibility};
use crate::scope::{Capture, ScopeArena, ScopeId};
use crate::stdlib::Host;

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Char(char),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    /// Points at a live variable. Reads observe the current value.
    Reference(Rc<RefCell<Variable>>),
    Function(Function),
}

#[derive(Debug, Clone, Default)]
pub struct Object {
    pub prototype: Option<Rc<Object>>,
    pub properties: Vec<(String, Value)>,
}

impl Object {
    pub fn new(properties: Vec<(String, Value)>) -> Self {
        Self {
            prototype: None,
            properties,
        }
    }

    /// Own properties first, then the prototype chain.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
            .or_else(|| self.prototype.as_ref().and_then(|proto| proto.get(key)))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.properties.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Char(_) => true,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
            Value::Reference(variable) => variable.borrow().value.is_truthy(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Reference(_) => "reference",
            Value::Function(_) => "function",
        }
    }

    /// Follows a reference one level.
    pub fn resolved(&self) -> Value {
        match self {
            Value::Reference(variable) => variable.borrow().value.clone(),
            other => other.clone(),
        }
    }

    fn write_nested(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Char(c) => write!(f, "'{}'", c),
            other => write!(f, "{}", other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.properties == b.properties,
            (Value::Reference(a), Value::Reference(b)) => Rc::ptr_eq(a, b),
            (Value::Reference(a), other) | (other, Value::Reference(a)) => {
                a.borrow().value == *other
            }
            (Value::Function(a), Value::Function(b)) => a.same(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Object(object) => {
                write!(f, "{{")?;
                for (i, (key, value)) in object.properties.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", key)?;
                    value.write_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Reference(variable) => write!(f, "&{}", variable.borrow().name),
            Value::Function(function) => write!(f, "<fn {}>", function.name()),
        }
    }
}

#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub is_const: bool,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, is_const: bool, value: Value) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            is_const,
            value,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => *n == count,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Variadic => write!(f, "any number of"),
        }
    }
}

/// Host side of a native function. Errors become runtime errors at the call.
pub type NativeAction = Rc<dyn Fn(&mut Host, Vec<Value>) -> Result<Value, String>>;

pub struct NativeFn {
    pub name: String,
    pub arity: Arity,
    pub action: NativeAction,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[derive(Debug)]
pub struct DefinedFn {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<[Stmt]>,
    /// Scope the function was declared in.
    pub closure: ScopeId,
    /// Keeps `closure` and its ancestors allocated.
    pub capture: Capture,
    pub flag: Option<FunctionFlag>,
}

impl DefinedFn {
    pub fn has_rest(&self) -> bool {
        self.params.last().map_or(false, |param| param.is_rest)
    }

    /// Parameters that must be supplied positionally.
    pub fn required(&self) -> usize {
        if self.has_rest() {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    Native(Rc<NativeFn>),
    Defined(Rc<DefinedFn>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Native(native) => &native.name,
            Function::Defined(defined) => &defined.name,
        }
    }

    pub fn same(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
            (Function::Defined(a), Function::Defined(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of parameters as declared, for native bindings.
    pub fn arity(&self) -> Arity {
        match self {
            Function::Native(native) => native.arity,
            Function::Defined(defined) if defined.has_rest() => Arity::Variadic,
            Function::Defined(defined) => Arity::Exact(defined.params.len()),
        }
    }
}

/// Something that owns members reachable through `Name::member`.
pub trait Namespace {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Scope in which `member` resolves when accessed from outside, or the
    /// reason the access is refused.
    fn resolve_member(&self, member: &str, scopes: &ScopeArena<Entity>) -> Result<ScopeId, String>;
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub scope: ScopeId,
    exports: RefCell<HashSet<String>>,
}

impl Module {
    pub fn new(name: impl Into<String>, scope: ScopeId) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            scope,
            exports: RefCell::new(HashSet::new()),
        })
    }

    /// Binds `name` in the module scope. Returns false on a duplicate.
    pub fn insert(
        &self,
        scopes: &mut ScopeArena<Entity>,
        name: &str,
        entity: Entity,
        exported: bool,
    ) -> bool {
        if !scopes.set(self.scope, name, entity) {
            return false;
        }
        if exported {
            self.exports.borrow_mut().insert(name.to_string());
        }
        true
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exports.borrow().contains(name)
    }

    pub fn exports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exports.borrow().iter().cloned().collect();
        names.sort();
        names
    }
}

impl Namespace for Module {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "module"
    }

    fn resolve_member(&self, member: &str, scopes: &ScopeArena<Entity>) -> Result<ScopeId, String> {
        if scopes.get_local(self.scope, member).is_none() {
            return Err(format!("'{}' has no member '{}'", self.name, member));
        }
        if !self.is_exported(member) {
            return Err(format!(
                "The module '{}' defines '{}' but doesn't export it",
                self.name, member
            ));
        }
        Ok(self.scope)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MemberInfo {
    pub visibility: Visibility,
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub scope: ScopeId,
    pub base: Option<Rc<Class>>,
    pub members: HashMap<String, MemberInfo>,
}

impl Class {
    /// Looks `member` up in the class and then in its bases.
    pub fn find(&self, member: &str) -> Option<(&Class, MemberInfo)> {
        match self.members.get(member) {
            Some(info) => Some((self, *info)),
            None => self.base.as_ref().and_then(|base| base.find(member)),
        }
    }
}

impl Namespace for Class {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "class"
    }

    fn resolve_member(&self, member: &str, _scopes: &ScopeArena<Entity>) -> Result<ScopeId, String> {
        match self.find(member) {
            None => Err(format!("'{}' has no member '{}'", self.name, member)),
            Some((owner, info)) => match info.visibility {
                Visibility::Public => Ok(owner.scope),
                Visibility::Private => Err(format!(
                    "'{}' is private to class '{}'",
                    member, owner.name
                )),
                Visibility::Protected => Err(format!(
                    "'{}' is protected in class '{}'",
                    member, owner.name
                )),
            },
        }
    }
}

#[derive(Debug)]
pub struct TypeAlias {
    pub name: String,
    pub generics: Vec<String>,
    pub value: TypeExpr,
}

#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub generics: Vec<String>,
    pub methods: Vec<String>,
}

/// A named, storable program element.
#[derive(Debug, Clone)]
pub enum Entity {
    Variable(Rc<RefCell<Variable>>),
    Function(Function),
    Module(Rc<Module>),
    Class(Rc<Class>),
    Type(Rc<TypeAlias>),
    Interface(Rc<Interface>),
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Variable(_) => "variable",
            Entity::Function(_) => "function",
            Entity::Module(_) => "module",
            Entity::Class(_) => "class",
            Entity::Type(_) => "type",
            Entity::Interface(_) => "interface",
        }
    }

    pub fn as_namespace(&self) -> Option<&dyn Namespace> {
        match self {
            Entity::Module(module) => Some(module.as_ref()),
            Entity::Class(class) => Some(class.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        let array = Value::Array(vec![
            Value::Integer(1),
            Value::String("a".to_string()),
            Value::Char('c'),
        ]);
        assert_eq!(array.to_string(), "[1, \"a\", 'c']");
        let object = Value::Object(Object::new(vec![("k".to_string(), Value::Boolean(true))]));
        assert_eq!(object.to_string(), "{k: true}");
    }

    #[test]
    fn prototype_chain_lookup() {
        let proto = Rc::new(Object::new(vec![("greet".to_string(), Value::Integer(1))]));
        let object = Object {
            prototype: Some(proto),
            properties: vec![("own".to_string(), Value::Integer(2))],
        };
        assert_eq!(object.get("greet"), Some(&Value::Integer(1)));
        assert_eq!(object.get("own"), Some(&Value::Integer(2)));
        assert!(!object.has("missing"));
        assert_eq!(object.keys(), vec!["own".to_string()]);
    }

    #[test]
    fn references_compare_by_target_value() {
        let variable = Variable::new("x", false, Value::Integer(4));
        let reference = Value::Reference(variable.clone());
        assert_eq!(reference, Value::Integer(4));
        variable.borrow_mut().value = Value::Integer(5);
        assert_eq!(reference.resolved(), Value::Integer(5));
    }
}
