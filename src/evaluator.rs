use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, trace};

use crate::ast::{BinaryOp, Decl, Expr, FunctionDecl, ImportSymbols, IterationKind, Stmt, UnaryOp};
use crate::config::Config;
use crate::error::{ScrapError, Span};
use crate::parser::Parser;
use crate::scope::{ScopeArena, ScopeId};
use crate::stdlib::{self, Host};
use crate::value::{
    Arity, Class, DefinedFn, Entity, Function, Interface, MemberInfo, Module, NativeFn,
    Object, TypeAlias, Value, Variable,
};

/// How a statement finished.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Running,
    Completed,
    Faulted,
}

/// One active call. Every frame below the top one is suspended.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: String,
    pub scope: ScopeId,
}

/// Headroom left before a call moves onto a fresh stack segment.
const STACK_RED_ZONE: usize = 256 * 1024;
const STACK_SEGMENT: usize = 4 * 1024 * 1024;

pub struct Interpreter {
    scopes: ScopeArena<Entity>,
    root: Rc<Module>,
    natives: HashMap<String, Rc<NativeFn>>,
    host: Host,
    config: Config,
    state: ExecutionState,
    frames: Vec<Frame>,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        Self::with_output(config, Box::new(io::stdout()))
    }

    /// Interpreter whose `print` output goes to `out`.
    pub fn with_output(config: Config, out: Box<dyn Write>) -> Self {
        let mut scopes = ScopeArena::new();
        let global = scopes.alloc("global", None);
        for (name, value) in [
            ("true", Value::Boolean(true)),
            ("false", Value::Boolean(false)),
            ("undefined", Value::Undefined),
        ] {
            scopes.set(global, name, Entity::Variable(Variable::new(name, true, value)));
        }
        let std_module = stdlib::install(&mut scopes, global, &config.script_args);
        scopes.set(global, "std", Entity::Module(std_module));

        let root_name = config.root_name().to_string();
        let root = Module::new(root_name.clone(), scopes.alloc(root_name, Some(global)));
        let host = Host::new(out, config.script_args.clone());

        Self {
            scopes,
            root,
            natives: HashMap::new(),
            host,
            config,
            state: ExecutionState::Created,
            frames: Vec::new(),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn root(&self) -> &Rc<Module> {
        &self.root
    }

    pub fn scopes(&self) -> &ScopeArena<Entity> {
        &self.scopes
    }

    /// Resolves `name` from the root module scope.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.scopes.get(self.root.scope, name)
    }

    /// Makes a host function available to `extern fn` declarations.
    pub fn register_native(
        &mut self,
        name: &str,
        arity: Arity,
        action: impl Fn(&mut Host, Vec<Value>) -> Result<Value, String> + 'static,
    ) {
        self.natives
            .insert(name.to_string(), stdlib::native(name, arity, action));
    }

    /// Evaluates every declaration the parser yields, then calls `main`.
    pub fn run(&mut self, parser: &mut Parser) -> Result<Value, ScrapError> {
        self.load(parser)?;
        self.run_main()
    }

    /// Evaluates top-level declarations into the root module.
    pub fn load(&mut self, parser: &mut Parser) -> Result<(), ScrapError> {
        self.state = ExecutionState::Running;
        let result = self.load_declarations(parser);
        if result.is_err() {
            self.state = ExecutionState::Faulted;
        }
        result
    }

    fn load_declarations(&mut self, parser: &mut Parser) -> Result<(), ScrapError> {
        while !parser.is_at_end() {
            let decl = parser.parse_decl()?;
            self.declare(&decl)?;
        }
        Ok(())
    }

    /// Calls the zero-parameter `main` of the root module.
    pub fn run_main(&mut self) -> Result<Value, ScrapError> {
        self.state = ExecutionState::Running;
        let result = self.call_main();
        self.state = match result {
            Ok(_) => ExecutionState::Completed,
            Err(_) => ExecutionState::Faulted,
        };
        result
    }

    fn call_main(&mut self) -> Result<Value, ScrapError> {
        let span = Span::new(0, 0);
        let main = match self.scopes.get_local(self.root.scope, "main") {
            Some(Entity::Function(function)) => function,
            _ => {
                return Err(ScrapError::runtime_with_help(
                    span,
                    "Missing program entry point (main function)".to_string(),
                    "declare one with: fn main() { ... }".to_string(),
                ))
            }
        };
        if main.arity() != Arity::Exact(0) {
            return Err(ScrapError::runtime(
                span,
                "The program entry point 'main' must not take parameters".to_string(),
            ));
        }
        debug!("calling entry point of '{}'", self.root.name);
        self.call_function(&main, Vec::new(), span)
    }

    /// Binds a top-level declaration in the root module.
    pub fn declare(&mut self, decl: &Decl) -> Result<(), ScrapError> {
        for (name, entity) in self.compute_entity(decl, self.root.scope)? {
            if !self
                .root
                .insert(&mut self.scopes, &name, entity, decl.is_exported())
            {
                return Err(self.already_defined(&name, self.root.scope, *decl.span()));
            }
        }
        Ok(())
    }

    /// Executes statements against the root scope. Returns the value of the
    /// last statement when it is an expression.
    pub fn eval_statements(&mut self, statements: &[Stmt]) -> Result<Option<Value>, ScrapError> {
        let scope = self.root.scope;
        let mut last = None;
        for stmt in statements {
            last = match stmt {
                Stmt::Expression { expr, .. } => Some(self.compute_value(expr, scope)?),
                other => {
                    self.execute(other, scope)?;
                    None
                }
            };
        }
        Ok(last)
    }

    fn already_defined(&self, name: &str, scope: ScopeId, span: Span) -> ScrapError {
        ScrapError::runtime(
            span,
            format!(
                "'{}' is already defined at '{}'",
                name,
                self.scopes.owner(scope)
            ),
        )
    }

    // ----- declarations -----

    /// Turns a declaration into the named entities it introduces.
    pub fn compute_entity(
        &mut self,
        decl: &Decl,
        scope: ScopeId,
    ) -> Result<Vec<(String, Entity)>, ScrapError> {
        match decl {
            Decl::Variable {
                name,
                is_const,
                value,
                ..
            } => {
                let value = match value {
                    Some(expr) => self.compute_value(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(vec![(
                    name.clone(),
                    Entity::Variable(Variable::new(name.clone(), *is_const, value)),
                )])
            }
            Decl::Function(function) => Ok(vec![(
                function.name().to_string(),
                Entity::Function(self.make_function(function, scope)),
            )]),
            Decl::Extern { sig, span, .. } => {
                let name = sig.name.clone().unwrap_or_default();
                let native = self.natives.get(&name).cloned().ok_or_else(|| {
                    ScrapError::runtime_with_help(
                        *span,
                        format!("No native binding for extern function '{}'", name),
                        "register it on the interpreter before running".to_string(),
                    )
                })?;
                let declared = if sig.has_rest() {
                    Arity::Variadic
                } else {
                    Arity::Exact(sig.params.len())
                };
                if declared != native.arity {
                    return Err(ScrapError::runtime(
                        *span,
                        format!(
                            "Extern function '{}' declares {} parameters but its native binding takes {}",
                            name, declared, native.arity
                        ),
                    ));
                }
                Ok(vec![(name, Entity::Function(Function::Native(native)))])
            }
            Decl::Module { name, body, span, .. } => {
                let module = self.compute_module(name, body, scope, *span)?;
                Ok(vec![(name.clone(), Entity::Module(module))])
            }
            Decl::Class {
                name,
                inherits,
                implements,
                members,
                span,
                ..
            } => {
                let base = match inherits {
                    Some(base) => match self.scopes.get(scope, base) {
                        Some(Entity::Class(class)) => Some(class),
                        Some(other) => {
                            return Err(ScrapError::runtime(
                                *span,
                                format!(
                                    "'{}' is a {}, a class can only extend a class",
                                    base,
                                    other.kind()
                                ),
                            ))
                        }
                        None => return Err(not_defined(base, *span)),
                    },
                    None => None,
                };

                let parent = base.as_ref().map_or(scope, |base| base.scope);
                let class_scope = self.scopes.alloc(name.clone(), Some(parent));
                let mut infos = HashMap::new();
                for member in members {
                    for (member_name, entity) in self.compute_entity(&member.decl, class_scope)? {
                        if !self.scopes.set(class_scope, member_name.clone(), entity) {
                            return Err(self.already_defined(
                                &member_name,
                                class_scope,
                                *member.decl.span(),
                            ));
                        }
                        infos.insert(
                            member_name,
                            MemberInfo {
                                visibility: member.visibility,
                            },
                        );
                    }
                }

                let class = Rc::new(Class {
                    name: name.clone(),
                    scope: class_scope,
                    base,
                    members: infos,
                });
                for interface in implements {
                    self.check_implements(&class, interface, scope, *span)?;
                }
                debug!("class '{}' with {} members", name, class.members.len());
                Ok(vec![(name.clone(), Entity::Class(class))])
            }
            Decl::Import {
                path,
                symbols,
                span,
            } => self.compute_import(path, symbols, scope, *span),
            Decl::Type {
                name,
                generics,
                value,
                ..
            } => Ok(vec![(
                name.clone(),
                Entity::Type(Rc::new(TypeAlias {
                    name: name.clone(),
                    generics: generics.clone(),
                    value: value.clone(),
                })),
            )]),
            Decl::Interface {
                name,
                generics,
                methods,
                ..
            } => Ok(vec![(
                name.clone(),
                Entity::Interface(Rc::new(Interface {
                    name: name.clone(),
                    generics: generics.clone(),
                    methods: methods.iter().filter_map(|sig| sig.name.clone()).collect(),
                })),
            )]),
        }
    }

    fn make_function(&mut self, function: &FunctionDecl, scope: ScopeId) -> Function {
        Function::Defined(Rc::new(DefinedFn {
            name: function.name().to_string(),
            params: function.sig.params.clone(),
            body: function.body.clone().into(),
            closure: scope,
            capture: self.scopes.capture(scope),
            flag: function.sig.flag,
        }))
    }

    fn compute_module(
        &mut self,
        name: &str,
        body: &[Decl],
        parent: ScopeId,
        span: Span,
    ) -> Result<Rc<Module>, ScrapError> {
        debug!("evaluating module '{}'", name);
        let module = Module::new(name, self.scopes.alloc(name, Some(parent)));
        for member in body {
            for (member_name, entity) in self.compute_entity(member, module.scope)? {
                if !module.insert(&mut self.scopes, &member_name, entity, member.is_exported()) {
                    return Err(self.already_defined(&member_name, module.scope, span));
                }
            }
        }
        trace!("module '{}' exports {:?}", name, module.exports());
        Ok(module)
    }

    fn check_implements(
        &self,
        class: &Class,
        interface: &str,
        scope: ScopeId,
        span: Span,
    ) -> Result<(), ScrapError> {
        let interface = match self.scopes.get(scope, interface) {
            Some(Entity::Interface(interface)) => interface,
            Some(other) => {
                return Err(ScrapError::runtime(
                    span,
                    format!("'{}' is a {}, not an interface", interface, other.kind()),
                ))
            }
            None => return Err(not_defined(interface, span)),
        };
        for method in &interface.methods {
            let implemented = class.find(method).map_or(false, |(owner, _)| {
                matches!(
                    self.scopes.get_local(owner.scope, method),
                    Some(Entity::Function(_))
                )
            });
            if !implemented {
                return Err(ScrapError::runtime(
                    span,
                    format!(
                        "Class '{}' does not implement '{}' from interface '{}'",
                        class.name, method, interface.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn compute_import(
        &mut self,
        path: &[String],
        symbols: &ImportSymbols,
        scope: ScopeId,
        span: Span,
    ) -> Result<Vec<(String, Entity)>, ScrapError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Vec::new());
        };
        let mut target = self
            .scopes
            .get(scope, first)
            .ok_or_else(|| not_defined(first, span))?;
        for segment in rest {
            target = self.member_entity(&target, segment, span)?;
        }

        match symbols {
            ImportSymbols::Module => Ok(vec![(path[path.len() - 1].clone(), target)]),
            ImportSymbols::All => match &target {
                Entity::Module(module) => Ok(module
                    .exports()
                    .into_iter()
                    .filter_map(|name| {
                        self.scopes
                            .get_local(module.scope, &name)
                            .map(|entity| (name, entity))
                    })
                    .collect()),
                other => Err(ScrapError::runtime(
                    span,
                    format!("Can not import everything from a {}", other.kind()),
                )),
            },
            ImportSymbols::List(list) => {
                let mut bindings = Vec::with_capacity(list.len());
                for symbol in list {
                    let mut entity = target.clone();
                    for segment in symbol {
                        entity = self.member_entity(&entity, segment, span)?;
                    }
                    if let Some(name) = symbol.last() {
                        bindings.push((name.clone(), entity));
                    }
                }
                Ok(bindings)
            }
        }
    }

    /// Entity named `member` inside a module or class, subject to visibility.
    fn member_entity(&self, owner: &Entity, member: &str, span: Span) -> Result<Entity, ScrapError> {
        let namespace = owner.as_namespace().ok_or_else(|| {
            ScrapError::runtime(
                span,
                format!("A {} has no members, can not access '{}'", owner.kind(), member),
            )
        })?;
        let scope = namespace
            .resolve_member(member, &self.scopes)
            .map_err(|message| ScrapError::runtime(span, message))?;
        self.scopes.get_local(scope, member).ok_or_else(|| {
            ScrapError::runtime(
                span,
                format!("'{}' has no member '{}'", namespace.name(), member),
            )
        })
    }

    // ----- statements -----

    pub fn execute(&mut self, stmt: &Stmt, scope: ScopeId) -> Result<Flow, ScrapError> {
        match stmt {
            Stmt::Declaration(decl) => {
                for (name, entity) in self.compute_entity(decl, scope)? {
                    if !self.scopes.set(scope, name.clone(), entity) {
                        return Err(self.already_defined(&name, scope, *decl.span()));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Expression { expr, .. } => {
                self.compute_value(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                condition,
                body,
                else_body,
                ..
            } => {
                if self.compute_value(condition, scope)?.is_truthy() {
                    self.execute_block(body, scope, "if")
                } else if let Some(else_body) = else_body {
                    self.execute_block(else_body, scope, "else")
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                while self.compute_value(condition, scope)?.is_truthy() {
                    match self.execute_block(body, scope, "while")? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Skip => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                let loop_scope = self.scopes.alloc("for", Some(scope));
                let result = self.execute_for(init, condition, step, body, loop_scope);
                self.scopes.clean(loop_scope);
                result
            }
            Stmt::ForEach {
                binding,
                is_const,
                kind,
                subject,
                body,
                span,
            } => {
                let items = match (kind, self.compute_value(subject, scope)?.resolved()) {
                    (IterationKind::Of, Value::Array(items)) => items,
                    (IterationKind::In, Value::Array(items)) => indices(items.len()),
                    (IterationKind::Of, Value::String(s)) => s.chars().map(Value::Char).collect(),
                    (IterationKind::In, Value::String(s)) => indices(s.chars().count()),
                    (IterationKind::Of, Value::Object(object)) => {
                        object.properties.into_iter().map(|(_, value)| value).collect()
                    }
                    (IterationKind::In, Value::Object(object)) => {
                        object.keys().into_iter().map(Value::String).collect()
                    }
                    (_, other) => {
                        return Err(ScrapError::runtime(
                            *span,
                            format!("'{}' is not iterable", other.type_name()),
                        ))
                    }
                };

                for item in items {
                    let iteration = self.scopes.alloc("for", Some(scope));
                    let variable = Variable::new(binding.clone(), *is_const, item);
                    self.scopes
                        .set(iteration, binding.clone(), Entity::Variable(variable));
                    let flow = self.execute_all(body, iteration);
                    self.scopes.clean(iteration);
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Skip => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Match {
                subject,
                arms,
                default,
                ..
            } => {
                let value = self.compute_value(subject, scope)?;
                for arm in arms {
                    for candidate in &arm.subjects {
                        if self.compute_value(candidate, scope)? == value {
                            return self.execute_block(&arm.body, scope, "case");
                        }
                    }
                }
                match default {
                    Some(body) => self.execute_block(body, scope, "default"),
                    None => Ok(Flow::Normal),
                }
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.compute_value(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Skip { .. } => Ok(Flow::Skip),
        }
    }

    fn execute_all(&mut self, statements: &[Stmt], scope: ScopeId) -> Result<Flow, ScrapError> {
        for stmt in statements {
            match self.execute(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Runs `statements` in a fresh child of `parent`, released afterwards.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        parent: ScopeId,
        owner: &str,
    ) -> Result<Flow, ScrapError> {
        let scope = self.scopes.alloc(owner, Some(parent));
        let flow = self.execute_all(statements, scope);
        self.scopes.clean(scope);
        flow
    }

    fn execute_for(
        &mut self,
        init: &Decl,
        condition: &Expr,
        step: &Expr,
        body: &[Stmt],
        scope: ScopeId,
    ) -> Result<Flow, ScrapError> {
        self.execute(&Stmt::Declaration(init.clone()), scope)?;
        while self.compute_value(condition, scope)?.is_truthy() {
            match self.execute_block(body, scope, "for")? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Skip => {}
            }
            self.compute_value(step, scope)?;
        }
        Ok(Flow::Normal)
    }

    // ----- expressions -----

    pub fn compute_value(&mut self, expr: &Expr, scope: ScopeId) -> Result<Value, ScrapError> {
        match expr {
            Expr::Number { value, .. } => Ok(Value::Integer(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::String { value, .. } => Ok(Value::String(value.clone())),
            Expr::Char { value, .. } => Ok(Value::Char(*value)),
            Expr::Identifier { name, span } => self.compute_identifier(name, scope, *span),
            Expr::Array { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.compute_value(element, scope)?);
                }
                Ok(Value::Array(items))
            }
            Expr::Object { entries, .. } => {
                let mut properties = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    properties.push((key.clone(), self.compute_value(value, scope)?));
                }
                Ok(Value::Object(Object::new(properties)))
            }
            Expr::Call { callee, args, span } => {
                self.compute_call(callee, args, scope, scope, *span)
            }
            Expr::Binary {
                operator,
                lhs,
                rhs,
                span,
            } => self.compute_binary(*operator, lhs, rhs, scope, *span),
            Expr::Unary {
                operator,
                operand,
                span,
            } => self.compute_unary(*operator, operand, scope, *span),
            Expr::Reassignment {
                target,
                value,
                span,
            } => {
                let variable = self.variable(target, scope, *span)?;
                if variable.borrow().is_const {
                    return Err(const_error(*span));
                }
                let value = self.compute_value(value, scope)?;
                assign(&variable, value, *span)
            }
            Expr::ModuleAccess {
                module,
                member,
                span,
            } => self.compute_module_access(module, member, scope, scope, *span),
            Expr::ObjectAccess {
                object,
                member,
                span,
            } => {
                let object = self.compute_value(object, scope)?.resolved();
                match (&object, member.as_str()) {
                    (Value::Object(object), key) => {
                        Ok(object.get(key).cloned().unwrap_or(Value::Undefined))
                    }
                    (Value::Array(items), "length") => Ok(Value::Integer(items.len() as i64)),
                    (Value::String(s), "length") => Ok(Value::Integer(s.chars().count() as i64)),
                    (other, key) => Err(ScrapError::runtime(
                        *span,
                        format!("'{}' has no property '{}'", other.type_name(), key),
                    )),
                }
            }
            Expr::Index {
                object,
                index,
                span,
            } => {
                let object = self.compute_value(object, scope)?.resolved();
                let index = self.compute_value(index, scope)?.resolved();
                compute_index(&object, &index, *span)
            }
            Expr::Reference { target, span } => {
                let variable = self.variable(target, scope, *span)?;
                let existing = match &variable.borrow().value {
                    Value::Reference(inner) => Some(Rc::clone(inner)),
                    _ => None,
                };
                Ok(Value::Reference(existing.unwrap_or(variable)))
            }
            Expr::Function(function) => {
                Ok(Value::Function(self.make_function(function, scope)))
            }
        }
    }

    fn compute_identifier(
        &self,
        name: &str,
        scope: ScopeId,
        span: Span,
    ) -> Result<Value, ScrapError> {
        match self.scopes.get(scope, name) {
            Some(Entity::Variable(variable)) => {
                let value = variable.borrow().value.resolved();
                Ok(value)
            }
            Some(Entity::Function(function)) => Ok(Value::Function(function)),
            Some(other) => Err(ScrapError::runtime(
                span,
                format!("'{}' is a {} and can not be used as a value", name, other.kind()),
            )),
            None => Err(not_defined(name, span)),
        }
    }

    fn variable(
        &self,
        name: &str,
        scope: ScopeId,
        span: Span,
    ) -> Result<Rc<RefCell<Variable>>, ScrapError> {
        match self.scopes.get(scope, name) {
            Some(Entity::Variable(variable)) => Ok(variable),
            Some(other) => Err(ScrapError::runtime(
                span,
                format!("'{}' is a {}, not a variable", name, other.kind()),
            )),
            None => Err(not_defined(name, span)),
        }
    }

    /// Resolves the callee in `lookup` and evaluates the arguments in
    /// `arg_scope`. They differ for `Module::f(args)`.
    fn compute_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        lookup: ScopeId,
        arg_scope: ScopeId,
        span: Span,
    ) -> Result<Value, ScrapError> {
        let function = match callee {
            Expr::Identifier { name, span } => self.resolve_callable(name, lookup, *span)?,
            other => match self.compute_value(other, lookup)?.resolved() {
                Value::Function(function) => function,
                value => {
                    return Err(ScrapError::runtime(
                        span,
                        format!("A value of type '{}' is not callable", value.type_name()),
                    ))
                }
            },
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.compute_value(arg, arg_scope)?);
        }
        self.call_function(&function, values, span)
    }

    fn resolve_callable(&self, name: &str, scope: ScopeId, span: Span) -> Result<Function, ScrapError> {
        match self.scopes.get(scope, name) {
            Some(Entity::Function(function)) => Ok(function),
            Some(Entity::Variable(variable)) => {
                let value = variable.borrow().value.resolved();
                match value {
                    Value::Function(function) => Ok(function),
                    _ => Err(ScrapError::runtime(
                        span,
                        format!("'{}' is not callable", name),
                    )),
                }
            }
            Some(other) => Err(ScrapError::runtime(
                span,
                format!("'{}' is a {} and is not callable", name, other.kind()),
            )),
            None => Err(not_defined(name, span)),
        }
    }

    pub fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, ScrapError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(ScrapError::runtime(
                span,
                format!(
                    "Maximum call depth of {} exceeded",
                    self.config.max_call_depth
                ),
            ));
        }
        match function {
            Function::Native(native) => {
                if !native.arity.accepts(args.len()) {
                    return Err(arity_error(&native.name, "", native.arity, args.len(), span));
                }
                trace!("native call {}({} args)", native.name, args.len());
                let action = Rc::clone(&native.action);
                (*action)(&mut self.host, args).map_err(|message| ScrapError::runtime(span, message))
            }
            Function::Defined(defined) => self.call_defined(defined, args, span),
        }
    }

    fn call_defined(
        &mut self,
        function: &Rc<DefinedFn>,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, ScrapError> {
        let required = function.required();
        if function.has_rest() && args.len() < required {
            return Err(arity_error(
                &function.name,
                "at least ",
                Arity::Exact(required),
                args.len(),
                span,
            ));
        }
        if !function.has_rest() && args.len() != required {
            return Err(arity_error(
                &function.name,
                "",
                Arity::Exact(required),
                args.len(),
                span,
            ));
        }

        let scope = self.scopes.alloc(function.name.clone(), Some(function.closure));
        self.frames.push(Frame {
            function: function.name.clone(),
            scope,
        });
        debug!("enter '{}' at depth {}", function.name, self.frames.len());

        let body = Rc::clone(&function.body);
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.bind_params(function, args, scope, span)
                .and_then(|_| self.execute_all(&body, scope))
        });

        self.frames.pop();
        self.scopes.clean(scope);
        debug!("leave '{}'", function.name);

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn bind_params(
        &mut self,
        function: &DefinedFn,
        args: Vec<Value>,
        scope: ScopeId,
        span: Span,
    ) -> Result<(), ScrapError> {
        let mut args = args.into_iter();
        for param in &function.params {
            let value = if param.is_rest {
                Value::Array(args.by_ref().collect())
            } else {
                args.next().unwrap_or(Value::Undefined)
            };
            let variable = Variable::new(param.name.clone(), false, value);
            if !self
                .scopes
                .set(scope, param.name.clone(), Entity::Variable(variable))
            {
                return Err(ScrapError::runtime(
                    span,
                    format!(
                        "Duplicate parameter '{}' in function '{}'",
                        param.name, function.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// `Mod::member` where `member` is an identifier, a call or a nested
    /// access. The member resolves in the namespace, call arguments in
    /// `arg_scope`.
    fn compute_module_access(
        &mut self,
        module: &str,
        member: &Expr,
        lookup: ScopeId,
        arg_scope: ScopeId,
        span: Span,
    ) -> Result<Value, ScrapError> {
        let owner = self
            .scopes
            .get(lookup, module)
            .ok_or_else(|| not_defined(module, span))?;
        let namespace = owner.as_namespace().ok_or_else(|| {
            ScrapError::runtime(
                span,
                format!("'{}' is a {} and has no members", module, owner.kind()),
            )
        })?;

        let name = match member {
            Expr::Identifier { name, .. } => name.as_str(),
            Expr::Call { callee, .. } => match callee.as_ref() {
                Expr::Identifier { name, .. } => name.as_str(),
                other => return Err(invalid_member(other)),
            },
            Expr::ModuleAccess { module, .. } => module.as_str(),
            other => return Err(invalid_member(other)),
        };
        let target = namespace
            .resolve_member(name, &self.scopes)
            .map_err(|message| ScrapError::runtime(span, message))?;
        trace!("{} {}::{}", namespace.kind(), namespace.name(), name);

        match member {
            Expr::Call {
                callee,
                args,
                span,
            } => self.compute_call(callee, args, target, arg_scope, *span),
            Expr::ModuleAccess {
                module,
                member,
                span,
            } => self.compute_module_access(module, member, target, arg_scope, *span),
            _ => self.compute_identifier(name, target, span),
        }
    }

    fn compute_unary(
        &mut self,
        operator: UnaryOp,
        operand: &Expr,
        scope: ScopeId,
        span: Span,
    ) -> Result<Value, ScrapError> {
        match operator {
            UnaryOp::Increment | UnaryOp::Decrement => {
                let Expr::Identifier { name, .. } = operand else {
                    return Err(ScrapError::runtime(
                        span,
                        "Only variables can be incremented or decremented".to_string(),
                    ));
                };
                let variable = self.variable(name, scope, span)?;
                if variable.borrow().is_const {
                    return Err(const_error(span));
                }
                let delta = if operator == UnaryOp::Increment {
                    BinaryOp::Add
                } else {
                    BinaryOp::Subtract
                };
                let current = variable.borrow().value.resolved();
                let next = binary_values(delta, current, Value::Integer(1), span)?;
                assign(&variable, next, span)
            }
            UnaryOp::Await => {
                trace!("await evaluates synchronously");
                self.compute_value(operand, scope)
            }
            UnaryOp::Not => Ok(Value::Boolean(!self.compute_value(operand, scope)?.is_truthy())),
            UnaryOp::Negate | UnaryOp::Plus => {
                let value = self.compute_value(operand, scope)?.resolved();
                match (operator, value) {
                    (UnaryOp::Plus, value @ (Value::Integer(_) | Value::Float(_))) => Ok(value),
                    (_, Value::Integer(n)) => n
                        .checked_neg()
                        .map(Value::Integer)
                        .ok_or_else(|| overflow(span)),
                    (_, Value::Float(n)) => Ok(Value::Float(-n)),
                    (_, other) => Err(ScrapError::runtime(
                        span,
                        format!(
                            "Unary '{}' is not defined for '{}'",
                            if operator == UnaryOp::Plus { "+" } else { "-" },
                            other.type_name()
                        ),
                    )),
                }
            }
        }
    }

    fn compute_binary(
        &mut self,
        operator: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        scope: ScopeId,
        span: Span,
    ) -> Result<Value, ScrapError> {
        let left = self.compute_value(lhs, scope)?.resolved();
        match operator {
            BinaryOp::And => {
                if !left.is_truthy() {
                    return Ok(left);
                }
                Ok(self.compute_value(rhs, scope)?.resolved())
            }
            BinaryOp::Or => {
                if left.is_truthy() {
                    return Ok(left);
                }
                Ok(self.compute_value(rhs, scope)?.resolved())
            }
            BinaryOp::EagerAnd => {
                let right = self.compute_value(rhs, scope)?.resolved();
                Ok(if left.is_truthy() { right } else { left })
            }
            BinaryOp::EagerOr => {
                let right = self.compute_value(rhs, scope)?.resolved();
                Ok(if left.is_truthy() { left } else { right })
            }
            _ => {
                let right = self.compute_value(rhs, scope)?.resolved();
                binary_values(operator, left, right, span)
            }
        }
    }
}

fn not_defined(name: &str, span: Span) -> ScrapError {
    ScrapError::runtime(span, format!("'{}' is not defined", name))
}

fn const_error(span: Span) -> ScrapError {
    ScrapError::runtime(span, "A constant can not change its value".to_string())
}

fn overflow(span: Span) -> ScrapError {
    ScrapError::runtime(span, "Integer overflow".to_string())
}

fn invalid_member(expr: &Expr) -> ScrapError {
    ScrapError::runtime(*expr.span(), "Invalid module member access".to_string())
}

fn arity_error(name: &str, qualifier: &str, expected: Arity, got: usize, span: Span) -> ScrapError {
    ScrapError::runtime(
        span,
        format!(
            "Function '{}' expects {}{} arguments but got {}",
            name, qualifier, expected, got
        ),
    )
}

fn indices(len: usize) -> Vec<Value> {
    (0..len as i64).map(Value::Integer).collect()
}

/// Stores `value` into `variable`, or into its referent when it holds a
/// reference. Assigning a reference rebinds the variable itself.
fn assign(
    variable: &Rc<RefCell<Variable>>,
    value: Value,
    span: Span,
) -> Result<Value, ScrapError> {
    let referent = match &variable.borrow().value {
        Value::Reference(inner) if !matches!(value, Value::Reference(_)) => Some(Rc::clone(inner)),
        _ => None,
    };
    let target = referent.as_ref().unwrap_or(variable);
    if target.borrow().is_const {
        return Err(const_error(span));
    }
    if reaches(&value, target) {
        return Err(ScrapError::runtime(span, "A variable can not reference itself".to_string()));
    }
    target.borrow_mut().value = value.clone();
    Ok(value)
}

/// Whether following the reference chain from `value` arrives at `target`.
fn reaches(value: &Value, target: &Rc<RefCell<Variable>>) -> bool {
    let mut next = match value {
        Value::Reference(inner) => Some(Rc::clone(inner)),
        _ => None,
    };
    while let Some(current) = next {
        if Rc::ptr_eq(&current, target) {
            return true;
        }
        next = match &current.borrow().value {
            Value::Reference(inner) => Some(Rc::clone(inner)),
            _ => None,
        };
    }
    false
}

fn compute_index(object: &Value, index: &Value, span: Span) -> Result<Value, ScrapError> {
    let out_of_bounds = |i: i64, len: usize| {
        ScrapError::runtime(
            span,
            format!("Index {} out of bounds for length {}", i, len),
        )
    };
    match (object, index) {
        (Value::Array(items), Value::Integer(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| out_of_bounds(*i, items.len())),
        (Value::String(s), Value::Integer(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(Value::Char)
            .ok_or_else(|| out_of_bounds(*i, s.chars().count())),
        (Value::Object(object), Value::String(key)) => {
            Ok(object.get(key).cloned().unwrap_or(Value::Undefined))
        }
        (object, index) => Err(ScrapError::runtime(
            span,
            format!(
                "Can not index '{}' with '{}'",
                object.type_name(),
                index.type_name()
            ),
        )),
    }
}

/// Longest array a `..` range may produce.
const MAX_RANGE_LEN: i64 = 1 << 24;

fn range_too_large(span: Span) -> ScrapError {
    ScrapError::runtime(span, "Range too large".to_string())
}

fn binary_values(operator: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, ScrapError> {
    use Value::*;

    let mismatch = |left: &Value, right: &Value| {
        ScrapError::runtime(
            span,
            format!(
                "Operator '{}' is not defined for '{}' and '{}'",
                operator.symbol(),
                left.type_name(),
                right.type_name()
            ),
        )
    };

    match operator {
        BinaryOp::Equal => return Ok(Boolean(left == right)),
        BinaryOp::NotEqual => return Ok(Boolean(left != right)),
        BinaryOp::In => {
            return match (&left, &right) {
                (item, Array(items)) => Ok(Boolean(items.contains(item))),
                (String(key), Object(object)) => Ok(Boolean(object.has(key))),
                (String(needle), String(haystack)) => {
                    Ok(Boolean(haystack.contains(needle.as_str())))
                }
                (Char(c), String(haystack)) => Ok(Boolean(haystack.contains(*c))),
                _ => Err(mismatch(&left, &right)),
            }
        }
        BinaryOp::Range => {
            return match (&left, &right) {
                (Integer(start), Integer(end)) => {
                    let len = end.checked_sub(*start).ok_or_else(|| range_too_large(span))?;
                    if len > MAX_RANGE_LEN {
                        return Err(range_too_large(span));
                    }
                    Ok(Array((*start..*end).map(Integer).collect()))
                }
                _ => Err(mismatch(&left, &right)),
            }
        }
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Integer(a), Integer(b)) => Some(a.cmp(b)),
                (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
                (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
                (Float(a), Float(b)) => a.partial_cmp(b),
                (String(a), String(b)) => Some(a.cmp(b)),
                (Char(a), Char(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch(&left, &right)),
            };
            let holds = match ordering {
                Some(ordering) => match operator {
                    BinaryOp::Less => ordering == Ordering::Less,
                    BinaryOp::LessEqual => ordering != Ordering::Greater,
                    BinaryOp::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            };
            return Ok(Boolean(holds));
        }
        _ => {}
    }

    match (&left, &right) {
        (Integer(a), Integer(b)) => integer_arithmetic(operator, *a, *b, span),
        (Integer(_) | Float(_), Integer(_) | Float(_)) => {
            float_arithmetic(operator, as_float(&left), as_float(&right), span)
        }
        (String(a), String(b)) if operator == BinaryOp::Add => Ok(String(format!("{}{}", a, b))),
        (String(a), Char(b)) if operator == BinaryOp::Add => Ok(String(format!("{}{}", a, b))),
        (Char(a), String(b)) if operator == BinaryOp::Add => Ok(String(format!("{}{}", a, b))),
        (Char(a), Char(b)) if operator == BinaryOp::Add => Ok(String(format!("{}{}", a, b))),
        _ => Err(mismatch(&left, &right)),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn integer_arithmetic(operator: BinaryOp, a: i64, b: i64, span: Span) -> Result<Value, ScrapError> {
    let result = match operator {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => {
            if b == 0 {
                return Err(ScrapError::runtime(span, "Division by zero".to_string()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::Modulo => {
            if b == 0 {
                return Err(ScrapError::runtime(span, "Modulo by zero".to_string()));
            }
            a.checked_rem(b)
        }
        _ => None,
    };
    result.map(Value::Integer).ok_or_else(|| overflow(span))
}

fn float_arithmetic(operator: BinaryOp, a: f64, b: f64, span: Span) -> Result<Value, ScrapError> {
    let result = match operator {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
            let message = if operator == BinaryOp::Divide {
                "Division by zero"
            } else {
                "Modulo by zero"
            };
            return Err(ScrapError::runtime(span, message.to_string()));
        }
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        _ => {
            return Err(ScrapError::runtime(
                span,
                format!("Operator '{}' is not defined for numbers", operator.symbol()),
            ))
        }
    };
    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Result<Value, ScrapError> {
        let mut interpreter = Interpreter::new(Config::default());
        let mut parser = Parser::new(source)?;
        let expr = parser.parse_expression()?;
        let scope = interpreter.root().scope;
        interpreter.compute_value(&expr, scope)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("7 % 4").unwrap(), Value::Integer(3));
        assert_eq!(eval("1.5 + 1").unwrap(), Value::Float(2.5));
        assert_eq!(eval("\"ab\" + 'c'").unwrap(), Value::String("abc".to_string()));
    }

    #[test]
    fn arithmetic_faults() {
        assert_eq!(eval("1 / 0").unwrap_err().message, "Division by zero");
        assert_eq!(eval("1 % 0").unwrap_err().message, "Modulo by zero");
        assert_eq!(
            eval("9223372036854775807 + 1").unwrap_err().message,
            "Integer overflow"
        );
        assert_eq!(
            eval("\"a\" - 1").unwrap_err().message,
            "Operator '-' is not defined for 'string' and 'int'"
        );
    }

    #[test]
    fn logical_operators_yield_the_deciding_operand() {
        assert_eq!(eval("0 or 5").unwrap(), Value::Integer(5));
        assert_eq!(eval("0 and missing").unwrap(), Value::Integer(0));
        assert_eq!(eval("1 or missing").unwrap(), Value::Integer(1));
        assert!(eval("0 and! missing").is_err());
        assert!(eval("1 or! missing").is_err());
    }

    #[test]
    fn ranges_membership_and_indexing() {
        assert_eq!(
            eval("0..3").unwrap(),
            Value::Array(vec![Value::Integer(0), Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(eval("2 in [1, 2]").unwrap(), Value::Boolean(true));
        assert_eq!(eval("\"b\" in { b: 1 }").unwrap(), Value::Boolean(true));
        assert_eq!(eval("\"ell\" in \"hello\"").unwrap(), Value::Boolean(true));
        assert_eq!(eval("[1, 2, 3][1]").unwrap(), Value::Integer(2));
        assert_eq!(eval("\"hey\"[2]").unwrap(), Value::Char('y'));
        assert_eq!(eval("[1, 2].length").unwrap(), Value::Integer(2));
        assert_eq!(
            eval("[1][3]").unwrap_err().message,
            "Index 3 out of bounds for length 1"
        );
    }

    #[test]
    fn range_bounds() {
        assert_eq!(eval("5..2").unwrap(), Value::Array(Vec::new()));
        assert_eq!(
            eval("0..9223372036854775807").unwrap_err().message,
            "Range too large"
        );
        assert_eq!(
            eval("0 - 9223372036854775807..9223372036854775807").unwrap_err().message,
            "Range too large"
        );
    }

    #[test]
    fn globals_are_constants() {
        assert_eq!(eval("true and not false").unwrap(), Value::Boolean(true));
        assert_eq!(
            eval("true = 1").unwrap_err().message,
            "A constant can not change its value"
        );
    }

    #[test]
    fn missing_main_is_reported() {
        let mut interpreter = Interpreter::new(Config::default());
        let mut parser = Parser::new("const x = 1").unwrap();
        let error = interpreter.run(&mut parser).unwrap_err();
        assert_eq!(error.message, "Missing program entry point (main function)");
        assert_eq!(interpreter.state(), ExecutionState::Faulted);
    }
}
