use crate::error::{Error, ErrorKind, Result};
use crate::parser::ast::{BinaryOp, ClassDef, Expr, ExprKind, FuncDef, FuncIdentity, Stmt, StmtS, UnaryOp};
use crate::types::{OBJECT, Type, call_signature};

use super::GlobalTable;
use super::scope::ScopeChain;

fn type_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::TypeError, message)
}

/// Whether a value of type `src` may be stored where `dest` is declared.
pub fn is_assignable(dest: &Type, src: &Type) -> bool {
    match dest {
        Type::None => *src == Type::None,
        Type::Class(name) => {
            name == OBJECT
                || *src == Type::None
                || matches!(src, Type::Class(s) if s == name)
        }
        _ => dest == src,
    }
}

/// [`is_assignable`] for declared variables and attributes. A variable
/// declared `object` holds class instances or `None` only, since a stored
/// word carries no tag telling a number apart from a heap address.
pub fn is_storable(dest: &Type, src: &Type) -> bool {
    is_assignable(dest, src) && !(dest.is_object() && matches!(src, Type::Number | Type::Bool))
}

fn params_accept(declared: &[Type], supplied: &[Type]) -> bool {
    declared.len() == supplied.len()
        && declared.iter().zip(supplied).all(|(d, s)| {
            d == s || d.is_object() || (d.is_class() && *s == Type::None)
        })
}

/// Resolves a free-function call: the exact signature first, then the first
/// registered overload with the same name whose parameters accept `args`.
pub fn flookup<'g>(name: &str, args: &[Type], globals: &'g GlobalTable) -> Option<&'g FuncIdentity> {
    globals
        .function(&call_signature(name, args))
        .or_else(|| {
            globals
                .functions()
                .find(|f| f.name == name && params_accept(&f.params, args))
        })
}

/// Method counterpart of [`flookup`]. `args` includes the receiver.
pub fn mlookup<'c>(class: &'c ClassDef, name: &str, args: &[Type]) -> Option<&'c FuncDef> {
    class.method(&call_signature(name, args)).or_else(|| {
        class
            .methods
            .iter()
            .find(|m| m.identity.name == name && params_accept(&m.identity.params, args))
    })
}

/// Target of a call expression.
#[derive(Debug, Clone, Copy)]
pub enum Callee<'g> {
    Function(&'g FuncIdentity),
    Constructor(&'g ClassDef),
}

pub fn resolve_call<'g>(name: &str, args: &[Type], globals: &'g GlobalTable) -> Option<Callee<'g>> {
    if let Some(f) = flookup(name, args, globals) {
        return Some(Callee::Function(f));
    }
    globals.class(name).map(Callee::Constructor)
}

/// Annotations may only name built-in types or declared classes.
pub fn check_type_exists(ty: &Type, globals: &GlobalTable) -> Result<()> {
    match ty.class_name() {
        Some(name) if globals.class(name).is_none() => Err(Error::new(
            ErrorKind::NameError,
            format!("unknown type '{}'", name),
        )),
        _ => Ok(()),
    }
}

fn receiver_class<'g>(ty: &Type, globals: &'g GlobalTable) -> Result<&'g ClassDef> {
    match ty.class_name() {
        Some(name) => globals.class(name).ok_or_else(|| {
            Error::new(ErrorKind::NameError, format!("unknown type '{}'", name))
        }),
        None => Err(type_error(format!("'{}' value has no attributes or methods", ty))),
    }
}

/// Computes and records the static type of `expr` and of all its
/// subexpressions.
pub fn check_expr(expr: &Expr, scope: &ScopeChain, globals: &GlobalTable) -> Result<Type> {
    let ty = infer(expr, scope, globals).map_err(|e| e.or_span(&expr.span))?;
    if !expr.annotate(ty.clone()) {
        return Err(Error::at(
            ErrorKind::InternalError,
            "expression checked twice with different types",
            expr.span.clone(),
        ));
    }
    Ok(ty)
}

fn check_args(args: &[Expr], scope: &ScopeChain, globals: &GlobalTable) -> Result<Vec<Type>> {
    args.iter()
        .map(|a| check_expr(a, scope, globals))
        .collect()
}

fn infer(expr: &Expr, scope: &ScopeChain, globals: &GlobalTable) -> Result<Type> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(lit.ty()),
        ExprKind::Identifier(name) => scope
            .lookup(name)
            .or_else(|| globals.global(name))
            .cloned()
            .ok_or_else(|| {
                Error::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
            }),
        ExprKind::Nested(inner) => check_expr(inner, scope, globals),
        ExprKind::Unary { op, operand } => {
            let ty = check_expr(operand, scope, globals)?;
            let (expected, symbol) = match op {
                UnaryOp::Negate => (Type::Number, "-"),
                UnaryOp::Not => (Type::Bool, "not"),
            };
            if ty != expected {
                return Err(type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    symbol, ty
                )));
            }
            Ok(expected)
        }
        ExprKind::Binary { op, left, right } => {
            let l = check_expr(left, scope, globals)?;
            let r = check_expr(right, scope, globals)?;
            match op {
                BinaryOp::Is => {
                    let primitive = |t: &Type| matches!(t, Type::Number | Type::Bool);
                    if primitive(&l) || primitive(&r) {
                        return Err(type_error(format!(
                            "'is' requires object or None operands, got '{}' and '{}'",
                            l, r
                        )));
                    }
                    Ok(Type::Bool)
                }
                BinaryOp::Equal | BinaryOp::NotEqual => {
                    if l != r {
                        return Err(type_error(format!(
                            "cannot compare '{}' and '{}' with {}",
                            l,
                            r,
                            op.symbol()
                        )));
                    }
                    Ok(Type::Bool)
                }
                _ => {
                    if l != Type::Number || r != Type::Number {
                        return Err(type_error(format!(
                            "unsupported operand types for {}: '{}' and '{}'",
                            op.symbol(),
                            l,
                            r
                        )));
                    }
                    if op.is_relational() {
                        Ok(Type::Bool)
                    } else {
                        Ok(Type::Number)
                    }
                }
            }
        }
        ExprKind::Call { name, args } => {
            let arg_types = check_args(args, scope, globals)?;
            match resolve_call(name, &arg_types, globals) {
                Some(Callee::Function(f)) => {
                    tracing::trace!(call = %call_signature(name, &arg_types), resolved = %f.signature());
                    Ok(f.ret.clone())
                }
                Some(Callee::Constructor(class)) if arg_types.is_empty() => {
                    Ok(Type::class(&class.name))
                }
                Some(Callee::Constructor(class)) => Err(Error::new(
                    ErrorKind::CallError,
                    format!("constructor of class {} takes no arguments", class.name),
                )),
                None => Err(Error::new(
                    ErrorKind::CallError,
                    format!(
                        "no function matches call {}",
                        call_signature(name, &arg_types)
                    ),
                )),
            }
        }
        ExprKind::Attribute { object, attr } => {
            let ty = check_expr(object, scope, globals)?;
            let class = receiver_class(&ty, globals)?;
            class
                .attribute(attr)
                .map(|(_, var)| var.decl.ty.clone())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::NameError,
                        format!("class {} has no attribute '{}'", class.name, attr),
                    )
                })
        }
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => {
            let ty = check_expr(receiver, scope, globals)?;
            let class = receiver_class(&ty, globals)?;
            let mut arg_types = Vec::with_capacity(args.len() + 1);
            arg_types.push(ty);
            arg_types.extend(check_args(args, scope, globals)?);

            if !class.methods.iter().any(|m| m.identity.name == *method) {
                return Err(Error::new(
                    ErrorKind::NameError,
                    format!("class {} has no method '{}'", class.name, method),
                ));
            }
            mlookup(class, method, &arg_types)
                .map(|m| m.identity.ret.clone())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::CallError,
                        format!(
                            "no method of class {} matches call {}",
                            class.name,
                            call_signature(method, &arg_types)
                        ),
                    )
                })
        }
    }
}

fn check_condition(cond: &Expr, scope: &ScopeChain, globals: &GlobalTable) -> Result<()> {
    let ty = check_expr(cond, scope, globals)?;
    if ty != Type::Bool {
        return Err(type_error(format!("condition must be 'bool', got '{}'", ty)).or_span(&cond.span));
    }
    Ok(())
}

fn check_block(
    stmts: &[StmtS],
    scope: &ScopeChain,
    globals: &GlobalTable,
    ret: Option<&Type>,
) -> Result<()> {
    for stmt in stmts {
        check_statement(stmt, scope, globals, ret)?;
    }
    Ok(())
}

/// Checks one executable statement. `ret` is the enclosing function's return
/// type, `None` at top level. Yields the expression's type for expression
/// statements and `None` otherwise.
pub fn check_statement(
    stmt: &StmtS,
    scope: &ScopeChain,
    globals: &GlobalTable,
    ret: Option<&Type>,
) -> Result<Type> {
    let (stmt, span) = stmt;
    let result = match stmt {
        Stmt::VarDecl { name, .. } => Err(type_error(format!(
            "declaration of '{}' must appear at the start of a function or at module level",
            name
        ))),
        Stmt::FuncDef(def) => Err(type_error(format!(
            "function {} must be defined at module level",
            def.identity.name
        ))),
        Stmt::ClassDef(def) => Err(type_error(format!(
            "class {} must be defined at module level",
            def.name
        ))),
        Stmt::Pass => Ok(Type::None),
        Stmt::Expr(e) => check_expr(e, scope, globals),
        Stmt::Assign { name, value } => {
            let target = scope
                .lookup(name)
                .or_else(|| globals.global(name))
                .cloned()
                .ok_or_else(|| {
                    Error::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
                })?;
            let ty = check_expr(value, scope, globals)?;
            if !is_storable(&target, &ty) {
                return Err(type_error(format!(
                    "cannot assign '{}' to '{}' of type '{}'",
                    ty, name, target
                ))
                .or_span(&value.span));
            }
            Ok(Type::None)
        }
        Stmt::AttrAssign {
            object,
            attr,
            value,
        } => {
            let obj = check_expr(object, scope, globals)?;
            let class = receiver_class(&obj, globals).map_err(|e| e.or_span(&object.span))?;
            let (_, var) = class.attribute(attr).ok_or_else(|| {
                Error::new(
                    ErrorKind::NameError,
                    format!("class {} has no attribute '{}'", class.name, attr),
                )
            })?;
            let ty = check_expr(value, scope, globals)?;
            if !is_storable(&var.decl.ty, &ty) {
                return Err(type_error(format!(
                    "cannot assign '{}' to attribute '{}' of type '{}'",
                    ty, attr, var.decl.ty
                ))
                .or_span(&value.span));
            }
            Ok(Type::None)
        }
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => {
            check_condition(cond, scope, globals)?;
            check_block(then_block, scope, globals, ret)?;
            check_block(else_block, scope, globals, ret)?;
            Ok(Type::None)
        }
        Stmt::While { cond, body } => {
            check_condition(cond, scope, globals)?;
            check_block(body, scope, globals, ret)?;
            Ok(Type::None)
        }
        Stmt::Return(value) => {
            let Some(expected) = ret else {
                return Err(type_error("'return' outside function").or_span(span));
            };
            let ty = check_expr(value, scope, globals)?;
            if !is_assignable(expected, &ty) {
                return Err(type_error(format!(
                    "expected return value of type '{}', got '{}'",
                    expected, ty
                ))
                .or_span(&value.span));
            }
            Ok(ty)
        }
    };
    result.map_err(|e| e.or_span(span))
}

/// Whether every path through `body` ends in a return of a type assignable
/// to `expected`. Only the final statement is inspected.
pub fn check_return(body: &[StmtS], expected: &Type) -> bool {
    match body.last().map(|(stmt, _)| stmt) {
        Some(Stmt::Return(value)) => value.ty().is_some_and(|ty| is_assignable(expected, ty)),
        Some(Stmt::If {
            then_block,
            else_block,
            ..
        }) => check_return(then_block, expected) && check_return(else_block, expected),
        _ => false,
    }
}

fn check_literal_init(
    name: &str,
    decl: &crate::parser::ast::VarDeclr,
    scope: &ScopeChain,
    globals: &GlobalTable,
) -> Result<()> {
    check_type_exists(&decl.ty, globals).map_err(|e| e.or_span(&decl.value.span))?;
    if decl.value.as_literal().is_none() {
        return Err(Error::at(
            ErrorKind::TypeError,
            format!("'{}' must be initialized with a literal", name),
            decl.value.span.clone(),
        ));
    }
    let ty = check_expr(&decl.value, scope, globals)?;
    if !is_storable(&decl.ty, &ty) {
        return Err(Error::at(
            ErrorKind::TypeError,
            format!(
                "cannot initialize '{}' of type '{}' with a value of type '{}'",
                name, decl.ty, ty
            ),
            decl.value.span.clone(),
        ));
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip_all, fields(sig = %def.signature()))]
pub fn check_function_def(def: &FuncDef, globals: &GlobalTable) -> Result<()> {
    let mut scope = ScopeChain::new();
    scope.push();

    for (name, ty) in &def.params {
        check_type_exists(ty, globals).map_err(|e| e.or_span(&def.span))?;
        if !scope.define(name, ty.clone()) {
            return Err(Error::at(
                ErrorKind::DuplicateDefinitionError,
                format!("duplicate parameter '{}' in {}", name, def.identity.name),
                def.span.clone(),
            ));
        }
    }
    check_type_exists(&def.identity.ret, globals).map_err(|e| e.or_span(&def.span))?;

    for (name, decl) in &def.locals {
        check_literal_init(name, decl, &scope, globals)?;
        if !scope.define(name, decl.ty.clone()) {
            return Err(Error::at(
                ErrorKind::DuplicateDefinitionError,
                format!("'{}' is already declared in {}", name, def.identity.name),
                decl.value.span.clone(),
            ));
        }
    }

    let ret = &def.identity.ret;
    check_block(&def.body, &scope, globals, Some(ret))?;

    if *ret != Type::None && !check_return(&def.body, ret) {
        return Err(Error::at(
            ErrorKind::TypeError,
            format!(
                "{} must end by returning a value of type '{}' on every path",
                def.signature(),
                ret
            ),
            def.span.clone(),
        ));
    }
    Ok(())
}

/// Checks a method of `class`: its first parameter must be `self` of that
/// class.
pub fn check_method(class: &ClassDef, method: &FuncDef, globals: &GlobalTable) -> Result<()> {
    let owner = Type::class(&class.name);
    if method.self_param() != Some(&owner) {
        return Err(Error::at(
            ErrorKind::TypeError,
            format!(
                "method {} of class {} must take 'self: {}' first",
                method.identity.name, class.name, class.name
            ),
            method.span.clone(),
        ));
    }
    check_function_def(method, globals)
}

#[tracing::instrument(level = "debug", skip_all, fields(class = %class.name))]
pub fn check_class_def(class: &ClassDef, globals: &GlobalTable) -> Result<()> {
    let top = ScopeChain::new();
    for var in &class.class_vars {
        check_literal_init(&var.name, &var.decl, &top, globals)?;
    }
    for method in &class.methods {
        check_method(class, method, globals)?;
    }
    Ok(())
}
