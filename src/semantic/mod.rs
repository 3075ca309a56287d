pub mod scope;
pub mod typecheck;

use std::collections::HashMap;

use crate::builtins;
use crate::error::{Error, ErrorKind, Result};
use crate::parser::ast::{ClassDef, FuncDef, FuncIdentity, Stmt, StmtS, VarDeclr};
use crate::types::{Span, Type};
use scope::ScopeChain;

pub use typecheck::{
    Callee, check_class_def, check_expr, check_function_def, check_return, check_statement,
    flookup, is_assignable, is_storable, mlookup, resolve_call,
};

/// Names that can never be declared as classes.
const RESERVED_CLASS_NAMES: &[&str] = &["int", "bool", "object", "number", "none"];

/// Everything known to the program so far: function identities, classes and
/// global variable types, each in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    functions: Vec<FuncIdentity>,
    function_index: HashMap<String, usize>,
    classes: Vec<ClassDef>,
    class_index: HashMap<String, usize>,
    globals: Vec<(String, Type)>,
    global_index: HashMap<String, usize>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the host builtins pre-registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for b in builtins::all() {
            table.insert_function(b.identity());
        }
        table
    }

    pub fn function(&self, signature: &str) -> Option<&FuncIdentity> {
        self.function_index
            .get(signature)
            .map(|&ix| &self.functions[ix])
    }

    /// Function identities in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &FuncIdentity> {
        self.functions.iter()
    }

    /// Registers `identity`; returns false if its signature is taken.
    pub fn insert_function(&mut self, identity: FuncIdentity) -> bool {
        let sig = identity.signature();
        if self.function_index.contains_key(&sig) {
            return false;
        }
        self.function_index.insert(sig, self.functions.len());
        self.functions.push(identity);
        true
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.class_index.get(name).map(|&ix| &self.classes[ix])
    }

    fn class_mut(&mut self, name: &str) -> Option<&mut ClassDef> {
        self.class_index
            .get(name)
            .map(|&ix| &mut self.classes[ix])
    }

    /// Classes indexed by type code.
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    fn insert_class(&mut self, class: ClassDef) {
        self.class_index
            .insert(class.name.clone(), self.classes.len());
        self.classes.push(class);
    }

    pub fn global(&self, name: &str) -> Option<&Type> {
        self.global_index
            .get(name)
            .map(|&ix| &self.globals[ix].1)
    }

    /// Runtime slot of a global: its declaration index.
    pub fn global_slot(&self, name: &str) -> Option<usize> {
        self.global_index.get(name).copied()
    }

    pub fn globals(&self) -> &[(String, Type)] {
        &self.globals
    }

    fn insert_global(&mut self, name: String, ty: Type) {
        self.global_index.insert(name.clone(), self.globals.len());
        self.globals.push((name, ty));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVarDecl {
    pub name: String,
    pub decl: VarDeclr,
    pub span: Span,
}

/// One chunk after organization: new declarations split from the statements
/// that execute.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub file_vars: Vec<GlobalVarDecl>,
    pub file_functions: Vec<FuncDef>,
    /// Classes declared by this chunk, in type-code order.
    pub file_classes: Vec<String>,
    /// `(class, signature)` of every method attached by this chunk.
    pub file_methods: Vec<(String, String)>,
    pub top_level: Vec<StmtS>,
    /// Static type of the chunk's final statement.
    pub result_type: Type,
}

fn duplicate(message: String, span: &Span) -> Error {
    Error::at(ErrorKind::DuplicateDefinitionError, message, span.clone())
}

fn attach_method(
    table: &mut GlobalTable,
    program: &mut Program,
    class_name: &str,
    method: FuncDef,
) -> Result<()> {
    let sig = method.signature();
    let class = table
        .class_mut(class_name)
        .ok_or_else(|| Error::internal(format!("class '{}' vanished", class_name)))?;
    if class.method(&sig).is_some() {
        return Err(duplicate(
            format!("method {} is already defined on class {}", sig, class_name),
            &method.span,
        ));
    }
    tracing::debug!(class = class_name, %sig, "attached method");
    class.methods.push(method);
    program
        .file_methods
        .push((class_name.to_string(), sig));
    Ok(())
}

fn register_class(table: &mut GlobalTable, program: &mut Program, mut class: ClassDef) -> Result<()> {
    if RESERVED_CLASS_NAMES.contains(&class.name.as_str()) {
        return Err(duplicate(
            format!("'{}' is a built-in type", class.name),
            &class.span,
        ));
    }
    if table.class(&class.name).is_some() {
        return Err(duplicate(
            format!("class {} is already defined", class.name),
            &class.span,
        ));
    }
    for (i, var) in class.class_vars.iter().enumerate() {
        if class.class_vars[..i].iter().any(|v| v.name == var.name) {
            return Err(duplicate(
                format!("attribute '{}' is already declared in class {}", var.name, class.name),
                &var.span,
            ));
        }
    }
    class.type_code = table.classes().len();
    tracing::debug!(class = %class.name, type_code = class.type_code, "registered class");

    let methods = std::mem::take(&mut class.methods);
    let name = class.name.clone();
    program.file_classes.push(name.clone());
    table.insert_class(class);
    for method in methods {
        attach_method(table, program, &name, method)?;
    }
    Ok(())
}

/// Splits `stmts` into declarations and executable statements, registers the
/// declarations in `table`, then type checks the chunk.
///
/// On error `table` is left partially extended; callers stage the table and
/// drop it on failure.
#[tracing::instrument(level = "debug", skip_all, fields(stmts = stmts.len()))]
pub fn organize(stmts: Vec<StmtS>, table: &mut GlobalTable) -> Result<Program> {
    let mut program = Program::default();
    let mut class_defs = Vec::new();
    let mut func_defs = Vec::new();

    for (stmt, span) in stmts {
        match stmt {
            Stmt::ClassDef(def) => class_defs.push(def),
            Stmt::FuncDef(def) => func_defs.push(def),
            Stmt::VarDecl { name, decl } => program.file_vars.push(GlobalVarDecl { name, decl, span }),
            other => program.top_level.push((other, span)),
        }
    }

    // classes first so methods anywhere in the chunk can attach to them
    for class in class_defs {
        register_class(table, &mut program, class)?;
    }

    for def in func_defs {
        let owner = def
            .self_param()
            .and_then(|ty| ty.class_name())
            .filter(|name| table.class(name).is_some())
            .map(str::to_string);
        match owner {
            Some(class_name) => attach_method(table, &mut program, &class_name, def)?,
            None => {
                if !table.insert_function(def.identity.clone()) {
                    return Err(duplicate(
                        format!("function {} is already defined", def.signature()),
                        &def.span,
                    ));
                }
                tracing::debug!(sig = %def.signature(), "registered function");
                program.file_functions.push(def);
            }
        }
    }

    // each initializer sees the globals declared before it
    let top = ScopeChain::new();
    for var in &program.file_vars {
        if table.global(&var.name).is_some() {
            return Err(duplicate(
                format!("global variable '{}' is already declared", var.name),
                &var.span,
            ));
        }
        typecheck::check_type_exists(&var.decl.ty, table).map_err(|e| e.or_span(&var.span))?;
        let ty = check_expr(&var.decl.value, &top, table)?;
        if !is_storable(&var.decl.ty, &ty) {
            return Err(Error::at(
                ErrorKind::TypeError,
                format!(
                    "cannot initialize global '{}' of type {} with a value of type {}",
                    var.name, var.decl.ty, ty
                ),
                var.decl.value.span.clone(),
            ));
        }
        table.insert_global(var.name.clone(), var.decl.ty.clone());
    }

    for def in &program.file_functions {
        check_function_def(def, table)?;
    }

    for name in &program.file_classes {
        let class = table
            .class(name)
            .ok_or_else(|| Error::internal(format!("class '{}' vanished", name)))?;
        check_class_def(class, table)?;
    }

    // methods added to classes from earlier chunks
    for (class_name, sig) in &program.file_methods {
        if program.file_classes.contains(class_name) {
            continue;
        }
        let class = table
            .class(class_name)
            .ok_or_else(|| Error::internal(format!("class '{}' vanished", class_name)))?;
        let method = class
            .method(sig)
            .ok_or_else(|| Error::internal(format!("method {} vanished", sig)))?;
        typecheck::check_method(class, method, table)?;
    }

    let mut result_type = Type::None;
    for stmt in &program.top_level {
        result_type = check_statement(stmt, &top, table, None)?;
    }
    program.result_type = result_type;

    tracing::debug!(
        vars = program.file_vars.len(),
        functions = program.file_functions.len(),
        classes = program.file_classes.len(),
        methods = program.file_methods.len(),
        statements = program.top_level.len(),
        result = %program.result_type,
        "organized chunk"
    );
    Ok(program)
}
