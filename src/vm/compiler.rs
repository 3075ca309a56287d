use super::bytecode::{CompiledImage, HostFn, Instruction as I, ProcFlags, Procedure};
use super::store::{ClassLayout, MemoryStore};
use super::value::Value;
use crate::builtins;
use crate::error::{Error, Result};
use crate::parser::ast::{BinaryOp, ClassDef, Expr, ExprKind, FuncDef, Stmt, StmtS, UnaryOp};
use crate::semantic::{Callee, GlobalTable, Program, mlookup, resolve_call};
use crate::types::Type;
use std::collections::HashMap;

/// Label of the per-chunk entry procedure. `$` keeps it out of the
/// identifier namespace.
pub const ENTRY_LABEL: &str = "$main";

type Locals = HashMap<String, u16>;

/// Lowers one organized chunk into procedures of a `CompiledImage`,
/// declaring the chunk's classes and globals in the store along the way.
pub struct Compiler<'a> {
    globals: &'a GlobalTable,
    store: &'a mut MemoryStore,
    image: &'a mut CompiledImage,
}

impl<'a> Compiler<'a> {
    pub fn new(
        globals: &'a GlobalTable,
        store: &'a mut MemoryStore,
        image: &'a mut CompiledImage,
    ) -> Self {
        Self {
            globals,
            store,
            image,
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(mut self, program: &Program) -> Result<()> {
        self.declare_classes(program)?;
        self.declare_globals(program)?;

        // labels first so new procedures can call each other
        for def in &program.file_functions {
            let label = self.store.claim_label(&def.identity.name);
            self.store.bind_function_label(&def.signature(), label);
        }
        for (class_name, sig) in &program.file_methods {
            let method = self.method(class_name, sig)?;
            let label = self
                .store
                .claim_label(&format!("{}_{}", class_name, method.identity.name));
            self.store.bind_method_label(class_name, sig, label);
        }

        for def in &program.file_functions {
            let label = self.function_label(&def.signature())?;
            let proc = self.compile_function(def, label, ProcFlags::EXPORTED)?;
            self.image.upsert(proc);
        }
        for (class_name, sig) in &program.file_methods {
            let method = self.method(class_name, sig)?;
            let label = self.method_label(class_name, sig)?;
            let proc = self.compile_function(method, label, ProcFlags::EXPORTED | ProcFlags::METHOD)?;
            self.image.upsert(proc);
        }

        let entry = self.compile_entry(program)?;
        self.image.upsert(entry);
        self.image.entry = Some(ENTRY_LABEL.to_string());
        Ok(())
    }

    fn declare_classes(&mut self, program: &Program) -> Result<()> {
        for name in &program.file_classes {
            let class = self
                .globals
                .class(name)
                .ok_or_else(|| Error::internal(format!("class {} is not registered", name)))?;
            let defaults = class
                .class_vars
                .iter()
                .map(|var| {
                    var.decl.value.as_literal().map(Value::from_literal).ok_or_else(|| {
                        Error::internal(format!("attribute {}.{} has no literal default", name, var.name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let code = self.store.declare_class(ClassLayout {
                name: name.clone(),
                defaults,
            });
            if code != class.type_code {
                return Err(Error::internal(format!(
                    "class {} laid out at {} but has type code {}",
                    name, code, class.type_code
                )));
            }
        }
        Ok(())
    }

    fn declare_globals(&mut self, program: &Program) -> Result<()> {
        for var in &program.file_vars {
            let slot = self.store.declare_global(&var.name, &var.decl.ty);
            if self.globals.global_slot(&var.name) != Some(slot) {
                return Err(Error::internal(format!(
                    "global '{}' stored at slot {} out of declaration order",
                    var.name, slot
                )));
            }
        }
        Ok(())
    }

    fn method(&self, class_name: &str, sig: &str) -> Result<&'a FuncDef> {
        let globals: &'a GlobalTable = self.globals;
        globals
            .class(class_name)
            .and_then(|c| c.method(sig))
            .ok_or_else(|| Error::internal(format!("method {} of {} is not registered", sig, class_name)))
    }

    fn function_label(&self, sig: &str) -> Result<String> {
        self.store
            .function_label(sig)
            .map(str::to_string)
            .ok_or_else(|| Error::internal(format!("no label for function {}", sig)))
    }

    fn method_label(&self, class_name: &str, sig: &str) -> Result<String> {
        self.store
            .method_label(class_name, sig)
            .map(str::to_string)
            .ok_or_else(|| Error::internal(format!("no label for method {}.{}", class_name, sig)))
    }

    fn compile_function(&self, def: &FuncDef, label: String, flags: ProcFlags) -> Result<Procedure> {
        let mut locals = Locals::new();
        for (name, _) in &def.params {
            let ix = slot_index(locals.len())?;
            locals.insert(name.clone(), ix);
        }
        let mut code = Vec::new();
        for (name, decl) in &def.locals {
            let ix = slot_index(locals.len())?;
            locals.insert(name.clone(), ix);
            let lit = decl
                .value
                .as_literal()
                .ok_or_else(|| Error::internal(format!("local '{}' has no literal initializer", name)))?;
            code.push(I::Const(lit.word()));
            code.push(I::LocalSet(ix));
        }
        self.emit_block(&def.body, &mut code, &locals, false)?;
        code.push(I::Const(0));
        code.push(I::Return);

        tracing::debug!(%label, instructions = code.len(), "emitted procedure");
        Ok(Procedure {
            label,
            params: slot_index(def.params.len())?,
            locals: slot_index(locals.len())?,
            flags,
            code,
        })
    }

    fn compile_entry(&self, program: &Program) -> Result<Procedure> {
        let locals = Locals::new();
        let mut code = Vec::new();

        for var in &program.file_vars {
            let slot = self.global_slot(&var.name)?;
            code.push(I::Const(slot));
            self.emit_expr(&var.decl.value, &mut code, &locals)?;
            code.push(I::CallHost(HostFn::GlobalSet));
        }
        self.emit_block(&program.top_level, &mut code, &locals, true)?;
        code.push(I::Const(0));
        code.push(I::Return);

        tracing::debug!(instructions = code.len(), "emitted entry");
        Ok(Procedure {
            label: ENTRY_LABEL.to_string(),
            params: 0,
            locals: 0,
            flags: ProcFlags::ENTRY | ProcFlags::EXPORTED,
            code,
        })
    }

    fn global_slot(&self, name: &str) -> Result<i32> {
        self.globals
            .global_slot(name)
            .map(|s| s as i32)
            .ok_or_else(|| Error::internal(format!("'{}' is neither local nor global", name)))
    }

    /// `tail` marks the block whose last statement yields the procedure's
    /// result.
    fn emit_block(&self, block: &[StmtS], code: &mut Vec<I>, locals: &Locals, tail: bool) -> Result<()> {
        let last = block.len().saturating_sub(1);
        for (i, stmt) in block.iter().enumerate() {
            self.emit_stmt(stmt, code, locals, tail && i == last)?;
        }
        Ok(())
    }

    fn emit_stmt(&self, stmt: &StmtS, code: &mut Vec<I>, locals: &Locals, tail: bool) -> Result<()> {
        match &stmt.0 {
            Stmt::Pass => {}
            Stmt::Expr(e) => {
                self.emit_expr(e, code, locals)?;
                code.push(if tail { I::Return } else { I::Drop });
            }
            Stmt::Return(e) => {
                self.emit_expr(e, code, locals)?;
                code.push(I::Return);
            }
            Stmt::Assign { name, value } => match locals.get(name) {
                Some(&ix) => {
                    self.emit_expr(value, code, locals)?;
                    code.push(I::LocalSet(ix));
                }
                None => {
                    code.push(I::Const(self.global_slot(name)?));
                    self.emit_expr(value, code, locals)?;
                    code.push(I::CallHost(HostFn::GlobalSet));
                }
            },
            Stmt::AttrAssign {
                object,
                attr,
                value,
            } => {
                let index = self.attribute_index(object, attr)?;
                self.emit_expr(object, code, locals)?;
                code.push(I::Const(index));
                self.emit_expr(value, code, locals)?;
                code.push(I::CallHost(HostFn::AttributeSet));
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.emit_expr(cond, code, locals)?;
                let j_else = code.len();
                code.push(I::BrUnless(0));
                self.emit_block(then_block, code, locals, tail)?;
                let j_end = code.len();
                code.push(I::Br(0));
                let else_start = code.len() as i32;
                patch_rel(&mut code[j_else], else_start - (j_else as i32 + 1));
                self.emit_block(else_block, code, locals, tail)?;
                let end = code.len() as i32;
                patch_rel(&mut code[j_end], end - (j_end as i32 + 1));
            }
            Stmt::While { cond, body } => {
                let loop_start = code.len() as i32;
                self.emit_expr(cond, code, locals)?;
                let j_exit = code.len();
                code.push(I::BrUnless(0));
                self.emit_block(body, code, locals, false)?;
                let cur = code.len() as i32;
                code.push(I::Br(loop_start - (cur + 1)));
                let end = code.len() as i32;
                patch_rel(&mut code[j_exit], end - (j_exit as i32 + 1));
            }
            Stmt::VarDecl { name, .. } => {
                return Err(Error::internal(format!("declaration of '{}' reached code generation", name))
                    .or_span(&stmt.1));
            }
            Stmt::FuncDef(def) => {
                return Err(Error::internal(format!(
                    "definition of {} reached code generation",
                    def.signature()
                ))
                .or_span(&stmt.1));
            }
            Stmt::ClassDef(def) => {
                return Err(Error::internal(format!("class {} reached code generation", def.name))
                    .or_span(&stmt.1));
            }
        }
        Ok(())
    }

    fn emit_expr(&self, expr: &Expr, code: &mut Vec<I>, locals: &Locals) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(lit) => code.push(I::Const(lit.word())),
            ExprKind::Identifier(name) => match locals.get(name) {
                Some(&ix) => code.push(I::LocalGet(ix)),
                None => {
                    code.push(I::Const(self.global_slot(name)?));
                    code.push(I::CallHost(HostFn::GlobalGet));
                }
            },
            ExprKind::Nested(inner) => self.emit_expr(inner, code, locals)?,
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    self.emit_expr(operand, code, locals)?;
                    code.push(I::Const(-1));
                    code.push(I::Mul);
                }
                UnaryOp::Not => {
                    code.push(I::Const(0));
                    code.push(I::Const(1));
                    self.emit_expr(operand, code, locals)?;
                    code.push(I::Select);
                }
            },
            ExprKind::Binary { op, left, right } => {
                self.emit_expr(left, code, locals)?;
                self.emit_expr(right, code, locals)?;
                code.push(binary_instruction(*op));
            }
            ExprKind::Call { name, args } => {
                let arg_types = annotated(args)?;
                match resolve_call(name, &arg_types, self.globals) {
                    Some(Callee::Function(f)) => {
                        let sig = f.signature();
                        self.emit_args(args, code, locals)?;
                        match builtins::host_fn(&sig) {
                            Some(host) => code.push(I::CallHost(host)),
                            None => code.push(I::Call(self.function_label(&sig)?, argc(args.len())?)),
                        }
                    }
                    Some(Callee::Constructor(class)) => {
                        code.push(I::Const(class.type_code as i32));
                        code.push(I::CallHost(HostFn::Instantiate));
                    }
                    None => {
                        return Err(Error::internal(format!("unresolved call to {}", name))
                            .or_span(&expr.span));
                    }
                }
            }
            ExprKind::Attribute { object, attr } => {
                let index = self.attribute_index(object, attr)?;
                self.emit_expr(object, code, locals)?;
                code.push(I::Const(index));
                code.push(I::CallHost(HostFn::AttributeGet));
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let class = self.static_class(receiver)?;
                let mut arg_types = vec![expr_type(receiver)?];
                arg_types.extend(annotated(args)?);
                let def = mlookup(class, method, &arg_types).ok_or_else(|| {
                    Error::internal(format!("unresolved method {}.{}", class.name, method))
                        .or_span(&expr.span)
                })?;
                let label = self.method_label(&class.name, &def.signature())?;
                self.emit_expr(receiver, code, locals)?;
                self.emit_args(args, code, locals)?;
                code.push(I::Call(label, argc(args.len() + 1)?));
            }
        }
        Ok(())
    }

    fn emit_args(&self, args: &[Expr], code: &mut Vec<I>, locals: &Locals) -> Result<()> {
        for arg in args {
            self.emit_expr(arg, code, locals)?;
        }
        Ok(())
    }

    fn static_class(&self, object: &Expr) -> Result<&ClassDef> {
        let ty = expr_type(object)?;
        ty.class_name()
            .and_then(|name| self.globals.class(name))
            .ok_or_else(|| {
                Error::internal(format!("'{}' is not a class with members", ty)).or_span(&object.span)
            })
    }

    fn attribute_index(&self, object: &Expr, attr: &str) -> Result<i32> {
        let class = self.static_class(object)?;
        class
            .attribute(attr)
            .map(|(ix, _)| ix as i32)
            .ok_or_else(|| Error::internal(format!("class {} has no attribute {}", class.name, attr)))
    }
}

fn binary_instruction(op: BinaryOp) -> I {
    match op {
        BinaryOp::Add => I::Add,
        BinaryOp::Subtract => I::Sub,
        BinaryOp::Multiply => I::Mul,
        BinaryOp::FloorDivide => I::DivS,
        BinaryOp::Modulo => I::RemS,
        BinaryOp::Equal | BinaryOp::Is => I::Eq,
        BinaryOp::NotEqual => I::Ne,
        BinaryOp::Less => I::LtS,
        BinaryOp::LessEqual => I::LeS,
        BinaryOp::Greater => I::GtS,
        BinaryOp::GreaterEqual => I::GeS,
    }
}

fn expr_type(expr: &Expr) -> Result<Type> {
    expr.ty()
        .cloned()
        .ok_or_else(|| Error::internal("expression reached code generation unchecked").or_span(&expr.span))
}

fn annotated(args: &[Expr]) -> Result<Vec<Type>> {
    args.iter().map(expr_type).collect()
}

fn slot_index(n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| Error::internal(format!("{} local slots exceed the frame limit", n)))
}

fn argc(n: usize) -> Result<u8> {
    u8::try_from(n).map_err(|_| Error::internal(format!("{} arguments exceed the call limit", n)))
}

fn patch_rel(ins: &mut I, rel: i32) {
    match ins {
        I::Br(r) | I::BrUnless(r) => *r = rel,
        _ => unreachable!("not a branch"),
    }
}
