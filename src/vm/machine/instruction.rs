use super::{Vm, trap};
use crate::error::{Error, Result};
use crate::runtime_io::RuntimeIo;
use crate::vm::bytecode::{CompiledImage, HostFn, Instruction as I};
use crate::vm::store::HostOps;

/// Outcome of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFlow {
    Continue,
    /// The outermost frame returned.
    Return(i32),
}

/// Wrapping integer power; negative exponents give 0.
pub fn int_pow(base: i32, exp: i32) -> i32 {
    if exp < 0 {
        return 0;
    }
    base.wrapping_pow(exp as u32)
}

impl Vm {
    /// Executes one instruction (dispatcher).
    pub(super) fn execute_instruction<H: HostOps, IO: RuntimeIo>(
        &mut self,
        ins: &I,
        image: &CompiledImage,
        host: &mut H,
        io: &mut IO,
    ) -> Result<ExecutionFlow> {
        match ins {
            I::Const(n) => self.handle_const(*n),
            I::Drop => self.handle_drop(),

            I::LocalGet(ix) => self.handle_local_get(*ix),
            I::LocalSet(ix) => self.handle_local_set(*ix),

            I::Add => self.handle_binary(|a, b| Ok(a.wrapping_add(b))),
            I::Sub => self.handle_binary(|a, b| Ok(a.wrapping_sub(b))),
            I::Mul => self.handle_binary(|a, b| Ok(a.wrapping_mul(b))),
            I::DivS => self.handle_binary(|a, b| {
                if b == 0 {
                    return Err(trap("integer division by zero"));
                }
                Ok(a.wrapping_div(b))
            }),
            I::RemS => self.handle_binary(|a, b| {
                if b == 0 {
                    return Err(trap("integer modulo by zero"));
                }
                Ok(a.wrapping_rem(b))
            }),

            I::Eq => self.handle_binary(|a, b| Ok((a == b) as i32)),
            I::Ne => self.handle_binary(|a, b| Ok((a != b) as i32)),
            I::LtS => self.handle_binary(|a, b| Ok((a < b) as i32)),
            I::LeS => self.handle_binary(|a, b| Ok((a <= b) as i32)),
            I::GtS => self.handle_binary(|a, b| Ok((a > b) as i32)),
            I::GeS => self.handle_binary(|a, b| Ok((a >= b) as i32)),
            I::Select => self.handle_select(),

            I::Br(off) => self.handle_br(*off),
            I::BrUnless(off) => self.handle_br_unless(*off),
            I::Call(label, argc) => self.handle_call(label, *argc, image),
            I::CallHost(f) => self.handle_call_host(*f, host, io),
            I::Return => self.handle_return(),
        }
    }

    fn handle_const(&mut self, n: i32) -> Result<ExecutionFlow> {
        self.push(n)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_drop(&mut self) -> Result<ExecutionFlow> {
        self.pop()?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_local_get(&mut self, ix: u16) -> Result<ExecutionFlow> {
        let v = self.get_local(ix)?;
        self.push(v)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_local_set(&mut self, ix: u16) -> Result<ExecutionFlow> {
        let v = self.pop()?;
        self.set_local(ix, v)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_binary(&mut self, op: impl FnOnce(i32, i32) -> Result<i32>) -> Result<ExecutionFlow> {
        let (b, a) = (self.pop()?, self.pop()?);
        self.push(op(a, b)?)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_select(&mut self) -> Result<ExecutionFlow> {
        let (c, b, a) = (self.pop()?, self.pop()?, self.pop()?);
        self.push(if c != 0 { a } else { b })?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_br(&mut self, off: i32) -> Result<ExecutionFlow> {
        self.add_ip_rel(off);
        Ok(ExecutionFlow::Continue)
    }

    fn handle_br_unless(&mut self, off: i32) -> Result<ExecutionFlow> {
        if self.pop()? == 0 {
            self.add_ip_rel(off);
        }
        Ok(ExecutionFlow::Continue)
    }

    fn handle_call(&mut self, label: &str, argc: u8, image: &CompiledImage) -> Result<ExecutionFlow> {
        let proc_ix = image
            .index_of(label)
            .ok_or_else(|| Error::internal(format!("call to unknown procedure '{}'", label)))?;
        self.enter_proc(image, proc_ix, argc as usize)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_return(&mut self) -> Result<ExecutionFlow> {
        let floor = self.frame()?.ret_stack_size;
        let ret = if self.stack.len() > floor {
            self.pop()?
        } else {
            0
        };
        let ret = self.leave_frame(ret);
        if self.frames.is_empty() {
            Ok(ExecutionFlow::Return(ret))
        } else {
            self.push(ret)?;
            Ok(ExecutionFlow::Continue)
        }
    }

    fn handle_call_host<H: HostOps, IO: RuntimeIo>(
        &mut self,
        f: HostFn,
        host: &mut H,
        io: &mut IO,
    ) -> Result<ExecutionFlow> {
        let mut args = [0i32; 3];
        for slot in args[..f.arity()].iter_mut().rev() {
            *slot = self.pop()?;
        }
        tracing::trace!(host_fn = %f, ?args, "host call");

        let result = match f {
            HostFn::Instantiate => Some(host.instantiate(args[0])?),
            HostFn::AttributeGet => Some(host.attribute_get(args[0], args[1])?),
            HostFn::AttributeSet => {
                host.attribute_set(args[0], args[1], args[2])?;
                None
            }
            HostFn::GlobalGet => Some(host.global_get(args[0])?),
            HostFn::GlobalSet => {
                host.global_set(args[0], args[1])?;
                None
            }
            HostFn::Abs => Some(args[0].wrapping_abs()),
            HostFn::Min => Some(args[0].min(args[1])),
            HostFn::Max => Some(args[0].max(args[1])),
            HostFn::Pow => Some(int_pow(args[0], args[1])),
            HostFn::PrintNum => {
                io.write_line(&args[0].to_string());
                Some(args[0])
            }
            HostFn::PrintBool => {
                io.write_line(if args[0] != 0 { "True" } else { "False" });
                Some(args[0])
            }
            HostFn::Print => {
                let text = if args[0] == 0 {
                    "None".to_string()
                } else {
                    format!("<{} object at {}>", host.class_of(args[0])?, args[0])
                };
                io.write_line(&text);
                Some(args[0])
            }
        };
        if let Some(v) = result {
            self.push(v)?;
        }
        Ok(ExecutionFlow::Continue)
    }
}
