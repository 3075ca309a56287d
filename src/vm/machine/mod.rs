// Stack machine executing a `CompiledImage` over 32-bit words.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime_io::RuntimeIo;
use crate::vm::bytecode::CompiledImage;
use crate::vm::store::HostOps;
use serde::{Deserialize, Serialize};

mod instruction;


use instruction::ExecutionFlow;

/// Stack and call-depth bounds; exceeding either traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmLimits {
    pub max_stack: usize,
    pub max_frames: usize,
}

impl Default for VmLimits {
    fn default() -> Self {
        Self {
            max_stack: 1024,
            max_frames: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub ip: usize,
    pub proc_ix: usize,
    pub ret_stack_size: usize,
    pub locals: Vec<i32>,
}

pub struct Vm {
    pub stack: Vec<i32>,
    pub frames: Vec<Frame>,
    pub max_stack: usize,
    pub max_frames: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn trap(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::RuntimeError, message)
}

fn jump_rel(ip: &mut usize, off: i32) {
    if off >= 0 {
        *ip = ip.wrapping_add(off as usize);
    } else {
        *ip = ip.wrapping_sub(off.unsigned_abs() as usize);
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_limits(VmLimits::default())
    }

    pub fn with_limits(limits: VmLimits) -> Self {
        Self {
            stack: Vec::with_capacity(128),
            frames: Vec::with_capacity(32),
            max_stack: limits.max_stack,
            max_frames: limits.max_frames,
        }
    }

    /// Runs the image's entry procedure and returns its result word.
    #[tracing::instrument(level = "debug", skip_all, fields(entry = image.entry.as_deref().unwrap_or("")))]
    pub fn run<H: HostOps, IO: RuntimeIo>(
        &mut self,
        image: &CompiledImage,
        host: &mut H,
        io: &mut IO,
    ) -> Result<i32> {
        let entry = image
            .entry
            .as_deref()
            .ok_or_else(|| Error::internal("image has no entry procedure"))?;
        self.call(image, entry, &[], host, io)
    }

    /// Invokes the procedure `label` with `args` and runs it to completion.
    pub fn call<H: HostOps, IO: RuntimeIo>(
        &mut self,
        image: &CompiledImage,
        label: &str,
        args: &[i32],
        host: &mut H,
        io: &mut IO,
    ) -> Result<i32> {
        self.stack.clear();
        self.frames.clear();
        let proc_ix = image
            .index_of(label)
            .ok_or_else(|| Error::internal(format!("unknown procedure '{}'", label)))?;
        for &arg in args {
            self.push(arg)?;
        }
        self.enter_proc(image, proc_ix, args.len())?;
        let result = self.execute(image, host, io)?;
        tracing::debug!(result, "execution finished");
        Ok(result)
    }

    fn execute<H: HostOps, IO: RuntimeIo>(
        &mut self,
        image: &CompiledImage,
        host: &mut H,
        io: &mut IO,
    ) -> Result<i32> {
        loop {
            let (proc_ix, ip) = match self.frames.last() {
                Some(f) => (f.proc_ix, f.ip),
                None => return Ok(0),
            };
            let code = &image.procedures[proc_ix].code;
            if ip >= code.len() {
                // falling off the end returns None
                let ret = self.leave_frame(0);
                if self.frames.is_empty() {
                    return Ok(ret);
                }
                self.push(ret)?;
                continue;
            }
            if let Some(f) = self.frames.last_mut() {
                f.ip = ip + 1;
            }
            match self.execute_instruction(&code[ip], image, host, io)? {
                ExecutionFlow::Continue => {}
                ExecutionFlow::Return(ret) => return Ok(ret),
            }
        }
    }

    // ========== stack ==========

    fn push(&mut self, v: i32) -> Result<()> {
        if self.stack.len() >= self.max_stack {
            return Err(trap(format!(
                "stack overflow (limit {} words)",
                self.max_stack
            )));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<i32> {
        let floor = self.frames.last().map_or(0, |f| f.ret_stack_size);
        if self.stack.len() <= floor {
            return Err(Error::internal("stack underflow"));
        }
        self.stack
            .pop()
            .ok_or_else(|| Error::internal("stack underflow"))
    }

    // ========== frames ==========

    fn enter_proc(&mut self, image: &CompiledImage, proc_ix: usize, argc: usize) -> Result<()> {
        if self.frames.len() >= self.max_frames {
            return Err(trap(format!(
                "call depth exceeded (limit {} frames)",
                self.max_frames
            )));
        }
        let proc = &image.procedures[proc_ix];
        if proc.params as usize != argc {
            return Err(Error::internal(format!(
                "{} takes {} arguments, called with {}",
                proc.label, proc.params, argc
            )));
        }
        let ret_stack_size = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| Error::internal("stack underflow"))?;
        let mut locals = vec![0; (proc.locals as usize).max(argc)];
        locals[..argc].copy_from_slice(&self.stack[ret_stack_size..]);
        self.stack.truncate(ret_stack_size);
        self.frames.push(Frame {
            ip: 0,
            proc_ix,
            ret_stack_size,
            locals,
        });
        Ok(())
    }

    /// Pops the current frame, discarding its operand stack.
    fn leave_frame(&mut self, ret: i32) -> i32 {
        if let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.ret_stack_size);
        }
        ret
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::internal("no active frame"))
    }

    fn get_local(&self, ix: u16) -> Result<i32> {
        self.frame()?
            .locals
            .get(ix as usize)
            .copied()
            .ok_or_else(|| Error::internal(format!("invalid local index {}", ix)))
    }

    fn set_local(&mut self, ix: u16, v: i32) -> Result<()> {
        let f = self
            .frames
            .last_mut()
            .ok_or_else(|| Error::internal("no active frame"))?;
        let slot = f
            .locals
            .get_mut(ix as usize)
            .ok_or_else(|| Error::internal(format!("invalid local index {}", ix)))?;
        *slot = v;
        Ok(())
    }

    fn add_ip_rel(&mut self, off: i32) {
        if let Some(f) = self.frames.last_mut() {
            jump_rel(&mut f.ip, off);
        }
    }
}
