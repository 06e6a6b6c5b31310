mod ops;

use std::error::Error;
use std::fmt;

use crate::constants;
use crate::ops::Instruction;
use crate::value::{CastError, Value};

/// A runtime condition that aborts execution.
#[derive(Clone, Debug, PartialEq)]
pub enum Fault {
    /// The opcode byte has no handler in the dispatch table.
    MissingHandler(u8),
    DivisionByZero,
    Cast(CastError),
    ArrayBounds { index: i32, len: usize },
    BadRegister(u16),
    BadLocal(u16),
    BadArg(u16),
    BadParam(u16),
    BadConstant(u16),
    BadJump(usize),
    BadBank(u16),
    /// A frame-relative access with no frame on the call stack.
    NoFrame,
    /// `EDIT` on a value whose refcount is above one.
    ExclusiveEdit { refcount: u32 },
}

impl From<CastError> for Fault {
    fn from(err: CastError) -> Fault {
        Fault::Cast(err)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::MissingHandler(byte) => write!(f, "no handler for opcode {:#04x}", byte),
            Fault::DivisionByZero => write!(f, "division by zero"),
            Fault::Cast(err) => write!(f, "{}", err),
            Fault::ArrayBounds { index, len } => write!(
                f,
                "array access out of bounds at index {} (length {})",
                index, len
            ),
            Fault::BadRegister(index) => write!(f, "invalid register %r{}", index),
            Fault::BadLocal(index) => write!(f, "invalid local %l{}", index),
            Fault::BadArg(index) => write!(f, "invalid argument %a{}", index),
            Fault::BadParam(index) => write!(f, "invalid parameter %p{}", index),
            Fault::BadConstant(index) => write!(f, "invalid constant pool index {}", index),
            Fault::BadJump(target) => write!(f, "jump target {} is outside the code", target),
            Fault::BadBank(code) => write!(f, "invalid register bank {}", code),
            Fault::NoFrame => write!(f, "no active call frame"),
            Fault::ExclusiveEdit { refcount } => write!(
                f,
                "exclusive edit of a shared value (refcount {})",
                refcount
            ),
        }
    }
}

/// A [`Fault`](enum.Fault.html) annotated with where it happened.
#[derive(Clone, Debug, PartialEq)]
pub struct VmError {
    pub pc: usize,
    pub inst: Instruction,
    pub fault: Fault,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "vm error at pc {}: {} (a={} b={} c={}): {}",
            self.pc, self.inst.opcode, self.inst.a, self.inst.b, self.inst.c, self.fault
        )
    }
}

impl Error for VmError {}

/// Per-call activation record.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub locals: Vec<Value>,
    pub args: Vec<Value>,
    pub return_pc: usize,
}

type Handler = fn(&mut Vm, Instruction) -> Result<(), Fault>;

/// The virtual machine: code, register banks, constant pool and call stack,
/// executed through a dense opcode-indexed dispatch table.
pub struct Vm {
    code: Vec<Instruction>,
    regs: Vec<Value>,
    params: Vec<Value>,
    pool: Vec<Value>,
    frames: Vec<Frame>,
    pc: usize,
    table: [Option<Handler>; constants::DISPATCH_SIZE],
}

impl Vm {
    pub fn new(reg_count: usize) -> Vm {
        Vm {
            code: Vec::new(),
            regs: vec![Value::default(); reg_count],
            params: vec![Value::default(); constants::PARAM_REG_COUNT],
            pool: Vec::new(),
            frames: Vec::new(),
            pc: 0,
            table: ops::dispatch_table(),
        }
    }

    /// Installs a program: the constant pool and the code vector.
    pub fn load(&mut self, pool: Vec<Value>, code: Vec<Instruction>) {
        self.pool = pool;
        self.code = code;
        self.pc = 0;
    }

    /// Runs until the program counter leaves the code vector. `HALT`
    /// terminates by parking the pc there.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.pc = 0;
        while self.pc < self.code.len() {
            self.step()?;
        }
        Ok(())
    }

    /// Executes the instruction under the pc. Every handler advances the pc
    /// itself; control-flow handlers set it absolutely.
    pub fn step(&mut self) -> Result<(), VmError> {
        let pc = self.pc;
        let inst = self.code[pc];
        self.dispatch(inst).map_err(|fault| VmError { pc, inst, fault })
    }

    fn dispatch(&mut self, inst: Instruction) -> Result<(), Fault> {
        let byte = inst.opcode.byte();
        match self.table[byte as usize] {
            Some(handler) => handler(self, inst),
            None => Err(Fault::MissingHandler(byte)),
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Depth of the call stack.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn reg(&self, index: usize) -> &Value {
        &self.regs[index]
    }

    pub fn param(&self, index: usize) -> &Value {
        &self.params[index]
    }

    // Checked accessors used by the opcode handlers.

    fn reg_ref(&self, index: u16) -> Result<&Value, Fault> {
        self.regs
            .get(index as usize)
            .ok_or(Fault::BadRegister(index))
    }

    fn reg_mut(&mut self, index: u16) -> Result<&mut Value, Fault> {
        self.regs
            .get_mut(index as usize)
            .ok_or(Fault::BadRegister(index))
    }

    fn param_ref(&self, index: u16) -> Result<&Value, Fault> {
        self.params
            .get(index as usize)
            .ok_or(Fault::BadParam(index))
    }

    fn param_mut(&mut self, index: u16) -> Result<&mut Value, Fault> {
        self.params
            .get_mut(index as usize)
            .ok_or(Fault::BadParam(index))
    }

    fn frame(&self) -> Result<&Frame, Fault> {
        self.frames.last().ok_or(Fault::NoFrame)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, Fault> {
        self.frames.last_mut().ok_or(Fault::NoFrame)
    }

    fn local(&self, index: u16) -> Result<&Value, Fault> {
        self.frame()?
            .locals
            .get(index as usize)
            .ok_or(Fault::BadLocal(index))
    }

    fn local_mut(&mut self, index: u16) -> Result<&mut Value, Fault> {
        self.frame_mut()?
            .locals
            .get_mut(index as usize)
            .ok_or(Fault::BadLocal(index))
    }

    fn arg(&self, index: u16) -> Result<&Value, Fault> {
        self.frame()?
            .args
            .get(index as usize)
            .ok_or(Fault::BadArg(index))
    }

    fn const_at(&self, index: u16) -> Result<&Value, Fault> {
        self.pool
            .get(index as usize)
            .ok_or(Fault::BadConstant(index))
    }

    fn jump(&mut self, target: u16) -> Result<(), Fault> {
        let target = target as usize;
        if target > self.code.len() {
            return Err(Fault::BadJump(target));
        }
        self.pc = target;
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new(constants::DEFAULT_REG_COUNT)
    }
}
