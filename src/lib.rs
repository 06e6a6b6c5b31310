//! Core data model and interpreter for the ovm toolchain.
//!
//! The instruction set is a register machine whose opcodes model ownership
//! and borrowing (`OWN`, `MOVE`, `VIEW`, `EDIT`, `DROP`) alongside the usual
//! arithmetic, control flow, arrays and function calls. This crate holds the
//! pieces every tool shares — [`Value`](value/struct.Value.html),
//! [`Opcode`](ops/enum.Opcode.html), [`Instruction`](ops/struct.Instruction.html),
//! the [`ConstantPool`](pool/struct.ConstantPool.html) and the object-unit
//! model — plus the [`Vm`](vm/struct.Vm.html) itself.
//!
//! The assembler lives in the `oasm` crate and the binary file formats in
//! `ofile`.

pub mod constants;
pub mod ops;
pub mod pool;
pub mod unit;
pub mod value;
pub mod vm;

pub use crate::ops::{Bank, Instruction, Opcode};
pub use crate::value::Value;

#[cfg(test)]
mod test;
