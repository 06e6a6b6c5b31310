use std::collections::BTreeMap;

use crate::ops::{Instruction, Opcode};
use crate::pool::ConstantPool;

/// One function as recorded by the assembler.
///
/// `pc_start..pc_end` is the half-open instruction range belonging to the
/// function. The two name maps back the symbolic `var`/`param` operand
/// rewriting and are not serialized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: u16,
    pub locals: u16,
    pub pc_start: usize,
    pub pc_end: usize,
    pub local_names: BTreeMap<String, u16>,
    pub param_names: BTreeMap<String, u16>,
}

/// A jump or call whose symbolic target is not bound to a concrete pc yet.
#[derive(Clone, Debug, PartialEq)]
pub struct UnresolvedRef {
    /// Index of the instruction to patch, within the unit's code vector.
    pub inst_index: usize,
    /// The still-unresolved symbol.
    pub symbol: String,
    pub opcode: Opcode,
    /// The resolved pc lands in field B when set, in field A otherwise.
    pub target_in_b: bool,
}

/// Everything the assembler produces for one translation unit; also the
/// in-memory form of an object file and of the linker's merged output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectUnit {
    pub pool: ConstantPool,
    pub code: Vec<Instruction>,
    pub labels: BTreeMap<String, usize>,
    pub funcs: BTreeMap<String, Function>,
    pub unresolved: Vec<UnresolvedRef>,
}
