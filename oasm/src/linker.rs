//! Cross-object merge and reference resolution.
//!
//! [`link_units`](fn.link_units.html) folds a list of assembled units into
//! one: constant pools are merged with dedup (remapping `LOADC`/`LOADCL`
//! pool operands), code and label/function tables are rebased by the running
//! code offset, and unresolved references that already have a known label
//! are patched on the spot. [`link_labels`](fn.link_labels.html) then binds
//! whatever is left — consulting the function table so `CALL` also receives
//! its argument and local counts — and fails on the first symbol that is
//! still unknown.

use std::error::Error as StdError;
use std::fmt;

use ovm::ops::Opcode;
use ovm::unit::{ObjectUnit, UnresolvedRef};

#[derive(Clone, Debug, PartialEq)]
pub enum LinkError {
    Undefined(String),
    DuplicateFunction(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkError::Undefined(symbol) => {
                write!(f, "undefined label or function: {}", symbol)
            }
            LinkError::DuplicateFunction(name) => {
                write!(f, "duplicate function across objects: {}", name)
            }
        }
    }
}

impl StdError for LinkError {}

/// Merges the units in input order into a single unit.
pub fn link_units(units: &[ObjectUnit]) -> Result<ObjectUnit, LinkError> {
    let mut out = ObjectUnit::default();

    for unit in units {
        let offset = out.code.len();

        // merge the constant pool, remembering where every entry landed
        let mut remap = Vec::with_capacity(unit.pool.size());
        for entry in unit.pool.entries() {
            remap.push(out.pool.add(entry.clone()));
        }

        for (name, func) in &unit.funcs {
            if out.funcs.contains_key(name) {
                return Err(LinkError::DuplicateFunction(name.clone()));
            }
            let mut func = func.clone();
            func.pc_start += offset;
            func.pc_end += offset;
            out.funcs.insert(name.clone(), func);
        }

        for inst in &unit.code {
            let mut inst = *inst;
            if inst.opcode == Opcode::LOADC || inst.opcode == Opcode::LOADCL {
                inst.b = remap[inst.b as usize] as u16;
            }
            out.code.push(inst);
        }

        for (label, pc) in &unit.labels {
            out.labels.insert(label.clone(), pc + offset);
        }

        for unresolved in &unit.unresolved {
            let mut unresolved = unresolved.clone();
            unresolved.inst_index += offset;
            // CALLs wait for final resolution so the function table can
            // fill in their argument and local counts
            let known = if unresolved.opcode != Opcode::CALL {
                out.labels.get(&unresolved.symbol).copied()
            } else {
                None
            };
            match known {
                Some(target) => patch(&mut out.code, &unresolved, target),
                None => out.unresolved.push(unresolved),
            }
        }
    }

    Ok(out)
}

/// Final resolution: binds every remaining reference through the label and
/// function tables, draining the unresolved list. Returns how many
/// references were bound in total.
pub fn link_labels(unit: &mut ObjectUnit) -> Result<usize, LinkError> {
    let unresolved = std::mem::replace(&mut unit.unresolved, Vec::new());
    let count = unresolved.len();

    for reference in &unresolved {
        if reference.opcode == Opcode::CALL {
            if let Some(func) = unit.funcs.get(&reference.symbol) {
                let (pc_start, params, locals) = (func.pc_start, func.params, func.locals);
                let inst = &mut unit.code[reference.inst_index];
                inst.a = pc_start as u16;
                inst.b = params;
                inst.c = locals;
                continue;
            }
        }

        let known = match unit.labels.get(&reference.symbol) {
            Some(&pc) => Some(pc),
            None => unit.funcs.get(&reference.symbol).map(|f| f.pc_start),
        };
        let target = known.ok_or_else(|| LinkError::Undefined(reference.symbol.clone()))?;
        patch(&mut unit.code, reference, target);
    }

    Ok(count)
}

/// Convenience pipeline: merge, then resolve.
pub fn link(units: &[ObjectUnit]) -> Result<ObjectUnit, LinkError> {
    let mut out = link_units(units)?;
    link_labels(&mut out)?;
    Ok(out)
}

fn patch(code: &mut [ovm::Instruction], reference: &UnresolvedRef, target: usize) {
    let inst = &mut code[reference.inst_index];
    if reference.target_in_b {
        inst.b = target as u16;
    } else {
        inst.a = target as u16;
    }
}
