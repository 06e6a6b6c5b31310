//! Opcode handlers and the dispatch table.

use super::{Fault, Frame, Handler, Vm};
use crate::constants;
use crate::ops::{Bank, Instruction, Opcode};
use crate::value::{Data, Value};

fn set(table: &mut [Option<Handler>; constants::DISPATCH_SIZE], op: Opcode, handler: Handler) {
    table[op as usize] = Some(handler);
}

/// Builds the dense dispatch table. Unassigned slots stay `None` and fault
/// at dispatch time.
pub(super) fn dispatch_table() -> [Option<Handler>; constants::DISPATCH_SIZE] {
    let mut table: [Option<Handler>; constants::DISPATCH_SIZE] = [None; constants::DISPATCH_SIZE];

    // Data & arithmetic
    set(&mut table, Opcode::LOADC, Vm::op_loadc);
    set(&mut table, Opcode::LOADL, Vm::op_loadl);
    set(&mut table, Opcode::STOREL, Vm::op_storel);
    set(&mut table, Opcode::MOV, Vm::op_mov);
    set(&mut table, Opcode::ADD, Vm::op_add);
    set(&mut table, Opcode::SUB, Vm::op_sub);
    set(&mut table, Opcode::MUL, Vm::op_mul);
    set(&mut table, Opcode::DIV, Vm::op_div);
    set(&mut table, Opcode::NEG, Vm::op_neg);
    set(&mut table, Opcode::CMP, Vm::op_cmp);
    set(&mut table, Opcode::NOT, Vm::op_not);
    set(&mut table, Opcode::AND, Vm::op_and);
    set(&mut table, Opcode::OR, Vm::op_or);

    // Control flow
    set(&mut table, Opcode::JMP, Vm::op_jmp);
    set(&mut table, Opcode::JZ, Vm::op_jz);
    set(&mut table, Opcode::JNZ, Vm::op_jnz);
    set(&mut table, Opcode::JL, Vm::op_jl);
    set(&mut table, Opcode::JG, Vm::op_jg);
    set(&mut table, Opcode::JLZ, Vm::op_jlz);
    set(&mut table, Opcode::JLNZ, Vm::op_jlnz);
    set(&mut table, Opcode::JLL, Vm::op_jll);
    set(&mut table, Opcode::JLG, Vm::op_jlg);

    // Function call & stack
    set(&mut table, Opcode::CALL, Vm::op_call);
    set(&mut table, Opcode::RET, Vm::op_ret);
    set(&mut table, Opcode::ENTER, Vm::op_enter);
    set(&mut table, Opcode::LEAVE, Vm::op_leave);

    // Local arithmetic variants
    set(&mut table, Opcode::ADDL, Vm::op_addl);
    set(&mut table, Opcode::SUBL, Vm::op_subl);
    set(&mut table, Opcode::MULL, Vm::op_mull);
    set(&mut table, Opcode::DIVL, Vm::op_divl);
    set(&mut table, Opcode::NEGL, Vm::op_negl);
    set(&mut table, Opcode::CMPL, Vm::op_cmpl);
    set(&mut table, Opcode::NOTL, Vm::op_notl);
    set(&mut table, Opcode::ANDL, Vm::op_andl);
    set(&mut table, Opcode::ORL, Vm::op_orl);
    set(&mut table, Opcode::MOVL, Vm::op_movl);
    set(&mut table, Opcode::LOADCL, Vm::op_loadcl);
    set(&mut table, Opcode::LOADARG, Vm::op_loadarg);

    // Array & memory
    set(&mut table, Opcode::NEWARR, Vm::op_newarr);
    set(&mut table, Opcode::LOADARR, Vm::op_loadarr);
    set(&mut table, Opcode::STOREARR, Vm::op_storearr);
    set(&mut table, Opcode::LEN, Vm::op_len);
    set(&mut table, Opcode::FREE, Vm::op_raiidrop);

    // Misc
    set(&mut table, Opcode::NOP, Vm::op_nop);
    set(&mut table, Opcode::PRINT, Vm::op_print);
    set(&mut table, Opcode::HALT, Vm::op_halt);
    set(&mut table, Opcode::LOADP, Vm::op_loadp);
    set(&mut table, Opcode::LOADLP, Vm::op_loadlp);

    // Ownership & borrowing. CLONE is a deep copy, which is exactly what
    // OWN does over value-semantics payloads.
    set(&mut table, Opcode::OWN, Vm::op_own);
    set(&mut table, Opcode::MOVE, Vm::op_move);
    set(&mut table, Opcode::VIEW, Vm::op_view);
    set(&mut table, Opcode::EDIT, Vm::op_edit);
    set(&mut table, Opcode::CLONE, Vm::op_own);
    set(&mut table, Opcode::DROP, Vm::op_raiidrop);

    // Legacy refcount opcodes map onto the ownership handlers.
    set(&mut table, Opcode::INCREF, Vm::op_view);
    set(&mut table, Opcode::DECREF, Vm::op_raiidrop);
    set(&mut table, Opcode::CHECKEXCL, Vm::op_edit);
    set(&mut table, Opcode::CHECKLIVE, Vm::op_view);
    set(&mut table, Opcode::RAIIDROP, Vm::op_raiidrop);

    table
}

fn is_double(value: &Value) -> bool {
    match value.data {
        Data::Double(_) => true,
        _ => false,
    }
}

fn add_values(lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    if is_double(lhs) || is_double(rhs) {
        Ok(Value::from(lhs.as_double()? + rhs.as_double()?))
    } else {
        Ok(Value::from(lhs.as_int()?.wrapping_add(rhs.as_int()?)))
    }
}

fn sub_values(lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    if is_double(lhs) || is_double(rhs) {
        Ok(Value::from(lhs.as_double()? - rhs.as_double()?))
    } else {
        Ok(Value::from(lhs.as_int()?.wrapping_sub(rhs.as_int()?)))
    }
}

fn mul_values(lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    if is_double(lhs) || is_double(rhs) {
        Ok(Value::from(lhs.as_double()? * rhs.as_double()?))
    } else {
        Ok(Value::from(lhs.as_int()?.wrapping_mul(rhs.as_int()?)))
    }
}

fn div_values(lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    if is_double(lhs) || is_double(rhs) {
        Ok(Value::from(lhs.as_double()? / rhs.as_double()?))
    } else {
        let divisor = rhs.as_int()?;
        if divisor == 0 {
            return Err(Fault::DivisionByZero);
        }
        Ok(Value::from(lhs.as_int()?.wrapping_div(divisor)))
    }
}

fn cmp_values(lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    let ordering = if is_double(lhs) || is_double(rhs) {
        let (a, b) = (lhs.as_double()?, rhs.as_double()?);
        if a < b {
            -1
        } else if a > b {
            1
        } else {
            0
        }
    } else {
        let (a, b) = (lhs.as_int()?, rhs.as_int()?);
        if a < b {
            -1
        } else if a > b {
            1
        } else {
            0
        }
    };
    Ok(Value::from(ordering))
}

fn neg_value(value: &Value) -> Result<Value, Fault> {
    if is_double(value) {
        Ok(Value::from(-value.as_double()?))
    } else {
        Ok(Value::from(value.as_int()?.wrapping_neg()))
    }
}

impl Vm {
    fn op_loadc(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.const_at(i.b)?.clone();
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_loadl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.local(i.b)?.clone();
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_storel(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.reg_ref(i.b)?.clone();
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_mov(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.reg_ref(i.b)?.clone();
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_add(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = add_values(self.reg_ref(i.b)?, self.reg_ref(i.c)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_sub(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = sub_values(self.reg_ref(i.b)?, self.reg_ref(i.c)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_mul(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = mul_values(self.reg_ref(i.b)?, self.reg_ref(i.c)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_div(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = div_values(self.reg_ref(i.b)?, self.reg_ref(i.c)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_neg(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = neg_value(self.reg_ref(i.b)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_cmp(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = cmp_values(self.reg_ref(i.b)?, self.reg_ref(i.c)?)?;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_not(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(!self.reg_ref(i.b)?.as_bool());
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    // No short-circuit: both operands are already materialised in registers.
    fn op_and(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(self.reg_ref(i.b)?.as_bool() && self.reg_ref(i.c)?.as_bool());
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_or(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(self.reg_ref(i.b)?.as_bool() || self.reg_ref(i.c)?.as_bool());
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_print(&mut self, i: Instruction) -> Result<(), Fault> {
        let bank = Bank::from_code(i.b).ok_or(Fault::BadBank(i.b))?;
        let text = match bank {
            Bank::Global => self.reg_ref(i.a)?.to_string(),
            Bank::Local => self.local(i.a)?.to_string(),
            Bank::Arg => self.arg(i.a)?.to_string(),
            Bank::Param => self.param_ref(i.a)?.to_string(),
        };
        println!("{}", text);
        self.pc += 1;
        Ok(())
    }

    fn op_jmp(&mut self, i: Instruction) -> Result<(), Fault> {
        self.jump(i.a)
    }

    fn op_jz(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.reg_ref(i.a)?.as_int()? == 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jnz(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.reg_ref(i.a)?.as_int()? != 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jl(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.reg_ref(i.a)?.as_int()? < 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jg(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.reg_ref(i.a)?.as_int()? > 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jlz(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.local(i.a)?.as_int()? == 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jlnz(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.local(i.a)?.as_int()? != 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jll(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.local(i.a)?.as_int()? < 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    fn op_jlg(&mut self, i: Instruction) -> Result<(), Fault> {
        if self.local(i.a)?.as_int()? > 0 {
            self.jump(i.b)
        } else {
            self.pc += 1;
            Ok(())
        }
    }

    /// Pushes the callee frame, marshals the first B parameter registers
    /// into the frame (both the args vector and the leading locals), then
    /// jumps to the function body.
    fn op_call(&mut self, i: Instruction) -> Result<(), Fault> {
        let target = i.a as usize;
        if target > self.code.len() {
            return Err(Fault::BadJump(target));
        }
        let argc = i.b as usize;
        if argc > self.params.len() {
            return Err(Fault::BadParam(i.b));
        }
        let args: Vec<Value> = self.params[..argc].to_vec();
        let mut locals = vec![Value::default(); i.c as usize];
        for (slot, arg) in locals.iter_mut().zip(args.iter()) {
            *slot = arg.clone();
        }
        self.frames.push(Frame {
            locals,
            args,
            return_pc: self.pc + 1,
        });
        self.pc = target;
        Ok(())
    }

    /// Pops the frame, publishing `locals[A]` through parameter register 0
    /// unless A is the no-value sentinel. The frame's locals are dropped
    /// with the frame.
    fn op_ret(&mut self, i: Instruction) -> Result<(), Fault> {
        let result = if i.a != constants::RET_NO_VALUE {
            Some(self.local(i.a)?.clone())
        } else {
            None
        };
        let frame = self.frames.pop().ok_or(Fault::NoFrame)?;
        if let Some(value) = result {
            *self.param_mut(0)? = value;
        }
        self.pc = frame.return_pc;
        Ok(())
    }

    fn op_enter(&mut self, i: Instruction) -> Result<(), Fault> {
        self.frames.push(Frame {
            locals: vec![Value::default(); i.c as usize],
            args: vec![Value::default(); i.b as usize],
            return_pc: self.pc + 1,
        });
        self.pc += 1;
        Ok(())
    }

    fn op_leave(&mut self, _i: Instruction) -> Result<(), Fault> {
        let frame = self.frames.pop().ok_or(Fault::NoFrame)?;
        self.pc = frame.return_pc;
        Ok(())
    }

    fn op_newarr(&mut self, i: Instruction) -> Result<(), Fault> {
        let len = i.c as usize;
        *self.reg_mut(i.a)? = Value::from(vec![Value::default(); len]);
        self.pc += 1;
        Ok(())
    }

    fn op_loadarr(&mut self, i: Instruction) -> Result<(), Fault> {
        let index = self.reg_ref(i.c)?.as_int()?;
        let array = self.reg_ref(i.b)?.as_array()?;
        let len = array.len();
        if index < 0 || index as usize >= len {
            return Err(Fault::ArrayBounds { index, len });
        }
        let value = array[index as usize].clone();
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_storearr(&mut self, i: Instruction) -> Result<(), Fault> {
        let index = self.reg_ref(i.b)?.as_int()?;
        let value = self.reg_ref(i.c)?.clone();
        let array = self.reg_mut(i.a)?.as_array_mut()?;
        let len = array.len();
        if index < 0 || index as usize >= len {
            return Err(Fault::ArrayBounds { index, len });
        }
        array[index as usize] = value;
        self.pc += 1;
        Ok(())
    }

    fn op_len(&mut self, i: Instruction) -> Result<(), Fault> {
        let len = self.reg_ref(i.b)?.as_array()?.len();
        *self.reg_mut(i.a)? = Value::from(len as i32);
        self.pc += 1;
        Ok(())
    }

    fn op_loadp(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.reg_ref(i.b)?.clone();
        *self.param_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_loadlp(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.local(i.b)?.clone();
        *self.param_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    /// Reads the current frame's arg slot — the snapshot taken when the
    /// frame was pushed, not the live parameter bank.
    fn op_loadarg(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.arg(i.b)?.clone();
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_own(&mut self, i: Instruction) -> Result<(), Fault> {
        let mut value = self.reg_ref(i.b)?.clone();
        value.refcount = 1;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_move(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.reg_mut(i.b)?.take();
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_view(&mut self, i: Instruction) -> Result<(), Fault> {
        let source = self.reg_mut(i.b)?;
        source.refcount += 1;
        let view = source.clone();
        *self.reg_mut(i.a)? = view;
        self.pc += 1;
        Ok(())
    }

    /// Promotion to an exclusive reference: only legal while the source is
    /// the sole owner. The source slot is invalidated.
    fn op_edit(&mut self, i: Instruction) -> Result<(), Fault> {
        let source = self.reg_mut(i.b)?;
        if source.refcount > 1 {
            return Err(Fault::ExclusiveEdit {
                refcount: source.refcount,
            });
        }
        let mut value = source.take();
        value.refcount = 1;
        *self.reg_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_raiidrop(&mut self, i: Instruction) -> Result<(), Fault> {
        let slot = self.reg_mut(i.a)?;
        if slot.refcount <= 1 {
            *slot = Value::default();
        } else {
            slot.refcount -= 1;
        }
        self.pc += 1;
        Ok(())
    }

    fn op_nop(&mut self, _i: Instruction) -> Result<(), Fault> {
        self.pc += 1;
        Ok(())
    }

    fn op_halt(&mut self, _i: Instruction) -> Result<(), Fault> {
        self.pc = self.code.len();
        Ok(())
    }

    fn op_movl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.local(i.b)?.clone();
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_addl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = add_values(self.local(i.b)?, self.local(i.c)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_subl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = sub_values(self.local(i.b)?, self.local(i.c)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_mull(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = mul_values(self.local(i.b)?, self.local(i.c)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_divl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = div_values(self.local(i.b)?, self.local(i.c)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_negl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = neg_value(self.local(i.b)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_cmpl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = cmp_values(self.local(i.b)?, self.local(i.c)?)?;
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_notl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(!self.local(i.b)?.as_bool());
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_andl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(self.local(i.b)?.as_bool() && self.local(i.c)?.as_bool());
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_orl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = Value::from(self.local(i.b)?.as_bool() || self.local(i.c)?.as_bool());
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }

    fn op_loadcl(&mut self, i: Instruction) -> Result<(), Fault> {
        let value = self.const_at(i.b)?.clone();
        *self.local_mut(i.a)? = value;
        self.pc += 1;
        Ok(())
    }
}
