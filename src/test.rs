use crate::instr;
use crate::ops::Instruction;
use crate::value::Value;
use crate::vm::{Fault, Vm, VmError};

fn run_program(pool: Vec<Value>, code: Vec<Instruction>) -> Vm {
    let mut vm = Vm::default();
    vm.load(pool, code);
    vm.run().unwrap();
    vm
}

fn run_program_err(pool: Vec<Value>, code: Vec<Instruction>) -> (Vm, VmError) {
    let mut vm = Vm::default();
    vm.load(pool, code);
    let err = vm.run().unwrap_err();
    (vm, err)
}

#[test]
fn program_halt() {
    let vm = run_program(vec![], vec![instr!(HALT)]);
    assert_eq!(vm.depth(), 0);
}

#[test]
fn program_add() {
    let pool = vec![Value::from(42), Value::from(64)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(ADD, 3, 1, 2),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(3), &Value::from(106));
}

#[test]
fn wrapping_arithmetic() {
    let pool = vec![Value::from(i32::max_value()), Value::from(1)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(ADD, 0, 1, 2),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::from(i32::min_value()));
}

#[test]
fn cross_type_arithmetic_promotes_to_double() {
    let pool = vec![Value::from(2), Value::from(0.5)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(ADD, 0, 1, 2),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::from(2.5));
}

#[test]
fn cmp_is_signum() {
    let pool = vec![Value::from(3), Value::from(9)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(CMP, 3, 1, 2),
        instr!(CMP, 4, 2, 1),
        instr!(CMP, 5, 1, 1),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(3), &Value::from(-1));
    assert_eq!(vm.reg(4), &Value::from(1));
    assert_eq!(vm.reg(5), &Value::from(0));
}

#[test]
fn mov_neg_and_bool_logic() {
    let pool = vec![Value::from(6), Value::from(0)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(MOV, 3, 1),
        instr!(NEG, 4, 1),
        instr!(NOT, 5, 2),
        instr!(AND, 6, 1, 2),
        instr!(OR, 7, 1, 2),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(3), &Value::from(6));
    assert_eq!(vm.reg(4), &Value::from(-6));
    assert_eq!(vm.reg(5), &Value::from(true));
    assert_eq!(vm.reg(6), &Value::from(false));
    assert_eq!(vm.reg(7), &Value::from(true));
}

#[test]
fn halt_skips_the_rest() {
    let pool = vec![Value::from(1)];
    let code = vec![instr!(HALT), instr!(LOADC, 0, 0)];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::default());
}

#[test]
fn jnz_and_jg_predicates() {
    let pool = vec![Value::from(2)];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(JNZ, 0, 3),
        instr!(HALT),
        instr!(JG, 0, 5),
        instr!(HALT),
        instr!(LOADC, 1, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(1), &Value::from(2));
}

#[test]
fn division_by_zero_faults() {
    let pool = vec![Value::from(1), Value::from(0)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(DIV, 0, 1, 2),
    ];
    let (_, err) = run_program_err(pool, code);
    assert_eq!(err.pc, 2);
    assert_eq!(err.fault, Fault::DivisionByZero);
}

#[test]
fn counting_loop() {
    // r0 counts to 5 via CMP/JL, mirroring the smallest conceivable loop.
    let pool = vec![Value::from(0), Value::from(1), Value::from(5)];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(LOADC, 3, 1),
        instr!(LOADC, 1, 2),
        instr!(CMP, 2, 0, 1),
        instr!(JL, 2, 6),
        instr!(JMP, 8),
        instr!(ADD, 0, 0, 3),
        instr!(JMP, 3),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::from(5));
}

#[test]
fn array_store_load_and_sum() {
    let pool = vec![
        Value::from(10),
        Value::from(20),
        Value::from(30),
        Value::from(0),
        Value::from(1),
        Value::from(2),
    ];
    let code = vec![
        instr!(NEWARR, 0, 0, 3),
        instr!(LOADC, 2, 0),
        instr!(LOADC, 1, 3),
        instr!(STOREARR, 0, 1, 2),
        instr!(LOADC, 1, 4),
        instr!(LOADC, 2, 1),
        instr!(STOREARR, 0, 1, 2),
        instr!(LOADC, 1, 5),
        instr!(LOADC, 2, 2),
        instr!(STOREARR, 0, 1, 2),
        instr!(LOADC, 3, 3),
        instr!(LOADC, 1, 3),
        instr!(LEN, 4, 0),
        instr!(CMP, 5, 1, 4),
        instr!(JL, 5, 16),
        instr!(JMP, 21),
        instr!(LOADARR, 6, 0, 1),
        instr!(ADD, 3, 3, 6),
        instr!(LOADC, 2, 4),
        instr!(ADD, 1, 1, 2),
        instr!(JMP, 13),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(3), &Value::from(60));
}

#[test]
fn array_read_out_of_bounds_faults() {
    let pool = vec![Value::from(3)];
    let code = vec![
        instr!(NEWARR, 0, 0, 3),
        instr!(LOADC, 1, 0),
        instr!(LOADARR, 2, 0, 1),
    ];
    let (_, err) = run_program_err(pool, code);
    assert_eq!(err.pc, 2);
    assert_eq!(err.fault, Fault::ArrayBounds { index: 3, len: 3 });
}

#[test]
fn call_marshals_args_and_ret_publishes_result() {
    // main: params[0] = 7; call; halt. callee: locals[0] comes in through
    // the parameter bank, returned as-is.
    let pool = vec![Value::from(7)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADP, 0, 1),
        instr!(CALL, 4, 1, 1),
        instr!(HALT),
        instr!(LOADARG, 0, 0),
        instr!(RET, 0),
    ];
    let mut vm = Vm::default();
    vm.load(pool, code);
    vm.run().unwrap();
    assert_eq!(vm.param(0), &Value::from(7));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn enter_builds_a_frame_for_local_arithmetic() {
    let pool = vec![Value::from(6), Value::from(7)];
    let code = vec![
        instr!(ENTER, 0, 0, 2),
        instr!(LOADCL, 0, 0),
        instr!(LOADCL, 1, 1),
        instr!(ADDL, 0, 0, 1),
        instr!(LOADL, 1, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(1), &Value::from(13));
    assert_eq!(vm.depth(), 1);
}

#[test]
fn local_arithmetic_family() {
    let pool = vec![Value::from(9), Value::from(3), Value::from(0)];
    let code = vec![
        instr!(ENTER, 0, 0, 6),
        instr!(LOADCL, 0, 0),   // l0 = 9
        instr!(LOADCL, 1, 1),   // l1 = 3
        instr!(LOADCL, 2, 2),   // l2 = 0
        instr!(SUBL, 3, 0, 1),  // l3 = 6
        instr!(DIVL, 4, 0, 1),  // l4 = 3
        instr!(MULL, 5, 1, 1),  // l5 = 9
        instr!(CMPL, 5, 5, 0),  // l5 = cmp(9, 9) = 0
        instr!(NEGL, 2, 1),     // l2 = -3
        instr!(NOTL, 1, 2),     // l1 = !true = false
        instr!(MOVL, 0, 3),     // l0 = 6
        instr!(LOADL, 1, 0),
        instr!(LOADL, 2, 4),
        instr!(LOADL, 3, 5),
        instr!(LOADL, 4, 2),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(1), &Value::from(6));
    assert_eq!(vm.reg(2), &Value::from(3));
    assert_eq!(vm.reg(3), &Value::from(0));
    assert_eq!(vm.reg(4), &Value::from(-3));
}

#[test]
fn storel_round_trips_through_the_frame() {
    let pool = vec![Value::from("kept")];
    let code = vec![
        instr!(ENTER, 0, 0, 1),
        instr!(LOADC, 1, 0),
        instr!(STOREL, 0, 1),
        instr!(LOADL, 2, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(2), &Value::from("kept"));
}

#[test]
fn arithmetic_on_a_string_is_a_cast_fault() {
    let pool = vec![Value::from("nan"), Value::from(1)];
    let code = vec![
        instr!(LOADC, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(ADD, 0, 1, 2),
    ];
    let (_, err) = run_program_err(pool, code);
    assert_eq!(err.pc, 2);
    assert_matches_cast(&err.fault);
}

fn assert_matches_cast(fault: &Fault) {
    match fault {
        Fault::Cast(_) => {}
        other => panic!("expected a cast fault, got {:?}", other),
    }
}

#[test]
fn missing_constant_faults() {
    let code = vec![instr!(LOADC, 0, 4)];
    let (_, err) = run_program_err(vec![], code);
    assert_eq!(err.fault, Fault::BadConstant(4));
}

#[test]
fn local_access_without_a_slot_faults() {
    let pool = vec![Value::from(1)];
    let code = vec![instr!(ENTER, 0, 0, 0), instr!(LOADCL, 0, 0)];
    let (_, err) = run_program_err(pool, code);
    assert_eq!(err.fault, Fault::BadLocal(0));
}

#[test]
fn local_jump_reads_frame_locals() {
    let pool = vec![Value::from(0), Value::from(1)];
    let code = vec![
        instr!(ENTER, 0, 0, 1),
        instr!(LOADCL, 0, 0),
        instr!(JLZ, 0, 4),
        instr!(HALT),
        instr!(LOADC, 1, 1),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(1), &Value::from(1));
}

#[test]
fn ret_without_frame_faults() {
    let code = vec![instr!(RET, 0xFF)];
    let (_, err) = run_program_err(vec![], code);
    assert_eq!(err.fault, Fault::NoFrame);
}

#[test]
fn own_resets_refcount() {
    let pool = vec![Value::from("payload")];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(VIEW, 1, 0),
        instr!(OWN, 2, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0).refcount, 2);
    assert_eq!(vm.reg(2).refcount, 1);
    assert_eq!(vm.reg(2), &Value::from("payload"));
}

#[test]
fn view_increments_both_slots() {
    let pool = vec![Value::from(1)];
    let code = vec![instr!(LOADC, 0, 0), instr!(VIEW, 1, 0), instr!(HALT)];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0).refcount, 2);
    assert_eq!(vm.reg(1).refcount, 2);
    assert_eq!(vm.reg(1), &Value::from(1));
}

#[test]
fn move_clears_the_source() {
    let pool = vec![Value::from("movable")];
    let code = vec![instr!(LOADC, 0, 0), instr!(MOVE, 1, 0), instr!(HALT)];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::default());
    assert_eq!(vm.reg(1), &Value::from("movable"));
}

#[test]
fn edit_of_unique_value_succeeds() {
    let pool = vec![Value::from(5)];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(OWN, 1, 0),
        instr!(EDIT, 2, 1),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(2), &Value::from(5));
    assert_eq!(vm.reg(2).refcount, 1);
    assert_eq!(vm.reg(1), &Value::default());
}

#[test]
fn edit_of_shared_value_faults() {
    let pool = vec![Value::from(5)];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(OWN, 1, 0),
        instr!(VIEW, 2, 1),
        instr!(EDIT, 3, 1),
    ];
    let (vm, err) = run_program_err(pool, code);
    assert_eq!(err.pc, 3);
    assert_eq!(err.fault, Fault::ExclusiveEdit { refcount: 2 });
    assert_eq!(vm.reg(1).refcount, 2);
}

#[test]
fn drop_decrements_then_clears() {
    let pool = vec![Value::from("shared")];
    let code = vec![
        instr!(LOADC, 0, 0),
        instr!(VIEW, 1, 0),
        instr!(DROP, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    // One of two holders dropped: value survives with the count lowered.
    assert_eq!(vm.reg(0).refcount, 1);
    assert_eq!(vm.reg(0), &Value::from("shared"));

    let pool = vec![Value::from("unique")];
    let code = vec![instr!(LOADC, 0, 0), instr!(RAIIDROP, 0), instr!(HALT)];
    let vm = run_program(pool, code);
    assert_eq!(vm.reg(0), &Value::default());
}

#[test]
fn clone_is_a_deep_copy() {
    let pool = vec![Value::from(4), Value::from(0)];
    let code = vec![
        instr!(NEWARR, 0, 0, 2),
        instr!(CLONE, 1, 0),
        instr!(LOADC, 2, 1),
        instr!(LOADC, 3, 0),
        // mutate the original after cloning; the clone must not see it
        instr!(STOREARR, 0, 2, 3),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    let original = vm.reg(0).as_array().unwrap();
    let copy = vm.reg(1).as_array().unwrap();
    assert_eq!(original[0], Value::from(4));
    assert_eq!(copy[0], Value::default());
}

#[test]
fn loadp_and_loadlp_stage_parameters() {
    let pool = vec![Value::from(11), Value::from(22)];
    let code = vec![
        instr!(ENTER, 0, 0, 1),
        instr!(LOADCL, 0, 1),
        instr!(LOADC, 1, 0),
        instr!(LOADP, 0, 1),
        instr!(LOADLP, 1, 0),
        instr!(HALT),
    ];
    let vm = run_program(pool, code);
    assert_eq!(vm.param(0), &Value::from(11));
    assert_eq!(vm.param(1), &Value::from(22));
}

#[test]
fn loadarg_reads_the_frame_snapshot_not_the_bank() {
    // outer(7) stages 9 for an inner call, then re-reads its own argument;
    // the snapshot taken at outer's call must win over the re-staged bank.
    let pool = vec![Value::from(7), Value::from(9)];
    let code = vec![
        instr!(LOADC, 1, 0),     //  0: r1 = 7
        instr!(LOADP, 0, 1),     //  1: p0 = 7
        instr!(CALL, 4, 1, 2),   //  2: outer
        instr!(HALT),            //  3
        // outer
        instr!(LOADC, 2, 1),     //  4: r2 = 9
        instr!(LOADP, 0, 2),     //  5: p0 = 9, clobbering the bank
        instr!(CALL, 10, 1, 1),  //  6: inner
        instr!(LOADARG, 1, 0),   //  7: l1 = outer's own a0
        instr!(LOADL, 3, 1),     //  8: r3 = l1
        instr!(RET, 1),          //  9
        // inner
        instr!(RET, 0xFF),       // 10
    ];
    let mut vm = Vm::default();
    vm.load(pool, code);
    vm.run().unwrap();
    assert_eq!(vm.reg(3), &Value::from(7));
    assert_eq!(vm.param(0), &Value::from(7));
}

#[test]
fn recursive_factorial() {
    // fact(n) = iter(n, 1); iter threads the accumulator through the
    // parameter bank and a valueless RET lets the innermost result
    // propagate out untouched.
    let pool = vec![Value::from(5), Value::from(1)];
    let code = vec![
        // entry
        instr!(LOADC, 1, 0),     //  0: r1 = 5
        instr!(LOADP, 0, 1),     //  1: p0 = r1
        instr!(CALL, 4, 1, 1),   //  2: fact
        instr!(HALT),            //  3
        // fact: stage (n, 1) and tail-call iter
        instr!(LOADARG, 0, 0),   //  4: l0 = n
        instr!(LOADL, 1, 0),     //  5: r1 = n
        instr!(LOADC, 2, 1),     //  6: r2 = 1
        instr!(LOADP, 0, 1),     //  7: p0 = n
        instr!(LOADP, 1, 2),     //  8: p1 = 1
        instr!(CALL, 11, 2, 2),  //  9: iter
        instr!(RET, 0xFF),       // 10: pass the result through
        // iter(n, acc)
        instr!(LOADARG, 0, 0),   // 11: l0 = n
        instr!(LOADARG, 1, 1),   // 12: l1 = acc
        instr!(LOADL, 1, 0),     // 13: r1 = n
        instr!(LOADC, 2, 1),     // 14: r2 = 1
        instr!(CMP, 3, 1, 2),    // 15
        instr!(JZ, 3, 24),       // 16: base case
        instr!(SUB, 4, 1, 2),    // 17: r4 = n - 1
        instr!(LOADL, 5, 1),     // 18: r5 = acc
        instr!(MUL, 5, 5, 1),    // 19: r5 = acc * n
        instr!(LOADP, 0, 4),     // 20
        instr!(LOADP, 1, 5),     // 21
        instr!(CALL, 11, 2, 2),  // 22: iter(n - 1, acc * n)
        instr!(RET, 0xFF),       // 23
        // base case
        instr!(RET, 1),          // 24: acc
    ];
    let mut vm = Vm::default();
    vm.load(pool, code);
    vm.run().unwrap();
    assert_eq!(vm.param(0), &Value::from(120));
    assert_eq!(vm.depth(), 0);
}
