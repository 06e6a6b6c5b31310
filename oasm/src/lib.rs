//! Assembler for the [ovm](../ovm/index.html) virtual machine.
//!
//! [`assemble`](fn.assemble.html) turns a line-oriented assembly source into
//! an [`ObjectUnit`](../ovm/unit/struct.ObjectUnit.html): instructions, a
//! constant pool, label and function tables, and the list of unresolved
//! jump/call references. The [`linker`](linker/index.html) module merges any
//! number of units and binds every reference; the `ofile` crate gives both
//! shapes their on-disk form.
//!
//! # Source language
//!
//! Lines are trimmed; empty lines and lines starting with `;` are comments
//! (a `;` outside a string literal also starts a trailing comment).
//!
//! ## Directives
//!
//! Directive       | Effect
//! ----------------|------------------------------------------------------
//! `.func NAME`    | opens function `NAME` at the current code position
//! `.code`         | marks the function body start and labels it `NAME`
//! `.params N`     | declares the parameter count
//! `.locals N`     | declares the local count
//! `.end`          | closes the current function
//! `.label NAME`   | binds `NAME` to the current code position
//! `var NAME`      | names the next local slot (usable as an operand)
//! `param NAME`    | names the next parameter slot (usable as an operand)
//!
//! ## Instructions
//!
//! `MNEMONIC [operands][, operands…] [-> dest]` — the destination register,
//! when the opcode has one, is written after `->`. Register tokens are
//! `%rN` (global), `%lN` (local), `%aN` (argument) and `%pN` (parameter).
//! `LOADC`/`LOADCL` take their literal verbatim up to the arrow, so quoted
//! strings may contain commas. Inside a function, identifiers declared with
//! `var`/`param` may stand in for `%lN`/`%aN` operands.
//!
//! Jump and call targets are labels (or absolute instruction indices);
//! symbolic targets stay unresolved until link time, which is also when
//! `CALL` gets its argument and local counts from the function table.
//!
//! Quick reference for all accepted mnemonics:
//!
//! Mnemonic   | Short description                  | Syntax
//! -----------|------------------------------------|-----------------------------
//! `LOADC`    | Load constant                      | `LOADC lit -> %rN`
//! `LOADCL`   | Load constant into local           | `LOADCL lit -> %lN`
//! `LOADL`    | Copy local into register           | `LOADL %lN -> %rN`
//! `STOREL`   | Copy register into local           | `STOREL %rN -> %lN`
//! `MOV`      | Copy register                      | `MOV %rN -> %rN`
//! `ADD`      | Add                                | `ADD %rN, %rN -> %rN`
//! `SUB`      | Subtract                           | `SUB %rN, %rN -> %rN`
//! `MUL`      | Multiply                           | `MUL %rN, %rN -> %rN`
//! `DIV`      | Divide                             | `DIV %rN, %rN -> %rN`
//! `NEG`      | Negate                             | `NEG %rN -> %rN`
//! `CMP`      | Compare, yields -1/0/+1            | `CMP %rN, %rN -> %rN`
//! `NOT`      | Boolean not                        | `NOT %rN -> %rN`
//! `AND`      | Boolean and                        | `AND %rN, %rN -> %rN`
//! `OR`       | Boolean or                         | `OR %rN, %rN -> %rN`
//! `MOVL`…`ORL` | Local-register variants          | same shapes over `%lN`
//! `JMP`      | Jump                               | `JMP target`
//! `JZ`       | Jump if zero                       | `JZ %rN, target`
//! `JNZ`      | Jump if not zero                   | `JNZ %rN, target`
//! `JL`       | Jump if negative                   | `JL %rN, target`
//! `JG`       | Jump if positive                   | `JG %rN, target`
//! `JLZ`…`JLG` | Local-condition variants          | `JLZ %lN, target`
//! `CALL`     | Call function                      | `CALL name[, argc]`
//! `RET`      | Return (optional value)            | `RET [%lN]`
//! `ENTER`    | Push a bare frame                  | `ENTER argc, localc`
//! `LEAVE`    | Pop the current frame              | `LEAVE`
//! `NEWARR`   | Allocate array                     | `NEWARR len -> %rN`
//! `LOADARR`  | Read element                       | `LOADARR %rN, %rN -> %rN`
//! `STOREARR` | Write element                      | `STOREARR %rN, %rN, %rN`
//! `LEN`      | Array length                       | `LEN %rN -> %rN`
//! `LOADP`    | Stage parameter from register      | `LOADP %pN, %rN`
//! `LOADLP`   | Stage parameter from local         | `LOADLP %pN, %lN`
//! `LOADARG`  | Read incoming argument             | `LOADARG %aN -> %lN`
//! `OWN`      | Owned copy                         | `OWN %rN, %rN`
//! `MOVE`     | Relocate, clearing the source      | `MOVE %rN, %rN`
//! `VIEW`     | Shared view                        | `VIEW %rN, %rN`
//! `EDIT`     | Exclusive promotion                | `EDIT %rN, %rN`
//! `CLONE`    | Deep copy                          | `CLONE %rN, %rN`
//! `DROP`     | Decrement refcount                 | `DROP %rN`
//! `RAIIDROP` | Scope-exit drop                    | `RAIIDROP %rN`
//! `FREE`     | Alias of `RAIIDROP`                | `FREE %rN`
//! `PRINT`    | Print a value                      | `PRINT %rN` (any bank)
//! `NOP`      | Do nothing                         | `NOP`
//! `HALT`     | Stop execution                     | `HALT`

mod error;
mod instructions;
pub mod linker;


pub use crate::error::{Error, ErrorKind};

use ovm::unit::{Function, ObjectUnit, UnresolvedRef};

/// Cuts a trailing `;` comment, ignoring semicolons inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (pos, byte) in line.bytes().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b';' if !in_string => return &line[..pos],
            _ => {}
        }
    }
    line
}

/// First pass of the pipeline: parses the source into an
/// [`ObjectUnit`](../ovm/unit/struct.ObjectUnit.html).
///
/// Every jump or call with a symbolic target is recorded in the unit's
/// unresolved list — including targets defined in the same source — so the
/// linker can rebase instruction indices uniformly before binding them.
pub fn assemble(source: &str) -> Result<ObjectUnit, Error> {
    let mut unit = ObjectUnit::default();
    let mut current: Option<String> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        let word = line.split_whitespace().next().unwrap_or("");
        let rest = line[word.len()..].trim();

        match word {
            ".func" => {
                if rest.is_empty() {
                    return Err(Error {
                        line: line_no,
                        kind: ErrorKind::BadDirective(".func".to_owned()),
                    });
                }
                if unit.funcs.contains_key(rest) {
                    return Err(Error {
                        line: line_no,
                        kind: ErrorKind::DuplicateFunction(rest.to_owned()),
                    });
                }
                let func = Function {
                    name: rest.to_owned(),
                    pc_start: unit.code.len(),
                    pc_end: unit.code.len(),
                    ..Function::default()
                };
                unit.funcs.insert(rest.to_owned(), func);
                current = Some(rest.to_owned());
                continue;
            }

            ".label" => {
                if rest.is_empty() {
                    return Err(Error {
                        line: line_no,
                        kind: ErrorKind::BadDirective(".label".to_owned()),
                    });
                }
                unit.labels.insert(rest.to_owned(), unit.code.len());
                continue;
            }

            ".code" => {
                let pc = unit.code.len();
                let func = current_func(&mut unit, &current, ".code", line_no)?;
                func.pc_start = pc;
                let name = func.name.clone();
                unit.labels.insert(name, pc);
                continue;
            }

            ".params" => {
                let count = parse_count(rest, line_no)?;
                current_func(&mut unit, &current, ".params", line_no)?.params = count;
                continue;
            }

            ".locals" => {
                let count = parse_count(rest, line_no)?;
                current_func(&mut unit, &current, ".locals", line_no)?.locals = count;
                continue;
            }

            ".end" => {
                let pc = unit.code.len();
                current_func(&mut unit, &current, ".end", line_no)?.pc_end = pc;
                current = None;
                continue;
            }

            "var" => {
                let func = current_func(&mut unit, &current, "var", line_no)?;
                let index = func.local_names.len() as u16;
                if index >= func.locals {
                    return Err(Error {
                        line: line_no,
                        kind: ErrorKind::TooManyLocals(rest.to_owned()),
                    });
                }
                func.local_names.insert(rest.to_owned(), index);
                continue;
            }

            "param" => {
                let func = current_func(&mut unit, &current, "param", line_no)?;
                let index = func.param_names.len() as u16;
                if index >= func.params {
                    return Err(Error {
                        line: line_no,
                        kind: ErrorKind::TooManyParams(rest.to_owned()),
                    });
                }
                func.param_names.insert(rest.to_owned(), index);
                continue;
            }

            word if word.starts_with('.') => {
                return Err(Error {
                    line: line_no,
                    kind: ErrorKind::BadDirective(word.to_owned()),
                });
            }

            _ => {}
        }

        let scope = match &current {
            Some(name) => unit.funcs.get(name),
            None => None,
        };
        let parsed = instructions::parse_instruction(line, &mut unit.pool, scope)
            .map_err(|kind| Error { line: line_no, kind })?;

        unit.code.push(parsed.inst);
        if let Some(symbol) = parsed.symbol {
            unit.unresolved.push(UnresolvedRef {
                inst_index: unit.code.len() - 1,
                symbol,
                opcode: parsed.inst.opcode,
                target_in_b: parsed.inst.opcode.target_in_b(),
            });
        }
    }

    // a source that ends inside a function gets its pc_end closed off
    if let Some(name) = current {
        let pc = unit.code.len();
        if let Some(func) = unit.funcs.get_mut(&name) {
            func.pc_end = pc;
        }
    }

    Ok(unit)
}

fn parse_count(token: &str, line: usize) -> Result<u16, Error> {
    token.parse::<u16>().map_err(|_| Error {
        line,
        kind: ErrorKind::BadCount(token.to_owned()),
    })
}

fn current_func<'u>(
    unit: &'u mut ObjectUnit,
    current: &Option<String>,
    directive: &str,
    line: usize,
) -> Result<&'u mut Function, Error> {
    match current {
        Some(name) => Ok(unit
            .funcs
            .get_mut(name)
            .expect("current function is always in the table")),
        None => Err(Error {
            line,
            kind: ErrorKind::DirectiveOutsideFunction(directive.to_owned()),
        }),
    }
}
