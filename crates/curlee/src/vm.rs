//! The bytecode virtual machine.
//!
//! A stack machine with an operand stack, a locals array sized by the
//! chunk's `max_locals`, and a call-return stack of saved instruction
//! pointers. Every dispatched instruction costs one unit of fuel; arithmetic
//! is checked; side-effecting opcodes are gated on the capability set
//! granted at construction. Errors carry the span of the faulting opcode so
//! diagnostics can point back into the source.

use smallvec::SmallVec;

use crate::bytecode::chunk::{Chunk, Value};
use crate::bytecode::op::OpCode;
use crate::capability::{CAP_PYTHON_FFI, CAP_STDOUT, CapabilitySet};
use crate::interop::InteropBridge;
use crate::io::PrintSink;
use crate::source::Span;

/// Fuel value meaning "no metering".
pub const UNLIMITED_FUEL: u64 = u64::MAX;

/// A runtime failure: what went wrong and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    pub message: String,
    pub span: Option<Span>,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for VmError {}

/// The virtual machine. Construction fixes the capability set for every
/// subsequent run.
#[derive(Debug, Default)]
pub struct Vm {
    capabilities: CapabilitySet,
}

impl Vm {
    #[must_use]
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self { capabilities }
    }

    /// Executes `chunk` until a `Return`, an error, or fuel exhaustion.
    pub fn run(
        &self,
        chunk: &Chunk,
        fuel: u64,
        sink: &mut dyn PrintSink,
        bridge: &mut dyn InteropBridge,
    ) -> Result<Value, VmError> {
        Execution {
            vm: self,
            chunk,
            fuel,
            stack: Vec::new(),
            locals: vec![Value::Unit; chunk.max_locals],
            call_stack: SmallVec::new(),
            sink,
            bridge,
        }
        .run()
    }
}

struct Execution<'r> {
    vm: &'r Vm,
    chunk: &'r Chunk,
    fuel: u64,
    stack: Vec<Value>,
    locals: Vec<Value>,
    call_stack: SmallVec<[usize; 8]>,
    sink: &'r mut dyn PrintSink,
    bridge: &'r mut dyn InteropBridge,
}

impl Execution<'_> {
    fn span_at(&self, op_index: usize) -> Option<Span> {
        self.chunk.spans.get(op_index).copied()
    }

    fn fail(&self, op_index: usize, message: impl Into<String>) -> VmError {
        VmError {
            message: message.into(),
            span: self.span_at(op_index),
        }
    }

    fn pop(&mut self, op_index: usize) -> Result<Value, VmError> {
        self.stack
            .pop()
            .ok_or_else(|| self.fail(op_index, "stack underflow"))
    }

    fn pop_int(&mut self, op_index: usize, op_name: &str) -> Result<i64, VmError> {
        match self.pop(op_index)? {
            Value::Int(v) => Ok(v),
            _ => Err(self.fail(op_index, format!("{op_name} expects Int"))),
        }
    }

    /// Reads the u16 operand following the opcode at `op_index`.
    fn read_operand(&self, ip: &mut usize, op_index: usize) -> Result<u16, VmError> {
        if *ip + 1 >= self.chunk.code.len() {
            return Err(self.fail(op_index, "truncated operand"));
        }
        let lo = u16::from(self.chunk.code[*ip]);
        let hi = u16::from(self.chunk.code[*ip + 1]);
        *ip += 2;
        Ok(lo | (hi << 8))
    }

    fn checked_jump_target(&self, target: u16, op_index: usize) -> Result<usize, VmError> {
        let target = target as usize;
        if target >= self.chunk.code.len() {
            return Err(self.fail(op_index, "jump target out of range"));
        }
        Ok(target)
    }

    fn run(mut self) -> Result<Value, VmError> {
        let mut ip = 0usize;
        while ip < self.chunk.code.len() {
            if self.fuel == 0 {
                return Err(VmError {
                    message: "out of fuel".to_string(),
                    span: self.span_at(ip),
                });
            }
            self.fuel -= 1;

            let op_index = ip;
            let op_byte = self.chunk.code[ip];
            ip += 1;
            let Some(op) = OpCode::from_repr(op_byte) else {
                return Err(self.fail(op_index, "unknown opcode"));
            };

            match op {
                OpCode::Constant => {
                    let index = self.read_operand(&mut ip, op_index)? as usize;
                    let Some(value) = self.chunk.constants.get(index) else {
                        return Err(self.fail(op_index, "constant index out of range"));
                    };
                    self.stack.push(value.clone());
                }
                OpCode::LoadLocal => {
                    let index = self.read_operand(&mut ip, op_index)? as usize;
                    let Some(value) = self.locals.get(index) else {
                        return Err(self.fail(op_index, "local index out of range"));
                    };
                    self.stack.push(value.clone());
                }
                OpCode::StoreLocal => {
                    let index = self.read_operand(&mut ip, op_index)? as usize;
                    let value = self.pop(op_index)?;
                    let Some(slot) = self.locals.get_mut(index) else {
                        return Err(self.fail(op_index, "local index out of range"));
                    };
                    *slot = value;
                }
                OpCode::Add => {
                    let rhs = self.pop(op_index)?;
                    let lhs = self.pop(op_index)?;
                    let result = match (lhs, rhs) {
                        (Value::Int(l), Value::Int(r)) => match l.checked_add(r) {
                            Some(v) => Value::Int(v),
                            None => return Err(self.fail(op_index, "integer overflow")),
                        },
                        (Value::String(l), Value::String(r)) => Value::String(l + &r),
                        _ => return Err(self.fail(op_index, "add expects Int or String operands")),
                    };
                    self.stack.push(result);
                }
                OpCode::Sub => {
                    let rhs = self.pop_int(op_index, "sub")?;
                    let lhs = self.pop_int(op_index, "sub")?;
                    match lhs.checked_sub(rhs) {
                        Some(v) => self.stack.push(Value::Int(v)),
                        None => return Err(self.fail(op_index, "integer overflow")),
                    }
                }
                OpCode::Mul => {
                    let rhs = self.pop_int(op_index, "mul")?;
                    let lhs = self.pop_int(op_index, "mul")?;
                    match lhs.checked_mul(rhs) {
                        Some(v) => self.stack.push(Value::Int(v)),
                        None => return Err(self.fail(op_index, "integer overflow")),
                    }
                }
                OpCode::Div => {
                    let rhs = self.pop_int(op_index, "div")?;
                    let lhs = self.pop_int(op_index, "div")?;
                    if rhs == 0 {
                        return Err(self.fail(op_index, "division by zero"));
                    }
                    match lhs.checked_div(rhs) {
                        Some(v) => self.stack.push(Value::Int(v)),
                        None => return Err(self.fail(op_index, "integer overflow")),
                    }
                }
                OpCode::Neg => {
                    let value = self.pop_int(op_index, "neg")?;
                    match value.checked_neg() {
                        Some(v) => self.stack.push(Value::Int(v)),
                        None => return Err(self.fail(op_index, "integer overflow")),
                    }
                }
                OpCode::Not => {
                    let value = self.pop(op_index)?;
                    let Value::Bool(b) = value else {
                        return Err(self.fail(op_index, "not expects Bool"));
                    };
                    self.stack.push(Value::Bool(!b));
                }
                OpCode::Equal | OpCode::NotEqual => {
                    let rhs = self.pop(op_index)?;
                    let lhs = self.pop(op_index)?;
                    if lhs.kind_name() != rhs.kind_name() {
                        return Err(self.fail(op_index, "equality expects matching types"));
                    }
                    let equal = lhs == rhs;
                    self.stack
                        .push(Value::Bool(if op == OpCode::Equal { equal } else { !equal }));
                }
                OpCode::Less | OpCode::LessEqual | OpCode::Greater | OpCode::GreaterEqual => {
                    let rhs = self.pop_int(op_index, "comparison")?;
                    let lhs = self.pop_int(op_index, "comparison")?;
                    let result = match op {
                        OpCode::Less => lhs < rhs,
                        OpCode::LessEqual => lhs <= rhs,
                        OpCode::Greater => lhs > rhs,
                        _ => lhs >= rhs,
                    };
                    self.stack.push(Value::Bool(result));
                }
                OpCode::Pop => {
                    self.pop(op_index)?;
                }
                OpCode::Return => {
                    let result = self
                        .stack
                        .pop()
                        .ok_or_else(|| self.fail(op_index, "missing return"))?;
                    return Ok(result);
                }
                OpCode::Jump => {
                    let target = self.read_operand(&mut ip, op_index)?;
                    ip = self.checked_jump_target(target, op_index)?;
                }
                OpCode::JumpIfFalse => {
                    let target = self.read_operand(&mut ip, op_index)?;
                    let cond = self.pop(op_index)?;
                    let Value::Bool(cond) = cond else {
                        return Err(self.fail(op_index, "jump-if-false expects Bool"));
                    };
                    if !cond {
                        ip = self.checked_jump_target(target, op_index)?;
                    }
                }
                OpCode::Call => {
                    let target = self.read_operand(&mut ip, op_index)?;
                    let target = self.checked_jump_target(target, op_index)?;
                    self.call_stack.push(ip);
                    ip = target;
                }
                OpCode::Ret => {
                    let Some(saved) = self.call_stack.pop() else {
                        return Err(self.fail(op_index, "return with empty call stack"));
                    };
                    ip = saved;
                }
                OpCode::Print => {
                    let value = self.pop(op_index)?;
                    if !self.vm.capabilities.contains(CAP_STDOUT) {
                        return Err(self.fail(op_index, "missing capability io.stdout"));
                    }
                    match &value {
                        Value::Int(_) | Value::Bool(_) | Value::String(_) => {
                            self.sink.print_line(&value.to_string());
                        }
                        Value::Unit => {
                            return Err(self.fail(op_index, "print expects Int, Bool, or String"));
                        }
                    }
                    self.stack.push(Value::Unit);
                }
                OpCode::PythonCall => {
                    if !self.vm.capabilities.contains(CAP_PYTHON_FFI) {
                        return Err(self.fail(op_index, "missing capability python.ffi"));
                    }
                    if let Err(message) = self.bridge.handshake() {
                        return Err(self.fail(op_index, message));
                    }
                    self.stack.push(Value::Unit);
                }
            }
        }

        Err(VmError {
            message: "no return".to_string(),
            span: None,
        })
    }
}
