//! Compiler IR staged by deferred nodes before JIT lowering.
//!
//! A batch produces a single [`Module`] with one function; the textual form
//! printed by [`Display`](std::fmt::Display) is both the input handed to the
//! lowering toolchain and the content-addressed cache key.

mod builder;
mod ops;
mod print;
mod types;

pub use builder::FuncBuilder;
pub use ops::{EwBinOpId, EwUnyOpId, OpKind, ReduceOpId};
pub use types::{array_type, ArrayType, Dim, DistArrayType, ElemType, Shape, Type};

use serde::{Deserialize, Serialize};

/// Name of the single function each batch compiles.
pub const JIT_FN: &str = "jit_main";

/// SSA value identifier local to one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Single staged instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inst {
    pub result: ValueId,
    pub op: OpKind,
    pub operands: Vec<ValueId>,
    pub ty: Type,
}

/// Function with late-bound signature: arguments are inserted while deferred
/// nodes emit, results are declared at finalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<(ValueId, Type)>,
    pub results: Vec<Type>,
    pub body: Vec<Inst>,
    pub ret: Vec<ValueId>,
    pub(crate) next_value: u32,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            params: Vec::new(),
            results: Vec::new(),
            body: Vec::new(),
            ret: Vec::new(),
            next_value: 0,
        }
    }

    /// Looks up the type of a parameter or instruction result.
    pub fn type_of(&self, value: ValueId) -> Option<&Type> {
        if let Some((_, ty)) = self.params.iter().find(|(id, _)| *id == value) {
            return Some(ty);
        }
        self.body
            .iter()
            .find(|inst| inst.result == value)
            .map(|inst| &inst.ty)
    }
}

/// Compilation unit handed to the JIT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn with_function(function: Function) -> Self {
        Module {
            name: "ddpt".to_string(),
            functions: vec![function],
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
