//! Infix expression compiler: syntax check, normalisation, and shunting-yard
//! lowering to RPN bytecode with late-bound variable slots.
//!
//! The three pipeline stages mirror the source compiler's `SyntaxChecker`,
//! `FormulaNormalizer`, and `ShuntingYard` passes, collapsed here into one
//! crate since none of the three needs to be swapped independently of the
//! others in this engine.

mod normalize;
mod shunting_yard;
mod syntax_check;

pub use normalize::normalize;
pub use syntax_check::{SyntaxError, check_syntax};

use std::fmt;
use thiserror::Error;

/// One bytecode opcode. `PushConst` carries its operand inline in the
/// enclosing [`RpnToken::value`]; every other variant ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    PushX,
    PushY,
    PushT,
    PushConst,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Abs,
    Sign,
    Sqrt,
    /// `arg_count` values are popped (in reverse push order) and dispatched
    /// to the named custom function (`length`, `area`, `distance`,
    /// `extractX`, `extractY`, ...).
    CustomFunction { name: CustomFn, arg_count: u8 },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomFn {
    Length,
    Area,
    Distance,
    ExtractX,
    ExtractY,
}

impl CustomFn {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "length" => Some(Self::Length),
            "area" => Some(Self::Area),
            "distance" => Some(Self::Distance),
            "extractx" => Some(Self::ExtractX),
            "extracty" => Some(Self::ExtractY),
            _ => None,
        }
    }
}

/// A single slot of compiled bytecode: an opcode plus the constant operand
/// used only by `PushConst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpnToken {
    pub op: OpCode,
    pub value: f64,
}

impl RpnToken {
    pub fn op(op: OpCode) -> Self {
        Self { op, value: 0.0 }
    }
    pub fn constant(value: f64) -> Self {
        Self {
            op: OpCode::PushConst,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Resolved to a single node's scalar result by name.
    Variable,
    /// Resolved to a custom function's argument list by name (geometric
    /// objects passed to `length`/`area`/... rather than scalar values).
    Function,
}

/// Tells the caller which bytecode slot to rewrite, and from where, before
/// each frame's evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSlot {
    pub rpn_index: usize,
    pub kind: BindingKind,
    pub source_name: String,
    pub func_type: Option<CustomFn>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    pub bytecode: Vec<RpnToken>,
    pub bindings: Vec<BindingSlot>,
}

/// Compile-time error categories, each surfaced with the offending byte
/// offset into the (pre-normalisation) input string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("empty expression")]
    Empty,
    #[error("unbalanced parentheses at {0}")]
    UnbalancedParens(usize),
    #[error("missing operand at {0}")]
    MissingOperand(usize),
    #[error("bad function call at {0}")]
    BadFunctionCall(usize),
    #[error("wrong argument count for `{name}` at {pos}")]
    WrongArgCount { name: String, pos: usize },
    #[error("bad argument type at {0}")]
    BadArgType(usize),
    #[error("bad number format at {0}")]
    BadNumberFormat(usize),
    #[error("misplaced comma at {0}")]
    MisplacedComma(usize),
    #[error("macro mix violation at {0}")]
    MacroMixViolation(usize),
    #[error("unknown token at {0}")]
    UnknownToken(usize),
    #[error("illegal identifier at {0}")]
    IllegalIdentifier(usize),
}

impl fmt::Display for CustomFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CustomFn::Length => "length",
            CustomFn::Area => "area",
            CustomFn::Distance => "distance",
            CustomFn::ExtractX => "extractX",
            CustomFn::ExtractY => "extractY",
        };
        f.write_str(s)
    }
}

/// Run the full pipeline: syntax check, normalise, shunting-yard lowering.
pub fn compile(input: &str) -> Result<CompiledExpr, CompileError> {
    if let Err(e) = check_syntax(input) {
        return Err(e.into());
    }
    let normalized = normalize(input);
    tracing::trace!(target: "compiler.parse", input, %normalized, "normalized expression");
    shunting_yard::compile_infix_to_rpn(&normalized)
}

impl From<SyntaxError> for CompileError {
    fn from(e: SyntaxError) -> Self {
        match e {
            SyntaxError::Empty => CompileError::Empty,
            SyntaxError::UnbalancedParens(p) => CompileError::UnbalancedParens(p),
            SyntaxError::BadNumberFormat(p) => CompileError::BadNumberFormat(p),
            SyntaxError::IllegalIdentifier(p) => CompileError::IllegalIdentifier(p),
            SyntaxError::MisplacedComma(p) => CompileError::MisplacedComma(p),
            SyntaxError::UnknownToken(p) => CompileError::UnknownToken(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_addition() {
        let c = compile("1+2").unwrap();
        assert_eq!(
            c.bytecode,
            vec![
                RpnToken::constant(1.0),
                RpnToken::constant(2.0),
                RpnToken::op(OpCode::Add),
            ]
        );
    }

    #[test]
    fn precedence_respects_mul_over_add() {
        let c = compile("1+2*3").unwrap();
        assert_eq!(
            c.bytecode,
            vec![
                RpnToken::constant(1.0),
                RpnToken::constant(2.0),
                RpnToken::constant(3.0),
                RpnToken::op(OpCode::Mul),
                RpnToken::op(OpCode::Add),
            ]
        );
    }

    #[test]
    fn pow_is_right_associative() {
        // 2^3^2 == 2^(3^2) == 2^9, so RPN must be: 2 3 2 ^ ^
        let c = compile("2^3^2").unwrap();
        assert_eq!(
            c.bytecode,
            vec![
                RpnToken::constant(2.0),
                RpnToken::constant(3.0),
                RpnToken::constant(2.0),
                RpnToken::op(OpCode::Pow),
                RpnToken::op(OpCode::Pow),
            ]
        );
    }

    #[test]
    fn variable_emits_binding_slot() {
        let c = compile("x+A").unwrap();
        assert_eq!(c.bindings.len(), 1);
        assert_eq!(c.bindings[0].source_name, "A");
        assert_eq!(c.bindings[0].kind, BindingKind::Variable);
    }

    #[test]
    fn custom_function_emits_opcode_with_args() {
        let c = compile("length(AB)").unwrap();
        assert!(matches!(
            c.bytecode.last().unwrap().op,
            OpCode::CustomFunction {
                name: CustomFn::Length,
                ..
            }
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(compile(""), Err(CompileError::Empty));
    }

    #[test]
    fn unbalanced_parens_rejected() {
        assert!(matches!(
            compile("sin(1"),
            Err(CompileError::UnbalancedParens(_))
        ));
    }
}
