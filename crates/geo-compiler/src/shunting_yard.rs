//! Shunting-yard: infix token stream -> RPN bytecode with binding slots.
//!
//! Mirrors the source compiler's operator-pop loop, with one deliberate
//! correction: `^` pops same-precedence operators only with `prec > p`
//! (strict), everything else with `prec >= p`, so that `^` binds
//! right-associatively while `+ - * /` remain left-associative.

use crate::{
    BindingKind, BindingSlot, CompileError, CompiledExpr, CustomFn, OpCode, RpnToken,
};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(char),
    UnaryMinus,
    LParen,
    RParen,
    Comma,
}

fn precedence(op: char) -> u8 {
    match op {
        '^' => 4,
        '*' | '/' => 3,
        '+' | '-' => 2,
        _ => 0,
    }
}

const UNARY_PRECEDENCE: u8 = 5;

fn math_builtin(name: &str) -> Option<OpCode> {
    match name.to_ascii_lowercase().as_str() {
        "sin" => Some(OpCode::Sin),
        "cos" => Some(OpCode::Cos),
        "tan" => Some(OpCode::Tan),
        "exp" => Some(OpCode::Exp),
        "ln" => Some(OpCode::Ln),
        "abs" => Some(OpCode::Abs),
        "sqrt" => Some(OpCode::Sqrt),
        "sign" => Some(OpCode::Sign),
        _ => None,
    }
}

fn tokenize(input: &str) -> Result<Vec<Tok>, CompileError> {
    let chars: Vec<char> = input.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    let mut expect_operand = true;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '(' => {
                toks.push(Tok::LParen);
                expect_operand = true;
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                expect_operand = false;
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                expect_operand = true;
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' => {
                if c == '-' && expect_operand {
                    toks.push(Tok::UnaryMinus);
                } else {
                    toks.push(Tok::Op(c));
                }
                expect_operand = true;
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let s: String = chars[start..i].iter().collect();
                let v: f64 = s
                    .parse()
                    .map_err(|_| CompileError::BadNumberFormat(start))?;
                toks.push(Tok::Num(v));
                expect_operand = false;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let s: String = chars[start..i].iter().collect();
                toks.push(Tok::Ident(s));
                expect_operand = false;
            }
            _ => return Err(CompileError::UnknownToken(i)),
        }
    }
    Ok(toks)
}

pub(crate) fn compile_infix_to_rpn(input: &str) -> Result<CompiledExpr, CompileError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }

    let mut output: Vec<RpnToken> = Vec::new();
    let mut bindings: Vec<BindingSlot> = Vec::new();
    #[derive(Clone, Copy, PartialEq)]
    enum StackItem {
        Op(char),
        UnaryMinus,
        LParen,
        /// Function marker recording whether it is a math builtin (opcode
        /// baked in) or a custom function (name resolved at pop time).
        Func,
    }
    let mut op_stack: Vec<StackItem> = Vec::new();
    let mut func_name_stack: Vec<String> = Vec::new();
    // Number of arguments seen so far for the function call currently atop
    // `func_name_stack`, one counter per nested call.
    let mut arg_count_stack: Vec<u8> = Vec::new();

    fn pop_operator(
        item: StackItem,
        output: &mut Vec<RpnToken>,
        func_name_stack: &mut Vec<String>,
        arg_count_stack: &mut Vec<u8>,
    ) -> Result<(), CompileError> {
        match item {
            StackItem::Op('+') => output.push(RpnToken::op(OpCode::Add)),
            StackItem::Op('-') => output.push(RpnToken::op(OpCode::Sub)),
            StackItem::Op('*') => output.push(RpnToken::op(OpCode::Mul)),
            StackItem::Op('/') => output.push(RpnToken::op(OpCode::Div)),
            StackItem::Op('^') => output.push(RpnToken::op(OpCode::Pow)),
            StackItem::UnaryMinus => {
                // -e is compiled as (0 - e): push a zero constant ahead of
                // the already-emitted operand is not possible post-hoc, so
                // instead emit a dedicated negate via Sub with swapped
                // operands is also not possible; use multiply by -1.
                output.push(RpnToken::constant(-1.0));
                output.push(RpnToken::op(OpCode::Mul));
            }
            StackItem::Func => {
                let name = func_name_stack.pop().expect("function name pushed");
                let argc = arg_count_stack.pop().unwrap_or(1);
                if let Some(op) = math_builtin(&name) {
                    output.push(RpnToken::op(op));
                } else if let Some(cf) = CustomFn::from_name(&name) {
                    output.push(RpnToken::op(OpCode::CustomFunction {
                        name: cf,
                        arg_count: argc,
                    }));
                } else {
                    return Err(CompileError::BadFunctionCall(0));
                }
            }
            StackItem::Op(_) | StackItem::LParen => unreachable!(),
        }
        Ok(())
    }

    let mut idx = 0usize;
    while idx < tokens.len() {
        match &tokens[idx] {
            Tok::Num(v) => output.push(RpnToken::constant(*v)),
            Tok::Ident(name) => {
                // Function call if followed by '('.
                if matches!(tokens.get(idx + 1), Some(Tok::LParen)) {
                    func_name_stack.push(name.clone());
                    arg_count_stack.push(1);
                    op_stack.push(StackItem::Func);
                    op_stack.push(StackItem::LParen);
                    idx += 1; // consume the '(' here too
                } else {
                    // Plain identifier: emit PUSH_CONST placeholder with a
                    // Variable binding slot resolved later by name.
                    let slot_index = output.len();
                    output.push(RpnToken::constant(0.0));
                    bindings.push(BindingSlot {
                        rpn_index: slot_index,
                        kind: BindingKind::Variable,
                        source_name: name.clone(),
                        func_type: None,
                        args: Vec::new(),
                    });
                }
            }
            Tok::Comma => {
                if let Some(c) = arg_count_stack.last_mut() {
                    *c += 1;
                }
                while let Some(top) = op_stack.last().copied() {
                    if top == StackItem::LParen {
                        break;
                    }
                    op_stack.pop();
                    pop_operator(top, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
                }
            }
            Tok::Op(c) => {
                let p = precedence(*c);
                while let Some(top) = op_stack.last().copied() {
                    let top_prec = match top {
                        StackItem::Op(o) => precedence(o),
                        StackItem::UnaryMinus => UNARY_PRECEDENCE,
                        StackItem::LParen | StackItem::Func => break,
                    };
                    let should_pop = if *c == '^' {
                        top_prec > p
                    } else {
                        top_prec >= p
                    };
                    if !should_pop {
                        break;
                    }
                    op_stack.pop();
                    pop_operator(top, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
                }
                op_stack.push(StackItem::Op(*c));
            }
            Tok::UnaryMinus => {
                while let Some(top) = op_stack.last().copied() {
                    let top_prec = match top {
                        StackItem::Op(o) => precedence(o),
                        StackItem::UnaryMinus => UNARY_PRECEDENCE,
                        StackItem::LParen | StackItem::Func => break,
                    };
                    if top_prec < UNARY_PRECEDENCE {
                        break;
                    }
                    op_stack.pop();
                    pop_operator(top, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
                }
                op_stack.push(StackItem::UnaryMinus);
            }
            Tok::LParen => op_stack.push(StackItem::LParen),
            Tok::RParen => {
                let mut found_lparen = false;
                while let Some(top) = op_stack.pop() {
                    if top == StackItem::LParen {
                        found_lparen = true;
                        break;
                    }
                    pop_operator(top, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
                }
                if !found_lparen {
                    return Err(CompileError::UnbalancedParens(idx));
                }
                // If a function marker sits beneath this paren group, pop it.
                if matches!(op_stack.last(), Some(StackItem::Func)) {
                    let f = op_stack.pop().unwrap();
                    pop_operator(f, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
                }
            }
        }
        idx += 1;
    }

    while let Some(top) = op_stack.pop() {
        if top == StackItem::LParen {
            return Err(CompileError::UnbalancedParens(tokens.len()));
        }
        pop_operator(top, &mut output, &mut func_name_stack, &mut arg_count_stack)?;
    }

    output.push(RpnToken::op(OpCode::Stop));
    // Drop the trailing Stop before returning: evaluators walk the slice
    // until exhausted rather than looking for a sentinel, but keeping one
    // bytecode shape lets a future streaming evaluator rely on it.
    output.pop();

    Ok(CompiledExpr {
        bytecode: output,
        bindings,
    })
}
