//! RPN bytecode evaluation, specialised over three element types that share
//! one opcode-dispatch loop shape: scalar `f64`, SIMD `f64x4` batches, and
//! `Interval` bounds. The opcode semantics are identical across all three;
//! only the arithmetic primitives differ.
//!
//! `exp`/`ln` saturate rather than overflow or signal, mirroring the source
//! engine's `safe_exp`/`safe_ln`/`check_ln` trio: `exp` clamps to
//! `[1e-270, 1e270]` instead of producing `inf`, and `ln` of a non-positive
//! input returns `-1e270` (the "safe" variant used mid-pipeline) rather than
//! `NaN`, except through [`ln_checked`] which a caller uses when it actually
//! needs to detect the domain violation.

use geo_compiler::{CustomFn, OpCode, RpnToken};
use geo_interval::Interval;
use std::cell::RefCell;
use thiserror::Error;
use wide::f64x4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("wrong argument count for custom function")]
    WrongArgCount,
}

/// The three coordinate inputs every evaluator is parameterised over.
#[derive(Debug, Clone, Copy)]
pub struct Frame<T> {
    pub x: T,
    pub y: T,
    pub t: T,
}

const SATURATION_HIGH: f64 = 1e270;
const SATURATION_LOW: f64 = 1e-270;

fn safe_exp_scalar(x: f64) -> f64 {
    if x >= 1.0 {
        SATURATION_HIGH
    } else if x <= -100.0 {
        SATURATION_LOW
    } else {
        x.exp()
    }
}

fn safe_ln_scalar(x: f64) -> f64 {
    if x > 0.0 { x.ln() } else { -SATURATION_HIGH }
}

fn scalar_sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn lanewise1(a: f64x4, f: fn(f64) -> f64) -> f64x4 {
    let arr = a.to_array();
    f64x4::new([f(arr[0]), f(arr[1]), f(arr[2]), f(arr[3])])
}

fn lanewise2(a: f64x4, b: f64x4, f: fn(f64, f64) -> f64) -> f64x4 {
    let av = a.to_array();
    let bv = b.to_array();
    f64x4::new([
        f(av[0], bv[0]),
        f(av[1], bv[1]),
        f(av[2], bv[2]),
        f(av[3], bv[3]),
    ])
}

/// The domain-checking variant of `ln`, returning `NaN` below the domain
/// instead of saturating. Kept separate from the bytecode's own `Ln` opcode
/// (which uses [`safe_ln_scalar`]) for callers that need to branch on
/// invalidity rather than propagate a sentinel through arithmetic.
pub fn ln_checked(x: f64) -> f64 {
    if x <= 0.0 { f64::NAN } else { x.ln() }
}

thread_local! {
    static SCALAR_STACK: RefCell<Vec<f64>> = RefCell::new(Vec::with_capacity(32));
    static BATCH_STACK: RefCell<Vec<f64x4>> = RefCell::new(Vec::with_capacity(32));
    static INTERVAL_STACK: RefCell<Vec<Interval>> = RefCell::new(Vec::with_capacity(32));
}

fn custom_fn_scalar(name: CustomFn, args: &[f64]) -> Result<f64, EvalError> {
    match (name, args) {
        (CustomFn::Distance, [x1, y1, x2, y2]) | (CustomFn::Length, [x1, y1, x2, y2]) => {
            Ok(((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt())
        }
        (CustomFn::Area, [x1, y1, x2, y2, x3, y3]) => Ok(0.5
            * ((x2 - x1) * (y3 - y1) - (x3 - x1) * (y2 - y1)).abs()),
        (CustomFn::ExtractX, [x, _y]) => Ok(*x),
        (CustomFn::ExtractY, [_x, y]) => Ok(*y),
        _ => Err(EvalError::WrongArgCount),
    }
}

fn custom_fn_interval(name: CustomFn, args: &[Interval]) -> Result<Interval, EvalError> {
    match (name, args) {
        (CustomFn::Distance, [x1, y1, x2, y2]) | (CustomFn::Length, [x1, y1, x2, y2]) => {
            let dx = *x2 - *x1;
            let dy = *y2 - *y1;
            Ok((dx * dx + dy * dy).sqrt())
        }
        (CustomFn::Area, [x1, y1, x2, y2, x3, y3]) => {
            let cross = (*x2 - *x1) * (*y3 - *y1) - (*x3 - *x1) * (*y2 - *y1);
            Ok(cross.abs() * Interval::point(0.5))
        }
        (CustomFn::ExtractX, [x, _y]) => Ok(*x),
        (CustomFn::ExtractY, [_x, y]) => Ok(*y),
        _ => Err(EvalError::WrongArgCount),
    }
}

/// Evaluate compiled bytecode at a single `(x, y, t)` point.
///
/// `bytecode` must already have every [`geo_compiler::BindingSlot`]
/// rewritten to a `PushConst` carrying the bound node's current result —
/// this evaluator does not resolve names, it only executes opcodes.
pub fn eval_scalar(bytecode: &[RpnToken], frame: Frame<f64>) -> Result<f64, EvalError> {
    SCALAR_STACK.with(|cell| {
        let mut stack = cell.borrow_mut();
        stack.clear();
        for tok in bytecode {
            match tok.op {
                OpCode::PushConst => stack.push(tok.value),
                OpCode::PushX => stack.push(frame.x),
                OpCode::PushY => stack.push(frame.y),
                OpCode::PushT => stack.push(frame.t),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        OpCode::Pow => a.powf(b),
                        _ => unreachable!(),
                    });
                }
                OpCode::Sin | OpCode::Cos | OpCode::Tan | OpCode::Exp | OpCode::Ln
                | OpCode::Abs | OpCode::Sign | OpCode::Sqrt => {
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Sin => a.sin(),
                        OpCode::Cos => a.cos(),
                        OpCode::Tan => a.tan(),
                        OpCode::Exp => safe_exp_scalar(a),
                        OpCode::Ln => safe_ln_scalar(a),
                        OpCode::Abs => a.abs(),
                        OpCode::Sign => {
                            if a > 0.0 {
                                1.0
                            } else if a < 0.0 {
                                -1.0
                            } else {
                                0.0
                            }
                        }
                        OpCode::Sqrt => a.sqrt(),
                        _ => unreachable!(),
                    });
                }
                OpCode::CustomFunction { name, arg_count } => {
                    let n = arg_count as usize;
                    if stack.len() < n {
                        return Err(EvalError::StackUnderflow);
                    }
                    let split = stack.len() - n;
                    let args: Vec<f64> = stack.split_off(split);
                    stack.push(custom_fn_scalar(name, &args)?);
                }
                OpCode::Stop => break,
            }
        }
        stack.pop().ok_or(EvalError::StackUnderflow)
    })
}

/// Evaluate four `(x, y, t)` points at once via SIMD lanes.
pub fn eval_batch(bytecode: &[RpnToken], frame: Frame<f64x4>) -> Result<f64x4, EvalError> {
    BATCH_STACK.with(|cell| {
        let mut stack = cell.borrow_mut();
        stack.clear();
        for tok in bytecode {
            match tok.op {
                OpCode::PushConst => stack.push(f64x4::splat(tok.value)),
                OpCode::PushX => stack.push(frame.x),
                OpCode::PushY => stack.push(frame.y),
                OpCode::PushT => stack.push(frame.t),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        OpCode::Pow => lanewise2(a, b, f64::powf),
                        _ => unreachable!(),
                    });
                }
                OpCode::Abs | OpCode::Sqrt => {
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Abs => a.abs(),
                        OpCode::Sqrt => a.sqrt(),
                        _ => unreachable!(),
                    });
                }
                OpCode::Sin | OpCode::Cos | OpCode::Tan | OpCode::Exp | OpCode::Ln
                | OpCode::Sign => {
                    // `wide` covers the arithmetic primitives but not the
                    // transcendental functions, so these fall back to a
                    // per-lane scalar pass rather than a vectorised one.
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Sin => lanewise1(a, f64::sin),
                        OpCode::Cos => lanewise1(a, f64::cos),
                        OpCode::Tan => lanewise1(a, f64::tan),
                        OpCode::Exp => lanewise1(a, safe_exp_scalar),
                        OpCode::Ln => lanewise1(a, safe_ln_scalar),
                        OpCode::Sign => lanewise1(a, scalar_sign),
                        _ => unreachable!(),
                    });
                }
                OpCode::CustomFunction { .. } => {
                    // Custom functions operate on full geometric objects
                    // rather than per-lane scalars; batched sampling never
                    // needs them directly, only the compiled scalar fallback.
                    return Err(EvalError::WrongArgCount);
                }
                OpCode::Stop => break,
            }
        }
        stack.pop().ok_or(EvalError::StackUnderflow)
    })
}

/// Evaluate compiled bytecode over an interval, producing a sound enclosure
/// of the image for use by the implicit-curve quadtree pruner.
pub fn eval_interval(bytecode: &[RpnToken], frame: Frame<Interval>) -> Result<Interval, EvalError> {
    INTERVAL_STACK.with(|cell| {
        let mut stack = cell.borrow_mut();
        stack.clear();
        for tok in bytecode {
            match tok.op {
                OpCode::PushConst => stack.push(Interval::point(tok.value)),
                OpCode::PushX => stack.push(frame.x),
                OpCode::PushY => stack.push(frame.y),
                OpCode::PushT => stack.push(frame.t),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        OpCode::Pow => a.pow(&b),
                        _ => unreachable!(),
                    });
                }
                OpCode::Sin | OpCode::Cos | OpCode::Tan | OpCode::Exp | OpCode::Ln
                | OpCode::Abs | OpCode::Sign | OpCode::Sqrt => {
                    let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
                    stack.push(match tok.op {
                        OpCode::Sin => a.sin(),
                        OpCode::Cos => a.cos(),
                        OpCode::Tan => a.tan(),
                        OpCode::Exp => a.exp(),
                        OpCode::Ln => a.ln(),
                        OpCode::Abs => a.abs(),
                        OpCode::Sign => a.sign(),
                        OpCode::Sqrt => a.sqrt(),
                        _ => unreachable!(),
                    });
                }
                OpCode::CustomFunction { name, arg_count } => {
                    let n = arg_count as usize;
                    if stack.len() < n {
                        return Err(EvalError::StackUnderflow);
                    }
                    let split = stack.len() - n;
                    let args: Vec<Interval> = stack.split_off(split);
                    stack.push(custom_fn_interval(name, &args)?);
                }
                OpCode::Stop => break,
            }
        }
        stack.pop().ok_or(EvalError::StackUnderflow)
    })
}

/// Convenience wrapper used by the implicit-curve pruner: `true` means the
/// interval's image cannot be shown to exclude zero, so the tile survives.
pub fn should_keep(bytecode: &[RpnToken], frame: Frame<Interval>) -> bool {
    match eval_interval(bytecode, frame) {
        Ok(i) => i.contains_zero(),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_compiler::compile;

    fn frame_scalar(x: f64, y: f64) -> Frame<f64> {
        Frame { x, y, t: 0.0 }
    }

    #[test]
    fn evaluates_simple_arithmetic() {
        let c = compile("1+2*3").unwrap();
        let v = eval_scalar(&c.bytecode, frame_scalar(0.0, 0.0)).unwrap();
        assert_eq!(v, 7.0);
    }

    #[test]
    fn evaluates_x_squared() {
        let c = compile("x^2").unwrap();
        let v = eval_scalar(&c.bytecode, frame_scalar(3.0, 0.0)).unwrap();
        assert_eq!(v, 9.0);
    }

    #[test]
    fn exp_saturates_instead_of_overflowing() {
        let c = compile("exp(1000)").unwrap();
        let v = eval_scalar(&c.bytecode, frame_scalar(0.0, 0.0)).unwrap();
        assert_eq!(v, SATURATION_HIGH);
    }

    #[test]
    fn ln_of_nonpositive_saturates_low_not_nan() {
        let c = compile("ln(-5)").unwrap();
        let v = eval_scalar(&c.bytecode, frame_scalar(0.0, 0.0)).unwrap();
        assert_eq!(v, -SATURATION_HIGH);
    }

    #[test]
    fn ln_checked_reports_nan_for_domain_violation() {
        assert!(ln_checked(-1.0).is_nan());
        assert_eq!(ln_checked(1.0), 0.0);
    }

    #[test]
    fn batch_matches_scalar_lanewise() {
        let c = compile("x*x+1").unwrap();
        let xs = [1.0, 2.0, 3.0, 4.0];
        let batch = eval_batch(
            &c.bytecode,
            Frame {
                x: f64x4::new(xs),
                y: f64x4::splat(0.0),
                t: f64x4::splat(0.0),
            },
        )
        .unwrap();
        for (i, &x) in xs.iter().enumerate() {
            let scalar = eval_scalar(&c.bytecode, frame_scalar(x, 0.0)).unwrap();
            assert!((batch.as_array_ref()[i] - scalar).abs() < 1e-12);
        }
    }

    #[test]
    fn interval_eval_contains_scalar_sample() {
        let c = compile("x^2+y^2-4").unwrap();
        let frame = Frame {
            x: Interval::new(-2.5, 2.5),
            y: Interval::new(-2.5, 2.5),
            t: Interval::point(0.0),
        };
        let enclosure = eval_interval(&c.bytecode, frame).unwrap();
        // The circle itself passes through (2,0), which must lie inside the
        // computed enclosure of the surrounding box.
        let sample = eval_scalar(&c.bytecode, frame_scalar(2.0, 0.0)).unwrap();
        assert!(enclosure.contains(sample));
    }

    #[test]
    fn should_keep_rejects_box_far_from_curve() {
        let c = compile("x^2+y^2-4").unwrap();
        let far = Frame {
            x: Interval::new(10.0, 11.0),
            y: Interval::new(10.0, 11.0),
            t: Interval::point(0.0),
        };
        assert!(!should_keep(&c.bytecode, far));
    }

    #[test]
    fn custom_function_distance_matches_euclidean() {
        let c = compile("distance(0,0,3,4)").unwrap();
        let v = eval_scalar(&c.bytecode, frame_scalar(0.0, 0.0)).unwrap();
        assert_eq!(v, 5.0);
    }
}
