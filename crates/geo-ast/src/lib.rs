//! JSON-encoded symbolic expression trees: the wire format bound names and
//! default values in `geo-factory` submit to `geo-dag`, and the format used
//! to snapshot/restore formulas in the undo log.
//!
//! The arena is a flat `Vec<AstNode>` addressed by [`Handle`] (a 32-bit
//! index) rather than a tree of `Rc`/`Box` pointers, so constant folding can
//! rewrite children in place without cloning subtrees.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Constant(f64),
    Symbol(String),
    Rational { num: i64, den: i64 },
    Function { op: String, args: Vec<Handle> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AstError {
    #[error("malformed JSON: {0}")]
    InvalidJson(String),
    #[error("empty array node")]
    EmptyArray,
    #[error("Rational node must have exactly 2 arguments")]
    BadRational,
    #[error("unsupported JSON node shape")]
    UnsupportedNode,
    #[error("object node missing string `num` field")]
    MissingNumField,
}

#[derive(Debug, Clone, Default)]
pub struct Ast {
    arena: Vec<AstNode>,
}

impl Ast {
    pub fn new() -> Self {
        Self { arena: Vec::new() }
    }

    pub fn get(&self, h: Handle) -> &AstNode {
        &self.arena[h.0 as usize]
    }

    fn push(&mut self, node: AstNode) -> Handle {
        self.arena.push(node);
        Handle((self.arena.len() - 1) as u32)
    }

    pub fn constant(&mut self, v: f64) -> Handle {
        self.push(AstNode::Constant(v))
    }

    pub fn symbol(&mut self, name: impl Into<String>) -> Handle {
        self.push(AstNode::Symbol(name.into()))
    }

    pub fn rational(&mut self, num: i64, den: i64) -> Handle {
        self.push(AstNode::Rational { num, den })
    }

    pub fn function(&mut self, op: impl Into<String>, args: Vec<Handle>) -> Handle {
        self.push(AstNode::Function {
            op: op.into(),
            args,
        })
    }

    /// Parse a JSON string into this arena, returning the root handle.
    /// Numbers and strings become `Constant`/`Symbol` leaves; a 3-element
    /// `["Rational", num, den]` array becomes a `Rational`; any other array
    /// `[op, ...args]` becomes a `Function`; an object `{"num": "..."}`
    /// carries a constant whose literal text didn't round-trip cleanly
    /// through JSON's own number type.
    pub fn parse(&mut self, json: &str) -> Result<Handle, AstError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| AstError::InvalidJson(e.to_string()))?;
        self.build(&value)
    }

    fn build(&mut self, value: &Value) -> Result<Handle, AstError> {
        match value {
            Value::Number(n) => {
                let v = n.as_f64().ok_or(AstError::UnsupportedNode)?;
                Ok(self.constant(v))
            }
            Value::String(s) => Ok(self.symbol(s.clone())),
            Value::Object(map) => {
                let num_field = map.get("num").and_then(Value::as_str).ok_or(AstError::MissingNumField)?;
                let v: f64 = num_field
                    .parse()
                    .map_err(|_| AstError::InvalidJson(format!("bad num string `{num_field}`")))?;
                Ok(self.constant(v))
            }
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(AstError::EmptyArray);
                }
                let op = items[0].as_str().ok_or(AstError::UnsupportedNode)?.to_string();
                if op == "Rational" {
                    if items.len() != 3 {
                        return Err(AstError::BadRational);
                    }
                    let num = items[1].as_i64().ok_or(AstError::BadRational)?;
                    let den = items[2].as_i64().ok_or(AstError::BadRational)?;
                    return Ok(self.rational(num, den));
                }
                let mut args = Vec::with_capacity(items.len() - 1);
                for item in &items[1..] {
                    args.push(self.build(item)?);
                }
                Ok(self.function(op, args))
            }
            Value::Bool(_) | Value::Null => Err(AstError::UnsupportedNode),
        }
    }

    /// Serialise the subtree rooted at `root` back to the same JSON shape
    /// [`Ast::parse`] accepts.
    pub fn to_json(&self, root: Handle) -> String {
        self.node_to_value(root).to_string()
    }

    fn node_to_value(&self, h: Handle) -> Value {
        match self.get(h) {
            AstNode::Constant(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AstNode::Symbol(s) => Value::String(s.clone()),
            AstNode::Rational { num, den } => {
                Value::Array(vec![
                    Value::String("Rational".into()),
                    Value::Number((*num).into()),
                    Value::Number((*den).into()),
                ])
            }
            AstNode::Function { op, args } => {
                let mut arr = Vec::with_capacity(args.len() + 1);
                arr.push(Value::String(op.clone()));
                for a in args {
                    arr.push(self.node_to_value(*a));
                }
                Value::Array(arr)
            }
        }
    }

    fn to_numeric(&self, h: Handle) -> Option<f64> {
        match self.get(h) {
            AstNode::Constant(v) => Some(*v),
            AstNode::Rational { num, den } if *den != 0 => Some(*num as f64 / *den as f64),
            _ => None,
        }
    }

    /// Bottom-up constant folding: `Add`/`Multiply` collapse their numeric
    /// arguments into a single trailing constant (dropped entirely when it's
    /// the operator's identity, short-circuiting `Multiply` to zero on any
    /// zero argument), and `Divide`/`Negate`/`Tan` fold fully when every
    /// argument is numeric. Anything else is returned unchanged.
    pub fn constant_fold(&mut self, h: Handle) -> Handle {
        let (op, args) = match self.get(h).clone() {
            AstNode::Function { op, args } => (op, args),
            _ => return h,
        };
        let folded_args: Vec<Handle> = args.into_iter().map(|a| self.constant_fold(a)).collect();

        let numeric_args: Option<Vec<f64>> = folded_args
            .iter()
            .map(|&a| self.to_numeric(a))
            .collect::<Option<Vec<_>>>();

        if let Some(nums) = &numeric_args {
            if !nums.is_empty() {
                match op.as_str() {
                    "Add" => return self.constant(nums.iter().sum()),
                    "Multiply" => return self.constant(nums.iter().product()),
                    "Divide" if nums.len() == 2 && nums[1] != 0.0 => {
                        return self.constant(nums[0] / nums[1]);
                    }
                    "Negate" if nums.len() == 1 => return self.constant(-nums[0]),
                    "Tan" if nums.len() == 1 => return self.constant(nums[0].tan()),
                    _ => {}
                }
            }
        }

        match op.as_str() {
            "Add" => self.fold_associative(folded_args, 0.0, |a, b| a + b),
            "Multiply" => {
                if folded_args
                    .iter()
                    .any(|&a| self.to_numeric(a) == Some(0.0))
                {
                    return self.constant(0.0);
                }
                self.fold_associative(folded_args, 1.0, |a, b| a * b)
            }
            _ => self.function(op, folded_args),
        }
    }

    /// Partially fold an associative op: numeric arguments collapse into one
    /// trailing constant (kept only when it differs from `identity`, unless
    /// it is the only argument remaining), non-numeric arguments pass
    /// through untouched.
    fn fold_associative(
        &mut self,
        args: Vec<Handle>,
        identity: f64,
        combine: fn(f64, f64) -> f64,
    ) -> Handle {
        let op = if identity == 0.0 { "Add" } else { "Multiply" };
        let mut acc = identity;
        let mut non_numeric = Vec::with_capacity(args.len());
        for a in args {
            match self.to_numeric(a) {
                Some(v) => acc = combine(acc, v),
                None => non_numeric.push(a),
            }
        }
        if acc != identity || non_numeric.is_empty() {
            non_numeric.push(self.constant(acc));
        }
        if non_numeric.len() == 1 {
            return non_numeric[0];
        }
        self.function(op, non_numeric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_number_leaf() {
        let mut ast = Ast::new();
        let h = ast.parse("3.5").unwrap();
        assert_eq!(ast.get(h), &AstNode::Constant(3.5));
    }

    #[test]
    fn parses_symbol_leaf() {
        let mut ast = Ast::new();
        let h = ast.parse("\"x\"").unwrap();
        assert_eq!(ast.get(h), &AstNode::Symbol("x".into()));
    }

    #[test]
    fn parses_rational_array() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Rational", 3, 4]"#).unwrap();
        assert_eq!(ast.get(h), &AstNode::Rational { num: 3, den: 4 });
    }

    #[test]
    fn parses_function_array() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Add", 1, 2]"#).unwrap();
        match ast.get(h) {
            AstNode::Function { op, args } => {
                assert_eq!(op, "Add");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_array() {
        let mut ast = Ast::new();
        assert_eq!(ast.parse("[]"), Err(AstError::EmptyArray));
    }

    #[test]
    fn object_num_field_becomes_constant() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"{"num": "2.5"}"#).unwrap();
        assert_eq!(ast.get(h), &AstNode::Constant(2.5));
    }

    #[test]
    fn folds_add_of_all_constants() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Add", 1, 2, 3]"#).unwrap();
        let folded = ast.constant_fold(h);
        assert_eq!(ast.get(folded), &AstNode::Constant(6.0));
    }

    #[test]
    fn folds_multiply_by_zero_to_zero() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Multiply", "x", 0]"#).unwrap();
        let folded = ast.constant_fold(h);
        assert_eq!(ast.get(folded), &AstNode::Constant(0.0));
    }

    #[test]
    fn partial_add_keeps_symbol_and_folds_constants() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Add", "x", 1, 2]"#).unwrap();
        let folded = ast.constant_fold(h);
        match ast.get(folded) {
            AstNode::Function { op, args } => {
                assert_eq!(op, "Add");
                assert_eq!(args.len(), 2);
                assert_eq!(ast.get(args[1]), &AstNode::Constant(3.0));
            }
            other => panic!("expected partially-folded Add, got {other:?}"),
        }
    }

    #[test]
    fn multiply_by_one_identity_is_dropped() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Multiply", "x", 1]"#).unwrap();
        let folded = ast.constant_fold(h);
        assert_eq!(ast.get(folded), &AstNode::Symbol("x".into()));
    }

    #[test]
    fn round_trips_through_json() {
        let mut ast = Ast::new();
        let h = ast.parse(r#"["Add", "x", 2]"#).unwrap();
        let json = ast.to_json(h);
        let mut ast2 = Ast::new();
        let h2 = ast2.parse(&json).unwrap();
        assert_eq!(ast2.to_json(h2), json);
    }
}
