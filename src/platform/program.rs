//! Signature program instruction set and evaluator
//!
//! A [`CipherProgram`] is the translated form of the client script's
//! signature function: an ordered list of character-array operations that
//! ends by joining the array back into a string.

use crate::error::CipherError;
use std::collections::HashMap;
use std::fmt;

/// One operation over the signature character array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Exchange element 0 with element `n % len`
    Swap(usize),
    /// Drop the first `n` elements
    Slice(usize),
    /// Remove `count` elements starting at `index`
    Splice { index: usize, count: usize },
    Reverse,
    /// Join the array back into a string; ends the program
    Join,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Swap(n) => write!(f, "swap({})", n),
            Operation::Slice(n) => write!(f, "slice({})", n),
            Operation::Splice { index, count } => write!(f, "splice({},{})", index, count),
            Operation::Reverse => write!(f, "reverse()"),
            Operation::Join => write!(f, "join()"),
        }
    }
}

/// Helper function shape; the numeric argument comes from each call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperOp {
    Swap,
    Slice,
    /// `a.splice(index, b)`
    Splice { index: usize },
    Reverse,
}

impl HelperOp {
    /// Bind the call-site argument
    pub fn bind(self, arg: usize) -> Operation {
        match self {
            HelperOp::Swap => Operation::Swap(arg),
            HelperOp::Slice => Operation::Slice(arg),
            HelperOp::Splice { index } => Operation::Splice { index, count: arg },
            HelperOp::Reverse => Operation::Reverse,
        }
    }
}

/// A step of the entry function before helper resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Builtin(Operation),
    Call { helper: String, arg: usize },
}

/// Fully resolved signature program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherProgram {
    entry: String,
    operations: Vec<Operation>,
    helpers: HashMap<String, HelperOp>,
}

impl CipherProgram {
    /// Resolve every helper call of `steps` against `helpers`.
    ///
    /// A call naming a helper missing from the table fails with
    /// [`CipherError::HelperNotFound`].
    pub fn new(
        entry: impl Into<String>,
        steps: Vec<Step>,
        helpers: HashMap<String, HelperOp>,
    ) -> Result<Self, CipherError> {
        let operations = steps
            .into_iter()
            .map(|step| match step {
                Step::Builtin(op) => Ok(op),
                Step::Call { helper, arg } => helpers
                    .get(&helper)
                    .map(|op| op.bind(arg))
                    .ok_or(CipherError::HelperNotFound(helper)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entry: entry.into(),
            operations,
            helpers,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn helpers(&self) -> &HashMap<String, HelperOp> {
        &self.helpers
    }

    /// Apply the program to `token`
    pub fn evaluate(&self, token: &str) -> Result<String, CipherError> {
        let mut chars: Vec<char> = token.chars().collect();

        for op in &self.operations {
            match *op {
                Operation::Swap(n) => {
                    if chars.is_empty() {
                        return Err(CipherError::EvaluationFailed(
                            "swap on empty signature".to_string(),
                        ));
                    }
                    let target = n % chars.len();
                    chars.swap(0, target);
                }
                Operation::Slice(n) => {
                    let n = n.min(chars.len());
                    chars.drain(..n);
                }
                Operation::Splice { index, count } => {
                    let start = index.min(chars.len());
                    let end = start.saturating_add(count).min(chars.len());
                    chars.drain(start..end);
                }
                Operation::Reverse => chars.reverse(),
                Operation::Join => return Ok(chars.into_iter().collect()),
            }
        }

        Err(CipherError::EvaluationFailed(format!(
            "program '{}' never joins its result",
            self.entry
        )))
    }
}
