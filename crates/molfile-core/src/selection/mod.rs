//! Selections: a small language compiled to an AST and evaluated against a
//! frame, returning tuples of atom indices.

mod expr;
mod lexer;
mod parser;

pub use expr::{Ast, CmpOp, MathAst, MathFunction, NumericProperty, StringProperty};

use std::fmt;

use crate::error::{MolError, MolResult};
use crate::frame::Frame;

/// A candidate tuple of distinct atom indices, with arity 1 to 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    indices: [usize; 4],
    size: usize,
}

impl Match {
    pub fn new(indices: &[usize]) -> Self {
        assert!(indices.len() <= 4, "matches contain at most 4 atoms");
        let mut stored = [0; 4];
        stored[..indices.len()].copy_from_slice(indices);
        Self {
            indices: stored,
            size: indices.len(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The atom index in the given tuple slot.
    pub fn index(&self, slot: usize) -> usize {
        assert!(slot < self.size, "out of bounds match slot {slot}");
        self.indices[slot]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices[..self.size]
    }
}

/// A compiled selection: an arity and a predicate over atom tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    selection: String,
    arity: usize,
    ast: Ast,
}

impl Selection {
    pub fn new(selection: impl Into<String>) -> MolResult<Self> {
        let selection = selection.into();
        let (arity, expression) = split_context(&selection)?;
        let tokens = lexer::tokenize(expression)?;
        if tokens.is_empty() {
            return Err(MolError::Selection(format!(
                "empty selection: '{selection}'"
            )));
        }
        let ast = parser::Parser::new(tokens).parse()?;
        if ast.max_argument() >= arity {
            return Err(MolError::Selection(format!(
                "variable ({}) is too big for the arity of this selection ({arity})",
                ast.max_argument() + 1
            )));
        }
        Ok(Self {
            selection,
            arity,
            ast,
        })
    }

    /// Arity of the matches produced by this selection.
    pub fn size(&self) -> usize {
        self.arity
    }

    /// The string this selection was compiled from.
    pub fn string(&self) -> &str {
        &self.selection
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// All ordered tuples of distinct atoms matching the predicate, in
    /// lexicographic order.
    pub fn evaluate(&self, frame: &Frame) -> Vec<Match> {
        let natoms = frame.size();
        let mut matches = Vec::new();
        match self.arity {
            1 => {
                for i in 0..natoms {
                    self.try_match(frame, &[i], &mut matches);
                }
            }
            2 => {
                for i in 0..natoms {
                    for j in (0..natoms).filter(|&j| j != i) {
                        self.try_match(frame, &[i, j], &mut matches);
                    }
                }
            }
            3 => {
                for i in 0..natoms {
                    for j in (0..natoms).filter(|&j| j != i) {
                        for k in (0..natoms).filter(|&k| k != i && k != j) {
                            self.try_match(frame, &[i, j, k], &mut matches);
                        }
                    }
                }
            }
            4 => {
                for i in 0..natoms {
                    for j in (0..natoms).filter(|&j| j != i) {
                        for k in (0..natoms).filter(|&k| k != i && k != j) {
                            for l in (0..natoms).filter(|&l| l != i && l != j && l != k) {
                                self.try_match(frame, &[i, j, k, l], &mut matches);
                            }
                        }
                    }
                }
            }
            _ => unreachable!("selection arity is always in 1..=4"),
        }
        matches
    }

    /// Matching atom indices for a single-atom selection.
    pub fn list(&self, frame: &Frame) -> MolResult<Vec<usize>> {
        if self.arity != 1 {
            return Err(MolError::Selection(format!(
                "can not list matches for a selection with arity {}",
                self.arity
            )));
        }
        Ok(self
            .evaluate(frame)
            .into_iter()
            .map(|candidate| candidate.index(0))
            .collect())
    }

    fn try_match(&self, frame: &Frame, indices: &[usize], matches: &mut Vec<Match>) {
        let candidate = Match::new(indices);
        if self.ast.is_match(frame, &candidate) {
            matches.push(candidate);
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity {
            2 => f.write_str("pairs: ")?,
            3 => f.write_str("three: ")?,
            4 => f.write_str("four: ")?,
            _ => {}
        }
        write!(f, "{}", self.ast)
    }
}

fn split_context(selection: &str) -> MolResult<(usize, &str)> {
    let trimmed = selection.trim_start();
    if let Some(colon) = trimmed.find(':') {
        let (context, rest) = trimmed.split_at(colon);
        let rest = &rest[1..];
        let arity = match context.trim() {
            "pairs" => 2,
            "three" => 3,
            "four" => 4,
            other => {
                return Err(MolError::Selection(format!(
                    "unknown selection context '{other}'"
                )))
            }
        };
        Ok((arity, rest))
    } else {
        Ok((1, trimmed))
    }
}
