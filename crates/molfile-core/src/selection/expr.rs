use std::fmt;

use crate::frame::Frame;
use crate::selection::Match;

/// Boolean nodes of the selection AST.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    All,
    None,
    String(StringSelector),
    Math(MathSelector),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringProperty {
    Type,
    Name,
    Resname,
}

impl StringProperty {
    pub fn name(self) -> &'static str {
        match self {
            StringProperty::Type => "type",
            StringProperty::Name => "name",
            StringProperty::Resname => "resname",
        }
    }

    fn value<'a>(self, frame: &'a Frame, atom: usize) -> &'a str {
        match self {
            StringProperty::Type => frame[atom].atomic_type(),
            StringProperty::Name => frame[atom].name(),
            StringProperty::Resname => frame
                .topology()
                .residue_for_atom(atom)
                .map(|residue| residue.name())
                .unwrap_or(""),
        }
    }
}

/// `name == CA` style selector over a single atom of the candidate tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct StringSelector {
    pub property: StringProperty,
    /// Zero-based slot in the candidate tuple.
    pub argument: usize,
    pub equals: bool,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        // Numeric equality is strict IEEE equality, no tolerance.
        match self {
            CmpOp::Equal => lhs == rhs,
            CmpOp::NotEqual => lhs != rhs,
            CmpOp::Less => lhs < rhs,
            CmpOp::LessEqual => lhs <= rhs,
            CmpOp::Greater => lhs > rhs,
            CmpOp::GreaterEqual => lhs >= rhs,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CmpOp::Equal => "==",
            CmpOp::NotEqual => "!=",
            CmpOp::Less => "<",
            CmpOp::LessEqual => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterEqual => ">=",
        };
        f.write_str(symbol)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MathSelector {
    pub op: CmpOp,
    pub lhs: MathAst,
    pub rhs: MathAst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathFunction {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Abs,
}

impl MathFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sqrt" => Some(MathFunction::Sqrt),
            "sin" => Some(MathFunction::Sin),
            "cos" => Some(MathFunction::Cos),
            "tan" => Some(MathFunction::Tan),
            "exp" => Some(MathFunction::Exp),
            "log" => Some(MathFunction::Log),
            "abs" => Some(MathFunction::Abs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Sqrt => "sqrt",
            MathFunction::Sin => "sin",
            MathFunction::Cos => "cos",
            MathFunction::Tan => "tan",
            MathFunction::Exp => "exp",
            MathFunction::Log => "log",
            MathFunction::Abs => "abs",
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            MathFunction::Sqrt => value.sqrt(),
            MathFunction::Sin => value.sin(),
            MathFunction::Cos => value.cos(),
            MathFunction::Tan => value.tan(),
            MathFunction::Exp => value.exp(),
            MathFunction::Log => value.ln(),
            MathFunction::Abs => value.abs(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericProperty {
    Index,
    Resid,
    Mass,
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
}

impl NumericProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "index" => Some(NumericProperty::Index),
            "resid" => Some(NumericProperty::Resid),
            "mass" => Some(NumericProperty::Mass),
            "x" => Some(NumericProperty::X),
            "y" => Some(NumericProperty::Y),
            "z" => Some(NumericProperty::Z),
            "vx" => Some(NumericProperty::Vx),
            "vy" => Some(NumericProperty::Vy),
            "vz" => Some(NumericProperty::Vz),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericProperty::Index => "index",
            NumericProperty::Resid => "resid",
            NumericProperty::Mass => "mass",
            NumericProperty::X => "x",
            NumericProperty::Y => "y",
            NumericProperty::Z => "z",
            NumericProperty::Vx => "vx",
            NumericProperty::Vy => "vy",
            NumericProperty::Vz => "vz",
        }
    }

    /// Value for the atom at `index`; -1 for `resid` without residue data,
    /// 0 for velocity components when the frame stores no velocities.
    fn value(self, frame: &Frame, index: usize) -> f64 {
        match self {
            NumericProperty::Index => index as f64,
            NumericProperty::Resid => frame
                .topology()
                .residue_for_atom(index)
                .and_then(|residue| residue.id())
                .unwrap_or(-1) as f64,
            NumericProperty::Mass => frame[index].mass(),
            NumericProperty::X => frame.positions()[index].x,
            NumericProperty::Y => frame.positions()[index].y,
            NumericProperty::Z => frame.positions()[index].z,
            NumericProperty::Vx => frame.velocities().map_or(0.0, |v| v[index].x),
            NumericProperty::Vy => frame.velocities().map_or(0.0, |v| v[index].y),
            NumericProperty::Vz => frame.velocities().map_or(0.0, |v| v[index].z),
        }
    }
}

/// Math nodes of the selection AST.
#[derive(Clone, Debug, PartialEq)]
pub enum MathAst {
    Add(Box<MathAst>, Box<MathAst>),
    Sub(Box<MathAst>, Box<MathAst>),
    Mul(Box<MathAst>, Box<MathAst>),
    Div(Box<MathAst>, Box<MathAst>),
    Pow(Box<MathAst>, Box<MathAst>),
    Neg(Box<MathAst>),
    Function(MathFunction, Box<MathAst>),
    Number(f64),
    Property(NumericProperty, usize),
}

impl Ast {
    pub fn is_match(&self, frame: &Frame, candidate: &Match) -> bool {
        match self {
            Ast::And(lhs, rhs) => lhs.is_match(frame, candidate) && rhs.is_match(frame, candidate),
            Ast::Or(lhs, rhs) => lhs.is_match(frame, candidate) || rhs.is_match(frame, candidate),
            Ast::Not(inner) => !inner.is_match(frame, candidate),
            Ast::All => true,
            Ast::None => false,
            Ast::String(selector) => {
                let value = selector
                    .property
                    .value(frame, candidate.index(selector.argument));
                (value == selector.value) == selector.equals
            }
            Ast::Math(selector) => {
                let lhs = selector.lhs.eval(frame, candidate);
                let rhs = selector.rhs.eval(frame, candidate);
                selector.op.apply(lhs, rhs)
            }
        }
    }

    /// Largest tuple slot referenced anywhere in the expression.
    pub fn max_argument(&self) -> usize {
        match self {
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => lhs.max_argument().max(rhs.max_argument()),
            Ast::Not(inner) => inner.max_argument(),
            Ast::All | Ast::None => 0,
            Ast::String(selector) => selector.argument,
            Ast::Math(selector) => selector.lhs.max_argument().max(selector.rhs.max_argument()),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Ast::Or(..) => 1,
            Ast::And(..) => 2,
            Ast::Not(..) => 3,
            _ => 4,
        }
    }

}

fn fmt_bool_child(f: &mut fmt::Formatter<'_>, child: &Ast, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => {
                let keyword = if matches!(self, Ast::And(..)) { "and" } else { "or" };
                fmt_bool_child(f, lhs, lhs.precedence() < self.precedence())?;
                write!(f, " {keyword} ")?;
                // Right operands at the same precedence keep explicit grouping
                // so that printing stays a parser fixed point.
                fmt_bool_child(f, rhs, rhs.precedence() <= self.precedence())
            }
            Ast::Not(inner) => {
                f.write_str("not ")?;
                fmt_bool_child(f, inner, inner.precedence() < self.precedence())
            }
            Ast::All => f.write_str("all"),
            Ast::None => f.write_str("none"),
            Ast::String(selector) => {
                f.write_str(selector.property.name())?;
                if selector.argument != 0 {
                    write!(f, "({})", selector.argument + 1)?;
                }
                let operator = if selector.equals { "==" } else { "!=" };
                write!(f, " {operator} {}", selector.value)
            }
            Ast::Math(selector) => {
                write!(f, "{} {} {}", selector.lhs, selector.op, selector.rhs)
            }
        }
    }
}

impl MathAst {
    pub fn eval(&self, frame: &Frame, candidate: &Match) -> f64 {
        match self {
            MathAst::Add(lhs, rhs) => lhs.eval(frame, candidate) + rhs.eval(frame, candidate),
            MathAst::Sub(lhs, rhs) => lhs.eval(frame, candidate) - rhs.eval(frame, candidate),
            MathAst::Mul(lhs, rhs) => lhs.eval(frame, candidate) * rhs.eval(frame, candidate),
            MathAst::Div(lhs, rhs) => lhs.eval(frame, candidate) / rhs.eval(frame, candidate),
            MathAst::Pow(lhs, rhs) => lhs.eval(frame, candidate).powf(rhs.eval(frame, candidate)),
            MathAst::Neg(inner) => -inner.eval(frame, candidate),
            MathAst::Function(function, inner) => function.apply(inner.eval(frame, candidate)),
            MathAst::Number(value) => *value,
            MathAst::Property(property, argument) => {
                property.value(frame, candidate.index(*argument))
            }
        }
    }

    pub fn max_argument(&self) -> usize {
        match self {
            MathAst::Add(lhs, rhs)
            | MathAst::Sub(lhs, rhs)
            | MathAst::Mul(lhs, rhs)
            | MathAst::Div(lhs, rhs)
            | MathAst::Pow(lhs, rhs) => lhs.max_argument().max(rhs.max_argument()),
            MathAst::Neg(inner) | MathAst::Function(_, inner) => inner.max_argument(),
            MathAst::Number(_) => 0,
            MathAst::Property(_, argument) => *argument,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            MathAst::Add(..) | MathAst::Sub(..) => 1,
            MathAst::Mul(..) | MathAst::Div(..) => 2,
            MathAst::Neg(..) => 3,
            MathAst::Pow(..) => 4,
            _ => 5,
        }
    }
}

fn fmt_math_child(f: &mut fmt::Formatter<'_>, child: &MathAst, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl fmt::Display for MathAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precedence = self.precedence();
        match self {
            MathAst::Add(lhs, rhs) | MathAst::Sub(lhs, rhs) => {
                let symbol = if matches!(self, MathAst::Add(..)) { '+' } else { '-' };
                fmt_math_child(f, lhs, lhs.precedence() < precedence)?;
                write!(f, " {symbol} ")?;
                fmt_math_child(f, rhs, rhs.precedence() <= precedence)
            }
            MathAst::Mul(lhs, rhs) | MathAst::Div(lhs, rhs) => {
                let symbol = if matches!(self, MathAst::Mul(..)) { '*' } else { '/' };
                fmt_math_child(f, lhs, lhs.precedence() < precedence)?;
                write!(f, " {symbol} ")?;
                fmt_math_child(f, rhs, rhs.precedence() <= precedence)
            }
            MathAst::Pow(lhs, rhs) => {
                // Right associative: parenthesise the left side instead.
                fmt_math_child(f, lhs, lhs.precedence() <= precedence)?;
                f.write_str("^")?;
                fmt_math_child(f, rhs, rhs.precedence() < precedence)
            }
            MathAst::Neg(inner) => {
                // Only another unary or a primary may follow "-" unparenthesised;
                // in particular "-a^b" parses as "(-a)^b".
                let grouped = !matches!(**inner, MathAst::Neg(..)) && inner.precedence() < 5;
                f.write_str("-")?;
                fmt_math_child(f, inner, grouped)
            }
            MathAst::Function(function, inner) => {
                write!(f, "{}({inner})", function.name())
            }
            MathAst::Number(value) => write!(f, "{value}"),
            MathAst::Property(property, argument) => {
                f.write_str(property.name())?;
                if *argument != 0 {
                    write!(f, "({})", argument + 1)?;
                }
                Ok(())
            }
        }
    }
}
