use crate::error::{MolError, MolResult};
use crate::selection::expr::{
    Ast, CmpOp, MathAst, MathFunction, MathSelector, NumericProperty, StringProperty,
    StringSelector,
};
use crate::selection::lexer::Token;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

fn error(message: impl Into<String>) -> MolError {
    MolError::Selection(message.into())
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> MolResult<Ast> {
        let ast = self.parse_or()?;
        match self.peek() {
            None => Ok(ast),
            Some(token) => Err(error(format!(
                "additional data after the end of the selection: {token:?}"
            ))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> MolResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(error(format!(
                "expected {expected:?} {context}, found {:?}",
                self.peek()
            )))
        }
    }

    fn parse_or(&mut self) -> MolResult<Ast> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> MolResult<Ast> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Ast::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> MolResult<Ast> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            Ok(Ast::Not(Box::new(inner)))
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> MolResult<Ast> {
        enum Atom {
            Group,
            All,
            None,
            StringSel,
            Math,
        }
        let kind = match self.peek() {
            Some(Token::LParen) => Atom::Group,
            Some(Token::Ident(ident)) => match ident.as_str() {
                "all" => Atom::All,
                "none" => Atom::None,
                "type" | "name" | "resname" => Atom::StringSel,
                _ => Atom::Math,
            },
            _ => Atom::Math,
        };
        match kind {
            Atom::Group => {
                // "(x < 3) and ..." against "(x + 1) < 3": try a Boolean
                // group first, fall back to a math expression on failure.
                let saved = self.position;
                self.position += 1;
                let group = self.parse_or().and_then(|ast| {
                    self.expect(&Token::RParen, "to close the selection group")?;
                    Ok(ast)
                });
                match group {
                    Ok(ast) => Ok(ast),
                    Err(_) => {
                        self.position = saved;
                        self.parse_math_selector()
                    }
                }
            }
            Atom::All => {
                self.position += 1;
                Ok(Ast::All)
            }
            Atom::None => {
                self.position += 1;
                Ok(Ast::None)
            }
            Atom::StringSel => self.parse_string_selector(),
            Atom::Math => self.parse_math_selector(),
        }
    }

    fn parse_string_selector(&mut self) -> MolResult<Ast> {
        let property = match self.advance() {
            Some(Token::Ident(ident)) => match ident.as_str() {
                "type" => StringProperty::Type,
                "name" => StringProperty::Name,
                "resname" => StringProperty::Resname,
                other => return Err(error(format!("unknown string property '{other}'"))),
            },
            token => return Err(error(format!("expected a string property, found {token:?}"))),
        };

        let argument = self.parse_argument()?;
        let equals = match self.advance() {
            Some(Token::Eq) => true,
            Some(Token::Ne) => false,
            token => {
                return Err(error(format!(
                    "expected '==' or '!=' after '{}', found {token:?}",
                    property.name()
                )))
            }
        };
        let value = match self.advance() {
            Some(Token::Ident(value)) => value,
            token => {
                return Err(error(format!(
                    "expected a value after '{} {}', found {token:?}",
                    property.name(),
                    if equals { "==" } else { "!=" },
                )))
            }
        };

        Ok(Ast::String(StringSelector {
            property,
            argument,
            equals,
            value,
        }))
    }

    /// Optional `(i)` atom argument, 1-based in the selection text.
    fn parse_argument(&mut self) -> MolResult<usize> {
        if self.peek() != Some(&Token::LParen) {
            return Ok(0);
        }
        self.position += 1;
        let argument = match self.advance() {
            Some(Token::Number(value)) => {
                if value.fract() != 0.0 || !(1.0..=4.0).contains(&value) {
                    return Err(error(format!(
                        "atom argument must be 1, 2, 3 or 4, found {value}"
                    )));
                }
                value as usize - 1
            }
            token => {
                return Err(error(format!(
                    "expected an atom argument number, found {token:?}"
                )))
            }
        };
        self.expect(&Token::RParen, "to close the atom argument")?;
        Ok(argument)
    }

    fn parse_math_selector(&mut self) -> MolResult<Ast> {
        let lhs = self.parse_math_expr()?;
        let op = match self.advance() {
            Some(Token::Eq) => CmpOp::Equal,
            Some(Token::Ne) => CmpOp::NotEqual,
            Some(Token::Lt) => CmpOp::Less,
            Some(Token::Le) => CmpOp::LessEqual,
            Some(Token::Gt) => CmpOp::Greater,
            Some(Token::Ge) => CmpOp::GreaterEqual,
            token => {
                return Err(error(format!(
                    "expected a comparison operator, found {token:?}"
                )))
            }
        };
        let rhs = self.parse_math_expr()?;
        Ok(Ast::Math(MathSelector { op, lhs, rhs }))
    }

    fn parse_math_expr(&mut self) -> MolResult<MathAst> {
        let mut lhs = self.parse_term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.parse_term()?;
                lhs = MathAst::Add(Box::new(lhs), Box::new(rhs));
            } else if self.eat(&Token::Minus) {
                let rhs = self.parse_term()?;
                lhs = MathAst::Sub(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_term(&mut self) -> MolResult<MathAst> {
        let mut lhs = self.parse_power()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.parse_power()?;
                lhs = MathAst::Mul(Box::new(lhs), Box::new(rhs));
            } else if self.eat(&Token::Slash) {
                let rhs = self.parse_power()?;
                lhs = MathAst::Div(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_power(&mut self) -> MolResult<MathAst> {
        let base = self.parse_unary()?;
        if self.eat(&Token::Hat) {
            let exponent = self.parse_power()?;
            Ok(MathAst::Pow(Box::new(base), Box::new(exponent)))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> MolResult<MathAst> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            Ok(MathAst::Neg(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> MolResult<MathAst> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(MathAst::Number(value)),
            Some(Token::LParen) => {
                let inner = self.parse_math_expr()?;
                self.expect(&Token::RParen, "to close the expression group")?;
                Ok(inner)
            }
            Some(Token::Ident(ident)) => {
                if let Some(function) = MathFunction::from_name(&ident) {
                    self.expect(&Token::LParen, "after the function name")?;
                    let inner = self.parse_math_expr()?;
                    self.expect(&Token::RParen, "to close the function call")?;
                    return Ok(MathAst::Function(function, Box::new(inner)));
                }
                if let Some(property) = NumericProperty::from_name(&ident) {
                    let argument = self.parse_argument()?;
                    return Ok(MathAst::Property(property, argument));
                }
                Err(error(format!("unknown property or function '{ident}'")))
            }
            token => Err(error(format!(
                "expected a number, a property or a function, found {token:?}"
            ))),
        }
    }
}
