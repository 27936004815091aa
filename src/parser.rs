//! Recursive descent parser that turns source text into a syntax tree

use anyhow::anyhow;

use crate::{
    ast::{
        Argument, Call, Code, Expression, Factor, FactorKind, Function, Literal, Statement,
        StatementKind,
    },
    lexer::Lexer,
    token::{Keyword, Operator, Position, Spanned, Token},
    value::DeclaredType,
};

type ParseRes<T> = anyhow::Result<T>;

/// Parse a whole program
pub fn parse(program: &str) -> ParseRes<Code> {
    Parser::new(program)?.parse()
}

pub struct Parser<'a> {
    tokens: Vec<Spanned<'a>>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    pub fn new(program: &'a str) -> ParseRes<Self> {
        let tokens = Lexer::new(program).tokenize()?;
        Ok(Parser { tokens, cursor: 0 })
    }

    pub fn parse(mut self) -> ParseRes<Code> {
        let mut functions = Vec::new();
        while self.peek().is_some() {
            functions.push(self.parse_function()?);
        }
        Ok(Code { functions })
    }

    fn parse_function(&mut self) -> ParseRes<Function> {
        let pos = self.expect(Token::Keyword(Keyword::Function), "'function'")?;
        let (name, _) = self.expect_name()?;

        self.expect(Token::LParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let pos = self.pos();
                let ty = self.expect_type()?;
                let (name, _) = self.expect_name()?;
                arguments.push(Argument { pos, ty, name });

                if !self.eat(&Token::Comma) {
                    self.expect(Token::RParen, "')'")?;
                    break;
                }
            }
        }

        let return_type = match self.peek() {
            Some(Token::Keyword(Keyword::Type(ty))) => {
                let ty = *ty;
                self.cursor += 1;
                Some(ty)
            }
            _ => None,
        };

        let body = self.parse_block()?;

        Ok(Function {
            pos,
            name,
            arguments,
            return_type,
            body,
        })
    }

    fn parse_block(&mut self) -> ParseRes<Vec<Statement>> {
        self.expect(Token::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.unexpected("'}'"));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseRes<Statement> {
        let pos = self.pos();
        let kind = match self.peek() {
            Some(Token::Keyword(Keyword::If)) => {
                self.cursor += 1;
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                StatementKind::If { condition, body }
            }
            Some(Token::Keyword(Keyword::While)) => {
                self.cursor += 1;
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                StatementKind::While { condition, body }
            }
            Some(Token::Keyword(Keyword::For)) => {
                self.cursor += 1;
                let parenthesized = self.eat(&Token::LParen);
                let init = Box::new(self.parse_simple_statement()?);
                let condition = self.parse_expression()?;
                self.expect(Token::Semicolon, "';'")?;
                let increment = Box::new(self.parse_simple_statement()?);
                if parenthesized {
                    self.expect(Token::RParen, "')'")?;
                }
                let body = self.parse_block()?;
                StatementKind::For {
                    init,
                    condition,
                    increment,
                    body,
                }
            }
            Some(Token::Keyword(Keyword::From)) => {
                self.cursor += 1;
                let start = self.parse_expression()?;
                self.expect(Token::Keyword(Keyword::To), "'to'")?;
                let end = self.parse_expression()?;
                self.expect(Token::Keyword(Keyword::As), "'as'")?;
                let (variable, _) = self.expect_name()?;
                let body = self.parse_block()?;
                StatementKind::RangeFor {
                    start,
                    end,
                    variable,
                    body,
                }
            }
            _ => return self.parse_simple_statement(),
        };

        Ok(Statement { pos, kind })
    }

    /// Statements terminated with ';'
    fn parse_simple_statement(&mut self) -> ParseRes<Statement> {
        let pos = self.pos();
        let kind = match self.peek() {
            Some(Token::Keyword(Keyword::Return)) => {
                self.cursor += 1;
                if self.eat(&Token::Semicolon) {
                    return Ok(Statement {
                        pos,
                        kind: StatementKind::Return(None),
                    });
                }
                StatementKind::Return(Some(self.parse_expression()?))
            }
            Some(Token::Keyword(Keyword::Type(ty))) => {
                let ty = *ty;
                self.cursor += 1;
                let (name, _) = self.expect_name()?;
                self.expect(Token::Assign, "'='")?;
                let value = self.parse_expression()?;
                StatementKind::Assign {
                    ty: Some(ty),
                    name,
                    value,
                }
            }
            _ => {
                let expression = self.parse_expression()?;
                if self.eat(&Token::Assign) {
                    let value = self.parse_expression()?;
                    match expression {
                        Expression::Factor(Factor {
                            kind: FactorKind::Variable(name),
                            ..
                        }) => StatementKind::Assign {
                            ty: None,
                            name,
                            value,
                        },
                        Expression::Factor(Factor {
                            kind: FactorKind::ArrayIndex { name, index },
                            ..
                        }) => StatementKind::ArrayAssign {
                            name,
                            index: *index,
                            value,
                        },
                        _ => return Err(anyhow!("{}: cannot assign to this expression", pos)),
                    }
                } else {
                    match expression {
                        Expression::Factor(Factor {
                            kind: FactorKind::Call(call),
                            ..
                        }) => StatementKind::Call(call),
                        expression => StatementKind::Expression(expression),
                    }
                }
            }
        };

        self.expect(Token::Semicolon, "';'")?;
        Ok(Statement { pos, kind })
    }

    pub fn parse_expression(&mut self) -> ParseRes<Expression> {
        self.parse_binary(
            &[
                Operator::Eq,
                Operator::Ne,
                Operator::Gt,
                Operator::Ge,
                Operator::Lt,
                Operator::Le,
            ],
            Self::parse_sum,
        )
    }

    fn parse_sum(&mut self) -> ParseRes<Expression> {
        self.parse_binary(&[Operator::Add, Operator::Sub], Self::parse_term)
    }

    fn parse_term(&mut self) -> ParseRes<Expression> {
        self.parse_binary(&[Operator::Mul, Operator::Div], Self::parse_factor)
    }

    /// Parse `operand (op operand)*` folding to the left
    fn parse_binary(
        &mut self,
        operators: &[Operator],
        operand: fn(&mut Self) -> ParseRes<Expression>,
    ) -> ParseRes<Expression> {
        let mut lhs = operand(self)?;
        while let Some(Token::Operator(op)) = self.peek() {
            let op = *op;
            if !operators.contains(&op) {
                break;
            }
            let pos = self.pos();
            self.cursor += 1;
            let rhs = operand(self)?;
            lhs = Expression::Binary {
                pos,
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> ParseRes<Expression> {
        let pos = self.pos();
        let spanned = match self.advance() {
            Some(spanned) => spanned,
            None => return Err(self.unexpected("an expression")),
        };

        let kind = match spanned.token {
            Token::Int(n) => FactorKind::Literal(Literal::Int(n)),
            Token::Float(f) => FactorKind::Literal(Literal::Float(f)),
            Token::StringLiteral(s) => FactorKind::Literal(Literal::String(s)),
            Token::Keyword(Keyword::True) => FactorKind::Literal(Literal::Bool(true)),
            Token::Keyword(Keyword::False) => FactorKind::Literal(Literal::Bool(false)),
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "')'")?;
                FactorKind::Parenthesized(Box::new(inner))
            }
            Token::LBracket => {
                let mut elements = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.eat(&Token::Comma) {
                            self.expect(Token::RBracket, "']'")?;
                            break;
                        }
                    }
                }
                FactorKind::ArrayLiteral(elements)
            }
            Token::Name(name) => match self.peek() {
                Some(Token::LParen) => FactorKind::Call(self.parse_call(name.to_string(), pos)?),
                Some(Token::LBracket) => {
                    self.cursor += 1;
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    FactorKind::ArrayIndex {
                        name: name.to_string(),
                        index: Box::new(index),
                    }
                }
                _ => FactorKind::Variable(name.to_string()),
            },
            token => {
                return Err(anyhow!(
                    "{}: expected an expression, got {:?}",
                    spanned.pos,
                    token
                ))
            }
        };

        Ok(Expression::Factor(Factor { pos, kind }))
    }

    fn parse_call(&mut self, name: String, pos: Position) -> ParseRes<Call> {
        self.expect(Token::LParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.eat(&Token::Comma) {
                    self.expect(Token::RParen, "')'")?;
                    break;
                }
            }
        }
        Ok(Call {
            pos,
            name,
            arguments,
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.cursor).map(|spanned| &spanned.token)
    }

    /// Position of the next token, or just past the last one
    fn pos(&self) -> Position {
        match self.tokens.get(self.cursor).or_else(|| self.tokens.last()) {
            Some(spanned) => spanned.pos,
            None => Position::new(1, 1),
        }
    }

    fn advance(&mut self) -> Option<Spanned<'a>> {
        let spanned = self.tokens.get(self.cursor).cloned();
        if spanned.is_some() {
            self.cursor += 1;
        }
        spanned
    }

    fn eat(&mut self, token: &Token<'_>) -> bool {
        if self.peek() == Some(token) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token<'_>, what: &str) -> ParseRes<Position> {
        let pos = self.pos();
        if self.eat(&token) {
            Ok(pos)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_name(&mut self) -> ParseRes<(String, Position)> {
        let pos = self.pos();
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.to_string();
                self.cursor += 1;
                Ok((name, pos))
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn expect_type(&mut self) -> ParseRes<DeclaredType> {
        match self.peek() {
            Some(Token::Keyword(Keyword::Type(ty))) => {
                let ty = *ty;
                self.cursor += 1;
                Ok(ty)
            }
            _ => Err(self.unexpected("a type")),
        }
    }

    fn unexpected(&self, expected: &str) -> anyhow::Error {
        match self.peek() {
            Some(token) => anyhow!("{}: expected {}, got {:?}", self.pos(), expected, token),
            None => anyhow!("{}: expected {}, got end of input", self.pos(), expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression(source: &str) -> Expression {
        Parser::new(source).unwrap().parse_expression().unwrap()
    }

    /// Render an expression fully parenthesized to check its shape
    fn shape(expression: &Expression) -> String {
        match expression {
            Expression::Binary { op, lhs, rhs, .. } => {
                format!("({} {} {})", shape(lhs), op, shape(rhs))
            }
            Expression::Factor(factor) => match &factor.kind {
                FactorKind::Literal(Literal::Int(n)) => n.to_string(),
                FactorKind::Literal(literal) => format!("{:?}", literal),
                FactorKind::Variable(name) => name.clone(),
                FactorKind::Call(call) => format!(
                    "{}({})",
                    call.name,
                    call.arguments.iter().map(shape).collect::<Vec<_>>().join(", ")
                ),
                FactorKind::ArrayIndex { name, index } => format!("{}[{}]", name, shape(index)),
                FactorKind::ArrayLiteral(items) => format!(
                    "[{}]",
                    items.iter().map(shape).collect::<Vec<_>>().join(", ")
                ),
                FactorKind::Parenthesized(inner) => format!("<{}>", shape(inner)),
            },
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(
            shape(&expression("1000 + test() * 2 + 22")),
            "((1000 + (test() * 2)) + 22)"
        );
        assert_eq!(shape(&expression("10 - 2 - 3")), "((10 - 2) - 3)");
        assert_eq!(shape(&expression("a + 1 < b * 2")), "((a + 1) < (b * 2))");
        assert_eq!(shape(&expression("(1 + 2) * 3")), "(<(1 + 2)> * 3)");
    }

    #[test]
    fn factors() {
        assert_eq!(
            shape(&expression("out(a[i + 1], [1, 2], f())")),
            "out(a[(i + 1)], [1, 2], f())"
        );
        assert_eq!(shape(&expression("true")), "Bool(true)");
        assert_eq!(shape(&expression("\"hi\"")), "String(\"hi\")");
    }

    #[test]
    fn function() {
        let code = parse("function add(int a, float b) int { return a; }").unwrap();
        let function = &code.functions[0];

        assert_eq!(function.name, "add");
        assert_eq!(function.return_type, Some(DeclaredType::Int));
        assert_eq!(
            function
                .arguments
                .iter()
                .map(|arg| (arg.ty, arg.name.as_str()))
                .collect::<Vec<_>>(),
            vec![(DeclaredType::Int, "a"), (DeclaredType::Float, "b")]
        );
        assert!(matches!(function.body[0].kind, StatementKind::Return(Some(_))));
    }

    #[test]
    fn statements() {
        let code = parse(
            r#"
            function main() {
                int a = 1;
                a = a + 1;
                arr[0] = 5;
                out(a);
                a + 1;
                return;
                if a == 2 { out("two"); }
                while (a < 10) { a = a + 1; }
                for int i = 0; i < 10; i = i + 1; { out(i); }
                for (int j = 0; j < 2; j = j + 1;) { out(j); }
                from 0 to 10 as k { out(k); }
            }
            "#,
        )
        .unwrap();

        let kinds: Vec<_> = code.functions[0].body.iter().map(|s| &s.kind).collect();
        assert!(matches!(
            kinds[0],
            StatementKind::Assign { ty: Some(DeclaredType::Int), .. }
        ));
        assert!(matches!(kinds[1], StatementKind::Assign { ty: None, .. }));
        assert!(matches!(kinds[2], StatementKind::ArrayAssign { .. }));
        assert!(matches!(kinds[3], StatementKind::Call(_)));
        assert!(matches!(kinds[4], StatementKind::Expression(_)));
        assert!(matches!(kinds[5], StatementKind::Return(None)));
        assert!(matches!(kinds[6], StatementKind::If { .. }));
        assert!(matches!(kinds[7], StatementKind::While { .. }));
        assert!(matches!(kinds[8], StatementKind::For { .. }));
        assert!(matches!(kinds[9], StatementKind::For { .. }));
        match kinds[10] {
            StatementKind::RangeFor { variable, body, .. } => {
                assert_eq!(variable, "k");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a range loop, got {:?}", other),
        }
    }

    #[test]
    fn errors() {
        let err = parse("function main() { out(1) }").unwrap_err();
        assert!(err.to_string().starts_with("1:26: expected ';'"), "{}", err);

        assert!(parse("function main() { 1 = 2; }").is_err());
        assert!(parse("function main() {").is_err());
        assert!(parse("main() {}").is_err());
    }
}
