use std::fmt;

use crate::value::DeclaredType;

/// Line and column (both 1-based) of a token in the source text
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reserved keywords of the language
/// ***Note that built-in functions are not reserved keywords***
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Keyword {
    Function,
    Return,
    If,
    While,
    For,
    From,
    To,
    As,
    True,
    False,
    Type(DeclaredType),
}

/// Binary operators, loosest binding first: comparisons, then `+ -`, then `* /`
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    Name(&'a str),

    Int(i64),
    Float(f64),
    StringLiteral(String),

    Operator(Operator),
    Assign,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

impl<'a> Token<'a> {
    /// Classify a word as a keyword or a name
    pub fn new(token_str: &'a str) -> Self {
        match token_str {
            "function" => Token::Keyword(Keyword::Function),
            "return" => Token::Keyword(Keyword::Return),
            "if" => Token::Keyword(Keyword::If),
            "while" => Token::Keyword(Keyword::While),
            "for" => Token::Keyword(Keyword::For),
            "from" => Token::Keyword(Keyword::From),
            "to" => Token::Keyword(Keyword::To),
            "as" => Token::Keyword(Keyword::As),
            "true" => Token::Keyword(Keyword::True),
            "false" => Token::Keyword(Keyword::False),
            "int" => Token::Keyword(Keyword::Type(DeclaredType::Int)),
            "float" => Token::Keyword(Keyword::Type(DeclaredType::Float)),
            "string" => Token::Keyword(Keyword::Type(DeclaredType::String)),
            "bool" => Token::Keyword(Keyword::Type(DeclaredType::Bool)),
            "array" => Token::Keyword(Keyword::Type(DeclaredType::Array)),
            _ => Token::Name(token_str),
        }
    }
}

/// A token together with where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub pos: Position,
}
