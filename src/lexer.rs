use super::token::{Operator, Position, Spanned, Token};
use anyhow::anyhow;
use std::str;

pub struct Lexer<'a> {
    program: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
}

type LResult<'a> = anyhow::Result<Option<Spanned<'a>>>;

impl<'a> Lexer<'a> {
    pub fn new(program: &'a str) -> Self {
        Lexer {
            program,
            cursor: 0,
            line: 1,
            column: 1,
        }
    }

    /// Lex the whole program
    pub fn tokenize(mut self) -> anyhow::Result<Vec<Spanned<'a>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Get the next token. This consumes the tokens.
    pub fn next_token(&mut self) -> LResult<'a> {
        self.trim()?;

        let pos = self.position();
        let token = match self.next_char(false) {
            Some(b'"') => self.read_str_literal(pos)?,
            Some(b'(') => Token::LParen,
            Some(b')') => Token::RParen,
            Some(b'{') => Token::LBrace,
            Some(b'}') => Token::RBrace,
            Some(b'[') => Token::LBracket,
            Some(b']') => Token::RBracket,
            Some(b',') => Token::Comma,
            Some(b';') => Token::Semicolon,
            Some(b'+') => Token::Operator(Operator::Add),
            Some(b'-') => Token::Operator(Operator::Sub),
            Some(b'*') => Token::Operator(Operator::Mul),
            Some(b'/') => Token::Operator(Operator::Div),
            Some(b'=') => self.with_equals(Token::Operator(Operator::Eq), Token::Assign),
            Some(b'>') => self.with_equals(
                Token::Operator(Operator::Ge),
                Token::Operator(Operator::Gt),
            ),
            Some(b'<') => self.with_equals(
                Token::Operator(Operator::Le),
                Token::Operator(Operator::Lt),
            ),
            Some(b'!') => {
                if self.next_char(true) != Some(b'=') {
                    return Err(anyhow!("{}: expected '=' after '!'", pos));
                }
                self.next_char(false);
                Token::Operator(Operator::Ne)
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) if ch.is_ascii_alphabetic() || ch == b'_' => self.read_token()?,
            Some(ch) => return Err(anyhow!("{}: unexpected character '{}'", pos, ch as char)),
            None => return Ok(None),
        };

        Ok(Some(Spanned { token, pos }))
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Pick `with` if the next char is '=' (and consume it), `without` otherwise
    fn with_equals(&mut self, with: Token<'a>, without: Token<'a>) -> Token<'a> {
        if self.next_char(true) == Some(b'=') {
            self.next_char(false);
            with
        } else {
            without
        }
    }

    /// Trim whitespaces, newlines, control chars and comments
    fn trim(&mut self) -> anyhow::Result<()> {
        while let Some(ch) = self.next_char(true) {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' => {
                    self.next_char(false);
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(ch) = self.next_char(false) {
                        if ch == b'\n' {
                            break;
                        }
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let start = self.position();
                    self.next_char(false);
                    self.next_char(false);
                    loop {
                        match self.next_char(false) {
                            Some(b'*') if self.next_char(true) == Some(b'/') => {
                                self.next_char(false);
                                break;
                            }
                            Some(_) => {}
                            None => return Err(anyhow!("{}: comment is not closed", start)),
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Read a decimal integer, or a float if a fraction follows
    fn read_number(&mut self) -> anyhow::Result<Token<'a>> {
        let start_pos = self.cursor - 1;
        self.skip_digits();

        let is_float = self.next_char(true) == Some(b'.')
            && self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit());
        if is_float {
            self.next_char(false);
            self.skip_digits();
        }

        let literal = str::from_utf8(&self.program.as_bytes()[start_pos..self.cursor])?;
        if is_float {
            Ok(Token::Float(literal.parse::<f64>()?))
        } else {
            Ok(Token::Int(literal.parse::<i64>()?))
        }
    }

    fn skip_digits(&mut self) {
        while let Some(ch) = self.next_char(true) {
            if !ch.is_ascii_digit() {
                break;
            }
            self.next_char(false);
        }
    }

    /// Read a string literal that starts and ends with '"'
    fn read_str_literal(&mut self, start: Position) -> anyhow::Result<Token<'a>> {
        let mut bytes = Vec::new();
        loop {
            match self.next_char(false) {
                // Strings cannot continue from next line
                None | Some(b'\n') => {
                    return Err(anyhow!("{}: string literal is not finished properly", start))
                }
                Some(b'"') => break,
                Some(b'\\') => match self.next_char(false) {
                    Some(b'"') => bytes.push(b'"'),
                    Some(b'\\') => bytes.push(b'\\'),
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(ch) => {
                        return Err(anyhow!("{}: unknown escape '\\{}'", start, ch as char))
                    }
                    None => {
                        return Err(anyhow!("{}: string literal is not finished properly", start))
                    }
                },
                Some(ch) => bytes.push(ch),
            }
        }

        Ok(Token::StringLiteral(String::from_utf8(bytes)?))
    }

    /// Read a keyword or a name
    fn read_token(&mut self) -> anyhow::Result<Token<'a>> {
        let start_pos = self.cursor - 1;
        while let Some(ch) = self.next_char(true) {
            // Only alphanumberic characters and '_'
            if !ch.is_ascii_alphanumeric() && ch != b'_' {
                break;
            }
            self.next_char(false);
        }

        let token_str = str::from_utf8(&self.program.as_bytes()[start_pos..self.cursor])?;
        Ok(Token::new(token_str))
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.program.as_bytes().get(self.cursor + offset).copied()
    }

    /// Get the next char and advance the cursor if `peek` is false
    fn next_char(&mut self, peek: bool) -> Option<u8> {
        let ch = *self.program.as_bytes().get(self.cursor)?;
        if !peek {
            self.cursor += 1;
            if ch == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::super::token::Keyword;
    use super::*;
    use crate::value::DeclaredType;

    fn tokens(program: &str) -> Vec<Token<'_>> {
        Lexer::new(program)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn trim() {
        let program = "\t\r\x0C \n // note\n /* block\n comment */ out";
        let mut lexer = Lexer::new(program);
        lexer.trim().unwrap();
        assert_eq!(&lexer.program[lexer.cursor..], "out");
        assert_eq!(lexer.position(), Position::new(4, 13));
    }

    #[test]
    fn unclosed_comment() {
        let mut lexer = Lexer::new("/* never closed");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn read_str_literal() {
        assert_eq!(
            tokens(r#""say \"hi\"\n""#),
            vec![Token::StringLiteral("say \"hi\"\n".to_string())]
        );
        assert!(Lexer::new("\"open\nline\"").tokenize().is_err());
    }

    #[test]
    fn read_number() {
        assert_eq!(
            tokens("123 4.5 7"),
            vec![Token::Int(123), Token::Float(4.5), Token::Int(7)]
        );
        // A dot without a fraction is not part of the number
        assert!(Lexer::new("7.").tokenize().is_err());
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokens("= == != > >= < <= + - * /"),
            vec![
                Token::Assign,
                Token::Operator(Operator::Eq),
                Token::Operator(Operator::Ne),
                Token::Operator(Operator::Gt),
                Token::Operator(Operator::Ge),
                Token::Operator(Operator::Lt),
                Token::Operator(Operator::Le),
                Token::Operator(Operator::Add),
                Token::Operator(Operator::Sub),
                Token::Operator(Operator::Mul),
                Token::Operator(Operator::Div),
            ]
        );
        assert!(Lexer::new("!x").tokenize().is_err());
    }

    #[test]
    fn read_program() {
        let program = r"
            function test(int a) int {
                return a + 1;
            }
        ";

        let expected = vec![
            Token::Keyword(Keyword::Function),
            Token::Name("test"),
            Token::LParen,
            Token::Keyword(Keyword::Type(DeclaredType::Int)),
            Token::Name("a"),
            Token::RParen,
            Token::Keyword(Keyword::Type(DeclaredType::Int)),
            Token::LBrace,
            Token::Keyword(Keyword::Return),
            Token::Name("a"),
            Token::Operator(Operator::Add),
            Token::Int(1),
            Token::Semicolon,
            Token::RBrace,
        ];

        let mut lexer = Lexer::new(program);
        for token in expected {
            assert_eq!(token, lexer.next_token().unwrap().unwrap().token);
        }

        // No tokens left
        assert_eq!(lexer.next_token().unwrap(), None);
    }

    #[test]
    fn positions() {
        let spanned = Lexer::new("a\n  bb").tokenize().unwrap();
        assert_eq!(spanned[0].pos, Position::new(1, 1));
        assert_eq!(spanned[1].pos, Position::new(2, 3));
    }
}
