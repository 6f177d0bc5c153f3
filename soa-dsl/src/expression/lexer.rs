use crate::expression::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// `$name` device-parameter reference (marker stripped).
    DeviceParam(String),
    /// `v[a,b]` or `v[a]`.
    Voltage(String, Option<String>),
    /// `i[x]`, or `i_rms[x]` when the flag is set.
    Current(String, bool),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    If,
    Then,
    Else,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_eof() {
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        let ch = self.peek();

        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_ascii_digit()) {
            return self.lex_number();
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            return self.lex_word();
        }

        if ch == '$' {
            self.advance();
            let name = self.read_ident();
            if name.is_empty() {
                return Err(ExpressionError::UnexpectedChar('$', self.pos));
            }
            return Ok(Token::DeviceParam(name));
        }

        let start = self.pos;
        self.advance();
        let token = match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '=' if self.eat('=') => Token::EqEq,
            '!' if self.eat('=') => Token::Ne,
            _ => return Err(ExpressionError::UnexpectedChar(ch, start)),
        };
        Ok(token)
    }

    fn lex_number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;
        let mut s = String::new();

        while !self.is_eof() && (self.peek().is_ascii_digit() || self.peek() == '.') {
            s.push(self.peek());
            self.advance();
        }

        // Exponent only when followed by a digit, so `2e` stays an error
        // instead of swallowing an identifier.
        if matches!(self.peek(), 'e' | 'E') {
            let next = self.peek_at(1);
            let after_sign = self.peek_at(2);
            if next.is_ascii_digit() || (matches!(next, '+' | '-') && after_sign.is_ascii_digit()) {
                s.push(self.peek());
                self.advance();
                if matches!(self.peek(), '+' | '-') {
                    s.push(self.peek());
                    self.advance();
                }
                while !self.is_eof() && self.peek().is_ascii_digit() {
                    s.push(self.peek());
                    self.advance();
                }
            }
        }

        s.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidNumber(s, start))
    }

    fn lex_word(&mut self) -> Result<Token, ExpressionError> {
        let word = self.read_ident();

        if self.peek() == '[' {
            match word.as_str() {
                "v" => return self.lex_voltage(),
                "i" => return self.lex_current(false),
                "i_rms" => return self.lex_current(true),
                _ => {}
            }
        }

        let token = if word.eq_ignore_ascii_case("if") {
            Token::If
        } else if word.eq_ignore_ascii_case("then") {
            Token::Then
        } else if word.eq_ignore_ascii_case("else") {
            Token::Else
        } else {
            Token::Ident(word)
        };
        Ok(token)
    }

    fn lex_voltage(&mut self) -> Result<Token, ExpressionError> {
        let nodes = self.read_bracket_list()?;
        match nodes.as_slice() {
            [a] => Ok(Token::Voltage(a.clone(), None)),
            [a, b] => Ok(Token::Voltage(a.clone(), Some(b.clone()))),
            _ => Err(ExpressionError::InvalidReference(format!("v[{}]", nodes.join(",")))),
        }
    }

    fn lex_current(&mut self, rms: bool) -> Result<Token, ExpressionError> {
        let names = self.read_bracket_list()?;
        match names.as_slice() {
            [x] => Ok(Token::Current(x.clone(), rms)),
            _ => Err(ExpressionError::InvalidReference(format!("i[{}]", names.join(",")))),
        }
    }

    /// Reads `[a, b, ...]` and returns the trimmed, non-empty names.
    fn read_bracket_list(&mut self) -> Result<Vec<String>, ExpressionError> {
        self.advance(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            let name = self.read_ident();
            if name.is_empty() {
                return match self.peek() {
                    '\0' => Err(ExpressionError::UnexpectedEnd),
                    ch => Err(ExpressionError::UnexpectedChar(ch, self.pos)),
                };
            }
            items.push(name);
            self.skip_whitespace();
            match self.peek() {
                ',' => self.advance(),
                ']' => {
                    self.advance();
                    return Ok(items);
                }
                '\0' => return Err(ExpressionError::UnexpectedEnd),
                ch => return Err(ExpressionError::UnexpectedChar(ch, self.pos)),
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                s.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.input.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(s: &str) -> Vec<Token> {
        Lexer::new(s).tokenize().unwrap()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("1.5e-3"), vec![Token::Number(1.5e-3)]);
        assert_eq!(lex(".25"), vec![Token::Number(0.25)]);
    }

    #[test]
    fn test_references() {
        assert_eq!(
            lex("v[d, s] + i[r1] + $w"),
            vec![
                Token::Voltage("d".to_string(), Some("s".to_string())),
                Token::Plus,
                Token::Current("r1".to_string(), false),
                Token::Plus,
                Token::DeviceParam("w".to_string()),
            ]
        );
        assert_eq!(lex("i_rms[r2]"), vec![Token::Current("r2".to_string(), true)]);
    }

    #[test]
    fn test_comparisons_and_keywords() {
        assert_eq!(
            lex("if a >= 1 then b else c"),
            vec![
                Token::If,
                Token::Ident("a".to_string()),
                Token::Ge,
                Token::Number(1.0),
                Token::Then,
                Token::Ident("b".to_string()),
                Token::Else,
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_char() {
        assert!(Lexer::new("a # b").tokenize().is_err());
        assert!(Lexer::new("v[d,").tokenize().is_err());
    }
}
