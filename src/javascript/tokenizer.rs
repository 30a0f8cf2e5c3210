use crate::error::ParseError;
use log::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Let,
    Const,
    Var,
    Function,
    If,
    Else,
    While,
    For,
    Return,
    Break,
    Continue,
    New,
    True,
    False,
    Null,
    Undefined,
    Typeof,
    /// A reserved word the grammar has no production for.
    Reserved(String),

    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,           // %
    Equals,
    DoubleEquals,      // ==
    TripleEquals,      // ===
    NotEquals,         // !=
    NotDoubleEquals,   // !==
    LessThan,          // <
    GreaterThan,       // >
    LessThanEquals,    // <=
    GreaterThanEquals, // >=
    Bang,              // !
    DoubleAmpersand,   // &&
    DoublePipe,        // ||
    Question,          // ?
    Dot,
    LeftBracket,
    RightBracket,
    PlusEquals,        // +=
    MinusEquals,       // -=
    StarEquals,        // *=
    SlashEquals,       // /=
    PlusPlus,          // ++
    MinusMinus,        // --

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Semicolon,
    Comma,
    Colon,
    Arrow, // =>

    EOF,
}

/// A token together with the 1-based position where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the first character in the source.
    pub offset: usize,
}

/// Tokenize `source`, failing on characters and literals outside the grammar.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Lexer::new(source, true).run()
}

/// Tokenize `source`, silently skipping anything that cannot be lexed.
///
/// Never fails. Used by the line heuristics when the strict pipeline has
/// already rejected the program.
pub fn tokenize_lenient(source: &str) -> Vec<SpannedToken> {
    // Lenient mode has no error paths.
    Lexer::new(source, false).run().unwrap_or_default()
}

const RESERVED_WORDS: &[&str] = &[
    "this", "try", "catch", "finally", "throw", "class", "extends", "super", "do", "switch",
    "case", "default", "delete", "void", "instanceof", "in", "with", "yield", "await",
    "import", "export", "enum", "debugger",
];

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    strict: bool,
    line: usize,
    column: usize,
    tokens: Vec<SpannedToken>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, strict: bool) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            strict,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the next character when it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<SpannedToken>, ParseError> {
        trace!(target: "javascript", "Starting tokenization (strict: {})", self.strict);

        while let Some(&(offset, c)) = self.chars.peek() {
            let (line, column) = (self.line, self.column);
            let token = match c {
                // Skip whitespace
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }

                // String literals
                '"' | '\'' => match self.string_literal(c) {
                    Some(string) => Token::String(string),
                    None if self.strict => {
                        return Err(ParseError::at("Unterminated string literal", line));
                    }
                    None => continue,
                },

                // Numbers
                c if c.is_ascii_digit() => self.number(),

                // Identifiers and keywords
                c if c.is_alphabetic() || c == '_' || c == '$' => self.word(),

                '/' => {
                    self.bump();
                    if self.eat('/') {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        continue;
                    } else if self.eat('*') {
                        if !self.block_comment() && self.strict {
                            return Err(ParseError::at("Unterminated block comment", line));
                        }
                        continue;
                    } else if self.eat('=') {
                        Token::SlashEquals
                    } else {
                        Token::Slash
                    }
                }

                // Operators and punctuation
                '+' | '-' | '*' | '%' | '(' | ')' | '{' | '}' | ';' | ',' | '=' | '.' | '|'
                | '&' | '[' | ']' | ':' | '<' | '>' | '!' | '?' => match self.operator(c) {
                    Some(token) => token,
                    None if self.strict => {
                        return Err(ParseError::at(format!("Unsupported operator '{}'", c), line));
                    }
                    None => continue,
                },

                c => {
                    if self.strict {
                        return Err(ParseError::at(format!("Unexpected character '{}'", c), line));
                    }
                    debug!(target: "javascript", "Skipping unknown character: {:?}", c);
                    self.bump();
                    continue;
                }
            };

            trace!(target: "javascript", "Token {:?} at {}:{}", token, line, column);
            self.tokens.push(SpannedToken {
                token,
                line,
                column,
                offset,
            });
        }

        let (line, column) = (self.line, self.column);
        let offset = self.tokens.last().map(|t| t.offset).unwrap_or(0);
        self.tokens.push(SpannedToken {
            token: Token::EOF,
            line,
            column,
            offset,
        });
        debug!(target: "javascript", "Tokenization complete: {} tokens", self.tokens.len());
        Ok(self.tokens)
    }

    /// Returns `None` when the closing quote is missing on the same line.
    fn string_literal(&mut self, quote: char) -> Option<String> {
        self.bump(); // consume opening quote
        let mut string = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                self.bump(); // consume closing quote
                return Some(string);
            } else if c == '\n' {
                return None;
            } else if c == '\\' {
                self.bump(); // consume backslash
                if let Some(next) = self.bump() {
                    string.push(match next {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
            } else {
                string.push(c);
                self.bump();
            }
        }

        None
    }

    fn number(&mut self) -> Token {
        let mut number = String::new();
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                number.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                number.push(c);
            } else if c == '_' {
                // numeric separator
            } else {
                break;
            }
            self.bump();
        }
        Token::Number(number.parse().unwrap_or(0.0))
    }

    fn word(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "let" => Token::Let,
            "const" => Token::Const,
            "var" => Token::Var,
            "function" => Token::Function,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "return" => Token::Return,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "new" => Token::New,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "typeof" => Token::Typeof,
            _ if RESERVED_WORDS.contains(&ident.as_str()) => Token::Reserved(ident),
            _ => Token::Identifier(ident),
        }
    }

    /// Returns `false` if the input ended before `*/`.
    fn block_comment(&mut self) -> bool {
        while let Some(c) = self.bump() {
            if c == '*' && self.eat('/') {
                return true;
            }
        }
        false
    }

    /// Single `&` and `|` are bitwise operators the grammar does not cover.
    fn operator(&mut self, c: char) -> Option<Token> {
        self.bump();
        let token = match c {
            '+' => {
                if self.eat('+') {
                    Token::PlusPlus
                } else if self.eat('=') {
                    Token::PlusEquals
                } else {
                    Token::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    Token::MinusMinus
                } else if self.eat('=') {
                    Token::MinusEquals
                } else {
                    Token::Minus
                }
            }
            '*' => {
                if self.eat('=') {
                    Token::StarEquals
                } else {
                    Token::Star
                }
            }
            '%' => Token::Percent,
            '<' => {
                if self.eat('=') {
                    Token::LessThanEquals
                } else {
                    Token::LessThan
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::GreaterThanEquals
                } else {
                    Token::GreaterThan
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::NotDoubleEquals
                    } else {
                        Token::NotEquals
                    }
                } else {
                    Token::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        Token::TripleEquals
                    } else {
                        Token::DoubleEquals
                    }
                } else if self.eat('>') {
                    Token::Arrow
                } else {
                    Token::Equals
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::DoubleAmpersand
                } else {
                    return None;
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::DoublePipe
                } else {
                    return None;
                }
            }
            '?' => Token::Question,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '{' => Token::LeftBrace,
            '}' => Token::RightBrace,
            ';' => Token::Semicolon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ':' => Token::Colon,
            _ => return None,
        };
        Some(token)
    }
}
