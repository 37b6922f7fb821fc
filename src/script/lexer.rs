//! Tokenizer for the pipeline script language.
//!
//! Scripts are a flat sequence of elements `KEYWORD[:name][(args)][{ body }]`
//! with `//` and `/* */` comments. Bodies are captured as raw text (braces
//! balanced, comments respected) and re-lexed by whoever consumes them, so
//! line numbers are carried through for diagnostics.

use crate::error::{CompileError, SourcePos};
use crate::script::element::{Body, Element};

pub fn lex(text: &str, source: &str, start_line: usize) -> Result<Vec<Element>, CompileError> {
    Lexer::new(text, source, start_line).run()
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(text: &str, source: &'a str, start_line: usize) -> Lexer<'a> {
        Lexer {
            chars: text.chars().collect(),
            pos: 0,
            line: start_line,
            source,
        }
    }

    fn at(&self) -> SourcePos {
        SourcePos::new(self.source, self.line)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Shape {
            message: message.into(),
            at: self.at(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip whitespace and both comment forms.
    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let open = self.at();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek2() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(CompileError::Shape {
                                    message: "unterminated block comment".into(),
                                    at: open,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident(&mut self) -> Option<String> {
        let mut ident = String::new();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Some(ident)
    }

    /// Read `( ... )`, splitting on top-level commas. Comments inside the
    /// argument list are skipped; nested parentheses are kept verbatim.
    fn read_args(&mut self, what: &str) -> Result<Vec<String>, CompileError> {
        let open = self.at();
        self.bump(); // consume '('
        let mut args: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut saw_content = false;
        loop {
            match self.peek() {
                None => {
                    return Err(CompileError::Shape {
                        message: format!("{what} has an unterminated argument list"),
                        at: open,
                    });
                }
                Some('/') if self.peek2() == Some('/') || self.peek2() == Some('*') => {
                    self.skip_trivia()?;
                }
                Some('(') => {
                    depth += 1;
                    current.push('(');
                    self.bump();
                }
                Some(')') if depth > 0 => {
                    depth -= 1;
                    current.push(')');
                    self.bump();
                }
                Some(')') => {
                    self.bump();
                    let last = current.trim();
                    if !last.is_empty() {
                        args.push(last.to_string());
                    } else if saw_content && !args.is_empty() {
                        return Err(self.error(format!("{what} has an empty argument")));
                    }
                    return Ok(args);
                }
                Some(',') if depth == 0 => {
                    self.bump();
                    let arg = current.trim();
                    if arg.is_empty() {
                        return Err(self.error(format!("{what} has an empty argument")));
                    }
                    args.push(arg.to_string());
                    current.clear();
                }
                Some(c) => {
                    if !c.is_whitespace() {
                        saw_content = true;
                    }
                    current.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Read `{ ... }` verbatim, balancing braces while respecting comments.
    fn read_body(&mut self, what: &str) -> Result<Body, CompileError> {
        let open = self.at();
        let body_line = self.line;
        self.bump(); // consume '{'
        let mut text = String::new();
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    return Err(CompileError::Shape {
                        message: format!("{what} has an unterminated body"),
                        at: open,
                    });
                }
                Some('/') if self.peek2() == Some('/') => {
                    // Copy the line comment verbatim; it must not hide braces.
                    while let Some(c) = self.peek() {
                        text.push(c);
                        self.bump();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    text.push('/');
                    text.push('*');
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek2() == Some('/') => {
                                text.push_str("*/");
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(c) => {
                                text.push(c);
                                self.bump();
                            }
                            None => {
                                return Err(CompileError::Shape {
                                    message: "unterminated block comment".into(),
                                    at: open,
                                });
                            }
                        }
                    }
                }
                Some('{') => {
                    depth += 1;
                    text.push('{');
                    self.bump();
                }
                Some('}') => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(Body {
                            text,
                            line: body_line,
                        });
                    }
                    text.push('}');
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn run(mut self) -> Result<Vec<Element>, CompileError> {
        let mut elements = Vec::new();
        loop {
            self.skip_trivia()?;
            let Some(c) = self.peek() else {
                return Ok(elements);
            };
            let at = self.at();
            let Some(keyword) = self.read_ident() else {
                return Err(self.error(format!("unexpected character {c:?}")));
            };

            self.skip_trivia()?;
            let name = if self.peek() == Some(':') {
                self.bump();
                self.skip_trivia()?;
                match self.read_ident() {
                    Some(name) => Some(name),
                    None => {
                        return Err(self.error(format!("{keyword} has an empty name")));
                    }
                }
            } else {
                None
            };

            self.skip_trivia()?;
            let args = if self.peek() == Some('(') {
                self.read_args(&keyword)?
            } else {
                Vec::new()
            };

            self.skip_trivia()?;
            let body = if self.peek() == Some('{') {
                Some(self.read_body(&keyword)?)
            } else {
                None
            };

            elements.push(Element {
                keyword,
                name,
                args,
                body,
                at,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_full_element() {
        let elements = lex("FORMAT:fmt(256, 256, RGBA, UNSIGNED_BYTE)", "s", 1).unwrap();
        assert_eq!(elements.len(), 1);
        let e = &elements[0];
        assert_eq!(e.keyword, "FORMAT");
        assert_eq!(e.name.as_deref(), Some("fmt"));
        assert_eq!(e.args, ["256", "256", "RGBA", "UNSIGNED_BYTE"]);
        assert!(e.body.is_none());
    }

    #[test]
    fn tracks_lines_through_comments() {
        let text = "// header\n/* multi\nline */\nFORMAT:a(1, 1, R, FLOAT)\nFORMAT:b(2, 2, R, FLOAT)";
        let elements = lex(text, "s", 1).unwrap();
        assert_eq!(elements[0].at.line, 4);
        assert_eq!(elements[1].at.line, 5);
    }

    #[test]
    fn body_keeps_nested_braces_and_line() {
        let text = "SHADER:copy {\nfn f() {\n  { }\n}\n}\nFORMAT:a(1, 1, R, FLOAT)";
        let elements = lex(text, "s", 1).unwrap();
        let body = elements[0].body.as_ref().unwrap();
        assert!(body.text.contains("fn f() {"));
        assert_eq!(body.line, 1);
        assert_eq!(elements[1].at.line, 6);
    }

    #[test]
    fn braces_inside_body_comments_ignored() {
        let text = "SHADER:s {\n// pretend {\nlet x = 1;\n}";
        let elements = lex(text, "s", 1).unwrap();
        assert!(elements[0].body.as_ref().unwrap().text.contains("let x"));
    }

    #[test]
    fn empty_argument_rejected() {
        let err = lex("FORMAT:a(1,,2)", "s", 1).unwrap_err();
        assert!(err.to_string().contains("empty argument"));
    }

    #[test]
    fn unterminated_body_rejected() {
        let err = lex("PIPELINE:p {\nINPUT(a)", "s", 1).unwrap_err();
        assert!(err.to_string().contains("unterminated body"));
    }

    #[test]
    fn unknown_leading_character_rejected() {
        let err = lex("(oops)", "s", 1).unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }
}
