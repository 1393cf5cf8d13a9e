//! Strict grammar over the code block the model returns.
//!
//! The reply contract allows helper statements (variable definitions,
//! comments) inside the block; only lines invoking the `actions.` namespace
//! are executable. Each such call must fully match the grammar below or the
//! whole turn is rejected with a structured [`ActionError`]:
//!
//! ```text
//! call    := "actions" "." ident "(" args ")"
//! args    := (value ("," value)* ("," kwarg)*)?      # kwargs: `act` only
//! value   := int | float | string | bool | none | list | dict
//! ```

use super::{Action, ScrollDirection, Turn};
use crate::error::ActionError;
use serde_json::{Map, Number, Value};

/// Parse one reply's code block into a validated [`Turn`].
pub fn parse_turn(code: &str) -> Result<Turn, ActionError> {
    let calls = action_statements(code)
        .iter()
        .map(|stmt| parse_statement(stmt))
        .collect::<Result<Vec<_>, _>>()?;
    Turn::from_calls(calls)
}

/// Parse a multi-candidate reply: exactly 10 distinct proposals for the
/// current frame, intended for offline ranking rather than execution.
pub fn parse_candidates(code: &str) -> Result<Vec<Action>, ActionError> {
    let candidates = action_statements(code)
        .iter()
        .map(|stmt| parse_statement(stmt))
        .collect::<Result<Vec<_>, _>>()?;
    if candidates.len() != 10 {
        return Err(ActionError::CandidateCount {
            got: candidates.len(),
        });
    }
    for (i, a) in candidates.iter().enumerate() {
        if candidates[..i].contains(a) {
            return Err(ActionError::DuplicateCandidates);
        }
    }
    Ok(candidates)
}

// ─── Statement extraction ───────────────────────────────────────────────────

/// Pull out every `actions.` statement, joining continuation lines while a
/// call's parentheses are still open (multi-line dict/list literals).
fn action_statements(code: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut lines = code.lines();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if !trimmed.starts_with("actions.") {
            continue;
        }
        let mut statement = trimmed.to_string();
        while open_parens(&statement) > 0 {
            let Some(next) = lines.next() else { break };
            statement.push('\n');
            statement.push_str(next.trim());
        }
        statements.push(statement);
    }
    statements
}

/// Net open-paren depth, ignoring parens inside string literals and comments.
fn open_parens(statement: &str) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in statement.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '#' => break,
                _ => {}
            },
        }
    }
    depth
}

// ─── Lexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Equals,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ActionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '#' => {
                // comment runs to end of line
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '(' => push_symbol(&mut tokens, &mut chars, Token::LParen),
            ')' => push_symbol(&mut tokens, &mut chars, Token::RParen),
            '[' => push_symbol(&mut tokens, &mut chars, Token::LBracket),
            ']' => push_symbol(&mut tokens, &mut chars, Token::RBracket),
            '{' => push_symbol(&mut tokens, &mut chars, Token::LBrace),
            '}' => push_symbol(&mut tokens, &mut chars, Token::RBrace),
            ',' => push_symbol(&mut tokens, &mut chars, Token::Comma),
            ':' => push_symbol(&mut tokens, &mut chars, Token::Colon),
            '.' => push_symbol(&mut tokens, &mut chars, Token::Dot),
            '=' => push_symbol(&mut tokens, &mut chars, Token::Equals),
            '\'' | '"' => tokens.push(lex_string(&mut chars)?),
            '-' | '0'..='9' => tokens.push(lex_number(&mut chars)?),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ActionError::Syntax(format!(
                    "unexpected character `{other}`"
                )))
            }
        }
    }
    Ok(tokens)
}

fn push_symbol(
    tokens: &mut Vec<Token>,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    token: Token,
) {
    chars.next();
    tokens.push(token);
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Token, ActionError> {
    let quote = chars.next().unwrap_or('"');
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err(ActionError::Syntax("unterminated string literal".into())),
            Some(c) if c == quote => return Ok(Token::Str(value)),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(escaped) => value.push(escaped),
                None => return Err(ActionError::Syntax("unterminated string literal".into())),
            },
            Some(c) => value.push(c),
        }
    }
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Token, ActionError> {
    let mut text = String::new();
    if chars.peek() == Some(&'-') {
        text.push('-');
        chars.next();
    }
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else if c == '.' && !is_float {
            is_float = true;
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ActionError::Syntax(format!("invalid number `{text}`")))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ActionError::Syntax(format!("invalid number `{text}`")))
    }
}

// ─── Call parser ────────────────────────────────────────────────────────────

struct Call {
    name: String,
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ActionError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(ActionError::Syntax(format!(
                "expected {what}, found {other:?}"
            ))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ActionError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(ActionError::Syntax(format!(
                "expected {what}, found {other:?}"
            ))),
        }
    }

    fn parse_call(&mut self) -> Result<Call, ActionError> {
        let namespace = self.expect_ident("`actions` namespace")?;
        if namespace != "actions" {
            return Err(ActionError::Syntax(format!(
                "calls must target the `actions` namespace, found `{namespace}`"
            )));
        }
        self.expect(&Token::Dot, "`.`")?;
        let name = self.expect_ident("action name")?;
        self.expect(&Token::LParen, "`(`")?;

        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RParen) => {
                    self.next();
                    break;
                }
                None => return Err(ActionError::Syntax("unterminated call".into())),
                _ => {}
            }

            // `ident =` starts a keyword argument; any other ident is an
            // unresolvable variable reference and rejected outright.
            if let Some(Token::Ident(ident)) = self.peek() {
                let ident = ident.clone();
                if !matches!(
                    ident.as_str(),
                    "True" | "False" | "None" | "true" | "false" | "null"
                ) {
                    self.next();
                    self.expect(&Token::Equals, "`=` after keyword name")?;
                    let value = self.parse_value()?;
                    keyword.push((ident, value));
                    self.finish_argument()?;
                    continue;
                }
            }

            if !keyword.is_empty() {
                return Err(ActionError::Syntax(
                    "positional argument after keyword argument".into(),
                ));
            }
            let value = self.parse_value()?;
            positional.push(value);
            self.finish_argument()?;
        }

        if self.peek().is_some() {
            return Err(ActionError::Syntax(
                "trailing tokens after action call".into(),
            ));
        }

        Ok(Call {
            name,
            positional,
            keyword,
        })
    }

    /// Consume the `,` between arguments, tolerating a trailing comma.
    fn finish_argument(&mut self) -> Result<(), ActionError> {
        match self.peek() {
            Some(Token::Comma) => {
                self.next();
                Ok(())
            }
            Some(Token::RParen) | None => Ok(()),
            other => Err(ActionError::Syntax(format!(
                "expected `,` or `)`, found {other:?}"
            ))),
        }
    }

    fn parse_value(&mut self) -> Result<Value, ActionError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Value::Number(n.into())),
            Some(Token::Float(f)) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| ActionError::Syntax(format!("non-finite number `{f}`"))),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                "None" | "null" => Ok(Value::Null),
                other => Err(ActionError::Syntax(format!(
                    "unsupported expression `{other}` (only literals are allowed)"
                ))),
            },
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                loop {
                    if self.peek() == Some(&Token::RBracket) {
                        self.next();
                        return Ok(Value::Array(items));
                    }
                    items.push(self.parse_value()?);
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.next();
                        }
                        Some(Token::RBracket) => {}
                        other => {
                            return Err(ActionError::Syntax(format!(
                                "expected `,` or `]`, found {other:?}"
                            )))
                        }
                    }
                }
            }
            Some(Token::LBrace) => {
                let mut map = Map::new();
                loop {
                    match self.next() {
                        Some(Token::RBrace) => return Ok(Value::Object(map)),
                        Some(Token::Str(key)) => {
                            self.expect(&Token::Colon, "`:` after dict key")?;
                            let value = self.parse_value()?;
                            map.insert(key, value);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.next();
                                }
                                Some(Token::RBrace) => {}
                                other => {
                                    return Err(ActionError::Syntax(format!(
                                        "expected `,` or `}}`, found {other:?}"
                                    )))
                                }
                            }
                        }
                        other => {
                            return Err(ActionError::Syntax(format!(
                                "dict keys must be string literals, found {other:?}"
                            )))
                        }
                    }
                }
            }
            other => Err(ActionError::Syntax(format!(
                "expected a literal, found {other:?}"
            ))),
        }
    }
}

fn parse_statement(statement: &str) -> Result<Action, ActionError> {
    let tokens = tokenize(statement)?;
    let mut parser = Parser { tokens, pos: 0 };
    let call = parser.parse_call()?;
    build_action(call)
}

// ─── Vocabulary validation ──────────────────────────────────────────────────

fn build_action(call: Call) -> Result<Action, ActionError> {
    // Only `act` may carry keyword arguments: its trailing kwargs are the
    // sub-task's argument mapping. Everything else is strictly positional.
    if call.name != "act" {
        if let Some((argument, _)) = call.keyword.first() {
            return Err(ActionError::KeywordArgument {
                action: call.name,
                argument: argument.clone(),
            });
        }
    }

    let name = call.name.as_str();
    match name {
        "click" => {
            check_arity(name, &call.positional, 1)?;
            Ok(Action::Click {
                element_id: element_id(name, &call.positional, 0)?,
            })
        }
        "input_text" => {
            check_arity(name, &call.positional, 4)?;
            Ok(Action::InputText {
                element_id: element_id(name, &call.positional, 0)?,
                text: string_arg(name, &call.positional, 1)?,
                clear_before_input: bool_arg(name, &call.positional, 2)?,
                log_message: string_arg(name, &call.positional, 3)?,
            })
        }
        "upload_files" => {
            check_arity(name, &call.positional, 3)?;
            Ok(Action::UploadFiles {
                element_id: element_id(name, &call.positional, 0)?,
                files: string_list_arg(name, &call.positional, 1)?,
                log_message: string_arg(name, &call.positional, 2)?,
            })
        }
        "scroll" => {
            check_arity(name, &call.positional, 2)?;
            let direction = match string_arg(name, &call.positional, 0)?.as_str() {
                "up" => ScrollDirection::Up,
                "down" => ScrollDirection::Down,
                other => {
                    return Err(ActionError::BadArgument {
                        action: name.into(),
                        index: 0,
                        message: format!("direction must be 'up' or 'down', got '{other}'"),
                    })
                }
            };
            Ok(Action::Scroll {
                direction,
                log_message: string_arg(name, &call.positional, 1)?,
            })
        }
        "combobox_select" => {
            check_arity(name, &call.positional, 3)?;
            Ok(Action::ComboboxSelect {
                element_id: element_id(name, &call.positional, 0)?,
                option: string_arg(name, &call.positional, 1)?,
                log_message: string_arg(name, &call.positional, 2)?,
            })
        }
        "finish" => {
            check_arity(name, &call.positional, 3)?;
            let output = match &call.positional[1] {
                Value::Null => None,
                Value::Object(map) => Some(map.clone()),
                other => {
                    return Err(ActionError::BadArgument {
                        action: name.into(),
                        index: 1,
                        message: format!("output must be a dict or None, got {other}"),
                    })
                }
            };
            Ok(Action::Finish {
                did_succeed: bool_arg(name, &call.positional, 0)?,
                output,
                reason: string_arg(name, &call.positional, 2)?,
            })
        }
        "act" => {
            check_arity(name, &call.positional, 3)?;
            let mut args = Map::new();
            for (key, value) in call.keyword {
                args.insert(key, value);
            }
            Ok(Action::Act {
                url: string_arg(name, &call.positional, 0)?,
                task: string_arg(name, &call.positional, 1)?,
                log_message: string_arg(name, &call.positional, 2)?,
                args,
            })
        }
        other => Err(ActionError::UnknownAction(other.to_string())),
    }
}

fn check_arity(action: &str, positional: &[Value], expected: usize) -> Result<(), ActionError> {
    if positional.len() == expected {
        Ok(())
    } else {
        Err(ActionError::Arity {
            action: action.into(),
            expected,
            got: positional.len(),
        })
    }
}

fn element_id(action: &str, positional: &[Value], index: usize) -> Result<u32, ActionError> {
    match positional[index].as_i64() {
        Some(id) if id >= 0 && id <= i64::from(u32::MAX) => Ok(id as u32),
        _ => Err(ActionError::BadArgument {
            action: action.into(),
            index,
            message: format!(
                "element id must be a non-negative integer, got {}",
                positional[index]
            ),
        }),
    }
}

fn string_arg(action: &str, positional: &[Value], index: usize) -> Result<String, ActionError> {
    match &positional[index] {
        Value::String(s) => Ok(s.clone()),
        other => Err(ActionError::BadArgument {
            action: action.into(),
            index,
            message: format!("expected a string, got {other}"),
        }),
    }
}

fn bool_arg(action: &str, positional: &[Value], index: usize) -> Result<bool, ActionError> {
    match &positional[index] {
        Value::Bool(b) => Ok(*b),
        other => Err(ActionError::BadArgument {
            action: action.into(),
            index,
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

fn string_list_arg(
    action: &str,
    positional: &[Value],
    index: usize,
) -> Result<Vec<String>, ActionError> {
    let Value::Array(items) = &positional[index] else {
        return Err(ActionError::BadArgument {
            action: action.into(),
            index,
            message: format!("expected a list of strings, got {}", positional[index]),
        });
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(ActionError::BadArgument {
                action: action.into(),
                index,
                message: format!("expected a list of strings, found element {other}"),
            }),
        })
        .collect()
}
