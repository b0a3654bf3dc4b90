//! 属性样式字符串
//!
//! 图、段、边都可以由一串 `key = value` 属性创建，例如：
//!
//! ```text
//! id = intro asset = "music/intro loop.flac" offset = 0 duration = 44100
//! ```
//!
//! - 键值对之间用空白分隔，`=` 两侧的空白可有可无
//! - 值中含空白、`=` 或引号时用双引号包裹，`\` 转义下一个字符
//! - 同一个键出现两次视为错误

use std::str::FromStr;

use super::GraphError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Equals,
}

/// 解析后的属性列表（保持书写顺序）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleAttributes {
    pairs: Vec<(String, String)>,
}

impl StyleAttributes {
    /// 解析样式字符串
    pub fn parse(style: &str) -> Result<Self, GraphError> {
        let tokens = tokenize(style)?;
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut iter = tokens.into_iter();

        while let Some(token) = iter.next() {
            let key = match token {
                Token::Word(key) if !key.is_empty() => key,
                Token::Word(_) => return Err(GraphError::invalid("empty attribute name")),
                Token::Equals => return Err(GraphError::invalid("expected attribute name before '='")),
            };

            match iter.next() {
                Some(Token::Equals) => {}
                _ => {
                    return Err(GraphError::invalid(format!(
                        "expected '=' after attribute '{}'",
                        key
                    )))
                }
            }

            let value = match iter.next() {
                Some(Token::Word(value)) => value,
                _ => {
                    return Err(GraphError::invalid(format!(
                        "missing value for attribute '{}'",
                        key
                    )))
                }
            };

            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(GraphError::invalid(format!("duplicate attribute '{}'", key)));
            }
            pairs.push((key, value));
        }

        Ok(Self { pairs })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn tokenize(style: &str) -> Result<Vec<Token>, GraphError> {
    let mut tokens = Vec::new();
    let mut chars = style.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '=' {
            chars.next();
            tokens.push(Token::Equals);
            continue;
        }

        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err(GraphError::invalid("unterminated quoted value"));
            }
            tokens.push(Token::Word(value));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '=' || c == '"' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }

    Ok(tokens)
}

/// 按需加引号，使 `render` 的输出可以被 `parse` 还原
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '=' || c == '"' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// 生成规范化的样式字符串
pub(crate) fn render(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{} = {}", key, quote(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, GraphError> {
    value.parse::<T>().map_err(|_| {
        GraphError::invalid(format!("attribute '{}' has invalid value '{}'", key, value))
    })
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, GraphError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(GraphError::invalid(format!(
            "attribute '{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}

pub(crate) fn unknown(kind: &str, key: &str) -> GraphError {
    GraphError::invalid(format!("unknown {} attribute '{}'", kind, key))
}
