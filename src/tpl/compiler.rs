use crate::error::{Result, TemplateError};
use crate::tpl::operand::parse_expr;
use crate::tpl::{Block, Token, UNRESOLVED};
use regex::Regex;

/// An `If`/`Loop` (or the `Else` that took its place) waiting for its `End`.
struct OpenBlock {
    index: usize,
    offset: usize,
}

/// 扫描 `source` 中的标记，生成带链接的 Token 列表
///
/// 标记之间的文本成为 `Copy`。每个 `If`/`Loop` 必须由一个 `End` 关闭，
/// 中间最多一个 `Else`。
pub(crate) fn compile_tokens(source: &str, pattern: &Regex) -> Result<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut previous = 0;

    for caps in pattern.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let key = caps.get(1).unwrap_or(whole).as_str();
        let offset = whole.start();

        if offset > previous {
            tokens.push(Token::Copy(source[previous..offset].to_string()));
        }
        previous = whole.end();

        let index = tokens.len();
        match key.chars().next() {
            Some('?') => {
                tokens.push(Token::If(open_block(&key[1..])?));
                stack.push(OpenBlock { index, offset });
            }
            Some('*') => {
                tokens.push(Token::Loop(open_block(&key[1..])?));
                stack.push(OpenBlock { index, offset });
            }
            Some('-') => {
                let open = stack.pop().ok_or(TemplateError::UnexpectedElse { offset })?;
                match &mut tokens[open.index] {
                    Token::If(block) | Token::Loop(block) => block.else_index = Some(index),
                    _ => return Err(TemplateError::DuplicateElse { offset }),
                }
                tokens.push(Token::Else {
                    parent_index: open.index,
                    end_index: UNRESOLVED,
                });
                // 块关闭前，else 代替其父节点留在栈中
                stack.push(OpenBlock {
                    index,
                    offset: open.offset,
                });
            }
            Some('.') => {
                let open = stack.pop().ok_or(TemplateError::UnexpectedEnd { offset })?;
                let (parent_index, else_index) = match &mut tokens[open.index] {
                    Token::Else {
                        parent_index,
                        end_index,
                    } => {
                        *end_index = index;
                        (*parent_index, Some(open.index))
                    }
                    _ => (open.index, None),
                };
                if let Token::If(block) | Token::Loop(block) = &mut tokens[parent_index] {
                    block.end_index = index;
                }
                tokens.push(Token::End {
                    parent_index,
                    else_index,
                    end_index: index,
                });
            }
            _ => tokens.push(Token::Var(parse_expr(key)?)),
        }
    }

    if let Some(open) = stack.last() {
        return Err(TemplateError::Unclosed {
            offset: open.offset,
        });
    }

    if source.len() > previous {
        tokens.push(Token::Copy(source[previous..].to_string()));
    }
    Ok(tokens)
}

fn open_block(text: &str) -> Result<Block> {
    Ok(Block {
        expr: parse_expr(text)?,
        else_index: None,
        end_index: UNRESOLVED,
    })
}
