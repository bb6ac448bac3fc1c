use crate::error::Result;
use crate::tpl::Token;
use crate::tpl::filters::FilterRegistry;
use crate::tpl::scope::{LoopFrame, Scope};
use crate::value::Value;

/// 已进入的块的控制帧，`Loop` 帧对应循环栈的栈顶
enum Frame {
    If,
    Loop,
}

/// 针对 `dict` 执行一遍 Token 列表
///
/// 跳转时把 `i` 设为目标 Token，再由公共的 `i += 1` 越过它：
/// 进入分支的第一个 Token，或越过已结束块的 `End`。
pub(crate) fn execute(tokens: &[Token], dict: &Value, filters: &FilterRegistry) -> Result<String> {
    let mut out = String::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut loops: Vec<LoopFrame> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Copy(text) => out.push_str(text),
            Token::Var(expr) => {
                let value = Scope::new(dict, &loops, filters).resolve_cow(expr, true)?;
                out.push_str(&value.to_string());
            }
            Token::If(block) => {
                let value = Scope::new(dict, &loops, filters).resolve_cow(&block.expr, false)?;
                if value.is_truthy() {
                    stack.push(Frame::If);
                } else if let Some(else_index) = block.else_index {
                    stack.push(Frame::If);
                    i = else_index;
                } else {
                    i = block.end_index;
                }
            }
            Token::Loop(block) => {
                let value = Scope::new(dict, &loops, filters).resolve_cow(&block.expr, false)?;
                let frame = LoopFrame::new(value.into_owned());
                if !frame.is_empty() {
                    stack.push(Frame::Loop);
                    loops.push(frame);
                } else if let Some(else_index) = block.else_index {
                    // 空循环的 else 分支按 if 处理
                    stack.push(Frame::If);
                    i = else_index;
                } else {
                    i = block.end_index;
                }
            }
            Token::Else {
                parent_index,
                end_index,
            }
            | Token::End {
                parent_index,
                end_index,
                ..
            } => match stack.last() {
                Some(Frame::Loop) => {
                    if loops.last_mut().is_some_and(LoopFrame::advance) {
                        i = *parent_index;
                    } else {
                        loops.pop();
                        stack.pop();
                        i = *end_index;
                    }
                }
                Some(Frame::If) => {
                    stack.pop();
                    i = *end_index;
                }
                None => i = *end_index,
            },
        }
        i += 1;
    }

    debug_assert!(stack.is_empty() && loops.is_empty());
    Ok(out)
}
