use crate::error::{Result, TemplateError};
use crate::tpl::filters::FilterRegistry;
use crate::tpl::{Arg, Expr, Operand, PathRoot};
use crate::value::Value;
use std::borrow::Cow;

/// 当前活动的循环：被迭代的元素以及当前位置
#[derive(Debug, Clone)]
pub struct LoopFrame {
    items: Vec<Value>,
    index: usize,
}

static NULL: Value = Value::Null;

impl LoopFrame {
    // 字符串按字符预先拆开，逐项访问为 O(1)
    pub(crate) fn new(sequence: Value) -> Self {
        let items = match sequence {
            Value::List(items) => items,
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            _ => Vec::new(),
        };
        Self { items, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self) -> &Value {
        self.items.get(self.index).unwrap_or(&NULL)
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.items.len()
    }

    /// 前进到下一项，序列耗尽时返回 `false`
    pub(crate) fn advance(&mut self) -> bool {
        self.index += 1;
        self.index < self.items.len()
    }
}

/// 表达式及其过滤器在执行期间可见的上下文
///
/// 每个 Token 的求值使用一个独立的 Scope。`nodef` 在每次嵌套 [`Scope::resolve`]
/// 前后保存并恢复，作为参数的子表达式不会把抑制状态泄漏给外层的值。
pub struct Scope<'a> {
    dict: &'a Value,
    loops: &'a [LoopFrame],
    filters: &'a FilterRegistry,
    nodef: bool,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(dict: &'a Value, loops: &'a [LoopFrame], filters: &'a FilterRegistry) -> Self {
        Self {
            dict,
            loops,
            filters,
            nodef: false,
        }
    }

    /// 执行模板时传入的根数据
    pub fn dict(&self) -> &'a Value {
        self.dict
    }

    /// 从最内层往外数第 `depth` 层循环（`0` 为最内层），超出范围返回 `None`
    pub fn loop_frame(&self, depth: usize) -> Option<&'a LoopFrame> {
        let loops = self.loops;
        loops.len().checked_sub(depth)?.checked_sub(1).map(|i| &loops[i])
    }

    /// 跳过当前值的默认过滤器
    pub fn suppress_default(&mut self) {
        self.nodef = true;
    }

    pub fn resolve_operand(&mut self, arg: &Arg) -> Result<Value> {
        match &arg.operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Path(expr) => self.resolve(expr, false),
            Operand::Raw { reason } => Err(TemplateError::LiteralParse {
                literal: arg.text.clone(),
                reason: reason.clone(),
            }),
        }
    }

    /// 查找 `expr` 的路径，再依次执行其过滤器。`use_default` 为真时，
    /// 除非被过滤器抑制，最后再执行注册表的默认过滤器。
    pub fn resolve(&mut self, expr: &Expr, use_default: bool) -> Result<Value> {
        self.resolve_cow(expr, use_default).map(Cow::into_owned)
    }

    // 没有过滤器要执行时直接借用数据，不做拷贝
    pub(crate) fn resolve_cow(&mut self, expr: &Expr, use_default: bool) -> Result<Cow<'a, Value>> {
        let value = match expr.root {
            PathRoot::Dict => self.dict.lookup(&expr.path),
            PathRoot::Loop(depth) => match self.loop_frame(depth) {
                Some(frame) => frame.item().lookup(&expr.path),
                None => Cow::Owned(Value::Null),
            },
        };
        let with_default = use_default && self.filters.default_name().is_some();
        if expr.filters.is_empty() && !with_default {
            return Ok(value);
        }

        let saved = std::mem::replace(&mut self.nodef, false);
        let result = self.apply_filters(value.into_owned(), expr, use_default);
        self.nodef = saved;
        result.map(Cow::Owned)
    }

    fn apply_filters(&mut self, mut value: Value, expr: &Expr, use_default: bool) -> Result<Value> {
        let filters = self.filters;
        for call in &expr.filters {
            let filter = filters
                .get(&call.name)
                .ok_or_else(|| TemplateError::UnknownFilter(call.name.clone()))?;
            value = filter.apply(value, &call.args, self)?;
        }
        if use_default && !self.nodef {
            if let Some(name) = filters.default_name() {
                let filter = filters
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownFilter(name.to_string()))?;
                value = filter.apply(value, &[], self)?;
            }
        }
        Ok(value)
    }
}
