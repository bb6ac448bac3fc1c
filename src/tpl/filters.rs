use crate::error::Result;
use crate::tpl::Arg;
use crate::tpl::scope::Scope;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// 作用于已求值结果的具名转换
///
/// `args` 是预解析的 `:arg` 操作数，用 [`Scope::resolve_operand`] 求出其值。
/// 任何 `Fn(Value, &[Arg], &mut Scope) -> Result<Value>` 都可以作为过滤器。
pub trait Filter: Send + Sync {
    fn apply(&self, value: Value, args: &[Arg], scope: &mut Scope<'_>) -> Result<Value>;
}

impl<F> Filter for F
where
    F: Fn(Value, &[Arg], &mut Scope<'_>) -> Result<Value> + Send + Sync,
{
    fn apply(&self, value: Value, args: &[Arg], scope: &mut Scope<'_>) -> Result<Value> {
        self(value, args, scope)
    }
}

static STANDARD: LazyLock<Arc<FilterRegistry>> =
    LazyLock::new(|| Arc::new(standard_filters()));

/// 按名称登记的过滤器集合
/// 可以委托给父注册表：自身未定义的名称（包括默认过滤器的指定）到父级查找。
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
    default: Option<String>,
    parent: Option<Arc<FilterRegistry>>,
}

impl FilterRegistry {
    /// 空注册表，未定义的名称回落到标准过滤器
    pub fn new() -> Self {
        Self::delegate(Self::standard())
    }

    pub fn delegate(parent: Arc<FilterRegistry>) -> Self {
        Self {
            filters: HashMap::new(),
            default: None,
            parent: Some(parent),
        }
    }

    /// 既没有过滤器也没有父级的注册表
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
            default: None,
            parent: None,
        }
    }

    /// 共享的标准过滤器集合
    pub fn standard() -> Arc<FilterRegistry> {
        STANDARD.clone()
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(Value, &[Arg], &mut Scope<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(Value, &[Arg], &mut Scope<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, filter);
        self
    }

    /// 指定默认过滤器，每次替换都会执行，除非使用了 `nodef`
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default = Some(name.into());
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.set_default(name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        match self.filters.get(name) {
            Some(f) => Some(f.as_ref()),
            None => self.parent.as_ref().and_then(|p| p.get(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn default_name(&self) -> Option<&str> {
        match &self.default {
            Some(name) => Some(name),
            None => self.parent.as_ref().and_then(|p| p.default_name()),
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .field("default", &self.default)
            .field("parent", &self.parent)
            .finish()
    }
}

fn standard_filters() -> FilterRegistry {
    let mut r = FilterRegistry::empty();

    r.insert("nodef", |value, _, scope| {
        scope.suppress_default();
        Ok(value)
    });

    // 安全输出，可作为默认过滤器
    r.insert("safeHtml", |value, _, _| {
        Ok(Value::Str(escape_html(&value.to_string(), false)))
    });
    r.insert("safeHtmlAttr", |value, _, _| {
        Ok(Value::Str(escape_html(&value.to_string(), true)))
    });
    r.insert("safeUri", |value, _, _| {
        Ok(Value::Str(encode_uri(&value.to_string(), URI_RESERVED)))
    });
    r.insert("safeUriComponent", |value, _, _| {
        Ok(Value::Str(encode_uri(&value.to_string(), "")))
    });
    r.insert("safeEscape", |value, _, _| {
        Ok(Value::Str(legacy_escape(&value.to_string())))
    });

    // 值处理
    r.insert("call", call);
    r.insert("sub", |value, args, _| {
        Ok(match args.first() {
            Some(arg) => value.lookup_path(&arg.text.split('.').collect::<Vec<_>>()),
            None => value,
        })
    });
    r.insert("str", |value, _, _| Ok(Value::Str(value.to_string())));
    r.insert("void", |_, _, _| Ok(Value::Str(String::new())));

    // 循环位置
    r.insert("first", |value, args, scope| {
        let (index, _) = loop_position(&value, args, scope)?;
        Ok(Value::Bool(index == 0.0))
    });
    r.insert("last", |value, args, scope| {
        let (_, last) = loop_position(&value, args, scope)?;
        Ok(Value::Bool(last))
    });
    r.insert("even", |value, args, scope| {
        let (index, _) = loop_position(&value, args, scope)?;
        Ok(Value::Bool(index % 2.0 == 0.0))
    });
    r.insert("odd", |value, args, scope| {
        let (index, _) = loop_position(&value, args, scope)?;
        Ok(Value::Bool((index % 2.0).abs() == 1.0))
    });

    // 逻辑
    r.insert("eq", |value, args, scope| compare_with(value, args, scope, Value::loose_eq));
    r.insert("is", |value, args, scope| compare_with(value, args, scope, Value::strict_eq));
    r.insert("lt", |value, args, scope| {
        compare_with(value, args, scope, |a, b| a.compare(b) == Some(Ordering::Less))
    });
    r.insert("le", |value, args, scope| {
        compare_with(value, args, scope, |a, b| {
            matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal))
        })
    });
    r.insert("gt", |value, args, scope| {
        compare_with(value, args, scope, |a, b| a.compare(b) == Some(Ordering::Greater))
    });
    r.insert("ge", |value, args, scope| {
        compare_with(value, args, scope, |a, b| {
            matches!(a.compare(b), Some(Ordering::Greater | Ordering::Equal))
        })
    });
    r.insert("not", |value, _, _| Ok(Value::Bool(!value.is_truthy())));

    r
}

// `call` 调用值本身，`call:name` 调用值的成员 `name`
fn call(value: Value, args: &[Arg], scope: &mut Scope<'_>) -> Result<Value> {
    let target = match args.first() {
        Some(arg) => {
            let key = scope.resolve_operand(arg)?.to_string();
            value.lookup_path(&[key])
        }
        None => value,
    };
    Ok(match target {
        Value::Func(f) => f.call(),
        _ => Value::Null,
    })
}

// 最内层循环（或向外 `:N` 层循环）的下标，以及是否为最后一项。
// 没有对应的循环时，把管道传入的值当作下标，且不是最后一项。
// 过大的 N 转为 usize 时饱和，由 `loop_frame` 视为不存在。
fn loop_position(value: &Value, args: &[Arg], scope: &mut Scope<'_>) -> Result<(f64, bool)> {
    let depth = match args.first() {
        Some(arg) => {
            let n = scope.resolve_operand(arg)?.to_number();
            if n.is_finite() && n >= 0.0 { n as usize } else { 0 }
        }
        None => 0,
    };
    Ok(match scope.loop_frame(depth) {
        Some(frame) => (frame.index() as f64, frame.is_last()),
        None => (value.to_number(), false),
    })
}

fn compare_with(
    value: Value,
    args: &[Arg],
    scope: &mut Scope<'_>,
    op: fn(&Value, &Value) -> bool,
) -> Result<Value> {
    Ok(Value::Bool(match args.first() {
        Some(arg) => op(&value, &scope.resolve_operand(arg)?),
        None => false,
    }))
}

// `&` 后面像实体时保持原样：单词字符之后紧跟 `;`、空白或文本结尾
fn starts_entity(rest: &str) -> bool {
    let word = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if word == 0 {
        return false;
    }
    match rest[word..].chars().next() {
        None => true,
        Some(c) => c == ';' || c.is_whitespace(),
    }
}

fn escape_html(text: &str, attr: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if !starts_entity(&text[i + 1..]) => out.push_str("&amp;"),
            '<' if !attr => out.push_str("&lt;"),
            '>' if !attr => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\'' if attr => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

const URI_RESERVED: &str = ";,/?:@&=+$#";
const URI_MARKS: &str = "-_.!~*'()";

// 非保留字符集（及 `keep`）以外的字符按 UTF-8 做百分号编码
fn encode_uri(text: &str, keep: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_ascii_alphanumeric() || URI_MARKS.contains(c) || keep.contains(c) {
            if let Some(start) = run.take() {
                out.push_str(&urlencoding::encode(&text[start..i]));
            }
            out.push(c);
        } else if run.is_none() {
            run = Some(i);
        }
    }
    if let Some(start) = run {
        out.push_str(&urlencoding::encode(&text[start..]));
    }
    out
}

// 旧式 `escape()` 编码：小于 256 用 `%XX`，其余按 UTF-16 单元输出 `%uXXXX`
fn legacy_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut units = [0u16; 2];
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || "@*_+-./".contains(c) {
            out.push(c);
            continue;
        }
        for unit in c.encode_utf16(&mut units) {
            if *unit < 256 {
                out.push_str(&format!("%{:02X}", unit));
            } else {
                out.push_str(&format!("%u{:04X}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tpl::operand::parse_expr;
    use crate::tpl::scope::LoopFrame;
    use crate::value::Function;
    use serde_json::json;

    fn eval(source: &str, dict: &Value) -> Value {
        let registry = FilterRegistry::standard();
        let mut scope = Scope::new(dict, &[], &registry);
        scope.resolve(&parse_expr(source).unwrap(), true).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>Al</b>", false), "&lt;b&gt;Al&lt;/b&gt;");
        assert_eq!(escape_html("Tom & Jerry", false), "Tom &amp; Jerry");
        assert_eq!(escape_html("&amp; &lt;", false), "&amp; &lt;");
        assert_eq!(escape_html("a&&b", false), "a&amp;&b");
        assert_eq!(escape_html(r#"say "hi" & 'bye'"#, true), "say &quot;hi&quot; &amp; &apos;bye&apos;");
        assert_eq!(escape_html("<x>", true), "<x>");
    }

    #[test]
    fn test_uri_encodings() {
        assert_eq!(encode_uri("http://x.com/a b?q=1&r=é", URI_RESERVED), "http://x.com/a%20b?q=1&r=%C3%A9");
        assert_eq!(encode_uri("a b/c?d=e", ""), "a%20b%2Fc%3Fd%3De");
        assert_eq!(encode_uri("it's(ok)!~*", ""), "it's(ok)!~*");
    }

    #[test]
    fn test_legacy_escape() {
        assert_eq!(legacy_escape("a b+c@d"), "a%20b+c@d");
        assert_eq!(legacy_escape("é€"), "%E9%u20AC");
        assert_eq!(legacy_escape("😀"), "%uD83D%uDE00");
    }

    #[test]
    fn test_value_filters() {
        let dict = Value::from(json!({"n": 5, "o": {"a": {"b": "deep"}}, "s": "x"}));
        assert_eq!(eval("n|str", &dict), Value::from("5"));
        assert_eq!(eval("n|void", &dict), Value::from(""));
        assert_eq!(eval("o|sub:a.b", &dict), Value::from("deep"));
        assert_eq!(eval("o|sub:a.z", &dict), Value::Null);
        let rows = Value::from(json!({"rows": [{"name": "r0"}, {"name": "r1"}]}));
        assert_eq!(eval("rows|sub:1.name", &rows), Value::from("r1"));
        assert_eq!(eval("rows|sub:0.name|safeHtml", &rows), Value::from("r0"));
        assert_eq!(eval("rows|sub:length", &rows), Value::Int(2));
        assert_eq!(eval("n|not", &dict), Value::Bool(false));
        assert_eq!(eval("missing|not", &dict), Value::Bool(true));
    }

    #[test]
    fn test_comparisons() {
        let dict = Value::from(json!({"a": 10, "b": 10.0, "s": "10", "limit": 12}));
        assert_eq!(eval("a|gt:5", &dict), Value::Bool(true));
        assert_eq!(eval("a|lt:5", &dict), Value::Bool(false));
        assert_eq!(eval("a|le:10", &dict), Value::Bool(true));
        assert_eq!(eval("a|ge:11", &dict), Value::Bool(false));
        assert_eq!(eval("a|eq:s", &dict), Value::Bool(true));
        assert_eq!(eval("a|is:s", &dict), Value::Bool(false));
        assert_eq!(eval("a|is:b", &dict), Value::Bool(true));
        assert_eq!(eval("a|lt:limit", &dict), Value::Bool(true));
        assert_eq!(eval("s|eq:'10'", &dict), Value::Bool(true));
        assert_eq!(eval("a|eq", &dict), Value::Bool(false));
    }

    #[test]
    fn test_call() {
        let mut map = HashMap::new();
        map.insert("f".to_string(), Value::Func(Function::new(|| Value::from("hi"))));
        map.insert("g".to_string(), Value::from(3));
        let mut obj = HashMap::new();
        obj.insert("greet".to_string(), Value::Func(Function::new(|| Value::from("hello"))));
        map.insert("obj".to_string(), Value::Map(obj));
        let dict = Value::Map(map);

        assert_eq!(eval("f|call", &dict), Value::from("hi"));
        assert_eq!(eval("obj|call:'greet'", &dict), Value::from("hello"));
        assert_eq!(eval("g|call", &dict), Value::Null);
        assert_eq!(eval("obj|call:'nope'", &dict), Value::Null);
    }

    #[test]
    fn test_loop_position_filters() {
        let dict = Value::Null;
        let registry = FilterRegistry::standard();
        let mut outer = LoopFrame::new(Value::from(vec![1, 2]));
        assert!(outer.advance());
        let inner = LoopFrame::new(Value::from(vec![1, 2, 3]));
        let loops = vec![outer, inner];
        let mut scope = Scope::new(&dict, &loops, &registry);

        let mut check = |src: &str| scope.resolve(&parse_expr(src).unwrap(), false).unwrap();
        assert_eq!(check("%|first"), Value::Bool(true));
        assert_eq!(check("%|last"), Value::Bool(false));
        assert_eq!(check("%|even"), Value::Bool(true));
        assert_eq!(check("%|first:1"), Value::Bool(false));
        assert_eq!(check("%|last:1"), Value::Bool(true));
        assert_eq!(check("%|odd:1"), Value::Bool(true));
        assert_eq!(check("%|last:2"), Value::Bool(false));
        assert_eq!(check("%|first:1e30"), Value::Bool(false));
        assert_eq!(check("%|even:18446744073709551615"), Value::Bool(false));
    }

    #[test]
    fn test_loop_position_outside_loop() {
        let dict = Value::from(json!({"i": 3}));
        assert_eq!(eval("i|odd", &dict), Value::Bool(true));
        assert_eq!(eval("i|even", &dict), Value::Bool(false));
        assert_eq!(eval("i|first", &dict), Value::Bool(false));
        assert_eq!(eval("i|last", &dict), Value::Bool(false));
    }

    #[test]
    fn test_delegation() {
        let parent = Arc::new(
            FilterRegistry::new()
                .with_filter("shout", |v, _, _| Ok(Value::Str(v.to_string().to_uppercase())))
                .with_default("shout"),
        );
        let child = FilterRegistry::delegate(parent.clone());
        assert!(child.contains("shout"));
        assert!(child.contains("safeHtml"));
        assert_eq!(child.default_name(), Some("shout"));
        assert!(!FilterRegistry::empty().contains("safeHtml"));
        assert_eq!(FilterRegistry::standard().default_name(), None);
    }
}
