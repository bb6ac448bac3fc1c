use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod serializer;

pub use serializer::to_value;

/// 存放在 [`Value`] 中的无参可调用对象，由 `call` 过滤器调用
#[derive(Clone)]
pub struct Function(Arc<dyn Fn() -> Value + Send + Sync>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Function(Arc::new(f))
    }

    pub fn call(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function(..)")
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// 模板执行时使用的动态数据
///
/// 真值、比较和字符串化遵循宽松的脚本语言规则：
/// `Null`、`false`、零、`NaN` 和 `""` 为假，容器总是为真。
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Func(Function),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Func(_) => true,
        }
    }

    /// 循环该值时会访问的元素个数
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Str(s) => Some(s.chars().count()),
            _ => None,
        }
    }

    /// 借用方式访问属性：Map 的键或列表下标
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(key),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    // Properties that have to be computed: `length` and string char indices.
    fn derived(&self, key: &str) -> Option<Value> {
        match self {
            Value::List(_) | Value::Str(_) if key == "length" => {
                self.len().map(|n| Value::Int(n as i64))
            }
            Value::Str(s) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string())),
            _ => None,
        }
    }

    /// 按路径逐段查找，中间缺失时得到 `Null`。
    /// 命中的是已有数据时直接借用，只有 `length` 这类计算属性才会产生新值。
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Cow<'_, Value> {
        let mut current = self;
        for (i, part) in path.iter().enumerate() {
            let part = part.as_ref();
            match current.get(part) {
                Some(v) => current = v,
                None => {
                    return match current.derived(part) {
                        Some(v) => Cow::Owned(v.lookup_path(&path[i + 1..])),
                        None => Cow::Owned(Value::Null),
                    };
                }
            }
        }
        Cow::Borrowed(current)
    }

    pub fn lookup_path<S: AsRef<str>>(&self, path: &[S]) -> Value {
        self.lookup(path).into_owned()
    }

    /// 比较时使用的数值转换，无法转换时为 `NaN`
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Null | Value::List(_) | Value::Map(_) | Value::Func(_) => f64::NAN,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// `==`: numbers compare across Int/Float, a number against a string or bool coerces.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() || b.is_number() || matches!(a, Value::Bool(_)) || matches!(b, Value::Bool(_)) => {
                match (a, b) {
                    (Value::List(_) | Value::Map(_) | Value::Func(_), _)
                    | (_, Value::List(_) | Value::Map(_) | Value::Func(_)) => false,
                    _ => a.to_number() == b.to_number(),
                }
            }
            (a, b) => a == b,
        }
    }

    /// `===`: same type and same value, Int and Float count as one type.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.to_number() == b.to_number(),
            (a, b) => a == b,
        }
    }

    /// Ordering for `lt`/`le`/`gt`/`ge`. Two strings compare lexicographically, anything
    /// else numerically; `None` when the pair is not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) => a.to_number().partial_cmp(&b.to_number()),
        }
    }
}

fn fmt_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NaN")
    } else if v.is_infinite() {
        f.write_str(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        write!(f, "{}", v as i64)
    } else {
        write!(f, "{}", v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => fmt_float(f, *v),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object Object]"),
            Value::Func(_) => f.write_str("[function]"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}
impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Value::Func(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(m) => {
                Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
