use crate::error::Result;
use crate::models::options::TemplateOptions;
use crate::tpl::filters::FilterRegistry;
use crate::tpl::{Token, compiler, interpreter};
use crate::value::{Value, to_value};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// 已编译的模板
///
/// 只编译一次，之后 Token 列表不再变化；每次 [`Template::execute`] 都使用自己的栈，
/// 同一个模板可以在多个线程中反复执行。
#[derive(Debug, Clone)]
pub struct Template {
    tokens: Arc<Vec<Token>>,
    pattern: Regex,
    filters: Arc<FilterRegistry>,
}

impl Template {
    /// 使用 `{...}` 标记和标准过滤器编译模板
    pub fn compile(source: &str) -> Result<Self> {
        Self::compile_with(source, &TemplateOptions::default())
    }

    pub fn compile_with(source: &str, options: &TemplateOptions) -> Result<Self> {
        let start = Instant::now();
        let pattern = Regex::new(&options.pattern)?;
        let tokens = compiler::compile_tokens(source, &pattern)?;
        debug!(
            "compile: source_len={}, tokens={}, elapsed_us={}",
            source.len(),
            tokens.len(),
            start.elapsed().as_micros()
        );
        Ok(Self {
            tokens: Arc::new(tokens),
            pattern,
            filters: options.filters.clone(),
        })
    }

    /// 针对 `dict` 渲染模板，缺失的键渲染为空。
    /// 只有未知过滤器会导致失败，此时不返回任何输出。
    pub fn execute(&self, dict: &Value) -> Result<String> {
        let start = Instant::now();
        let result = interpreter::execute(&self.tokens, dict, &self.filters);
        let elapsed_us = start.elapsed().as_micros();
        match &result {
            Ok(out) => debug!("execute: output_len={}, elapsed_us={}", out.len(), elapsed_us),
            Err(e) => debug!("execute: error={}, elapsed_us={}", e, elapsed_us),
        }
        result
    }

    /// 将 `data` 序列化为 [`Value`] 后渲染
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let dict = to_value(data)?;
        self.execute(&dict)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }
}

/// 编译并立即执行模板
pub fn run_template(source: &str, dict: &Value, options: &TemplateOptions) -> Result<String> {
    Template::compile_with(source, options)?.execute(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;

    #[derive(Serialize)]
    struct User {
        name: String,
        age: u8,
    }

    #[test]
    fn test_render_simple() {
        let tpl = Template::compile("name = {name} and age = {age}").unwrap();
        let user = User {
            name: "test".to_string(),
            age: 18,
        };
        assert_eq!(tpl.render(&user).unwrap(), "name = test and age = 18");
    }

    #[derive(Serialize)]
    struct IfArgs {
        active: bool,
        age: i32,
        name: Option<String>,
    }

    #[test]
    fn test_if_tag() {
        let tpl = Template::compile(
            "where 1=1{?active} and status = 1{.}{?age|ge:18} and type = 'adult'{.}{?name} and name = {name}{.}",
        )
        .unwrap();

        let args = IfArgs {
            active: true,
            age: 20,
            name: Some("tom".to_string()),
        };
        assert_eq!(
            tpl.render(&args).unwrap(),
            "where 1=1 and status = 1 and type = 'adult' and name = tom"
        );

        let args = IfArgs {
            active: false,
            age: 10,
            name: None,
        };
        assert_eq!(tpl.render(&args).unwrap(), "where 1=1");
    }

    #[derive(Serialize)]
    struct ForArgs {
        ids: Vec<i32>,
    }

    #[test]
    fn test_loop_tag() {
        let tpl = Template::compile("in ({*ids}{%}{?%|last}{-},{.}{.})").unwrap();
        assert_eq!(tpl.render(&ForArgs { ids: vec![1, 2, 3] }).unwrap(), "in (1,2,3)");
        assert_eq!(tpl.render(&ForArgs { ids: vec![] }).unwrap(), "in ()");
    }

    #[test]
    fn test_run_template_and_errors() {
        let out = run_template("x{v}", &Value::from(7), &TemplateOptions::new()).unwrap();
        assert_eq!(out, "x");

        match Template::compile_with("a", &TemplateOptions::new().pattern("(")) {
            Err(TemplateError::Pattern(_)) => {}
            other => panic!("Expected Pattern error, got {:?}", other),
        }
    }
}
