use crate::tpl::filters::FilterRegistry;
use std::sync::Arc;

/// 匹配 `{...}`，第 1 个捕获组为标记内容
pub const DEFAULT_PATTERN: &str = r"\{([^\}]+)\}";

/// 模板编译选项：标记的正则和使用的过滤器
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    pub pattern: String,
    pub filters: Arc<FilterRegistry>,
}

impl TemplateOptions {
    pub fn new() -> Self {
        TemplateOptions {
            pattern: DEFAULT_PATTERN.to_string(),
            filters: FilterRegistry::standard(),
        }
    }

    /// 正则表达式，第 1 个捕获组为标记内容，例如 `#\{([^\}]+)\}`。
    /// 没有捕获组时使用整个匹配。
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    pub fn filters(mut self, filters: Arc<FilterRegistry>) -> Self {
        self.filters = filters;
        self
    }
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = TemplateOptions::new();
        assert_eq!(options.pattern, DEFAULT_PATTERN);
        assert_eq!(options.filters.default_name(), None);

        let registry = Arc::new(FilterRegistry::new().with_default("safeHtml"));
        let options = TemplateOptions::new()
            .pattern(r"#\{([^\}]+)\}")
            .filters(registry);
        assert_eq!(options.pattern, r"#\{([^\}]+)\}");
        assert_eq!(options.filters.default_name(), Some("safeHtml"));
    }
}
