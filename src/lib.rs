pub mod error;
pub mod models;
pub mod tpl;
pub mod value;

pub use error::{Result, TemplateError};
pub use models::options::{DEFAULT_PATTERN, TemplateOptions};
pub use tpl::engine::{Template, run_template};
pub use tpl::filters::{Filter, FilterRegistry};
pub use tpl::scope::{LoopFrame, Scope};
pub use tpl::{Arg, Block, Expr, FilterCall, Operand, PathRoot, Token};
pub use value::{Function, Value, to_value};
