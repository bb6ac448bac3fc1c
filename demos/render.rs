use serde::Serialize;
use std::sync::Arc;
use ste::{FilterRegistry, Template, TemplateOptions};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Serialize)]
struct Item {
    name: &'static str,
    price: f64,
}

#[derive(Serialize)]
struct Page {
    title: &'static str,
    items: Vec<Item>,
}

fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::new("debug")).init();

    let filters = Arc::new(FilterRegistry::new().with_default("safeHtml"));
    let options = TemplateOptions::new().filters(filters);
    let tpl = Template::compile_with(
        "<h1>{title}</h1>\n<ul>\n{*items}  <li class=\"{?%|odd}odd{-}even{.}\">{%.name}: {%.price}{?%.price|gt:10} (premium){.}</li>\n{-}  <li>nothing here</li>\n{.}</ul>\n",
        &options,
    )?;

    let page = Page {
        title: "Fish & <Chips>",
        items: vec![
            Item {
                name: "cod",
                price: 8.5,
            },
            Item {
                name: "halibut",
                price: 14.0,
            },
        ],
    };
    println!("{}", tpl.render(&page)?);
    Ok(())
}
