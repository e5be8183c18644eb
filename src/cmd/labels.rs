use anyhow::Result;
use serde_json::json;

use catemoji::{Config, Expression};

pub fn cmd_labels(config: &Config, json: bool) -> Result<()> {
    let catalog = config.catalog()?;

    if json {
        let labels: Vec<_> = Expression::ALL
            .iter()
            .map(|e| {
                json!({
                    "label": e,
                    "fallback_caption": e.fallback_caption(),
                    "background": catalog.background(*e).to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&labels)?);
        return Ok(());
    }

    for expression in Expression::ALL {
        println!("{:<10} {}", expression.as_str(), expression.fallback_caption());
        println!("{:<10} {}", "", catalog.background(expression));
    }

    Ok(())
}
