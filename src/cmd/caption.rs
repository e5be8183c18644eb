use anyhow::Result;
use serde_json::json;

use catemoji::{fallback_caption_for, AnthropicCaptions, CaptionProvider, Config, Expression};

pub async fn cmd_caption(config: &Config, label: &str, json: bool) -> Result<()> {
    let caption = match label.parse::<Expression>() {
        Ok(expression) => {
            let provider = AnthropicCaptions::new(config.caption.clone())?;
            if config.caption.usable_key().is_none() {
                eprintln!("ℹ️  No API key configured, using the fallback caption");
            }
            provider.caption(expression).await
        }
        Err(e) => {
            eprintln!("⚠️  {e}");
            fallback_caption_for(label).to_string()
        }
    };

    if json {
        let summary = json!({
            "label": label,
            "caption": caption,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{caption}");
    }

    Ok(())
}
