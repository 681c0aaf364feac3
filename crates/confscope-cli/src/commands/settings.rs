use anyhow::Context as _;

use super::common::Context;

pub struct Settings;

impl Settings {
    pub fn execute(ctx: &Context) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(&ctx.settings).context("Failed to encode settings")?;
        ctx.emit(&ctx.settings, |_| text)
    }
}
