use std::path::Path;

use confscope::resources::{Modprobe as ModprobeConfig, ModprobeCommand};

use super::common::{CommonField, Context, lines};
use crate::cli::ModprobeField;

pub struct Modprobe;

impl Modprobe {
    pub fn execute(ctx: &Context, path: Option<&Path>, field: ModprobeField) -> anyhow::Result<()> {
        let path = Context::path(path, ctx.settings.paths.modprobe.as_ref());
        let modprobe = ModprobeConfig::new(ctx.fs.clone(), path);

        match field {
            ModprobeField::Files => ctx.emit_common(&modprobe, CommonField::Files),
            ModprobeField::Content => ctx.emit_common(&modprobe, CommonField::Content),
            ModprobeField::Blacklist => ctx.emit(modprobe.blacklist()?, |entries| {
                lines(
                    entries
                        .iter()
                        .map(|e| format!("{}\tblacklist {}", e.location, e.module)),
                )
            }),
            ModprobeField::Options => ctx.emit(modprobe.options()?, |entries| {
                lines(entries.iter().map(|e| {
                    format!("{}\toptions {} {}", e.location, e.module, e.parameters.join(" "))
                }))
            }),
            ModprobeField::Aliases => ctx.emit(modprobe.aliases()?, |entries| {
                lines(
                    entries
                        .iter()
                        .map(|e| format!("{}\talias {} {}", e.location, e.wildcard, e.module)),
                )
            }),
            ModprobeField::Install => ctx.emit(modprobe.installs()?, |entries| {
                render_commands("install", entries)
            }),
            ModprobeField::Remove => ctx.emit(modprobe.removes()?, |entries| {
                render_commands("remove", entries)
            }),
            ModprobeField::Softdeps => ctx.emit(modprobe.softdeps()?, |entries| {
                lines(entries.iter().map(|e| {
                    format!(
                        "{}\tsoftdep {} pre: {} post: {}",
                        e.location,
                        e.module,
                        e.pre.join(" "),
                        e.post.join(" ")
                    )
                }))
            }),
        }
    }
}

fn render_commands(keyword: &str, entries: &[ModprobeCommand]) -> String {
    lines(
        entries
            .iter()
            .map(|e| format!("{}\t{keyword} {} {}", e.location, e.module, e.command)),
    )
}
