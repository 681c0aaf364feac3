use std::path::Path;

use confscope::{ScopedBlock, SshdConfig};

use super::common::{CommonField, Context, lines};
use crate::cli::SshdField;

pub struct Sshd;

impl Sshd {
    pub fn execute(ctx: &Context, path: Option<&Path>, field: SshdField) -> anyhow::Result<()> {
        let path = Context::path(path, ctx.settings.paths.sshd.as_ref());
        let sshd = SshdConfig::new(ctx.fs.clone(), path);

        match field {
            SshdField::Files => ctx.emit_common(&sshd, CommonField::Files),
            SshdField::Content => ctx.emit_common(&sshd, CommonField::Content),
            SshdField::Fingerprint => ctx.emit_common(&sshd, CommonField::Fingerprint),
            SshdField::Params => ctx.emit(sshd.params()?, |params| {
                lines(params.iter().map(|(key, value)| format!("{key} {value}")))
            }),
            SshdField::Blocks => ctx.emit(sshd.blocks()?, |blocks| {
                lines(blocks.iter().map(render_block))
            }),
            SshdField::Ciphers => ctx.emit_list(&sshd.ciphers()?),
            SshdField::Macs => ctx.emit_list(&sshd.macs()?),
            SshdField::Kexs => ctx.emit_list(&sshd.kexs()?),
            SshdField::HostKeys => ctx.emit_list(&sshd.host_keys()?),
        }
    }
}

fn render_block(block: &ScopedBlock) -> String {
    let range = &block.source_range;
    let header = format!(
        "Match {}  # {}:{}-{}",
        block.criteria,
        range.file.display(),
        range.start_line,
        range.end_line
    );
    std::iter::once(header)
        .chain(
            block
                .params
                .iter()
                .map(|(key, value)| format!("    {key} {value}")),
        )
        .collect::<Vec<_>>()
        .join("\n")
}
