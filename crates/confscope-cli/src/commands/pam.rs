use std::path::Path;

use confscope::PamConf;

use super::common::{CommonField, Context, lines};
use crate::cli::PamField;

pub struct Pam;

impl Pam {
    pub fn execute(
        ctx: &Context,
        path: Option<&Path>,
        service: Option<&str>,
        field: PamField,
    ) -> anyhow::Result<()> {
        let path = Context::path(path, ctx.settings.paths.pam.as_ref());
        let pam = PamConf::new(ctx.fs.clone(), path, service);

        match field {
            PamField::Files => ctx.emit_common(&pam, CommonField::Files),
            PamField::Content => ctx.emit_common(&pam, CommonField::Content),
            PamField::Entries => ctx.emit(pam.entries()?, |entries| {
                lines(entries.iter().map(|e| {
                    let mut line = format!(
                        "{}\t{}{} {} {}",
                        e.location,
                        if e.optional { "-" } else { "" },
                        e.pam_type,
                        e.control,
                        e.module
                    );
                    for arg in &e.args {
                        line.push(' ');
                        line.push_str(arg);
                    }
                    line
                }))
            }),
        }
    }
}
