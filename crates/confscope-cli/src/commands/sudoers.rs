use std::path::Path;

use confscope::resources::Sudoers as SudoersPolicy;

use super::common::{CommonField, Context, lines};
use crate::cli::SudoersField;

pub struct Sudoers;

impl Sudoers {
    pub fn execute(
        ctx: &Context,
        path: Option<&Path>,
        hostname: Option<&str>,
        field: SudoersField,
    ) -> anyhow::Result<()> {
        let path = Context::path(path, ctx.settings.paths.sudoers.as_ref());
        let hostname = hostname
            .or(ctx.settings.hostname.as_deref())
            .unwrap_or(SudoersPolicy::DEFAULT_HOSTNAME);
        let sudoers = SudoersPolicy::with_hostname(ctx.fs.clone(), path, hostname);

        match field {
            SudoersField::Files => ctx.emit_common(&sudoers, CommonField::Files),
            SudoersField::Content => ctx.emit_common(&sudoers, CommonField::Content),
            SudoersField::Fingerprint => ctx.emit_common(&sudoers, CommonField::Fingerprint),
            SudoersField::Defaults => ctx.emit(sudoers.defaults()?, |defaults| {
                lines(defaults.iter().map(|d| {
                    format!(
                        "{}\tDefaults{} {}",
                        d.location,
                        d.qualifier.as_deref().unwrap_or_default(),
                        d.parameters.join(", ")
                    )
                }))
            }),
            SudoersField::Aliases => ctx.emit(sudoers.aliases()?, |aliases| {
                lines(aliases.iter().map(|a| {
                    format!("{}\t{} {} = {}", a.location, a.kind, a.name, a.members.join(", "))
                }))
            }),
            SudoersField::UserSpecs => ctx.emit(sudoers.user_specs()?, |specs| {
                lines(specs.iter().map(|s| {
                    let runas = s
                        .runas
                        .as_ref()
                        .map(|runas| format!("({runas}) "))
                        .unwrap_or_default();
                    let tags: String = s.tags.iter().map(|tag| format!("{tag}: ")).collect();
                    format!(
                        "{}\t{} {} = {runas}{tags}{}",
                        s.location,
                        s.users.join(", "),
                        s.hosts.join(", "),
                        s.commands.join(", ")
                    )
                }))
            }),
        }
    }
}
