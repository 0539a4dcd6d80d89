//! `rigger roles`

use crate::cli::RolesCommand;
use crate::context::RunContext;
use crate::ui;
use anyhow::Result;
use fleet::{ANY_ROLE, RoleMap};

pub fn run<S: AsRef<str>>(ctx: &RunContext, requested: &[S], cmd: RolesCommand) -> Result<()> {
    match cmd {
        RolesCommand::List => {
            let roles = selected(&ctx.roles, requested);
            ui::header("Roles");
            if roles.is_empty() {
                ui::dim("no roles defined");
            }
            for (role, hosts) in rows(&roles) {
                ui::kv(&role, &ui::list(&hosts));
            }
            Ok(())
        }
        RolesCommand::Show { role } => {
            let hosts = ctx.roles.hosts(&role);
            if hosts.is_empty() {
                ui::warn(&format!("{role}: no hosts"));
            }
            for host in hosts {
                let others: Vec<String> = ctx
                    .roles
                    .roles_of(&host)
                    .into_iter()
                    .filter(|r| *r != role)
                    .map(ToString::to_string)
                    .collect();
                ui::kv(&host, &format!("also {}", ui::list(&others)));
            }
            Ok(())
        }
    }
}

/// The role map narrowed to the requested roles, or all of it for `any`.
fn selected<S: AsRef<str>>(roles: &RoleMap, requested: &[S]) -> RoleMap {
    let mut roles = roles.clone();
    if !requested.iter().any(|r| r.as_ref() == ANY_ROLE) {
        roles.narrow(requested);
    }
    roles
}

fn rows(roles: &RoleMap) -> Vec<(String, Vec<String>)> {
    roles
        .roles()
        .map(|role| (role.to_string(), roles.hosts(role)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> RoleMap {
        RoleMap::new()
            .with_role("web", &["web1", "web2"])
            .with_role("worker", &["web2"])
            .with_role("flower", &[] as &[&str])
    }

    #[test]
    fn test_any_lists_everything() {
        let rows = rows(&selected(&roles(), &["any"]));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ("flower".to_string(), vec![]));
    }

    #[test]
    fn test_narrowed_listing() {
        let rows = rows(&selected(&roles(), &["worker", "cache"]));
        assert_eq!(rows, vec![("worker".to_string(), vec!["web2".to_string()])]);
    }
}
