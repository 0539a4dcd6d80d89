//! `rigger service`

use super::report;
use crate::cli::{ServiceCommand, ServiceTarget};
use crate::context::RunContext;
use anyhow::{Result, bail};
use fleet::{Dispatch, HostCall, Operation};
use servicekit::{Convergence, RestartAction, ServiceDefinition, ServiceIdentity, ServiceStatus};
use std::collections::BTreeMap;

pub fn run(ctx: &RunContext, cmd: ServiceCommand) -> Result<()> {
    match cmd {
        ServiceCommand::Configure { target, fast } => {
            let mut failed = Vec::new();
            for (role, dispatch) in configure(ctx, &target.roles, target.variant.as_deref(), fast)? {
                if let Err(e) = report(&format!("configure {role}"), &dispatch, describe) {
                    failed.push(e);
                }
            }
            fail_on(failed)
        }
        ServiceCommand::Status(target) => each_role(&target, |role, variant| {
            let dispatch = status(ctx, role, variant)?;
            report(&format!("status {role}"), &dispatch, ToString::to_string)
        }),
        ServiceCommand::Remove(target) => each_role(&target, |role, variant| {
            let dispatch = remove(ctx, role, variant)?;
            report(&format!("remove {role}"), &dispatch, |removed| {
                let state = if *removed { "removed" } else { "not deployed" };
                state.to_string()
            })
        }),
    }
}

/// Run `f` for every role, reporting all of them before failing.
fn each_role(target: &ServiceTarget, f: impl Fn(&str, Option<&str>) -> Result<()>) -> Result<()> {
    let failed = target
        .roles
        .iter()
        .filter_map(|role| f(role, target.variant.as_deref()).err())
        .collect();
    fail_on(failed)
}

fn fail_on(mut failed: Vec<anyhow::Error>) -> Result<()> {
    match failed.len() {
        0 => Ok(()),
        1 => Err(failed.remove(0)),
        n => bail!("{n} roles failed"),
    }
}

fn describe(convergence: &Convergence) -> String {
    let state = match (convergence.result.changed, convergence.result.restarted) {
        (false, _) => "unchanged",
        (true, false) => "created",
        (true, true) => "changed",
    };
    let action = match convergence.action {
        RestartAction::None => "left running",
        RestartAction::Reload => "reloaded",
        RestartAction::Restart => "restarted",
    };
    format!("{state}, {action}")
}

/// The service definition a role gets on every host.
pub fn definition(ctx: &RunContext, role: &str, variant: Option<&str>) -> Result<ServiceDefinition> {
    let config = &ctx.config;
    let identity =
        ServiceIdentity::new(role, &config.project, &config.environment).with_variant(variant);
    Ok(ServiceDefinition::new(identity, &config.services.naming)?)
}

/// Converge each role on its own hosts. A host playing several of the
/// roles converges one service per role.
pub fn configure<S: AsRef<str>>(
    ctx: &RunContext,
    roles: &[S],
    variant: Option<&str>,
    fast: bool,
) -> Result<Vec<(String, Dispatch<Convergence>)>> {
    let extras = BTreeMap::new();
    let op = Operation::new("service configure", |call: &HostCall| {
        let sh = ctx.shell(&call.host);
        let target = ctx.target(&call.host)?;
        let controller = ctx.controller(&sh)?;
        let definition = definition(ctx, &call.role, variant)?;
        Ok(controller.converge(&sh, &target, &definition, &extras, fast)?)
    });

    roles
        .iter()
        .map(|role| {
            let role = role.as_ref();
            Ok((role.to_string(), ctx.run(&op, &[role])?))
        })
        .collect()
}

pub fn status(ctx: &RunContext, role: &str, variant: Option<&str>) -> Result<Dispatch<ServiceStatus>> {
    let definition = definition(ctx, role, variant)?;
    let op = Operation::new("service status", |call: &HostCall| {
        let sh = ctx.shell(&call.host);
        Ok(ctx.controller(&sh)?.status(&sh, &definition)?)
    });
    ctx.run(&op, &[role])
}

pub fn remove(ctx: &RunContext, role: &str, variant: Option<&str>) -> Result<Dispatch<bool>> {
    let definition = definition(ctx, role, variant)?;
    let op = Operation::new("service remove", |call: &HostCall| {
        let sh = ctx.shell(&call.host);
        Ok(ctx.controller(&sh)?.remove(&sh, &definition)?)
    });
    ctx.run(&op, &[role])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::tests::{context_with, ubuntu};
    use fleet::RoleMap;
    use remote::mock::MockExecutor;
    use servicekit::SupervisorKind;
    use std::sync::Arc;

    fn supervisord() -> Config {
        let mut config = Config::default();
        config.project = "shop".to_string();
        config.services.supervisor = Some(SupervisorKind::Supervisord);
        config
    }

    fn fleet() -> RoleMap {
        RoleMap::new()
            .with_role("web", &["web1"])
            .with_role("worker", &["jobs1"])
            .with_role("worker_low", &["jobs1"])
            .with_role("flower", &[] as &[&str])
    }

    fn action(dispatch: &Dispatch<Convergence>, host: &str) -> RestartAction {
        dispatch.results().unwrap()[host].as_ref().unwrap().action
    }

    #[test]
    fn test_second_fast_configure_restarts_nothing() {
        let mock = Arc::new(ubuntu(MockExecutor::new()));
        let ctx = context_with(supervisord(), fleet(), &mock);

        let first = configure(&ctx, &["web"], None, true).unwrap();
        assert_eq!(action(&first[0].1, "web1"), RestartAction::Reload);
        assert!(mock.file("web1", "/etc/supervisor/conf.d/web-shop-production.conf").is_some());

        mock.clear_calls();
        let second = configure(&ctx, &["web"], None, true).unwrap();
        assert_eq!(action(&second[0].1, "web1"), RestartAction::None);
        assert_eq!(mock.count("supervisorctl"), 0);
        assert_eq!(mock.count("cat > "), 0);
    }

    #[test]
    fn test_co_resident_roles_get_their_own_programs() {
        let mock = Arc::new(ubuntu(MockExecutor::new()));
        let ctx = context_with(supervisord(), fleet(), &mock);

        let dispatched = configure(&ctx, &["worker", "worker_low", "flower"], None, true).unwrap();
        assert_eq!(dispatched.len(), 3);
        assert!(dispatched[2].1.is_skipped());

        let files = mock.files_on("jobs1");
        assert!(files.contains(&"/etc/supervisor/conf.d/worker-shop-production.conf".to_string()));
        assert!(files.contains(&"/etc/supervisor/conf.d/worker_low-shop-production.conf".to_string()));
        let low = mock
            .file("jobs1", "/etc/supervisor/conf.d/worker_low-shop-production.conf")
            .unwrap();
        assert!(String::from_utf8_lossy(&low).contains("-Q low"));
    }

    #[test]
    fn test_variant_in_program_name() {
        let mock = Arc::new(ubuntu(MockExecutor::new()));
        let ctx = context_with(supervisord(), fleet(), &mock);
        let definition = definition(&ctx, "web", Some("blue")).unwrap();
        assert_eq!(definition.program.as_str(), "web-shop-blue-production");
    }

    #[test]
    fn test_status_and_remove() {
        let mock = Arc::new(
            ubuntu(MockExecutor::new())
                .respond("supervisorctl status", "web-shop-production   RUNNING   pid 42, uptime 1:00:00\n"),
        );
        let ctx = context_with(supervisord(), fleet(), &mock);
        configure(&ctx, &["web"], None, true).unwrap();

        let dispatch = status(&ctx, "web", None).unwrap();
        assert_eq!(
            dispatch.results().unwrap()["web1"].as_ref().unwrap(),
            &ServiceStatus::Running
        );

        let dispatch = remove(&ctx, "web", None).unwrap();
        assert!(*dispatch.results().unwrap()["web1"].as_ref().unwrap());
        assert!(mock.file("web1", "/etc/supervisor/conf.d/web-shop-production.conf").is_none());
    }
}
