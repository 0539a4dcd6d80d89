//! `rigger pkg`

use super::report;
use crate::cli::PkgCommand;
use crate::context::RunContext;
use crate::ui;
use anyhow::{Result, bail};
use fleet::{Dispatch, HostCall, Operation};
use pkgkit::{BackendKind, BatchOptions, BatchReport, PackageManager, search_hosts, split_names};

pub fn run<S: AsRef<str>>(ctx: &RunContext, requested: &[S], cmd: PkgCommand) -> Result<()> {
    match cmd {
        PkgCommand::Add(args) => {
            let options = batch_options(ctx, args.fail_fast);
            let dispatch = add(ctx, requested, args.manager.language, &args.names, options)?;
            report_batches("pkg add", &dispatch)
        }
        PkgCommand::Remove(args) => {
            let options = batch_options(ctx, args.fail_fast);
            let dispatch = remove(ctx, requested, args.manager.language, &args.names, options)?;
            report_batches("pkg remove", &dispatch)
        }
        PkgCommand::Update(manager) => report(
            "pkg update",
            &update(ctx, requested, manager.language)?,
            |_| "updated".into(),
        ),
        PkgCommand::Upgrade(manager) => report(
            "pkg upgrade",
            &upgrade(ctx, requested, manager.language)?,
            |_| "upgraded".into(),
        ),
        PkgCommand::Search { terms, manager } => match manager.language {
            Some(language) => search_with(ctx, requested, language, &terms),
            None => search(ctx, requested, &terms),
        },
    }
}

fn batch_options(ctx: &RunContext, fail_fast: bool) -> BatchOptions {
    BatchOptions {
        fail_fast: fail_fast || ctx.config.batch_options().fail_fast,
    }
}

/// Run `f` with the host's system package manager, or with the requested
/// language manager.
fn with_manager<T>(
    ctx: &RunContext,
    call: &HostCall,
    language: Option<BackendKind>,
    f: impl FnOnce(&PackageManager<'_>) -> pkgkit::Result<T>,
) -> Result<T> {
    let sh = ctx.shell(&call.host);
    if let Some(kind) = language {
        let backend = pkgkit::lang::locate(&sh, kind)?;
        return Ok(f(&PackageManager::new(sh, backend.as_ref()))?);
    }
    let target = ctx.target(&call.host)?;
    let pm = PackageManager::for_target(sh, ctx.registry(), &target)?;
    Ok(f(&pm)?)
}

pub fn add<R: AsRef<str>, S: AsRef<str>>(
    ctx: &RunContext,
    requested: &[R],
    language: Option<BackendKind>,
    names: &[S],
    options: BatchOptions,
) -> Result<Dispatch<BatchReport>> {
    let names = split_names(names);
    let op = Operation::new("pkg add", |call: &HostCall| {
        with_manager(ctx, call, language, |pm| pm.add(&names, options))
    });
    ctx.run(&op, requested)
}

pub fn remove<R: AsRef<str>, S: AsRef<str>>(
    ctx: &RunContext,
    requested: &[R],
    language: Option<BackendKind>,
    names: &[S],
    options: BatchOptions,
) -> Result<Dispatch<BatchReport>> {
    let names = split_names(names);
    let op = Operation::new("pkg remove", |call: &HostCall| {
        with_manager(ctx, call, language, |pm| pm.remove(&names, options))
    });
    ctx.run(&op, requested)
}

pub fn update<R: AsRef<str>>(
    ctx: &RunContext,
    requested: &[R],
    language: Option<BackendKind>,
) -> Result<Dispatch<()>> {
    let op = Operation::new("pkg update", |call: &HostCall| {
        with_manager(ctx, call, language, |pm| pm.update())
    });
    ctx.run(&op, requested)
}

pub fn upgrade<R: AsRef<str>>(
    ctx: &RunContext,
    requested: &[R],
    language: Option<BackendKind>,
) -> Result<Dispatch<()>> {
    let op = Operation::new("pkg upgrade", |call: &HostCall| {
        with_manager(ctx, call, language, |pm| pm.upgrade())
    });
    ctx.run(&op, requested)
}

/// Batch reports per host; a host with failed packages counts as failed.
fn report_batches(label: &str, dispatch: &Dispatch<BatchReport>) -> Result<()> {
    report(label, dispatch, BatchReport::summary)?;

    let mut failed = 0;
    for (host, batch) in dispatch.results().into_iter().flatten() {
        let Ok(batch) = batch else { continue };
        for failure in &batch.failed {
            failed += 1;
            ui::dim(&format!(
                "{host}: {} ({}) {}",
                failure.name,
                failure.category.description(),
                failure.category.advice()
            ));
        }
    }
    if failed > 0 {
        bail!("{label}: {failed} package(s) failed");
    }
    Ok(())
}

fn search<R: AsRef<str>>(ctx: &RunContext, requested: &[R], terms: &[String]) -> Result<()> {
    let hosts: Vec<String> = match ctx.dispatcher().plan(requested) {
        Ok(calls) => calls.into_iter().map(|c| c.host).collect(),
        Err(reason) => {
            ui::warn(&format!("pkg search: skipped, {reason}"));
            return Ok(());
        }
    };

    let found = search_hosts(
        ctx.executor(),
        ctx.cache(),
        ctx.registry(),
        &hosts,
        terms,
        ctx.jobs(),
    )?;

    let mut failed = 0;
    for (host, result) in &found {
        ui::section(host);
        match result {
            Ok(packages) if packages.is_empty() => ui::dim("no matches"),
            Ok(packages) => packages.iter().for_each(|p| println!("  {p}")),
            Err(e) => {
                failed += 1;
                ui::error(&e.to_string());
            }
        }
    }
    if failed > 0 {
        bail!("pkg search failed on {failed} host(s)");
    }
    Ok(())
}

/// Search through a language manager on every host of the roles.
fn search_with<R: AsRef<str>>(
    ctx: &RunContext,
    requested: &[R],
    language: BackendKind,
    terms: &[String],
) -> Result<()> {
    let op = Operation::new("pkg search", |call: &HostCall| {
        with_manager(ctx, call, Some(language), |pm| pm.search(terms))
    });
    let dispatch = ctx.run(&op, requested)?;
    report("pkg search", &dispatch, |found| format!("{} match(es)", found.len()))?;
    for (host, found) in dispatch.results().into_iter().flatten() {
        if let Ok(packages) = found {
            ui::section(host);
            packages.iter().for_each(|p| println!("  {p}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::tests::{context, context_with, ubuntu};
    use fleet::RoleMap;
    use remote::CommandOutput;
    use remote::mock::MockExecutor;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    /// Ubuntu hosts whose dpkg remembers what apt-get did, per host.
    fn apt_fleet() -> Arc<MockExecutor> {
        let installed: Arc<Mutex<BTreeSet<(String, String)>>> = Arc::default();
        let mock = MockExecutor::new().with_handler(move |host, inv| {
            let cmd = &inv.command;
            let mut installed = installed.lock().unwrap();
            if let Some(rest) = cmd.strip_prefix("dpkg-query -W -f='${Status}' ") {
                let name = rest.trim_end_matches(" 2>/dev/null").to_string();
                return Some(if installed.contains(&(host.to_string(), name)) {
                    CommandOutput::ok("install ok installed")
                } else {
                    CommandOutput::failed(1, "no packages found")
                });
            }
            if cmd.contains("install --yes ") {
                let name = cmd.rsplit(' ').next()?;
                if name == "nosuchpkg" {
                    return Some(CommandOutput::failed(100, "E: Unable to locate package nosuchpkg"));
                }
                installed.insert((host.to_string(), name.to_string()));
            }
            None
        });
        Arc::new(ubuntu(mock))
    }

    fn roles() -> RoleMap {
        RoleMap::new()
            .with_role("web", &["web1", "web2"])
            .with_role("flower", &[] as &[&str])
    }

    #[test]
    fn test_add_converges_each_host() {
        let mock = apt_fleet();
        let ctx = context(roles(), &mock);

        let dispatch = add(&ctx, &["web"], None, &["htop git"], BatchOptions::default()).unwrap();
        let results = dispatch.results().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["web1"].as_ref().unwrap().changed, vec!["htop", "git"]);

        let again = add(&ctx, &["web"], None, &["htop", "git"], BatchOptions::default()).unwrap();
        for batch in again.results().unwrap().values() {
            let batch = batch.as_ref().unwrap();
            assert!(batch.changed.is_empty());
            assert_eq!(batch.unchanged.len(), 2);
        }
        assert_eq!(mock.count_on("web1", "install --yes htop"), 1);
    }

    #[test]
    fn test_failed_package_fails_the_command() {
        let mock = apt_fleet();
        let ctx = context(roles(), &mock);
        let dispatch = add(&ctx, &["web"], None, &["htop", "nosuchpkg"], BatchOptions::default()).unwrap();
        let batch = dispatch.results().unwrap()["web2"].as_ref().unwrap();
        assert_eq!(batch.changed, vec!["htop"]);
        assert_eq!(batch.failed[0].category, pkgkit::ErrorCategory::NotFound);
        assert!(report_batches("pkg add", &dispatch).is_err());
    }

    #[test]
    fn test_empty_role_touches_nothing() {
        let mock = apt_fleet();
        let ctx = context(roles(), &mock);
        let dispatch = add(&ctx, &["flower"], None, &["htop"], BatchOptions::default()).unwrap();
        assert!(dispatch.is_skipped());
        assert!(mock.touched_hosts().is_empty());
    }

    #[test]
    fn test_without_roles_runs_on_pinned_or_local_host() {
        let mock = apt_fleet();
        let ctx = context(RoleMap::new(), &mock);
        let dispatch = add(&ctx, &["any"], None, &["vim"], BatchOptions::default()).unwrap();
        assert_eq!(dispatch.results().unwrap()["localhost"].as_ref().unwrap().changed, vec!["vim"]);

        let mock = apt_fleet();
        let mut config = Config::default();
        config.dispatch.pinned_host = Some("box1".into());
        let ctx = context_with(config, RoleMap::new(), &mock);
        let dispatch = add(&ctx, &["any"], None, &["vim"], BatchOptions::default()).unwrap();
        assert!(!dispatch.is_skipped());
        assert_eq!(mock.count_on("box1", "install --yes vim"), 1);
        assert_eq!(mock.touched_hosts(), vec!["box1"]);
    }

    #[test]
    fn test_language_manager_skips_platform_detection() {
        let mock = Arc::new(
            MockExecutor::new()
                .fail_on("command -v pip3 ", 1, "")
                .fail_on("pip-3.5 freeze", 1, ""),
        );
        let ctx = context(roles(), &mock);
        let dispatch = add(
            &ctx,
            &["web"],
            Some(BackendKind::Pip3),
            &["flask"],
            BatchOptions::default(),
        )
        .unwrap();
        for batch in dispatch.results().unwrap().values() {
            assert_eq!(batch.as_ref().unwrap().changed, vec!["flask"]);
        }
        assert_eq!(mock.count("cd /var/tmp && pip-3.5 install -U flask"), 2);
        assert_eq!(mock.count("cat /etc/os-release"), 0);
    }

    #[test]
    fn test_search_over_role() {
        let mock = Arc::new(
            ubuntu(MockExecutor::new()).respond("apt-cache search", "htop - process viewer\n"),
        );
        let ctx = context(roles(), &mock);
        assert!(search(&ctx, &["web"], &["htop".to_string()]).is_ok());
        assert_eq!(mock.count("apt-cache search"), 2);
    }
}
