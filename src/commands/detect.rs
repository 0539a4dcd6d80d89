//! `rigger detect`

use super::report;
use crate::cli::DetectArgs;
use crate::context::RunContext;
use anyhow::{Context, Result};
use fleet::{Dispatch, HostCall, Operation};
use platform::{ExtendedFacts, Facts};
use serde::Serialize;

/// What detection found on one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    pub summary: String,
    pub facts: Facts,
    /// Present when extended facts were requested and loaded
    pub extended: Option<ExtendedFacts>,
}

pub fn collect<S: AsRef<str>>(
    ctx: &RunContext,
    requested: &[S],
    extended: bool,
) -> Result<Dispatch<HostFacts>> {
    let probe = extended.then(|| ctx.config.extended_probe()).flatten();
    if extended && probe.is_none() {
        log::warn!("detect: --extended given but [facts] extended_command is not set");
    }

    let op = Operation::new("detect", |call: &HostCall| {
        let target = ctx.target(&call.host)?;
        let extended = match &probe {
            Some(probe) => Some(
                target
                    .extended(&ctx.shell(&call.host), probe)
                    .with_context(|| format!("extended facts of {}", call.host))?
                    .clone(),
            ),
            None => None,
        };
        Ok(HostFacts {
            summary: target.describe(),
            facts: target.facts().clone(),
            extended,
        })
    });
    ctx.run(&op, requested)
}

pub fn run<S: AsRef<str>>(ctx: &RunContext, requested: &[S], args: &DetectArgs) -> Result<()> {
    let dispatch = collect(ctx, requested, args.extended)?;

    if args.json {
        if let Some(results) = dispatch.results() {
            let ok: std::collections::BTreeMap<&String, &HostFacts> = results
                .iter()
                .filter_map(|(host, r)| r.as_ref().ok().map(|f| (host, f)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&ok)?);
        }
        for (host, e) in dispatch.failures() {
            log::error!("[{host}] {e:#}");
        }
        return Ok(());
    }

    report("Targets", &dispatch, |found| {
        let mut line = found.summary.clone();
        if let Some(extended) = &found.extended {
            for (key, value) in extended.iter() {
                line.push_str(&format!("\n      {key}={value}"));
            }
        }
        line
    })
}
