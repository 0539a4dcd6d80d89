pub mod detect;
pub mod pkg;
pub mod roles;
pub mod service;

use crate::ui;
use anyhow::{Result, bail};
use fleet::Dispatch;

/// Print one line per host and fail if any host failed.
pub(crate) fn report<T>(label: &str, dispatch: &Dispatch<T>, line: impl Fn(&T) -> String) -> Result<()> {
    let results = match dispatch {
        Dispatch::Skipped { reason } => {
            ui::warn(&format!("{label}: skipped, {reason}"));
            return Ok(());
        }
        Dispatch::Ran(results) => results,
    };

    ui::section(label);
    for (host, result) in results {
        match result {
            Ok(value) => ui::host_line(host, true, &line(value)),
            Err(e) => ui::host_line(host, false, &format!("{e:#}")),
        }
    }

    let failed = dispatch.failures().len();
    if failed > 0 {
        bail!("{label} failed on {failed} of {} host(s)", results.len());
    }
    Ok(())
}
