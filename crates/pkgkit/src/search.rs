//! Package search across many hosts.

use crate::backend::Registry;
use crate::error::Result;
use crate::manager::PackageManager;
use platform::TargetCache;
use rayon::prelude::*;
use remote::{Executor, Shell};
use std::collections::BTreeMap;

/// Upper bound on search worker threads.
pub const MAX_SEARCH_JOBS: usize = 16;

/// Run a search on every host, `jobs` hosts at a time.
///
/// Hosts are independent: each one is detected (through the shared cache),
/// gets its own backend, and reports its own result. One host failing does
/// not affect the others.
pub fn search_hosts<S: AsRef<str> + Sync>(
    executor: &dyn Executor,
    cache: &TargetCache,
    registry: &Registry,
    hosts: &[String],
    terms: &[S],
    jobs: usize,
) -> Result<BTreeMap<String, Result<Vec<String>>>> {
    let search_one = |host: &String| -> (String, Result<Vec<String>>) {
        let sh = Shell::new(executor, host);
        let result = cache
            .get_or_detect(&sh)
            .map_err(crate::Error::from)
            .and_then(|target| PackageManager::for_target(sh, registry, &target)?.search(terms));
        (host.clone(), result)
    };

    let jobs = jobs.clamp(1, MAX_SEARCH_JOBS);
    if jobs == 1 || hosts.len() < 2 {
        return Ok(hosts.iter().map(search_one).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    Ok(pool.install(|| hosts.par_iter().map(search_one).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::CommandOutput;
    use remote::mock::MockExecutor;

    fn ubuntu_mock() -> MockExecutor {
        ubuntu_rules(MockExecutor::new())
    }

    fn ubuntu_rules(mock: MockExecutor) -> MockExecutor {
        mock.respond("echo \"${USER},${HOME}\"", "deploy,/home/deploy\n")
            .respond("cat /etc/os-release", "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"22.04\"\n")
            .respond("uname -s -n -r -m", "Linux web 5.15.0 x86_64\n")
            .respond("apt-cache search", "htop - interactive processes viewer\n")
    }

    #[test]
    fn test_search_runs_per_host_backend() {
        let mock = ubuntu_mock();
        let cache = TargetCache::new();
        let hosts = vec!["web1".to_string(), "web2".to_string()];

        let results = search_hosts(&mock, &cache, &Registry::default(), &hosts, &["htop"], 4)
            .unwrap();
        assert_eq!(results.len(), 2);
        for host in &hosts {
            assert_eq!(
                results[host].as_ref().unwrap(),
                &vec!["htop - interactive processes viewer".to_string()]
            );
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_one_failing_host_does_not_spoil_others() {
        let mock = ubuntu_rules(MockExecutor::new().with_handler(|host, _| {
            (host == "down1").then(|| CommandOutput::failed(255, "ssh: connect to host down1"))
        }));
        let cache = TargetCache::new();
        let hosts = vec!["down1".to_string(), "web1".to_string()];

        let results =
            search_hosts(&mock, &cache, &Registry::default(), &hosts, &["htop"], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results["down1"].is_err());
        assert_eq!(
            results["web1"].as_ref().unwrap(),
            &vec!["htop - interactive processes viewer".to_string()]
        );
        assert_eq!(cache.len(), 1);
    }
}
