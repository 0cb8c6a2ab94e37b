//! Job-count derivation: resolving `--jobs`/`--jobs-network`/`--jobs-checkout`
//! against manifest defaults, CPU count, and the process's file-descriptor
//! limit.

const JOBS_WARN_THRESHOLD: u64 = 100;
const DEFAULT_LOCAL_JOBS: u64 = 8;
const DEFAULT_NETWORK_JOBS: u64 = 1;

/// Resolved concurrency for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCounts {
    pub jobs: u64,
    pub jobs_network: u64,
    pub jobs_checkout: u64,
}

/// A warning emitted when an effective job count exceeds [`JOBS_WARN_THRESHOLD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsWarning {
    pub flag: &'static str,
    pub value: u64,
}

impl JobCounts {
    /// Derive effective job counts the way `_ValidateOptionsWithManifest`
    /// does: `--jobs` (or the manifest default, or CPU count) seeds
    /// `jobs_network`/`jobs_checkout` when the user didn't set them
    /// individually; every value is then clamped by the file-descriptor
    /// budget. Returns the resolved counts plus any warnings, checked in
    /// priority order `--jobs` -> `--jobs-network` -> `--jobs-checkout`.
    pub fn derive(
        jobs_flag: Option<u64>,
        jobs_network_flag: Option<u64>,
        jobs_checkout_flag: Option<u64>,
        manifest_default_jobs: Option<u64>,
        cpu_count: u64,
        soft_nofile_limit: Option<u64>,
    ) -> (Self, Vec<JobsWarning>) {
        let jobs = jobs_flag
            .or(manifest_default_jobs)
            .unwrap_or(cpu_count.max(1));

        let jobs_network = jobs_network_flag.or(jobs_flag).unwrap_or(DEFAULT_NETWORK_JOBS);
        let jobs_checkout = jobs_checkout_flag.or(jobs_flag).unwrap_or(DEFAULT_LOCAL_JOBS);

        let clamp = fd_clamp(soft_nofile_limit);

        let jobs = jobs.min(clamp).max(1);
        let jobs_network = jobs_network.min(clamp).max(1);
        let jobs_checkout = jobs_checkout.min(clamp).max(1);

        let mut warnings = Vec::new();
        if let Some(v) = jobs_flag
            && v > JOBS_WARN_THRESHOLD
        {
            warnings.push(JobsWarning { flag: "--jobs", value: v });
        } else if let Some(v) = jobs_network_flag
            && v > JOBS_WARN_THRESHOLD
        {
            warnings.push(JobsWarning {
                flag: "--jobs-network",
                value: v,
            });
        } else if let Some(v) = jobs_checkout_flag
            && v > JOBS_WARN_THRESHOLD
        {
            warnings.push(JobsWarning {
                flag: "--jobs-checkout",
                value: v,
            });
        }

        (
            Self {
                jobs,
                jobs_network,
                jobs_checkout,
            },
            warnings,
        )
    }
}

/// `max(1, (soft_limit - 5) / 3)`, reserving descriptors for the process's
/// own stdio, log files, and persisted-state handles.
fn fd_clamp(soft_limit: Option<u64>) -> u64 {
    let soft_limit = soft_limit.unwrap_or_else(current_soft_nofile_limit);
    (soft_limit.saturating_sub(5) / 3).max(1)
}

pub fn current_soft_nofile_limit() -> u64 {
    rlimit::getrlimit(rlimit::Resource::NOFILE)
        .map(|(soft, _hard)| soft)
        .unwrap_or(1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fd_clamp_matches_spec_example() {
        // soft = 32 -> jobs <= 9
        assert_eq!(fd_clamp(Some(32)), 9);
    }

    #[test]
    fn test_jobs_flag_seeds_network_and_checkout() {
        let (counts, warnings) = JobCounts::derive(Some(4), None, None, None, 8, Some(1024));
        assert_eq!(counts.jobs, 4);
        assert_eq!(counts.jobs_network, 4);
        assert_eq!(counts.jobs_checkout, 4);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let (counts, _) = JobCounts::derive(None, None, None, None, 1, Some(1024));
        assert_eq!(counts.jobs_network, DEFAULT_NETWORK_JOBS);
        assert_eq!(counts.jobs_checkout, DEFAULT_LOCAL_JOBS);
    }

    #[test]
    fn test_manifest_default_used_before_cpu_count() {
        let (counts, _) = JobCounts::derive(None, None, None, Some(16), 4, Some(1024));
        assert_eq!(counts.jobs, 16);
    }

    #[test]
    fn test_clamp_and_warning_for_jobs_200_soft_32() {
        // S6: RLIMIT soft = 32, --jobs=200 -> warn, effective jobs clamped to 9.
        let (counts, warnings) = JobCounts::derive(Some(200), None, None, None, 8, Some(32));
        assert_eq!(counts.jobs, 9);
        assert_eq!(warnings, vec![JobsWarning { flag: "--jobs", value: 200 }]);
    }

    #[test]
    fn test_no_warning_under_threshold() {
        let (_, warnings) = JobCounts::derive(Some(50), None, None, None, 8, Some(1024));
        assert!(warnings.is_empty());
    }
}
