//! `sync` subcommand flags (§6.2) and their validation.

use clap::Args;

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    /// Base concurrency; seeds --jobs-network and --jobs-checkout when unset.
    #[arg(short = 'j', long)]
    pub jobs: Option<u64>,

    /// Override network concurrency; ignored in --interleaved mode.
    #[arg(long)]
    pub jobs_network: Option<u64>,

    /// Override checkout concurrency; ignored in --interleaved mode.
    #[arg(long)]
    pub jobs_checkout: Option<u64>,

    /// Run fetch and checkout back-to-back per project instead of phased.
    #[arg(long)]
    pub interleaved: bool,

    /// Stop after the fetch phase.
    #[arg(short = 'n', long)]
    pub network_only: bool,

    /// Skip all network work.
    #[arg(short = 'l', long)]
    pub local_only: bool,

    /// Checkout detached at the manifest revision.
    #[arg(short = 'd', long)]
    pub detach: bool,

    #[arg(short = 'c', long, overrides_with = "no_current_branch")]
    pub current_branch: bool,
    #[arg(long, overrides_with = "current_branch")]
    pub no_current_branch: bool,

    #[arg(long)]
    pub force_sync: bool,
    #[arg(long)]
    pub force_checkout: bool,
    #[arg(long)]
    pub force_remove_dirty: bool,
    /// Obsolete; kept for compatibility, emits a warning.
    #[arg(long)]
    pub force_broken: bool,

    #[arg(long)]
    pub rebase: bool,

    #[arg(long)]
    pub fail_fast: bool,

    #[arg(long, overrides_with = "no_prune", default_value_t = true)]
    pub prune: bool,
    #[arg(long, overrides_with = "prune")]
    pub no_prune: bool,

    #[arg(long, overrides_with = "no_tags")]
    pub tags: bool,
    #[arg(long, overrides_with = "tags")]
    pub no_tags: bool,

    #[arg(long, overrides_with = "no_clone_bundle")]
    pub clone_bundle: bool,
    #[arg(long, overrides_with = "clone_bundle")]
    pub no_clone_bundle: bool,

    #[arg(long)]
    pub optimized_fetch: bool,
    #[arg(long, default_value_t = 0)]
    pub retry_fetches: u32,
    #[arg(long)]
    pub fetch_submodules: bool,

    /// Override manifest for this run; mutually exclusive with -s/-t.
    #[arg(short = 'm', value_name = "NAME.xml")]
    pub manifest_name: Option<String>,

    #[arg(short = 's', long)]
    pub smart_sync: bool,
    #[arg(short = 't', long, value_name = "TAG")]
    pub smart_tag: Option<String>,

    #[arg(short = 'u', long, value_name = "USER")]
    pub manifest_server_username: Option<String>,
    #[arg(short = 'p', long, value_name = "PASS")]
    pub manifest_server_password: Option<String>,

    #[arg(long, overrides_with = "no_auto_gc")]
    pub auto_gc: bool,
    #[arg(long, overrides_with = "auto_gc")]
    pub no_auto_gc: bool,

    #[arg(long, overrides_with = "no_use_superproject")]
    pub use_superproject: bool,
    #[arg(long, overrides_with = "use_superproject")]
    pub no_use_superproject: bool,

    #[arg(long)]
    pub no_manifest_update: bool,
    #[arg(long)]
    pub no_repo_verify: bool,
    #[arg(long)]
    pub repo_upgraded: bool,
}

#[derive(Debug)]
pub struct OptionsError(pub String);

impl std::fmt::Display for OptionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OptionsError {}

impl SyncArgs {
    pub fn current_branch_only(&self) -> bool {
        self.current_branch || (self.use_superproject && !self.no_use_superproject)
    }

    pub fn prune_effective(&self) -> bool {
        !self.no_prune
    }

    pub fn tags_effective(&self) -> bool {
        self.tags && !self.no_tags
    }

    pub fn auto_gc_effective(&self) -> bool {
        self.auto_gc && !self.no_auto_gc
    }

    /// Enforce the mutual-exclusion rules before any worker starts, mirroring
    /// `ValidateOptions` running ahead of manifest-dependent defaulting.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.network_only && self.detach {
            return Err(OptionsError("-n/--network-only and -d/--detach are mutually exclusive".into()));
        }
        if self.network_only && self.local_only {
            return Err(OptionsError("-n/--network-only and -l/--local-only are mutually exclusive".into()));
        }
        if self.manifest_name.is_some() && self.smart_sync {
            return Err(OptionsError("-m and -s/--smart-sync are mutually exclusive".into()));
        }
        if self.manifest_name.is_some() && self.smart_tag.is_some() {
            return Err(OptionsError("-m and -t/--smart-tag are mutually exclusive".into()));
        }
        if self.smart_sync && self.smart_tag.is_some() {
            return Err(OptionsError("-s/--smart-sync and -t/--smart-tag are mutually exclusive".into()));
        }
        let wants_server = self.smart_sync || self.smart_tag.is_some();
        if (self.manifest_server_username.is_some() || self.manifest_server_password.is_some()) && !wants_server {
            return Err(OptionsError("-u/-p require -s/--smart-sync or -t/--smart-tag".into()));
        }
        if self.manifest_server_username.is_some() != self.manifest_server_password.is_some() {
            return Err(OptionsError("-u and -p must be given together".into()));
        }
        Ok(())
    }
}
