//! Provisioning orchestrator
//!
//! One run goes: restore cache, bootstrap the distribution, re-validate its
//! configuration, print diagnostics, materialize the environment, save cache.
//! Every installation step is guarded by `EnvironmentProbe`, so a rerun over
//! complete state issues no install commands. Cache failures only ever
//! produce warnings; installation failures end the run.

use crate::cache::{
    ArtifactCache, CacheKey, CacheKeyBuilder, CachePathSet, RestoreOutcome, SaveReceipt,
};
use crate::command::{
    quote_path, shell_quote, CommandOutput, CommandRunner, ShellCommand, ToolContext,
};
use crate::error::{ProvisionError, ProvisionResult};
use crate::provision::layout::Layout;
use crate::provision::probe::{EnvironmentProbe, ProvisioningState};
use crate::provision::settings::ProvisionSettings;
use crate::ui::{self, TaskSpinner, UiContext};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Installation steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    DownloadInstaller,
    InstallDistribution,
    ConfigureDistribution,
    CreateEnvironment,
    InstallPackages,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DownloadInstaller => "Download conda",
            Self::InstallDistribution => "Install conda",
            Self::ConfigureDistribution => "Configure conda",
            Self::CreateEnvironment => "Create environment",
            Self::InstallPackages => "Install packages",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to the cache restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreStatus {
    Disabled,
    Hit { key: CacheKey },
    Miss,
    Failed { reason: String },
}

/// What happened to the cache save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    Disabled,
    Saved { receipt: SaveReceipt },
    Failed { reason: String },
}

/// Outcome of the informational `conda info` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagnosticsStatus {
    Shown { output: String },
    Failed { reason: String },
}

/// Summary of one provisioning run
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    /// Cache key, present when caching is enabled
    pub key: Option<CacheKey>,
    pub restore: RestoreStatus,
    /// State found after the restore, before any installation step
    pub initial_state: ProvisioningState,
    pub performed: Vec<Step>,
    pub skipped: Vec<Step>,
    pub diagnostics: DiagnosticsStatus,
    pub save: SaveStatus,
    pub final_state: ProvisioningState,
}

impl ProvisionReport {
    /// Whether any installation command ran
    pub fn installed_anything(&self) -> bool {
        !self.performed.is_empty()
    }
}

/// Drives a provisioning run over a layout
pub struct Provisioner {
    settings: ProvisionSettings,
    layout: Layout,
    probe: EnvironmentProbe,
    runner: Arc<dyn CommandRunner>,
    cache: Option<Arc<dyn ArtifactCache>>,
    ui: UiContext,
}

impl Provisioner {
    /// Create a provisioner without a cache backend
    pub fn new(
        settings: ProvisionSettings,
        layout: Layout,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let probe = EnvironmentProbe::new(settings.guards, settings.packages.clone());
        Self {
            settings,
            layout,
            probe,
            runner,
            cache: None,
            ui: UiContext::non_interactive(),
        }
    }

    /// Attach the backend used for restore and save
    pub fn with_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_ui(mut self, ui: UiContext) -> Self {
        self.ui = ui;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn probe(&self) -> &EnvironmentProbe {
        &self.probe
    }

    /// Key the current settings map to
    pub fn cache_key(&self) -> ProvisionResult<CacheKey> {
        CacheKeyBuilder::new(&self.settings.namespace).build(
            &self.settings.tool_version,
            &self.settings.os_id,
            &self.settings.generation,
        )
    }

    /// Run every phase and report what was done
    pub async fn run(&self) -> ProvisionResult<ProvisionReport> {
        let key = self.cache_key()?;
        let paths = self.layout.cache_paths();

        let cache = match (&self.cache, self.settings.cache_enabled()) {
            (Some(cache), true) => Some(&**cache),
            (None, true) => {
                warn!("Cache generation set but no cache backend attached");
                None
            }
            (_, false) => {
                debug!("Cache generation empty, restore and save disabled");
                None
            }
        };

        let restore = match cache {
            Some(cache) => self.restore(cache, &paths, &key).await,
            None => RestoreStatus::Disabled,
        };

        let initial = self.probe.inspect(&self.layout);
        info!("State after restore: {}", initial.state);

        let mut performed = Vec::new();
        let mut skipped = Vec::new();

        if initial.state == ProvisioningState::Absent {
            self.bootstrap(initial.distribution_dir_exists).await?;
            performed.extend([
                Step::DownloadInstaller,
                Step::InstallDistribution,
                Step::ConfigureDistribution,
            ]);
        } else {
            ui::step_skipped(&self.ui, "Install conda", "already installed");
            skipped.extend([Step::DownloadInstaller, Step::InstallDistribution]);

            if self.probe.inspect(&self.layout).pkgs_dir_registered {
                skipped.push(Step::ConfigureDistribution);
            } else {
                info!(
                    "{} does not register {}, reconfiguring",
                    self.layout.config_file.display(),
                    self.layout.pkgs_dir.display()
                );
                self.configure().await?;
                performed.push(Step::ConfigureDistribution);
            }
        }

        let diagnostics = self.diagnostics().await;

        let inspection = self.probe.inspect(&self.layout);
        match inspection.state {
            ProvisioningState::Absent => {
                return Err(ProvisionError::Internal(format!(
                    "{} still not usable after bootstrap",
                    self.layout.distribution_root.display()
                )));
            }
            ProvisioningState::PackagesInstalled => {
                ui::step_skipped(&self.ui, "Create environment", "environment exists");
                skipped.extend([Step::CreateEnvironment, Step::InstallPackages]);
            }
            state => {
                if state == ProvisioningState::Bootstrapped && !inspection.env_dir_exists {
                    self.create_environment().await?;
                    performed.push(Step::CreateEnvironment);
                } else {
                    skipped.push(Step::CreateEnvironment);
                }
                self.install_packages().await?;
                performed.push(Step::InstallPackages);
            }
        }

        let save = match cache {
            Some(cache) => self.save(cache, &paths, &key).await,
            None => SaveStatus::Disabled,
        };

        let final_state = self.probe.inspect(&self.layout).state;
        Ok(ProvisionReport {
            key: self.settings.cache_enabled().then_some(key),
            restore,
            initial_state: initial.state,
            performed,
            skipped,
            diagnostics,
            save,
            final_state,
        })
    }

    async fn restore(
        &self,
        cache: &dyn ArtifactCache,
        paths: &CachePathSet,
        key: &CacheKey,
    ) -> RestoreStatus {
        ui::group_start(&self.ui, "Restore conda cache");
        let mut spinner = TaskSpinner::new(&self.ui);
        spinner.start(&format!("Restoring {} from {} cache...", key, cache.backend_name()));

        let status = match cache.restore(paths, key, &[]).await {
            Ok(RestoreOutcome::Hit { key }) => {
                spinner.stop(&format!("Cache hit for {}", key));
                RestoreStatus::Hit { key }
            }
            Ok(RestoreOutcome::Miss) => {
                spinner.stop(&format!("Cache miss for {}", key));
                RestoreStatus::Miss
            }
            Err(e) => {
                spinner.stop_warn("Cache restore failed");
                warn!("Cache restore failed: {}", e);
                ui::step_warn(
                    &self.ui,
                    &format!("Cache restore failed, provisioning from scratch: {}", e),
                );

                // Transfer errors happen before anything is extracted
                if !matches!(e, ProvisionError::Http { .. }) {
                    if let Err(inv) = self.probe.invalidate_markers(&self.layout).await {
                        warn!("Could not invalidate completion markers: {}", inv);
                    }
                }
                RestoreStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ui::group_end(&self.ui);
        status
    }

    async fn save(
        &self,
        cache: &dyn ArtifactCache,
        paths: &CachePathSet,
        key: &CacheKey,
    ) -> SaveStatus {
        ui::group_start(&self.ui, "Update conda cache");
        let mut spinner = TaskSpinner::new(&self.ui);
        spinner.start(&format!("Saving {} to {} cache...", key, cache.backend_name()));

        let status = match cache.save(paths, key).await {
            Ok(receipt) => {
                if receipt.reused {
                    spinner.stop(&format!("{} already cached", key));
                } else {
                    spinner.stop(&format!(
                        "Saved {} ({})",
                        key,
                        crate::cache::format_bytes(receipt.size_bytes)
                    ));
                }
                SaveStatus::Saved { receipt }
            }
            Err(e) => {
                spinner.stop_warn("Cache save failed");
                warn!("Cache save failed: {}", e);
                ui::step_warn(&self.ui, &format!("Cache save failed: {}", e));
                SaveStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ui::group_end(&self.ui);
        status
    }

    /// Download and run the installer, then register the package directory
    async fn bootstrap(&self, resume: bool) -> ProvisionResult<()> {
        let installer = self.layout.installer_path();
        let bare = ToolContext::bare(&self.layout.workdir);

        self.run_step(
            Step::DownloadInstaller,
            &bare,
            format!(
                "wget --no-verbose {} -O {}",
                shell_quote(&self.settings.installer_url),
                quote_path(&installer)
            ),
        )
        .await?;

        if resume {
            info!(
                "{} exists without a completed install, updating in place",
                self.layout.distribution_root.display()
            );
        }
        self.run_step(
            Step::InstallDistribution,
            &bare,
            format!(
                "bash {} -b{} -p {}",
                quote_path(&installer),
                if resume { " -u" } else { "" },
                quote_path(&self.layout.distribution_root)
            ),
        )
        .await?;

        match tokio::fs::remove_file(&installer).await {
            Ok(()) => debug!("Removed {}", installer.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ProvisionError::io(
                    format!("removing installer {}", installer.display()),
                    e,
                ))
            }
        }

        self.configure().await?;
        self.probe.mark_bootstrapped(&self.layout).await?;
        ui::step_ok_detail(
            &self.ui,
            "Conda installed",
            &self.layout.distribution_root.display().to_string(),
        );
        Ok(())
    }

    async fn configure(&self) -> ProvisionResult<()> {
        self.run_step(
            Step::ConfigureDistribution,
            &self.activated(),
            format!(
                "conda config --file {} --add pkgs_dirs {}",
                quote_path(&self.layout.config_file),
                quote_path(&self.layout.pkgs_dir)
            ),
        )
        .await?;
        Ok(())
    }

    /// `conda info`, never fatal
    async fn diagnostics(&self) -> DiagnosticsStatus {
        let command = ShellCommand::new("conda info").labeled("Conda info");
        match self.runner.run(&self.activated(), &command).await {
            Ok(output) if output.success() => DiagnosticsStatus::Shown {
                output: output.stdout,
            },
            Ok(output) => {
                let reason = format!("exit code {}: {}", output.exit_code(), output.tail());
                ui::step_warn(&self.ui, &format!("conda info failed ({})", reason));
                DiagnosticsStatus::Failed { reason }
            }
            Err(e) => {
                ui::step_warn(&self.ui, &format!("conda info failed: {}", e));
                DiagnosticsStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn create_environment(&self) -> ProvisionResult<()> {
        self.run_step(
            Step::CreateEnvironment,
            &self.activated(),
            format!("conda create -y -p {}", quote_path(&self.layout.env_dir)),
        )
        .await?;
        ui::step_ok_detail(
            &self.ui,
            "Environment created",
            &self.layout.env_dir.display().to_string(),
        );
        Ok(())
    }

    async fn install_packages(&self) -> ProvisionResult<()> {
        let tool = self.package_tool().await;
        let channels: String = self
            .settings
            .channels
            .iter()
            .map(|c| format!(" -c {}", shell_quote(c)))
            .collect();
        let pins: String = self
            .settings
            .packages
            .iter()
            .map(|p| format!(" {}", shell_quote(&p.to_string())))
            .collect();

        self.run_step(
            Step::InstallPackages,
            &self.activated(),
            format!(
                "{} install -y -p {}{}{}",
                tool,
                quote_path(&self.layout.env_dir),
                channels,
                pins
            ),
        )
        .await?;

        self.probe.mark_packages_installed(&self.layout).await?;
        ui::step_ok_detail(
            &self.ui,
            "Packages installed",
            &format!("{} pinned via {}", self.settings.packages.len(), tool),
        );
        Ok(())
    }

    /// `mamba` when preferred and available, `conda` otherwise
    async fn package_tool(&self) -> &'static str {
        if !self.settings.prefer_mamba {
            return "conda";
        }

        match self
            .runner
            .run(&self.activated(), &ShellCommand::new("command -v mamba"))
            .await
        {
            Ok(output) if output.success() => "mamba",
            Ok(_) => "conda",
            Err(e) => {
                debug!("mamba lookup failed: {}", e);
                "conda"
            }
        }
    }

    async fn run_step(
        &self,
        step: Step,
        context: &ToolContext,
        line: String,
    ) -> ProvisionResult<CommandOutput> {
        let command = ShellCommand::new(line).labeled(step.label());
        info!("{}: {}", step, command.line);

        let output = self.runner.run(context, &command).await?;
        if !output.success() {
            ui::step_error_detail(
                &self.ui,
                step.label(),
                &format!("exit code {}", output.exit_code()),
            );
            return Err(ProvisionError::step_failed(
                step.label(),
                output.exit_code(),
                output.tail(),
            ));
        }
        Ok(output)
    }

    /// Context with conda's profile sourced and `CONDARC` on the managed config file
    fn activated(&self) -> ToolContext {
        ToolContext::activated(&self.layout.workdir, self.layout.profile_script())
            .with_env("CONDARC", self.layout.config_file.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LayoutConfig;
    use crate::config::GuardPolicy;
    use crate::provision::packages::PackagePin;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Runner that simulates conda's effects on disk
    struct FakeRunner {
        layout: Layout,
        fail_on: Option<&'static str>,
        has_mamba: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(layout: &Layout) -> Self {
            Self {
                layout: layout.clone(),
                fail_on: None,
                has_mamba: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, prefix: &'static str) -> Self {
            self.fail_on = Some(prefix);
            self
        }

        fn with_mamba(mut self) -> Self {
            self.has_mamba = true;
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn install_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| !c.starts_with("conda info") && !c.starts_with("command -v"))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            _context: &ToolContext,
            command: &ShellCommand,
        ) -> ProvisionResult<CommandOutput> {
            let line = command.line.clone();
            self.calls.lock().unwrap().push(line.clone());

            let ok = |stdout: &str| CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            };

            if self.fail_on.is_some_and(|prefix| line.starts_with(prefix)) {
                return Ok(CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("simulated failure of {}", line),
                });
            }

            let layout = &self.layout;
            if line.starts_with("wget") {
                fs::write(layout.installer_path(), "#!/bin/sh\n").unwrap();
            } else if line.starts_with("bash ") {
                fs::create_dir_all(layout.profile_script().parent().unwrap()).unwrap();
                fs::write(layout.profile_script(), "").unwrap();
            } else if line.starts_with("conda config") {
                fs::write(
                    &layout.config_file,
                    format!("pkgs_dirs:\n  - {}\n", layout.pkgs_dir.display()),
                )
                .unwrap();
            } else if line.starts_with("conda info") {
                return Ok(ok("active environment : None"));
            } else if line.starts_with("conda create") {
                fs::create_dir_all(layout.env_dir.join("conda-meta")).unwrap();
            } else if line.starts_with("command -v mamba") {
                if !self.has_mamba {
                    return Ok(CommandOutput {
                        code: Some(1),
                        ..Default::default()
                    });
                }
                return Ok(ok("/opt/conda/bin/mamba"));
            } else if line.contains(" install ") {
                fs::create_dir_all(layout.env_dir.join("bin")).unwrap();
                fs::write(layout.env_dir.join("bin/snakemake"), "").unwrap();
            }
            Ok(ok(""))
        }
    }

    #[derive(Clone, Copy)]
    enum CacheBehavior {
        Miss,
        HitCompleteState,
        RestoreError,
        SaveError,
    }

    struct FakeCache {
        behavior: CacheBehavior,
        layout: Layout,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCache {
        fn new(behavior: CacheBehavior, layout: &Layout) -> Self {
            Self {
                behavior,
                layout: layout.clone(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArtifactCache for FakeCache {
        async fn restore(
            &self,
            _paths: &CachePathSet,
            key: &CacheKey,
            _fallback_keys: &[CacheKey],
        ) -> ProvisionResult<RestoreOutcome> {
            self.calls.lock().unwrap().push(format!("restore {}", key));
            match self.behavior {
                CacheBehavior::HitCompleteState => {
                    complete_state(&self.layout).await;
                    Ok(RestoreOutcome::Hit { key: key.clone() })
                }
                CacheBehavior::RestoreError => Err(ProvisionError::archive(
                    "unpacking bundle",
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated"),
                )),
                _ => Ok(RestoreOutcome::Miss),
            }
        }

        async fn save(
            &self,
            _paths: &CachePathSet,
            key: &CacheKey,
        ) -> ProvisionResult<SaveReceipt> {
            self.calls.lock().unwrap().push(format!("save {}", key));
            match self.behavior {
                CacheBehavior::SaveError => Err(ProvisionError::Cache("quota exceeded".into())),
                _ => Ok(SaveReceipt {
                    id: "abc123".into(),
                    size_bytes: 2048,
                    reused: false,
                }),
            }
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }
    }

    fn layout(temp: &TempDir) -> Layout {
        let root = temp.path();
        let config = LayoutConfig {
            distribution_root: root.join("home/.conda").display().to_string(),
            config_file: root.join("home/.condarc").display().to_string(),
            pkgs_dir: root.join("home/conda_pkgs_dir").display().to_string(),
            env_dir: "envs".to_string(),
        };
        fs::create_dir_all(root.join("home")).unwrap();
        fs::create_dir_all(root.join("work")).unwrap();
        Layout::resolve(&config, &root.join("work"))
    }

    fn settings(generation: &str) -> ProvisionSettings {
        ProvisionSettings {
            tool_version: "3.2.0".into(),
            os_id: "Linux".into(),
            generation: generation.into(),
            namespace: "conda-dev3".into(),
            installer_url: "https://repo.example.org/Miniconda3-latest-Linux-x86_64.sh".into(),
            channels: vec!["defaults".into(), "conda-forge".into(), "bioconda".into()],
            packages: PackagePin::defaults(),
            prefer_mamba: true,
            guards: GuardPolicy::Markers,
        }
    }

    /// Fully provisioned state as a cache hit would leave it
    async fn complete_state(layout: &Layout) {
        let probe = EnvironmentProbe::new(GuardPolicy::Markers, PackagePin::defaults());
        fs::create_dir_all(layout.profile_script().parent().unwrap()).unwrap();
        fs::write(layout.profile_script(), "").unwrap();
        fs::write(
            &layout.config_file,
            format!("pkgs_dirs:\n  - {}\n", layout.pkgs_dir.display()),
        )
        .unwrap();
        fs::create_dir_all(&layout.env_dir).unwrap();
        probe.mark_bootstrapped(layout).await.unwrap();
        probe.mark_packages_installed(layout).await.unwrap();
    }

    #[tokio::test]
    async fn miss_runs_every_step_and_saves() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let cache = Arc::new(FakeCache::new(CacheBehavior::Miss, &layout));

        let report = Provisioner::new(settings("7"), layout.clone(), runner.clone())
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.key.as_ref().unwrap().as_str(), "conda-dev3-3.2.0-Linux-7");
        assert_eq!(report.restore, RestoreStatus::Miss);
        assert_eq!(report.initial_state, ProvisioningState::Absent);
        assert_eq!(report.final_state, ProvisioningState::PackagesInstalled);
        assert_eq!(
            report.performed,
            vec![
                Step::DownloadInstaller,
                Step::InstallDistribution,
                Step::ConfigureDistribution,
                Step::CreateEnvironment,
                Step::InstallPackages,
            ]
        );
        assert!(matches!(report.save, SaveStatus::Saved { .. }));
        assert_eq!(
            cache.calls(),
            vec![
                "restore conda-dev3-3.2.0-Linux-7",
                "save conda-dev3-3.2.0-Linux-7"
            ]
        );

        let calls = runner.install_calls();
        assert!(calls[0].starts_with("wget --no-verbose https://repo.example.org/"));
        assert!(calls[1].contains(" -b -p "));
        assert!(calls[2].starts_with("conda config --file "));
        assert!(calls[3].starts_with("conda create -y -p "));
        assert!(calls[4].starts_with("conda install -y -p "));
        assert!(calls[4].contains("-c defaults -c conda-forge -c bioconda"));
        assert!(calls[4].ends_with("mamba==0.17.0 snakemake-minimal==6.12.3 jinja2==2.11.3"));
        assert!(!layout.installer_path().exists());
    }

    #[tokio::test]
    async fn hit_skips_installation() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let cache = Arc::new(FakeCache::new(CacheBehavior::HitCompleteState, &layout));

        let report = Provisioner::new(settings("7"), layout.clone(), runner.clone())
            .with_cache(cache)
            .run()
            .await
            .unwrap();

        assert!(matches!(report.restore, RestoreStatus::Hit { .. }));
        assert_eq!(report.initial_state, ProvisioningState::PackagesInstalled);
        assert!(!report.installed_anything());
        assert!(runner.install_calls().is_empty());
        assert!(matches!(report.diagnostics, DiagnosticsStatus::Shown { .. }));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);

        let first = Arc::new(FakeRunner::new(&layout));
        Provisioner::new(settings(""), layout.clone(), first.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(first.install_calls().len(), 5);

        let second = Arc::new(FakeRunner::new(&layout));
        let report = Provisioner::new(settings(""), layout.clone(), second.clone())
            .run()
            .await
            .unwrap();

        assert!(second.install_calls().is_empty());
        assert_eq!(second.calls(), vec!["conda info"]);
        assert_eq!(report.skipped.len(), 5);
    }

    #[tokio::test]
    async fn empty_generation_bypasses_cache() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let cache = Arc::new(FakeCache::new(CacheBehavior::Miss, &layout));

        let report = Provisioner::new(settings("  "), layout, runner)
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();

        assert!(cache.calls().is_empty());
        assert_eq!(report.restore, RestoreStatus::Disabled);
        assert_eq!(report.save, SaveStatus::Disabled);
        assert!(report.key.is_none());
    }

    #[tokio::test]
    async fn save_failure_does_not_fail_the_run() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let cache = Arc::new(FakeCache::new(CacheBehavior::SaveError, &layout));

        let report = Provisioner::new(settings("7"), layout, runner)
            .with_cache(cache)
            .run()
            .await
            .unwrap();

        assert_eq!(report.final_state, ProvisioningState::PackagesInstalled);
        match report.save {
            SaveStatus::Failed { reason } => assert!(reason.contains("quota exceeded")),
            other => panic!("unexpected save status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn restore_error_invalidates_markers_and_reinstalls() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        complete_state(&layout).await;

        let runner = Arc::new(FakeRunner::new(&layout));
        let cache = Arc::new(FakeCache::new(CacheBehavior::RestoreError, &layout));

        let report = Provisioner::new(settings("7"), layout.clone(), runner.clone())
            .with_cache(cache)
            .run()
            .await
            .unwrap();

        assert!(matches!(report.restore, RestoreStatus::Failed { .. }));
        assert_eq!(report.initial_state, ProvisioningState::Absent);
        // The distribution directory survived, so the installer updates in place
        let calls = runner.install_calls();
        assert!(calls[1].contains(" -b -u -p "));
        // The env directory survived too; only the packages are reinstalled
        assert!(report.skipped.contains(&Step::CreateEnvironment));
        assert!(report.performed.contains(&Step::InstallPackages));
        assert_eq!(report.final_state, ProvisioningState::PackagesInstalled);
    }

    #[tokio::test]
    async fn partial_distribution_is_updated_in_place() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        fs::create_dir_all(layout.distribution_root.join("pkgs")).unwrap();

        let runner = Arc::new(FakeRunner::new(&layout));
        Provisioner::new(settings(""), layout.clone(), runner.clone())
            .run()
            .await
            .unwrap();

        let install = runner
            .calls()
            .into_iter()
            .find(|c| c.starts_with("bash "))
            .unwrap();
        assert!(install.contains(" -b -u -p "));
    }

    #[tokio::test]
    async fn directory_guard_trusts_partial_distribution() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        fs::create_dir_all(&layout.distribution_root).unwrap();

        let mut loose = settings("");
        loose.guards = GuardPolicy::Directories;
        let runner = Arc::new(FakeRunner::new(&layout));
        let report = Provisioner::new(loose, layout, runner.clone())
            .run()
            .await
            .unwrap();

        assert!(report.skipped.contains(&Step::InstallDistribution));
        assert!(!runner.calls().iter().any(|c| c.starts_with("wget")));
    }

    #[tokio::test]
    async fn missing_pkgs_dir_registration_is_reapplied() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        complete_state(&layout).await;
        fs::write(&layout.config_file, "channels:\n  - defaults\n").unwrap();

        let runner = Arc::new(FakeRunner::new(&layout));
        let report = Provisioner::new(settings(""), layout, runner.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.performed, vec![Step::ConfigureDistribution]);
        assert!(runner.install_calls()[0].starts_with("conda config --file "));
    }

    #[tokio::test]
    async fn step_failure_is_fatal_with_output() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout).failing_on("conda create"));
        let cache = Arc::new(FakeCache::new(CacheBehavior::Miss, &layout));

        let err = Provisioner::new(settings("7"), layout.clone(), runner)
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap_err();

        match err {
            ProvisionError::StepFailed { step, code, output } => {
                assert_eq!(step, "Create environment");
                assert_eq!(code, 1);
                assert!(output.contains("simulated failure of conda create"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing is saved after a failed run
        assert_eq!(cache.calls().len(), 1);
        // Bootstrap completed and stays recorded for the next run
        let probe = EnvironmentProbe::new(GuardPolicy::Markers, PackagePin::defaults());
        assert_eq!(probe.inspect(&layout).state, ProvisioningState::Bootstrapped);
    }

    #[tokio::test]
    async fn download_failure_stops_before_install() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout).failing_on("wget"));

        let err = Provisioner::new(settings(""), layout, runner.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::StepFailed { ref step, .. } if step == "Download conda"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn info_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout).failing_on("conda info"));

        let report = Provisioner::new(settings(""), layout, runner)
            .run()
            .await
            .unwrap();

        assert!(matches!(report.diagnostics, DiagnosticsStatus::Failed { .. }));
        assert_eq!(report.final_state, ProvisioningState::PackagesInstalled);
    }

    #[tokio::test]
    async fn uses_mamba_when_available() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout).with_mamba());

        Provisioner::new(settings(""), layout, runner.clone())
            .run()
            .await
            .unwrap();

        assert!(runner
            .calls()
            .iter()
            .any(|c| c.starts_with("mamba install -y -p ")));
    }

    #[tokio::test]
    async fn empty_tool_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let mut bad = settings("7");
        bad.tool_version = String::new();

        let err = Provisioner::new(bad, layout, runner.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::InvalidCacheKey { field: "tool version" }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn activated_commands_read_the_managed_condarc() {
        let temp = TempDir::new().unwrap();
        let layout = layout(&temp);
        let runner = Arc::new(FakeRunner::new(&layout));
        let provisioner = Provisioner::new(settings("7"), layout.clone(), runner);

        let context = provisioner.activated();
        assert_eq!(context.activation(), Some(layout.profile_script().as_path()));
        assert_eq!(
            context.env().get("CONDARC").map(String::as_str),
            Some(layout.config_file.display().to_string().as_str())
        );
    }
}
