//! Integration tests for condaprov

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary isolated from the user's global and local config
    fn condaprov(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("condaprov");
        cmd.arg("--no-local")
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .current_dir(temp.path())
            .env_remove("RUNNER_OS")
            .env_remove("CONDAPROV_TOOL_VERSION")
            .env_remove("CONDAPROV_CACHE_NUMBER")
            .env_remove("GITHUB_ACTIONS");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cached conda environments"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("condaprov"));
    }

    #[test]
    fn key_from_flags() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .args([
                "key",
                "--tool-version",
                "3.2.0",
                "--os",
                "Linux",
                "--cache-number",
                "7",
            ])
            .assert()
            .success()
            .stdout("conda-dev3-3.2.0-Linux-7\n");
    }

    #[test]
    fn key_from_environment() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .arg("key")
            .env("CONDAPROV_TOOL_VERSION", "3.2.0")
            .env("RUNNER_OS", "macOS")
            .env("CONDAPROV_CACHE_NUMBER", "12")
            .assert()
            .success()
            .stdout("conda-dev3-3.2.0-macOS-12\n");
    }

    #[test]
    fn key_uses_configured_namespace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[cache]\nnamespace = \"team\"\ngeneration = \"3\"\n",
        )
        .unwrap();

        condaprov(&temp)
            .args(["key", "--tool-version", "1.0", "--os", "Linux"])
            .assert()
            .success()
            .stdout("team-1.0-Linux-3\n");
    }

    #[test]
    fn key_fails_when_caching_disabled() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .args(["key", "--tool-version", "3.2.0", "--os", "Linux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Caching is disabled"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[conda]\npackages = [\"snakemake>=6\"]\n",
        )
        .unwrap();

        condaprov(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("snakemake-minimal==6.12.3"));
    }

    #[test]
    fn config_init_then_show() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").is_file());
    }

    #[test]
    fn status_reports_absent_state() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            format!(
                "[layout]\ndistribution_root = \"{0}/conda\"\nconfig_file = \"{0}/condarc\"\npkgs_dir = \"{0}/pkgs\"\n\n[general]\nrun_log = false\n",
                temp.path().display()
            ),
        )
        .unwrap();

        condaprov(&temp)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("absent"))
            .stdout(predicate::str::contains("Disabled"));
    }

    #[test]
    fn provision_json_keeps_stdout_parseable() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        // Provisioned state whose profile defines a chatty `conda`
        let dist = root.join("conda");
        std::fs::create_dir_all(dist.join("etc/profile.d")).unwrap();
        std::fs::write(
            dist.join("etc/profile.d/conda.sh"),
            "conda() { echo \"conda $* from $CONDARC\"; echo 'conda stderr' >&2; }\n",
        )
        .unwrap();
        std::fs::write(dist.join(".condaprov-bootstrap"), "done\n").unwrap();
        std::fs::write(
            root.join("condarc"),
            format!("pkgs_dirs:\n  - {}\n", root.join("pkgs").display()),
        )
        .unwrap();
        std::fs::create_dir_all(root.join("envs")).unwrap();
        std::fs::write(
            root.join("envs/.condaprov-packages"),
            "mamba==0.17.0\nsnakemake-minimal==6.12.3\njinja2==2.11.3\n",
        )
        .unwrap();
        std::fs::write(
            root.join("config.toml"),
            format!(
                "[layout]\ndistribution_root = \"{0}/conda\"\nconfig_file = \"{0}/condarc\"\npkgs_dir = \"{0}/pkgs\"\nenv_dir = \"{0}/envs\"\n\n[general]\nrun_log = false\n",
                root.display()
            ),
        )
        .unwrap();

        let output = condaprov(&temp)
            .args(["provision", "--json", "--tool-version", "3.2.0", "--os", "Linux"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["performed"], serde_json::json!([]));
        assert_eq!(report["restore"]["status"], "disabled");
        assert_eq!(report["diagnostics"]["status"], "shown");
        let diagnostics = report["diagnostics"]["output"].as_str().unwrap();
        assert!(diagnostics.contains("conda info from"));
        assert!(diagnostics.contains("condarc"));

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("$ conda info"));
    }

    #[test]
    fn completions_generate() {
        let temp = TempDir::new().unwrap();
        condaprov(&temp)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("condaprov"));
    }
}

mod provisioning_tests {
    use async_trait::async_trait;
    use condaprov::cache::DirectoryCache;
    use condaprov::command::{CommandOutput, CommandRunner, ShellCommand, ToolContext};
    use condaprov::config::schema::LayoutConfig;
    use condaprov::config::GuardPolicy;
    use condaprov::provision::{
        Layout, PackagePin, ProvisionSettings, Provisioner, ProvisioningState, RestoreStatus,
        SaveStatus,
    };
    use condaprov::ProvisionResult;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Runner that records command lines and fakes their effects on disk
    struct RecordingRunner {
        layout: Layout,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRunner {
        fn new(layout: &Layout) -> Arc<Self> {
            Arc::new(Self {
                layout: layout.clone(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn install_commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|line| *line != "conda info" && !line.starts_with("command -v"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, _context: &ToolContext, command: &ShellCommand) -> ProvisionResult<CommandOutput> {
            let line = command.line.clone();
            self.calls.lock().unwrap().push(line.clone());
            let layout = &self.layout;

            if line.starts_with("wget") {
                fs::write(layout.installer_path(), "#!/bin/sh\n").unwrap();
            } else if line.starts_with("bash ") {
                let profile = layout.profile_script();
                fs::create_dir_all(profile.parent().unwrap()).unwrap();
                fs::write(&profile, "# conda profile\n").unwrap();
                fs::create_dir_all(layout.distribution_root.join("bin")).unwrap();
                fs::write(layout.distribution_root.join("bin/conda"), "#!/bin/sh\n").unwrap();
            } else if line.starts_with("conda config") {
                fs::write(
                    &layout.config_file,
                    format!("pkgs_dirs:\n  - {}\n", layout.pkgs_dir.display()),
                )
                .unwrap();
                fs::create_dir_all(&layout.pkgs_dir).unwrap();
            } else if line.starts_with("conda create") {
                fs::create_dir_all(layout.env_dir.join("conda-meta")).unwrap();
            } else if line.starts_with("command -v") {
                return Ok(CommandOutput {
                    code: Some(1),
                    ..Default::default()
                });
            } else if line.contains(" install ") {
                fs::create_dir_all(layout.env_dir.join("bin")).unwrap();
                fs::write(layout.env_dir.join("bin/snakemake"), "#!/bin/sh\n").unwrap();
            }

            Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }

    fn layout(runner_home: &TempDir) -> Layout {
        let root = runner_home.path();
        fs::create_dir_all(root.join("work")).unwrap();
        let config = LayoutConfig {
            distribution_root: root.join(".conda").display().to_string(),
            config_file: root.join(".condarc").display().to_string(),
            pkgs_dir: root.join("conda_pkgs_dir").display().to_string(),
            env_dir: "envs".to_string(),
        };
        Layout::resolve(&config, &root.join("work"))
    }

    fn settings() -> ProvisionSettings {
        ProvisionSettings {
            tool_version: "3.2.0".to_string(),
            os_id: "Linux".to_string(),
            generation: "7".to_string(),
            namespace: "conda-dev3".to_string(),
            installer_url: "https://repo.example.org/Miniconda3-latest-Linux-x86_64.sh".to_string(),
            channels: vec![
                "defaults".to_string(),
                "conda-forge".to_string(),
                "bioconda".to_string(),
            ],
            packages: PackagePin::defaults(),
            prefer_mamba: true,
            guards: GuardPolicy::Markers,
        }
    }

    #[tokio::test]
    async fn fresh_runner_restores_what_the_first_runner_saved() {
        let bundles = TempDir::new().unwrap();
        let cache = Arc::new(DirectoryCache::new(bundles.path().to_path_buf()));

        // First runner: cache miss, full install, save
        let first_home = TempDir::new().unwrap();
        let first_layout = layout(&first_home);
        let first_runner = RecordingRunner::new(&first_layout);
        let first = Provisioner::new(settings(), first_layout.clone(), first_runner.clone())
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(first.restore, RestoreStatus::Miss);
        assert_eq!(first_runner.install_commands().len(), 5);
        assert!(matches!(first.save, SaveStatus::Saved { .. }));
        assert!(bundles
            .path()
            .join("conda-dev3-3.2.0-Linux-7.tar.gz")
            .is_file());

        // Second runner: same paths, wiped clean, as on a new ephemeral machine
        for path in first_layout.cache_paths().iter() {
            if path.is_dir() {
                fs::remove_dir_all(path).unwrap();
            } else if path.exists() {
                fs::remove_file(path).unwrap();
            }
        }

        let second_runner = RecordingRunner::new(&first_layout);
        let second = Provisioner::new(settings(), first_layout.clone(), second_runner.clone())
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();

        assert!(matches!(second.restore, RestoreStatus::Hit { .. }));
        assert_eq!(second.initial_state, ProvisioningState::PackagesInstalled);
        assert!(second_runner.install_commands().is_empty());
        assert!(first_layout.env_dir.join("bin/snakemake").is_file());

        // Saving an existing key is a no-op
        match second.save {
            SaveStatus::Saved { receipt } => assert!(receipt.reused),
            other => panic!("unexpected save status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn miss_and_disabled_cache_install_the_same_state() {
        let bundles = TempDir::new().unwrap();
        let cache = Arc::new(DirectoryCache::new(bundles.path().to_path_buf()));

        let cached_home = TempDir::new().unwrap();
        let cached_layout = layout(&cached_home);
        let cached_runner = RecordingRunner::new(&cached_layout);
        let cached = Provisioner::new(settings(), cached_layout, cached_runner.clone())
            .with_cache(cache)
            .run()
            .await
            .unwrap();

        let plain_home = TempDir::new().unwrap();
        let plain_layout = layout(&plain_home);
        let plain_runner = RecordingRunner::new(&plain_layout);
        let mut uncached = settings();
        uncached.generation = String::new();
        let plain = Provisioner::new(uncached, plain_layout, plain_runner.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(cached.performed, plain.performed);
        assert_eq!(cached.final_state, plain.final_state);
        assert_eq!(
            cached_runner.install_commands().len(),
            plain_runner.install_commands().len()
        );
        assert_eq!(plain.restore, RestoreStatus::Disabled);
        assert!(fs::read_dir(bundles.path()).unwrap().count() == 1);
    }
}
