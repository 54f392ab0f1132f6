//! Integration tests for swcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use url::Url;

    fn swcache() -> Command {
        cargo_bin_cmd!("swcache")
    }

    /// A file:// origin with a small app, plus config and store paths
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let site = dir.path().join("site");
            fs::create_dir_all(&site).unwrap();
            fs::write(site.join("index.html"), "<h1>slots</h1>").unwrap();
            fs::write(site.join("manifest.json"), r#"{"name":"scheduler"}"#).unwrap();
            fs::write(site.join("app.js"), "console.log(1)").unwrap();

            let fixture = Self { dir };
            fixture.write_config("v1", false);
            fixture
        }

        fn site(&self) -> PathBuf {
            self.dir.path().join("site")
        }

        fn store(&self) -> PathBuf {
            self.dir.path().join("store")
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn write_config(&self, version: &str, fail_on_cache_miss: bool) {
            let scope = Url::from_directory_path(self.site()).unwrap();
            let config = format!(
                r#"
[agent]
app_name = "scheduler"
version = "{version}"
scope = "{scope}"
fail_on_cache_miss = {fail_on_cache_miss}

[manifest]
resources = ["./", "index.html", "manifest.json"]
"#
            );
            fs::write(self.config_path(), config).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = swcache();
            cmd.current_dir(self.dir.path())
                .arg("--no-local")
                .arg("--config")
                .arg(self.config_path())
                .arg("--store")
                .arg(self.store());
            cmd
        }

        fn bucket_names(&self) -> String {
            let output = self
                .cmd()
                .args(["buckets", "--format", "plain"])
                .output()
                .unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap()
        }
    }

    fn remove_site(site: &Path) {
        fs::remove_dir_all(site).unwrap();
    }

    #[test]
    fn help_displays() {
        swcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Offline caching agent"));
    }

    #[test]
    fn version_displays() {
        swcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("swcache"));
    }

    #[test]
    fn config_path_honors_flag() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[agent]"))
            .stdout(predicate::str::contains("scheduler"));
    }

    #[test]
    fn buckets_empty() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("buckets")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache buckets"));
    }

    #[test]
    fn install_populates_bucket() {
        let fixture = Fixture::new();
        fixture
            .cmd()
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cached 3 resources"));

        assert_eq!(fixture.bucket_names().trim(), "scheduler-cache-v1");
    }

    #[test]
    fn install_writes_event_log() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        let log = fs::read_to_string(fixture.store().join("events.log")).unwrap();
        assert!(log.contains("install.started"));
        assert!(log.contains("install.completed"));
    }

    #[test]
    fn fetch_served_from_cache_when_origin_gone() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();
        remove_site(&fixture.site());

        fixture
            .cmd()
            .args(["fetch", "manifest.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"))
            .stdout(predicate::str::contains("200 OK"));
    }

    #[test]
    fn fetch_body_output() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();
        remove_site(&fixture.site());

        fixture
            .cmd()
            .args(["fetch", "index.html", "--output"])
            .assert()
            .success()
            .stdout(predicate::str::diff("<h1>slots</h1>"));
    }

    #[test]
    fn fetch_miss_goes_to_network() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        fixture
            .cmd()
            .args(["fetch", "app.js"])
            .assert()
            .success()
            .stdout(predicate::str::contains("network"));

        // not stored on the way through
        remove_site(&fixture.site());
        fixture
            .cmd()
            .args(["fetch", "app.js"])
            .assert()
            .success()
            .stdout(predicate::str::contains("404"));
    }

    #[test]
    fn fetch_post_passes_through() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        fixture
            .cmd()
            .args(["fetch", "index.html", "-X", "POST", "-d", "slot=3"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pass-through"));
    }

    #[test]
    fn deploy_new_version_clears_old_bucket() {
        let fixture = Fixture::new();
        fixture.cmd().arg("deploy").assert().success();
        assert_eq!(fixture.bucket_names().trim(), "scheduler-cache-v1");

        fixture.write_config("v2", false);
        fixture
            .cmd()
            .arg("deploy")
            .assert()
            .success()
            .stdout(predicate::str::contains("active"));

        assert_eq!(fixture.bucket_names().trim(), "scheduler-cache-v2");
    }

    #[test]
    fn install_then_activate_clears_old_bucket() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        fixture.write_config("v2", false);
        fixture.cmd().arg("install").assert().success();
        assert_eq!(fixture.bucket_names().lines().count(), 2);

        fixture
            .cmd()
            .arg("activate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared old cache scheduler-cache-v1"));
        assert_eq!(fixture.bucket_names().trim(), "scheduler-cache-v2");
    }

    #[test]
    fn activate_without_install_keeps_old_bucket() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        fixture.write_config("v2", false);
        fixture
            .cmd()
            .arg("activate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("scheduler-cache-v2"))
            .stderr(predicate::str::contains("swcache install"));
        assert_eq!(fixture.bucket_names().trim(), "scheduler-cache-v1");
    }

    #[test]
    fn strict_install_fails_on_missing_resource() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.site().join("manifest.json")).unwrap();
        fixture.write_config("v1", true);

        fixture
            .cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Install failed"))
            .stderr(predicate::str::contains("fail_on_cache_miss"));
    }

    #[test]
    fn lenient_install_warns_on_missing_resource() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.site().join("manifest.json")).unwrap();

        fixture
            .cmd()
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("Precache incomplete"));
    }

    #[test]
    fn buckets_json_marks_current() {
        let fixture = Fixture::new();
        fixture.cmd().arg("install").assert().success();

        let output = fixture
            .cmd()
            .args(["buckets", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(rows[0]["name"], "scheduler-cache-v1");
        assert_eq!(rows[0]["entries"], 3);
        assert_eq!(rows[0]["current"], true);
    }

    #[test]
    fn invalid_config_reports_hint() {
        let fixture = Fixture::new();
        fs::write(fixture.config_path(), "[agent]\nversion = \"\"\n").unwrap();

        fixture
            .cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
