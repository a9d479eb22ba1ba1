use std::fs;

use burrow::{
    config::Config,
    loader::{GoLoader, ModuleLoader},
    resolver::{GoPathGuard, ModuleResolver},
};
use serial_test::serial;
use tempfile::TempDir;

fn write_package(root: &std::path::Path, import_path: &str, file: &str, source: &str) {
    let dir = root.join(import_path);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), source).unwrap();
}

#[test]
#[serial]
fn test_gopath_package_discovery() {
    let temp_dir = TempDir::new().unwrap();
    let gopath = temp_dir.path().join("gopath");
    write_package(
        &gopath.join("src"),
        "github.com/acme/kit",
        "kit.go",
        "package kit\n\nconst Version = \"1\"\n",
    );

    let _guard = GoPathGuard::new(&gopath.to_string_lossy());
    let mut resolver = ModuleResolver::new(Config::default()).unwrap();

    let dir = resolver
        .resolve_package_dir("github.com/acme/kit")
        .expect("should resolve packages from GOPATH");
    assert_eq!(dir, gopath.join("src/github.com/acme/kit").canonicalize().unwrap());
    assert_eq!(resolver.package_name("github.com/acme/kit"), "kit");
}

#[test]
#[serial]
fn test_multiple_gopath_entries_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("first");
    let second = temp_dir.path().join("second");
    write_package(&second.join("src"), "github.com/acme/only_second", "a.go", "package only\n");
    write_package(&first.join("src"), "github.com/acme/both", "a.go", "package first\n");
    write_package(&second.join("src"), "github.com/acme/both", "a.go", "package second\n");

    let joined = std::env::join_paths([&first, &second]).unwrap();
    let _guard = GoPathGuard::new(&joined.to_string_lossy());
    let mut resolver = ModuleResolver::new(Config::default()).unwrap();

    assert_eq!(resolver.package_name("github.com/acme/both"), "first");
    assert_eq!(resolver.package_name("github.com/acme/only_second"), "only");
}

#[test]
#[serial]
fn test_src_dirs_searched_before_gopath() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src_dir");
    let gopath = temp_dir.path().join("gopath");
    write_package(&src, "github.com/acme/shadowed", "a.go", "package fromsrc\n");
    write_package(&gopath.join("src"), "github.com/acme/shadowed", "a.go", "package fromgopath\n");

    let _guard = GoPathGuard::new(&gopath.to_string_lossy());
    let config = Config {
        src: vec![src.clone()],
        ..Config::default()
    };
    let mut resolver = ModuleResolver::new(config).unwrap();
    assert_eq!(resolver.package_name("github.com/acme/shadowed"), "fromsrc");
}

#[test]
#[serial]
fn test_override_beats_environment() {
    let temp_dir = TempDir::new().unwrap();
    let env_gopath = temp_dir.path().join("env");
    let override_gopath = temp_dir.path().join("override");
    write_package(&env_gopath.join("src"), "github.com/acme/pkg", "a.go", "package fromenv\n");
    write_package(
        &override_gopath.join("src"),
        "github.com/acme/pkg",
        "a.go",
        "package fromoverride\n",
    );

    let _guard = GoPathGuard::new(&env_gopath.to_string_lossy());
    let override_str = override_gopath.to_string_lossy();
    let mut resolver =
        ModuleResolver::new_with_gopath(Config::default(), Some(&override_str)).unwrap();
    assert_eq!(resolver.package_name("github.com/acme/pkg"), "fromoverride");
}

#[test]
#[serial]
fn test_guard_restores_previous_value() {
    let before = std::env::var("GOPATH").ok();
    {
        let _guard = GoPathGuard::new("/tmp/burrow-guard-test");
        assert_eq!(std::env::var("GOPATH").unwrap(), "/tmp/burrow-guard-test");
        {
            let _inner = GoPathGuard::unset();
            assert!(std::env::var("GOPATH").is_err());
        }
        assert_eq!(std::env::var("GOPATH").unwrap(), "/tmp/burrow-guard-test");
    }
    assert_eq!(std::env::var("GOPATH").ok(), before);
}

#[test]
#[serial]
fn test_loader_reports_searched_locations() {
    let temp_dir = TempDir::new().unwrap();
    let gopath = temp_dir.path().join("empty_gopath");
    fs::create_dir_all(&gopath).unwrap();
    let _guard = GoPathGuard::new(&gopath.to_string_lossy());

    let mut loader = GoLoader::new(ModuleResolver::new(Config::default()).unwrap());
    let err = loader.load("github.com/acme/absent").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("github.com/acme/absent"), "{message}");
    assert!(message.contains("empty_gopath"), "{message}");
}
