use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use burrow::{
    BundleError,
    classifier::{Classification, classify},
    config::{Config, FormatterChoice},
    loader::{GoLoader, ModuleLoader},
    orchestrator::BundleOrchestrator,
    resolver::ModuleResolver,
};
use indexmap::IndexSet;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A Go module `acme.io/shop` laid out in a temp dir
struct Project {
    temp_dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            temp_dir: TempDir::new().unwrap(),
        };
        project.write("go.mod", "module acme.io/shop\n\ngo 1.22\n");
        project
    }

    fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn write(&self, relative: &str, source: &str) -> &Self {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, source).unwrap();
        self
    }

    fn config(&self) -> Config {
        Config {
            root_modules: IndexSet::from(["acme.io/shop".to_owned()]),
            module_root: Some(self.root().to_path_buf()),
            destination_root: self.root().join("build"),
            formatter: FormatterChoice::Builtin,
            goos: "linux".to_owned(),
            goarch: "amd64".to_owned(),
            ..Config::default()
        }
    }

    fn orchestrator(&self) -> BundleOrchestrator {
        BundleOrchestrator::new(self.config())
    }

    fn bundle(&self, root: &str) -> String {
        self.orchestrator().bundle(root).unwrap().source
    }
}

fn widget_project() -> Project {
    let project = Project::new();
    project
        .write(
            "cmd/plugin/main.go",
            r#"package main

import (
	"fmt"

	"acme.io/shop/a"
)

// main prints a widget.
func main() {
	w := a.NewWidget("knob")
	var other a.Widget = *w
	fmt.Println(w.Name, other)
}
"#,
        )
        .write(
            "a/widget.go",
            r#"package a

// Widget is a thing on the shelf.
type Widget struct {
	Name string
}

// NewWidget builds a Widget.
func NewWidget(name string) *Widget {
	return &Widget{Name: name}
}
"#,
        );
    project
}

#[test]
fn test_inlined_dependency_is_renamed_and_unqualified() {
    let project = widget_project();
    let output = project.bundle("acme.io/shop/cmd/plugin");
    assert_eq!(
        output,
        r#"package main

import (
	"fmt"
)

// Widget is a thing on the shelf.
type a_Widget struct {
	Name string
}

// NewWidget builds a Widget.
func a_NewWidget(name string) *a_Widget {
	return &a_Widget{Name: name}
}

// main prints a widget.
func main() {
	w := a_NewWidget("knob")
	var other a_Widget = *w
	fmt.Println(w.Name, other)
}
"#
    );
}

#[test]
fn test_same_name_in_two_packages() {
    let project = Project::new();
    project
        .write(
            "app/app.go",
            "package app\n\nimport (\n\t\"acme.io/shop/a\"\n\t\"acme.io/shop/b\"\n)\n\nvar Both = []any{a.Config{}, b.Config{}}\n",
        )
        .write("a/a.go", "package a\n\ntype Config struct{ Retries int }\n")
        .write("b/b.go", "package b\n\ntype Config struct{ Verbose bool }\n");

    let output = project.bundle("acme.io/shop/app");
    assert!(output.contains("type a_Config struct{ Retries int }"), "{output}");
    assert!(output.contains("type b_Config struct{ Verbose bool }"), "{output}");
    assert!(output.contains("var Both = []any{a_Config{}, b_Config{}}"), "{output}");
    assert!(!output.contains("import"), "{output}");
}

#[test]
fn test_package_without_inlinable_imports() {
    let project = Project::new();
    project.write(
        "leaf/leaf.go",
        r#"// Package leaf has no internal imports.
package leaf

import (
	"strings" // for Upper
)

// Upper shouts.
func Upper(s string) string { return strings.ToUpper(s) } // loud

// closing remark
"#,
    );
    let output = project.bundle("acme.io/shop/leaf");
    assert_eq!(
        output,
        r#"package main

import (
	"strings"
)

// Upper shouts.
func Upper(s string) string { return strings.ToUpper(s) } // loud

// closing remark
"#
    );
}

#[test]
fn test_selection_on_foreign_type_keeps_its_name() {
    let project = Project::new();
    project
        .write(
            "geo/geo.go",
            "package geo\n\nimport \"bufio\"\n\ntype Reader struct{}\n\ntype Buffered struct{ Reader }\n\nfunc Wrap(rw *bufio.ReadWriter) *bufio.Reader { return rw.Reader }\n\nfunc Unwrap(b Buffered) Reader { return b.Reader }\n",
        )
        .write(
            "app/app.go",
            "package app\n\nimport \"acme.io/shop/geo\"\n\nvar W, U = geo.Wrap, geo.Unwrap\n",
        );
    let output = project.bundle("acme.io/shop/app");
    assert!(
        output.contains("func geo_Wrap(rw *bufio.ReadWriter) *bufio.Reader { return rw.Reader }"),
        "{output}"
    );
    assert!(output.contains("type geo_Buffered struct{ geo_Reader }"), "{output}");
    assert!(
        output.contains("func geo_Unwrap(b geo_Buffered) geo_Reader { return b.geo_Reader }"),
        "{output}"
    );
}

#[test]
fn test_trailing_comment_is_emitted_once() {
    let project = Project::new();
    project.write(
        "consts/consts.go",
        "package consts\n\nconst A = 1 // one\n// B is two.\nconst B = 2\n",
    );
    let output = project.bundle("acme.io/shop/consts");
    assert_eq!(
        output,
        "package main\n\nconst A = 1 // one\n\n// B is two.\nconst B = 2\n"
    );
}

#[test]
fn test_output_is_deterministic() {
    let project = widget_project();
    project
        .write("b/b.go", "package b\n\nimport \"acme.io/shop/a\"\n\nvar Default = a.NewWidget(\"b\")\n")
        .write(
            "cmd/multi/main.go",
            "package main\n\nimport (\n\t\"acme.io/shop/b\"\n\t\"acme.io/shop/a\"\n\t\"os\"\n)\n\nfunc main() { _, _ = a.NewWidget(os.Args[0]), b.Default }\n",
        );
    let first = project.bundle("acme.io/shop/cmd/multi");
    let second = project.bundle("acme.io/shop/cmd/multi");
    assert_eq!(first, second);
    // fan-in: a is emitted once
    assert_eq!(first.matches("func a_NewWidget(").count(), 1);
    assert!(!first.contains("a.NewWidget"));
}

#[test]
fn test_imports_partition_the_import_graph() {
    let project = widget_project();
    project
        .write(
            "a/extra.go",
            "package a\n\nimport (\n\t\"sort\"\n\n\t\"acme.io/shop/c\"\n)\n\nvar Sorted = sort.IsSorted\n\nvar Level = c.Level\n",
        )
        .write("c/c.go", "package c\n\nimport \"strconv\"\n\nvar Level = strconv.Itoa(3)\n");

    let root = "acme.io/shop/cmd/plugin";
    let bundle = project.orchestrator().bundle(root).unwrap();

    // transitive import closure through inline-eligible packages
    let config = project.config();
    let mut loader = GoLoader::new(ModuleResolver::new(config.clone()).unwrap());
    let mut closure = BTreeSet::new();
    let mut pending = vec![root.to_owned()];
    while let Some(path) = pending.pop() {
        for import in loader.load(&path).unwrap().imports {
            if closure.insert(import.clone()) && classify(&import, &config) == Classification::Inline {
                pending.push(import);
            }
        }
    }

    let kept: BTreeSet<String> = bundle
        .walk
        .imports
        .paths()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let inlined: BTreeSet<String> = bundle.inlined_paths().map(str::to_owned).collect();
    assert!(kept.is_disjoint(&inlined));
    assert_eq!(kept.union(&inlined).cloned().collect::<BTreeSet<_>>(), closure);
    assert_eq!(
        inlined,
        BTreeSet::from(["acme.io/shop/a".to_owned(), "acme.io/shop/c".to_owned()])
    );
}

#[test]
fn test_vendored_packages_are_inlined() {
    let project = Project::new();
    project
        .write(
            "svc/svc.go",
            "package svc\n\nimport \"github.com/third/party/retry\"\n\nvar Policy = retry.Default()\n",
        )
        .write(
            "vendor/github.com/third/party/retry/retry.go",
            "package retry\n\nfunc Default() int { return attempts }\n\nconst attempts = 3\n",
        );
    let output = project.bundle("acme.io/shop/svc");
    assert!(output.contains("func retry_Default() int { return retry_attempts }"), "{output}");
    assert!(output.contains("const retry_attempts = 3"), "{output}");
    assert!(output.contains("var Policy = retry_Default()"), "{output}");
}

#[test]
fn test_build_constraints_select_files() {
    let project = Project::new();
    project
        .write("os/app.go", "package osapp\n\nvar Name = platform()\n")
        .write("os/platform_linux.go", "package osapp\n\nfunc platform() string { return \"linux\" }\n")
        .write("os/platform_windows.go", "package osapp\n\nfunc platform() string { return \"windows\" }\n")
        .write(
            "os/debug.go",
            "//go:build debug\n\npackage osapp\n\nfunc platform() string { return \"debug\" }\n",
        )
        .write("os/app_test.go", "package osapp\n\nfunc broken( {\n");
    let output = project.bundle("acme.io/shop/os");
    assert!(output.contains("return \"linux\""), "{output}");
    assert!(!output.contains("windows"), "{output}");
    assert!(!output.contains("debug"), "{output}");
}

#[test]
fn test_import_cycle_is_fatal() {
    let project = Project::new();
    project
        .write("x/x.go", "package x\n\nimport \"acme.io/shop/y\"\n\nvar X = y.Y\n")
        .write("y/y.go", "package y\n\nimport \"acme.io/shop/x\"\n\nvar Y = x.X\n")
        .write("app/app.go", "package app\n\nimport \"acme.io/shop/x\"\n\nvar A = x.X\n");
    let err = project.orchestrator().bundle("acme.io/shop/app").unwrap_err();
    match err.downcast_ref::<BundleError>() {
        Some(BundleError::ImportCycle { chain }) => assert_eq!(
            chain,
            &vec![
                "acme.io/shop/x".to_owned(),
                "acme.io/shop/y".to_owned(),
                "acme.io/shop/x".to_owned(),
            ]
        ),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_package_writes_nothing() {
    let project = Project::new();
    project.write(
        "app/app.go",
        "package app\n\nimport \"acme.io/shop/gone\"\n\nvar A = gone.A\n",
    );
    let orchestrator = project.orchestrator();
    let err = orchestrator.run("acme.io/shop/app", "billing").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BundleError>(),
        Some(BundleError::ModuleResolution { path, .. }) if path == "acme.io/shop/gone"
    ));
    assert!(!orchestrator.output_path("billing").exists());
}

#[test]
fn test_parse_error_names_file() {
    let project = Project::new();
    project.write("bad/bad.go", "package bad\n\nfunc (\n");
    let err = project.orchestrator().bundle("acme.io/shop/bad").unwrap_err();
    match err.downcast_ref::<BundleError>() {
        Some(BundleError::Parse { file, line, .. }) => {
            assert!(file.ends_with("bad/bad.go"));
            assert!(*line >= 3, "line {line}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_run_writes_output_file() {
    let project = widget_project();
    let report = project
        .orchestrator()
        .run("acme.io/shop/cmd/plugin", "widgets")
        .unwrap();
    let expected: PathBuf = project.root().join("build/widgets/plugin.go");
    assert_eq!(report.output_path, expected);
    assert_eq!(report.inlined, 1);
    assert_eq!(report.kept_imports, 1);
    let written = fs::read_to_string(&expected).unwrap();
    assert_eq!(written.len(), report.bytes);
    assert!(written.starts_with("package main\n"));
}
