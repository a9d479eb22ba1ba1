//! Final text of the bundle: package clause, import block, declarations

use log::debug;

use crate::{
    error::BundleResult,
    formatter::SourceFormatter,
    walker::{ImportSet, WalkOutput},
};

/// Unformatted bundle text
pub fn assemble(package_name: &str, imports: &ImportSet, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 64 * imports.len() + 32);
    out.push_str(&format!("package {package_name}\n\n"));
    if !imports.is_empty() {
        out.push_str("import (\n");
        for (name, path) in imports.specs() {
            let spec = match name {
                Some(name) => format!("\t{name} \"{path}\"\n"),
                None => format!("\t\"{path}\"\n"),
            };
            out.push_str(&spec);
        }
        out.push_str(")\n\n");
    }
    out.push_str(body);
    out
}

/// Assemble the walk output and run it through `formatter`
///
/// A rejection is returned as-is; its error carries the unformatted text.
pub fn assemble_formatted(
    package_name: &str,
    output: &WalkOutput,
    formatter: &dyn SourceFormatter,
) -> BundleResult<String> {
    let text = assemble(package_name, &output.imports, &output.body);
    debug!(
        "Formatting {} bytes with the {} formatter",
        text.len(),
        formatter.name()
    );
    formatter.format(&text)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{error::BundleError, formatter::BuiltinFormatter};

    #[test]
    fn test_header_and_sorted_imports() {
        let mut imports = ImportSet::default();
        imports.insert("strings", [None]);
        imports.insert("fmt", [None, Some("f".to_owned())]);
        let text = assemble("plugin", &imports, "var x = 1\n\n");
        assert_eq!(
            text,
            "package plugin\n\nimport (\n\t\"fmt\"\n\tf \"fmt\"\n\t\"strings\"\n)\n\nvar x = 1\n\n"
        );
    }

    #[test]
    fn test_no_imports_no_block() {
        assert_eq!(
            assemble("main", &ImportSet::default(), "func main() {}\n"),
            "package main\n\nfunc main() {}\n"
        );
    }

    #[test]
    fn test_formatter_rejection_keeps_text() {
        let output = WalkOutput {
            root: "acme.io/app".to_owned(),
            imports: ImportSet::default(),
            inlined: Vec::new(),
            body: "func broken( {\n".to_owned(),
        };
        let err = assemble_formatted("main", &output, &BuiltinFormatter).expect_err("rejected");
        match &err {
            BundleError::Format { text, .. } => assert!(text.contains("func broken(")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
