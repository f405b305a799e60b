// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.
//!
//! Each command writes its report to `out` so it can be captured in tests.

use anyhow::{bail, Context};
use soundedit_graph::{
    Graph, ManifestRegistry, NodeKind, StackFile, StackKind, StackTranslator,
};
use std::io::Write;
use std::path::Path;

fn load_stacks(path: &Path) -> anyhow::Result<StackFile> {
    StackFile::load(path).with_context(|| format!("Failed to load stacks from {}", path.display()))
}

/// Print every stack with its node and import counts
pub fn list(path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let file = load_stacks(path)?;
    for kind in StackKind::ALL {
        writeln!(out, "{}:", kind.section_key())?;
        for (name, stack) in file.group(kind).iter() {
            let imports: Vec<_> = stack.imports().collect();
            if imports.is_empty() {
                writeln!(out, "  {name} ({} nodes)", stack.node_count())?;
            } else {
                writeln!(
                    out,
                    "  {name} ({} nodes, imports {})",
                    stack.node_count(),
                    imports.join(", ")
                )?;
            }
        }
    }
    Ok(())
}

/// Print the operator types of the active manifest
pub fn types(
    registry: &ManifestRegistry,
    category: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let manifest = registry.active();
    let specs: Vec<_> = match category {
        Some(category) => {
            if !manifest.categories().contains(category) {
                bail!("Unknown category '{category}'");
            }
            manifest.types_in_category(category).collect()
        }
        None => manifest.type_specs().collect(),
    };

    for (name, spec) in specs {
        let category = spec.category.as_deref().unwrap_or("-");
        writeln!(out, "{name:<32} {category:<12} {}", spec.label)?;
    }
    Ok(())
}

/// Build one stack and print its graph
pub fn show(
    registry: &ManifestRegistry,
    path: &Path,
    stack: &str,
    kind: StackKind,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let file = load_stacks(path)?;
    let graph = StackTranslator::new(registry)
        .build_graph(stack, file.group(kind))
        .with_context(|| format!("Failed to build '{stack}' in {}", kind.section_key()))?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&graph)?)?;
    } else {
        print_graph(&graph, kind, out)?;
    }
    Ok(())
}

fn print_graph(graph: &Graph, kind: StackKind, out: &mut impl Write) -> anyhow::Result<()> {
    writeln!(
        out,
        "{} ({}): {} nodes, {} connections",
        graph.name,
        kind.section_key(),
        graph.node_count(),
        graph.connection_count()
    )?;

    // Cyclic stacks still build; list those in insertion order
    let order = graph
        .topological_order()
        .unwrap_or_else(|_| graph.node_ids().collect());
    for node_id in order {
        let Some(node) = graph.node(node_id) else {
            continue;
        };
        match node.kind() {
            NodeKind::Constant { value_type, value } => {
                writeln!(out, "  {:<28} = {value} ({value_type})", node.name())?;
            }
            NodeKind::Operator { operator } => {
                let settings: Vec<_> = node
                    .key_values()
                    .filter(|(_, kv)| kv.is_explicit())
                    .map(|(key, kv)| format!("{key}={}", kv.as_str()))
                    .collect();
                writeln!(out, "  {:<28} {operator} {}", node.name(), settings.join(" "))?;
            }
        }
    }

    for connection in graph.connections() {
        let name = |id| graph.node(id).map_or("?", |n| n.name());
        writeln!(
            out,
            "  {}.{} -> {}.{}",
            name(connection.from_node),
            connection.from_port,
            name(connection.to_node),
            connection.to_port
        )?;
    }
    Ok(())
}

/// Literal inputs that do not parse as their port's value type
fn literal_warnings(graph: &Graph) -> Vec<String> {
    let mut warnings = Vec::new();
    for connection in graph.connections() {
        let (Some(source), Some(target)) = (graph.node(connection.from_node), graph.node(connection.to_node))
        else {
            continue;
        };
        let NodeKind::Constant { value_type, value } = source.kind() else {
            continue;
        };
        let input = format!("{}.{}", target.name(), connection.to_port);
        if let Err(e) = value_type.validate_literal(&input, value) {
            warnings.push(e.to_string());
        }
    }
    warnings
}

/// Build every stack; fails if any stack fails.
///
/// Stacks that build but carry malformed literals are reported as warnings.
pub fn check(registry: &ManifestRegistry, path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let file = load_stacks(path)?;
    let reports = StackTranslator::new(registry).build_file(&file);

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(graph) => {
                writeln!(
                    out,
                    "ok     {}/{} ({} nodes)",
                    report.kind.section_key(),
                    report.name,
                    graph.node_count()
                )?;
                for warning in literal_warnings(graph) {
                    writeln!(out, "warn   {}/{}: {warning}", report.kind.section_key(), report.name)?;
                }
            }
            Err(e) => {
                failed += 1;
                writeln!(out, "FAILED {}/{}: {e}", report.kind.section_key(), report.name)?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} stacks failed", reports.len());
    }
    Ok(())
}

/// Rewrite a stack file with every stack's imports flattened
pub fn flatten(registry: &ManifestRegistry, path: &Path, output: &Path) -> anyhow::Result<()> {
    let file = load_stacks(path)?;
    let translator = StackTranslator::new(registry);

    let mut flattened = StackFile::default();
    for report in translator.build_file(&file) {
        let graph = report.result.with_context(|| {
            format!("Failed to build '{}' in {}", report.name, report.kind.section_key())
        })?;
        flattened
            .group_mut(report.kind)
            .insert(report.name, translator.to_document(&graph));
    }

    let text = soundedit_keyvalues::to_string_pretty(&flattened.to_keyvalues());
    std::fs::write(output, text).with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!("Wrote flattened stacks to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundedit_graph::Manifest;

    const MANIFEST: &str = r#"{
        "sos_op_math_float": {
            "category": "math",
            "inputs": [{ "name": "input1", "type": "float" }],
            "outputs": [{ "name": "output", "type": "float" }],
            "keyvalues": [{ "name": "apply", "type": "enum", "choices": ["add", "mult"] }]
        },
        "sos_op_output": {
            "category": "output",
            "inputs": [{ "name": "input_float", "type": "float" }]
        }
    }"#;

    const STACKS: &str = r#"
        "start_stacks"
        {
            "shared" { "gain" { "operator" "sos_op_math_float" "input1" "0.5" "apply" "mult" } }
            "main"
            {
                "import_stack" "shared"
                "out" { "operator" "sos_op_output" "input_float" "@gain.output" }
            }
        }
        "update_stacks"
        {
            "broken" { "out" { "operator" "sos_op_output" "input_float" "@ghost.output" } }
        }
    "#;

    fn registry() -> ManifestRegistry {
        ManifestRegistry::new("test", Manifest::from_json_str(MANIFEST).unwrap())
    }

    fn stacks_file(dir: &tempfile::TempDir, text: &str) -> std::path::PathBuf {
        let path = dir.path().join("stacks.txt");
        std::fs::write(&path, text).unwrap();
        path
    }

    fn run(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> (anyhow::Result<()>, String) {
        let mut out = Vec::new();
        let result = f(&mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = stacks_file(&dir, STACKS);
        let (result, text) = run(|out| list(&path, out));
        result.unwrap();
        assert!(text.contains("  main (1 nodes, imports shared)"));
        assert!(text.contains("update_stacks:\n  broken (1 nodes)"));
    }

    #[test]
    fn test_types_by_category() {
        let registry = registry();
        let (result, text) = run(|out| types(&registry, Some("output"), out));
        result.unwrap();
        assert!(text.contains("sos_op_output"));
        assert!(!text.contains("sos_op_math_float"));

        let (result, _) = run(|out| types(&registry, Some("nope"), out));
        assert!(result.is_err());
    }

    #[test]
    fn test_show() {
        let dir = tempfile::tempdir().unwrap();
        let path = stacks_file(&dir, STACKS);
        let registry = registry();
        let (result, text) = run(|out| show(&registry, &path, "main", StackKind::Start, false, out));
        result.unwrap();
        assert!(text.starts_with("main (start_stacks): 3 nodes, 2 connections"));
        assert!(text.contains("apply=mult"));
        assert!(text.contains("gain.output -> out.input_float"));

        let (result, text) = run(|out| show(&registry, &path, "main", StackKind::Start, true, out));
        result.unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["name"], "main");
    }

    #[test]
    fn test_check_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = stacks_file(&dir, STACKS);
        let registry = registry();
        let (result, text) = run(|out| check(&registry, &path, out));
        assert!(result.is_err());
        assert!(text.contains("ok     start_stacks/main"));
        assert!(text.contains("FAILED update_stacks/broken"));
    }

    #[test]
    fn test_show_cyclic_stack() {
        let dir = tempfile::tempdir().unwrap();
        let path = stacks_file(
            &dir,
            r#"start_stacks { loop {
                a { operator sos_op_math_float input1 "@b.output" }
                b { operator sos_op_math_float input1 "@a.output" }
            } }"#,
        );
        let registry = registry();
        let (result, text) = run(|out| show(&registry, &path, "loop", StackKind::Start, false, out));
        result.unwrap();
        assert!(text.starts_with("loop (start_stacks): 2 nodes, 2 connections"));
        assert!(text.contains("a.output -> b.input1"));
        assert!(text.contains("b.output -> a.input1"));
    }

    #[test]
    fn test_check_warns_on_bad_literals() {
        let dir = tempfile::tempdir().unwrap();
        let path = stacks_file(
            &dir,
            r#"start_stacks { s { gain { operator sos_op_math_float input1 "loud" } } }"#,
        );
        let registry = registry();
        let (result, text) = run(|out| check(&registry, &path, out));
        result.unwrap();
        assert!(text.contains("ok     start_stacks/s (2 nodes)"));
        assert!(text.contains("warn   start_stacks/s: 'loud' is not a valid float for 'gain.input1'"));
    }

    #[test]
    fn test_flatten() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let path = stacks_file(&dir, STACKS);
        let output = dir.path().join("flat.txt");
        assert!(flatten(&registry, &path, &output).is_err());

        let valid = STACKS.replace("@ghost.output", "1");
        let path = stacks_file(&dir, &valid);
        flatten(&registry, &path, &output).unwrap();

        let flat = StackFile::load(&output).unwrap();
        let main = flat.start_stacks.get("main").unwrap();
        assert_eq!(main.imports().count(), 0);
        assert_eq!(main.node("gain").unwrap().get("apply"), Some("mult"));
        assert_eq!(main.node("out").unwrap().get("input_float"), Some("@gain.output"));
    }
}
