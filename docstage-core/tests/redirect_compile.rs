use docstage_core::error::CompilationError;
use docstage_core::redirects::{compile, parse, render, RuleDefinition, RAW_VERSION};

const VERSIONS: &str = "define: versions v1 v2 v3 v4\n";

fn compile_with_versions(rule: &str) -> Result<Vec<RuleDefinition>, CompilationError> {
    compile(&format!("{VERSIONS}{rule}\n"))
}

fn versions_of(rules: &[RuleDefinition]) -> Vec<&str> {
    rules.iter().map(|r| r.version.as_str()).collect()
}

#[test]
fn wildcard_emits_one_rule_per_version_in_order() {
    let rules = compile_with_versions("[*]: /a/${version} -> /b/${version}").unwrap();
    assert_eq!(versions_of(&rules), vec!["v1", "v2", "v3", "v4"]);
    assert_eq!(rules[2].old_url, "/a/v3");
    assert_eq!(rules[2].new_url, "/b/v3");
}

#[test]
fn exclusive_inclusive_range_covers_versions_after_the_lower_bound() {
    for (a, b) in [(0usize, 1usize), (0, 3), (1, 3), (2, 3)] {
        let va = format!("v{}", a + 1);
        let vb = format!("v{}", b + 1);
        let rules = compile_with_versions(&format!("({va}-{vb}]: /x -> /y")).unwrap();
        assert_eq!(rules.len(), b - a, "({va}-{vb}]");
        let expected: Vec<String> = (a + 1..=b).map(|i| format!("v{}", i + 1)).collect();
        assert_eq!(versions_of(&rules), expected);
    }
}

#[test]
fn inclusive_range_scenario() {
    let rules = compile("define: versions v1 v2 v3\n[v1-v3]: /${version}/a -> /${version}/b\n").unwrap();
    let rendered: Vec<String> = rules.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "Redirect 301 /v1/a /v1/b",
            "Redirect 301 /v2/a /v2/b",
            "Redirect 301 /v3/a /v3/b",
        ]
    );
}

#[test]
fn single_version_emits_one_rule() {
    let rules = compile_with_versions("[v2]: /foo -> /bar").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].version, "v2");
    assert!(!rules[0].is_temporary);
}

#[test]
fn half_open_ranges() {
    assert_eq!(
        versions_of(&compile_with_versions("(v2-*]: /a -> /b").unwrap()),
        vec!["v3", "v4"]
    );
    assert_eq!(
        versions_of(&compile_with_versions("[*-v2]: /a -> /b").unwrap()),
        vec!["v1", "v2"]
    );
    assert_eq!(
        versions_of(&compile_with_versions("[*-v3): /a -> /b").unwrap()),
        vec!["v1", "v2"]
    );
    assert_eq!(
        versions_of(&compile_with_versions("[v3-*]: /a -> /b").unwrap()),
        vec!["v3", "v4"]
    );
    // The exclusive lower bound tolerates either closing bracket
    assert_eq!(
        versions_of(&compile_with_versions("(v3-*): /a -> /b").unwrap()),
        vec!["v4"]
    );
}

#[test]
fn adjacent_exclusive_range_is_an_error() {
    let err = compile_with_versions("(v2-v3): /a -> /b").unwrap_err();
    assert_eq!(err, CompilationError::EmptyRange { line: 2 });
}

#[test]
fn equal_bounds_exclusive_range_is_an_error() {
    let err = compile_with_versions("(v2-v2): /a -> /b").unwrap_err();
    assert_eq!(err, CompilationError::EmptyRange { line: 2 });
}

#[test]
fn exclusive_wildcard_lower_bound_is_an_error() {
    let err = compile_with_versions("(*-v3]: /a -> /b").unwrap_err();
    assert_eq!(err, CompilationError::ExclusiveWildcard { line: 2 });
}

#[test]
fn full_wildcard_range_is_an_error() {
    let err = compile_with_versions("[*-*]: /a -> /b").unwrap_err();
    assert_eq!(err, CompilationError::WildcardRange { line: 2 });
}

#[test]
fn inclusive_open_range_with_exclusive_close_is_an_error() {
    let err = compile_with_versions("[v2-*): /a -> /b").unwrap_err();
    assert_eq!(err, CompilationError::OpenWildcardRange { line: 2 });
}

#[test]
fn unknown_version_is_an_error() {
    let err = compile_with_versions("[v9]: /a -> /b").unwrap_err();
    assert_eq!(
        err,
        CompilationError::UnknownVersion {
            line: 2,
            version: "v9".to_string()
        }
    );
}

#[test]
fn range_before_versions_is_an_error() {
    let err = compile("[*]: /a -> /b\n").unwrap_err();
    assert_eq!(err, CompilationError::MissingVersions { line: 1 });
}

#[test]
fn unresolved_variable_is_an_error() {
    let err = compile_with_versions("[v1]: /${missing}/a -> /b").unwrap_err();
    assert_eq!(
        err,
        CompilationError::UnresolvedVariable {
            line: 2,
            name: "missing".to_string()
        }
    );
}

#[test]
fn malformed_line_is_an_error() {
    let err = compile_with_versions("[v1] /a -> /b").unwrap_err();
    assert!(matches!(err, CompilationError::Syntax { line: 2, .. }));
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let rules = compile("# header\n\ndefine: versions v1\n  # indented comment\n[v1]: /a -> /b\n").unwrap();
    assert_eq!(rules.len(), 1);
}

#[test]
fn temporary_rules_render_as_302() {
    let rules = compile_with_versions("temporary [v4]: /moved -> /new-location").unwrap();
    assert!(rules[0].is_temporary);
    assert_eq!(rules[0].to_string(), "Redirect 302 /moved /new-location");
}

#[test]
fn raw_rule_substitutes_version_from_new_url() {
    let rules = compile("raw: /old/${version}/path -> /v5.0/manual/path\n").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].version, RAW_VERSION);
    assert_eq!(rules[0].old_url, "/old/v5.0/path");
    assert_eq!(rules[0].new_url, "/v5.0/manual/path");

    // Only the segment right after the leading slash counts
    let rules = compile("raw: /old/${version} -> /new/v5.0/path\n").unwrap();
    assert_eq!(rules[0].old_url, "/old/new");
}

#[test]
fn definitions_may_carry_the_version_placeholder() {
    let rules = compile(
        "define: versions v1 v2\n\
         define: path manual/${version}\n\
         [v2]: /${path}/a -> /${path}/b\n",
    )
    .unwrap();
    assert_eq!(rules[0].to_string(), "Redirect 301 /manual/v2/a /manual/v2/b");
}

#[test]
fn definitions_defined_in_terms_of_later_ones_are_expanded() {
    let rules = compile(
        "define: versions v1\n\
         define: outer ${inner}/x\n\
         define: inner docs\n\
         [v1]: /${outer} -> /y\n",
    )
    .unwrap();
    assert_eq!(rules[0].old_url, "/docs/x");
}

#[test]
fn unknown_names_inside_definitions_are_errors() {
    let err = compile("define: versions v1\ndefine: a ${nope}\n[v1]: /x/${a} -> /y\n").unwrap_err();
    assert_eq!(
        err,
        CompilationError::UnresolvedVariable {
            line: 3,
            name: "nope".to_string()
        }
    );
}

#[test]
fn self_referencing_definitions_are_errors() {
    let err = compile("define: versions v1\ndefine: a ${a}/more\n[v1]: /${a} -> /y\n").unwrap_err();
    assert!(matches!(err, CompilationError::UnresolvedVariable { line: 3, .. }));
}

#[test]
fn symlink_aliases_are_emitted_before_the_primary_rule() {
    let source = "define: versions v4.2 v4.4 v5.0\n\
                  symlink: current -> v5.0\n\
                  symlink: stable -> current\n\
                  [v4.4-v5.0]: /docs/${version}/a -> /docs/${version}/b\n";
    let rules = compile(source).unwrap();
    let summary: Vec<(&str, bool)> = rules
        .iter()
        .map(|r| (r.version.as_str(), r.is_symlink))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("v4.4", false),
            ("stable", true),
            ("current", true),
            ("v5.0", false),
        ]
    );
    assert_eq!(rules[2].old_url, "/docs/current/a");
}

#[test]
fn symlink_cycles_terminate() {
    let source = "define: versions v1\n\
                  symlink: a -> v1\n\
                  symlink: b -> a\n\
                  symlink: a -> b\n\
                  [v1]: /${version} -> /x\n";
    let rules = compile(source).unwrap();
    assert_eq!(versions_of(&rules), vec!["b", "a", "v1"]);
}

#[test]
fn base_and_definitions_are_applied() {
    let source = "define: root docs\n\
                  define: base ${root}/manual\n\
                  define: target reference\n\
                  define: versions v1 v2\n\
                  [v2]: /${version}/old/ -> ${target}/${version}/new\n\
                  [v1]: /${version}/ext -> https://example.com/${version}\n";
    let rules = compile(source).unwrap();
    assert_eq!(rules[0].old_url, "/docs/manual/v2/old");
    assert_eq!(rules[0].new_url, "/reference/v2/new");
    assert_eq!(rules[1].new_url, "https://example.com/v1");
}

#[test]
fn rendered_rules_parse_back_to_the_same_tuples() {
    let source = "define: base docs/manual\n\
                  define: versions v4.2 v4.4 v5.0\n\
                  symlink: current -> v5.0\n\
                  raw: /old/path -> /new/v5.0/path\n\
                  [v4.2]: /foo -> /bar\n\
                  (v4.2-v5.0]: /baz/${version} -> /qux/${version}\n\
                  temporary [*]: /moved -> /new-location\n";
    let rules = compile(source).unwrap();
    let parsed = parse(&render(&rules));

    let compiled: Vec<(String, String, bool)> = rules
        .iter()
        .map(|r| (r.old_url.clone(), r.new_url.clone(), r.is_temporary))
        .collect();
    let reparsed: Vec<(String, String, bool)> = parsed
        .iter()
        .map(|r| (r.from.clone(), r.to.clone(), r.is_temporary()))
        .collect();
    assert_eq!(compiled, reparsed);
}
