use camino::Utf8Path;
use expect_test::expect;
use salix_tree::Tree;

use crate::{DiffParser, ParserCache, parse, split_lines};

fn lines(text: &str) -> Vec<String> {
    split_lines(text, true).iter().map(|line| (*line).to_string()).collect()
}

/// Updates a freshly parsed `old` to `new`, returning the tree and the
/// number of copy and parse steps the update took.
fn update(old: &str, new: &str) -> (Tree, usize, usize) {
    let old_tree = parse(old);
    assert_eq!(old_tree.text(), old);
    let mut diff = DiffParser::new(&old_tree);
    let tree = diff.update(&lines(old), &lines(new)).expect("update succeeds");
    (tree, diff.copy_count, diff.parse_count)
}

/// The updated tree must serialize to the new text and be structurally
/// identical to a parse from scratch, patched positions included.
fn assert_matches_full_parse(tree: &Tree, text: &str) {
    assert_eq!(tree.text(), text);
    let full = parse(text);
    assert_eq!(tree.dump(tree.root()), full.dump(full.root()));
}

#[test]
fn parse_builds_the_expected_tree() {
    let tree = parse("def f():\n    return 1\n");
    expect![[r#"
        MODULE
          FUNCDEF
            NAME@1:0 "def" prefix ""
            NAME@1:4 "f" prefix " "
            OP@1:5 "(" prefix ""
            OP@1:6 ")" prefix ""
            OP@1:7 ":" prefix ""
            SUITE
              NEWLINE@1:8 "\n" prefix ""
              SIMPLE_STMT
                NAME@2:4 "return" prefix "    "
                NUMBER@2:11 "1" prefix " "
                NEWLINE@2:12 "\n" prefix ""
          ENDMARKER@3:0 "" prefix ""
    "#]]
    .assert_eq(&tree.dump(tree.root()));
}

#[test]
fn parse_round_trips_broken_sources() {
    for text in [
        "",
        "\n",
        "if x\n  pass\n",
        "else:\n    pass\n",
        "foo(\n",
        "def f():\n",
        "x = 1\n        y = 2\n",
        "if x:\n  a\n   b\n",
    ] {
        let tree = parse(text);
        assert_eq!(tree.text(), text, "{text:?}");
    }
}

#[test]
fn appended_body_line_reuses_the_function_header() {
    let old = "def f():\n    pass\n";
    let new = "def f():\n    pass\n    return 1\n";
    let (tree, copies, parses) = update(old, new);
    assert_matches_full_parse(&tree, new);
    // The header and the old body are copied once; only the new line is
    // parsed.
    assert_eq!((copies, parses), (1, 1));
    expect![[r#"
        MODULE
          FUNCDEF
            NAME@1:0 "def" prefix ""
            NAME@1:4 "f" prefix " "
            OP@1:5 "(" prefix ""
            OP@1:6 ")" prefix ""
            OP@1:7 ":" prefix ""
            SUITE
              NEWLINE@1:8 "\n" prefix ""
              SIMPLE_STMT
                NAME@2:4 "pass" prefix "    "
                NEWLINE@2:8 "\n" prefix ""
              SIMPLE_STMT
                NAME@3:4 "return" prefix "    "
                NUMBER@3:11 "1" prefix " "
                NEWLINE@3:12 "\n" prefix ""
          ENDMARKER@4:0 "" prefix ""
    "#]]
    .assert_eq(&tree.dump(tree.root()));
}

#[test]
fn replacing_the_only_line_parses_from_scratch() {
    let (tree, copies, parses) = update("x = 1\n", "x = 2\n");
    assert_matches_full_parse(&tree, "x = 2\n");
    assert_eq!((copies, parses), (0, 1));
}

#[test]
fn inserted_blank_line_copies_both_sides() {
    let old = "def f():\n    a = 1\n    b = 2\nx = 3\n";
    let new = "def f():\n    a = 1\n\n    b = 2\nx = 3\n";
    let (tree, copies, parses) = update(old, new);
    assert_matches_full_parse(&tree, new);
    // One copy before the blank line, one after it, one parse in between.
    assert_eq!((copies, parses), (2, 1));
}

#[test]
fn dedented_statements_are_never_copied_at_a_stale_indentation() {
    let old = "if x:\n    if y:\n        pass\n    z = 1\n";
    let new = "    if y:\n        pass\n    z = 1\n";
    let (tree, copies, parses) = update(old, new);
    // The unchanged lines sit at an indentation that is no longer an open
    // scope, so everything is re-parsed.
    assert_eq!((copies, parses), (0, 1));
    assert_matches_full_parse(&tree, new);
}

#[test]
fn identical_text_never_reparses() {
    let text = "a = 1\n\nb = 2\n";
    let (tree, copies, parses) = update(text, text);
    assert_matches_full_parse(&tree, text);
    assert_eq!((copies, parses), (1, 0));
}

#[test]
fn trailing_flow_statement_is_reparsed() {
    let old = "x = 1\nif c:\n    pass\n";
    let new = "x = 9\nif c:\n    pass\n";
    let (tree, copies, parses) = update(old, new);
    assert_matches_full_parse(&tree, new);
    // The `if` could grow an `else` out of its surroundings, so it is not
    // reusable as the last statement of a copy.
    assert_eq!(copies, 0);
    assert_eq!(parses, 2);
}

#[test]
fn editing_one_function_reuses_its_neighbors() {
    let old = "def a():\n    x = 1\n\ndef b():\n    y = 2\n\nz = 3\n";
    let new = "def a():\n    x = 1\n\ndef b():\n    y = 20\n\nz = 3\n";
    let (tree, copies, parses) = update(old, new);
    assert_matches_full_parse(&tree, new);
    // `def a` and `z = 3` are copied. Re-parsing takes two chunks: the
    // first closes at once on the dedent out of `def a`'s suite scope and
    // only covers the blank line, the second covers the edited function.
    assert_eq!((copies, parses), (2, 2));
}

#[test]
fn deleted_comment_lines_never_resurface_in_copies() {
    // The comment line lives in the prefix of the statement after it; a
    // copy of that statement must not drag the prefix back in once the
    // diff removed the line.
    for (old, new) in [
        ("    def g():\n# c\nx = 1\n", "    def g():\nx = 1\n"),
        ("  a = 1\n# c\nx = 1\n", "  a = 1\nx = 1\n"),
    ] {
        let (tree, _, _) = update(old, new);
        assert_matches_full_parse(&tree, new);
    }
}

#[test]
fn indentation_errors_match_a_full_reparse() {
    // Bad dedents inside a suite and stray indents at module level must
    // come out exactly where a from-scratch parse puts their error leaves.
    for (old, new) in [
        ("def f():\n    a = 1\n  b = 2\nz = 1\n", "def f():\n    a = 1\n  b = 2\nz = 2\n"),
        ("a = 1\n  b = 2\nc = 3\n", "a = 1\n  b = 2\nc = 4\n"),
        ("if x:\n    a = 1\n  b = 2\nz = 1\n", "if x:\n    a = 1\n  b = 2\nz = 2\n"),
    ] {
        let (tree, _, _) = update(old, new);
        assert_matches_full_parse(&tree, new);
    }
}

#[test]
fn inserting_lines_shifts_copied_statements() {
    let old = "a = 1\nb = 2\n";
    let new = "# c\n\na = 1\nb = 2\n";
    let (tree, copies, parses) = update(old, new);
    assert_matches_full_parse(&tree, new);
    assert_eq!((copies, parses), (1, 1));
}

#[test]
fn error_statements_are_never_copied() {
    let old = "foo(\n";
    let new = "foo(\nbar\n";
    let (tree, copies, _) = update(old, new);
    assert_eq!(tree.text(), new);
    assert_eq!(copies, 0);
}

#[test]
fn repeated_edits_stay_in_sync() {
    let versions = [
        "def f():\n    if x:\n        a = 1\n    return x\n",
        "def f():\n    if x:\n        a = 1\n    else:\n        a = 2\n    return x\n",
        "def f():\n    a = 1\n    return x\n",
        "if x:\n    a = 1\nreturn x\n",
        "if x:\n    a = 1\nreturn x\nclass C:\n    pass\n",
        "class C:\n    pass\n",
    ];
    let mut tree = parse(versions[0]);
    for pair in versions.windows(2) {
        let mut diff = DiffParser::new(&tree);
        let updated = diff.update(&lines(pair[0]), &lines(pair[1])).expect("update succeeds");
        assert_matches_full_parse(&updated, pair[1]);
        tree = updated;
    }
}

#[test]
fn update_handles_documents_without_final_newline() {
    let old = "x = 1\ny = 2";
    let new = "x = 1\ny = 3";
    let (tree, _, _) = update(old, new);
    assert_matches_full_parse(&tree, new);
}

#[test]
fn cache_reuses_and_invalidates_trees() {
    let mut cache = ParserCache::new();
    let path = Utf8Path::new("demo.py");
    assert_eq!(cache.update(path, "x = 1\n").text(), "x = 1\n");
    assert_eq!(cache.update(path, "x = 1\ny = 2\n").text(), "x = 1\ny = 2\n");
    // Same text again: the cached tree is handed back untouched.
    assert_eq!(cache.update(path, "x = 1\ny = 2\n").text(), "x = 1\ny = 2\n");
    assert!(cache.invalidate(path));
    assert!(!cache.invalidate(path));
}
