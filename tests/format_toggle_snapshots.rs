// Snapshot tests for format toggles, rendered as markup with the resulting selection

use ctxedit::richtext::StructuredEditor;
use ctxedit::richtext::markup;

// Parse markup with selection markers, toggle each key in order and render the result
fn toggle(input: &str, keys: &[&str]) -> String {
    let mut editor = load(input);
    for key in keys {
        editor.toggle(key).unwrap();
    }
    editor.to_markup()
}

fn load(input: &str) -> StructuredEditor {
    let (tree, selection) = markup::parse(input).unwrap().into_document().unwrap();
    let mut editor = StructuredEditor::with_tree(tree);
    if let Some((start, end)) = selection {
        editor.set_selection(start, end).unwrap();
    }
    editor
}

#[test]
fn wrap_inside_plain_text() {
    insta::assert_snapshot!(
        toggle("<p>hello <ctx-start/>world<ctx-end/></p>", &["bold"]),
        @"<p>hello <ctx-start/><strong>world<ctx-end/></strong></p>"
    );
}

#[test]
fn unwrap_exact_match() {
    insta::assert_snapshot!(
        toggle("<p>hello <ctx-start/><strong>world</strong><ctx-end/></p>", &["bold"]),
        @"<p>hello <ctx-start/>world<ctx-end/></p>"
    );
}

#[test]
fn wrap_merges_into_preceding_node() {
    insta::assert_snapshot!(
        toggle("<p><strong>h<ctx-start/>el</strong>lo<ctx-end/></p>", &["bold"]),
        @"<p><strong>h<ctx-start/>ello<ctx-end/></strong></p>"
    );
}

#[test]
fn wrap_coalesces_neighbours() {
    insta::assert_snapshot!(
        toggle("<p><strong>a</strong><ctx-start/>b<ctx-end/><strong>c</strong></p>", &["bold"]),
        @"<p><strong>a<ctx-start/>b<ctx-end/>c</strong></p>"
    );
}

#[test]
fn unwrap_middle_of_run() {
    insta::assert_snapshot!(
        toggle("<p><strong>he<ctx-start/>llo w<ctx-end/>orld</strong></p>", &["bold"]),
        @"<p><strong>he<ctx-start/></strong>llo w<ctx-end/><strong>orld</strong></p>"
    );
}

#[test]
fn nest_two_formats() {
    insta::assert_snapshot!(
        toggle("<p>hello <ctx-start/>world<ctx-end/></p>", &["bold", "italic"]),
        @"<p>hello <ctx-start/><em><strong>world<ctx-end/></strong></em></p>"
    );
}

#[test]
fn exit_right_keeps_outer_italic() {
    let mut editor = load("<p><em><strong>text<ctx-caret/></strong></em></p>");
    editor.exit_right("bold").unwrap();
    insta::assert_snapshot!(
        editor.to_markup(),
        @"<p><em><strong>text</strong><ctx-caret/></em></p>"
    );

    editor.insert_text("!").unwrap();
    insta::assert_snapshot!(
        editor.to_markup(),
        @"<p><em><strong>text</strong>!<ctx-caret/></em></p>"
    );
}

#[test]
fn caret_toggle_at_trailing_edge_exits() {
    insta::assert_snapshot!(
        toggle("<p><em><strong>text<ctx-caret/></strong></em></p>", &["bold"]),
        @"<p><em><strong>text</strong><ctx-caret/></em></p>"
    );
}

#[test]
fn caret_split_then_type() {
    let mut editor = load("<p><strong>ab<ctx-caret/>cd</strong></p>");
    editor.toggle("bold").unwrap();
    editor.insert_text("X").unwrap();
    insta::assert_snapshot!(
        editor.to_markup(),
        @"<p><strong>ab</strong>X<ctx-caret/><strong>cd</strong></p>"
    );
}

#[test]
fn caret_insert_then_type() {
    let mut editor = load("<p>ab<ctx-caret/>cd</p>");
    editor.toggle("underline").unwrap();
    editor.insert_text("X").unwrap();
    insta::assert_snapshot!(
        editor.to_markup(),
        @"<p>ab<u>X<ctx-caret/></u>cd</p>"
    );
}

#[test]
fn wrap_two_lines() {
    insta::assert_snapshot!(
        toggle("<p>first <ctx-start/>line</p><p>second<ctx-end/> line</p>", &["bold"]),
        @"<p>first <ctx-start/><strong>line</strong></p><p><strong>second<ctx-end/></strong> line</p>"
    );
}

#[test]
fn unwrap_two_lines() {
    insta::assert_snapshot!(
        toggle(
            "<p>first <ctx-start/><strong>line</strong></p><p><strong>second</strong><ctx-end/> line</p>",
            &["bold"]
        ),
        @"<p>first <ctx-start/>line</p><p>second<ctx-end/> line</p>"
    );
}
