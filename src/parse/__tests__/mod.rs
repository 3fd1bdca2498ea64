use crate::parse::regexp::REGEX_ALPHABET;
use crate::symbol::{ChoiceWeight, FuncArg, SymbolKind};
use crate::{Functions, Grammar, GrammarError, IntegrityError, MapImportResolver, ParseError};

fn build(text: &str) -> Result<Grammar, GrammarError> {
    Grammar::new(text, None, Functions::new())
}

fn expect_parse_error(text: &str) -> ParseError {
    match build(text) {
        Ok(_) => panic!("Construction should fail with a parse error."),
        Err(GrammarError::Parse(err)) => err,
        Err(GrammarError::Integrity(err)) => {
            panic!("Expected a parse error, got integrity error: {}", err)
        }
    }
}

fn expect_integrity_error(text: &str) -> IntegrityError {
    match build(text) {
        Ok(_) => panic!("Construction should fail with an integrity error."),
        Err(GrammarError::Integrity(err)) => err,
        Err(GrammarError::Parse(err)) => {
            panic!("Expected an integrity error, got parse error: {}", err)
        }
    }
}

#[test]
fn text_escapes_test() {
    let grammar = build(r#"root "a\tb\nc\\d\q e\"f""#).unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Text(text) => assert_eq!(text.value, "a\tb\nc\\dq e\"f"),
        other => panic!("root should flatten to a text symbol, got {:?}", other),
    }
}

#[test]
fn single_quoted_text_test() {
    let grammar = build(r#"root 'a"b'"#).unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Text(text) => assert_eq!(text.value, "a\"b"),
        other => panic!("root should flatten to a text symbol, got {:?}", other),
    }
}

#[test]
fn bin_parse_test() {
    let grammar = build(r#"root x"DEADbeef""#).unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Bin(bin) => assert_eq!(bin.value, vec![0xde, 0xad, 0xbe, 0xef]),
        other => panic!("root should flatten to a binary symbol, got {:?}", other),
    }
}

#[test]
fn bin_odd_hex_test() {
    let err = expect_parse_error(r#"root x"abc""#);
    assert!(err.message.contains("Invalid hex string"), "{}", err);
}

#[test]
fn bin_non_hex_test() {
    let err = expect_parse_error(r#"root x"zz""#);
    assert!(err.message.contains("Invalid hex string"), "{}", err);
}

#[test]
fn unterminated_string_test() {
    let err = expect_parse_error(r#"root "abc"#);
    assert!(err.message.contains("Unterminated string literal"), "{}", err);
}

#[test]
fn unterminated_regex_test() {
    let err = expect_parse_error("root /abc");
    assert!(
        err.message.contains("Unterminated regular expression"),
        "{}",
        err
    );
}

#[test]
fn regex_empty_range_test() {
    let err = expect_parse_error("root /[z-a]/");
    assert!(err.message.contains("Empty range in regex"), "{}", err);
}

#[test]
fn repeat_mismatch_test() {
    let err = expect_parse_error(r#"root "x"{1>"#);
    assert!(err.message.contains("Repeat symbol mismatch"), "{}", err);
}

#[test]
fn repeat_bounds_order_test() {
    let err = expect_parse_error(r#"root "x"{5,2}"#);
    assert!(err.message.contains("Repeat bounds out of order"), "{}", err);
}

#[test]
fn unknown_prefix_test() {
    let err = expect_parse_error("root Mod.sym");
    assert!(
        err.message
            .contains("Attempt to use symbol from unknown prefix: Mod"),
        "{}",
        err
    );
}

#[test]
fn redefinition_test() {
    let err = expect_parse_error("root \"a\"\nroot \"b\"");
    assert!(
        err.message
            .contains("Redefinition of symbol root previously declared on line 1"),
        "{}",
        err
    );
    assert_eq!(err.line_no, 2);
}

#[test]
fn reserved_symbol_name_test() {
    let err = expect_parse_error("import \"x\"");
    assert!(err.message.contains("'import' is a reserved name"), "{}", err);
}

#[test]
fn reserved_function_name_test() {
    let err = expect_parse_error("root a import(\"x\")\na \"y\"");
    assert!(
        err.message.contains("'import' is a reserved function name"),
        "{}",
        err
    );
}

#[test]
fn continuation_without_choice_test() {
    let err = expect_parse_error("root \"a\"\n    1 \"b\"");
    assert!(
        err.message.contains("Unexpected continuation of choice symbol"),
        "{}",
        err
    );
}

#[test]
fn line_continuation_test() {
    let grammar = build("root \"a\" \\\n    \"b\"").unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => assert_eq!(concat.children.len(), 2),
        other => panic!("root should be a concat, got {:?}", other),
    }
}

#[test]
fn choice_across_comment_test() {
    let grammar = build("root    1   \"a\"\n# note\n\n        2   \"b\"").unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Choice(choice) => {
            assert_eq!(choice.alternatives.len(), 2);
            assert_eq!(choice.total, 3.0);
        }
        other => panic!("root should be a choice, got {:?}", other),
    }
}

#[test]
fn choice_weight_inheritance_test() {
    let grammar = build(
        "root    1   \"x\" A\n        +   A\nA   2   \"a\"\n    3   \"b\"",
    )
    .unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Choice(choice) => {
            assert_eq!(choice.weights[0], ChoiceWeight::Number(1.0));
            assert_eq!(choice.weights[1], ChoiceWeight::Number(5.0));
            assert_eq!(choice.total, 6.0);
        }
        other => panic!("root should be a choice, got {:?}", other),
    }
}

#[test]
fn choice_weight_cycle_test() {
    let err = expect_integrity_error("root 1 A\nA + B\nB + A");
    assert!(err.message.contains("Unresolvable '+' weight"), "{}", err);
}

#[test]
fn choice_plus_non_choice_test() {
    let err = expect_integrity_error("root + A\nA \"x\"");
    assert!(
        err.message.contains("Invalid use of '+' on non-choice symbol"),
        "{}",
        err
    );
}

#[test]
fn repeat_sample_records_choice_test() {
    let grammar = build("root C<1,2>\nC   1   \"a\"\n    1   \"b\"").unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::RepeatSample(repeat) => {
            assert_eq!(repeat.sample_idx, Some(0));
            assert_eq!((repeat.min, repeat.max), (1, 2));
        }
        other => panic!("root should be a repeat sample, got {:?}", other),
    }
}

#[test]
fn repeat_sample_invalid_child_test() {
    let err = expect_integrity_error("root (\"x\" sub)<1,2>\nsub \"y\" \"z\"");
    assert!(err.message.contains("invalid child type"), "{}", err);
}

#[test]
fn repeat_sample_no_choice_test() {
    let err = expect_integrity_error("root (\"a\" \"b\")<1,2>");
    assert!(
        err.message.contains("must have one choice symbol"),
        "{}",
        err
    );
}

#[test]
fn func_arg_classification_test() {
    let functions = Functions::new().register("f", |args: &[String]| Ok(args.join("-")));
    let grammar = Grammar::new("root f(3, 1e2, \"t\" A, A)\nA \"z\"", None, functions).unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Func(func) => {
            assert_eq!(func.fname, "f");
            assert_eq!(func.args.len(), 4);
            assert!(matches!(func.args[0], FuncArg::Int(3)));
            assert!(matches!(func.args[1], FuncArg::Float(value) if value == 100.0));
            assert!(matches!(func.args[2], FuncArg::Symbol(_)));
            assert!(matches!(func.args[3], FuncArg::Symbol(_)));
        }
        other => panic!("root should be a function symbol, got {:?}", other),
    }
}

#[test]
fn unused_function_test() {
    let functions = Functions::new().register("g", |_: &[String]| Ok(String::new()));
    match Grammar::new("root \"x\"", None, functions) {
        Err(GrammarError::Integrity(err)) => {
            assert!(err.message.contains("Unused function: g"), "{}", err)
        }
        other => panic!("Expected an unused function error, got {:?}", other.err()),
    }
}

#[test]
fn missing_function_test() {
    let err = expect_integrity_error("root f(1, 2)");
    assert!(
        err.message.contains("Function f used but not defined"),
        "{}",
        err
    );
}

#[test]
fn missing_root_test() {
    let err = expect_integrity_error("a \"x\"");
    assert!(
        err.message.contains("Missing required start symbol: root"),
        "{}",
        err
    );
}

#[test]
fn undefined_symbol_test() {
    let err = expect_integrity_error("root A");
    assert!(err.message.contains("Symbol A used but not defined"), "{}", err);
}

#[test]
fn unused_symbol_test() {
    let err = expect_integrity_error("root \"x\"\nother \"y\"");
    assert!(err.message.contains("Unused symbol: other"), "{}", err);
}

#[test]
fn no_termination_test() {
    let err = expect_integrity_error("root A\nA A");
    assert!(
        err.message.contains("no paths to termination"),
        "{}",
        err
    );
}

#[test]
fn import_symbols_test() {
    let resolver = MapImportResolver::new().add("lib.gmr", "sub \"ok\"\n");
    let grammar = Grammar::with_resolver(
        "L import(\"lib.gmr\")\nroot L.sub\n",
        None,
        None,
        Functions::new(),
        &resolver,
    )
    .unwrap();
    match &grammar.symtab["L.sub"].kind {
        SymbolKind::Text(text) => assert_eq!(text.value, "ok"),
        other => panic!("imported symbol should be text, got {:?}", other),
    }
    match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => assert_eq!(concat.children, vec!["L.sub".to_string()]),
        other => panic!("root should be a concat, got {:?}", other),
    }
}

#[test]
fn unused_import_test() {
    let resolver = MapImportResolver::new().add("lib.gmr", "sub \"ok\"\n");
    match Grammar::with_resolver(
        "L import(\"lib.gmr\")\nroot \"x\"\n",
        None,
        None,
        Functions::new(),
        &resolver,
    ) {
        Err(GrammarError::Integrity(err)) => {
            assert!(err.message.contains("Unused import: L"), "{}", err)
        }
        other => panic!("Expected an unused import error, got {:?}", other.err()),
    }
}

#[test]
fn missing_import_test() {
    let resolver = MapImportResolver::new();
    match Grammar::with_resolver(
        "L import(\"lib.gmr\")\nroot L.sub\n",
        None,
        None,
        Functions::new(),
        &resolver,
    ) {
        Err(GrammarError::Integrity(err)) => assert!(
            err.message.contains("Could not find imported grammar: lib.gmr"),
            "{}",
            err
        ),
        other => panic!("Expected a missing import error, got {:?}", other.err()),
    }
}

#[test]
fn implicit_concat_lift_test() {
    let grammar = build("root (\"a\" \"b\"){2}").unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::Repeat(repeat) => {
            assert_eq!(repeat.children.len(), 2);
            assert_eq!((repeat.min, repeat.max), (2, 2));
        }
        other => panic!("root should be a repeat, got {:?}", other),
    }
}

#[test]
fn error_line_number_test() {
    let err = expect_parse_error("root \"a\"\n# fine\nbad )\n");
    assert_eq!(err.line_no, 3);
}

#[test]
fn regex_structure_test() {
    let grammar = build("root /a[0-9]{2}x?/").unwrap();
    let children = match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => concat.children.clone(),
        other => panic!("root should be a concat, got {:?}", other),
    };
    assert_eq!(children.len(), 3);
    match &grammar.symtab[&children[0]].kind {
        SymbolKind::Text(text) => assert_eq!(text.value, "a"),
        other => panic!("first part should be text, got {:?}", other),
    }
    match &grammar.symtab[&children[1]].kind {
        SymbolKind::Repeat(repeat) => {
            assert_eq!((repeat.min, repeat.max), (2, 2));
            match &grammar.symtab[&repeat.children[0]].kind {
                SymbolKind::TextChoice(choice) => assert_eq!(choice.value, "0123456789"),
                other => panic!("digit set expected, got {:?}", other),
            }
        }
        other => panic!("second part should be a repeat, got {:?}", other),
    }
    match &grammar.symtab[&children[2]].kind {
        SymbolKind::Repeat(repeat) => assert_eq!((repeat.min, repeat.max), (0, 1)),
        other => panic!("third part should be a repeat, got {:?}", other),
    }
}

#[test]
fn regex_dot_interned_test() {
    let grammar = build("root /../").unwrap();
    let children = match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => concat.children.clone(),
        other => panic!("root should be a concat, got {:?}", other),
    };
    assert_eq!(children, vec!["[regex alpha]", "[regex alpha]"]);
    match &grammar.symtab["[regex alpha]"].kind {
        SymbolKind::TextChoice(choice) => assert_eq!(choice.value, REGEX_ALPHABET),
        other => panic!("alphabet should be a text choice, got {:?}", other),
    }
}

#[test]
fn regex_inverse_set_test() {
    let grammar = build("root /[^0-9]/").unwrap();
    match &grammar.symtab["root"].kind {
        SymbolKind::TextChoice(choice) => {
            assert_eq!(choice.value.chars().count(), REGEX_ALPHABET.chars().count() - 10);
            assert!(!choice.value.contains('5'));
            assert!(choice.value.contains('a'));
        }
        other => panic!("root should flatten to a text choice, got {:?}", other),
    }
}

#[test]
fn regex_quantifiers_test() {
    let grammar = build("root /a*b+/").unwrap();
    let children = match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => concat.children.clone(),
        other => panic!("root should be a concat, got {:?}", other),
    };
    match &grammar.symtab[&children[0]].kind {
        SymbolKind::Repeat(repeat) => assert_eq!((repeat.min, repeat.max), (0, 5)),
        other => panic!("a* should be a repeat, got {:?}", other),
    }
    match &grammar.symtab[&children[1]].kind {
        SymbolKind::Repeat(repeat) => assert_eq!((repeat.min, repeat.max), (1, 5)),
        other => panic!("b+ should be a repeat, got {:?}", other),
    }
}

#[test]
fn regex_dash_literal_test() {
    let grammar = build("root /[a-][-b]/").unwrap();
    let children = match &grammar.symtab["root"].kind {
        SymbolKind::Concat(concat) => concat.children.clone(),
        other => panic!("root should be a concat, got {:?}", other),
    };
    match &grammar.symtab[&children[0]].kind {
        SymbolKind::TextChoice(choice) => assert_eq!(choice.value, "a-"),
        other => panic!("trailing dash set expected, got {:?}", other),
    }
    match &grammar.symtab[&children[1]].kind {
        SymbolKind::TextChoice(choice) => assert_eq!(choice.value, "-b"),
        other => panic!("leading dash set expected, got {:?}", other),
    }
}

#[test]
fn tracked_reference_test() {
    let grammar = build("root A \" \" @A\nA \"v\"").unwrap();
    assert!(grammar.tracked.contains("A"));
    assert!(grammar.symtab.contains_key("@A"));
    match &grammar.symtab["@A"].kind {
        SymbolKind::Ref(reference) => assert_eq!(reference.target, "A"),
        other => panic!("@A should be a reference, got {:?}", other),
    }
}
