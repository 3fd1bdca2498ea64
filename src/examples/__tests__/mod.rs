use super::{json_grammar, packet_grammar};
use crate::symbol::{FuncArg, SymbolKind};
use crate::{Functions, Generated, Grammar, GrammarError, MapImportResolver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

fn build(text: &str) -> Grammar {
    match Grammar::new(text, None, Functions::new()) {
        Ok(grammar) => grammar,
        Err(err) => panic!("{}", err),
    }
}

fn text_of(generated: Generated) -> String {
    match generated {
        Generated::Text(text) => text,
        Generated::Bin(bytes) => panic!("expected text output, got {} bytes", bytes.len()),
    }
}

#[test]
pub fn literal_generation_test() {
    let grammar = build("root \"hello\"");
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..10 {
        assert_eq!(text_of(grammar.generate_with(&mut rng).unwrap()), "hello");
    }
}

#[test]
pub fn choice_distribution_test() {
    let grammar = build("root    1   \"a\"\n        1   \"b\"");
    let mut rng = StdRng::seed_from_u64(1234);
    let mut count_a = 0usize;
    for _ in 0..10_000 {
        match text_of(grammar.generate_with(&mut rng).unwrap()).as_str() {
            "a" => count_a += 1,
            "b" => {}
            other => panic!("unexpected output {}", other),
        }
    }
    // three standard deviations around an even split of 10,000 samples
    assert!(
        (4850..=5150).contains(&count_a),
        "frequency of 'a' is off: {}",
        count_a
    );
}

#[test]
pub fn repeat_generation_test() {
    let grammar = build("root \"x\"{3}");
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(text_of(grammar.generate_with(&mut rng).unwrap()), "xxx");
}

#[test]
pub fn regex_generation_test() {
    let grammar = build("root /[0-9]{2}/");
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..30 {
        let output = text_of(grammar.generate_with(&mut rng).unwrap());
        assert_eq!(output.len(), 2, "{}", output);
        assert!(output.chars().all(|chr| chr.is_ascii_digit()), "{}", output);
    }
}

#[test]
pub fn reference_generation_test() {
    let grammar = build("root A \" \" @A\nA /[a-z]{3}/");
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..30 {
        let output = text_of(grammar.generate_with(&mut rng).unwrap());
        let parts: Vec<&str> = output.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], parts[1], "{}", output);
        assert_eq!(parts[0].len(), 3);
        assert!(parts[0].chars().all(|chr| chr.is_ascii_lowercase()));
    }
}

#[test]
pub fn function_generation_test() {
    let functions =
        Functions::new().register("f", |args: &[String]| Ok(format!("{}_{}", args[0], args[1])));
    let grammar = match Grammar::new("root F\nF f(1, 2)", None, functions) {
        Ok(grammar) => grammar,
        Err(err) => panic!("{}", err),
    };
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(text_of(grammar.generate_with(&mut rng).unwrap()), "1_2");
}

#[test]
pub fn unregistered_function_test() {
    match Grammar::new("root F\nF f(1, 2)", None, Functions::new()) {
        Err(GrammarError::Integrity(err)) => {
            assert!(err.message.contains("Function f used but not defined"), "{}", err)
        }
        other => panic!("construction should fail, got {:?}", other.err()),
    }
}

#[test]
pub fn infinite_recursion_test() {
    match Grammar::new("root A\nA B\nB A", None, Functions::new()) {
        Err(GrammarError::Integrity(err)) => {
            assert!(err.message.contains("no paths to termination"), "{}", err)
        }
        other => panic!("construction should fail, got {:?}", other.err()),
    }
}

#[test]
pub fn import_generation_test() {
    let resolver = MapImportResolver::new().add("lib.gmr", "sub \"ok\"\n");
    let grammar = Grammar::with_resolver(
        "L import(\"lib.gmr\")\nroot L.sub\n",
        None,
        None,
        Functions::new(),
        &resolver,
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(text_of(grammar.generate_with(&mut rng).unwrap()), "ok");
}

#[test]
pub fn seeded_generation_is_deterministic_test() {
    // the whole construct-then-generate pipeline, run twice with the same seed
    let grammar1 = json_grammar();
    let grammar2 = json_grammar();
    let mut rng1 = StdRng::seed_from_u64(42);
    let mut rng2 = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        assert_eq!(
            grammar1.generate_with(&mut rng1).unwrap(),
            grammar2.generate_with(&mut rng2).unwrap()
        );
    }
}

#[test]
pub fn json_output_is_valid_test() {
    let grammar = json_grammar();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..30 {
        let output = text_of(grammar.generate_with(&mut rng).unwrap());
        if let Err(err) = serde_json::from_str::<serde_json::Value>(&output) {
            panic!("generated invalid JSON {:?}: {}", output, err);
        }
    }
}

#[test]
pub fn packet_output_is_binary_test() {
    let grammar = packet_grammar();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let bytes = match grammar.generate_with(&mut rng).unwrap() {
            Generated::Bin(bytes) => bytes,
            Generated::Text(text) => panic!("expected bytes, got text {:?}", text),
        };
        assert!(bytes.starts_with(&[0x7f, 0x50, 0x4b, 0x10]), "{:02x?}", bytes);
        assert!(bytes.ends_with(&[0x0d, 0x0a]), "{:02x?}", bytes);
    }
}

#[test]
pub fn length_limit_bounds_output_test() {
    let grammar = match Grammar::new(
        "root    4   \"word \" root\n        1   \"end\"",
        Some(50),
        Functions::new(),
    ) {
        Ok(grammar) => grammar,
        Err(err) => panic!("{}", err),
    };
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let output = text_of(grammar.generate_with(&mut rng).unwrap());
        // the bias switches at the limit; one alternative may still be appended past it
        assert!(output.len() < 50 + 10, "{}", output.len());
        assert!(output.ends_with("end"), "{}", output);
    }
}

#[test]
pub fn symbol_table_invariants_test() {
    let grammar = json_grammar();
    // every referenced child exists
    for sym in grammar.symtab.values() {
        for child in sym.children() {
            assert!(
                grammar.symtab.contains_key(child.as_str()),
                "missing child {} of {}",
                child,
                sym.name
            );
        }
    }
    // every named top level symbol is reachable from root
    let mut reached: HashSet<&str> = HashSet::new();
    let mut to_check = vec!["root"];
    reached.insert("root");
    while let Some(name) = to_check.pop() {
        for child in grammar.symtab[name].children() {
            if reached.insert(child) {
                to_check.push(child);
            }
        }
    }
    for sym in grammar.symtab.values() {
        if !sym.implicit && !sym.name.contains('.') {
            assert!(reached.contains(sym.name.as_str()), "unreachable {}", sym.name);
        }
        // no dead ends
        assert!(
            sym.can_terminate == Some(true)
                || sym
                    .children()
                    .iter()
                    .any(|child| grammar.symtab[child.as_str()].can_terminate == Some(true)),
            "dead end at {}",
            sym.name
        );
        // choice totals match their weights
        if let SymbolKind::Choice(choice) = &sym.kind {
            let sum: f64 = choice.weights.iter().map(|weight| weight.value()).sum();
            assert!((sum - choice.total).abs() < 1e-9, "stale total in {}", sym.name);
        }
    }
}

const ROUNDTRIP_TEXT: &str = "\
root    entry{1,3} \"\\n\" @id
entry   id \"=\" value \";\"
id      /[a-z][a-z0-9]{0,3}/
value   3   \"str:\" /[A-Z]{2}[^a-zA-Z]?/
        2   rndint(0, 99)
        1   pick<1,2>
pick    1   \"p\"
        1   \"q\"
        +   sub
sub     1   \"s\"
        1   \"t\"
";

#[test]
pub fn serialize_roundtrip_test() {
    let original = build(ROUNDTRIP_TEXT);
    let serialized = original.build_grammar().unwrap();
    let reparsed = match Grammar::new(&serialized, None, Functions::new()) {
        Ok(grammar) => grammar,
        Err(err) => panic!("serialized grammar failed to parse: {}\n{}", err, serialized),
    };
    assert_equivalent(&original, &reparsed);
    // equivalent tables drive the random source identically
    let mut rng1 = StdRng::seed_from_u64(17);
    let mut rng2 = StdRng::seed_from_u64(17);
    for _ in 0..10 {
        assert_eq!(
            original.generate_with(&mut rng1).unwrap(),
            reparsed.generate_with(&mut rng2).unwrap()
        );
    }
}

#[test]
pub fn serialize_roundtrip_binary_test() {
    let original = packet_grammar();
    let serialized = original.build_grammar().unwrap();
    let reparsed = match Grammar::new(&serialized, Some(64), Functions::new()) {
        Ok(grammar) => grammar,
        Err(err) => panic!("serialized grammar failed to parse: {}\n{}", err, serialized),
    };
    assert_equivalent(&original, &reparsed);
}

#[test]
pub fn tree_view_test() {
    let grammar = json_grammar();
    let tree = grammar.to_tree("root").unwrap();
    assert!(tree.label().starts_with("root"), "{}", tree.label());
    assert!(!tree.child_nodes().is_empty());
    assert!(grammar.to_tree("missing").is_none());
}

fn assert_equivalent(g1: &Grammar, g2: &Grammar) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    assert_symbols_equivalent(g1, g2, "root", "root", &mut seen);
}

/// Structural equality from the start symbol down, modulo implicit names.
fn assert_symbols_equivalent(
    g1: &Grammar,
    g2: &Grammar,
    n1: &str,
    n2: &str,
    seen: &mut HashSet<(String, String)>,
) {
    if !seen.insert((n1.to_string(), n2.to_string())) {
        return;
    }
    let s1 = g1
        .symtab
        .get(n1)
        .unwrap_or_else(|| panic!("missing symbol {}", n1));
    let s2 = g2
        .symtab
        .get(n2)
        .unwrap_or_else(|| panic!("missing symbol {}", n2));
    assert_eq!(s1.implicit, s2.implicit, "{} vs {}", n1, n2);
    if !s1.implicit {
        assert_eq!(n1, n2, "named symbols must keep their names");
    }
    match (&s1.kind, &s2.kind) {
        (SymbolKind::Text(a), SymbolKind::Text(b)) => assert_eq!(a.value, b.value),
        (SymbolKind::TextChoice(a), SymbolKind::TextChoice(b)) => {
            let set_a: HashSet<char> = a.value.chars().collect();
            let set_b: HashSet<char> = b.value.chars().collect();
            assert_eq!(set_a, set_b, "{} vs {}", n1, n2);
        }
        (SymbolKind::Bin(a), SymbolKind::Bin(b)) => assert_eq!(a.value, b.value),
        (SymbolKind::Concat(a), SymbolKind::Concat(b)) => {
            assert_children_equivalent(g1, g2, &a.children, &b.children, seen);
        }
        (SymbolKind::Choice(a), SymbolKind::Choice(b)) => {
            assert_eq!(a.alternatives.len(), b.alternatives.len(), "{}", n1);
            assert_eq!(a.total, b.total, "{}", n1);
            for index in 0..a.alternatives.len() {
                assert_eq!(a.weights[index].value(), b.weights[index].value(), "{}", n1);
                assert_children_equivalent(
                    g1,
                    g2,
                    &a.alternatives[index],
                    &b.alternatives[index],
                    seen,
                );
            }
        }
        (SymbolKind::Repeat(a), SymbolKind::Repeat(b)) => {
            assert_eq!((a.min, a.max), (b.min, b.max), "{}", n1);
            assert_children_equivalent(g1, g2, &a.children, &b.children, seen);
        }
        (SymbolKind::RepeatSample(a), SymbolKind::RepeatSample(b)) => {
            assert_eq!((a.min, a.max), (b.min, b.max), "{}", n1);
            assert_children_equivalent(g1, g2, &a.children, &b.children, seen);
        }
        (SymbolKind::Func(a), SymbolKind::Func(b)) => {
            assert_eq!(a.fname, b.fname);
            assert_eq!(a.args.len(), b.args.len(), "{}", n1);
            for (arg_a, arg_b) in a.args.iter().zip(b.args.iter()) {
                match (arg_a, arg_b) {
                    (FuncArg::Int(va), FuncArg::Int(vb)) => assert_eq!(va, vb),
                    (FuncArg::Float(va), FuncArg::Float(vb)) => assert_eq!(va, vb),
                    (FuncArg::Symbol(ca), FuncArg::Symbol(cb)) => {
                        assert_symbols_equivalent(g1, g2, ca, cb, seen)
                    }
                    other => panic!("argument kind mismatch in {}: {:?}", n1, other),
                }
            }
        }
        (SymbolKind::Ref(a), SymbolKind::Ref(b)) => {
            assert_symbols_equivalent(g1, g2, &a.target, &b.target, seen);
        }
        _ => panic!(
            "symbol kind mismatch: {} is {}, {} is {}",
            n1,
            s1.kind_name(),
            n2,
            s2.kind_name()
        ),
    }
}

fn assert_children_equivalent(
    g1: &Grammar,
    g2: &Grammar,
    c1: &[String],
    c2: &[String],
    seen: &mut HashSet<(String, String)>,
) {
    assert_eq!(c1.len(), c2.len(), "child count mismatch: {:?} vs {:?}", c1, c2);
    for (child1, child2) in c1.iter().zip(c2.iter()) {
        assert_symbols_equivalent(g1, g2, child1, child2, seen);
    }
}
