//! Decodes the classic PowerPC integer `add` family against an inline ISA
//! description: form layout, mask refinement, postfix composition, and the
//! ambiguity sentinel.

use std::path::PathBuf;

use nanoscope::soc::isa::machine::MachineDescription;
use nanoscope::soc::isa::parser::parse_str;
use nanoscope::soc::isa::DecodeOutcome;

const PPC: &str = r#"
:space regs addr=32 word=64 type=register
:regs r[0-31] size=64
:space ppc addr=32 word=32 type=logic endian=big
:ppc X_FORM subfields={
    OPCD @(0-5) op=func
    RT @(6-10) op=reg.regs.r
    RA @(11-15) op=reg.regs.r
    RB @(16-20) op=reg.regs.r
    XO @(21-30) op=func
    Rc @(31) op=func post="."
}
:ppc::X_FORM XO_FORM subfields={
    OE @(21) op=func post="o"
}
:ppc::X_FORM add mask={OPCD=31, XO=266, Rc=0}
:ppc::XO_FORM addo mask={OPCD=31, XO=266, OE=1, Rc=0}
"#;

fn machine(src: &str) -> MachineDescription {
    let doc = parse_str(PathBuf::from("test.isa"), src).expect("description parses");
    MachineDescription::from_documents(vec![doc]).expect("description validates")
}

#[test]
fn add_decodes_with_register_operands() {
    let machine = machine(PPC);
    let DecodeOutcome::Decoded(decoded) = machine.decode("ppc", 0x7C63_2214) else {
        panic!("0x7C632214 should decode");
    };
    assert_eq!(decoded.mnemonic, "add");
    let values: Vec<(String, u64)> = decoded
        .operands
        .iter()
        .map(|operand| (operand.name.clone(), operand.value))
        .collect();
    assert_eq!(
        values,
        vec![("RT".into(), 3), ("RA".into(), 3), ("RB".into(), 4)],
        "operand fields extract from their bit slices"
    );
    let texts: Vec<&str> = decoded
        .operands
        .iter()
        .map(|operand| operand.text.as_str())
        .collect();
    assert_eq!(texts, vec!["r3", "r3", "r4"], "register roles resolve names");
}

#[test]
fn overflow_refinement_separates_addo_from_add() {
    let machine = machine(PPC);
    // The overflow-enable bit refines the wider function field: set it and
    // the more specific mask wins.
    let with_oe = machine.decode("ppc", 0x7C63_2614);
    assert_eq!(with_oe.mnemonic(), Some("addo"));

    let without_oe = machine.decode("ppc", 0x7C63_2214);
    assert_eq!(without_oe.mnemonic(), Some("add"), "clear bit still decodes the base form");
}

#[test]
fn unconstrained_record_bit_composes_the_mnemonic_postfix() {
    let source = r#"
:space ppc addr=32 word=32 type=logic endian=big
:ppc X_FORM subfields={
    OPCD @(0-5) op=func
    RT @(6-10) op=target
    RA @(11-15) op=source
    RB @(16-20) op=source
    XO @(21-30) op=func
    Rc @(31) op=func post="."
}
:ppc::X_FORM add mask={OPCD=31, XO=266}
"#;
    let machine = machine(source);
    assert_eq!(
        machine.decode("ppc", 0x7C63_2215).mnemonic(),
        Some("add."),
        "a set record bit appends the hidden postfix"
    );
    assert_eq!(machine.decode("ppc", 0x7C63_2214).mnemonic(), Some("add"));
}

#[test]
fn unknown_words_keep_the_raw_encoding() {
    let machine = machine(PPC);
    let outcome = machine.decode("ppc", 0x0000_0000);
    assert_eq!(
        outcome,
        DecodeOutcome::Unknown {
            word: 0,
            word_bytes: 4
        }
    );
}

#[test]
fn equally_specific_matches_report_ambiguity() {
    let source = r#"
:space ppc addr=32 word=32 type=logic endian=big
:ppc X_FORM subfields={
    OPCD @(0-5) op=func
    XO @(21-30) op=func
    Rc @(31) op=func
}
:ppc::X_FORM foo mask={OPCD=31, XO=266}
:ppc::X_FORM bar mask={OPCD=31, Rc=0}
"#;
    let machine = machine(source);
    let DecodeOutcome::Ambiguous { candidates, .. } = machine.decode("ppc", 0x7C63_2214) else {
        panic!("both two-field masks match, so the decode is ambiguous");
    };
    assert_eq!(candidates.len(), 2);
    assert!(candidates.contains(&"foo".to_string()));
    assert!(candidates.contains(&"bar".to_string()));
}

#[test]
fn listing_walks_a_big_endian_stream() {
    let machine = machine(PPC);
    let mut stream = Vec::new();
    stream.extend_from_slice(&0x7C63_2214u32.to_be_bytes());
    stream.extend_from_slice(&0x7C63_2614u32.to_be_bytes());

    let listing = machine.disassemble_from(&stream, 0x1000);
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].address, 0x1000);
    assert_eq!(listing[0].outcome.mnemonic(), Some("add"));
    assert_eq!(listing[1].address, 0x1004);
    assert_eq!(listing[1].outcome.mnemonic(), Some("addo"));
}

#[test]
fn duplicate_mnemonics_with_satisfiable_overlap_fail_validation() {
    let source = r#"
:space ppc addr=32 word=32 type=logic endian=big
:ppc X_FORM subfields={
    OPCD @(0-5) op=func
    XO @(21-30) op=func
}
:ppc::X_FORM add mask={OPCD=31}
:ppc::X_FORM add mask={OPCD=31, XO=266}
"#;
    let doc = parse_str(PathBuf::from("dup.isa"), source).expect("parses");
    let err = MachineDescription::from_documents(vec![doc]).unwrap_err();
    assert!(
        err.to_string().contains("share a satisfiable bit pattern"),
        "expected the exclusivity diagnostic, got: {err}"
    );
}
