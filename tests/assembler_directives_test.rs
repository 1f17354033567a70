//! Integration tests for assembler directives: data, reservation, origin,
//! conditionals, includes and comments

use libz80::assembler::{assemble, Assembler, ErrorKind, InMemorySources};
use pretty_assertions::assert_eq;

fn bytes(source: &str) -> Vec<u8> {
    match assemble(source) {
        Ok(output) => output.bytes,
        Err(err) => panic!("assembly failed: {}", err),
    }
}

fn error(source: &str) -> ErrorKind {
    assemble(source).unwrap_err().kind
}

// ========== Data ==========

#[test]
fn test_db_strings_and_expressions() {
    assert_eq!(bytes("DB \"AB\",1,2+3,'z'"), vec![0x41, 0x42, 0x01, 0x05, 0x7A]);
    assert_eq!(bytes("DEFB $FF"), vec![0xFF]);
    assert_eq!(bytes("DEFM \"Hi\""), vec![0x48, 0x69]);
}

#[test]
fn test_dw_little_endian() {
    assert_eq!(
        bytes("ORG $8000\nTABLE: DW $1234,TABLE,-1"),
        vec![0x34, 0x12, 0x00, 0x80, 0xFF, 0xFF]
    );
    assert_eq!(bytes("DEFW 1"), vec![0x01, 0x00]);
}

#[test]
fn test_dz_appends_terminator() {
    assert_eq!(bytes("DZ \"OK\""), vec![0x4F, 0x4B, 0x00]);
    assert_eq!(bytes("DZ \"A\",13"), vec![0x41, 0x0D, 0x00]);
}

#[test]
fn test_data_range_checks() {
    assert_eq!(error("DB 256"), ErrorKind::ValueOutOfRange(256));
    assert_eq!(error("DW 65536"), ErrorKind::ValueOutOfRange(65536));
    assert!(matches!(error("DB"), ErrorKind::Syntax(_)));
}

#[test]
fn test_negative_db_value_warns() {
    let output = assemble("NOP\nDB -1").unwrap();

    assert_eq!(output.bytes, vec![0x00, 0xFF]);
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].line, 2);
    assert_eq!(
        output.warnings[0].to_string(),
        "main:2: warning: negative value -1 stored as $FF"
    );
}

#[test]
fn test_text_limited_to_single_bytes() {
    assert_eq!(bytes("DB \"\u{e9}\""), vec![0xE9]);
    assert_eq!(error("DB \"\u{20ac}\""), ErrorKind::ValueOutOfRange(0x20AC));
    assert_eq!(error("DZ \"A\u{20ac}\""), ErrorKind::ValueOutOfRange(0x20AC));
}

#[test]
fn test_overlapping_output_warns() {
    let output = assemble("ORG $10\n DB 1,2\n ORG $11\n DB 3").unwrap();
    assert_eq!(output.bytes, vec![1, 3]);
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(
        output.warnings[0].to_string(),
        "main:4: warning: output at $0011 overwrites earlier bytes"
    );

    // Wrapping past $FFFF lands on bytes already emitted
    let output = assemble("DS $10000\nNOP").unwrap();
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].line, 2);

    assert!(assemble("ORG $10\n DB 1\n ORG $08\n DB 2,3").unwrap().warnings.is_empty());
}

// ========== Reservation ==========

#[test]
fn test_ds_reserves_and_fills() {
    assert_eq!(bytes("DS 3\nNOP"), vec![0x00, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("DS 2,$E5"), vec![0xE5, 0xE5]);
    assert_eq!(bytes("SIZE EQU 2\nDEFS SIZE * 2,1"), vec![1, 1, 1, 1]);
}

#[test]
fn test_ds_zero_count_warns() {
    let output = assemble("DS 0\nRET").unwrap();
    assert_eq!(output.bytes, vec![0xC9]);
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].message.contains("zero count"));
}

#[test]
fn test_ds_count_must_be_known() {
    assert_eq!(
        error("DS LATER\nLATER EQU 2"),
        ErrorKind::ForwardReference("LATER".to_string())
    );
    assert_eq!(error("DS -1"), ErrorKind::ValueOutOfRange(-1));
}

// ========== Origin ==========

#[test]
fn test_org_segments() {
    let output = assemble("ORG $8000\n DB 1\n ORG $8004\n DB 2").unwrap();

    assert_eq!(output.origin, 0x8000);
    assert_eq!(output.segments.len(), 2);
    assert_eq!(output.segments[1].origin, 0x8004);
    assert_eq!(output.bytes, vec![1, 0, 0, 0, 2]);
}

#[test]
fn test_org_from_symbol() {
    assert_eq!(
        assemble("BASE EQU $C000\n ORG BASE + 1\n NOP").unwrap().origin,
        0xC001
    );
    assert_eq!(error("ORG $10000"), ErrorKind::ValueOutOfRange(0x10000));
}

#[test]
fn test_end_stops_assembly() {
    assert_eq!(bytes("NOP\n END\n  FROB"), vec![0x00]);
    // END closes conditionals still open in the unit
    assert_eq!(bytes("IF 1\nNOP\nEND\n"), vec![0x00]);
}

// ========== Conditionals ==========

#[test]
fn test_if_else_endif() {
    let source = r#"
DEBUG   EQU 0
        IF DEBUG
        LD A,1
        ELSE
        LD A,2
        ENDIF
    "#;
    assert_eq!(bytes(source), vec![0x3E, 0x02]);
}

#[test]
fn test_nested_conditionals() {
    let source = r#"
        IF 1
          IF 0
            DB 1
          ELSE
            DB 2
          ENDIF
        ELSE
          IF 1
            DB 3
          ENDIF
        ENDIF
    "#;
    assert_eq!(bytes(source), vec![2]);
}

#[test]
fn test_ifdef_checks_symbols_defined_so_far() {
    let source = r#"
FEATURE EQU 1
        IFDEF FEATURE
        DB 1
        ENDIF
        IFNDEF FEATURE
        DB 2
        ENDIF
        IFDEF LATER
        DB 3
        ENDIF
LATER   EQU 1
    "#;
    assert_eq!(bytes(source), vec![1]);
}

#[test]
fn test_skipped_lines_are_not_assembled() {
    // Errors inside an inactive branch are never seen
    assert_eq!(bytes("IF 0\n  FROB\n LD A,999\nENDIF\nNOP"), vec![0x00]);
}

#[test]
fn test_conditional_errors() {
    assert_eq!(error("IF 1\nNOP"), ErrorKind::MissingEndif);
    assert_eq!(error("ENDIF"), ErrorKind::StrayEndif);
    assert_eq!(error("ELSE"), ErrorKind::StrayElse);
    assert_eq!(
        error("IF 1\nELSE\nELSE\nENDIF"),
        ErrorKind::DuplicateElse
    );
    assert!(matches!(error("L1: IF 1\nENDIF"), ErrorKind::Syntax(_)));
}

#[test]
fn test_missing_endif_location() {
    let err = assemble("IF 1\nNOP\nNOP").unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingEndif);
    assert_eq!(err.line, 3);
}

// ========== Includes ==========

#[test]
fn test_include_inserts_unit() {
    let sources = InMemorySources::new()
        .with("main", "ORG $8000\nINCLUDE \"lib.asm\"\n CALL HELPER")
        .with("lib.asm", "HELPER: RET");

    let output = Assembler::new(sources).compile("main").unwrap();
    assert_eq!(output.bytes, vec![0xC9, 0xCD, 0x00, 0x80]);

    let helper = output.symbol("HELPER").unwrap();
    assert_eq!(helper.unit, "lib.asm");
    assert_eq!(helper.defined_at, 1);

    let location = output.source_map.get_source_location(0x8000).unwrap();
    assert_eq!(output.source_map.unit_name(location.unit), Some("lib.asm"));
    assert_eq!(location.line, 1);
    let location = output.source_map.get_source_location(0x8001).unwrap();
    assert_eq!(output.source_map.unit_name(location.unit), Some("main"));
    assert_eq!(location.line, 3);
}

#[test]
fn test_include_same_unit_twice() {
    let sources = InMemorySources::new()
        .with("main", "INCLUDE \"byte.asm\"\nINCLUDE \"byte.asm\"")
        .with("byte.asm", " DB 7");

    let output = Assembler::new(sources).compile("main").unwrap();
    assert_eq!(output.bytes, vec![7, 7]);
}

#[test]
fn test_include_cycle() {
    let sources = InMemorySources::new()
        .with("main", "INCLUDE \"a.asm\"")
        .with("a.asm", "NOP\nINCLUDE \"main\"");

    let err = Assembler::new(sources).compile("main").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncludeCycle("main".to_string()));
    assert_eq!(err.unit, "a.asm");
    assert_eq!(err.line, 2);
}

#[test]
fn test_include_not_found() {
    let err = assemble("NOP\nINCLUDE \"missing.asm\"").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncludeNotFound("missing.asm".to_string()));
    assert_eq!(err.line, 2);

    let err = Assembler::new(InMemorySources::new()).compile("main").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncludeNotFound("main".to_string()));
}

#[test]
fn test_conditionals_do_not_cross_units() {
    let sources = InMemorySources::new()
        .with("main", "IF 1\nINCLUDE \"lib.asm\"\nENDIF")
        .with("lib.asm", "ENDIF");

    let err = Assembler::new(sources).compile("main").unwrap_err();
    assert_eq!(err.kind, ErrorKind::StrayEndif);
    assert_eq!(err.unit, "lib.asm");
}

// ========== Comments ==========

#[test]
fn test_comments() {
    let source = r#"
        LD A,1      ; load one
        /* a block
           comment */ LD B,2
        DB ";"      ; the quoted ; is data
    "#;
    assert_eq!(bytes(source), vec![0x3E, 0x01, 0x06, 0x02, 0x3B]);
}

#[test]
fn test_unterminated_block_comment() {
    let err = assemble("NOP\n/* never closed\nNOP").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnterminatedBlockComment);
    assert_eq!(err.line, 2);
}
