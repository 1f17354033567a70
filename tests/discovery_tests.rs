//! Integration tests for code/data discovery

mod common;

use common::{init_test_logging, texts, TraceCpu};
use libz80::{
    assemble, CodeFlags, CodeMap, CodeRequest, CodeSource, Discovery, FlatMemory, LabelLookup,
    LabelMap,
};
use pretty_assertions::assert_eq;

fn mnemonics(lines: &[libz80::CodeLine]) -> Vec<&'static str> {
    lines.iter().map(|line| line.mnemonic).collect()
}

#[test]
fn test_trace_sees_self_modified_code() {
    init_test_logging();
    let program = [
        0x21, 0x07, 0x00, // LD HL,$0007
        0x36, 0x76, //       LD (HL),$76    ; patch in a HALT
        0x18, 0x00, //       JR $0007
        0x3E, 0x01, //       LD A,$01       ; before patching
    ];
    let mut cpu = TraceCpu::new(0, &program);
    let mut map = CodeMap::default();
    let request = CodeRequest {
        start_address: 0,
        instruction_limit: 5,
        use_heuristic: false,
        max_data_group: 8,
    };

    let lines = Discovery::new().parse_code(CodeSource::Execution(&mut cpu), &request, Some(&mut map));

    assert_eq!(mnemonics(&lines), vec!["LD", "LD", "JR", "HALT", "DB"]);
    assert_eq!(lines[3].address, 0x0007);
    assert!(map.is_code_start(0x0007));
    assert!(map.is_unclassified(0x0008));
    assert!(map.is_data_written(0x0007));
}

#[test]
fn test_trace_records_data_reads() {
    let program = [
        0x3A, 0x00, 0x90, // LD A,($9000)
        0x76, //             HALT
    ];
    let mut cpu = TraceCpu::new(0x8000, &program);
    let mut map = CodeMap::default();
    let request = CodeRequest {
        start_address: 0x8000,
        instruction_limit: 3,
        ..Default::default()
    };

    Discovery::new().parse_code(CodeSource::Execution(&mut cpu), &request, Some(&mut map));

    assert!(map.is_data_read(0x9000));
    assert!(!map.is_data_written(0x9000));
    assert_eq!(map.instruction_length(0x8000), 3);
    assert!(map.is_code_start(0x8003));
}

#[test]
fn test_trace_overwrites_existing_marks() {
    // LD HL,$0000 / HALT
    let mut cpu = TraceCpu::new(0, &[0x21, 0x00, 0x00, 0x76]);
    let mut map = CodeMap::default();
    map.mark_code(1, 1, true);

    let request = CodeRequest {
        instruction_limit: 2,
        ..Default::default()
    };
    Discovery::new().parse_code(CodeSource::Execution(&mut cpu), &request, Some(&mut map));

    assert!(map.is_code_start(0));
    assert!(map.is_code_interior(1));
    assert!(map.is_code_start(3));
}

#[test]
fn test_heuristic_separates_code_from_data() {
    let output = assemble(
        r#"
        ORG $8000
START:  LD HL,MSG
        CALL PRINT
        JR START
MSG:    DZ "HI"
PRINT:  LD A,(HL)
        OR A
        RET Z
        OUT ($FE),A
        INC HL
        JR PRINT
"#,
    )
    .unwrap();

    let mut memory = FlatMemory::new();
    output.load_into(&mut memory);
    let labels = output.labels();
    let mut map = CodeMap::default();
    let request = CodeRequest {
        start_address: 0x8000,
        instruction_limit: 10,
        use_heuristic: true,
        max_data_group: 8,
    };

    let lines = Discovery::new()
        .with_labels(&labels)
        .parse_code(CodeSource::Memory(&memory), &request, Some(&mut map));

    assert_eq!(
        texts(&lines[..10]),
        vec![
            "LD HL,MSG",
            "CALL PRINT",
            "JR START",
            "DB $48,$49,$00",
            "LD A,(HL)",
            "OR A",
            "RET Z",
            "OUT ($FE),A",
            "INC HL",
            "JR PRINT",
        ]
    );
    assert_eq!(lines[3].label.as_deref(), Some("MSG"));
    assert!(map.is_unclassified(0x8008));
}

#[test]
fn test_raw_listing_without_map() {
    let memory = FlatMemory::from_bytes(0, &[0x3E, 0x05, 0xC9]);
    let request = CodeRequest {
        instruction_limit: 2,
        ..Default::default()
    };

    let lines = Discovery::new().parse_code(CodeSource::Memory(&memory), &request, None);
    assert_eq!(texts(&lines), vec!["LD A,$05", "RET"]);
}

#[test]
fn test_raw_listing_shows_discarded_prefixes() {
    let program = [0xDD, 0xDD, 0x21, 0x34, 0x12, 0x00];
    let memory = FlatMemory::from_bytes(0, &program);
    let request = CodeRequest {
        instruction_limit: 3,
        ..Default::default()
    };

    let lines = Discovery::new().parse_code(CodeSource::Memory(&memory), &request, None);
    assert_eq!(texts(&lines), vec!["DB $DD", "LD IX,$1234", "NOP"]);
    assert_eq!(
        lines.iter().map(|line| line.address).collect::<Vec<_>>(),
        vec![0x0000, 0x0001, 0x0005]
    );

    let listing = texts(&lines).join("\n");
    assert_eq!(assemble(&listing).unwrap().bytes, program.to_vec());
}

#[test]
fn test_heuristic_leaves_discarded_prefixes_as_data() {
    // DD before ED has no effect: ADC HL,BC / RET
    let program = [0xDD, 0xED, 0x4A, 0xC9];
    let memory = FlatMemory::from_bytes(0, &program);
    let request = CodeRequest {
        instruction_limit: 8,
        use_heuristic: true,
        ..Default::default()
    };
    let mut map = CodeMap::default();

    let lines =
        Discovery::new().parse_code(CodeSource::Memory(&memory), &request, Some(&mut map));
    assert!(map.is_unclassified(0));
    assert!(map.is_code_start(1));
    assert_eq!(map.instruction_length(1), 2);
    assert_eq!(&texts(&lines)[..3], &["DB $DD", "ADC HL,BC", "RET"]);

    let listing = texts(&lines[..3]).join("\n");
    assert_eq!(assemble(&listing).unwrap().bytes, program.to_vec());
}

#[test]
fn test_listing_splits_prefixes_from_marked_span() {
    let memory = FlatMemory::from_bytes(0, &[0xFD, 0xDD, 0xDD, 0x21, 0x34, 0x12]);
    let mut map = CodeMap::default();
    map.mark_code(0, 6, true);
    let request = CodeRequest {
        instruction_limit: 2,
        max_data_group: 0,
        ..Default::default()
    };

    let lines = Discovery::new().parse_code(CodeSource::Memory(&memory), &request, Some(&mut map));
    assert_eq!(texts(&lines), vec!["DB $FD,$DD", "LD IX,$1234"]);
    assert_eq!(lines[1].address, 2);
}

#[test]
fn test_listing_groups_whole_data_run() {
    let memory = FlatMemory::from_bytes(0, &[0x00, 0xAA, 0xBB, 0xCC]);
    let mut map = CodeMap::default();
    map.mark_code(0, 1, true);
    map.mark_code(4, 1, true);
    let request = CodeRequest {
        instruction_limit: 3,
        max_data_group: 0,
        ..Default::default()
    };

    let lines = Discovery::new().parse_code(CodeSource::Memory(&memory), &request, Some(&mut map));
    assert_eq!(texts(&lines), vec!["NOP", "DB $AA,$BB,$CC", "NOP"]);
}

#[test]
fn test_labels_split_data_groups() {
    let memory = FlatMemory::from_bytes(0x10, &[1, 2, 3, 4]);
    let mut labels = LabelMap::new();
    labels.add_label(0x12, "TABLE");
    let mut map = CodeMap::default();
    let request = CodeRequest {
        start_address: 0x10,
        instruction_limit: 2,
        max_data_group: 0,
        ..Default::default()
    };

    let lines = Discovery::new()
        .with_labels(&labels)
        .parse_code(CodeSource::Memory(&memory), &request, Some(&mut map));

    assert_eq!(lines[0].length(), 2);
    assert_eq!(lines[1].label.as_deref(), Some("TABLE"));
}

#[test]
fn test_code_map_orphans_and_flags() {
    let mut map = CodeMap::default();
    map.mark_code(0x100, 4, true);
    map.mark_code(0x100, 2, true);

    assert_eq!(map.instruction_length(0x100), 2);
    assert!(map.is_unclassified(0x102));
    assert!(map.is_unclassified(0x103));

    // Data flags coexist with code flags
    map.mark_data(0x101, 1, false, true);
    assert_eq!(
        map.flags(0x101),
        CodeFlags::CODE_INTERIOR | CodeFlags::DATA_READ
    );

    map.mark_code(0x100, 2, false);
    assert!(!map.is_code(0x100));
    assert!(!map.is_code(0x101));
    assert!(map.is_data_read(0x101));
}

#[test]
fn test_code_map_merge_keeps_existing_code() {
    let mut ours = CodeMap::default();
    ours.mark_code(0x10, 3, true);

    let mut theirs = CodeMap::default();
    theirs.mark_code(0x11, 2, true);
    theirs.mark_code(0x20, 1, true);
    theirs.mark_data(0x30, 2, true, true);

    ours.merge(&theirs);

    assert_eq!(ours.instruction_start(0x12), Some(0x10));
    assert!(ours.is_code_start(0x20));
    assert!(ours.is_data_written(0x31));
    assert_eq!(ours.code_starts().collect::<Vec<_>>(), vec![0x10, 0x20]);
}
