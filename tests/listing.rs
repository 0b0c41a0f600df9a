use cpc::{
    bytecode::{render_line, Program},
    compiler::{compile, SourceMap},
    instruction::{Instruction, OpCode},
};

fn compile_program() -> Program {
    compile(include_str!("programs/factorial.c")).expect("could not compile factorial.c")
}

#[test]
fn test_listing_format() {
    let program = compile_program();
    let listing = program.listing();
    let lines: Vec<&str> = listing.lines().collect();

    assert_eq!(lines.len(), program.code.len());
    assert_eq!(lines[0], "(0) NVAR     0");
    assert_eq!(lines[1], "(1) LEA      2");
    assert_eq!(lines[2], "(2) LI      ");

    for (index, ins) in program.code.iter().enumerate() {
        assert_eq!(lines[index], render_line(index, ins));
    }
}

#[test]
fn test_listing_is_stable() {
    let program = compile_program();

    assert_eq!(program.listing(), program.listing());
    assert_eq!(program.listing(), compile_program().listing());
}

#[test]
fn test_word_encoding_preserves_listing() {
    let program = compile_program();
    let words = program.to_words();
    let decoded = Program::from_words(&words, program.data.clone(), program.entry).unwrap();

    assert_eq!(decoded, program);
    assert_eq!(decoded.listing(), program.listing());
}

#[test]
fn test_source_lines() {
    let map: SourceMap<Program> = compile(include_str!("programs/arithmetic.c")).unwrap();

    assert_eq!(
        map.compiled.code,
        vec![
            Instruction::with_arg(OpCode::NewFrame, 0),
            Instruction::with_arg(OpCode::LoadImmediate, 2),
            Instruction::new(OpCode::Push),
            Instruction::with_arg(OpCode::LoadImmediate, 3),
            Instruction::new(OpCode::Push),
            Instruction::with_arg(OpCode::LoadImmediate, 4),
            Instruction::new(OpCode::Multiply),
            Instruction::new(OpCode::Add),
            Instruction::new(OpCode::Return),
        ]
    );
    assert_eq!(map.lines(), &[2, 3, 3, 3, 3, 3, 3, 3, 3]);
}
