use std::fmt::Write;

use crate::instruction::Instruction;

/// Renders a single listing line, eg. `(3) IMM      14`.
pub fn render_line(address: usize, ins: &Instruction) -> String {
    format!("({}) {}", address, ins)
}

/// Renders the assembly listing of `code`, one instruction per line.
pub fn render(code: &[Instruction]) -> String {
    let mut out = String::new();

    for (address, ins) in code.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", render_line(address, ins));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;

    #[test]
    fn test_render() {
        let code = vec![
            Instruction::with_arg(OpCode::NewFrame, 2),
            Instruction::with_arg(OpCode::LoadEffectiveAddress, -1),
            Instruction::new(OpCode::LoadInt),
            Instruction::new(OpCode::Return),
        ];

        let text = render(&code);

        assert_eq!(
            text,
            "(0) NVAR     2\n(1) LEA      -1\n(2) LI      \n(3) RET     \n"
        );
        assert_eq!(render(&code), text);
    }
}
