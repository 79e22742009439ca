//! Prompt construction for remote agents.

use super::MoveContext;
use crate::types::{Board, Cell, ChatRecord, MoveRecord, Side};
use std::fmt::Write;

/// How many of the latest chat lines are shown to the agent
const RECENT_CHAT_LINES: usize = 5;

fn stone_symbol(cell: Cell) -> char {
    match cell {
        Cell::Empty => '·',
        Cell::Stone(Side::Black) => '●',
        Cell::Stone(Side::White) => '○',
    }
}

/// Render the board with column indices on top and row indices on the left
pub fn format_board(board: &Board) -> String {
    let mut out = String::from("Current board:\n\n   ");
    let header: Vec<String> = (0..board.size()).map(|i| format!("{i:2}")).collect();
    out.push_str(&header.join(" "));
    out.push('\n');

    for (y, row) in board.rows().iter().enumerate() {
        let _ = write!(out, "{y:2} ");
        let cells: Vec<String> = row
            .iter()
            .map(|cell| format!(" {}", stone_symbol(*cell)))
            .collect();
        out.push_str(&cells.join(" "));
        out.push('\n');
    }
    out
}

pub fn format_moves(moves: &[MoveRecord]) -> String {
    if moves.is_empty() {
        return "No moves have been played yet.".to_string();
    }

    let mut out = String::from("Moves so far:\n");
    for record in moves {
        let _ = writeln!(out, "- {}: ({}, {})", record.side.label(), record.x, record.y);
    }
    out
}

pub fn format_chat(chat: &[ChatRecord]) -> String {
    if chat.is_empty() {
        return String::new();
    }

    let start = chat.len().saturating_sub(RECENT_CHAT_LINES);
    let mut out = String::from("Recent conversation:\n");
    for record in &chat[start..] {
        let _ = writeln!(out, "- {}: {}", record.side.label(), record.text);
    }
    out
}

pub fn build_prompt(ctx: &MoveContext) -> String {
    let max = ctx.board.size().saturating_sub(1);
    let stone = match ctx.side {
        Side::Black => "Black (●)",
        Side::White => "White (○)",
    };

    format!(
        r#"You are a go master deciding your next move.

{board}
It is your turn. You play {stone}.

{moves}
{chat}
Before answering:
1. Assess the whole-board position
2. Consider what your opponent is aiming for, including anything they said
3. Choose a move that fits your overall strategy

Answer with JSON only:
{{
    "move": [x, y],
    "reasoning": "..."
}}

Rules for your answer:
- x is the column and y is the row, both integers from 0 to {max}
- The point you choose must be empty (·)
- Explain your choice in the first person, e.g. "I play here because ..."
"#,
        board = format_board(&ctx.board),
        moves = format_moves(&ctx.moves),
        chat = format_chat(&ctx.chat),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_rendering_marks_stones() {
        let mut board = Board::new();
        board.place(0, 0, Side::Black);
        board.place(1, 0, Side::White);

        let text = format_board(&board);
        let first_row = text.lines().nth(3).unwrap();
        assert!(first_row.starts_with(" 0"));
        assert!(first_row.contains('●'));
        assert!(first_row.contains('○'));
        assert!(text.contains("18"));
    }

    #[test]
    fn test_chat_keeps_latest_lines() {
        let chat: Vec<ChatRecord> = (0..8)
            .map(|i| ChatRecord {
                side: Side::White,
                text: format!("line {i}"),
            })
            .collect();

        let text = format_chat(&chat);
        assert!(!text.contains("line 2"));
        assert!(text.contains("line 3"));
        assert!(text.contains("line 7"));
    }

    #[test]
    fn test_prompt_names_side_and_history() {
        let ctx = MoveContext {
            board: Board::new(),
            side: Side::White,
            moves: vec![MoveRecord {
                x: 3,
                y: 3,
                side: Side::Black,
            }],
            chat: vec![],
        };

        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("White (○)"));
        assert!(prompt.contains("- Black: (3, 3)"));
        assert!(prompt.contains("from 0 to 18"));
    }
}
