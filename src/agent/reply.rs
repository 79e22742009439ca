//! Extracting a move from an agent's free-form reply.

use super::{LlmError, LlmResult, MoveProposal};
use crate::types::Board;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

const DEFAULT_RATIONALE: &str = "No explanation given.";

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*\n([\s\S]*?)\n\s*```").expect("fenced block pattern is valid")
});

#[derive(Debug, Deserialize)]
struct AgentReply {
    #[serde(rename = "move")]
    point: (i64, i64),
    #[serde(default)]
    reasoning: Option<String>,
}

/// Pull the JSON payload out of a reply: the first fenced block if there is one,
/// otherwise the outermost `{...}` span, otherwise the whole text.
pub fn extract_json(text: &str) -> &str {
    if let Some(block) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        return block.as_str().trim();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

/// Parse a reply into a move that is legal on `board`
pub fn parse_move(text: &str, board: &Board) -> LlmResult<MoveProposal> {
    let json = extract_json(text);
    let reply: AgentReply =
        serde_json::from_str(json).map_err(|e| LlmError::ParseError(e.to_string()))?;

    let (x, y) = reply.point;
    let size = board.size() as i64;
    if !(0..size).contains(&x) || !(0..size).contains(&y) {
        return Err(LlmError::IllegalMove {
            x,
            y,
            reason: "outside the board".to_string(),
        });
    }
    if !board.is_valid_move(x as i32, y as i32) {
        return Err(LlmError::IllegalMove {
            x,
            y,
            reason: "point already occupied".to_string(),
        });
    }

    let rationale = reply
        .reasoning
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_RATIONALE.to_string());

    Ok(MoveProposal {
        x: x as usize,
        y: y as usize,
        rationale,
    })
}
