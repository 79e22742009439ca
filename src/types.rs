use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Width and height of the go board
pub const BOARD_SIZE: usize = 19;

/// Coordinate pair that asks for an automated turn instead of placing a stone
pub const AGENT_TURN_SENTINEL: (i32, i32) = (-1, -1);

/// Opaque ID types
pub type SessionId = String;
pub type ConnectionId = String;

/// One of the two competing sides. Encoded as 1 (black, moves first by default) and 2 (white).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Black,
    White,
}

impl Side {
    pub fn number(self) -> u8 {
        match self {
            Side::Black => 1,
            Side::White => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Side::Black),
            2 => Some(Side::White),
            _ => None,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Side::Black => Side::White,
            Side::White => Side::Black,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Black => "Black",
            Side::White => "White",
        }
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        Side::from_number(n)
            .ok_or_else(|| de::Error::custom(format!("invalid side {n}, expected 1 or 2")))
    }
}

/// State of a single intersection. Encoded as 0 for empty, otherwise the side number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Stone(Side),
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_u8(0),
            Cell::Stone(side) => side.serialize(serializer),
        }
    }
}

/// Fixed-size grid of cells, indexed `[y][x]` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Board {
    rows: Vec<Vec<Cell>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            rows: vec![vec![Cell::Empty; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        self.rows.get(y).and_then(|row| row.get(x)).copied()
    }

    /// True iff the coordinate is on the board and the cell is empty
    pub fn is_valid_move(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        matches!(self.get(x as usize, y as usize), Some(Cell::Empty))
    }

    /// Place a stone. The caller must have checked `is_valid_move`.
    pub fn place(&mut self, x: usize, y: usize, side: Side) {
        self.rows[y][x] = Cell::Stone(side);
    }

    /// All empty points as `(x, y)` in row-major order
    pub fn empty_points(&self) -> Vec<(usize, usize)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, cell)| **cell == Cell::Empty)
                    .map(move |(x, _)| (x, y))
            })
            .collect()
    }

    pub fn stone_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|cell| **cell != Cell::Empty)
            .count()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Space-separated side numbers, one board row per line
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Empty => "0".to_string(),
                        Cell::Stone(side) => side.number().to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One accepted move. Serialized as `[x, y, side]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(usize, usize, Side)", from = "(usize, usize, Side)")]
pub struct MoveRecord {
    pub x: usize,
    pub y: usize,
    pub side: Side,
}

impl From<MoveRecord> for (usize, usize, Side) {
    fn from(record: MoveRecord) -> Self {
        (record.x, record.y, record.side)
    }
}

impl From<(usize, usize, Side)> for MoveRecord {
    fn from((x, y, side): (usize, usize, Side)) -> Self {
        Self { x, y, side }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "player")]
    pub side: Side,
    #[serde(rename = "message")]
    pub text: String,
}

/// Annotation for the most recent move. Serialized as `[x, y, rationale]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(usize, usize, String)", from = "(usize, usize, String)")]
pub struct LastMove {
    pub x: usize,
    pub y: usize,
    pub rationale: String,
}

impl From<LastMove> for (usize, usize, String) {
    fn from(last: LastMove) -> Self {
        (last.x, last.y, last.rationale)
    }
}

impl From<(usize, usize, String)> for LastMove {
    fn from((x, y, rationale): (usize, usize, String)) -> Self {
        Self { x, y, rationale }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerMode {
    /// Automated sides start playing as soon as the session exists
    #[default]
    Ai,
    /// Automated sides only answer human moves or explicit triggers
    Human,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible chat completions endpoint
    #[default]
    OpenAi,
    Ollama,
}

/// Where a side's remote agent lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub url: String,
    pub model: String,
    pub provider: ProviderKind,
}

/// Everything needed to start a session
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub mode: PlayerMode,
    pub first_side: Side,
    pub black: Option<AgentEndpoint>,
    pub white: Option<AgentEndpoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.size(), BOARD_SIZE);
        assert_eq!(board.stone_count(), 0);
        assert_eq!(board.empty_points().len(), BOARD_SIZE * BOARD_SIZE);
    }

    #[test]
    fn test_is_valid_move_bounds() {
        let board = Board::new();
        let n = BOARD_SIZE as i32;

        assert!(board.is_valid_move(0, 0));
        assert!(board.is_valid_move(n - 1, n - 1));
        assert!(!board.is_valid_move(-1, 0));
        assert!(!board.is_valid_move(0, -1));
        assert!(!board.is_valid_move(n, 0));
        assert!(!board.is_valid_move(0, n));
        assert!(!board.is_valid_move(-1, -1));
    }

    #[test]
    fn test_place_occupies_cell() {
        let mut board = Board::new();
        board.place(3, 4, Side::White);

        assert_eq!(board.get(3, 4), Some(Cell::Stone(Side::White)));
        assert_eq!(board.get(4, 3), Some(Cell::Empty));
        assert!(!board.is_valid_move(3, 4));
        assert_eq!(board.stone_count(), 1);
    }

    #[test]
    fn test_board_serializes_rows_by_y() {
        let mut board = Board::new();
        board.place(2, 0, Side::Black);
        board.place(0, 1, Side::White);

        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json[0][2], 1);
        assert_eq!(json[1][0], 2);
        assert_eq!(json[0][0], 0);
        assert_eq!(json.as_array().unwrap().len(), BOARD_SIZE);
    }

    #[test]
    fn test_side_encoding() {
        assert_eq!(serde_json::to_string(&Side::Black).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Side>("2").unwrap(), Side::White);
        assert!(serde_json::from_str::<Side>("0").is_err());
        assert!(serde_json::from_str::<Side>("3").is_err());
        assert_eq!(Side::Black.opponent(), Side::White);
        assert_eq!(Side::White.opponent(), Side::Black);
    }

    #[test]
    fn test_record_wire_shapes() {
        let record = MoveRecord {
            x: 3,
            y: 5,
            side: Side::White,
        };
        assert_eq!(serde_json::to_string(&record).unwrap(), "[3,5,2]");

        let last = LastMove {
            x: 3,
            y: 5,
            rationale: "corner".to_string(),
        };
        assert_eq!(serde_json::to_string(&last).unwrap(), r#"[3,5,"corner"]"#);

        let chat = ChatRecord {
            side: Side::Black,
            text: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            serde_json::json!({"player": 1, "message": "hi"})
        );
    }

    #[test]
    fn test_board_text_rendering() {
        let mut board = Board::new();
        board.place(1, 0, Side::Black);
        let text = board.to_text();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("0 1 0"));
        assert_eq!(text.lines().count(), BOARD_SIZE);
    }
}
