//! Board and Win Evaluation
//!
//! The 3x3 board and the pure outcome evaluation over it.
//! No I/O, no failure modes; everything here is total.

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const BOARD_CELLS: usize = 9;

/// The fixed set of winning triples: 3 rows, 3 columns, 2 diagonals.
/// Scan order is fixed; the first matching triple wins.
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8], // rows
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8], // columns
    [0, 4, 8],
    [2, 4, 6], // diagonals
];

/// A player's mark on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mark {
    /// First player, always the host.
    X,
    /// Second player.
    O,
}

impl Mark {
    /// The opposing mark.
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A single board cell: empty or holding a mark.
pub type Cell = Option<Mark>;

/// The full board, always exactly 9 cells.
pub type Board = [Cell; BOARD_CELLS];

/// An empty board.
pub fn empty_board() -> Board {
    [None; BOARD_CELLS]
}

/// Result of evaluating a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A mark completed a line.
    Win {
        /// The winning mark.
        winner: Mark,
        /// The positions of the completed line.
        line: [usize; 3],
    },
    /// All cells occupied, no line completed.
    Draw,
}

/// Evaluate a board for a terminal outcome.
///
/// Returns `None` while the game is still undecided: no line is fully
/// occupied by one mark and at least one cell remains empty. Two
/// simultaneous three-in-a-rows cannot occur under legal move
/// sequencing, so first-match scan order is unambiguous.
pub fn evaluate(board: &Board) -> Option<Outcome> {
    for line in WIN_LINES {
        let [a, b, c] = line;
        if let Some(mark) = board[a] {
            if board[b] == Some(mark) && board[c] == Some(mark) {
                return Some(Outcome::Win { winner: mark, line });
            }
        }
    }

    if board.iter().all(|cell| cell.is_some()) {
        return Some(Outcome::Draw);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board_from(marks: &[(usize, Mark)]) -> Board {
        let mut board = empty_board();
        for &(pos, mark) in marks {
            board[pos] = Some(mark);
        }
        board
    }

    #[test]
    fn test_empty_board_undecided() {
        assert_eq!(evaluate(&empty_board()), None);
    }

    #[test]
    fn test_top_row_win() {
        let board = board_from(&[
            (0, Mark::X),
            (1, Mark::X),
            (2, Mark::X),
            (3, Mark::O),
            (4, Mark::O),
        ]);
        assert_eq!(
            evaluate(&board),
            Some(Outcome::Win {
                winner: Mark::X,
                line: [0, 1, 2]
            })
        );
    }

    #[test]
    fn test_column_win() {
        let board = board_from(&[
            (1, Mark::O),
            (4, Mark::O),
            (7, Mark::O),
            (0, Mark::X),
            (2, Mark::X),
        ]);
        assert_eq!(
            evaluate(&board),
            Some(Outcome::Win {
                winner: Mark::O,
                line: [1, 4, 7]
            })
        );
    }

    #[test]
    fn test_diagonal_win() {
        let board = board_from(&[
            (0, Mark::X),
            (4, Mark::X),
            (8, Mark::X),
            (1, Mark::O),
            (2, Mark::O),
        ]);
        assert_eq!(
            evaluate(&board),
            Some(Outcome::Win {
                winner: Mark::X,
                line: [0, 4, 8]
            })
        );
    }

    #[test]
    fn test_draw_full_board() {
        // X O X / X O O / O X X — legal fill, no completed line
        let board = board_from(&[
            (0, Mark::X),
            (1, Mark::O),
            (2, Mark::X),
            (3, Mark::X),
            (4, Mark::O),
            (5, Mark::O),
            (6, Mark::O),
            (7, Mark::X),
            (8, Mark::X),
        ]);
        assert_eq!(evaluate(&board), Some(Outcome::Draw));
    }

    #[test]
    fn test_partial_board_undecided() {
        let board = board_from(&[(4, Mark::X), (0, Mark::O), (1, Mark::X)]);
        assert_eq!(evaluate(&board), None);
    }

    #[test]
    fn test_win_detected_with_empty_cells_remaining() {
        // Only five cells filled, line already complete
        let board = board_from(&[
            (2, Mark::O),
            (5, Mark::O),
            (8, Mark::O),
            (0, Mark::X),
            (4, Mark::X),
        ]);
        assert!(matches!(
            evaluate(&board),
            Some(Outcome::Win {
                winner: Mark::O,
                ..
            })
        ));
    }

    proptest! {
        /// A board with no complete line and at least one empty cell is
        /// always undecided; once a line is complete the winning mark is
        /// reported regardless of what else is on the board.
        #[test]
        fn prop_evaluate_matches_line_scan(cells in prop::collection::vec(
            prop::option::of(prop::bool::ANY.prop_map(|x| if x { Mark::X } else { Mark::O })),
            BOARD_CELLS,
        )) {
            let mut board = empty_board();
            board.copy_from_slice(&cells);

            let completed = WIN_LINES.iter().find(|line| {
                board[line[0]].is_some()
                    && board[line[0]] == board[line[1]]
                    && board[line[0]] == board[line[2]]
            });
            let full = board.iter().all(|c| c.is_some());

            match evaluate(&board) {
                Some(Outcome::Win { winner, line }) => {
                    let first = completed.expect("win reported without a complete line");
                    prop_assert_eq!(&line, first);
                    prop_assert_eq!(Some(winner), board[line[0]]);
                }
                Some(Outcome::Draw) => {
                    prop_assert!(full);
                    prop_assert!(completed.is_none());
                }
                None => {
                    prop_assert!(!full);
                    prop_assert!(completed.is_none());
                }
            }
        }
    }
}
