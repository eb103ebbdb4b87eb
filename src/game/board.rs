//! Shared play field
//!
//! A `width x 20` grid stored row-major in a flat `Vec`. `y` grows
//! downward; row 0 is the top of the visible board. Cells above the board
//! (`y < 0`) are open space where freshly spawned figures may hang.

/// Rows on every board
pub const BOARD_HEIGHT: i32 = 20;

/// Columns on a board shared by `players` seats: 8 for the first player
/// plus 4 for every additional one.
pub fn board_width_for(players: usize) -> i32 {
    8 + 4 * (players.max(1) as i32 - 1)
}

/// State of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    Empty,
    /// Covered by a live, still-moving figure
    Occupied,
    /// Covered by a landed figure
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: i32,
    height: i32,
    cells: Vec<CellState>,
}

impl Board {
    /// Create an empty board
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![CellState::Empty; (width * height) as usize],
        }
    }

    /// Standard-height board sized for `players` seats
    pub fn for_players(players: usize) -> Self {
        Self::new(board_width_for(players), BOARD_HEIGHT)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    /// State of `(x, y)`, including the virtual cells around the grid.
    ///
    /// Side walls and everything at or below the floor read as `Fixed`.
    /// Open sky above the board (`y < 0`, `x` in range) reads as `Empty`.
    pub fn cell_state(&self, x: i32, y: i32) -> CellState {
        if x < 0 || x >= self.width || y >= self.height {
            return CellState::Fixed;
        }
        match self.index(x, y) {
            Some(idx) => self.cells[idx],
            None => CellState::Empty,
        }
    }

    pub fn is_empty_at(&self, x: i32, y: i32) -> bool {
        self.cell_state(x, y) == CellState::Empty
    }

    /// Set a cell; coordinates off the grid are ignored
    pub fn set_cell_state(&mut self, x: i32, y: i32, state: CellState) {
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = state;
        }
    }

    fn row(&self, y: i32) -> Option<&[CellState]> {
        if y < 0 || y >= self.height {
            return None;
        }
        let start = (y * self.width) as usize;
        Some(&self.cells[start..start + self.width as usize])
    }

    /// Every cell in row `y` is empty. Rows off the grid are never empty.
    pub fn is_line_empty(&self, y: i32) -> bool {
        self.row(y)
            .map(|row| row.iter().all(|c| *c == CellState::Empty))
            .unwrap_or(false)
    }

    /// Every cell in row `y` is fixed. Rows off the grid always count as full.
    pub fn is_line_full(&self, y: i32) -> bool {
        self.row(y)
            .map(|row| row.iter().all(|c| *c == CellState::Fixed))
            .unwrap_or(true)
    }

    pub fn clear(&mut self) {
        self.cells.fill(CellState::Empty);
    }

    /// Remove every full row, bottom-up, and return how many went away.
    ///
    /// Live figure cells stay where they are: collapse only moves landed
    /// cells, and only into cells that are not covered by a live figure.
    pub fn remove_full_lines(&mut self) -> usize {
        let mut removed = 0;
        let mut y = self.height - 1;
        while y >= 0 {
            if self.is_line_full(y) {
                self.remove_line(y);
                removed += 1;
                // the row above just fell into `y`
                continue;
            }
            y -= 1;
        }
        removed
    }

    fn remove_line(&mut self, y: i32) {
        let width = self.width as usize;
        for row in (1..=y as usize).rev() {
            for x in 0..width {
                let above = self.cells[(row - 1) * width + x];
                let here = &mut self.cells[row * width + x];
                if above != CellState::Occupied && *here != CellState::Occupied {
                    *here = above;
                }
            }
        }
        for cell in &mut self.cells[..width] {
            if *cell != CellState::Occupied {
                *cell = CellState::Empty;
            }
        }
    }

    /// Number of cells in `state`
    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|c| **c == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_row(board: &mut Board, y: i32, state: CellState) {
        for x in 0..board.width() {
            board.set_cell_state(x, y, state);
        }
    }

    #[test]
    fn widths_grow_by_four_per_player() {
        assert_eq!(board_width_for(1), 8);
        assert_eq!(board_width_for(2), 12);
        assert_eq!(board_width_for(8), 36);
        assert_eq!(Board::for_players(3).width(), 16);
        assert_eq!(Board::for_players(3).height(), BOARD_HEIGHT);
    }

    #[test]
    fn out_of_bounds_reads() {
        let board = Board::new(8, 20);
        assert_eq!(board.cell_state(-1, 5), CellState::Fixed);
        assert_eq!(board.cell_state(8, 5), CellState::Fixed);
        assert_eq!(board.cell_state(3, 20), CellState::Fixed);
        assert_eq!(board.cell_state(3, -4), CellState::Empty);
        // corner above and outside is still a wall
        assert_eq!(board.cell_state(-1, -1), CellState::Fixed);
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut board = Board::new(8, 20);
        board.set_cell_state(-1, 0, CellState::Fixed);
        board.set_cell_state(0, -1, CellState::Fixed);
        board.set_cell_state(0, 20, CellState::Fixed);
        assert_eq!(board.count(CellState::Empty), 8 * 20);
    }

    #[test]
    fn line_predicates_outside_the_grid() {
        let board = Board::new(8, 20);
        assert!(!board.is_line_empty(-1));
        assert!(!board.is_line_empty(20));
        assert!(board.is_line_full(-1));
        assert!(board.is_line_full(20));
        assert!(board.is_line_empty(0));
        assert!(!board.is_line_full(19));
    }

    #[test]
    fn occupied_cells_do_not_complete_a_line() {
        let mut board = Board::new(8, 20);
        fill_row(&mut board, 19, CellState::Fixed);
        board.set_cell_state(2, 19, CellState::Occupied);
        assert!(!board.is_line_full(19));
        assert_eq!(board.remove_full_lines(), 0);
    }

    #[test]
    fn single_full_bottom_row_leaves_an_empty_board() {
        let mut board = Board::new(12, 20);
        fill_row(&mut board, 19, CellState::Fixed);

        assert_eq!(board.remove_full_lines(), 1);
        assert!(board.is_line_empty(19));
        assert_eq!(board.count(CellState::Empty), 12 * 20);
    }

    #[test]
    fn two_full_rows_collapse_the_stack() {
        let mut board = Board::new(8, 20);
        fill_row(&mut board, 19, CellState::Fixed);
        fill_row(&mut board, 18, CellState::Fixed);
        board.set_cell_state(0, 17, CellState::Fixed);

        assert_eq!(board.remove_full_lines(), 2);
        assert_eq!(board.cell_state(0, 19), CellState::Fixed);
        assert_eq!(board.count(CellState::Fixed), 1);
        assert!(board.is_line_empty(0));
    }

    #[test]
    fn separated_full_rows_both_go() {
        let mut board = Board::new(8, 20);
        fill_row(&mut board, 19, CellState::Fixed);
        board.set_cell_state(4, 18, CellState::Fixed);
        fill_row(&mut board, 17, CellState::Fixed);

        assert_eq!(board.remove_full_lines(), 2);
        assert_eq!(board.cell_state(4, 19), CellState::Fixed);
        assert_eq!(board.count(CellState::Fixed), 1);
    }

    #[test]
    fn collapse_leaves_live_cells_alone() {
        let mut board = Board::new(8, 20);
        fill_row(&mut board, 19, CellState::Fixed);
        board.set_cell_state(1, 17, CellState::Fixed);
        board.set_cell_state(5, 10, CellState::Occupied);
        board.set_cell_state(5, 11, CellState::Occupied);

        assert_eq!(board.remove_full_lines(), 1);

        assert_eq!(board.cell_state(5, 10), CellState::Occupied);
        assert_eq!(board.cell_state(5, 11), CellState::Occupied);
        assert_eq!(board.count(CellState::Occupied), 2);
        assert_eq!(board.cell_state(5, 12), CellState::Empty);
        assert_eq!(board.cell_state(1, 18), CellState::Fixed);
        assert_eq!(board.count(CellState::Fixed), 1);
    }

    #[test]
    fn clear_resets_every_cell() {
        let mut board = Board::new(12, 20);
        fill_row(&mut board, 3, CellState::Occupied);
        fill_row(&mut board, 4, CellState::Fixed);
        board.clear();
        assert_eq!(board.count(CellState::Empty), 12 * 20);
    }
}
