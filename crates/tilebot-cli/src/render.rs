use crate::theme::Theme;
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::collections::BTreeSet;
use std::io::{self, Write};
use tilebot_core::{Color, Direction, Grid, Pose, Position};

/// One drawn board cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub ch: char,
    /// `None` for void cells
    pub tile: Option<Option<Color>>,
    pub star: bool,
    pub robot: bool,
}

pub fn robot_char(direction: Direction) -> char {
    match direction {
        Direction::Up => '^',
        Direction::Right => '>',
        Direction::Down => 'v',
        Direction::Left => '<',
    }
}

/// Lay out a board, marking `stars` and the robot at `robot`
pub fn frame(grid: &Grid, stars: &BTreeSet<Position>, robot: Option<Pose>) -> Vec<Vec<Glyph>> {
    (0..grid.height())
        .map(|y| {
            (0..grid.width())
                .map(|x| {
                    let pos = Position::new(x, y);
                    let tile = grid.get(pos).map(|t| t.color);
                    let star = stars.contains(&pos);
                    let robot = robot.filter(|p| p.position == pos);
                    let ch = match (robot, tile) {
                        (Some(pose), _) => robot_char(pose.direction),
                        (None, None) => ' ',
                        (None, Some(_)) if star => '*',
                        (None, Some(Some(color))) => color.code(),
                        (None, Some(None)) => '.',
                    };
                    Glyph {
                        ch,
                        tile,
                        star,
                        robot: robot.is_some(),
                    }
                })
                .collect()
        })
        .collect()
}

/// Columns and rows that hold at least one tile
fn occupied(frame: &[Vec<Glyph>]) -> (Vec<usize>, Vec<usize>) {
    let rows: Vec<usize> = (0..frame.len())
        .filter(|&y| frame[y].iter().any(|g| g.tile.is_some()))
        .collect();
    let width = frame.first().map_or(0, Vec::len);
    let cols: Vec<usize> = (0..width)
        .filter(|&x| frame.iter().any(|row| row[x].tile.is_some()))
        .collect();
    (cols, rows)
}

/// Plain-text board cropped to the tiles
pub fn plain(frame: &[Vec<Glyph>]) -> String {
    let (cols, rows) = occupied(frame);
    let (Some(&x0), Some(&x1)) = (cols.first(), cols.last()) else {
        return String::new();
    };
    let mut out = String::new();
    for &y in &rows {
        let line: String = frame[y][x0..=x1].iter().map(|g| g.ch).collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Draw a board with terminal colours, cropped to the tiles
pub fn draw<W: Write>(out: &mut W, frame: &[Vec<Glyph>], theme: &Theme) -> io::Result<()> {
    let (cols, rows) = occupied(frame);
    let (Some(&x0), Some(&x1)) = (cols.first(), cols.last()) else {
        return Ok(());
    };
    for &y in &rows {
        for glyph in &frame[y][x0..=x1] {
            match glyph.tile {
                None => queue!(out, ResetColor, Print("   "))?,
                Some(color) => {
                    let fg = if glyph.robot {
                        theme.robot
                    } else if glyph.star {
                        theme.star
                    } else {
                        theme.fg
                    };
                    let ch = if glyph.robot || glyph.star { glyph.ch } else { ' ' };
                    queue!(
                        out,
                        SetBackgroundColor(theme.tile(color)),
                        SetForegroundColor(fg),
                        Print(format!(" {} ", ch))
                    )?;
                }
            }
        }
        queue!(out, ResetColor, Print("\n"))?;
    }
    out.flush()
}

/// Clear the screen before the next animation frame
pub fn clear<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))
}
