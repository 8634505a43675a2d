use crossterm::style::Color;
use tilebot_core::Color as TileColor;

/// Terminal colours for drawing a board
#[derive(Debug, Clone)]
pub struct Theme {
    /// Text and void cells
    pub fg: Color,
    /// Uncoloured tile background
    pub blank: Color,
    pub red: Color,
    pub green: Color,
    pub blue: Color,
    /// Star glyph colour
    pub star: Color,
    /// Robot glyph colour
    pub robot: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Dark theme (default)
    pub fn dark() -> Self {
        Self {
            fg: Color::Rgb { r: 230, g: 230, b: 240 },
            blank: Color::Rgb { r: 70, g: 75, b: 90 },
            red: Color::Rgb { r: 170, g: 50, b: 60 },
            green: Color::Rgb { r: 40, g: 130, b: 70 },
            blue: Color::Rgb { r: 45, g: 80, b: 170 },
            star: Color::Rgb { r: 255, g: 210, b: 100 },
            robot: Color::Rgb { r: 255, g: 255, b: 255 },
        }
    }

    /// Light theme
    pub fn light() -> Self {
        Self {
            fg: Color::Rgb { r: 30, g: 30, b: 40 },
            blank: Color::Rgb { r: 200, g: 200, b: 210 },
            red: Color::Rgb { r: 235, g: 120, b: 120 },
            green: Color::Rgb { r: 120, g: 200, b: 140 },
            blue: Color::Rgb { r: 120, g: 160, b: 235 },
            star: Color::Rgb { r: 180, g: 120, b: 0 },
            robot: Color::Rgb { r: 0, g: 0, b: 0 },
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "dark" => Some(Self::dark()),
            "light" => Some(Self::light()),
            _ => None,
        }
    }

    /// Background for a tile of the given paint
    pub fn tile(&self, color: Option<TileColor>) -> Color {
        match color {
            Some(TileColor::Red) => self.red,
            Some(TileColor::Green) => self.green,
            Some(TileColor::Blue) => self.blue,
            None => self.blank,
        }
    }
}
