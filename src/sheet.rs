//! Printable contact sheets
//!
//! Repeats a finished photo at its physical print size on a sheet of
//! photo paper, with thin guides for cutting.

use crate::composite::flatten_onto_white;
use crate::error::{PhotoError, Result};
use crate::specs::{PhotoSpec, PRINT_DPI};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Blank border kept on every side of the sheet, in pixels at 300 dpi (0.1 in)
pub const SHEET_MARGIN_PX: u32 = 30;

/// Space between neighbouring tiles, in pixels at 300 dpi (0.05 in)
pub const TILE_GAP_PX: u32 = 15;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const GUIDE: Rgb<u8> = Rgb([200, 200, 200]);

/// Photo paper sizes at 300 dpi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    /// 6 x 4 in, landscape
    #[default]
    #[serde(rename = "4x6")]
    FourBySix,
    /// 7 x 5 in, landscape
    #[serde(rename = "5x7")]
    FiveBySeven,
    #[serde(rename = "a4", alias = "A4")]
    A4,
    #[serde(rename = "letter")]
    Letter,
}

impl PaperSize {
    /// Sheet size in pixels `(width, height)`
    #[must_use]
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::FourBySix => (1800, 1200),
            Self::FiveBySeven => (2100, 1500),
            Self::A4 => (2480, 3508),
            Self::Letter => (2550, 3300),
        }
    }

    #[must_use]
    pub fn all() -> [Self; 4] {
        [Self::FourBySix, Self::FiveBySeven, Self::A4, Self::Letter]
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FourBySix => "4x6",
            Self::FiveBySeven => "5x7",
            Self::A4 => "a4",
            Self::Letter => "letter",
        };
        f.write_str(name)
    }
}

impl FromStr for PaperSize {
    type Err = PhotoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4x6" | "6x4" => Ok(Self::FourBySix),
            "5x7" | "7x5" => Ok(Self::FiveBySeven),
            "a4" => Ok(Self::A4),
            "letter" => Ok(Self::Letter),
            other => Err(PhotoError::invalid_input(format!(
                "Unknown paper size '{other}' (expected 4x6, 5x7, a4 or letter)"
            ))),
        }
    }
}

/// Where tiles go on the sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetLayout {
    pub paper: (u32, u32),
    pub tile: (u32, u32),
    pub columns: u32,
    pub rows: u32,
    /// Space between neighbouring tiles
    pub gap: u32,
    /// Top-left corner of the first tile
    pub origin: (u32, u32),
}

impl SheetLayout {
    /// Fit as many tiles as possible, centered on the paper
    ///
    /// Tiles normally keep [`SHEET_MARGIN_PX`] from the paper edge and
    /// [`TILE_GAP_PX`] between each other. When butting tiles edge to edge
    /// fits more of them (six 2x2 in photos on 4x6 paper), the sheet is laid
    /// out that way and neighbours share their cut lines.
    ///
    /// # Errors
    /// Fails when not even one tile fits on the paper.
    pub fn compute(paper: PaperSize, tile: (u32, u32)) -> Result<Self> {
        let (tile_w, tile_h) = tile;
        if tile_w == 0 || tile_h == 0 {
            return Err(PhotoError::invalid_input("Tile size must be positive"));
        }

        let padded = Self::grid(paper, tile, SHEET_MARGIN_PX, TILE_GAP_PX);
        let edge_to_edge = Self::grid(paper, tile, 0, 0);
        let layout = match (padded, edge_to_edge) {
            (Some(padded), Some(tight)) if tight.count() > padded.count() => tight,
            (Some(padded), _) => padded,
            (None, tight) => tight.ok_or_else(|| {
                PhotoError::invalid_input(format!(
                    "A {tile_w}x{tile_h} photo does not fit on {paper} paper"
                ))
            })?,
        };
        Ok(layout)
    }

    fn grid(paper: PaperSize, (tile_w, tile_h): (u32, u32), margin: u32, gap: u32) -> Option<Self> {
        let (paper_w, paper_h) = paper.dimensions();
        let fit = |available: u32, side: u32| {
            available
                .checked_sub(2 * margin)
                .map_or(0, |usable| (usable + gap) / (side + gap))
        };
        let columns = fit(paper_w, tile_w);
        let rows = fit(paper_h, tile_h);
        if columns == 0 || rows == 0 {
            return None;
        }

        let grid_w = columns * tile_w + (columns - 1) * gap;
        let grid_h = rows * tile_h + (rows - 1) * gap;
        Some(Self {
            paper: (paper_w, paper_h),
            tile: (tile_w, tile_h),
            columns,
            rows,
            gap,
            origin: ((paper_w - grid_w) / 2, (paper_h - grid_h) / 2),
        })
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.columns * self.rows
    }

    /// Top-left corners of every tile, row by row
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.columns).map(move |col| {
                (
                    self.origin.0 + col * (self.tile.0 + self.gap),
                    self.origin.1 + row * (self.tile.1 + self.gap),
                )
            })
        })
    }
}

/// Printed tile size: the preset's physical size at 300 dpi when it has one,
/// otherwise the photo's pixel size
#[must_use]
pub fn tile_size(spec: Option<&PhotoSpec>, photo_dimensions: (u32, u32)) -> (u32, u32) {
    spec.and_then(|spec| spec.print_size_px(PRINT_DPI))
        .unwrap_or(photo_dimensions)
}

/// Lay `photo` out on `paper`
///
/// # Errors
/// When the tile does not fit on the paper.
pub fn render_sheet(photo: &DynamicImage, tile: (u32, u32), paper: PaperSize) -> Result<(RgbImage, SheetLayout)> {
    let layout = SheetLayout::compute(paper, tile)?;

    let flat = flatten_onto_white(photo);
    let tile_image = if flat.dimensions() == tile {
        flat
    } else {
        imageops::resize(&flat, tile.0, tile.1, imageops::FilterType::Lanczos3)
    };

    let (paper_w, paper_h) = layout.paper;
    let mut sheet = RgbImage::from_pixel(paper_w, paper_h, PAPER);
    for (x, y) in layout.positions() {
        imageops::replace(&mut sheet, &tile_image, i64::from(x), i64::from(y));
        draw_guide(&mut sheet, x, y, tile);
    }

    log::debug!(
        "Rendered {} sheet: {}x{} tiles of {}x{}",
        paper,
        layout.columns,
        layout.rows,
        tile.0,
        tile.1
    );
    Ok((sheet, layout))
}

/// 1 px rectangle just outside the tile, clamped to the sheet edge
fn draw_guide(sheet: &mut RgbImage, x: u32, y: u32, (tile_w, tile_h): (u32, u32)) {
    let left = x.saturating_sub(1);
    let top = y.saturating_sub(1);
    let right = (x + tile_w).min(sheet.width() - 1);
    let bottom = (y + tile_h).min(sheet.height() - 1);

    for px in left..=right {
        sheet.put_pixel(px, top, GUIDE);
        sheet.put_pixel(px, bottom, GUIDE);
    }
    for py in top..=bottom {
        sheet.put_pixel(left, py, GUIDE);
        sheet.put_pixel(right, py, GUIDE);
    }
}
