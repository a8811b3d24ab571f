//! Frame annotation
//!
//! Eye boxes are outlined in green. Status lines ("Blinks: N",
//! "DROWSINESS DETECTED!", "Alert Cooldown Active") are written top-left with
//! OpenCV's Hershey font when the `vision` feature is on; without it the
//! status is drawn as colored blocks.

use dms::{DmsAnalysis, OverlayColor};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::ApiError;

fn color(c: OverlayColor) -> Rgb<u8> {
    Rgb(c.rgb())
}

/// Annotate a frame with eye boxes and drowsiness status
pub fn annotate(image: &mut RgbImage, analysis: &DmsAnalysis) -> Result<(), ApiError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(());
    }

    let green = color(OverlayColor::Green);
    for eye in &analysis.eyes {
        let w = (eye.width.round() as u32).max(1);
        let h = (eye.height.round() as u32).max(1);
        let x = eye.x.round() as i32;
        let y = eye.y.round() as i32;
        // Two nested outlines for a 2px border
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), green);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(image, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), green);
        }
    }

    draw_status(image, analysis)
}

#[cfg(feature = "vision")]
mod text {
    use dms::OverlayLine;
    use image::RgbImage;
    use opencv::{
        core::{self, Mat, Point, Scalar},
        imgproc,
        prelude::*,
    };

    use crate::ApiError;

    const TEXT_X: i32 = 10;
    const FIRST_BASELINE: i32 = 30;
    const LINE_SPACING: i32 = 30;
    const FONT_SCALE: f64 = 0.7;
    const THICKNESS: i32 = 2;

    /// Write status lines onto the frame, one per 30px row
    pub fn draw_lines(image: &mut RgbImage, lines: &[OverlayLine]) -> Result<(), ApiError> {
        let (width, height) = image.dimensions();
        let mut canvas = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )
        .map_err(overlay_error)?;
        canvas
            .data_bytes_mut()
            .map_err(overlay_error)?
            .copy_from_slice(image.as_raw());

        // Canvas holds RGB, so scalars are in RGB order too
        for (row, line) in lines.iter().enumerate() {
            let [r, g, b] = line.color.rgb();
            imgproc::put_text(
                &mut canvas,
                &line.text,
                Point::new(TEXT_X, FIRST_BASELINE + row as i32 * LINE_SPACING),
                imgproc::FONT_HERSHEY_SIMPLEX,
                FONT_SCALE,
                Scalar::new(f64::from(r), f64::from(g), f64::from(b), 0.0),
                THICKNESS,
                imgproc::LINE_8,
                false,
            )
            .map_err(overlay_error)?;
        }

        image.copy_from_slice(canvas.data_bytes().map_err(overlay_error)?);
        Ok(())
    }

    fn overlay_error(e: opencv::Error) -> ApiError {
        ApiError::Internal(format!("overlay: {}", e))
    }
}

#[cfg(feature = "vision")]
fn draw_status(image: &mut RgbImage, analysis: &DmsAnalysis) -> Result<(), ApiError> {
    text::draw_lines(image, &analysis.overlay)
}

#[cfg(not(feature = "vision"))]
mod blocks {
    pub const MARGIN: i32 = 10;
    pub const BAR_HEIGHT: u32 = 12;
    pub const TICK_SIZE: u32 = 6;
    pub const MAX_TICKS: u32 = 20;
}

#[cfg(not(feature = "vision"))]
fn draw_status(image: &mut RgbImage, analysis: &DmsAnalysis) -> Result<(), ApiError> {
    use blocks::*;
    use imageproc::drawing::draw_filled_rect_mut;

    let width = image.width();
    let decision = &analysis.decision;
    let status = if decision.is_drowsy {
        OverlayColor::Red
    } else {
        OverlayColor::Green
    };

    // Status bar, full width when drowsy
    let bar_width = if decision.is_drowsy {
        width.saturating_sub(2 * MARGIN as u32).max(1)
    } else {
        (width / 4).max(1)
    };
    draw_filled_rect_mut(
        image,
        Rect::at(MARGIN, MARGIN).of_size(bar_width, BAR_HEIGHT),
        color(status),
    );

    // One tick per blink
    let ticks_y = MARGIN + BAR_HEIGHT as i32 + 4;
    for i in 0..decision.blink_counter.min(MAX_TICKS) {
        let x = MARGIN + (i * (TICK_SIZE + 2)) as i32;
        draw_filled_rect_mut(
            image,
            Rect::at(x, ticks_y).of_size(TICK_SIZE, TICK_SIZE),
            color(status),
        );
    }

    if decision.alert_on_cooldown {
        let strip_y = ticks_y + TICK_SIZE as i32 + 4;
        draw_filled_rect_mut(
            image,
            Rect::at(MARGIN, strip_y).of_size((width / 4).max(1), 4),
            color(OverlayColor::Orange),
        );
    }
    Ok(())
}
