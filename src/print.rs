//! Saving an image of the map.
//!
//! Printing takes a screenshot of the window with the map controls hidden, crops it to the
//! map (or to an A4-shaped region of it) and writes a PNG file.

use egui::{ColorImage, Rect, ViewportCommand};
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name of the written file.
pub const FILE_NAME: &str = "SwissDataCube_print";

/// Errors raised while printing.
#[derive(Error, Debug)]
pub enum PrintError {
    /// A print is already in progress.
    #[error("A print is already in progress")]
    Busy,

    /// The screenshot does not overlap the map.
    #[error("The captured region is empty")]
    EmptyCapture,

    /// The image could not be encoded or written.
    #[error("Unable to write the print image")]
    Image(#[from] image::ImageError),
}

/// Shape of the printed region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintMode {
    /// The map as it is on screen.
    Current,
    /// The largest A4 portrait region centered on the map.
    A4Portrait,
    /// The largest A4 landscape region centered on the map.
    A4Landscape,
}

impl PrintMode {
    /// Every mode, in menu order.
    pub const ALL: [PrintMode; 3] = [
        PrintMode::Current,
        PrintMode::A4Portrait,
        PrintMode::A4Landscape,
    ];

    /// Menu label.
    pub fn title(&self) -> &'static str {
        match self {
            PrintMode::Current => "Current size",
            PrintMode::A4Portrait => "A4 Portrait",
            PrintMode::A4Landscape => "A4 Landscape",
        }
    }

    /// Width over height of the printed region, `None` to keep the map's.
    fn aspect(&self) -> Option<f32> {
        match self {
            PrintMode::Current => None,
            PrintMode::A4Portrait => Some(210.0 / 297.0),
            PrintMode::A4Landscape => Some(297.0 / 210.0),
        }
    }

    /// The region of `map_rect` to print.
    pub fn crop_rect(&self, map_rect: Rect) -> Rect {
        let Some(aspect) = self.aspect() else {
            return map_rect;
        };
        let mut size = map_rect.size();
        if size.x / size.y > aspect {
            size.x = size.y * aspect;
        } else {
            size.y = size.x / aspect;
        }
        Rect::from_center_size(map_rect.center(), size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum PrintState {
    Idle,
    /// Controls are hidden in the frame being built; the screenshot is requested at its end.
    Pending(PrintMode),
    Capturing(PrintMode),
}

/// Drives a print from request to saved file.
pub struct PrintControl {
    state: PrintState,
    output_dir: PathBuf,
}

impl Default for PrintControl {
    fn default() -> Self {
        Self::new(".")
    }
}

impl PrintControl {
    /// Creates a control writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: PrintState::Idle,
            output_dir: output_dir.into(),
        }
    }

    /// Where the image will be written.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{FILE_NAME}.png"))
    }

    /// Starts a print.
    pub fn request(&mut self, mode: PrintMode) -> Result<(), PrintError> {
        if self.state != PrintState::Idle {
            return Err(PrintError::Busy);
        }
        info!("Printing the map ({})", mode.title());
        self.state = PrintState::Pending(mode);
        Ok(())
    }

    /// Whether map controls must stay off screen.
    pub fn hides_controls(&self) -> bool {
        self.state != PrintState::Idle
    }

    /// Advances the print. Call once per frame after the map has been drawn; returns the
    /// outcome once the screenshot has been processed.
    pub fn poll(
        &mut self,
        ctx: &egui::Context,
        map_rect: Rect,
    ) -> Option<Result<PathBuf, PrintError>> {
        match self.state {
            PrintState::Idle => None,
            PrintState::Pending(mode) => {
                ctx.send_viewport_cmd(ViewportCommand::Screenshot(egui::UserData::default()));
                self.state = PrintState::Capturing(mode);
                ctx.request_repaint();
                None
            }
            PrintState::Capturing(mode) => {
                let (screenshot, pixels_per_point) = ctx.input(|i| {
                    let image = i.raw.events.iter().find_map(|e| match e {
                        egui::Event::Screenshot { image, .. } => Some(image.clone()),
                        _ => None,
                    });
                    (image, i.pixels_per_point())
                });
                let Some(screenshot) = screenshot else {
                    ctx.request_repaint();
                    return None;
                };
                self.state = PrintState::Idle;
                let region = mode.crop_rect(map_rect);
                Some(save_image(
                    &screenshot,
                    region,
                    pixels_per_point,
                    &self.output_path(),
                ))
            }
        }
    }
}

/// Crops `region` (in points) out of `screenshot` and writes it as a PNG.
pub fn save_image(
    screenshot: &ColorImage,
    region: Rect,
    pixels_per_point: f32,
    path: &Path,
) -> Result<PathBuf, PrintError> {
    let [width, height] = screenshot.size;
    let bounds = Rect::from_min_size(
        egui::Pos2::ZERO,
        egui::vec2(width as f32, height as f32) / pixels_per_point,
    );
    let region = region.intersect(bounds);
    if !region.is_positive() {
        return Err(PrintError::EmptyCapture);
    }

    let cropped = screenshot.region(&region, Some(pixels_per_point));
    let [w, h] = cropped.size;
    let bytes: Vec<u8> = cropped.pixels.iter().flat_map(|c| c.to_array()).collect();
    let buffer = image::RgbaImage::from_raw(w as u32, h as u32, bytes)
        .ok_or(PrintError::EmptyCapture)?;
    buffer.save(path)?;

    info!("Saved map print to {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    const EPSILON: f32 = 1e-3;

    fn solid(size: [usize; 2], rgba: [u8; 4]) -> ColorImage {
        let bytes: Vec<u8> = rgba.repeat(size[0] * size[1]);
        ColorImage::from_rgba_unmultiplied(size, &bytes)
    }

    fn map_rect() -> Rect {
        Rect::from_min_size(pos2(0.0, 40.0), vec2(800.0, 600.0))
    }

    #[test]
    fn current_mode_keeps_the_map() {
        assert_eq!(PrintMode::Current.crop_rect(map_rect()), map_rect());
    }

    #[test]
    fn a4_modes_fit_inside_the_map() {
        let portrait = PrintMode::A4Portrait.crop_rect(map_rect());
        assert!((portrait.height() - 600.0).abs() < EPSILON);
        assert!((portrait.width() - 600.0 * 210.0 / 297.0).abs() < EPSILON);
        assert!((portrait.center().x - 400.0).abs() < EPSILON);

        let landscape = PrintMode::A4Landscape.crop_rect(map_rect());
        assert!((landscape.width() - 800.0).abs() < EPSILON);
        assert!((landscape.height() - 800.0 * 210.0 / 297.0).abs() < EPSILON);
        assert!(map_rect().contains_rect(landscape));
    }

    #[test]
    fn second_request_is_rejected_while_busy() {
        let mut control = PrintControl::new(std::env::temp_dir());
        assert!(!control.hides_controls());
        control.request(PrintMode::Current).unwrap();
        assert!(control.hides_controls());
        assert!(matches!(
            control.request(PrintMode::A4Portrait),
            Err(PrintError::Busy)
        ));
    }

    #[test]
    fn output_file_name() {
        let control = PrintControl::new("/tmp/prints");
        assert_eq!(
            control.output_path(),
            PathBuf::from("/tmp/prints/SwissDataCube_print.png")
        );
    }

    #[test]
    fn saves_cropped_png() {
        let screenshot = solid([40, 30], [10, 20, 30, 255]);
        let path = std::env::temp_dir().join("sdc_map_viewer_print_test.png");
        let region = Rect::from_min_size(pos2(5.0, 5.0), vec2(10.0, 8.0));

        save_image(&screenshot, region, 2.0, &path).unwrap();
        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (20, 16));
        assert_eq!(written.get_pixel(0, 0).0, [10, 20, 30, 255]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn region_outside_the_screenshot_is_empty() {
        let screenshot = solid([40, 30], [0, 0, 0, 255]);
        let region = Rect::from_min_size(pos2(100.0, 100.0), vec2(10.0, 10.0));
        assert!(matches!(
            save_image(&screenshot, region, 1.0, Path::new("unused.png")),
            Err(PrintError::EmptyCapture)
        ));
    }
}
