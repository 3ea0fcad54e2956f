use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::{SarError, SarResult};

/// Rectangle of output pixels computed as one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    pub fn new(x0: usize, y0: usize, width: usize, height: usize) -> Self {
        Self { x0, y0, width, height }
    }

    pub fn x_end(&self) -> usize {
        self.x0 + self.width
    }

    pub fn y_end(&self) -> usize {
        self.y0 + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Split an image into full-width tiles of `tile_size` lines; the last tile may be shorter
pub fn full_width_tiles(image_width: usize, image_height: usize, tile_size: usize) -> Vec<TileRect> {
    if tile_size == 0 || image_width == 0 {
        return Vec::new();
    }
    (0..image_height)
        .step_by(tile_size)
        .map(|y0| TileRect::new(0, y0, image_width, tile_size.min(image_height - y0)))
        .collect()
}

/// Cooperative cancellation flag shared between a caller and running tile tasks
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(SarError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> SarResult<()> {
        if self.is_cancelled() {
            Err(SarError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_width_tiles_cover_image() {
        let tiles = full_width_tiles(50, 1001, 400);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[0], TileRect::new(0, 0, 50, 400));
        assert_eq!(tiles[2], TileRect::new(0, 800, 50, 201));
        assert_eq!(tiles.iter().map(|t| t.height).sum::<usize>(), 1001);

        assert!(full_width_tiles(50, 10, 0).is_empty());
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(worker.check().is_ok());

        token.cancel();
        assert!(worker.is_cancelled());
        assert!(matches!(worker.check(), Err(SarError::Cancelled)));
    }
}
