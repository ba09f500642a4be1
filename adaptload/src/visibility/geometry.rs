//! Rectangles and viewport geometry.
//!
//! Element rectangles are in document coordinates (CSS pixels from the top
//! left of the page). The viewport is the visible window onto the document.

/// Axis-aligned rectangle in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Grow on every side by `margin` pixels.
    pub fn expand(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Overlapping region, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right < left || bottom < top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }
}

/// The visible window onto the document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            width,
            height,
        }
    }

    pub fn scrolled_to(mut self, scroll_y: f64) -> Self {
        self.scroll_y = scroll_y;
        self
    }

    /// The viewport as a document-space rectangle.
    pub fn rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }

    /// Document y coordinate of the bottom edge.
    pub fn bottom(&self) -> f64 {
        self.scroll_y + self.height
    }
}

/// Fraction of `element` inside the viewport grown by `margin`.
///
/// Zero-area elements report `1.0` when their position lies inside the grown
/// viewport and `0.0` otherwise.
pub fn intersection_ratio(element: &Rect, viewport: &Viewport, margin: f64) -> f64 {
    let root = viewport.rect().expand(margin);
    match element.intersection(&root) {
        None => 0.0,
        Some(overlap) => {
            let area = element.area();
            if area <= 0.0 {
                1.0
            } else {
                (overlap.area() / area).clamp(0.0, 1.0)
            }
        }
    }
}
