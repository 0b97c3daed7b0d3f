use crate::world::position::Position;
use serde::Deserialize;

/// Half-extents of the area a creature observes.
///
/// `max_x`/`max_y` bound spectator queries and monster awareness, the client
/// extents bound what a player can actually be shown and how far objects can
/// be thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewportSize {
    pub max_x: u16,
    pub max_y: u16,
    pub client_x: u16,
    pub client_y: u16,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            max_x: 11,
            max_y: 11,
            client_x: 8,
            client_y: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub center: Position,
    pub range_x: u16,
    pub range_y: u16,
}

impl Viewport {
    pub fn from_center(center: Position, range_x: u16, range_y: u16) -> Self {
        Self {
            center,
            range_x,
            range_y,
        }
    }

    /// Awareness viewport used by monsters and spectator queries.
    pub fn awareness(center: Position, size: ViewportSize) -> Self {
        Self::from_center(center, size.max_x, size.max_y)
    }

    /// Whether `position` is visible from the center.
    ///
    /// Above ground only floors 0..=7 are visible; underground only two
    /// floors up or down. Other floors are shifted by their z offset.
    pub fn contains(&self, position: Position) -> bool {
        if self.center.z <= 7 {
            if position.z > 7 {
                return false;
            }
        } else if self.center.distance_z(position) > 2 {
            return false;
        }

        let offset_z = self.center.offset_z(position);
        let x = i32::from(position.x);
        let y = i32::from(position.y);
        let cx = i32::from(self.center.x);
        let cy = i32::from(self.center.y);
        let rx = i32::from(self.range_x);
        let ry = i32::from(self.range_y);
        x >= cx - rx + offset_z
            && x <= cx + rx + offset_z
            && y >= cy - ry + offset_z
            && y <= cy + ry + offset_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_viewer_ignores_underground() {
        let view = Viewport::awareness(Position::new(100, 100, 7), ViewportSize::default());
        assert!(view.contains(Position::new(111, 89, 7)));
        assert!(!view.contains(Position::new(112, 100, 7)));
        assert!(!view.contains(Position::new(100, 100, 8)));
    }

    #[test]
    fn upper_floors_are_shifted() {
        let view = Viewport::awareness(Position::new(100, 100, 7), ViewportSize::default());
        assert!(view.contains(Position::new(112, 112, 6)));
        assert!(!view.contains(Position::new(112, 112, 7)));
        assert!(!view.contains(Position::new(89, 89, 6)));
    }

    #[test]
    fn underground_sees_two_floors() {
        let view = Viewport::awareness(Position::new(100, 100, 10), ViewportSize::default());
        assert!(view.contains(Position::new(100, 100, 12)));
        assert!(!view.contains(Position::new(100, 100, 13)));
    }
}
