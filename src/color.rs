// Clear color - RGBA in [0, 1], set from 8-bit components

use glam::Vec4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor(Vec4);

impl ClearColor {
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0)
    }

    pub fn to_array(self) -> [f32; 4] {
        self.0.to_array()
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self(Vec4::new(0.25, 0.5, 0.1, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalizes_bytes() {
        let color = ClearColor::from_rgba8(19, 61, 102, 255).to_array();
        assert_relative_eq!(color[0], 19.0 / 255.0);
        assert_relative_eq!(color[1], 61.0 / 255.0);
        assert_relative_eq!(color[2], 102.0 / 255.0);
        assert_relative_eq!(color[3], 1.0);
    }

    #[test]
    fn extremes_map_to_unit_range() {
        assert_eq!(ClearColor::from_rgba8(0, 0, 0, 0).to_array(), [0.0; 4]);
        assert_eq!(ClearColor::from_rgba8(255, 255, 255, 255).to_array(), [1.0; 4]);
    }
}
