use bytemuck::{Pod, Zeroable};

use crate::command::UniformValue;
use crate::registry::{properties, PropertyId};

/// Globals block shared by every full-screen pass. Mirrors `Globals` in the WGSL program.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OutlineUniforms {
    pub outline_color: [f32; 4],
    pub outline_width: f32,
    pub step_width: f32,
    pub axis_width: [f32; 2],
}

unsafe impl Zeroable for OutlineUniforms {}
unsafe impl Pod for OutlineUniforms {}

impl Default for OutlineUniforms {
    fn default() -> Self {
        Self {
            outline_color: [1.0; 4],
            outline_width: 1.0,
            step_width: 1.5,
            axis_width: [0.0; 2],
        }
    }
}

impl OutlineUniforms {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Stores a global by property; returns false for properties the block lacks.
    pub fn apply(&mut self, property: PropertyId, value: UniformValue) -> bool {
        let props = properties();
        let v = value.to_vec4();
        if property == props.outline_color {
            self.outline_color = v;
        } else if property == props.outline_width {
            self.outline_width = v[0];
        } else if property == props.step_width {
            self.step_width = v[0];
        } else if property == props.axis_width {
            self.axis_width = [v[0], v[1]];
        } else {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinearColor;

    #[test]
    fn layout_matches_wgsl_block() {
        assert_eq!(OutlineUniforms::SIZE, 32);
        assert_eq!(std::mem::align_of::<OutlineUniforms>(), 16);
    }

    #[test]
    fn apply_routes_properties_to_fields() {
        let props = properties();
        let mut uniforms = OutlineUniforms::default();
        assert!(uniforms.apply(
            props.outline_color,
            UniformValue::Color(LinearColor::new(0.1, 0.2, 0.3, 0.4))
        ));
        assert!(uniforms.apply(props.axis_width, UniformValue::Vector([4.5, 0.0, 0.0, 0.0])));
        assert!(uniforms.apply(props.step_width, UniformValue::Float(2.5)));
        assert!(!uniforms.apply(props.mask_buffer, UniformValue::Float(1.0)));
        assert_eq!(uniforms.outline_color, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(uniforms.axis_width, [4.5, 0.0]);
        assert_eq!(uniforms.step_width, 2.5);
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), 32);
    }
}
