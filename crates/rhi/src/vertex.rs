//! Vertex formats and input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Homogeneous position plus RGBA color.
///
/// - location 0: position (vec4), offset 0
/// - location 1: color (vec4), offset 16
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: Vec4,
    pub color: Vec4,
}

impl QuadVertex {
    #[inline]
    pub const fn new(position: Vec4, color: Vec4) -> Self {
        Self { position, color }
    }

    /// Binding 0, advanced per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(QuadVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(QuadVertex, color) as u32,
            },
        ]
    }
}

/// Quad drawn as a four-vertex triangle strip.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex::new(
        Vec4::new(-0.7, -0.7, 0.0, 1.0),
        Vec4::new(1.0, 0.0, 0.0, 0.0),
    ),
    QuadVertex::new(
        Vec4::new(-0.7, 0.7, 0.0, 1.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
    ),
    QuadVertex::new(
        Vec4::new(0.7, -0.7, 0.0, 1.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
    ),
    QuadVertex::new(
        Vec4::new(0.7, 0.7, 0.0, 1.0),
        Vec4::new(0.3, 0.3, 0.3, 0.0),
    ),
];

/// Homogeneous position plus texture coordinate, tightly packed.
///
/// - location 0: position (vec4), offset 0
/// - location 1: uv (vec2), offset 16
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 4],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, 0.0, 1.0],
            uv: [u, v],
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(TexturedVertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(TexturedVertex, uv) as u32,
            },
        ]
    }
}

/// Textured quad as two triangles of a triangle list. `uv` (0, 0) is the
/// top-left texel.
pub const TEXTURED_QUAD_VERTICES: [TexturedVertex; 6] = [
    TexturedVertex::new(-0.7, -0.7, 0.0, 0.0),
    TexturedVertex::new(-0.7, 0.7, 0.0, 1.0),
    TexturedVertex::new(0.7, -0.7, 1.0, 0.0),
    TexturedVertex::new(0.7, -0.7, 1.0, 0.0),
    TexturedVertex::new(-0.7, 0.7, 0.0, 1.0),
    TexturedVertex::new(0.7, 0.7, 1.0, 1.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_vertex_layout() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 32);
        assert_eq!(QuadVertex::binding_description().stride, 32);
        assert_eq!(
            QuadVertex::binding_description().input_rate,
            vk::VertexInputRate::VERTEX
        );
    }

    #[test]
    fn test_quad_vertex_attributes() {
        let attrs = QuadVertex::attribute_descriptions();
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].offset, 16);
        assert!(
            attrs
                .iter()
                .all(|a| a.format == vk::Format::R32G32B32A32_SFLOAT && a.binding == 0)
        );
    }

    #[test]
    fn test_quad_vertices_cover_symmetric_square() {
        assert_eq!(QUAD_VERTICES.len(), 4);
        for v in &QUAD_VERTICES {
            assert_eq!(v.position.x.abs(), 0.7);
            assert_eq!(v.position.y.abs(), 0.7);
            assert_eq!(v.position.w, 1.0);
        }
    }

    #[test]
    fn test_quad_vertices_cast_to_bytes() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 4 * 32);
    }

    #[test]
    fn test_textured_vertex_layout() {
        assert_eq!(std::mem::size_of::<TexturedVertex>(), 24);
        assert_eq!(TexturedVertex::binding_description().stride, 24);

        let attrs = TexturedVertex::attribute_descriptions();
        assert_eq!((attrs[0].location, attrs[0].offset), (0, 0));
        assert_eq!(attrs[0].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!((attrs[1].location, attrs[1].offset), (1, 16));
        assert_eq!(attrs[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_textured_quad_is_two_triangles() {
        assert_eq!(TEXTURED_QUAD_VERTICES.len(), 6);
        let bytes: &[u8] = bytemuck::cast_slice(&TEXTURED_QUAD_VERTICES);
        assert_eq!(bytes.len(), 6 * 24);

        for v in &TEXTURED_QUAD_VERTICES {
            assert_eq!(v.position[0].abs(), 0.7);
            assert_eq!(v.position[1].abs(), 0.7);
            assert_eq!(v.position[2], 0.0);
            assert_eq!(v.position[3], 1.0);
        }
    }

    #[test]
    fn test_textured_quad_uv_follows_position() {
        // Left edge samples u = 0 and the top edge v = 0
        for v in &TEXTURED_QUAD_VERTICES {
            let expected_u = if v.position[0] < 0.0 { 0.0 } else { 1.0 };
            let expected_v = if v.position[1] < 0.0 { 0.0 } else { 1.0 };
            assert_eq!(v.uv, [expected_u, expected_v]);
        }
    }
}
