use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Clip-space corner plus the plane coordinate the fragment program samples.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Full-viewport quad as two counter-clockwise triangles. `uv` is `(0, 0)` at
/// the bottom-left corner, matching the CPU reference in `field.rs`.
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 1.0] },
];

const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
];

impl QuadVertex {
    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

pub(crate) fn create_quad_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("silk quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_area(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
        (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
    }

    #[test]
    fn quad_covers_the_viewport_with_counter_clockwise_triangles() {
        let mut area = 0.0;
        for triangle in QUAD_VERTICES.chunks(3) {
            let doubled = signed_area(triangle[0].position, triangle[1].position, triangle[2].position);
            assert!(doubled > 0.0);
            area += doubled / 2.0;
        }
        assert_eq!(area, 4.0);
    }

    #[test]
    fn uv_follows_clip_position() {
        for vertex in QUAD_VERTICES {
            assert_eq!(vertex.uv[0], (vertex.position[0] + 1.0) / 2.0);
            assert_eq!(vertex.uv[1], (vertex.position[1] + 1.0) / 2.0);
        }
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
        assert_eq!(QuadVertex::layout().attributes[1].offset, 8);
    }
}
