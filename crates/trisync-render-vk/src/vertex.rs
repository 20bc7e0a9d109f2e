// SPDX-License-Identifier: CEPL-1.0
//! Vertex layout and the host-visible vertex buffer.

use std::mem::{offset_of, size_of};

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::error::SetupError;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 4],
}

/// Clockwise in framebuffer space (y down).
pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        pos: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0, 1.0],
    },
    Vertex {
        pos: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0, 1.0],
    },
];

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// First memory type allowed by `type_bits` whose flags contain `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32, SetupError> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or(SetupError::NoMemoryType { type_bits, flags })
}

/// Vertex data uploaded once through a mapped, coherent allocation.
pub struct VertexBuffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    count: u32,
}

impl VertexBuffer {
    pub fn new(
        device: &ash::Device,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        vertices: &[Vertex],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as vk::DeviceSize;

        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&bci, None) }
            .context("failed to create vertex buffer")?;

        let mut vb = VertexBuffer {
            device: device.clone(),
            buffer,
            memory: vk::DeviceMemory::null(),
            count: vertices.len() as u32,
        };

        let req = unsafe { device.get_buffer_memory_requirements(buffer) };
        let mem_type = find_memory_type(
            mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: mem_type,
            ..Default::default()
        };
        vb.memory = unsafe { device.allocate_memory(&mai, None) }
            .context("failed to allocate vertex buffer memory")?;

        unsafe {
            device
                .bind_buffer_memory(buffer, vb.memory, 0)
                .context("bind_buffer_memory")?;
            let ptr = device
                .map_memory(vb.memory, 0, size, vk::MemoryMapFlags::empty())
                .context("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            device.unmap_memory(vb.memory);
        }

        debug!("vertex buffer: {} vertices, {} bytes", vb.count, size);
        Ok(vb)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.count
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}
