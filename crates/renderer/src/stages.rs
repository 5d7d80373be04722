//! Draw stages: what gets drawn inside the render pass after the clear.
//!
//! A stage is selected once from the configured [`DrawVariant`] and composed
//! into the renderer; the render pass, clear and presentation around it stay
//! the same for every stage.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkpresent_core::{DrawVariant, RendererConfig};
use vkpresent_rhi::buffer::{Buffer, BufferUsage};
use vkpresent_rhi::command::CommandBuffer;
use vkpresent_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, combined_image_sampler_binding,
    combined_image_sampler_write, image_info, pool_sizes_for, update_descriptor_sets,
};
use vkpresent_rhi::device::Device;
use vkpresent_rhi::pipeline::{Pipeline, PipelineDesc, PipelineLayout};
use vkpresent_rhi::render_pass::RenderPass;
use vkpresent_rhi::sampler::{Sampler, linear_clamp_info};
use vkpresent_rhi::shader::{Shader, ShaderStage};
use vkpresent_rhi::texture::Texture;
use vkpresent_rhi::vertex::{QUAD_VERTICES, QuadVertex, TEXTURED_QUAD_VERTICES, TexturedVertex};
use vkpresent_rhi::{RhiError, RhiResult};

/// One composable piece of per-frame drawing.
pub trait DrawStage {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// (Re)creates everything that depends on the render pass.
    ///
    /// Called after every rebuild that produced images; the device is idle.
    fn prepare(
        &mut self,
        device: &Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<()>;

    /// Records draw commands. Called inside the render pass.
    fn draw(&self, cmd: &CommandBuffer, extent: vk::Extent2D);
}

/// Viewport covering the whole target with the default depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole target.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Fails with [`RhiError::ShaderError`] when the configured variant needs
/// SPIR-V files that are not there.
pub fn check_shader_files(config: &RendererConfig) -> RhiResult<()> {
    if !config.draw.needs_shaders() {
        return Ok(());
    }
    for path in [&config.vertex_shader, &config.fragment_shader] {
        if !path.is_file() {
            return Err(RhiError::ShaderError(format!(
                "{:?} draw needs the SPIR-V file {}, which does not exist",
                config.draw,
                path.display()
            )));
        }
    }
    Ok(())
}

/// Builds the stage for `config.draw`.
pub fn create_stage(device: &Arc<Device>, config: &RendererConfig) -> RhiResult<Box<dyn DrawStage>> {
    check_shader_files(config)?;

    let stage: Box<dyn DrawStage> = match config.draw {
        DrawVariant::Clear => Box::new(ClearStage),
        DrawVariant::Triangle => Box::new(TriangleStage::new(
            device,
            &config.vertex_shader,
            &config.fragment_shader,
        )?),
        DrawVariant::VertexAttributes => Box::new(VertexAttributeStage::new(
            device,
            &config.vertex_shader,
            &config.fragment_shader,
        )?),
        DrawVariant::TexturedQuad => Box::new(TexturedQuadStage::new(
            device,
            &config.vertex_shader,
            &config.fragment_shader,
        )?),
    };
    info!("Draw stage: {}", stage.name());
    Ok(stage)
}

/// Draws nothing; the frame is just the render pass clear.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearStage;

impl DrawStage for ClearStage {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn prepare(&mut self, _: &Arc<Device>, _: &RenderPass, _: vk::Extent2D) -> RhiResult<()> {
        Ok(())
    }

    fn draw(&self, _: &CommandBuffer, _: vk::Extent2D) {}
}

/// Shader pair, layout, and the pipeline built from them for the current
/// render pass.
struct ShaderPipeline {
    vertex_shader: Shader,
    fragment_shader: Shader,
    layout: PipelineLayout,
    pipeline: Option<Pipeline>,
}

impl ShaderPipeline {
    fn load(
        device: &Arc<Device>,
        vertex_path: &Path,
        fragment_path: &Path,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        Ok(Self {
            vertex_shader: Shader::from_spirv_file(device.clone(), vertex_path, ShaderStage::Vertex)?,
            fragment_shader: Shader::from_spirv_file(
                device.clone(),
                fragment_path,
                ShaderStage::Fragment,
            )?,
            layout: PipelineLayout::new(device.clone(), set_layouts)?,
            pipeline: None,
        })
    }

    fn rebuild(
        &mut self,
        device: &Arc<Device>,
        render_pass: &RenderPass,
        vertex_bindings: &[vk::VertexInputBindingDescription],
        vertex_attributes: &[vk::VertexInputAttributeDescription],
        topology: vk::PrimitiveTopology,
    ) -> RhiResult<()> {
        // The previous pipeline belongs to the destroyed render pass
        self.pipeline = None;

        let desc = PipelineDesc {
            vertex_shader: &self.vertex_shader,
            fragment_shader: &self.fragment_shader,
            vertex_bindings,
            vertex_attributes,
            topology,
        };
        self.pipeline = Some(Pipeline::new(
            device.clone(),
            &self.layout,
            render_pass,
            &desc,
        )?);
        Ok(())
    }

    /// Binds the pipeline and sets the dynamic state. `false` before the
    /// first successful rebuild.
    fn bind(&self, cmd: &CommandBuffer, extent: vk::Extent2D) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return false;
        };
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));
        true
    }
}

/// A single triangle whose vertices come from the vertex shader.
pub struct TriangleStage {
    pipeline: ShaderPipeline,
}

impl TriangleStage {
    pub const VERTEX_COUNT: u32 = 3;

    pub fn new(device: &Arc<Device>, vertex_shader: &Path, fragment_shader: &Path) -> RhiResult<Self> {
        Ok(Self {
            pipeline: ShaderPipeline::load(device, vertex_shader, fragment_shader, &[])?,
        })
    }
}

impl DrawStage for TriangleStage {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn prepare(
        &mut self,
        device: &Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        self.pipeline.rebuild(
            device,
            render_pass,
            &[],
            &[],
            vk::PrimitiveTopology::TRIANGLE_LIST,
        )?;
        debug!(
            "Triangle stage prepared for {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    fn draw(&self, cmd: &CommandBuffer, extent: vk::Extent2D) {
        if self.pipeline.bind(cmd, extent) {
            cmd.draw(Self::VERTEX_COUNT, 1, 0, 0);
        }
    }
}

/// A colored quad fed from a device-local vertex buffer.
pub struct VertexAttributeStage {
    pipeline: ShaderPipeline,
    vertex_buffer: Buffer,
}

impl VertexAttributeStage {
    pub const VERTEX_COUNT: u32 = QUAD_VERTICES.len() as u32;

    pub fn new(device: &Arc<Device>, vertex_shader: &Path, fragment_shader: &Path) -> RhiResult<Self> {
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;

        Ok(Self {
            pipeline: ShaderPipeline::load(device, vertex_shader, fragment_shader, &[])?,
            vertex_buffer,
        })
    }
}

impl DrawStage for VertexAttributeStage {
    fn name(&self) -> &'static str {
        "vertex_attributes"
    }

    fn prepare(
        &mut self,
        device: &Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        self.pipeline.rebuild(
            device,
            render_pass,
            &[QuadVertex::binding_description()],
            &QuadVertex::attribute_descriptions(),
            vk::PrimitiveTopology::TRIANGLE_STRIP,
        )?;
        debug!(
            "Vertex attribute stage prepared for {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    fn draw(&self, cmd: &CommandBuffer, extent: vk::Extent2D) {
        if self.pipeline.bind(cmd, extent) {
            cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
            cmd.draw(Self::VERTEX_COUNT, 1, 0, 0);
        }
    }
}

/// Tightly packed RGBA8 checkerboard of `cell`-sized squares, starting with
/// `first` in the top-left corner.
pub fn checkerboard(extent: vk::Extent2D, cell: u32, first: [u8; 4], second: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity(extent.width as usize * extent.height as usize * 4);
    for y in 0..extent.height {
        for x in 0..extent.width {
            let color = if (x / cell + y / cell) % 2 == 0 {
                first
            } else {
                second
            };
            pixels.extend_from_slice(&color);
        }
    }
    pixels
}

/// A quad sampling a generated checkerboard texture.
///
/// The texture, sampler and descriptor set are created once; only the
/// pipeline follows the render pass.
pub struct TexturedQuadStage {
    pipeline: ShaderPipeline,
    // Kept alive for the descriptor set; dropped after the pipeline
    _descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    _set_layout: DescriptorSetLayout,
    _sampler: Sampler,
    _texture: Texture,
    vertex_buffer: Buffer,
}

impl TexturedQuadStage {
    pub const VERTEX_COUNT: u32 = TEXTURED_QUAD_VERTICES.len() as u32;
    pub const TEXTURE_SIZE: u32 = 256;
    pub const CHECKER_CELL: u32 = 32;
    const DARK: [u8; 4] = [40, 40, 48, 255];
    const LIGHT: [u8; 4] = [230, 230, 220, 255];

    /// Set 0: the texture as a combined image sampler at binding 0, read by
    /// the fragment shader.
    pub fn bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
        [combined_image_sampler_binding(
            0,
            vk::ShaderStageFlags::FRAGMENT,
        )]
    }

    pub fn new(device: &Arc<Device>, vertex_shader: &Path, fragment_shader: &Path) -> RhiResult<Self> {
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&TEXTURED_QUAD_VERTICES),
        )?;

        let extent = vk::Extent2D {
            width: Self::TEXTURE_SIZE,
            height: Self::TEXTURE_SIZE,
        };
        let pixels = checkerboard(extent, Self::CHECKER_CELL, Self::DARK, Self::LIGHT);
        let texture = Texture::from_rgba8(device.clone(), extent, &pixels)?;
        let sampler = Sampler::new(device.clone(), &linear_clamp_info())?;

        let bindings = Self::bindings();
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), 1, &pool_sizes_for(&bindings, 1))?;
        let descriptor_set = descriptor_pool.allocate_one(&set_layout)?;

        let infos = [image_info(
            sampler.handle(),
            texture.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        update_descriptor_sets(
            device,
            &[combined_image_sampler_write(descriptor_set, 0, &infos)],
        );

        let pipeline = ShaderPipeline::load(
            device,
            vertex_shader,
            fragment_shader,
            &[set_layout.handle()],
        )?;

        debug!(
            "Textured quad ready: {}x{} checkerboard",
            texture.extent().width,
            texture.extent().height
        );

        Ok(Self {
            pipeline,
            _descriptor_pool: descriptor_pool,
            descriptor_set,
            _set_layout: set_layout,
            _sampler: sampler,
            _texture: texture,
            vertex_buffer,
        })
    }
}

impl DrawStage for TexturedQuadStage {
    fn name(&self) -> &'static str {
        "textured_quad"
    }

    fn prepare(
        &mut self,
        device: &Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        self.pipeline.rebuild(
            device,
            render_pass,
            &[TexturedVertex::binding_description()],
            &TexturedVertex::attribute_descriptions(),
            vk::PrimitiveTopology::TRIANGLE_LIST,
        )?;
        debug!(
            "Textured quad stage prepared for {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    fn draw(&self, cmd: &CommandBuffer, extent: vk::Extent2D) {
        if self.pipeline.bind(cmd, extent) {
            cmd.bind_descriptor_sets(self.pipeline.layout.handle(), 0, &[self.descriptor_set]);
            cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
            cmd.draw(Self::VERTEX_COUNT, 1, 0, 0);
        }
    }
}
