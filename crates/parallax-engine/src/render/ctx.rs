/// Renderer-facing GPU context (device/queue + target format).
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub surface_format: wgpu::TextureFormat,
    pub sample_count: u32,
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        Self {
            device,
            queue,
            surface_format,
            sample_count,
        }
    }
}

/// Where a pass draws: encoder plus color view, with an optional MSAA resolve.
pub struct RenderTarget<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub color_view: &'a wgpu::TextureView,
    pub resolve_target: Option<&'a wgpu::TextureView>,
}

impl<'a> RenderTarget<'a> {
    /// Targets `frame_view` directly, or `msaa_view` resolved into it.
    #[inline]
    pub fn new(
        encoder: &'a mut wgpu::CommandEncoder,
        frame_view: &'a wgpu::TextureView,
        msaa_view: Option<&'a wgpu::TextureView>,
    ) -> Self {
        match msaa_view {
            Some(msaa) => Self {
                encoder,
                color_view: msaa,
                resolve_target: Some(frame_view),
            },
            None => Self {
                encoder,
                color_view: frame_view,
                resolve_target: None,
            },
        }
    }

    pub fn color_attachment(&self, load: wgpu::LoadOp<wgpu::Color>) -> wgpu::RenderPassColorAttachment<'a> {
        wgpu::RenderPassColorAttachment {
            view: self.color_view,
            resolve_target: self.resolve_target,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::device::ComputeDevice;

    use super::*;

    #[test]
    fn attachment_outlives_the_target_borrow() {
        let Ok(gpu) = ComputeDevice::blocking() else {
            eprintln!("no adapter; skipping pass encoding");
            return;
        };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("attachment test"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());

        let target = RenderTarget::new(&mut encoder, &view, None);
        let color = target.color_attachment(wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        assert!(color.resolve_target.is_none());
        let pass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("attachment test"),
            color_attachments: &[Some(color)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        drop(pass);
        gpu.queue().submit([encoder.finish()]);
    }
}
