//! egui overlay painted on top of the scene in the same frame.

/// Tessellated egui output for one frame.
pub struct OverlayFrame {
    pub primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

pub(crate) struct OverlayPainter {
    renderer: egui_wgpu::Renderer,
    primitives: Vec<egui::ClippedPrimitive>,
    pixels_per_point: f32,
    to_free: Vec<egui::TextureId>,
}

impl OverlayPainter {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self {
            renderer: egui_wgpu::Renderer::new(device, format, None, 1, false),
            primitives: Vec::new(),
            pixels_per_point: 1.0,
            to_free: Vec::new(),
        }
    }

    /// Texture uploads happen now so a skipped frame never loses them.
    pub(crate) fn queue(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: OverlayFrame) {
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.to_free.extend(frame.textures_delta.free);
        self.primitives = frame.primitives;
        self.pixels_per_point = frame.pixels_per_point;
    }

    pub(crate) fn paint(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        size: (u32, u32),
    ) -> Vec<wgpu::CommandBuffer> {
        if self.primitives.is_empty() {
            return Vec::new();
        }
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [size.0, size.1],
            pixels_per_point: self.pixels_per_point,
        };
        let extra = self
            .renderer
            .update_buffers(device, queue, encoder, &self.primitives, &screen);
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            })
            .forget_lifetime();
        self.renderer.render(&mut pass, &self.primitives, &screen);
        extra
    }

    /// Free textures egui released, once the frame using them is submitted.
    pub(crate) fn after_submit(&mut self) {
        for id in self.to_free.drain(..) {
            self.renderer.free_texture(&id);
        }
    }
}
