use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::scene::{Geometry, Material, Node, NodeKind, Scene};

use super::{RenderCtx, RenderTarget};

/// Per-frame pass parameters.
#[derive(Debug, Copy, Clone)]
pub struct MeshFrame {
    pub view_proj: Mat4,
    pub clear: wgpu::Color,
    /// Physical viewport; `None` uses the whole target.
    pub viewport: Option<(u32, u32, u32, u32)>,
    pub scissor: bool,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    light_dir: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct MeshVertex {
    position: [f32; 3],
    normal: [f32; 3],
}

impl MeshVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3, // position
        1 => Float32x3  // normal
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct MeshInstance {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

impl MeshInstance {
    const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4, // model columns
        6 => Float32x4  // premultiplied later in the shader
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}

/// A run of instances drawn with one geometry.
#[derive(Debug, Clone)]
pub(crate) struct DrawBatch {
    pub geometry: Arc<Geometry>,
    pub first: u32,
    pub count: u32,
}

/// Flattens visible meshes into an instance stream plus one batch per node.
pub(crate) fn collect_instances(scene: &Scene) -> (Vec<MeshInstance>, Vec<DrawBatch>) {
    let mut instances = Vec::new();
    let mut batches = Vec::new();

    scene.traverse_world(&mut |node, world| {
        let first = instances.len() as u32;
        let geometry = match &node.kind {
            NodeKind::Group => return,
            NodeKind::Mesh(mesh) => {
                if !mesh.material.visible {
                    return;
                }
                instances.push(MeshInstance {
                    model: world.to_cols_array_2d(),
                    color: material_rgba(&mesh.material, None),
                });
                &mesh.geometry
            }
            NodeKind::InstancedMesh(mesh) => {
                if !mesh.material.visible {
                    return;
                }
                let colors = mesh
                    .instances
                    .colors()
                    .filter(|_| mesh.material.vertex_colors);
                for (i, matrix) in mesh.instances.matrices().iter().enumerate() {
                    let tint = colors.and_then(|c| c.get(i)).copied();
                    instances.push(MeshInstance {
                        model: (world * *matrix).to_cols_array_2d(),
                        color: material_rgba(&mesh.material, tint),
                    });
                }
                &mesh.geometry
            }
        };
        let count = instances.len() as u32 - first;
        if count > 0 && geometry.draw_count() > 0 {
            batches.push(DrawBatch {
                geometry: geometry.clone(),
                first,
                count,
            });
        }
    });

    (instances, batches)
}

fn material_rgba(material: &Material, tint: Option<Vec3>) -> [f32; 4] {
    let alpha = if material.transparent {
        material.opacity.clamp(0.0, 1.0)
    } else {
        1.0
    };
    let base = Vec3::new(material.color.r, material.color.g, material.color.b);
    let rgb = tint.map_or(base, |t| base * t);
    [rgb.x, rgb.y, rgb.z, alpha]
}

pub(crate) fn interleave(geometry: &Geometry) -> Vec<MeshVertex> {
    let normal_at = |i: usize| -> [f32; 3] {
        geometry
            .normals
            .get(i * 3..i * 3 + 3)
            .map_or([0.0; 3], |n| [n[0], n[1], n[2]])
    };
    geometry
        .positions
        .chunks_exact(3)
        .enumerate()
        .map(|(i, p)| MeshVertex {
            position: [p[0], p[1], p[2]],
            normal: normal_at(i),
        })
        .collect()
}

struct GpuGeometry {
    vbo: wgpu::Buffer,
    ibo: Option<wgpu::Buffer>,
    draw_count: u32,
}

/// Instanced mesh renderer.
///
/// Geometry buffers are uploaded once per geometry uuid and kept until released.
/// Every mesh is drawn as instances so plain and instanced meshes share one pipeline.
#[derive(Default)]
pub struct MeshRenderer {
    pipeline_key: Option<(wgpu::TextureFormat, u32)>,
    pipeline: Option<wgpu::RenderPipeline>,

    bind_group_layout: Option<wgpu::BindGroupLayout>,
    bind_group: Option<wgpu::BindGroup>,
    globals_ubo: Option<wgpu::Buffer>,

    geometries: HashMap<String, GpuGeometry>,

    instance_vbo: Option<wgpu::Buffer>,
    instance_capacity: usize,

    warned_wireframe: bool,
}

impl MeshRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of geometries currently resident on the GPU.
    pub fn cached_geometries(&self) -> usize {
        self.geometries.len()
    }

    /// Builds the pipeline and uploads every geometry referenced by `scene`.
    pub fn prepare(&mut self, ctx: &RenderCtx<'_>, scene: &Scene) {
        self.ensure_pipeline(ctx);
        self.ensure_bindings(ctx);
        scene.traverse(&mut |node| {
            if let Some(geometry) = node.geometry() {
                self.ensure_geometry(ctx, geometry);
            }
        });
    }

    pub fn render(
        &mut self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        scene: &Scene,
        frame: &MeshFrame,
    ) {
        self.ensure_pipeline(ctx);
        self.ensure_bindings(ctx);

        let (instances, batches) = collect_instances(scene);
        if !self.warned_wireframe && scene_has_wireframe(scene) {
            log::debug!("MeshRenderer: wireframe materials are drawn filled");
            self.warned_wireframe = true;
        }

        for batch in &batches {
            self.ensure_geometry(ctx, &batch.geometry);
        }
        self.write_globals(ctx, frame.view_proj);
        if !instances.is_empty() {
            self.ensure_instance_capacity(ctx, instances.len());
            if let Some(vbo) = self.instance_vbo.as_ref() {
                ctx.queue.write_buffer(vbo, 0, bytemuck::cast_slice(&instances));
            }
        }

        let color = target.color_attachment(wgpu::LoadOp::Clear(frame.clear));
        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("parallax mesh pass"),
            color_attachments: &[Some(color)],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let (Some(pipeline), Some(bind_group), Some(instance_vbo)) = (
            self.pipeline.as_ref(),
            self.bind_group.as_ref(),
            self.instance_vbo.as_ref(),
        ) else {
            return;
        };
        if batches.is_empty() {
            return;
        }

        if let Some((x, y, w, h)) = frame.viewport {
            rpass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
            if frame.scissor {
                rpass.set_scissor_rect(x, y, w, h);
            }
        }

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.set_vertex_buffer(1, instance_vbo.slice(..));

        for batch in &batches {
            let Some(gpu) = self.geometries.get(&batch.geometry.uuid) else { continue };
            let range = batch.first..batch.first + batch.count;
            rpass.set_vertex_buffer(0, gpu.vbo.slice(..));
            match gpu.ibo.as_ref() {
                Some(ibo) => {
                    rpass.set_index_buffer(ibo.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..gpu.draw_count, 0, range);
                }
                None => rpass.draw(0..gpu.draw_count, range),
            }
        }
    }

    /// Drops cached buffers for geometries used in `node`'s subtree.
    ///
    /// Geometry still referenced elsewhere is uploaded again on its next draw.
    pub fn release(&mut self, node: &Node) {
        if let Some(geometry) = node.geometry() {
            self.geometries.remove(&geometry.uuid);
        }
        for child in &node.children {
            self.release(child);
        }
    }

    /// Drops every GPU resource; the next frame rebuilds what it needs.
    pub fn dispose(&mut self) {
        *self = Self {
            warned_wireframe: self.warned_wireframe,
            ..Self::default()
        };
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        let key = (ctx.surface_format, ctx.sample_count);
        if self.pipeline_key == Some(key) && self.pipeline.is_some() {
            return;
        }

        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("parallax mesh shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("parallax mesh bgl"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<Globals>() as u64,
                            ),
                        },
                        count: None,
                    }],
                });

        let pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("parallax mesh pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("parallax mesh pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[MeshVertex::layout(), MeshInstance::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: ctx.sample_count,
                ..Default::default()
            },

            multiview_mask: None,
            cache: None,
        });

        self.pipeline_key = Some(key);
        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);

        self.bind_group = None;
        self.globals_ubo = None;
    }

    fn ensure_bindings(&mut self, ctx: &RenderCtx<'_>) {
        if self.bind_group.is_some() && self.globals_ubo.is_some() {
            return;
        }
        let Some(bgl) = self.bind_group_layout.as_ref() else { return };

        let globals_ubo = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax mesh globals ubo"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax mesh bind group"),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_ubo.as_entire_binding(),
            }],
        });

        self.globals_ubo = Some(globals_ubo);
        self.bind_group = Some(bind_group);
    }

    fn ensure_geometry(&mut self, ctx: &RenderCtx<'_>, geometry: &Geometry) {
        if self.geometries.contains_key(&geometry.uuid) {
            return;
        }
        let vertices = interleave(geometry);
        if vertices.is_empty() {
            return;
        }

        let vbo = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parallax mesh vbo"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ibo = geometry.indices.as_ref().map(|indices| {
            ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("parallax mesh ibo"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });

        self.geometries.insert(
            geometry.uuid.clone(),
            GpuGeometry {
                vbo,
                ibo,
                draw_count: geometry.draw_count() as u32,
            },
        );
    }

    fn write_globals(&self, ctx: &RenderCtx<'_>, view_proj: Mat4) {
        let Some(ubo) = self.globals_ubo.as_ref() else { return };
        let globals = Globals {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: [-0.4, -1.0, -0.6, 0.0],
        };
        ctx.queue.write_buffer(ubo, 0, bytemuck::bytes_of(&globals));
    }

    fn ensure_instance_capacity(&mut self, ctx: &RenderCtx<'_>, required: usize) {
        if required <= self.instance_capacity && self.instance_vbo.is_some() {
            return;
        }

        let new_cap = required.next_power_of_two().max(64);
        self.instance_vbo = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parallax mesh instance vbo"),
            size: (new_cap * std::mem::size_of::<MeshInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = new_cap;
    }
}

fn scene_has_wireframe(scene: &Scene) -> bool {
    let mut found = false;
    scene.traverse(&mut |node| {
        found |= node.material().is_some_and(|m| m.wireframe);
    });
    found
}

#[cfg(test)]
mod tests {
    use crate::paint::Color;
    use crate::scene::{Instances, Transform};

    use super::*;

    #[test]
    fn instanced_nodes_expand_with_parent_transform() {
        let geo = Arc::new(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut material = Material::new(Color::WHITE);
        material.vertex_colors = true;
        let instances =
            Instances::from_flat(2, None, Some(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0][..])).unwrap();

        let mut scene = Scene::new();
        scene.add(
            Node::group("root")
                .with_transform(Transform::from_position(Vec3::new(0.0, 5.0, 0.0)))
                .with_child(Node::instanced("swarm", geo.clone(), material, instances))
                .with_child(Node::mesh("single", geo, Material::new(Color::from_hex(0x0000ff)))),
        );

        let (instances, batches) = collect_instances(&scene);
        assert_eq!(instances.len(), 3);
        assert_eq!(batches.len(), 2);
        assert_eq!((batches[0].first, batches[0].count), (0, 2));
        assert_eq!((batches[1].first, batches[1].count), (2, 1));
        assert_eq!(instances[0].model[3][1], 5.0);
        assert_eq!(instances[1].color, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(instances[2].color, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn hidden_and_transparent_materials() {
        let geo = Arc::new(Geometry::cuboid(1.0, 1.0, 1.0));
        let mut hidden = Material::new(Color::WHITE);
        hidden.visible = false;
        let mut glass = Material::new(Color::WHITE);
        glass.transparent = true;
        glass.opacity = 0.25;

        let mut scene = Scene::new();
        scene.add(Node::mesh("hidden", geo.clone(), hidden));
        scene.add(Node::mesh("glass", geo, glass));

        let (instances, batches) = collect_instances(&scene);
        assert_eq!(batches.len(), 1);
        assert_eq!(instances[0].color[3], 0.25);
    }

    #[test]
    fn interleave_fills_missing_normals() {
        let geo = Geometry::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let vertices = interleave(&geo);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[1].normal, [0.0; 3]);
    }
}
