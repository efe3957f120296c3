/// Lit, textured mesh shader with a directional shadow map.
///
/// Group 0 holds per-frame data, group 1 the material, group 2 the object.
pub const MESH_SHADER: &str = r#"
struct DirLight {
    // xyz: direction the light travels, w: enabled
    direction: vec4<f32>,
    // rgb: color * intensity, w: casts the shadow map
    color: vec4<f32>,
};

struct Frame {
    view_proj: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
    ambient: vec4<f32>,
    lights: array<DirLight, 2>,
    // x: enabled, y: bias, z: normal bias, w: texel size
    shadow: vec4<f32>,
};

struct Material {
    base_color: vec4<f32>,
    // x: alpha test cutoff (< 0 disables), y: has base texture
    params: vec4<f32>,
};

struct Object {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    // x: receives shadows
    flags: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var shadow_map: texture_depth_2d;
@group(0) @binding(2) var shadow_sampler: sampler_comparison;

@group(1) @binding(0) var<uniform> material: Material;
@group(1) @binding(1) var base_texture: texture_2d<f32>;
@group(1) @binding(2) var base_sampler: sampler;

@group(2) @binding(0) var<uniform> object: Object;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let world = object.model * vec4<f32>(vertex.position, 1.0);
    var out: VertexOutput;
    out.clip_position = frame.view_proj * world;
    out.world_pos = world.xyz;
    out.world_normal = normalize((object.normal * vec4<f32>(vertex.normal, 0.0)).xyz);
    out.uv = vertex.uv;
    return out;
}

fn shadow_factor(world_pos: vec3<f32>, normal: vec3<f32>) -> f32 {
    let offset = world_pos + normal * frame.shadow.z;
    let clip = frame.light_view_proj * vec4<f32>(offset, 1.0);
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let depth = ndc.z + frame.shadow.y;

    var sum = 0.0;
    for (var y: i32 = -1; y <= 1; y += 1) {
        for (var x: i32 = -1; x <= 1; x += 1) {
            let o = vec2<f32>(f32(x), f32(y)) * frame.shadow.w;
            sum += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + o, depth);
        }
    }
    let inside = all(uv >= vec2<f32>(0.0)) && all(uv <= vec2<f32>(1.0)) && ndc.z <= 1.0;
    return select(1.0, sum / 9.0, inside);
}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    let texel = textureSample(base_texture, base_sampler, in.uv);
    let color = material.base_color * texel;
    if (material.params.x >= 0.0 && color.a < material.params.x) {
        discard;
    }

    var n = normalize(in.world_normal);
    if (!front) {
        n = -n;
    }

    var shadow = 1.0;
    if (frame.shadow.x > 0.5 && object.flags.x > 0.5) {
        shadow = shadow_factor(in.world_pos, n);
    }

    var light = frame.ambient.rgb;
    for (var i: u32 = 0u; i < 2u; i += 1u) {
        let l = frame.lights[i];
        if (l.direction.w > 0.5) {
            let ndotl = max(dot(n, -l.direction.xyz), 0.0);
            light += l.color.rgb * ndotl * select(1.0, shadow, l.color.w > 0.5);
        }
    }
    return vec4<f32>(color.rgb * light, color.a);
}
"#;

/// Depth-only pass from the shadow-casting light.
pub const SHADOW_SHADER: &str = r#"
struct DirLight {
    direction: vec4<f32>,
    color: vec4<f32>,
};

struct Frame {
    view_proj: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
    ambient: vec4<f32>,
    lights: array<DirLight, 2>,
    shadow: vec4<f32>,
};

struct Object {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    flags: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(1) @binding(0) var<uniform> object: Object;

@vertex
fn vs_shadow(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return frame.light_view_proj * object.model * vec4<f32>(position, 1.0);
}
"#;
