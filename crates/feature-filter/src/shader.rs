//! WGSL pieces of the visibility filter.
//!
//! Material templates mark injection points with `// #include <name>` comment
//! lines. [`inject_feature_filter`] threads the feature id attribute through a
//! varying and prefixes the fragment body with a discard test against the
//! `hidden_feature_ids` uniform. Array length and tolerance arrive as `const`
//! declarations generated from the material's defines.

use crate::error::{FilterError, Result};
use std::fmt::Write as _;

/// Default tile mesh material.
pub const DEFAULT_TEMPLATE: &str = include_str!("../shaders/tile_mesh.wgsl");

/// Vertex attribute location and varying location of the feature id.
pub const FEATURE_ID_LOCATION: u32 = 14;

/// Bind group holding the hidden-feature array.
pub const HIDDEN_IDS_GROUP: u32 = 1;

pub const FEATURE_ID_COUNT: &str = "FEATURE_ID_COUNT";
pub const FEATURE_ID_VEC4_COUNT: &str = "FEATURE_ID_VEC4_COUNT";
pub const FEATURE_ID_TOLERANCE: &str = "FEATURE_ID_TOLERANCE";

pub mod chunk {
    pub const COMMON: &str = "// #include <common>";
    pub const ATTRIBUTES: &str = "// #include <attributes>";
    pub const VARYINGS: &str = "// #include <varyings>";
    pub const BEGIN_VERTEX: &str = "// #include <begin_vertex>";
    pub const BEGIN_FRAGMENT: &str = "// #include <begin_fragment>";

    pub const ALL: [&str; 5] = [COMMON, ATTRIBUTES, VARYINGS, BEGIN_VERTEX, BEGIN_FRAGMENT];
}

const INJECTED_GUARD: &str = "fn should_hide_feature(";

/// A compile-time constant emitted ahead of the shader body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderDefine {
    U32(u32),
    F32(f32),
}

impl ShaderDefine {
    pub fn declare(&self, name: &str) -> String {
        match self {
            ShaderDefine::U32(v) => format!("const {name}: u32 = {v}u;"),
            // `{:?}` always prints a decimal point, which WGSL needs for f32.
            ShaderDefine::F32(v) => format!("const {name}: f32 = {v:?};"),
        }
    }
}

/// True once the filter has been spliced into `source`.
pub fn is_injected(source: &str) -> bool {
    source.contains(INJECTED_GUARD)
}

/// Splices the feature filter into a material template.
///
/// Returns `Ok(false)` when the source already carries the filter.
pub fn inject_feature_filter(source: &mut String) -> Result<bool> {
    if is_injected(source) {
        return Ok(false);
    }

    if let Some(marker) = chunk::ALL.into_iter().find(|m| !source.contains(m)) {
        return Err(FilterError::ShaderInjection { marker });
    }

    insert_after(source, chunk::COMMON, &common_chunk());
    insert_after(
        source,
        chunk::ATTRIBUTES,
        &format!("\n    @location({FEATURE_ID_LOCATION}) feature_id_0: f32,"),
    );
    insert_after(
        source,
        chunk::VARYINGS,
        &format!("\n    @location({FEATURE_ID_LOCATION}) feature_id: f32,"),
    );
    insert_after(
        source,
        chunk::BEGIN_VERTEX,
        "\n    out.feature_id = in.feature_id_0;",
    );
    insert_after(
        source,
        chunk::BEGIN_FRAGMENT,
        "\n    if (should_hide_feature(in.feature_id)) {\n        discard;\n    }",
    );

    Ok(true)
}

fn common_chunk() -> String {
    let mut s = String::new();
    let _ = write!(
        s,
        "
@group({HIDDEN_IDS_GROUP}) @binding(0)
var<uniform> hidden_feature_ids: array<vec4<f32>, {FEATURE_ID_VEC4_COUNT}>;

fn should_hide_feature(feature_id: f32) -> bool {{
    for (var i = 0u; i < {FEATURE_ID_VEC4_COUNT}; i++) {{
        let d = abs(hidden_feature_ids[i] - vec4<f32>(feature_id));
        if (any(d < vec4<f32>({FEATURE_ID_TOLERANCE}))) {{
            return true;
        }}
    }}
    return false;
}}"
    );
    s
}

fn insert_after(source: &mut String, marker: &str, text: &str) {
    if let Some(pos) = source.find(marker) {
        source.insert_str(pos + marker.len(), text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_every_injection_point() {
        for marker in chunk::ALL {
            assert!(DEFAULT_TEMPLATE.contains(marker), "missing {marker}");
        }
        assert!(!is_injected(DEFAULT_TEMPLATE));
    }

    #[test]
    fn injects_exactly_once() {
        let mut source = DEFAULT_TEMPLATE.to_string();
        assert!(inject_feature_filter(&mut source).unwrap());
        let once = source.clone();

        assert!(!inject_feature_filter(&mut source).unwrap());
        assert_eq!(source, once);
        assert_eq!(source.matches(INJECTED_GUARD).count(), 1);
        assert_eq!(source.matches("discard;").count(), 1);
        assert!(source.contains("out.feature_id = in.feature_id_0;"));
    }

    #[test]
    fn discard_is_the_first_fragment_statement() {
        let mut source = DEFAULT_TEMPLATE.to_string();
        inject_feature_filter(&mut source).unwrap();

        let body = &source[source.find("fn fs_main").unwrap()..];
        let discard = body.find("should_hide_feature(in.feature_id)").unwrap();
        let shading = body.find("let light").unwrap();
        assert!(discard < shading);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let mut source = DEFAULT_TEMPLATE.replace(chunk::VARYINGS, "");
        let err = inject_feature_filter(&mut source).unwrap_err();
        assert!(matches!(
            err,
            FilterError::ShaderInjection { marker } if marker == chunk::VARYINGS
        ));
    }

    #[test]
    fn defines_render_as_wgsl_consts() {
        assert_eq!(
            ShaderDefine::U32(64).declare(FEATURE_ID_COUNT),
            "const FEATURE_ID_COUNT: u32 = 64u;"
        );
        assert_eq!(
            ShaderDefine::F32(0.001).declare(FEATURE_ID_TOLERANCE),
            "const FEATURE_ID_TOLERANCE: f32 = 0.001;"
        );
        assert_eq!(ShaderDefine::F32(1.0).declare("X"), "const X: f32 = 1.0;");
    }
}
