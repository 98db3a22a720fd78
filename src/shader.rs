//! GLSL generation for the metaball field.
//!
//! Canvas size, ball count and the mask rect cap are written into the source
//! as constants because array lengths and loop bounds have to be known when
//! the program is compiled. Anything that changes a [`ProgramKey`] therefore
//! needs a fresh program.

use crate::geometry::MAX_RECTS;
use serde::Deserialize;
use std::fmt::Write;

/// Field value at which a pixel counts as inside the merged blob.
pub const ISO_THRESHOLD: f32 = 0.99;
/// Inverse width of the anti-aliased band just above the threshold.
pub const EDGE_SHARPNESS: f32 = 100.0;

/// How the balls interact with tracked page elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Free motion, no obstacles.
    #[default]
    #[serde(alias = "default")]
    Plain,
    /// Balls bounce off obstacle rects.
    Bounce,
    /// Balls render behind obstacle rects.
    Mask,
    /// Bounce and mask, each with its own selector.
    Combined,
}

impl Mode {
    pub fn uses_bounce(self) -> bool {
        matches!(self, Mode::Bounce | Mode::Combined)
    }

    pub fn uses_mask(self) -> bool {
        matches!(self, Mode::Mask | Mode::Combined)
    }
}

/// Everything baked into a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub width: u32,
    pub height: u32,
    pub count: usize,
    pub mode: Mode,
}

/// Full-viewport quad drawn as a triangle strip. Mode independent.
pub const VERTEX_SHADER_SRC: &str = r#"#version 300 es
in vec2 position;
void main() {
  gl_Position = vec4(position, 0.0, 1.0);
}
"#;

/// Quad corners for [`VERTEX_SHADER_SRC`], two floats per vertex.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0];

/// Name of the `vec3` array holding `x, y, r` per ball.
pub const METABALLS_UNIFORM: &str = "metaballs";
/// Name of the `vec4` array holding `x, y, width, height` per mask rect.
pub const MASK_RECTS_UNIFORM: &str = "maskRects";
pub const NUM_MASK_RECTS_UNIFORM: &str = "numMaskRects";
pub const POSITION_ATTRIBUTE: &str = "position";

const MASK_FN: &str = r#"
bool isInMaskRect(float x, float y) {
  for (int i = 0; i < MAX_RECTS; i++) {
    if (i >= numMaskRects) break;
    vec4 rect = maskRects[i];
    if (x >= rect.x && x <= rect.x + rect.z &&
        y >= rect.y && y <= rect.y + rect.w) {
      return true;
    }
  }
  return false;
}
"#;

const MASK_CHECK: &str = r#"
  if (isInMaskRect(x, y)) {
    fragColor = vec4(0.0, 0.0, 0.0, 1.0);
    return;
  }
"#;

const FIELD_LOOP: &str = r#"
  for (int i = 0; i < NUM_METABALLS; i++) {
    vec3 metaball = metaballs[i];
    float dx = metaball.x - x;
    float dy = metaball.y - y;
    float radius = metaball.z;

    float contrib = (radius * radius) / (dx * dx + dy * dy);
    sum += contrib;
    weightedY += metaball.y * contrib;
  }
"#;

const SHADE: &str = r#"
  if (sum >= THRESHOLD) {
    float avgY = weightedY / sum;
    float upness = clamp(avgY / HEIGHT, 0.0, 1.0);

    vec3 orange = vec3(1.0, 0.5, 0.0);
    vec3 purple = vec3(0.6, 0.0, 0.8);
    float t = clamp((x / WIDTH) * 0.9 + (y / HEIGHT) * 0.1, 0.0, 1.0);
    vec3 baseColor = mix(orange, purple, t);

    vec3 brightened = mix(baseColor, vec3(1.0), upness * 0.6);
    float edge = max(0.0, 1.0 - (sum - THRESHOLD) * EDGE_SHARPNESS);

    fragColor = vec4(mix(brightened, vec3(0.0), edge), 1.0);
    return;
  }

  fragColor = vec4(0.0, 0.0, 0.0, 1.0);
}
"#;

/// Generate the fragment shader for a key.
pub fn fragment_shader_src(key: &ProgramKey) -> String {
    let mut src = String::with_capacity(2048);
    src.push_str("#version 300 es\nprecision highp float;\n\n");

    // `write!` into a String cannot fail.
    let _ = writeln!(src, "const float WIDTH = {};", glsl_float(key.width as f32));
    let _ = writeln!(src, "const float HEIGHT = {};", glsl_float(key.height as f32));
    let _ = writeln!(src, "const float THRESHOLD = {};", glsl_float(ISO_THRESHOLD));
    let _ = writeln!(src, "const float EDGE_SHARPNESS = {};", glsl_float(EDGE_SHARPNESS));

    // GLSL has no zero-length arrays; an empty field simply never crosses
    // the threshold.
    if key.count > 0 {
        let _ = writeln!(src, "const int NUM_METABALLS = {};", key.count);
        let _ = writeln!(src, "uniform vec3 {}[{}];", METABALLS_UNIFORM, key.count);
    }

    if key.mode.uses_mask() {
        let _ = writeln!(src, "const int MAX_RECTS = {};", MAX_RECTS);
        let _ = writeln!(src, "uniform vec4 {}[{}];", MASK_RECTS_UNIFORM, MAX_RECTS);
        let _ = writeln!(src, "uniform int {};", NUM_MASK_RECTS_UNIFORM);
        src.push_str(MASK_FN);
    }

    src.push_str("\nout vec4 fragColor;\n\nvoid main() {\n");
    src.push_str("  float x = gl_FragCoord.x;\n  float y = gl_FragCoord.y;\n");
    if key.mode.uses_mask() {
        src.push_str(MASK_CHECK);
    }
    src.push_str("  float sum = 0.0;\n  float weightedY = 0.0;\n");
    if key.count > 0 {
        src.push_str(FIELD_LOOP);
    }
    src.push_str(SHADE);
    src
}

/// Format a float so GLSL parses it as a float literal.
fn glsl_float(v: f32) -> String {
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(count: usize, mode: Mode) -> ProgramKey {
        ProgramKey { width: 800, height: 600, count, mode }
    }

    #[test]
    fn bakes_dimensions_and_count() {
        let src = fragment_shader_src(&key(10, Mode::Plain));
        assert!(src.starts_with("#version 300 es"));
        assert!(src.contains("const float WIDTH = 800.0;"));
        assert!(src.contains("const float HEIGHT = 600.0;"));
        assert!(src.contains("const float THRESHOLD = 0.99;"));
        assert!(src.contains("const int NUM_METABALLS = 10;"));
        assert!(src.contains("uniform vec3 metaballs[10];"));
        assert!(src.contains("for (int i = 0; i < NUM_METABALLS; i++)"));
    }

    #[test]
    fn mask_code_only_in_mask_modes() {
        for mode in [Mode::Plain, Mode::Bounce] {
            let src = fragment_shader_src(&key(4, mode));
            assert!(!src.contains("maskRects"), "{:?}", mode);
            assert!(!src.contains("isInMaskRect"), "{:?}", mode);
        }
        for mode in [Mode::Mask, Mode::Combined] {
            let src = fragment_shader_src(&key(4, mode));
            assert!(src.contains("uniform vec4 maskRects[16];"), "{:?}", mode);
            assert!(src.contains("uniform int numMaskRects;"), "{:?}", mode);
            assert!(src.contains("if (isInMaskRect(x, y))"), "{:?}", mode);
        }
    }

    #[test]
    fn mask_check_runs_before_field() {
        let src = fragment_shader_src(&key(4, Mode::Mask));
        let check = src.find("if (isInMaskRect(x, y))").unwrap_or(usize::MAX);
        let field = src.find("float sum = 0.0;").unwrap_or(0);
        assert!(check < field);
    }

    #[test]
    fn empty_field_has_no_array() {
        let src = fragment_shader_src(&key(0, Mode::Combined));
        assert!(!src.contains("metaballs["));
        assert!(!src.contains("NUM_METABALLS"));
        assert!(src.contains("fragColor = vec4(0.0, 0.0, 0.0, 1.0);"));
    }

    #[test]
    fn shading_brightens_upward_and_darkens_the_rim() {
        let src = fragment_shader_src(&key(5, Mode::Plain));
        assert!(src.contains("const float EDGE_SHARPNESS = 100.0;"));
        assert!(src.contains("float upness = clamp(avgY / HEIGHT, 0.0, 1.0);"));
        assert!(src.contains("mix(orange, purple, t)"));
        assert!(src.contains("vec3 brightened = mix(baseColor, vec3(1.0), upness * 0.6);"));
        assert!(src.contains("float edge = max(0.0, 1.0 - (sum - THRESHOLD) * EDGE_SHARPNESS);"));
        assert!(src.contains("fragColor = vec4(mix(brightened, vec3(0.0), edge), 1.0);"));

        let shade = src.find("if (sum >= THRESHOLD)").unwrap_or(usize::MAX);
        let field = src.find("float sum = 0.0;").unwrap_or(usize::MAX);
        assert!(field < shade);
    }

    #[test]
    fn plain_and_bounce_share_source() {
        assert_eq!(
            fragment_shader_src(&key(7, Mode::Plain)),
            fragment_shader_src(&key(7, Mode::Bounce))
        );
    }

    #[test]
    fn float_literals() {
        assert_eq!(glsl_float(800.0), "800.0");
        assert_eq!(glsl_float(0.99), "0.99");
        assert_eq!(glsl_float(100.0), "100.0");
    }

    #[test]
    fn mode_flags() {
        assert!(!Mode::Plain.uses_bounce() && !Mode::Plain.uses_mask());
        assert!(Mode::Bounce.uses_bounce() && !Mode::Bounce.uses_mask());
        assert!(!Mode::Mask.uses_bounce() && Mode::Mask.uses_mask());
        assert!(Mode::Combined.uses_bounce() && Mode::Combined.uses_mask());
    }

    #[test]
    fn vertex_shader_reads_position() {
        assert!(VERTEX_SHADER_SRC.contains("in vec2 position;"));
        assert_eq!(QUAD_VERTICES.len(), 8);
    }
}
