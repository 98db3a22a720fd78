//! Error types for renderer setup and the frame loop.

use std::fmt;

/// Which shader stage failed to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors raised while mounting or driving a renderer.
///
/// Setup errors are fatal for the renderer instance: nothing is drawn once
/// one has been returned.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The driver refused to allocate a GL object.
    Allocation(&'static str),
    /// A shader stage failed to compile. Carries the driver's info log.
    ShaderCompile { stage: ShaderStage, log: String },
    /// The program failed to link. Carries the driver's info log.
    ProgramLink(String),
    /// An attribute the vertex stage needs was optimised out or misspelled.
    MissingAttribute(&'static str),
    /// A uniform the fragment stage needs was optimised out or misspelled.
    MissingUniform(&'static str),
    /// The host options object could not be read.
    InvalidOptions(String),
    /// A browser API call failed.
    Host(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Allocation(what) => write!(f, "Unable to create {}", what),
            RenderError::ShaderCompile { stage, log } => {
                write!(f, "{} shader compile failed: {}", stage, log)
            }
            RenderError::ProgramLink(log) => write!(f, "Program link failed: {}", log),
            RenderError::MissingAttribute(name) => write!(f, "Can not find attribute {}", name),
            RenderError::MissingUniform(name) => write!(f, "Can not find uniform {}", name),
            RenderError::InvalidOptions(msg) => write!(f, "Invalid metaball options: {}", msg),
            RenderError::Host(msg) => write!(f, "Browser call failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<RenderError> for wasm_bindgen::JsValue {
    fn from(e: RenderError) -> Self {
        js_sys::Error::new(&e.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_info_log() {
        let e = RenderError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "ERROR: 0:12: 'foo' : undeclared identifier".into(),
        };
        assert_eq!(
            e.to_string(),
            "fragment shader compile failed: ERROR: 0:12: 'foo' : undeclared identifier"
        );
        assert_eq!(
            RenderError::MissingUniform("metaballs").to_string(),
            "Can not find uniform metaballs"
        );
    }
}
