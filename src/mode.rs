use std::fmt;
use std::str::FromStr;

use crate::error::CanvasError;

/// Which rendering backend the managed canvas currently uses.
///
/// A canvas element (and, apart from `NoContext`, a rendering context) exists
/// exactly when the mode is not `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CanvasMode {
    #[default]
    None,
    NoContext,
    TwoD,
    WebGl1,
    WebGl2,
    WebGlFullCanvasShader,
}

impl CanvasMode {
    pub const ALL: [CanvasMode; 6] = [
        CanvasMode::None,
        CanvasMode::NoContext,
        CanvasMode::TwoD,
        CanvasMode::WebGl1,
        CanvasMode::WebGl2,
        CanvasMode::WebGlFullCanvasShader,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasMode::None => "NONE",
            CanvasMode::NoContext => "NO_CONTEXT",
            CanvasMode::TwoD => "2D",
            CanvasMode::WebGl1 => "WEBGL1",
            CanvasMode::WebGl2 => "WEBGL2",
            CanvasMode::WebGlFullCanvasShader => "WEBGL_FULL_CANVAS_SHADER",
        }
    }

    /// The rendering context a canvas in this mode asks for, if any.
    pub fn context_kind(&self) -> Option<ContextKind> {
        match self {
            CanvasMode::None | CanvasMode::NoContext => None,
            CanvasMode::TwoD => Some(ContextKind::TwoD),
            CanvasMode::WebGl1 => Some(ContextKind::WebGl),
            CanvasMode::WebGl2 | CanvasMode::WebGlFullCanvasShader => Some(ContextKind::WebGl2),
        }
    }
}

impl fmt::Display for CanvasMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanvasMode {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CanvasMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| CanvasError::UnknownVariant {
                kind: "canvas mode",
                value: s.to_string(),
            })
    }
}

/// Argument to `HTMLCanvasElement.getContext`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    TwoD,
    WebGl,
    WebGl2,
}

impl ContextKind {
    pub fn context_id(&self) -> &'static str {
        match self {
            ContextKind::TwoD => "2d",
            ContextKind::WebGl => "webgl",
            ContextKind::WebGl2 => "webgl2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_mode_name() {
        for mode in CanvasMode::ALL {
            assert_eq!(mode.as_str().parse::<CanvasMode>().unwrap(), mode);
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "WEBGL3".parse::<CanvasMode>().unwrap_err();
        assert!(matches!(err, CanvasError::UnknownVariant { .. }));
    }
}
