use std::fmt;
use std::str::FromStr;

use crate::error::CanvasError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameRateMode {
    None,
    ResizeOnly,
    FrameMult,
    Millisecond,
}

impl FrameRateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameRateMode::None => "NONE",
            FrameRateMode::ResizeOnly => "RESIZE_ONLY",
            FrameRateMode::FrameMult => "FRAME_MULT",
            FrameRateMode::Millisecond => "MILLISECOND",
        }
    }
}

impl fmt::Display for FrameRateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameRateMode {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(FrameRateMode::None),
            "RESIZE_ONLY" => Ok(FrameRateMode::ResizeOnly),
            "FRAME_MULT" => Ok(FrameRateMode::FrameMult),
            "MILLISECOND" => Ok(FrameRateMode::Millisecond),
            _ => Err(CanvasError::UnknownVariant {
                kind: "frame rate mode",
                value: s.to_string(),
            }),
        }
    }
}

/// How often the render loop invokes the render trigger.
///
/// `FrameMult { frame_skips }` renders, then lets `frame_skips + 1` display
/// refreshes pass before rendering again, so `frame_skips` is the number of
/// refreshes skipped between renders (0 renders on every refresh).
/// `Millisecond { delay }` waits `delay` ms between renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameRate {
    None,
    ResizeOnly,
    FrameMult { frame_skips: u32 },
    Millisecond { delay: u32 },
}

impl FrameRate {
    pub fn mode(&self) -> FrameRateMode {
        match self {
            FrameRate::None => FrameRateMode::None,
            FrameRate::ResizeOnly => FrameRateMode::ResizeOnly,
            FrameRate::FrameMult { .. } => FrameRateMode::FrameMult,
            FrameRate::Millisecond { .. } => FrameRateMode::Millisecond,
        }
    }

    /// Whether this cadence runs a render loop.
    pub fn is_looping(&self) -> bool {
        matches!(self, FrameRate::FrameMult { .. } | FrameRate::Millisecond { .. })
    }

    pub fn validate(self) -> Result<FrameRate, CanvasError> {
        match self {
            FrameRate::Millisecond { delay: 0 } => Err(CanvasError::validation(
                "frameRate.delay must be a positive integer",
            )),
            other => Ok(other),
        }
    }

    /// Builds a frame rate from its mode tag and the mode's numeric parameter
    /// (`frameSkips` or `delay`), as supplied by loosely typed callers.
    pub fn from_parts(mode: FrameRateMode, param: Option<f64>) -> Result<FrameRate, CanvasError> {
        let integer = |name: &str| -> Result<u32, CanvasError> {
            match param {
                Some(value) if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 => {
                    Ok(value as u32)
                }
                other => Err(CanvasError::validation(format!(
                    "frameRate.{} bad value: {:?}",
                    name, other
                ))),
            }
        };
        let frame_rate = match mode {
            FrameRateMode::None => FrameRate::None,
            FrameRateMode::ResizeOnly => FrameRate::ResizeOnly,
            FrameRateMode::FrameMult => FrameRate::FrameMult {
                frame_skips: integer("frameSkips")?,
            },
            FrameRateMode::Millisecond => FrameRate::Millisecond {
                delay: integer("delay")?,
            },
        };
        frame_rate.validate()
    }
}
