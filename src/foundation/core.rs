use std::{fmt, str::FromStr};

use crate::foundation::error::{StratumError, StratumResult};

pub use kurbo::{Affine, Point, Rect, Size, Vec2};

/// Identifier of a layer inside one design's arena.
///
/// Ids are allocated by the owning design and never reused within it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Allocate a fresh random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = StratumError;

            fn from_str(s: &str) -> StratumResult<Self> {
                uuid::Uuid::parse_str(s.trim()).map(Self).map_err(|e| {
                    StratumError::validation(format!(
                        "invalid {} '{s}': {e}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

uuid_id!(
    /// Stable identity of a design across its lifetime.
    DesignId
);
uuid_id!(
    /// Identity of one export job. Retries get a new id.
    JobId
);

/// Canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create a validated canvas.
    pub fn new(width: u32, height: u32) -> StratumResult<Self> {
        let canvas = Self { width, height };
        canvas.validate()?;
        Ok(canvas)
    }

    /// Reject zero-sized canvases.
    pub fn validate(self) -> StratumResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(StratumError::validation("canvas width/height must be > 0"));
        }
        Ok(())
    }

    /// Canvas as a rectangle anchored at the origin.
    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Return `true` for colors the vector serializer can emit verbatim.
///
/// Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`/`rgba(..)` and bare CSS names.
pub fn is_valid_color(color: &str) -> bool {
    let c = color.trim();
    if let Some(hex) = c.strip_prefix('#') {
        return matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|ch| ch.is_ascii_hexdigit());
    }
    if (c.starts_with("rgb(") || c.starts_with("rgba(")) && c.ends_with(')') {
        return c
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '(' | ')' | ',' | '.' | ' ' | '%'));
    }
    !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphabetic())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
