//! Options handed over by the host page when a renderer is mounted.

use crate::geometry;
use crate::shader::Mode;
use serde::Deserialize;

pub const DEFAULT_SPEED: f32 = 0.75;
pub const DEFAULT_BOUNCE_SELECTOR: &str = "[data-metaball-bounce]";
pub const DEFAULT_MASK_SELECTOR: &str = "[data-metaball-mask]";

/// Renderer options. Field names follow the host's camelCase keys; every
/// field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Particle count. Derived from the viewport area when unset.
    pub count: Option<u32>,
    pub speed: f32,
    /// Initial visibility in `[0, 1]`.
    pub opacity: f64,
    pub mode: Mode,
    /// Shorthand selector for the single-behaviour modes.
    pub selector: Option<String>,
    pub bounce_selector: String,
    pub mask_selector: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            count: None,
            speed: DEFAULT_SPEED,
            opacity: 1.0,
            mode: Mode::Plain,
            selector: None,
            bounce_selector: DEFAULT_BOUNCE_SELECTOR.to_string(),
            mask_selector: DEFAULT_MASK_SELECTOR.to_string(),
        }
    }
}

/// Selectors actually queried for the current mode. `None` means the
/// behaviour is off.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObstacleSelectors {
    pub bounce: Option<String>,
    pub mask: Option<String>,
}

impl Options {
    #[cfg(target_arch = "wasm32")]
    pub fn from_js(value: wasm_bindgen::JsValue) -> Result<Self, crate::error::RenderError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value)
            .map_err(|e| crate::error::RenderError::InvalidOptions(e.to_string()))
    }

    /// Particle count for a logical viewport.
    pub fn particle_count(&self, inner_width: f64, inner_height: f64) -> usize {
        self.count
            .unwrap_or_else(|| geometry::default_count(inner_width, inner_height)) as usize
    }

    /// NaN or negative speeds collapse to a still field.
    pub fn speed(&self) -> f32 {
        if self.speed.is_finite() {
            self.speed.max(0.0)
        } else {
            0.0
        }
    }

    pub fn selectors(&self) -> ObstacleSelectors {
        let pick = |explicit: &Option<String>, fallback: &String| {
            let s = explicit.as_deref().unwrap_or(fallback).trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        match self.mode {
            Mode::Plain => ObstacleSelectors::default(),
            Mode::Bounce => ObstacleSelectors {
                bounce: pick(&self.selector, &self.bounce_selector),
                mask: None,
            },
            Mode::Mask => ObstacleSelectors {
                bounce: None,
                mask: pick(&self.selector, &self.mask_selector),
            },
            Mode::Combined => ObstacleSelectors {
                bounce: pick(&None, &self.bounce_selector),
                mask: pick(&None, &self.mask_selector),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Options {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(parse("{}"), Options::default());
        let o = Options::default();
        assert_eq!(o.speed, 0.75);
        assert_eq!(o.mode, Mode::Plain);
    }

    #[test]
    fn camel_case_keys() {
        let o = parse(
            r#"{"count": 12, "speed": 2.0, "mode": "combined",
                "bounceSelector": ".card", "maskSelector": "nav"}"#,
        );
        assert_eq!(o.count, Some(12));
        assert_eq!(o.speed, 2.0);
        assert_eq!(o.mode, Mode::Combined);
        assert_eq!(
            o.selectors(),
            ObstacleSelectors {
                bounce: Some(".card".into()),
                mask: Some("nav".into()),
            }
        );
    }

    #[test]
    fn default_is_an_alias_for_plain() {
        assert_eq!(parse(r#"{"mode": "default"}"#).mode, Mode::Plain);
        assert_eq!(parse(r#"{"mode": "plain"}"#).mode, Mode::Plain);
        assert!(serde_json::from_str::<Options>(r#"{"mode": "wobble"}"#).is_err());
    }

    #[test]
    fn selector_shorthand_applies_to_single_modes() {
        let bounce = parse(r#"{"mode": "bounce", "selector": ".x"}"#).selectors();
        assert_eq!(bounce.bounce.as_deref(), Some(".x"));
        assert_eq!(bounce.mask, None);

        let mask = parse(r#"{"mode": "mask", "selector": ".x"}"#).selectors();
        assert_eq!(mask.mask.as_deref(), Some(".x"));
        assert_eq!(mask.bounce, None);

        let combined = parse(r#"{"mode": "combined", "selector": ".x"}"#).selectors();
        assert_eq!(combined.bounce.as_deref(), Some(DEFAULT_BOUNCE_SELECTOR));
        assert_eq!(combined.mask.as_deref(), Some(DEFAULT_MASK_SELECTOR));

        assert_eq!(parse(r#"{"selector": ".x"}"#).selectors(), ObstacleSelectors::default());
    }

    #[test]
    fn blank_selector_disables_behaviour() {
        let o = parse(r#"{"mode": "bounce", "bounceSelector": "  "}"#);
        assert_eq!(o.selectors().bounce, None);
    }

    #[test]
    fn count_falls_back_to_viewport() {
        assert_eq!(Options::default().particle_count(1000.0, 1000.0), 20);
        assert_eq!(parse(r#"{"count": 0}"#).particle_count(1000.0, 1000.0), 0);
    }

    #[test]
    fn bad_speed_is_still() {
        let mut o = Options::default();
        o.speed = -3.0;
        assert_eq!(o.speed(), 0.0);
        o.speed = f32::NAN;
        assert_eq!(o.speed(), 0.0);
    }
}
