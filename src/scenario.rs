use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Pixel dimensions, used both for scenario viewports and raster sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1440x900)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
    #[error("Invalid scenario name: {0:?} (letters, digits, '-' and '_' only)")]
    InvalidName(String),
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(parts[0].to_string()))?;

        let height: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(parts[1].to_string()))?;

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Device emulation parameters attached to a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub user_agent: String,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
}

/// A named viewport/device configuration under test. Built once at startup,
/// immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceProfile>,
}

impl Scenario {
    fn new(name: &str, width: u32, height: u32, device: Option<DeviceProfile>) -> Self {
        Self {
            name: name.to_string(),
            viewport: Viewport { width, height },
            device,
        }
    }
}

fn pixel_7() -> DeviceProfile {
    DeviceProfile {
        user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/115.0.0.0 Mobile Safari/537.36"
            .to_string(),
        device_scale_factor: 2.625,
        is_mobile: true,
        has_touch: true,
    }
}

fn ipad_air() -> DeviceProfile {
    DeviceProfile {
        user_agent: "Mozilla/5.0 (iPad; CPU OS 16_4 like Mac OS X) AppleWebKit/605.1.15 \
                     (KHTML, like Gecko) Version/16.4 Mobile/15E148 Safari/604.1"
            .to_string(),
        device_scale_factor: 2.0,
        is_mobile: true,
        has_touch: true,
    }
}

/// The stock scenario matrix: both phone orientations, a tablet, and a
/// plain desktop viewport.
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("mobile-portrait", 360, 740, Some(pixel_7())),
        Scenario::new("mobile-landscape", 740, 360, Some(pixel_7())),
        Scenario::new("tablet", 820, 1180, Some(ipad_air())),
        Scenario::new("desktop", 1440, 900, None),
    ]
}

/// Extra presets behind `--extended-scenarios`.
pub fn extended_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("desktop-small", 1280, 720, None),
        Scenario::new("desktop-wide", 1920, 1080, None),
        Scenario::new("tablet-landscape", 1180, 820, Some(ipad_air())),
    ]
}

/// Inputs to scenario resolution, collected from the CLI.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub extended: bool,
    /// Ad-hoc `WIDTHxHEIGHT@name` definitions.
    pub extra: Vec<String>,
    /// Keep only the named scenarios, in the given order.
    pub filter: Option<Vec<String>>,
}

/// Parses a `WIDTHxHEIGHT@name` definition into a device-less scenario.
pub fn parse_extra_scenario(def: &str) -> Result<Scenario, ViewportParseError> {
    let (dims, name) = def
        .split_once('@')
        .ok_or(ViewportParseError::InvalidFormat)?;
    let viewport: Viewport = dims.parse()?;
    let name = name.trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ViewportParseError::InvalidName(name.to_string()));
    }
    Ok(Scenario {
        name: name.to_string(),
        viewport,
        device: None,
    })
}

/// Resolves the scenario matrix for this run. Merges the default table, the
/// extended presets, and ad-hoc definitions, then applies the name filter.
/// Invalid definitions, duplicate names and unknown filter entries are
/// dropped with a warning; resolution itself never fails.
pub fn resolve_scenarios(opts: &ScenarioOptions) -> Vec<Scenario> {
    let mut scenarios = default_scenarios();
    if opts.extended {
        scenarios.extend(extended_scenarios());
    }

    for def in &opts.extra {
        match parse_extra_scenario(def) {
            Ok(scenario) => {
                if scenarios.iter().any(|s| s.name == scenario.name) {
                    eprintln!(
                        "Warning: duplicate scenario name {:?} ignored",
                        scenario.name
                    );
                } else {
                    scenarios.push(scenario);
                }
            }
            Err(err) => eprintln!("Warning: invalid viewport definition {def:?}: {err}"),
        }
    }

    if let Some(filter) = &opts.filter {
        let mut selected: Vec<Scenario> = Vec::new();
        for name in filter {
            match scenarios.iter().find(|s| &s.name == name) {
                Some(scenario) => {
                    if !selected.iter().any(|s| s.name == scenario.name) {
                        selected.push(scenario.clone());
                    }
                }
                None => eprintln!("Warning: unknown scenario {name:?} skipped"),
            }
        }
        if selected.is_empty() {
            eprintln!("Warning: scenario filter matched nothing; running the full set");
        } else {
            return selected;
        }
    }

    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_with_spaces() {
        let vp: Viewport = " 1920 x 1080 ".parse().unwrap();
        assert_eq!(vp.width, 1920);
        assert_eq!(vp.height, 1080);
    }

    #[test]
    fn viewport_rejects_bad_input() {
        assert!("1440".parse::<Viewport>().is_err());
        assert!("1440x900x600".parse::<Viewport>().is_err());
        assert!("abcx900".parse::<Viewport>().is_err());
        assert!("0x900".parse::<Viewport>().is_err());
        assert!("1440x0".parse::<Viewport>().is_err());
    }

    #[test]
    fn default_set_order_is_stable() {
        let names: Vec<String> = default_scenarios().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["mobile-portrait", "mobile-landscape", "tablet", "desktop"]
        );
    }

    #[test]
    fn extra_definition_parses() {
        let sc = parse_extra_scenario("1024x768@xga").unwrap();
        assert_eq!(sc.name, "xga");
        assert_eq!(sc.viewport.width, 1024);
        assert_eq!(sc.viewport.height, 768);
        assert!(sc.device.is_none());
    }

    #[test]
    fn extra_definition_rejects_bad_names() {
        assert!(parse_extra_scenario("1024x768@").is_err());
        assert!(parse_extra_scenario("1024x768@bad name").is_err());
        assert!(parse_extra_scenario("1024x768").is_err());
        assert!(parse_extra_scenario("0x768@zero").is_err());
    }

    #[test]
    fn resolve_merges_extras_and_skips_duplicates() {
        let opts = ScenarioOptions {
            extra: vec![
                "800x600@svga".to_string(),
                "640x480@desktop".to_string(), // clashes with the default set
                "nonsense".to_string(),
            ],
            ..ScenarioOptions::default()
        };
        let scenarios = resolve_scenarios(&opts);
        assert_eq!(scenarios.len(), 5);
        assert!(scenarios.iter().any(|s| s.name == "svga"));
        let desktop = scenarios.iter().find(|s| s.name == "desktop").unwrap();
        assert_eq!(desktop.viewport.width, 1440, "default must win the clash");
    }

    #[test]
    fn resolve_filter_preserves_input_order_and_drops_unknowns() {
        let opts = ScenarioOptions {
            filter: Some(vec![
                "desktop".to_string(),
                "nope".to_string(),
                "tablet".to_string(),
            ]),
            ..ScenarioOptions::default()
        };
        let names: Vec<String> = resolve_scenarios(&opts).into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["desktop", "tablet"]);
    }

    #[test]
    fn resolve_falls_back_to_full_set_when_filter_empties() {
        let opts = ScenarioOptions {
            filter: Some(vec!["missing".to_string()]),
            ..ScenarioOptions::default()
        };
        assert_eq!(resolve_scenarios(&opts).len(), 4);
    }

    #[test]
    fn resolve_extended_adds_presets() {
        let opts = ScenarioOptions {
            extended: true,
            ..ScenarioOptions::default()
        };
        let scenarios = resolve_scenarios(&opts);
        assert_eq!(scenarios.len(), 7);
        assert!(scenarios.iter().any(|s| s.name == "desktop-wide"));
    }

    #[test]
    fn mobile_profiles_are_flagged() {
        let scenarios = default_scenarios();
        let mobile = scenarios
            .iter()
            .find(|s| s.name == "mobile-portrait")
            .and_then(|s| s.device.as_ref())
            .unwrap();
        assert!(mobile.is_mobile);
        assert!(mobile.has_touch);
        assert!(mobile.device_scale_factor > 1.0);
    }
}
