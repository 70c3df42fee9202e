// SPDX-License-Identifier: CEPL-1.0

//! `mandel.toml`: starting view and coloring.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use mandel_render::color::parse_color;
use mandel_render::{DrawParameters, FractalRect, RenderSize, DEFAULT_GRADIENT};
use serde::Deserialize;
use tracing::warn;

use crate::view::View;

pub const DEFAULT_CONFIG_PATH: &str = "mandel.toml";

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub view: ViewCfg,
    #[serde(default)]
    pub coloring: ColoringCfg,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ViewCfg {
    pub center: [f64; 2],
    pub zoom: i32,
}

impl Default for ViewCfg {
    fn default() -> Self {
        let v = View::default();
        ViewCfg {
            center: [v.center.0, v.center.1],
            zoom: v.zoom,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColoringCfg {
    pub bailout_radius: f32,
    pub max_iterations: u32,
    /// Gradient period as a percentage of `max_iterations`.
    pub gradient_period: f32,
    pub fill: String,
    pub gradient: Vec<String>,
}

impl Default for ColoringCfg {
    fn default() -> Self {
        ColoringCfg {
            bailout_radius: 256.0,
            max_iterations: 5000,
            gradient_period: 20.0,
            fill: "#000000".into(),
            gradient: ["#000000", "#ff0000", "#00ff00", "#0000ff"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Coloring with colors parsed and the gradient fallback applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Coloring {
    pub bailout_radius: f32,
    pub max_iterations: u32,
    pub period_factor: f32,
    pub fill: u32,
    pub gradient: Vec<u32>,
}

impl ViewCfg {
    pub fn to_view(self) -> View {
        View {
            center: (self.center[0], self.center[1]),
            zoom: self.zoom,
        }
    }
}

impl ColoringCfg {
    pub fn resolve(&self) -> Result<Coloring> {
        let parse = |s: &str| parse_color(s).ok_or_else(|| anyhow!("invalid color {s:?}"));
        let fill = parse(&self.fill).context("coloring.fill")?;
        let mut gradient = self
            .gradient
            .iter()
            .map(|s| parse(s))
            .collect::<Result<Vec<u32>>>()
            .context("coloring.gradient")?;
        if gradient.len() < 2 {
            warn!(
                "gradient has {} colors; using black to white",
                gradient.len()
            );
            gradient = DEFAULT_GRADIENT.to_vec();
        }
        if self.max_iterations < 2 {
            return Err(anyhow!("coloring.max_iterations must be at least 2"));
        }
        Ok(Coloring {
            bailout_radius: self.bailout_radius,
            max_iterations: self.max_iterations,
            period_factor: self.gradient_period / 100.0,
            fill,
            gradient,
        })
    }
}

impl Coloring {
    pub fn parameters(&self, rect: FractalRect, size: RenderSize) -> DrawParameters {
        DrawParameters::new(rect, size)
            .with_escape(self.bailout_radius, self.max_iterations)
            .with_fill(self.fill)
            .with_period_factor(self.period_factor)
            .with_gradient(&self.gradient)
    }
}

/// An explicit `path` must exist and parse. The default path may be absent,
/// and a broken default file only costs a warning.
pub fn load(path: Option<&Path>) -> Result<AppCfg> {
    let (path, explicit) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound && !explicit => return Ok(AppCfg::default()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    match toml::from_str::<AppCfg>(&text) {
        Ok(cfg) => Ok(cfg),
        Err(e) if !explicit => {
            warn!("ignoring {}: {e}", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("parse {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: AppCfg = toml::from_str("").unwrap();
        assert_eq!(cfg.view.to_view(), View::default());
        let c = cfg.coloring.resolve().unwrap();
        assert_eq!(c.bailout_radius, 256.0);
        assert_eq!(c.max_iterations, 5000);
        assert!((c.period_factor - 0.2).abs() < 1e-6);
        assert_eq!(c.fill, 0x000000);
        assert_eq!(c.gradient, vec![0x000000, 0xFF0000, 0x00FF00, 0x0000FF]);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let cfg: AppCfg = toml::from_str(
            r##"
            [view]
            zoom = 7

            [coloring]
            max_iterations = 300
            gradient = ["navy", "#ffd700", "0xffffff"]
            "##,
        )
        .unwrap();
        assert_eq!(cfg.view.zoom, 7);
        assert_eq!(cfg.view.center, [-0.5, 0.0]);
        let c = cfg.coloring.resolve().unwrap();
        assert_eq!(c.max_iterations, 300);
        assert_eq!(c.gradient, vec![0x000080, 0xFFD700, 0xFFFFFF]);
    }

    #[test]
    fn short_gradient_falls_back() {
        let cfg = ColoringCfg {
            gradient: vec!["red".into()],
            ..Default::default()
        };
        assert_eq!(cfg.resolve().unwrap().gradient, DEFAULT_GRADIENT.to_vec());
    }

    #[test]
    fn bad_color_is_reported() {
        let cfg = ColoringCfg {
            fill: "mauve-ish".into(),
            ..Default::default()
        };
        let err = cfg.resolve().unwrap_err();
        assert!(format!("{err:#}").contains("coloring.fill"));
    }

    #[test]
    fn resolved_coloring_fills_parameter_block() {
        let c = ColoringCfg::default().resolve().unwrap();
        let rect = FractalRect {
            top: 1.0,
            left: -2.0,
            right: 1.0,
            bottom: -1.0,
        };
        let p = c.parameters(rect, RenderSize { width: 300, height: 200 });
        assert_eq!(p.gradient(), &c.gradient[..]);
        assert_eq!(p.max_iterations, 5000);
        assert_eq!(p.surface_width, 300.0);
    }

    #[test]
    fn explicit_path_must_exist() {
        let missing = std::env::temp_dir().join("mandel-config-that-does-not-exist.toml");
        assert!(load(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_path_must_parse() {
        let p = std::env::temp_dir().join(format!("mandel-{}-bad.toml", std::process::id()));
        fs::write(&p, "[view\nzoom = ").unwrap();
        let err = load(Some(&p)).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
        fs::remove_file(&p).ok();
    }
}
