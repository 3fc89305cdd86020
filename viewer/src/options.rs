use std::path::PathBuf;

use anyhow::{anyhow, bail, Context as _, Result};
use volsynth_engine::{Axis, Dims, RenderOptions, Window};

/// Which planes along the chosen axis get written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceSelection {
    Middle,
    Index(i64),
    All,
}

impl SliceSelection {
    pub fn indices(self, extent: usize) -> Vec<i64> {
        match self {
            SliceSelection::Middle => vec![(extent / 2) as i64],
            SliceSelection::Index(i) => vec![i],
            SliceSelection::All => (0..extent as i64).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerOptions {
    pub case_id: String,
    pub dims: Dims,
    pub axis: Axis,
    pub slices: SliceSelection,
    pub window: Option<Window>,
    pub overlay: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub threads: Option<usize>,
    pub cases_file: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub list: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            case_id: "lung-nsclc-kras-g12c".to_string(),
            dims: Dims::new(256, 256, 100),
            axis: Axis::Axial,
            slices: SliceSelection::Middle,
            window: None,
            overlay: false,
            brightness: 100.0,
            contrast: 0.0,
            threads: None,
            cases_file: None,
            out_dir: PathBuf::from("out"),
            list: false,
        }
    }
}

fn parse_dims(value: &str) -> Result<Dims> {
    let parts: Vec<&str> = value.split(['x', 'X']).collect();
    if parts.len() != 3 {
        bail!("expected WxHxD, got '{}'", value);
    }
    let mut extents = [0usize; 3];
    for (extent, part) in extents.iter_mut().zip(&parts) {
        *extent = part.trim().parse().with_context(|| format!("invalid extent '{}' in --size", part))?;
    }
    Ok(Dims::new(extents[0], extents[1], extents[2]))
}

fn parse_window(value: &str) -> Result<Window> {
    if let Some(window) = Window::preset(value) {
        return Ok(window);
    }
    let (center, width) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("unknown window '{}' (expected a preset or CENTER,WIDTH)", value))?;
    let center: f32 = center.trim().parse().context("invalid window center")?;
    let width: f32 = width.trim().parse().context("invalid window width")?;
    Ok(Window::new(center, width))
}

impl ViewerOptions {
    /// Parses `--flag=value` style arguments, program name excluded.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut options = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            if let Some(value) = arg.strip_prefix("--case=") {
                options.case_id = value.to_string();
            } else if let Some(value) = arg.strip_prefix("--size=") {
                options.dims = parse_dims(value)?;
            } else if let Some(value) = arg.strip_prefix("--axis=") {
                options.axis = Axis::parse_lenient(value);
            } else if let Some(value) = arg.strip_prefix("--slice=") {
                let index: i64 = value.parse().context("invalid value for --slice (expected an integer)")?;
                options.slices = SliceSelection::Index(index);
            } else if arg == "--all" {
                options.slices = SliceSelection::All;
            } else if let Some(value) = arg.strip_prefix("--window=") {
                options.window = Some(parse_window(value)?);
            } else if arg == "--overlay" {
                options.overlay = true;
            } else if let Some(value) = arg.strip_prefix("--brightness=") {
                options.brightness = value.parse().context("invalid value for --brightness (expected percent)")?;
            } else if let Some(value) = arg.strip_prefix("--contrast=") {
                options.contrast = value.parse().context("invalid value for --contrast")?;
            } else if let Some(value) = arg.strip_prefix("--threads=") {
                options.threads = Some(value.parse().context("invalid value for --threads")?);
            } else if let Some(value) = arg.strip_prefix("--cases=") {
                options.cases_file = Some(PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--out=") {
                options.out_dir = PathBuf::from(value);
            } else if arg == "--list" {
                options.list = true;
            } else {
                bail!("unrecognized argument '{}'", arg);
            }
        }
        Ok(options)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            window: self.window,
            show_overlay: self.overlay,
            brightness: self.brightness,
            contrast: self.contrast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_gives_defaults() {
        let options = ViewerOptions::parse(Vec::<String>::new()).unwrap();
        assert_eq!(options, ViewerOptions::default());
        assert_eq!(options.render_options(), RenderOptions::default());
    }

    #[test]
    fn parses_every_flag() {
        let options = ViewerOptions::parse([
            "--case=prostate-mcrpc",
            "--size=128x96x40",
            "--axis=coronal",
            "--slice=-3",
            "--window=300,1200",
            "--overlay",
            "--brightness=120",
            "--contrast=-40",
            "--threads=4",
            "--cases=extra.ron",
            "--out=/tmp/slices",
            "--list",
        ])
        .unwrap();
        assert_eq!(options.case_id, "prostate-mcrpc");
        assert_eq!(options.dims, Dims::new(128, 96, 40));
        assert_eq!(options.axis, Axis::Coronal);
        assert_eq!(options.slices, SliceSelection::Index(-3));
        assert_eq!(options.window, Some(Window::new(300.0, 1200.0)));
        assert!(options.overlay && options.list);
        assert_eq!((options.brightness, options.contrast), (120.0, -40.0));
        assert_eq!(options.threads, Some(4));
        assert_eq!(options.cases_file, Some(PathBuf::from("extra.ron")));
        assert_eq!(options.out_dir, PathBuf::from("/tmp/slices"));
    }

    #[test]
    fn window_presets_and_lenient_axis() {
        let options = ViewerOptions::parse(["--window=lung", "--axis=oblique", "--all"]).unwrap();
        assert_eq!(options.window, Some(Window::LUNG));
        assert_eq!(options.axis, Axis::Axial);
        assert_eq!(options.slices.indices(4), vec![0, 1, 2, 3]);
        assert_eq!(SliceSelection::Middle.indices(9), vec![4]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ViewerOptions::parse(["--size=12x12"]).is_err());
        assert!(ViewerOptions::parse(["--size=axbxc"]).is_err());
        assert!(ViewerOptions::parse(["--window=sideways"]).is_err());
        assert!(ViewerOptions::parse(["--slice=middle"]).is_err());
        assert!(ViewerOptions::parse(["--verbose"]).is_err());
    }
}
