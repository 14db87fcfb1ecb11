//! Synthetic scene for `stub://` URLs.
//!
//! `stub://<name>?people=N&vehicles=V&frames=M&seed=S` paints N person
//! markers and V vehicle markers on a grey background. Each walker wanders
//! inside its own grid cell, so markers never touch and a marker detector
//! sees exactly one region per walker. With `frames` the stream ends after
//! M frames; without it the stream never ends.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backends::{PERSON_MARKER, VEHICLE_MARKER};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceConfig, SourceStats};

const BACKGROUND: [u8; 3] = [90, 90, 90];
const WALKER_SIZE: (u32, u32) = (16, 32);
const STEP: i32 = 3;

/// Parsed `stub://` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticScene {
    pub name: String,
    pub people: u32,
    pub vehicles: u32,
    pub frames: Option<u64>,
    pub seed: u64,
}

impl SyntheticScene {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source URL must start with stub://"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut scene = SyntheticScene {
            name: name.to_string(),
            people: 0,
            vehicles: 0,
            frames: None,
            seed: 0,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed query parameter '{}'", pair))?;
            let parse = |what: &str| {
                value
                    .parse::<u64>()
                    .with_context(|| format!("stub parameter {} must be an integer", what))
            };
            let parse_count = |what: &str| {
                value
                    .parse::<u32>()
                    .with_context(|| format!("stub parameter {} must be an integer", what))
            };
            match key {
                "people" => scene.people = parse_count("people")?,
                "vehicles" => scene.vehicles = parse_count("vehicles")?,
                "frames" => scene.frames = Some(parse("frames")?),
                "seed" => scene.seed = parse("seed")?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        Ok(scene)
    }
}

#[derive(Clone, Debug)]
struct Walker {
    cell: (u32, u32, u32, u32),
    size: (u32, u32),
    pos: (u32, u32),
    rgb: [u8; 3],
}

impl Walker {
    fn step(&mut self, rng: &mut StdRng) {
        let (cx, cy, cw, ch) = self.cell;
        let max_x = cx + cw - self.size.0 - 1;
        let max_y = cy + ch - self.size.1 - 1;
        let dx = rng.gen_range(-STEP..=STEP);
        let dy = rng.gen_range(-STEP..=STEP);
        self.pos.0 = (self.pos.0 as i32 + dx).clamp((cx + 1) as i32, max_x as i32) as u32;
        self.pos.1 = (self.pos.1 as i32 + dy).clamp((cy + 1) as i32, max_y as i32) as u32;
    }

    fn paint(&self, pixels: &mut [u8], width: u32) {
        for y in self.pos.1..self.pos.1 + self.size.1 {
            for x in self.pos.0..self.pos.0 + self.size.0 {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx..idx + 3].copy_from_slice(&self.rgb);
            }
        }
    }
}

pub struct SyntheticSource {
    config: SourceConfig,
    scene: SyntheticScene,
    walkers: Vec<Walker>,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let scene = SyntheticScene::parse(&config.url)?;
        let mut rng = StdRng::seed_from_u64(scene.seed);
        let walkers = layout_walkers(&scene, config.width, config.height, &mut rng)?;
        Ok(Self {
            config: config.clone(),
            scene,
            walkers,
            rng,
            frame_count: 0,
            connected: false,
        })
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }
}

/// One grid cell per walker, people first.
fn layout_walkers(
    scene: &SyntheticScene,
    width: u32,
    height: u32,
    rng: &mut StdRng,
) -> Result<Vec<Walker>> {
    let total = scene.people + scene.vehicles;
    if total == 0 {
        return Ok(Vec::new());
    }
    let cols = (total as f64).sqrt().ceil() as u32;
    let rows = total.div_ceil(cols);
    let (cell_w, cell_h) = (width / cols, height / rows);
    if cell_w < 6 || cell_h < 6 {
        return Err(anyhow!(
            "{}x{} frame is too small for {} synthetic walkers",
            width,
            height,
            total
        ));
    }
    let size = (
        WALKER_SIZE.0.min(cell_w - 4),
        WALKER_SIZE.1.min(cell_h - 4),
    );
    let walkers = (0..total)
        .map(|i| {
            let cell = ((i % cols) * cell_w, (i / cols) * cell_h, cell_w, cell_h);
            let pos = (
                rng.gen_range(cell.0 + 1..=cell.0 + cell_w - size.0 - 1),
                rng.gen_range(cell.1 + 1..=cell.1 + cell_h - size.1 - 1),
            );
            let rgb = if i < scene.people {
                PERSON_MARKER
            } else {
                VEHICLE_MARKER
            };
            Walker {
                cell,
                size,
                pos,
                rgb,
            }
        })
        .collect();
    Ok(walkers)
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({} people, {} vehicles)",
            self.config.url,
            self.scene.people,
            self.scene.vehicles
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} is not connected", self.config.url));
        }
        if self.scene.frames.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let (width, height) = (self.config.width, self.config.height);
        let mut pixels: Vec<u8> = BACKGROUND
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        for walker in &mut self.walkers {
            walker.step(&mut self.rng);
            walker.paint(&mut pixels, width);
        }
        self.frame_count += 1;
        Frame::new(pixels, width, height).map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }

    fn release(&mut self) {
        self.connected = false;
    }
}
