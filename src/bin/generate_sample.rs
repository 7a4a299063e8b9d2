use std::path::PathBuf;

use anyhow::{Context, Result};
use trpl_viewer::data::model::Measurement;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Two-component decay with an instantaneous rise at `t0`.
fn decay(t: f64, t0: f64, fast: (f64, f64), slow: (f64, f64)) -> f64 {
    if t < t0 {
        return 0.0;
    }
    let dt = t - t0;
    fast.0 * (-dt / fast.1).exp() + slow.0 * (-dt / slow.1).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

struct SampleParams {
    name: &'static str,
    /// Emission peak centre and width (nm).
    peak: (f64, f64),
    /// (amplitude, tau in ns) of the fast and slow components.
    fast: (f64, f64),
    slow: (f64, f64),
    frame: u32,
}

const SAMPLES: [SampleParams; 3] = [
    SampleParams { name: "perovskite_A", peak: (520.0, 12.0), fast: (0.7, 0.8), slow: (0.3, 6.0), frame: 100 },
    SampleParams { name: "perovskite_B", peak: (545.0, 18.0), fast: (0.5, 1.5), slow: (0.5, 9.0), frame: 200 },
    SampleParams { name: "quantum_dot", peak: (610.0, 25.0), fast: (0.2, 3.0), slow: (0.8, 20.0), frame: 50 },
];

const WIDTH: usize = 320;
const HEIGHT: usize = 256;
const PEAK_COUNTS: f64 = 4000.0;

fn generate(sample: &SampleParams, rng: &mut SimpleRng) -> Result<Measurement> {
    let center = sample.peak.0.round();
    let wavelength: Vec<f64> = (0..WIDTH)
        .map(|i| center - 80.0 + 160.0 * i as f64 / (WIDTH - 1) as f64)
        .collect();
    let time: Vec<f64> = (0..HEIGHT).map(|j| 50.0 * j as f64 / (HEIGHT - 1) as f64).collect();

    let mut counts = Vec::with_capacity(WIDTH * HEIGHT);
    for &t in &time {
        let envelope = decay(t, 2.0, sample.fast, sample.slow);
        for &w in &wavelength {
            let signal = PEAK_COUNTS * envelope * gaussian(w, sample.peak.0, sample.peak.1, 1.0);
            let noisy = signal + rng.gauss(2.0, 2.0 + signal.sqrt());
            counts.push(noisy.round().max(0.0) as u32);
        }
    }

    let metadata = vec![
        format!("HiPic,1.0,100,Frame={},", sample.frame),
        "[Application],Title=Synthetic".to_string(),
        format!("[Spectrograph],Wavelength={center}[nm],Grating=150"),
        "[Acquisition],Date:2024/05/13,Time:12:00:00,".to_string(),
    ];
    Ok(Measurement::new(wavelength, time, counts, metadata)?)
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("samples"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    for sample in &SAMPLES {
        let measurement = generate(sample, &mut rng)?;
        let path = out_dir.join(format!("{}.img", sample.name));
        std::fs::write(&path, measurement.to_raw_binary()?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }

    println!(
        "Wrote {} streak images ({WIDTH}x{HEIGHT}) to {}",
        SAMPLES.len(),
        out_dir.display()
    );
    Ok(())
}
