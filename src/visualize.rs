//! Waveform and level readouts for decoded audio.

use crate::codec::SampleBuffer;

/// Per-column (min, max) envelope of channel 0.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformEnvelope {
    pub columns: Vec<(f32, f32)>,
}

impl WaveformEnvelope {
    /// Every column covers `ceil(len / columns)` samples; columns past the end
    /// of the data are flat.
    pub fn from_buffer(buffer: &SampleBuffer, columns: usize) -> Self {
        let data = buffer.channel_data(0);
        if columns == 0 || data.is_empty() {
            return Self {
                columns: vec![(0.0, 0.0); columns],
            };
        }

        let step = data.len().div_ceil(columns);
        let columns = (0..columns)
            .map(|i| {
                let start = (i * step).min(data.len());
                let end = (start + step).min(data.len());
                let window = &data[start..end];
                if window.is_empty() {
                    return (0.0, 0.0);
                }
                window
                    .iter()
                    .fold((1.0f32, -1.0f32), |(min, max), &s| (min.min(s), max.max(s)))
            })
            .collect();

        Self { columns }
    }

    /// Map each column onto `height` rows, top row first, as text.
    pub fn render(&self, height: usize) -> Vec<String> {
        let height = height.max(1);
        let amp = height as f32 / 2.0;
        let row_of = |v: f32| (((1.0 - v.clamp(-1.0, 1.0)) * amp) as usize).min(height - 1);

        (0..height)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|&(min, max)| {
                        if (row_of(max)..=row_of(min)).contains(&row) {
                            '█'
                        } else {
                            ' '
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Peak and RMS of the most recent buffer, with a decaying peak hold.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    peak: f32,
    rms: f32,
    held_peak: f32,
}

impl LevelMeter {
    const HOLD_DECAY: f32 = 0.85;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, buffer: &SampleBuffer) {
        let samples = buffer.samples();
        if samples.is_empty() {
            return;
        }

        self.peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let energy: f32 = samples.iter().map(|s| s * s).sum();
        self.rms = (energy / samples.len() as f32).sqrt();
        self.held_peak = (self.held_peak * Self::HOLD_DECAY).max(self.peak);
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn rms(&self) -> f32 {
        self.rms
    }

    pub fn rms_dbfs(&self) -> f32 {
        if self.rms <= 0.0 {
            return f32::NEG_INFINITY;
        }
        20.0 * self.rms.log10()
    }

    /// `[#####=    |    ] -18.2 dBFS`: `#` for RMS, `=` up to the peak and `|` at the held peak
    pub fn render(&self, width: usize) -> String {
        let width = width.max(1);
        let cells = |level: f32| ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
        let rms_cells = cells(self.rms);
        let peak_cells = cells(self.peak).max(rms_cells);
        let hold_cell = cells(self.held_peak);

        let bar: String = (0..width)
            .map(|i| {
                if i < rms_cells {
                    '#'
                } else if i < peak_cells {
                    '='
                } else if hold_cell > 0 && i == hold_cell - 1 {
                    '|'
                } else {
                    ' '
                }
            })
            .collect();

        let db = self.rms_dbfs();
        if db.is_finite() {
            format!("[{}] {:6.1} dBFS", bar, db)
        } else {
            format!("[{}]   -inf dBFS", bar)
        }
    }
}
