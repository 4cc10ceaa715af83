//! Names and index ranges of the channels inside a representation vector.

use std::ops::Range;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{MetamerError, MetamerResult};

/// What a representation channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Energy { scale: usize, orientation: usize },
    Luminance,
}

impl ChannelKind {
    pub fn name(&self) -> String {
        match self {
            ChannelKind::Energy { scale, orientation } => {
                format!("energy_scale_{scale}_band_{orientation}")
            }
            ChannelKind::Luminance => "luminance".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationChannel {
    pub kind: ChannelKind,
    pub range: Range<usize>,
}

/// Channel order of a model's representation. Every channel holds one value
/// per window, `eccentricity_band * n_polar_windows + angular_window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationLayout {
    n_polar_windows: usize,
    n_eccentricity_bands: usize,
    channels: Vec<RepresentationChannel>,
}

impl RepresentationLayout {
    pub fn new(n_polar_windows: usize, n_eccentricity_bands: usize, kinds: &[ChannelKind]) -> Self {
        let n_windows = n_polar_windows * n_eccentricity_bands;
        let channels = kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| RepresentationChannel {
                kind,
                range: i * n_windows..(i + 1) * n_windows,
            })
            .collect();
        Self {
            n_polar_windows,
            n_eccentricity_bands,
            channels,
        }
    }

    /// Energy channels scale-major, then orientation, then luminance.
    pub fn cortical(
        n_polar_windows: usize,
        n_eccentricity_bands: usize,
        num_scales: usize,
        n_orientations: usize,
    ) -> Self {
        let mut kinds: Vec<ChannelKind> = (0..num_scales)
            .flat_map(|scale| {
                (0..n_orientations).map(move |orientation| ChannelKind::Energy { scale, orientation })
            })
            .collect();
        kinds.push(ChannelKind::Luminance);
        Self::new(n_polar_windows, n_eccentricity_bands, &kinds)
    }

    pub fn retinal(n_polar_windows: usize, n_eccentricity_bands: usize) -> Self {
        Self::new(n_polar_windows, n_eccentricity_bands, &[ChannelKind::Luminance])
    }

    pub fn len(&self) -> usize {
        self.channels.len() * self.windows_per_channel()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn windows_per_channel(&self) -> usize {
        self.n_polar_windows * self.n_eccentricity_bands
    }

    pub fn channels(&self) -> &[RepresentationChannel] {
        &self.channels
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&RepresentationChannel> {
        self.channels.iter().find(|c| c.kind == kind)
    }

    /// Splits `representation` into one `(n_eccentricity_bands,
    /// n_polar_windows)` grid per channel.
    pub fn split(
        &self,
        representation: ArrayView1<'_, f32>,
    ) -> MetamerResult<Vec<(ChannelKind, Array2<f32>)>> {
        if representation.len() != self.len() {
            return Err(MetamerError::shape_mismatch(
                (self.len(), 1),
                (representation.len(), 1),
                "representation layout",
            ));
        }
        let shape = (self.n_eccentricity_bands, self.n_polar_windows);
        self.channels
            .iter()
            .map(|channel| {
                let values = representation
                    .slice(ndarray::s![channel.range.clone()])
                    .to_vec();
                Array2::from_shape_vec(shape, values)
                    .map(|grid| (channel.kind, grid))
                    .map_err(|err| MetamerError::config("layout", channel.kind.name(), err.to_string()))
            })
            .collect()
    }
}
