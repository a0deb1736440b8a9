//! Model shape contract: channel counts plus the format version that decides
//! how the misc/score outputs are read.

use thiserror::Error;

/// Win / loss / no-result.
pub const NUM_VALUE_CHANNELS: usize = 3;
pub const NUM_OWNERSHIP_CHANNELS: usize = 1;

pub const MIN_SUPPORTED_VERSION: u32 = 3;
pub const MAX_SUPPORTED_VERSION: u32 = 10;

/// Layout the shipped backends assume when only a model name is known.
pub const DEFAULT_MODEL_VERSION: u32 = 5;

// ---------------------------------------------------------------------------
// ScoreFormat: how a misc row encodes score statistics
// ---------------------------------------------------------------------------

/// Score encoding of a model's misc output row.
///
/// Picked once when the descriptor is built, then matched per row by the
/// decoder. Versions below 3 have no variant: they never get past
/// [`ModelDescriptor::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreFormat {
    /// Version 3: `misc[0]` is the score mean. No second moment is emitted,
    /// the decoder uses `mean * mean` in its place.
    MeanOnly,
    /// Version 4+: `misc[0]` is the mean, `misc[1]` an independently
    /// estimated mean of squares.
    MeanAndSecondMoment,
}

impl ScoreFormat {
    pub fn for_version(version: u32) -> Option<Self> {
        match version {
            3 => Some(Self::MeanOnly),
            4..=MAX_SUPPORTED_VERSION => Some(Self::MeanAndSecondMoment),
            _ => None,
        }
    }

    /// Score channels the model must declare for this format.
    pub fn num_score_value_channels(self) -> usize {
        match self {
            Self::MeanOnly => 1,
            Self::MeanAndSecondMoment => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelChannels: per-version feature table
// ---------------------------------------------------------------------------

/// Channel counts of every input and output tensor of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelChannels {
    pub num_input_channels: usize,
    pub num_input_global_channels: usize,
    pub num_value_channels: usize,
    pub num_ownership_channels: usize,
    pub num_score_value_channels: usize,
    pub num_misc_value_channels: usize,
}

impl ModelChannels {
    /// The table row for `version`, or `None` for unsupported versions.
    pub fn for_version(version: u32) -> Option<Self> {
        let (spatial, global, score, misc) = match version {
            3 => (22, 14, 1, 1),
            4 => (22, 14, 2, 2),
            5 => (22, 14, 2, 6),
            6 => (22, 16, 2, 6),
            7..=MAX_SUPPORTED_VERSION => (22, 19, 2, 6),
            _ => return None,
        };
        Some(Self {
            num_input_channels: spatial,
            num_input_global_channels: global,
            num_value_channels: NUM_VALUE_CHANNELS,
            num_ownership_channels: NUM_OWNERSHIP_CHANNELS,
            num_score_value_channels: score,
            num_misc_value_channels: misc,
        })
    }
}

// ---------------------------------------------------------------------------
// DescriptorError
// ---------------------------------------------------------------------------

/// The adapter and the model disagree about tensor layout.
///
/// There is no degraded mode for any of these: callers treat them as fatal
/// at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error(
        "model {name}: unsupported format version {version} (supported {min}..={max})",
        min = MIN_SUPPORTED_VERSION,
        max = MAX_SUPPORTED_VERSION
    )]
    UnsupportedVersion { name: String, version: u32 },

    #[error("model {name}: version {version} expects {expected} {kind} channels, found {actual}")]
    ChannelMismatch {
        name: String,
        version: u32,
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("model {name}: {misc} misc value channels cannot hold {score} score channels")]
    MiscTooNarrow {
        name: String,
        misc: usize,
        score: usize,
    },
}

// ---------------------------------------------------------------------------
// ModelDescriptor
// ---------------------------------------------------------------------------

/// Static metadata of a loaded model.
///
/// Immutable after construction; share it across handles and threads via
/// `Arc<ModelDescriptor>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelDescriptor {
    name: String,
    version: u32,
    score_format: ScoreFormat,
    channels: ModelChannels,
}

impl ModelDescriptor {
    /// Descriptor for a model file whose layout is the default one the
    /// backends ship with (version 5).
    pub fn load(name: impl Into<String>) -> Result<Self, DescriptorError> {
        Self::for_version(name, DEFAULT_MODEL_VERSION)
    }

    /// Descriptor with every channel count taken from the version table.
    pub fn for_version(name: impl Into<String>, version: u32) -> Result<Self, DescriptorError> {
        let name = name.into();
        let channels = ModelChannels::for_version(version)
            .ok_or_else(|| DescriptorError::UnsupportedVersion {
                name: name.clone(),
                version,
            })?;
        Self::new(name, version, channels)
    }

    /// Descriptor with explicitly declared channel counts, checked against
    /// the version table.
    pub fn new(
        name: impl Into<String>,
        version: u32,
        channels: ModelChannels,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        let (Some(score_format), Some(expected)) = (
            ScoreFormat::for_version(version),
            ModelChannels::for_version(version),
        ) else {
            return Err(DescriptorError::UnsupportedVersion { name, version });
        };

        let checks = [
            ("spatial input", expected.num_input_channels, channels.num_input_channels),
            (
                "global input",
                expected.num_input_global_channels,
                channels.num_input_global_channels,
            ),
            ("value", NUM_VALUE_CHANNELS, channels.num_value_channels),
            ("ownership", NUM_OWNERSHIP_CHANNELS, channels.num_ownership_channels),
            (
                "score value",
                score_format.num_score_value_channels(),
                channels.num_score_value_channels,
            ),
        ];
        for (kind, expected, actual) in checks {
            if expected != actual {
                return Err(DescriptorError::ChannelMismatch {
                    name,
                    version,
                    kind,
                    expected,
                    actual,
                });
            }
        }
        if channels.num_misc_value_channels < channels.num_score_value_channels {
            return Err(DescriptorError::MiscTooNarrow {
                name,
                misc: channels.num_misc_value_channels,
                score: channels.num_score_value_channels,
            });
        }

        log::debug!(
            "model {name}: version {version}, {} spatial / {} global input channels, {:?}",
            channels.num_input_channels,
            channels.num_input_global_channels,
            score_format
        );

        Ok(Self {
            name,
            version,
            score_format,
            channels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn score_format(&self) -> ScoreFormat {
        self.score_format
    }

    pub fn channels(&self) -> &ModelChannels {
        &self.channels
    }

    pub fn num_input_channels(&self) -> usize {
        self.channels.num_input_channels
    }

    pub fn num_input_global_channels(&self) -> usize {
        self.channels.num_input_global_channels
    }

    pub fn num_value_channels(&self) -> usize {
        self.channels.num_value_channels
    }

    pub fn num_ownership_channels(&self) -> usize {
        self.channels.num_ownership_channels
    }

    pub fn num_score_value_channels(&self) -> usize {
        self.channels.num_score_value_channels
    }

    pub fn num_misc_value_channels(&self) -> usize {
        self.channels.num_misc_value_channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
