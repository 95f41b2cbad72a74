//! Device and update states reported in device info, and update progress.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Operating state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// Not reported or not recognized.
    #[default]
    Unknown,
    /// Powered but not connected.
    Offline,
    /// Connected.
    Online,
    /// Connected, no meeting running.
    Idle,
    /// A meeting is running.
    InUse,
    /// Only the audio path is active.
    AudioOnly,
    /// Still enumerating peripherals.
    Enumerating,
}

impl DeviceState {
    /// Decode a wire value; unrecognized values are [`DeviceState::Unknown`].
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Offline,
            1 => Self::Online,
            2 => Self::Idle,
            3 => Self::InUse,
            4 => Self::AudioOnly,
            5 => Self::Enumerating,
            _ => Self::Unknown,
        }
    }

    /// Wire value.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::Offline => 0,
            Self::Online => 1,
            Self::Idle => 2,
            Self::InUse => 3,
            Self::AudioOnly => 4,
            Self::Enumerating => 5,
        }
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Idle => "idle",
            Self::InUse => "in-use",
            Self::AudioOnly => "audio-only",
            Self::Enumerating => "enumerating",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firmware update state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateState {
    /// Not reported or not recognized.
    #[default]
    Unknown,
    /// Running the newest image.
    Current,
    /// A newer image is available.
    Available,
    /// An update is starting.
    Starting,
    /// The image is being received.
    Downloading,
    /// The image was received and is being checked.
    Ready,
    /// The image is being written.
    Updating,
    /// The update will be applied later.
    Scheduled,
    /// The update failed.
    Error,
}

impl UpdateState {
    /// Decode a wire value; unrecognized values are [`UpdateState::Unknown`].
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Current,
            1 => Self::Available,
            3 => Self::Starting,
            4 => Self::Downloading,
            5 => Self::Ready,
            6 => Self::Updating,
            7 => Self::Scheduled,
            8 => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Wire value.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::Current => 0,
            Self::Available => 1,
            Self::Starting => 3,
            Self::Downloading => 4,
            Self::Ready => 5,
            Self::Updating => 6,
            Self::Scheduled => 7,
            Self::Error => 8,
        }
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Current => "current",
            Self::Available => "available",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Updating => "updating",
            Self::Scheduled => "scheduled",
            Self::Error => "error",
        }
    }

    /// User-facing status while the update is applied.
    pub fn coarse_status(self) -> CoarseStatus {
        match self {
            Self::Starting | Self::Downloading => CoarseStatus::Downloading,
            Self::Ready => CoarseStatus::Verifying,
            Self::Updating | Self::Scheduled => CoarseStatus::Writing,
            _ => CoarseStatus::Idle,
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse user-facing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoarseStatus {
    /// Nothing in progress.
    #[default]
    Idle,
    /// The device is receiving the image.
    Downloading,
    /// The device is checking the image.
    Verifying,
    /// The device is writing the image.
    Writing,
}

impl fmt::Display for CoarseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Writing => "writing",
        })
    }
}

/// Receives status and percentage updates during a firmware write.
pub trait ProgressSink {
    /// The coarse status changed.
    fn set_status(&mut self, status: CoarseStatus);

    /// Overall completion in percent, 0..=100.
    fn set_percentage(&mut self, percentage: u32);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_status(&mut self, _status: CoarseStatus) {}

    fn set_percentage(&mut self, _percentage: u32) {}
}

/// Forwards to a sink, dropping status repeats and any percentage lower
/// than one already reported.
pub struct MonotonicProgress<'a> {
    sink: &'a mut dyn ProgressSink,
    status: Option<CoarseStatus>,
    percentage: Option<u32>,
}

impl<'a> MonotonicProgress<'a> {
    /// Wrap `sink`.
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            status: None,
            percentage: None,
        }
    }

    /// Report `status` if it differs from the last one.
    pub fn status(&mut self, status: CoarseStatus) {
        if self.status != Some(status) {
            self.status = Some(status);
            self.sink.set_status(status);
        }
    }

    /// Report `percentage`, clamped to 100, if it is higher than the last one.
    pub fn percentage(&mut self, percentage: u32) {
        let percentage = percentage.min(100);
        if self.percentage.is_some_and(|last| percentage <= last) {
            return;
        }
        self.percentage = Some(percentage);
        self.sink.set_percentage(percentage);
    }

    /// Last reported percentage.
    pub fn current(&self) -> u32 {
        self.percentage.unwrap_or_default()
    }
}

impl fmt::Debug for MonotonicProgress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonotonicProgress")
            .field("status", &self.status)
            .field("percentage", &self.percentage)
            .finish_non_exhaustive()
    }
}

/// Flags changing how firmware is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteFlags(u32);

impl WriteFlags {
    /// Normal write.
    pub const NONE: Self = Self(0);
    /// Ask the device to apply the image even if it is not newer.
    pub const FORCE: Self = Self(1 << 0);

    /// Check if all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for WriteFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        statuses: Vec<CoarseStatus>,
        percentages: Vec<u32>,
    }

    impl ProgressSink for Recorder {
        fn set_status(&mut self, status: CoarseStatus) {
            self.statuses.push(status);
        }

        fn set_percentage(&mut self, percentage: u32) {
            self.percentages.push(percentage);
        }
    }

    #[test]
    fn test_wire_values_roundtrip() {
        for value in -1..=8 {
            let state = UpdateState::from_i64(value);
            if state != UpdateState::Unknown {
                assert_eq!(state.as_i64(), value);
            }
        }
        assert_eq!(UpdateState::from_i64(2), UpdateState::Unknown);
        assert_eq!(DeviceState::from_i64(3), DeviceState::InUse);
        assert_eq!(DeviceState::from_i64(42).as_i64(), -1);
    }

    #[test]
    fn test_coarse_status() {
        assert_eq!(UpdateState::Starting.coarse_status(), CoarseStatus::Downloading);
        assert_eq!(UpdateState::Downloading.coarse_status(), CoarseStatus::Downloading);
        assert_eq!(UpdateState::Ready.coarse_status(), CoarseStatus::Verifying);
        assert_eq!(UpdateState::Updating.coarse_status(), CoarseStatus::Writing);
        assert_eq!(UpdateState::Scheduled.coarse_status(), CoarseStatus::Writing);
        assert_eq!(UpdateState::Current.coarse_status(), CoarseStatus::Idle);
        assert_eq!(UpdateState::Error.coarse_status(), CoarseStatus::Idle);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut recorder = Recorder::default();
        {
            let mut progress = MonotonicProgress::new(&mut recorder);
            for pct in [0, 10, 5, 10, 50, 49, 120] {
                progress.percentage(pct);
            }
            progress.status(CoarseStatus::Downloading);
            progress.status(CoarseStatus::Downloading);
            progress.status(CoarseStatus::Writing);
            assert_eq!(progress.current(), 100);
        }
        assert_eq!(recorder.percentages, [0, 10, 50, 100]);
        assert_eq!(recorder.statuses, [CoarseStatus::Downloading, CoarseStatus::Writing]);
    }

    #[test]
    fn test_write_flags() {
        let mut flags = WriteFlags::NONE;
        assert!(!flags.contains(WriteFlags::FORCE));
        flags |= WriteFlags::FORCE;
        assert!(flags.contains(WriteFlags::FORCE));
    }
}
